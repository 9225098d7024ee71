//! Configuration validation types for ensuring type-safe configurations.
//!
//! Pluggable implementations receive their configuration as a raw
//! `toml::Value` section; this module provides the small schema framework
//! they use to validate those sections before construction.

use thiserror::Error;

/// Errors that can occur during configuration validation.
#[derive(Debug, Error)]
pub enum ValidationError {
	/// A required field is missing.
	#[error("Missing required field: {0}")]
	MissingField(String),
	/// A field is present but has an invalid value.
	#[error("Invalid value for field '{field}': {message}")]
	InvalidValue { field: String, message: String },
	/// A field has the wrong type.
	#[error("Type mismatch for field '{field}': expected {expected}, got {actual}")]
	TypeMismatch {
		field: String,
		expected: String,
		actual: String,
	},
}

/// Expected type of a configuration field.
#[derive(Debug, Clone, Copy)]
pub enum FieldType {
	String,
	/// Integer with optional inclusive bounds.
	Integer {
		min: Option<i64>,
		max: Option<i64>,
	},
	Boolean,
}

impl FieldType {
	fn check(&self, field: &str, value: &toml::Value) -> Result<(), ValidationError> {
		let mismatch = |expected: &str| ValidationError::TypeMismatch {
			field: field.to_string(),
			expected: expected.to_string(),
			actual: value.type_str().to_string(),
		};
		match self {
			FieldType::String => {
				value.as_str().ok_or_else(|| mismatch("string"))?;
			}
			FieldType::Integer { min, max } => {
				let v = value.as_integer().ok_or_else(|| mismatch("integer"))?;
				if min.is_some_and(|m| v < m) || max.is_some_and(|m| v > m) {
					return Err(ValidationError::InvalidValue {
						field: field.to_string(),
						message: format!("{} outside allowed range", v),
					});
				}
			}
			FieldType::Boolean => {
				value.as_bool().ok_or_else(|| mismatch("boolean"))?;
			}
		}
		Ok(())
	}
}

/// A named field within a schema.
#[derive(Debug)]
pub struct Field {
	pub name: String,
	pub field_type: FieldType,
}

impl Field {
	pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
		Self {
			name: name.into(),
			field_type,
		}
	}
}

/// A validation schema: required fields that must be present and optional
/// fields that are type-checked when present.
#[derive(Debug)]
pub struct Schema {
	pub required: Vec<Field>,
	pub optional: Vec<Field>,
}

impl Schema {
	pub fn new(required: Vec<Field>, optional: Vec<Field>) -> Self {
		Self { required, optional }
	}

	/// Validates a TOML value against this schema.
	pub fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let table = config
			.as_table()
			.ok_or_else(|| ValidationError::TypeMismatch {
				field: "root".to_string(),
				expected: "table".to_string(),
				actual: config.type_str().to_string(),
			})?;

		for field in &self.required {
			let value = table
				.get(&field.name)
				.ok_or_else(|| ValidationError::MissingField(field.name.clone()))?;
			field.field_type.check(&field.name, value)?;
		}

		for field in &self.optional {
			if let Some(value) = table.get(&field.name) {
				field.field_type.check(&field.name, value)?;
			}
		}

		Ok(())
	}
}

/// Trait defining a configuration schema that can validate TOML values.
///
/// Implementations return one of these from `config_schema()` so their
/// configuration section can be checked before the factory runs.
pub trait ConfigSchema: Send + Sync {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError>;
}

#[cfg(test)]
mod tests {
	use super::*;

	fn schema() -> Schema {
		Schema::new(
			vec![Field::new("key_id", FieldType::String)],
			vec![Field::new(
				"timeout_seconds",
				FieldType::Integer {
					min: Some(1),
					max: Some(300),
				},
			)],
		)
	}

	#[test]
	fn test_missing_required_field() {
		let config: toml::Value = toml::from_str("timeout_seconds = 5").unwrap();
		assert!(matches!(
			schema().validate(&config),
			Err(ValidationError::MissingField(_))
		));
	}

	#[test]
	fn test_type_mismatch() {
		let config: toml::Value = toml::from_str("key_id = 42").unwrap();
		assert!(matches!(
			schema().validate(&config),
			Err(ValidationError::TypeMismatch { .. })
		));
	}

	#[test]
	fn test_integer_bounds() {
		let config: toml::Value =
			toml::from_str("key_id = \"rzp\"\ntimeout_seconds = 0").unwrap();
		assert!(matches!(
			schema().validate(&config),
			Err(ValidationError::InvalidValue { .. })
		));
	}

	#[test]
	fn test_valid_config() {
		let config: toml::Value =
			toml::from_str("key_id = \"rzp\"\ntimeout_seconds = 30").unwrap();
		assert!(schema().validate(&config).is_ok());
	}
}
