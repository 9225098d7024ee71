//! Configuration module for the atelier fulfillment system.
//!
//! This module provides structures and utilities for managing service
//! configuration. It supports loading configuration from TOML files and
//! validates that every section referencing a pluggable implementation
//! points at one that is actually configured.

use atelier_types::Worker;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Extract just the message without the huge input dump
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure for the fulfillment service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Configuration specific to this service instance.
	pub service: ServiceConfig,
	/// Configuration for the storage backend.
	pub storage: StorageConfig,
	/// Configuration for the worker directory.
	pub directory: DirectoryConfig,
	/// Configuration for worker allocation.
	pub allocation: AllocationConfig,
	/// Configuration for the payment gateway.
	pub payment: PaymentConfig,
	/// Pricing policy applied at checkout.
	pub pricing: PricingConfig,
}

/// Configuration specific to this service instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
	/// Unique identifier for this service instance.
	pub id: String,
}

/// Configuration for the storage backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
	/// Interval in seconds for cleaning up expired storage entries.
	#[serde(default = "default_cleanup_interval_seconds")]
	pub cleanup_interval_seconds: u64,
}

fn default_cleanup_interval_seconds() -> u64 {
	3600
}

/// Configuration for the worker directory.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DirectoryConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of directory implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
	/// Workers to seed into the roster at startup. Existing workload
	/// counters are preserved for workers already present.
	#[serde(default)]
	pub seed: Vec<Worker>,
}

/// Configuration for worker allocation.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AllocationConfig {
	/// Which strategy implementation to use as primary.
	pub primary: String,
	/// Map of strategy implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for the payment gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PaymentConfig {
	/// Which gateway implementation to use as primary.
	pub primary: String,
	/// Map of gateway implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
	/// ISO currency code used for payment intents.
	#[serde(default = "default_currency")]
	pub currency: String,
}

fn default_currency() -> String {
	"INR".to_string()
}

/// Pricing policy applied at checkout.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PricingConfig {
	/// Flat delivery fee in paise.
	pub delivery_fee_paise: u64,
	/// Tax rate in basis points applied to the subtotal.
	pub tax_rate_bps: u32,
}

impl Config {
	/// Parses a configuration from a TOML string and validates it.
	pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
		let config: Config = toml::from_str(raw)?;
		config.validate()?;
		Ok(config)
	}

	/// Loads and validates a configuration file.
	pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let raw = std::fs::read_to_string(path)?;
		Self::from_toml_str(&raw)
	}

	/// Loads and validates a configuration file without blocking the
	/// runtime.
	pub async fn from_file_async(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let raw = tokio::fs::read_to_string(path.as_ref()).await?;
		Self::from_toml_str(&raw)
	}

	/// Semantic validation beyond what serde enforces.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.service.id.is_empty() {
			return Err(ConfigError::Validation("service.id must not be empty".into()));
		}

		check_primary("storage", &self.storage.primary, &self.storage.implementations)?;
		check_primary(
			"directory",
			&self.directory.primary,
			&self.directory.implementations,
		)?;
		check_primary(
			"allocation",
			&self.allocation.primary,
			&self.allocation.implementations,
		)?;
		check_primary("payment", &self.payment.primary, &self.payment.implementations)?;

		if self.pricing.tax_rate_bps >= 10_000 {
			return Err(ConfigError::Validation(
				"pricing.tax_rate_bps must be below 10000".into(),
			));
		}

		for worker in &self.directory.seed {
			if worker.max_capacity == 0 {
				return Err(ConfigError::Validation(format!(
					"seed worker '{}' has zero capacity",
					worker.id
				)));
			}
		}

		Ok(())
	}
}

fn check_primary(
	section: &str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
) -> Result<(), ConfigError> {
	if !implementations.contains_key(primary) {
		return Err(ConfigError::Validation(format!(
			"{}.primary '{}' is not among configured implementations",
			section, primary
		)));
	}
	Ok(())
}
