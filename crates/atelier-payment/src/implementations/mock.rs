//! Mock gateway implementation for tests and local development.
//!
//! Creates intents in memory and signs/verifies callbacks with a locally
//! configured secret, so the full payment path can run without network
//! access.

use crate::{sign_callback, verify_callback_signature, GatewayInterface, PaymentError};
use async_trait::async_trait;
use atelier_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, Paise, PaymentCallback,
	PaymentIntent, Schema, SecretString, ValidationError,
};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-memory payment gateway.
pub struct MockGateway {
	secret: SecretString,
	/// gateway_order_id -> amount, for assertions in tests.
	intents: RwLock<HashMap<String, Paise>>,
}

impl MockGateway {
	pub fn new(secret: SecretString) -> Self {
		Self {
			secret,
			intents: RwLock::new(HashMap::new()),
		}
	}

	/// Produces a valid callback for an intent, as the remote gateway
	/// would after a successful payment.
	pub fn successful_callback(&self, gateway_order_id: &str) -> PaymentCallback {
		let gateway_payment_id = format!("pay_{}", Uuid::new_v4().simple());
		PaymentCallback {
			signature: sign_callback(&self.secret, gateway_order_id, &gateway_payment_id),
			gateway_order_id: gateway_order_id.to_string(),
			gateway_payment_id,
		}
	}

	/// Returns the amount recorded for an intent, if one was created.
	pub async fn intent_amount(&self, gateway_order_id: &str) -> Option<Paise> {
		self.intents.read().await.get(gateway_order_id).copied()
	}
}

#[async_trait]
impl GatewayInterface for MockGateway {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MockGatewaySchema)
	}

	async fn create_intent(
		&self,
		amount: Paise,
		currency: &str,
		_receipt: &str,
	) -> Result<PaymentIntent, PaymentError> {
		let gateway_order_id = format!("order_{}", Uuid::new_v4().simple());
		self.intents
			.write()
			.await
			.insert(gateway_order_id.clone(), amount);
		Ok(PaymentIntent {
			gateway_order_id,
			amount,
			currency: currency.to_string(),
		})
	}

	fn verify_callback(&self, callback: &PaymentCallback) -> Result<(), PaymentError> {
		verify_callback_signature(&self.secret, callback)
	}
}

/// Configuration schema for MockGateway.
pub struct MockGatewaySchema;

impl ConfigSchema for MockGatewaySchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![Field::new("secret", FieldType::String)]).validate(config)
	}
}

/// Registry for the mock gateway implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "mock";
	type Factory = crate::GatewayFactory;

	fn factory() -> Self::Factory {
		create_gateway
	}
}

impl crate::GatewayRegistry for Registry {}

/// Factory function to create a mock gateway from configuration.
///
/// Configuration parameters:
/// - `secret`: signing secret (default: "mock-secret")
pub fn create_gateway(config: &toml::Value) -> Result<Box<dyn GatewayInterface>, PaymentError> {
	let secret = config
		.get("secret")
		.and_then(|v| v.as_str())
		.unwrap_or("mock-secret");
	Ok(Box::new(MockGateway::new(SecretString::from(secret))))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_intent_then_callback_verifies() {
		let gateway = MockGateway::new(SecretString::from("s"));
		let intent = gateway.create_intent(150_000, "INR", "TLR-1").await.unwrap();
		assert_eq!(gateway.intent_amount(&intent.gateway_order_id).await, Some(150_000));

		let callback = gateway.successful_callback(&intent.gateway_order_id);
		assert!(gateway.verify_callback(&callback).is_ok());
	}

	#[tokio::test]
	async fn test_foreign_callback_rejected() {
		let gateway = MockGateway::new(SecretString::from("s"));
		let other = MockGateway::new(SecretString::from("t"));
		let intent = gateway.create_intent(1, "INR", "TLR-1").await.unwrap();
		let callback = other.successful_callback(&intent.gateway_order_id);
		assert!(gateway.verify_callback(&callback).is_err());
	}
}
