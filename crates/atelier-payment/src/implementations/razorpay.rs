//! Razorpay gateway implementation.
//!
//! Creates payment intents through the Razorpay Orders API (basic auth
//! with the key id/secret pair) and verifies callbacks against the key
//! secret. Amounts are already in paise, which is also Razorpay's unit.

use crate::{verify_callback_signature, GatewayInterface, PaymentError};
use async_trait::async_trait;
use atelier_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, Paise, PaymentCallback,
	PaymentIntent, Schema, SecretString, ValidationError,
};
use serde::Deserialize;
use tracing::instrument;

const DEFAULT_BASE_URL: &str = "https://api.razorpay.com";

/// Response shape of the Razorpay order-create endpoint, reduced to the
/// fields the core consumes.
#[derive(Debug, Deserialize)]
struct RazorpayOrderResponse {
	id: String,
	amount: u64,
	currency: String,
}

/// Payment gateway implementation backed by the Razorpay HTTP API.
pub struct RazorpayGateway {
	key_id: String,
	key_secret: SecretString,
	base_url: String,
	client: reqwest::Client,
}

impl RazorpayGateway {
	pub fn new(key_id: String, key_secret: SecretString, base_url: String) -> Self {
		Self {
			key_id,
			key_secret,
			base_url,
			client: reqwest::Client::new(),
		}
	}
}

#[async_trait]
impl GatewayInterface for RazorpayGateway {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(RazorpaySchema)
	}

	#[instrument(skip_all, fields(receipt = %receipt, amount = amount))]
	async fn create_intent(
		&self,
		amount: Paise,
		currency: &str,
		receipt: &str,
	) -> Result<PaymentIntent, PaymentError> {
		let url = format!("{}/v1/orders", self.base_url);
		let body = serde_json::json!({
			"amount": amount,
			"currency": currency,
			"receipt": receipt,
		});

		let response = self
			.key_secret
			.with_exposed(|secret| {
				self.client
					.post(&url)
					.basic_auth(&self.key_id, Some(secret))
					.json(&body)
					.send()
			})
			.await
			.map_err(|e| PaymentError::Gateway(e.to_string()))?;

		if !response.status().is_success() {
			return Err(PaymentError::Gateway(format!(
				"order create returned {}",
				response.status()
			)));
		}

		let order: RazorpayOrderResponse = response
			.json()
			.await
			.map_err(|e| PaymentError::Gateway(e.to_string()))?;

		Ok(PaymentIntent {
			gateway_order_id: order.id,
			amount: order.amount,
			currency: order.currency,
		})
	}

	fn verify_callback(&self, callback: &PaymentCallback) -> Result<(), PaymentError> {
		verify_callback_signature(&self.key_secret, callback)
	}
}

/// Configuration schema for RazorpayGateway.
pub struct RazorpaySchema;

impl ConfigSchema for RazorpaySchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(
			vec![
				Field::new("key_id", FieldType::String),
				Field::new("key_secret", FieldType::String),
			],
			vec![Field::new("base_url", FieldType::String)],
		)
		.validate(config)
	}
}

/// Registry for the Razorpay gateway implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "razorpay";
	type Factory = crate::GatewayFactory;

	fn factory() -> Self::Factory {
		create_gateway
	}
}

impl crate::GatewayRegistry for Registry {}

/// Factory function to create a Razorpay gateway from configuration.
///
/// Configuration parameters:
/// - `key_id`: Razorpay API key id
/// - `key_secret`: Razorpay API key secret (signs callbacks)
/// - `base_url`: API base URL (default: "https://api.razorpay.com")
pub fn create_gateway(config: &toml::Value) -> Result<Box<dyn GatewayInterface>, PaymentError> {
	RazorpaySchema
		.validate(config)
		.map_err(|e| PaymentError::Configuration(e.to_string()))?;

	let key_id = config
		.get("key_id")
		.and_then(|v| v.as_str())
		.ok_or_else(|| PaymentError::Configuration("key_id is required".into()))?
		.to_string();
	let key_secret = config
		.get("key_secret")
		.and_then(|v| v.as_str())
		.ok_or_else(|| PaymentError::Configuration("key_secret is required".into()))?;
	let base_url = config
		.get("base_url")
		.and_then(|v| v.as_str())
		.unwrap_or(DEFAULT_BASE_URL)
		.trim_end_matches('/')
		.to_string();

	Ok(Box::new(RazorpayGateway::new(
		key_id,
		SecretString::from(key_secret),
		base_url,
	)))
}
