//! Payment gateway module for the atelier fulfillment system.
//!
//! This module owns the two contracts the core has with the payment
//! gateway: creating a remote payment intent for a checkout amount, and
//! verifying the signed callback the gateway delivers after a payment
//! attempt. Verification is a local HMAC-SHA256 check; the gateway signs
//! `gateway_order_id + "|" + gateway_payment_id` with the shared key
//! secret.

use async_trait::async_trait;
use atelier_types::{
	ConfigSchema, ImplementationRegistry, Paise, PaymentCallback, PaymentIntent, SecretString,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod mock;
	pub mod razorpay;
}

type HmacSha256 = Hmac<Sha256>;

/// Errors that can occur during payment operations.
#[derive(Debug, Error)]
pub enum PaymentError {
	/// The callback signature does not match the recomputed HMAC.
	#[error("Signature mismatch")]
	SignatureMismatch,
	/// The gateway rejected or failed a remote call.
	#[error("Gateway error: {0}")]
	Gateway(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Computes the hex-encoded callback signature for the given references.
///
/// Exposed so the mock gateway and tests can produce valid callbacks; the
/// real gateway computes this on its side.
pub fn sign_callback(secret: &SecretString, gateway_order_id: &str, gateway_payment_id: &str) -> String {
	let payload = format!("{}|{}", gateway_order_id, gateway_payment_id);
	let tag = secret.with_exposed(|key| {
		let mut mac = HmacSha256::new_from_slice(key.as_bytes())
			.expect("HMAC accepts keys of any length");
		mac.update(payload.as_bytes());
		mac.finalize().into_bytes()
	});
	hex::encode(tag)
}

/// Verifies a callback signature against the shared secret.
///
/// The comparison runs in constant time via `Mac::verify_slice`. A
/// malformed (non-hex) signature fails the same way as a wrong one.
pub fn verify_callback_signature(
	secret: &SecretString,
	callback: &PaymentCallback,
) -> Result<(), PaymentError> {
	let provided = hex::decode(&callback.signature)
		.map_err(|_| PaymentError::SignatureMismatch)?;
	let payload = format!(
		"{}|{}",
		callback.gateway_order_id, callback.gateway_payment_id
	);
	secret.with_exposed(|key| {
		let mut mac = HmacSha256::new_from_slice(key.as_bytes())
			.expect("HMAC accepts keys of any length");
		mac.update(payload.as_bytes());
		mac.verify_slice(&provided)
			.map_err(|_| PaymentError::SignatureMismatch)
	})
}

/// Trait defining the interface for payment gateway implementations.
#[async_trait]
pub trait GatewayInterface: Send + Sync {
	/// Returns the configuration schema for this gateway implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Creates a payment intent at the gateway for the given amount.
	///
	/// `receipt` is the fulfillment-side order id, recorded at the gateway
	/// for reconciliation.
	async fn create_intent(
		&self,
		amount: Paise,
		currency: &str,
		receipt: &str,
	) -> Result<PaymentIntent, PaymentError>;

	/// Verifies a payment callback signature.
	///
	/// A mismatch is terminal for this verification attempt but mutates
	/// nothing; the caller decides what a failure means for the order.
	fn verify_callback(&self, callback: &PaymentCallback) -> Result<(), PaymentError>;
}

/// Type alias for gateway factory functions.
pub type GatewayFactory = fn(&toml::Value) -> Result<Box<dyn GatewayInterface>, PaymentError>;

/// Registry trait for gateway implementations.
pub trait GatewayRegistry: ImplementationRegistry<Factory = GatewayFactory> {}

/// Get all registered gateway implementations.
pub fn get_all_implementations() -> Vec<(&'static str, GatewayFactory)> {
	use implementations::{mock, razorpay};

	vec![
		(razorpay::Registry::NAME, razorpay::Registry::factory()),
		(mock::Registry::NAME, mock::Registry::factory()),
	]
}

/// Service that fronts the configured gateway implementation.
pub struct PaymentService {
	gateway: Box<dyn GatewayInterface>,
}

impl PaymentService {
	/// Creates a new PaymentService with the specified gateway.
	pub fn new(gateway: Box<dyn GatewayInterface>) -> Self {
		Self { gateway }
	}

	/// Creates a payment intent at the gateway.
	pub async fn create_intent(
		&self,
		amount: Paise,
		currency: &str,
		receipt: &str,
	) -> Result<PaymentIntent, PaymentError> {
		self.gateway.create_intent(amount, currency, receipt).await
	}

	/// Verifies a payment callback signature.
	pub fn verify_callback(&self, callback: &PaymentCallback) -> Result<(), PaymentError> {
		self.gateway.verify_callback(callback)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn callback(secret: &SecretString) -> PaymentCallback {
		PaymentCallback {
			gateway_order_id: "order_abc".into(),
			gateway_payment_id: "pay_def".into(),
			signature: sign_callback(secret, "order_abc", "pay_def"),
		}
	}

	#[test]
	fn test_signature_roundtrip() {
		let secret = SecretString::from("test-secret");
		assert!(verify_callback_signature(&secret, &callback(&secret)).is_ok());
	}

	#[test]
	fn test_wrong_secret_rejected() {
		let secret = SecretString::from("test-secret");
		let other = SecretString::from("other-secret");
		assert!(matches!(
			verify_callback_signature(&other, &callback(&secret)),
			Err(PaymentError::SignatureMismatch)
		));
	}

	#[test]
	fn test_tampered_payment_id_rejected() {
		let secret = SecretString::from("test-secret");
		let mut cb = callback(&secret);
		cb.gateway_payment_id = "pay_xyz".into();
		assert!(matches!(
			verify_callback_signature(&secret, &cb),
			Err(PaymentError::SignatureMismatch)
		));
	}

	#[test]
	fn test_malformed_signature_rejected() {
		let secret = SecretString::from("test-secret");
		let mut cb = callback(&secret);
		cb.signature = "not-hex".into();
		assert!(matches!(
			verify_callback_signature(&secret, &cb),
			Err(PaymentError::SignatureMismatch)
		));
	}
}
