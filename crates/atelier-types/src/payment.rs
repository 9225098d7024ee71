//! Payment gateway boundary types.
//!
//! The fulfillment core talks to the payment gateway through two contracts:
//! creating a remote payment intent for an amount, and verifying the
//! `(gateway_order_id, gateway_payment_id, signature)` callback the gateway
//! delivers once the customer has paid.

use serde::{Deserialize, Serialize};

use crate::Paise;

/// A payment intent created at the gateway for a checkout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentIntent {
	/// Gateway-side order reference.
	pub gateway_order_id: String,
	/// Amount in paise the gateway will collect.
	pub amount: Paise,
	/// ISO currency code.
	pub currency: String,
}

/// The callback payload delivered by the gateway after a payment attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentCallback {
	/// Gateway-side order reference the payment belongs to.
	pub gateway_order_id: String,
	/// Gateway-side payment reference; the idempotency key for
	/// verification.
	pub gateway_payment_id: String,
	/// Hex-encoded HMAC-SHA256 signature over
	/// `gateway_order_id + "|" + gateway_payment_id`.
	pub signature: String,
}
