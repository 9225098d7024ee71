//! Catalog order types including line items, pricing and payment state.
//!
//! An order is created at checkout and carries everything needed for
//! payment verification, worker allocation and lifecycle tracking. Money is
//! represented in integer minor units (paise) throughout; totals are always
//! recomputed server-side and never trusted from a client payload.

use serde::{Deserialize, Serialize};

use crate::{OrderStatus, StatusHistoryEntry};

/// Monetary amount in minor units (paise).
pub type Paise = u64;

/// A single line item on an order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LineItem {
	/// Catalog reference of the product.
	pub product_id: String,
	/// Display name captured at checkout time.
	pub name: String,
	/// Unit price in paise.
	pub unit_price: Paise,
	/// Quantity ordered. Must be at least 1.
	pub quantity: u32,
	/// Optional customization note (measurements, fabric, fit).
	#[serde(skip_serializing_if = "Option::is_none")]
	pub customization: Option<String>,
}

impl LineItem {
	/// Line total in paise, or `None` if it overflows the paise range.
	pub fn line_total(&self) -> Option<Paise> {
		self.unit_price.checked_mul(self.quantity as u64)
	}
}

/// Shipping destination for an order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShippingAddress {
	pub recipient: String,
	pub line1: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub line2: Option<String>,
	pub city: String,
	pub state: String,
	pub postal_code: String,
	pub phone: String,
}

/// Pricing breakdown for an order.
///
/// Invariant: `total == subtotal + delivery_fee + tax`. Constructed only
/// through [`Pricing::compute`], which enforces the invariant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pricing {
	/// Sum of all line totals in paise.
	pub subtotal: Paise,
	/// Flat delivery fee in paise.
	pub delivery_fee: Paise,
	/// Tax in paise.
	pub tax: Paise,
	/// Grand total in paise. Always `subtotal + delivery_fee + tax`.
	pub total: Paise,
}

impl Pricing {
	/// Computes the breakdown from line items and pricing policy.
	///
	/// Tax is derived from the subtotal at `tax_rate_bps` basis points,
	/// rounded down. Whatever total the client submitted is irrelevant
	/// here; the caller stores this recomputed value. Returns `None` when
	/// any amount overflows the paise range; client payloads are not
	/// trusted to stay within it.
	pub fn compute(items: &[LineItem], delivery_fee: Paise, tax_rate_bps: u32) -> Option<Self> {
		let mut subtotal: Paise = 0;
		for item in items {
			subtotal = subtotal.checked_add(item.line_total()?)?;
		}
		let tax = subtotal.checked_mul(tax_rate_bps as u64)? / 10_000;
		let total = subtotal.checked_add(delivery_fee)?.checked_add(tax)?;
		Some(Self {
			subtotal,
			delivery_fee,
			tax,
			total,
		})
	}
}

/// How the customer chose to pay.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
	/// Online payment through the gateway.
	Online,
	/// Cash on delivery; no gateway round-trip.
	CashOnDelivery,
}

/// Payment status attached to an order.
///
/// Moves only `Pending -> Paid` or `Pending -> Failed`, never backward.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
	Pending,
	Paid,
	Failed,
}

/// Payment descriptor attached to an order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentState {
	/// Chosen payment method.
	pub method: PaymentMethod,
	/// Current payment status.
	pub status: PaymentStatus,
	/// Gateway-side order reference, set when a payment intent is created.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub gateway_order_id: Option<String>,
	/// Gateway-side payment reference, set on verified payment.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub gateway_payment_id: Option<String>,
}

impl PaymentState {
	/// A fresh descriptor in the pending state.
	pub fn pending(method: PaymentMethod) -> Self {
		Self {
			method,
			status: PaymentStatus::Pending,
			gateway_order_id: None,
			gateway_payment_id: None,
		}
	}
}

/// A catalog order with its full fulfillment state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
	/// Human-readable identifier, date+sequence based (`TLR-YYYYMMDD-NNNN`).
	pub id: String,
	/// Customer account that placed the order.
	pub customer_id: String,
	/// Ordered line items.
	pub items: Vec<LineItem>,
	/// Shipping destination.
	pub shipping: ShippingAddress,
	/// Server-side recomputed pricing breakdown.
	pub pricing: Pricing,
	/// Payment descriptor.
	pub payment: PaymentState,
	/// Current lifecycle status.
	pub status: OrderStatus,
	/// Worker currently assigned to the order, if any.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub assigned_worker: Option<String>,
	/// Append-only status history. Entries are never mutated or deleted.
	#[serde(default)]
	pub history: Vec<StatusHistoryEntry>,
	/// Unix timestamp (seconds) when this order was created.
	pub created_at: u64,
	/// Unix timestamp (seconds) when this order was last updated.
	pub updated_at: u64,
}

#[cfg(test)]
mod tests {
	use super::*;

	fn item(price: Paise, qty: u32) -> LineItem {
		LineItem {
			product_id: "sku-1".into(),
			name: "Bespoke shirt".into(),
			unit_price: price,
			quantity: qty,
			customization: None,
		}
	}

	#[test]
	fn test_pricing_total_is_sum_of_parts() {
		let pricing = Pricing::compute(&[item(50_000, 2), item(120_000, 1)], 5_000, 500).unwrap();
		assert_eq!(pricing.subtotal, 220_000);
		assert_eq!(pricing.tax, 11_000); // 5% of subtotal
		assert_eq!(pricing.delivery_fee, 5_000);
		assert_eq!(
			pricing.total,
			pricing.subtotal + pricing.delivery_fee + pricing.tax
		);
	}

	#[test]
	fn test_pricing_zero_items() {
		let pricing = Pricing::compute(&[], 5_000, 500).unwrap();
		assert_eq!(pricing.subtotal, 0);
		assert_eq!(pricing.tax, 0);
		assert_eq!(pricing.total, 5_000);
	}

	#[test]
	fn test_overflowing_line_total_is_rejected() {
		assert_eq!(item(u64::MAX / 2 + 1, 2).line_total(), None);
		assert!(Pricing::compute(&[item(u64::MAX / 2 + 1, 2)], 5_000, 500).is_none());
	}

	#[test]
	fn test_overflowing_subtotal_is_rejected() {
		// Each line fits on its own; the sum does not.
		assert!(Pricing::compute(&[item(u64::MAX, 1), item(1, 1)], 0, 0).is_none());
		// The bps scaling must not overflow either.
		assert!(Pricing::compute(&[item(u64::MAX / 100, 1)], 0, 500).is_none());
	}
}
