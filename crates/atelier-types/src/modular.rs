//! Modular (design-your-own) order types.
//!
//! A modular order is composed from selectable design-element categories
//! rather than a single catalog SKU, and is placed by a guest customer
//! identified only by contact details. It shares the catalog order's
//! lifecycle status vocabulary.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{OrderStatus, Paise, StatusHistoryEntry};

/// Contact details of the (not necessarily authenticated) customer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CustomerContact {
	pub name: String,
	pub phone: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub email: Option<String>,
	pub address: String,
}

/// A selected design element within a category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DesignElement {
	/// Display name of the element (e.g. "Mandarin collar").
	pub name: String,
	/// Price of the element in paise.
	pub price: Paise,
}

/// An order composed from per-category design selections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModularOrder {
	/// Human-readable identifier, same scheme as catalog orders.
	pub id: String,
	/// Customer contact captured at submission.
	pub customer: CustomerContact,
	/// Category name -> selected design element. BTreeMap keeps the
	/// serialized form stable across runs.
	pub selections: BTreeMap<String, DesignElement>,
	/// Base price of the garment in paise.
	pub base_price: Paise,
	/// Total price in paise. Always `base_price + sum of selection prices`,
	/// recomputed server-side at submission.
	pub total_price: Paise,
	/// Current lifecycle status.
	pub status: OrderStatus,
	/// Append-only status history.
	#[serde(default)]
	pub history: Vec<StatusHistoryEntry>,
	/// Unix timestamp (seconds) when this order was created.
	pub created_at: u64,
	/// Unix timestamp (seconds) when this order was last updated.
	pub updated_at: u64,
}

/// Computes the total price of a modular design, or `None` if it overflows
/// the paise range.
pub fn modular_total(
	base_price: Paise,
	selections: &BTreeMap<String, DesignElement>,
) -> Option<Paise> {
	selections
		.values()
		.try_fold(base_price, |total, element| total.checked_add(element.price))
}
