//! Storage-related types for the fulfillment system.

use std::str::FromStr;

/// Storage keys for different data collections.
///
/// This enum provides type safety for storage operations by replacing
/// string literals with strongly typed variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Key for storing catalog order data.
	Orders,
	/// Key for storing modular order data.
	ModularOrders,
	/// Key for storing worker records.
	Workers,
	/// Key for mapping gateway order ids back to order ids, written when a
	/// payment intent is created.
	OrdersByGatewayRef,
	/// Key for mapping gateway payment ids to order ids. First writer wins;
	/// this namespace is the payment idempotency guard.
	PaymentsByGatewayRef,
	/// Key for monotonic counters (per-day order sequence).
	Counters,
}

impl StorageKey {
	/// Returns the string representation of the storage key.
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::Orders => "orders",
			StorageKey::ModularOrders => "modular_orders",
			StorageKey::Workers => "workers",
			StorageKey::OrdersByGatewayRef => "orders_by_gateway_ref",
			StorageKey::PaymentsByGatewayRef => "payments_by_gateway_ref",
			StorageKey::Counters => "counters",
		}
	}

	/// Returns an iterator over all StorageKey variants.
	pub fn all() -> impl Iterator<Item = Self> {
		[
			Self::Orders,
			Self::ModularOrders,
			Self::Workers,
			Self::OrdersByGatewayRef,
			Self::PaymentsByGatewayRef,
			Self::Counters,
		]
		.into_iter()
	}
}

impl FromStr for StorageKey {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"orders" => Ok(Self::Orders),
			"modular_orders" => Ok(Self::ModularOrders),
			"workers" => Ok(Self::Workers),
			"orders_by_gateway_ref" => Ok(Self::OrdersByGatewayRef),
			"payments_by_gateway_ref" => Ok(Self::PaymentsByGatewayRef),
			"counters" => Ok(Self::Counters),
			_ => Err(()),
		}
	}
}

impl From<StorageKey> for &'static str {
	fn from(key: StorageKey) -> Self {
		key.as_str()
	}
}
