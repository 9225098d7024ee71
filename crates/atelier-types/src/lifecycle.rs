//! Order lifecycle statuses and the transition table.
//!
//! This module is the single source of truth for the statuses an order can
//! occupy and the transitions permitted between them. Both catalog orders
//! and modular orders share this vocabulary; there is no per-variant status
//! set and no free-form status strings.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Status of an order in the fulfillment lifecycle.
///
/// The normal progression is Placed -> Confirmed -> Assigned -> InProgress
/// -> Completed -> Shipped -> OutForDelivery -> Delivered. Cancellation is
/// reachable from every non-terminal status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
	/// Order has been created at checkout and awaits payment.
	Placed,
	/// Payment verified but no worker could be assigned yet.
	Confirmed,
	/// A worker has been assigned to the order.
	Assigned,
	/// The assigned worker has started production.
	InProgress,
	/// Production is finished and the order awaits dispatch.
	Completed,
	/// Order has been handed to the courier.
	Shipped,
	/// Order is out for final delivery.
	OutForDelivery,
	/// Order has reached the customer. Terminal.
	Delivered,
	/// Order was cancelled. Terminal.
	Cancelled,
}

impl OrderStatus {
	/// Returns true for statuses that admit no further transitions.
	pub fn is_terminal(&self) -> bool {
		matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
	}
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			OrderStatus::Placed => "placed",
			OrderStatus::Confirmed => "confirmed",
			OrderStatus::Assigned => "assigned",
			OrderStatus::InProgress => "in_progress",
			OrderStatus::Completed => "completed",
			OrderStatus::Shipped => "shipped",
			OrderStatus::OutForDelivery => "out_for_delivery",
			OrderStatus::Delivered => "delivered",
			OrderStatus::Cancelled => "cancelled",
		};
		write!(f, "{}", s)
	}
}

// Static transition table - each status maps to allowed next statuses.
static TRANSITIONS: Lazy<HashMap<OrderStatus, HashSet<OrderStatus>>> = Lazy::new(|| {
	use OrderStatus::*;
	let mut m = HashMap::new();
	m.insert(Placed, HashSet::from([Confirmed, Assigned, Cancelled]));
	m.insert(Confirmed, HashSet::from([Assigned, Cancelled]));
	m.insert(Assigned, HashSet::from([InProgress, Cancelled]));
	m.insert(InProgress, HashSet::from([Completed, Cancelled]));
	m.insert(Completed, HashSet::from([Shipped, Cancelled]));
	m.insert(Shipped, HashSet::from([OutForDelivery, Cancelled]));
	m.insert(OutForDelivery, HashSet::from([Delivered, Cancelled]));
	m.insert(Delivered, HashSet::new()); // terminal
	m.insert(Cancelled, HashSet::new()); // terminal
	m
});

/// Checks whether the transition `from -> to` is listed in the table.
///
/// Any pair not explicitly listed is rejected, including self-transitions.
pub fn is_valid_transition(from: &OrderStatus, to: &OrderStatus) -> bool {
	TRANSITIONS
		.get(from)
		.is_some_and(|allowed| allowed.contains(to))
}

/// Returns an iterator over every status variant.
///
/// Used by tests to exhaustively cover the transition table and by the
/// storage layer to enumerate TTL configuration keys.
pub fn all_statuses() -> impl Iterator<Item = OrderStatus> {
	use OrderStatus::*;
	[
		Placed,
		Confirmed,
		Assigned,
		InProgress,
		Completed,
		Shipped,
		OutForDelivery,
		Delivered,
		Cancelled,
	]
	.into_iter()
}

/// One immutable entry in an order's status history.
///
/// An entry is appended for every accepted transition and never rewritten.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusHistoryEntry {
	/// The status the order entered.
	pub status: OrderStatus,
	/// Unix timestamp (seconds) when the transition was applied.
	pub timestamp: u64,
	/// Optional free-form note supplied by the actor.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub note: Option<String>,
	/// Identifier of the actor that initiated the transition.
	pub actor_id: String,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_normal_progression_is_allowed() {
		use OrderStatus::*;
		let chain = [
			Placed,
			Confirmed,
			Assigned,
			InProgress,
			Completed,
			Shipped,
			OutForDelivery,
			Delivered,
		];
		for pair in chain.windows(2) {
			assert!(
				is_valid_transition(&pair[0], &pair[1]),
				"{} -> {} should be allowed",
				pair[0],
				pair[1]
			);
		}
	}

	#[test]
	fn test_cancellation_from_every_non_terminal() {
		for status in all_statuses() {
			if status.is_terminal() {
				assert!(!is_valid_transition(&status, &OrderStatus::Cancelled));
			} else {
				assert!(
					is_valid_transition(&status, &OrderStatus::Cancelled),
					"{} -> cancelled should be allowed",
					status
				);
			}
		}
	}

	#[test]
	fn test_table_closure() {
		use OrderStatus::*;
		// Everything not explicitly listed is rejected, self-loops included.
		let allowed: HashSet<(OrderStatus, OrderStatus)> = HashSet::from([
			(Placed, Confirmed),
			(Placed, Assigned),
			(Placed, Cancelled),
			(Confirmed, Assigned),
			(Confirmed, Cancelled),
			(Assigned, InProgress),
			(Assigned, Cancelled),
			(InProgress, Completed),
			(InProgress, Cancelled),
			(Completed, Shipped),
			(Completed, Cancelled),
			(Shipped, OutForDelivery),
			(Shipped, Cancelled),
			(OutForDelivery, Delivered),
			(OutForDelivery, Cancelled),
		]);
		for from in all_statuses() {
			for to in all_statuses() {
				assert_eq!(
					is_valid_transition(&from, &to),
					allowed.contains(&(from, to)),
					"table disagrees for {} -> {}",
					from,
					to
				);
			}
		}
	}

	#[test]
	fn test_terminal_statuses_reject_everything() {
		for terminal in [OrderStatus::Delivered, OrderStatus::Cancelled] {
			for to in all_statuses() {
				assert!(!is_valid_transition(&terminal, &to));
			}
		}
	}
}
