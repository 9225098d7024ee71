//! Order state machine implementation.
//!
//! Validates lifecycle transitions against the shared transition table and
//! applies them atomically. Every mutation runs as a read-validate-swap loop
//! over the stored order bytes, so two concurrent transitions on the same
//! order resolve to exactly one winner; the loser re-reads and re-validates
//! against the new status.

use crate::FulfillmentError;
use atelier_storage::{StorageError, StorageService};
use atelier_types::{
	is_valid_transition, Actor, ModularOrder, Order, OrderStatus, Role, StatusHistoryEntry,
	StorageKey,
};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Upper bound on read-validate-swap retries before giving up.
const MAX_CAS_RETRIES: usize = 16;

pub(crate) fn unix_now() -> Result<u64, FulfillmentError> {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| d.as_secs())
		.map_err(|e| FulfillmentError::Storage(format!("Time error: {}", e)))
}

/// Manages order state transitions and persistence.
pub struct OrderStateMachine {
	storage: Arc<StorageService>,
}

impl OrderStateMachine {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	/// Stores a newly created order. The id must not already exist.
	pub async fn store_order(&self, order: &Order) -> Result<(), FulfillmentError> {
		let created = self
			.storage
			.swap_create(StorageKey::Orders.as_str(), &order.id, order)
			.await
			.map_err(|e| FulfillmentError::Storage(e.to_string()))?;
		if !created {
			return Err(FulfillmentError::Storage(format!(
				"Order id collision: {}",
				order.id
			)));
		}
		Ok(())
	}

	/// Gets an order by id.
	pub async fn get_order(&self, order_id: &str) -> Result<Order, FulfillmentError> {
		self.storage
			.retrieve(StorageKey::Orders.as_str(), order_id)
			.await
			.map_err(|e| match e {
				StorageError::NotFound => FulfillmentError::NotFound(order_id.to_string()),
				other => FulfillmentError::Storage(other.to_string()),
			})
	}

	/// Stores a newly created modular order. The id must not already exist.
	pub async fn store_modular_order(&self, order: &ModularOrder) -> Result<(), FulfillmentError> {
		let created = self
			.storage
			.swap_create(StorageKey::ModularOrders.as_str(), &order.id, order)
			.await
			.map_err(|e| FulfillmentError::Storage(e.to_string()))?;
		if !created {
			return Err(FulfillmentError::Storage(format!(
				"Order id collision: {}",
				order.id
			)));
		}
		Ok(())
	}

	/// Gets a modular order by id.
	pub async fn get_modular_order(&self, order_id: &str) -> Result<ModularOrder, FulfillmentError> {
		self.storage
			.retrieve(StorageKey::ModularOrders.as_str(), order_id)
			.await
			.map_err(|e| match e {
				StorageError::NotFound => FulfillmentError::NotFound(order_id.to_string()),
				other => FulfillmentError::Storage(other.to_string()),
			})
	}

	/// Transitions an order to a new status.
	///
	/// Returns the updated order together with the status it left.
	pub async fn transition(
		&self,
		order_id: &str,
		new_status: OrderStatus,
		actor: &Actor,
		note: Option<String>,
	) -> Result<(Order, OrderStatus), FulfillmentError> {
		self.transition_with(order_id, new_status, actor, note, |_| {})
			.await
	}

	/// Transitions an order to a new status, applying an extra mutation in
	/// the same atomic swap.
	///
	/// The mutation runs after the status change on every retry, so it must
	/// be idempotent with respect to the order it receives. Used to set the
	/// assigned worker together with the move to `Assigned`.
	pub async fn transition_with<F>(
		&self,
		order_id: &str,
		new_status: OrderStatus,
		actor: &Actor,
		note: Option<String>,
		apply: F,
	) -> Result<(Order, OrderStatus), FulfillmentError>
	where
		F: Fn(&mut Order),
	{
		for _ in 0..MAX_CAS_RETRIES {
			let (order, snapshot): (Order, Vec<u8>) = self
				.storage
				.retrieve_versioned(StorageKey::Orders.as_str(), order_id)
				.await
				.map_err(|e| match e {
					StorageError::NotFound => FulfillmentError::NotFound(order_id.to_string()),
					other => FulfillmentError::Storage(other.to_string()),
				})?;

			let from = order.status;
			if !is_valid_transition(&from, &new_status) {
				return Err(FulfillmentError::Conflict {
					from,
					to: new_status,
				});
			}
			Self::authorize(&order, new_status, actor)?;

			let mut updated = order;
			updated.status = new_status;
			apply(&mut updated);
			updated.updated_at = unix_now()?;
			updated.history.push(StatusHistoryEntry {
				status: new_status,
				timestamp: updated.updated_at,
				note: note.clone(),
				actor_id: actor.id.clone(),
			});

			let swapped = self
				.storage
				.swap(StorageKey::Orders.as_str(), order_id, &snapshot, &updated)
				.await
				.map_err(|e| FulfillmentError::Storage(e.to_string()))?;
			if swapped {
				return Ok((updated, from));
			}
		}
		Err(FulfillmentError::Storage(format!(
			"Persistent contention on order {}",
			order_id
		)))
	}

	/// Transitions a modular order to a new status. Admin only; modular
	/// orders carry no worker assignment to delegate authority to.
	pub async fn transition_modular(
		&self,
		order_id: &str,
		new_status: OrderStatus,
		actor: &Actor,
		note: Option<String>,
	) -> Result<(ModularOrder, OrderStatus), FulfillmentError> {
		if !actor.is_admin() {
			return Err(FulfillmentError::Forbidden(format!(
				"{} may not update modular orders",
				actor
			)));
		}

		for _ in 0..MAX_CAS_RETRIES {
			let (order, snapshot): (ModularOrder, Vec<u8>) = self
				.storage
				.retrieve_versioned(StorageKey::ModularOrders.as_str(), order_id)
				.await
				.map_err(|e| match e {
					StorageError::NotFound => FulfillmentError::NotFound(order_id.to_string()),
					other => FulfillmentError::Storage(other.to_string()),
				})?;

			let from = order.status;
			if !is_valid_transition(&from, &new_status) {
				return Err(FulfillmentError::Conflict {
					from,
					to: new_status,
				});
			}

			let mut updated = order;
			updated.status = new_status;
			updated.updated_at = unix_now()?;
			updated.history.push(StatusHistoryEntry {
				status: new_status,
				timestamp: updated.updated_at,
				note: note.clone(),
				actor_id: actor.id.clone(),
			});

			let swapped = self
				.storage
				.swap(
					StorageKey::ModularOrders.as_str(),
					order_id,
					&snapshot,
					&updated,
				)
				.await
				.map_err(|e| FulfillmentError::Storage(e.to_string()))?;
			if swapped {
				return Ok((updated, from));
			}
		}
		Err(FulfillmentError::Storage(format!(
			"Persistent contention on order {}",
			order_id
		)))
	}

	/// Atomically mutates an order without a status change.
	///
	/// The mutator may reject the current state by returning an error, which
	/// aborts without writing. Used for payment-state updates that must only
	/// apply while the payment is still pending.
	pub async fn update_order_checked<F>(
		&self,
		order_id: &str,
		mutate: F,
	) -> Result<Order, FulfillmentError>
	where
		F: Fn(&mut Order) -> Result<(), FulfillmentError>,
	{
		for _ in 0..MAX_CAS_RETRIES {
			let (order, snapshot): (Order, Vec<u8>) = self
				.storage
				.retrieve_versioned(StorageKey::Orders.as_str(), order_id)
				.await
				.map_err(|e| match e {
					StorageError::NotFound => FulfillmentError::NotFound(order_id.to_string()),
					other => FulfillmentError::Storage(other.to_string()),
				})?;

			let mut updated = order;
			mutate(&mut updated)?;
			updated.updated_at = unix_now()?;

			let swapped = self
				.storage
				.swap(StorageKey::Orders.as_str(), order_id, &snapshot, &updated)
				.await
				.map_err(|e| FulfillmentError::Storage(e.to_string()))?;
			if swapped {
				return Ok(updated);
			}
		}
		Err(FulfillmentError::Storage(format!(
			"Persistent contention on order {}",
			order_id
		)))
	}

	/// Checks whether the actor may move the order to the new status.
	///
	/// Admins (and the system actor) may apply any transition the table
	/// allows. A tailor may only start or complete production on an order
	/// assigned to them. Customers have no transition authority.
	fn authorize(
		order: &Order,
		new_status: OrderStatus,
		actor: &Actor,
	) -> Result<(), FulfillmentError> {
		if actor.is_admin() {
			return Ok(());
		}
		match actor.role {
			Role::Tailor => {
				let assigned = order.assigned_worker.as_deref() == Some(actor.id.as_str());
				let allowed = matches!(
					new_status,
					OrderStatus::InProgress | OrderStatus::Completed
				);
				if assigned && allowed {
					Ok(())
				} else {
					Err(FulfillmentError::Forbidden(format!(
						"{} may not move order {} to {}",
						actor, order.id, new_status
					)))
				}
			}
			Role::Customer => Err(FulfillmentError::Forbidden(format!(
				"{} may not update orders",
				actor
			))),
			// is_admin() handled above
			Role::Admin => Ok(()),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use atelier_storage::implementations::memory::MemoryStorage;
	use atelier_types::{
		LineItem, PaymentMethod, PaymentState, Pricing, Role, ShippingAddress,
	};

	fn machine() -> OrderStateMachine {
		OrderStateMachine::new(Arc::new(StorageService::new(Box::new(MemoryStorage::new()))))
	}

	fn test_order(id: &str, status: OrderStatus) -> Order {
		let items = vec![LineItem {
			product_id: "sku-1".into(),
			name: "Bespoke shirt".into(),
			unit_price: 150_000,
			quantity: 1,
			customization: None,
		}];
		Order {
			id: id.to_string(),
			customer_id: "cust-1".into(),
			pricing: Pricing::compute(&items, 5_000, 500).unwrap(),
			items,
			shipping: ShippingAddress {
				recipient: "R".into(),
				line1: "1 Lane".into(),
				line2: None,
				city: "Pune".into(),
				state: "MH".into(),
				postal_code: "411001".into(),
				phone: "999".into(),
			},
			payment: PaymentState::pending(PaymentMethod::Online),
			status,
			assigned_worker: None,
			history: vec![StatusHistoryEntry {
				status: OrderStatus::Placed,
				timestamp: 1,
				note: None,
				actor_id: "cust-1".into(),
			}],
			created_at: 1,
			updated_at: 1,
		}
	}

	#[tokio::test]
	async fn test_transition_appends_history() {
		let machine = machine();
		machine
			.store_order(&test_order("o1", OrderStatus::Placed))
			.await
			.unwrap();

		let (order, from) = machine
			.transition(
				"o1",
				OrderStatus::Confirmed,
				&Actor::new("admin-1", Role::Admin),
				Some("paid".into()),
			)
			.await
			.unwrap();
		assert_eq!(from, OrderStatus::Placed);
		assert_eq!(order.status, OrderStatus::Confirmed);
		assert_eq!(order.history.len(), 2);
		assert_eq!(order.history[1].actor_id, "admin-1");
		assert_eq!(order.history[1].note.as_deref(), Some("paid"));
	}

	#[tokio::test]
	async fn test_invalid_transition_is_conflict() {
		let machine = machine();
		machine
			.store_order(&test_order("o1", OrderStatus::Placed))
			.await
			.unwrap();

		let err = machine
			.transition(
				"o1",
				OrderStatus::Delivered,
				&Actor::system(),
				None,
			)
			.await
			.unwrap_err();
		assert!(matches!(
			err,
			FulfillmentError::Conflict {
				from: OrderStatus::Placed,
				to: OrderStatus::Delivered,
			}
		));
	}

	#[tokio::test]
	async fn test_unknown_order_is_not_found() {
		let machine = machine();
		let err = machine
			.transition("missing", OrderStatus::Confirmed, &Actor::system(), None)
			.await
			.unwrap_err();
		assert!(matches!(err, FulfillmentError::NotFound(_)));
	}

	#[tokio::test]
	async fn test_tailor_may_only_progress_own_assignment() {
		let machine = machine();
		let mut order = test_order("o1", OrderStatus::Assigned);
		order.assigned_worker = Some("w1".into());
		machine.store_order(&order).await.unwrap();

		// A different tailor is rejected.
		let err = machine
			.transition(
				"o1",
				OrderStatus::InProgress,
				&Actor::new("w2", Role::Tailor),
				None,
			)
			.await
			.unwrap_err();
		assert!(matches!(err, FulfillmentError::Forbidden(_)));

		// The assigned tailor may start production but not cancel.
		let err = machine
			.transition(
				"o1",
				OrderStatus::Cancelled,
				&Actor::new("w1", Role::Tailor),
				None,
			)
			.await
			.unwrap_err();
		assert!(matches!(err, FulfillmentError::Forbidden(_)));

		let (order, _) = machine
			.transition(
				"o1",
				OrderStatus::InProgress,
				&Actor::new("w1", Role::Tailor),
				None,
			)
			.await
			.unwrap();
		assert_eq!(order.status, OrderStatus::InProgress);
	}

	#[tokio::test]
	async fn test_customer_has_no_transition_authority() {
		let machine = machine();
		machine
			.store_order(&test_order("o1", OrderStatus::Placed))
			.await
			.unwrap();

		let err = machine
			.transition(
				"o1",
				OrderStatus::Cancelled,
				&Actor::new("cust-1", Role::Customer),
				None,
			)
			.await
			.unwrap_err();
		assert!(matches!(err, FulfillmentError::Forbidden(_)));
	}

	#[tokio::test]
	async fn test_concurrent_transitions_have_one_winner() {
		let machine = Arc::new(machine());
		machine
			.store_order(&test_order("o1", OrderStatus::Placed))
			.await
			.unwrap();

		let a = {
			let machine = machine.clone();
			tokio::spawn(async move {
				machine
					.transition("o1", OrderStatus::Confirmed, &Actor::system(), None)
					.await
			})
		};
		let b = {
			let machine = machine.clone();
			tokio::spawn(async move {
				machine
					.transition("o1", OrderStatus::Confirmed, &Actor::system(), None)
					.await
			})
		};

		let results = [a.await.unwrap(), b.await.unwrap()];
		let wins = results.iter().filter(|r| r.is_ok()).count();
		// The loser re-reads Confirmed, and self-transitions are rejected.
		assert_eq!(wins, 1);
		assert!(results
			.iter()
			.any(|r| matches!(r, Err(FulfillmentError::Conflict { .. }))));

		let order = machine.get_order("o1").await.unwrap();
		assert_eq!(order.history.len(), 2);
	}

	#[tokio::test]
	async fn test_update_checked_rejects_without_writing() {
		let machine = machine();
		machine
			.store_order(&test_order("o1", OrderStatus::Placed))
			.await
			.unwrap();

		let err = machine
			.update_order_checked("o1", |_| {
				Err(FulfillmentError::Validation("no".into()))
			})
			.await
			.unwrap_err();
		assert!(matches!(err, FulfillmentError::Validation(_)));

		let order = machine.get_order("o1").await.unwrap();
		assert_eq!(order.updated_at, 1);
	}

	#[tokio::test]
	async fn test_modular_transition_is_admin_only() {
		let machine = machine();
		let order = ModularOrder {
			id: "m1".into(),
			customer: atelier_types::CustomerContact {
				name: "G".into(),
				phone: "999".into(),
				email: None,
				address: "1 Lane".into(),
			},
			selections: Default::default(),
			base_price: 200_000,
			total_price: 200_000,
			status: OrderStatus::Placed,
			history: vec![],
			created_at: 1,
			updated_at: 1,
		};
		machine.store_modular_order(&order).await.unwrap();

		let err = machine
			.transition_modular(
				"m1",
				OrderStatus::Confirmed,
				&Actor::new("w1", Role::Tailor),
				None,
			)
			.await
			.unwrap_err();
		assert!(matches!(err, FulfillmentError::Forbidden(_)));

		let (order, from) = machine
			.transition_modular("m1", OrderStatus::Confirmed, &Actor::system(), None)
			.await
			.unwrap();
		assert_eq!(from, OrderStatus::Placed);
		assert_eq!(order.status, OrderStatus::Confirmed);
		assert_eq!(order.history.len(), 1);
	}
}
