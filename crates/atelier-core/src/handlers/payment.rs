//! Payment handler for gateway callbacks.
//!
//! Verifies callback signatures, applies payment results to orders exactly
//! once, and drives worker allocation for freshly paid orders. Duplicate
//! callbacks are absorbed by a first-writer-wins record keyed on the gateway
//! payment id.

use crate::engine::event_bus::EventBus;
use crate::state::OrderStateMachine;
use crate::FulfillmentError;
use atelier_allocation::{AllocationOutcome, AllocationService};
use atelier_directory::DirectoryService;
use atelier_payment::{PaymentError, PaymentService};
use atelier_storage::{StorageError, StorageService};
use atelier_types::{
	Actor, AllocationEvent, FulfillmentEvent, Order, OrderEvent, OrderStatus, PaymentCallback,
	PaymentEvent, PaymentStatus, StorageKey,
};
use std::sync::Arc;
use tracing::instrument;

/// Handler for payment verification and failure callbacks.
pub struct PaymentHandler {
	storage: Arc<StorageService>,
	payment: Arc<PaymentService>,
	directory: Arc<DirectoryService>,
	allocation: Arc<AllocationService>,
	state_machine: Arc<OrderStateMachine>,
	event_bus: EventBus,
}

impl PaymentHandler {
	pub fn new(
		storage: Arc<StorageService>,
		payment: Arc<PaymentService>,
		directory: Arc<DirectoryService>,
		allocation: Arc<AllocationService>,
		state_machine: Arc<OrderStateMachine>,
		event_bus: EventBus,
	) -> Self {
		Self {
			storage,
			payment,
			directory,
			allocation,
			state_machine,
			event_bus,
		}
	}

	/// Handles a successful-payment callback from the gateway.
	///
	/// The sequence is: verify the signature, record the payment id (first
	/// writer wins), mark the order paid, then allocate a worker. A replayed
	/// callback stops at the second step and returns the current order
	/// unchanged.
	#[instrument(skip_all, fields(gateway_order_id = %callback.gateway_order_id))]
	pub async fn handle_callback(
		&self,
		callback: PaymentCallback,
	) -> Result<Order, FulfillmentError> {
		self.payment.verify_callback(&callback).map_err(|e| match e {
			PaymentError::SignatureMismatch => {
				FulfillmentError::Validation("payment callback signature mismatch".into())
			}
			other => FulfillmentError::Gateway(other.to_string()),
		})?;

		let order_id = self.resolve_order(&callback.gateway_order_id).await?;

		let first = self
			.storage
			.store_if_absent(
				StorageKey::PaymentsByGatewayRef.as_str(),
				&callback.gateway_payment_id,
				&order_id,
			)
			.await
			.map_err(|e| FulfillmentError::Storage(e.to_string()))?;
		if !first {
			tracing::info!(order_id = %order_id, "Duplicate payment callback ignored");
			self.event_bus
				.publish(FulfillmentEvent::Payment(PaymentEvent::Duplicate {
					order_id: order_id.clone(),
					gateway_payment_id: callback.gateway_payment_id,
				}))
				.ok();
			return self.state_machine.get_order(&order_id).await;
		}

		let gateway_payment_id = callback.gateway_payment_id.clone();
		let applied = self
			.state_machine
			.update_order_checked(&order_id, |order| {
				if order.payment.status != PaymentStatus::Pending {
					return Err(FulfillmentError::Validation(format!(
						"order {} is not awaiting payment",
						order.id
					)));
				}
				order.payment.status = PaymentStatus::Paid;
				order.payment.gateway_payment_id = Some(gateway_payment_id.clone());
				Ok(())
			})
			.await;
		if let Err(e) = applied {
			// The record must not outlive a failed application, or every
			// retry of this callback would be absorbed as a duplicate while
			// the order never leaves Pending.
			if let Err(remove_err) = self
				.storage
				.remove(
					StorageKey::PaymentsByGatewayRef.as_str(),
					&callback.gateway_payment_id,
				)
				.await
			{
				tracing::error!(
					order_id = %order_id,
					gateway_payment_id = %callback.gateway_payment_id,
					error = %remove_err,
					"Failed to clear payment record after failed application"
				);
			}
			return Err(e);
		}

		tracing::info!(order_id = %order_id, "Payment verified");
		self.event_bus
			.publish(FulfillmentEvent::Payment(PaymentEvent::Verified {
				order_id: order_id.clone(),
				gateway_payment_id: callback.gateway_payment_id,
			}))
			.ok();

		self.allocate_paid_order(&order_id).await
	}

	/// Handles a payment-failure callback from the gateway.
	///
	/// Marks the payment failed and cancels the order as the system actor.
	#[instrument(skip_all, fields(gateway_order_id = %gateway_order_id))]
	pub async fn handle_failure(
		&self,
		gateway_order_id: &str,
		reason: String,
	) -> Result<Order, FulfillmentError> {
		let order_id = self.resolve_order(gateway_order_id).await?;

		self.state_machine
			.update_order_checked(&order_id, |order| {
				if order.payment.status != PaymentStatus::Pending {
					return Err(FulfillmentError::Validation(format!(
						"order {} is not awaiting payment",
						order.id
					)));
				}
				order.payment.status = PaymentStatus::Failed;
				Ok(())
			})
			.await?;

		let (order, from) = self
			.state_machine
			.transition(
				&order_id,
				OrderStatus::Cancelled,
				&Actor::system(),
				Some(format!("payment failed: {}", reason)),
			)
			.await?;

		tracing::warn!(order_id = %order_id, reason = %reason, "Payment failed, order cancelled");
		self.event_bus
			.publish(FulfillmentEvent::Payment(PaymentEvent::Failed {
				order_id: order_id.clone(),
				reason,
			}))
			.ok();
		self.publish_status_changed(&order_id, from, OrderStatus::Cancelled);

		Ok(order)
	}

	/// Allocates a worker for a paid order and persists the result.
	///
	/// An exhausted pool is not an error: the order moves to Confirmed and
	/// waits for manual assignment. A failure to persist an assignment
	/// releases the reserved capacity before propagating.
	async fn allocate_paid_order(&self, order_id: &str) -> Result<Order, FulfillmentError> {
		let order = self.state_machine.get_order(order_id).await?;

		let outcome = match self.allocation.allocate(&order).await {
			Ok(outcome) => outcome,
			Err(e) => {
				tracing::warn!(order_id = %order_id, error = %e, "Allocation failed, confirming unassigned");
				AllocationOutcome::Unavailable
			}
		};

		match outcome {
			AllocationOutcome::Assigned(worker_id) => {
				let assign = {
					let worker_id = worker_id.clone();
					move |order: &mut Order| {
						order.assigned_worker = Some(worker_id.clone());
					}
				};
				match self
					.state_machine
					.transition_with(
						order_id,
						OrderStatus::Assigned,
						&Actor::system(),
						None,
						assign,
					)
					.await
				{
					Ok((order, from)) => {
						tracing::info!(order_id = %order_id, worker_id = %worker_id, "Worker assigned");
						self.event_bus
							.publish(FulfillmentEvent::Allocation(AllocationEvent::Assigned {
								order_id: order_id.to_string(),
								worker_id,
							}))
							.ok();
						self.publish_status_changed(order_id, from, OrderStatus::Assigned);
						Ok(order)
					}
					Err(e) => {
						// Compensating release of the reserved capacity.
						if let Err(release_err) = self.directory.release(&worker_id).await {
							tracing::error!(
								order_id = %order_id,
								worker_id = %worker_id,
								error = %release_err,
								"Failed to release worker after assignment failure"
							);
						}
						self.event_bus
							.publish(FulfillmentEvent::Allocation(AllocationEvent::Released {
								order_id: order_id.to_string(),
								worker_id,
							}))
							.ok();
						Err(e)
					}
				}
			}
			AllocationOutcome::Unavailable => {
				let (order, from) = self
					.state_machine
					.transition(order_id, OrderStatus::Confirmed, &Actor::system(), None)
					.await?;
				tracing::info!(order_id = %order_id, "No worker available, order confirmed");
				self.event_bus
					.publish(FulfillmentEvent::Allocation(AllocationEvent::Unassigned {
						order_id: order_id.to_string(),
					}))
					.ok();
				self.publish_status_changed(order_id, from, OrderStatus::Confirmed);
				Ok(order)
			}
		}
	}

	async fn resolve_order(&self, gateway_order_id: &str) -> Result<String, FulfillmentError> {
		self.storage
			.retrieve(StorageKey::OrdersByGatewayRef.as_str(), gateway_order_id)
			.await
			.map_err(|e| match e {
				StorageError::NotFound => FulfillmentError::NotFound(format!(
					"no order for gateway reference {}",
					gateway_order_id
				)),
				other => FulfillmentError::Storage(other.to_string()),
			})
	}

	fn publish_status_changed(&self, order_id: &str, from: OrderStatus, to: OrderStatus) {
		self.event_bus
			.publish(FulfillmentEvent::Order(OrderEvent::StatusChanged {
				order_id: order_id.to_string(),
				from,
				to,
				actor_id: Actor::system().id,
			}))
			.ok();
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::handlers::checkout::{CheckoutHandler, CheckoutRequest};
	use atelier_config::PricingConfig;
	use atelier_directory::implementations::local::LocalDirectory;
	use atelier_payment::implementations::mock::MockGateway;
	use atelier_payment::sign_callback;
	use atelier_storage::implementations::memory::MemoryStorage;
	use atelier_allocation::implementations::least_loaded::LeastLoadedAllocator;
	use atelier_types::{
		LineItem, PaymentMethod, SecretString, ShippingAddress, Worker,
	};

	struct Fixture {
		checkout: CheckoutHandler,
		payment: PaymentHandler,
		directory: Arc<DirectoryService>,
		secret: SecretString,
	}

	async fn fixture(workers: Vec<Worker>) -> Fixture {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let directory = Arc::new(DirectoryService::new(Box::new(LocalDirectory::new(
			storage.clone(),
		))));
		for worker in &workers {
			directory.upsert_worker(worker).await.unwrap();
		}
		let allocation = Arc::new(AllocationService::new(Box::new(LeastLoadedAllocator::new(
			directory.clone(),
		))));
		let secret = SecretString::from("s");
		let gateway = Arc::new(PaymentService::new(Box::new(MockGateway::new(
			SecretString::from("s"),
		))));
		let state_machine = Arc::new(OrderStateMachine::new(storage.clone()));
		let event_bus = EventBus::new(64);

		Fixture {
			checkout: CheckoutHandler::new(
				storage.clone(),
				gateway.clone(),
				state_machine.clone(),
				event_bus.clone(),
				PricingConfig {
					delivery_fee_paise: 5_000,
					tax_rate_bps: 500,
				},
				"INR".to_string(),
			),
			payment: PaymentHandler::new(
				storage,
				gateway,
				directory.clone(),
				allocation,
				state_machine,
				event_bus,
			),
			directory,
			secret,
		}
	}

	fn worker(id: &str, workload: u32, capacity: u32) -> Worker {
		Worker {
			id: id.into(),
			name: id.to_uppercase(),
			is_active: true,
			is_available: true,
			current_workload: workload,
			max_capacity: capacity,
			specializations: vec![],
		}
	}

	async fn place_order(fixture: &Fixture) -> Order {
		fixture
			.checkout
			.handle_checkout(CheckoutRequest {
				customer_id: "cust-1".into(),
				items: vec![LineItem {
					product_id: "sku-1".into(),
					name: "Bespoke shirt".into(),
					unit_price: 150_000,
					quantity: 1,
					customization: None,
				}],
				shipping: ShippingAddress {
					recipient: "R".into(),
					line1: "1 Lane".into(),
					line2: None,
					city: "Pune".into(),
					state: "MH".into(),
					postal_code: "411001".into(),
					phone: "999".into(),
				},
				payment_method: PaymentMethod::Online,
			})
			.await
			.unwrap()
	}

	fn callback_for(fixture: &Fixture, order: &Order, payment_id: &str) -> PaymentCallback {
		let gateway_order_id = order.payment.gateway_order_id.clone().unwrap();
		PaymentCallback {
			signature: sign_callback(&fixture.secret, &gateway_order_id, payment_id),
			gateway_order_id,
			gateway_payment_id: payment_id.to_string(),
		}
	}

	#[tokio::test]
	async fn test_verified_payment_assigns_least_loaded_worker() {
		let fixture = fixture(vec![worker("w1", 2, 5), worker("w2", 0, 5)]).await;
		let order = place_order(&fixture).await;

		let order = fixture
			.payment
			.handle_callback(callback_for(&fixture, &order, "pay_1"))
			.await
			.unwrap();

		assert_eq!(order.status, OrderStatus::Assigned);
		assert_eq!(order.payment.status, PaymentStatus::Paid);
		assert_eq!(order.assigned_worker.as_deref(), Some("w2"));
		assert_eq!(
			fixture.directory.get_worker("w2").await.unwrap().current_workload,
			1
		);
	}

	#[tokio::test]
	async fn test_duplicate_callback_is_absorbed() {
		let fixture = fixture(vec![worker("w1", 0, 5)]).await;
		let order = place_order(&fixture).await;
		let callback = callback_for(&fixture, &order, "pay_1");

		fixture.payment.handle_callback(callback.clone()).await.unwrap();
		let replay = fixture.payment.handle_callback(callback).await.unwrap();

		assert_eq!(replay.status, OrderStatus::Assigned);
		// The replay reserved nothing further.
		assert_eq!(
			fixture.directory.get_worker("w1").await.unwrap().current_workload,
			1
		);
	}

	#[tokio::test]
	async fn test_no_eligible_worker_confirms_order() {
		let fixture = fixture(vec![worker("w1", 5, 5)]).await;
		let order = place_order(&fixture).await;

		let order = fixture
			.payment
			.handle_callback(callback_for(&fixture, &order, "pay_1"))
			.await
			.unwrap();

		assert_eq!(order.status, OrderStatus::Confirmed);
		assert!(order.assigned_worker.is_none());
	}

	#[tokio::test]
	async fn test_bad_signature_changes_nothing() {
		let fixture = fixture(vec![worker("w1", 0, 5)]).await;
		let order = place_order(&fixture).await;

		let mut callback = callback_for(&fixture, &order, "pay_1");
		callback.signature = "deadbeef".into();
		let err = fixture.payment.handle_callback(callback).await.unwrap_err();
		assert!(matches!(err, FulfillmentError::Validation(_)));

		let stored = fixture.payment.state_machine.get_order(&order.id).await.unwrap();
		assert_eq!(stored.status, OrderStatus::Placed);
		assert_eq!(stored.payment.status, PaymentStatus::Pending);
	}

	#[tokio::test]
	async fn test_unknown_gateway_reference_is_not_found() {
		let fixture = fixture(vec![]).await;
		let callback = PaymentCallback {
			signature: sign_callback(&fixture.secret, "order_unknown", "pay_1"),
			gateway_order_id: "order_unknown".into(),
			gateway_payment_id: "pay_1".into(),
		};
		assert!(matches!(
			fixture.payment.handle_callback(callback).await,
			Err(FulfillmentError::NotFound(_))
		));
	}

	#[tokio::test]
	async fn test_failed_application_does_not_absorb_retries() {
		let fixture = fixture(vec![worker("w1", 0, 5)]).await;
		let order = place_order(&fixture).await;
		let gateway_order_id = order.payment.gateway_order_id.clone().unwrap();

		// The failure callback lands first; the order is cancelled.
		fixture
			.payment
			.handle_failure(&gateway_order_id, "card declined".into())
			.await
			.unwrap();

		// A late success callback cannot apply, and must keep failing the
		// same way on redelivery instead of being absorbed as a duplicate.
		let callback = callback_for(&fixture, &order, "pay_1");
		for _ in 0..2 {
			let err = fixture
				.payment
				.handle_callback(callback.clone())
				.await
				.unwrap_err();
			assert!(matches!(err, FulfillmentError::Validation(_)));
		}

		let stored = fixture.payment.state_machine.get_order(&order.id).await.unwrap();
		assert_eq!(stored.payment.status, PaymentStatus::Failed);
		assert_eq!(stored.status, OrderStatus::Cancelled);
	}

	#[tokio::test]
	async fn test_payment_failure_cancels_order() {
		let fixture = fixture(vec![worker("w1", 0, 5)]).await;
		let order = place_order(&fixture).await;
		let gateway_order_id = order.payment.gateway_order_id.clone().unwrap();

		let order = fixture
			.payment
			.handle_failure(&gateway_order_id, "card declined".into())
			.await
			.unwrap();

		assert_eq!(order.status, OrderStatus::Cancelled);
		assert_eq!(order.payment.status, PaymentStatus::Failed);
		assert!(order
			.history
			.last()
			.unwrap()
			.note
			.as_deref()
			.unwrap()
			.contains("card declined"));
		// No capacity was ever reserved.
		assert_eq!(
			fixture.directory.get_worker("w1").await.unwrap().current_workload,
			0
		);
	}
}
