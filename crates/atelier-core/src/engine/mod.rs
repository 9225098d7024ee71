//! Core fulfillment engine that orchestrates the order lifecycle.
//!
//! This module contains the main FulfillmentEngine struct which coordinates
//! between all services (storage, directory, allocation, payment) and runs
//! the main loop dispatching submitted commands to their handlers.

pub mod event_bus;

use crate::handlers::{
	CheckoutHandler, CheckoutRequest, ModularCheckoutRequest, PaymentHandler, StatusHandler,
};
use crate::state::OrderStateMachine;
use crate::FulfillmentError;
use atelier_allocation::AllocationService;
use atelier_config::Config;
use atelier_directory::DirectoryService;
use atelier_payment::PaymentService;
use atelier_storage::StorageService;
use atelier_types::{
	Actor, AllocationEvent, FulfillmentEvent, ModularOrder, Order, OrderEvent, OrderStatus,
	PaymentCallback, PaymentEvent,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Semaphore};

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Service error: {0}")]
	Service(String),
	#[error("Handler error: {0}")]
	Handler(String),
}

/// A fulfillment operation submitted to the engine.
///
/// Each command carries a oneshot responder; the engine sends the handler
/// result back once the operation has been applied.
pub enum FulfillmentCommand {
	Checkout {
		request: CheckoutRequest,
		respond: oneshot::Sender<Result<Order, FulfillmentError>>,
	},
	ModularCheckout {
		request: ModularCheckoutRequest,
		respond: oneshot::Sender<Result<ModularOrder, FulfillmentError>>,
	},
	PaymentCallback {
		callback: PaymentCallback,
		respond: oneshot::Sender<Result<Order, FulfillmentError>>,
	},
	PaymentFailure {
		gateway_order_id: String,
		reason: String,
		respond: oneshot::Sender<Result<Order, FulfillmentError>>,
	},
	StatusUpdate {
		order_id: String,
		new_status: OrderStatus,
		actor: Actor,
		note: Option<String>,
		respond: oneshot::Sender<Result<Order, FulfillmentError>>,
	},
	ModularStatusUpdate {
		order_id: String,
		new_status: OrderStatus,
		actor: Actor,
		note: Option<String>,
		respond: oneshot::Sender<Result<ModularOrder, FulfillmentError>>,
	},
	Reassign {
		order_id: String,
		worker_id: String,
		actor: Actor,
		respond: oneshot::Sender<Result<Order, FulfillmentError>>,
	},
}

/// Maximum number of commands processed concurrently.
const MAX_CONCURRENT_HANDLERS: usize = 100;

/// Main fulfillment engine.
#[derive(Clone)]
pub struct FulfillmentEngine {
	/// Service configuration.
	pub(crate) config: Config,
	/// Storage service for persisting state.
	pub(crate) storage: Arc<StorageService>,
	/// Worker directory and workload accounting.
	pub(crate) directory: Arc<DirectoryService>,
	/// Event bus for inter-service communication.
	pub(crate) event_bus: event_bus::EventBus,
	/// Checkout handler.
	pub(crate) checkout_handler: Arc<CheckoutHandler>,
	/// Payment handler.
	pub(crate) payment_handler: Arc<PaymentHandler>,
	/// Status handler.
	pub(crate) status_handler: Arc<StatusHandler>,
}

impl std::fmt::Debug for FulfillmentEngine {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("FulfillmentEngine").finish_non_exhaustive()
	}
}

impl FulfillmentEngine {
	/// Creates a new fulfillment engine with the given services.
	pub fn new(
		config: Config,
		storage: Arc<StorageService>,
		directory: Arc<DirectoryService>,
		allocation: Arc<AllocationService>,
		payment: Arc<PaymentService>,
		event_bus: event_bus::EventBus,
	) -> Self {
		let state_machine = Arc::new(OrderStateMachine::new(storage.clone()));

		let checkout_handler = Arc::new(CheckoutHandler::new(
			storage.clone(),
			payment.clone(),
			state_machine.clone(),
			event_bus.clone(),
			config.pricing.clone(),
			config.payment.currency.clone(),
		));

		let payment_handler = Arc::new(PaymentHandler::new(
			storage.clone(),
			payment,
			directory.clone(),
			allocation,
			state_machine.clone(),
			event_bus.clone(),
		));

		let status_handler = Arc::new(StatusHandler::new(
			directory.clone(),
			state_machine,
			event_bus.clone(),
		));

		Self {
			config,
			storage,
			directory,
			event_bus,
			checkout_handler,
			payment_handler,
			status_handler,
		}
	}

	/// Main execution loop for the fulfillment engine.
	///
	/// Seeds the worker roster, then dispatches submitted commands until the
	/// channel closes or Ctrl+C is received. Expired storage entries are
	/// cleaned up on a configurable interval.
	pub async fn run(
		&self,
		mut commands: mpsc::UnboundedReceiver<FulfillmentCommand>,
	) -> Result<(), EngineError> {
		self.directory
			.seed(&self.config.directory.seed)
			.await
			.map_err(|e| EngineError::Service(e.to_string()))?;
		tracing::info!(
			workers = self.config.directory.seed.len(),
			"Worker roster seeded"
		);

		let mut event_receiver = self.event_bus.subscribe();

		// Start storage cleanup task
		let storage = self.storage.clone();
		let cleanup_interval = tokio::time::interval(Duration::from_secs(
			self.config.storage.cleanup_interval_seconds,
		));
		let cleanup_handle = tokio::spawn(async move {
			let mut interval = cleanup_interval;
			loop {
				interval.tick().await;
				match storage.cleanup_expired().await {
					Ok(count) if count > 0 => {
						tracing::debug!("Storage cleanup: removed {} expired entries", count);
					}
					Err(e) => {
						tracing::warn!("Storage cleanup failed: {}", e);
					}
					_ => {} // No expired entries
				}
			}
		});

		let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_HANDLERS));

		loop {
			tokio::select! {
				command = commands.recv() => {
					match command {
						Some(command) => {
							self.spawn_handler(&semaphore, move |engine| async move {
								engine.dispatch(command).await;
								Ok(())
							})
							.await;
						}
						None => break,
					}
				}

				Ok(event) = event_receiver.recv() => {
					Self::log_event(&event);
				}

				// Shutdown signal
				_ = tokio::signal::ctrl_c() => {
					break;
				}
			}
		}

		cleanup_handle.abort();
		Ok(())
	}

	/// Routes a command to its handler and reports the result back.
	async fn dispatch(&self, command: FulfillmentCommand) {
		match command {
			FulfillmentCommand::Checkout { request, respond } => {
				respond
					.send(self.checkout_handler.handle_checkout(request).await)
					.ok();
			}
			FulfillmentCommand::ModularCheckout { request, respond } => {
				respond
					.send(self.checkout_handler.handle_modular_checkout(request).await)
					.ok();
			}
			FulfillmentCommand::PaymentCallback { callback, respond } => {
				respond
					.send(self.payment_handler.handle_callback(callback).await)
					.ok();
			}
			FulfillmentCommand::PaymentFailure {
				gateway_order_id,
				reason,
				respond,
			} => {
				respond
					.send(
						self.payment_handler
							.handle_failure(&gateway_order_id, reason)
							.await,
					)
					.ok();
			}
			FulfillmentCommand::StatusUpdate {
				order_id,
				new_status,
				actor,
				note,
				respond,
			} => {
				respond
					.send(
						self.status_handler
							.handle_status_update(&order_id, new_status, &actor, note)
							.await,
					)
					.ok();
			}
			FulfillmentCommand::ModularStatusUpdate {
				order_id,
				new_status,
				actor,
				note,
				respond,
			} => {
				respond
					.send(
						self.status_handler
							.handle_modular_status_update(&order_id, new_status, &actor, note)
							.await,
					)
					.ok();
			}
			FulfillmentCommand::Reassign {
				order_id,
				worker_id,
				actor,
				respond,
			} => {
				respond
					.send(
						self.status_handler
							.handle_reassignment(&order_id, &worker_id, &actor)
							.await,
					)
					.ok();
			}
		}
	}

	fn log_event(event: &FulfillmentEvent) {
		match event {
			FulfillmentEvent::Order(OrderEvent::Placed { order }) => {
				tracing::debug!(order_id = %order.id, "Event: order placed");
			}
			FulfillmentEvent::Order(OrderEvent::ModularPlaced { order_id, .. }) => {
				tracing::debug!(order_id = %order_id, "Event: modular order placed");
			}
			FulfillmentEvent::Order(OrderEvent::StatusChanged {
				order_id, from, to, ..
			}) => {
				tracing::debug!(order_id = %order_id, from = %from, to = %to, "Event: status changed");
			}
			FulfillmentEvent::Payment(PaymentEvent::Verified { order_id, .. }) => {
				tracing::debug!(order_id = %order_id, "Event: payment verified");
			}
			FulfillmentEvent::Payment(PaymentEvent::Failed { order_id, reason }) => {
				tracing::debug!(order_id = %order_id, reason = %reason, "Event: payment failed");
			}
			FulfillmentEvent::Payment(PaymentEvent::Duplicate { order_id, .. }) => {
				tracing::debug!(order_id = %order_id, "Event: duplicate payment callback");
			}
			FulfillmentEvent::Allocation(AllocationEvent::Assigned {
				order_id,
				worker_id,
			}) => {
				tracing::debug!(order_id = %order_id, worker_id = %worker_id, "Event: worker assigned");
			}
			FulfillmentEvent::Allocation(AllocationEvent::Unassigned { order_id }) => {
				tracing::debug!(order_id = %order_id, "Event: no worker available");
			}
			FulfillmentEvent::Allocation(AllocationEvent::Released {
				order_id,
				worker_id,
			}) => {
				tracing::debug!(order_id = %order_id, worker_id = %worker_id, "Event: worker released");
			}
		}
	}

	/// Returns a reference to the event bus.
	pub fn event_bus(&self) -> &event_bus::EventBus {
		&self.event_bus
	}

	/// Returns a reference to the configuration.
	pub fn config(&self) -> &Config {
		&self.config
	}

	/// Returns a reference to the storage service.
	pub fn storage(&self) -> &Arc<StorageService> {
		&self.storage
	}

	/// Helper method to spawn handler tasks with semaphore-based concurrency control.
	async fn spawn_handler<F, Fut>(&self, semaphore: &Arc<Semaphore>, handler: F)
	where
		F: FnOnce(FulfillmentEngine) -> Fut + Send + 'static,
		Fut: Future<Output = Result<(), EngineError>> + Send,
	{
		let engine = self.clone();
		match semaphore.clone().acquire_owned().await {
			Ok(permit) => {
				tokio::spawn(async move {
					let _permit = permit; // Keep permit alive for duration of task
					if let Err(e) = handler(engine).await {
						tracing::error!("Handler error: {}", e);
					}
				});
			}
			Err(e) => {
				tracing::error!("Failed to acquire semaphore permit: {}", e);
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use atelier_allocation::implementations::least_loaded::LeastLoadedAllocator;
	use atelier_directory::implementations::local::LocalDirectory;
	use atelier_payment::implementations::mock::MockGateway;
	use atelier_payment::sign_callback;
	use atelier_storage::implementations::memory::MemoryStorage;
	use atelier_types::{
		LineItem, PaymentMethod, Role, SecretString, ShippingAddress, Worker,
	};

	fn test_config() -> Config {
		Config::from_toml_str(
			r#"
			[service]
			id = "atelier-test"

			[storage]
			primary = "memory"
			[storage.implementations.memory]

			[directory]
			primary = "local"
			[directory.implementations.local]

			[[directory.seed]]
			id = "w1"
			name = "Asha"
			is_active = true
			is_available = true
			current_workload = 0
			max_capacity = 5

			[allocation]
			primary = "least_loaded"
			[allocation.implementations.least_loaded]

			[payment]
			primary = "mock"
			[payment.implementations.mock]
			secret = "s"

			[pricing]
			delivery_fee_paise = 5000
			tax_rate_bps = 500
		"#,
		)
		.unwrap()
	}

	fn engine() -> FulfillmentEngine {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let directory = Arc::new(DirectoryService::new(Box::new(LocalDirectory::new(
			storage.clone(),
		))));
		let allocation = Arc::new(AllocationService::new(Box::new(LeastLoadedAllocator::new(
			directory.clone(),
		))));
		let payment = Arc::new(PaymentService::new(Box::new(MockGateway::new(
			SecretString::from("s"),
		))));
		FulfillmentEngine::new(
			test_config(),
			storage,
			directory,
			allocation,
			payment,
			event_bus::EventBus::new(64),
		)
	}

	fn checkout_request() -> CheckoutRequest {
		CheckoutRequest {
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
		}
	}

	#[tokio::test]
	async fn test_command_loop_runs_full_lifecycle() {
		let engine = engine();
		let (tx, rx) = mpsc::unbounded_channel();
		let run = {
			let engine = engine.clone();
			tokio::spawn(async move { engine.run(rx).await })
		};

		// Checkout
		let (respond, result) = oneshot::channel();
		tx.send(FulfillmentCommand::Checkout {
			request: checkout_request(),
			respond,
		})
		.unwrap();
		let order = result.await.unwrap().unwrap();
		assert_eq!(order.status, OrderStatus::Placed);

		// Payment callback assigns the seeded worker
		let gateway_order_id = order.payment.gateway_order_id.clone().unwrap();
		let (respond, result) = oneshot::channel();
		tx.send(FulfillmentCommand::PaymentCallback {
			callback: PaymentCallback {
				signature: sign_callback(&SecretString::from("s"), &gateway_order_id, "pay_1"),
				gateway_order_id,
				gateway_payment_id: "pay_1".into(),
			},
			respond,
		})
		.unwrap();
		let order = result.await.unwrap().unwrap();
		assert_eq!(order.status, OrderStatus::Assigned);
		assert_eq!(order.assigned_worker.as_deref(), Some("w1"));

		// The assigned tailor starts production
		let (respond, result) = oneshot::channel();
		tx.send(FulfillmentCommand::StatusUpdate {
			order_id: order.id.clone(),
			new_status: OrderStatus::InProgress,
			actor: Actor::new("w1", Role::Tailor),
			note: None,
			respond,
		})
		.unwrap();
		let order = result.await.unwrap().unwrap();
		assert_eq!(order.status, OrderStatus::InProgress);

		// Closing the channel stops the loop
		drop(tx);
		run.await.unwrap().unwrap();
	}

	#[tokio::test]
	async fn test_roster_is_seeded_on_startup() {
		let engine = engine();
		let (tx, rx) = mpsc::unbounded_channel::<FulfillmentCommand>();
		let run = {
			let engine = engine.clone();
			tokio::spawn(async move { engine.run(rx).await })
		};

		// Allow the loop to start and seed.
		tokio::time::sleep(Duration::from_millis(50)).await;
		let worker: Worker = engine.directory.get_worker("w1").await.unwrap();
		assert_eq!(worker.name, "Asha");
		assert_eq!(worker.max_capacity, 5);

		drop(tx);
		run.await.unwrap().unwrap();
	}
}
