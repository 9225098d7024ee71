//! Status handler for lifecycle progression and worker reassignment.
//!
//! Applies actor-initiated status updates through the state machine and
//! keeps workload accounting in step: capacity reserved at allocation time
//! is released exactly once, when an assigned order leaves production.

use crate::engine::event_bus::EventBus;
use crate::state::OrderStateMachine;
use crate::FulfillmentError;
use atelier_directory::{DirectoryError, DirectoryService};
use atelier_types::{
	Actor, AllocationEvent, FulfillmentEvent, ModularOrder, Order, OrderEvent, OrderStatus,
};
use std::sync::Arc;
use tracing::instrument;

/// Handler for status updates and reassignment.
pub struct StatusHandler {
	directory: Arc<DirectoryService>,
	state_machine: Arc<OrderStateMachine>,
	event_bus: EventBus,
}

impl StatusHandler {
	pub fn new(
		directory: Arc<DirectoryService>,
		state_machine: Arc<OrderStateMachine>,
		event_bus: EventBus,
	) -> Self {
		Self {
			directory,
			state_machine,
			event_bus,
		}
	}

	/// Applies a status update to a catalog order.
	#[instrument(skip_all, fields(order_id = %order_id, new_status = %new_status))]
	pub async fn handle_status_update(
		&self,
		order_id: &str,
		new_status: OrderStatus,
		actor: &Actor,
		note: Option<String>,
	) -> Result<Order, FulfillmentError> {
		let (order, from) = self
			.state_machine
			.transition(order_id, new_status, actor, note)
			.await?;

		// Capacity is held while the order sits in Assigned or InProgress;
		// leaving that window for Completed or Cancelled frees it.
		let leaving_production = matches!(from, OrderStatus::Assigned | OrderStatus::InProgress)
			&& matches!(new_status, OrderStatus::Completed | OrderStatus::Cancelled);
		if leaving_production {
			if let Some(worker_id) = order.assigned_worker.clone() {
				self.release_worker(order_id, &worker_id).await;
			}
		}

		tracing::info!(actor = %actor, "Status updated");
		self.event_bus
			.publish(FulfillmentEvent::Order(OrderEvent::StatusChanged {
				order_id: order_id.to_string(),
				from,
				to: new_status,
				actor_id: actor.id.clone(),
			}))
			.ok();

		Ok(order)
	}

	/// Applies a status update to a modular order.
	#[instrument(skip_all, fields(order_id = %order_id, new_status = %new_status))]
	pub async fn handle_modular_status_update(
		&self,
		order_id: &str,
		new_status: OrderStatus,
		actor: &Actor,
		note: Option<String>,
	) -> Result<ModularOrder, FulfillmentError> {
		let (order, from) = self
			.state_machine
			.transition_modular(order_id, new_status, actor, note)
			.await?;

		tracing::info!(actor = %actor, "Modular status updated");
		self.event_bus
			.publish(FulfillmentEvent::Order(OrderEvent::StatusChanged {
				order_id: order_id.to_string(),
				from,
				to: new_status,
				actor_id: actor.id.clone(),
			}))
			.ok();

		Ok(order)
	}

	/// Assigns or reassigns a worker to an order. Admin only.
	///
	/// The new worker's capacity is reserved before the order is touched;
	/// the previous worker's capacity is released only after the swap has
	/// been persisted, so the order is never observable with freed capacity
	/// but no assignee.
	#[instrument(skip_all, fields(order_id = %order_id, worker_id = %worker_id))]
	pub async fn handle_reassignment(
		&self,
		order_id: &str,
		worker_id: &str,
		actor: &Actor,
	) -> Result<Order, FulfillmentError> {
		if !actor.is_admin() {
			return Err(FulfillmentError::Forbidden(format!(
				"{} may not reassign orders",
				actor
			)));
		}

		let order = self.state_machine.get_order(order_id).await?;
		let previous = order.assigned_worker.clone();
		if previous.as_deref() == Some(worker_id) {
			return Err(FulfillmentError::Validation(format!(
				"order {} is already assigned to {}",
				order_id, worker_id
			)));
		}
		if !matches!(
			order.status,
			OrderStatus::Confirmed | OrderStatus::Assigned | OrderStatus::InProgress
		) {
			return Err(FulfillmentError::Conflict {
				from: order.status,
				to: OrderStatus::Assigned,
			});
		}

		let reserved = self.directory.reserve(worker_id).await.map_err(|e| match e {
			DirectoryError::NotFound(id) => FulfillmentError::NotFound(id),
			other => FulfillmentError::Storage(other.to_string()),
		})?;
		if !reserved {
			return Err(FulfillmentError::Validation(format!(
				"worker {} is not eligible for new assignments",
				worker_id
			)));
		}

		let persisted = if order.status == OrderStatus::Confirmed {
			let assign = {
				let worker_id = worker_id.to_string();
				move |order: &mut Order| {
					order.assigned_worker = Some(worker_id.clone());
				}
			};
			self.state_machine
				.transition_with(order_id, OrderStatus::Assigned, actor, None, assign)
				.await
				.map(|(order, from)| {
					self.event_bus
						.publish(FulfillmentEvent::Order(OrderEvent::StatusChanged {
							order_id: order_id.to_string(),
							from,
							to: OrderStatus::Assigned,
							actor_id: actor.id.clone(),
						}))
						.ok();
					order
				})
		} else {
			let expected = previous.clone();
			let worker = worker_id.to_string();
			self.state_machine
				.update_order_checked(order_id, move |order| {
					// The order may have moved or been handed off since we
					// read it; re-validate under the swap.
					if order.assigned_worker != expected {
						return Err(FulfillmentError::Validation(format!(
							"order {} changed hands concurrently",
							order.id
						)));
					}
					if !matches!(
						order.status,
						OrderStatus::Assigned | OrderStatus::InProgress
					) {
						return Err(FulfillmentError::Conflict {
							from: order.status,
							to: OrderStatus::Assigned,
						});
					}
					order.assigned_worker = Some(worker.clone());
					Ok(())
				})
				.await
		};

		let order = match persisted {
			Ok(order) => order,
			Err(e) => {
				// Compensating release of the capacity we just reserved.
				if let Err(release_err) = self.directory.release(worker_id).await {
					tracing::error!(
						error = %release_err,
						"Failed to release worker after reassignment failure"
					);
				}
				return Err(e);
			}
		};

		if let Some(previous_id) = previous {
			self.release_worker(order_id, &previous_id).await;
		}

		tracing::info!(actor = %actor, "Worker reassigned");
		self.event_bus
			.publish(FulfillmentEvent::Allocation(AllocationEvent::Assigned {
				order_id: order_id.to_string(),
				worker_id: worker_id.to_string(),
			}))
			.ok();

		Ok(order)
	}

	async fn release_worker(&self, order_id: &str, worker_id: &str) {
		if let Err(e) = self.directory.release(worker_id).await {
			tracing::error!(
				order_id = %order_id,
				worker_id = %worker_id,
				error = %e,
				"Failed to release worker capacity"
			);
			return;
		}
		self.event_bus
			.publish(FulfillmentEvent::Allocation(AllocationEvent::Released {
				order_id: order_id.to_string(),
				worker_id: worker_id.to_string(),
			}))
			.ok();
	}
}
