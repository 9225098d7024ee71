//! Event types for inter-service communication.
//!
//! This module defines the event system used by the fulfillment engine for
//! asynchronous communication between components. Events flow through an
//! event bus allowing observers to react to state changes without being on
//! the request path.

use serde::{Deserialize, Serialize};

use crate::{Order, OrderStatus};

/// Main event type encompassing all fulfillment events.
///
/// Events are categorized by the concern that produces them, allowing
/// consumers to filter and handle specific event types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FulfillmentEvent {
	/// Events from order placement and lifecycle transitions.
	Order(OrderEvent),
	/// Events from payment verification.
	Payment(PaymentEvent),
	/// Events from worker allocation.
	Allocation(AllocationEvent),
}

/// Events related to order lifecycle changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OrderEvent {
	/// A new order was created at checkout.
	Placed { order: Order },
	/// A modular order was submitted.
	ModularPlaced { order_id: String, total_price: u64 },
	/// An order moved to a new status.
	StatusChanged {
		order_id: String,
		from: OrderStatus,
		to: OrderStatus,
		actor_id: String,
	},
}

/// Events related to payment verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PaymentEvent {
	/// A payment callback passed signature verification.
	Verified {
		order_id: String,
		gateway_payment_id: String,
	},
	/// A payment callback was rejected or the gateway reported failure.
	Failed { order_id: String, reason: String },
	/// A duplicate callback was ignored.
	Duplicate {
		order_id: String,
		gateway_payment_id: String,
	},
}

/// Events related to worker allocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AllocationEvent {
	/// A worker was reserved for an order.
	Assigned { order_id: String, worker_id: String },
	/// No eligible worker was available; the order proceeds unassigned.
	Unassigned { order_id: String },
	/// A previously reserved worker was released.
	Released { order_id: String, worker_id: String },
}
