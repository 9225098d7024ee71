//! Core fulfillment engine for the atelier system.
//!
//! This module provides the main orchestration logic for order fulfillment,
//! coordinating between the storage, directory, allocation and payment
//! services to execute the complete order lifecycle: checkout, payment
//! verification, worker allocation and status progression.

use atelier_types::OrderStatus;
use thiserror::Error;

pub mod builder;
pub mod engine;
pub mod handlers;
pub mod state;

pub use builder::{BuilderError, FulfillmentBuilder, FulfillmentFactories};
pub use engine::{event_bus::EventBus, EngineError, FulfillmentCommand, FulfillmentEngine};
pub use handlers::{
	CheckoutHandler, CheckoutRequest, ModularCheckoutRequest, PaymentHandler, StatusHandler,
};
pub use state::OrderStateMachine;

/// Errors surfaced by the fulfillment operations.
///
/// Every handler maps its failures into this taxonomy so callers can
/// distinguish bad input, missing records, authorization failures and
/// transition conflicts from infrastructure problems.
#[derive(Debug, Error)]
pub enum FulfillmentError {
	/// The request payload failed validation.
	#[error("Validation error: {0}")]
	Validation(String),
	/// The referenced order or worker does not exist.
	#[error("Not found: {0}")]
	NotFound(String),
	/// The actor is not allowed to perform this operation.
	#[error("Forbidden: {0}")]
	Forbidden(String),
	/// The requested status transition is not in the lifecycle table.
	#[error("Invalid transition from {from} to {to}")]
	Conflict { from: OrderStatus, to: OrderStatus },
	/// The payment gateway rejected or failed a remote call.
	#[error("Gateway error: {0}")]
	Gateway(String),
	/// The storage backend failed.
	#[error("Storage error: {0}")]
	Storage(String),
}
