//! Handlers for the fulfillment operations.
//!
//! This module contains specialized handlers for the distinct phases of the
//! order lifecycle: checkout, payment verification and failure, and status
//! progression including worker reassignment.

pub mod checkout;
pub mod payment;
pub mod status;

pub use checkout::{CheckoutHandler, CheckoutRequest, ModularCheckoutRequest};
pub use payment::PaymentHandler;
pub use status::StatusHandler;
