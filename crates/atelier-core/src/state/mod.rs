//! Order state management.
//!
//! Contains the state machine that validates and atomically applies
//! lifecycle transitions for both catalog and modular orders.

pub mod order;

pub use order::OrderStateMachine;
