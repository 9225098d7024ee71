//! Common types module for the atelier fulfillment system.
//!
//! This module defines the core data types and structures used throughout
//! the fulfillment system. It provides a centralized location for shared
//! types to ensure consistency across all components.

/// Actor and role types for authorization decisions.
pub mod actor;
/// Event types for inter-service communication.
pub mod events;
/// Order lifecycle statuses and the transition table.
pub mod lifecycle;
/// Modular (design-your-own) order types.
pub mod modular;
/// Catalog order types including line items, pricing and payment state.
pub mod order;
/// Payment gateway boundary types.
pub mod payment;
/// Registry trait for self-registering implementations.
pub mod registry;
/// Secure string type for sensitive configuration values.
pub mod secret_string;
/// Storage types for managing persistent data.
pub mod storage;
/// Configuration validation types for ensuring type-safe configurations.
pub mod validation;
/// Worker (tailor) types and eligibility rules.
pub mod worker;

// Re-export all types for convenient access
pub use actor::*;
pub use events::*;
pub use lifecycle::*;
pub use modular::*;
pub use order::*;
pub use payment::*;
pub use registry::*;
pub use secret_string::*;
pub use storage::*;
pub use validation::*;
pub use worker::*;
