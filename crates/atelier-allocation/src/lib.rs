//! Worker allocation module for the atelier fulfillment system.
//!
//! This module decides which tailor receives a newly paid order. Allocation
//! strategies are pluggable behind the AllocatorInterface trait; the
//! shipped strategy allocates purely on load. A strategy proposes and
//! reserves a worker through the directory's atomic reserve operation, so
//! two orders paid concurrently can never both land on a worker's last
//! capacity slot.

use async_trait::async_trait;
use atelier_directory::DirectoryService;
use atelier_types::{ConfigSchema, ImplementationRegistry, Order};
use std::sync::Arc;
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod least_loaded;
}

/// Errors that can occur during allocation.
#[derive(Debug, Error)]
pub enum AllocationError {
	/// Error that occurs when the worker directory fails.
	#[error("Directory error: {0}")]
	Directory(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Outcome of an allocation attempt.
///
/// An empty or exhausted pool is not an error: the order proceeds
/// unassigned for later manual assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocationOutcome {
	/// The named worker was reserved for the order.
	Assigned(String),
	/// No eligible worker could be reserved.
	Unavailable,
}

/// Trait defining the interface for allocation strategies.
#[async_trait]
pub trait AllocatorInterface: Send + Sync {
	/// Returns the configuration schema for this strategy.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Selects and reserves a worker for the order.
	///
	/// On `Assigned`, one unit of the worker's capacity has already been
	/// reserved; the caller owns the compensating release if it fails to
	/// persist the assignment.
	async fn allocate(&self, order: &Order) -> Result<AllocationOutcome, AllocationError>;
}

/// Type alias for allocator factory functions.
pub type AllocatorFactory = fn(
	&toml::Value,
	Arc<DirectoryService>,
) -> Result<Box<dyn AllocatorInterface>, AllocationError>;

/// Registry trait for allocator implementations.
pub trait AllocatorRegistry: ImplementationRegistry<Factory = AllocatorFactory> {}

/// Get all registered allocator implementations.
pub fn get_all_implementations() -> Vec<(&'static str, AllocatorFactory)> {
	use implementations::least_loaded;

	vec![(least_loaded::Registry::NAME, least_loaded::Registry::factory())]
}

/// Service that fronts the configured allocation strategy.
pub struct AllocationService {
	strategy: Box<dyn AllocatorInterface>,
}

impl AllocationService {
	/// Creates a new AllocationService with the specified strategy.
	pub fn new(strategy: Box<dyn AllocatorInterface>) -> Self {
		Self { strategy }
	}

	/// Selects and reserves a worker for the order.
	pub async fn allocate(&self, order: &Order) -> Result<AllocationOutcome, AllocationError> {
		self.strategy.allocate(order).await
	}
}
