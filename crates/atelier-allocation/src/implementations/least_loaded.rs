//! Load-based allocation strategy.
//!
//! Enumerates the eligible pool, orders candidates by `(current_workload,
//! id)` and reserves the first one that still has capacity. Ordering by id
//! makes the tie-break stable across runs. Specialization tags on the
//! worker record are deliberately ignored; a skill-aware strategy would be
//! a separate implementation behind the same trait.

use crate::{AllocationError, AllocationOutcome, AllocatorInterface};
use async_trait::async_trait;
use atelier_directory::{DirectoryError, DirectoryService};
use atelier_types::{ConfigSchema, ImplementationRegistry, Order, Schema, ValidationError};
use std::sync::Arc;
use tracing::instrument;

/// Number of pool snapshots to try before reporting Unavailable.
///
/// A second pass covers the window where every candidate from the first
/// snapshot was taken by concurrent allocations while capacity opened up
/// elsewhere.
const POOL_PASSES: usize = 2;

/// Allocation strategy that picks the least-loaded eligible worker.
pub struct LeastLoadedAllocator {
	directory: Arc<DirectoryService>,
}

impl LeastLoadedAllocator {
	pub fn new(directory: Arc<DirectoryService>) -> Self {
		Self { directory }
	}
}

#[async_trait]
impl AllocatorInterface for LeastLoadedAllocator {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(LeastLoadedSchema)
	}

	#[instrument(skip_all, fields(order_id = %order.id))]
	async fn allocate(&self, order: &Order) -> Result<AllocationOutcome, AllocationError> {
		for _ in 0..POOL_PASSES {
			let mut candidates: Vec<_> = self
				.directory
				.list_workers()
				.await
				.map_err(|e| AllocationError::Directory(e.to_string()))?
				.into_iter()
				.filter(|w| w.is_eligible())
				.collect();

			if candidates.is_empty() {
				return Ok(AllocationOutcome::Unavailable);
			}

			candidates.sort_by(|a, b| {
				a.current_workload
					.cmp(&b.current_workload)
					.then_with(|| a.id.cmp(&b.id))
			});

			for candidate in candidates {
				match self.directory.reserve(&candidate.id).await {
					Ok(true) => {
						tracing::info!(
							worker_id = %candidate.id,
							workload = candidate.current_workload + 1,
							"Reserved worker for order"
						);
						return Ok(AllocationOutcome::Assigned(candidate.id));
					}
					// Raced to ineligibility or removed; try the next one.
					Ok(false) | Err(DirectoryError::NotFound(_)) => continue,
					Err(e) => return Err(AllocationError::Directory(e.to_string())),
				}
			}
		}

		Ok(AllocationOutcome::Unavailable)
	}
}

/// Configuration schema for LeastLoadedAllocator.
pub struct LeastLoadedSchema;

impl ConfigSchema for LeastLoadedSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		// Purely load-based; nothing to configure.
		Schema::new(vec![], vec![]).validate(config)
	}
}

/// Registry for the load-based allocation strategy.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "least_loaded";
	type Factory = crate::AllocatorFactory;

	fn factory() -> Self::Factory {
		create_allocator
	}
}

impl crate::AllocatorRegistry for Registry {}

/// Factory function to create the load-based allocator.
pub fn create_allocator(
	_config: &toml::Value,
	directory: Arc<DirectoryService>,
) -> Result<Box<dyn AllocatorInterface>, AllocationError> {
	Ok(Box::new(LeastLoadedAllocator::new(directory)))
}
