//! Worker directory module for the atelier fulfillment system.
//!
//! The directory is the single owner of the tailor roster and of workload
//! accounting. Workload moves only through the atomic `reserve` and
//! `release` operations; nothing recounts orders to derive it, so the two
//! code paths the original system mixed cannot diverge here.

use async_trait::async_trait;
use atelier_storage::StorageService;
use atelier_types::{ConfigSchema, ImplementationRegistry, Worker};
use std::sync::Arc;
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod local;
}

/// Errors that can occur during directory operations.
#[derive(Debug, Error)]
pub enum DirectoryError {
	/// Error that occurs when a worker id is unknown.
	#[error("Worker not found: {0}")]
	NotFound(String),
	/// Error that occurs in the storage backend.
	#[error("Storage error: {0}")]
	Storage(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Trait defining the interface for worker directory implementations.
#[async_trait]
pub trait DirectoryInterface: Send + Sync {
	/// Returns the configuration schema for this directory implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Returns the full roster, active or not.
	async fn list_workers(&self) -> Result<Vec<Worker>, DirectoryError>;

	/// Returns a single worker by id.
	async fn get_worker(&self, worker_id: &str) -> Result<Worker, DirectoryError>;

	/// Creates or replaces a worker record.
	async fn upsert_worker(&self, worker: &Worker) -> Result<(), DirectoryError>;

	/// Atomically reserves one unit of capacity on the worker.
	///
	/// Returns true if the workload counter was incremented, false if the
	/// worker is no longer eligible (inactive, unavailable or at capacity).
	/// Concurrent reservations against the last capacity slot resolve to
	/// exactly one winner.
	async fn reserve(&self, worker_id: &str) -> Result<bool, DirectoryError>;

	/// Releases one unit of capacity on the worker (compensating decrement
	/// on order completion or cancellation). Saturates at zero.
	async fn release(&self, worker_id: &str) -> Result<(), DirectoryError>;
}

/// Type alias for directory factory functions.
///
/// Directory implementations are constructed over the shared storage
/// service.
pub type DirectoryFactory =
	fn(&toml::Value, Arc<StorageService>) -> Result<Box<dyn DirectoryInterface>, DirectoryError>;

/// Registry trait for directory implementations.
pub trait DirectoryRegistry: ImplementationRegistry<Factory = DirectoryFactory> {}

/// Get all registered directory implementations.
pub fn get_all_implementations() -> Vec<(&'static str, DirectoryFactory)> {
	use implementations::local;

	vec![(local::Registry::NAME, local::Registry::factory())]
}

/// Service that fronts the configured directory implementation.
pub struct DirectoryService {
	implementation: Box<dyn DirectoryInterface>,
}

impl DirectoryService {
	/// Creates a new DirectoryService with the specified implementation.
	pub fn new(implementation: Box<dyn DirectoryInterface>) -> Self {
		Self { implementation }
	}

	/// Returns the full roster.
	pub async fn list_workers(&self) -> Result<Vec<Worker>, DirectoryError> {
		self.implementation.list_workers().await
	}

	/// Returns a single worker by id.
	pub async fn get_worker(&self, worker_id: &str) -> Result<Worker, DirectoryError> {
		self.implementation.get_worker(worker_id).await
	}

	/// Creates or replaces a worker record.
	pub async fn upsert_worker(&self, worker: &Worker) -> Result<(), DirectoryError> {
		self.implementation.upsert_worker(worker).await
	}

	/// Seeds the roster with the given workers, keeping existing workload
	/// counters when a worker is already present.
	pub async fn seed(&self, workers: &[Worker]) -> Result<(), DirectoryError> {
		for worker in workers {
			match self.implementation.get_worker(&worker.id).await {
				Ok(existing) => {
					let mut updated = worker.clone();
					updated.current_workload = existing.current_workload;
					self.implementation.upsert_worker(&updated).await?;
				}
				Err(DirectoryError::NotFound(_)) => {
					self.implementation.upsert_worker(worker).await?;
				}
				Err(e) => return Err(e),
			}
		}
		Ok(())
	}

	/// Atomically reserves one unit of capacity on the worker.
	pub async fn reserve(&self, worker_id: &str) -> Result<bool, DirectoryError> {
		self.implementation.reserve(worker_id).await
	}

	/// Releases one unit of capacity on the worker.
	pub async fn release(&self, worker_id: &str) -> Result<(), DirectoryError> {
		self.implementation.release(worker_id).await
	}
}
