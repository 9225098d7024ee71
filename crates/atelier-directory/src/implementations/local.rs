//! Storage-backed worker directory implementation.
//!
//! Worker records live in the shared storage service under the `workers`
//! namespace, with a roster index record listing all worker ids so the pool
//! can be enumerated over a key-value backend. Reserve and release are
//! compare-and-swap loops over the serialized worker record.

use crate::{DirectoryError, DirectoryInterface};
use async_trait::async_trait;
use atelier_storage::{StorageError, StorageService};
use atelier_types::{
	ConfigSchema, ImplementationRegistry, Schema, StorageKey, ValidationError, Worker,
};
use std::sync::Arc;
use tracing::instrument;

/// Id of the roster index record within the `workers` namespace.
const ROSTER_ID: &str = "_roster";

/// Upper bound on compare-and-swap retries before giving up.
///
/// Contention on a single worker record is short-lived; hitting this bound
/// means the storage backend is misbehaving, not that the pool is busy.
const MAX_CAS_RETRIES: usize = 16;

/// Worker directory backed by the shared storage service.
pub struct LocalDirectory {
	storage: Arc<StorageService>,
}

impl LocalDirectory {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	async fn roster(&self) -> Result<Vec<String>, DirectoryError> {
		match self
			.storage
			.retrieve::<Vec<String>>(StorageKey::Workers.as_str(), ROSTER_ID)
			.await
		{
			Ok(ids) => Ok(ids),
			Err(StorageError::NotFound) => Ok(Vec::new()),
			Err(e) => Err(DirectoryError::Storage(e.to_string())),
		}
	}

	/// Adds an id to the roster index, retrying on concurrent writers.
	async fn index_worker(&self, worker_id: &str) -> Result<(), DirectoryError> {
		for _ in 0..MAX_CAS_RETRIES {
			let namespace = StorageKey::Workers.as_str();
			match self
				.storage
				.retrieve_versioned::<Vec<String>>(namespace, ROSTER_ID)
				.await
			{
				Ok((mut ids, snapshot)) => {
					if ids.iter().any(|id| id == worker_id) {
						return Ok(());
					}
					ids.push(worker_id.to_string());
					ids.sort();
					if self
						.storage
						.swap(namespace, ROSTER_ID, &snapshot, &ids)
						.await
						.map_err(|e| DirectoryError::Storage(e.to_string()))?
					{
						return Ok(());
					}
				}
				Err(StorageError::NotFound) => {
					let ids = vec![worker_id.to_string()];
					if self
						.storage
						.swap_create(namespace, ROSTER_ID, &ids)
						.await
						.map_err(|e| DirectoryError::Storage(e.to_string()))?
					{
						return Ok(());
					}
				}
				Err(e) => return Err(DirectoryError::Storage(e.to_string())),
			}
		}
		Err(DirectoryError::Storage(
			"roster index contention exceeded retry budget".to_string(),
		))
	}

	/// Compare-and-swap loop over one worker record.
	async fn mutate_worker<F>(&self, worker_id: &str, mutate: F) -> Result<bool, DirectoryError>
	where
		F: Fn(&mut Worker) -> bool,
	{
		let namespace = StorageKey::Workers.as_str();
		for _ in 0..MAX_CAS_RETRIES {
			let (mut worker, snapshot) = self
				.storage
				.retrieve_versioned::<Worker>(namespace, worker_id)
				.await
				.map_err(|e| match e {
					StorageError::NotFound => DirectoryError::NotFound(worker_id.to_string()),
					other => DirectoryError::Storage(other.to_string()),
				})?;

			if !mutate(&mut worker) {
				return Ok(false);
			}

			if self
				.storage
				.swap(namespace, worker_id, &snapshot, &worker)
				.await
				.map_err(|e| DirectoryError::Storage(e.to_string()))?
			{
				return Ok(true);
			}
			// Lost the race; re-read and re-check eligibility.
		}
		Err(DirectoryError::Storage(
			"worker record contention exceeded retry budget".to_string(),
		))
	}
}

#[async_trait]
impl DirectoryInterface for LocalDirectory {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(LocalDirectorySchema)
	}

	async fn list_workers(&self) -> Result<Vec<Worker>, DirectoryError> {
		let mut workers = Vec::new();
		for id in self.roster().await? {
			match self
				.storage
				.retrieve::<Worker>(StorageKey::Workers.as_str(), &id)
				.await
			{
				Ok(worker) => workers.push(worker),
				// Roster entry without a record: deleted concurrently.
				Err(StorageError::NotFound) => continue,
				Err(e) => return Err(DirectoryError::Storage(e.to_string())),
			}
		}
		Ok(workers)
	}

	async fn get_worker(&self, worker_id: &str) -> Result<Worker, DirectoryError> {
		self.storage
			.retrieve(StorageKey::Workers.as_str(), worker_id)
			.await
			.map_err(|e| match e {
				StorageError::NotFound => DirectoryError::NotFound(worker_id.to_string()),
				other => DirectoryError::Storage(other.to_string()),
			})
	}

	async fn upsert_worker(&self, worker: &Worker) -> Result<(), DirectoryError> {
		self.storage
			.store(StorageKey::Workers.as_str(), &worker.id, worker)
			.await
			.map_err(|e| DirectoryError::Storage(e.to_string()))?;
		self.index_worker(&worker.id).await
	}

	#[instrument(skip(self))]
	async fn reserve(&self, worker_id: &str) -> Result<bool, DirectoryError> {
		self.mutate_worker(worker_id, |worker| {
			if !worker.is_eligible() {
				return false;
			}
			worker.current_workload += 1;
			true
		})
		.await
	}

	#[instrument(skip(self))]
	async fn release(&self, worker_id: &str) -> Result<(), DirectoryError> {
		self.mutate_worker(worker_id, |worker| {
			if worker.current_workload == 0 {
				return false;
			}
			worker.current_workload -= 1;
			true
		})
		.await?;
		Ok(())
	}
}

/// Configuration schema for LocalDirectory.
pub struct LocalDirectorySchema;

impl ConfigSchema for LocalDirectorySchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		// The local directory reads everything from shared storage.
		Schema::new(vec![], vec![]).validate(config)
	}
}

/// Registry for the storage-backed directory implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "local";
	type Factory = crate::DirectoryFactory;

	fn factory() -> Self::Factory {
		create_directory
	}
}

impl crate::DirectoryRegistry for Registry {}

/// Factory function to create the storage-backed directory.
pub fn create_directory(
	_config: &toml::Value,
	storage: Arc<StorageService>,
) -> Result<Box<dyn DirectoryInterface>, DirectoryError> {
	Ok(Box::new(LocalDirectory::new(storage)))
}
