//! Builder pattern for constructing fulfillment engines.
//!
//! Provides a flexible way to compose a FulfillmentEngine from pluggable
//! implementations using factory functions. Supports configurable storage
//! backends, worker directories, allocation strategies and payment gateways.

use crate::engine::{event_bus::EventBus, FulfillmentEngine};
use atelier_allocation::{AllocationError, AllocationService, AllocatorInterface};
use atelier_config::Config;
use atelier_directory::{DirectoryError, DirectoryInterface, DirectoryService};
use atelier_payment::{GatewayInterface, PaymentError, PaymentService};
use atelier_storage::{StorageError, StorageInterface, StorageService};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during engine construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Container for all factory functions needed to build a FulfillmentEngine.
///
/// Each factory takes a TOML configuration value (plus the services it
/// layers on) and returns the corresponding implementation.
pub struct FulfillmentFactories<SF, DF, AF, GF> {
	pub storage_factories: HashMap<String, SF>,
	pub directory_factories: HashMap<String, DF>,
	pub allocator_factories: HashMap<String, AF>,
	pub gateway_factories: HashMap<String, GF>,
}

/// Builder for constructing a FulfillmentEngine with pluggable implementations.
pub struct FulfillmentBuilder {
	config: Config,
}

impl FulfillmentBuilder {
	/// Creates a new FulfillmentBuilder with the given configuration.
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	/// Builds the FulfillmentEngine using factories for each component type.
	///
	/// Services are constructed in dependency order: storage first, then the
	/// directory over storage, the allocator over the directory, and the
	/// gateway standalone.
	pub fn build<SF, DF, AF, GF>(
		self,
		factories: FulfillmentFactories<SF, DF, AF, GF>,
	) -> Result<FulfillmentEngine, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
		DF: Fn(&toml::Value, Arc<StorageService>) -> Result<Box<dyn DirectoryInterface>, DirectoryError>,
		AF: Fn(&toml::Value, Arc<DirectoryService>) -> Result<Box<dyn AllocatorInterface>, AllocationError>,
		GF: Fn(&toml::Value) -> Result<Box<dyn GatewayInterface>, PaymentError>,
	{
		// Create the primary storage backend
		let primary_storage = &self.config.storage.primary;
		let storage_config = self
			.config
			.storage
			.implementations
			.get(primary_storage)
			.ok_or_else(|| {
				BuilderError::Config(format!("Primary storage '{}' not configured", primary_storage))
			})?;
		let storage_factory = factories.storage_factories.get(primary_storage).ok_or_else(|| {
			BuilderError::MissingComponent(format!("storage factory '{}'", primary_storage))
		})?;
		let storage_backend = storage_factory(storage_config).map_err(|e| {
			tracing::error!(
				component = "storage",
				implementation = %primary_storage,
				error = %e,
				"Failed to create storage implementation"
			);
			BuilderError::Config(format!(
				"Failed to create storage implementation '{}': {}",
				primary_storage, e
			))
		})?;
		let storage = Arc::new(StorageService::new(storage_backend));
		tracing::info!(component = "storage", implementation = %primary_storage, "Loaded");

		// Create the worker directory over the shared storage
		let primary_directory = &self.config.directory.primary;
		let directory_config = self
			.config
			.directory
			.implementations
			.get(primary_directory)
			.ok_or_else(|| {
				BuilderError::Config(format!(
					"Primary directory '{}' not configured",
					primary_directory
				))
			})?;
		let directory_factory =
			factories.directory_factories.get(primary_directory).ok_or_else(|| {
				BuilderError::MissingComponent(format!("directory factory '{}'", primary_directory))
			})?;
		let directory_impl =
			directory_factory(directory_config, storage.clone()).map_err(|e| {
				tracing::error!(
					component = "directory",
					implementation = %primary_directory,
					error = %e,
					"Failed to create directory implementation"
				);
				BuilderError::Config(format!(
					"Failed to create directory implementation '{}': {}",
					primary_directory, e
				))
			})?;
		let directory = Arc::new(DirectoryService::new(directory_impl));
		tracing::info!(component = "directory", implementation = %primary_directory, "Loaded");

		// Create the allocation strategy over the directory
		let primary_allocator = &self.config.allocation.primary;
		let allocator_config = self
			.config
			.allocation
			.implementations
			.get(primary_allocator)
			.ok_or_else(|| {
				BuilderError::Config(format!(
					"Primary allocator '{}' not configured",
					primary_allocator
				))
			})?;
		let allocator_factory =
			factories.allocator_factories.get(primary_allocator).ok_or_else(|| {
				BuilderError::MissingComponent(format!("allocator factory '{}'", primary_allocator))
			})?;
		let allocator_impl =
			allocator_factory(allocator_config, directory.clone()).map_err(|e| {
				tracing::error!(
					component = "allocation",
					implementation = %primary_allocator,
					error = %e,
					"Failed to create allocator implementation"
				);
				BuilderError::Config(format!(
					"Failed to create allocator implementation '{}': {}",
					primary_allocator, e
				))
			})?;
		let allocation = Arc::new(AllocationService::new(allocator_impl));
		tracing::info!(component = "allocation", implementation = %primary_allocator, "Loaded");

		// Create the payment gateway
		let primary_gateway = &self.config.payment.primary;
		let gateway_config = self
			.config
			.payment
			.implementations
			.get(primary_gateway)
			.ok_or_else(|| {
				BuilderError::Config(format!("Primary gateway '{}' not configured", primary_gateway))
			})?;
		let gateway_factory = factories.gateway_factories.get(primary_gateway).ok_or_else(|| {
			BuilderError::MissingComponent(format!("gateway factory '{}'", primary_gateway))
		})?;
		let gateway_impl = gateway_factory(gateway_config).map_err(|e| {
			tracing::error!(
				component = "payment",
				implementation = %primary_gateway,
				error = %e,
				"Failed to create gateway implementation"
			);
			BuilderError::Config(format!(
				"Failed to create gateway implementation '{}': {}",
				primary_gateway, e
			))
		})?;
		let payment = Arc::new(PaymentService::new(gateway_impl));
		tracing::info!(component = "payment", implementation = %primary_gateway, "Loaded");

		Ok(FulfillmentEngine::new(
			self.config,
			storage,
			directory,
			allocation,
			payment,
			EventBus::new(1000),
		))
	}
}
