//! Main entry point for the atelier fulfillment service.
//!
//! This binary wires the concrete implementations into a fulfillment engine
//! that places orders, verifies payments, allocates tailors and tracks the
//! order lifecycle. Components are pluggable through configuration.

use atelier_config::Config;
use atelier_core::{FulfillmentBuilder, FulfillmentCommand, FulfillmentFactories};
use clap::Parser;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Command-line arguments for the fulfillment service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,
}

/// Main entry point for the fulfillment service.
///
/// This function:
/// 1. Parses command-line arguments
/// 2. Initializes logging infrastructure
/// 3. Loads configuration from file
/// 4. Builds the fulfillment engine with all implementations
/// 5. Runs the engine until interrupted
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	// Initialize tracing with env filter
	use tracing_subscriber::{fmt, EnvFilter};

	let default_directive = args.log_level.to_string();
	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started fulfillment service");

	// Load configuration
	let config = Config::from_file_async(&args.config).await?;
	tracing::info!("Loaded configuration [{}]", config.service.id);

	// Build the engine with all registered implementations
	let engine = FulfillmentBuilder::new(config).build(factories())?;

	// The sender side is the integration surface for a transport layer;
	// keeping it open holds the command loop alive until shutdown.
	let (_command_tx, command_rx) = mpsc::unbounded_channel::<FulfillmentCommand>();
	engine.run(command_rx).await?;

	tracing::info!("Stopped fulfillment service");
	Ok(())
}

/// Collects the factories of every registered implementation.
fn factories() -> FulfillmentFactories<
	atelier_storage::StorageFactory,
	atelier_directory::DirectoryFactory,
	atelier_allocation::AllocatorFactory,
	atelier_payment::GatewayFactory,
> {
	FulfillmentFactories {
		storage_factories: collect(atelier_storage::get_all_implementations()),
		directory_factories: collect(atelier_directory::get_all_implementations()),
		allocator_factories: collect(atelier_allocation::get_all_implementations()),
		gateway_factories: collect(atelier_payment::get_all_implementations()),
	}
}

fn collect<F>(implementations: Vec<(&'static str, F)>) -> HashMap<String, F> {
	implementations
		.into_iter()
		.map(|(name, factory)| (name.to_string(), factory))
		.collect()
}
