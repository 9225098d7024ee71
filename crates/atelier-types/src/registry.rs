//! Registry trait for self-registering implementations.
//!
//! Every pluggable implementation (storage backend, gateway, allocation
//! strategy, directory) provides a Registry struct implementing this trait,
//! declaring the name used in configuration files and a factory function.

/// Base trait for implementation registries.
pub trait ImplementationRegistry {
	/// The name used in configuration files to reference this
	/// implementation, for example:
	/// - "memory" for storage.implementations.memory
	/// - "razorpay" for payment.implementations.razorpay
	const NAME: &'static str;

	/// The factory function type this implementation provides. Each module
	/// defines its own factory type (StorageFactory, GatewayFactory, ...).
	type Factory;

	/// Get the factory function for this implementation.
	fn factory() -> Self::Factory;
}
