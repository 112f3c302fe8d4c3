//! Registry trait for self-registering implementations.
//!
//! Pluggable capability crates (storage backends, identity providers)
//! expose a `Registry` struct implementing this trait so that every
//! implementation declares its configuration name and factory function.

/// Base trait for implementation registries.
///
/// Each implementation module must provide a Registry struct implementing
/// this trait, tying the name used in configuration files to the factory
/// that builds the implementation.
pub trait ImplementationRegistry {
	/// The name used in configuration files to reference this
	/// implementation, for example:
	/// - "memory" for storage.implementations.memory
	/// - "fixed" for identity.implementations.fixed
	const NAME: &'static str;

	/// The factory function type this implementation provides; each
	/// capability crate defines its own (e.g. `BackendFactory` for storage
	/// backends).
	type Factory;

	/// Get the factory function for this implementation.
	fn factory() -> Self::Factory;
}
