// Port Layer - Interfaces for external collaborators

pub mod connection;
pub mod context;
pub mod id_provider; // For deterministic testing
pub mod persistence;
pub mod remote;

// Re-exports
pub use connection::{Connection, ConnectionSource, Statement};
pub use context::ContextAccessor;
pub use id_provider::IdProvider;
pub use persistence::{DataChannel, PersistenceContext, PersistenceRuntime};
pub use remote::{RemoteService, RemoteSession};
