// txbridge Infrastructure - SQLite Adapter
// Implements: ConnectionSource, Connection, DataChannel, runtime assembly

mod channel;
mod connection;
mod error;
mod migration;
mod runtime;

pub use channel::DocumentChannel;
pub use connection::{create_pool, SqliteConnection, SqliteConnectionSource};
pub use migration::{apply_script, run_migrations};
pub use runtime::{RuntimeCustomizer, SqliteRuntime, SqliteRuntimeBuilder};

// Note: sqlx::Error conversion is handled by wrapping in helper functions
// due to Rust's orphan rules (cannot implement From<sqlx::Error> for AppError here)
