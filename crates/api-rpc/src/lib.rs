//! JSON-RPC API Layer
//!
//! Exposes the remote object persistence service as a single JSON-RPC method
//! named after the configured endpoint.

pub mod error;
pub mod handler;
pub mod server;
pub mod types;

pub use handler::RopHandler;
pub use server::{RopServer, RopServerConfig};
