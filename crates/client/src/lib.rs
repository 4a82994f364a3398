//! txbridge client - talks to a remote object persistence endpoint
//!
//! # Example
//!
//! ```no_run
//! use txbridge_client::{ClientProperties, RopClient};
//! use txbridge_core::domain::{Change, Record};
//!
//! # async fn example(record: Record) -> Result<(), Box<dyn std::error::Error>> {
//! let client = RopClient::connect(&ClientProperties::new(
//!     "http://127.0.0.1:9527/cayenne-service",
//! ))?;
//!
//! let session = client.establish_shared_session("board").await?;
//! let applied = client.commit(&session, vec![Change::Insert(record)]).await?;
//! println!("{applied} changes committed");
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod error;
mod types;

pub use client::RopClient;
pub use config::ClientProperties;
pub use error::{ClientError, Result};
pub use types::{ESTABLISH_SESSION, ESTABLISH_SHARED_SESSION};
