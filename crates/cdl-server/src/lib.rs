//! HTTP server for the Civic Document Ledger.
//!
//! Exposes the ledger's public operations as JSON endpoints under `/v1`.

pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use router::build_router;
pub use server::CdlServer;
