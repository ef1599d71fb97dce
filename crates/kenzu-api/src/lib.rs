//! HTTP boundary for the Kenzu ingestion pipeline.
//!
//! Exposes `POST /hooks/ingest`, API key management under
//! `/admin/api-keys`, and health probes. Requests flow through middleware
//! in order: request id, tracing, timeout, authentication (API key XOR
//! admin session), rate limiting, then the handler.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod server;
pub mod state;

pub use config::Config;
pub use error::ApiError;
pub use server::{create_router, start_server};
pub use state::{AppState, AuthContext, SessionContext};
