//! HTTP request handlers.

pub mod api_keys;
pub mod health;
pub mod ingest;

pub use api_keys::{create_api_key, list_api_keys, revoke_api_key};
pub use health::{health_check, liveness_check};
pub use ingest::ingest_webhook;
