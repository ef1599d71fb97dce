//! Middleware layers: authentication and rate limiting.

pub mod auth;
pub mod rate_limit;
