//! Webhook ingestion and automation-trigger pipeline.
//!
//! The ingestion service validates and sanitizes inbound payloads,
//! enforces per-organization idempotency, persists the event, and hands
//! it to the trigger matcher, which fans matched workflows out into
//! automation runs and queued jobs.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod ingest;
pub mod matcher;

pub use ingest::{Actor, FieldError, IngestError, IngestOutcome, IngestRequest, IngestService};
pub use matcher::{FanOut, TriggerMatcher};
