//! Compliance evaluation and access authorization engine for regulated
//! laboratory spaces.
//!
//! The [`engine`] module holds the domain model and all decision logic; the
//! remaining modules carry service plumbing for the HTTP binary.

pub mod config;
pub mod engine;
pub mod error;
pub mod telemetry;
