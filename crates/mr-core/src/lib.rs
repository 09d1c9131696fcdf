//! mr-core: shared errors, configuration, and identifiers.
//!
//! This crate is the foundational dependency for the other mr-* crates. It
//! carries the unified [`Error`] type with its machine-readable reason codes,
//! the immutable application [`config::Config`], and the [`RequestId`] used to
//! correlate a pipeline run across logs, scratch directories, and responses.

pub mod config;
pub mod error;
pub mod ids;

pub use error::{Error, FetchReason, PublishReason, Result, TranscodeReason};
pub use ids::{InstanceId, RequestId};
