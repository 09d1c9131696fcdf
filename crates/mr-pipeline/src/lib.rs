//! # mr-pipeline
//!
//! The processing pipeline: fetch a source, transcode it, publish the
//! artifact, and release the run's scratch space.
//!
//! - **[`ProcessRequest`]** -- a validated unit of work.
//! - **[`Fetcher`]** / **[`HttpFetcher`]** -- streamed, bounded source
//!   download.
//! - **[`Publisher`]** / **[`S3Publisher`]** -- signed upload to
//!   S3-compatible storage and public URL derivation.
//! - **[`Coordinator`]** -- sequences the stages under an admission limit,
//!   a run deadline, and cancellation, releasing the workspace on every
//!   exit path.

pub mod coordinator;
pub mod fetch;
pub mod publish;
pub mod request;
pub mod sigv4;

pub use coordinator::{Coordinator, PipelineHealth, RunFailure, RunReport, RunState, Stage};
pub use fetch::{Fetcher, HttpFetcher};
pub use publish::{public_url, PublishResult, Publisher, PublisherStatus, S3Publisher};
pub use request::ProcessRequest;
