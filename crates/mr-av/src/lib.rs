//! # mr-av
//!
//! Scratch storage, external tool management, and transcoding for the
//! mediarelay pipeline.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find ffmpeg once at startup and
//!   cache whether it is executable, so runs can fail fast.
//! - **Command execution** ([`ToolCommand`]) -- async builder that spawns an
//!   explicit argument vector with a wall-clock timeout, cancellation, and a
//!   bounded stderr tail.
//! - **Workspace management** ([`WorkspaceManager`], [`Workspace`]) -- one
//!   collision-free scratch directory per run, released exactly once.
//! - **Transforms** ([`Style`], [`TransformSpec`]) -- enumerable presets and
//!   validated filter expressions resolved to ffmpeg arguments.
//! - **Transcoding** ([`Transcoder`], [`FfmpegTranscoder`]) -- runs the tool
//!   and reports a [`TranscodeOutcome`].

pub mod command;
pub mod tools;
pub mod transcoder;
pub mod transform;
pub mod workspace;

// ---- Re-exports for convenience ----

pub use command::{CommandError, ToolCommand, ToolOutput};
pub use tools::{ToolConfig, ToolInfo, ToolRegistry};
pub use transcoder::{FfmpegTranscoder, TranscodeOutcome, Transcoder, TranscoderStatus};
pub use transform::{Style, TranscodePlan, TransformSpec};
pub use workspace::{Workspace, WorkspaceManager};
