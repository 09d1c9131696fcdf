//! The transcode stage.
//!
//! [`Transcoder`] is the seam the pipeline drives; [`FfmpegTranscoder`] is the
//! production implementation. It resolves the request's transform into an
//! explicit argument vector, runs the tool under a wall-clock bound and the
//! run's cancellation token, and reports the exit status together with a
//! bounded tail of diagnostics. When transcoding is disabled in config the
//! source is copied through unmodified.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use mr_core::config::TranscodeConfig;
use mr_core::{Error, TranscodeReason};

use crate::command::{CommandError, ToolCommand};
use crate::tools::ToolRegistry;
use crate::transform::TransformSpec;

/// Readiness of the transcoder, as reported by health checks.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TranscoderStatus {
    pub enabled: bool,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl TranscoderStatus {
    /// Ready means the stage can run: disabled (passthrough) or tool present.
    pub fn ready(&self) -> bool {
        !self.enabled || self.available
    }
}

/// What one transcode invocation produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeOutcome {
    /// `None` when the tool was ended by a signal.
    pub exit_code: Option<i32>,
    /// Bounded tail of the tool's stderr.
    pub diagnostics: String,
    /// The source was copied through without running the tool.
    pub passthrough: bool,
}

impl TranscodeOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Turn a failed exit into `TranscodeError{nonZeroExit}` with diagnostics.
    pub fn into_result(self) -> mr_core::Result<Self> {
        if self.success() {
            return Ok(self);
        }
        let status = match self.exit_code {
            Some(code) => format!("exit code {code}"),
            None => "termination by signal".to_string(),
        };
        Err(Error::Transcode {
            reason: TranscodeReason::NonZeroExit,
            message: format!("transcoder failed with {status}"),
            diagnostics: Some(self.diagnostics),
        })
    }
}

/// The transcode stage as seen by the pipeline.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Report whether the stage can run without touching any media.
    fn readiness(&self) -> TranscoderStatus;

    /// Check that `transform` can be applied. Runs before any fetch.
    fn prepare(&self, transform: &TransformSpec) -> mr_core::Result<()> {
        transform.resolve().map(|_| ())
    }

    /// Transform `input` into `output`.
    ///
    /// A tool that runs and exits non-zero yields `Ok` with the exit code in
    /// the outcome; call [`TranscodeOutcome::into_result`] to turn it into an
    /// error.
    async fn run(
        &self,
        input: &Path,
        output: &Path,
        transform: &TransformSpec,
        cancel: &CancellationToken,
    ) -> mr_core::Result<TranscodeOutcome>;
}

/// Transcoder backed by the ffmpeg executable found at discovery.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    registry: Arc<ToolRegistry>,
    enabled: bool,
    timeout: Duration,
    max_diagnostic_bytes: usize,
}

impl FfmpegTranscoder {
    pub fn new(config: &TranscodeConfig, registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            enabled: config.enabled,
            timeout: config.timeout(),
            max_diagnostic_bytes: config.max_diagnostic_bytes,
        }
    }

    async fn passthrough(&self, input: &Path, output: &Path) -> mr_core::Result<TranscodeOutcome> {
        tokio::fs::copy(input, output).await?;
        tracing::debug!(output = %output.display(), "Transcoding disabled; copied source through");
        Ok(TranscodeOutcome {
            exit_code: Some(0),
            diagnostics: String::new(),
            passthrough: true,
        })
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    fn readiness(&self) -> TranscoderStatus {
        let info = self.registry.info("ffmpeg");
        TranscoderStatus {
            enabled: self.enabled,
            available: info.map(|i| i.available).unwrap_or(false),
            version: info.and_then(|i| i.version.clone()),
        }
    }

    fn prepare(&self, transform: &TransformSpec) -> mr_core::Result<()> {
        // An explicit filter is checked even when the source will pass through.
        transform.resolve()?;
        if self.enabled {
            self.registry.require("ffmpeg")?;
        }
        Ok(())
    }

    async fn run(
        &self,
        input: &Path,
        output: &Path,
        transform: &TransformSpec,
        cancel: &CancellationToken,
    ) -> mr_core::Result<TranscodeOutcome> {
        if !self.enabled {
            return self.passthrough(input, output).await;
        }

        let ffmpeg = self.registry.require("ffmpeg")?;
        let plan = transform.resolve()?;

        let mut cmd = ToolCommand::new(ffmpeg.path.clone());
        cmd.args(plan.args(input, output))
            .timeout(self.timeout)
            .max_stderr_bytes(self.max_diagnostic_bytes)
            .cancel_on(cancel.clone());

        tracing::debug!(style = %plan.label, args = ?cmd.get_args(), "Running ffmpeg");

        let out = cmd.execute().await.map_err(|e| match e {
            CommandError::Spawn { .. } => {
                Error::transcode(TranscodeReason::ToolNotAvailable, e.to_string())
            }
            CommandError::Timeout { .. } => Error::transcode(TranscodeReason::Timeout, e.to_string()),
            CommandError::Cancelled { .. } => Error::Cancelled(e.to_string()),
            CommandError::Wait { .. } => Error::Internal(e.to_string()),
        })?;

        if out.stderr_truncated {
            tracing::debug!("ffmpeg diagnostics truncated to {} bytes", self.max_diagnostic_bytes);
        }

        Ok(TranscodeOutcome {
            exit_code: out.exit_code,
            diagnostics: out.stderr,
            passthrough: false,
        })
    }
}
