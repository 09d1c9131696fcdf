//! Unified error type for the mediarelay pipeline.
//!
//! Every stage funnels its failures into [`Error`]. Stage errors carry a
//! reason code (one of [`FetchReason`], [`TranscodeReason`],
//! [`PublishReason`]) so callers can branch on the failure without parsing
//! messages, and [`Error::http_status`] lets the HTTP layer pick a status.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Why retrieving the source asset failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum FetchReason {
    /// DNS resolution or connection establishment failed.
    Unreachable,
    /// The source answered with a status outside 2xx.
    Non2xx,
    /// The transfer exceeded its time bound.
    Timeout,
    /// The body could not be read, written to disk, or was too large.
    TransferError,
}

impl FetchReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchReason::Unreachable => "unreachable",
            FetchReason::Non2xx => "non2xx",
            FetchReason::Timeout => "timeout",
            FetchReason::TransferError => "transferError",
        }
    }
}

/// Why the external transcoding tool failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum TranscodeReason {
    /// The tool is not installed or not executable.
    ToolNotAvailable,
    /// The transform could not be turned into a safe argument vector.
    InvalidArguments,
    /// The tool ran and exited with a non-zero status.
    NonZeroExit,
    /// The tool exceeded its wall-clock budget and was killed.
    Timeout,
}

impl TranscodeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TranscodeReason::ToolNotAvailable => "toolNotAvailable",
            TranscodeReason::InvalidArguments => "invalidArguments",
            TranscodeReason::NonZeroExit => "nonZeroExit",
            TranscodeReason::Timeout => "timeout",
        }
    }
}

/// Why uploading the artifact failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum PublishReason {
    /// The store could not be reached or answered with a server error.
    StoreUnreachable,
    /// The store rejected the credentials or signature.
    AuthRejected,
    /// Endpoint, bucket, credentials, or public base URL are missing.
    NotConfigured,
}

impl PublishReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishReason::StoreUnreachable => "storeUnreachable",
            PublishReason::AuthRejected => "authRejected",
            PublishReason::NotConfigured => "notConfigured",
        }
    }
}

macro_rules! display_as_str {
    ($($ty:ty),+) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(self.as_str())
                }
            }
        )+
    };
}

display_as_str!(FetchReason, TranscodeReason, PublishReason);

/// Unified error type covering all failure modes of a pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Request data failed validation. Always caller-caused.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Retrieving the source asset failed.
    #[error("Fetch error [{reason}]: {message}")]
    Fetch {
        reason: FetchReason,
        message: String,
    },

    /// The transcoding tool could not run or did not succeed.
    #[error("Transcode error [{reason}]: {message}")]
    Transcode {
        reason: TranscodeReason,
        message: String,
        /// Bounded tail of the tool's standard error, when it ran.
        diagnostics: Option<String>,
    },

    /// Uploading the artifact failed.
    #[error("Publish error [{reason}]: {message}")]
    Publish {
        reason: PublishReason,
        message: String,
    },

    /// The run was cancelled or its deadline elapsed mid-stage.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// An I/O operation failed outside any stage's own error mapping.
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Convenience constructor for [`Error::Fetch`].
    pub fn fetch(reason: FetchReason, message: impl Into<String>) -> Self {
        Error::Fetch {
            reason,
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Transcode`] without diagnostics.
    pub fn transcode(reason: TranscodeReason, message: impl Into<String>) -> Self {
        Error::Transcode {
            reason,
            message: message.into(),
            diagnostics: None,
        }
    }

    /// Convenience constructor for [`Error::Publish`].
    pub fn publish(reason: PublishReason, message: impl Into<String>) -> Self {
        Error::Publish {
            reason,
            message: message.into(),
        }
    }

    /// Machine-readable error kind reported to callers.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_) => "ValidationError",
            Error::Fetch { .. } => "FetchError",
            Error::Transcode { .. } => "TranscodeError",
            Error::Publish { .. } => "PublishError",
            Error::Cancelled(_) => "Cancelled",
            Error::Io { .. } | Error::Internal(_) => "InternalError",
        }
    }

    /// Reason code for stage errors, `None` for kinds without one.
    pub fn reason(&self) -> Option<&'static str> {
        match self {
            Error::Fetch { reason, .. } => Some(reason.as_str()),
            Error::Transcode { reason, .. } => Some(reason.as_str()),
            Error::Publish { reason, .. } => Some(reason.as_str()),
            _ => None,
        }
    }

    /// Map this error to an appropriate HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::Validation(_) => 400,
            Error::Fetch { reason, .. } => match reason {
                FetchReason::Timeout => 504,
                _ => 502,
            },
            Error::Transcode { reason, .. } => match reason {
                TranscodeReason::ToolNotAvailable => 503,
                TranscodeReason::InvalidArguments => 400,
                TranscodeReason::NonZeroExit => 422,
                TranscodeReason::Timeout => 504,
            },
            Error::Publish { reason, .. } => match reason {
                PublishReason::NotConfigured => 503,
                PublishReason::AuthRejected | PublishReason::StoreUnreachable => 502,
            },
            Error::Cancelled(_) => 503,
            Error::Io { .. } | Error::Internal(_) => 500,
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
