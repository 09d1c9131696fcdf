//! Application configuration types.
//!
//! The top-level [`Config`] is deserialized from JSON once at startup and then
//! handed, immutable and behind an `Arc`, to every collaborator that needs it.
//! Every section defaults sensibly so an empty `{}` file is valid; only the
//! storage section has no usable defaults, which the publisher reports as
//! `notConfigured` before any work is attempted.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::Error;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub tools: ToolsConfig,
    pub fetch: FetchConfig,
    pub transcode: TranscodeConfig,
    pub storage: StorageConfig,
    pub pipeline: PipelineConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Strictly load a configuration file; a missing or unparsable file is an
    /// error.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0; a random port will be assigned".into());
        }

        let missing = self.storage.missing_fields();
        if !missing.is_empty() {
            warnings.push(format!(
                "storage is not configured (missing: {}); every request will fail with notConfigured",
                missing.join(", ")
            ));
        }

        if self.pipeline.max_concurrent_runs == 0 {
            warnings.push("pipeline.max_concurrent_runs is 0; using 1".into());
        }

        if self.fetch.max_bytes == 0 {
            warnings.push("fetch.max_bytes is 0; every non-empty source will be rejected".into());
        }

        if !self.transcode.enabled {
            warnings.push(
                "transcode.enabled is false; sources will be published unmodified".into(),
            );
        }

        if let Some(ref base) = self.storage.public_base_url {
            if !(base.starts_with("http://") || base.starts_with("https://")) {
                warnings.push(format!(
                    "storage.public_base_url '{base}' is not an http(s) URL"
                ));
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
        }
    }
}

/// Paths to external CLI tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
}

/// Source retrieval bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Upper bound on the whole transfer, headers through last byte.
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Largest body accepted from a source.
    pub max_bytes: u64,
    pub max_redirects: usize,
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            connect_timeout_secs: 10,
            max_bytes: 2 * 1024 * 1024 * 1024,
            max_redirects: 5,
        }
    }
}

/// Transcoder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeConfig {
    /// When false the source is copied through unmodified.
    pub enabled: bool,
    pub timeout_secs: u64,
    /// Size of the stderr tail retained for diagnostics.
    pub max_diagnostic_bytes: usize,
    /// Style used when a request carries no transform.
    pub default_style: String,
}

impl TranscodeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: 1800,
            max_diagnostic_bytes: 8 * 1024,
            default_style: "default".into(),
        }
    }
}

/// S3-compatible object storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Base endpoint, e.g. `https://s3.eu-central-1.amazonaws.com`.
    pub endpoint: Option<String>,
    pub bucket: Option<String>,
    pub region: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    /// Public-read prefix joined with the storage key to form returned URLs.
    pub public_base_url: Option<String>,
    /// `true` for `endpoint/bucket/key`, `false` for `bucket.endpoint/key`.
    pub path_style: bool,
    pub timeout_secs: u64,
    /// Optional canned ACL sent as `x-amz-acl`.
    pub acl: Option<String>,
}

impl StorageConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Names of required settings that are absent or blank.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let required = [
            ("endpoint", &self.endpoint),
            ("bucket", &self.bucket),
            ("access_key", &self.access_key),
            ("secret_key", &self.secret_key),
            ("public_base_url", &self.public_base_url),
        ];

        required
            .into_iter()
            .filter(|(_, value)| value.as_deref().map_or(true, |v| v.trim().is_empty()))
            .map(|(name, _)| name)
            .collect()
    }

    pub fn is_configured(&self) -> bool {
        self.missing_fields().is_empty()
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            bucket: None,
            region: "us-east-1".into(),
            access_key: None,
            secret_key: None,
            public_base_url: None,
            path_style: true,
            timeout_secs: 120,
            acl: None,
        }
    }
}

/// Coordinator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Admission ceiling on simultaneous runs.
    pub max_concurrent_runs: usize,
    /// Deadline for one run end to end; `0` disables it.
    pub run_timeout_secs: u64,
    /// Root for per-run workspaces; the system temp dir when unset.
    pub scratch_dir: Option<PathBuf>,
}

impl PipelineConfig {
    pub fn run_timeout(&self) -> Option<Duration> {
        (self.run_timeout_secs > 0).then(|| Duration::from_secs(self.run_timeout_secs))
    }

    pub fn concurrency(&self) -> usize {
        self.max_concurrent_runs.max(1)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_runs: 4,
            run_timeout_secs: 3600,
            scratch_dir: None,
        }
    }
}
