//! External tool detection and management.
//!
//! The [`ToolRegistry`] discovers the transcoding tool once at startup,
//! verifies that it can actually be executed, and caches the answer. After
//! construction the registry is read-only and shared through an `Arc`, so
//! concurrent runs consult it without locking.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use mr_core::config::ToolsConfig;
use mr_core::{Error, TranscodeReason};

/// Known tool names that the registry manages.
const KNOWN_TOOLS: &[&str] = &["ffmpeg"];

/// Resolved location of a single external tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Human-readable tool name (e.g. "ffmpeg").
    pub name: String,
    /// Resolved path to the executable.
    pub path: PathBuf,
}

/// Availability information for a tool, cached at discovery time.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ToolInfo {
    /// Tool name.
    pub name: String,
    /// Whether the tool was found and could be spawned.
    pub available: bool,
    /// Version string (first line of `-version` output), if available.
    pub version: Option<String>,
    /// Resolved path to the executable.
    #[schema(value_type = Option<String>)]
    pub path: Option<PathBuf>,
}

/// Registry holding discovered tool configurations.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolConfig>,
    infos: Vec<ToolInfo>,
}

impl ToolRegistry {
    /// Discover tools by searching `PATH` (or using overrides from config).
    ///
    /// For each known tool, if the config supplies a custom path **and** that
    /// path exists, it is used directly. Otherwise [`which::which`] is used to
    /// locate the tool in `PATH`. A tool counts as available only when it can
    /// be spawned; tools that cannot are left out of the lookup table.
    pub fn discover(tools_config: &ToolsConfig) -> Self {
        let mut tools = HashMap::new();
        let mut infos = Vec::with_capacity(KNOWN_TOOLS.len());

        for &name in KNOWN_TOOLS {
            let custom_path = match name {
                "ffmpeg" => tools_config.ffmpeg_path.as_deref(),
                _ => None,
            };

            let resolved = match custom_path {
                Some(p) if p.exists() => Some(p.to_path_buf()),
                Some(p) => {
                    tracing::warn!(
                        "Configured {name} path {} does not exist; searching PATH",
                        p.display()
                    );
                    which::which(name).ok()
                }
                None => which::which(name).ok(),
            };

            let Some(path) = resolved else {
                infos.push(ToolInfo {
                    name: name.to_string(),
                    available: false,
                    version: None,
                    path: None,
                });
                continue;
            };

            let probe = probe_executable(name, &path);
            if probe.spawned {
                tools.insert(
                    name.to_string(),
                    ToolConfig {
                        name: name.to_string(),
                        path: path.clone(),
                    },
                );
            }
            infos.push(ToolInfo {
                name: name.to_string(),
                available: probe.spawned,
                version: probe.version,
                path: Some(path),
            });
        }

        Self { tools, infos }
    }

    /// Return the [`ToolConfig`] for the given tool, or a
    /// `TranscodeError{toolNotAvailable}` if discovery did not find it.
    pub fn require(&self, name: &str) -> mr_core::Result<&ToolConfig> {
        self.tools.get(name).ok_or_else(|| {
            Error::transcode(
                TranscodeReason::ToolNotAvailable,
                format!("{name} not found; is it installed and in PATH?"),
            )
        })
    }

    /// Cached availability for one tool.
    pub fn info(&self, name: &str) -> Option<&ToolInfo> {
        self.infos.iter().find(|i| i.name == name)
    }

    /// Cached availability for all known tools.
    pub fn check_all(&self) -> Vec<ToolInfo> {
        self.infos.clone()
    }
}

struct Probe {
    spawned: bool,
    version: Option<String>,
}

/// Run `<tool> -version` once and keep the first line of stdout.
fn probe_executable(name: &str, path: &Path) -> Probe {
    let version_arg = match name {
        "ffmpeg" => "-version",
        _ => "--version",
    };

    let output = match std::process::Command::new(path).arg(version_arg).output() {
        Ok(output) => output,
        Err(e) => {
            tracing::warn!("{name} at {} cannot be executed: {e}", path.display());
            return Probe {
                spawned: false,
                version: None,
            };
        }
    };

    let version = output
        .status
        .success()
        .then(|| {
            String::from_utf8_lossy(&output.stdout)
                .lines()
                .next()
                .map(|s| s.to_string())
        })
        .flatten();

    Probe {
        spawned: true,
        version,
    }
}
