//! Transform resolution: named styles and explicit filter expressions.
//!
//! A request's [`TransformSpec`] resolves to a [`TranscodePlan`], which in
//! turn renders a fixed ffmpeg argument vector. Style names map through the
//! closed [`Style`] enum; unknown names fall back to [`Style::Default`].
//! Explicit filter expressions are checked before they are handed to the
//! tool and rejected with `invalidArguments` when unsafe or malformed.

use std::path::Path;

use serde::{Deserialize, Serialize};

use mr_core::{Error, TranscodeReason};

/// Longest accepted explicit filter expression.
const MAX_FILTER_LEN: usize = 1024;

/// Filters an explicit expression may name. None of them can open a file,
/// a socket, or a command script.
const ALLOWED_FILTERS: &[&str] = &[
    "boxblur", "chromashift", "colorbalance", "colorchannelmixer", "copy", "crop",
    "deflicker", "drawbox", "edgedetect", "eq", "fade", "format", "fps", "gblur",
    "hflip", "hqdn3d", "hstack", "hue", "lutrgb", "lutyuv", "negate", "noise",
    "null", "overlay", "pad", "reverse", "rotate", "scale", "setdar", "setpts",
    "setsar", "smartblur", "split", "transpose", "trim", "unsharp", "vflip",
    "vignette", "vstack",
];

/// Option keys that take a path, rejected on any filter.
const FILE_OPTIONS: &[&str] = &[
    "file", "filename", "fontfile", "textfile", "psfile", "filter_script",
];

/// Enumerable style presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Style {
    Default,
    Grayscale,
    Sepia,
    Vintage,
    Cinematic,
    Blur,
    Mirror,
    Compress,
}

impl Style {
    pub const ALL: [Style; 8] = [
        Style::Default,
        Style::Grayscale,
        Style::Sepia,
        Style::Vintage,
        Style::Cinematic,
        Style::Blur,
        Style::Mirror,
        Style::Compress,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Style::Default => "default",
            Style::Grayscale => "grayscale",
            Style::Sepia => "sepia",
            Style::Vintage => "vintage",
            Style::Cinematic => "cinematic",
            Style::Blur => "blur",
            Style::Mirror => "mirror",
            Style::Compress => "compress",
        }
    }

    /// Exact, case-insensitive lookup.
    pub fn parse(name: &str) -> Option<Style> {
        let name = name.trim();
        Style::ALL
            .into_iter()
            .find(|s| s.name().eq_ignore_ascii_case(name))
    }

    /// Lookup that falls back to [`Style::Default`] for unknown names.
    pub fn resolve(name: &str) -> Style {
        Style::parse(name).unwrap_or_else(|| {
            tracing::warn!(style = %name, "Unknown style; falling back to default");
            Style::Default
        })
    }

    fn video_filter(&self) -> Option<&'static str> {
        match self {
            Style::Default => None,
            Style::Grayscale => Some("hue=s=0"),
            Style::Sepia => Some(
                "colorchannelmixer=.393:.769:.189:0:.349:.686:.168:0:.272:.534:.131",
            ),
            Style::Vintage => Some("curves=preset=vintage,vignette=PI/5"),
            Style::Cinematic => Some("eq=contrast=1.1:saturation=1.15,curves=preset=medium_contrast"),
            Style::Blur => Some("boxblur=4:1"),
            Style::Mirror => Some("hflip"),
            Style::Compress => Some("scale=-2:'min(720,ih)'"),
        }
    }

    /// `(crf, x264 preset)` for the style.
    fn quality(&self) -> (u8, &'static str) {
        match self {
            Style::Compress => (30, "faster"),
            _ => (23, "veryfast"),
        }
    }
}

/// How a request asks for the media to be altered.
///
/// Accepted JSON shapes: `"grayscale"`, `{"style": "grayscale"}`, or
/// `{"filter": "hue=s=0"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(untagged)]
pub enum TransformSpec {
    Filter { filter: String },
    Preset { style: String },
    Named(String),
}

impl TransformSpec {
    pub fn style(name: impl Into<String>) -> Self {
        TransformSpec::Named(name.into())
    }

    pub fn filter(expr: impl Into<String>) -> Self {
        TransformSpec::Filter {
            filter: expr.into(),
        }
    }

    /// Turn the transform into a concrete plan.
    ///
    /// # Errors
    ///
    /// `TranscodeError{invalidArguments}` when an explicit filter fails
    /// validation. Style names never fail.
    pub fn resolve(&self) -> mr_core::Result<TranscodePlan> {
        match self {
            TransformSpec::Named(name) | TransformSpec::Preset { style: name } => {
                let style = Style::resolve(name);
                let (crf, preset) = style.quality();
                Ok(TranscodePlan {
                    label: style.name().to_string(),
                    video_filter: style.video_filter().map(str::to_string),
                    crf,
                    preset,
                })
            }
            TransformSpec::Filter { filter } => {
                validate_filter(filter)?;
                Ok(TranscodePlan {
                    label: "filter".to_string(),
                    video_filter: Some(filter.trim().to_string()),
                    crf: 23,
                    preset: "veryfast",
                })
            }
        }
    }
}

/// A resolved transform, ready to render into tool arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodePlan {
    /// Style name, or `filter` for explicit expressions.
    pub label: String,
    pub video_filter: Option<String>,
    pub crf: u8,
    pub preset: &'static str,
}

impl TranscodePlan {
    /// Render the ffmpeg argument vector.
    ///
    /// Codec settings follow the output container inferred from the output
    /// file's extension; containers outside the H.264/AAC family keep
    /// ffmpeg's own defaults.
    pub fn args(&self, input: &Path, output: &Path) -> Vec<String> {
        let mut args: Vec<String> = ["-hide_banner", "-nostdin", "-y", "-i"]
            .into_iter()
            .map(String::from)
            .collect();
        args.push(input.to_string_lossy().to_string());

        if let Some(ref vf) = self.video_filter {
            args.push("-vf".into());
            args.push(vf.clone());
        }

        let ext = output
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        if matches!(ext.as_str(), "mp4" | "m4v" | "mov" | "mkv") {
            args.extend(
                [
                    "-c:v", "libx264", "-preset", self.preset, "-crf",
                ]
                .into_iter()
                .map(String::from),
            );
            args.push(self.crf.to_string());
            args.extend(
                ["-pix_fmt", "yuv420p", "-c:a", "aac", "-b:a", "128k"]
                    .into_iter()
                    .map(String::from),
            );
            if ext != "mkv" {
                args.push("-movflags".into());
                args.push("+faststart".into());
            }
        }

        args.push(output.to_string_lossy().to_string());
        args
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::transcode(TranscodeReason::InvalidArguments, message)
}

/// Reject filter expressions that are malformed or reach outside the graph.
fn validate_filter(filter: &str) -> mr_core::Result<()> {
    let trimmed = filter.trim();

    if trimmed.is_empty() {
        return Err(invalid("filter expression is empty"));
    }
    if trimmed.len() > MAX_FILTER_LEN {
        return Err(invalid(format!(
            "filter expression exceeds {MAX_FILTER_LEN} bytes"
        )));
    }
    if trimmed.chars().any(char::is_control) {
        return Err(invalid("filter expression contains control characters"));
    }
    if trimmed.starts_with('-') {
        return Err(invalid("filter expression must not start with '-'"));
    }
    // ffmpeg unescapes names and keys, so quoting could disguise either.
    if trimmed.contains(['\'', '"', '\\']) {
        return Err(invalid("filter expression must not contain quotes or backslashes"));
    }

    let mut depth: i32 = 0;
    for c in trimmed.chars() {
        match c {
            '[' => depth += 1,
            ']' => depth -= 1,
            _ => {}
        }
        if depth < 0 {
            break;
        }
    }
    if depth != 0 {
        return Err(invalid("filter expression has unbalanced link labels"));
    }

    for segment in trimmed.split([',', ';']) {
        let name = filter_name(segment);
        if name.is_empty() {
            return Err(invalid(format!("empty filter in '{trimmed}'")));
        }
        if !ALLOWED_FILTERS.contains(&name.as_str()) {
            return Err(invalid(format!("filter '{name}' is not permitted")));
        }
        if let Some(key) = option_keys(segment).find(|k| FILE_OPTIONS.contains(k)) {
            return Err(invalid(format!("option '{key}' is not permitted")));
        }
    }

    Ok(())
}

/// Extract the filter name from one chain segment, skipping `[label]`s.
fn filter_name(segment: &str) -> String {
    let mut rest = segment.trim();
    while let Some(stripped) = rest.strip_prefix('[') {
        rest = match stripped.find(']') {
            Some(end) => stripped[end + 1..].trim_start(),
            None => "",
        };
    }
    rest.split(['=', '@', '['])
        .next()
        .unwrap_or("")
        .trim()
        .to_string()
}

/// Keys of the `key=value` pairs in one segment's option list.
fn option_keys(segment: &str) -> impl Iterator<Item = &str> {
    let options = segment
        .split_once('=')
        .map(|(_, rest)| rest.split('[').next().unwrap_or(""))
        .unwrap_or("");
    options
        .split(':')
        .filter_map(|pair| pair.split_once('=').map(|(key, _)| key.trim()))
}
