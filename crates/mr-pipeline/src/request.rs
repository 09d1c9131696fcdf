//! The unit of work accepted by the pipeline.

use reqwest::Url;

use mr_av::TransformSpec;
use mr_core::{Error, RequestId};

/// Longest accepted storage key, in bytes.
const MAX_KEY_LEN: usize = 1024;

/// Longest accepted output extension.
const MAX_EXTENSION_LEN: usize = 8;

/// Extension used when the storage key carries none.
const DEFAULT_EXTENSION: &str = "mp4";

/// A validated processing request. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct ProcessRequest {
    request_id: RequestId,
    source: Url,
    storage_key: String,
    transform: Option<TransformSpec>,
    extension: String,
}

impl ProcessRequest {
    /// Validate the raw request fields.
    ///
    /// The output identity has leading `/` characters stripped and becomes
    /// the storage key verbatim otherwise; the system never invents keys.
    /// Surrounding whitespace is rejected rather than trimmed, so two
    /// different identities never name the same object.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] describing the first offending field.
    pub fn new(
        request_id: RequestId,
        source: &str,
        output_identity: &str,
        transform: Option<TransformSpec>,
    ) -> mr_core::Result<Self> {
        let source = parse_source(source)?;
        let storage_key = normalize_key(output_identity)?;
        let extension = extension_of(&storage_key);

        Ok(Self {
            request_id,
            source,
            storage_key,
            transform,
            extension,
        })
    }

    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    pub fn source(&self) -> &Url {
        &self.source
    }

    /// The normalized output identity.
    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    /// The requested transform, if the caller named one.
    pub fn transform(&self) -> Option<&TransformSpec> {
        self.transform.as_ref()
    }

    /// Lowercased output extension, `mp4` when the key has none.
    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn content_type(&self) -> &'static str {
        content_type_for(&self.extension)
    }
}

fn parse_source(raw: &str) -> mr_core::Result<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(Error::Validation("sourceLocation is required".into()));
    }

    let url = Url::parse(raw)
        .map_err(|e| Error::Validation(format!("sourceLocation is not a valid URL: {e}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::Validation(format!(
            "sourceLocation scheme '{}' is not supported; use http or https",
            url.scheme()
        )));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(Error::Validation("sourceLocation has no host".into()));
    }

    Ok(url)
}

fn normalize_key(raw: &str) -> mr_core::Result<String> {
    let key = raw.trim_start_matches('/');

    if key.is_empty() {
        return Err(Error::Validation("outputIdentity is required".into()));
    }
    if key.trim() != key {
        return Err(Error::Validation(
            "outputIdentity has leading or trailing whitespace".into(),
        ));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(Error::Validation(format!(
            "outputIdentity exceeds {MAX_KEY_LEN} bytes"
        )));
    }
    if key.chars().any(char::is_control) {
        return Err(Error::Validation(
            "outputIdentity contains control characters".into(),
        ));
    }
    if key.contains('\\') {
        return Err(Error::Validation("outputIdentity contains '\\'".into()));
    }
    for segment in key.split('/') {
        match segment {
            "" => {
                return Err(Error::Validation(
                    "outputIdentity contains an empty path segment".into(),
                ))
            }
            "." | ".." => {
                return Err(Error::Validation(format!(
                    "outputIdentity contains a '{segment}' segment"
                )))
            }
            _ => {}
        }
    }

    Ok(key.to_string())
}

fn extension_of(key: &str) -> String {
    let file = key.rsplit('/').next().unwrap_or(key);
    match file.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            ext.to_ascii_lowercase()
        }
        _ => DEFAULT_EXTENSION.to_string(),
    }
}

/// MIME type sent with the upload for a given output extension.
pub fn content_type_for(extension: &str) -> &'static str {
    match extension {
        "mp4" => "video/mp4",
        "m4v" => "video/x-m4v",
        "mov" => "video/quicktime",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "avi" => "video/x-msvideo",
        "ts" => "video/mp2t",
        "gif" => "image/gif",
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "aac" => "audio/aac",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "flac" => "audio/flac",
        _ => "application/octet-stream",
    }
}
