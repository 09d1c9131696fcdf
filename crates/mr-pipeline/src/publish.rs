//! Artifact publication to S3-compatible object storage.
//!
//! The caller-supplied storage key is used verbatim; the publisher never
//! invents keys, so republishing the same key overwrites the same object.
//! Missing configuration is reported as `notConfigured` by
//! [`Publisher::check_configured`] before any network attempt.

use std::path::Path;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Serialize;

use mr_core::config::StorageConfig;
use mr_core::{Error, PublishReason};

use crate::sigv4::{self, Credentials};

/// Where a published artifact lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PublishResult {
    pub storage_key: String,
    #[serde(rename = "publicURL")]
    pub public_url: String,
}

/// Readiness of the publisher, as reported by health checks.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct PublisherStatus {
    pub configured: bool,
    /// Names of missing storage settings.
    pub missing: Vec<String>,
}

/// The publish stage as seen by the pipeline.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Report configuration completeness without touching the network.
    fn status(&self) -> PublisherStatus;

    /// Fail with `notConfigured` when required settings are absent.
    fn check_configured(&self) -> mr_core::Result<()> {
        let status = self.status();
        if status.configured {
            Ok(())
        } else {
            Err(Error::publish(
                PublishReason::NotConfigured,
                format!("storage is missing: {}", status.missing.join(", ")),
            ))
        }
    }

    /// Upload `local` under `storage_key`.
    async fn publish(
        &self,
        local: &Path,
        storage_key: &str,
        content_type: &str,
    ) -> mr_core::Result<PublishResult>;
}

/// Publisher speaking the S3 `PutObject` API with Signature V4.
#[derive(Debug, Clone)]
pub struct S3Publisher {
    client: Client,
    config: StorageConfig,
}

/// Storage settings after the configured check.
struct Target<'a> {
    endpoint: &'a str,
    bucket: &'a str,
    public_base_url: &'a str,
    credentials: Credentials<'a>,
}

impl S3Publisher {
    pub fn new(config: &StorageConfig) -> mr_core::Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("mediarelay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Internal(format!("failed to build storage client: {e}")))?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    fn target(&self) -> mr_core::Result<Target<'_>> {
        self.check_configured()?;
        let c = &self.config;
        Ok(Target {
            endpoint: field(&c.endpoint),
            bucket: field(&c.bucket),
            public_base_url: field(&c.public_base_url),
            credentials: Credentials {
                access_key: field(&c.access_key),
                secret_key: field(&c.secret_key),
                region: c.region.as_str(),
            },
        })
    }
}

#[async_trait]
impl Publisher for S3Publisher {
    fn status(&self) -> PublisherStatus {
        let missing: Vec<String> = self
            .config
            .missing_fields()
            .into_iter()
            .map(String::from)
            .collect();
        PublisherStatus {
            configured: missing.is_empty(),
            missing,
        }
    }

    async fn publish(
        &self,
        local: &Path,
        storage_key: &str,
        content_type: &str,
    ) -> mr_core::Result<PublishResult> {
        let target = self.target()?;
        let url = object_url(target.endpoint, target.bucket, storage_key, self.config.path_style)?;

        let body = tokio::fs::read(local).await?;
        let size = body.len();
        let payload_hash = sigv4::sha256_hex(&body);

        let mut extra = vec![("content-type", content_type)];
        if let Some(acl) = self.config.acl.as_deref().filter(|a| !a.trim().is_empty()) {
            extra.push(("x-amz-acl", acl));
        }

        let signed = sigv4::sign(
            &target.credentials,
            "PUT",
            &url,
            &extra,
            &payload_hash,
            chrono::Utc::now(),
        )?;

        let mut request = self
            .client
            .put(url.clone())
            .header("authorization", signed.authorization);
        for (name, value) in &signed.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.body(body).send().await.map_err(|e| {
            Error::publish(PublishReason::StoreUnreachable, format!("PUT {url}: {e}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            let detail = detail.chars().take(512).collect::<String>();
            let reason = match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PublishReason::AuthRejected,
                _ => PublishReason::StoreUnreachable,
            };
            return Err(Error::publish(
                reason,
                format!("store answered HTTP {status}: {detail}"),
            ));
        }

        tracing::debug!(storage_key = %storage_key, bytes = size, "Artifact uploaded");

        Ok(PublishResult {
            storage_key: storage_key.to_string(),
            public_url: public_url(target.public_base_url, storage_key),
        })
    }
}

fn field(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or_default().trim()
}

/// Join `base` and `key` with exactly one `/`, URI-encoding the key.
pub fn public_url(base: &str, key: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        encode_key(key.trim_start_matches('/'))
    )
}

/// Percent-encode each `/`-separated segment of an object key.
pub fn encode_key(key: &str) -> String {
    key.split('/')
        .map(urlencoding::encode)
        .collect::<Vec<_>>()
        .join("/")
}

/// Address of `key` in `bucket`, path-style or virtual-host style.
fn object_url(endpoint: &str, bucket: &str, key: &str, path_style: bool) -> mr_core::Result<Url> {
    let endpoint = Url::parse(endpoint).map_err(|e| {
        Error::publish(
            PublishReason::NotConfigured,
            format!("storage endpoint '{endpoint}' is not a valid URL: {e}"),
        )
    })?;
    let base_path = endpoint.path().trim_end_matches('/');
    let key = encode_key(key);

    let raw = if path_style {
        format!(
            "{}{base_path}/{}/{key}",
            origin(&endpoint, None),
            urlencoding::encode(bucket)
        )
    } else {
        format!("{}{base_path}/{key}", origin(&endpoint, Some(bucket)))
    };

    Url::parse(&raw)
        .map_err(|e| Error::publish(PublishReason::NotConfigured, format!("invalid object URL {raw}: {e}")))
}

fn origin(endpoint: &Url, bucket: Option<&str>) -> String {
    let host = endpoint.host_str().unwrap_or_default();
    let host = match bucket {
        Some(bucket) => format!("{bucket}.{host}"),
        None => host.to_string(),
    };
    match endpoint.port() {
        Some(port) => format!("{}://{host}:{port}", endpoint.scheme()),
        None => format!("{}://{host}", endpoint.scheme()),
    }
}
