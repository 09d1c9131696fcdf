//! Source retrieval.
//!
//! [`HttpFetcher`] downloads the source asset into the run's workspace. The
//! body is streamed to disk chunk by chunk and never buffered whole; the
//! transfer is bounded by a connect timeout, a total timeout, and a byte
//! ceiling. Certificate validation is always on. Nothing is retried here.

use std::path::Path;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{redirect, Client, Url};
use tokio::io::AsyncWriteExt;

use mr_core::config::FetchConfig;
use mr_core::{Error, FetchReason};

/// The fetch stage as seen by the pipeline.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Download `source` into `destination`, returning the bytes written.
    async fn fetch(&self, source: &Url, destination: &Path) -> mr_core::Result<u64>;
}

/// Fetcher for `http`/`https` sources.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    max_bytes: u64,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> mr_core::Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .redirect(redirect::Policy::limited(config.max_redirects))
            .user_agent(concat!("mediarelay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Internal(format!("failed to build fetch client: {e}")))?;

        Ok(Self {
            client,
            max_bytes: config.max_bytes,
        })
    }

    fn too_large(&self) -> Error {
        Error::fetch(
            FetchReason::TransferError,
            format!("source exceeds the {} byte limit", self.max_bytes),
        )
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, source: &Url, destination: &Path) -> mr_core::Result<u64> {
        let response = self
            .client
            .get(source.clone())
            .send()
            .await
            .map_err(|e| map_send_error(source, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::fetch(
                FetchReason::Non2xx,
                format!("{source} answered HTTP {status}"),
            ));
        }

        if let Some(len) = response.content_length() {
            if len > self.max_bytes {
                return Err(self.too_large());
            }
        }

        let mut file = tokio::fs::File::create(destination)
            .await
            .map_err(|e| disk_error(destination, e))?;

        let mut written: u64 = 0;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| map_body_error(source, e))?;
            written += chunk.len() as u64;
            if written > self.max_bytes {
                return Err(self.too_large());
            }
            file.write_all(&chunk)
                .await
                .map_err(|e| disk_error(destination, e))?;
        }
        file.flush().await.map_err(|e| disk_error(destination, e))?;

        tracing::debug!(source = %source, bytes = written, "Source fetched");
        Ok(written)
    }
}

fn map_send_error(source: &Url, e: reqwest::Error) -> Error {
    let reason = if e.is_timeout() {
        FetchReason::Timeout
    } else if e.is_redirect() {
        FetchReason::Non2xx
    } else if e.is_connect() {
        FetchReason::Unreachable
    } else {
        FetchReason::TransferError
    };
    Error::fetch(reason, format!("{source}: {e}"))
}

fn map_body_error(source: &Url, e: reqwest::Error) -> Error {
    let reason = if e.is_timeout() {
        FetchReason::Timeout
    } else {
        FetchReason::TransferError
    };
    Error::fetch(reason, format!("reading body of {source}: {e}"))
}

fn disk_error(path: &Path, e: std::io::Error) -> Error {
    Error::fetch(
        FetchReason::TransferError,
        format!("writing {}: {e}", path.display()),
    )
}
