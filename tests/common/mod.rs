//! Shared test harness for integration tests.
//!
//! Provides fake pipeline collaborators and [`TestHarness`], which wires them
//! into a full [`AppContext`] with a private scratch root. The
//! [`TestHarness::with_server`] constructor serves the API on a random port
//! for HTTP-level testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use reqwest::Url;
use tokio_util::sync::CancellationToken;

use mr_av::{ToolRegistry, TranscodeOutcome, Transcoder, TranscoderStatus, TransformSpec};
use mr_core::config::{Config, PipelineConfig};
use mr_core::{Error, FetchReason, TranscodeReason};
use mr_pipeline::{public_url, Coordinator, Fetcher, PublishResult, Publisher, PublisherStatus};
use mr_server::context::AppContext;
use mr_server::router::build_router;

pub const CDN: &str = "https://cdn.example.test";

/// Writes the source URL's path into the destination as the "media".
#[derive(Default)]
pub struct FakeFetcher {
    pub calls: AtomicUsize,
    pub fail: Option<FetchReason>,
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, source: &Url, destination: &Path) -> mr_core::Result<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = self.fail {
            return Err(Error::fetch(reason, format!("{source}: simulated failure")));
        }
        let body = source.path().as_bytes().to_vec();
        tokio::fs::write(destination, &body).await?;
        Ok(body.len() as u64)
    }
}

/// Copies input to output and exits with `exit_code`.
#[derive(Default)]
pub struct FakeTranscoder {
    pub calls: AtomicUsize,
    pub exit_code: Option<i32>,
    pub unavailable: bool,
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    fn readiness(&self) -> TranscoderStatus {
        TranscoderStatus {
            enabled: true,
            available: !self.unavailable,
            version: Some("fake-ffmpeg 1.0".into()),
        }
    }

    fn prepare(&self, transform: &TransformSpec) -> mr_core::Result<()> {
        if self.unavailable {
            return Err(Error::transcode(
                TranscodeReason::ToolNotAvailable,
                "ffmpeg not found",
            ));
        }
        transform.resolve().map(|_| ())
    }

    async fn run(
        &self,
        input: &Path,
        output: &Path,
        _transform: &TransformSpec,
        _cancel: &CancellationToken,
    ) -> mr_core::Result<TranscodeOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::fs::copy(input, output).await?;
        Ok(TranscodeOutcome {
            exit_code: Some(self.exit_code.unwrap_or(0)),
            diagnostics: "Error while decoding stream #0:0".into(),
            passthrough: false,
        })
    }
}

/// Records every upload and answers with a CDN URL.
#[derive(Default)]
pub struct FakePublisher {
    pub unconfigured: bool,
    pub published: Mutex<Vec<(String, Vec<u8>)>>,
}

impl FakePublisher {
    pub fn count(&self) -> usize {
        self.published.lock().unwrap().len()
    }
}

#[async_trait]
impl Publisher for FakePublisher {
    fn status(&self) -> PublisherStatus {
        PublisherStatus {
            configured: !self.unconfigured,
            missing: if self.unconfigured {
                vec!["endpoint".into(), "bucket".into()]
            } else {
                Vec::new()
            },
        }
    }

    async fn publish(
        &self,
        local: &Path,
        storage_key: &str,
        _content_type: &str,
    ) -> mr_core::Result<PublishResult> {
        let body = tokio::fs::read(local).await?;
        self.published
            .lock()
            .unwrap()
            .push((storage_key.to_string(), body));
        Ok(PublishResult {
            storage_key: storage_key.to_string(),
            public_url: public_url(CDN, storage_key),
        })
    }
}

/// A full [`AppContext`] backed by fake collaborators.
pub struct TestHarness {
    pub ctx: AppContext,
    pub scratch: tempfile::TempDir,
    pub fetcher: Arc<FakeFetcher>,
    pub transcoder: Arc<FakeTranscoder>,
    pub publisher: Arc<FakePublisher>,
}

impl TestHarness {
    /// Harness whose collaborators all succeed.
    pub fn new() -> Self {
        Self::with_fakes(
            FakeFetcher::default(),
            FakeTranscoder::default(),
            FakePublisher::default(),
        )
    }

    pub fn with_fakes(
        fetcher: FakeFetcher,
        transcoder: FakeTranscoder,
        publisher: FakePublisher,
    ) -> Self {
        let scratch = tempfile::tempdir().expect("failed to create scratch root");
        let config = Config {
            pipeline: PipelineConfig {
                scratch_dir: Some(scratch.path().to_path_buf()),
                ..PipelineConfig::default()
            },
            ..Config::default()
        };

        let fetcher = Arc::new(fetcher);
        let transcoder = Arc::new(transcoder);
        let publisher = Arc::new(publisher);
        let coordinator = Arc::new(Coordinator::new(
            fetcher.clone(),
            transcoder.clone(),
            publisher.clone(),
            &config.pipeline,
            TransformSpec::style("default"),
        ));
        let tools = Arc::new(ToolRegistry::discover(&config.tools));

        Self {
            ctx: AppContext::new(config, tools, coordinator),
            scratch,
            fetcher,
            transcoder,
            publisher,
        }
    }

    pub fn router(&self) -> Router {
        build_router(self.ctx.clone())
    }

    /// No workspace is left behind under the scratch root.
    pub fn scratch_is_empty(&self) -> bool {
        std::fs::read_dir(self.scratch.path())
            .expect("scratch root missing")
            .next()
            .is_none()
    }

    /// Serve the API on a random port and return the bound address.
    pub async fn with_server(self) -> (Self, SocketAddr) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        let ctx = self.ctx.clone();
        tokio::spawn(async move {
            mr_server::serve(listener, ctx).await.ok();
        });

        (self, addr)
    }
}
