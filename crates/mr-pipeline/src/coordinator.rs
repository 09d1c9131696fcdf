//! Pipeline coordinator: sequences fetch, transcode, and publish for one
//! request, under an admission limit, a run deadline, and cancellation.
//!
//! Each run moves `Idle -> Fetching -> Transcoding -> Publishing -> Done`,
//! or to `Failed` from any working state. The first failure is the one
//! reported; nothing is retried. The workspace is a scoped acquisition:
//! it is released explicitly after the stages finish and, if the run future
//! is dropped mid-stage, by the workspace's own `Drop`.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use mr_av::{
    FfmpegTranscoder, ToolRegistry, TranscodeOutcome, Transcoder, TranscoderStatus, TransformSpec,
    Workspace, WorkspaceManager,
};
use mr_core::config::{Config, PipelineConfig};
use mr_core::{Error, RequestId};

use crate::fetch::{Fetcher, HttpFetcher};
use crate::publish::{PublishResult, Publisher, PublisherStatus, S3Publisher};
use crate::request::ProcessRequest;

/// Where in a run a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Validation,
    Preflight,
    Admission,
    Fetching,
    Transcoding,
    Publishing,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Validation => "validation",
            Stage::Preflight => "preflight",
            Stage::Admission => "admission",
            Stage::Fetching => "fetching",
            Stage::Transcoding => "transcoding",
            Stage::Publishing => "publishing",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Fetching,
    Transcoding,
    Publishing,
    Done,
    Failed,
}

/// A run that published its artifact.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub request_id: RequestId,
    pub result: PublishResult,
    pub bytes_fetched: u64,
    /// The source was published without transcoding.
    pub passthrough: bool,
}

/// A run that stopped at `stage` with `error`.
#[derive(Debug, thiserror::Error)]
#[error("request {request_id} failed during {stage}: {error}")]
pub struct RunFailure {
    pub request_id: RequestId,
    pub stage: Stage,
    #[source]
    pub error: Error,
}

/// Dependency readiness for the liveness query.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct PipelineHealth {
    pub transcoder: TranscoderStatus,
    pub publisher: PublisherStatus,
}

impl PipelineHealth {
    pub fn ready(&self) -> bool {
        self.transcoder.ready() && self.publisher.configured
    }
}

/// Runs requests through the pipeline.
///
/// Collaborators are injected; the coordinator holds no global state. It is
/// shared behind an `Arc` and every call to [`Coordinator::process`] is an
/// independent run.
pub struct Coordinator {
    fetcher: Arc<dyn Fetcher>,
    transcoder: Arc<dyn Transcoder>,
    publisher: Arc<dyn Publisher>,
    workspaces: WorkspaceManager,
    admission: Arc<Semaphore>,
    run_timeout: Option<Duration>,
    default_transform: TransformSpec,
}

impl Coordinator {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        transcoder: Arc<dyn Transcoder>,
        publisher: Arc<dyn Publisher>,
        config: &PipelineConfig,
        default_transform: TransformSpec,
    ) -> Self {
        Self {
            fetcher,
            transcoder,
            publisher,
            workspaces: WorkspaceManager::new(config.scratch_dir.clone()),
            admission: Arc::new(Semaphore::new(
                config.concurrency().min(Semaphore::MAX_PERMITS),
            )),
            run_timeout: config.run_timeout(),
            default_transform,
        }
    }

    /// Build the production collaborators from configuration.
    pub fn from_config(config: &Config, registry: Arc<ToolRegistry>) -> mr_core::Result<Self> {
        let fetcher = Arc::new(HttpFetcher::new(&config.fetch)?);
        let transcoder = Arc::new(FfmpegTranscoder::new(&config.transcode, registry));
        let publisher = Arc::new(S3Publisher::new(&config.storage)?);

        Ok(Self::new(
            fetcher,
            transcoder,
            publisher,
            &config.pipeline,
            TransformSpec::style(config.transcode.default_style.clone()),
        ))
    }

    /// Current readiness of the transcoder and publisher.
    pub fn health(&self) -> PipelineHealth {
        PipelineHealth {
            transcoder: self.transcoder.readiness(),
            publisher: self.publisher.status(),
        }
    }

    /// Runs that could start right now without waiting for admission.
    pub fn available_permits(&self) -> usize {
        self.admission.available_permits()
    }

    /// Validate raw request fields, then run the pipeline.
    pub async fn submit(
        &self,
        request_id: RequestId,
        source: &str,
        output_identity: &str,
        transform: Option<TransformSpec>,
        cancel: &CancellationToken,
    ) -> Result<RunReport, RunFailure> {
        let request = ProcessRequest::new(request_id, source, output_identity, transform)
            .map_err(|error| {
                tracing::info!(request_id = %request_id, "Rejected request: {error}");
                RunFailure {
                    request_id,
                    stage: Stage::Validation,
                    error,
                }
            })?;
        self.process(request, cancel).await
    }

    /// Run one validated request to completion, failure, or cancellation.
    pub async fn process(
        &self,
        request: ProcessRequest,
        cancel: &CancellationToken,
    ) -> Result<RunReport, RunFailure> {
        let span = tracing::info_span!(
            "run",
            request_id = %request.request_id(),
            storage_key = %request.storage_key()
        );
        self.process_inner(request, cancel).instrument(span).await
    }

    async fn process_inner(
        &self,
        request: ProcessRequest,
        cancel: &CancellationToken,
    ) -> Result<RunReport, RunFailure> {
        let request_id = request.request_id();
        let fail = |stage: Stage| move |error: Error| RunFailure {
            request_id,
            stage,
            error,
        };

        let transform = request
            .transform()
            .cloned()
            .unwrap_or_else(|| self.default_transform.clone());

        // Configuration and tool problems fail before any scratch slot or
        // network transfer is spent on the request.
        self.publisher
            .check_configured()
            .map_err(fail(Stage::Preflight))?;
        self.transcoder
            .prepare(&transform)
            .map_err(fail(Stage::Preflight))?;

        // A timeout too large to represent is no deadline at all.
        let deadline = self.run_timeout.and_then(|t| Instant::now().checked_add(t));

        let _permit = bounded(Stage::Admission, cancel, deadline, async {
            self.admission
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| Error::Internal("admission gate closed".into()))
        })
        .await
        .map_err(fail(Stage::Admission))?;

        let workspace = self
            .workspaces
            .acquire(request_id, request.extension())
            .map_err(fail(Stage::Fetching))?;

        let outcome = self
            .run_stages(&request, &transform, &workspace, cancel, deadline)
            .await;

        workspace.release();
        outcome
    }

    async fn run_stages(
        &self,
        request: &ProcessRequest,
        transform: &TransformSpec,
        workspace: &Workspace,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> Result<RunReport, RunFailure> {
        let request_id = request.request_id();
        let mut state = RunState::Idle;
        let fail = |state: &mut RunState, stage: Stage, error: Error| {
            tracing::warn!(stage = %stage, kind = error.kind(), reason = ?error.reason(), "Run failed: {error}");
            if let Error::Transcode {
                diagnostics: Some(tail),
                ..
            } = &error
            {
                tracing::debug!("Transcoder stderr:\n{tail}");
            }
            transition(state, RunState::Failed);
            RunFailure {
                request_id,
                stage,
                error,
            }
        };

        transition(&mut state, RunState::Fetching);
        let bytes_fetched = match bounded(
            Stage::Fetching,
            cancel,
            deadline,
            self.fetcher.fetch(request.source(), workspace.input()),
        )
        .await
        {
            Ok(bytes) => bytes,
            Err(e) => return Err(fail(&mut state, Stage::Fetching, e)),
        };
        tracing::info!(bytes = bytes_fetched, "Source fetched");

        transition(&mut state, RunState::Transcoding);
        let outcome = match bounded(Stage::Transcoding, cancel, deadline, async {
            self.transcoder
                .run(workspace.input(), workspace.output(), transform, cancel)
                .await
                .and_then(TranscodeOutcome::into_result)
        })
        .await
        {
            Ok(outcome) => outcome,
            Err(e) => return Err(fail(&mut state, Stage::Transcoding, e)),
        };
        if outcome.passthrough {
            tracing::info!("Transcoder disabled; publishing source unmodified");
        }

        transition(&mut state, RunState::Publishing);
        let result = match bounded(
            Stage::Publishing,
            cancel,
            deadline,
            self.publisher.publish(
                workspace.output(),
                request.storage_key(),
                request.content_type(),
            ),
        )
        .await
        {
            Ok(result) => result,
            Err(e) => return Err(fail(&mut state, Stage::Publishing, e)),
        };

        transition(&mut state, RunState::Done);
        tracing::info!(public_url = %result.public_url, "Run complete");

        Ok(RunReport {
            request_id,
            result,
            bytes_fetched,
            passthrough: outcome.passthrough,
        })
    }
}

fn transition(state: &mut RunState, next: RunState) {
    tracing::info!(from = ?*state, to = ?next, "State transition");
    *state = next;
}

/// Race one stage against cancellation and the run deadline.
///
/// The stage is polled first, so a stage that has already completed is
/// never reported as cancelled.
async fn bounded<T>(
    stage: Stage,
    cancel: &CancellationToken,
    deadline: Option<Instant>,
    fut: impl Future<Output = mr_core::Result<T>>,
) -> mr_core::Result<T> {
    tokio::select! {
        biased;
        result = fut => result,
        _ = cancel.cancelled() => Err(Error::Cancelled(format!("run cancelled during {stage}"))),
        _ = until(deadline) => Err(Error::Cancelled(format!("run deadline elapsed during {stage}"))),
    }
}

async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use mr_core::{FetchReason, PublishReason, TranscodeReason};
    use reqwest::Url;

    use crate::publish::public_url;

    const CDN: &str = "https://cdn.example.test";

    #[derive(Default)]
    struct FakeFetcher {
        calls: AtomicUsize,
        fail: Option<FetchReason>,
    }

    #[async_trait]
    impl Fetcher for FakeFetcher {
        async fn fetch(&self, source: &Url, destination: &Path) -> mr_core::Result<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(reason) = self.fail {
                return Err(Error::fetch(reason, format!("{source} failed")));
            }
            let body = source.path().as_bytes().to_vec();
            tokio::fs::write(destination, &body).await?;
            Ok(body.len() as u64)
        }
    }

    #[derive(Default)]
    struct FakeTranscoder {
        calls: AtomicUsize,
        exit_code: Option<i32>,
        unavailable: bool,
        delay: Option<Duration>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    #[async_trait]
    impl Transcoder for FakeTranscoder {
        fn readiness(&self) -> TranscoderStatus {
            TranscoderStatus {
                enabled: true,
                available: !self.unavailable,
                version: Some("fake 1.0".into()),
            }
        }

        fn prepare(&self, transform: &TransformSpec) -> mr_core::Result<()> {
            if self.unavailable {
                return Err(Error::transcode(TranscodeReason::ToolNotAvailable, "fake missing"));
            }
            transform.resolve().map(|_| ())
        }

        async fn run(
            &self,
            input: &Path,
            output: &Path,
            _transform: &TransformSpec,
            cancel: &CancellationToken,
        ) -> mr_core::Result<TranscodeOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            if let Some(delay) = self.delay {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => {
                        self.in_flight.fetch_sub(1, Ordering::SeqCst);
                        return Err(Error::Cancelled("fake transcoder cancelled".into()));
                    }
                }
            }
            tokio::fs::copy(input, output).await?;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            Ok(TranscodeOutcome {
                exit_code: Some(self.exit_code.unwrap_or(0)),
                diagnostics: "fake diagnostics".into(),
                passthrough: false,
            })
        }
    }

    #[derive(Default)]
    struct FakePublisher {
        unconfigured: bool,
        published: Mutex<Vec<(String, Vec<u8>)>>,
    }

    #[async_trait]
    impl Publisher for FakePublisher {
        fn status(&self) -> PublisherStatus {
            PublisherStatus {
                configured: !self.unconfigured,
                missing: if self.unconfigured {
                    vec!["bucket".into()]
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

    impl FakePublisher {
        fn count(&self) -> usize {
            self.published.lock().unwrap().len()
        }
    }

    struct Harness {
        scratch: tempfile::TempDir,
        fetcher: Arc<FakeFetcher>,
        transcoder: Arc<FakeTranscoder>,
        publisher: Arc<FakePublisher>,
        coordinator: Coordinator,
    }

    impl Harness {
        fn new(fetcher: FakeFetcher, transcoder: FakeTranscoder, publisher: FakePublisher) -> Self {
            Self::with_pipeline(fetcher, transcoder, publisher, PipelineConfig::default())
        }

        fn with_pipeline(
            fetcher: FakeFetcher,
            transcoder: FakeTranscoder,
            publisher: FakePublisher,
            mut pipeline: PipelineConfig,
        ) -> Self {
            let scratch = tempfile::tempdir().unwrap();
            pipeline.scratch_dir = Some(scratch.path().to_path_buf());
            let fetcher = Arc::new(fetcher);
            let transcoder = Arc::new(transcoder);
            let publisher = Arc::new(publisher);
            let coordinator = Coordinator::new(
                fetcher.clone(),
                transcoder.clone(),
                publisher.clone(),
                &pipeline,
                TransformSpec::style("default"),
            );
            Self {
                scratch,
                fetcher,
                transcoder,
                publisher,
                coordinator,
            }
        }

        async fn submit(&self, source: &str, key: &str) -> Result<RunReport, RunFailure> {
            self.coordinator
                .submit(RequestId::new(), source, key, None, &CancellationToken::new())
                .await
        }

        fn scratch_is_empty(&self) -> bool {
            std::fs::read_dir(self.scratch.path()).unwrap().next().is_none()
        }
    }

    #[tokio::test]
    async fn successful_run_publishes_under_caller_key() {
        let h = Harness::new(Default::default(), Default::default(), Default::default());
        let report = h
            .submit("https://example.test/a.mp4", "out/a.mp4")
            .await
            .unwrap();

        assert_eq!(report.result.storage_key, "out/a.mp4");
        assert_eq!(report.result.public_url, "https://cdn.example.test/out/a.mp4");
        assert!(!report.passthrough);
        assert_eq!(h.publisher.count(), 1);
        assert!(h.scratch_is_empty());
    }

    #[tokio::test]
    async fn leading_slash_key_is_normalized() {
        let h = Harness::new(Default::default(), Default::default(), Default::default());
        let report = h
            .submit("https://example.test/a.mp4", "/out/a.mp4")
            .await
            .unwrap();
        assert_eq!(report.result.storage_key, "out/a.mp4");
        assert_eq!(report.result.public_url, "https://cdn.example.test/out/a.mp4");
    }

    #[tokio::test]
    async fn fetch_failure_stops_the_run() {
        let h = Harness::new(
            FakeFetcher {
                fail: Some(FetchReason::Non2xx),
                ..Default::default()
            },
            Default::default(),
            Default::default(),
        );
        let failure = h
            .submit("https://example.test/missing.mp4", "out/a.mp4")
            .await
            .unwrap_err();

        assert_eq!(failure.stage, Stage::Fetching);
        assert_eq!(failure.error.kind(), "FetchError");
        assert_eq!(failure.error.reason(), Some("non2xx"));
        assert_eq!(h.transcoder.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.publisher.count(), 0);
        assert!(h.scratch_is_empty());
    }

    #[tokio::test]
    async fn tool_failure_skips_publish_and_releases_workspace() {
        let h = Harness::new(
            Default::default(),
            FakeTranscoder {
                exit_code: Some(1),
                ..Default::default()
            },
            Default::default(),
        );
        let failure = h
            .submit("https://example.test/a.mp4", "out/a.mp4")
            .await
            .unwrap_err();

        assert_eq!(failure.stage, Stage::Transcoding);
        assert_eq!(failure.error.kind(), "TranscodeError");
        assert_eq!(failure.error.reason(), Some("nonZeroExit"));
        assert_eq!(h.publisher.count(), 0);
        assert!(h.scratch_is_empty());
    }

    #[tokio::test]
    async fn unconfigured_storage_fails_before_fetch() {
        let h = Harness::new(
            Default::default(),
            Default::default(),
            FakePublisher {
                unconfigured: true,
                ..Default::default()
            },
        );
        let failure = h
            .submit("https://example.test/a.mp4", "out/a.mp4")
            .await
            .unwrap_err();

        assert_eq!(failure.stage, Stage::Preflight);
        assert_eq!(failure.error.kind(), "PublishError");
        assert_eq!(failure.error.reason(), Some(PublishReason::NotConfigured.as_str()));
        assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.transcoder.calls.load(Ordering::SeqCst), 0);
        assert!(h.scratch_is_empty());
    }

    #[tokio::test]
    async fn missing_tool_fails_before_fetch() {
        let h = Harness::new(
            Default::default(),
            FakeTranscoder {
                unavailable: true,
                ..Default::default()
            },
            Default::default(),
        );
        let failure = h
            .submit("https://example.test/a.mp4", "out/a.mp4")
            .await
            .unwrap_err();
        assert_eq!(failure.stage, Stage::Preflight);
        assert_eq!(failure.error.reason(), Some("toolNotAvailable"));
        assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn invalid_filter_fails_before_fetch() {
        let h = Harness::new(Default::default(), Default::default(), Default::default());
        let failure = h
            .coordinator
            .submit(
                RequestId::new(),
                "https://example.test/a.mp4",
                "out/a.mp4",
                Some(TransformSpec::filter("movie=/etc/passwd")),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(failure.stage, Stage::Preflight);
        assert_eq!(failure.error.reason(), Some("invalidArguments"));
        assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn malformed_request_never_acquires_workspace() {
        let h = Harness::new(Default::default(), Default::default(), Default::default());

        let failure = h.submit("https://example.test/a.mp4", "").await.unwrap_err();
        assert_eq!(failure.stage, Stage::Validation);
        assert_eq!(failure.error.kind(), "ValidationError");

        let failure = h.submit("", "out/a.mp4").await.unwrap_err();
        assert_eq!(failure.stage, Stage::Validation);

        assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 0);
        assert!(h.scratch_is_empty());
    }

    #[tokio::test]
    async fn resubmitting_a_key_overwrites() {
        let h = Harness::new(Default::default(), Default::default(), Default::default());
        let first = h.submit("https://example.test/a.mp4", "out/a.mp4").await.unwrap();
        let second = h.submit("https://example.test/a.mp4", "out/a.mp4").await.unwrap();

        assert_eq!(first.result.public_url, second.result.public_url);
        assert_eq!(h.publisher.count(), 2);
        assert_ne!(first.request_id, second.request_id);
    }

    #[tokio::test]
    async fn concurrent_runs_are_isolated_and_bounded() {
        let h = Arc::new(Harness::with_pipeline(
            Default::default(),
            FakeTranscoder {
                delay: Some(Duration::from_millis(50)),
                ..Default::default()
            },
            Default::default(),
            PipelineConfig {
                max_concurrent_runs: 3,
                ..PipelineConfig::default()
            },
        ));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let h = h.clone();
                tokio::spawn(async move {
                    h.submit(&format!("https://example.test/src-{i}.mp4"), &format!("out/{i}.mp4"))
                        .await
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        // Each artifact carries its own source's bytes.
        let published = h.publisher.published.lock().unwrap().clone();
        assert_eq!(published.len(), 8);
        for (key, body) in published {
            let i = key.trim_start_matches("out/").trim_end_matches(".mp4");
            assert_eq!(body, format!("/src-{i}.mp4").into_bytes());
        }

        assert!(h.transcoder.max_in_flight.load(Ordering::SeqCst) <= 3);
        assert_eq!(h.coordinator.available_permits(), 3);
        assert!(h.scratch_is_empty());
    }

    #[tokio::test]
    async fn cancellation_aborts_stage_and_releases_workspace() {
        let h = Harness::new(
            Default::default(),
            FakeTranscoder {
                delay: Some(Duration::from_secs(30)),
                ..Default::default()
            },
            Default::default(),
        );
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let failure = h
            .coordinator
            .submit(RequestId::new(), "https://example.test/a.mp4", "out/a.mp4", None, &token)
            .await
            .unwrap_err();

        assert_eq!(failure.stage, Stage::Transcoding);
        assert_eq!(failure.error.kind(), "Cancelled");
        assert_eq!(h.publisher.count(), 0);
        assert!(h.scratch_is_empty());
    }

    #[tokio::test]
    async fn run_deadline_cancels_slow_stage() {
        let h = Harness::with_pipeline(
            Default::default(),
            FakeTranscoder {
                delay: Some(Duration::from_secs(30)),
                ..Default::default()
            },
            Default::default(),
            PipelineConfig {
                run_timeout_secs: 1,
                ..PipelineConfig::default()
            },
        );
        let started = std::time::Instant::now();
        let failure = h
            .submit("https://example.test/a.mp4", "out/a.mp4")
            .await
            .unwrap_err();

        assert_eq!(failure.error.kind(), "Cancelled");
        assert!(failure.error.to_string().contains("deadline"));
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(h.scratch_is_empty());
    }

    #[tokio::test]
    async fn unrepresentable_run_timeout_means_no_deadline() {
        let h = Harness::with_pipeline(
            Default::default(),
            Default::default(),
            Default::default(),
            PipelineConfig {
                run_timeout_secs: u64::MAX,
                ..PipelineConfig::default()
            },
        );
        let report = h
            .submit("https://example.test/a.mp4", "out/a.mp4")
            .await
            .unwrap();
        assert_eq!(report.result.storage_key, "out/a.mp4");
        assert!(h.scratch_is_empty());
    }

    #[tokio::test]
    async fn oversized_concurrency_is_clamped() {
        let h = Harness::with_pipeline(
            Default::default(),
            Default::default(),
            Default::default(),
            PipelineConfig {
                max_concurrent_runs: usize::MAX,
                ..PipelineConfig::default()
            },
        );
        assert_eq!(h.coordinator.available_permits(), Semaphore::MAX_PERMITS);
        assert!(h
            .submit("https://example.test/a.mp4", "out/a.mp4")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn dropped_run_releases_workspace() {
        let h = Harness::new(
            Default::default(),
            FakeTranscoder {
                delay: Some(Duration::from_secs(30)),
                ..Default::default()
            },
            Default::default(),
        );
        let run = h.submit("https://example.test/a.mp4", "out/a.mp4");
        let timed_out = tokio::time::timeout(Duration::from_millis(100), run).await;
        assert!(timed_out.is_err());
        assert!(h.scratch_is_empty());
    }

    #[tokio::test]
    async fn disabled_transcoder_publishes_source() {
        let scratch = tempfile::tempdir().unwrap();
        let registry = Arc::new(ToolRegistry::discover(&Default::default()));
        let transcoder = Arc::new(FfmpegTranscoder::new(
            &mr_core::config::TranscodeConfig {
                enabled: false,
                ..Default::default()
            },
            registry,
        ));
        let publisher = Arc::new(FakePublisher::default());
        let coordinator = Coordinator::new(
            Arc::new(FakeFetcher::default()),
            transcoder,
            publisher.clone(),
            &PipelineConfig {
                scratch_dir: Some(scratch.path().to_path_buf()),
                ..PipelineConfig::default()
            },
            TransformSpec::style("default"),
        );

        let report = coordinator
            .submit(
                RequestId::new(),
                "https://example.test/raw.mp4",
                "out/raw.mp4",
                None,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(report.passthrough);
        let published = publisher.published.lock().unwrap();
        assert_eq!(published[0].1, b"/raw.mp4");
    }

    #[test]
    fn health_reflects_collaborators() {
        let h = Harness::new(
            Default::default(),
            Default::default(),
            FakePublisher {
                unconfigured: true,
                ..Default::default()
            },
        );
        let health = h.coordinator.health();
        assert!(health.transcoder.ready());
        assert!(!health.publisher.configured);
        assert!(!health.ready());
    }

    #[test]
    fn stage_names() {
        assert_eq!(Stage::Preflight.to_string(), "preflight");
        assert_eq!(
            serde_json::to_string(&Stage::Transcoding).unwrap(),
            "\"transcoding\""
        );
    }
}
