//! Application context shared across route handlers via Axum state.
//!
//! Everything in [`AppContext`] is immutable after startup and wrapped in
//! `Arc`s, so cloning the context per request is cheap.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use mr_av::ToolRegistry;
use mr_core::config::Config;
use mr_core::InstanceId;
use mr_pipeline::Coordinator;

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub tools: Arc<ToolRegistry>,
    pub coordinator: Arc<Coordinator>,
    /// Identity of this server process, reported by `/health`.
    pub instance_id: InstanceId,
    pub started_at: DateTime<Utc>,
    /// Cancelled on server shutdown; every run's token is a child of it.
    pub shutdown: CancellationToken,
}

impl AppContext {
    pub fn new(config: Config, tools: Arc<ToolRegistry>, coordinator: Arc<Coordinator>) -> Self {
        Self {
            config: Arc::new(config),
            tools,
            coordinator,
            instance_id: InstanceId::new(),
            started_at: Utc::now(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Discover tools and build the production pipeline from `config`.
    pub fn from_config(config: Config) -> mr_core::Result<Self> {
        let tools = Arc::new(ToolRegistry::discover(&config.tools));
        let coordinator = Arc::new(Coordinator::from_config(&config, tools.clone())?);
        Ok(Self::new(config, tools, coordinator))
    }
}
