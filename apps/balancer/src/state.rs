//! Shared balancer state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::BalancerConfig;
use crate::error::AppError;
use crate::pool::InstancePool;
use crate::prober::Prober;

/// Everything a request needs, shared across workers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<BalancerConfig>,
    pub pool: Arc<InstancePool>,
    /// Shared by the prober and the residency backstop.
    pub http: reqwest::Client,
    started_at: Instant,
}

impl AppState {
    pub fn new(config: BalancerConfig) -> Result<Self, AppError> {
        let pool = Arc::new(InstancePool::new(
            config.instances.clone(),
            config.probe.failure_threshold,
            config.probe.recovery_threshold,
        ));
        let http = reqwest::Client::builder()
            .build()
            .map_err(|err| AppError::internal(format!("http client: {err}")))?;
        Ok(Self {
            config: Arc::new(config),
            pool,
            http,
            started_at: Instant::now(),
        })
    }

    /// Start the background probe loop. Called once, not per worker.
    pub fn spawn_prober(&self) -> tokio::task::JoinHandle<()> {
        Prober::new(
            Arc::clone(&self.pool),
            self.http.clone(),
            &self.config.probe,
            self.config.affinity_ttl,
        )
        .spawn()
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}
