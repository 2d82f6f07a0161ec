//! Health prober for the instance pool.
//!
//! One background task polls every instance's `/health` on a fixed
//! interval and feeds outcomes into the pool. The loop never exits; a
//! permanently dead instance just stays unhealthy until it answers again.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::pool::InstancePool;

#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub interval: Duration,
    pub timeout: Duration,
    /// Consecutive failed probes before an instance leaves rotation.
    pub failure_threshold: u32,
    /// Consecutive successful probes before an unhealthy instance returns.
    pub recovery_threshold: u32,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            timeout: Duration::from_millis(2000),
            failure_threshold: 3,
            recovery_threshold: 2,
        }
    }
}

/// What an instance's `/health` answers. Extra fields are ignored, and the
/// counters default so a terse answer still counts as alive. A "degraded"
/// status is an answered probe: only unreachability pulls an instance.
#[derive(Debug, Deserialize)]
pub struct HealthSnapshot {
    pub status: String,
    #[serde(default)]
    pub instance_id: String,
    #[serde(default)]
    pub active_connections: usize,
    #[serde(default)]
    pub active_rooms: usize,
}

pub struct Prober {
    pool: Arc<InstancePool>,
    client: reqwest::Client,
    interval: Duration,
    timeout: Duration,
    affinity_ttl: Duration,
}

impl Prober {
    pub fn new(
        pool: Arc<InstancePool>,
        client: reqwest::Client,
        config: &ProbeConfig,
        affinity_ttl: Duration,
    ) -> Self {
        Self {
            pool,
            client,
            interval: config.interval,
            timeout: config.timeout,
            affinity_ttl,
        }
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(self) {
        let mut interval = tokio::time::interval(self.interval);
        loop {
            interval.tick().await;
            self.sweep().await;
        }
    }

    /// Probe every instance in parallel, apply outcomes, expire stale
    /// affinities. Public so tests can drive probe rounds deterministically.
    pub async fn sweep(&self) {
        let checks: Vec<_> = self
            .pool
            .snapshot()
            .into_iter()
            .map(|inst| async move {
                let outcome = self.probe(&inst.address).await;
                (inst.id, inst.address, outcome)
            })
            .collect();

        for (id, address, outcome) in futures::future::join_all(checks).await {
            match outcome {
                Ok(snapshot) => {
                    if !snapshot.instance_id.is_empty() && snapshot.instance_id != id {
                        warn!(
                            instance_id = %id,
                            reported = %snapshot.instance_id,
                            address = %address,
                            "[LB] probed instance reports a different id"
                        );
                    }
                    debug!(
                        instance_id = %id,
                        status = %snapshot.status,
                        connections = snapshot.active_connections,
                        "[LB] probe ok"
                    );
                    self.pool.record_success(
                        &id,
                        snapshot.active_connections,
                        snapshot.active_rooms,
                        &snapshot.status,
                    );
                }
                Err(detail) => {
                    debug!(instance_id = %id, detail = %detail, "[LB] probe failed");
                    self.pool.record_failure(&id, detail);
                }
            }
        }

        let swept = self.pool.sweep_affinities(self.affinity_ttl);
        if swept > 0 {
            debug!(count = swept, "[LB] swept stale affinities");
        }
    }

    async fn probe(&self, address: &str) -> Result<HealthSnapshot, String> {
        let url = format!("{address}/health");
        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|err| err.to_string())?;
        if !response.status().is_success() {
            return Err(format!("health answered {}", response.status()));
        }
        response
            .json::<HealthSnapshot>()
            .await
            .map_err(|err| format!("health body unreadable: {err}"))
    }
}
