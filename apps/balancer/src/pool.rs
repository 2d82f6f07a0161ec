//! Instance pool and room affinity.
//!
//! The pool is the balancer's whole world-model: per-instance probed health
//! plus the room-code → instance affinity map. A live room exists in exactly
//! one instance's memory, so affinity is what keeps all four players of a
//! room on the same instance; everything else here exists to keep that map
//! pointing at instances that can actually answer.

use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{info, warn};

/// Effective routing status. Draining is an operator flag that survives
/// probe outcomes; probed health decides healthy vs unhealthy underneath,
/// so a draining instance whose probes fail reports unhealthy, and reports
/// draining again once they recover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Healthy,
    Draining,
    Unhealthy,
}

#[derive(Debug, Clone)]
pub struct InstanceSeed {
    pub id: String,
    pub address: String,
}

#[derive(Debug, Clone)]
pub struct Instance {
    pub id: String,
    pub address: String,
    healthy: bool,
    /// False until the first probe completes; the first success of a fresh
    /// instance routes immediately instead of waiting out the recovery
    /// threshold.
    probed: bool,
    draining: bool,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    /// From the instance's last successful probe.
    pub active_connections: usize,
    pub active_rooms: usize,
    pub last_probe: Option<Instant>,
    /// Status string the instance reported ("ok" or "degraded").
    pub reported_status: Option<String>,
    /// Last probe failure, for operators.
    pub last_error: Option<String>,
}

impl Instance {
    fn new(seed: InstanceSeed) -> Self {
        Self {
            id: seed.id,
            address: seed.address,
            healthy: false,
            probed: false,
            draining: false,
            consecutive_failures: 0,
            consecutive_successes: 0,
            active_connections: 0,
            active_rooms: 0,
            last_probe: None,
            reported_status: None,
            last_error: None,
        }
    }

    pub fn status(&self) -> Status {
        if !self.healthy {
            Status::Unhealthy
        } else if self.draining {
            Status::Draining
        } else {
            Status::Healthy
        }
    }

    pub fn is_draining(&self) -> bool {
        self.draining
    }

    /// May serve its affine rooms.
    fn routable(&self) -> bool {
        self.healthy
    }

    /// May receive new rooms.
    fn assignable(&self) -> bool {
        self.healthy && !self.draining
    }

    fn target(&self) -> RouteTarget {
        RouteTarget {
            instance_id: self.id.clone(),
            address: self.address.clone(),
        }
    }
}

/// Where a client should connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteTarget {
    pub instance_id: String,
    pub address: String,
}

struct Affinity {
    instance_id: String,
    touched: Instant,
}

pub struct InstancePool {
    instances: RwLock<Vec<Instance>>,
    affinities: DashMap<String, Affinity>,
    failure_threshold: u32,
    recovery_threshold: u32,
}

impl InstancePool {
    pub fn new(seeds: Vec<InstanceSeed>, failure_threshold: u32, recovery_threshold: u32) -> Self {
        Self {
            instances: RwLock::new(seeds.into_iter().map(Instance::new).collect()),
            affinities: DashMap::new(),
            failure_threshold,
            recovery_threshold,
        }
    }

    /// Record a successful probe. A fresh instance goes healthy on its
    /// first success; one that was marked unhealthy must string together
    /// the recovery threshold.
    pub fn record_success(&self, id: &str, connections: usize, rooms: usize, reported: &str) {
        let mut instances = self.instances.write();
        let Some(inst) = instances.iter_mut().find(|inst| inst.id == id) else {
            return;
        };
        inst.consecutive_failures = 0;
        inst.consecutive_successes = inst.consecutive_successes.saturating_add(1);
        inst.active_connections = connections;
        inst.active_rooms = rooms;
        inst.reported_status = Some(reported.to_string());
        inst.last_error = None;
        if !inst.healthy && (!inst.probed || inst.consecutive_successes >= self.recovery_threshold)
        {
            inst.healthy = true;
            info!(
                instance_id = %inst.id,
                status = ?inst.status(),
                "[LB] instance joined rotation"
            );
        }
        inst.probed = true;
        inst.last_probe = Some(Instant::now());
    }

    /// Record a failed probe. Crossing the failure threshold pulls the
    /// instance from rotation and drops its affinities so re-routing
    /// clients land somewhere alive.
    pub fn record_failure(&self, id: &str, detail: String) {
        let dropped_for = {
            let mut instances = self.instances.write();
            let Some(inst) = instances.iter_mut().find(|inst| inst.id == id) else {
                return;
            };
            inst.consecutive_successes = 0;
            inst.consecutive_failures = inst.consecutive_failures.saturating_add(1);
            inst.probed = true;
            inst.last_probe = Some(Instant::now());
            inst.last_error = Some(detail);
            if inst.healthy && inst.consecutive_failures >= self.failure_threshold {
                inst.healthy = false;
                Some(inst.id.clone())
            } else {
                None
            }
        };
        if let Some(id) = dropped_for {
            let dropped = self.drop_affinities(&id);
            warn!(
                instance_id = %id,
                dropped_affinities = dropped,
                "[LB] instance left rotation"
            );
        }
    }

    pub fn drain(&self, id: &str) -> Option<Status> {
        let mut instances = self.instances.write();
        let inst = instances.iter_mut().find(|inst| inst.id == id)?;
        inst.draining = true;
        Some(inst.status())
    }

    pub fn undrain(&self, id: &str) -> Option<Status> {
        let mut instances = self.instances.write();
        let inst = instances.iter_mut().find(|inst| inst.id == id)?;
        inst.draining = false;
        Some(inst.status())
    }

    /// Resolve an existing affinity to a routable instance, touching the
    /// entry. An affinity pointing at an unroutable or unknown instance is
    /// removed so the caller falls through to reassignment.
    pub fn affinity_target(&self, room_code: &str) -> Option<RouteTarget> {
        let mut entry = self.affinities.get_mut(room_code)?;
        let target = {
            let instances = self.instances.read();
            instances
                .iter()
                .find(|inst| inst.id == entry.instance_id && inst.routable())
                .map(Instance::target)
        };
        match target {
            Some(target) => {
                entry.touched = Instant::now();
                Some(target)
            }
            None => {
                drop(entry);
                self.affinities.remove(room_code);
                None
            }
        }
    }

    /// Instances that may serve affine rooms, for the residency backstop.
    pub fn routable_targets(&self) -> Vec<RouteTarget> {
        self.instances
            .read()
            .iter()
            .filter(|inst| inst.routable())
            .map(Instance::target)
            .collect()
    }

    /// Least-loaded instance that accepts new rooms, ties broken by id.
    pub fn assign(&self) -> Option<RouteTarget> {
        self.instances
            .read()
            .iter()
            .filter(|inst| inst.assignable())
            .min_by(|a, b| {
                a.active_connections
                    .cmp(&b.active_connections)
                    .then_with(|| a.id.cmp(&b.id))
            })
            .map(Instance::target)
    }

    /// Pin a room to an instance. Concurrent first routes for the same code
    /// race here; the first pin wins and later callers are redirected to it,
    /// so all four players still land together.
    pub fn pin(&self, room_code: &str, target: &RouteTarget) -> RouteTarget {
        match self.affinities.entry(room_code.to_string()) {
            Entry::Occupied(mut occupied) => {
                let standing = {
                    let instances = self.instances.read();
                    instances
                        .iter()
                        .find(|inst| inst.id == occupied.get().instance_id && inst.routable())
                        .map(Instance::target)
                };
                match standing {
                    Some(standing) => {
                        occupied.get_mut().touched = Instant::now();
                        standing
                    }
                    None => {
                        occupied.insert(Affinity {
                            instance_id: target.instance_id.clone(),
                            touched: Instant::now(),
                        });
                        target.clone()
                    }
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Affinity {
                    instance_id: target.instance_id.clone(),
                    touched: Instant::now(),
                });
                target.clone()
            }
        }
    }

    /// Remove affinities untouched for longer than the TTL.
    pub fn sweep_affinities(&self, ttl: Duration) -> usize {
        let before = self.affinities.len();
        self.affinities.retain(|_, aff| aff.touched.elapsed() <= ttl);
        before.saturating_sub(self.affinities.len())
    }

    pub fn affinity_count(&self) -> usize {
        self.affinities.len()
    }

    pub fn snapshot(&self) -> Vec<Instance> {
        self.instances.read().clone()
    }

    /// (routable, total) for the balancer's own health report.
    pub fn counts(&self) -> (usize, usize) {
        let instances = self.instances.read();
        let routable = instances.iter().filter(|inst| inst.routable()).count();
        (routable, instances.len())
    }

    fn drop_affinities(&self, instance_id: &str) -> usize {
        let before = self.affinities.len();
        self.affinities.retain(|_, aff| aff.instance_id != instance_id);
        before.saturating_sub(self.affinities.len())
    }
}
