//! Cluster mutex protocol for cluster-exclusive tasks
//!
//! Built on one atomic primitive of the shared store, `set_if_absent`, keyed
//! by task id plus the cycle's next start. Every instance computes the same
//! key for the same cycle, so at most one of them gets the set through.
//!
//! This is a lease, not consensus: if the owner crashes mid-run the cycle is
//! simply lost, and the next cycle is up for grabs again. At most one
//! concurrent attempt per lease window is guaranteed, exactly-once is not.

use super::constants::MIN_LOCK_TTL_MS;
use super::panic_guard::raise_guarded;
use super::task::{NextTimeInfo, ScheduledTask};
use super::{SchedulerConfig, SchedulerDeps};
use crate::domain::mutex_record::{cycle_lock_key, record_key};
use crate::domain::MutexRecord;
use crate::port::{Alert, StoreError};
use rand::Rng;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Result of trying to claim a cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Ownership {
    /// This instance owns the cycle
    Owner,
    /// Another instance owns it (`None` if its claim already expired)
    Other(Option<String>),
    /// The store could not confirm either way
    Unknown(StoreError),
}

pub(crate) struct ClusterMutex<'a> {
    deps: &'a SchedulerDeps,
    config: &'a SchedulerConfig,
}

impl<'a> ClusterMutex<'a> {
    pub(crate) fn new(deps: &'a SchedulerDeps, config: &'a SchedulerConfig) -> Self {
        Self { deps, config }
    }

    fn owner_id(&self) -> String {
        self.deps.identity.owner_id()
    }

    /// Read the task's shared record; unreadable records count as absent
    pub(crate) async fn read_record(&self, task_id: &str) -> Option<MutexRecord> {
        let key = record_key(task_id);
        let store = &self.deps.lock_store;
        match self
            .config
            .store_retry
            .run("get mutex record", || store.get(&key))
            .await
        {
            Ok(Some(raw)) => match MutexRecord::from_json(&raw) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(task_id = %task_id, error = %e, "Ignoring undecodable mutex record");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "Could not read mutex record");
                None
            }
        }
    }

    /// Conflict check, previous-owner jitter, cycle lock and read-back
    pub(crate) async fn claim_cycle(&self, task: &ScheduledTask, cycle: &NextTimeInfo) -> Ownership {
        let me = self.owner_id();
        let previous = self.read_record(task.id()).await;

        if let Some(record) = &previous {
            if record.schedule_expr != task.schedule().as_str() {
                warn!(
                    task_id = %task.id(),
                    local = %task.schedule(),
                    shared = %record.schedule_expr,
                    "Schedule differs from the shared mutex record"
                );
                raise_guarded(
                    self.deps.alert_sink.as_ref(),
                    &Alert::ScheduleConflict {
                        task_id: task.id().to_string(),
                        local: task.schedule().to_string(),
                        shared: record.schedule_expr.clone(),
                        shared_owner: record.owner_id(),
                    },
                );
            }

            if record.owner_id() == me {
                self.yield_to_peers().await;
            }
        }

        let lock_key = cycle_lock_key(task.id(), cycle.next_start);
        let ttl_ms = (cycle.next_start - cycle.now).max(MIN_LOCK_TTL_MS);
        let store = &self.deps.lock_store;
        let retry = &self.config.store_retry;

        let acquired = retry
            .run("set_if_absent cycle lock", || {
                store.set_if_absent(&lock_key, &me, ttl_ms)
            })
            .await;

        match acquired {
            Ok(true) => {
                debug!(task_id = %task.id(), lock_key = %lock_key, "Cycle lock acquired");
                Ownership::Owner
            }
            Ok(false) => {
                // A timed-out attempt may still have landed; read back the holder
                match retry.run("get cycle lock", || store.get(&lock_key)).await {
                    Ok(Some(owner)) if owner == me => {
                        info!(task_id = %task.id(), "Cycle lock already held by this instance");
                        Ownership::Owner
                    }
                    Ok(owner) => {
                        debug!(task_id = %task.id(), owner = ?owner, "Cycle owned elsewhere");
                        Ownership::Other(owner)
                    }
                    Err(e) => Ownership::Unknown(e),
                }
            }
            Err(e) => Ownership::Unknown(e),
        }
    }

    /// Write the shared record with a lease through `next_next`
    pub(crate) async fn write_record(
        &self,
        task: &ScheduledTask,
        cycle: &NextTimeInfo,
        running: bool,
        last_start: i64,
        last_cost_ms: Option<i64>,
    ) {
        let now = self.deps.time_provider.now_millis();
        let lease_until = cycle.next_next.unwrap_or(cycle.next_start);
        let ttl_ms = (lease_until - now).max(MIN_LOCK_TTL_MS) + self.config.record_slack_ms;

        let record = MutexRecord {
            owner_host: self.deps.identity.host.clone(),
            owner_addr: self.deps.identity.addr.clone(),
            task_id: task.id().to_string(),
            schedule_expr: task.schedule().to_string(),
            last_start,
            running,
            last_cost_ms,
            next_start: cycle.next_start,
        };

        let raw = match record.to_json() {
            Ok(raw) => raw,
            Err(e) => {
                warn!(task_id = %task.id(), error = %e, "Could not encode mutex record");
                return;
            }
        };

        let key = record_key(task.id());
        let store = &self.deps.lock_store;
        if let Err(e) = self
            .config
            .store_retry
            .run("put mutex record", || store.put(&key, &raw, ttl_ms))
            .await
        {
            warn!(task_id = %task.id(), error = %e, "Could not write mutex record");
        }
    }

    /// Give other instances a head start when we owned the previous cycle
    async fn yield_to_peers(&self) {
        let (min, max) = (self.config.jitter_min_ms, self.config.jitter_max_ms);
        if max == 0 {
            return;
        }
        let delay = rand::thread_rng().gen_range(min.min(max)..=max);
        debug!(delay_ms = delay, "Previous owner backing off before lock attempt");
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
}
