use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use scriptorium_core::JobId;

use crate::error::ScheduleError;
use crate::job::{Job, JobFilter, JobState, JobView, Processing};

use super::Scheduler;

impl Scheduler {
    /// Admit a job. Returns its state right after the admission
    /// decision, normally [`JobState::Scheduled`]; never waits for the
    /// job to run.
    ///
    /// Serial jobs whose target slot is busy are parked and dispatched
    /// when the slot holder reaches a terminal state, so admission cost
    /// does not depend on queue depth.
    pub fn schedule(&self, job: Job) -> Result<JobState, ScheduleError> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(ScheduleError::Unavailable(
                "scheduler is shutting down".to_string(),
            ));
        }
        self.enforce_deadline();

        let job = Arc::new(job);
        let id = job.id();
        {
            let mut jobs = self.jobs.write().expect("lock poisoned");
            self.evict_expired_locked(&mut jobs);
            if jobs.len() >= self.config.max_live_jobs {
                self.evict_oldest_terminal_locked(&mut jobs)?;
            }
            jobs.insert(id, Arc::clone(&job));
            // Gauge update stays under the table lock so a concurrent
            // cancel cannot decrement before the increment lands.
            self.metrics.write().expect("lock poisoned").scheduled += 1;
        }
        info!(
            job = %id,
            provider = job.kind().provider_id(),
            category = %job.category(),
            "job admitted"
        );

        match job.processing() {
            Processing::Parallel => self.dispatch(job),
            Processing::Serial => {
                let key = job.target().serial_key();
                let parked = {
                    let mut gates = self.gates.lock().expect("lock poisoned");
                    let gate = gates.entry(key).or_default();
                    if gate.holder.is_none() {
                        gate.holder = Some(id);
                        false
                    } else {
                        gate.waiting.push_back(id);
                        true
                    }
                };
                if parked {
                    debug!(job = %id, "serial slot busy, parked");
                } else {
                    self.dispatch(job);
                }
            }
        }
        Ok(JobState::Scheduled)
    }

    /// Request cancellation of a known job. Returns false when the id
    /// is not retained (unknown or already evicted).
    ///
    /// A still-scheduled job flips to `canceled` here and is never
    /// dispatched; a running job only has its token raised and settles
    /// when the processor observes it. Repeat calls are no-ops.
    pub fn cancel(&self, id: JobId) -> bool {
        let Some(job) = self.jobs.read().expect("lock poisoned").get(&id).cloned() else {
            return false;
        };

        job.cancel_token().cancel();
        if job.cancel_if_scheduled("canceled on request") {
            {
                let mut metrics = self.metrics.write().expect("lock poisoned");
                metrics.scheduled = metrics.scheduled.saturating_sub(1);
                metrics.record_terminal(JobState::Canceled);
            }
            if job.processing() == Processing::Serial {
                let key = job.target().serial_key();
                let mut gates = self.gates.lock().expect("lock poisoned");
                if let Some(gate) = gates.get_mut(&key) {
                    gate.waiting.retain(|waiting| *waiting != id);
                    if gate.holder.is_none() && gate.waiting.is_empty() {
                        gates.remove(&key);
                    }
                }
            }
            info!(job = %id, "job canceled before dispatch");
        } else {
            debug!(job = %id, "cancellation requested");
        }
        true
    }

    /// Consistent snapshot of one job, or None if unknown/evicted.
    pub fn job(&self, id: JobId) -> Option<JobView> {
        self.jobs
            .read()
            .expect("lock poisoned")
            .get(&id)
            .map(|job| job.view())
    }

    /// Filtered listing, oldest first.
    pub fn jobs(&self, filter: &JobFilter) -> Vec<JobView> {
        let jobs = self.jobs.read().expect("lock poisoned");
        let mut views: Vec<JobView> = jobs
            .values()
            .filter(|job| filter.matches(job))
            .map(|job| job.view())
            .collect();
        views.sort_by_key(|view| view.created);
        views
    }

    /// Maintenance pass: raise cancel tokens of jobs past the deadline
    /// and evict terminal jobs past retention. Runs lazily on every
    /// admission; callers with idle periods should invoke it on a timer
    /// so eviction does not depend on traffic.
    pub fn sweep(&self) {
        self.enforce_deadline();
        self.evict_expired();
    }

    /// Evict terminal jobs older than the retention window. Returns how
    /// many were dropped.
    pub fn evict_expired(&self) -> usize {
        let mut jobs = self.jobs.write().expect("lock poisoned");
        self.evict_expired_locked(&mut jobs)
    }

    fn evict_expired_locked(&self, jobs: &mut HashMap<JobId, Arc<Job>>) -> usize {
        let retention = self.config.retention();
        let now = Utc::now();
        let expired: Vec<JobId> = jobs
            .values()
            .filter(|job| {
                job.state().is_terminal()
                    && job.ended_at().is_some_and(|ended| {
                        now.signed_duration_since(ended).to_std().unwrap_or_default()
                            >= retention
                    })
            })
            .map(|job| job.id())
            .collect();
        for id in &expired {
            jobs.remove(id);
        }
        if !expired.is_empty() {
            self.metrics.write().expect("lock poisoned").evicted += expired.len() as u64;
            debug!(count = expired.len(), "evicted expired terminal jobs");
        }
        expired.len()
    }

    fn evict_oldest_terminal_locked(
        &self,
        jobs: &mut HashMap<JobId, Arc<Job>>,
    ) -> Result<(), ScheduleError> {
        let oldest = jobs
            .values()
            .filter(|job| job.state().is_terminal())
            .min_by_key(|job| job.ended_at().unwrap_or_else(|| job.created_at()))
            .map(|job| job.id());
        match oldest {
            Some(id) => {
                jobs.remove(&id);
                self.metrics.write().expect("lock poisoned").evicted += 1;
                debug!(job = %id, "evicted terminal job to admit new work");
                Ok(())
            }
            None => Err(ScheduleError::Saturated(format!(
                "all {} retained jobs are active",
                jobs.len()
            ))),
        }
    }

    /// Treat jobs running past the configured deadline as externally
    /// canceled: the token is raised, the processor unwinds at its own
    /// pace. Disabled when no deadline is configured.
    fn enforce_deadline(&self) {
        let Some(deadline) = self.config.deadline() else {
            return;
        };
        let now = Utc::now();
        let overdue: Vec<Arc<Job>> = {
            let jobs = self.jobs.read().expect("lock poisoned");
            jobs.values()
                .filter(|job| {
                    job.state() == JobState::Running
                        && !job.cancel_token().is_canceled()
                        && job.started_at().is_some_and(|started| {
                            now.signed_duration_since(started)
                                .to_std()
                                .unwrap_or_default()
                                >= deadline
                        })
                })
                .cloned()
                .collect()
        };
        for job in overdue {
            warn!(job = %job.id(), "deadline exceeded, requesting cancellation");
            job.append_journal(
                "deadline exceeded, cancellation requested",
                self.config.journal_lines,
            );
            job.cancel_token().cancel();
        }
    }
}
