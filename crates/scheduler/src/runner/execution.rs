use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::job::{Job, JobKind, JobState, Processing, TargetKey};
use crate::provider::JobMonitor;
use crate::store::track_label;
use crate::task::{self, ExecEnv};
use crate::training;

use super::core::WorkerContext;
use super::Scheduler;

impl Scheduler {
    /// Hand a job to its category pool. The serial slot, if any, is
    /// already held at this point.
    pub(super) fn dispatch(&self, job: Arc<Job>) {
        let ctx = self.worker_context();
        self.pools
            .for_category(job.category())
            .spawn(move || run_job(ctx, job));
    }
}

/// Worker body: drive one job from `scheduled` to a terminal state.
/// Never panics outward; processor panics settle the job as `unknown`.
pub(super) fn run_job(ctx: WorkerContext, job: Arc<Job>) {
    let serial_key =
        (job.processing() == Processing::Serial).then(|| job.target().serial_key());

    if !job.mark_running() {
        // Canceled while queued. The slot may still be on this job.
        debug!(job = %job.id(), "job already terminal at dispatch");
        if let Some(key) = serial_key {
            release_serial_slot(&ctx, &key);
        }
        return;
    }

    {
        let mut metrics = ctx.metrics.write().expect("lock poisoned");
        metrics.scheduled = metrics.scheduled.saturating_sub(1);
        metrics.running += 1;
    }
    info!(
        job = %job.id(),
        provider = job.kind().provider_id(),
        "job started"
    );

    let monitor = RunnerMonitor {
        ctx: &ctx,
        job: &job,
    };
    let started = Instant::now();
    let outcome = catch_unwind(AssertUnwindSafe(|| execute(&ctx, &job, &monitor)));
    let (state, reason) = match outcome {
        Ok(settled) => settled,
        Err(payload) => {
            let message = panic_message(payload);
            error!(job = %job.id(), "processor panicked: {}", message);
            (JobState::Unknown, format!("processor panicked: {message}"))
        }
    };

    job.finish(state, &reason);
    settle_model(&ctx, &job, state, &reason);

    {
        let mut metrics = ctx.metrics.write().expect("lock poisoned");
        metrics.running = metrics.running.saturating_sub(1);
        metrics.record_terminal(state);
        metrics.record_execution(job.kind().provider_id(), started.elapsed());
    }
    info!(job = %job.id(), state = %state, reason = %reason, "job finished");

    if let Some(key) = serial_key {
        release_serial_slot(&ctx, &key);
    }
}

fn execute(ctx: &WorkerContext, job: &Job, monitor: &dyn JobMonitor) -> (JobState, String) {
    let env = ExecEnv {
        directory: ctx.directory.as_ref(),
        snapshots: ctx.snapshots.as_ref(),
        data_dir: &ctx.data_dir,
        monitor,
    };
    match job.kind() {
        JobKind::Project(work) => task::execute_project(job, work, env),
        JobKind::Sandbox(work) => task::execute_sandbox(job, work, env),
        JobKind::Training(work) => training::execute(job, work, env),
    }
}

/// Give the serial slot back and dispatch the next parked job on the
/// target, skipping entries that went terminal or were evicted while
/// waiting. Removes drained gates from the table.
pub(super) fn release_serial_slot(ctx: &WorkerContext, key: &TargetKey) {
    let next = {
        let mut gates = ctx.gates.lock().expect("lock poisoned");
        let mut next = None;
        let mut drained = false;
        if let Some(gate) = gates.get_mut(key) {
            gate.holder = None;
            while let Some(id) = gate.waiting.pop_front() {
                // The jobs lock is never held while waiting on the gate
                // table, so taking a read here cannot deadlock.
                let candidate = ctx.jobs.read().expect("lock poisoned").get(&id).cloned();
                if let Some(job) = candidate {
                    if !job.state().is_terminal() {
                        gate.holder = Some(id);
                        next = Some(job);
                        break;
                    }
                }
            }
            drained = gate.holder.is_none() && gate.waiting.is_empty();
        }
        if drained {
            gates.remove(key);
        }
        next
    };

    if let Some(job) = next {
        debug!(job = %job.id(), "serial slot handed over");
        let worker_ctx = ctx.clone();
        ctx.pools
            .for_category(job.category())
            .spawn(move || run_job(worker_ctx, job));
    }
}

/// Trainings leave a model entity behind; settle its state to match the
/// job outcome. Failures here are logged, never surfaced to the worker.
fn settle_model(ctx: &WorkerContext, job: &Job, state: JobState, reason: &str) {
    let JobKind::Training(work) = job.kind() else {
        return;
    };
    let result = match state {
        JobState::Completed => ctx.models.mark_trained(work.model),
        _ => ctx.models.mark_failed(work.model, reason),
    };
    if let Err(e) = result {
        error!(job = %job.id(), model = %work.model, "model bookkeeping failed: {}", e);
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "opaque panic payload".to_string()
    }
}

/// Progress/journal/snapshot-lock callbacks for one running job.
struct RunnerMonitor<'a> {
    ctx: &'a WorkerContext,
    job: &'a Arc<Job>,
}

impl JobMonitor for RunnerMonitor<'_> {
    fn progress(&self, fraction: f64) {
        self.job.set_progress(fraction);
    }

    fn log(&self, line: &str) {
        self.job.append_journal(line, self.ctx.journal_lines);
    }

    fn request_snapshot_lock(&self) {
        let Some(sandbox) = self.job.target().sandbox.clone() else {
            return;
        };
        let Some(track) = self.job.snapshot_track() else {
            return;
        };
        match self
            .ctx
            .snapshots
            .lock(&self.job.target().project, &sandbox, &track)
        {
            Ok(()) => self.job.append_journal(
                &format!("snapshot {} locked", track_label(&track)),
                self.ctx.journal_lines,
            ),
            Err(e) => {
                warn!(job = %self.job.id(), "snapshot lock failed: {}", e);
            }
        }
    }
}
