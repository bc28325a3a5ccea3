//! Built-in providers for local development and smoke tests.
//!
//! Real processing engines register through [`ProviderRegistry`] the
//! same way. These stay trivial so a fresh checkout has something to
//! submit against: an echo processor, a cancellable sleep, and a mock
//! trainer.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde_json::Value;

use scriptorium_scheduler::{
    ArgKind, CoreData, ProcessContext, ProcessServiceProvider, Processor, ProviderModel,
    ProviderRegistry, RunOutcome, Trainer, TrainingContext, TrainingServiceProvider,
};

/// Register every built-in provider.
pub fn register(registry: &mut ProviderRegistry) {
    registry.register_process(Arc::new(EchoProvider));
    registry.register_process(Arc::new(SleepProvider));
    registry.register_training(Arc::new(MockTrainProvider));
}

/// Project-scoped processor that writes its `message` argument to the
/// job journal and completes.
struct EchoProvider;

impl ProcessServiceProvider for EchoProvider {
    fn id(&self) -> &str {
        "builtin.echo"
    }

    fn name(&self) -> &str {
        "Echo"
    }

    fn core_data(&self) -> CoreData {
        CoreData::Project
    }

    fn model(&self) -> ProviderModel {
        ProviderModel::new().arg("message", ArgKind::Text, false)
    }

    fn processor(&self) -> Box<dyn Processor> {
        Box::new(EchoRun)
    }
}

struct EchoRun;

impl Processor for EchoRun {
    fn run(&mut self, ctx: ProcessContext<'_>) -> RunOutcome {
        let message = ctx
            .args
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("hello");
        ctx.monitor.log(&format!("echo: {}", message));
        ctx.monitor.progress(1.0);
        RunOutcome::Completed
    }
}

/// Sandbox-scoped processor that sleeps for `seconds`, checking the
/// cancel token between slices. Useful for exercising cancellation and
/// serial-slot behavior by hand.
struct SleepProvider;

impl ProcessServiceProvider for SleepProvider {
    fn id(&self) -> &str {
        "builtin.sleep"
    }

    fn name(&self) -> &str {
        "Sleep"
    }

    fn core_data(&self) -> CoreData {
        CoreData::Sandbox
    }

    fn model(&self) -> ProviderModel {
        ProviderModel::new().arg("seconds", ArgKind::Integer, true)
    }

    fn processor(&self) -> Box<dyn Processor> {
        Box::new(SleepRun)
    }
}

struct SleepRun;

impl Processor for SleepRun {
    fn run(&mut self, ctx: ProcessContext<'_>) -> RunOutcome {
        let seconds = ctx.args.get("seconds").and_then(Value::as_u64).unwrap_or(1);
        let slices = seconds * 20;
        for done in 0..slices {
            if ctx.cancel.is_canceled() {
                return RunOutcome::Canceled;
            }
            thread::sleep(Duration::from_millis(50));
            ctx.monitor.progress((done + 1) as f64 / slices as f64);
        }
        ctx.monitor.log("slept through");
        RunOutcome::Completed
    }
}

/// Trainer that pretends to run `epochs` training epochs.
struct MockTrainProvider;

impl TrainingServiceProvider for MockTrainProvider {
    fn id(&self) -> &str {
        "builtin.train"
    }

    fn name(&self) -> &str {
        "Mock trainer"
    }

    fn model(&self) -> ProviderModel {
        ProviderModel::new().arg("epochs", ArgKind::Integer, false)
    }

    fn trainer(&self) -> Box<dyn Trainer> {
        Box::new(MockTrainRun)
    }
}

struct MockTrainRun;

impl Trainer for MockTrainRun {
    fn run(&mut self, ctx: TrainingContext<'_>) -> RunOutcome {
        let epochs = ctx.args.get("epochs").and_then(Value::as_u64).unwrap_or(3);
        for epoch in 0..epochs {
            if ctx.cancel.is_canceled() {
                return RunOutcome::Canceled;
            }
            thread::sleep(Duration::from_millis(100));
            ctx.monitor.log(&format!("epoch {} of {} done", epoch + 1, epochs));
            ctx.monitor.progress((epoch + 1) as f64 / epochs as f64);
        }
        RunOutcome::Completed
    }
}
