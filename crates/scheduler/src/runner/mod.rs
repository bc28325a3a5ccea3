//! Scheduler runner -- owns the worker pools and drives jobs to a
//! terminal state.
//!
//! Split into focused submodules:
//! - `core`: Scheduler struct, constructor, shutdown, and accessor methods
//! - `scheduling`: admission, cancellation, queries, and retention sweep
//! - `execution`: worker-side job execution and serial slot handover

mod core;
mod execution;
mod scheduling;

pub use self::core::Scheduler;
