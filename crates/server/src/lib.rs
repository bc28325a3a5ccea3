//! HTTP surface over the scriptorium scheduler: task and training
//! submission, job observation and cancellation, provider listing, and
//! operational endpoints.

pub mod api;
pub mod builtin;
pub mod error;
pub mod router;
pub mod state;

pub use router::build_router;
pub use state::AppState;
