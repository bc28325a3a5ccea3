use thiserror::Error;

/// Error raised while building or admitting a job.
///
/// Variants map to distinct rejection classes so callers can translate
/// them into transport responses without parsing message text.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// Malformed submission: unknown provider, blank label, arguments
    /// not matching the provider's model, unresolvable references.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Caller lacks a required right on the target.
    #[error("not authorized: {0}")]
    Authorization(String),

    /// Target or scheduler is not in a state that accepts work.
    #[error("target unavailable: {0}")]
    Unavailable(String),

    /// Scheduler is at capacity; the caller may retry later.
    #[error("scheduler saturated: {0}")]
    Saturated(String),

    /// A backing store failed while the submission was being prepared.
    #[error("internal fault: {0}")]
    Internal(String),
}
