use uuid::Uuid;

/// Unique identifier of a scheduled job.
pub type JobId = Uuid;

/// Unique identifier of a recognition model.
pub type ModelId = Uuid;

/// Project identifier (directory name under the workspace root).
pub type ProjectId = String;

/// Sandbox identifier (directory name under its project).
pub type SandboxId = String;

/// Identifier of a ground-truth collection.
pub type CollectionId = String;

/// User identifier as resolved by the authentication layer.
pub type UserId = String;

/// Position of a snapshot in a sandbox's derivation tree: the sequence
/// of child indices walked from the root. The root snapshot is `[1]`.
pub type SnapshotTrack = Vec<u32>;
