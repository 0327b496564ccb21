// Channel depths for pipeline plumbing

/// Per-stage backlog of pending diagnostic requests
pub(crate) const SNAPSHOT_CHANNEL_SIZE: usize = 4;

/// Stage completion channel depth
pub(crate) const DONE_CHANNEL_SIZE: usize = 8;

/// How long a snapshot aggregation waits for a single stage to reply
pub(crate) const SNAPSHOT_REPLY_TIMEOUT_MS: u64 = 1_000;
