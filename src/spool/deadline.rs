use tokio::time::Duration;
use tokio::time::Instant;

/// Tracks the inactivity window that forces a partial batch downstream.
#[derive(Clone, Debug)]
pub(crate) struct SpoolDeadline {
    armed_at: Instant,
    next_deadline: Instant,
}

impl SpoolDeadline {
    pub(crate) fn new(timeout: Duration) -> Self {
        let armed_at = Instant::now();
        Self {
            armed_at,
            next_deadline: armed_at + timeout,
        }
    }

    /// Arm a full window starting now.
    pub(crate) fn rearm(&mut self, timeout: Duration) {
        self.armed_at = Instant::now();
        self.next_deadline = self.armed_at + timeout;
    }

    /// Adopt a new timeout while keeping the progress of the current
    /// window. A deadline that lands in the past fires on the next wait
    /// instead of sleeping.
    pub(crate) fn rearm_remaining(&mut self, timeout: Duration) {
        self.next_deadline = self.armed_at + timeout;
    }

    /// Time since the window was armed.
    pub(crate) fn elapsed(&self) -> Duration {
        Instant::now().saturating_duration_since(self.armed_at)
    }

    /// Time left until the window forces a flush.
    pub(crate) fn remaining(&self) -> Duration {
        self.next_deadline.saturating_duration_since(Instant::now())
    }

    pub(crate) fn next_deadline(&self) -> Instant {
        self.next_deadline
    }
}
