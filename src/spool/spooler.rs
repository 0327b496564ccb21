//! The spooler event loop.
//!
//! One cooperative loop owns all mutable state (spool buffer, deadline,
//! configuration), so the stage needs no locks. Producers hand events in
//! through a bounded intake channel; completed batches leave through the
//! downstream channel supplied at construction. The loop multiplexes over
//! five sources: new events, the flush deadline, shutdown, configuration
//! replacements and diagnostic snapshot requests. The downstream handoff
//! is the only point that can block, and the flush path re-enters the
//! same multiplexer so the stage never goes deaf to lifecycle signals
//! while a slow sink holds it up.

use std::mem;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::time::sleep_until;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::SpoolDeadline;
use crate::metrics::BATCHES_FLUSHED_METRIC;
use crate::metrics::BATCH_FILL_METRIC;
use crate::metrics::EVENTS_DISCARDED_METRIC;
use crate::metrics::EVENTS_SPOOLED_METRIC;
use crate::Result;
use crate::SnapshotRequest;
use crate::SpoolConfig;
use crate::StageContext;
use crate::StageSnapshot;

/// An ordered group of events forwarded downstream as one unit.
pub type Batch<E> = Vec<E>;

/// Why a batch left the spool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlushReason {
    Capacity,
    Deadline,
    Reload,
}

impl FlushReason {
    fn as_str(&self) -> &'static str {
        match self {
            FlushReason::Capacity => "capacity",
            FlushReason::Deadline => "deadline",
            FlushReason::Reload => "reload",
        }
    }
}

/// The batching stage of the pipeline.
///
/// Events are opaque; the spooler never inspects payloads, it only
/// bounds, orders and forwards them.
pub struct Spooler<E> {
    config: Arc<SpoolConfig>,
    spool: Vec<E>,
    input_tx: mpsc::Sender<E>,
    input_rx: mpsc::Receiver<E>,
    output_tx: mpsc::Sender<Batch<E>>,
    deadline: SpoolDeadline,
    // Lifecycle signals, injected at registration
    ctx: StageContext,
}

impl<E> Spooler<E>
where E: Send + 'static
{
    pub fn new(
        config: Arc<SpoolConfig>,
        output_tx: mpsc::Sender<Batch<E>>,
        ctx: StageContext,
    ) -> Self {
        let (input_tx, input_rx) = mpsc::channel(config.intake_backlog);
        let deadline = SpoolDeadline::new(config.spool_timeout());

        Self {
            spool: Vec::with_capacity(config.spool_size),
            config,
            input_tx,
            input_rx,
            output_tx,
            deadline,
            ctx,
        }
    }

    /// Producer-facing intake handle. May be cloned and shared freely;
    /// arrival order is only guaranteed per producer.
    pub fn connect(&self) -> mpsc::Sender<E> {
        self.input_tx.clone()
    }

    /// Drive the stage until shutdown. Returns only on termination.
    /// Events still spooled when the loop exits are discarded; that is a
    /// documented boundary of the stage, logged and counted, not an
    /// error.
    pub async fn run(mut self) -> Result<()> {
        self.deadline.rearm(self.config.spool_timeout());

        loop {
            let tick = sleep_until(self.deadline.next_deadline());

            tokio::select! {
                biased;

                // P0: shutdown wins over everything else
                _ = self.ctx.shutdown_rx.changed() => {
                    warn!("[Spooler] shutdown signal received.");
                    break;
                }

                Some(reply) = self.ctx.snapshot_rx.recv() => {
                    self.handle_snapshot(reply);
                }

                _ = self.ctx.config_rx.changed() => {
                    let next = self.ctx.config_rx.borrow_and_update().clone();
                    if !self.reload_config(next).await {
                        break;
                    }
                }

                Some(event) = self.input_rx.recv() => {
                    self.spool.push(event);
                    EVENTS_SPOOLED_METRIC.inc();
                    trace!("[Spooler] event spooled, {}/{}", self.spool.len(), self.config.spool_size);

                    // Flush if full
                    if self.spool.len() >= self.config.spool_size {
                        if !self.send_spool(FlushReason::Capacity).await {
                            break;
                        }
                    }
                }

                _ = tick => {
                    // Flush what we have, if anything
                    if self.spool.is_empty() {
                        self.deadline.rearm(self.config.spool_timeout());
                    } else if !self.send_spool(FlushReason::Deadline).await {
                        break;
                    }
                }
            }
        }

        if !self.spool.is_empty() {
            EVENTS_DISCARDED_METRIC
                .with_label_values(&["shutdown"])
                .inc_by(self.spool.len() as u64);
            info!(
                "[Spooler] discarding {} unflushed events at shutdown",
                self.spool.len()
            );
        }
        info!("[Spooler] exiting");

        Ok(())
    }

    /// One flush attempt. Races the downstream handoff against the
    /// lifecycle signals so the loop stays responsive while a slow sink
    /// holds the batch up. Every concluded attempt leaves a fresh spool
    /// and a fully rearmed deadline behind; `false` means terminate.
    async fn send_spool(&mut self, reason: FlushReason) -> bool {
        debug!(
            "[Spooler] flushing {} events ({})",
            self.spool.len(),
            reason.as_str()
        );

        let output_tx = self.output_tx.clone();

        tokio::select! {
            biased;

            _ = self.ctx.shutdown_rx.changed() => {
                warn!("[Spooler] shutdown signal received during flush.");
                return false;
            }

            Some(reply) = self.ctx.snapshot_rx.recv() => {
                // TODO: retry the interrupted handoff with the same batch
                // instead of falling through to the reset below
                self.handle_snapshot(reply);
            }

            _ = self.ctx.config_rx.changed() => {
                let next = self.ctx.config_rx.borrow_and_update().clone();
                if !self.reload_config(next).await {
                    return false;
                }
            }

            permit = output_tx.reserve() => {
                match permit {
                    Ok(permit) => {
                        let batch = mem::take(&mut self.spool);
                        BATCH_FILL_METRIC.observe(batch.len() as f64);
                        BATCHES_FLUSHED_METRIC
                            .with_label_values(&[reason.as_str()])
                            .inc();
                        trace!("[Spooler] batch of {} handed off", batch.len());
                        permit.send(batch);
                    }
                    Err(_) => {
                        warn!("[Spooler] downstream sink closed, terminating");
                        return false;
                    }
                }
            }
        }

        if !self.spool.is_empty() {
            EVENTS_DISCARDED_METRIC
                .with_label_values(&["interrupted_flush"])
                .inc_by(self.spool.len() as u64);
            warn!(
                "[Spooler] flush interrupted, {} events dropped",
                self.spool.len()
            );
        }
        self.spool = Vec::with_capacity(self.config.spool_size);
        self.deadline.rearm(self.config.spool_timeout());

        true
    }

    /// Swap in a replacement configuration. Flushes right away when the
    /// new limits are already exceeded, otherwise the current window
    /// keeps its elapsed progress under the new timeout.
    ///
    /// Boxed because a reload can flush, and a blocked flush can observe
    /// another reload.
    fn reload_config(&mut self, next: Arc<SpoolConfig>) -> BoxFuture<'_, bool> {
        async move {
            info!(
                "[Spooler] configuration applied: spool_size={}, spool_timeout={}ms",
                next.spool_size, next.spool_timeout_ms
            );
            self.config = next;

            // Immediate flush?
            let elapsed = self.deadline.elapsed();
            if !self.spool.is_empty()
                && (elapsed >= self.config.spool_timeout()
                    || self.spool.len() >= self.config.spool_size)
            {
                if !self.send_spool(FlushReason::Reload).await {
                    return false;
                }
            } else {
                self.deadline.rearm_remaining(self.config.spool_timeout());
            }

            true
        }
        .boxed()
    }

    /// Answer a diagnostic request with a point-in-time view of the
    /// stage, then carry on.
    fn handle_snapshot(&self, reply: SnapshotRequest) {
        let snapshot = StageSnapshot::new("spooler")
            .with_entry("spooled_events", self.spool.len())
            .with_entry("spool_size", self.config.spool_size)
            .with_entry("spool_timeout_ms", self.config.spool_timeout_ms)
            .with_entry("deadline_remaining_ms", self.deadline.remaining().as_millis());

        if reply.send(snapshot).is_err() {
            debug!("[Spooler] snapshot requester went away");
        }
    }
}
