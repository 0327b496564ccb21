use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::SnapshotRequest;
use super::StageSnapshot;
use crate::constants::DONE_CHANNEL_SIZE;
use crate::constants::SNAPSHOT_CHANNEL_SIZE;
use crate::constants::SNAPSHOT_REPLY_TIMEOUT_MS;
use crate::LifecycleError;
use crate::Result;
use crate::SpoolConfig;

/// Lifecycle signal bundle handed to a stage at registration.
///
/// Dropping the context marks the stage as finished; a stage that moves it
/// into its run loop therefore reports completion for free when the loop
/// returns.
pub struct StageContext {
    /// Fires once when the pipeline shuts down
    pub shutdown_rx: watch::Receiver<()>,

    /// Carries each configuration replacement
    pub config_rx: watch::Receiver<Arc<SpoolConfig>>,

    /// Diagnostic requests expecting a synchronous reply
    pub snapshot_rx: mpsc::Receiver<SnapshotRequest>,

    // Dropped when the owning stage finishes
    _done: mpsc::Sender<()>,
}

impl Drop for StageContext {
    fn drop(&mut self) {
        eprintln!("WAITDBG: StageContext::drop running");
    }
}

/// Broadcast hub for the signals every stage multiplexes over.
///
/// The pipeline does not spawn or own stage tasks; callers wire data
/// channels between stages directly and spawn the loops themselves. The
/// pipeline only distributes shutdown, configuration and snapshot signals,
/// and tracks completion of everything that registered.
pub struct Pipeline {
    shutdown_tx: watch::Sender<()>,
    config_tx: watch::Sender<Arc<SpoolConfig>>,
    stages: DashMap<String, mpsc::Sender<SnapshotRequest>>,
    done_tx: Mutex<Option<mpsc::Sender<()>>>,
    done_rx: Mutex<Option<mpsc::Receiver<()>>>,
}

impl Pipeline {
    pub fn new(initial: SpoolConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(());
        let (config_tx, _) = watch::channel(Arc::new(initial));
        let (done_tx, done_rx) = mpsc::channel(DONE_CHANNEL_SIZE);

        Self {
            shutdown_tx,
            config_tx,
            stages: DashMap::new(),
            done_tx: Mutex::new(Some(done_tx)),
            done_rx: Mutex::new(Some(done_rx)),
        }
    }

    /// Register a stage and hand back its signal bundle.
    pub fn register(&self, name: &str) -> StageContext {
        let (snapshot_tx, snapshot_rx) = mpsc::channel(SNAPSHOT_CHANNEL_SIZE);
        if self.stages.insert(name.to_string(), snapshot_tx).is_some() {
            warn!(
                "[Pipeline] stage {} registered twice, previous handle replaced",
                name
            );
        }

        let done = match self.done_tx.lock().as_ref() {
            Some(tx) => { eprintln!("WAITDBG: register({}) strong_count before clone = {}", name, tx.strong_count()); tx.clone() },
            None => {
                warn!("[Pipeline] stage {} registered after wait() started", name);
                let (tx, _rx) = mpsc::channel(1);
                tx
            }
        };

        debug!("[Pipeline] stage {} registered", name);

        StageContext {
            shutdown_rx: self.shutdown_tx.subscribe(),
            config_rx: self.config_tx.subscribe(),
            snapshot_rx,
            _done: done,
        }
    }

    /// A shutdown receiver for helpers that live outside stage
    /// registration, such as the metrics endpoint.
    pub fn shutdown_listener(&self) -> watch::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Broadcast shutdown to every registered stage. One-shot; stages
    /// observing it terminate and drop their contexts.
    pub fn shutdown(&self) -> Result<()> {
        debug!("[Pipeline] broadcasting shutdown");
        self.shutdown_tx
            .send(())
            .map_err(|e| LifecycleError::ShutdownBroadcast(e.to_string()))?;

        Ok(())
    }

    /// Validate and broadcast a configuration replacement.
    pub fn update_config(&self, config: SpoolConfig) -> Result<()> {
        config.validate()?;
        info!(
            "[Pipeline] broadcasting configuration: spool_size={}, spool_timeout={}ms, intake_backlog={}",
            config.spool_size, config.spool_timeout_ms, config.intake_backlog
        );
        self.config_tx
            .send(Arc::new(config))
            .map_err(|e| LifecycleError::ConfigBroadcast(e.to_string()))?;

        Ok(())
    }

    /// Latest configuration value.
    pub fn current_config(&self) -> Arc<SpoolConfig> {
        self.config_tx.borrow().clone()
    }

    /// Collect a point-in-time report from every live stage.
    ///
    /// Stages that already exited are skipped; a stage that fails to
    /// answer within a short window is skipped with a warning so one stuck
    /// loop cannot wedge diagnostics for the whole pipeline.
    pub async fn snapshot(&self) -> Vec<StageSnapshot> {
        let targets: Vec<(String, mpsc::Sender<SnapshotRequest>)> = self
            .stages
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        let requests = targets.into_iter().map(|(name, tx)| async move {
            let (reply_tx, reply_rx) = oneshot::channel();
            if tx.send(reply_tx).await.is_err() {
                debug!("[Pipeline] stage {} exited, skipping snapshot", name);
                return None;
            }

            match timeout(Duration::from_millis(SNAPSHOT_REPLY_TIMEOUT_MS), reply_rx).await {
                Ok(Ok(snapshot)) => Some(snapshot),
                Ok(Err(_)) => {
                    debug!("[Pipeline] stage {} dropped its snapshot reply", name);
                    None
                }
                Err(_) => {
                    warn!("[Pipeline] stage {} did not answer a snapshot request", name);
                    None
                }
            }
        });

        join_all(requests).await.into_iter().flatten().collect()
    }

    /// Resolves once every registered stage has dropped its context.
    pub async fn wait(&self) {
        let rx = self.done_rx.lock().take();
        let Some(mut rx) = rx else {
            warn!("[Pipeline] wait() called twice");
            return;
        };

        eprintln!("WAITDBG: before drop original, count = {}", rx.sender_strong_count());
        // Drop our own completion handle so only live stages keep the
        // channel open.
        drop(self.done_tx.lock().take());
        eprintln!("WAITDBG: after drop original, count = {}", rx.sender_strong_count());

        while rx.recv().await.is_some() {}
        debug!("[Pipeline] all stages finished");
    }
}
