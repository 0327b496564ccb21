use std::path::Path;
use std::sync::Arc;

use espool::start_server;
use espool::Batch;
use espool::Pipeline;
use espool::Result;
use espool::Settings;
use espool::Spooler;
use espool::StageContext;
use espool::StageSnapshot;
use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tokio::sync::mpsc;
use tracing::error;
use tracing::info;
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

// One batch in flight towards the sink; a slow sink backpressures the
// spooler instead of buffering
const BATCH_CHANNEL_SIZE: usize = 1;

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    let config_path = std::env::args().nth(1);
    let settings = Settings::load(config_path.as_deref())?;

    // Initializing Logs
    let _guard = init_observability(&settings.log_dir)?;

    let pipeline = Arc::new(Pipeline::new(settings.spool.clone()));

    if settings.monitoring.prometheus_enabled {
        tokio::spawn(start_server(
            settings.monitoring.prometheus_port,
            pipeline.shutdown_listener(),
        ));
    }

    // Wire the stages: reader -> spooler -> sink
    let (batch_tx, batch_rx) = mpsc::channel::<Batch<String>>(BATCH_CHANNEL_SIZE);

    let spooler = Spooler::new(
        pipeline.current_config(),
        batch_tx,
        pipeline.register("spooler"),
    );
    let intake = spooler.connect();
    let reader_ctx = pipeline.register("reader");
    let sink_ctx = pipeline.register("sink");

    tokio::spawn(async move {
        if let Err(e) = spooler.run().await {
            error!("spooler stopped: {:?}", e);
        }
    });
    tokio::spawn(run_reader(intake, reader_ctx));
    tokio::spawn(run_sink(batch_rx, sink_ctx));

    // Listen on lifecycle signals
    tokio::spawn(handle_signals(pipeline.clone(), config_path));

    info!("Pipeline started. Waiting for CTRL+C signal...");
    pipeline.wait().await;

    println!("Exiting program.");
    Ok(())
}

/// Feeds stdin lines into the spooler, one event per line.
async fn run_reader(intake: mpsc::Sender<String>, mut ctx: StageContext) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut lines_read: u64 = 0;

    loop {
        tokio::select! {
            biased;

            _ = ctx.shutdown_rx.changed() => {
                warn!("[Reader] shutdown signal received.");
                break;
            }

            Some(reply) = ctx.snapshot_rx.recv() => {
                let _ = reply.send(StageSnapshot::new("reader").with_entry("lines_read", lines_read));
            }

            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    lines_read += 1;
                    if intake.send(line).await.is_err() {
                        warn!("[Reader] spooler intake closed");
                        break;
                    }
                }
                Ok(None) => {
                    info!("[Reader] input exhausted");
                    break;
                }
                Err(e) => {
                    error!("[Reader] read failed: {}", e);
                    break;
                }
            }
        }
    }
}

/// Writes each batch to stdout as one JSON line.
async fn run_sink(mut batches: mpsc::Receiver<Batch<String>>, mut ctx: StageContext) {
    let mut batches_written: u64 = 0;

    loop {
        tokio::select! {
            biased;

            _ = ctx.shutdown_rx.changed() => {
                warn!("[Sink] shutdown signal received.");
                break;
            }

            Some(reply) = ctx.snapshot_rx.recv() => {
                let _ = reply.send(
                    StageSnapshot::new("sink").with_entry("batches_written", batches_written),
                );
            }

            batch = batches.recv() => match batch {
                Some(batch) => {
                    batches_written += 1;
                    match serde_json::to_string(&batch) {
                        Ok(line) => println!("{}", line),
                        Err(e) => error!("[Sink] failed to encode batch: {}", e),
                    }
                }
                None => {
                    info!("[Sink] upstream finished");
                    break;
                }
            }
        }
    }
}

/// Translates process signals into pipeline operations: INT/TERM stop the
/// pipeline, HUP reloads configuration from disk, USR1 dumps a snapshot.
async fn handle_signals(pipeline: Arc<Pipeline>, config_path: Option<String>) {
    let mut sigint = signal(SignalKind::interrupt()).unwrap();
    let mut sigterm = signal(SignalKind::terminate()).unwrap();
    let mut sighup = signal(SignalKind::hangup()).unwrap();
    let mut sigusr1 = signal(SignalKind::user_defined1()).unwrap();

    loop {
        tokio::select! {
            _ = sigint.recv() => {
                info!("SIGINT detected.");
                break;
            },
            _ = sigterm.recv() => {
                info!("SIGTERM detected.");
                break;
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C detected.");
                break;
            },
            _ = sighup.recv() => {
                info!("SIGHUP detected, reloading configuration.");
                match Settings::load(config_path.as_deref()) {
                    Ok(settings) => {
                        if let Err(e) = pipeline.update_config(settings.spool) {
                            error!("Failed to distribute configuration: {:?}", e);
                        }
                    }
                    Err(e) => error!("Configuration reload failed: {:?}", e),
                }
            },
            _ = sigusr1.recv() => {
                info!("SIGUSR1 detected, collecting snapshot.");
                for snapshot in pipeline.snapshot().await {
                    match serde_json::to_string(&snapshot) {
                        Ok(line) => info!("snapshot: {}", line),
                        Err(e) => error!("Failed to encode snapshot: {}", e),
                    }
                }
            },
        }
    }

    if let Err(e) = pipeline.shutdown() {
        error!("Failed to send shutdown signal: {:?}", e);
    }
}

fn init_observability(log_dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("espool.log"))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(log_file);
    let base_subscriber = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(base_subscriber).init();

    Ok(guard)
}
