//! Prometheus metrics for the spooling pipeline, plus the HTTP endpoint
//! that exposes them.

use lazy_static::lazy_static;
use prometheus::exponential_buckets;
use prometheus::Histogram;
use prometheus::HistogramOpts;
use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::Opts;
use prometheus::Registry;
use tokio::sync::watch;
use warp::Filter;
use warp::Rejection;
use warp::Reply;

lazy_static! {
    pub static ref EVENTS_SPOOLED_METRIC: IntCounter = IntCounter::new(
        "events_spooled_total",
        "Events accepted into the spool"
    )
    .expect("metric can not be created");

    pub static ref BATCHES_FLUSHED_METRIC: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "batches_flushed_total",
            "Batches handed to the downstream sink"
        ),
        &["reason"]
    )
    .expect("metric can not be created");

    pub static ref BATCH_FILL_METRIC: Histogram = Histogram::with_opts(
        HistogramOpts::new("spool_batch_fill", "Events per flushed batch")
            .buckets(exponential_buckets(1.0, 2.0, 12).unwrap())
    )
    .expect("metric can not be created");

    pub static ref EVENTS_DISCARDED_METRIC: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "events_discarded_total",
            "Events dropped at a documented loss boundary"
        ),
        &["cause"]
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

pub fn register_custom_metrics(registry: &Registry) {
    registry
        .register(Box::new(EVENTS_SPOOLED_METRIC.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(BATCHES_FLUSHED_METRIC.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(BATCH_FILL_METRIC.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(EVENTS_DISCARDED_METRIC.clone()))
        .expect("collector can be registered");
}

/// Serve `/metrics` until the shutdown signal fires.
pub async fn start_server(port: u16, mut shutdown_signal: watch::Receiver<()>) {
    register_custom_metrics(&REGISTRY);

    let metrics_route = warp::path!("metrics")
        .map(|| REGISTRY.clone())
        .and_then(metrics_handler);

    let (_, server) =
        warp::serve(metrics_route).bind_with_graceful_shutdown(([0, 0, 0, 0], port), async move {
            let _ = shutdown_signal.changed().await;
        });
    server.await;
}

async fn metrics_handler(registry: Registry) -> Result<impl Reply, Rejection> {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        eprintln!("could not encode spool metrics: {}", e);
    };
    let mut res = match String::from_utf8(buffer) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("spool metrics could not be from_utf8'd: {}", e);
            String::default()
        }
    };

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        eprintln!("could not encode default metrics: {}", e);
    };
    match String::from_utf8(buffer) {
        Ok(v) => res.push_str(&v),
        Err(e) => eprintln!("default metrics could not be from_utf8'd: {}", e),
    };

    Ok(res)
}
