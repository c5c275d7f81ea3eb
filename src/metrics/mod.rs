//! Prometheus metrics for the vigil health check engine
//!
//! Exposes metrics via HTTP endpoint for Prometheus scraping.

use std::sync::OnceLock;
use std::time::Duration;

use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
};

use crate::health::Status;

pub const FAULT_ERROR: &str = "error";
pub const FAULT_PANIC: &str = "panic";
pub const TICK_STARTED: &str = "started";
pub const TICK_SKIPPED: &str = "skipped";

/// Global metrics registry
static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Get the global metrics instance
pub fn metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}

/// Vigil metrics collection
pub struct Metrics {
    /// Registry for all metrics
    pub registry: Registry,

    // Execution metrics
    /// Completed probe executions by raw status
    pub executions_total: IntCounterVec,
    /// Probe execution latency histogram (in seconds)
    pub execution_duration_seconds: HistogramVec,
    /// Probe faults by kind (error, panic)
    pub faults_total: IntCounterVec,
    /// Caller timeouts by synthesized severity
    pub timeouts_total: IntCounterVec,
    /// TEMPORARILY_UNAVAILABLE escalated to CRITICAL
    pub escalations_total: IntCounterVec,

    // Scheduler metrics
    /// Scheduler ticks by outcome (started, skipped)
    pub ticks_total: IntCounterVec,

    // Executor metrics
    /// Cache lookups by result (hit, miss)
    pub cache_lookups_total: IntCounterVec,
    /// Runs completed
    pub runs_total: IntCounter,
    /// Severity of the latest run's overall status
    pub overall_status: IntGauge,
    /// Severity of each probe's effective status
    pub probe_status: IntGaugeVec,
    /// Registered probes
    pub probes_registered: IntGauge,
}

impl Metrics {
    /// Create a new metrics collection
    pub fn new() -> Self {
        let registry = Registry::new();

        // Execution metrics
        let executions_total = IntCounterVec::new(
            Opts::new("vigil_probe_executions_total", "Total number of completed probe executions"),
            &["probe", "status"],
        )
        .unwrap();

        let execution_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "vigil_probe_execution_duration_seconds",
                "Probe execution latency in seconds",
            )
            .buckets(vec![
                0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
                10.0, 30.0, 60.0,
            ]),
            &["probe"],
        )
        .unwrap();

        let faults_total = IntCounterVec::new(
            Opts::new("vigil_probe_faults_total", "Total number of probe faults"),
            &["probe", "kind"], // error, panic
        )
        .unwrap();

        let timeouts_total = IntCounterVec::new(
            Opts::new(
                "vigil_probe_timeouts_total",
                "Total number of callers that stopped waiting for a probe",
            ),
            &["probe", "status"], // WARN, CRITICAL
        )
        .unwrap();

        let escalations_total = IntCounterVec::new(
            Opts::new(
                "vigil_probe_escalations_total",
                "Total number of grace period escalations to CRITICAL",
            ),
            &["probe"],
        )
        .unwrap();

        // Scheduler metrics
        let ticks_total = IntCounterVec::new(
            Opts::new("vigil_scheduler_ticks_total", "Total number of scheduler ticks"),
            &["probe", "outcome"], // started, skipped
        )
        .unwrap();

        // Executor metrics
        let cache_lookups_total = IntCounterVec::new(
            Opts::new("vigil_cache_lookups_total", "Total number of result cache lookups"),
            &["result"], // hit, miss
        )
        .unwrap();

        let runs_total = IntCounter::new("vigil_runs_total", "Total number of executor runs").unwrap();

        let overall_status = IntGauge::new(
            "vigil_overall_status",
            "Severity of the latest overall status (0 = OK, 4 = HEALTH_CHECK_ERROR)",
        )
        .unwrap();

        let probe_status = IntGaugeVec::new(
            Opts::new(
                "vigil_probe_status",
                "Severity of each probe's effective status (0 = OK, 4 = HEALTH_CHECK_ERROR)",
            ),
            &["probe"],
        )
        .unwrap();

        let probes_registered = IntGauge::new(
            "vigil_probes_registered",
            "Current number of registered probes",
        )
        .unwrap();

        // Register all metrics
        registry
            .register(Box::new(executions_total.clone()))
            .unwrap();
        registry
            .register(Box::new(execution_duration_seconds.clone()))
            .unwrap();
        registry.register(Box::new(faults_total.clone())).unwrap();
        registry.register(Box::new(timeouts_total.clone())).unwrap();
        registry
            .register(Box::new(escalations_total.clone()))
            .unwrap();
        registry.register(Box::new(ticks_total.clone())).unwrap();
        registry
            .register(Box::new(cache_lookups_total.clone()))
            .unwrap();
        registry.register(Box::new(runs_total.clone())).unwrap();
        registry.register(Box::new(overall_status.clone())).unwrap();
        registry.register(Box::new(probe_status.clone())).unwrap();
        registry
            .register(Box::new(probes_registered.clone()))
            .unwrap();

        Self {
            registry,
            executions_total,
            execution_duration_seconds,
            faults_total,
            timeouts_total,
            escalations_total,
            ticks_total,
            cache_lookups_total,
            runs_total,
            overall_status,
            probe_status,
            probes_registered,
        }
    }

    /// Record a completed execution
    pub fn record_execution(&self, probe: &str, status: Status, duration: Duration) {
        self.executions_total
            .with_label_values(&[probe, status.as_str()])
            .inc();
        self.execution_duration_seconds
            .with_label_values(&[probe])
            .observe(duration.as_secs_f64());
    }

    /// Record a probe fault
    pub fn record_fault(&self, probe: &str, kind: &str) {
        self.faults_total.with_label_values(&[probe, kind]).inc();
    }

    /// Record a caller timeout and the status synthesized for it
    pub fn record_timeout(&self, probe: &str, status: Status) {
        self.timeouts_total
            .with_label_values(&[probe, status.as_str()])
            .inc();
    }

    pub fn record_escalation(&self, probe: &str) {
        self.escalations_total.with_label_values(&[probe]).inc();
    }

    /// Record a scheduler tick
    pub fn record_tick(&self, probe: &str, outcome: &str) {
        self.ticks_total.with_label_values(&[probe, outcome]).inc();
    }

    pub fn record_cache_lookup(&self, hit: bool) {
        let result = if hit { "hit" } else { "miss" };
        self.cache_lookups_total.with_label_values(&[result]).inc();
    }

    /// Record a finished run
    pub fn record_run(&self, overall: Status) {
        self.runs_total.inc();
        self.overall_status.set(overall.severity());
    }

    pub fn set_probe_status(&self, probe: &str, status: Status) {
        self.probe_status
            .with_label_values(&[probe])
            .set(status.severity());
    }

    /// Drop every series labelled with an unregistered name
    pub fn remove_series(&self, probe: &str) {
        for status in Status::ALL {
            let _ = self
                .executions_total
                .remove_label_values(&[probe, status.as_str()]);
            let _ = self
                .timeouts_total
                .remove_label_values(&[probe, status.as_str()]);
        }
        for kind in [FAULT_ERROR, FAULT_PANIC] {
            let _ = self.faults_total.remove_label_values(&[probe, kind]);
        }
        for outcome in [TICK_STARTED, TICK_SKIPPED] {
            let _ = self.ticks_total.remove_label_values(&[probe, outcome]);
        }
        let _ = self.execution_duration_seconds.remove_label_values(&[probe]);
        let _ = self.escalations_total.remove_label_values(&[probe]);
        let _ = self.probe_status.remove_label_values(&[probe]);
    }

    pub fn set_registered(&self, count: usize) {
        self.probes_registered.set(count as i64);
    }

    /// Get metrics as Prometheus text format
    pub fn gather(&self) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Start the metrics HTTP server
pub async fn start_metrics_server(addr: &str) -> anyhow::Result<()> {
    use http_body_util::Full;
    use hyper::body::Bytes;
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper::{Request, Response, StatusCode};
    use hyper_util::rt::TokioIo;
    use std::convert::Infallible;
    use std::net::SocketAddr;
    use tokio::net::TcpListener;
    use tracing::{error, info};

    async fn handle_request(
        req: Request<hyper::body::Incoming>,
    ) -> Result<Response<Full<Bytes>>, Infallible> {
        let response = match req.uri().path() {
            "/metrics" => Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", "text/plain; version=0.0.4; charset=utf-8")
                .body(Full::new(Bytes::from(metrics().gather()))),
            "/health" => Response::builder()
                .status(StatusCode::OK)
                .body(Full::new(Bytes::from("OK"))),
            _ => Response::builder()
                .status(StatusCode::NOT_FOUND)
                .body(Full::new(Bytes::from("Not Found"))),
        };
        Ok(response.unwrap_or_else(|_| Response::new(Full::new(Bytes::new()))))
    }

    let addr: SocketAddr = addr.parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Metrics server listening");

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            if let Err(e) = http1::Builder::new()
                .serve_connection(io, service_fn(handle_request))
                .await
            {
                error!(error = %e, "Metrics server connection error");
            }
        });
    }
}
