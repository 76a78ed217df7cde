//! HTTP endpoint for metrics, status and control
//!
//! - `GET /metrics` - Prometheus text format
//! - `GET /status` - JSON snapshot of the controller
//! - `GET /health`
//! - `POST /control/<message>` - queue a control message (`stop`,
//!   `force_unlock`, `force_lockout`, `ignore`, `attention`)

use crate::domain::types::ControlMessage;
use crate::infra::metrics::{state_from_code, HistogramSnapshot, Metrics, MetricsSnapshot, LATENCY_BOUNDS_US};
use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

/// Prometheus metric type
enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

/// Write a simple metric (counter or gauge) with site label
fn write_metric(output: &mut String, name: &str, help: &str, typ: MetricType, site: &str, val: u64) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name}{{site=\"{site}\"}} {val}");
}

/// Cumulative `_bucket` series followed by `_sum` and `_count`
fn write_histogram(output: &mut String, name: &str, help: &str, site: &str, hist: &HistogramSnapshot) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} histogram");

    let mut cumulative = 0u64;
    for (bound, count) in LATENCY_BOUNDS_US.iter().zip(hist.counts) {
        cumulative += count;
        let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"{bound}\"}} {cumulative}");
    }
    let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"+Inf\"}} {}", hist.count());
    let _ = writeln!(output, "{name}_sum{{site=\"{site}\"}} {}", hist.sum_us);
    let _ = writeln!(output, "{name}_count{{site=\"{site}\"}} {}", hist.count());
}

/// Format metrics in Prometheus text exposition format
fn format_prometheus_metrics(metrics: &Metrics, site_id: &str) -> String {
    let summary = metrics.snapshot();
    let mut output = String::with_capacity(4096);

    write_frame_metrics(&mut output, site_id, &summary);
    write_session_metrics(&mut output, site_id, &summary);
    write_output_metrics(&mut output, site_id, &summary);
    write_actuator_metrics(&mut output, site_id, &summary);

    output
}

fn write_frame_metrics(output: &mut String, site: &str, summary: &MetricsSnapshot) {
    write_metric(output, "catflap_frames_total", "Total frames processed", MetricType::Counter, site, summary.frames_total);
    write_metric(
        output,
        "catflap_frames_dropped_total",
        "Frames dropped because the control loop queue was full",
        MetricType::Counter,
        site,
        summary.frames_dropped,
    );
    write_histogram(
        output,
        "catflap_frame_latency_us",
        "Frame processing latency in microseconds",
        site,
        &summary.frame_latency,
    );
}

fn write_session_metrics(output: &mut String, site: &str, summary: &MetricsSnapshot) {
    write_metric(output, "catflap_matches_total", "Match attempts", MetricType::Counter, site, summary.matches_total);
    write_metric(
        output,
        "catflap_matches_failed_total",
        "Match attempts that failed or errored",
        MetricType::Counter,
        site,
        summary.matches_failed,
    );
    write_metric(output, "catflap_sessions_total", "Finished match sessions", MetricType::Counter, site, summary.sessions_total);
    write_metric(
        output,
        "catflap_sessions_admitted_total",
        "Sessions that unlocked the door",
        MetricType::Counter,
        site,
        summary.sessions_admitted,
    );
    write_metric(output, "catflap_lockouts_total", "Lockouts started", MetricType::Counter, site, summary.lockouts_total);
    write_metric(output, "catflap_unlocks_total", "Lockouts ended", MetricType::Counter, site, summary.unlocks_total);
    write_metric(
        output,
        "catflap_consecutive_lockouts",
        "Current consecutive lockout count",
        MetricType::Gauge,
        site,
        summary.consecutive_lockouts,
    );
    write_metric(output, "catflap_state", "Controller state code", MetricType::Gauge, site, summary.state);
    write_metric(output, "catflap_rfid_reads_total", "RFID tag reads", MetricType::Counter, site, summary.rfid_reads);
}

fn write_output_metrics(output: &mut String, site: &str, summary: &MetricsSnapshot) {
    write_metric(
        output,
        "catflap_templates_rendered_total",
        "Templates rendered",
        MetricType::Counter,
        site,
        summary.templates_rendered,
    );
    write_metric(
        output,
        "catflap_template_failures_total",
        "Templates that failed to render",
        MetricType::Counter,
        site,
        summary.template_failures,
    );
    write_metric(
        output,
        "catflap_publishes_dropped_total",
        "Publishes dropped because the queue was full",
        MetricType::Counter,
        site,
        summary.publishes_dropped,
    );
    write_metric(
        output,
        "catflap_commands_spawned_total",
        "Event commands spawned",
        MetricType::Counter,
        site,
        summary.commands_spawned,
    );
}

fn write_actuator_metrics(output: &mut String, site: &str, summary: &MetricsSnapshot) {
    write_metric(
        output,
        "catflap_actuator_commands_total",
        "Door commands applied",
        MetricType::Counter,
        site,
        summary.actuator_commands,
    );
    write_metric(
        output,
        "catflap_actuator_failures_total",
        "Door commands that failed",
        MetricType::Counter,
        site,
        summary.actuator_failures,
    );
    write_histogram(
        output,
        "catflap_actuator_queue_delay_us",
        "Door command queue delay in microseconds",
        site,
        &summary.actuator_queue_delay,
    );
}

#[derive(Debug, Serialize)]
struct StatusBody<'a> {
    site: &'a str,
    state: &'static str,
    consecutive_lockouts: u64,
    lockouts_total: u64,
    frames_total: u64,
}

fn status_json(metrics: &Metrics, site_id: &str) -> String {
    let status = StatusBody {
        site: site_id,
        state: state_from_code(metrics.state()).map(|s| s.as_str()).unwrap_or("unknown"),
        consecutive_lockouts: metrics.consecutive_lockouts(),
        lockouts_total: metrics.lockouts_total(),
        frames_total: metrics.frames_total(),
    };
    serde_json::to_string(&status).unwrap_or_else(|_| String::from("{}"))
}

fn response(status: StatusCode, content_type: &str, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::new(body.into()));
    *resp.status_mut() = status;
    if let Ok(value) = content_type.parse() {
        resp.headers_mut().insert(hyper::header::CONTENT_TYPE, value);
    }
    resp
}

fn json(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    response(status, "application/json", body)
}

/// Queue a control message named by the request path
fn handle_control(name: &str, control_tx: &mpsc::Sender<ControlMessage>) -> Response<Full<Bytes>> {
    let msg: ControlMessage = match name.parse() {
        Ok(msg) => msg,
        Err(e) => {
            let body = serde_json::json!({ "ok": false, "error": e }).to_string();
            return json(StatusCode::BAD_REQUEST, body);
        }
    };

    match control_tx.try_send(msg) {
        Ok(()) => {
            info!(message = %msg, "control_message_queued");
            json(StatusCode::OK, serde_json::json!({ "ok": true, "message": msg.as_str() }).to_string())
        }
        Err(e) => {
            warn!(message = %msg, error = %e, "control_message_dropped");
            json(
                StatusCode::SERVICE_UNAVAILABLE,
                serde_json::json!({ "ok": false, "error": "control_queue_unavailable" }).to_string(),
            )
        }
    }
}

/// Handle HTTP requests
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    metrics: Arc<Metrics>,
    site_id: Arc<String>,
    control_tx: mpsc::Sender<ControlMessage>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    Ok(route(req.method(), req.uri().path(), &metrics, &site_id, &control_tx))
}

fn route(
    method: &Method,
    path: &str,
    metrics: &Metrics,
    site_id: &str,
    control_tx: &mpsc::Sender<ControlMessage>,
) -> Response<Full<Bytes>> {
    match (method, path) {
        (&Method::GET, "/metrics") => response(
            StatusCode::OK,
            "text/plain; version=0.0.4; charset=utf-8",
            format_prometheus_metrics(metrics, site_id),
        ),
        (&Method::GET, "/status") => json(StatusCode::OK, status_json(metrics, site_id)),
        (&Method::GET, "/health") => response(StatusCode::OK, "text/plain", "ok"),
        (&Method::POST, path) if path.starts_with("/control/") => {
            handle_control(&path["/control/".len()..], control_tx)
        }
        _ => response(StatusCode::NOT_FOUND, "text/plain", "Not Found"),
    }
}

/// Start the metrics and control HTTP server
pub async fn start_metrics_server(
    port: u16,
    metrics: Arc<Metrics>,
    site_id: String,
    control_tx: mpsc::Sender<ControlMessage>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    let site_id = Arc::new(site_id);

    info!(port = %port, site = %site_id, "metrics_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let metrics = metrics.clone();
                        let site_id = site_id.clone();
                        let control_tx = control_tx.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let metrics = metrics.clone();
                                let site_id = site_id.clone();
                                let control_tx = control_tx.clone();
                                async move { handle_request(req, metrics, site_id, control_tx).await }
                            });

                            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                                error!(error = %e, "metrics_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "metrics_accept_error");
                    }
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("metrics_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::StateName;

    #[test]
    fn test_format_prometheus_metrics() {
        let metrics = Metrics::new();
        metrics.record_frame_processed(150);
        metrics.record_frame_processed(250);
        metrics.record_lockout(2);
        metrics.record_actuator_command(true);

        let output = format_prometheus_metrics(&metrics, "kitchen");

        assert!(output.contains("catflap_frames_total{site=\"kitchen\"} 2"));
        assert!(output.contains("catflap_frame_latency_us_bucket{site=\"kitchen\",le=\"200\"} 1"));
        assert!(output.contains("catflap_frame_latency_us_bucket{site=\"kitchen\",le=\"400\"} 2"));
        assert!(output.contains("catflap_frame_latency_us_sum{site=\"kitchen\"} 400"));

        // Scraping twice must not reset anything
        let again = format_prometheus_metrics(&metrics, "kitchen");
        assert!(again.contains("catflap_frame_latency_us_count{site=\"kitchen\"} 2"));
        assert!(output.contains("catflap_lockouts_total{site=\"kitchen\"} 1"));
        assert!(output.contains("catflap_consecutive_lockouts{site=\"kitchen\"} 2"));
        assert!(output.contains("catflap_actuator_commands_total{site=\"kitchen\"} 1"));
    }

    #[test]
    fn test_status_json() {
        let metrics = Metrics::new();
        metrics.set_state(StateName::KeepOpen);
        let status: serde_json::Value = serde_json::from_str(&status_json(&metrics, "kitchen")).unwrap();
        assert_eq!(status["site"], "kitchen");
        assert_eq!(status["state"], "Keep open");
        assert_eq!(status["lockouts_total"], 0);
    }

    #[tokio::test]
    async fn test_control_route_queues_message() {
        let metrics = Metrics::new();
        let (tx, mut rx) = mpsc::channel(1);

        let resp = route(&Method::POST, "/control/force_unlock", &metrics, "kitchen", &tx);
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(rx.recv().await, Some(ControlMessage::ForceUnlock));

        let resp = route(&Method::POST, "/control/open_sesame", &metrics, "kitchen", &tx);
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        tx.try_send(ControlMessage::Ignore).unwrap();
        let resp = route(&Method::POST, "/control/stop", &metrics, "kitchen", &tx);
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

        let resp = route(&Method::GET, "/control/stop", &metrics, "kitchen", &tx);
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
