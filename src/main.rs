//! Catflap gate - camera and RFID admission control for an animal door
//!
//! Module structure:
//! - `domain/` - Core types (frames, match sessions, events, timers)
//! - `io/` - External interfaces (vision MQTT, RFID serial, publish, HTTP)
//! - `services/` - Business logic (admission controller, templates, actuator)
//! - `infra/` - Infrastructure (Config, Metrics, Broker)

use anyhow::Context;
use catflap_gate::domain::error::AdmissionError;
use catflap_gate::domain::types::{ControlMessage, RfidReader};
use catflap_gate::infra::{Config, Metrics};
use catflap_gate::io::{create_publish_channel, start_vision_client, CommandRunner, MqttPublisher, OutputWriter, RfidListener};
use catflap_gate::services::matcher::{build_matcher, ReportObstruction};
use catflap_gate::services::rfid_check::RfidCheck;
use catflap_gate::services::{
    build_actuator, create_door_worker, AdmissionController, AdmissionSettings, Collaborators, OutputDispatcher,
    RunOutcome,
};
use clap::Parser;
use rustc_hash::FxHashMap;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Catflap gate - admission controller for an animal door
#[derive(Parser, Debug)]
#[command(name = "catflap-gate", version, about)]
struct Args {
    /// Path to TOML configuration file (default: $CONFIG_FILE or config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Render outputs without writing files
    #[arg(long)]
    dry_run: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

fn init_logging(json: bool) {
    // Default: INFO, use RUST_LOG=debug for full event visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_timer(UtcTime::rfc_3339()).with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.json_logs);

    info!(version = env!("CARGO_PKG_VERSION"), "catflap-gate starting");

    match run(args).await {
        Ok(outcome) => {
            info!(outcome = ?outcome, "catflap-gate shutdown complete");
            ExitCode::from(outcome.exit_code() as u8)
        }
        Err(e) => {
            error!(error = %format!("{e:#}"), "startup_failed");
            ExitCode::from(1)
        }
    }
}

async fn run(args: Args) -> anyhow::Result<RunOutcome> {
    let config = match &args.config {
        Some(path) => Config::load_from_path(path),
        None => Config::load(&[]),
    };

    info!(
        config_file = %config.config_file(),
        site = %config.site_id(),
        matcher = %config.matcher(),
        ok_matches_needed = config.ok_matches_needed(),
        lockout_method = %config.lockout_method().as_str(),
        lockout_time = config.lockout_time(),
        max_consecutive = config.max_consecutive(),
        actuator_mode = %config.actuator_mode().as_str(),
        mqtt_host = %config.mqtt_host(),
        mqtt_port = config.mqtt_port(),
        frames_topic = %config.frames_topic(),
        templates = config.templates().len(),
        "config_loaded"
    );

    if config.broker_enabled() {
        catflap_gate::infra::broker::start_embedded_broker(&config)?;
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = Arc::new(Metrics::new());

    // Door actuator worker
    let actuator = build_actuator(&config).map_err(AdmissionError::from)?;
    let (door, door_worker) = create_door_worker(actuator, metrics.clone(), 64);
    tokio::spawn(door_worker.run());

    // Output dispatcher with its sinks
    let writer = if args.dry_run { OutputWriter::dry_run() } else { OutputWriter::new() };
    let commands: FxHashMap<String, String> =
        config.commands().iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    let mut output = OutputDispatcher::new(writer).with_commands(commands, CommandRunner::new());

    if config.publish_enabled() {
        let (publish_tx, publish_rx) = create_publish_channel(1000, config.publish_topic_prefix().to_string());
        let publisher = MqttPublisher::new(&config, publish_rx);
        tokio::spawn(publisher.run(shutdown_rx.clone()));
        output = output.with_publisher(publish_tx);
    }

    for spec in config.templates() {
        output.load(spec).with_context(|| format!("failed to load template {spec}"))?;
    }

    let matcher = build_matcher(config.matcher(), config.match_threshold())?;
    let rfid = RfidCheck::new(
        config.rfid_inner_device().is_some(),
        config.rfid_outer_device().is_some(),
        config.rfid_allowed().to_vec(),
    );
    let collaborators = Collaborators { matcher, detector: Box::new(ReportObstruction), door, output, rfid };
    let mut controller = AdmissionController::new(AdmissionSettings::from_config(&config), collaborators, metrics.clone());

    // Input channels (bounded for backpressure)
    let (frame_tx, frame_rx) = mpsc::channel(64);
    let (control_tx, control_rx) = mpsc::channel(16);
    let (rfid_tx, rfid_rx) = mpsc::channel(16);

    let vision_config = config.clone();
    let vision_metrics = metrics.clone();
    let vision_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        if let Err(e) = start_vision_client(&vision_config, frame_tx, vision_metrics, vision_shutdown).await {
            error!(error = %e, "vision_client_failed");
        }
    });

    let readers = [(RfidReader::Inner, config.rfid_inner_device()), (RfidReader::Outer, config.rfid_outer_device())];
    for (reader, device) in readers {
        if let Some(device) = device {
            let listener = RfidListener::new(reader, device, config.rfid_baud(), rfid_tx.clone());
            tokio::spawn(listener.run(shutdown_rx.clone()));
        }
    }
    drop(rfid_tx);

    let prometheus_port = config.prometheus_port();
    if prometheus_port > 0 {
        let prom_metrics = metrics.clone();
        let prom_site = config.site_id().to_string();
        let prom_control = control_tx.clone();
        let prom_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = catflap_gate::io::prometheus::start_metrics_server(
                prometheus_port,
                prom_metrics,
                prom_site,
                prom_control,
                prom_shutdown,
            )
            .await
            {
                error!(error = %e, "metrics_server_failed");
            }
        });
    }

    // Periodic metrics log line
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs().max(1);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    spawn_signal_handlers(&config, control_tx);

    let outcome = controller.run(frame_rx, control_rx, rfid_rx, shutdown_rx).await;
    if let Some(halt) = outcome.halt_error() {
        error!(error = %halt, "stopped_by_fail_safe");
    }
    let _ = shutdown_tx.send(true);
    Ok(outcome)
}

/// Route Ctrl+C and the configured user signals into control messages
fn spawn_signal_handlers(config: &Config, control_tx: mpsc::Sender<ControlMessage>) {
    let ctrl_c_tx = control_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown_signal_received");
            let _ = ctrl_c_tx.send(ControlMessage::Stop).await;
        }
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mapped = [
            ("SIGUSR1", SignalKind::user_defined1(), config.signal_usr1()),
            ("SIGUSR2", SignalKind::user_defined2(), config.signal_usr2()),
        ];
        for (name, kind, msg) in mapped {
            let Some(msg) = msg else { continue };
            let mut stream = match signal(kind) {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(signal = name, error = %e, "signal_handler_failed");
                    continue;
                }
            };
            let tx = control_tx.clone();
            tokio::spawn(async move {
                while stream.recv().await.is_some() {
                    info!(signal = name, message = %msg, "signal_received");
                    if tx.send(msg).await.is_err() {
                        return;
                    }
                }
            });
        }
    }
    #[cfg(not(unix))]
    let _ = config;
}
