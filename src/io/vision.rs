//! MQTT client for frame reports from the vision process
//!
//! The vision process captures camera frames, runs the obstruction check and
//! the matcher, and publishes one JSON report per frame. Reports are decoded
//! here into [`Frame`]s for the admission controller.

use crate::domain::types::{Frame, FrameReport, MatchDirection, MatchStep};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::Bytes;
use chrono::{DateTime, Local};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum VisionError {
    #[error("invalid frame report: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid base64 image in {field}: {source}")]
    Image {
        field: &'static str,
        #[source]
        source: base64::DecodeError,
    },
}

#[derive(Debug, Deserialize)]
struct StepMessage {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    image: Option<String>,
}

/// Wire format of one frame report
#[derive(Debug, Deserialize)]
struct FrameMessage {
    /// Capture time; the receive time is used when absent
    #[serde(default)]
    captured_at: Option<DateTime<Local>>,
    obstructed: bool,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    direction: MatchDirection,
    #[serde(default)]
    description: String,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    steps: Vec<StepMessage>,
}

fn decode_image(field: &'static str, encoded: Option<&str>) -> Result<Option<Bytes>, VisionError> {
    encoded
        .map(|s| STANDARD.decode(s).map(Bytes::from).map_err(|source| VisionError::Image { field, source }))
        .transpose()
}

/// Decode a JSON frame report
pub fn parse_frame_message(payload: &[u8], received_at: DateTime<Local>) -> Result<Frame, VisionError> {
    let msg: FrameMessage = serde_json::from_slice(payload)?;

    let image = decode_image("image", msg.image.as_deref())?.unwrap_or_default();
    let mut steps = Vec::with_capacity(msg.steps.len());
    for step in msg.steps {
        let mut parsed = MatchStep::new(step.name, step.description);
        parsed.image = decode_image("steps.image", step.image.as_deref())?;
        steps.push(parsed);
    }

    let report = FrameReport {
        obstructed: msg.obstructed,
        score: msg.score,
        direction: msg.direction,
        description: msg.description,
        steps,
    };
    Ok(Frame::new(msg.captured_at.unwrap_or(received_at), image).with_report(report))
}

/// Subscribe to the frames topic and forward decoded frames
///
/// Frames are sent via try_send so a slow controller never stalls the MQTT
/// event loop. Dropped frames are counted and logged (rate-limited).
pub async fn start_vision_client(
    config: &Config,
    frame_tx: mpsc::Sender<Frame>,
    metrics: Arc<Metrics>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let client_id = format!("{}-vision-{}", config.site_id(), std::process::id());
    let mut mqttoptions = MqttOptions::new(client_id, config.mqtt_host(), config.mqtt_port());
    mqttoptions.set_keep_alive(Duration::from_secs(30));
    // Frames carry images
    mqttoptions.set_max_packet_size(16 * 1024 * 1024, 16 * 1024 * 1024);

    if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
        mqttoptions.set_credentials(username, password);
    }

    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 100);
    client.subscribe(config.frames_topic(), QoS::AtMostOnce).await?;

    info!(
        topic = %config.frames_topic(),
        host = %config.mqtt_host(),
        port = %config.mqtt_port(),
        "vision_client_subscribed"
    );

    let mut last_drop_warn = Instant::now() - Duration::from_secs(2);

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("vision_client_shutdown");
                    return Ok(());
                }
            }
            result = eventloop.poll() => {
                match result {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let frame = match parse_frame_message(&publish.payload, Local::now()) {
                            Ok(frame) => frame,
                            Err(e) => {
                                warn!(topic = %publish.topic, error = %e, "frame_report_invalid");
                                continue;
                            }
                        };
                        debug!(
                            captured_at = %frame.captured_at,
                            bytes = frame.image.len(),
                            "frame_received"
                        );
                        if let Err(e) = frame_tx.try_send(frame) {
                            match e {
                                TrySendError::Full(_) => {
                                    metrics.record_frame_dropped();
                                    if last_drop_warn.elapsed() > Duration::from_secs(1) {
                                        warn!("frame_dropped: channel full");
                                        last_drop_warn = Instant::now();
                                    }
                                }
                                TrySendError::Closed(_) => {
                                    warn!("frame_channel_closed");
                                    return Ok(());
                                }
                            }
                        }
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("vision_client_connected");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(error = %e, "vision_client_error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }
    }
}
