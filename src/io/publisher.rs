//! MQTT publisher for rendered template outputs
//!
//! Drains the publish channel and forwards each payload to the broker at
//! QoS 0. The control loop never waits on the broker.

use crate::infra::config::Config;
use crate::io::publish_channel::PublishMessage;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// MQTT publisher actor
pub struct MqttPublisher {
    client: AsyncClient,
    rx: mpsc::Receiver<PublishMessage>,
}

impl MqttPublisher {
    /// Connect to the configured broker and spawn the event loop
    pub fn new(config: &Config, rx: mpsc::Receiver<PublishMessage>) -> Self {
        let client_id = format!("{}-publish-{}", config.site_id(), std::process::id());
        let mut mqttoptions = MqttOptions::new(client_id, config.mqtt_host(), config.mqtt_port());
        mqttoptions.set_keep_alive(Duration::from_secs(30));
        mqttoptions.set_clean_session(true);

        if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
            mqttoptions.set_credentials(username, password);
        }

        let (client, eventloop) = AsyncClient::new(mqttoptions, 100);

        tokio::spawn(async move {
            let mut eventloop = eventloop;
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("mqtt_publish_connected");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "mqtt_publish_error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        Self { client, rx }
    }

    /// Publish until shutdown, then drain what is already queued
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("mqtt_publish_started");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("mqtt_publish_shutdown");
                        while let Ok(msg) = self.rx.try_recv() {
                            self.publish_message(msg).await;
                        }
                        return;
                    }
                }
                msg = self.rx.recv() => {
                    match msg {
                        Some(msg) => self.publish_message(msg).await,
                        None => {
                            info!("mqtt_publish_channel_closed");
                            return;
                        }
                    }
                }
            }
        }
    }

    async fn publish_message(&self, msg: PublishMessage) {
        let bytes = msg.payload.len();
        match self.client.publish(&msg.topic, QoS::AtMostOnce, false, msg.payload.to_vec()).await {
            Ok(()) => debug!(topic = %msg.topic, bytes = bytes, "mqtt_published"),
            Err(e) => warn!(topic = %msg.topic, error = %e, "mqtt_publish_failed"),
        }
    }
}
