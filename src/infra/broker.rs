//! Embedded MQTT broker using rumqttd
//!
//! Lets a single box run the vision process, the controller and any output
//! subscribers without an external broker.

use crate::infra::config::Config as AppConfig;
use anyhow::Context;
use rumqttd::{Broker, Config, ConnectionSettings, RouterConfig, ServerSettings};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::thread;
use tracing::{info, warn};

/// Frame reports carry encoded images
const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

fn broker_config(listen: SocketAddr) -> Config {
    let router = RouterConfig {
        max_segment_size: 4 * MAX_PAYLOAD_SIZE,
        max_segment_count: 4,
        max_connections: 64,
        max_outgoing_packet_count: 200,
        initialized_filters: None,
        ..Default::default()
    };

    let mut servers = HashMap::new();
    servers.insert(
        "v4".to_string(),
        ServerSettings {
            name: "v4".to_string(),
            listen,
            tls: None,
            next_connection_delay_ms: 1,
            connections: ConnectionSettings {
                connection_timeout_ms: 5000,
                max_payload_size: MAX_PAYLOAD_SIZE,
                max_inflight_count: 200,
                auth: None,
                dynamic_filters: false,
                external_auth: None,
            },
        },
    );

    Config {
        id: 0,
        router,
        v4: Some(servers),
        v5: None,
        ws: None,
        prometheus: None,
        metrics: None,
        bridge: None,
        console: None,
        cluster: None,
    }
}

/// Start the embedded broker on its own thread
pub fn start_embedded_broker(app_config: &AppConfig) -> anyhow::Result<()> {
    let addr_str = format!("{}:{}", app_config.broker_bind_address(), app_config.broker_port());
    let listen: SocketAddr =
        addr_str.parse().with_context(|| format!("invalid broker bind address {addr_str}"))?;

    let config = broker_config(listen);
    thread::Builder::new()
        .name("mqtt-broker".to_string())
        .spawn(move || {
            let mut broker = Broker::new(config);
            // start() blocks for the broker's lifetime
            if let Err(e) = broker.start() {
                warn!(error = %e, "broker_start_failed");
            }
        })
        .context("failed to spawn broker thread")?;

    // Give broker time to start
    thread::sleep(std::time::Duration::from_millis(100));
    info!(listen = %listen, "broker_started");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broker_config_allows_image_payloads() {
        let listen: SocketAddr = "127.0.0.1:18830".parse().unwrap();
        let config = broker_config(listen);
        let servers = config.v4.unwrap();
        let v4 = &servers["v4"];
        assert_eq!(v4.listen, listen);
        assert_eq!(v4.connections.max_payload_size, MAX_PAYLOAD_SIZE);
        assert!(config.router.max_segment_size >= MAX_PAYLOAD_SIZE);
    }
}
