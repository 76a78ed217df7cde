//! Controller configuration
//!
//! The TOML file comes from `--config <path>`, then `$CONFIG_FILE`, then
//! `config/dev.toml`. Every section and key is optional; a file that cannot
//! be read or parsed leaves the controller on defaults.

use anyhow::Context;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;

use crate::domain::match_group::MATCH_MAX_COUNT;
use crate::domain::types::{ControlMessage, LockoutMethod};

/// Placeholder that makes every derived output directory follow `[output] path`
const OUTPUT_PATH_VAR: &str = "%output_path%";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActuatorMode {
    /// Only log lock/unlock commands
    #[default]
    Log,
    Http,
    Command,
}

impl ActuatorMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActuatorMode::Log => "log",
            ActuatorMode::Http => "http",
            ActuatorMode::Command => "command",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Unique door identifier, used in logs and publish topics
    #[serde(default = "default_site_id")]
    pub id: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self { id: default_site_id() }
    }
}

fn default_site_id() -> String {
    "catflap".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatchingConfig {
    #[serde(default = "default_matcher")]
    pub matcher: String,
    #[serde(default = "default_ok_matches_needed")]
    pub ok_matches_needed: usize,
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f64,
    /// Seconds a successful session keeps the door open after clearing
    #[serde(default)]
    pub match_time: f64,
    /// Minimum spacing between match attempts inside a session
    #[serde(default)]
    pub rematch_interval_ms: u64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            matcher: default_matcher(),
            ok_matches_needed: default_ok_matches_needed(),
            match_threshold: default_match_threshold(),
            match_time: 0.0,
            rematch_interval_ms: 0,
        }
    }
}

fn default_matcher() -> String {
    "remote".to_string()
}

fn default_ok_matches_needed() -> usize {
    2
}

fn default_match_threshold() -> f64 {
    0.8
}

#[derive(Debug, Clone, Deserialize)]
pub struct LockoutConfig {
    #[serde(default)]
    pub method: LockoutMethod,
    #[serde(default = "default_lockout_time")]
    pub time: f64,
    /// Consecutive lockouts before the fail-safe halt (0 disables it)
    #[serde(default)]
    pub max_consecutive: u32,
    /// Extra seconds beyond `time` within which lockouts count as consecutive
    #[serde(default = "default_consecutive_delay")]
    pub consecutive_delay: f64,
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            method: LockoutMethod::default(),
            time: default_lockout_time(),
            max_consecutive: 0,
            consecutive_delay: default_consecutive_delay(),
        }
    }
}

fn default_lockout_time() -> f64 {
    30.0
}

fn default_consecutive_delay() -> f64 {
    3.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct RfidConfig {
    #[serde(default)]
    pub inner_device: Option<String>,
    #[serde(default)]
    pub outer_device: Option<String>,
    #[serde(default = "default_rfid_baud")]
    pub baud: u32,
    #[serde(default)]
    pub allowed: Vec<String>,
    #[serde(default)]
    pub lock_on_invalid: bool,
    /// Seconds after a session is admitted before the tag check runs
    #[serde(default = "default_rfid_lock_time")]
    pub lock_time: f64,
}

impl Default for RfidConfig {
    fn default() -> Self {
        Self {
            inner_device: None,
            outer_device: None,
            baud: default_rfid_baud(),
            allowed: Vec::new(),
            lock_on_invalid: false,
            lock_time: default_rfid_lock_time(),
        }
    }
}

fn default_rfid_baud() -> u32 {
    9600
}

fn default_rfid_lock_time() -> f64 {
    2.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_path")]
    pub path: String,
    #[serde(default)]
    pub match_path: Option<String>,
    #[serde(default)]
    pub steps_path: Option<String>,
    #[serde(default)]
    pub obstruct_path: Option<String>,
    #[serde(default)]
    pub template_path: Option<String>,
    /// Template files, optionally prefixed with `[name]`
    #[serde(default)]
    pub templates: Vec<String>,
    #[serde(default)]
    pub save_images: bool,
    #[serde(default)]
    pub save_obstruct: bool,
    #[serde(default)]
    pub save_steps: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: default_output_path(),
            match_path: None,
            steps_path: None,
            obstruct_path: None,
            template_path: None,
            templates: Vec::new(),
            save_images: false,
            save_obstruct: false,
            save_steps: false,
        }
    }
}

fn default_output_path() -> String {
    ".".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActuatorConfig {
    #[serde(default)]
    pub mode: ActuatorMode,
    #[serde(default)]
    pub lock_url: String,
    #[serde(default)]
    pub unlock_url: String,
    #[serde(default)]
    pub lock_command: String,
    #[serde(default)]
    pub unlock_command: String,
    #[serde(default = "default_actuator_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            mode: ActuatorMode::default(),
            lock_url: String::new(),
            unlock_url: String::new(),
            lock_command: String::new(),
            unlock_command: String::new(),
            timeout_ms: default_actuator_timeout_ms(),
        }
    }
}

fn default_actuator_timeout_ms() -> u64 {
    2000
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    #[serde(default = "default_mqtt_host")]
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Topic carrying frame reports from the vision process
    #[serde(default = "default_frames_topic")]
    pub frames_topic: String,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            username: None,
            password: None,
            frames_topic: default_frames_topic(),
        }
    }
}

fn default_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_frames_topic() -> String {
    "catflap/frames".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublishConfig {
    #[serde(default = "default_publish_enabled")]
    pub enabled: bool,
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self { enabled: default_publish_enabled(), topic_prefix: default_topic_prefix() }
    }
}

fn default_publish_enabled() -> bool {
    true
}

fn default_topic_prefix() -> String {
    "catflap".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_broker_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_broker_port")]
    pub port: u16,
}

fn default_broker_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_broker_port() -> u16 {
    1883
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self { enabled: false, bind_address: default_broker_bind_address(), port: default_broker_port() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
    /// Port for /metrics, /status and /control; 0 turns the endpoint off
    #[serde(default = "default_prometheus_port")]
    pub prometheus_port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval(), prometheus_port: default_prometheus_port() }
    }
}

fn default_metrics_interval() -> u64 {
    10
}

fn default_prometheus_port() -> u16 {
    9100
}

/// Unix signals that map onto control messages
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignalsConfig {
    #[serde(default)]
    pub usr1: Option<ControlMessage>,
    #[serde(default)]
    pub usr2: Option<ControlMessage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub lockout: LockoutConfig,
    #[serde(default)]
    pub rfid: RfidConfig,
    #[serde(default)]
    pub output: OutputConfig,
    /// Event name to command line
    #[serde(default)]
    pub commands: HashMap<String, String>,
    #[serde(default)]
    pub actuator: ActuatorConfig,
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub publish: PublishConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub signals: SignalsConfig,
}

/// Flattened, validated settings. Read through the getters.
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    matcher: String,
    ok_matches_needed: usize,
    match_threshold: f64,
    match_time: f64,
    rematch_interval_ms: u64,
    lockout_method: LockoutMethod,
    lockout_time: f64,
    max_consecutive: u32,
    consecutive_delay: f64,
    rfid_inner_device: Option<String>,
    rfid_outer_device: Option<String>,
    rfid_baud: u32,
    rfid_allowed: Vec<String>,
    rfid_lock_on_invalid: bool,
    rfid_lock_time: f64,
    output_path: String,
    match_output_path: String,
    steps_output_path: String,
    obstruct_output_path: String,
    template_output_path: String,
    templates: Vec<String>,
    save_images: bool,
    save_obstruct: bool,
    save_steps: bool,
    commands: HashMap<String, String>,
    actuator_mode: ActuatorMode,
    actuator_lock_url: String,
    actuator_unlock_url: String,
    actuator_lock_command: String,
    actuator_unlock_command: String,
    actuator_timeout_ms: u64,
    mqtt_host: String,
    mqtt_port: u16,
    mqtt_username: Option<String>,
    mqtt_password: Option<String>,
    frames_topic: String,
    publish_enabled: bool,
    publish_topic_prefix: String,
    broker_enabled: bool,
    broker_bind_address: String,
    broker_port: u16,
    metrics_interval_secs: u64,
    prometheus_port: u16,
    signal_usr1: Option<ControlMessage>,
    signal_usr2: Option<ControlMessage>,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    /// `--config` from raw args, else `$CONFIG_FILE`, else the dev file
    pub fn resolve_config_path(args: &[String]) -> String {
        for (i, arg) in args.iter().enumerate() {
            if arg == "--config" {
                if let Some(path) = args.get(i + 1) {
                    return path.clone();
                }
            }
            if let Some(path) = arg.strip_prefix("--config=") {
                return path.to_string();
            }
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        let output = toml_config.output;
        let derived = |p: Option<String>| p.unwrap_or_else(|| OUTPUT_PATH_VAR.to_string());

        Self {
            site_id: toml_config.site.id,
            matcher: toml_config.matching.matcher,
            ok_matches_needed: toml_config.matching.ok_matches_needed,
            match_threshold: toml_config.matching.match_threshold,
            match_time: toml_config.matching.match_time,
            rematch_interval_ms: toml_config.matching.rematch_interval_ms,
            lockout_method: toml_config.lockout.method,
            lockout_time: toml_config.lockout.time,
            max_consecutive: toml_config.lockout.max_consecutive,
            consecutive_delay: toml_config.lockout.consecutive_delay,
            rfid_inner_device: toml_config.rfid.inner_device.filter(|d| !d.is_empty()),
            rfid_outer_device: toml_config.rfid.outer_device.filter(|d| !d.is_empty()),
            rfid_baud: toml_config.rfid.baud,
            rfid_allowed: toml_config.rfid.allowed,
            rfid_lock_on_invalid: toml_config.rfid.lock_on_invalid,
            rfid_lock_time: toml_config.rfid.lock_time,
            output_path: output.path,
            match_output_path: derived(output.match_path),
            steps_output_path: derived(output.steps_path),
            obstruct_output_path: derived(output.obstruct_path),
            template_output_path: derived(output.template_path),
            templates: output.templates,
            save_images: output.save_images,
            save_obstruct: output.save_obstruct,
            save_steps: output.save_steps,
            commands: toml_config.commands,
            actuator_mode: toml_config.actuator.mode,
            actuator_lock_url: toml_config.actuator.lock_url,
            actuator_unlock_url: toml_config.actuator.unlock_url,
            actuator_lock_command: toml_config.actuator.lock_command,
            actuator_unlock_command: toml_config.actuator.unlock_command,
            actuator_timeout_ms: toml_config.actuator.timeout_ms,
            mqtt_host: toml_config.mqtt.host,
            mqtt_port: toml_config.mqtt.port,
            mqtt_username: toml_config.mqtt.username,
            mqtt_password: toml_config.mqtt.password,
            frames_topic: toml_config.mqtt.frames_topic,
            publish_enabled: toml_config.publish.enabled,
            publish_topic_prefix: toml_config.publish.topic_prefix,
            broker_enabled: toml_config.broker.enabled,
            broker_bind_address: toml_config.broker.bind_address,
            broker_port: toml_config.broker.port,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            prometheus_port: toml_config.metrics.prometheus_port,
            signal_usr1: toml_config.signals.usr1,
            signal_usr2: toml_config.signals.usr2,
            config_file,
        }
    }

    /// Read, parse and validate one file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("cannot parse {}", path.display()))?;

        let config = Self::from_toml(toml_config, path.display().to_string());
        config.validate().with_context(|| format!("invalid settings in {}", path.display()))?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.ok_matches_needed == 0 {
            anyhow::bail!("matching.ok_matches_needed must be at least 1");
        }
        if self.ok_matches_needed > MATCH_MAX_COUNT {
            anyhow::bail!("matching.ok_matches_needed must be at most {MATCH_MAX_COUNT}");
        }
        if !(0.0..=1.0).contains(&self.match_threshold) {
            anyhow::bail!("matching.match_threshold must be within 0..=1");
        }
        if self.lockout_time < 0.0 || self.consecutive_delay < 0.0 || self.match_time < 0.0 {
            anyhow::bail!("times must not be negative");
        }
        match self.actuator_mode {
            ActuatorMode::Http if self.actuator_lock_url.is_empty() || self.actuator_unlock_url.is_empty() => {
                anyhow::bail!("actuator.lock_url and actuator.unlock_url are required in http mode")
            }
            ActuatorMode::Command
                if self.actuator_lock_command.is_empty() || self.actuator_unlock_command.is_empty() =>
            {
                anyhow::bail!("actuator.lock_command and actuator.unlock_command are required in command mode")
            }
            _ => Ok(()),
        }
    }

    /// Never fails; problems are logged and defaults used instead
    pub fn load(args: &[String]) -> Self {
        Self::load_from_path(&Self::resolve_config_path(args))
    }

    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "config_fallback_to_defaults");
                Self::default()
            }
        }
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn matcher(&self) -> &str {
        &self.matcher
    }

    pub fn ok_matches_needed(&self) -> usize {
        self.ok_matches_needed
    }

    pub fn match_threshold(&self) -> f64 {
        self.match_threshold
    }

    pub fn match_time(&self) -> f64 {
        self.match_time
    }

    pub fn rematch_interval_ms(&self) -> u64 {
        self.rematch_interval_ms
    }

    pub fn lockout_method(&self) -> LockoutMethod {
        self.lockout_method
    }

    pub fn lockout_time(&self) -> f64 {
        self.lockout_time
    }

    pub fn max_consecutive(&self) -> u32 {
        self.max_consecutive
    }

    pub fn consecutive_delay(&self) -> f64 {
        self.consecutive_delay
    }

    /// Window within which two lockouts count as consecutive
    pub fn consecutive_window(&self) -> f64 {
        self.lockout_time + self.consecutive_delay
    }

    pub fn rfid_inner_device(&self) -> Option<&str> {
        self.rfid_inner_device.as_deref()
    }

    pub fn rfid_outer_device(&self) -> Option<&str> {
        self.rfid_outer_device.as_deref()
    }

    pub fn rfid_baud(&self) -> u32 {
        self.rfid_baud
    }

    pub fn rfid_allowed(&self) -> &[String] {
        &self.rfid_allowed
    }

    pub fn rfid_lock_on_invalid(&self) -> bool {
        self.rfid_lock_on_invalid
    }

    pub fn rfid_lock_time(&self) -> f64 {
        self.rfid_lock_time
    }

    pub fn output_path(&self) -> &str {
        &self.output_path
    }

    pub fn match_output_path(&self) -> &str {
        &self.match_output_path
    }

    pub fn steps_output_path(&self) -> &str {
        &self.steps_output_path
    }

    pub fn obstruct_output_path(&self) -> &str {
        &self.obstruct_output_path
    }

    pub fn template_output_path(&self) -> &str {
        &self.template_output_path
    }

    pub fn templates(&self) -> &[String] {
        &self.templates
    }

    pub fn save_images(&self) -> bool {
        self.save_images
    }

    pub fn save_obstruct(&self) -> bool {
        self.save_obstruct
    }

    pub fn save_steps(&self) -> bool {
        self.save_steps
    }

    pub fn commands(&self) -> &HashMap<String, String> {
        &self.commands
    }

    pub fn actuator_mode(&self) -> ActuatorMode {
        self.actuator_mode
    }

    pub fn actuator_lock_url(&self) -> &str {
        &self.actuator_lock_url
    }

    pub fn actuator_unlock_url(&self) -> &str {
        &self.actuator_unlock_url
    }

    pub fn actuator_lock_command(&self) -> &str {
        &self.actuator_lock_command
    }

    pub fn actuator_unlock_command(&self) -> &str {
        &self.actuator_unlock_command
    }

    pub fn actuator_timeout_ms(&self) -> u64 {
        self.actuator_timeout_ms
    }

    pub fn mqtt_host(&self) -> &str {
        &self.mqtt_host
    }

    pub fn mqtt_port(&self) -> u16 {
        self.mqtt_port
    }

    pub fn mqtt_username(&self) -> Option<&str> {
        self.mqtt_username.as_deref()
    }

    pub fn mqtt_password(&self) -> Option<&str> {
        self.mqtt_password.as_deref()
    }

    pub fn frames_topic(&self) -> &str {
        &self.frames_topic
    }

    pub fn publish_enabled(&self) -> bool {
        self.publish_enabled
    }

    pub fn publish_topic_prefix(&self) -> &str {
        &self.publish_topic_prefix
    }

    pub fn broker_enabled(&self) -> bool {
        self.broker_enabled
    }

    pub fn broker_bind_address(&self) -> &str {
        &self.broker_bind_address
    }

    pub fn broker_port(&self) -> u16 {
        self.broker_port
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn prometheus_port(&self) -> u16 {
        self.prometheus_port
    }

    pub fn signal_usr1(&self) -> Option<ControlMessage> {
        self.signal_usr1
    }

    pub fn signal_usr2(&self) -> Option<ControlMessage> {
        self.signal_usr2
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to pick a lockout strategy
    #[cfg(test)]
    pub fn with_lockout(mut self, method: LockoutMethod, time: f64) -> Self {
        self.lockout_method = method;
        self.lockout_time = time;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.site_id(), "catflap");
        assert_eq!(config.ok_matches_needed(), 2);
        assert_eq!(config.match_threshold(), 0.8);
        assert_eq!(config.lockout_method(), LockoutMethod::TimerOnly);
        assert_eq!(config.lockout_time(), 30.0);
        assert_eq!(config.max_consecutive(), 0);
        assert_eq!(config.consecutive_delay(), 3.0);
        assert_eq!(config.actuator_mode(), ActuatorMode::Log);
        assert_eq!(config.mqtt_host(), "localhost");
        assert!(config.rfid_inner_device().is_none());
    }

    #[test]
    fn test_derived_output_paths_follow_output_path() {
        let config = Config::default();
        assert_eq!(config.output_path(), ".");
        assert_eq!(config.match_output_path(), "%output_path%");
        assert_eq!(config.template_output_path(), "%output_path%");
    }

    #[test]
    fn test_consecutive_window() {
        let config = Config::default().with_lockout(LockoutMethod::ObstructOrTimer, 5.0);
        assert_eq!(config.consecutive_window(), 8.0);
    }

    #[test]
    fn test_sparse_toml() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
[lockout]
method = "obstruct_then_timer"
time = 10

[signals]
usr1 = "force_unlock"
"#,
        )
        .unwrap();
        let config = Config::from_toml(toml_config, "inline".to_string());
        assert_eq!(config.lockout_method(), LockoutMethod::ObstructThenTimer);
        assert_eq!(config.lockout_time(), 10.0);
        assert_eq!(config.signal_usr1(), Some(ControlMessage::ForceUnlock));
        assert_eq!(config.signal_usr2(), None);
        assert_eq!(config.ok_matches_needed(), 2);
    }

    #[test]
    fn test_empty_rfid_device_is_unconfigured() {
        let toml_config: TomlConfig = toml::from_str("[rfid]\ninner_device = \"\"\n").unwrap();
        let config = Config::from_toml(toml_config, "inline".to_string());
        assert!(config.rfid_inner_device().is_none());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.ok_matches_needed = 0;
        assert!(config.validate().is_err());
        config.ok_matches_needed = MATCH_MAX_COUNT;
        assert!(config.validate().is_ok());
        config.ok_matches_needed = MATCH_MAX_COUNT + 1;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.actuator_mode = ActuatorMode::Http;
        assert!(config.validate().is_err());
        config.actuator_lock_url = "http://door/lock".to_string();
        config.actuator_unlock_url = "http://door/unlock".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_resolve_config_path_default() {
        let args: Vec<String> = vec!["catflap-gate".to_string()];
        if env::var("CONFIG_FILE").is_err() {
            assert_eq!(Config::resolve_config_path(&args), "config/dev.toml");
        }
    }

    #[test]
    fn test_resolve_config_path_from_arg() {
        let args: Vec<String> =
            vec!["catflap-gate".to_string(), "--config".to_string(), "config/garage.toml".to_string()];
        assert_eq!(Config::resolve_config_path(&args), "config/garage.toml");

        let args: Vec<String> = vec!["catflap-gate".to_string(), "--config=config/porch.toml".to_string()];
        assert_eq!(Config::resolve_config_path(&args), "config/porch.toml");
    }
}
