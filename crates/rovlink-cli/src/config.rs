//! `rovlink.toml` – deployment configuration for both binaries' modes.
//!
//! Every field has a default, so a missing file or a partial file is fine.
//! `ROVLINK_*` environment variables are applied on top of the file.

use std::fs;
use std::path::Path;
use std::time::Duration;

use rovlink_actuator::{HostConfig, InterlockConfig};
use rovlink_hal::{EchoWindow, ScanWindow};
use rovlink_types::RovError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub actuator: ActuatorSection,
    #[serde(default)]
    pub safety: SafetySection,
    #[serde(default)]
    pub telemetry: TelemetrySection,
    #[serde(default)]
    pub controller: ControllerSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActuatorSection {
    #[serde(default = "default_actuator_id")]
    pub actuator_id: String,
    /// WebSocket URL of the controller server.
    #[serde(default = "default_controller_url")]
    pub controller_url: String,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetySection {
    #[serde(default = "default_obstacle_threshold_cm")]
    pub obstacle_threshold_cm: f32,
    /// Readings in the proximity moving average.
    #[serde(default = "default_smoothing_window")]
    pub smoothing_window: usize,
    #[serde(default = "default_sample_period_ms")]
    pub sample_period_ms: u64,
    /// Longest echo the ultrasonic sensor can report.
    #[serde(default = "default_max_echo_cm")]
    pub max_echo_cm: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySection {
    #[serde(default = "default_frame_period_ms")]
    pub frame_period_ms: u64,
    #[serde(default = "default_scan_period_ms")]
    pub scan_period_ms: u64,
    #[serde(default = "default_scan_min_m")]
    pub scan_min_m: f32,
    #[serde(default = "default_scan_max_m")]
    pub scan_max_m: f32,
    /// Depth of the outbound telemetry queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerSection {
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u64,
}

fn default_actuator_id() -> String {
    "rover-01".to_string()
}
fn default_controller_url() -> String {
    "ws://127.0.0.1:5000".to_string()
}
fn default_reconnect_delay_ms() -> u64 {
    2_000
}
fn default_shutdown_grace_ms() -> u64 {
    2_000
}
fn default_obstacle_threshold_cm() -> f32 {
    30.0
}
fn default_smoothing_window() -> usize {
    5
}
fn default_sample_period_ms() -> u64 {
    100
}
fn default_max_echo_cm() -> f32 {
    400.0
}
fn default_frame_period_ms() -> u64 {
    33
}
fn default_scan_period_ms() -> u64 {
    200
}
fn default_scan_min_m() -> f32 {
    0.15
}
fn default_scan_max_m() -> f32 {
    12.0
}
fn default_queue_capacity() -> usize {
    32
}
fn default_listen_port() -> u16 {
    5000
}
fn default_handshake_timeout_ms() -> u64 {
    5_000
}
fn default_session_timeout_ms() -> u64 {
    10_000
}

impl Default for ActuatorSection {
    fn default() -> Self {
        Self {
            actuator_id: default_actuator_id(),
            controller_url: default_controller_url(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

impl Default for SafetySection {
    fn default() -> Self {
        Self {
            obstacle_threshold_cm: default_obstacle_threshold_cm(),
            smoothing_window: default_smoothing_window(),
            sample_period_ms: default_sample_period_ms(),
            max_echo_cm: default_max_echo_cm(),
        }
    }
}

impl Default for TelemetrySection {
    fn default() -> Self {
        Self {
            frame_period_ms: default_frame_period_ms(),
            scan_period_ms: default_scan_period_ms(),
            scan_min_m: default_scan_min_m(),
            scan_max_m: default_scan_max_m(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Default for ControllerSection {
    fn default() -> Self {
        Self {
            listen_port: default_listen_port(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            session_timeout_ms: default_session_timeout_ms(),
        }
    }
}

impl Config {
    /// Reject values the runtime cannot work with.
    pub fn validate(&self) -> Result<(), RovError> {
        let bad = |msg: &str| Err(RovError::Config(msg.to_string()));
        if !(self.safety.obstacle_threshold_cm.is_finite() && self.safety.obstacle_threshold_cm > 0.0) {
            return bad("safety.obstacle_threshold_cm must be a positive number");
        }
        if self.safety.smoothing_window == 0 {
            return bad("safety.smoothing_window must be at least 1");
        }
        if self.safety.sample_period_ms == 0
            || self.telemetry.frame_period_ms == 0
            || self.telemetry.scan_period_ms == 0
        {
            return bad("sampling periods must be non-zero");
        }
        if self.telemetry.queue_capacity == 0 {
            return bad("telemetry.queue_capacity must be at least 1");
        }
        if self.telemetry.scan_min_m >= self.telemetry.scan_max_m {
            return bad("telemetry.scan_min_m must be below scan_max_m");
        }
        Ok(())
    }

    pub fn host_config(&self) -> HostConfig {
        HostConfig {
            actuator_id: self.actuator.actuator_id.clone(),
            controller_url: self.actuator.controller_url.clone(),
            reconnect_delay: Duration::from_millis(self.actuator.reconnect_delay_ms),
            interlock: InterlockConfig {
                threshold_cm: self.safety.obstacle_threshold_cm,
                window: self.safety.smoothing_window,
                period: Duration::from_millis(self.safety.sample_period_ms),
                echo: EchoWindow {
                    max_cm: self.safety.max_echo_cm,
                    ..EchoWindow::default()
                },
            },
            frame_period: Duration::from_millis(self.telemetry.frame_period_ms),
            scan_period: Duration::from_millis(self.telemetry.scan_period_ms),
            scan_window: ScanWindow::from_metres(self.telemetry.scan_min_m, self.telemetry.scan_max_m),
            telemetry_capacity: self.telemetry.queue_capacity,
            shutdown_grace: Duration::from_millis(self.actuator.shutdown_grace_ms),
        }
    }
}

/// Load `path`, falling back to defaults when it does not exist, then apply
/// environment overrides and validate.
pub fn load_from(path: &Path) -> Result<Config, RovError> {
    let mut cfg = read_file(path)?;
    apply_env_overrides(&mut cfg);
    cfg.validate()?;
    Ok(cfg)
}

/// The file alone, without environment overrides or validation.
fn read_file(path: &Path) -> Result<Config, RovError> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| RovError::Config(format!("failed to read {}: {e}", path.display())))?;
    toml::from_str(&raw)
        .map_err(|e| RovError::Config(format!("failed to parse {}: {e}", path.display())))
}

/// Apply `ROVLINK_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `ROVLINK_CONTROLLER_URL` | `actuator.controller_url` |
/// | `ROVLINK_ACTUATOR_ID` | `actuator.actuator_id` |
/// | `ROVLINK_LISTEN_PORT` | `controller.listen_port` |
/// | `ROVLINK_OBSTACLE_THRESHOLD_CM` | `safety.obstacle_threshold_cm` |
///
/// Unparseable numbers are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("ROVLINK_CONTROLLER_URL") {
        cfg.actuator.controller_url = v;
    }
    if let Ok(v) = std::env::var("ROVLINK_ACTUATOR_ID") {
        cfg.actuator.actuator_id = v;
    }
    if let Ok(v) = std::env::var("ROVLINK_LISTEN_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.controller.listen_port = port;
    }
    if let Ok(v) = std::env::var("ROVLINK_OBSTACLE_THRESHOLD_CM")
        && let Ok(cm) = v.parse::<f32>()
    {
        cfg.safety.obstacle_threshold_cm = cm;
    }
}

/// Write `cfg` as pretty TOML, creating parent directories.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), RovError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .map_err(|e| RovError::Config(format!("failed to create {}: {e}", parent.display())))?;
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| RovError::Config(format!("failed to serialize config: {e}")))?;
    write_private(path, &raw)
        .map_err(|e| RovError::Config(format!("failed to write {}: {e}", path.display())))
}

/// Owner-only (rw-------) on Unix.
#[cfg(unix)]
fn write_private(path: &Path, raw: &str) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(raw.as_bytes())
}

#[cfg(not(unix))]
fn write_private(path: &Path, raw: &str) -> std::io::Result<()> {
    fs::write(path, raw)
}
