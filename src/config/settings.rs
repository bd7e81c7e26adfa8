//! Configuration structures for deserialisation.
//!
//! These structures map directly to the JSON configuration file format.
//! Every section and field is optional; omitted values take the defaults
//! below.

use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::host::SceneBox;
use crate::measure::MAX_COLUMNS;
use crate::render::Color;

/// Default TCP port shared by the tool server and the bridge.
pub const DEFAULT_PORT: u16 = 9876;

/// Root configuration structure.
///
/// This is the top-level structure that matches the JSON config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Optional comment field (ignored during parsing).
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// TCP tool server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Stdio bridge settings.
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Owner-thread executor settings.
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Measurement grid settings.
    #[serde(default)]
    pub measurement: MeasurementConfig,

    /// Screenshot settings.
    #[serde(default)]
    pub screenshot: ScreenshotConfig,

    /// Simulated host scene.
    #[serde(default)]
    pub scene: SceneConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fail = |message: String| Err(ConfigError::ValidationError { message });

        if !(1..=MAX_COLUMNS).contains(&self.measurement.grid_columns) {
            return fail(format!(
                "measurement.grid_columns must be between 1 and {MAX_COLUMNS}, got {}",
                self.measurement.grid_columns
            ));
        }
        if self.measurement.grid_rows == 0 {
            return fail("measurement.grid_rows must be at least 1".to_string());
        }
        if self.executor.timeout_secs == 0 {
            return fail("executor.timeout_secs must be at least 1".to_string());
        }
        if self.server.read_timeout_secs == 0 {
            return fail("server.read_timeout_secs must be at least 1".to_string());
        }
        if self.server.max_request_bytes == 0 {
            return fail("server.max_request_bytes must be at least 1".to_string());
        }
        if self.bridge.timeout_secs == 0 {
            return fail("bridge.timeout_secs must be at least 1".to_string());
        }
        if self.screenshot.width == 0 || self.screenshot.height == 0 {
            return fail("screenshot.width and screenshot.height must be non-zero".to_string());
        }
        if self.scene.viewport_width == 0 || self.scene.viewport_height == 0 {
            return fail(
                "scene.viewport_width and scene.viewport_height must be non-zero".to_string(),
            );
        }
        for b in &self.scene.boxes {
            if b.name.trim().is_empty() {
                return fail("scene.boxes entries need a name".to_string());
            }
        }
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return fail(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            ));
        }
        Ok(())
    }
}

/// TCP tool server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to listen on.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Seconds to wait for a client's request line.
    #[serde(default = "default_timeout_secs")]
    pub read_timeout_secs: u64,

    /// Longest request line accepted, in bytes.
    #[serde(default = "default_max_request_bytes")]
    pub max_request_bytes: usize,
}

impl ServerConfig {
    /// `host:port` to bind.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Per-connection read timeout.
    #[must_use]
    pub const fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            read_timeout_secs: default_timeout_secs(),
            max_request_bytes: default_max_request_bytes(),
        }
    }
}

/// Stdio bridge configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// Tool server address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Tool server port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Seconds to wait for each tool call.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl BridgeConfig {
    /// `host:port` to dial.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Per-call timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Owner-thread executor configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutorConfig {
    /// Seconds a caller waits for the owner thread.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ExecutorConfig {
    /// The timeout as a duration.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Measurement grid configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MeasurementConfig {
    /// Grid columns (1-26, one letter each).
    #[serde(default = "default_grid_columns")]
    pub grid_columns: usize,

    /// Grid rows.
    #[serde(default = "default_grid_rows")]
    pub grid_rows: usize,
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        Self {
            grid_columns: default_grid_columns(),
            grid_rows: default_grid_rows(),
        }
    }
}

/// Screenshot configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScreenshotConfig {
    /// Attach a snapshot to successful tool results.
    #[serde(default = "default_true")]
    pub attach_to_results: bool,

    /// Default image width.
    #[serde(default = "default_image_width")]
    pub width: u32,

    /// Default image height.
    #[serde(default = "default_image_height")]
    pub height: u32,

    /// Default background colour, `#rrggbb`.
    #[serde(default = "default_background")]
    pub background: Color,
}

impl Default for ScreenshotConfig {
    fn default() -> Self {
        Self {
            attach_to_results: default_true(),
            width: default_image_width(),
            height: default_image_height(),
            background: default_background(),
        }
    }
}

/// Simulated host scene.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SceneConfig {
    /// Viewport width in pixels.
    #[serde(default = "default_image_width")]
    pub viewport_width: u32,

    /// Viewport height in pixels.
    #[serde(default = "default_image_height")]
    pub viewport_height: u32,

    /// Boxes placed in the initial document.
    #[serde(default)]
    pub boxes: Vec<SceneBox>,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            viewport_width: default_image_width(),
            viewport_height: default_image_height(),
            boxes: Vec::new(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

const fn default_port() -> u16 {
    DEFAULT_PORT
}

const fn default_timeout_secs() -> u64 {
    30
}

const fn default_max_request_bytes() -> usize {
    1024 * 1024
}

const fn default_grid_columns() -> usize {
    8
}

const fn default_grid_rows() -> usize {
    6
}

const fn default_true() -> bool {
    true
}

const fn default_image_width() -> u32 {
    800
}

const fn default_image_height() -> u32 {
    600
}

const fn default_background() -> Color {
    Color::rgb(0x26, 0x2a, 0x33)
}

fn default_log_level() -> String {
    "warn".to_string()
}
