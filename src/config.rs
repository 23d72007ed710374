//! # Configuration Module
//!
//! Handles loading and validating node configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, Rs485Error};
use crate::frame::protocol::{NodeAddress, MAX_COMMAND};
use crate::link::LinkConfig;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub serial: SerialConfig,
    pub node: NodeConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
}

/// Serial port configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    #[serde(default = "default_serial_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

/// Node identity and link timing
#[derive(Debug, Deserialize, Clone)]
pub struct NodeConfig {
    #[serde(default)]
    pub board_address: u8,

    /// Admit frames for every slave address (bus listener)
    #[serde(default)]
    pub promiscuous: bool,

    #[serde(default = "default_idle_interval_ms")]
    pub idle_interval_ms: u64,

    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,

    #[serde(default = "default_line_settle_ms")]
    pub line_settle_ms: u64,

    #[serde(default = "default_termination_enabled")]
    pub termination_enabled: bool,
}

/// Bus monitor configuration
#[derive(Debug, Deserialize, Clone)]
pub struct MonitorConfig {
    #[serde(default = "default_monitor_commands")]
    pub commands: Vec<u8>,

    /// Directory for JSON-lines packet records; recording is off when unset
    #[serde(default)]
    pub record_dir: Option<PathBuf>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            commands: default_monitor_commands(),
            record_dir: None,
        }
    }
}

// Default value functions
fn default_serial_port() -> String { "/dev/ttyUSB0".to_string() }
fn default_baud_rate() -> u32 { 115200 }

fn default_idle_interval_ms() -> u64 { 20 }
fn default_buffer_capacity() -> usize { 5 }
fn default_line_settle_ms() -> u64 { 20 }
fn default_termination_enabled() -> bool { true }

fn default_monitor_commands() -> Vec<u8> { (0..=MAX_COMMAND).collect() }

const SUPPORTED_BAUD_RATES: [u32; 8] = [9600, 19200, 38400, 57600, 115200, 230400, 460800, 921600];

fn invalid(message: impl std::fmt::Display) -> Rs485Error {
    Rs485Error::Config(toml::de::Error::custom(message))
}

impl NodeConfig {
    /// Address filter described by this configuration
    pub fn address(&self) -> NodeAddress {
        if self.promiscuous {
            NodeAddress::Promiscuous
        } else {
            NodeAddress::Addressed(self.board_address)
        }
    }

    /// Runtime link parameters
    pub fn link_config(&self) -> LinkConfig {
        LinkConfig {
            address: self.address(),
            idle_interval: Duration::from_millis(self.idle_interval_ms),
            buffer_capacity: self.buffer_capacity,
            line_settle: Duration::from_millis(self.line_settle_ms),
            termination_enabled: self.termination_enabled,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use rs485_link::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    fn validate(&self) -> Result<()> {
        if self.serial.port.is_empty() {
            return Err(invalid("serial port cannot be empty"));
        }

        if !SUPPORTED_BAUD_RATES.contains(&self.serial.baud_rate) {
            return Err(invalid(format!(
                "baud_rate must be one of: {:?}",
                SUPPORTED_BAUD_RATES
            )));
        }

        if self.node.idle_interval_ms == 0 || self.node.idle_interval_ms > 10000 {
            return Err(invalid("idle_interval_ms must be between 1 and 10000"));
        }

        // One event bit per command caps a batch at 32 distinct commands
        if self.node.buffer_capacity == 0 || self.node.buffer_capacity > 32 {
            return Err(invalid("buffer_capacity must be between 1 and 32"));
        }

        if self.node.line_settle_ms > 1000 {
            return Err(invalid("line_settle_ms must be between 0 and 1000"));
        }

        if self.monitor.commands.is_empty() {
            return Err(invalid("monitor commands cannot be empty"));
        }

        for &command in &self.monitor.commands {
            if command > MAX_COMMAND {
                return Err(invalid(format!(
                    "monitor command {} is out of bounds (must be 0-{})",
                    command, MAX_COMMAND
                )));
            }
        }

        if let Some(dir) = &self.monitor.record_dir {
            if dir.as_os_str().is_empty() {
                return Err(invalid("monitor record_dir cannot be empty when set"));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_valid_config() -> Config {
        Config {
            serial: SerialConfig {
                port: default_serial_port(),
                baud_rate: default_baud_rate(),
            },
            node: NodeConfig {
                board_address: 1,
                promiscuous: false,
                idle_interval_ms: default_idle_interval_ms(),
                buffer_capacity: default_buffer_capacity(),
                line_settle_ms: default_line_settle_ms(),
                termination_enabled: default_termination_enabled(),
            },
            monitor: MonitorConfig::default(),
        }
    }

    #[test]
    fn test_default_config() {
        assert!(create_valid_config().validate().is_ok());
    }

    #[test]
    fn test_load_config_from_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let toml_content = r#"
[serial]
port = "/dev/ttyUSB1"

[node]
board_address = 2
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.serial.port, "/dev/ttyUSB1");
        assert_eq!(config.serial.baud_rate, 115200);
        assert_eq!(config.node.board_address, 2);
        assert_eq!(config.node.buffer_capacity, 5);
        assert_eq!(config.monitor.commands.len(), 32);
        assert!(config.monitor.record_dir.is_none());
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load("/nonexistent/rs485.toml");
        assert!(matches!(result, Err(Rs485Error::Io(_))));
    }

    #[test]
    fn test_parse_missing_node_section() {
        let result = Config::parse("[serial]\nport = \"/dev/ttyUSB0\"\n");
        assert!(matches!(result, Err(Rs485Error::Config(_))));
    }

    #[test]
    fn test_parse_full_config() {
        let config = Config::parse(
            r#"
[serial]
port = "/dev/ttyAMA0"
baud_rate = 921600

[node]
board_address = 7
promiscuous = true
idle_interval_ms = 5
buffer_capacity = 8
line_settle_ms = 0
termination_enabled = false

[monitor]
commands = [0, 1, 4]
record_dir = "./records"
"#,
        )
        .unwrap();

        let link = config.node.link_config();
        assert_eq!(link.address, NodeAddress::Promiscuous);
        assert_eq!(link.idle_interval, Duration::from_millis(5));
        assert_eq!(link.buffer_capacity, 8);
        assert_eq!(link.line_settle, Duration::ZERO);
        assert!(!link.termination_enabled);
        assert_eq!(config.monitor.commands, vec![0, 1, 4]);
        assert_eq!(config.monitor.record_dir, Some(PathBuf::from("./records")));
    }

    #[test]
    fn test_node_address() {
        let mut config = create_valid_config();
        assert_eq!(config.node.address(), NodeAddress::Addressed(1));

        config.node.promiscuous = true;
        assert_eq!(config.node.address(), NodeAddress::Promiscuous);
    }

    #[test]
    fn test_empty_serial_port() {
        let mut config = create_valid_config();
        config.serial.port = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_baud_rate() {
        let mut config = create_valid_config();
        config.serial.baud_rate = 420000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_valid_baud_rates() {
        for &baud in &SUPPORTED_BAUD_RATES {
            let mut config = create_valid_config();
            config.serial.baud_rate = baud;
            assert!(config.validate().is_ok(), "Baud rate {} should be valid", baud);
        }
    }

    #[test]
    fn test_idle_interval_zero() {
        let mut config = create_valid_config();
        config.node.idle_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_idle_interval_too_high() {
        let mut config = create_valid_config();
        config.node.idle_interval_ms = 10001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_buffer_capacity_bounds() {
        let mut config = create_valid_config();
        config.node.buffer_capacity = 0;
        assert!(config.validate().is_err());

        config.node.buffer_capacity = 33;
        assert!(config.validate().is_err());

        config.node.buffer_capacity = 32;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_line_settle_too_high() {
        let mut config = create_valid_config();
        config.node.line_settle_ms = 1001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_monitor_command_out_of_range() {
        let mut config = create_valid_config();
        config.monitor.commands = vec![0, 5, 32];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_monitor_commands_empty() {
        let mut config = create_valid_config();
        config.monitor.commands = vec![];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_monitor_record_dir_empty() {
        let mut config = create_valid_config();
        config.monitor.record_dir = Some(PathBuf::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_functions() {
        assert_eq!(default_serial_port(), "/dev/ttyUSB0");
        assert_eq!(default_baud_rate(), 115200);
        assert_eq!(default_idle_interval_ms(), 20);
        assert_eq!(default_buffer_capacity(), 5);
        assert_eq!(default_line_settle_ms(), 20);
        assert_eq!(default_termination_enabled(), true);
        assert_eq!(default_monitor_commands(), (0..=31).collect::<Vec<u8>>());
    }
}
