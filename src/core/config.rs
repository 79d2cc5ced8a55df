//! Configuration for the link, the serial port and the network
//!
//! Everything here is plain data loaded once at startup. Durations are
//! written as fractional seconds in JSON.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{Error, Result, DEFAULT_SERVICE_PORT, MAX_LINKS, MAX_SEND_PAYLOAD};
use crate::protocol::TokenSet;

/// Smallest rolling window we accept
const MIN_WINDOW_CAPACITY: usize = 32;

/// Longest wait any single exchange may be configured with
pub const MAX_TIMEOUT: Duration = Duration::from_secs(3600);

/// Top-level device configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Serial port the module hangs off
    pub serial: SerialConfig,
    /// Protocol tuning
    pub link: LinkConfig,
    /// Credentials and service port
    pub network: NetworkConfig,
}

impl DeviceConfig {
    /// Parses and validates a JSON configuration
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: DeviceConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a JSON configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    /// Validates every section
    pub fn validate(&self) -> Result<()> {
        self.serial.validate()?;
        self.link.validate()?;
        self.network.validate()
    }
}

/// Serial port settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Device path, e.g. `/dev/ttyUSB0`
    pub path: String,
    /// Baud rate
    pub baud_rate: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        SerialConfig {
            path: "/dev/ttyUSB0".to_string(),
            baud_rate: 115_200,
        }
    }
}

impl SerialConfig {
    fn validate(&self) -> Result<()> {
        if self.path.is_empty() {
            return Err(Error::config("serial path is empty"));
        }
        if self.baud_rate == 0 {
            return Err(Error::config("baud rate must be non-zero"));
        }
        Ok(())
    }
}

/// Bounded waits for every exchange the link performs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Generic short commands (mode switches, multi-link)
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub command: Duration,
    /// Liveness probe
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub probe: Duration,
    /// Joining the preferred network
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub join: Duration,
    /// Factory restore and reboot
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub restore: Duration,
    /// Access point configuration
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub access_point: Duration,
    /// Waiting for the send prompt
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub send_prompt: Duration,
    /// Waiting for the send confirmation
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub send_confirm: Duration,
}

impl Timeouts {
    fn named(&self) -> [(&'static str, Duration); 7] {
        [
            ("command", self.command),
            ("probe", self.probe),
            ("join", self.join),
            ("restore", self.restore),
            ("access_point", self.access_point),
            ("send_prompt", self.send_prompt),
            ("send_confirm", self.send_confirm),
        ]
    }

    /// Rejects zero and implausibly long waits
    pub fn validate(&self) -> Result<()> {
        for (name, timeout) in self.named() {
            if timeout.is_zero() || timeout > MAX_TIMEOUT {
                return Err(Error::config(format!(
                    "{} timeout must be non-zero and at most {} seconds, got {:?}",
                    name,
                    MAX_TIMEOUT.as_secs(),
                    timeout
                )));
            }
        }
        Ok(())
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            command: Duration::from_secs(2),
            probe: Duration::from_secs(1),
            join: Duration::from_secs(20),
            restore: Duration::from_secs(5),
            access_point: Duration::from_secs(5),
            send_prompt: Duration::from_secs(2),
            send_confirm: Duration::from_secs(5),
        }
    }
}

/// Protocol tuning for the link layer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Firmware-specific reply tokens
    pub tokens: TokenSet,
    /// Exchange deadlines
    pub timeouts: Timeouts,
    /// Rolling window capacity in bytes
    pub window_capacity: usize,
    /// Largest inbound frame payload accepted
    pub max_payload: usize,
    /// Liveness probes before bring-up gives up
    pub probe_attempts: u32,
}

impl Default for LinkConfig {
    fn default() -> Self {
        LinkConfig {
            tokens: TokenSet::default(),
            timeouts: Timeouts::default(),
            window_capacity: 256,
            max_payload: MAX_SEND_PAYLOAD,
            probe_attempts: 3,
        }
    }
}

impl LinkConfig {
    /// Checks the window can hold every token and the limits are sane
    pub fn validate(&self) -> Result<()> {
        self.tokens.validate()?;
        self.timeouts.validate()?;
        if self.window_capacity < MIN_WINDOW_CAPACITY {
            return Err(Error::config(format!(
                "window capacity {} is below {}",
                self.window_capacity, MIN_WINDOW_CAPACITY
            )));
        }
        // Half-eviction must leave room for the longest token.
        if self.window_capacity < 2 * self.tokens.longest() {
            return Err(Error::config(
                "window capacity must be at least twice the longest token",
            ));
        }
        if self.max_payload == 0 {
            return Err(Error::config("max payload must be non-zero"));
        }
        if self.probe_attempts == 0 {
            return Err(Error::config("probe attempts must be at least 1"));
        }
        Ok(())
    }
}

/// Credentials of a network to join
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationCredentials {
    pub ssid: String,
    pub password: String,
}

/// Access point encryption, numbered as the module expects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    Open,
    WpaPsk,
    Wpa2Psk,
    WpaWpa2Psk,
}

impl AuthMode {
    /// The `<ecn>` field of the access point command
    pub fn ecn(&self) -> u8 {
        match self {
            AuthMode::Open => 0,
            AuthMode::WpaPsk => 2,
            AuthMode::Wpa2Psk => 3,
            AuthMode::WpaWpa2Psk => 4,
        }
    }
}

/// Settings for hosting an own access point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessPointConfig {
    pub ssid: String,
    pub password: String,
    /// 2.4 GHz channel, 1..=13
    pub channel: u8,
    pub auth: AuthMode,
    /// Stations allowed at once
    pub max_peers: u8,
}

impl Default for AccessPointConfig {
    fn default() -> Self {
        AccessPointConfig {
            ssid: "atlink".to_string(),
            password: "atlink-setup".to_string(),
            channel: 5,
            auth: AuthMode::Wpa2Psk,
            max_peers: MAX_LINKS as u8,
        }
    }
}

/// Network credentials and the service port, supplied at bring-up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Preferred network; bring-up goes straight to hosting when absent
    pub station: Option<StationCredentials>,
    /// Fallback access point
    pub access_point: AccessPointConfig,
    /// TCP port the module listens on
    pub service_port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            station: None,
            access_point: AccessPointConfig::default(),
            service_port: DEFAULT_SERVICE_PORT,
        }
    }
}

impl NetworkConfig {
    /// Validates credential lengths, channel, peer cap and port
    pub fn validate(&self) -> Result<()> {
        if let Some(station) = &self.station {
            validate_ssid(&station.ssid)?;
            if station.password.len() > 64 {
                return Err(Error::config("station password longer than 64 bytes"));
            }
        }

        let ap = &self.access_point;
        validate_ssid(&ap.ssid)?;
        if ap.auth != AuthMode::Open && !(8..=64).contains(&ap.password.len()) {
            return Err(Error::config(
                "access point password must be 8 to 64 bytes",
            ));
        }
        if !(1..=13).contains(&ap.channel) {
            return Err(Error::config(format!("channel {} out of range", ap.channel)));
        }
        if ap.max_peers == 0 || ap.max_peers as usize > MAX_LINKS {
            return Err(Error::config(format!(
                "max peers must be 1 to {}",
                MAX_LINKS
            )));
        }
        if self.service_port == 0 {
            return Err(Error::config("service port must be non-zero"));
        }
        Ok(())
    }
}

fn validate_ssid(ssid: &str) -> Result<()> {
    if ssid.is_empty() || ssid.len() > 32 {
        return Err(Error::config("SSID must be 1 to 32 bytes"));
    }
    Ok(())
}
