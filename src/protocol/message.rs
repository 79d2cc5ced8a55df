use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::core::{Error, Frame, Result};

/// One sensor reading pushed to every connected peer.
///
/// Serialises as a single JSON line, e.g.
/// `{"t_c":23.7,"sensor":"S1","ts":1700000000.25}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    /// Temperature in degrees Celsius; `null` when the sensor gave nothing
    #[serde(rename = "t_c")]
    pub celsius: Option<f64>,
    /// Sensor name, e.g. `S1`
    pub sensor: String,
    /// Time of the reading
    #[serde(serialize_with = "crate::core::serde::serialize_time")]
    #[serde(deserialize_with = "crate::core::serde::deserialize_time")]
    pub ts: SystemTime,
}

impl Telemetry {
    /// Creates a reading stamped now; NaN becomes "no reading"
    pub fn new(sensor: impl Into<String>, celsius: f64) -> Self {
        Telemetry {
            celsius: (!celsius.is_nan()).then_some(celsius),
            sensor: sensor.into(),
            ts: SystemTime::now(),
        }
    }

    /// Newline-terminated JSON line
    pub fn to_line(&self) -> Result<Vec<u8>> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }
}

/// Requested sensor state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorState {
    On,
    Off,
}

/// Command a peer sends to the device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ControlCommand {
    /// Enable or disable one sensor
    SetSensor { sensor: String, state: SensorState },
}

impl ControlCommand {
    /// Parses a JSON command, ignoring surrounding whitespace
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(payload)
            .map_err(|_| Error::protocol("control command is not UTF-8"))?
            .trim();
        if text.is_empty() {
            return Err(Error::protocol("empty control command"));
        }
        Ok(serde_json::from_str(text)?)
    }

    /// Parses the payload of an inbound frame
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        Self::parse(&frame.payload)
    }
}
