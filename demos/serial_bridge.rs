//! Runs a module attached over serial as a small telemetry server.
//!
//! Usage: `cargo run --example serial_bridge -- demos/device.json`
//!
//! Peers connecting to the service port receive one JSON reading per
//! enabled sensor every second and may toggle sensors with
//! `{"command":"set_sensor","sensor":"S1","state":"off"}`.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use atlink::protocol::SensorState;
use atlink::{logging, ControlCommand, DeviceConfig, Telemetry, WifiLink};

const HEARTBEAT: Duration = Duration::from_secs(1);

fn main() -> atlink::Result<()> {
    logging::init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "demos/device.json".to_string());
    let config = DeviceConfig::load(&path)?;
    tracing::info!(%path, serial = %config.serial.path, "loaded configuration");

    let mut wifi = WifiLink::open(&config)?;
    let state = wifi.bring_up(&config.network)?;
    if !state.is_reachable() {
        tracing::error!(?state, "module is not reachable, giving up");
        return Ok(());
    }
    tracing::info!(?state, "serving peers");

    // No sensor hardware on the bridge; readings go out as null.
    let mut sensors: BTreeMap<String, bool> =
        [("S1".to_string(), true), ("S2".to_string(), true)].into();
    let mut next_beat = Instant::now();

    loop {
        for frame in wifi.pump()? {
            match ControlCommand::from_frame(&frame) {
                Ok(ControlCommand::SetSensor { sensor, state }) => {
                    tracing::info!(link = %frame.link, %sensor, ?state, "sensor toggled");
                    sensors.insert(sensor, state == SensorState::On);
                }
                Err(e) => tracing::warn!(link = %frame.link, error = %e, "ignoring frame"),
            }
        }

        if Instant::now() >= next_beat {
            next_beat += HEARTBEAT;
            for (name, _) in sensors.iter().filter(|(_, enabled)| **enabled) {
                let reading = Telemetry::new(name.as_str(), f64::NAN);
                for (link, outcome) in wifi.publish(&reading)? {
                    if !outcome.is_sent() {
                        tracing::debug!(%link, ?outcome, "reading not delivered");
                    }
                }
            }
        }

        std::thread::sleep(Duration::from_millis(10));
    }
}
