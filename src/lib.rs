//! atlink: a multiplexed TCP server over an AT-command Wi-Fi module
//!
//! The module is driven over a single byte stream carrying command replies,
//! unsolicited link notifications and inbound data frames all interleaved.
//! One dispatcher reads that stream and fans every byte out to a rolling
//! window for reply matching, a link registry and a frame parser.
//!
//! ```rust,ignore
//! let config = DeviceConfig::load("device.json")?;
//! let mut wifi = WifiLink::open(&config)?;
//! if wifi.bring_up(&config.network)?.is_reachable() {
//!     for frame in wifi.pump()? {
//!         wifi.send(frame.link, b"ack\n")?;
//!     }
//! }
//! ```

pub mod core;
pub mod logging;
pub mod network;
pub mod protocol;
pub mod transport;

// Re-export commonly used items
pub use crate::core::{
    DeviceConfig, Error, Frame, LinkConfig, LinkId, NetworkConfig, ReachabilityState, Result,
};
pub use crate::network::{SendOutcome, WifiLink};
pub use crate::protocol::{ControlCommand, Telemetry, TokenSet};
pub use crate::transport::{Clock, SerialTransport, SystemClock, Transport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
