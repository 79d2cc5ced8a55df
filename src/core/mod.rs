//! Core types shared by every layer of the link
//!
//! Errors, identifiers, frames and configuration live here.

pub mod config;
pub mod error;
pub mod serde;
pub mod types;

pub use self::config::{
    AccessPointConfig, AuthMode, DeviceConfig, LinkConfig, NetworkConfig, SerialConfig,
    StationCredentials, Timeouts, MAX_TIMEOUT,
};
pub use self::error::{Error, Result};
pub use self::types::{Frame, LinkId, ReachabilityState};

/// Concurrent peer links the module multiplexes
pub const MAX_LINKS: usize = 5;

/// Largest payload one send handshake may carry
pub const MAX_SEND_PAYLOAD: usize = 2048;

/// Default TCP service port
pub const DEFAULT_SERVICE_PORT: u16 = 5000;
