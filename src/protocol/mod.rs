//! Protocol implementation module
//!
//! This module interprets the module's byte stream: reply tokens, link
//! notifications and inbound data frames, plus the JSON payloads carried
//! inside frames.

pub mod codec;
pub mod demux;
pub mod frame;
pub mod links;
pub mod matcher;
pub mod message;
pub mod tokens;

pub use self::codec::StreamCodec;
pub use self::demux::{Demux, StreamEvent};
pub use self::frame::{FrameHeader, FrameParser};
pub use self::links::{LinkEvent, LinkRegistry};
pub use self::matcher::{Exchange, ExchangeOutcome, Reply, Scan, TokenMatch};
pub use self::message::{ControlCommand, SensorState, Telemetry};
pub use self::tokens::TokenSet;
