//! Byte transport to the Wi-Fi module
//!
//! The link only needs a duplex byte stream: write a buffer, and poll for
//! one received byte without blocking. Time is abstracted the same way so
//! the bounded waits of the protocol can run against a simulated clock.
//!
//! - [`SerialTransport`] talks to a real module over a serial port
//! - [`mock::MockTransport`] plays a scripted module for tests

pub mod mock;
mod serial;
pub mod window;

pub use self::serial::SerialTransport;
pub use self::window::RollingWindow;

use std::time::{Duration, Instant};

use crate::core::Result;

/// Duplex byte stream to the module
pub trait Transport {
    /// Writes every byte, in order
    fn write_all(&mut self, bytes: &[u8]) -> Result<()>;

    /// Returns the next received byte if one is available; never blocks
    fn try_read_byte(&mut self) -> Result<Option<u8>>;
}

/// Monotonic time source for bounded waits
pub trait Clock {
    /// Current instant
    fn now(&self) -> Instant;

    /// Called when a wait finds no byte available
    fn idle(&self);
}

/// Pause between empty polls of the real clock
const IDLE_PAUSE: Duration = Duration::from_micros(500);

/// Wall clock backed by [`Instant`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn idle(&self) {
        std::thread::sleep(IDLE_PAUSE);
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).write_all(bytes)
    }

    fn try_read_byte(&mut self) -> Result<Option<u8>> {
        (**self).try_read_byte()
    }
}
