use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::time::Duration;

use serialport::SerialPort;

use super::Transport;
use crate::core::{Error, Result};

/// Read timeout on the port; reads only happen when bytes are waiting
const PORT_TIMEOUT: Duration = Duration::from_millis(10);

/// Largest chunk pulled from the port at once
const READ_CHUNK: usize = 256;

/// Transport over a serial port
pub struct SerialTransport {
    /// Serial port the module is attached to
    port: Box<dyn SerialPort>,
    /// Bytes read from the port but not yet handed out
    rx: VecDeque<u8>,
}

impl SerialTransport {
    /// Opens a serial device
    pub fn open(device_path: &str, baud_rate: u32) -> Result<Self> {
        let port = serialport::new(device_path, baud_rate)
            .timeout(PORT_TIMEOUT)
            .open()?;

        tracing::info!(device = device_path, baud_rate, "opened serial port");
        Ok(Self::from_port(port))
    }

    /// Wraps an already opened port
    pub fn from_port(port: Box<dyn SerialPort>) -> Self {
        SerialTransport {
            port,
            rx: VecDeque::with_capacity(READ_CHUNK),
        }
    }

    /// Pulls whatever the driver has buffered into `rx`
    fn fill(&mut self) -> Result<()> {
        let waiting = self.port.bytes_to_read()? as usize;
        if waiting == 0 {
            return Ok(());
        }

        let mut chunk = [0u8; READ_CHUNK];
        let want = waiting.min(READ_CHUNK);
        match self.port.read(&mut chunk[..want]) {
            Ok(n) => {
                self.rx.extend(&chunk[..n]);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

impl Transport for SerialTransport {
    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.port.write_all(bytes)?;
        self.port.flush()?;
        Ok(())
    }

    fn try_read_byte(&mut self) -> Result<Option<u8>> {
        if self.rx.is_empty() {
            self.fill()?;
        }
        Ok(self.rx.pop_front())
    }
}
