//! Blocking serial transport used by module drivers.
//!
//! Drivers run transport calls on the blocking pool
//! (`tokio::task::spawn_blocking`), so implementations may block freely.

use std::io::{Read, Write};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

/// Transport-level failures.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The acknowledgement did not arrive in time.
    #[error("Timed out waiting for acknowledgement")]
    Timeout,

    /// The port failed.
    #[error("Serial I/O error: {0}")]
    Io(String),
}

/// Request/response channel to a module.
pub trait SerialTransport: Send {
    /// Write `data` and read until the response ends with `ack`.
    ///
    /// Returns everything read, acknowledgement included.
    fn write_and_read(
        &mut self,
        data: &str,
        ack: &str,
        timeout: Duration,
    ) -> Result<String, TransportError>;

    /// Close and reopen the underlying port.
    fn reopen(&mut self) -> Result<(), TransportError>;
}

/// [`SerialTransport`] over a physical port.
pub struct SerialPortTransport {
    port_name: String,
    baud_rate: u32,
    port: Box<dyn serialport::SerialPort>,
}

/// Read timeout of a single `read` call; the overall timeout is per request.
const POLL_TIMEOUT: Duration = Duration::from_millis(50);

impl SerialPortTransport {
    /// Open `port_name` at `baud_rate`.
    pub fn open(port_name: &str, baud_rate: u32) -> Result<Self, TransportError> {
        let port = Self::open_port(port_name, baud_rate)?;
        debug!("Serial port '{}' opened at {} baud", port_name, baud_rate);
        Ok(Self {
            port_name: port_name.to_string(),
            baud_rate,
            port,
        })
    }

    fn open_port(
        port_name: &str,
        baud_rate: u32,
    ) -> Result<Box<dyn serialport::SerialPort>, TransportError> {
        serialport::new(port_name, baud_rate)
            .timeout(POLL_TIMEOUT)
            .open()
            .map_err(|e| {
                TransportError::Io(format!(
                    "Failed to open serial port '{}' at {} baud: {}",
                    port_name, baud_rate, e
                ))
            })
    }
}

impl SerialTransport for SerialPortTransport {
    fn write_and_read(
        &mut self,
        data: &str,
        ack: &str,
        timeout: Duration,
    ) -> Result<String, TransportError> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(|e| TransportError::Io(e.to_string()))?;
        self.port
            .write_all(data.as_bytes())
            .and_then(|_| self.port.flush())
            .map_err(|e| TransportError::Io(format!("Failed to write to serial port: {}", e)))?;

        let mut response = Vec::new();
        let mut buffer = [0u8; 64];
        let start = Instant::now();
        loop {
            if response.ends_with(ack.as_bytes()) {
                break;
            }
            if start.elapsed() > timeout {
                return Err(TransportError::Timeout);
            }
            match self.port.read(&mut buffer) {
                Ok(0) => return Err(TransportError::Io("Unexpected EOF".to_string())),
                Ok(n) => response.extend_from_slice(&buffer[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                Err(e) => return Err(TransportError::Io(format!("Serial read error: {}", e))),
            }
        }

        Ok(String::from_utf8_lossy(&response).into_owned())
    }

    fn reopen(&mut self) -> Result<(), TransportError> {
        debug!("Reopening serial port '{}'", self.port_name);
        self.port = Self::open_port(&self.port_name, self.baud_rate)?;
        Ok(())
    }
}
