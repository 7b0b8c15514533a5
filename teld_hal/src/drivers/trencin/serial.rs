//! Serial line transport.

use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits, TTYPort};
use std::io::{ErrorKind, Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::time::Duration;
use teld_common::hal::config::AxisConfig;
use teld_common::hal::driver::{Transport, TransportError};
use tracing::info;

/// 8N1 line without flow control, one per axis controller.
pub struct SerialTransport {
    port: TTYPort,
    device: String,
}

impl SerialTransport {
    pub fn open(config: &AxisConfig) -> Result<Self, TransportError> {
        let port = serialport::new(&config.device, config.baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(config.inter_byte_timeout_ms))
            .open_native()
            .map_err(|e| TransportError::Open {
                device: config.device.clone(),
                reason: e.to_string(),
            })?;
        info!(device = %config.device, baud = config.baud, "serial line open");
        Ok(Self {
            port,
            device: config.device.clone(),
        })
    }

    pub fn device(&self) -> &str {
        &self.device
    }
}

impl Transport for SerialTransport {
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let written = self
            .port
            .write(bytes)
            .map_err(|e| TransportError::Write(e.to_string()))?;
        if written != bytes.len() {
            return Err(TransportError::ShortWrite {
                written,
                expected: bytes.len(),
            });
        }
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError> {
        self.port
            .set_timeout(timeout)
            .map_err(|e| TransportError::Read(e.to_string()))?;
        match self.port.read(buf) {
            Ok(0) => Err(TransportError::Timeout(timeout)),
            Ok(n) => Ok(n),
            Err(e) if e.kind() == ErrorKind::TimedOut => Err(TransportError::Timeout(timeout)),
            Err(e) => Err(TransportError::Read(e.to_string())),
        }
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        self.port
            .clear(ClearBuffer::Input)
            .map_err(|e| TransportError::Read(e.to_string()))
    }

    fn bytes_available(&mut self) -> Result<usize, TransportError> {
        self.port
            .bytes_to_read()
            .map(|n| n as usize)
            .map_err(|e| TransportError::Read(e.to_string()))
    }

    fn poll_fd(&self) -> Option<RawFd> {
        Some(self.port.as_raw_fd())
    }
}
