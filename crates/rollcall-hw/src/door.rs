//! Door-lock actuator over a point-to-point serial link.
//!
//! The controller understands two single-byte commands and never answers:
//! `'1'` releases the lock, `'0'` engages it again.

use serialport::SerialPort;
use std::io::Write;
use std::time::Duration;
use thiserror::Error;

/// Command byte that releases the lock.
pub const OPEN_COMMAND: u8 = b'1';
/// Command byte that engages the lock.
pub const CLOSE_COMMAND: u8 = b'0';

#[derive(Error, Debug)]
pub enum DoorError {
    #[error("failed to open serial device {device}: {source}")]
    Connect {
        device: String,
        #[source]
        source: serialport::Error,
    },
    #[error("serial write failed: {0}")]
    Write(#[from] std::io::Error),
}

/// Something that can hold a door open.
pub trait Actuator {
    /// Release the lock, hold it released for `hold`, then engage it again.
    ///
    /// Blocks the calling thread for the whole hold: a capture loop calling
    /// this processes no frames and sees no input until it returns.
    fn open(&mut self, hold: Duration) -> Result<(), DoorError>;
}

/// Serial connection parameters.
#[derive(Debug, Clone)]
pub struct SerialSettings {
    pub device: String,
    pub baud_rate: u32,
    /// Read timeout handed to the serial layer.
    pub timeout: Duration,
    /// Pause after connecting; many microcontroller boards reset when the port opens.
    pub settle: Duration,
}

/// Door controller link over any byte sink.
pub struct DoorLink<W: Write> {
    port: W,
    label: String,
}

impl DoorLink<Box<dyn SerialPort>> {
    /// Open the serial device and wait for the controller to come up.
    pub fn connect(settings: &SerialSettings) -> Result<Self, DoorError> {
        let port = serialport::new(&settings.device, settings.baud_rate)
            .timeout(settings.timeout)
            .open()
            .map_err(|source| DoorError::Connect {
                device: settings.device.clone(),
                source,
            })?;

        tracing::info!(
            device = %settings.device,
            baud = settings.baud_rate,
            settle_ms = settings.settle.as_millis() as u64,
            "serial door link opened"
        );
        std::thread::sleep(settings.settle);

        Ok(Self::from_writer(port, settings.device.clone()))
    }
}

impl<W: Write> DoorLink<W> {
    pub fn from_writer(port: W, label: impl Into<String>) -> Self {
        Self { port, label: label.into() }
    }

    fn send(&mut self, command: u8) -> Result<(), DoorError> {
        self.port.write_all(&[command])?;
        self.port.flush()?;
        Ok(())
    }
}

impl<W: Write> Drop for DoorLink<W> {
    fn drop(&mut self) {
        if let Err(err) = self.port.flush() {
            tracing::warn!(device = %self.label, error = %err, "flush on close failed");
        }
        tracing::info!(device = %self.label, "serial door link closed");
    }
}

impl<W: Write> Actuator for DoorLink<W> {
    fn open(&mut self, hold: Duration) -> Result<(), DoorError> {
        tracing::info!(device = %self.label, hold_ms = hold.as_millis() as u64, "door open");
        self.send(OPEN_COMMAND)?;
        std::thread::sleep(hold);
        self.send(CLOSE_COMMAND)?;
        tracing::debug!(device = %self.label, "door closed");
        Ok(())
    }
}
