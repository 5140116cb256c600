/// Serial transport for the sensor microcontroller
use async_trait::async_trait;
use log::debug;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{sleep, timeout, Duration};
use tokio_serial::{ClearBuffer, SerialPort, SerialPortBuilderExt};

// Give the port a moment after opening before discarding stale input
const SETTLE_DELAY_MS: u64 = 100;

#[derive(Debug, Error)]
pub enum SensorLinkError {
    #[error("failed to open serial port {port}: {source}")]
    Open {
        port: String,
        source: tokio_serial::Error,
    },
    #[error("failed to clear serial input: {0}")]
    Clear(tokio_serial::Error),
    #[error("serial read failed: {0}")]
    Read(#[from] std::io::Error),
}

/// Source of raw sensor lines
#[async_trait]
pub trait SensorLink: Send {
    /// Read one line. Returns empty text when nothing arrived before the
    /// read deadline.
    async fn read_frame(&mut self) -> Result<String, SensorLinkError>;
}

/// Opens the port for each read and closes it afterwards, following the
/// microcontroller's own transmit cycle.
#[derive(Debug, Clone)]
pub struct SerialSensor {
    port: String,
    baud_rate: u32,
    read_timeout: Duration,
}

impl SerialSensor {
    pub fn new(port: impl Into<String>, baud_rate: u32, read_timeout: Duration) -> Self {
        SerialSensor {
            port: port.into(),
            baud_rate,
            read_timeout,
        }
    }
}

#[async_trait]
impl SensorLink for SerialSensor {
    async fn read_frame(&mut self) -> Result<String, SensorLinkError> {
        let stream = tokio_serial::new(&self.port, self.baud_rate)
            .timeout(self.read_timeout)
            .open_native_async()
            .map_err(|source| SensorLinkError::Open {
                port: self.port.clone(),
                source,
            })?;

        sleep(Duration::from_millis(SETTLE_DELAY_MS)).await;
        stream
            .clear(ClearBuffer::Input)
            .map_err(SensorLinkError::Clear)?;

        let mut reader = BufReader::new(stream);
        let mut buf = Vec::with_capacity(128);
        let line = match timeout(self.read_timeout, reader.read_until(b'\n', &mut buf)).await {
            Ok(result) => {
                result?;
                String::from_utf8_lossy(&buf).trim().to_string()
            }
            Err(_) => {
                debug!("No line from {} within {:?}", self.port, self.read_timeout);
                String::new()
            }
        };

        debug!("Serial line from {}: {:?}", self.port, line);
        // Port closes when the reader drops
        Ok(line)
    }
}
