use std::collections::VecDeque;
use std::io::{self, Read};
use std::time::Duration;

use thiserror::Error;

/// Fixed link parameter; the device is not negotiated with.
pub const BAUD_RATE: u32 = 9600;

/// Read timeout. Short enough that the engine loop stays responsive to
/// cancellation between reads.
const READ_TIMEOUT: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("serial acquisition is not available on this host: {0}")]
    NotSupported(String),
    #[error("permission to open {port} was denied")]
    PermissionDenied { port: String },
    #[error("no serial port was selected")]
    UserCancelled,
    #[error("failed to open {port}: {reason}")]
    OpenFailure { port: String, reason: String },
    #[error("stream read failed: {0}")]
    Stream(#[from] io::Error),
}

/// Outcome of a single bounded read.
#[derive(Debug)]
pub enum Chunk {
    /// Raw text to hand to the parser.
    Data(String),
    /// The read timeout elapsed with nothing to deliver.
    Idle,
    /// The device closed the stream.
    Eof,
}

/// Raw stream source the acquisition session reads from.
///
/// `read_chunk` must return promptly (`Chunk::Idle`) when no data is
/// pending so the caller can service cancellation between reads. Closing
/// is dropping the transport and is idempotent.
pub trait SampleTransport: Send {
    fn read_chunk(&mut self) -> Result<Chunk, TransportError>;

    fn describe(&self) -> &str;
}

/// Enumerates candidate device ports.
pub fn available_ports() -> Result<Vec<String>, TransportError> {
    let ports = serialport::available_ports()
        .map_err(|err| TransportError::NotSupported(err.to_string()))?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}

/// Serial connection to the monitor hardware.
pub struct SerialLink {
    port: Box<dyn serialport::SerialPort>,
    name: String,
    buf: Vec<u8>,
}

impl SerialLink {
    /// Opens `name` at the fixed baud rate.
    pub fn open(name: &str) -> Result<Self, TransportError> {
        let port = serialport::new(name, BAUD_RATE)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|err| match err.kind {
                serialport::ErrorKind::Io(io::ErrorKind::PermissionDenied) => {
                    TransportError::PermissionDenied {
                        port: name.to_owned(),
                    }
                }
                _ => TransportError::OpenFailure {
                    port: name.to_owned(),
                    reason: err.to_string(),
                },
            })?;
        Ok(Self {
            port,
            name: name.to_owned(),
            buf: vec![0; 256],
        })
    }
}

impl SampleTransport for SerialLink {
    fn read_chunk(&mut self) -> Result<Chunk, TransportError> {
        match self.port.read(&mut self.buf) {
            Ok(0) => Ok(Chunk::Eof),
            Ok(n) => Ok(Chunk::Data(
                String::from_utf8_lossy(&self.buf[..n]).into_owned(),
            )),
            Err(err) if err.kind() == io::ErrorKind::TimedOut => Ok(Chunk::Idle),
            Err(err) => Err(TransportError::Stream(err)),
        }
    }

    fn describe(&self) -> &str {
        &self.name
    }
}

/// Deterministic in-memory transport, useful for tests and scripted
/// playback.
pub struct ScriptedTransport {
    script: VecDeque<Result<Chunk, TransportError>>,
}

impl ScriptedTransport {
    pub fn new(script: impl IntoIterator<Item = Result<Chunk, TransportError>>) -> Self {
        Self {
            script: script.into_iter().collect(),
        }
    }
}

impl SampleTransport for ScriptedTransport {
    fn read_chunk(&mut self) -> Result<Chunk, TransportError> {
        self.script.pop_front().unwrap_or(Ok(Chunk::Eof))
    }

    fn describe(&self) -> &str {
        "scripted"
    }
}
