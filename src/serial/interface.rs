use std::io::{Read, Write};
use std::time::Duration;

use async_trait::async_trait;
use serialport::{DataBits, Parity, SerialPort, StopBits};

use super::{escape_log, LinkSettings, ModeLines, Result, SerialError};

pub const DEFAULT_PORT: &str = "/dev/serial0";
pub const BAUD_RATE: u32 = 9600;

const IO_TIMEOUT: Duration = Duration::from_millis(1000);
const READ_CHUNK: usize = 512;

/// Raw line transport to the radio modem.
///
/// Implementations never block indefinitely: `write_line` reports failures
/// instead of retrying, and `poll_line` is a single non-blocking check.
#[async_trait]
pub trait SerialPortIO: Send {
    /// Append the line terminator and transmit
    async fn write_line(&mut self, line: &str) -> Result<()>;

    /// Return one buffered full line if one is ready
    async fn poll_line(&mut self) -> Result<Option<String>>;

    /// Release the channel. Safe to call more than once.
    async fn close(&mut self);

    fn is_mock(&self) -> bool {
        false
    }
}

/// Accumulates raw bytes and hands out complete, trimmed lines.
/// Bytes are decoded only once a whole line is in, so a character split
/// across two reads survives.
#[derive(Debug, Default)]
pub struct LineBuffer {
    partial: Vec<u8>,
    trims: u64,
    utf8_errors: u64,
}

impl LineBuffer {
    const LIMIT: usize = 8192;
    const KEEP: usize = 4096;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.partial.extend_from_slice(bytes);

        // A node that never sends a terminator must not grow the buffer forever
        if self.partial.len() > Self::LIMIT {
            let cut = self.partial.len() - Self::KEEP;
            self.partial.drain(..cut);
            self.trims += 1;
        }
    }

    /// Pop the next non-empty line, skipping blank ones
    pub fn take_line(&mut self) -> Option<String> {
        while let Some(pos) = self.partial.iter().position(|&b| b == b'\n' || b == b'\r') {
            let raw: Vec<u8> = self.partial.drain(..=pos).collect();
            let line = self.decode_line(&raw[..pos]);
            if !line.is_empty() {
                return Some(line);
            }
        }
        None
    }

    fn decode_line(&mut self, raw: &[u8]) -> String {
        match std::str::from_utf8(raw) {
            Ok(s) => s.trim().to_string(),
            Err(_) => {
                self.utf8_errors += 1;
                String::from_utf8_lossy(raw).trim().to_string()
            }
        }
    }

    pub fn clear(&mut self) {
        self.partial.clear();
    }

    pub fn pending_len(&self) -> usize {
        self.partial.len()
    }

    pub fn trims(&self) -> u64 {
        self.trims
    }

    pub fn utf8_errors(&self) -> u64 {
        self.utf8_errors
    }
}

/// UART-attached radio modem
pub struct SerialInterface {
    port: Option<Box<dyn SerialPort>>,
    port_name: String,
    mode_lines: ModeLines,
    buffer: LineBuffer,
}

impl SerialInterface {
    /// Open the modem with fixed 8N1 framing and drive it into normal mode
    pub fn open(settings: &LinkSettings) -> Result<Self> {
        let mut port = serialport::new(&settings.port_name, settings.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(IO_TIMEOUT)
            .open()
            .map_err(|e| SerialError::Unavailable(format!("{}: {}", settings.port_name, e)))?;

        if settings.mode_lines == ModeLines::RtsDtr {
            drive_normal_mode(port.as_mut()).map_err(|e| {
                SerialError::Unavailable(format!("{}: mode lines: {}", settings.port_name, e))
            })?;
        }

        log::info!(
            "Opened radio link on {} at {} baud",
            settings.port_name,
            settings.baud_rate
        );

        Ok(Self {
            port: Some(port),
            port_name: settings.port_name.clone(),
            mode_lines: settings.mode_lines,
            buffer: LineBuffer::new(),
        })
    }
}

#[async_trait]
impl SerialPortIO for SerialInterface {
    async fn write_line(&mut self, line: &str) -> Result<()> {
        let port = self.port.as_mut().ok_or(SerialError::Closed)?;

        let frame = format!("{}\n", line);
        port.write_all(frame.as_bytes())
            .map_err(|e| SerialError::WriteFailed(e.to_string()))?;
        port.flush()
            .map_err(|e| SerialError::WriteFailed(e.to_string()))?;

        log::debug!("Sent: {}", escape_log(line));
        Ok(())
    }

    async fn poll_line(&mut self) -> Result<Option<String>> {
        if let Some(line) = self.buffer.take_line() {
            return Ok(Some(line));
        }

        let port = self.port.as_mut().ok_or(SerialError::Closed)?;
        let available = port.bytes_to_read()? as usize;
        if available == 0 {
            return Ok(None);
        }

        let mut chunk = [0u8; READ_CHUNK];
        let want = available.min(READ_CHUNK);
        let n = match port.read(&mut chunk[..want]) {
            Ok(n) => n,
            Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => 0,
            Err(e) => return Err(SerialError::IoError(e)),
        };

        self.buffer.push_bytes(&chunk[..n]);
        Ok(self.buffer.take_line())
    }

    async fn close(&mut self) {
        if let Some(mut port) = self.port.take() {
            if self.mode_lines == ModeLines::RtsDtr {
                if let Err(e) = drive_normal_mode(port.as_mut()) {
                    log::warn!("Failed to reset mode lines on {}: {}", self.port_name, e);
                }
            }
            log::info!("Closed radio link on {}", self.port_name);
        }
        self.buffer.clear();
    }
}

/// M0 = LOW, M1 = LOW selects the modem's normal transceive mode
fn drive_normal_mode(port: &mut dyn SerialPort) -> serialport::Result<()> {
    port.write_request_to_send(false)?;
    port.write_data_terminal_ready(false)
}

/// Degraded transport used when no modem is reachable.
/// Commands are logged and recorded, replies never arrive.
#[derive(Debug, Default)]
pub struct MockTransport {
    sent: Vec<String>,
    closed: bool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> &[String] {
        &self.sent
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[async_trait]
impl SerialPortIO for MockTransport {
    async fn write_line(&mut self, line: &str) -> Result<()> {
        log::info!("[mock] would send: {}", escape_log(line));
        self.sent.push(line.to_string());
        Ok(())
    }

    async fn poll_line(&mut self) -> Result<Option<String>> {
        Ok(None)
    }

    async fn close(&mut self) {
        if !self.closed {
            log::info!("[mock] radio link closed");
        }
        self.closed = true;
    }

    fn is_mock(&self) -> bool {
        true
    }
}

/// Names of serial ports the OS currently reports, for diagnostics
pub fn available_port_names() -> Vec<String> {
    serialport::available_ports()
        .map(|ports| ports.into_iter().map(|p| p.port_name).collect())
        .unwrap_or_default()
}

/// Open the real modem, falling back to the mock transport when it is unavailable
pub fn open_transport(settings: &LinkSettings, force_mock: bool) -> Box<dyn SerialPortIO> {
    if force_mock {
        log::info!("Radio link running in mock mode (forced by configuration)");
        return Box::new(MockTransport::new());
    }

    match SerialInterface::open(settings) {
        Ok(interface) => Box::new(interface),
        Err(e) => {
            log::warn!(
                "{} (available ports: {:?}); continuing in mock mode",
                e,
                available_port_names()
            );
            Box::new(MockTransport::new())
        }
    }
}
