pub mod correlator;
pub mod interface;
pub mod protocol;

pub use correlator::{Correlator, CorrelationOutcome, LinkMetrics};
pub use interface::{open_transport, MockTransport, SerialInterface, SerialPortIO};
pub use protocol::{Command, ReplyFrame, ReplyKind};

use serde::{Deserialize, Serialize};

/// Physical settings for the radio modem's UART
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkSettings {
    pub port_name: String,
    pub baud_rate: u32,
    pub mode_lines: ModeLines,
}

/// How the modem's M0/M1 mode-select pins are driven
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModeLines {
    /// M0/M1 wired to RTS/DTR of the USB-UART bridge
    RtsDtr,
    /// Pins strapped in hardware
    None,
}

impl Default for ModeLines {
    fn default() -> Self {
        ModeLines::RtsDtr
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SerialError {
    #[error("Transport unavailable: {0}")]
    Unavailable(String),

    #[error("Transport closed")]
    Closed,

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialport error: {0}")]
    SerialportError(#[from] serialport::Error),
}

pub type Result<T> = std::result::Result<T, SerialError>;

/// Escape a raw radio line for single-line logging.
/// Control characters are rendered as escapes and long lines are cut short.
pub fn escape_log(s: &str) -> String {
    const MAX_PREVIEW: usize = 200;
    let mut out = String::with_capacity(s.len().min(MAX_PREVIEW) + 8);
    for (count, ch) in s.chars().enumerate() {
        if count >= MAX_PREVIEW {
            out.push('…');
            break;
        }
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                use std::fmt::Write;
                let _ = write!(&mut out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}
