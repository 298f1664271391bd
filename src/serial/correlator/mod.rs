//! Request/response correlation over the half-duplex radio link.
//!
//! One cycle writes a command, then polls the transport on a fixed tick until
//! a reply of the expected shape arrives or the reply deadline passes. The
//! transport sits behind a mutex so only one command is ever outstanding,
//! whether it was issued by the poller or by an HTTP request.
pub mod cycle;
pub mod types;

pub use cycle::{Correlator, POLL_INTERVAL, REPLY_TIMEOUT};
pub use types::{CorrelationOutcome, LinkMetrics};
