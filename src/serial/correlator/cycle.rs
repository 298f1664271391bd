use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::time::{interval, timeout, Instant, MissedTickBehavior};

use super::types::{CorrelationOutcome, LinkMetrics};
use crate::serial::protocol::{self, Command, ReplyFrame, ReplyKind};
use crate::serial::{escape_log, Result, SerialPortIO};

/// Reply deadline shared by every command kind
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(10);
/// Scheduling tick between transport polls while a command is outstanding
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub struct Correlator {
    transport: Mutex<Box<dyn SerialPortIO>>,
    reply_timeout: Duration,
    poll_interval: Duration,
    metrics_tx: watch::Sender<LinkMetrics>,
}

impl Correlator {
    pub fn new(transport: Box<dyn SerialPortIO>) -> Self {
        Self::with_timing(transport, REPLY_TIMEOUT, POLL_INTERVAL)
    }

    pub fn with_timing(
        transport: Box<dyn SerialPortIO>,
        reply_timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        let metrics = LinkMetrics {
            mock: transport.is_mock(),
            ..LinkMetrics::default()
        };
        let (metrics_tx, _metrics_rx) = watch::channel(metrics);
        Self {
            transport: Mutex::new(transport),
            reply_timeout,
            poll_interval,
            metrics_tx,
        }
    }

    pub fn metrics(&self) -> LinkMetrics {
        self.metrics_tx.borrow().clone()
    }

    pub fn metrics_receiver(&self) -> watch::Receiver<LinkMetrics> {
        self.metrics_tx.subscribe()
    }

    pub fn is_mock(&self) -> bool {
        self.metrics_tx.borrow().mock
    }

    /// Run one correlation cycle.
    ///
    /// Holds the link for the whole send-and-await window. Decode failures and
    /// timeouts are outcomes, not errors; only a failed write is returned as `Err`.
    pub async fn exchange(&self, command: &Command) -> Result<CorrelationOutcome> {
        let mut transport = match self.transport.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                log::debug!("{} waiting for radio link", command.name());
                self.transport.lock().await
            }
        };

        let line = command.encode();
        if let Err(e) = transport.write_line(&line).await {
            log::warn!("Error sending message {}: {}", line, e);
            self.metrics_tx.send_modify(|m| {
                m.write_failures += 1;
                m.last_error = Some(e.to_string());
            });
            return Err(e);
        }
        self.metrics_tx.send_modify(|m| m.commands_sent += 1);

        let Some(expected) = command.expected_reply() else {
            return Ok(CorrelationOutcome::Sent);
        };

        let started = Instant::now();
        let wait = self.await_reply(&mut **transport, expected);
        match timeout(self.reply_timeout, wait).await {
            Ok(frame) => {
                let elapsed = started.elapsed();
                self.metrics_tx.send_modify(|m| m.record_match(elapsed));
                log::debug!("{} answered in {:?}", line, elapsed);
                Ok(CorrelationOutcome::Matched { frame, elapsed })
            }
            Err(_) => {
                let elapsed = started.elapsed();
                self.metrics_tx.send_modify(|m| m.timeouts += 1);
                log::warn!("{} timed out after {:?}; no matching reply", line, self.reply_timeout);
                Ok(CorrelationOutcome::TimedOut { elapsed })
            }
        }
    }

    /// Poll once per tick until a frame of the expected shape shows up.
    /// Only ever resolves with a match; the caller bounds it with the deadline.
    async fn await_reply(&self, transport: &mut dyn SerialPortIO, expected: ReplyKind) -> ReplyFrame {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match transport.poll_line().await {
                Ok(Some(line)) => {
                    log::debug!("Received: {}", escape_log(&line));
                    let frame = protocol::decode(&line);
                    if frame.matches(expected) {
                        return frame;
                    }
                    self.metrics_tx.send_modify(|m| m.frames_discarded += 1);
                    log::debug!("Ignoring {:?} while waiting for {:?}", frame, expected);
                }
                Ok(None) => {}
                Err(e) => {
                    log::warn!("Error receiving message: {}", e);
                    self.metrics_tx.send_modify(|m| {
                        m.read_errors += 1;
                        m.last_error = Some(e.to_string());
                    });
                }
            }
        }
    }

    /// Close the underlying transport. Waits for any cycle in flight.
    pub async fn close(&self) {
        self.transport.lock().await.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::MockTransport;

    #[tokio::test(start_paused = true)]
    async fn mock_link_times_out_at_the_deadline() {
        let correlator = Correlator::new(Box::new(MockTransport::new()));
        assert!(correlator.is_mock());

        let outcome = correlator
            .exchange(&Command::RequestData { node_id: 1 })
            .await
            .unwrap();
        match outcome {
            CorrelationOutcome::TimedOut { elapsed } => {
                assert!(elapsed >= REPLY_TIMEOUT);
                assert!(elapsed < REPLY_TIMEOUT + Duration::from_millis(100));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(correlator.metrics().timeouts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn send_only_commands_return_immediately() {
        let correlator = Correlator::new(Box::new(MockTransport::new()));
        let outcome = correlator
            .exchange(&Command::SetPump { node_id: 2, on: true })
            .await
            .unwrap();
        assert_eq!(outcome, CorrelationOutcome::Sent);
        assert_eq!(correlator.metrics().commands_sent, 1);
        assert_eq!(correlator.metrics().timeouts, 0);
    }
}
