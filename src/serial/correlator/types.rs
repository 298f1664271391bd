use std::time::Duration;

use serde::Serialize;

use crate::serial::protocol::ReplyFrame;

/// How one correlation cycle ended
#[derive(Debug, Clone, PartialEq)]
pub enum CorrelationOutcome {
    /// A reply of the expected shape arrived before the deadline
    Matched { frame: ReplyFrame, elapsed: Duration },
    /// Send-only command written; nothing to wait for
    Sent,
    /// Deadline passed without a matching reply
    TimedOut { elapsed: Duration },
}

impl CorrelationOutcome {
    pub fn into_frame(self) -> Option<ReplyFrame> {
        match self {
            CorrelationOutcome::Matched { frame, .. } => Some(frame),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct LinkMetrics {
    pub mock: bool,
    pub commands_sent: u64,
    pub replies_matched: u64,
    pub timeouts: u64,
    pub frames_discarded: u64,
    pub write_failures: u64,
    pub read_errors: u64,
    pub last_error: Option<String>,
    pub last_latency_ms: Option<u64>,
    pub min_latency_ms: Option<u64>,
    pub max_latency_ms: Option<u64>,
    pub avg_latency_ms: Option<f64>,
    pub latency_samples: u64,
}

impl LinkMetrics {
    pub(crate) fn record_match(&mut self, elapsed: Duration) {
        let latency_ms = elapsed.as_millis() as u64;
        self.replies_matched += 1;
        self.latency_samples += 1;
        self.last_latency_ms = Some(latency_ms);
        self.min_latency_ms = Some(self.min_latency_ms.map_or(latency_ms, |m| m.min(latency_ms)));
        self.max_latency_ms = Some(self.max_latency_ms.map_or(latency_ms, |m| m.max(latency_ms)));
        let samples = self.latency_samples as f64;
        self.avg_latency_ms = Some(match self.avg_latency_ms {
            Some(avg) => (avg * (samples - 1.0) + latency_ms as f64) / samples,
            None => latency_ms as f64,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latency_stats_track_extremes_and_mean() {
        let mut m = LinkMetrics::default();
        m.record_match(Duration::from_millis(50));
        m.record_match(Duration::from_millis(150));
        m.record_match(Duration::from_millis(100));
        assert_eq!(m.replies_matched, 3);
        assert_eq!(m.min_latency_ms, Some(50));
        assert_eq!(m.max_latency_ms, Some(150));
        assert_eq!(m.last_latency_ms, Some(100));
        assert_eq!(m.avg_latency_ms, Some(100.0));
    }
}
