//! Port definition for fetching image bytes.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::domain::errors::FetchError;

/// Receiving end of a progress channel.
pub type ProgressReceiver = mpsc::UnboundedReceiver<f64>;

/// Reports the fraction of a transfer received so far.
///
/// Values are clamped to `[0, 1]` and only forwarded when they increase, so
/// the receiving side always observes a non-decreasing sequence.
#[derive(Debug)]
pub struct ProgressSink {
    tx: mpsc::UnboundedSender<f64>,
    last: f64,
}

impl ProgressSink {
    /// Creates a sink that forwards into `tx`.
    #[must_use]
    pub const fn new(tx: mpsc::UnboundedSender<f64>) -> Self {
        Self { tx, last: 0.0 }
    }

    /// Creates a connected sink and receiver pair.
    #[must_use]
    pub fn channel() -> (Self, ProgressReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    /// Reports a completion fraction.
    pub fn report(&mut self, fraction: f64) {
        if !fraction.is_finite() {
            return;
        }
        let fraction = fraction.clamp(0.0, 1.0);
        if fraction <= self.last {
            return;
        }
        self.last = fraction;
        let _ = self.tx.send(fraction);
    }

    /// Reports progress from byte counters. Does nothing when the total
    /// length is unknown.
    #[allow(clippy::cast_precision_loss)]
    pub fn report_bytes(&mut self, received: u64, total: Option<u64>) {
        if let Some(total) = total.filter(|t| *t > 0) {
            self.report(received as f64 / total as f64);
        }
    }

    /// Returns true once nobody is listening anymore, which means the
    /// transfer was abandoned.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Port for retrieving raw image bytes.
#[async_trait]
pub trait ImageFetcherPort: Send + Sync {
    /// Performs a single transfer for `url`.
    ///
    /// Malformed URLs fail with [`FetchError::BadUrl`] before any I/O and
    /// without reporting progress. The returned value is the one terminal
    /// outcome of the transfer.
    async fn fetch(&self, url: &str, progress: ProgressSink) -> Result<Bytes, FetchError>;
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_is_clamped_and_non_decreasing() {
        let (mut sink, mut rx) = ProgressSink::channel();
        sink.report(0.25);
        sink.report(0.1);
        sink.report(0.25);
        sink.report(f64::NAN);
        sink.report(1.5);
        drop(sink);

        let mut seen = Vec::new();
        while let Ok(fraction) = rx.try_recv() {
            seen.push(fraction);
        }
        assert_eq!(seen, vec![0.25, 1.0]);
    }

    #[test]
    fn test_sink_reports_bytes() {
        let (mut sink, mut rx) = ProgressSink::channel();
        sink.report_bytes(10, None);
        sink.report_bytes(10, Some(0));
        sink.report_bytes(50, Some(200));
        assert_eq!(rx.try_recv().ok(), Some(0.25));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_sink_detects_closed_receiver() {
        let (sink, rx) = ProgressSink::channel();
        assert!(!sink.is_closed());
        drop(rx);
        assert!(sink.is_closed());
    }
}
