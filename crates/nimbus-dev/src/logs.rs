//! Polling log tail
//!
//! Queries a sliding time window at a fixed interval and forwards only
//! records not yet emitted. Deduplication keys off the digest of the last
//! emitted record: the next window is scanned for that digest and only
//! records strictly after it are written forward. When the marker has
//! slid out of the window the whole window is fresh.

use anyhow::Result;
use chrono::Utc;
use nimbus_core::types::{LogRecord, TimeWindow};
use nimbus_engine::ControlPlane;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Default pause between log queries
pub const DEFAULT_TAIL_INTERVAL: Duration = Duration::from_secs(2);

/// Default lookback of each query window
pub const DEFAULT_TAIL_WINDOW: Duration = Duration::from_secs(60);

/// Continuously tails one log topic
pub struct LogTail {
    client: Arc<dyn ControlPlane>,
    interval: Duration,
    window: Duration,
}

impl LogTail {
    pub fn new(client: Arc<dyn ControlPlane>, interval: Duration, window: Duration) -> Self {
        Self {
            client,
            interval,
            window,
        }
    }

    /// Poll the topic forever, handing every fresh record to `sink`.
    /// Query failures are best-effort: logged and retried next tick.
    pub async fn tail<F>(&self, topic: &str, region: Option<&str>, mut sink: F) -> Result<()>
    where
        F: FnMut(LogRecord),
    {
        let mut marker: Option<String> = None;
        loop {
            match self.fetch_new(topic, region, &marker).await {
                Ok((records, new_marker)) => {
                    for record in records {
                        sink(record);
                    }
                    if new_marker.is_some() {
                        marker = new_marker;
                    }
                }
                Err(err) => warn!("Log query for '{topic}' failed: {err:#}"),
            }
            tokio::time::sleep(self.interval).await;
        }
    }

    /// One tail tick: fetch the current window and return the records
    /// after the marker plus the marker for the next tick.
    pub async fn fetch_new(
        &self,
        topic: &str,
        region: Option<&str>,
        marker: &Option<String>,
    ) -> Result<(Vec<LogRecord>, Option<String>)> {
        let end = Utc::now();
        let window = TimeWindow {
            start: end
                - chrono::Duration::from_std(self.window).unwrap_or(chrono::Duration::seconds(60)),
            end,
        };

        let records = self.client.search_logs(topic, window, None, region).await?;
        let new_marker = records.last().map(record_digest);
        let fresh = fresh_records(&records, marker).to_vec();
        Ok((fresh, new_marker))
    }
}

/// Digest identifying one emitted record
pub fn record_digest(record: &LogRecord) -> String {
    let mut hasher = Sha256::new();
    hasher.update(record.timestamp.to_rfc3339().as_bytes());
    hasher.update(b"|");
    hasher.update(record.message.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Slice of `records` strictly after the marker digest; the whole slice
/// when the marker is absent from the window.
fn fresh_records<'a>(records: &'a [LogRecord], marker: &Option<String>) -> &'a [LogRecord] {
    let Some(digest) = marker else {
        return records;
    };
    match records.iter().rposition(|r| &record_digest(r) == digest) {
        Some(position) => &records[position + 1..],
        None => records,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(seconds: i64, message: &str) -> LogRecord {
        LogRecord {
            timestamp: Utc.timestamp_opt(seconds, 0).unwrap(),
            message: message.to_string(),
            source: None,
        }
    }

    #[test]
    fn test_no_marker_emits_everything() {
        let records = vec![record(1, "a"), record(2, "b")];
        assert_eq!(fresh_records(&records, &None).len(), 2);
    }

    #[test]
    fn test_marker_splits_window() {
        let records = vec![record(1, "a"), record(2, "b"), record(3, "c")];
        let marker = Some(record_digest(&records[1]));

        let fresh = fresh_records(&records, &marker);
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].message, "c");
    }

    #[test]
    fn test_marker_at_end_emits_nothing() {
        let records = vec![record(1, "a"), record(2, "b")];
        let marker = Some(record_digest(&records[1]));
        assert!(fresh_records(&records, &marker).is_empty());
    }

    #[test]
    fn test_marker_out_of_window_emits_everything() {
        let old = record(1, "gone");
        let records = vec![record(2, "b"), record(3, "c")];
        let marker = Some(record_digest(&old));
        assert_eq!(fresh_records(&records, &marker).len(), 2);
    }

    #[test]
    fn test_duplicate_messages_distinguished_by_timestamp() {
        let records = vec![record(1, "tick"), record(2, "tick")];
        let marker = Some(record_digest(&records[0]));

        let fresh = fresh_records(&records, &marker);
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].timestamp, records[1].timestamp);
    }

    #[test]
    fn test_digest_is_stable() {
        let a = record(1, "x");
        assert_eq!(record_digest(&a), record_digest(&a));
        assert_ne!(record_digest(&a), record_digest(&record(1, "y")));
    }
}
