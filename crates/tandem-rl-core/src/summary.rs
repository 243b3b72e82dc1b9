//! Scalar diagnostics emitted by agents and algorithms

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::tensor::{self, Tensor};

/// Destination for scalar summaries
pub trait SummarySink: Send + Sync {
    /// Record `value` under `tag`
    fn scalar(&self, tag: &str, value: f32);
}

/// Record the mean of a tensor
pub fn summarize_tensor(sink: &dyn SummarySink, tag: &str, value: &Tensor) {
    sink.scalar(tag, tensor::mean(value));
}

/// Sink that emits summaries as `tracing` events
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl SummarySink for TracingSink {
    fn scalar(&self, tag: &str, value: f32) {
        debug!(target: "tandem::summary", tag, value, "summary");
    }
}

/// One recorded summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRecord {
    /// Summary tag such as `reward/overall`
    pub tag: String,
    /// Recorded value
    pub value: f32,
    /// Wall-clock time of recording
    pub recorded_at: DateTime<Utc>,
}

/// Sink that keeps every summary in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<SummaryRecord>>,
}

impl MemorySink {
    /// Empty sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far
    #[must_use]
    pub fn records(&self) -> Vec<SummaryRecord> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Tags recorded so far, in order
    #[must_use]
    pub fn tags(&self) -> Vec<String> {
        self.records().into_iter().map(|r| r.tag).collect()
    }

    /// Most recent value recorded under `tag`
    #[must_use]
    pub fn last(&self, tag: &str) -> Option<f32> {
        self.records()
            .into_iter()
            .rev()
            .find(|r| r.tag == tag)
            .map(|r| r.value)
    }

    /// Forget everything recorded so far
    pub fn clear(&self) {
        if let Ok(mut records) = self.records.lock() {
            records.clear();
        }
    }
}

impl SummarySink for MemorySink {
    fn scalar(&self, tag: &str, value: f32) {
        if let Ok(mut records) = self.records.lock() {
            records.push(SummaryRecord {
                tag: tag.to_string(),
                value,
                recorded_at: Utc::now(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_keeps_order_and_latest_value() {
        let sink = MemorySink::new();
        sink.scalar("reward/icm", 0.5);
        summarize_tensor(&sink, "reward/overall", &tensor::from_shape_vec(&[2], vec![1.0, 3.0]).unwrap());
        sink.scalar("reward/icm", 0.7);

        assert_eq!(sink.tags(), vec!["reward/icm", "reward/overall", "reward/icm"]);
        assert_eq!(sink.last("reward/overall"), Some(2.0));
        assert_eq!(sink.last("reward/icm"), Some(0.7));
        assert_eq!(sink.last("loss/total"), None);

        sink.clear();
        assert!(sink.records().is_empty());
    }
}
