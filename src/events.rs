use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    StrikeIssued,
    QueueItemDeleted,
    DownloadCleaned,
    CategoryChanged,
    MarkedForDeletion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Information,
    Warning,
    Important,
}

/// Typed notification record. Transport is up to the sink.
#[derive(Debug, Clone, Serialize)]
pub struct EventRecord {
    pub event_type: EventType,
    pub message: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_id: Option<String>,
}

impl EventRecord {
    pub fn new(
        event_type: EventType,
        severity: Severity,
        message: impl Into<String>,
        correlation_id: Uuid,
    ) -> Self {
        Self {
            event_type,
            message: message.into(),
            severity,
            timestamp: Utc::now(),
            correlation_id,
            download_id: None,
        }
    }

    pub fn with_download_id(mut self, download_id: &str) -> Self {
        self.download_id = Some(download_id.to_lowercase());
        self
    }
}

pub trait EventSink: Send + Sync {
    fn publish(&self, event: EventRecord);
}

/// Writes events to the tracing log as structured JSON.
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn publish(&self, event: EventRecord) {
        let payload = serde_json::to_string(&event).unwrap_or_else(|_| event.message.clone());
        match event.severity {
            Severity::Information => tracing::info!(target: "arrsweep::events", "{payload}"),
            Severity::Warning | Severity::Important => {
                tracing::warn!(target: "arrsweep::events", "{payload}");
            }
        }
    }
}

/// Keeps every published event in memory.
#[derive(Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<EventRecord>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<EventRecord> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self, event_type: EventType) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|event| event.event_type == event_type)
            .count()
    }
}

impl EventSink for MemoryEventSink {
    fn publish(&self, event: EventRecord) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = EventRecord::new(
            EventType::StrikeIssued,
            Severity::Important,
            "Stalled strike 1/3",
            Uuid::nil(),
        )
        .with_download_id("ABCDEF");

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "strike_issued");
        assert_eq!(json["severity"], "important");
        assert_eq!(json["download_id"], "abcdef");
        assert_eq!(json["correlation_id"], "00000000-0000-0000-0000-000000000000");
    }

    #[test]
    fn test_memory_sink_counts_by_type() {
        let sink = MemoryEventSink::new();
        sink.publish(EventRecord::new(
            EventType::StrikeIssued,
            Severity::Important,
            "a",
            Uuid::nil(),
        ));
        sink.publish(EventRecord::new(
            EventType::QueueItemDeleted,
            Severity::Warning,
            "b",
            Uuid::nil(),
        ));
        assert_eq!(sink.count(EventType::StrikeIssued), 1);
        assert_eq!(sink.count(EventType::DownloadCleaned), 0);
        assert_eq!(sink.events().len(), 2);
    }

    #[test]
    fn test_tracing_sink_does_not_panic() {
        TracingEventSink.publish(EventRecord::new(
            EventType::CategoryChanged,
            Severity::Information,
            "moved",
            Uuid::new_v4(),
        ));
    }
}
