//! Debug events and the append-only event log.
//!
//! A [`DebugEvent`] is an immutable record of one lifecycle occurrence;
//! an [`EventLog`] only ever grows, never reorders or removes entries.

use std::fmt;
use std::str::FromStr;

use error_stack::Report;
use serde::{Serialize, Serializer};

use crate::error::AnalyticsError;

/// Host-framework lifecycle events consumed by the analytics adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    AuctionInit,
    BidResponse,
    BidWon,
    AuctionEnd,
    AuctionTimeout,
    NoBid,
    BidRejected,
    BidderError,
    AdRenderSucceeded,
    AdRenderFailed,
    BidderDone,
    BidTimeout,
    SeatNonBid,
}

impl EventType {
    /// Wire tag as emitted by the host framework's event bus.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AuctionInit => "auction-init",
            Self::BidResponse => "bid-response",
            Self::BidWon => "bid-won",
            Self::AuctionEnd => "auction-end",
            Self::AuctionTimeout => "auction-timeout",
            Self::NoBid => "no-bid",
            Self::BidRejected => "bid-rejected",
            Self::BidderError => "bidder-error",
            Self::AdRenderSucceeded => "ad-render-succeeded",
            Self::AdRenderFailed => "ad-render-failed",
            Self::BidderDone => "bidder-done",
            Self::BidTimeout => "bid-timeout",
            Self::SeatNonBid => "seat-non-bid",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = Report<AnalyticsError>;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auction-init" => Ok(Self::AuctionInit),
            "bid-response" => Ok(Self::BidResponse),
            "bid-won" => Ok(Self::BidWon),
            "auction-end" => Ok(Self::AuctionEnd),
            "auction-timeout" => Ok(Self::AuctionTimeout),
            "no-bid" => Ok(Self::NoBid),
            "bid-rejected" => Ok(Self::BidRejected),
            "bidder-error" => Ok(Self::BidderError),
            "ad-render-succeeded" => Ok(Self::AdRenderSucceeded),
            "ad-render-failed" => Ok(Self::AdRenderFailed),
            "bidder-done" => Ok(Self::BidderDone),
            "bid-timeout" => Ok(Self::BidTimeout),
            "seat-non-bid" => Ok(Self::SeatNonBid),
            other => Err(Report::new(AnalyticsError::InvalidEvent {
                message: format!("unknown event type '{other}'"),
            })),
        }
    }
}

/// The kind recorded on a [`DebugEvent`]: either a lifecycle event as
/// delivered, the synthetic loss notification, or the synthetic marker
/// logged when routing an event failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Lifecycle(EventType),
    BidLoss,
    /// Routing of the named event raised an error; rendered
    /// `errorInEvent_<tag>` so the collector can tie the failure back to
    /// the event that caused it.
    ErrorIn(EventType),
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lifecycle(event) => f.write_str(event.as_str()),
            Self::BidLoss => f.write_str("bid-loss"),
            Self::ErrorIn(event) => write!(f, "errorInEvent_{}", event.as_str()),
        }
    }
}

impl Serialize for EventKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Severity attached to a debug event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warn,
    Error,
}

impl FromStr for Severity {
    type Err = Report<AnalyticsError>;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(Self::Info),
            "warn" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(Report::new(AnalyticsError::InvalidEvent {
                message: format!("unrecognized severity '{other}'"),
            })),
        }
    }
}

/// One immutable lifecycle record. Construction validates required fields;
/// there is no mutation after that.
#[derive(Debug, Clone, Serialize)]
pub struct DebugEvent {
    #[serde(rename = "eventType")]
    kind: EventKind,
    level: Severity,
    timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    note: Option<String>,
}

impl DebugEvent {
    /// Build an event with an explicit epoch-millisecond timestamp.
    ///
    /// # Errors
    ///
    /// Fails with [`AnalyticsError::InvalidEvent`] when the timestamp is not
    /// a positive epoch value.
    pub fn new(
        kind: EventKind,
        level: Severity,
        timestamp_ms: i64,
        note: Option<String>,
    ) -> Result<Self, Report<AnalyticsError>> {
        if timestamp_ms <= 0 {
            return Err(Report::new(AnalyticsError::InvalidEvent {
                message: format!("timestamp must be a positive epoch value, got {timestamp_ms}"),
            }));
        }
        Ok(Self {
            kind,
            level,
            timestamp: timestamp_ms,
            note,
        })
    }

    /// Build an event stamped with the current wall-clock time.
    pub fn now(kind: EventKind, level: Severity, note: Option<String>) -> Self {
        Self {
            kind,
            level,
            timestamp: chrono::Utc::now().timestamp_millis(),
            note,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn level(&self) -> Severity {
        self.level
    }

    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp
    }

    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }
}

/// Append-only, ordered record of debug events for one owner.
///
/// Copying a log into a new owner (common events into a freshly created bid
/// context) is an independent append sequence that preserves order.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct EventLog {
    entries: Vec<DebugEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append is the only mutation a log supports.
    pub fn append(&mut self, event: DebugEvent) {
        self.entries.push(event);
    }

    /// Append every entry of `other`, preserving its order.
    pub fn append_all(&mut self, other: &EventLog) {
        self.entries.extend(other.entries.iter().cloned());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DebugEvent> {
        self.entries.iter()
    }

    /// Whether any entry was logged at warn or error severity.
    pub fn has_warning_or_error(&self) -> bool {
        self.entries.iter().any(|e| e.level >= Severity::Warn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_tags_round_trip() {
        let all = [
            EventType::AuctionInit,
            EventType::BidResponse,
            EventType::BidWon,
            EventType::AuctionEnd,
            EventType::AuctionTimeout,
            EventType::NoBid,
            EventType::BidRejected,
            EventType::BidderError,
            EventType::AdRenderSucceeded,
            EventType::AdRenderFailed,
            EventType::BidderDone,
            EventType::BidTimeout,
            EventType::SeatNonBid,
        ];
        for event in all {
            let parsed: EventType = event.as_str().parse().expect("tag should parse back");
            assert_eq!(parsed, event, "round trip for {}", event);
        }
    }

    #[test]
    fn unknown_event_type_is_rejected() {
        let result: Result<EventType, _> = "bid-vanished".parse();
        assert!(result.is_err(), "unknown tag should not parse");
    }

    #[test]
    fn severity_rejects_unrecognized_level() {
        assert!("info".parse::<Severity>().is_ok());
        assert!("warn".parse::<Severity>().is_ok());
        assert!("error".parse::<Severity>().is_ok());
        assert!(
            "fatal".parse::<Severity>().is_err(),
            "only the three recognized levels are valid"
        );
    }

    #[test]
    fn debug_event_rejects_non_positive_timestamp() {
        let result = DebugEvent::new(
            EventKind::Lifecycle(EventType::BidResponse),
            Severity::Info,
            0,
            None,
        );
        assert!(result.is_err(), "zero timestamp should be rejected");

        let result = DebugEvent::new(
            EventKind::Lifecycle(EventType::BidResponse),
            Severity::Info,
            -5,
            None,
        );
        assert!(result.is_err(), "negative timestamp should be rejected");
    }

    #[test]
    fn error_kind_renders_with_offending_event_tag() {
        let kind = EventKind::ErrorIn(EventType::NoBid);
        assert_eq!(kind.to_string(), "errorInEvent_no-bid");
    }

    #[test]
    fn log_preserves_append_order() {
        let mut log = EventLog::new();
        for ts in 1..=5 {
            log.append(
                DebugEvent::new(
                    EventKind::Lifecycle(EventType::BidResponse),
                    Severity::Info,
                    ts,
                    None,
                )
                .expect("valid event"),
            );
        }
        let stamps: Vec<i64> = log.iter().map(DebugEvent::timestamp_ms).collect();
        assert_eq!(stamps, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn copied_log_is_independent_of_its_source() {
        let mut source = EventLog::new();
        source.append(DebugEvent::now(EventKind::BidLoss, Severity::Info, None));

        let mut copy = EventLog::new();
        copy.append_all(&source);
        copy.append(DebugEvent::now(
            EventKind::Lifecycle(EventType::AuctionEnd),
            Severity::Info,
            None,
        ));

        assert_eq!(source.len(), 1);
        assert_eq!(copy.len(), 2);
    }

    #[test]
    fn event_serializes_with_collector_field_names() {
        let event = DebugEvent::new(EventKind::BidLoss, Severity::Warn, 1_700_000_000_000, None)
            .expect("valid event");
        let json = serde_json::to_value(&event).expect("serializable");
        assert_eq!(json["eventType"], "bid-loss");
        assert_eq!(json["level"], "warn");
        assert_eq!(json["timestamp"], 1_700_000_000_000_i64);
        assert!(json.get("note").is_none(), "absent note is omitted");
    }
}
