//! Per-bid aggregation unit.
//!
//! One [`BidContext`] exists per distinct ortb id observed during an
//! auction. It owns its event log, accumulates kind-tagged payload
//! fragments, and tracks win/loss state. Contexts are created lazily the
//! first time a bid-scoped event arrives and live until auction teardown.

use error_stack::Report;
use serde_json::{Map, Value};

use crate::error::AnalyticsError;
use crate::events::{DebugEvent, EventLog};
use crate::identifiers::{resolve_imp_id, resolve_ortb_id};
use crate::payload::{classify, PayloadKind};
use crate::projection::deep_merge;

#[derive(Debug)]
pub struct BidContext {
    ortb_id: String,
    imp_id: String,
    events: EventLog,
    payload: Map<String, Value>,
    bid_win: bool,
    loss_beacon_fired: bool,
    flushed: bool,
    loss_beacon_url: Option<String>,
}

impl BidContext {
    /// Seed a context from a bid-shaped payload.
    ///
    /// Only the raw wire bid and the framework-interpreted response carry
    /// enough identity to anchor a context; any other shape is rejected.
    /// Common events logged before this context existed are copied in
    /// (an independent append sequence, order preserved) and common payload
    /// fragments addressed to this impression are merged.
    ///
    /// # Errors
    ///
    /// Fails with [`AnalyticsError::InvalidBidContextSeed`] for a non-bid
    /// shape, or [`AnalyticsError::IdentifierMissing`] when either
    /// identifier cannot be resolved. A failed seeding never corrupts
    /// sibling contexts.
    pub fn seed(
        payload: &Value,
        common_events: &EventLog,
        common_payload: &Map<String, Value>,
    ) -> Result<Self, Report<AnalyticsError>> {
        let kind = classify(payload)?;
        if !matches!(kind, PayloadKind::OrtbBid | PayloadKind::BidResponse) {
            return Err(Report::new(AnalyticsError::InvalidBidContextSeed {
                kind: kind.tag().to_string(),
            }));
        }

        let ortb_id = resolve_ortb_id(payload)?;
        let imp_id = resolve_imp_id(payload).ok_or_else(|| {
            Report::new(AnalyticsError::IdentifierMissing {
                dump: crate::payload::redacted_dump(payload),
            })
        })?;

        let loss_beacon_url = payload
            .get("lurl")
            .or_else(|| payload.get("ortbBidResponse").and_then(|b| b.get("lurl")))
            .and_then(Value::as_str)
            .map(str::to_string);

        let mut events = EventLog::new();
        events.append_all(common_events);

        let mut context = Self {
            ortb_id,
            imp_id,
            events,
            payload: Map::new(),
            bid_win: false,
            loss_beacon_fired: false,
            flushed: false,
            loss_beacon_url,
        };

        for (tag, fragment) in common_payload {
            // Fragments stamped for another impression stay in common state.
            let addressed_elsewhere = resolve_imp_id(fragment)
                .is_some_and(|imp| imp != context.imp_id);
            if !addressed_elsewhere {
                context.merge_fragment(tag, fragment.clone());
            }
        }

        Ok(context)
    }

    /// Append `event` and merge the optional fragment.
    ///
    /// When the event carries its own correlation key and it names a
    /// different impression, the event is silently skipped: multi-cast
    /// routing may legitimately miss, and that is not an error.
    pub fn push_event(
        &mut self,
        event: DebugEvent,
        correlation_imp_id: Option<&str>,
        fragment: Option<(PayloadKind, Value)>,
    ) {
        if correlation_imp_id.is_some_and(|imp| imp != self.imp_id) {
            return;
        }
        self.events.append(event);
        if let Some((kind, projected)) = fragment {
            self.merge_payload(kind, projected);
        }
    }

    /// Append an event with no correlation check (synthetic entries such
    /// as the loss notification).
    pub fn log_event(&mut self, event: DebugEvent) {
        self.events.append(event);
    }

    /// Deep-merge a projected fragment under its kind tag.
    ///
    /// Before merging, any sub-object lacking an `impid` is stamped with
    /// this context's impression id so every stored fragment stays
    /// self-describing for the collector even outside the report envelope.
    pub fn merge_payload(&mut self, kind: PayloadKind, fragment: Value) {
        self.merge_fragment(kind.tag(), fragment);
    }

    fn merge_fragment(&mut self, tag: &str, mut fragment: Value) {
        stamp_imp_id(&mut fragment, &self.imp_id);
        match self.payload.get_mut(tag) {
            Some(existing) => deep_merge(existing, &fragment),
            None => {
                self.payload.insert(tag.to_string(), fragment);
            }
        }
    }

    /// One-way flip: this bid won its impression.
    pub fn mark_win(&mut self) {
        self.bid_win = true;
    }

    /// One-way flip: the loss beacon for this bid has been initiated.
    pub fn mark_loss_beacon_fired(&mut self) {
        self.loss_beacon_fired = true;
    }

    /// One-way flip: this context's report has been submitted.
    pub fn mark_flushed(&mut self) {
        self.flushed = true;
    }

    pub fn ortb_id(&self) -> &str {
        &self.ortb_id
    }

    pub fn imp_id(&self) -> &str {
        &self.imp_id
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn bid_win(&self) -> bool {
        self.bid_win
    }

    pub fn loss_beacon_fired(&self) -> bool {
        self.loss_beacon_fired
    }

    pub fn flushed(&self) -> bool {
        self.flushed
    }

    pub fn loss_beacon_url(&self) -> Option<&str> {
        self.loss_beacon_url.as_deref()
    }

    /// Consolidated report body for the collector: identity, win state,
    /// the full event log, and every accumulated fragment unrolled to the
    /// top level.
    pub fn report_body(&self) -> Value {
        let mut body = Map::new();
        body.insert("impid".to_string(), Value::String(self.imp_id.clone()));
        body.insert("ortbId".to_string(), Value::String(self.ortb_id.clone()));
        body.insert("bidWin".to_string(), Value::Bool(self.bid_win));
        body.insert(
            "events".to_string(),
            serde_json::to_value(&self.events).unwrap_or_else(|_| Value::Array(Vec::new())),
        );
        for (tag, fragment) in &self.payload {
            body.insert(tag.clone(), fragment.clone());
        }
        Value::Object(body)
    }
}

/// Stamp every object node lacking an `impid` with `imp_id`.
fn stamp_imp_id(value: &mut Value, imp_id: &str) {
    match value {
        Value::Object(map) => {
            if !map.contains_key("impid") {
                map.insert("impid".to_string(), Value::String(imp_id.to_string()));
            }
            for nested in map.values_mut() {
                stamp_imp_id(nested, imp_id);
            }
        }
        Value::Array(items) => {
            for item in items {
                stamp_imp_id(item, imp_id);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::events::{EventKind, EventType, Severity};

    use super::*;

    fn wire_bid() -> Value {
        json!({
            "id": "o1",
            "impid": "b1",
            "price": 1.5,
            "lurl": "https://ads.example.com/loss?id=o1",
        })
    }

    fn seed_context() -> BidContext {
        BidContext::seed(&wire_bid(), &EventLog::new(), &Map::new()).expect("valid seed")
    }

    #[test]
    fn seeds_from_raw_wire_bid() {
        let context = seed_context();
        assert_eq!(context.ortb_id(), "o1");
        assert_eq!(context.imp_id(), "b1");
        assert_eq!(
            context.loss_beacon_url(),
            Some("https://ads.example.com/loss?id=o1")
        );
        assert!(!context.bid_win());
        assert!(!context.loss_beacon_fired());
    }

    #[test]
    fn seeds_from_interpreted_response_with_nested_loss_url() {
        let payload = json!({
            "requestId": "b1",
            "ortbId": "o1",
            "ortbBidResponse": { "id": "o1", "impid": "b1", "lurl": "https://x/l" },
        });
        let context =
            BidContext::seed(&payload, &EventLog::new(), &Map::new()).expect("valid seed");
        assert_eq!(context.imp_id(), "b1");
        assert_eq!(context.loss_beacon_url(), Some("https://x/l"));
    }

    #[test]
    fn rejects_non_bid_seed_shapes() {
        let auction = json!({ "auctionId": "a1", "bidderRequests": [] });
        let err = BidContext::seed(&auction, &EventLog::new(), &Map::new())
            .expect_err("auction payload cannot seed a context");
        assert!(err.to_string().contains("auction"), "error names the kind: {err}");
    }

    #[test]
    fn rejects_seed_missing_impression_id() {
        let payload = json!({ "ortbId": "o1", "ortbBidResponse": {} });
        assert!(BidContext::seed(&payload, &EventLog::new(), &Map::new()).is_err());
    }

    #[test]
    fn copies_common_events_and_matching_fragments_at_seed_time() {
        let mut common_events = EventLog::new();
        common_events.append(DebugEvent::now(
            EventKind::Lifecycle(EventType::AuctionInit),
            Severity::Info,
            None,
        ));

        let mut common_payload = Map::new();
        common_payload.insert("auction".to_string(), json!({ "auctionId": "a1" }));
        common_payload.insert(
            "bidRequest".to_string(),
            json!({ "impid": "someone-else", "bidId": "zz" }),
        );

        let context = BidContext::seed(&wire_bid(), &common_events, &common_payload)
            .expect("valid seed");

        assert_eq!(context.events().len(), 1, "common events are copied in");
        let body = context.report_body();
        assert_eq!(body["auction"]["auctionId"], "a1");
        assert_eq!(
            body["auction"]["impid"], "b1",
            "untagged fragments get stamped with this context's impid"
        );
        assert!(
            body.get("bidRequest").is_none(),
            "fragments tagged for another impression stay out"
        );
    }

    #[test]
    fn push_event_skips_other_impressions_silently() {
        let mut context = seed_context();
        context.push_event(
            DebugEvent::now(EventKind::Lifecycle(EventType::BidWon), Severity::Info, None),
            Some("someone-else"),
            None,
        );
        assert_eq!(context.events().len(), 0, "mismatched impression is ignored");

        context.push_event(
            DebugEvent::now(EventKind::Lifecycle(EventType::BidWon), Severity::Info, None),
            Some("b1"),
            None,
        );
        context.push_event(
            DebugEvent::now(
                EventKind::Lifecycle(EventType::AuctionEnd),
                Severity::Info,
                None,
            ),
            None,
            None,
        );
        assert_eq!(context.events().len(), 2);
    }

    #[test]
    fn event_log_length_matches_events_routed_in_order() {
        let mut context = seed_context();
        for ts in 1..=4 {
            context.push_event(
                DebugEvent::new(
                    EventKind::Lifecycle(EventType::BidResponse),
                    Severity::Info,
                    ts,
                    None,
                )
                .expect("valid event"),
                Some("b1"),
                None,
            );
        }
        let stamps: Vec<i64> = context.events().iter().map(DebugEvent::timestamp_ms).collect();
        assert_eq!(stamps, vec![1, 2, 3, 4]);
    }

    #[test]
    fn merge_payload_deep_merges_same_kind() {
        let mut context = seed_context();
        context.merge_payload(PayloadKind::BidResponse, json!({ "cpm": 2.0 }));
        context.merge_payload(PayloadKind::BidResponse, json!({ "status": "rendered" }));

        let body = context.report_body();
        assert_eq!(body["bidResponse"]["cpm"], 2.0);
        assert_eq!(body["bidResponse"]["status"], "rendered");
        assert_eq!(body["bidResponse"]["impid"], "b1");
    }

    #[test]
    fn win_and_beacon_flags_are_one_way() {
        let mut context = seed_context();
        context.mark_win();
        context.mark_loss_beacon_fired();
        assert!(context.bid_win());
        assert!(context.loss_beacon_fired());
    }

    #[test]
    fn report_body_carries_identity_and_events() {
        let mut context = seed_context();
        context.log_event(DebugEvent::now(EventKind::BidLoss, Severity::Info, None));
        let body = context.report_body();
        assert_eq!(body["impid"], "b1");
        assert_eq!(body["ortbId"], "o1");
        assert_eq!(body["bidWin"], false);
        assert_eq!(body["events"].as_array().map(Vec::len), Some(1));
    }
}
