//! Correlation identifier resolution.
//!
//! One bid travels through the pipeline as three different objects (raw
//! wire bid, interpreted response, framework request), each naming the
//! same identifiers differently. Resolution tries the aliases in a fixed
//! priority order; the order here is the authoritative one.

use error_stack::Report;
use serde_json::Value;

use crate::error::AnalyticsError;
use crate::payload::{classify, redacted_dump, PayloadKind};

/// Resolve the per-bid correlation identifier from any payload shape.
///
/// Priority order:
/// 1. the payload's own `id`, only when it classifies as a raw wire bid
///    (other shapes reuse `id` for unrelated things);
/// 2. the `ortbId` alias carried by framework-interpreted responses;
/// 3. the `id` of a nested `ortbBidResponse` wire bid.
///
/// # Errors
///
/// Fails with [`AnalyticsError::IdentifierMissing`] (carrying a redacted
/// dump) when none of the aliases are present.
pub fn resolve_ortb_id(payload: &Value) -> Result<String, Report<AnalyticsError>> {
    if let Some(id) = payload.get("id").and_then(Value::as_str) {
        if matches!(classify(payload), Ok(PayloadKind::OrtbBid)) {
            return Ok(id.to_string());
        }
    }

    if let Some(id) = payload.get("ortbId").and_then(Value::as_str) {
        return Ok(id.to_string());
    }

    if let Some(id) = payload
        .get("ortbBidResponse")
        .and_then(|nested| nested.get("id"))
        .and_then(Value::as_str)
    {
        return Ok(id.to_string());
    }

    Err(Report::new(AnalyticsError::IdentifierMissing {
        dump: redacted_dump(payload),
    }))
}

/// Resolve the impression identifier, trying `impid`, `bidId`, `requestId`
/// in that fixed order.
///
/// Returns `None` when no alias is present; the impression id can
/// legitimately be late-bound, so callers handle the absence explicitly
/// rather than treating it as an error.
pub fn resolve_imp_id(payload: &Value) -> Option<String> {
    ["impid", "bidId", "requestId"]
        .iter()
        .find_map(|alias| payload.get(*alias).and_then(Value::as_str))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn resolves_from_raw_wire_bid_self_id() {
        let payload = json!({ "id": "o1", "impid": "b1", "price": 0.8 });
        assert_eq!(resolve_ortb_id(&payload).expect("should resolve"), "o1");
    }

    #[test]
    fn resolves_from_interpreted_response_alias() {
        let payload = json!({ "requestId": "b1", "ortbId": "o1", "ortbBidResponse": {} });
        assert_eq!(resolve_ortb_id(&payload).expect("should resolve"), "o1");
    }

    #[test]
    fn resolves_from_nested_wire_response() {
        let payload = json!({ "ortbBidResponse": { "id": "o1", "impid": "b1" } });
        assert_eq!(resolve_ortb_id(&payload).expect("should resolve"), "o1");
    }

    #[test]
    fn self_id_is_ignored_on_non_wire_shapes() {
        // An auction object also carries `id`-like fields; only the raw
        // wire bid's own id may be trusted directly.
        let payload = json!({
            "id": "not-an-ortb-id",
            "auctionId": "a1",
            "bidderRequests": [],
        });
        assert!(
            resolve_ortb_id(&payload).is_err(),
            "auction-shaped payload has no bid identifier"
        );
    }

    #[test]
    fn missing_every_alias_is_an_error_with_redacted_dump() {
        let payload = json!({ "cpm": 1.0, "adm": "y".repeat(5_000) });
        let err = resolve_ortb_id(&payload).expect_err("should fail");
        let rendered = format!("{err:?}");
        assert!(
            !rendered.contains(&"y".repeat(5_000)),
            "dump must not carry full creative markup"
        );
    }

    #[test]
    fn imp_id_alias_priority_is_fixed() {
        let payload = json!({ "impid": "first", "bidId": "second", "requestId": "third" });
        assert_eq!(resolve_imp_id(&payload), Some("first".to_string()));

        let payload = json!({ "bidId": "second", "requestId": "third" });
        assert_eq!(resolve_imp_id(&payload), Some("second".to_string()));

        let payload = json!({ "requestId": "third" });
        assert_eq!(resolve_imp_id(&payload), Some("third".to_string()));
    }

    #[test]
    fn imp_id_is_none_when_absent() {
        assert_eq!(resolve_imp_id(&json!({ "cpm": 1.0 })), None);
    }
}
