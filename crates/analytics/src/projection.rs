//! Field projection: compact, kind-tagged sub-payloads.
//!
//! Framework objects carry large and sensitive fields (full creative
//! markup, ad documents, user data). Projection keeps only an explicit
//! whitelist per shape, recursing into composite shapes so nested objects
//! get their own appropriate whitelist.

use serde_json::{Map, Value};

use crate::payload::PayloadKind;

/// Project `payload` down to the debug-relevant fields for `kind`.
///
/// An unrecognized kind wraps the entire payload under the generic
/// `unclassified` tag instead of failing, so nothing is silently dropped
/// while new shapes are still being mapped out.
pub fn project(kind: PayloadKind, payload: &Value) -> Value {
    match kind {
        PayloadKind::Auction => pick(
            payload,
            &[
                "auctionId",
                "auctionStatus",
                "auctionStart",
                "auctionEnd",
                "timestamp",
                "timeout",
                "adUnitCodes",
            ],
        ),
        PayloadKind::BidderRequest => {
            let mut projected = pick(
                payload,
                &["bidderCode", "auctionId", "bidderRequestId", "timeout"],
            );
            // Composite shape: each contained bid request gets its own
            // whitelist.
            if let Some(bids) = payload.get("bids").and_then(Value::as_array) {
                let projected_bids: Vec<Value> = bids
                    .iter()
                    .map(|bid| project(PayloadKind::BidRequest, bid))
                    .collect();
                if let Some(object) = projected.as_object_mut() {
                    object.insert("bids".to_string(), Value::Array(projected_bids));
                }
            }
            projected
        }
        PayloadKind::BidRequest => pick(
            payload,
            &["bidId", "bidder", "adUnitCode", "transactionId", "sizes"],
        ),
        PayloadKind::OrtbBid => pick(
            payload,
            // `adm` deliberately excluded: full creative markup.
            &["id", "impid", "price", "cur", "w", "h", "lurl"],
        ),
        PayloadKind::BidResponse => {
            let mut projected = pick(
                payload,
                &[
                    "requestId",
                    "ortbId",
                    "creativeId",
                    "cpm",
                    "currency",
                    "width",
                    "height",
                    "status",
                    "statusMessage",
                    "timeToRespond",
                ],
            );
            if let Some(nested) = payload.get("ortbBidResponse") {
                if let Some(object) = projected.as_object_mut() {
                    object.insert(
                        "ortbBidResponse".to_string(),
                        project(PayloadKind::OrtbBid, nested),
                    );
                }
            }
            projected
        }
        PayloadKind::AdDocAndBidResponse => {
            let mut projected = pick(payload, &["adId"]);
            if let Some(bid) = payload.get("bid") {
                if let Some(object) = projected.as_object_mut() {
                    object.insert("bid".to_string(), project(PayloadKind::BidResponse, bid));
                }
            }
            projected
        }
        PayloadKind::AdDocAndErrorAndBidResponse => {
            let mut projected = pick(payload, &["reason", "message", "adId"]);
            if let Some(bid) = payload.get("bid") {
                if let Some(object) = projected.as_object_mut() {
                    object.insert("bid".to_string(), project(PayloadKind::BidResponse, bid));
                }
            }
            projected
        }
        PayloadKind::ErrorArgs => {
            let mut projected = pick(payload, &["error"]);
            if let Some(request) = payload.get("bidderRequest") {
                if let Some(object) = projected.as_object_mut() {
                    object.insert(
                        "bidderRequest".to_string(),
                        project(PayloadKind::BidderRequest, request),
                    );
                }
            }
            projected
        }
        PayloadKind::Unknown => {
            let mut wrapper = Map::new();
            wrapper.insert(PayloadKind::Unknown.tag().to_string(), payload.clone());
            Value::Object(wrapper)
        }
    }
}

fn pick(payload: &Value, fields: &[&str]) -> Value {
    let mut projected = Map::new();
    if let Some(object) = payload.as_object() {
        for field in fields {
            if let Some(value) = object.get(*field) {
                projected.insert((*field).to_string(), value.clone());
            }
        }
    }
    Value::Object(projected)
}

/// Recursively merge `source` into `target`.
///
/// Objects merge key-wise; everything else (including arrays) replaces the
/// existing value. Later fragments for the same sub-payload kind therefore
/// refine rather than overwrite earlier ones.
pub fn deep_merge(target: &mut Value, source: &Value) {
    match (target, source) {
        (Value::Object(target_map), Value::Object(source_map)) => {
            for (key, source_value) in source_map {
                match target_map.get_mut(key) {
                    Some(target_value) => deep_merge(target_value, source_value),
                    None => {
                        target_map.insert(key.clone(), source_value.clone());
                    }
                }
            }
        }
        (target_slot, source_value) => {
            *target_slot = source_value.clone();
        }
    }
}
