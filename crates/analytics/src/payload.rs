//! Payload shape classification.
//!
//! The host framework delivers every lifecycle event with an arbitrary
//! JSON payload; which fields are present depends on the pipeline stage
//! that produced the object. Classification checks shape-unique field
//! combinations so the right field whitelist can be applied downstream.

use error_stack::Report;
use serde_json::Value;

use crate::error::AnalyticsError;

/// Recognized payload shapes, one per pipeline-stage representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    /// Render-failed document: ad document plus error details plus the
    /// interpreted bid it was rendering.
    AdDocAndErrorAndBidResponse,
    /// Render-succeeded document: ad document plus the interpreted bid.
    AdDocAndBidResponse,
    /// Bidder-error arguments: an error object plus the failing request.
    ErrorArgs,
    /// Framework-interpreted bid response carrying the nested wire bid.
    BidResponse,
    /// Raw OpenRTB wire bid, straight off the ad server response.
    OrtbBid,
    /// Framework bidder-request envelope containing individual bids.
    BidderRequest,
    /// Individual ad-slot bid request inside a bidder-request.
    BidRequest,
    /// Auction-wide object delivered at init/end.
    Auction,
    /// Never produced by [`classify`]; reserved for the projector's
    /// wrap-everything fallback when a caller passes an unexpected kind.
    Unknown,
}

impl PayloadKind {
    /// Tag under which projected fragments of this kind accumulate.
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::AdDocAndErrorAndBidResponse => "adDocAndErrorAndBidResponse",
            Self::AdDocAndBidResponse => "adDocAndBidResponse",
            Self::ErrorArgs => "errorArgs",
            Self::BidResponse => "bidResponse",
            Self::OrtbBid => "ortbBid",
            Self::BidderRequest => "bidderRequest",
            Self::BidRequest => "bidRequest",
            Self::Auction => "auction",
            Self::Unknown => "unclassified",
        }
    }
}

/// Classification table, checked in declaration order.
///
/// Ordering invariant: shapes whose unique-field set is a superset of a
/// later shape's set MUST be declared first, otherwise the payload silently
/// matches the more general shape. `AdDocAndErrorAndBidResponse` carries
/// every field `AdDocAndBidResponse` does plus the error fields, and the
/// interpreted `BidResponse` embeds the raw wire bid, so both pairs are
/// order-sensitive. Covered by `classifier_order_is_most_specific_first`.
const CLASSIFIERS: &[(PayloadKind, &[&str])] = &[
    (
        PayloadKind::AdDocAndErrorAndBidResponse,
        &["reason", "message", "bid"],
    ),
    (PayloadKind::AdDocAndBidResponse, &["doc", "bid"]),
    (PayloadKind::ErrorArgs, &["error", "bidderRequest"]),
    (PayloadKind::BidResponse, &["ortbBidResponse"]),
    (PayloadKind::OrtbBid, &["id", "impid"]),
    (PayloadKind::BidderRequest, &["bidderCode", "bids"]),
    (PayloadKind::BidRequest, &["bidId", "bidder"]),
    (PayloadKind::Auction, &["auctionId", "bidderRequests"]),
];

/// Determine which recognized shape `payload` has.
///
/// Returns the first kind whose entire unique-field set is present as own
/// properties of the payload. Never guesses: an unmatched payload fails
/// loudly with a redacted dump for diagnostics.
///
/// # Errors
///
/// Fails with [`AnalyticsError::UnclassifiableShape`] when no kind matches
/// or the payload is not a JSON object.
pub fn classify(payload: &Value) -> Result<PayloadKind, Report<AnalyticsError>> {
    let Some(object) = payload.as_object() else {
        return Err(Report::new(AnalyticsError::UnclassifiableShape {
            dump: redacted_dump(payload),
        }));
    };

    for (kind, required_fields) in CLASSIFIERS {
        if required_fields.iter().all(|field| object.contains_key(*field)) {
            return Ok(*kind);
        }
    }

    Err(Report::new(AnalyticsError::UnclassifiableShape {
        dump: redacted_dump(payload),
    }))
}

/// Maximum length kept for any string field in a diagnostic dump. Creative
/// markup and stack traces routinely run to tens of kilobytes.
const DUMP_STRING_LIMIT: usize = 120;

/// Serialize a payload for inclusion in error messages, truncating
/// oversized string fields so the dump stays compact and free of full ad
/// markup.
pub fn redacted_dump(payload: &Value) -> String {
    serde_json::to_string(&redact(payload)).unwrap_or_else(|_| "<unserializable>".to_string())
}

fn redact(value: &Value) -> Value {
    match value {
        Value::String(s) if s.len() > DUMP_STRING_LIMIT => {
            let truncated: String = s.chars().take(DUMP_STRING_LIMIT).collect();
            Value::String(format!("{truncated}…[{} chars]", s.len()))
        }
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, inner)| (key.clone(), redact(inner)))
                .collect(),
        ),
        other => other.clone(),
    }
}
