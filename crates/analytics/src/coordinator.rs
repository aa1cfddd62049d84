//! Auction-scope coordination.
//!
//! One [`AuctionScope`] exists per auction run. It owns every
//! [`BidContext`], routes auction-wide events to all of them (caching as
//! "common" state while none exist yet), resolves pending loss beacons,
//! and performs the terminal flush to the collector.
//!
//! The scope is mutated only from the synchronous portion of each event
//! handler; the only concurrency is the fire-and-forget network calls,
//! whose handles are retained and awaited collectively during [`flush`].

use std::collections::HashMap;
use std::sync::Arc;

use error_stack::Report;
use futures::future::join_all;
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use url::Url;

use crate::context::BidContext;
use crate::error::AnalyticsError;
use crate::events::{DebugEvent, EventKind, EventLog, EventType, Severity};
use crate::identifiers::{resolve_imp_id, resolve_ortb_id};
use crate::payload::{classify, redacted_dump, PayloadKind};
use crate::projection::{deep_merge, project};
use crate::transport::Transport;

pub struct AuctionScope {
    auction_id: String,
    /// imp id -> projected ad-slot bid request, cached at init for alias
    /// resolution and for orphan reports when no context ever existed.
    bidder_requests: HashMap<String, Value>,
    contexts: HashMap<String, BidContext>,
    common_events: EventLog,
    common_payload: Map<String, Value>,
    common_flushed: bool,
    pending_beacons: Vec<JoinHandle<()>>,
}

impl AuctionScope {
    /// Start a fresh scope from the auction-init payload.
    ///
    /// Replaces rather than augments any prior state; the caller discards
    /// the previous auction's scope wholesale.
    ///
    /// # Errors
    ///
    /// Fails when the payload is not auction-shaped or carries no
    /// auction id.
    pub fn initialise(auction_payload: &Value) -> Result<Self, Report<AnalyticsError>> {
        let kind = classify(auction_payload)?;
        if kind != PayloadKind::Auction {
            return Err(Report::new(AnalyticsError::UnclassifiableShape {
                dump: redacted_dump(auction_payload),
            }));
        }
        let auction_id = auction_payload
            .get("auctionId")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Report::new(AnalyticsError::IdentifierMissing {
                    dump: redacted_dump(auction_payload),
                })
            })?
            .to_string();

        let mut bidder_requests = HashMap::new();
        if let Some(requests) = auction_payload.get("bidderRequests").and_then(Value::as_array) {
            for request in requests {
                let Some(bids) = request.get("bids").and_then(Value::as_array) else {
                    continue;
                };
                for bid in bids {
                    match resolve_imp_id(bid) {
                        Some(imp_id) => {
                            bidder_requests.insert(imp_id, project(PayloadKind::BidRequest, bid));
                        }
                        None => log::warn!(
                            "Auction {}: bid request without impression id, skipping",
                            auction_id
                        ),
                    }
                }
            }
        }

        log::debug!(
            "Auction {} initialised with {} cached bid requests",
            auction_id,
            bidder_requests.len()
        );

        Ok(Self {
            auction_id,
            bidder_requests,
            contexts: HashMap::new(),
            common_events: EventLog::new(),
            common_payload: Map::new(),
            common_flushed: false,
            pending_beacons: Vec::new(),
        })
    }

    pub fn auction_id(&self) -> &str {
        &self.auction_id
    }

    pub fn context(&self, ortb_id: &str) -> Option<&BidContext> {
        self.contexts.get(ortb_id)
    }

    pub fn context_count(&self) -> usize {
        self.contexts.len()
    }

    pub fn common_events(&self) -> &EventLog {
        &self.common_events
    }

    /// Route an auction-wide event to every context, or cache it as common
    /// state when no context exists yet.
    pub fn route_to_all(&mut self, event: DebugEvent, fragment: Option<(PayloadKind, Value)>) {
        if self.contexts.is_empty() {
            self.common_events.append(event);
            if let Some((kind, projected)) = fragment {
                match self.common_payload.get_mut(kind.tag()) {
                    Some(existing) => deep_merge(existing, &projected),
                    None => {
                        self.common_payload.insert(kind.tag().to_string(), projected);
                    }
                }
            }
            self.common_flushed = false;
            return;
        }

        for context in self.contexts.values_mut() {
            context.push_event(event.clone(), None, fragment.clone());
        }
    }

    /// Route a bid-scoped event to its context, creating the context on
    /// first reference. Returns the resolved ortb id.
    ///
    /// # Errors
    ///
    /// Classification, identifier resolution, and seeding failures all
    /// propagate; the caller annotates them into the logs and re-raises.
    pub fn route_to_one(
        &mut self,
        event: DebugEvent,
        payload: &Value,
    ) -> Result<String, Report<AnalyticsError>> {
        let kind = classify(payload)?;
        // Render and error payloads carry the bid under a nested field;
        // pick the correlation sub-object once, centrally, per kind.
        let correlation = match kind {
            PayloadKind::AdDocAndBidResponse | PayloadKind::AdDocAndErrorAndBidResponse => {
                payload.get("bid").unwrap_or(payload)
            }
            _ => payload,
        };

        let ortb_id = resolve_ortb_id(correlation)?;
        if !self.contexts.contains_key(&ortb_id) {
            let context =
                BidContext::seed(correlation, &self.common_events, &self.common_payload)?;
            log::debug!(
                "Auction {}: created bid context {} (imp {})",
                self.auction_id,
                ortb_id,
                context.imp_id()
            );
            self.contexts.insert(ortb_id.clone(), context);
        }

        let correlation_imp = resolve_imp_id(correlation);
        let fragment = project(kind, payload);
        if let Some(context) = self.contexts.get_mut(&ortb_id) {
            context.push_event(event, correlation_imp.as_deref(), Some((kind, fragment)));
        }
        Ok(ortb_id)
    }

    /// One-way win flag for the context owning `ortb_id`.
    pub fn mark_win(&mut self, ortb_id: &str) {
        if let Some(context) = self.contexts.get_mut(ortb_id) {
            context.mark_win();
        } else {
            log::warn!(
                "Auction {}: win recorded for unknown bid {}",
                self.auction_id,
                ortb_id
            );
        }
    }

    /// Fire the loss beacon for every losing context that carries a
    /// loss-notification URL and has not fired yet.
    ///
    /// The fired flag flips immediately, deliberately racing ahead of
    /// network confirmation: the contract is at-most-once firing, not
    /// delivery confirmation. Requests are spawned fire-and-forget; their
    /// handles are awaited collectively at flush time.
    pub fn trigger_pending_loss_beacons(&mut self, transport: &Arc<dyn Transport>) {
        for context in self.contexts.values_mut() {
            if context.bid_win() || context.loss_beacon_fired() {
                continue;
            }
            let Some(raw_url) = context.loss_beacon_url() else {
                continue;
            };
            let raw_url = raw_url.to_string();
            context.mark_loss_beacon_fired();
            context.log_event(DebugEvent::now(EventKind::BidLoss, Severity::Info, None));

            let url = match Url::parse(&raw_url) {
                Ok(url) => url,
                Err(err) => {
                    log::warn!(
                        "Auction {}: unparseable loss beacon URL '{}': {}",
                        self.auction_id,
                        raw_url,
                        err
                    );
                    continue;
                }
            };

            let transport = Arc::clone(transport);
            let ortb_id = context.ortb_id().to_string();
            self.pending_beacons.push(tokio::spawn(async move {
                // Best effort: a missed beacon is acceptable, never retried.
                if let Err(err) = transport.fire_pixel(&url).await {
                    log::debug!("Loss beacon for bid {} failed: {:?}", ortb_id, err);
                }
            }));
        }
    }

    /// Submit one consolidated report per unflushed context, plus orphan
    /// reports for auction-wide failures that preceded any bid.
    ///
    /// All submissions launch concurrently and the call resolves only once
    /// every one of them (and every pending loss beacon) has settled; a
    /// single report's transport failure never blocks or fails the others.
    /// Idempotent: already-flushed contexts and already-flushed common
    /// state are skipped.
    pub async fn flush(&mut self, transport: &Arc<dyn Transport>, debug_url: &Url) {
        let mut bodies = Vec::new();

        for context in self.contexts.values_mut() {
            if context.flushed() {
                continue;
            }
            context.mark_flushed();
            bodies.push(context.report_body());
        }

        if self.contexts.is_empty()
            && !self.common_flushed
            && self.common_events.has_warning_or_error()
        {
            // Auction-wide failure before any bid response: attribute the
            // common state to every known ad-slot bid request.
            self.common_flushed = true;
            for (imp_id, request) in &self.bidder_requests {
                let mut body = Map::new();
                body.insert("impid".to_string(), Value::String(imp_id.clone()));
                body.insert(
                    "events".to_string(),
                    serde_json::to_value(&self.common_events)
                        .unwrap_or_else(|_| Value::Array(Vec::new())),
                );
                for (tag, fragment) in &self.common_payload {
                    body.insert(tag.clone(), fragment.clone());
                }
                body.insert(PayloadKind::BidRequest.tag().to_string(), request.clone());
                bodies.push(Value::Object(body));
            }
        }

        log::info!(
            "Auction {}: flushing {} debug report(s) to {}",
            self.auction_id,
            bodies.len(),
            debug_url
        );

        let submissions = bodies.iter().map(|body| async move {
            if let Err(err) = transport.post_debug_report(debug_url, body).await {
                log::warn!(
                    "Debug report submission failed (siblings unaffected): {:?}",
                    err
                );
            }
        });
        join_all(submissions).await;

        for handle in self.pending_beacons.drain(..) {
            if let Err(err) = handle.await {
                log::debug!("Loss beacon task failed to join: {}", err);
            }
        }
    }

    /// Convert a routing failure into a synthetic error event attached to
    /// every known (or common) log. The original error stays with the
    /// caller; this subsystem only annotates, never swallows.
    pub fn annotate_routing_error(
        &mut self,
        event_type: EventType,
        payload: &Value,
        error: &Report<AnalyticsError>,
    ) {
        let event = DebugEvent::now(
            EventKind::ErrorIn(event_type),
            Severity::Error,
            Some(error.to_string()),
        );
        let fragment = serde_json::json!({
            "error": error.to_string(),
            "payload": redacted_dump(payload),
        });
        self.route_to_all(event, Some((PayloadKind::ErrorArgs, fragment)));
    }
}
