//! Adapter entry point: activation and per-event dispatch.
//!
//! The host framework delivers lifecycle events through one sequential
//! callback; the adapter owns the current auction's scope and replaces it
//! wholesale on every auction-init. Routing errors are annotated into the
//! event logs and then re-raised so the host's own per-event error
//! handling still fires.

use std::sync::Arc;

use error_stack::{Report, ResultExt};
use serde_json::Value;
use url::Url;
use validator::Validate;

use crate::coordinator::AuctionScope;
use crate::error::AnalyticsError;
use crate::events::{DebugEvent, EventKind, EventType, Severity};
use crate::payload::{classify, PayloadKind};
use crate::projection::project;
use crate::settings::Settings;
use crate::transport::Transport;

pub struct AnalyticsAdapter {
    publisher_id: String,
    debug_url: Url,
    transport: Arc<dyn Transport>,
    scope: Option<AuctionScope>,
}

impl AnalyticsAdapter {
    /// Activate the adapter.
    ///
    /// Missing or invalid configuration aborts activation with a logged
    /// error; the caller gets no adapter and no events are ever processed.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::Config`] when validation fails or the
    /// endpoint cannot be turned into a collector URL.
    pub fn enable(
        settings: &Settings,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, Report<AnalyticsError>> {
        if let Err(errors) = settings.validate() {
            log::error!("Analytics adapter not activated: {errors}");
            return Err(Report::new(AnalyticsError::Config {
                message: errors.to_string(),
            }));
        }

        let base = settings.collector.endpoint.trim_end_matches('/');
        let debug_url =
            Url::parse(&format!("{base}/debug")).change_context(AnalyticsError::Config {
                message: format!("cannot derive collector URL from '{base}'"),
            })?;

        log::info!(
            "Analytics adapter enabled for publisher {} (collector {})",
            settings.collector.publisher_id,
            debug_url
        );

        Ok(Self {
            publisher_id: settings.collector.publisher_id.clone(),
            debug_url,
            transport,
            scope: None,
        })
    }

    pub fn publisher_id(&self) -> &str {
        &self.publisher_id
    }

    /// Current auction's scope, if an auction is in flight.
    pub fn scope(&self) -> Option<&AuctionScope> {
        self.scope.as_ref()
    }

    /// Handle one lifecycle event.
    ///
    /// # Errors
    ///
    /// Routing failures (classification, identifier resolution, context
    /// seeding) are annotated as a synthetic error event in every known
    /// log and then re-raised; they never stop subsequent events from
    /// being processed.
    pub async fn on_event(
        &mut self,
        event_type: EventType,
        payload: &Value,
    ) -> Result<(), Report<AnalyticsError>> {
        let result = self.dispatch(event_type, payload).await;
        if let Err(ref error) = result {
            log::warn!("Error while processing '{event_type}': {error}");
            if let Some(scope) = self.scope.as_mut() {
                scope.annotate_routing_error(event_type, payload, error);
            }
        }
        result
    }

    async fn dispatch(
        &mut self,
        event_type: EventType,
        payload: &Value,
    ) -> Result<(), Report<AnalyticsError>> {
        if event_type == EventType::AuctionInit {
            // Replace the previous scope wholesale. Beacons or flushes
            // still in flight for it run to completion against the stale
            // state; at worst that yields a late report, never corruption.
            let mut scope = AuctionScope::initialise(payload)?;
            scope.route_to_all(
                DebugEvent::now(
                    EventKind::Lifecycle(event_type),
                    severity_for(event_type),
                    None,
                ),
                Some((PayloadKind::Auction, project(PayloadKind::Auction, payload))),
            );
            self.scope = Some(scope);
            return Ok(());
        }

        let Some(scope) = self.scope.as_mut() else {
            log::warn!("Dropping '{event_type}' event: no auction in flight");
            return Ok(());
        };

        let event = DebugEvent::now(
            EventKind::Lifecycle(event_type),
            severity_for(event_type),
            None,
        );

        match event_type {
            EventType::BidResponse
            | EventType::NoBid
            | EventType::BidRejected
            | EventType::AdRenderSucceeded
            | EventType::AdRenderFailed => {
                scope.route_to_one(event, payload)?;
            }
            EventType::BidWon => {
                let ortb_id = scope.route_to_one(event, payload)?;
                scope.mark_win(&ortb_id);
            }
            EventType::AuctionEnd
            | EventType::AuctionTimeout
            | EventType::BidTimeout
            | EventType::SeatNonBid
            | EventType::BidderError => {
                scope.route_to_all(event, broadcast_fragment(payload));
            }
            EventType::BidderDone => {
                scope.route_to_all(event, None);
                scope.trigger_pending_loss_beacons(&self.transport);
                scope.flush(&self.transport, &self.debug_url).await;
            }
            EventType::AuctionInit => {} // handled above
        }
        Ok(())
    }
}

/// Severity assigned to each lifecycle event when logged.
fn severity_for(event_type: EventType) -> Severity {
    match event_type {
        EventType::AuctionTimeout | EventType::NoBid | EventType::BidTimeout => Severity::Warn,
        EventType::BidRejected | EventType::BidderError | EventType::AdRenderFailed => {
            Severity::Error
        }
        _ => Severity::Info,
    }
}

/// Fragment for auction-wide routing. An unrecognized shape is wrapped
/// under the generic key rather than dropped or treated as an error:
/// broadcast events tolerate any payload.
fn broadcast_fragment(payload: &Value) -> Option<(PayloadKind, Value)> {
    let kind = classify(payload).unwrap_or(PayloadKind::Unknown);
    Some((kind, project(kind, payload)))
}
