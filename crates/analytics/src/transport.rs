//! Network boundary for the collector and the ad server's loss beacon.
//!
//! The HTTP primitives themselves belong to the host environment; this
//! crate only defines the seam. Debug reports are JSON POSTs, loss
//! beacons are body-less best-effort GETs.

use async_trait::async_trait;
use error_stack::Report;
use serde_json::Value;
use url::Url;

use crate::error::AnalyticsError;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Submit one consolidated debug report to the collector.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::Transport`] on submission failure; the
    /// caller isolates failures per report.
    async fn post_debug_report(
        &self,
        url: &Url,
        body: &Value,
    ) -> Result<(), Report<AnalyticsError>>;

    /// Fire a tracking-pixel style GET. Response content is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::Transport`] on failure; callers treat a
    /// missed beacon as acceptable and never retry.
    async fn fire_pixel(&self, url: &Url) -> Result<(), Report<AnalyticsError>>;
}
