//! Prometheus metrics for the entity lifecycle.
//!
//! Labels are limited to fixed vocabularies (outcome, notification kind)
//! so entity and actor ids never become label values.

use std::sync::atomic::{AtomicBool, Ordering};

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::RafflerError;

static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// How a finalize ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeKind {
    /// Standalone giveaway drew its winners
    Winners,
    /// A chain phase produced qualifiers for the next phase
    Advanced,
    /// The last phase of a chain (or a chain with no qualifiers left) ended
    ChainCompleted,
}

impl FinalizeKind {
    const fn label(self) -> &'static str {
        match self {
            Self::Winners => "winners",
            Self::Advanced => "advanced",
            Self::ChainCompleted => "chain_completed",
        }
    }
}

/// Installs the global recorder.
///
/// With `Some(port)` a Prometheus scrape endpoint is served on
/// `127.0.0.1:<port>`; with `None` metrics are recorded but not exposed.
///
/// # Errors
///
/// Returns `RafflerError::Io` if the recorder or listener cannot be
/// installed (e.g. port already in use).
pub fn init_metrics(port: Option<u16>) -> Result<(), RafflerError> {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        tracing::debug!("metrics already initialized, skipping");
        return Ok(());
    }
    port.map_or_else(
        || PrometheusBuilder::new().install_recorder().map(|_| ()),
        |p| {
            PrometheusBuilder::new()
                .with_http_listener(([127, 0, 0, 1], p))
                .install()
        },
    )
    .map_err(|e| RafflerError::Io(std::io::Error::other(e.to_string())))?;

    describe_metrics();
    Ok(())
}

fn describe_metrics() {
    describe_counter!(
        "raffler_entities_created_total",
        "Entities created (giveaways and chain phases)"
    );
    describe_counter!(
        "raffler_entities_finalized_total",
        "Entities finalized, by outcome"
    );
    describe_counter!(
        "raffler_entities_cancelled_total",
        "Entities cancelled before their deadline"
    );
    describe_gauge!("raffler_live_entities", "Entities with an armed timer");
    describe_counter!(
        "raffler_notify_failures_total",
        "Notifications that failed after the transition committed"
    );
    describe_counter!(
        "raffler_rate_limited_total",
        "Join or leave attempts rejected by the cooldown"
    );
}

/// Records a created entity.
pub fn record_created() {
    counter!("raffler_entities_created_total").increment(1);
}

/// Records a finalized entity.
pub fn record_finalized(outcome: FinalizeKind) {
    counter!("raffler_entities_finalized_total", "outcome" => outcome.label()).increment(1);
}

/// Records a cancelled entity.
pub fn record_cancelled() {
    counter!("raffler_entities_cancelled_total").increment(1);
}

/// Sets the number of entities with a live timer.
#[allow(clippy::cast_precision_loss)]
pub fn set_live_entities(count: usize) {
    gauge!("raffler_live_entities").set(count as f64);
}

/// Records a failed notification of the given kind.
pub fn record_notify_failure(kind: &'static str) {
    counter!("raffler_notify_failures_total", "kind" => kind).increment(1);
}

/// Records a throttled join or leave.
pub fn record_rate_limited() {
    counter!("raffler_rate_limited_total").increment(1);
}
