//! Prometheus metrics for the lending service.
//!
//! Counters cover the loan lifecycle, notification delivery and checkout
//! retries:
//! - Borrowings created, returns completed
//! - Fine sessions opened, payments settled
//! - Notifications sent and dropped, overdue reminders queued
//!
//! # Example
//!
//! ```rust,no_run
//! use lending_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Serve `server.render()` from the metrics listener
//! # Ok(())
//! # }
//! ```

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Borrowings committed.
pub const BORROWINGS_CREATED: &str = "lending_borrowings_created_total";
/// Returns committed, on time or through a paid fine.
pub const RETURNS_COMPLETED: &str = "lending_returns_total";
/// Fine checkout sessions opened.
pub const FINES_OPENED: &str = "lending_fines_opened_total";
/// Payments marked paid.
pub const PAYMENTS_PAID: &str = "lending_payments_paid_total";
/// Notifications delivered to the notifier.
pub const NOTIFICATIONS_SENT: &str = "lending_notifications_sent_total";
/// Notifications dropped on a full queue or a failed delivery.
pub const NOTIFICATIONS_DROPPED: &str = "lending_notifications_dropped_total";
/// Overdue reminders queued by a sweep.
pub const OVERDUE_NOTIFIED: &str = "lending_overdue_notified_total";
/// Checkout calls retried after a transient failure.
pub const CHECKOUT_RETRIES: &str = "lending_checkout_retries_total";
/// Time spent in one service operation.
pub const OPERATION_DURATION: &str = "lending_operation_duration_seconds";

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus recorder plus the address its scrape endpoint is served on.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address the scrape endpoint binds to (e.g., `0.0.0.0:9090`)
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Address the scrape endpoint should bind to.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Install the global Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// A second installation in the same process is logged and ignored, so
    /// `render` then returns `None` for this instance.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(addr = %self.addr, "Metrics recorder installed");
                Ok(())
            },
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            },
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if the recorder hasn't been installed by this instance.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn register_metrics() {
    describe_counter!(BORROWINGS_CREATED, "Total number of borrowings created");
    describe_counter!(RETURNS_COMPLETED, "Total number of books returned");
    describe_counter!(FINES_OPENED, "Total number of fine checkout sessions opened");
    describe_counter!(PAYMENTS_PAID, "Total number of payments marked paid");
    describe_counter!(
        NOTIFICATIONS_SENT,
        "Total number of notifications handed to the notifier"
    );
    describe_counter!(
        NOTIFICATIONS_DROPPED,
        "Total number of notifications dropped"
    );
    describe_counter!(OVERDUE_NOTIFIED, "Total number of overdue reminders queued");
    describe_counter!(
        CHECKOUT_RETRIES,
        "Total number of checkout calls retried after a transient failure"
    );
    describe_histogram!(OPERATION_DURATION, "Time taken by a lending operation");
}

/// Recording helpers for the lending counters.
///
/// All methods are no-ops when no recorder is installed.
pub struct LendingMetrics;

impl LendingMetrics {
    /// Record a committed borrowing.
    pub fn record_borrowing_created() {
        counter!(BORROWINGS_CREATED).increment(1);
    }

    /// Record a committed return.
    pub fn record_return() {
        counter!(RETURNS_COMPLETED).increment(1);
    }

    /// Record a fine session that was persisted.
    pub fn record_fine_opened() {
        counter!(FINES_OPENED).increment(1);
    }

    /// Record a payment marked paid.
    pub fn record_payment_paid() {
        counter!(PAYMENTS_PAID).increment(1);
    }

    /// Record a delivered notification.
    pub fn record_notification_sent() {
        counter!(NOTIFICATIONS_SENT).increment(1);
    }

    /// Record a dropped notification.
    pub fn record_notification_dropped(reason: &'static str) {
        counter!(NOTIFICATIONS_DROPPED, "reason" => reason).increment(1);
    }

    /// Record overdue reminders queued by one sweep.
    pub fn record_overdue_notified(count: u64) {
        counter!(OVERDUE_NOTIFIED).increment(count);
    }

    /// Record a checkout retry.
    pub fn record_retry() {
        counter!(CHECKOUT_RETRIES).increment(1);
    }

    /// Record how long an operation took.
    pub fn record_operation(operation: &'static str, duration: Duration) {
        histogram!(OPERATION_DURATION, "operation" => operation).record(duration.as_secs_f64());
    }
}
