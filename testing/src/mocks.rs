//! Mock implementations of environment traits.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Test utilities document panics where critical

use chrono::{DateTime, Duration, Utc};
use lending_core::checkout::{
    CheckoutError, CheckoutFuture, CheckoutGateway, CheckoutRequest, CheckoutSession,
};
use lending_core::environment::Clock;
use lending_core::notification::{Notification, Notifier, NotifyError};
use lending_core::types::Money;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, RwLock};

/// Fixed clock for deterministic tests
///
/// Returns the same time until moved with [`FixedClock::set`] or
/// [`FixedClock::advance`]. Clones share the same time.
///
/// # Example
///
/// ```
/// use lending_testing::mocks::FixedClock;
/// use lending_core::environment::Clock;
/// use chrono::{Duration, Utc};
///
/// let clock = FixedClock::new(Utc::now());
/// let before = clock.now();
/// clock.advance(Duration::days(1));
/// assert_eq!(clock.now() - before, Duration::days(1));
/// ```
#[derive(Debug, Clone)]
pub struct FixedClock {
    time: Arc<RwLock<DateTime<Utc>>>,
}

impl FixedClock {
    /// Create a new fixed clock with the given time
    #[must_use]
    pub fn new(time: DateTime<Utc>) -> Self {
        Self {
            time: Arc::new(RwLock::new(time)),
        }
    }

    /// Move the clock to `time`
    pub fn set(&self, time: DateTime<Utc>) {
        *self.time.write().unwrap() = time;
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        let mut time = self.time.write().unwrap();
        *time += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.time.read().unwrap()
    }
}

/// Create a default fixed clock for tests (2024-04-01 09:00:00 UTC)
#[must_use]
pub fn test_clock() -> FixedClock {
    FixedClock::new(crate::fixtures::at(2024, 4, 1))
}

#[derive(Debug, Default)]
struct GatewayState {
    script: VecDeque<Result<(), CheckoutError>>,
    requests: Vec<CheckoutRequest>,
    opened: u32,
}

/// Checkout gateway with scripted failures.
///
/// Every call succeeds unless a failure was queued with
/// [`ScriptedCheckoutGateway::fail_next`]. Sessions are numbered
/// `cs_test_1`, `cs_test_2`, ... and charge `unit_amount * quantity`.
#[derive(Clone, Debug, Default)]
pub struct ScriptedCheckoutGateway {
    state: Arc<Mutex<GatewayState>>,
}

impl ScriptedCheckoutGateway {
    /// Creates a gateway that always succeeds
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a failure for the next call
    pub fn fail_next(&self, error: CheckoutError) {
        self.state.lock().unwrap().script.push_back(Err(error));
    }

    /// Every request received so far
    #[must_use]
    pub fn requests(&self) -> Vec<CheckoutRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    /// Number of sessions opened successfully
    #[must_use]
    pub fn sessions_opened(&self) -> u32 {
        self.state.lock().unwrap().opened
    }
}

impl CheckoutGateway for ScriptedCheckoutGateway {
    fn open_session(&self, request: CheckoutRequest) -> CheckoutFuture {
        let outcome = {
            let mut state = self.state.lock().unwrap();
            state.requests.push(request.clone());
            match state.script.pop_front().unwrap_or(Ok(())) {
                Ok(()) => {
                    state.opened += 1;
                    let session_id = format!("cs_test_{}", state.opened);
                    Ok(CheckoutSession {
                        url: format!("https://checkout.test/pay/{session_id}"),
                        session_id,
                        amount_total: Money::from_cents(
                            request.unit_amount.cents() * u64::from(request.quantity),
                        ),
                    })
                },
                Err(error) => Err(error),
            }
        };

        Box::pin(async move { outcome })
    }
}

/// Notifier that records every delivery.
#[derive(Clone, Debug, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
    failing: Arc<RwLock<bool>>,
    delivered: Arc<tokio::sync::Notify>,
}

impl RecordingNotifier {
    /// Creates a notifier that accepts everything
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following delivery fail
    pub fn fail_all(&self, failing: bool) {
        *self.failing.write().unwrap() = failing;
    }

    /// Notifications delivered so far
    #[must_use]
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }

    /// Wait until at least `count` notifications were delivered, up to one second.
    pub async fn wait_for(&self, count: usize) -> Vec<Notification> {
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(1);
        loop {
            let notified = self.delivered.notified();
            let sent = self.sent();
            if sent.len() >= count {
                return sent;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.sent();
            }
        }
    }
}

impl Notifier for RecordingNotifier {
    fn send(
        &self,
        notification: Notification,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + '_>> {
        Box::pin(async move {
            if *self.failing.read().unwrap() {
                return Err(NotifyError("recording notifier set to fail".to_string()));
            }
            self.sent.lock().unwrap().push(notification);
            self.delivered.notify_waiters();
            Ok(())
        })
    }
}
