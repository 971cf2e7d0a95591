//! # Lending Runtime
//!
//! The imperative shell around the lending reducers.
//!
//! ## Core Components
//!
//! - **`LendingService`**: loads state, runs the reducer, commits units of work
//!   and awaits checkout futures
//! - **`NotificationDispatcher`**: bounded queue drained by a background task
//! - **`OverdueSweeper`**: periodic overdue reminders
//! - **Checkout clients**: Stripe over HTTP, plus a local development gateway
//! - **Notifiers**: a Telegram chat, or the log when no bot is configured
//!
//! ## Example
//!
//! ```ignore
//! use lending_runtime::{LendingService, LogNotifier, NotificationDispatcher};
//!
//! let (notifications, _task) = NotificationDispatcher::spawn(Arc::new(LogNotifier), 256);
//! let service = LendingService::new(store, environment, notifications);
//!
//! let (borrowing, payment) = service
//!     .create_borrowing(user_id, book_id, expected_return_date)
//!     .await?;
//! // Redirect the borrower to payment.session_url
//! ```

/// Development checkout gateway
pub mod checkout;

/// Prometheus metrics for observability
pub mod metrics;

/// Background notification delivery
pub mod notify;

/// Retry logic with exponential backoff
pub mod retry;

/// Lending operations
pub mod service;

/// Stripe Checkout client
pub mod stripe;

/// Periodic overdue sweep
pub mod sweep;

/// Telegram notifier
pub mod telegram;

pub use checkout::DevCheckoutGateway;
pub use notify::{LogNotifier, NotificationDispatcher};
pub use service::{LendingService, PaymentSettlement, ReturnOutcome};
pub use stripe::{StripeCheckoutGateway, StripeConfig};
pub use sweep::OverdueSweeper;
pub use telegram::{TelegramConfig, TelegramNotifier};
