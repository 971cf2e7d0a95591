//! Borrower and staff notifications.
//!
//! Notifications are fire-and-forget: reducers emit them as effects and the
//! runtime hands them to a background dispatcher. A failed delivery is logged
//! and never affects the operation that triggered it.

use crate::types::{Borrowing, UserId};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Who receives a notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Recipient {
    /// A single borrower
    User {
        /// User ID
        user_id: UserId,
        /// Contact address
        email: String,
    },
    /// The shared staff channel
    Staff,
}

/// A message for one recipient.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    /// Who receives it
    pub recipient: Recipient,
    /// Message text
    pub text: String,
}

impl Notification {
    /// Confirmation sent when a borrowing is created
    #[must_use]
    pub fn borrowed(email: &str, borrowing: &Borrowing, title: &str) -> Self {
        Self {
            recipient: Recipient::User {
                user_id: borrowing.user_id,
                email: email.to_string(),
            },
            text: format!(
                "You have successfully borrowed {title}. Expected return date: {}",
                borrowing.expected_return_date
            ),
        }
    }

    /// Reminder sent by the overdue sweep
    #[must_use]
    pub fn overdue(email: &str, borrowing: &Borrowing, title: &str) -> Self {
        Self {
            recipient: Recipient::User {
                user_id: borrowing.user_id,
                email: email.to_string(),
            },
            text: format!("Your borrowing of {title} is overdue!"),
        }
    }

    /// Staff message when a sweep finds nothing
    #[must_use]
    pub fn no_overdue() -> Self {
        Self {
            recipient: Recipient::Staff,
            text: "No overdue borrowings for today!".to_string(),
        }
    }
}

/// Notification delivery error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Notification delivery failed: {0}")]
pub struct NotifyError(pub String);

/// Notification transport
pub trait Notifier: Send + Sync {
    /// Deliver one notification
    fn send(
        &self,
        notification: Notification,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + '_>>;
}
