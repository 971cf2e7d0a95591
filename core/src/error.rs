//! Error taxonomy for lending operations.

use crate::types::{BookId, BorrowingId, PaymentId, UserId};
use thiserror::Error;

/// Errors returned by the borrowing and payment workflows.
///
/// Every variant except [`LendingError::PaymentProviderError`] and
/// [`LendingError::Storage`] is a rejected request that leaves state untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LendingError {
    /// The book has no copies left to lend
    #[error("No copies of book {0} are available")]
    InventoryExhausted(BookId),

    /// A date is out of order or outside the representable range
    #[error("Invalid date: {0}")]
    InvalidDate(String),

    /// The borrowing already has a return date
    #[error("Borrowing {0} has already been returned")]
    AlreadyReturned(BorrowingId),

    /// A fine was requested for a borrowing that is not late
    #[error("Borrowing {0} is not overdue")]
    NotOverdue(BorrowingId),

    /// The checkout provider failed or timed out
    #[error("Payment provider error: {0}")]
    PaymentProviderError(String),

    /// No payment with this id
    #[error("Payment {0} not found")]
    PaymentNotFound(PaymentId),

    /// The payment has already been collected
    #[error("Payment {0} has already been paid")]
    AlreadyPaid(PaymentId),

    /// No book with this id
    #[error("Book {0} not found")]
    BookNotFound(BookId),

    /// No borrowing with this id
    #[error("Borrowing {0} not found")]
    BorrowingNotFound(BorrowingId),

    /// No user with this id
    #[error("User {0} not found")]
    UserNotFound(UserId),

    /// Another fine for this borrowing is still awaiting payment
    #[error("Borrowing {0} already has a pending fine")]
    FinePending(BorrowingId),

    /// The callback's session id does not belong to the payment
    #[error("Checkout session does not match payment {0}")]
    SessionMismatch(PaymentId),

    /// The store failed to load or persist data
    #[error("Storage error: {0}")]
    Storage(String),
}

impl LendingError {
    /// Stable machine-readable code for API responses
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InventoryExhausted(_) => "inventory_exhausted",
            Self::InvalidDate(_) => "invalid_date",
            Self::AlreadyReturned(_) => "already_returned",
            Self::NotOverdue(_) => "not_overdue",
            Self::PaymentProviderError(_) => "payment_provider_error",
            Self::PaymentNotFound(_) => "payment_not_found",
            Self::AlreadyPaid(_) => "already_paid",
            Self::BookNotFound(_) => "book_not_found",
            Self::BorrowingNotFound(_) => "borrowing_not_found",
            Self::UserNotFound(_) => "user_not_found",
            Self::FinePending(_) => "fine_pending",
            Self::SessionMismatch(_) => "session_mismatch",
            Self::Storage(_) => "storage_error",
        }
    }
}
