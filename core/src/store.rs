//! Storage abstraction for the lending service.
//!
//! Reads are plain queries. Writes go through [`LendingStore::commit`], which
//! applies a whole unit of work ([`Change`] list) in one transaction. Changes
//! that can race carry a guard: if the guard fails the unit is rolled back and
//! [`StoreError::GuardFailed`] names it.
//!
//! # Implementations
//!
//! - `PostgresLendingStore` (in `lending-postgres`): production implementation
//! - `InMemoryLendingStore` (in `lending-testing`): fast, deterministic testing

use crate::error::LendingError;
use crate::types::{
    Book, BookId, Borrowing, BorrowingId, Payment, PaymentId, User, UserId,
};
use chrono::NaiveDate;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// A single row mutation inside a unit of work.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Change {
    /// Insert a new borrowing
    InsertBorrowing(Borrowing),
    /// Add `delta` to a book's inventory
    ///
    /// Guarded: the result must stay non-negative.
    AdjustInventory {
        /// Book to adjust
        book_id: BookId,
        /// Signed change in available copies
        delta: i32,
    },
    /// Set the actual return date
    ///
    /// Guarded: the borrowing must not be returned yet.
    MarkReturned {
        /// Borrowing to close
        borrowing_id: BorrowingId,
        /// Day of the return
        returned_on: NaiveDate,
    },
    /// Insert a new pending payment
    ///
    /// Guarded for fines: the borrowing must not have another pending fine.
    InsertPayment(Payment),
    /// Set status to paid and zero the outstanding amount
    ///
    /// Guarded: the payment must still be pending.
    MarkPaid {
        /// Payment to settle
        payment_id: PaymentId,
    },
}

/// Condition a guarded [`Change`] requires at commit time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Guard {
    /// Inventory would go negative
    InventoryAvailable(BookId),
    /// Borrowing already has a return date
    NotReturned(BorrowingId),
    /// Payment is no longer pending
    PaymentPending(PaymentId),
    /// Borrowing already has a pending fine
    NoPendingFine(BorrowingId),
}

impl From<Guard> for LendingError {
    fn from(guard: Guard) -> Self {
        match guard {
            Guard::InventoryAvailable(book_id) => Self::InventoryExhausted(book_id),
            Guard::NotReturned(borrowing_id) => Self::AlreadyReturned(borrowing_id),
            Guard::PaymentPending(payment_id) => Self::AlreadyPaid(payment_id),
            Guard::NoPendingFine(borrowing_id) => Self::FinePending(borrowing_id),
        }
    }
}

/// Errors that can occur during store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A guarded change found the row in the wrong state; nothing was applied.
    #[error("Guard failed: {0:?}")]
    GuardFailed(Guard),

    /// Unique or foreign-key constraint violation.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Database connection or query error.
    #[error("Database error: {0}")]
    Database(String),
}

impl From<StoreError> for LendingError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::GuardFailed(guard) => guard.into(),
            other => Self::Storage(other.to_string()),
        }
    }
}

/// Book list filter.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BookFilter {
    /// Case-insensitive substring of the title
    pub title: Option<String>,
}

/// Borrowing list filter.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BorrowingFilter {
    /// Only borrowings of this user
    pub user_id: Option<UserId>,
    /// `Some(true)`: not returned yet, `Some(false)`: returned
    pub is_active: Option<bool>,
}

/// Payment list filter.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PaymentFilter {
    /// Only payments for borrowings of this user
    pub user_id: Option<UserId>,
}

/// Row returned by the overdue scan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OverdueBorrowing {
    /// The late borrowing
    pub borrowing: Borrowing,
    /// Title of the borrowed book
    pub book_title: String,
    /// Borrower's email
    pub user_email: String,
}

/// Persistence for users, books, borrowings and payments.
///
/// Lookups return `Ok(None)` for missing rows; callers decide which
/// not-found error applies.
pub trait LendingStore: Send + Sync {
    /// Insert a user. Fails with [`StoreError::Conflict`] on a duplicate email.
    fn insert_user(&self, user: User) -> StoreFuture<'_, ()>;

    /// Load a user by id
    fn user(&self, id: UserId) -> StoreFuture<'_, Option<User>>;

    /// Insert a book
    fn insert_book(&self, book: Book) -> StoreFuture<'_, ()>;

    /// Replace a book's catalog fields. Returns `false` if the book does not exist.
    fn update_book(&self, book: Book) -> StoreFuture<'_, bool>;

    /// Delete a book. Returns `false` if it does not exist; fails with
    /// [`StoreError::Conflict`] while borrowings reference it.
    fn delete_book(&self, id: BookId) -> StoreFuture<'_, bool>;

    /// Load a book by id
    fn book(&self, id: BookId) -> StoreFuture<'_, Option<Book>>;

    /// List books ordered by title
    fn list_books(&self, filter: BookFilter) -> StoreFuture<'_, Vec<Book>>;

    /// Load a borrowing by id
    fn borrowing(&self, id: BorrowingId) -> StoreFuture<'_, Option<Borrowing>>;

    /// List borrowings, newest first
    fn list_borrowings(&self, filter: BorrowingFilter) -> StoreFuture<'_, Vec<Borrowing>>;

    /// Active borrowings whose expected return date is before `today`
    fn overdue_borrowings(&self, today: NaiveDate) -> StoreFuture<'_, Vec<OverdueBorrowing>>;

    /// Load a payment by id
    fn payment(&self, id: PaymentId) -> StoreFuture<'_, Option<Payment>>;

    /// All payments of one borrowing
    fn payments_for(&self, borrowing_id: BorrowingId) -> StoreFuture<'_, Vec<Payment>>;

    /// List payments
    fn list_payments(&self, filter: PaymentFilter) -> StoreFuture<'_, Vec<Payment>>;

    /// Apply a unit of work atomically
    fn commit(&self, changes: Vec<Change>) -> StoreFuture<'_, ()>;

    /// Check connectivity
    fn ping(&self) -> StoreFuture<'_, ()>;
}
