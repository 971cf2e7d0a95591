//! # Lending Testing
//!
//! Testing utilities and helpers for the lending service.
//!
//! This crate provides:
//! - A controllable [`FixedClock`]
//! - In-memory implementations of the store, checkout gateway and notifier
//! - The Given-When-Then [`ReducerTest`] harness and effect assertions
//! - Fixtures and proptest strategies for domain types
//!
//! ## Example
//!
//! ```ignore
//! use lending_testing::{fixtures, InMemoryLendingStore, ScriptedCheckoutGateway};
//!
//! #[tokio::test]
//! async fn test_borrow_flow() {
//!     let store = InMemoryLendingStore::new();
//!     let book = fixtures::book("Dune", 1, 1000);
//!     store.seed_book(book.clone());
//!     // build a LendingService around the store and borrow the book
//! }
//! ```

pub mod memory_store;
pub mod mocks;
pub mod reducer_test;

pub use memory_store::InMemoryLendingStore;
pub use mocks::{FixedClock, RecordingNotifier, ScriptedCheckoutGateway, test_clock};
pub use reducer_test::{ReducerTest, assertions, run_to_completion};

/// Test data builders.
pub mod fixtures {
    #![allow(clippy::unwrap_used)] // Fixture dates are hardcoded
    #![allow(clippy::missing_panics_doc)]

    use chrono::{DateTime, NaiveDate, TimeZone, Utc};
    use lending_core::types::{Book, BookId, CoverType, Money, User, UserId};

    /// Calendar date
    #[must_use]
    pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    /// 09:00 UTC on the given day
    #[must_use]
    pub fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 9, 0, 0).unwrap()
    }

    /// Hardcover book with the given stock and daily fee in cents
    #[must_use]
    pub fn book(title: &str, inventory: u32, daily_fee_cents: u64) -> Book {
        Book {
            id: BookId::new(),
            title: title.to_string(),
            author: "Test Author".to_string(),
            cover: CoverType::Hardcover,
            inventory,
            daily_fee: Money::from_cents(daily_fee_cents),
        }
    }

    /// Regular user
    #[must_use]
    pub fn user(email: &str) -> User {
        User::new(UserId::new(), email, at(2024, 1, 1))
    }

    /// Staff user
    #[must_use]
    pub fn staff(email: &str) -> User {
        User {
            is_staff: true,
            ..user(email)
        }
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use lending_core::types::Money;
    use proptest::prelude::*;

    /// Amounts from zero to one million currency units
    pub fn money() -> impl Strategy<Value = Money> {
        (0u64..100_000_000).prop_map(Money::from_cents)
    }

    /// Loan lengths in days, one day to ten years
    pub fn loan_days() -> impl Strategy<Value = i64> {
        1i64..3650
    }

    /// Borrow (`true`) / return (`false`) request sequences
    pub fn loan_requests(max_len: usize) -> impl Strategy<Value = Vec<bool>> {
        proptest::collection::vec(any::<bool>(), 0..max_len)
    }
}

/// Installs a test tracing subscriber honouring `RUST_LOG`.
///
/// Safe to call from several tests; only the first call installs it.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
