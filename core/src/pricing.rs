//! Rental and fine calculation.
//!
//! Both amounts count calendar days inclusively: a loan from April 1st to
//! April 8th is billed for eight days, and a book due on April 8th returned on
//! April 10th is fined for three.

use crate::error::LendingError;
use crate::types::{Borrowing, Money};
use chrono::NaiveDate;

/// Fines charge this many times the daily fee.
pub const FINE_MULTIPLIER: u64 = 2;

/// Inclusive day count between two dates, never less than one.
fn inclusive_days(from: NaiveDate, to: NaiveDate) -> u64 {
    let days = (to - from).num_days().saturating_add(1);
    u64::try_from(days).unwrap_or(0).max(1)
}

fn overflow(what: &str) -> LendingError {
    LendingError::InvalidDate(format!("{what} exceeds the representable amount"))
}

/// Days billed for the loan period.
#[must_use]
pub fn rental_days(borrowing: &Borrowing) -> u64 {
    inclusive_days(borrowing.borrow_date.date_naive(), borrowing.expected_return_date)
}

/// Days billed as overdue when returning on `today`.
#[must_use]
pub fn overdue_days(borrowing: &Borrowing, today: NaiveDate) -> u64 {
    inclusive_days(borrowing.expected_return_date, today)
}

/// Rental fee for the whole loan period.
///
/// # Errors
///
/// Returns [`LendingError::InvalidDate`] if the amount overflows.
pub fn rental_amount(borrowing: &Borrowing, daily_fee: Money) -> Result<Money, LendingError> {
    daily_fee
        .checked_mul(rental_days(borrowing))
        .ok_or_else(|| overflow("rental"))
}

/// Fine for returning the book on `today`.
///
/// # Errors
///
/// - [`LendingError::NotOverdue`] if `today` is on or before the expected return date
/// - [`LendingError::InvalidDate`] if the amount overflows
pub fn fine_amount(
    borrowing: &Borrowing,
    daily_fee: Money,
    today: NaiveDate,
) -> Result<Money, LendingError> {
    if today <= borrowing.expected_return_date {
        return Err(LendingError::NotOverdue(borrowing.id));
    }

    daily_fee
        .checked_mul(overdue_days(borrowing, today))
        .and_then(|amount| amount.checked_mul(FINE_MULTIPLIER))
        .ok_or_else(|| overflow("fine"))
}
