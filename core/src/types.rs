//! Domain types for the lending service.
//!
//! Value objects (identifiers, [`Money`]) and the three persisted records:
//! [`Book`], [`Borrowing`] and [`Payment`], plus the [`User`] directory entry.

use crate::checkout::CheckoutSession;
use crate::error::LendingError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wraps an existing `Uuid`
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

define_id!(
    /// Unique identifier for a book
    BookId
);
define_id!(
    /// Unique identifier for a borrowing
    BorrowingId
);
define_id!(
    /// Unique identifier for a payment
    PaymentId
);
define_id!(
    /// Unique identifier for a user
    UserId
);

// ============================================================================
// Money Value Object (cents-based to avoid floating point errors)
// ============================================================================

/// Amount of money in minor currency units (cents).
///
/// Serialized as a decimal string with two fractional digits (`"80.00"`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(u64);

impl Money {
    /// Zero amount
    pub const ZERO: Self = Self(0);

    /// Creates a `Money` value from cents
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Creates a `Money` value from whole currency units, `None` on overflow
    #[must_use]
    pub const fn checked_from_units(units: u64) -> Option<Self> {
        match units.checked_mul(100) {
            Some(cents) => Some(Self(cents)),
            None => None,
        }
    }

    /// Returns the amount in cents
    #[must_use]
    pub const fn cents(&self) -> u64 {
        self.0
    }

    /// Checks if the amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Multiplies by a whole factor, `None` on overflow
    #[must_use]
    pub const fn checked_mul(self, factor: u64) -> Option<Self> {
        match self.0.checked_mul(factor) {
            Some(cents) => Some(Self(cents)),
            None => None,
        }
    }

    /// Adds two amounts, `None` on overflow
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(cents) => Some(Self(cents)),
            None => None,
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

/// Error returned when a decimal amount cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid money amount: {0:?}")]
pub struct ParseMoneyError(String);

impl FromStr for Money {
    type Err = ParseMoneyError;

    /// Parses `"10"`, `"10.5"` or `"10.50"`. More than two fractional digits,
    /// signs and empty parts are rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseMoneyError(s.to_string());
        let trimmed = s.trim();
        let (units, fraction) = trimmed.split_once('.').unwrap_or((trimmed, ""));

        if units.is_empty() || !units.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        if fraction.len() > 2 || !fraction.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        if trimmed.ends_with('.') {
            return Err(invalid());
        }

        let units: u64 = units.parse().map_err(|_| invalid())?;
        let cents = match fraction.len() {
            0 => 0,
            1 => fraction.parse::<u64>().map_err(|_| invalid())? * 10,
            _ => fraction.parse::<u64>().map_err(|_| invalid())?,
        };

        Self::checked_from_units(units)
            .and_then(|m| m.checked_add(Self(cents)))
            .ok_or_else(invalid)
    }
}

impl Serialize for Money {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(f64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Text(text) => text.parse().map_err(serde::de::Error::custom),
            Raw::Number(number) if number.is_finite() && number >= 0.0 => {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let cents = (number * 100.0).round() as u64;
                Ok(Self(cents))
            }
            Raw::Number(number) => Err(serde::de::Error::custom(format!(
                "invalid money amount: {number}"
            ))),
        }
    }
}

// ============================================================================
// Users
// ============================================================================

/// Directory entry for a library user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User ID
    pub id: UserId,
    /// Email address (unique)
    pub email: String,
    /// Staff users manage the catalog and see every borrowing
    pub is_staff: bool,
    /// Registration time
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Creates a regular (non-staff) user
    #[must_use]
    pub fn new(id: UserId, email: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            email: email.into(),
            is_staff: false,
            created_at,
        }
    }
}

// ============================================================================
// Catalog
// ============================================================================

/// Physical cover of a book.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CoverType {
    /// Hardcover edition
    Hardcover,
    /// Softcover edition
    Softcover,
}

impl CoverType {
    /// Storage representation
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Hardcover => "Hardcover",
            Self::Softcover => "Softcover",
        }
    }
}

impl FromStr for CoverType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Hardcover" | "HARD" => Ok(Self::Hardcover),
            "Softcover" | "SOFT" => Ok(Self::Softcover),
            other => Err(format!("unknown cover type: {other}")),
        }
    }
}

/// A catalog entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    /// Book ID
    pub id: BookId,
    /// Title
    pub title: String,
    /// Author
    pub author: String,
    /// Cover type
    pub cover: CoverType,
    /// Copies currently available to lend
    pub inventory: u32,
    /// Rental fee per day
    pub daily_fee: Money,
}

// ============================================================================
// Borrowings
// ============================================================================

/// One user holding one copy of a book for a period.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Borrowing {
    /// Borrowing ID
    pub id: BorrowingId,
    /// Borrower
    pub user_id: UserId,
    /// Borrowed book
    pub book_id: BookId,
    /// When the loan was created
    pub borrow_date: DateTime<Utc>,
    /// Day the book is due back
    pub expected_return_date: NaiveDate,
    /// Day the return was recorded
    pub actual_return_date: Option<NaiveDate>,
}

impl Borrowing {
    /// Creates an active borrowing.
    ///
    /// # Errors
    ///
    /// Returns [`LendingError::InvalidDate`] unless `expected_return_date` falls
    /// strictly after the day of `borrow_date`.
    pub fn new(
        id: BorrowingId,
        user_id: UserId,
        book_id: BookId,
        borrow_date: DateTime<Utc>,
        expected_return_date: NaiveDate,
    ) -> Result<Self, LendingError> {
        if expected_return_date <= borrow_date.date_naive() {
            return Err(LendingError::InvalidDate(format!(
                "expected return date {expected_return_date} must be after {}",
                borrow_date.date_naive()
            )));
        }

        Ok(Self {
            id,
            user_id,
            book_id,
            borrow_date,
            expected_return_date,
            actual_return_date: None,
        })
    }

    /// The book has not been returned yet
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.actual_return_date.is_none()
    }

    /// Still out after its due day
    #[must_use]
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.is_active() && self.expected_return_date < today
    }

    /// Records the return.
    ///
    /// # Errors
    ///
    /// - [`LendingError::AlreadyReturned`] if a return date is already set
    /// - [`LendingError::InvalidDate`] if `returned_on` precedes the borrow day
    pub fn mark_returned(&mut self, returned_on: NaiveDate) -> Result<(), LendingError> {
        if self.actual_return_date.is_some() {
            return Err(LendingError::AlreadyReturned(self.id));
        }
        if returned_on < self.borrow_date.date_naive() {
            return Err(LendingError::InvalidDate(format!(
                "return date {returned_on} precedes borrow date {}",
                self.borrow_date.date_naive()
            )));
        }
        self.actual_return_date = Some(returned_on);
        Ok(())
    }
}

// ============================================================================
// Payments
// ============================================================================

/// What a payment is for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentKind {
    /// Rental fee charged when the book is borrowed
    Rental,
    /// Penalty for a late return
    Fine,
}

impl PaymentKind {
    /// Storage representation
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Rental => "rental",
            Self::Fine => "fine",
        }
    }
}

impl FromStr for PaymentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rental" => Ok(Self::Rental),
            "fine" => Ok(Self::Fine),
            other => Err(format!("unknown payment kind: {other}")),
        }
    }
}

/// Payment lifecycle: `Pending -> Paid`, never back.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Checkout session opened, money not received yet
    Pending,
    /// Provider confirmed the payment
    Paid,
}

impl PaymentStatus {
    /// Storage representation
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            other => Err(format!("unknown payment status: {other}")),
        }
    }
}

/// A payment collected through an external checkout session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    /// Payment ID
    pub id: PaymentId,
    /// Borrowing this payment belongs to
    pub borrowing_id: BorrowingId,
    /// Rental or fine
    pub kind: PaymentKind,
    /// Pending or paid
    pub status: PaymentStatus,
    /// Provider session identifier
    pub session_id: String,
    /// Hosted checkout page
    pub session_url: String,
    /// Outstanding amount (zero once paid)
    pub money_to_pay: Money,
}

impl Payment {
    /// Whether the payment is still awaiting the provider callback
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == PaymentStatus::Pending
    }

    /// Transitions `Pending -> Paid` and clears the outstanding amount.
    ///
    /// # Errors
    ///
    /// Returns [`LendingError::AlreadyPaid`] if the payment is already paid.
    pub fn mark_paid(&mut self) -> Result<(), LendingError> {
        if self.status == PaymentStatus::Paid {
            return Err(LendingError::AlreadyPaid(self.id));
        }
        self.status = PaymentStatus::Paid;
        self.money_to_pay = Money::ZERO;
        Ok(())
    }
}

// ============================================================================
// Reducer State and Actions
// ============================================================================

/// Rows one lending request works on, loaded by the runtime before reducing.
#[derive(Clone, Debug, Default)]
pub struct LoanState {
    /// The borrower (or the payer, for callbacks)
    pub borrower: Option<User>,
    /// The book being borrowed or returned
    pub book: Option<Book>,
    /// The borrowing, once created or loaded
    pub borrowing: Option<Borrowing>,
    /// Payments of the borrowing
    pub payments: Vec<Payment>,
    /// Result of the last completed action
    pub outcome: Option<Result<LoanOutcome, LendingError>>,
}

impl LoanState {
    /// Pending fine of the borrowing, if one was already opened
    #[must_use]
    pub fn pending_fine(&self) -> Option<&Payment> {
        self.payments
            .iter()
            .find(|p| p.kind == PaymentKind::Fine && p.is_pending())
    }

    /// Payment by id
    #[must_use]
    pub fn payment(&self, id: PaymentId) -> Option<&Payment> {
        self.payments.iter().find(|p| p.id == id)
    }
}

/// Successful result of a lending action.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoanOutcome {
    /// Borrowing created with its pending rental payment
    Borrowed {
        /// The new borrowing
        borrowing: Borrowing,
        /// Rental payment to complete at the provider
        payment: Payment,
    },
    /// Returned on time
    Returned {
        /// The closed borrowing
        borrowing: Borrowing,
    },
    /// Returned late; the fine must be paid to finish the return
    FinePaymentRequired {
        /// Pending fine payment
        payment: Payment,
    },
    /// Payment collected
    Paid {
        /// The settled payment
        payment: Payment,
        /// Borrowing closed by a fine payment
        returned: Option<Borrowing>,
    },
    /// Repeated success callback for a settled payment
    AlreadyPaid {
        /// The settled payment
        payment: Payment,
    },
    /// Customer left the checkout page; the payment stays pending
    Cancelled {
        /// The pending payment
        payment: Payment,
        /// Message for the customer
        message: String,
    },
}

/// Borrowing workflow requests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BorrowingAction {
    /// Borrow a copy of a book
    Borrow {
        /// Id for the new borrowing
        borrowing_id: BorrowingId,
        /// Id for its rental payment
        payment_id: PaymentId,
        /// Borrower
        user_id: UserId,
        /// Book to borrow
        book_id: BookId,
        /// Day the book is due back
        expected_return_date: NaiveDate,
    },
    /// Return a borrowed book
    Return {
        /// Borrowing to return
        borrowing_id: BorrowingId,
        /// Id for a fine payment, used only if the return is late
        payment_id: PaymentId,
    },
}

/// Payment workflow requests and checkout feedback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PaymentAction {
    /// The provider opened a checkout session
    SessionOpened {
        /// Payment the session collects
        payment_id: PaymentId,
        /// Rental or fine
        kind: PaymentKind,
        /// The opened session
        session: CheckoutSession,
    },
    /// The provider could not open a session
    SessionFailed {
        /// Payment that would have been created
        payment_id: PaymentId,
        /// Rental or fine
        kind: PaymentKind,
        /// Provider error
        reason: String,
    },
    /// Success callback from the provider
    MarkPaid {
        /// Payment to settle
        payment_id: PaymentId,
        /// Session id from the redirect, if present
        session_id: Option<String>,
    },
    /// Cancel callback from the provider
    Cancel {
        /// Abandoned payment
        payment_id: PaymentId,
    },
}

/// Every action the lending reducers handle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoanAction {
    /// Borrowing workflow
    Borrowing(BorrowingAction),
    /// Payment workflow
    Payment(PaymentAction),
}

impl From<BorrowingAction> for LoanAction {
    fn from(action: BorrowingAction) -> Self {
        Self::Borrowing(action)
    }
}

impl From<PaymentAction> for LoanAction {
    fn from(action: PaymentAction) -> Self {
        Self::Payment(action)
    }
}
