//! Row types and their conversion into domain types.

use chrono::{DateTime, NaiveDate, Utc};
use lending_core::store::{OverdueBorrowing, StoreError};
use lending_core::types::{
    Book, BookId, Borrowing, BorrowingId, CoverType, Money, Payment, PaymentId, PaymentKind,
    PaymentStatus, User, UserId,
};
use sqlx::FromRow;
use uuid::Uuid;

fn corrupt(what: &str, detail: impl std::fmt::Display) -> StoreError {
    StoreError::Database(format!("Invalid {what} column: {detail}"))
}

#[derive(FromRow)]
pub(crate) struct UserRow {
    id: Uuid,
    email: String,
    is_staff: bool,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: UserId::from_uuid(row.id),
            email: row.email,
            is_staff: row.is_staff,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
pub(crate) struct BookRow {
    id: Uuid,
    title: String,
    author: String,
    cover: String,
    inventory: i32,
    daily_fee_cents: i64,
}

impl TryFrom<BookRow> for Book {
    type Error = StoreError;

    fn try_from(row: BookRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: BookId::from_uuid(row.id),
            title: row.title,
            author: row.author,
            cover: row.cover.parse::<CoverType>().map_err(|e| corrupt("cover", e))?,
            inventory: u32::try_from(row.inventory).map_err(|e| corrupt("inventory", e))?,
            daily_fee: Money::from_cents(
                u64::try_from(row.daily_fee_cents).map_err(|e| corrupt("daily_fee_cents", e))?,
            ),
        })
    }
}

#[derive(FromRow)]
pub(crate) struct BorrowingRow {
    id: Uuid,
    user_id: Uuid,
    book_id: Uuid,
    borrow_date: DateTime<Utc>,
    expected_return_date: NaiveDate,
    actual_return_date: Option<NaiveDate>,
}

impl From<BorrowingRow> for Borrowing {
    fn from(row: BorrowingRow) -> Self {
        Self {
            id: BorrowingId::from_uuid(row.id),
            user_id: UserId::from_uuid(row.user_id),
            book_id: BookId::from_uuid(row.book_id),
            borrow_date: row.borrow_date,
            expected_return_date: row.expected_return_date,
            actual_return_date: row.actual_return_date,
        }
    }
}

#[derive(FromRow)]
pub(crate) struct OverdueRow {
    #[sqlx(flatten)]
    borrowing: BorrowingRow,
    book_title: String,
    user_email: String,
}

impl From<OverdueRow> for OverdueBorrowing {
    fn from(row: OverdueRow) -> Self {
        Self {
            borrowing: row.borrowing.into(),
            book_title: row.book_title,
            user_email: row.user_email,
        }
    }
}

#[derive(FromRow)]
pub(crate) struct PaymentRow {
    id: Uuid,
    borrowing_id: Uuid,
    kind: String,
    status: String,
    session_id: String,
    session_url: String,
    money_to_pay_cents: i64,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = StoreError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: PaymentId::from_uuid(row.id),
            borrowing_id: BorrowingId::from_uuid(row.borrowing_id),
            kind: row.kind.parse::<PaymentKind>().map_err(|e| corrupt("kind", e))?,
            status: row
                .status
                .parse::<PaymentStatus>()
                .map_err(|e| corrupt("status", e))?,
            session_id: row.session_id,
            session_url: row.session_url,
            money_to_pay: Money::from_cents(
                u64::try_from(row.money_to_pay_cents)
                    .map_err(|e| corrupt("money_to_pay_cents", e))?,
            ),
        })
    }
}

/// Cents as a `BIGINT` parameter.
pub(crate) fn cents(money: Money) -> Result<i64, StoreError> {
    i64::try_from(money.cents()).map_err(|e| corrupt("amount", e))
}

/// Escape `%`, `_` and `\` for a `LIKE` pattern.
pub(crate) fn like_pattern(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 2);
    escaped.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}
