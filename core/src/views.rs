//! Read models for list and detail responses.
//!
//! List views are compact and carry only what a table needs. Detail views
//! resolve the related rows (book, payments, borrower).

use crate::store::{BorrowingFilter, LendingStore, PaymentFilter, StoreError};
use crate::types::{
    Book, BookId, Borrowing, BorrowingId, Money, Payment, PaymentId, PaymentKind, PaymentStatus,
    UserId,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::HashMap;

/// Row of the borrowing list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BorrowingListItem {
    /// Borrowing ID
    pub id: BorrowingId,
    /// Borrower
    pub user_id: UserId,
    /// Title of the borrowed book
    pub book: String,
    /// When the loan was created
    pub borrow_date: DateTime<Utc>,
    /// Day the book is due back
    pub expected_return_date: NaiveDate,
    /// Day the book came back
    pub actual_return_date: Option<NaiveDate>,
}

/// A borrowing with its book and payments.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BorrowingDetail {
    /// Borrowing ID
    pub id: BorrowingId,
    /// Borrower
    pub user_id: UserId,
    /// The borrowed book
    pub book: Book,
    /// When the loan was created
    pub borrow_date: DateTime<Utc>,
    /// Day the book is due back
    pub expected_return_date: NaiveDate,
    /// Day the book came back
    pub actual_return_date: Option<NaiveDate>,
    /// Rental and fine payments
    pub payments: Vec<PaymentListItem>,
}

/// Row of the payment list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PaymentListItem {
    /// Payment ID
    pub id: PaymentId,
    /// Pending or paid
    pub status: PaymentStatus,
    /// Rental or fine
    #[serde(rename = "type")]
    pub kind: PaymentKind,
    /// Borrowing the payment belongs to
    pub borrowing: BorrowingId,
    /// Outstanding amount
    pub money_to_pay: Money,
}

impl From<&Payment> for PaymentListItem {
    fn from(payment: &Payment) -> Self {
        Self {
            id: payment.id,
            status: payment.status,
            kind: payment.kind,
            borrowing: payment.borrowing_id,
            money_to_pay: payment.money_to_pay,
        }
    }
}

/// A payment with its borrower, book and checkout session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PaymentDetail {
    /// Payment ID
    pub id: PaymentId,
    /// Borrower
    pub user_id: UserId,
    /// Borrower's email
    pub user_email: String,
    /// Pending or paid
    pub status: PaymentStatus,
    /// Rental or fine
    #[serde(rename = "type")]
    pub kind: PaymentKind,
    /// Borrowing the payment belongs to
    pub borrowing: BorrowingId,
    /// Due day of the borrowing
    pub return_date: NaiveDate,
    /// Title of the borrowed book
    pub book: String,
    /// Outstanding amount
    pub money_to_pay: Money,
    /// Hosted checkout page
    pub session_url: String,
    /// Provider session id
    pub session_id: String,
}

async fn book_titles(
    store: &dyn LendingStore,
    ids: impl Iterator<Item = BookId>,
) -> Result<HashMap<BookId, String>, StoreError> {
    let mut titles = HashMap::new();
    for id in ids {
        if titles.contains_key(&id) {
            continue;
        }
        if let Some(book) = store.book(id).await? {
            titles.insert(id, book.title);
        }
    }
    Ok(titles)
}

fn list_item(borrowing: Borrowing, titles: &HashMap<BookId, String>) -> BorrowingListItem {
    BorrowingListItem {
        id: borrowing.id,
        user_id: borrowing.user_id,
        book: titles.get(&borrowing.book_id).cloned().unwrap_or_default(),
        borrow_date: borrowing.borrow_date,
        expected_return_date: borrowing.expected_return_date,
        actual_return_date: borrowing.actual_return_date,
    }
}

/// Borrowing list view.
///
/// # Errors
///
/// Returns [`StoreError`] if the store query fails.
pub async fn list_borrowings(
    store: &dyn LendingStore,
    filter: BorrowingFilter,
) -> Result<Vec<BorrowingListItem>, StoreError> {
    let borrowings = store.list_borrowings(filter).await?;
    let titles = book_titles(store, borrowings.iter().map(|b| b.book_id)).await?;

    Ok(borrowings
        .into_iter()
        .map(|borrowing| list_item(borrowing, &titles))
        .collect())
}

/// Borrowing detail view, `None` if the borrowing or its book is missing.
///
/// # Errors
///
/// Returns [`StoreError`] if a store query fails.
pub async fn borrowing_detail(
    store: &dyn LendingStore,
    id: BorrowingId,
) -> Result<Option<BorrowingDetail>, StoreError> {
    let Some(borrowing) = store.borrowing(id).await? else {
        return Ok(None);
    };
    let Some(book) = store.book(borrowing.book_id).await? else {
        return Ok(None);
    };
    let payments = store.payments_for(id).await?;

    Ok(Some(BorrowingDetail {
        id: borrowing.id,
        user_id: borrowing.user_id,
        book,
        borrow_date: borrowing.borrow_date,
        expected_return_date: borrowing.expected_return_date,
        actual_return_date: borrowing.actual_return_date,
        payments: payments.iter().map(PaymentListItem::from).collect(),
    }))
}

/// Payment list view.
///
/// # Errors
///
/// Returns [`StoreError`] if the store query fails.
pub async fn list_payments(
    store: &dyn LendingStore,
    filter: PaymentFilter,
) -> Result<Vec<PaymentListItem>, StoreError> {
    let payments = store.list_payments(filter).await?;
    Ok(payments.iter().map(PaymentListItem::from).collect())
}

/// Payment detail view, `None` if the payment or a related row is missing.
///
/// # Errors
///
/// Returns [`StoreError`] if a store query fails.
pub async fn payment_detail(
    store: &dyn LendingStore,
    id: PaymentId,
) -> Result<Option<PaymentDetail>, StoreError> {
    let Some(payment) = store.payment(id).await? else {
        return Ok(None);
    };
    let Some(borrowing) = store.borrowing(payment.borrowing_id).await? else {
        return Ok(None);
    };
    let Some(user) = store.user(borrowing.user_id).await? else {
        return Ok(None);
    };
    let book = store
        .book(borrowing.book_id)
        .await?
        .map(|book| book.title)
        .unwrap_or_default();

    Ok(Some(PaymentDetail {
        id: payment.id,
        user_id: user.id,
        user_email: user.email,
        status: payment.status,
        kind: payment.kind,
        borrowing: borrowing.id,
        return_date: borrowing.expected_return_date,
        book,
        money_to_pay: payment.money_to_pay,
        session_url: payment.session_url,
        session_id: payment.session_id,
    }))
}
