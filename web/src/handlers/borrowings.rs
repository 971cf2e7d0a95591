//! Borrowing endpoints.

use crate::error::AppError;
use crate::extractors::Caller;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::NaiveDate;
use lending_core::store::BorrowingFilter;
use lending_core::types::{BookId, Borrowing, BorrowingId, Payment, UserId};
use lending_core::views::{self, BorrowingDetail, BorrowingListItem};
use lending_runtime::ReturnOutcome;
use serde::{Deserialize, Serialize};

/// Borrowing list query string.
#[derive(Debug, Default, Deserialize)]
pub struct BorrowingQuery {
    /// `true`: not returned yet, `false`: returned
    pub is_active: Option<bool>,
    /// Staff only: narrow to one borrower
    pub user_id: Option<UserId>,
}

/// Borrow request.
#[derive(Debug, Deserialize)]
pub struct CreateBorrowing {
    /// Book to borrow
    pub book_id: BookId,
    /// Day the book is due back
    pub expected_return_date: NaiveDate,
}

/// A new borrowing and the rental payment to complete.
#[derive(Debug, Serialize)]
pub struct BorrowingCreated {
    /// The borrowing
    pub borrowing: Borrowing,
    /// Pending rental payment; redirect to its `session_url`
    pub payment: Payment,
}

/// Response to a return request.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReturnResponse {
    /// Returned on time
    Returned {
        /// The closed borrowing
        borrowing: Borrowing,
    },
    /// Late: the fine must be paid before the return is recorded
    FinePaymentRequired {
        /// Pending fine payment; redirect to its `session_url`
        payment: Payment,
    },
}

impl IntoResponse for ReturnResponse {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Returned { .. } => StatusCode::OK,
            Self::FinePaymentRequired { .. } => StatusCode::PAYMENT_REQUIRED,
        };
        (status, Json(self)).into_response()
    }
}

/// Result of an on-demand overdue sweep.
#[derive(Debug, Serialize)]
pub struct SweepResponse {
    /// Overdue borrowings reminded
    pub overdue: usize,
}

/// ```text
/// GET /api/borrowings?is_active=&user_id=
/// ```
///
/// Regular users see their own borrowings; `user_id` is honoured for staff.
///
/// # Errors
///
/// 401 without a known caller.
pub async fn list(
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<BorrowingQuery>,
) -> Result<Json<Vec<BorrowingListItem>>, AppError> {
    let filter = BorrowingFilter {
        user_id: caller.scope(query.user_id),
        is_active: query.is_active,
    };
    let items = views::list_borrowings(state.store(), filter).await?;
    Ok(Json(items))
}

/// ```text
/// GET /api/borrowings/:id
/// ```
///
/// # Errors
///
/// 404 for an unknown borrowing, 403 for another user's borrowing.
pub async fn detail(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<BorrowingId>,
) -> Result<Json<BorrowingDetail>, AppError> {
    let detail = views::borrowing_detail(state.store(), id)
        .await?
        .ok_or_else(|| AppError::not_found("Borrowing", id))?;
    caller.require_owner(detail.user_id)?;
    Ok(Json(detail))
}

/// ```text
/// POST /api/borrowings
/// ```
///
/// # Errors
///
/// 404 for an unknown book, 409 when no copy is available, 422 for a bad
/// return date, 502 when the checkout provider fails.
pub async fn create(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<CreateBorrowing>,
) -> Result<(StatusCode, Json<BorrowingCreated>), AppError> {
    let (borrowing, payment) = state
        .service
        .create_borrowing(caller.id(), request.book_id, request.expected_return_date)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(BorrowingCreated { borrowing, payment }),
    ))
}

/// ```text
/// POST /api/borrowings/:id/return
/// ```
///
/// 200 when returned, 402 with the fine payment when late.
///
/// # Errors
///
/// 404 for an unknown borrowing, 403 for another user's borrowing, 409 when
/// already returned, 502 when the fine session cannot be opened.
pub async fn return_borrowing(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<BorrowingId>,
) -> Result<ReturnResponse, AppError> {
    let borrowing = state
        .store()
        .borrowing(id)
        .await?
        .ok_or_else(|| AppError::not_found("Borrowing", id))?;
    caller.require_owner(borrowing.user_id)?;

    let response = match state.service.return_borrowing(id).await? {
        ReturnOutcome::Returned(borrowing) => ReturnResponse::Returned { borrowing },
        ReturnOutcome::FineRequired(payment) => ReturnResponse::FinePaymentRequired { payment },
    };
    Ok(response)
}

/// ```text
/// POST /api/borrowings/sweep
/// ```
///
/// # Errors
///
/// 403 for non-staff.
pub async fn sweep(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<SweepResponse>, AppError> {
    caller.require_staff()?;
    let overdue = state.service.sweep_overdue().await?;
    Ok(Json(SweepResponse { overdue }))
}
