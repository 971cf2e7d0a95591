//! Payment endpoints and checkout redirect targets.
//!
//! The success and cancel routes are hit by the provider's browser redirect,
//! so they carry no caller identity.

use crate::error::AppError;
use crate::extractors::Caller;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
};
use lending_core::store::PaymentFilter;
use lending_core::types::{Borrowing, Payment, PaymentId};
use lending_core::views::{self, PaymentDetail, PaymentListItem};
use serde::{Deserialize, Serialize};

/// Success redirect query string.
#[derive(Debug, Default, Deserialize)]
pub struct SuccessQuery {
    /// Provider session id substituted into the success URL
    pub session_id: Option<String>,
}

/// Response to the success redirect.
#[derive(Debug, Serialize)]
pub struct PaymentSucceeded {
    /// Settled payment
    pub payment: Payment,
    /// Borrowing closed by a fine payment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub returned: Option<Borrowing>,
    /// The callback was a repeat of an earlier one
    pub already_paid: bool,
}

/// Response to the cancel redirect.
#[derive(Debug, Serialize)]
pub struct PaymentCancelled {
    /// The still-pending payment
    pub payment: Payment,
    /// Message for the borrower
    pub message: String,
}

/// ```text
/// GET /api/payments
/// ```
///
/// # Errors
///
/// 401 without a known caller.
pub async fn list(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<Vec<PaymentListItem>>, AppError> {
    let filter = PaymentFilter {
        user_id: caller.scope(None),
    };
    let items = views::list_payments(state.store(), filter).await?;
    Ok(Json(items))
}

/// ```text
/// GET /api/payments/:id
/// ```
///
/// # Errors
///
/// 404 for an unknown payment, 403 for another user's payment.
pub async fn detail(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<PaymentId>,
) -> Result<Json<PaymentDetail>, AppError> {
    let detail = views::payment_detail(state.store(), id)
        .await?
        .ok_or_else(|| AppError::not_found("Payment", id))?;
    caller.require_owner(detail.user_id)?;
    Ok(Json(detail))
}

/// ```text
/// GET|POST /api/payments/:id/success?session_id=
/// ```
///
/// # Errors
///
/// 404 for an unknown payment, 400 for a foreign session id, 409 for a
/// repeated callback when callbacks are strict.
pub async fn success(
    State(state): State<AppState>,
    Path(id): Path<PaymentId>,
    Query(query): Query<SuccessQuery>,
) -> Result<Json<PaymentSucceeded>, AppError> {
    let settlement = state
        .service
        .mark_paid(id, query.session_id.filter(|s| !s.is_empty()))
        .await?;
    Ok(Json(PaymentSucceeded {
        payment: settlement.payment,
        returned: settlement.returned,
        already_paid: settlement.already_paid,
    }))
}

/// ```text
/// GET|POST /api/payments/:id/cancel
/// ```
///
/// # Errors
///
/// 404 for an unknown payment.
pub async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<PaymentId>,
) -> Result<Json<PaymentCancelled>, AppError> {
    let (payment, message) = state.service.cancel_payment(id).await?;
    Ok(Json(PaymentCancelled { payment, message }))
}
