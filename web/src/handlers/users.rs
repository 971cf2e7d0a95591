//! User directory endpoints.

use crate::error::AppError;
use crate::extractors::Caller;
use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode};
use lending_core::types::{User, UserId};
use serde::Deserialize;

/// Registration request.
#[derive(Debug, Deserialize)]
pub struct RegisterUser {
    /// Email address, unique ignoring case
    pub email: String,
}

/// Register a regular user.
///
/// ```text
/// POST /api/users
/// ```
///
/// # Errors
///
/// 422 for a malformed email, 409 when the email is taken.
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterUser>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let email = request.email.trim();
    if !is_plausible_email(email) {
        return Err(AppError::validation(format!("Invalid email: {email}")));
    }

    let user = User::new(UserId::new(), email, state.service.now());
    state.store().insert_user(user.clone()).await?;
    tracing::info!(user_id = %user.id, "User registered");

    Ok((StatusCode::CREATED, Json(user)))
}

/// The calling user.
///
/// ```text
/// GET /api/users/me
/// ```
#[allow(clippy::unused_async)]
pub async fn me(caller: Caller) -> Json<User> {
    Json(caller.user)
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
        },
        None => false,
    }
}
