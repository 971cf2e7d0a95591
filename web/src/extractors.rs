//! Custom Axum extractors.
//!
//! - `CorrelationId`: Extract or generate request correlation IDs
//! - `Caller`: The authenticated user, resolved from the `X-User-Id` header
//!
//! # Examples
//!
//! ```ignore
//! async fn handler(
//!     State(state): State<AppState>,
//!     correlation_id: CorrelationId,
//!     caller: Caller,
//! ) -> Result<Json<Response>, AppError> {
//!     tracing::info!(
//!         correlation_id = %correlation_id.0,
//!         user_id = %caller.id(),
//!         "Processing request"
//!     );
//!     Ok(Json(response))
//! }
//! ```

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
};
use lending_core::types::{User, UserId};
use uuid::Uuid;

/// Header carrying the authenticated user id, set by the upstream auth gateway.
pub const USER_ID_HEADER: &str = "X-User-Id";

/// Correlation ID for request tracing.
///
/// Extracts the correlation ID from the `X-Correlation-ID` header,
/// or generates a new UUID v4 if not present.
#[derive(Debug, Clone, Copy)]
pub struct CorrelationId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for CorrelationId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Prefer the id the middleware already stored
        if let Some(id) = parts.extensions.get::<Uuid>() {
            return Ok(Self(*id));
        }

        let correlation_id = parts
            .headers
            .get(crate::middleware::CORRELATION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| Uuid::parse_str(s).ok())
            .unwrap_or_else(Uuid::new_v4);

        Ok(Self(correlation_id))
    }
}

/// The user making the request.
///
/// Rejects with 401 when the header is missing, malformed, or names a user
/// the directory does not know.
#[derive(Debug, Clone)]
pub struct Caller {
    /// Directory record of the caller
    pub user: User,
}

impl Caller {
    /// Caller's user id
    #[must_use]
    pub const fn id(&self) -> UserId {
        self.user.id
    }

    /// Staff may manage the catalog and see every borrowing
    #[must_use]
    pub const fn is_staff(&self) -> bool {
        self.user.is_staff
    }

    /// Reject non-staff callers with 403.
    ///
    /// # Errors
    ///
    /// Returns a 403 [`AppError`] unless the caller is staff.
    pub fn require_staff(&self) -> Result<(), AppError> {
        if self.is_staff() {
            Ok(())
        } else {
            Err(AppError::forbidden("Staff only"))
        }
    }

    /// Reject callers that neither own the resource nor are staff.
    ///
    /// # Errors
    ///
    /// Returns a 403 [`AppError`] for another user's resource.
    pub fn require_owner(&self, owner: UserId) -> Result<(), AppError> {
        if self.is_staff() || self.id() == owner {
            Ok(())
        } else {
            Err(AppError::forbidden("Not your resource"))
        }
    }

    /// Listing scope: staff see everyone (optionally narrowed), users see themselves
    #[must_use]
    pub fn scope(&self, requested: Option<UserId>) -> Option<UserId> {
        if self.is_staff() {
            requested
        } else {
            Some(self.id())
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<UserId>().ok())
            .ok_or_else(|| AppError::unauthorized("Missing or invalid X-User-Id header"))?;

        let user = state
            .service
            .store()
            .user(user_id)
            .await?
            .ok_or_else(|| AppError::unauthorized("Unknown user"))?;

        Ok(Self { user })
    }
}
