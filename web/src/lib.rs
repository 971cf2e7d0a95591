//! Axum HTTP surface for the lending service.
//!
//! Handlers are a thin imperative shell: they extract the caller and the
//! request, call [`LendingService`](lending_runtime::LendingService) or a
//! read-only view, and map the result to a response.
//!
//! # Request Flow
//!
//! 1. **Correlation ID** is taken from the request or generated
//! 2. **Caller** is resolved from `X-User-Id`
//! 3. **Service call** runs the borrowing or payment workflow
//! 4. **Map result** to JSON, or [`AppError`] to `{"code", "message"}`
//!
//! # Example
//!
//! ```ignore
//! use lending_web::{lending_router, AppState};
//!
//! let app = lending_router(AppState::new(service));
//! axum::serve(listener, app).await?;
//! ```

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

// Re-export key types for convenience
pub use error::AppError;
pub use extractors::{Caller, CorrelationId, USER_ID_HEADER};
pub use middleware::{CORRELATION_ID_HEADER, correlation_id_layer};
pub use router::lending_router;
pub use state::AppState;
