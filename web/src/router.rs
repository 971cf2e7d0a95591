//! Lending HTTP router.
//!
//! Composes all handlers into a single Axum router.

use crate::handlers::{self, books, borrowings, payments, users};
use crate::middleware::correlation_id_layer;
use crate::state::AppState;
use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

/// Create the lending router with all endpoints.
///
/// # Routes
///
/// - `GET /health`, `GET /ready` - Liveness and readiness
/// - `POST /api/users`, `GET /api/users/me` - Directory
/// - `GET|POST /api/books`, `GET|PUT|DELETE /api/books/:id` - Catalog
/// - `GET|POST /api/borrowings`, `GET /api/borrowings/:id` - Borrowings
/// - `POST /api/borrowings/:id/return` - Return a book
/// - `POST /api/borrowings/sweep` - Overdue reminders on demand
/// - `GET /api/payments`, `GET /api/payments/:id` - Payments
/// - `GET|POST /api/payments/:id/success`, `GET|POST /api/payments/:id/cancel` - Checkout redirects
///
/// # Example
///
/// ```rust,ignore
/// let app = lending_router(AppState::new(service));
/// let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
/// axum::serve(listener, app).await?;
/// ```
pub fn lending_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness))
        .route("/api/users", post(users::register))
        .route("/api/users/me", get(users::me))
        .route("/api/books", get(books::list).post(books::create))
        .route(
            "/api/books/:id",
            get(books::detail).put(books::update).delete(books::delete),
        )
        .route(
            "/api/borrowings",
            get(borrowings::list).post(borrowings::create),
        )
        .route("/api/borrowings/sweep", post(borrowings::sweep))
        .route("/api/borrowings/:id", get(borrowings::detail))
        .route(
            "/api/borrowings/:id/return",
            post(borrowings::return_borrowing),
        )
        .route("/api/payments", get(payments::list))
        .route("/api/payments/:id", get(payments::detail))
        .route(
            "/api/payments/:id/success",
            get(payments::success).post(payments::success),
        )
        .route(
            "/api/payments/:id/cancel",
            get(payments::cancel).post(payments::cancel),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(correlation_id_layer())
}
