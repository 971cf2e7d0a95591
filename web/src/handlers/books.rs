//! Catalog endpoints. Reads are public, writes are staff only.

use crate::error::AppError;
use crate::extractors::Caller;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use lending_core::store::BookFilter;
use lending_core::types::{Book, BookId, CoverType, Money};
use serde::Deserialize;

/// Book list query string.
#[derive(Debug, Default, Deserialize)]
pub struct BookQuery {
    /// Case-insensitive title substring
    pub title: Option<String>,
}

/// Create or replace a catalog entry.
#[derive(Debug, Deserialize)]
pub struct BookRequest {
    /// Title
    pub title: String,
    /// Author
    pub author: String,
    /// `Hardcover` or `Softcover`
    pub cover: CoverType,
    /// Copies available to lend
    pub inventory: u32,
    /// Fee per day, e.g. `"1.50"`
    pub daily_fee: Money,
}

impl BookRequest {
    fn into_book(self, id: BookId) -> Result<Book, AppError> {
        let title = self.title.trim();
        let author = self.author.trim();
        if title.is_empty() || author.is_empty() {
            return Err(AppError::validation("Title and author are required"));
        }

        Ok(Book {
            id,
            title: title.to_string(),
            author: author.to_string(),
            cover: self.cover,
            inventory: self.inventory,
            daily_fee: self.daily_fee,
        })
    }
}

/// ```text
/// GET /api/books?title=
/// ```
///
/// # Errors
///
/// 500 if the store fails.
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<BookQuery>,
) -> Result<Json<Vec<Book>>, AppError> {
    let title = query.title.filter(|t| !t.trim().is_empty());
    let books = state.store().list_books(BookFilter { title }).await?;
    Ok(Json(books))
}

/// ```text
/// GET /api/books/:id
/// ```
///
/// # Errors
///
/// 404 for an unknown book.
pub async fn detail(
    State(state): State<AppState>,
    Path(id): Path<BookId>,
) -> Result<Json<Book>, AppError> {
    let book = state
        .store()
        .book(id)
        .await?
        .ok_or_else(|| AppError::not_found("Book", id))?;
    Ok(Json(book))
}

/// ```text
/// POST /api/books
/// ```
///
/// # Errors
///
/// 403 for non-staff, 422 for blank fields.
pub async fn create(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<BookRequest>,
) -> Result<(StatusCode, Json<Book>), AppError> {
    caller.require_staff()?;
    let book = request.into_book(BookId::new())?;
    state.store().insert_book(book.clone()).await?;
    tracing::info!(book_id = %book.id, title = %book.title, "Book added");
    Ok((StatusCode::CREATED, Json(book)))
}

/// ```text
/// PUT /api/books/:id
/// ```
///
/// # Errors
///
/// 403 for non-staff, 404 for an unknown book, 422 for blank fields.
pub async fn update(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<BookId>,
    Json(request): Json<BookRequest>,
) -> Result<Json<Book>, AppError> {
    caller.require_staff()?;
    let book = request.into_book(id)?;
    if !state.store().update_book(book.clone()).await? {
        return Err(AppError::not_found("Book", id));
    }
    tracing::info!(book_id = %id, "Book updated");
    Ok(Json(book))
}

/// ```text
/// DELETE /api/books/:id
/// ```
///
/// # Errors
///
/// 403 for non-staff, 404 for an unknown book, 409 while borrowings
/// reference it.
pub async fn delete(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<BookId>,
) -> Result<StatusCode, AppError> {
    caller.require_staff()?;
    if !state.store().delete_book(id).await? {
        return Err(AppError::not_found("Book", id));
    }
    tracing::info!(book_id = %id, "Book removed");
    Ok(StatusCode::NO_CONTENT)
}
