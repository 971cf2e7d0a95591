//! `PostgreSQL` implementation of [`LendingStore`].

use crate::rows::{cents, like_pattern, BookRow, BorrowingRow, OverdueRow, PaymentRow, UserRow};
use chrono::NaiveDate;
use lending_core::store::{
    BookFilter, BorrowingFilter, Change, Guard, LendingStore, OverdueBorrowing, PaymentFilter,
    StoreError, StoreFuture,
};
use lending_core::types::{
    Book, BookId, Borrowing, BorrowingId, Payment, PaymentId, User, UserId,
};
use sqlx::{PgConnection, PgPool};

const BOOK_COLUMNS: &str = "id, title, author, cover, inventory, daily_fee_cents";
const BORROWING_COLUMNS: &str =
    "id, user_id, book_id, borrow_date, expected_return_date, actual_return_date";
const PAYMENT_COLUMNS: &str =
    "id, borrowing_id, kind, status, session_id, session_url, money_to_pay_cents";

/// Map a sqlx error, turning constraint violations into conflicts.
fn db_error(context: &str, error: &sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = error {
        if db_err.is_unique_violation()
            || db_err.is_foreign_key_violation()
            || db_err.is_check_violation()
        {
            return StoreError::Conflict(format!("{context}: {db_err}"));
        }
    }
    StoreError::Database(format!("{context}: {error}"))
}

/// `PostgreSQL` lending store.
///
/// Every [`commit`](LendingStore::commit) runs in its own transaction. Guarded
/// changes are conditional `UPDATE`s; zero affected rows fails the guard and
/// rolls the whole unit back. The inventory update takes the book's row lock,
/// so concurrent borrows of one book serialize on it.
///
/// # Example
///
/// ```no_run
/// use lending_postgres::PostgresLendingStore;
/// use sqlx::PgPool;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = PgPool::connect("postgres://localhost/lending").await?;
/// let store = PostgresLendingStore::new(pool);
/// store.migrate().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct PostgresLendingStore {
    pool: PgPool,
}

impl PostgresLendingStore {
    /// Create a store over an existing pool
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Database` if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Migration failed: {e}")))?;
        tracing::info!("Database migrations complete");
        Ok(())
    }

    async fn apply(conn: &mut PgConnection, change: Change) -> Result<(), StoreError> {
        match change {
            Change::InsertBorrowing(borrowing) => {
                sqlx::query(
                    r"
                    INSERT INTO borrowings
                        (id, user_id, book_id, borrow_date, expected_return_date, actual_return_date)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    ",
                )
                .bind(borrowing.id.as_uuid())
                .bind(borrowing.user_id.as_uuid())
                .bind(borrowing.book_id.as_uuid())
                .bind(borrowing.borrow_date)
                .bind(borrowing.expected_return_date)
                .bind(borrowing.actual_return_date)
                .execute(&mut *conn)
                .await
                .map_err(|e| db_error("Failed to insert borrowing", &e))?;
            },
            Change::AdjustInventory { book_id, delta } => {
                let result = sqlx::query(
                    r"
                    UPDATE books
                    SET inventory = inventory + $2
                    WHERE id = $1 AND inventory + $2 >= 0
                    ",
                )
                .bind(book_id.as_uuid())
                .bind(delta)
                .execute(&mut *conn)
                .await
                .map_err(|e| db_error("Failed to adjust inventory", &e))?;

                if result.rows_affected() == 0 {
                    return Err(StoreError::GuardFailed(Guard::InventoryAvailable(book_id)));
                }
            },
            Change::MarkReturned {
                borrowing_id,
                returned_on,
            } => {
                let result = sqlx::query(
                    r"
                    UPDATE borrowings
                    SET actual_return_date = $2
                    WHERE id = $1 AND actual_return_date IS NULL
                    ",
                )
                .bind(borrowing_id.as_uuid())
                .bind(returned_on)
                .execute(&mut *conn)
                .await
                .map_err(|e| db_error("Failed to mark borrowing returned", &e))?;

                if result.rows_affected() == 0 {
                    return Err(StoreError::GuardFailed(Guard::NotReturned(borrowing_id)));
                }
            },
            Change::InsertPayment(payment) => {
                let result = sqlx::query(
                    r"
                    INSERT INTO payments
                        (id, borrowing_id, kind, status, session_id, session_url, money_to_pay_cents)
                    VALUES ($1, $2, $3, $4, $5, $6, $7)
                    ON CONFLICT (borrowing_id) WHERE kind = 'fine' AND status = 'pending'
                    DO NOTHING
                    ",
                )
                .bind(payment.id.as_uuid())
                .bind(payment.borrowing_id.as_uuid())
                .bind(payment.kind.as_str())
                .bind(payment.status.as_str())
                .bind(&payment.session_id)
                .bind(&payment.session_url)
                .bind(cents(payment.money_to_pay)?)
                .execute(&mut *conn)
                .await
                .map_err(|e| db_error("Failed to insert payment", &e))?;

                if result.rows_affected() == 0 {
                    return Err(StoreError::GuardFailed(Guard::NoPendingFine(
                        payment.borrowing_id,
                    )));
                }
            },
            Change::MarkPaid { payment_id } => {
                let result = sqlx::query(
                    r"
                    UPDATE payments
                    SET status = 'paid', money_to_pay_cents = 0
                    WHERE id = $1 AND status = 'pending'
                    ",
                )
                .bind(payment_id.as_uuid())
                .execute(&mut *conn)
                .await
                .map_err(|e| db_error("Failed to mark payment paid", &e))?;

                if result.rows_affected() == 0 {
                    return Err(StoreError::GuardFailed(Guard::PaymentPending(payment_id)));
                }
            },
        }
        Ok(())
    }
}

impl LendingStore for PostgresLendingStore {
    fn insert_user(&self, user: User) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query(
                r"
                INSERT INTO users (id, email, is_staff, created_at)
                VALUES ($1, $2, $3, $4)
                ",
            )
            .bind(user.id.as_uuid())
            .bind(&user.email)
            .bind(user.is_staff)
            .bind(user.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Failed to insert user", &e))?;
            Ok(())
        })
    }

    fn user(&self, id: UserId) -> StoreFuture<'_, Option<User>> {
        Box::pin(async move {
            let row = sqlx::query_as::<_, UserRow>(
                "SELECT id, email, is_staff, created_at FROM users WHERE id = $1",
            )
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to load user", &e))?;
            Ok(row.map(User::from))
        })
    }

    fn insert_book(&self, book: Book) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query(
                r"
                INSERT INTO books (id, title, author, cover, inventory, daily_fee_cents)
                VALUES ($1, $2, $3, $4, $5, $6)
                ",
            )
            .bind(book.id.as_uuid())
            .bind(&book.title)
            .bind(&book.author)
            .bind(book.cover.as_str())
            .bind(i32::try_from(book.inventory).map_err(|e| {
                StoreError::Conflict(format!("inventory out of range: {e}"))
            })?)
            .bind(cents(book.daily_fee)?)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Failed to insert book", &e))?;
            Ok(())
        })
    }

    fn update_book(&self, book: Book) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let result = sqlx::query(
                r"
                UPDATE books
                SET title = $2, author = $3, cover = $4, inventory = $5, daily_fee_cents = $6
                WHERE id = $1
                ",
            )
            .bind(book.id.as_uuid())
            .bind(&book.title)
            .bind(&book.author)
            .bind(book.cover.as_str())
            .bind(i32::try_from(book.inventory).map_err(|e| {
                StoreError::Conflict(format!("inventory out of range: {e}"))
            })?)
            .bind(cents(book.daily_fee)?)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Failed to update book", &e))?;
            Ok(result.rows_affected() == 1)
        })
    }

    fn delete_book(&self, id: BookId) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM books WHERE id = $1")
                .bind(id.as_uuid())
                .execute(&self.pool)
                .await
                .map_err(|e| db_error("Failed to delete book", &e))?;
            Ok(result.rows_affected() == 1)
        })
    }

    fn book(&self, id: BookId) -> StoreFuture<'_, Option<Book>> {
        Box::pin(async move {
            let row = sqlx::query_as::<_, BookRow>(&format!(
                "SELECT {BOOK_COLUMNS} FROM books WHERE id = $1"
            ))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to load book", &e))?;
            row.map(Book::try_from).transpose()
        })
    }

    fn list_books(&self, filter: BookFilter) -> StoreFuture<'_, Vec<Book>> {
        Box::pin(async move {
            let rows = sqlx::query_as::<_, BookRow>(&format!(
                r"
                SELECT {BOOK_COLUMNS} FROM books
                WHERE $1::text IS NULL OR title ILIKE $1 ESCAPE '\'
                ORDER BY title, id
                "
            ))
            .bind(filter.title.as_deref().map(like_pattern))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to list books", &e))?;
            rows.into_iter().map(Book::try_from).collect()
        })
    }

    fn borrowing(&self, id: BorrowingId) -> StoreFuture<'_, Option<Borrowing>> {
        Box::pin(async move {
            let row = sqlx::query_as::<_, BorrowingRow>(&format!(
                "SELECT {BORROWING_COLUMNS} FROM borrowings WHERE id = $1"
            ))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to load borrowing", &e))?;
            Ok(row.map(Borrowing::from))
        })
    }

    fn list_borrowings(&self, filter: BorrowingFilter) -> StoreFuture<'_, Vec<Borrowing>> {
        Box::pin(async move {
            let rows = sqlx::query_as::<_, BorrowingRow>(&format!(
                r"
                SELECT {BORROWING_COLUMNS} FROM borrowings
                WHERE ($1::uuid IS NULL OR user_id = $1)
                  AND ($2::boolean IS NULL OR (actual_return_date IS NULL) = $2)
                ORDER BY borrow_date DESC
                "
            ))
            .bind(filter.user_id.map(|id| *id.as_uuid()))
            .bind(filter.is_active)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to list borrowings", &e))?;
            Ok(rows.into_iter().map(Borrowing::from).collect())
        })
    }

    fn overdue_borrowings(&self, today: NaiveDate) -> StoreFuture<'_, Vec<OverdueBorrowing>> {
        Box::pin(async move {
            let rows = sqlx::query_as::<_, OverdueRow>(
                r"
                SELECT b.id, b.user_id, b.book_id, b.borrow_date, b.expected_return_date,
                       b.actual_return_date, k.title AS book_title, u.email AS user_email
                FROM borrowings b
                JOIN books k ON k.id = b.book_id
                JOIN users u ON u.id = b.user_id
                WHERE b.actual_return_date IS NULL AND b.expected_return_date < $1
                ORDER BY b.expected_return_date, b.id
                ",
            )
            .bind(today)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to scan overdue borrowings", &e))?;
            Ok(rows.into_iter().map(OverdueBorrowing::from).collect())
        })
    }

    fn payment(&self, id: PaymentId) -> StoreFuture<'_, Option<Payment>> {
        Box::pin(async move {
            let row = sqlx::query_as::<_, PaymentRow>(&format!(
                "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1"
            ))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to load payment", &e))?;
            row.map(Payment::try_from).transpose()
        })
    }

    fn payments_for(&self, borrowing_id: BorrowingId) -> StoreFuture<'_, Vec<Payment>> {
        Box::pin(async move {
            let rows = sqlx::query_as::<_, PaymentRow>(&format!(
                "SELECT {PAYMENT_COLUMNS} FROM payments WHERE borrowing_id = $1 ORDER BY created_at"
            ))
            .bind(borrowing_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to load payments", &e))?;
            rows.into_iter().map(Payment::try_from).collect()
        })
    }

    fn list_payments(&self, filter: PaymentFilter) -> StoreFuture<'_, Vec<Payment>> {
        Box::pin(async move {
            let rows = sqlx::query_as::<_, PaymentRow>(
                r"
                SELECT p.id, p.borrowing_id, p.kind, p.status, p.session_id, p.session_url,
                       p.money_to_pay_cents
                FROM payments p
                JOIN borrowings b ON b.id = p.borrowing_id
                WHERE $1::uuid IS NULL OR b.user_id = $1
                ORDER BY p.created_at
                ",
            )
            .bind(filter.user_id.map(|id| *id.as_uuid()))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to list payments", &e))?;
            rows.into_iter().map(Payment::try_from).collect()
        })
    }

    fn commit(&self, changes: Vec<Change>) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let count = changes.len();
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| db_error("Failed to start transaction", &e))?;

            for change in changes {
                if let Err(error) = Self::apply(&mut tx, change).await {
                    let _ = tx.rollback().await; // Ignore rollback errors
                    if let StoreError::GuardFailed(guard) = &error {
                        tracing::debug!(?guard, "Guard failed, unit of work rolled back");
                        metrics::counter!("lending_store_guard_failures_total").increment(1);
                    }
                    return Err(error);
                }
            }

            tx.commit()
                .await
                .map_err(|e| db_error("Failed to commit transaction", &e))?;
            tracing::trace!(changes = count, "Unit of work committed");
            Ok(())
        })
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query("SELECT 1")
                .execute(&self.pool)
                .await
                .map_err(|e| db_error("Ping failed", &e))?;
            Ok(())
        })
    }
}
