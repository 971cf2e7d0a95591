//! `PostgreSQL` storage for the lending service.
//!
//! This crate provides [`PostgresLendingStore`], the production implementation
//! of the `LendingStore` trait from `lending-core`. It uses sqlx with:
//!
//! - Connection pooling
//! - One transaction per unit of work, with guarded conditional updates
//! - Embedded migrations (`migrations/`)
//!
//! # Example
//!
//! ```ignore
//! use lending_postgres::PostgresLendingStore;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = sqlx::PgPool::connect("postgres://localhost/lending").await?;
//!     let store = PostgresLendingStore::new(pool);
//!     store.migrate().await?;
//!     Ok(())
//! }
//! ```

mod rows;
mod store;

pub use store::PostgresLendingStore;
