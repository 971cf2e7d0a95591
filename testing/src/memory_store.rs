//! In-memory lending store for fast, deterministic testing.
//!
//! Units of work are applied to a copy of the tables and swapped in only when
//! every change succeeded, so a failed guard leaves nothing behind just like a
//! rolled-back transaction.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use chrono::NaiveDate;
use lending_core::store::{
    BookFilter, BorrowingFilter, Change, Guard, LendingStore, OverdueBorrowing, PaymentFilter,
    StoreError, StoreFuture,
};
use lending_core::types::{
    Book, BookId, Borrowing, BorrowingId, Payment, PaymentId, PaymentKind, User, UserId,
};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

#[derive(Clone, Debug, Default)]
struct Tables {
    users: HashMap<UserId, User>,
    books: HashMap<BookId, Book>,
    borrowings: Vec<Borrowing>,
    payments: Vec<Payment>,
}

impl Tables {
    fn apply(&mut self, change: Change) -> Result<(), StoreError> {
        match change {
            Change::InsertBorrowing(borrowing) => {
                if !self.books.contains_key(&borrowing.book_id)
                    || !self.users.contains_key(&borrowing.user_id)
                {
                    return Err(StoreError::Conflict(format!(
                        "borrowing {} references a missing book or user",
                        borrowing.id
                    )));
                }
                if self.borrowings.iter().any(|b| b.id == borrowing.id) {
                    return Err(StoreError::Conflict(format!(
                        "borrowing {} already exists",
                        borrowing.id
                    )));
                }
                self.borrowings.push(borrowing);
            },
            Change::AdjustInventory { book_id, delta } => {
                let book = self
                    .books
                    .get_mut(&book_id)
                    .ok_or(StoreError::GuardFailed(Guard::InventoryAvailable(book_id)))?;
                let adjusted = i64::from(book.inventory) + i64::from(delta);
                book.inventory = u32::try_from(adjusted)
                    .map_err(|_| StoreError::GuardFailed(Guard::InventoryAvailable(book_id)))?;
            },
            Change::MarkReturned {
                borrowing_id,
                returned_on,
            } => {
                let borrowing = self
                    .borrowings
                    .iter_mut()
                    .find(|b| b.id == borrowing_id && b.actual_return_date.is_none())
                    .ok_or(StoreError::GuardFailed(Guard::NotReturned(borrowing_id)))?;
                borrowing.actual_return_date = Some(returned_on);
            },
            Change::InsertPayment(payment) => {
                if !self.borrowings.iter().any(|b| b.id == payment.borrowing_id) {
                    return Err(StoreError::Conflict(format!(
                        "payment {} references missing borrowing {}",
                        payment.id, payment.borrowing_id
                    )));
                }
                if payment.kind == PaymentKind::Fine
                    && self.payments.iter().any(|p| {
                        p.borrowing_id == payment.borrowing_id
                            && p.kind == PaymentKind::Fine
                            && p.is_pending()
                    })
                {
                    return Err(StoreError::GuardFailed(Guard::NoPendingFine(
                        payment.borrowing_id,
                    )));
                }
                self.payments.push(payment);
            },
            Change::MarkPaid { payment_id } => {
                let payment = self
                    .payments
                    .iter_mut()
                    .find(|p| p.id == payment_id && p.is_pending())
                    .ok_or(StoreError::GuardFailed(Guard::PaymentPending(payment_id)))?;
                payment
                    .mark_paid()
                    .map_err(|_| StoreError::GuardFailed(Guard::PaymentPending(payment_id)))?;
            },
        }
        Ok(())
    }
}

/// In-memory [`LendingStore`].
///
/// Clones share the same tables.
///
/// # Example
///
/// ```
/// use lending_testing::{fixtures, InMemoryLendingStore};
///
/// let store = InMemoryLendingStore::new();
/// let book = fixtures::book("Dune", 2, 1000);
/// store.seed_book(book.clone());
/// assert_eq!(store.inventory(book.id), Some(2));
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryLendingStore {
    tables: Arc<RwLock<Tables>>,
    unavailable: Arc<RwLock<bool>>,
    commits: Arc<RwLock<usize>>,
}

impl InMemoryLendingStore {
    /// Create a new empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a user directly
    pub fn seed_user(&self, user: User) {
        self.tables.write().unwrap().users.insert(user.id, user);
    }

    /// Insert a book directly
    pub fn seed_book(&self, book: Book) {
        self.tables.write().unwrap().books.insert(book.id, book);
    }

    /// Insert a borrowing directly, bypassing inventory
    pub fn seed_borrowing(&self, borrowing: Borrowing) {
        self.tables.write().unwrap().borrowings.push(borrowing);
    }

    /// Insert a payment directly
    pub fn seed_payment(&self, payment: Payment) {
        self.tables.write().unwrap().payments.push(payment);
    }

    /// Current inventory of a book
    #[must_use]
    pub fn inventory(&self, book_id: BookId) -> Option<u32> {
        self.tables
            .read()
            .unwrap()
            .books
            .get(&book_id)
            .map(|b| b.inventory)
    }

    /// Number of stored borrowings
    #[must_use]
    pub fn borrowing_count(&self) -> usize {
        self.tables.read().unwrap().borrowings.len()
    }

    /// Number of stored payments
    #[must_use]
    pub fn payment_count(&self) -> usize {
        self.tables.read().unwrap().payments.len()
    }

    /// Number of successful commits
    #[must_use]
    pub fn commit_count(&self) -> usize {
        *self.commits.read().unwrap()
    }

    /// Make every following operation fail with a database error
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.write().unwrap() = unavailable;
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if *self.unavailable.read().unwrap() {
            return Err(StoreError::Database("store unavailable".to_string()));
        }
        Ok(())
    }

    fn read<T: Send + 'static>(
        &self,
        query: impl FnOnce(&Tables) -> T,
    ) -> StoreFuture<'_, T> {
        let result = self
            .check_available()
            .map(|()| query(&*self.tables.read().unwrap()));
        Box::pin(async move { result })
    }

    fn write<T: Send + 'static>(
        &self,
        update: impl FnOnce(&mut Tables) -> Result<T, StoreError>,
    ) -> StoreFuture<'_, T> {
        let result = self
            .check_available()
            .and_then(|()| update(&mut *self.tables.write().unwrap()));
        Box::pin(async move { result })
    }
}

impl LendingStore for InMemoryLendingStore {
    fn insert_user(&self, user: User) -> StoreFuture<'_, ()> {
        self.write(move |tables| {
            if tables
                .users
                .values()
                .any(|u| u.email.eq_ignore_ascii_case(&user.email))
            {
                return Err(StoreError::Conflict(format!(
                    "email {} is already registered",
                    user.email
                )));
            }
            tables.users.insert(user.id, user);
            Ok(())
        })
    }

    fn user(&self, id: UserId) -> StoreFuture<'_, Option<User>> {
        self.read(move |tables| tables.users.get(&id).cloned())
    }

    fn insert_book(&self, book: Book) -> StoreFuture<'_, ()> {
        self.write(move |tables| {
            if tables.books.contains_key(&book.id) {
                return Err(StoreError::Conflict(format!("book {} already exists", book.id)));
            }
            tables.books.insert(book.id, book);
            Ok(())
        })
    }

    fn update_book(&self, book: Book) -> StoreFuture<'_, bool> {
        self.write(move |tables| {
            Ok(match tables.books.get_mut(&book.id) {
                Some(existing) => {
                    *existing = book;
                    true
                },
                None => false,
            })
        })
    }

    fn delete_book(&self, id: BookId) -> StoreFuture<'_, bool> {
        self.write(move |tables| {
            if tables.borrowings.iter().any(|b| b.book_id == id) {
                return Err(StoreError::Conflict(format!(
                    "book {id} is referenced by borrowings"
                )));
            }
            Ok(tables.books.remove(&id).is_some())
        })
    }

    fn book(&self, id: BookId) -> StoreFuture<'_, Option<Book>> {
        self.read(move |tables| tables.books.get(&id).cloned())
    }

    fn list_books(&self, filter: BookFilter) -> StoreFuture<'_, Vec<Book>> {
        self.read(move |tables| {
            let needle = filter.title.map(|t| t.to_lowercase());
            let mut books: Vec<Book> = tables
                .books
                .values()
                .filter(|b| {
                    needle
                        .as_ref()
                        .is_none_or(|n| b.title.to_lowercase().contains(n.as_str()))
                })
                .cloned()
                .collect();
            books.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));
            books
        })
    }

    fn borrowing(&self, id: BorrowingId) -> StoreFuture<'_, Option<Borrowing>> {
        self.read(move |tables| tables.borrowings.iter().find(|b| b.id == id).cloned())
    }

    fn list_borrowings(&self, filter: BorrowingFilter) -> StoreFuture<'_, Vec<Borrowing>> {
        self.read(move |tables| {
            let mut borrowings: Vec<Borrowing> = tables
                .borrowings
                .iter()
                .filter(|b| filter.user_id.is_none_or(|user_id| b.user_id == user_id))
                .filter(|b| filter.is_active.is_none_or(|active| b.is_active() == active))
                .cloned()
                .collect();
            borrowings.sort_by(|a, b| b.borrow_date.cmp(&a.borrow_date));
            borrowings
        })
    }

    fn overdue_borrowings(&self, today: NaiveDate) -> StoreFuture<'_, Vec<OverdueBorrowing>> {
        self.read(move |tables| {
            tables
                .borrowings
                .iter()
                .filter(|b| b.is_overdue(today))
                .filter_map(|b| {
                    let book = tables.books.get(&b.book_id)?;
                    let user = tables.users.get(&b.user_id)?;
                    Some(OverdueBorrowing {
                        borrowing: b.clone(),
                        book_title: book.title.clone(),
                        user_email: user.email.clone(),
                    })
                })
                .collect()
        })
    }

    fn payment(&self, id: PaymentId) -> StoreFuture<'_, Option<Payment>> {
        self.read(move |tables| tables.payments.iter().find(|p| p.id == id).cloned())
    }

    fn payments_for(&self, borrowing_id: BorrowingId) -> StoreFuture<'_, Vec<Payment>> {
        self.read(move |tables| {
            tables
                .payments
                .iter()
                .filter(|p| p.borrowing_id == borrowing_id)
                .cloned()
                .collect()
        })
    }

    fn list_payments(&self, filter: PaymentFilter) -> StoreFuture<'_, Vec<Payment>> {
        self.read(move |tables| {
            tables
                .payments
                .iter()
                .filter(|p| {
                    filter.user_id.is_none_or(|user_id| {
                        tables
                            .borrowings
                            .iter()
                            .any(|b| b.id == p.borrowing_id && b.user_id == user_id)
                    })
                })
                .cloned()
                .collect()
        })
    }

    fn commit(&self, changes: Vec<Change>) -> StoreFuture<'_, ()> {
        let result = self.write(move |tables| {
            let mut staged = tables.clone();
            for change in changes {
                staged.apply(change)?;
            }
            *tables = staged;
            Ok(())
        });
        let commits = self.commits.clone();
        Box::pin(async move {
            result.await?;
            *commits.write().unwrap() += 1;
            Ok(())
        })
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        self.read(|_| ())
    }
}
