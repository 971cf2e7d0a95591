//! Borrowing workflow reducer.
//!
//! Creating a borrowing first opens the rental checkout session; only once the
//! provider answered does the [`PaymentReducer`](crate::payment::PaymentReducer)
//! stage the borrowing, the inventory decrement and the rental payment as one
//! unit of work. Returning on time closes the borrowing directly; returning
//! late opens a fine and leaves the borrowing active until the fine is paid.

use crate::checkout::{CheckoutGateway, CheckoutLinks};
use crate::effect::Effect;
use crate::environment::Clock;
use crate::error::LendingError;
use crate::notification::Notification;
use crate::payment::{self, PaymentReducer};
use crate::pricing;
use crate::reducer::Reducer;
use crate::store::{Change, OverdueBorrowing};
use crate::types::{
    BookId, Borrowing, BorrowingAction, BorrowingId, LoanAction, LoanOutcome, LoanState,
    PaymentId, PaymentKind, UserId,
};
use chrono::NaiveDate;
use smallvec::{smallvec, SmallVec};
use std::sync::Arc;

/// Environment for the lending reducers
#[derive(Clone)]
pub struct LoanEnvironment {
    /// Clock for borrow timestamps and "today"
    pub clock: Arc<dyn Clock>,
    /// Checkout provider for rental and fine sessions
    pub gateway: Arc<dyn CheckoutGateway>,
    /// Success and cancel redirect URLs
    pub links: CheckoutLinks,
    /// Repeated success callbacks succeed instead of failing with `AlreadyPaid`
    pub lenient_callbacks: bool,
}

impl LoanEnvironment {
    /// Creates a new lending environment with lenient callbacks
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        gateway: Arc<dyn CheckoutGateway>,
        links: CheckoutLinks,
    ) -> Self {
        Self {
            clock,
            gateway,
            links,
            lenient_callbacks: true,
        }
    }

    /// Sets callback strictness
    #[must_use]
    pub const fn with_lenient_callbacks(mut self, lenient: bool) -> Self {
        self.lenient_callbacks = lenient;
        self
    }
}

/// Reducer for borrow and return requests
#[derive(Clone, Copy, Debug, Default)]
pub struct BorrowingReducer;

impl BorrowingReducer {
    /// Creates a new borrowing reducer
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn borrow(
        state: &mut LoanState,
        borrowing_id: BorrowingId,
        payment_id: PaymentId,
        user_id: UserId,
        book_id: BookId,
        expected_return_date: NaiveDate,
        env: &LoanEnvironment,
    ) -> Result<Effect<LoanAction>, LendingError> {
        if state.borrower.as_ref().map(|u| u.id) != Some(user_id) {
            return Err(LendingError::UserNotFound(user_id));
        }
        let book = state
            .book
            .as_ref()
            .filter(|b| b.id == book_id)
            .ok_or(LendingError::BookNotFound(book_id))?;

        if book.inventory == 0 {
            return Err(LendingError::InventoryExhausted(book_id));
        }

        let borrowing = Borrowing::new(
            borrowing_id,
            user_id,
            book_id,
            env.clock.now(),
            expected_return_date,
        )?;
        let amount = pricing::rental_amount(&borrowing, book.daily_fee)?;
        let description = format!("Rental of {} until {expected_return_date}", book.title);

        let effect = payment::open_payment(
            env,
            payment_id,
            PaymentKind::Rental,
            &book.title,
            description,
            amount,
        );

        tracing::debug!(
            borrowing_id = %borrowing_id,
            book_id = %book_id,
            amount = amount.cents(),
            "Opening rental checkout"
        );

        state.borrowing = Some(borrowing);
        Ok(effect)
    }

    fn return_book(
        state: &mut LoanState,
        borrowing_id: BorrowingId,
        payment_id: PaymentId,
        env: &LoanEnvironment,
    ) -> Result<SmallVec<[Effect<LoanAction>; 4]>, LendingError> {
        let today = env.clock.today();
        let mut borrowing = state
            .borrowing
            .clone()
            .filter(|b| b.id == borrowing_id)
            .ok_or(LendingError::BorrowingNotFound(borrowing_id))?;

        if !borrowing.is_active() {
            return Err(LendingError::AlreadyReturned(borrowing_id));
        }

        if today <= borrowing.expected_return_date {
            borrowing.mark_returned(today)?;
            if let Some(book) = state.book.as_mut() {
                book.inventory = book.inventory.saturating_add(1);
            }

            let book_id = borrowing.book_id;
            state.borrowing = Some(borrowing.clone());
            state.outcome = Some(Ok(LoanOutcome::Returned { borrowing }));
            return Ok(smallvec![Effect::Persist(vec![
                Change::MarkReturned {
                    borrowing_id,
                    returned_on: today,
                },
                Change::AdjustInventory { book_id, delta: 1 },
            ])]);
        }

        if let Some(payment) = state.pending_fine().cloned() {
            state.outcome = Some(Ok(LoanOutcome::FinePaymentRequired { payment }));
            return Ok(smallvec![Effect::None]);
        }

        let book = state
            .book
            .as_ref()
            .filter(|b| b.id == borrowing.book_id)
            .ok_or(LendingError::BookNotFound(borrowing.book_id))?;
        let amount = pricing::fine_amount(&borrowing, book.daily_fee, today)?;
        let days = pricing::overdue_days(&borrowing, today);
        let description = format!("{days} overdue day(s) for {}", book.title);

        tracing::debug!(
            borrowing_id = %borrowing_id,
            overdue_days = days,
            amount = amount.cents(),
            "Opening fine checkout"
        );

        Ok(smallvec![payment::open_payment(
            env,
            payment_id,
            PaymentKind::Fine,
            &format!("Fine for {}", book.title),
            description,
            amount,
        )])
    }
}

impl Reducer for BorrowingReducer {
    type State = LoanState;
    type Action = LoanAction;
    type Environment = LoanEnvironment;

    fn reduce(
        &self,
        state: &mut LoanState,
        action: LoanAction,
        env: &LoanEnvironment,
    ) -> SmallVec<[Effect<LoanAction>; 4]> {
        let LoanAction::Borrowing(action) = action else {
            return SmallVec::new();
        };

        let result = match action {
            BorrowingAction::Borrow {
                borrowing_id,
                payment_id,
                user_id,
                book_id,
                expected_return_date,
            } => Self::borrow(
                state,
                borrowing_id,
                payment_id,
                user_id,
                book_id,
                expected_return_date,
                env,
            )
            .map(|effect| smallvec![effect]),
            BorrowingAction::Return {
                borrowing_id,
                payment_id,
            } => Self::return_book(state, borrowing_id, payment_id, env),
        };

        match result {
            Ok(effects) => effects,
            Err(error) => {
                tracing::debug!(%error, "Borrowing request rejected");
                state.outcome = Some(Err(error));
                smallvec![Effect::None]
            },
        }
    }
}

/// The complete lending reducer: borrowing requests plus payment feedback.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoanReducer {
    borrowing: BorrowingReducer,
    payment: PaymentReducer,
}

impl LoanReducer {
    /// Creates a new lending reducer
    #[must_use]
    pub const fn new() -> Self {
        Self {
            borrowing: BorrowingReducer::new(),
            payment: PaymentReducer::new(),
        }
    }
}

impl Reducer for LoanReducer {
    type State = LoanState;
    type Action = LoanAction;
    type Environment = LoanEnvironment;

    fn reduce(
        &self,
        state: &mut LoanState,
        action: LoanAction,
        env: &LoanEnvironment,
    ) -> SmallVec<[Effect<LoanAction>; 4]> {
        match action {
            LoanAction::Borrowing(_) => self.borrowing.reduce(state, action, env),
            LoanAction::Payment(_) => self.payment.reduce(state, action, env),
        }
    }
}

/// Messages for one overdue sweep.
///
/// Every overdue borrowing gets a reminder on every sweep; an empty sweep
/// tells the staff channel there is nothing to chase.
#[must_use]
pub fn overdue_notifications(overdue: &[OverdueBorrowing]) -> Vec<Notification> {
    if overdue.is_empty() {
        return vec![Notification::no_overdue()];
    }

    overdue
        .iter()
        .map(|row| Notification::overdue(&row.user_email, &row.borrowing, &row.book_title))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::notification::Recipient;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_empty_sweep_notifies_staff() {
        let notifications = overdue_notifications(&[]);
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].recipient, Recipient::Staff);
        assert_eq!(notifications[0].text, "No overdue borrowings for today!");
    }

    #[test]
    fn test_sweep_notifies_each_borrower() {
        let borrowed_at = Utc.with_ymd_and_hms(2024, 4, 1, 9, 0, 0).unwrap();
        let due = NaiveDate::from_ymd_opt(2024, 4, 8).unwrap();
        let rows: Vec<OverdueBorrowing> = ["Dune", "Emma"]
            .iter()
            .map(|title| OverdueBorrowing {
                borrowing: Borrowing::new(
                    BorrowingId::new(),
                    UserId::new(),
                    BookId::new(),
                    borrowed_at,
                    due,
                )
                .unwrap(),
                book_title: (*title).to_string(),
                user_email: format!("{}@example.com", title.to_lowercase()),
            })
            .collect();

        let notifications = overdue_notifications(&rows);
        assert_eq!(notifications.len(), 2);
        assert_eq!(notifications[0].text, "Your borrowing of Dune is overdue!");
        assert_eq!(
            notifications[1].recipient,
            Recipient::User {
                user_id: rows[1].borrowing.user_id,
                email: "emma@example.com".to_string()
            }
        );
    }
}
