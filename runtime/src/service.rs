//! The lending service: loads state, runs the reducer and executes its effects.
//!
//! Each operation builds a fresh [`LoanState`] from the store, sends one
//! action through [`LoanReducer`] and then interprets the returned effects:
//!
//! - `Effect::Future` is awaited and the action it yields is reduced next
//! - `Effect::Persist` is committed as one unit of work
//! - `Effect::Notify` is queued on the [`NotificationDispatcher`]
//!
//! A failing commit aborts the operation; notifications queued after it are
//! never sent.

use crate::metrics::LendingMetrics;
use crate::notify::NotificationDispatcher;
use lending_core::borrowing::{overdue_notifications, LoanEnvironment, LoanReducer};
use lending_core::effect::Effect;
use lending_core::error::LendingError;
use lending_core::reducer::Reducer;
use lending_core::store::{Change, LendingStore};
use lending_core::types::{
    BookId, Borrowing, BorrowingAction, BorrowingId, LoanAction, LoanOutcome, LoanState,
    Payment, PaymentAction, PaymentId, PaymentKind, UserId,
};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

/// Result of a return request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReturnOutcome {
    /// Returned on time; inventory restored
    Returned(Borrowing),
    /// Returned late; the borrowing stays active until this fine is paid
    FineRequired(Payment),
}

/// Result of a success callback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaymentSettlement {
    /// The payment after the callback
    pub payment: Payment,
    /// Borrowing closed by this fine payment, if any
    pub returned: Option<Borrowing>,
    /// The payment had been settled by an earlier callback
    pub already_paid: bool,
}

/// Lending operations over a store, a checkout gateway and a notifier.
#[derive(Clone)]
pub struct LendingService {
    store: Arc<dyn LendingStore>,
    reducer: LoanReducer,
    env: LoanEnvironment,
    notifications: NotificationDispatcher,
}

impl LendingService {
    /// Creates a new lending service
    #[must_use]
    pub fn new(
        store: Arc<dyn LendingStore>,
        env: LoanEnvironment,
        notifications: NotificationDispatcher,
    ) -> Self {
        Self {
            store,
            reducer: LoanReducer::new(),
            env,
            notifications,
        }
    }

    /// The backing store, for read-only queries
    #[must_use]
    pub fn store(&self) -> &Arc<dyn LendingStore> {
        &self.store
    }

    /// Current time according to the service clock
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.env.clock.now()
    }

    /// Current calendar day according to the service clock
    #[must_use]
    pub fn today(&self) -> NaiveDate {
        self.env.clock.today()
    }

    /// Borrow a book and open its rental checkout session.
    ///
    /// The session is opened before anything is stored. If the last copy is
    /// taken while the provider answers, the borrowing fails with
    /// `InventoryExhausted` and the opened session is abandoned: nothing links
    /// it to a stored payment, but it stays payable at the provider until it
    /// expires, so a payment made there has to be refunded by hand.
    ///
    /// # Errors
    ///
    /// `UserNotFound`, `BookNotFound`, `InventoryExhausted`, `InvalidDate`,
    /// `PaymentProviderError`, or `Storage`.
    #[tracing::instrument(skip(self), fields(user_id = %user_id, book_id = %book_id))]
    pub async fn create_borrowing(
        &self,
        user_id: UserId,
        book_id: BookId,
        expected_return_date: NaiveDate,
    ) -> Result<(Borrowing, Payment), LendingError> {
        let started = Instant::now();
        let mut state = LoanState {
            borrower: self.store.user(user_id).await?,
            book: self.store.book(book_id).await?,
            ..LoanState::default()
        };

        let action = BorrowingAction::Borrow {
            borrowing_id: BorrowingId::new(),
            payment_id: PaymentId::new(),
            user_id,
            book_id,
            expected_return_date,
        };
        let outcome = self.run(&mut state, action.into()).await;
        LendingMetrics::record_operation("create_borrowing", started.elapsed());

        match outcome? {
            LoanOutcome::Borrowed { borrowing, payment } => {
                tracing::info!(
                    borrowing_id = %borrowing.id,
                    payment_id = %payment.id,
                    amount = %payment.money_to_pay,
                    "Borrowing created"
                );
                Ok((borrowing, payment))
            },
            other => Err(unexpected(&other)),
        }
    }

    /// Return a borrowed book.
    ///
    /// A late return answers with the borrowing's pending fine when it already
    /// has one, including one committed by a concurrent request while this
    /// one was waiting for the provider. The fine keeps the amount it was
    /// opened with.
    ///
    /// # Errors
    ///
    /// `BorrowingNotFound`, `AlreadyReturned`, `PaymentProviderError`
    /// (late return), or `Storage`.
    #[tracing::instrument(skip(self), fields(borrowing_id = %borrowing_id))]
    pub async fn return_borrowing(
        &self,
        borrowing_id: BorrowingId,
    ) -> Result<ReturnOutcome, LendingError> {
        let started = Instant::now();
        let borrowing = self
            .store
            .borrowing(borrowing_id)
            .await?
            .ok_or(LendingError::BorrowingNotFound(borrowing_id))?;
        let mut state = LoanState {
            book: self.store.book(borrowing.book_id).await?,
            payments: self.store.payments_for(borrowing_id).await?,
            borrowing: Some(borrowing),
            ..LoanState::default()
        };

        let action = BorrowingAction::Return {
            borrowing_id,
            payment_id: PaymentId::new(),
        };
        let outcome = self.run(&mut state, action.into()).await;
        LendingMetrics::record_operation("return_borrowing", started.elapsed());

        let outcome = match outcome {
            Err(LendingError::FinePending(_)) => return self.stored_fine(borrowing_id).await,
            other => other?,
        };

        match outcome {
            LoanOutcome::Returned { borrowing } => {
                tracing::info!(borrowing_id = %borrowing.id, "Borrowing returned");
                Ok(ReturnOutcome::Returned(borrowing))
            },
            LoanOutcome::FinePaymentRequired { payment } => {
                tracing::info!(
                    payment_id = %payment.id,
                    amount = %payment.money_to_pay,
                    "Late return, fine payment required"
                );
                Ok(ReturnOutcome::FineRequired(payment))
            },
            other => Err(unexpected(&other)),
        }
    }

    /// Answer a late return that lost the race to open the fine.
    async fn stored_fine(&self, borrowing_id: BorrowingId) -> Result<ReturnOutcome, LendingError> {
        let payments = self.store.payments_for(borrowing_id).await?;
        let pending_fine = payments
            .into_iter()
            .find(|p| p.kind == PaymentKind::Fine && p.is_pending());
        if let Some(payment) = pending_fine {
            tracing::info!(
                payment_id = %payment.id,
                "Fine opened by a concurrent return, reusing it"
            );
            return Ok(ReturnOutcome::FineRequired(payment));
        }

        // The competing fine was settled in the meantime
        Err(LendingError::AlreadyReturned(borrowing_id))
    }

    /// Handle the provider's success callback.
    ///
    /// # Errors
    ///
    /// `PaymentNotFound`, `SessionMismatch`, `AlreadyPaid` (strict callbacks
    /// only), or `Storage`.
    #[tracing::instrument(skip(self), fields(payment_id = %payment_id))]
    pub async fn mark_paid(
        &self,
        payment_id: PaymentId,
        session_id: Option<String>,
    ) -> Result<PaymentSettlement, LendingError> {
        let started = Instant::now();
        let payment = self
            .store
            .payment(payment_id)
            .await?
            .ok_or(LendingError::PaymentNotFound(payment_id))?;
        let borrowing = self.store.borrowing(payment.borrowing_id).await?;
        let book = match &borrowing {
            Some(borrowing) => self.store.book(borrowing.book_id).await?,
            None => None,
        };
        let mut state = LoanState {
            book,
            borrowing,
            payments: self.store.payments_for(payment.borrowing_id).await?,
            ..LoanState::default()
        };

        let action = PaymentAction::MarkPaid {
            payment_id,
            session_id,
        };
        let outcome = self.run(&mut state, action.into()).await;
        LendingMetrics::record_operation("mark_paid", started.elapsed());

        match outcome {
            Ok(LoanOutcome::Paid { payment, returned }) => {
                tracing::info!(
                    kind = payment.kind.as_str(),
                    returned = returned.is_some(),
                    "Payment settled"
                );
                Ok(PaymentSettlement {
                    payment,
                    returned,
                    already_paid: false,
                })
            },
            Ok(LoanOutcome::AlreadyPaid { payment }) => {
                tracing::debug!("Repeated success callback");
                Ok(PaymentSettlement {
                    payment,
                    returned: None,
                    already_paid: true,
                })
            },
            // Lost the race against a concurrent callback for the same payment
            Err(LendingError::AlreadyPaid(_)) if self.env.lenient_callbacks => {
                tracing::debug!("Payment settled by a concurrent callback");
                let payment = self
                    .store
                    .payment(payment_id)
                    .await?
                    .ok_or(LendingError::PaymentNotFound(payment_id))?;
                Ok(PaymentSettlement {
                    payment,
                    returned: None,
                    already_paid: true,
                })
            },
            Ok(other) => Err(unexpected(&other)),
            Err(error) => Err(error),
        }
    }

    /// Handle the provider's cancel redirect. The payment stays pending.
    ///
    /// # Errors
    ///
    /// `PaymentNotFound` or `Storage`.
    #[tracing::instrument(skip(self), fields(payment_id = %payment_id))]
    pub async fn cancel_payment(
        &self,
        payment_id: PaymentId,
    ) -> Result<(Payment, String), LendingError> {
        let payment = self
            .store
            .payment(payment_id)
            .await?
            .ok_or(LendingError::PaymentNotFound(payment_id))?;
        let mut state = LoanState {
            payments: vec![payment],
            ..LoanState::default()
        };

        match self
            .run(&mut state, PaymentAction::Cancel { payment_id }.into())
            .await?
        {
            LoanOutcome::Cancelled { payment, message } => Ok((payment, message)),
            other => Err(unexpected(&other)),
        }
    }

    /// Queue an overdue reminder for every late, unreturned borrowing.
    ///
    /// Returns the number of overdue borrowings found. Nothing is marked, so
    /// the next sweep reminds the same borrowers again.
    ///
    /// # Errors
    ///
    /// `Storage` if the scan fails.
    #[tracing::instrument(skip(self))]
    pub async fn sweep_overdue(&self) -> Result<usize, LendingError> {
        let today = self.today();
        let overdue = self.store.overdue_borrowings(today).await?;

        for notification in overdue_notifications(&overdue) {
            self.notifications.dispatch(notification);
        }
        LendingMetrics::record_overdue_notified(overdue.len() as u64);

        tracing::info!(%today, overdue = overdue.len(), "Overdue sweep finished");
        Ok(overdue.len())
    }

    async fn run(
        &self,
        state: &mut LoanState,
        action: LoanAction,
    ) -> Result<LoanOutcome, LendingError> {
        let mut queue = VecDeque::from([action]);

        while let Some(action) = queue.pop_front() {
            let effects = self.reducer.reduce(state, action, &self.env);
            tracing::trace!("Reducer returned {} effects", effects.len());

            for effect in effects {
                match effect {
                    Effect::None => {},
                    Effect::Persist(changes) => self.persist(changes).await?,
                    Effect::Notify(notification) => {
                        self.notifications.dispatch(notification);
                    },
                    Effect::Future(future) => {
                        if let Some(next) = future.await {
                            queue.push_back(next);
                        }
                    },
                }
            }
        }

        state.outcome.take().unwrap_or_else(|| {
            Err(LendingError::Storage(
                "operation finished without an outcome".to_string(),
            ))
        })
    }

    /// Commit a unit of work.
    ///
    /// A failed unit that carried a new payment leaves its checkout session
    /// open at the provider; it is logged so it can be expired or refunded.
    async fn persist(&self, changes: Vec<Change>) -> Result<(), LendingError> {
        match self.store.commit(changes.clone()).await {
            Ok(()) => {
                record_committed(&changes);
                Ok(())
            },
            Err(error) => {
                for change in &changes {
                    if let Change::InsertPayment(payment) = change {
                        tracing::warn!(
                            payment_id = %payment.id,
                            session_id = %payment.session_id,
                            error = %error,
                            "Commit failed after checkout session was opened; session stays payable at the provider"
                        );
                    }
                }
                Err(error.into())
            },
        }
    }
}

fn record_committed(changes: &[Change]) {
    for change in changes {
        match change {
            Change::InsertBorrowing(_) => LendingMetrics::record_borrowing_created(),
            Change::InsertPayment(payment) if payment.kind == PaymentKind::Fine => {
                LendingMetrics::record_fine_opened();
            },
            Change::MarkReturned { .. } => LendingMetrics::record_return(),
            Change::MarkPaid { .. } => LendingMetrics::record_payment_paid(),
            Change::InsertPayment(_) | Change::AdjustInventory { .. } => {},
        }
    }
}

fn unexpected(outcome: &LoanOutcome) -> LendingError {
    tracing::error!(?outcome, "Unexpected outcome for operation");
    LendingError::Storage(format!("unexpected outcome: {outcome:?}"))
}
