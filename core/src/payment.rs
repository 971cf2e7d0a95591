//! Payment workflow reducer.
//!
//! State machine: `Pending --(success callback)--> Paid`. Nothing else moves a
//! payment. Settling a fine also finishes the late return it was opened for.

use crate::borrowing::LoanEnvironment;
use crate::checkout::CheckoutRequest;
use crate::effect::Effect;
use crate::error::LendingError;
use crate::notification::Notification;
use crate::reducer::Reducer;
use crate::store::Change;
use crate::types::{
    LoanAction, LoanOutcome, LoanState, Money, Payment, PaymentAction, PaymentId, PaymentKind,
    PaymentStatus,
};
use smallvec::{smallvec, SmallVec};

/// Informational response to a cancelled checkout.
pub const CANCEL_MESSAGE: &str =
    "Payment can be completed later. Please note that the session will remain active for 24 hours.";

/// Describes opening a checkout session for `amount`.
///
/// The returned effect calls the gateway and feeds back either
/// [`PaymentAction::SessionOpened`] or [`PaymentAction::SessionFailed`].
/// Nothing is persisted until the session exists.
#[must_use]
pub fn open_payment(
    env: &LoanEnvironment,
    payment_id: PaymentId,
    kind: PaymentKind,
    line_item: &str,
    description: String,
    amount: Money,
) -> Effect<LoanAction> {
    let request = CheckoutRequest {
        payment_id,
        line_item: line_item.to_string(),
        description,
        unit_amount: amount,
        quantity: 1,
        success_url: env.links.success_url(payment_id),
        cancel_url: env.links.cancel_url(payment_id),
    };
    let gateway = env.gateway.clone();

    Effect::Future(Box::pin(async move {
        let action = match gateway.open_session(request).await {
            Ok(session) => PaymentAction::SessionOpened {
                payment_id,
                kind,
                session,
            },
            Err(error) => PaymentAction::SessionFailed {
                payment_id,
                kind,
                reason: error.to_string(),
            },
        };
        Some(LoanAction::Payment(action))
    }))
}

/// Reducer for checkout feedback and provider callbacks
#[derive(Clone, Copy, Debug, Default)]
pub struct PaymentReducer;

impl PaymentReducer {
    /// Creates a new payment reducer
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn session_opened(
        state: &mut LoanState,
        payment_id: PaymentId,
        kind: PaymentKind,
        session: crate::checkout::CheckoutSession,
    ) -> Result<SmallVec<[Effect<LoanAction>; 4]>, LendingError> {
        let borrowing = state.borrowing.clone().ok_or_else(|| {
            LendingError::Storage("checkout session opened without a borrowing".to_string())
        })?;

        let payment = Payment {
            id: payment_id,
            borrowing_id: borrowing.id,
            kind,
            status: PaymentStatus::Pending,
            session_id: session.session_id,
            session_url: session.url,
            money_to_pay: session.amount_total,
        };
        state.payments.push(payment.clone());

        match kind {
            PaymentKind::Rental => {
                let book = state
                    .book
                    .as_mut()
                    .ok_or(LendingError::BookNotFound(borrowing.book_id))?;
                book.inventory = book.inventory.saturating_sub(1);
                let notification = state
                    .borrower
                    .as_ref()
                    .map(|user| Notification::borrowed(&user.email, &borrowing, &book.title));

                let mut effects: SmallVec<[Effect<LoanAction>; 4]> = smallvec![Effect::Persist(vec![
                    Change::AdjustInventory {
                        book_id: borrowing.book_id,
                        delta: -1,
                    },
                    Change::InsertBorrowing(borrowing.clone()),
                    Change::InsertPayment(payment.clone()),
                ])];
                effects.extend(notification.map(Effect::Notify));

                state.outcome = Some(Ok(LoanOutcome::Borrowed { borrowing, payment }));
                Ok(effects)
            },
            PaymentKind::Fine => {
                state.outcome = Some(Ok(LoanOutcome::FinePaymentRequired {
                    payment: payment.clone(),
                }));
                Ok(smallvec![Effect::Persist(vec![Change::InsertPayment(payment)])])
            },
        }
    }

    fn mark_paid(
        state: &mut LoanState,
        payment_id: PaymentId,
        session_id: Option<&str>,
        env: &LoanEnvironment,
    ) -> Result<SmallVec<[Effect<LoanAction>; 4]>, LendingError> {
        let today = env.clock.today();
        let index = state
            .payments
            .iter()
            .position(|p| p.id == payment_id)
            .ok_or(LendingError::PaymentNotFound(payment_id))?;

        if session_id.is_some_and(|id| id != state.payments[index].session_id) {
            return Err(LendingError::SessionMismatch(payment_id));
        }

        if !state.payments[index].is_pending() {
            if env.lenient_callbacks {
                state.outcome = Some(Ok(LoanOutcome::AlreadyPaid {
                    payment: state.payments[index].clone(),
                }));
                return Ok(smallvec![Effect::None]);
            }
            return Err(LendingError::AlreadyPaid(payment_id));
        }

        state.payments[index].mark_paid()?;
        let payment = state.payments[index].clone();
        let mut changes = vec![Change::MarkPaid { payment_id }];

        let returned = match (payment.kind, state.borrowing.as_mut()) {
            (PaymentKind::Fine, Some(borrowing)) if borrowing.is_active() => {
                borrowing.mark_returned(today)?;
                changes.push(Change::MarkReturned {
                    borrowing_id: borrowing.id,
                    returned_on: today,
                });
                changes.push(Change::AdjustInventory {
                    book_id: borrowing.book_id,
                    delta: 1,
                });
                if let Some(book) = state.book.as_mut() {
                    book.inventory = book.inventory.saturating_add(1);
                }
                Some(borrowing.clone())
            },
            _ => None,
        };

        state.outcome = Some(Ok(LoanOutcome::Paid { payment, returned }));
        Ok(smallvec![Effect::Persist(changes)])
    }
}

impl Reducer for PaymentReducer {
    type State = LoanState;
    type Action = LoanAction;
    type Environment = LoanEnvironment;

    fn reduce(
        &self,
        state: &mut LoanState,
        action: LoanAction,
        env: &LoanEnvironment,
    ) -> SmallVec<[Effect<LoanAction>; 4]> {
        let LoanAction::Payment(action) = action else {
            return SmallVec::new();
        };

        let result = match action {
            PaymentAction::SessionOpened {
                payment_id,
                kind,
                session,
            } => Self::session_opened(state, payment_id, kind, session),
            PaymentAction::SessionFailed {
                payment_id,
                kind,
                reason,
            } => {
                tracing::debug!(payment_id = %payment_id, ?kind, %reason, "Checkout session failed");
                if kind == PaymentKind::Rental {
                    state.borrowing = None;
                }
                Err(LendingError::PaymentProviderError(reason))
            },
            PaymentAction::MarkPaid {
                payment_id,
                session_id,
            } => Self::mark_paid(state, payment_id, session_id.as_deref(), env),
            PaymentAction::Cancel { payment_id } => state
                .payment(payment_id)
                .cloned()
                .ok_or(LendingError::PaymentNotFound(payment_id))
                .map(|payment| {
                    state.outcome = Some(Ok(LoanOutcome::Cancelled {
                        payment,
                        message: CANCEL_MESSAGE.to_string(),
                    }));
                    smallvec![Effect::None]
                }),
        };

        match result {
            Ok(effects) => effects,
            Err(error) => {
                state.outcome = Some(Err(error));
                smallvec![Effect::None]
            },
        }
    }
}
