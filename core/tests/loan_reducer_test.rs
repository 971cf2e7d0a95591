//! Reducer tests for the borrowing and payment workflows.

#![allow(clippy::unwrap_used, clippy::panic)]

use chrono::Duration;
use lending_core::LendingError;
use lending_core::borrowing::{BorrowingReducer, LoanEnvironment, LoanReducer};
use lending_core::checkout::{CheckoutError, CheckoutLinks};
use lending_core::effect::Effect;
use lending_core::environment::Clock;
use lending_core::notification::Recipient;
use lending_core::payment::{CANCEL_MESSAGE, PaymentReducer};
use lending_core::store::Change;
use lending_core::types::{
    Book, Borrowing, BorrowingAction, BorrowingId, LoanAction, LoanOutcome, LoanState, Money,
    Payment, PaymentAction, PaymentId, PaymentKind, PaymentStatus, User,
};
use lending_testing::{
    FixedClock, ReducerTest, ScriptedCheckoutGateway, assertions, fixtures, run_to_completion,
    test_clock,
};
use std::sync::Arc;

struct Harness {
    clock: FixedClock,
    gateway: ScriptedCheckoutGateway,
    env: LoanEnvironment,
    user: User,
    book: Book,
}

fn harness(inventory: u32) -> Harness {
    let clock = test_clock();
    let gateway = ScriptedCheckoutGateway::new();
    let env = LoanEnvironment::new(
        Arc::new(clock.clone()),
        Arc::new(gateway.clone()),
        CheckoutLinks::new("http://localhost:8080"),
    );

    Harness {
        clock,
        gateway,
        env,
        user: fixtures::user("reader@example.com"),
        book: fixtures::book("Dune", inventory, 1000),
    }
}

impl Harness {
    fn borrow_state(&self) -> LoanState {
        LoanState {
            borrower: Some(self.user.clone()),
            book: Some(self.book.clone()),
            ..LoanState::default()
        }
    }

    fn borrow_action(&self, days: i64) -> LoanAction {
        BorrowingAction::Borrow {
            borrowing_id: BorrowingId::new(),
            payment_id: PaymentId::new(),
            user_id: self.user.id,
            book_id: self.book.id,
            expected_return_date: fixtures::date(2024, 4, 1) + Duration::days(days),
        }
        .into()
    }

    /// Active borrowing from 2024-04-01 due 2024-04-08
    fn loan_state(&self) -> LoanState {
        let borrowing = Borrowing::new(
            BorrowingId::new(),
            self.user.id,
            self.book.id,
            fixtures::at(2024, 4, 1),
            fixtures::date(2024, 4, 8),
        )
        .unwrap();

        LoanState {
            borrowing: Some(borrowing),
            ..self.borrow_state()
        }
    }

    fn return_action(state: &LoanState) -> LoanAction {
        BorrowingAction::Return {
            borrowing_id: state.borrowing.as_ref().unwrap().id,
            payment_id: PaymentId::new(),
        }
        .into()
    }
}

fn pending(borrowing: &Borrowing, kind: PaymentKind, cents: u64) -> Payment {
    Payment {
        id: PaymentId::new(),
        borrowing_id: borrowing.id,
        kind,
        status: PaymentStatus::Pending,
        session_id: "cs_existing".to_string(),
        session_url: "https://checkout.test/pay/cs_existing".to_string(),
        money_to_pay: Money::from_cents(cents),
    }
}

#[test]
fn test_borrow_rejects_exhausted_inventory() {
    let h = harness(0);
    let book_id = h.book.id;

    ReducerTest::new(BorrowingReducer::new())
        .with_env(h.env.clone())
        .given_state(h.borrow_state())
        .when_action(h.borrow_action(7))
        .then_state(move |state| {
            assert_eq!(
                state.outcome,
                Some(Err(LendingError::InventoryExhausted(book_id)))
            );
            assert!(state.borrowing.is_none());
            assert_eq!(state.book.as_ref().unwrap().inventory, 0);
        })
        .then_effects(assertions::assert_no_effects)
        .run();
}

#[test]
fn test_borrow_rejects_return_date_not_after_today() {
    let h = harness(3);

    ReducerTest::new(BorrowingReducer::new())
        .with_env(h.env.clone())
        .given_state(h.borrow_state())
        .when_action(h.borrow_action(0))
        .then_state(|state| {
            assert!(matches!(
                state.outcome,
                Some(Err(LendingError::InvalidDate(_)))
            ));
        })
        .then_effects(assertions::assert_no_effects)
        .run();
}

#[test]
fn test_borrow_opens_checkout_before_persisting() {
    let h = harness(3);

    ReducerTest::new(BorrowingReducer::new())
        .with_env(h.env.clone())
        .given_state(h.borrow_state())
        .when_action(h.borrow_action(7))
        .then_state(|state| {
            assert!(state.outcome.is_none());
            assert!(state.borrowing.is_some());
        })
        .then_effects(|effects| {
            assertions::assert_effects_count(effects, 1);
            assertions::assert_has_future_effect(effects);
        })
        .run();
}

#[tokio::test]
async fn test_borrow_persists_borrowing_inventory_and_rental_atomically() {
    let h = harness(3);
    let mut state = h.borrow_state();

    let effects =
        run_to_completion(&LoanReducer::new(), &mut state, h.borrow_action(7), &h.env).await;

    let Some(Ok(LoanOutcome::Borrowed { borrowing, payment })) = state.outcome.clone() else {
        panic!("expected a borrowing, got {:?}", state.outcome);
    };
    assert_eq!(borrowing.expected_return_date, fixtures::date(2024, 4, 8));
    assert_eq!(borrowing.borrow_date, h.clock.now());
    assert_eq!(payment.kind, PaymentKind::Rental);
    assert_eq!(payment.status, PaymentStatus::Pending);
    assert_eq!(payment.money_to_pay.to_string(), "80.00");
    assert_eq!(payment.session_id, "cs_test_1");

    assert_eq!(
        assertions::persisted(&effects),
        vec![
            Change::AdjustInventory {
                book_id: h.book.id,
                delta: -1
            },
            Change::InsertBorrowing(borrowing.clone()),
            Change::InsertPayment(payment.clone()),
        ]
    );

    let notifications = assertions::notifications(&effects);
    assert_eq!(notifications.len(), 1);
    assert_eq!(
        notifications[0].recipient,
        Recipient::User {
            user_id: h.user.id,
            email: "reader@example.com".to_string()
        }
    );
    assert_eq!(
        notifications[0].text,
        "You have successfully borrowed Dune. Expected return date: 2024-04-08"
    );
    // Persist precedes Notify
    assert!(matches!(effects[0], Effect::Persist(_)));

    let requests = h.gateway.requests();
    let request = &requests[0];
    assert_eq!(request.payment_id, payment.id);
    assert_eq!(request.line_item, "Dune");
    assert_eq!(request.description, "Rental of Dune until 2024-04-08");
    assert_eq!(request.unit_amount, Money::from_cents(8000));
    assert_eq!(request.quantity, 1);
    assert!(request.success_url.ends_with(&format!(
        "/api/payments/{}/success?session_id={{CHECKOUT_SESSION_ID}}",
        payment.id
    )));
    assert_eq!(state.book.as_ref().unwrap().inventory, 2);
}

#[tokio::test]
async fn test_borrow_provider_failure_persists_nothing() {
    let h = harness(3);
    h.gateway.fail_next(CheckoutError::Timeout);
    let mut state = h.borrow_state();

    let effects =
        run_to_completion(&LoanReducer::new(), &mut state, h.borrow_action(7), &h.env).await;

    assert!(effects.is_empty());
    assert!(matches!(
        state.outcome,
        Some(Err(LendingError::PaymentProviderError(_)))
    ));
    assert!(state.borrowing.is_none());
    assert_eq!(state.book.as_ref().unwrap().inventory, 3);
}

#[test]
fn test_on_time_return_closes_borrowing_and_restores_inventory() {
    let h = harness(2);
    h.clock.set(fixtures::at(2024, 4, 8));
    let state = h.loan_state();
    let action = Harness::return_action(&state);
    let borrowing_id = state.borrowing.as_ref().unwrap().id;
    let book_id = h.book.id;

    ReducerTest::new(BorrowingReducer::new())
        .with_env(h.env.clone())
        .given_state(state)
        .when_action(action)
        .then_state(|state| {
            let Some(Ok(LoanOutcome::Returned { borrowing })) = &state.outcome else {
                panic!("expected a return, got {:?}", state.outcome);
            };
            assert_eq!(borrowing.actual_return_date, Some(fixtures::date(2024, 4, 8)));
            assert_eq!(state.book.as_ref().unwrap().inventory, 3);
        })
        .then_effects(move |effects| {
            assert_eq!(
                assertions::persisted(effects),
                vec![
                    Change::MarkReturned {
                        borrowing_id,
                        returned_on: fixtures::date(2024, 4, 8),
                    },
                    Change::AdjustInventory { book_id, delta: 1 },
                ]
            );
        })
        .run();
}

#[test]
fn test_return_twice_is_rejected() {
    let h = harness(2);
    let mut state = h.loan_state();
    let borrowing = state.borrowing.as_mut().unwrap();
    borrowing.mark_returned(fixtures::date(2024, 4, 3)).unwrap();
    let borrowing_id = borrowing.id;
    let action = Harness::return_action(&state);

    ReducerTest::new(BorrowingReducer::new())
        .with_env(h.env.clone())
        .given_state(state)
        .when_action(action)
        .then_state(move |state| {
            assert_eq!(
                state.outcome,
                Some(Err(LendingError::AlreadyReturned(borrowing_id)))
            );
        })
        .then_effects(assertions::assert_no_effects)
        .run();
}

#[tokio::test]
async fn test_late_return_opens_fine_and_keeps_borrowing_active() {
    let h = harness(2);
    h.clock.set(fixtures::at(2024, 4, 10));
    let mut state = h.loan_state();
    let action = Harness::return_action(&state);

    let effects = run_to_completion(&LoanReducer::new(), &mut state, action, &h.env).await;

    let Some(Ok(LoanOutcome::FinePaymentRequired { payment })) = state.outcome.clone() else {
        panic!("expected a fine, got {:?}", state.outcome);
    };
    assert_eq!(payment.kind, PaymentKind::Fine);
    assert_eq!(payment.money_to_pay.to_string(), "60.00");
    assert_eq!(
        assertions::persisted(&effects),
        vec![Change::InsertPayment(payment)]
    );
    assert!(assertions::notifications(&effects).is_empty());
    assert!(state.borrowing.as_ref().unwrap().is_active());
    assert_eq!(state.book.as_ref().unwrap().inventory, 2);

    let requests = h.gateway.requests();
    let request = &requests[0];
    assert_eq!(request.line_item, "Fine for Dune");
    assert_eq!(request.description, "3 overdue day(s) for Dune");
}

#[test]
fn test_late_return_reuses_pending_fine() {
    let h = harness(2);
    h.clock.set(fixtures::at(2024, 4, 12));
    let mut state = h.loan_state();
    let fine = pending(state.borrowing.as_ref().unwrap(), PaymentKind::Fine, 6000);
    state.payments.push(fine.clone());
    let action = Harness::return_action(&state);
    let gateway = h.gateway.clone();

    ReducerTest::new(BorrowingReducer::new())
        .with_env(h.env.clone())
        .given_state(state)
        .when_action(action)
        .then_state(move |state| {
            assert_eq!(
                state.outcome,
                Some(Ok(LoanOutcome::FinePaymentRequired { payment: fine }))
            );
        })
        .then_effects(move |effects| {
            assertions::assert_no_effects(effects);
            assert!(gateway.requests().is_empty());
        })
        .run();
}

#[test]
fn test_paying_fine_finishes_the_return() {
    let h = harness(2);
    h.clock.set(fixtures::at(2024, 4, 11));
    let mut state = h.loan_state();
    let fine = pending(state.borrowing.as_ref().unwrap(), PaymentKind::Fine, 6000);
    state.payments.push(fine.clone());
    let borrowing_id = state.borrowing.as_ref().unwrap().id;
    let book_id = h.book.id;

    ReducerTest::new(PaymentReducer::new())
        .with_env(h.env.clone())
        .given_state(state)
        .when_action(
            PaymentAction::MarkPaid {
                payment_id: fine.id,
                session_id: Some("cs_existing".to_string()),
            }
            .into(),
        )
        .then_state(|state| {
            let Some(Ok(LoanOutcome::Paid { payment, returned })) = &state.outcome else {
                panic!("expected a payment, got {:?}", state.outcome);
            };
            assert_eq!(payment.status, PaymentStatus::Paid);
            assert!(payment.money_to_pay.is_zero());
            assert_eq!(
                returned.as_ref().unwrap().actual_return_date,
                Some(fixtures::date(2024, 4, 11))
            );
            assert_eq!(state.book.as_ref().unwrap().inventory, 3);
        })
        .then_effects(move |effects| {
            assert_eq!(
                assertions::persisted(effects),
                vec![
                    Change::MarkPaid {
                        payment_id: fine.id
                    },
                    Change::MarkReturned {
                        borrowing_id,
                        returned_on: fixtures::date(2024, 4, 11),
                    },
                    Change::AdjustInventory { book_id, delta: 1 },
                ]
            );
        })
        .run();
}

#[test]
fn test_paying_rental_does_not_touch_borrowing() {
    let h = harness(2);
    let mut state = h.loan_state();
    let rental = pending(state.borrowing.as_ref().unwrap(), PaymentKind::Rental, 8000);
    state.payments.push(rental.clone());

    ReducerTest::new(PaymentReducer::new())
        .with_env(h.env.clone())
        .given_state(state)
        .when_action(
            PaymentAction::MarkPaid {
                payment_id: rental.id,
                session_id: None,
            }
            .into(),
        )
        .then_state(|state| {
            assert!(matches!(
                &state.outcome,
                Some(Ok(LoanOutcome::Paid { returned: None, .. }))
            ));
            assert!(state.borrowing.as_ref().unwrap().is_active());
        })
        .then_effects(move |effects| {
            assert_eq!(
                assertions::persisted(effects),
                vec![Change::MarkPaid {
                    payment_id: rental.id
                }]
            );
        })
        .run();
}

#[test]
fn test_repeated_success_callback_is_lenient_by_default() {
    let h = harness(2);
    let mut state = h.loan_state();
    let mut paid = pending(state.borrowing.as_ref().unwrap(), PaymentKind::Fine, 6000);
    paid.mark_paid().unwrap();
    state.payments.push(paid.clone());

    ReducerTest::new(PaymentReducer::new())
        .with_env(h.env.clone())
        .given_state(state)
        .when_action(
            PaymentAction::MarkPaid {
                payment_id: paid.id,
                session_id: None,
            }
            .into(),
        )
        .then_state(move |state| {
            assert_eq!(
                state.outcome,
                Some(Ok(LoanOutcome::AlreadyPaid { payment: paid }))
            );
        })
        .then_effects(assertions::assert_no_effects)
        .run();
}

#[test]
fn test_repeated_success_callback_fails_in_strict_mode() {
    let h = harness(2);
    let mut state = h.loan_state();
    let mut paid = pending(state.borrowing.as_ref().unwrap(), PaymentKind::Rental, 8000);
    paid.mark_paid().unwrap();
    state.payments.push(paid.clone());

    ReducerTest::new(PaymentReducer::new())
        .with_env(h.env.clone().with_lenient_callbacks(false))
        .given_state(state)
        .when_action(
            PaymentAction::MarkPaid {
                payment_id: paid.id,
                session_id: None,
            }
            .into(),
        )
        .then_state(move |state| {
            assert_eq!(state.outcome, Some(Err(LendingError::AlreadyPaid(paid.id))));
        })
        .then_effects(assertions::assert_no_effects)
        .run();
}

#[test]
fn test_success_callback_with_foreign_session_is_rejected() {
    let h = harness(2);
    let mut state = h.loan_state();
    let rental = pending(state.borrowing.as_ref().unwrap(), PaymentKind::Rental, 8000);
    state.payments.push(rental.clone());

    ReducerTest::new(PaymentReducer::new())
        .with_env(h.env.clone())
        .given_state(state)
        .when_action(
            PaymentAction::MarkPaid {
                payment_id: rental.id,
                session_id: Some("cs_other".to_string()),
            }
            .into(),
        )
        .then_state(move |state| {
            assert_eq!(
                state.outcome,
                Some(Err(LendingError::SessionMismatch(rental.id)))
            );
            assert!(state.payments[0].is_pending());
        })
        .then_effects(assertions::assert_no_effects)
        .run();
}

#[test]
fn test_cancel_leaves_payment_pending() {
    let h = harness(2);
    let mut state = h.loan_state();
    let rental = pending(state.borrowing.as_ref().unwrap(), PaymentKind::Rental, 8000);
    state.payments.push(rental.clone());

    ReducerTest::new(PaymentReducer::new())
        .with_env(h.env.clone())
        .given_state(state)
        .when_action(PaymentAction::Cancel { payment_id: rental.id }.into())
        .then_state(move |state| {
            assert_eq!(
                state.outcome,
                Some(Ok(LoanOutcome::Cancelled {
                    payment: rental,
                    message: CANCEL_MESSAGE.to_string(),
                }))
            );
        })
        .then_effects(assertions::assert_no_effects)
        .run();
}

#[test]
fn test_unknown_payment_is_not_found() {
    let h = harness(2);
    let payment_id = PaymentId::new();

    ReducerTest::new(PaymentReducer::new())
        .with_env(h.env.clone())
        .given_state(h.loan_state())
        .when_action(
            PaymentAction::MarkPaid {
                payment_id,
                session_id: None,
            }
            .into(),
        )
        .then_state(move |state| {
            assert_eq!(
                state.outcome,
                Some(Err(LendingError::PaymentNotFound(payment_id)))
            );
        })
        .run();
}
