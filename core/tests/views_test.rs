//! List and detail views over the in-memory store.

#![allow(clippy::unwrap_used)]

use lending_core::store::{BorrowingFilter, PaymentFilter};
use lending_core::types::{
    Borrowing, BorrowingId, Money, Payment, PaymentId, PaymentKind, PaymentStatus,
};
use lending_core::views;
use lending_testing::{InMemoryLendingStore, fixtures};

struct Seeded {
    store: InMemoryLendingStore,
    active: Borrowing,
    returned: Borrowing,
    fine: Payment,
}

fn seeded() -> Seeded {
    let store = InMemoryLendingStore::new();
    let reader = fixtures::user("reader@example.com");
    let other = fixtures::user("other@example.com");
    let dune = fixtures::book("Dune", 1, 1000);
    let emma = fixtures::book("Emma", 1, 500);
    store.seed_user(reader.clone());
    store.seed_user(other.clone());
    store.seed_book(dune.clone());
    store.seed_book(emma.clone());

    let active = Borrowing::new(
        BorrowingId::new(),
        reader.id,
        dune.id,
        fixtures::at(2024, 4, 2),
        fixtures::date(2024, 4, 8),
    )
    .unwrap();
    let mut returned = Borrowing::new(
        BorrowingId::new(),
        other.id,
        emma.id,
        fixtures::at(2024, 4, 1),
        fixtures::date(2024, 4, 5),
    )
    .unwrap();
    returned.mark_returned(fixtures::date(2024, 4, 4)).unwrap();
    store.seed_borrowing(active.clone());
    store.seed_borrowing(returned.clone());

    let fine = Payment {
        id: PaymentId::new(),
        borrowing_id: active.id,
        kind: PaymentKind::Fine,
        status: PaymentStatus::Pending,
        session_id: "cs_fine".to_string(),
        session_url: "https://checkout.test/pay/cs_fine".to_string(),
        money_to_pay: Money::from_cents(6000),
    };
    store.seed_payment(fine.clone());

    Seeded {
        store,
        active,
        returned,
        fine,
    }
}

#[tokio::test]
async fn test_borrowing_list_shows_title_and_filters() {
    let s = seeded();

    let all = views::list_borrowings(&s.store, BorrowingFilter::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].id, s.active.id, "newest first");
    assert_eq!(all[0].book, "Dune");

    let active = views::list_borrowings(
        &s.store,
        BorrowingFilter {
            is_active: Some(true),
            ..BorrowingFilter::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, s.active.id);

    let returned_for_user = views::list_borrowings(
        &s.store,
        BorrowingFilter {
            user_id: Some(s.returned.user_id),
            is_active: Some(false),
        },
    )
    .await
    .unwrap();
    assert_eq!(returned_for_user.len(), 1);
    assert_eq!(returned_for_user[0].book, "Emma");
}

#[tokio::test]
async fn test_borrowing_detail_has_full_book_and_payments() {
    let s = seeded();

    let detail = views::borrowing_detail(&s.store, s.active.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(detail.book.title, "Dune");
    assert_eq!(detail.book.daily_fee, Money::from_cents(1000));
    assert_eq!(detail.payments.len(), 1);
    assert_eq!(detail.payments[0].id, s.fine.id);

    assert!(
        views::borrowing_detail(&s.store, BorrowingId::new())
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_payment_views() {
    let s = seeded();

    let mine = views::list_payments(
        &s.store,
        PaymentFilter {
            user_id: Some(s.active.user_id),
        },
    )
    .await
    .unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].kind, PaymentKind::Fine);

    let theirs = views::list_payments(
        &s.store,
        PaymentFilter {
            user_id: Some(s.returned.user_id),
        },
    )
    .await
    .unwrap();
    assert!(theirs.is_empty());

    let detail = views::payment_detail(&s.store, s.fine.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(detail.user_email, "reader@example.com");
    assert_eq!(detail.book, "Dune");
    assert_eq!(detail.return_date, fixtures::date(2024, 4, 8));
    assert_eq!(detail.session_id, "cs_fine");

    let json = serde_json::to_value(&mine[0]).unwrap();
    assert_eq!(json["type"], "fine");
    assert_eq!(json["status"], "pending");
    assert_eq!(json["money_to_pay"], "60.00");
}
