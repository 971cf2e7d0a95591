//! HTTP tests for the lending router over the in-memory wiring.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::{TestResponse, TestServer};
use lending_core::borrowing::LoanEnvironment;
use lending_core::checkout::{CheckoutError, CheckoutLinks};
use lending_core::payment::CANCEL_MESSAGE;
use lending_core::types::{Book, User};
use lending_runtime::{LendingService, NotificationDispatcher};
use lending_testing::{
    FixedClock, InMemoryLendingStore, RecordingNotifier, ScriptedCheckoutGateway, fixtures,
    init_test_tracing, test_clock,
};
use lending_web::{AppState, CORRELATION_ID_HEADER, lending_router};
use serde_json::{Value, json};
use std::sync::Arc;

const USER_HEADER: HeaderName = HeaderName::from_static("x-user-id");

struct Api {
    server: TestServer,
    store: InMemoryLendingStore,
    gateway: ScriptedCheckoutGateway,
    clock: FixedClock,
    reader: User,
    staff: User,
    book: Book,
}

fn api(inventory: u32) -> Api {
    init_test_tracing();
    let store = InMemoryLendingStore::new();
    let gateway = ScriptedCheckoutGateway::new();
    let clock = test_clock();

    let reader = fixtures::user("reader@example.com");
    let staff = fixtures::staff("librarian@example.com");
    let book = fixtures::book("Dune", inventory, 1000);
    store.seed_user(reader.clone());
    store.seed_user(staff.clone());
    store.seed_book(book.clone());

    let env = LoanEnvironment::new(
        Arc::new(clock.clone()),
        Arc::new(gateway.clone()),
        CheckoutLinks::new("http://localhost:8080"),
    );
    let (notifications, _task) =
        NotificationDispatcher::spawn(Arc::new(RecordingNotifier::new()), 16);
    let service = LendingService::new(Arc::new(store.clone()), env, notifications);
    let server = TestServer::new(lending_router(AppState::new(service))).unwrap();

    Api {
        server,
        store,
        gateway,
        clock,
        reader,
        staff,
        book,
    }
}

fn as_user(user: &User) -> HeaderValue {
    HeaderValue::from_str(&user.id.to_string()).unwrap()
}

impl Api {
    async fn borrow(&self, user: &User, expected: &str) -> TestResponse {
        self.server
            .post("/api/borrowings")
            .add_header(USER_HEADER, as_user(user))
            .json(&json!({
                "book_id": self.book.id,
                "expected_return_date": expected,
            }))
            .await
    }

    async fn return_borrowing(&self, user: &User, id: &str) -> TestResponse {
        self.server
            .post(&format!("/api/borrowings/{id}/return"))
            .add_header(USER_HEADER, as_user(user))
            .await
    }
}

#[tokio::test]
async fn test_health_and_correlation_id() {
    let api = api(1);

    let health = api.server.get("/health").await;
    health.assert_status_ok();
    assert!(health.headers().get(CORRELATION_ID_HEADER).is_some());

    let ready = api.server.get("/ready").await;
    ready.assert_status_ok();
    assert_eq!(ready.json::<Value>()["status"], "ready");

    api.store.set_unavailable(true);
    let down = api.server.get("/ready").await;
    down.assert_status(StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_caller_identity_is_required() {
    let api = api(1);

    let anonymous = api.server.get("/api/borrowings").await;
    anonymous.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(anonymous.json::<Value>()["code"], "unauthorized");

    let stranger = api
        .server
        .get("/api/borrowings")
        .add_header(USER_HEADER, as_user(&fixtures::user("ghost@example.com")))
        .await;
    stranger.assert_status(StatusCode::UNAUTHORIZED);

    let me = api
        .server
        .get("/api/users/me")
        .add_header(USER_HEADER, as_user(&api.reader))
        .await;
    me.assert_status_ok();
    assert_eq!(me.json::<Value>()["email"], "reader@example.com");
}

#[tokio::test]
async fn test_register_user() {
    let api = api(1);

    let created = api
        .server
        .post("/api/users")
        .json(&json!({ "email": "new@example.com" }))
        .await;
    created.assert_status(StatusCode::CREATED);
    assert_eq!(created.json::<Value>()["is_staff"], false);

    let duplicate = api
        .server
        .post("/api/users")
        .json(&json!({ "email": "NEW@example.com" }))
        .await;
    duplicate.assert_status(StatusCode::CONFLICT);

    let invalid = api
        .server
        .post("/api/users")
        .json(&json!({ "email": "nobody" }))
        .await;
    invalid.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_catalog_reads_are_public_and_writes_are_staff_only() {
    let api = api(1);
    let new_book = json!({
        "title": "Dune Messiah",
        "author": "Frank Herbert",
        "cover": "Softcover",
        "inventory": 2,
        "daily_fee": "1.50",
    });

    let forbidden = api
        .server
        .post("/api/books")
        .add_header(USER_HEADER, as_user(&api.reader))
        .json(&new_book)
        .await;
    forbidden.assert_status(StatusCode::FORBIDDEN);

    let created = api
        .server
        .post("/api/books")
        .add_header(USER_HEADER, as_user(&api.staff))
        .json(&new_book)
        .await;
    created.assert_status(StatusCode::CREATED);
    assert_eq!(created.json::<Value>()["daily_fee"], "1.50");

    let filtered = api.server.get("/api/books?title=messiah").await;
    filtered.assert_status_ok();
    let books = filtered.json::<Vec<Value>>();
    assert_eq!(books.len(), 1);
    assert_eq!(books[0]["title"], "Dune Messiah");

    let all = api.server.get("/api/books").await.json::<Vec<Value>>();
    assert_eq!(all.len(), 2);

    let missing = api
        .server
        .get(&format!("/api/books/{}", uuid::Uuid::new_v4()))
        .await;
    missing.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_referenced_book_cannot_be_deleted() {
    let api = api(1);
    api.borrow(&api.reader, "2024-04-08")
        .await
        .assert_status(StatusCode::CREATED);

    let refused = api
        .server
        .delete(&format!("/api/books/{}", api.book.id))
        .add_header(USER_HEADER, as_user(&api.staff))
        .await;
    refused.assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_borrow_pay_and_return_on_time() {
    let api = api(1);

    let created = api.borrow(&api.reader, "2024-04-08").await;
    created.assert_status(StatusCode::CREATED);
    let body = created.json::<Value>();
    assert_eq!(body["payment"]["kind"], "rental");
    assert_eq!(body["payment"]["status"], "pending");
    assert_eq!(body["payment"]["money_to_pay"], "80.00");
    assert_eq!(api.store.inventory(api.book.id), Some(0));

    let borrowing_id = body["borrowing"]["id"].as_str().unwrap().to_string();
    let payment_id = body["payment"]["id"].as_str().unwrap().to_string();

    let paid = api
        .server
        .get(&format!("/api/payments/{payment_id}/success?session_id=cs_test_1"))
        .await;
    paid.assert_status_ok();
    let settled = paid.json::<Value>();
    assert_eq!(settled["payment"]["status"], "paid");
    assert_eq!(settled["payment"]["money_to_pay"], "0.00");
    assert_eq!(settled["already_paid"], false);
    assert!(settled.get("returned").is_none());

    let repeat = api
        .server
        .post(&format!("/api/payments/{payment_id}/success"))
        .await;
    repeat.assert_status_ok();
    assert_eq!(repeat.json::<Value>()["already_paid"], true);

    let returned = api.return_borrowing(&api.reader, &borrowing_id).await;
    returned.assert_status_ok();
    let body = returned.json::<Value>();
    assert_eq!(body["status"], "returned");
    assert_eq!(body["borrowing"]["actual_return_date"], "2024-04-01");
    assert_eq!(api.store.inventory(api.book.id), Some(1));

    let again = api.return_borrowing(&api.reader, &borrowing_id).await;
    again.assert_status(StatusCode::CONFLICT);
    assert_eq!(again.json::<Value>()["code"], "already_returned");
}

#[tokio::test]
async fn test_late_return_requires_fine_payment() {
    let api = api(1);
    let created = api.borrow(&api.reader, "2024-04-08").await.json::<Value>();
    let borrowing_id = created["borrowing"]["id"].as_str().unwrap().to_string();

    api.clock.set(fixtures::at(2024, 4, 10));

    let late = api.return_borrowing(&api.reader, &borrowing_id).await;
    late.assert_status(StatusCode::PAYMENT_REQUIRED);
    let body = late.json::<Value>();
    assert_eq!(body["status"], "fine_payment_required");
    assert_eq!(body["payment"]["kind"], "fine");
    assert_eq!(body["payment"]["money_to_pay"], "60.00");
    assert_eq!(api.store.inventory(api.book.id), Some(0));

    let fine_id = body["payment"]["id"].as_str().unwrap().to_string();
    let session_id = body["payment"]["session_id"].as_str().unwrap().to_string();

    let paid = api
        .server
        .post(&format!("/api/payments/{fine_id}/success?session_id={session_id}"))
        .await;
    paid.assert_status_ok();
    let settled = paid.json::<Value>();
    assert_eq!(settled["returned"]["actual_return_date"], "2024-04-10");
    assert_eq!(api.store.inventory(api.book.id), Some(1));
}

#[tokio::test]
async fn test_borrow_rejections() {
    let api = api(1);

    let past = api.borrow(&api.reader, "2024-04-01").await;
    past.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(past.json::<Value>()["code"], "invalid_date");

    api.gateway.fail_next(CheckoutError::Timeout);
    let provider = api.borrow(&api.reader, "2024-04-08").await;
    provider.assert_status(StatusCode::BAD_GATEWAY);
    assert_eq!(provider.json::<Value>()["code"], "payment_provider_error");
    assert_eq!(api.store.inventory(api.book.id), Some(1));

    api.borrow(&api.reader, "2024-04-08")
        .await
        .assert_status(StatusCode::CREATED);
    let exhausted = api.borrow(&api.staff, "2024-04-08").await;
    exhausted.assert_status(StatusCode::CONFLICT);
    assert_eq!(exhausted.json::<Value>()["code"], "inventory_exhausted");
}

#[tokio::test]
async fn test_payment_callbacks() {
    let api = api(1);
    let created = api.borrow(&api.reader, "2024-04-08").await.json::<Value>();
    let payment_id = created["payment"]["id"].as_str().unwrap().to_string();

    let mismatch = api
        .server
        .get(&format!("/api/payments/{payment_id}/success?session_id=cs_other"))
        .await;
    mismatch.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(mismatch.json::<Value>()["code"], "session_mismatch");

    let cancelled = api
        .server
        .get(&format!("/api/payments/{payment_id}/cancel"))
        .await;
    cancelled.assert_status_ok();
    let body = cancelled.json::<Value>();
    assert_eq!(body["message"], CANCEL_MESSAGE);
    assert_eq!(body["payment"]["status"], "pending");

    let unknown = api
        .server
        .post(&format!("/api/payments/{}/success", uuid::Uuid::new_v4()))
        .await;
    unknown.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(unknown.json::<Value>()["code"], "payment_not_found");
}

#[tokio::test]
async fn test_views_are_scoped_to_the_caller() {
    let api = api(2);
    let other = fixtures::user("other@example.com");
    api.store.seed_user(other.clone());

    let mine = api.borrow(&api.reader, "2024-04-08").await.json::<Value>();
    api.borrow(&other, "2024-04-05")
        .await
        .assert_status(StatusCode::CREATED);
    let borrowing_id = mine["borrowing"]["id"].as_str().unwrap().to_string();
    let payment_id = mine["payment"]["id"].as_str().unwrap().to_string();

    let own = api
        .server
        .get("/api/borrowings")
        .add_header(USER_HEADER, as_user(&api.reader))
        .await
        .json::<Vec<Value>>();
    assert_eq!(own.len(), 1);
    assert_eq!(own[0]["book"], "Dune");

    let everyone = api
        .server
        .get("/api/borrowings?is_active=true")
        .add_header(USER_HEADER, as_user(&api.staff))
        .await
        .json::<Vec<Value>>();
    assert_eq!(everyone.len(), 2);

    let narrowed = api
        .server
        .get(&format!("/api/borrowings?user_id={}", other.id))
        .add_header(USER_HEADER, as_user(&api.staff))
        .await
        .json::<Vec<Value>>();
    assert_eq!(narrowed.len(), 1);

    let foreign = api
        .server
        .get(&format!("/api/borrowings/{borrowing_id}"))
        .add_header(USER_HEADER, as_user(&other))
        .await;
    foreign.assert_status(StatusCode::FORBIDDEN);

    let detail = api
        .server
        .get(&format!("/api/borrowings/{borrowing_id}"))
        .add_header(USER_HEADER, as_user(&api.reader))
        .await
        .json::<Value>();
    assert_eq!(detail["book"]["title"], "Dune");
    assert_eq!(detail["payments"].as_array().unwrap().len(), 1);

    let payments = api
        .server
        .get("/api/payments")
        .add_header(USER_HEADER, as_user(&api.reader))
        .await
        .json::<Vec<Value>>();
    assert_eq!(payments.len(), 1);

    let payment = api
        .server
        .get(&format!("/api/payments/{payment_id}"))
        .add_header(USER_HEADER, as_user(&api.reader))
        .await
        .json::<Value>();
    assert_eq!(payment["user_email"], "reader@example.com");
    assert_eq!(payment["book"], "Dune");
    assert_eq!(payment["session_id"], "cs_test_1");
}

#[tokio::test]
async fn test_sweep_is_staff_only() {
    let api = api(1);
    api.borrow(&api.reader, "2024-04-08")
        .await
        .assert_status(StatusCode::CREATED);
    api.clock.set(fixtures::at(2024, 4, 10));

    let forbidden = api
        .server
        .post("/api/borrowings/sweep")
        .add_header(USER_HEADER, as_user(&api.reader))
        .await;
    forbidden.assert_status(StatusCode::FORBIDDEN);

    let swept = api
        .server
        .post("/api/borrowings/sweep")
        .add_header(USER_HEADER, as_user(&api.staff))
        .await;
    swept.assert_status_ok();
    assert_eq!(swept.json::<Value>()["overdue"], 1);
}
