//! Checkouts and callbacks racing on the same rows.
//!
//! Like the other database tests these need `DATABASE_URL` and run with
//! `cargo test -- --ignored`.

mod common;

use std::collections::HashSet;

use bookstore_checkout::error::AppError;
use bookstore_checkout::models::order::{OrderStatus, PaymentMethod};
use bookstore_checkout::models::payment::{Gateway, PaymentStatus};
use bookstore_checkout::repositories::payments;

use common::{checkout_request, seed_book, seed_user, set_cart, setup};

#[tokio::test]
#[ignore]
async fn opposite_cart_orders_do_not_deadlock() {
    let w = setup(100, 1).await;
    let other_book = seed_book(&w.pool, w.warehouse_id, 100).await;

    for _ in 0..10 {
        let forward = seed_user(&w.pool, "forward").await;
        let backward = seed_user(&w.pool, "backward").await;
        set_cart(&w.pool, forward, &[(w.book_id, 1), (other_book, 1)]).await;
        set_cart(&w.pool, backward, &[(other_book, 1), (w.book_id, 1)]).await;

        let mut tasks = Vec::new();
        for user_id in [forward, backward] {
            let orders = w.orders.clone();
            tasks.push(tokio::spawn(async move {
                orders
                    .create_order(user_id, checkout_request(PaymentMethod::Cod))
                    .await
            }));
        }
        for t in tasks {
            let placed = t.await.unwrap();
            assert!(placed.is_ok(), "checkout failed: {:?}", placed.err());
        }
    }

    assert_eq!(w.inventory().await, (80, 20));
    assert_eq!(w.inventory_of(other_book).await, (80, 20));
}

#[tokio::test]
#[ignore]
async fn concurrent_checkouts_never_oversell() {
    let w = setup(5, 1).await;

    let mut buyers = vec![w.user_id];
    for _ in 0..7 {
        let user_id = seed_user(&w.pool, "buyer").await;
        set_cart(&w.pool, user_id, &[(w.book_id, 1)]).await;
        buyers.push(user_id);
    }

    let mut tasks = Vec::new();
    for user_id in buyers {
        let orders = w.orders.clone();
        tasks.push(tokio::spawn(async move {
            orders
                .create_order(user_id, checkout_request(PaymentMethod::Vnpay))
                .await
        }));
    }

    let mut placed = 0;
    let mut short = 0;
    for t in tasks {
        match t.await.unwrap() {
            Ok(_) => placed += 1,
            Err(AppError::InsufficientStock { book_id }) => {
                assert_eq!(book_id, w.book_id);
                short += 1;
            }
            Err(e) => panic!("unexpected checkout error: {e}"),
        }
    }

    assert_eq!(placed, 5);
    assert_eq!(short, 3);
    assert_eq!(w.inventory().await, (0, 5));
}

#[tokio::test]
#[ignore]
async fn concurrent_checkouts_get_distinct_order_numbers() {
    let w = setup(50, 1).await;

    let mut buyers = vec![w.user_id];
    for _ in 0..9 {
        let user_id = seed_user(&w.pool, "buyer").await;
        set_cart(&w.pool, user_id, &[(w.book_id, 1)]).await;
        buyers.push(user_id);
    }

    let mut tasks = Vec::new();
    for user_id in buyers {
        let orders = w.orders.clone();
        tasks.push(tokio::spawn(async move {
            orders
                .create_order(user_id, checkout_request(PaymentMethod::Cod))
                .await
        }));
    }

    let mut numbers = HashSet::new();
    for t in tasks {
        let placed = t.await.unwrap().unwrap();
        assert!(placed.order_number.starts_with("ORD-"));
        numbers.insert(placed.order_number);
    }
    assert_eq!(numbers.len(), 10);
}

#[tokio::test]
#[ignore]
async fn concurrent_duplicate_webhooks_apply_once() {
    let w = setup(10, 1).await;
    let order_id = w.place(PaymentMethod::Vnpay).await;
    let payment_id = w.start_payment(order_id).await;
    let amount = w.order(order_id).await.total_amount;
    let body = w.payment_callback(payment_id, "TXN-RACE", "00", amount);

    let mut tasks = Vec::new();
    for _ in 0..4 {
        let payments = w.payments.clone();
        let body = body.clone();
        tasks.push(tokio::spawn(async move {
            payments
                .process_webhook(Gateway::Mock, serde_json::json!({}), &body)
                .await
        }));
    }
    for t in tasks {
        let ack = t.await.unwrap().unwrap();
        assert_eq!(ack["status"], "ok");
    }

    let (processed, duplicates): (i64, i64) = sqlx::query_as(
        r#"
        SELECT COUNT(*) FILTER (WHERE processed), COUNT(*) FILTER (WHERE is_duplicate)
        FROM payment_webhook_logs
        WHERE request_body = $1
        "#,
    )
    .bind(String::from_utf8(body).unwrap())
    .fetch_one(&w.pool)
    .await
    .unwrap();
    assert_eq!((processed, duplicates), (1, 3));

    let payment = payments::find_by_id(&w.pool, payment_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Success);
    assert_eq!(w.order(order_id).await.status, OrderStatus::Confirmed);

    let confirmations: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM order_status_history WHERE order_id = $1 AND to_status = 'confirmed'",
    )
    .bind(order_id)
    .fetch_one(&w.pool)
    .await
    .unwrap();
    assert_eq!(confirmations, 1);
}
