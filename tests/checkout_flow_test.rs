//! End-to-end checkout, payment, cancellation and refund scenarios.
//!
//! These run against a real PostgreSQL database named by `DATABASE_URL` and
//! are ignored by default:
//!
//! ```text
//! DATABASE_URL=postgres://localhost/bookstore_test cargo test -- --ignored
//! ```
//!
//! Fixtures live in `common`; concurrent scenarios are in `concurrency_test.rs`.

mod common;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use bookstore_checkout::error::AppError;
use bookstore_checkout::gateways::mock::MockGateway;
use bookstore_checkout::jobs::{Job, StockSource};
use bookstore_checkout::models::order::{
    CancelOrderRequest, CreateOrderRequest, OrderPaymentStatus, OrderStatus, PaymentMethod,
    ReorderRequest, UpdateOrderStatusRequest,
};
use bookstore_checkout::models::payment::{
    CreatePaymentRequest, Gateway, PaymentStatus, ReconcileRequest, ReconcileStatus, WebhookEvent,
};
use bookstore_checkout::models::refund::{
    ApproveRefundRequest, CreateRefundRequest, RefundStatus, RejectRefundRequest,
};
use bookstore_checkout::repositories::payments;

use common::{set_cart, setup};

#[tokio::test]
#[ignore]
async fn cod_checkout_reserves_stock_and_clears_cart() {
    let w = setup(10, 2).await;

    let created = w
        .orders
        .create_order(
            w.user_id,
            CreateOrderRequest {
                address_id: None,
                payment_method: PaymentMethod::Cod,
                promo_code: None,
                customer_note: Some("Ring twice".into()),
            },
        )
        .await
        .unwrap();

    assert_eq!(created.status, OrderStatus::Confirmed);
    assert_eq!(created.total, dec!(230));
    assert!(created.order_number.starts_with("ORD-"));

    let order = w.order(created.order_id).await;
    assert_eq!(order.payment_status, OrderPaymentStatus::Pending);
    assert_eq!(order.subtotal, dec!(200));
    assert_eq!(order.shipping_fee, dec!(15));
    assert_eq!(order.cod_fee, dec!(15));
    assert_eq!(order.discount_amount, Decimal::ZERO);
    assert_eq!(order.warehouse_id, Some(w.warehouse_id));

    assert_eq!(w.inventory().await, (8, 2));
    assert_eq!(w.cart_size().await, 0);

    let jobs: Vec<Job> = w.jobs.take().into_iter().map(|(job, _)| job).collect();
    assert_eq!(
        jobs,
        vec![Job::StockResync {
            book_id: w.book_id,
            source: StockSource::Sale,
        }]
    );
}

#[tokio::test]
#[ignore]
async fn prepaid_checkout_is_confirmed_by_webhook_once() {
    let w = setup(10, 2).await;

    let order_id = w.place(PaymentMethod::Vnpay).await;
    let order = w.order(order_id).await;
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.total_amount, dec!(215));

    let recorded = w.jobs.take();
    assert!(recorded.iter().any(|(job, options)| {
        *job == Job::AutoReleaseReservation { order_id } && options.delay.is_some()
    }));

    let payment = w
        .payments
        .create_payment(
            w.user_id,
            CreatePaymentRequest {
                order_id,
                gateway: Gateway::Mock,
            },
            "10.0.0.1",
        )
        .await
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Processing);
    assert!(payment.payment_url.is_some());

    let transaction_ref = payment.payment_transaction_id.simple().to_string();
    let body = w
        .mock
        .sign_webhook(WebhookEvent::Payment, &transaction_ref, "TXN-42", "00", dec!(215))
        .unwrap();

    let ack = w
        .payments
        .process_webhook(Gateway::Mock, serde_json::json!({}), &body)
        .await
        .unwrap();
    assert_eq!(ack["status"], "ok");

    let paid = w.order(order_id).await;
    assert_eq!(paid.status, OrderStatus::Confirmed);
    assert_eq!(paid.payment_status, OrderPaymentStatus::Paid);
    assert!(paid.paid_at.is_some());

    // Same callback again: acknowledged, nothing changes
    w.payments
        .process_webhook(Gateway::Mock, serde_json::json!({}), &body)
        .await
        .unwrap();
    let again = w.order(order_id).await;
    assert_eq!(again.version, paid.version);

    let stored = payments::find_by_id(&w.pool, payment.payment_transaction_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, PaymentStatus::Success);
    assert_eq!(stored.gateway_transaction_id.as_deref(), Some("TXN-42"));

    let (received, duplicates): (i64, i64) = sqlx::query_as(
        "SELECT COUNT(*), COUNT(*) FILTER (WHERE is_duplicate) FROM payment_webhook_logs WHERE request_body = $1",
    )
    .bind(String::from_utf8(body).unwrap())
    .fetch_one(&w.pool)
    .await
    .unwrap();
    assert_eq!((received, duplicates), (2, 1));
}

#[tokio::test]
#[ignore]
async fn tampered_webhook_is_rejected_and_logged() {
    let w = setup(10, 1).await;
    let order_id = w.place(PaymentMethod::Vnpay).await;
    let payment = w
        .payments
        .create_payment(
            w.user_id,
            CreatePaymentRequest {
                order_id,
                gateway: Gateway::Mock,
            },
            "10.0.0.1",
        )
        .await
        .unwrap();

    let body = MockGateway::new("wrong-secret")
        .sign_webhook(
            WebhookEvent::Payment,
            &payment.payment_transaction_id.simple().to_string(),
            "TXN-FORGED",
            "00",
            payment.amount,
        )
        .unwrap();

    let err = w
        .payments
        .process_webhook(Gateway::Mock, serde_json::json!({}), &body)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidSignature));
    assert_eq!(
        w.order(order_id).await.payment_status,
        OrderPaymentStatus::Pending
    );
}

#[tokio::test]
#[ignore]
async fn expired_payment_cancels_order_and_releases_stock() {
    let w = setup(10, 2).await;
    let order_id = w.place(PaymentMethod::Vnpay).await;
    let payment = w
        .payments
        .create_payment(
            w.user_id,
            CreatePaymentRequest {
                order_id,
                gateway: Gateway::Mock,
            },
            "10.0.0.1",
        )
        .await
        .unwrap();
    w.jobs.take();

    sqlx::query(
        "UPDATE payment_transactions SET initiated_at = NOW() - INTERVAL '16 minutes' WHERE id = $1",
    )
    .bind(payment.payment_transaction_id)
    .execute(&w.pool)
    .await
    .unwrap();

    let report = w.payments.cancel_expired(1000).await.unwrap();
    assert!(report.payments_cancelled >= 1);

    let order = w.order(order_id).await;
    assert_eq!(order.status, OrderStatus::Cancelled);
    assert_eq!(
        order.cancellation_reason.as_deref(),
        Some("Payment timeout after 15 minutes")
    );
    assert_eq!(w.inventory().await, (10, 0));

    let stored = payments::find_by_id(&w.pool, payment.payment_transaction_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, PaymentStatus::Cancelled);

    assert!(w.jobs.take().iter().any(|(job, _)| {
        *job == Job::StockResync {
            book_id: w.book_id,
            source: StockSource::OrderCancelled,
        }
    }));

    // A second pass finds nothing left to do for this order
    w.payments.cancel_expired(1000).await.unwrap();
    assert_eq!(w.order(order_id).await.version, order.version);
}

#[tokio::test]
#[ignore]
async fn stale_admin_update_loses_to_customer_cancel() {
    let w = setup(10, 1).await;
    let order_id = w.place(PaymentMethod::Vnpay).await;
    let seen = w.order(order_id).await.version;

    let cancelled = w
        .orders
        .cancel_order(
            w.user_id,
            order_id,
            CancelOrderRequest {
                cancellation_reason: "Changed my mind".into(),
                version: seen,
            },
        )
        .await
        .unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(cancelled.version, seen + 1);

    let err = w
        .orders
        .update_order_status(
            w.admin_id,
            order_id,
            UpdateOrderStatusRequest {
                status: OrderStatus::Confirmed,
                version: seen,
                tracking_number: None,
                admin_note: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::VersionMismatch));

    let order = w.order(order_id).await;
    assert_eq!(order.status, OrderStatus::Cancelled);
    assert_eq!(order.version, seen + 1);
    assert_eq!(w.inventory().await, (10, 0));
}

#[tokio::test]
#[ignore]
async fn insufficient_stock_leaves_no_trace() {
    let w = setup(3, 5).await;

    let err = w
        .orders
        .create_order(
            w.user_id,
            CreateOrderRequest {
                address_id: None,
                payment_method: PaymentMethod::Cod,
                promo_code: None,
                customer_note: None,
            },
        )
        .await
        .unwrap_err();

    match err {
        AppError::InsufficientStock { book_id } => assert_eq!(book_id, w.book_id),
        other => panic!("expected InsufficientStock, got {other:?}"),
    }

    let order_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE user_id = $1")
        .bind(w.user_id)
        .fetch_one(&w.pool)
        .await
        .unwrap();
    assert_eq!(order_count, 0);
    assert_eq!(w.inventory().await, (3, 0));
    assert_eq!(w.cart_size().await, 1);
    assert!(w.jobs.recorded().is_empty());
}

#[tokio::test]
#[ignore]
async fn refund_window_and_completion() {
    let w = setup(10, 1).await;
    let (order_id, payment_id) = w.place_paid().await;

    w.admin_move(order_id, OrderStatus::Processing).await;
    w.admin_move(order_id, OrderStatus::Shipping).await;
    w.admin_move(order_id, OrderStatus::Delivered).await;
    assert_eq!(w.inventory().await, (9, 0));

    let set_delivered = |days: i64| {
        sqlx::query("UPDATE orders SET delivered_at = $2 WHERE id = $1")
            .bind(order_id)
            .bind(Utc::now() - Duration::days(days))
    };

    set_delivered(8).execute(&w.pool).await.unwrap();
    let err = w
        .refunds
        .request_refund(
            w.user_id,
            payment_id,
            CreateRefundRequest {
                reason: "Damaged cover".into(),
                proof_images: vec![],
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::RefundWindowExpired));

    set_delivered(6).execute(&w.pool).await.unwrap();
    let refund = w
        .refunds
        .request_refund(
            w.user_id,
            payment_id,
            CreateRefundRequest {
                reason: "Damaged cover".into(),
                proof_images: vec!["https://img.example.test/1.jpg".into()],
            },
        )
        .await
        .unwrap();
    assert_eq!(refund.status, RefundStatus::Pending);
    assert_eq!(refund.amount, dec!(115));
    assert!(refund.transaction_ref.starts_with("RF"));

    let approved = w
        .refunds
        .approve(w.admin_id, refund.id, ApproveRefundRequest { notes: None })
        .await
        .unwrap();
    assert_eq!(approved.status, RefundStatus::Processing);
    assert_eq!(w.mock.refunds(), vec![refund.transaction_ref.clone()]);

    let body = w
        .mock
        .sign_webhook(
            WebhookEvent::Refund,
            &refund.transaction_ref,
            &format!("REFUND-{}", refund.id.simple()),
            "00",
            refund.amount,
        )
        .unwrap();
    w.payments
        .process_webhook(Gateway::Mock, serde_json::json!({}), &body)
        .await
        .unwrap();

    let completed = w.refunds.get_refund(refund.id).await.unwrap();
    assert_eq!(completed.status, RefundStatus::Completed);

    let payment = payments::find_by_id(&w.pool, payment_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Refunded);
    assert_eq!(payment.refunded_amount, payment.amount);
    assert_eq!(
        w.order(order_id).await.payment_status,
        OrderPaymentStatus::Refunded
    );
}

#[tokio::test]
#[ignore]
async fn failed_callbacks_without_provider_id_each_apply() {
    let w = setup(10, 1).await;

    let mut attempts = Vec::new();
    for _ in 0..2 {
        set_cart(&w.pool, w.user_id, &[(w.book_id, 1)]).await;
        let order_id = w.place(PaymentMethod::Vnpay).await;
        let payment_id = w.start_payment(order_id).await;
        attempts.push((order_id, payment_id));
    }
    let amount = w.order(attempts[0].0).await.total_amount;

    // Declined payments carry the provider's placeholder transaction id
    for (_, payment_id) in &attempts {
        let body = w.payment_callback(*payment_id, "0", "24", amount);
        let ack = w
            .payments
            .process_webhook(Gateway::Mock, serde_json::json!({}), &body)
            .await
            .unwrap();
        assert_eq!(ack["status"], "ok");
    }

    for (order_id, payment_id) in &attempts {
        let payment = payments::find_by_id(&w.pool, *payment_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(payment.status, PaymentStatus::Failed);
        assert_eq!(payment.error_code.as_deref(), Some("USER_CANCELLED"));
        assert_eq!(
            w.order(*order_id).await.payment_status,
            OrderPaymentStatus::Failed
        );
    }

    // Replaying one of them is still a duplicate
    let replay = w.payment_callback(attempts[0].1, "0", "24", amount);
    w.payments
        .process_webhook(Gateway::Mock, serde_json::json!({}), &replay)
        .await
        .unwrap();
    let duplicates: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM payment_webhook_logs WHERE request_body = $1 AND is_duplicate",
    )
    .bind(String::from_utf8(replay).unwrap())
    .fetch_one(&w.pool)
    .await
    .unwrap();
    assert_eq!(duplicates, 1);
}

#[tokio::test]
#[ignore]
async fn gateway_outage_fails_the_attempt_and_allows_a_retry() {
    let w = setup(10, 1).await;
    let order_id = w.place(PaymentMethod::Vnpay).await;

    w.mock.set_unavailable(true);
    let err = w
        .payments
        .create_payment(
            w.user_id,
            CreatePaymentRequest {
                order_id,
                gateway: Gateway::Mock,
            },
            "10.0.0.1",
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::GatewayUnavailable(_)));

    let (status, error_code): (String, Option<String>) = sqlx::query_as(
        "SELECT status, error_code FROM payment_transactions WHERE order_id = $1",
    )
    .bind(order_id)
    .fetch_one(&w.pool)
    .await
    .unwrap();
    assert_eq!(status, "failed");
    assert_eq!(error_code.as_deref(), Some("GATEWAY_UNAVAILABLE"));

    w.mock.set_unavailable(false);
    let payment_id = w.start_payment(order_id).await;
    let payment = payments::find_by_id(&w.pool, payment_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Processing);
    assert_eq!(payment.retry_count, 1);
}

#[tokio::test]
#[ignore]
async fn reorder_reuses_items_and_method_but_not_the_promotion() {
    let w = setup(10, 2).await;

    let code = format!("SAVE10-{}", Uuid::new_v4().simple());
    sqlx::query(
        r#"
        INSERT INTO promotions (code, promo_type, discount_value, starts_at, expires_at)
        VALUES ($1, 'percentage', 10, NOW() - INTERVAL '1 day', NOW() + INTERVAL '1 day')
        "#,
    )
    .bind(&code)
    .execute(&w.pool)
    .await
    .unwrap();
    sqlx::query("UPDATE carts SET promotion_code = $2 WHERE user_id = $1")
        .bind(w.user_id)
        .bind(&code)
        .execute(&w.pool)
        .await
        .unwrap();

    let original_id = w.place(PaymentMethod::Momo).await;
    let original = w.order(original_id).await;
    assert_eq!(original.discount_amount, dec!(20));
    assert_eq!(original.total_amount, dec!(195));

    let again = w
        .orders
        .reorder(
            w.user_id,
            ReorderRequest {
                order_id: original_id,
                address_id: None,
            },
        )
        .await
        .unwrap();
    assert_ne!(again.order_id, original_id);
    assert_eq!(again.status, OrderStatus::Pending);
    assert_eq!(again.total, dec!(215));

    let reordered = w.order(again.order_id).await;
    assert_eq!(reordered.payment_method, PaymentMethod::Momo);
    assert_eq!(reordered.promotion_id, None);
    assert_eq!(reordered.discount_amount, Decimal::ZERO);
    assert_eq!(reordered.address_id, original.address_id);
    assert_eq!(w.inventory().await, (6, 4));

    // Someone else's order cannot be re-placed
    let stranger = common::seed_user(&w.pool, "stranger").await;
    let err = w
        .orders
        .reorder(
            stranger,
            ReorderRequest {
                order_id: original_id,
                address_id: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotOwner));
}

#[tokio::test]
#[ignore]
async fn auto_release_cancels_only_unpaid_orders() {
    let w = setup(10, 2).await;
    let unpaid = w.place(PaymentMethod::Vnpay).await;
    assert_eq!(w.inventory().await, (8, 2));

    assert!(w.orders.release_unpaid(unpaid).await.unwrap());
    let order = w.order(unpaid).await;
    assert_eq!(order.status, OrderStatus::Cancelled);
    assert_eq!(w.inventory().await, (10, 0));

    // Delivered twice: the second run changes nothing
    assert!(!w.orders.release_unpaid(unpaid).await.unwrap());
    assert_eq!(w.order(unpaid).await.version, order.version);

    set_cart(&w.pool, w.user_id, &[(w.book_id, 1)]).await;
    let (paid, _) = w.place_paid().await;
    assert!(!w.orders.release_unpaid(paid).await.unwrap());
    assert_eq!(w.order(paid).await.status, OrderStatus::Confirmed);
    assert_eq!(w.inventory().await, (9, 1));

    assert!(!w.orders.release_unpaid(Uuid::new_v4()).await.unwrap());
}

#[tokio::test]
#[ignore]
async fn admin_reconcile_settles_payment_and_is_audited() {
    let w = setup(10, 1).await;
    let order_id = w.place(PaymentMethod::Vnpay).await;
    let payment_id = w.start_payment(order_id).await;

    let reconciled = w
        .payments
        .admin_reconcile(
            w.admin_id,
            payment_id,
            ReconcileRequest {
                status: ReconcileStatus::Success,
                gateway_transaction_id: None,
                notes: Some("Confirmed on the merchant portal".into()),
            },
        )
        .await
        .unwrap();
    assert_eq!(reconciled.status, PaymentStatus::Success);
    assert_eq!(
        reconciled.gateway_transaction_id,
        Some(format!("MANUAL-{}", payment_id.simple()))
    );

    let order = w.order(order_id).await;
    assert_eq!(order.status, OrderStatus::Confirmed);
    assert_eq!(order.payment_status, OrderPaymentStatus::Paid);
    assert_eq!(w.audit_rows("payment.reconcile", payment_id).await, 1);

    let err = w
        .payments
        .admin_reconcile(
            w.admin_id,
            payment_id,
            ReconcileRequest {
                status: ReconcileStatus::Success,
                gateway_transaction_id: None,
                notes: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidStatus(_)));
    assert_eq!(w.audit_rows("payment.reconcile", payment_id).await, 1);
}

#[tokio::test]
#[ignore]
async fn failed_webhook_is_applied_on_retry() {
    let w = setup(10, 1).await;
    let order_id = w.place(PaymentMethod::Vnpay).await;
    let amount = w.order(order_id).await.total_amount;

    // The callback names an attempt that is not visible yet
    let payment_id = Uuid::new_v4();
    let body = w.payment_callback(payment_id, "TXN-LATE", "00", amount);
    let err = w
        .payments
        .process_webhook(Gateway::Mock, serde_json::json!({}), &body)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::PaymentNotFound));

    sqlx::query(
        r#"
        INSERT INTO payment_transactions (id, order_id, gateway, amount, status)
        VALUES ($1, $2, 'mock', $3, 'processing')
        "#,
    )
    .bind(payment_id)
    .bind(order_id)
    .bind(amount)
    .execute(&w.pool)
    .await
    .unwrap();

    let report = w.payments.retry_failed_webhooks(10_000).await.unwrap();
    assert!(report.succeeded >= 1);

    let order = w.order(order_id).await;
    assert_eq!(order.payment_status, OrderPaymentStatus::Paid);
    assert_eq!(order.status, OrderStatus::Confirmed);

    let (processed, retries): (bool, i32) = sqlx::query_as(
        "SELECT processed, retry_count FROM payment_webhook_logs WHERE request_body = $1",
    )
    .bind(String::from_utf8(body).unwrap())
    .fetch_one(&w.pool)
    .await
    .unwrap();
    assert!(processed);
    assert_eq!(retries, 1);
}

#[tokio::test]
#[ignore]
async fn rejected_refund_is_audited_and_can_be_requested_again() {
    let w = setup(10, 1).await;
    let (_, payment_id) = w.delivered_order().await;

    let refund = w
        .refunds
        .request_refund(
            w.user_id,
            payment_id,
            CreateRefundRequest {
                reason: "Wrong edition".into(),
                proof_images: vec![],
            },
        )
        .await
        .unwrap();

    let err = w
        .refunds
        .reject(w.admin_id, refund.id, RejectRefundRequest { reason: "  ".into() })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidRequest(_)));

    let rejected = w
        .refunds
        .reject(
            w.admin_id,
            refund.id,
            RejectRefundRequest {
                reason: "Edition matches the listing".into(),
            },
        )
        .await
        .unwrap();
    assert_eq!(rejected.status, RefundStatus::Rejected);
    assert_eq!(rejected.rejected_by, Some(w.admin_id));
    assert_eq!(w.audit_rows("refund.reject", refund.id).await, 1);

    // Rejected requests are closed: neither approvable nor blocking a new one
    let err = w
        .refunds
        .approve(w.admin_id, refund.id, ApproveRefundRequest { notes: None })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidStatus(_)));

    let second = w
        .refunds
        .request_refund(
            w.user_id,
            payment_id,
            CreateRefundRequest {
                reason: "Wrong edition, photos attached".into(),
                proof_images: vec!["https://img.example.test/2.jpg".into()],
            },
        )
        .await
        .unwrap();
    assert_eq!(second.status, RefundStatus::Pending);
}

#[tokio::test]
#[ignore]
async fn refund_gateway_outage_is_recorded_and_never_resent() {
    let w = setup(10, 1).await;
    let (_, payment_id) = w.delivered_order().await;

    let refund = w
        .refunds
        .request_refund(
            w.user_id,
            payment_id,
            CreateRefundRequest {
                reason: "Pages missing".into(),
                proof_images: vec![],
            },
        )
        .await
        .unwrap();

    w.mock.set_unavailable(true);
    let failed = w
        .refunds
        .approve(w.admin_id, refund.id, ApproveRefundRequest { notes: None })
        .await
        .unwrap();
    assert_eq!(failed.status, RefundStatus::Failed);
    assert!(failed.approved_at.is_some());
    assert!(failed.error_message.is_some());
    assert_eq!(w.audit_rows("refund.approve", refund.id).await, 1);

    // Approval is committed before the gateway call; a request stuck in
    // `approved` (caller dropped mid-call) cannot be approved again
    w.mock.set_unavailable(false);
    let stuck = w
        .refunds
        .request_refund(
            w.user_id,
            payment_id,
            CreateRefundRequest {
                reason: "Pages missing, second try".into(),
                proof_images: vec![],
            },
        )
        .await
        .unwrap();
    sqlx::query("UPDATE refund_requests SET status = 'approved' WHERE id = $1")
        .bind(stuck.id)
        .execute(&w.pool)
        .await
        .unwrap();

    let err = w
        .refunds
        .approve(w.admin_id, stuck.id, ApproveRefundRequest { notes: None })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidStatus(_)));
    assert!(w.mock.refunds().is_empty());
}
