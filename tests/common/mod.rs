//! Shared fixtures for the database-backed tests.
//!
//! Each [`World`] seeds its own users, warehouse and book under a random
//! suffix, so tests can share one database and run in parallel.

#![allow(dead_code)]

use std::sync::Arc;
use uuid::Uuid;

use bookstore_checkout::config::Config;
use bookstore_checkout::db::{self, DbPool};
use bookstore_checkout::gateways::GatewayRegistry;
use bookstore_checkout::gateways::mock::MockGateway;
use bookstore_checkout::jobs::memory::RecordingDispatcher;
use bookstore_checkout::models::order::{
    CreateOrderRequest, Order, OrderStatus, PaymentMethod, UpdateOrderStatusRequest,
};
use bookstore_checkout::models::payment::{CreatePaymentRequest, Gateway, WebhookEvent};
use bookstore_checkout::repositories::orders;
use bookstore_checkout::services::order_service::OrderService;
use bookstore_checkout::services::payment_service::PaymentService;
use bookstore_checkout::services::refund_service::RefundService;

pub const MOCK_SECRET: &str = "mock-webhook-secret";

pub struct World {
    pub pool: DbPool,
    pub jobs: Arc<RecordingDispatcher>,
    pub mock: Arc<MockGateway>,
    pub orders: OrderService,
    pub payments: PaymentService,
    pub refunds: RefundService,
    pub user_id: Uuid,
    pub admin_id: Uuid,
    pub warehouse_id: Uuid,
    pub book_id: Uuid,
}

/// One warehouse holding `stock` copies of one book at 100, and a reader
/// whose cart holds `cart_quantity` of it.
pub async fn setup(stock: i32, cart_quantity: i32) -> World {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = db::create_pool(&url, 20).await.expect("connect");
    db::run_migrations(&pool).await.expect("migrate");

    let suffix = Uuid::new_v4().simple().to_string();
    let user_id = seed_user(&pool, "reader").await;
    let admin_id = seed_user(&pool, "admin").await;

    let warehouse_code = format!("WH-{suffix}");
    let warehouse_id: Uuid = sqlx::query_scalar(
        "INSERT INTO warehouses (code, name, is_default) VALUES ($1, 'Test warehouse', FALSE) RETURNING id",
    )
    .bind(&warehouse_code)
    .fetch_one(&pool)
    .await
    .unwrap();

    let book_id = seed_book(&pool, warehouse_id, stock).await;
    set_cart(&pool, user_id, &[(book_id, cart_quantity)]).await;

    let mut config = Config::for_tests(&url);
    config.default_warehouse_code = warehouse_code;
    let config = Arc::new(config);

    let jobs = Arc::new(RecordingDispatcher::new());
    let mock = Arc::new(MockGateway::new(MOCK_SECRET));
    let gateways = GatewayRegistry::new().register(mock.clone());

    let orders = OrderService::new(pool.clone(), config.clone(), jobs.clone());
    let payments = PaymentService::new(
        pool.clone(),
        config.clone(),
        gateways.clone(),
        orders.clone(),
    );
    let refunds = RefundService::new(pool.clone(), config, gateways);

    World {
        pool,
        jobs,
        mock,
        orders,
        payments,
        refunds,
        user_id,
        admin_id,
        warehouse_id,
        book_id,
    }
}

/// A user with a default address and no coordinates.
pub async fn seed_user(pool: &DbPool, label: &str) -> Uuid {
    let user_id: Uuid = sqlx::query_scalar(
        "INSERT INTO users (email, full_name) VALUES ($1, $2) RETURNING id",
    )
    .bind(format!("{label}-{}@example.test", Uuid::new_v4().simple()))
    .bind(format!("Test {label}"))
    .fetch_one(pool)
    .await
    .unwrap();

    sqlx::query(
        r#"
        INSERT INTO addresses (user_id, recipient_name, phone, street, province, is_default)
        VALUES ($1, 'Test Reader', '0900000000', '1 Book Street', 'Ha Noi', TRUE)
        "#,
    )
    .bind(user_id)
    .execute(pool)
    .await
    .unwrap();

    user_id
}

/// A book priced 100 with `stock` available copies in `warehouse_id`.
pub async fn seed_book(pool: &DbPool, warehouse_id: Uuid, stock: i32) -> Uuid {
    let book_id: Uuid = sqlx::query_scalar(
        "INSERT INTO books (title, slug, price) VALUES ('Test Book', $1, 100) RETURNING id",
    )
    .bind(format!("book-{}", Uuid::new_v4().simple()))
    .fetch_one(pool)
    .await
    .unwrap();

    sqlx::query(
        "INSERT INTO inventory_rows (warehouse_id, book_id, available_quantity) VALUES ($1, $2, $3)",
    )
    .bind(warehouse_id)
    .bind(book_id)
    .bind(stock)
    .execute(pool)
    .await
    .unwrap();

    book_id
}

/// Replace the user's cart with `lines`, added one second apart in the order given.
pub async fn set_cart(pool: &DbPool, user_id: Uuid, lines: &[(Uuid, i32)]) {
    let cart_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO carts (user_id) VALUES ($1)
        ON CONFLICT (user_id) DO UPDATE SET updated_at = NOW()
        RETURNING id
        "#,
    )
    .bind(user_id)
    .fetch_one(pool)
    .await
    .unwrap();

    sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
        .bind(cart_id)
        .execute(pool)
        .await
        .unwrap();

    for (position, (book_id, quantity)) in lines.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO cart_items (cart_id, book_id, quantity, added_at)
            VALUES ($1, $2, $3, NOW() - make_interval(secs => $4))
            "#,
        )
        .bind(cart_id)
        .bind(book_id)
        .bind(quantity)
        .bind((lines.len() - position) as f64)
        .execute(pool)
        .await
        .unwrap();
    }
}

pub fn checkout_request(payment_method: PaymentMethod) -> CreateOrderRequest {
    CreateOrderRequest {
        address_id: None,
        payment_method,
        promo_code: None,
        customer_note: None,
    }
}

impl World {
    pub async fn inventory(&self) -> (i32, i32) {
        self.inventory_of(self.book_id).await
    }

    pub async fn inventory_of(&self, book_id: Uuid) -> (i32, i32) {
        sqlx::query_as(
            "SELECT available_quantity, reserved_quantity FROM inventory_rows WHERE warehouse_id = $1 AND book_id = $2",
        )
        .bind(self.warehouse_id)
        .bind(book_id)
        .fetch_one(&self.pool)
        .await
        .unwrap()
    }

    pub async fn cart_size(&self) -> i64 {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM cart_items ci JOIN carts c ON c.id = ci.cart_id WHERE c.user_id = $1",
        )
        .bind(self.user_id)
        .fetch_one(&self.pool)
        .await
        .unwrap()
    }

    pub async fn order(&self, order_id: Uuid) -> Order {
        orders::find_by_id(&self.pool, order_id)
            .await
            .unwrap()
            .unwrap()
    }

    pub async fn place(&self, payment_method: PaymentMethod) -> Uuid {
        self.orders
            .create_order(self.user_id, checkout_request(payment_method))
            .await
            .unwrap()
            .order_id
    }

    /// Start a mock-gateway payment for `order_id`; returns the attempt id.
    pub async fn start_payment(&self, order_id: Uuid) -> Uuid {
        self.payments
            .create_payment(
                self.user_id,
                CreatePaymentRequest {
                    order_id,
                    gateway: Gateway::Mock,
                },
                "127.0.0.1",
            )
            .await
            .unwrap()
            .payment_transaction_id
    }

    /// Signed mock callback for a payment attempt.
    pub fn payment_callback(
        &self,
        payment_id: Uuid,
        provider_id: &str,
        result_code: &str,
        amount: rust_decimal::Decimal,
    ) -> Vec<u8> {
        self.mock
            .sign_webhook(
                WebhookEvent::Payment,
                &payment_id.simple().to_string(),
                provider_id,
                result_code,
                amount,
            )
            .unwrap()
    }

    /// Place a prepaid order and pay it through the mock gateway.
    pub async fn place_paid(&self) -> (Uuid, Uuid) {
        let order_id = self.place(PaymentMethod::Vnpay).await;
        let payment_id = self.start_payment(order_id).await;
        let amount = self.order(order_id).await.total_amount;

        let body = self.payment_callback(
            payment_id,
            &format!("TXN-{}", payment_id.simple()),
            "00",
            amount,
        );
        self.payments
            .process_webhook(Gateway::Mock, serde_json::json!({}), &body)
            .await
            .unwrap();

        (order_id, payment_id)
    }

    pub async fn admin_move(&self, order_id: Uuid, status: OrderStatus) -> Order {
        let version = self.order(order_id).await.version;
        self.orders
            .update_order_status(
                self.admin_id,
                order_id,
                UpdateOrderStatusRequest {
                    status,
                    version,
                    tracking_number: (status == OrderStatus::Shipping).then(|| "TRK-1".to_string()),
                    admin_note: None,
                },
            )
            .await
            .unwrap()
    }

    /// Pay, ship and deliver one order; returns (order, payment).
    pub async fn delivered_order(&self) -> (Uuid, Uuid) {
        let (order_id, payment_id) = self.place_paid().await;
        self.admin_move(order_id, OrderStatus::Processing).await;
        self.admin_move(order_id, OrderStatus::Shipping).await;
        self.admin_move(order_id, OrderStatus::Delivered).await;
        (order_id, payment_id)
    }

    pub async fn audit_rows(&self, action: &str, entity_id: Uuid) -> i64 {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM admin_audit_logs WHERE action = $1 AND entity_id = $2",
        )
        .bind(action)
        .bind(entity_id)
        .fetch_one(&self.pool)
        .await
        .unwrap()
    }
}
