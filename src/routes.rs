//! HTTP router: public, authenticated and admin route groups.

use axum::{
    Router,
    http::StatusCode,
    middleware as axum_middleware,
    routing::{get, patch, post},
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::handlers::{admin, health, orders, payments, webhooks};
use crate::middleware::auth::{auth_middleware, require_admin};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let user_routes = Router::new()
        .route("/orders", post(orders::create_order).get(orders::list_orders))
        .route("/orders/reorder", post(orders::reorder))
        .route("/orders/number/{number}", get(orders::get_order_by_number))
        .route("/orders/{id}", get(orders::get_order))
        .route("/orders/{id}/cancel", patch(orders::cancel_order))
        .route("/payments", post(payments::create_payment))
        .route("/payments/{id}", get(payments::get_payment))
        .route("/payments/{id}/refund", post(payments::request_refund))
        .route_layer(axum_middleware::from_fn_with_state(
            state.pool.clone(),
            auth_middleware,
        ));

    // Layers run outside-in: authentication first, then the admin guard
    let admin_routes = Router::new()
        .route("/admin/orders", get(admin::list_orders))
        .route("/admin/orders/{id}", get(admin::get_order))
        .route("/admin/orders/{id}/status", patch(admin::update_order_status))
        .route("/admin/payments", get(admin::list_payments))
        .route("/admin/payments/{id}", get(admin::get_payment))
        .route("/admin/payments/{id}/reconcile", patch(admin::reconcile_payment))
        .route("/admin/refunds/pending", get(admin::list_pending_refunds))
        .route("/admin/refunds/{id}", get(admin::get_refund))
        .route("/admin/refunds/{id}/approve", post(admin::approve_refund))
        .route("/admin/refunds/{id}/reject", post(admin::reject_refund))
        .route_layer(axum_middleware::from_fn(require_admin))
        .route_layer(axum_middleware::from_fn_with_state(
            state.pool.clone(),
            auth_middleware,
        ));

    let request_timeout = Duration::from_secs(state.config.request_timeout_secs);

    Router::new()
        .route("/health", get(health::health_check))
        .route(
            "/webhooks/{gateway}",
            post(webhooks::receive).get(webhooks::receive_query),
        )
        .merge(user_routes)
        .merge(admin_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                )
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::REQUEST_TIMEOUT,
                    request_timeout,
                )),
        )
        .with_state(state)
}
