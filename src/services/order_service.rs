//! Order service - checkout orchestration and the order state machine.
//!
//! This service handles:
//! - Checkout from the cart and reorder from a past order
//! - Customer, admin and system cancellation
//! - Admin status transitions along the fulfilment graph
//! - Order reads for customers and admins
//!
//! # Atomicity Guarantees
//!
//! Stock reservations, the order row, its items, the status history, promotion
//! usage and the cart clear all commit in one PostgreSQL transaction. Jobs are
//! deferred on the [`UnitOfWork`] and only enqueued after the commit.

use chrono::Utc;
use serde_json::json;
use sqlx::{Connection, PgConnection};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::config::Config;
use crate::db::{DbPool, UnitOfWork};
use crate::error::AppError;
use crate::jobs::{EnqueueOptions, Job, JobDispatcher, StockSource};
use crate::models::catalog::{Address, Cart, CartLine};
use crate::models::money::{Currency, FeeSchedule, Money, compute_amounts};
use crate::models::order::{
    CancelOrderRequest, CreateOrderRequest, CreateOrderResponse, ListOrdersQuery, NewOrder,
    NewOrderItem, Order, OrderDetail, OrderPaymentStatus, OrderStatus, OrderSummary, Page,
    PaymentMethod, ReorderRequest, StatusUpdateFields, UpdateOrderStatusRequest,
};
use crate::repositories::{audit, catalog, inventory, orders, payments};
use crate::services::warehouse_selector::WarehouseSelector;

const MAX_NOTE_LENGTH: usize = 1000;

/// Where checkout takes its lines from.
enum CheckoutSource {
    /// The user's cart, cleared inside the order transaction.
    Cart(Cart),
    /// Explicit lines, e.g. copied from a previous order.
    Items,
}

struct Checkout {
    source: CheckoutSource,
    lines: Vec<CartLine>,
    address_id: Option<Uuid>,
    payment_method: PaymentMethod,
    promotion_code: Option<String>,
    customer_note: Option<String>,
}

#[derive(Clone)]
pub struct OrderService {
    pool: DbPool,
    config: Arc<Config>,
    jobs: Arc<dyn JobDispatcher>,
    selector: WarehouseSelector,
}

impl OrderService {
    pub fn new(pool: DbPool, config: Arc<Config>, jobs: Arc<dyn JobDispatcher>) -> Self {
        let selector = WarehouseSelector::new(pool.clone(), config.default_warehouse_code.clone());
        Self {
            pool,
            config,
            jobs,
            selector,
        }
    }

    /// Create an order from the caller's cart.
    ///
    /// # Process
    ///
    /// 1. Load the cart and its lines (`CartEmpty` when there are none)
    /// 2. Take the promotion from the cart, never from the request body
    /// 3. Run the shared checkout pipeline, clearing the cart on commit
    ///
    /// # Errors
    ///
    /// - `CartEmpty`: no cart or no lines
    /// - `PromoInvalid`: `promo_code` differs from the code attached to the cart
    /// - `InsufficientStock`: no single warehouse covers every line
    #[tracing::instrument(skip(self, request), fields(payment_method = request.payment_method.as_str()))]
    pub async fn create_order(
        &self,
        user_id: Uuid,
        request: CreateOrderRequest,
    ) -> Result<CreateOrderResponse, AppError> {
        validate_note(request.customer_note.as_deref())?;

        let cart = catalog::find_cart(&self.pool, user_id)
            .await?
            .ok_or(AppError::CartEmpty)?;
        let lines = catalog::cart_lines(&self.pool, cart.id).await?;
        if lines.is_empty() {
            return Err(AppError::CartEmpty);
        }

        if let Some(code) = request.promo_code.as_deref() {
            let attached = cart.promotion_code.as_deref().unwrap_or_default();
            if !code.eq_ignore_ascii_case(attached) {
                return Err(AppError::PromoInvalid);
            }
        }

        let promotion_code = cart.promotion_code.clone();
        self.checkout(
            user_id,
            Checkout {
                source: CheckoutSource::Cart(cart),
                lines,
                address_id: request.address_id,
                payment_method: request.payment_method,
                promotion_code,
                customer_note: request.customer_note,
            },
        )
        .await
    }

    /// Place a new order with the items and payment method of a past order.
    ///
    /// The original promotion is not carried over.
    #[tracing::instrument(skip(self, request), fields(original_order_id = %request.order_id))]
    pub async fn reorder(
        &self,
        user_id: Uuid,
        request: ReorderRequest,
    ) -> Result<CreateOrderResponse, AppError> {
        let original = orders::find_by_id(&self.pool, request.order_id)
            .await?
            .ok_or(AppError::OrderNotFound)?;
        if original.user_id != user_id {
            return Err(AppError::NotOwner);
        }

        let lines: Vec<CartLine> = orders::items(&self.pool, original.id)
            .await?
            .into_iter()
            .map(|item| CartLine {
                book_id: item.book_id,
                quantity: item.quantity,
            })
            .collect();
        if lines.is_empty() {
            return Err(AppError::CartEmpty);
        }

        self.checkout(
            user_id,
            Checkout {
                source: CheckoutSource::Items,
                lines,
                address_id: Some(request.address_id.unwrap_or(original.address_id)),
                payment_method: original.payment_method,
                promotion_code: None,
                customer_note: None,
            },
        )
        .await
    }

    /// Shared checkout pipeline.
    ///
    /// # Process
    ///
    /// 1. Resolve the shipping address
    /// 2. Snapshot books and compute the subtotal
    /// 3. Re-validate the promotion against that subtotal
    /// 4. Compute fees and total
    /// 5. Select one warehouse for every line
    /// 6. In one transaction: reserve stock, insert order, items, history,
    ///    promotion usage, and clear the cart
    /// 7. After commit: stock resync per book and, unless COD, the auto-release timer
    async fn checkout(
        &self,
        user_id: Uuid,
        checkout: Checkout,
    ) -> Result<CreateOrderResponse, AppError> {
        let address = self.resolve_address(user_id, checkout.address_id).await?;

        for line in &checkout.lines {
            if line.quantity <= 0 {
                return Err(AppError::InvalidRequest("Quantity must be positive".into()));
            }
        }

        // Authoritative prices, never the client's
        let book_ids: Vec<Uuid> = checkout.lines.iter().map(|l| l.book_id).collect();
        let books: HashMap<Uuid, _> = catalog::book_snapshots(&self.pool, &book_ids)
            .await?
            .into_iter()
            .map(|b| (b.id, b))
            .collect();

        let currency = Currency::parse(&self.config.currency)?;
        let mut subtotal = Money::zero(currency);
        let mut items = Vec::with_capacity(checkout.lines.len());
        for line in &checkout.lines {
            let book = books
                .get(&line.book_id)
                .filter(|b| b.is_active)
                .ok_or_else(|| {
                    AppError::InvalidRequest(format!("Book {} is not available", line.book_id))
                })?;

            subtotal = subtotal.add(&Money::new(book.price, currency).multiply(line.quantity))?;
            items.push(NewOrderItem {
                book_id: book.id,
                book_title: book.title.clone(),
                book_slug: book.slug.clone(),
                book_cover_url: book.cover_url.clone(),
                author_name: book.author_name.clone(),
                price: book.price,
                quantity: line.quantity,
            });
        }
        let subtotal = subtotal.persisted();

        let now = Utc::now();
        let mut promotion = None;
        let mut discount = rust_decimal::Decimal::ZERO;
        if let Some(code) = checkout.promotion_code.as_deref() {
            let promo = catalog::find_promotion_by_code(&self.pool, code)
                .await?
                .ok_or(AppError::PromoInvalid)?;
            discount = promo.evaluate(subtotal.amount, now)?;
            promotion = Some(promo);
        }

        let is_cod = checkout.payment_method.is_cod();
        let amounts = compute_amounts(
            subtotal.amount,
            discount,
            is_cod,
            &FeeSchedule::from(self.config.as_ref()),
        );

        let warehouse_id = self.selector.select(&address, &checkout.lines).await?;

        let mut uow = UnitOfWork::begin(&self.pool).await?;

        // Dropping `uow` on any error below rolls every reservation back.
        // Rows are locked in book id order, the same order release and consume use.
        for line in lock_order(&checkout.lines, |line| line.book_id) {
            inventory::reserve(uow.conn(), warehouse_id, line.book_id, line.quantity, Some(user_id))
                .await?;
        }

        let initial_status = checkout.payment_method.initial_status();
        let order = orders::insert(
            uow.conn(),
            &NewOrder {
                user_id,
                address_id: address.id,
                promotion_id: promotion.as_ref().map(|p| p.id),
                warehouse_id,
                currency: currency.as_str().to_string(),
                amounts,
                payment_method: checkout.payment_method,
                status: initial_status,
                customer_note: checkout.customer_note,
            },
        )
        .await?;

        orders::insert_items(uow.conn(), order.id, &items).await?;
        orders::insert_history(
            uow.conn(),
            order.id,
            None,
            initial_status,
            Some(user_id),
            Some("Order created"),
        )
        .await?;

        if let Some(promo) = &promotion {
            catalog::record_promotion_usage(uow.conn(), promo.id, user_id, order.id, amounts.discount)
                .await?;
        }

        if let CheckoutSource::Cart(cart) = &checkout.source {
            catalog::clear_cart(uow.conn(), cart.id).await?;
        }

        for line in &checkout.lines {
            uow.defer(
                Job::StockResync {
                    book_id: line.book_id,
                    source: StockSource::Sale,
                },
                EnqueueOptions::immediate(),
            );
        }
        if !is_cod {
            let delay = Duration::from_secs(self.auto_release_minutes() * 60);
            uow.defer(
                Job::AutoReleaseReservation { order_id: order.id },
                EnqueueOptions::delayed(delay),
            );
        }

        uow.commit(self.jobs.as_ref()).await?;

        tracing::info!(
            order_id = %order.id,
            order_number = %order.order_number,
            total = %order.total_amount,
            %warehouse_id,
            "Order created"
        );

        Ok(CreateOrderResponse {
            order_id: order.id,
            order_number: order.order_number,
            total: order.total_amount,
            status: order.status,
        })
    }

    async fn resolve_address(
        &self,
        user_id: Uuid,
        address_id: Option<Uuid>,
    ) -> Result<Address, AppError> {
        match address_id {
            Some(id) => {
                let address = catalog::find_address(&self.pool, id)
                    .await?
                    .ok_or_else(|| AppError::InvalidRequest("Address not found".into()))?;
                if address.user_id != user_id {
                    return Err(AppError::NotOwner);
                }
                Ok(address)
            }
            None => catalog::default_address(&self.pool, user_id)
                .await?
                .ok_or_else(|| AppError::InvalidRequest("No shipping address on file".into())),
        }
    }

    fn auto_release_minutes(&self) -> u64 {
        u64::try_from(self.config.auto_release_minutes).unwrap_or(15)
    }

    /// Cancel an order on the customer's behalf.
    ///
    /// # Process
    ///
    /// 1. Lock the order and verify ownership
    /// 2. Require `pending` or `confirmed`; a paid order past `pending` needs a refund instead
    /// 3. Release reservations (per-item failures are logged, not fatal)
    /// 4. Cancel with the caller's version, append history, cancel open payment attempts
    /// 5. After commit: stock resync per book
    ///
    /// # Errors
    ///
    /// - `OrderNotFound`, `NotOwner`
    /// - `OrderCannotCancel`: wrong status or already paid
    /// - `VersionMismatch`: the caller's view is stale
    #[tracing::instrument(skip(self, request))]
    pub async fn cancel_order(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        request: CancelOrderRequest,
    ) -> Result<Order, AppError> {
        let reason = request.cancellation_reason.trim();
        if reason.is_empty() {
            return Err(AppError::InvalidRequest(
                "cancellation_reason is required".into(),
            ));
        }
        validate_note(Some(reason))?;

        let mut uow = UnitOfWork::begin(&self.pool).await?;

        let order = orders::lock(uow.conn(), order_id)
            .await?
            .ok_or(AppError::OrderNotFound)?;
        if order.user_id != user_id {
            return Err(AppError::NotOwner);
        }
        if order.version != request.version {
            return Err(AppError::VersionMismatch);
        }
        if !order.status.is_user_cancellable() {
            return Err(AppError::OrderCannotCancel(format!(
                "order is {}",
                order.status
            )));
        }
        if order.payment_status == OrderPaymentStatus::Paid && order.status != OrderStatus::Pending {
            return Err(AppError::OrderCannotCancel(
                "order is already paid, request a refund instead".into(),
            ));
        }

        let books = release_reservations(uow.conn(), &order, Some(user_id)).await?;
        let cancelled = orders::cancel(uow.conn(), order_id, reason, request.version).await?;
        orders::insert_history(
            uow.conn(),
            order_id,
            Some(order.status),
            OrderStatus::Cancelled,
            Some(user_id),
            Some(reason),
        )
        .await?;
        payments::cancel_open_for_order(uow.conn(), order_id, "Order cancelled by customer")
            .await?;

        defer_resync(&mut uow, &books, StockSource::OrderCancelled);
        uow.commit(self.jobs.as_ref()).await?;

        tracing::info!(%order_id, version = cancelled.version, "Order cancelled by customer");
        Ok(cancelled)
    }

    /// Move an order along the fulfilment graph (admin).
    ///
    /// Cancelling releases reservations and cancels open payment attempts;
    /// shipping consumes reservations; delivering stamps `delivered_at`. Every
    /// transition writes a history row and an audit entry.
    #[tracing::instrument(skip(self, request), fields(to = request.status.as_str()))]
    pub async fn update_order_status(
        &self,
        admin_id: Uuid,
        order_id: Uuid,
        request: UpdateOrderStatusRequest,
    ) -> Result<Order, AppError> {
        validate_note(request.admin_note.as_deref())?;

        let mut uow = UnitOfWork::begin(&self.pool).await?;

        let order = orders::lock(uow.conn(), order_id)
            .await?
            .ok_or(AppError::OrderNotFound)?;
        // Stale callers get 409 before any transition check
        if order.version != request.version {
            return Err(AppError::VersionMismatch);
        }
        order.status.ensure_transition(request.status)?;

        let updated = match request.status {
            OrderStatus::Cancelled => {
                let books = release_reservations(uow.conn(), &order, Some(admin_id)).await?;
                payments::cancel_open_for_order(uow.conn(), order_id, "Order cancelled by admin")
                    .await?;
                let reason = request
                    .admin_note
                    .as_deref()
                    .unwrap_or("Cancelled by admin");
                let cancelled = orders::cancel(uow.conn(), order_id, reason, request.version).await?;
                defer_resync(&mut uow, &books, StockSource::OrderCancelled);
                cancelled
            }
            OrderStatus::Shipping => {
                let books = consume_reservations(uow.conn(), &order, Some(admin_id)).await?;
                let fields = StatusUpdateFields {
                    tracking_number: request.tracking_number.clone(),
                    admin_note: request.admin_note.clone(),
                    delivered_at: None,
                };
                let shipped = orders::update_status(
                    uow.conn(),
                    order_id,
                    OrderStatus::Shipping,
                    request.version,
                    &fields,
                )
                .await?;
                defer_resync(&mut uow, &books, StockSource::Fulfilment);
                shipped
            }
            next => {
                let fields = StatusUpdateFields {
                    tracking_number: request.tracking_number.clone(),
                    admin_note: request.admin_note.clone(),
                    delivered_at: (next == OrderStatus::Delivered).then(Utc::now),
                };
                orders::update_status(uow.conn(), order_id, next, request.version, &fields).await?
            }
        };

        orders::insert_history(
            uow.conn(),
            order_id,
            Some(order.status),
            request.status,
            Some(admin_id),
            request.admin_note.as_deref(),
        )
        .await?;
        audit::record(
            uow.conn(),
            admin_id,
            "order.status_update",
            "order",
            order_id,
            json!({
                "from": order.status,
                "to": request.status,
                "version": updated.version,
                "tracking_number": request.tracking_number,
            }),
        )
        .await?;

        uow.commit(self.jobs.as_ref()).await?;

        tracing::info!(from = %order.status, to = %request.status, "Order status updated");
        Ok(updated)
    }

    /// Cancel an order without a version check or ownership (payment expiry,
    /// fraud, auto-release). Returns `false` when the order is no longer
    /// cancellable, e.g. it was paid or already cancelled.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_by_system(
        &self,
        order_id: Uuid,
        reason: &str,
        source: &str,
    ) -> Result<bool, AppError> {
        self.system_cancel(
            order_id,
            reason,
            source,
            &[
                OrderStatus::Pending,
                OrderStatus::Confirmed,
                OrderStatus::Processing,
            ],
        )
        .await
    }

    /// Auto-release handler: cancel the order if it is still pending and unpaid.
    ///
    /// A no-op for orders that were paid, cancelled or moved on meanwhile, so
    /// duplicate deliveries of the job are harmless.
    #[tracing::instrument(skip(self))]
    pub async fn release_unpaid(&self, order_id: Uuid) -> Result<bool, AppError> {
        let Some(order) = orders::find_by_id(&self.pool, order_id).await? else {
            tracing::warn!(%order_id, "Auto-release for missing order ignored");
            return Ok(false);
        };
        if order.status != OrderStatus::Pending || order.payment_status == OrderPaymentStatus::Paid
        {
            tracing::debug!(%order_id, status = %order.status, "Auto-release not needed");
            return Ok(false);
        }
        if payments::has_successful(&self.pool, order_id).await? {
            tracing::debug!(%order_id, "Order has a successful payment, keeping reservation");
            return Ok(false);
        }

        let reason = format!(
            "Reservation released after {} minutes without payment",
            self.config.auto_release_minutes
        );
        self.system_cancel(order_id, &reason, "auto_release", &[OrderStatus::Pending])
            .await
    }

    async fn system_cancel(
        &self,
        order_id: Uuid,
        reason: &str,
        source: &str,
        allowed: &[OrderStatus],
    ) -> Result<bool, AppError> {
        let mut uow = UnitOfWork::begin(&self.pool).await?;

        let order = orders::lock(uow.conn(), order_id)
            .await?
            .ok_or(AppError::OrderNotFound)?;
        if !allowed.contains(&order.status) || order.payment_status == OrderPaymentStatus::Paid {
            tracing::debug!(%order_id, status = %order.status, source, "System cancel skipped");
            uow.rollback().await?;
            return Ok(false);
        }

        let books = release_reservations(uow.conn(), &order, None).await?;
        payments::cancel_open_for_order(uow.conn(), order_id, reason).await?;
        orders::cancel_unchecked(uow.conn(), order_id, reason).await?;
        let notes = format!("{reason} (source: {source})");
        orders::insert_history(
            uow.conn(),
            order_id,
            Some(order.status),
            OrderStatus::Cancelled,
            None,
            Some(&notes),
        )
        .await?;

        defer_resync(&mut uow, &books, StockSource::OrderCancelled);
        uow.commit(self.jobs.as_ref()).await?;

        tracing::info!(%order_id, source, reason, "Order cancelled by system");
        Ok(true)
    }

    pub async fn get_order(&self, user_id: Uuid, order_id: Uuid) -> Result<OrderDetail, AppError> {
        let order = orders::find_by_id(&self.pool, order_id)
            .await?
            .ok_or(AppError::OrderNotFound)?;
        if order.user_id != user_id {
            return Err(AppError::NotOwner);
        }
        self.detail(order).await
    }

    pub async fn get_order_by_number(
        &self,
        user_id: Uuid,
        order_number: &str,
    ) -> Result<OrderDetail, AppError> {
        let order = orders::find_by_number(&self.pool, order_number)
            .await?
            .ok_or(AppError::OrderNotFound)?;
        if order.user_id != user_id {
            return Err(AppError::NotOwner);
        }
        self.detail(order).await
    }

    pub async fn admin_get_order(&self, order_id: Uuid) -> Result<OrderDetail, AppError> {
        let order = orders::find_by_id(&self.pool, order_id)
            .await?
            .ok_or(AppError::OrderNotFound)?;
        self.detail(order).await
    }

    async fn detail(&self, order: Order) -> Result<OrderDetail, AppError> {
        let items = orders::items(&self.pool, order.id).await?;
        let history = orders::history(&self.pool, order.id).await?;
        Ok(OrderDetail {
            order,
            items,
            history,
        })
    }

    /// The caller's orders, newest first.
    pub async fn list_orders(
        &self,
        user_id: Uuid,
        query: ListOrdersQuery,
    ) -> Result<Page<OrderSummary>, AppError> {
        query.validate()?;
        let mut conn = self.pool.acquire().await?;
        let (rows, total) =
            orders::list_by_user(&mut conn, user_id, query.status, query.limit, query.offset())
                .await?;
        self.summaries(rows, total, &query).await
    }

    pub async fn admin_list_orders(
        &self,
        query: ListOrdersQuery,
    ) -> Result<Page<OrderSummary>, AppError> {
        query.validate()?;
        let mut conn = self.pool.acquire().await?;
        let (rows, total) =
            orders::list_all(&mut conn, query.status, query.limit, query.offset()).await?;
        self.summaries(rows, total, &query).await
    }

    async fn summaries(
        &self,
        rows: Vec<Order>,
        total: i64,
        query: &ListOrdersQuery,
    ) -> Result<Page<OrderSummary>, AppError> {
        let ids: Vec<Uuid> = rows.iter().map(|o| o.id).collect();
        let counts = orders::count_items_by_orders(&self.pool, &ids).await?;

        let data = rows
            .into_iter()
            .map(|order| {
                let count = counts.get(&order.id).copied().unwrap_or(0);
                OrderSummary::from_order(order, count)
            })
            .collect();

        Ok(Page {
            data,
            page: query.page,
            limit: query.limit,
            total,
        })
    }
}

fn validate_note(note: Option<&str>) -> Result<(), AppError> {
    match note {
        Some(n) if n.chars().count() > MAX_NOTE_LENGTH => Err(AppError::InvalidRequest(format!(
            "Notes are limited to {MAX_NOTE_LENGTH} characters"
        ))),
        _ => Ok(()),
    }
}

fn defer_resync(uow: &mut UnitOfWork, books: &[Uuid], source: StockSource) {
    for book_id in books {
        uow.defer(
            Job::StockResync {
                book_id: *book_id,
                source,
            },
            EnqueueOptions::immediate(),
        );
    }
}

/// Return every item's reserved units to available stock.
///
/// Each release runs in its own savepoint so one bad row is logged and
/// skipped without aborting the surrounding transaction. Returns the books
/// touched.
/// `lines` sorted by book id. Every path that touches several inventory rows
/// of one warehouse walks them in this order.
fn lock_order<T>(lines: &[T], book_id: impl Fn(&T) -> Uuid) -> Vec<&T> {
    let mut sorted: Vec<&T> = lines.iter().collect();
    sorted.sort_by_key(|line| book_id(line));
    sorted
}

async fn release_reservations(
    conn: &mut PgConnection,
    order: &Order,
    actor: Option<Uuid>,
) -> Result<Vec<Uuid>, AppError> {
    let items = orders::items(&mut *conn, order.id).await?;
    let books = items.iter().map(|i| i.book_id).collect();

    let Some(warehouse_id) = order.warehouse_id else {
        tracing::warn!(order_id = %order.id, "Order has no warehouse, nothing to release");
        return Ok(books);
    };

    for item in lock_order(&items, |item| item.book_id) {
        let mut savepoint = conn.begin().await?;
        match inventory::release(&mut savepoint, warehouse_id, item.book_id, item.quantity, actor)
            .await
        {
            Ok(()) => savepoint.commit().await?,
            Err(e) => {
                tracing::warn!(
                    order_id = %order.id,
                    book_id = %item.book_id,
                    error = %e,
                    "Reservation release failed, continuing"
                );
                savepoint.rollback().await?;
            }
        }
    }

    Ok(books)
}

/// Remove shipped units from reserved stock.
async fn consume_reservations(
    conn: &mut PgConnection,
    order: &Order,
    actor: Option<Uuid>,
) -> Result<Vec<Uuid>, AppError> {
    let items = orders::items(&mut *conn, order.id).await?;
    let books = items.iter().map(|i| i.book_id).collect();

    if let Some(warehouse_id) = order.warehouse_id {
        for item in lock_order(&items, |item| item.book_id) {
            inventory::consume(&mut *conn, warehouse_id, item.book_id, item.quantity, actor).await?;
        }
    }

    Ok(books)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_order_sorts_by_book_without_reordering_input() {
        let a = Uuid::from_u128(1);
        let b = Uuid::from_u128(2);
        let c = Uuid::from_u128(3);
        let lines = vec![(c, 1), (a, 2), (b, 3)];

        let sorted: Vec<Uuid> = lock_order(&lines, |l| l.0).into_iter().map(|l| l.0).collect();
        assert_eq!(sorted, vec![a, b, c]);
        assert_eq!(lines[0].0, c);
    }

    #[test]
    fn long_notes_are_rejected() {
        let long = "x".repeat(MAX_NOTE_LENGTH + 1);
        assert!(validate_note(Some(&long)).is_err());
        assert!(validate_note(Some("Leave at the door")).is_ok());
        assert!(validate_note(None).is_ok());
    }
}
