//! Shopping carts and online checkout

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection};
use tracing::info;

use super::coupons::{fetch_by_code, increment_uses};
use super::orders::{
    fetch_items, insert_item, insert_order, recalculate_totals, OrderHeader, OrderKind,
    OrderWithItems,
};
use super::products::fetch_product;
use super::reservations::{
    close_all, ensure_available, set_reserved, transfer_cart, Holder, ReservationStatus,
};
use super::stock::{apply_movement, MovementKind, MovementOrigin, MovementRequest};
use super::{lock_row, Database, LockTable, StoreError};
use crate::util::time::minutes_from;

/// Whose cart
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartOwner {
    User(i64),
    /// Anonymous visitor identified by the `X-Session-Id` header
    Session(String),
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Cart {
    pub id: i64,
    pub user_id: Option<i64>,
    pub session_id: Option<String>,
    pub total_cents: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CartItem {
    pub id: i64,
    pub cart_id: i64,
    pub product_id: i64,
    pub name: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub subtotal_cents: i64,
}

/// Cart as returned by the API. `id` is null when no cart exists yet.
#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    pub id: Option<i64>,
    pub items: Vec<CartItem>,
    pub total_cents: i64,
}

impl CartView {
    fn empty() -> Self {
        Self {
            id: None,
            items: Vec::new(),
            total_cents: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Checkout {
    pub payment_method: String,
    pub customer_name: Option<String>,
    pub coupon_code: Option<String>,
    pub notes: Option<String>,
}

async fn find_cart(
    conn: &mut SqliteConnection,
    owner: &CartOwner,
) -> Result<Option<Cart>, StoreError> {
    let cart = match owner {
        CartOwner::User(id) => {
            sqlx::query_as("SELECT * FROM carts WHERE user_id = ?")
                .bind(id)
                .fetch_optional(&mut *conn)
                .await?
        }
        CartOwner::Session(session) => {
            sqlx::query_as("SELECT * FROM carts WHERE session_id = ? AND user_id IS NULL")
                .bind(session)
                .fetch_optional(&mut *conn)
                .await?
        }
    };
    Ok(cart)
}

async fn get_or_create_cart(
    conn: &mut SqliteConnection,
    owner: &CartOwner,
) -> Result<Cart, StoreError> {
    if let Some(cart) = find_cart(conn, owner).await? {
        return Ok(cart);
    }
    let now = Utc::now();
    let (user_id, session_id) = match owner {
        CartOwner::User(id) => (Some(*id), None),
        CartOwner::Session(s) => (None, Some(s.as_str())),
    };
    Ok(sqlx::query_as(
        "INSERT INTO carts (user_id, session_id, total_cents, created_at, updated_at)
         VALUES (?, ?, 0, ?, ?) RETURNING *",
    )
    .bind(user_id)
    .bind(session_id)
    .bind(now)
    .bind(now)
    .fetch_one(&mut *conn)
    .await?)
}

async fn fetch_cart_items(
    conn: &mut SqliteConnection,
    cart_id: i64,
) -> Result<Vec<CartItem>, StoreError> {
    Ok(sqlx::query_as("SELECT * FROM cart_items WHERE cart_id = ? ORDER BY id")
        .bind(cart_id)
        .fetch_all(&mut *conn)
        .await?)
}

/// Total is always the sum of the line subtotals
async fn recalculate_cart(conn: &mut SqliteConnection, cart_id: i64) -> Result<CartView, StoreError> {
    let total: i64 = sqlx::query_scalar(
        "UPDATE carts SET
            total_cents = (SELECT COALESCE(SUM(subtotal_cents), 0) FROM cart_items WHERE cart_id = ?1),
            updated_at = ?2
         WHERE id = ?1 RETURNING total_cents",
    )
    .bind(cart_id)
    .bind(Utc::now())
    .fetch_one(&mut *conn)
    .await?;
    let items = fetch_cart_items(conn, cart_id).await?;
    Ok(CartView {
        id: Some(cart_id),
        items,
        total_cents: total,
    })
}

/// Cart store operations
#[derive(Clone)]
pub struct CartStore {
    db: Database,
    reservation_minutes: i64,
}

impl CartStore {
    pub fn new(db: Database, reservation_minutes: i64) -> Self {
        Self {
            db,
            reservation_minutes,
        }
    }

    fn expiry(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        minutes_from(now, self.reservation_minutes)
    }

    pub async fn view(&self, owner: &CartOwner) -> Result<CartView, StoreError> {
        let mut conn = self.db.pool().acquire().await?;
        match find_cart(&mut conn, owner).await? {
            Some(cart) => {
                let items = fetch_cart_items(&mut conn, cart.id).await?;
                Ok(CartView {
                    id: Some(cart.id),
                    items,
                    total_cents: cart.total_cents,
                })
            }
            None => Ok(CartView::empty()),
        }
    }

    /// Set a product's quantity in the cart, reserving the stock it needs.
    /// Zero removes the line.
    async fn set_line(
        &self,
        conn: &mut SqliteConnection,
        cart: &Cart,
        product_id: i64,
        quantity: i64,
    ) -> Result<(), StoreError> {
        let now = Utc::now();
        let holder = Holder::cart(cart.id, cart.user_id);

        if quantity <= 0 {
            sqlx::query("DELETE FROM cart_items WHERE cart_id = ? AND product_id = ?")
                .bind(cart.id)
                .bind(product_id)
                .execute(&mut *conn)
                .await?;
            set_reserved(conn, product_id, &holder, 0, self.expiry(now)).await?;
            return Ok(());
        }

        let product = fetch_product(conn, product_id)
            .await?
            .ok_or_else(|| StoreError::not_found("product"))?;
        if !product.available {
            return Err(StoreError::InvalidState(format!(
                "product {} is not available",
                product.name
            )));
        }
        ensure_available(conn, product.id, product.stock, &holder, quantity, now).await?;
        set_reserved(conn, product.id, &holder, quantity, self.expiry(now)).await?;

        sqlx::query(
            "INSERT INTO cart_items (cart_id, product_id, name, quantity, unit_price_cents, subtotal_cents)
             VALUES (?1, ?2, ?3, ?4, ?5, ?4 * ?5)
             ON CONFLICT(cart_id, product_id) DO UPDATE SET
                name = excluded.name,
                quantity = excluded.quantity,
                unit_price_cents = excluded.unit_price_cents,
                subtotal_cents = excluded.subtotal_cents",
        )
        .bind(cart.id)
        .bind(product.id)
        .bind(&product.name)
        .bind(quantity)
        .bind(product.price_cents)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Add units of a product; an existing line for the same product grows
    pub async fn add_item(
        &self,
        owner: &CartOwner,
        product_id: i64,
        quantity: i64,
    ) -> Result<CartView, StoreError> {
        if quantity <= 0 {
            return Err(StoreError::validation("quantity must be greater than zero"));
        }
        let mut tx = self.db.begin_write().await?;
        let cart = get_or_create_cart(&mut tx, owner).await?;
        lock_row(&mut tx, LockTable::Carts, cart.id).await?;

        let current: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(quantity), 0) FROM cart_items WHERE cart_id = ? AND product_id = ?",
        )
        .bind(cart.id)
        .bind(product_id)
        .fetch_one(&mut *tx)
        .await?;
        let wanted = current
            .checked_add(quantity)
            .ok_or_else(|| StoreError::validation("quantity is too large"))?;
        self.set_line(&mut tx, &cart, product_id, wanted).await?;

        let view = recalculate_cart(&mut tx, cart.id).await?;
        tx.commit().await?;
        Ok(view)
    }

    /// Change a line's quantity; zero removes it
    pub async fn update_item(
        &self,
        owner: &CartOwner,
        item_id: i64,
        quantity: i64,
    ) -> Result<CartView, StoreError> {
        if quantity < 0 {
            return Err(StoreError::validation("quantity cannot be negative"));
        }
        let mut tx = self.db.begin_write().await?;
        let (cart, item) = self.owned_item(&mut tx, owner, item_id).await?;
        self.set_line(&mut tx, &cart, item.product_id, quantity).await?;
        let view = recalculate_cart(&mut tx, cart.id).await?;
        tx.commit().await?;
        Ok(view)
    }

    pub async fn remove_item(&self, owner: &CartOwner, item_id: i64) -> Result<CartView, StoreError> {
        let mut tx = self.db.begin_write().await?;
        let (cart, item) = self.owned_item(&mut tx, owner, item_id).await?;
        self.set_line(&mut tx, &cart, item.product_id, 0).await?;
        let view = recalculate_cart(&mut tx, cart.id).await?;
        tx.commit().await?;
        Ok(view)
    }

    /// Lock the owner's cart and find one of its lines
    async fn owned_item(
        &self,
        conn: &mut SqliteConnection,
        owner: &CartOwner,
        item_id: i64,
    ) -> Result<(Cart, CartItem), StoreError> {
        let cart = find_cart(conn, owner)
            .await?
            .ok_or_else(|| StoreError::not_found("cart item"))?;
        lock_row(conn, LockTable::Carts, cart.id).await?;
        let item: CartItem = sqlx::query_as("SELECT * FROM cart_items WHERE id = ? AND cart_id = ?")
            .bind(item_id)
            .bind(cart.id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| StoreError::not_found("cart item"))?;
        Ok((cart, item))
    }

    /// Empty the cart and release its reservations
    pub async fn clear(&self, owner: &CartOwner) -> Result<(), StoreError> {
        let mut tx = self.db.begin_write().await?;
        if let Some(cart) = find_cart(&mut tx, owner).await? {
            lock_row(&mut tx, LockTable::Carts, cart.id).await?;
            sqlx::query("DELETE FROM cart_items WHERE cart_id = ?")
                .bind(cart.id)
                .execute(&mut *tx)
                .await?;
            close_all(
                &mut tx,
                &Holder::cart(cart.id, None),
                ReservationStatus::Liberada,
                None,
            )
            .await?;
            recalculate_cart(&mut tx, cart.id).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Fold an anonymous session cart into the user's cart after login
    pub async fn merge_session_into_user(
        &self,
        session_id: &str,
        user_id: i64,
    ) -> Result<CartView, StoreError> {
        let mut tx = self.db.begin_write().await?;
        let session_owner = CartOwner::Session(session_id.to_string());
        let user_owner = CartOwner::User(user_id);

        let Some(session_cart) = find_cart(&mut tx, &session_owner).await? else {
            tx.commit().await?;
            return self.view(&user_owner).await;
        };
        let user_cart = get_or_create_cart(&mut tx, &user_owner).await?;
        lock_row(&mut tx, LockTable::Carts, user_cart.id).await?;

        let lines = fetch_cart_items(&mut tx, session_cart.id).await?;
        for line in &lines {
            sqlx::query(
                "INSERT INTO cart_items (cart_id, product_id, name, quantity, unit_price_cents, subtotal_cents)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?4 * ?5)
                 ON CONFLICT(cart_id, product_id) DO UPDATE SET
                    quantity = cart_items.quantity + excluded.quantity,
                    subtotal_cents = (cart_items.quantity + excluded.quantity) * cart_items.unit_price_cents",
            )
            .bind(user_cart.id)
            .bind(line.product_id)
            .bind(&line.name)
            .bind(line.quantity)
            .bind(line.unit_price_cents)
            .execute(&mut *tx)
            .await?;
        }

        transfer_cart(
            &mut tx,
            session_cart.id,
            &Holder::cart(user_cart.id, Some(user_id)),
            self.expiry(Utc::now()),
        )
        .await?;
        sqlx::query("DELETE FROM carts WHERE id = ?")
            .bind(session_cart.id)
            .execute(&mut *tx)
            .await?;

        let view = recalculate_cart(&mut tx, user_cart.id).await?;
        tx.commit().await?;

        info!(user_id, merged_lines = lines.len(), "Session cart merged");
        Ok(view)
    }

    /// Turn the user's cart into an online order.
    ///
    /// Stock leaves immediately with `venda_online` movements; nothing is
    /// written unless every line can be served.
    pub async fn checkout(
        &self,
        user_id: i64,
        req: Checkout,
    ) -> Result<OrderWithItems, StoreError> {
        let method = req.payment_method.trim().to_lowercase();
        if method.is_empty() {
            return Err(StoreError::validation("payment method is required"));
        }
        let now = Utc::now();
        let owner = CartOwner::User(user_id);

        let mut tx = self.db.begin_write().await?;
        let cart = find_cart(&mut tx, &owner)
            .await?
            .ok_or_else(|| StoreError::validation("cart is empty"))?;
        lock_row(&mut tx, LockTable::Carts, cart.id).await?;
        let lines = fetch_cart_items(&mut tx, cart.id).await?;
        if lines.is_empty() {
            return Err(StoreError::validation("cart is empty"));
        }

        let order = insert_order(
            &mut tx,
            &OrderHeader {
                kind: OrderKind::Online,
                user_id: Some(user_id),
                payment_method: Some(method),
                table_id: None,
                attendant_id: None,
                customer_name: req.customer_name,
                notes: req.notes,
            },
        )
        .await?;

        for line in &lines {
            if !lock_row(&mut tx, LockTable::Products, line.product_id).await? {
                return Err(StoreError::not_found(format!("product {}", line.product_id)));
            }
            let product = fetch_product(&mut tx, line.product_id)
                .await?
                .ok_or_else(|| StoreError::not_found(format!("product {}", line.product_id)))?;
            if !product.available {
                return Err(StoreError::InsufficientStock {
                    product_id: product.id,
                    requested: line.quantity,
                    available: 0,
                });
            }
            // Units held by tables and other carts are not ours to sell
            ensure_available(
                &mut tx,
                product.id,
                product.stock,
                &Holder::cart(cart.id, None),
                line.quantity,
                now,
            )
            .await?;
            insert_item(
                &mut tx,
                order.id,
                product.id,
                &product.name,
                line.quantity,
                product.price_cents,
            )
            .await?;
            apply_movement(
                &mut tx,
                MovementRequest {
                    product_id: product.id,
                    kind: MovementKind::Saida,
                    origin: MovementOrigin::VendaOnline,
                    quantity: line.quantity,
                    user_id: Some(user_id),
                    notes: Some(format!("Pedido {}", order.number)),
                    order_id: Some(order.id),
                },
            )
            .await?;
        }

        // Priced at the catalog's current prices, not what the cart showed
        let mut order = recalculate_totals(&mut tx, order.id).await?;

        if let Some(code) = req.coupon_code.as_deref().filter(|c| !c.trim().is_empty()) {
            let coupon = fetch_by_code(&mut tx, code)
                .await?
                .ok_or_else(|| StoreError::validation("coupon not found"))?;
            let discount = coupon
                .apply(order.subtotal_cents, now)
                .map_err(|reason| StoreError::validation(reason.to_string()))?;
            sqlx::query("UPDATE orders SET discount_cents = ?, coupon_id = ? WHERE id = ?")
                .bind(discount)
                .bind(coupon.id)
                .bind(order.id)
                .execute(&mut *tx)
                .await?;
            increment_uses(&mut tx, coupon.id).await?;
            order = recalculate_totals(&mut tx, order.id).await?;
        }

        close_all(
            &mut tx,
            &Holder::cart(cart.id, None),
            ReservationStatus::Consumida,
            Some(order.id),
        )
        .await?;
        sqlx::query("DELETE FROM cart_items WHERE cart_id = ?")
            .bind(cart.id)
            .execute(&mut *tx)
            .await?;
        recalculate_cart(&mut tx, cart.id).await?;

        let items = fetch_items(&mut tx, order.id).await?;
        tx.commit().await?;

        info!(
            user_id,
            order_id = order.id,
            number = %order.number,
            total = order.total_cents,
            "Checkout completed"
        );
        Ok(OrderWithItems { order, items })
    }
}
