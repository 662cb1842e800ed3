//! `PostgreSQL` store.
//!
//! A [`PgStoreTx`] wraps one database transaction. Product reads inside it use
//! `SELECT ... FOR UPDATE`, so a second process running the same engine
//! against the same database still serializes on the product row.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};

use stockpile_core::{
    CartLineId, CartLineStatus, CategoryId, OrderId, Price, ProductId, Quantity, UserId,
};

use super::store::{InventoryStore, StoreTx};
use super::{RepositoryError, map_constraint_violation};
use crate::models::{
    CartLine, CartLineSummary, NewCartLine, NewOrder, Order, OrderLine, Product,
};

// =============================================================================
// Internal Row Types
// =============================================================================

const PRODUCT_COLUMNS: &str =
    "id, name, price, stock_quantity, is_active, category_id, updated_at";

const CART_LINE_COLUMNS: &str =
    "id, user_id, product_id, quantity, status, order_id, added_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: i32,
    name: String,
    price: Decimal,
    stock_quantity: i32,
    is_active: bool,
    category_id: Option<i32>,
    updated_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Self {
            id: ProductId::new(row.id),
            name: row.name,
            price: Price::new(row.price),
            stock: row.stock_quantity,
            is_active: row.is_active,
            category_id: row.category_id.map(CategoryId::new),
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CartLineRow {
    id: i32,
    user_id: i32,
    product_id: i32,
    quantity: i32,
    status: CartLineStatus,
    order_id: Option<i32>,
    added_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CartLineRow> for CartLine {
    type Error = RepositoryError;

    fn try_from(row: CartLineRow) -> Result<Self, Self::Error> {
        let quantity = Quantity::new(row.quantity).map_err(|e| {
            RepositoryError::DataCorruption(format!("cart line {}: {e}", row.id))
        })?;
        Ok(Self {
            id: CartLineId::new(row.id),
            user_id: UserId::new(row.user_id),
            product_id: ProductId::new(row.product_id),
            quantity,
            status: row.status,
            order_id: row.order_id.map(OrderId::new),
            added_at: row.added_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CartSummaryRow {
    id: i32,
    product_id: i32,
    name: String,
    price: Decimal,
    quantity: i32,
    stock_quantity: i32,
    added_at: DateTime<Utc>,
}

impl TryFrom<CartSummaryRow> for CartLineSummary {
    type Error = RepositoryError;

    fn try_from(row: CartSummaryRow) -> Result<Self, Self::Error> {
        let quantity = Quantity::new(row.quantity).map_err(|e| {
            RepositoryError::DataCorruption(format!("cart line {}: {e}", row.id))
        })?;
        let price = Price::new(row.price);
        Ok(Self {
            cart_line_id: CartLineId::new(row.id),
            product_id: ProductId::new(row.product_id),
            product_name: row.name,
            price,
            quantity,
            subtotal: price.line_total(quantity),
            stock_quantity: row.stock_quantity,
            added_at: row.added_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: i32,
    user_id: i32,
    total_price: Decimal,
    address: String,
    is_paid: bool,
    created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct OrderLineRow {
    order_id: i32,
    cart_line_id: i32,
    product_id: i32,
    quantity: i32,
    unit_price: Decimal,
}

impl TryFrom<OrderLineRow> for OrderLine {
    type Error = RepositoryError;

    fn try_from(row: OrderLineRow) -> Result<Self, Self::Error> {
        let quantity = Quantity::new(row.quantity).map_err(|e| {
            RepositoryError::DataCorruption(format!("order {} line: {e}", row.order_id))
        })?;
        Ok(Self {
            cart_line_id: CartLineId::new(row.cart_line_id),
            product_id: ProductId::new(row.product_id),
            quantity,
            unit_price: Price::new(row.unit_price),
        })
    }
}

fn assemble_orders(
    rows: Vec<OrderRow>,
    line_rows: Vec<OrderLineRow>,
) -> Result<Vec<Order>, RepositoryError> {
    let mut lines_by_order: HashMap<i32, Vec<OrderLine>> = HashMap::new();
    for row in line_rows {
        lines_by_order
            .entry(row.order_id)
            .or_default()
            .push(row.try_into()?);
    }

    Ok(rows
        .into_iter()
        .map(|row| Order {
            id: OrderId::new(row.id),
            user_id: UserId::new(row.user_id),
            lines: lines_by_order.remove(&row.id).unwrap_or_default(),
            total_price: Price::new(row.total_price),
            address: row.address,
            is_paid: row.is_paid,
            created_at: row.created_at,
        })
        .collect())
}

const ORDER_COLUMNS: &str = "id, user_id, total_price, address, is_paid, created_at";

// Ordered by line position so lines come back in request order.
const ORDER_LINES_QUERY: &str = r"
    SELECT order_id, cart_line_id, product_id, quantity, unit_price
    FROM storefront.order_line
    WHERE order_id = ANY($1)
    ORDER BY order_id, position
";

// =============================================================================
// Store
// =============================================================================

/// [`InventoryStore`] backed by a `PostgreSQL` pool.
#[derive(Debug, Clone)]
pub struct PgInventoryStore {
    pool: PgPool,
}

impl PgInventoryStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_orders(&self, rows: Vec<OrderRow>) -> Result<Vec<Order>, RepositoryError> {
        let ids: Vec<i32> = rows.iter().map(|r| r.id).collect();
        let line_rows = sqlx::query_as::<_, OrderLineRow>(ORDER_LINES_QUERY)
            .bind(&ids)
            .fetch_all(&self.pool)
            .await?;
        assemble_orders(rows, line_rows)
    }
}

#[async_trait]
impl InventoryStore for PgInventoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, RepositoryError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgStoreTx { tx }))
    }

    async fn product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM storefront.product WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn cart_line(&self, id: CartLineId) -> Result<Option<CartLine>, RepositoryError> {
        let row = sqlx::query_as::<_, CartLineRow>(&format!(
            "SELECT {CART_LINE_COLUMNS} FROM storefront.cart_line WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn active_lines(&self, user_id: UserId) -> Result<Vec<CartLine>, RepositoryError> {
        let rows = sqlx::query_as::<_, CartLineRow>(&format!(
            "SELECT {CART_LINE_COLUMNS} FROM storefront.cart_line
             WHERE user_id = $1 AND status = 'active'
             ORDER BY added_at, id"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn cart_summaries(
        &self,
        user_id: UserId,
    ) -> Result<Vec<CartLineSummary>, RepositoryError> {
        let rows = sqlx::query_as::<_, CartSummaryRow>(
            r"
            SELECT cl.id, cl.product_id, p.name, p.price, cl.quantity,
                   p.stock_quantity, cl.added_at
            FROM storefront.cart_line cl
            JOIN storefront.product p ON p.id = cl.product_id
            WHERE cl.user_id = $1 AND cl.status = 'active'
            ORDER BY cl.added_at, cl.id
            ",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn order(&self, user_id: UserId, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM storefront.customer_order
             WHERE id = $1 AND user_id = $2"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(self.fetch_orders(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn orders(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM storefront.customer_order
             WHERE user_id = $1
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        self.fetch_orders(rows).await
    }

    async fn mark_paid(
        &self,
        user_id: UserId,
        id: OrderId,
    ) -> Result<Option<Order>, RepositoryError> {
        let result = sqlx::query(
            "UPDATE storefront.customer_order SET is_paid = TRUE WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.order(user_id, id).await
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// =============================================================================
// Transaction
// =============================================================================

/// Unit of work over one `PostgreSQL` transaction.
///
/// Dropping it without [`StoreTx::commit`] rolls the transaction back.
pub struct PgStoreTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgStoreTx {
    async fn product_for_update(
        &mut self,
        id: ProductId,
    ) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM storefront.product WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn set_stock(&mut self, id: ProductId, stock: i32) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE storefront.product SET stock_quantity = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(stock)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_constraint_violation(e, "stock_quantity must not be negative"))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn active_line(
        &mut self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<Option<CartLine>, RepositoryError> {
        let row = sqlx::query_as::<_, CartLineRow>(&format!(
            "SELECT {CART_LINE_COLUMNS} FROM storefront.cart_line
             WHERE user_id = $1 AND product_id = $2 AND status = 'active'"
        ))
        .bind(user_id)
        .bind(product_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn cart_line(&mut self, id: CartLineId) -> Result<Option<CartLine>, RepositoryError> {
        let row = sqlx::query_as::<_, CartLineRow>(&format!(
            "SELECT {CART_LINE_COLUMNS} FROM storefront.cart_line WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn active_lines(&mut self, user_id: UserId) -> Result<Vec<CartLine>, RepositoryError> {
        let rows = sqlx::query_as::<_, CartLineRow>(&format!(
            "SELECT {CART_LINE_COLUMNS} FROM storefront.cart_line
             WHERE user_id = $1 AND status = 'active'
             ORDER BY added_at, id"
        ))
        .bind(user_id)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn insert_line(&mut self, line: NewCartLine) -> Result<CartLine, RepositoryError> {
        let row = sqlx::query_as::<_, CartLineRow>(&format!(
            "INSERT INTO storefront.cart_line (user_id, product_id, quantity, status, added_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $5)
             RETURNING {CART_LINE_COLUMNS}"
        ))
        .bind(line.user_id)
        .bind(line.product_id)
        .bind(line.quantity)
        .bind(line.status)
        .bind(line.at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_constraint_violation(e, "active cart line already exists for product"))?;
        row.try_into()
    }

    async fn set_line_quantity(
        &mut self,
        id: CartLineId,
        quantity: Quantity,
        at: DateTime<Utc>,
    ) -> Result<CartLine, RepositoryError> {
        let row = sqlx::query_as::<_, CartLineRow>(&format!(
            "UPDATE storefront.cart_line SET quantity = $2, updated_at = $3
             WHERE id = $1
             RETURNING {CART_LINE_COLUMNS}"
        ))
        .bind(id)
        .bind(quantity)
        .bind(at)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.ok_or(RepositoryError::NotFound)?.try_into()
    }

    async fn delete_line(&mut self, id: CartLineId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM storefront.cart_line WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn consume_line(
        &mut self,
        id: CartLineId,
        order_id: OrderId,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE storefront.cart_line
            SET status = 'consumed', order_id = $2, updated_at = $3
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(order_id)
        .bind(at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn insert_order(&mut self, order: NewOrder) -> Result<Order, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "INSERT INTO storefront.customer_order (user_id, total_price, address, is_paid, created_at)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(order.user_id)
        .bind(order.total_price.amount())
        .bind(&order.address)
        .bind(order.is_paid)
        .bind(order.created_at)
        .fetch_one(&mut *self.tx)
        .await?;

        let mut lines = Vec::with_capacity(order.lines.len());
        for (position, line) in (0_i32..).zip(order.lines) {
            sqlx::query(
                r"
                INSERT INTO storefront.order_line
                    (order_id, position, cart_line_id, product_id, quantity, unit_price)
                VALUES ($1, $2, $3, $4, $5, $6)
                ",
            )
            .bind(row.id)
            .bind(position)
            .bind(line.cart_line_id)
            .bind(line.product_id)
            .bind(line.quantity)
            .bind(line.unit_price.amount())
            .execute(&mut *self.tx)
            .await?;

            lines.push(OrderLine {
                cart_line_id: line.cart_line_id,
                product_id: line.product_id,
                quantity: line.quantity,
                unit_price: line.unit_price,
            });
        }

        Ok(Order {
            id: OrderId::new(row.id),
            user_id: UserId::new(row.user_id),
            lines,
            total_price: Price::new(row.total_price),
            address: row.address,
            is_paid: row.is_paid,
            created_at: row.created_at,
        })
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        self.tx.commit().await?;
        Ok(())
    }
}
