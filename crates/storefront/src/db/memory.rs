//! Process-local store.
//!
//! Committed state lives behind one mutex. A [`MemoryTx`] records its writes
//! in overlays and reads through them, so its own writes are visible to it
//! while other readers keep seeing committed state. Commit applies every
//! overlay under a single acquisition of the state lock.
//!
//! IDs come from per-table counters and are never reused; a rolled-back
//! transaction leaves a gap, like a database sequence.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use stockpile_core::{CartLineId, CartLineStatus, OrderId, ProductId, Quantity, UserId};

use super::catalog::{CatalogSeed, ProductSeed};
use super::store::{InventoryStore, StoreTx};
use super::RepositoryError;
use crate::models::{
    CartLine, CartLineSummary, NewCartLine, NewOrder, Order, OrderLine, Product,
};

#[derive(Debug, Default)]
struct MemoryState {
    products: BTreeMap<ProductId, Product>,
    lines: BTreeMap<CartLineId, CartLine>,
    orders: BTreeMap<OrderId, Order>,
    last_product_id: i32,
    last_line_id: i32,
    last_order_id: i32,
}

impl MemoryState {
    fn next_line_id(&mut self) -> CartLineId {
        self.last_line_id += 1;
        CartLineId::new(self.last_line_id)
    }

    fn next_order_id(&mut self) -> OrderId {
        self.last_order_id += 1;
        OrderId::new(self.last_order_id)
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    state: Mutex<MemoryState>,
    fail_next_commit: AtomicBool,
}

impl MemoryInner {
    fn state(&self, during: &'static str) -> Result<MutexGuard<'_, MemoryState>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::LockPoisoned(during))
    }
}

/// In-memory [`InventoryStore`].
///
/// Cloning shares the underlying state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding the given catalog.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if two products share a name.
    pub fn with_catalog(seed: &CatalogSeed) -> Result<Self, RepositoryError> {
        let store = Self::new();
        for product in &seed.products {
            store.add_product(product.clone())?;
        }
        Ok(store)
    }

    /// Insert a product and return it with its assigned ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` on a duplicate name or negative
    /// stock.
    pub fn add_product(&self, seed: ProductSeed) -> Result<Product, RepositoryError> {
        if seed.stock < 0 {
            return Err(RepositoryError::Conflict(
                "stock_quantity must not be negative".to_owned(),
            ));
        }
        let mut state = self.inner.state("add_product")?;
        if state.products.values().any(|p| p.name == seed.name) {
            return Err(RepositoryError::Conflict(format!(
                "product name '{}' already exists",
                seed.name
            )));
        }
        state.last_product_id += 1;
        let product = Product {
            id: ProductId::new(state.last_product_id),
            name: seed.name,
            price: seed.price,
            stock: seed.stock,
            is_active: seed.is_active,
            category_id: seed.category_id,
            updated_at: Utc::now(),
        };
        state.products.insert(product.id, product.clone());
        Ok(product)
    }

    /// Activate or deactivate a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` for an unknown product.
    pub fn set_product_active(&self, id: ProductId, active: bool) -> Result<(), RepositoryError> {
        let mut state = self.inner.state("set_product_active")?;
        let product = state.products.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        product.is_active = active;
        product.updated_at = Utc::now();
        Ok(())
    }

    /// Make the next transaction commit fail without applying anything.
    ///
    /// Simulates a storage failure at commit time.
    pub fn fail_next_commit(&self) {
        self.inner.fail_next_commit.store(true, Ordering::SeqCst);
    }
}

fn sort_lines(lines: &mut [CartLine]) {
    lines.sort_by_key(|l| (l.added_at, l.id));
}

#[async_trait]
impl InventoryStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, RepositoryError> {
        Ok(Box::new(MemoryTx {
            inner: Arc::clone(&self.inner),
            products: BTreeMap::new(),
            lines: BTreeMap::new(),
            orders: Vec::new(),
        }))
    }

    async fn product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        Ok(self.inner.state("product")?.products.get(&id).cloned())
    }

    async fn cart_line(&self, id: CartLineId) -> Result<Option<CartLine>, RepositoryError> {
        Ok(self.inner.state("cart_line")?.lines.get(&id).cloned())
    }

    async fn active_lines(&self, user_id: UserId) -> Result<Vec<CartLine>, RepositoryError> {
        let state = self.inner.state("active_lines")?;
        let mut lines: Vec<CartLine> = state
            .lines
            .values()
            .filter(|l| l.user_id == user_id && l.is_active())
            .cloned()
            .collect();
        sort_lines(&mut lines);
        Ok(lines)
    }

    async fn cart_summaries(
        &self,
        user_id: UserId,
    ) -> Result<Vec<CartLineSummary>, RepositoryError> {
        let state = self.inner.state("cart_summaries")?;
        let mut lines: Vec<&CartLine> = state
            .lines
            .values()
            .filter(|l| l.user_id == user_id && l.is_active())
            .collect();
        lines.sort_by_key(|l| (l.added_at, l.id));

        lines
            .into_iter()
            .map(|line| {
                let product = state.products.get(&line.product_id).ok_or_else(|| {
                    RepositoryError::DataCorruption(format!(
                        "cart line {} references missing product {}",
                        line.id, line.product_id
                    ))
                })?;
                Ok(CartLineSummary::new(
                    line,
                    product.name.clone(),
                    product.price,
                    product.stock,
                ))
            })
            .collect()
    }

    async fn order(&self, user_id: UserId, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(self
            .inner
            .state("order")?
            .orders
            .get(&id)
            .filter(|o| o.user_id == user_id)
            .cloned())
    }

    async fn orders(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        let state = self.inner.state("orders")?;
        let mut orders: Vec<Order> = state
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(orders)
    }

    async fn mark_paid(
        &self,
        user_id: UserId,
        id: OrderId,
    ) -> Result<Option<Order>, RepositoryError> {
        let mut state = self.inner.state("mark_paid")?;
        Ok(state
            .orders
            .get_mut(&id)
            .filter(|o| o.user_id == user_id)
            .map(|order| {
                order.is_paid = true;
                order.clone()
            }))
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        self.inner.state("ping").map(|_| ())
    }
}

/// Unit of work over a [`MemoryStore`].
///
/// `lines` maps to `None` for a deleted line.
struct MemoryTx {
    inner: Arc<MemoryInner>,
    products: BTreeMap<ProductId, Product>,
    lines: BTreeMap<CartLineId, Option<CartLine>>,
    orders: Vec<Order>,
}

impl MemoryTx {
    fn visible_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        if let Some(product) = self.products.get(&id) {
            return Ok(Some(product.clone()));
        }
        Ok(self.inner.state("read product")?.products.get(&id).cloned())
    }

    fn visible_line(&self, id: CartLineId) -> Result<Option<CartLine>, RepositoryError> {
        if let Some(entry) = self.lines.get(&id) {
            return Ok(entry.clone());
        }
        Ok(self.inner.state("read cart line")?.lines.get(&id).cloned())
    }

    fn visible_lines(
        &self,
        keep: impl Fn(&CartLine) -> bool,
    ) -> Result<Vec<CartLine>, RepositoryError> {
        let state = self.inner.state("read cart lines")?;
        let mut lines: Vec<CartLine> = state
            .lines
            .values()
            .filter(|l| !self.lines.contains_key(&l.id) && keep(l))
            .cloned()
            .collect();
        lines.extend(self.lines.values().flatten().filter(|l| keep(l)).cloned());
        sort_lines(&mut lines);
        Ok(lines)
    }

    fn existing_line(&self, id: CartLineId) -> Result<CartLine, RepositoryError> {
        self.visible_line(id)?.ok_or(RepositoryError::NotFound)
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn product_for_update(
        &mut self,
        id: ProductId,
    ) -> Result<Option<Product>, RepositoryError> {
        self.visible_product(id)
    }

    async fn set_stock(&mut self, id: ProductId, stock: i32) -> Result<(), RepositoryError> {
        let mut product = self.visible_product(id)?.ok_or(RepositoryError::NotFound)?;
        product.stock = stock;
        product.updated_at = Utc::now();
        self.products.insert(id, product);
        Ok(())
    }

    async fn active_line(
        &mut self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<Option<CartLine>, RepositoryError> {
        let lines = self.visible_lines(|l| {
            l.user_id == user_id && l.product_id == product_id && l.is_active()
        })?;
        Ok(lines.into_iter().next())
    }

    async fn cart_line(&mut self, id: CartLineId) -> Result<Option<CartLine>, RepositoryError> {
        self.visible_line(id)
    }

    async fn active_lines(&mut self, user_id: UserId) -> Result<Vec<CartLine>, RepositoryError> {
        self.visible_lines(|l| l.user_id == user_id && l.is_active())
    }

    async fn insert_line(&mut self, line: NewCartLine) -> Result<CartLine, RepositoryError> {
        if line.status.is_active() {
            let duplicate = self.visible_lines(|l| {
                l.user_id == line.user_id && l.product_id == line.product_id && l.is_active()
            })?;
            if !duplicate.is_empty() {
                return Err(RepositoryError::Conflict(
                    "active cart line already exists for product".to_owned(),
                ));
            }
        }

        let id = self.inner.state("allocate cart line id")?.next_line_id();
        let inserted = CartLine {
            id,
            user_id: line.user_id,
            product_id: line.product_id,
            quantity: line.quantity,
            status: line.status,
            order_id: None,
            added_at: line.at,
            updated_at: line.at,
        };
        self.lines.insert(id, Some(inserted.clone()));
        Ok(inserted)
    }

    async fn set_line_quantity(
        &mut self,
        id: CartLineId,
        quantity: Quantity,
        at: DateTime<Utc>,
    ) -> Result<CartLine, RepositoryError> {
        let mut line = self.existing_line(id)?;
        line.quantity = quantity;
        line.updated_at = at;
        self.lines.insert(id, Some(line.clone()));
        Ok(line)
    }

    async fn delete_line(&mut self, id: CartLineId) -> Result<(), RepositoryError> {
        self.existing_line(id)?;
        self.lines.insert(id, None);
        Ok(())
    }

    async fn consume_line(
        &mut self,
        id: CartLineId,
        order_id: OrderId,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut line = self.existing_line(id)?;
        line.status = CartLineStatus::Consumed;
        line.order_id = Some(order_id);
        line.updated_at = at;
        self.lines.insert(id, Some(line));
        Ok(())
    }

    async fn insert_order(&mut self, order: NewOrder) -> Result<Order, RepositoryError> {
        let id = self.inner.state("allocate order id")?.next_order_id();
        let inserted = Order {
            id,
            user_id: order.user_id,
            lines: order
                .lines
                .into_iter()
                .map(|l| OrderLine {
                    cart_line_id: l.cart_line_id,
                    product_id: l.product_id,
                    quantity: l.quantity,
                    unit_price: l.unit_price,
                })
                .collect(),
            total_price: order.total_price,
            address: order.address,
            is_paid: order.is_paid,
            created_at: order.created_at,
        };
        self.orders.push(inserted.clone());
        Ok(inserted)
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        let Self {
            inner,
            products,
            lines,
            orders,
        } = *self;

        let mut state = inner.state("commit")?;
        if inner.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(RepositoryError::Conflict("simulated commit failure".to_owned()));
        }
        if let Some(product) = products.values().find(|p| p.stock < 0) {
            return Err(RepositoryError::Conflict(format!(
                "stock_quantity of product {} would become negative",
                product.id
            )));
        }

        state.products.extend(products);
        for (id, line) in lines {
            match line {
                Some(line) => {
                    state.lines.insert(id, line);
                }
                None => {
                    state.lines.remove(&id);
                }
            }
        }
        state.orders.extend(orders.into_iter().map(|o| (o.id, o)));
        Ok(())
    }
}
