//! Application state shared across handlers.

use std::sync::Arc;

use crate::config::StorefrontConfig;
use crate::db::InventoryStore;
use crate::inventory::{CartService, InventoryEngine, OrderService};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// the store, the inventory engine and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    store: Arc<dyn InventoryStore>,
    engine: InventoryEngine,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Arguments
    ///
    /// * `config` - Storefront configuration (the lock policy is taken from it)
    /// * `store` - Backing inventory store
    #[must_use]
    pub fn new(config: StorefrontConfig, store: Arc<dyn InventoryStore>) -> Self {
        let engine = InventoryEngine::new(Arc::clone(&store), config.reservation);
        Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                engine,
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the inventory store.
    #[must_use]
    pub fn store(&self) -> &dyn InventoryStore {
        self.inner.store.as_ref()
    }

    /// Cart operations.
    #[must_use]
    pub fn cart(&self) -> &CartService {
        self.inner.engine.cart()
    }

    /// Order operations.
    #[must_use]
    pub fn orders(&self) -> &OrderService {
        self.inner.engine.orders()
    }
}
