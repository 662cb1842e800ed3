//! Per-product mutual exclusion for reservation changes.
//!
//! Every operation that reads and then writes a product's stock, or the cart
//! lines reserving it, holds that product's lock for the whole
//! read-decide-write sequence. Operations touching several products take
//! their locks in ascending [`ProductId`] order, so two such operations can
//! never wait on each other in a cycle.
//!
//! Locks are only ever awaited with a timeout. After the configured retries
//! the caller gets [`InventoryError::Busy`] instead of waiting indefinitely.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, warn};

use stockpile_core::ProductId;

use super::InventoryError;

/// How long to wait for a product lock and how often to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockPolicy {
    /// Wait per attempt.
    pub timeout: Duration,
    /// Attempts after the first.
    pub retries: u32,
    /// Pause before the first retry; doubles on each further retry.
    pub backoff: Duration,
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(2000),
            retries: 2,
            backoff: Duration::from_millis(50),
        }
    }
}

type LockMap = Mutex<HashMap<ProductId, Arc<AsyncMutex<()>>>>;

/// Hands out per-product locks.
///
/// A product's lock exists only while someone holds or waits on it. The
/// last guard to let go removes it from the map.
#[derive(Debug, Default)]
pub struct ReservationCoordinator {
    locks: Arc<LockMap>,
    policy: LockPolicy,
}

/// Proof that the holder owns the locks of a set of products.
///
/// Dropping the guard releases every lock it holds.
#[derive(Debug)]
pub struct ReservationGuard {
    products: Vec<ProductId>,
    held: Vec<OwnedMutexGuard<()>>,
    locks: Arc<LockMap>,
}

impl Drop for ReservationGuard {
    fn drop(&mut self) {
        // Each held guard owns a reference to its mutex; release them first.
        self.held.clear();

        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        for product_id in &self.products {
            // Only the map's own reference left: nobody holds or waits.
            if locks
                .get(product_id)
                .is_some_and(|lock| Arc::strong_count(lock) == 1)
            {
                locks.remove(product_id);
            }
        }
    }
}

impl ReservationGuard {
    /// Whether this guard holds `product_id`'s lock.
    #[must_use]
    pub fn covers(&self, product_id: ProductId) -> bool {
        self.products.binary_search(&product_id).is_ok()
    }

    /// Locked products in acquisition (ascending) order.
    #[must_use]
    pub fn products(&self) -> &[ProductId] {
        &self.products
    }
}

impl ReservationCoordinator {
    /// Create a coordinator with the given lock policy.
    #[must_use]
    pub fn new(policy: LockPolicy) -> Self {
        Self {
            locks: Arc::default(),
            policy,
        }
    }

    /// Lock a single product.
    ///
    /// # Errors
    ///
    /// Returns `InventoryError::Busy` if the lock is still held after every
    /// attempt.
    pub async fn acquire(&self, product_id: ProductId) -> Result<ReservationGuard, InventoryError> {
        self.acquire_all([product_id]).await
    }

    /// Lock several products, deduplicated, in ascending ID order.
    ///
    /// Either every lock is acquired or none is held on return.
    ///
    /// # Errors
    ///
    /// Returns `InventoryError::Busy` naming the first product that could not
    /// be locked.
    pub async fn acquire_all(
        &self,
        product_ids: impl IntoIterator<Item = ProductId>,
    ) -> Result<ReservationGuard, InventoryError> {
        let products: Vec<ProductId> = product_ids
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        // Built up in place so that failure or cancellation part way through
        // releases and forgets whatever was already taken.
        let mut guard = ReservationGuard {
            products: Vec::with_capacity(products.len()),
            held: Vec::with_capacity(products.len()),
            locks: Arc::clone(&self.locks),
        };
        for product_id in products {
            let lock = self.lock_for(product_id);
            guard.products.push(product_id);
            let held = self.lock_with_retry(product_id, lock).await?;
            guard.held.push(held);
        }

        debug!(products = ?guard.products, "reservation locks acquired");
        Ok(guard)
    }

    /// Number of products with a live lock entry.
    #[cfg(test)]
    pub(crate) fn tracked_locks(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn lock_for(&self, product_id: ProductId) -> Arc<AsyncMutex<()>> {
        // The map only holds `Arc`s, so a poisoned map is still consistent.
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(product_id).or_default())
    }

    async fn lock_with_retry(
        &self,
        product_id: ProductId,
        lock: Arc<AsyncMutex<()>>,
    ) -> Result<OwnedMutexGuard<()>, InventoryError> {
        let mut backoff = self.policy.backoff;

        for attempt in 0..=self.policy.retries {
            if let Ok(guard) =
                tokio::time::timeout(self.policy.timeout, Arc::clone(&lock).lock_owned()).await
            {
                return Ok(guard);
            }

            warn!(
                product_id = %product_id,
                attempt = attempt + 1,
                timeout_ms = self.policy.timeout.as_millis(),
                "timed out waiting for product lock"
            );
            if attempt < self.policy.retries {
                tokio::time::sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
            }
        }

        Err(InventoryError::Busy { product_id })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn quick_policy() -> LockPolicy {
        LockPolicy {
            timeout: Duration::from_millis(20),
            retries: 1,
            backoff: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn test_acquire_all_sorts_and_dedups() {
        let coordinator = ReservationCoordinator::new(quick_policy());
        let guard = coordinator
            .acquire_all([ProductId::new(9), ProductId::new(2), ProductId::new(9)])
            .await
            .unwrap();

        assert_eq!(guard.products(), &[ProductId::new(2), ProductId::new(9)]);
        assert!(guard.covers(ProductId::new(9)));
        assert!(!guard.covers(ProductId::new(3)));
    }

    #[tokio::test]
    async fn test_held_lock_yields_busy() {
        let coordinator = ReservationCoordinator::new(quick_policy());
        let _held = coordinator.acquire(ProductId::new(1)).await.unwrap();

        let err = coordinator.acquire(ProductId::new(1)).await.unwrap_err();
        assert!(matches!(
            err,
            InventoryError::Busy { product_id } if product_id == ProductId::new(1)
        ));
    }

    #[tokio::test]
    async fn test_lock_released_on_drop() {
        let coordinator = ReservationCoordinator::new(quick_policy());
        let guard = coordinator.acquire(ProductId::new(1)).await.unwrap();
        drop(guard);

        assert!(coordinator.acquire(ProductId::new(1)).await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_acquire_all_releases_partial_locks() {
        let coordinator = ReservationCoordinator::new(quick_policy());
        let _blocker = coordinator.acquire(ProductId::new(5)).await.unwrap();

        let err = coordinator
            .acquire_all([ProductId::new(1), ProductId::new(5)])
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::Busy { product_id } if product_id == ProductId::new(5)));

        // Product 1 was taken first and must have been let go.
        assert!(coordinator.acquire(ProductId::new(1)).await.is_ok());
    }

    #[tokio::test]
    async fn test_distinct_products_do_not_contend() {
        let coordinator = ReservationCoordinator::new(quick_policy());
        let _a = coordinator.acquire(ProductId::new(1)).await.unwrap();
        assert!(coordinator.acquire(ProductId::new(2)).await.is_ok());
    }

    #[tokio::test]
    async fn test_waiter_gets_lock_once_released() {
        let coordinator = Arc::new(ReservationCoordinator::new(LockPolicy {
            timeout: Duration::from_millis(500),
            retries: 0,
            backoff: Duration::ZERO,
        }));
        let guard = coordinator.acquire(ProductId::new(1)).await.unwrap();

        let waiter = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.acquire(ProductId::new(1)).await.is_ok() })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(guard);

        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_released_locks_are_forgotten() {
        let coordinator = ReservationCoordinator::new(quick_policy());
        for id in 1..=500 {
            let guard = coordinator.acquire(ProductId::new(id)).await.unwrap();
            assert_eq!(coordinator.tracked_locks(), 1);
            drop(guard);
        }
        assert_eq!(coordinator.tracked_locks(), 0);

        let guard = coordinator
            .acquire_all((1..=50).map(ProductId::new))
            .await
            .unwrap();
        assert_eq!(coordinator.tracked_locks(), 50);
        drop(guard);
        assert_eq!(coordinator.tracked_locks(), 0);
    }

    #[tokio::test]
    async fn test_failed_acquire_all_forgets_its_locks() {
        let coordinator = ReservationCoordinator::new(quick_policy());
        let blocker = coordinator.acquire(ProductId::new(5)).await.unwrap();

        coordinator
            .acquire_all([ProductId::new(1), ProductId::new(2), ProductId::new(5)])
            .await
            .unwrap_err();
        // Only the blocker's entry survives.
        assert_eq!(coordinator.tracked_locks(), 1);

        drop(blocker);
        assert_eq!(coordinator.tracked_locks(), 0);
    }

    #[tokio::test]
    async fn test_lock_entry_survives_while_waited_on() {
        let coordinator = Arc::new(ReservationCoordinator::new(LockPolicy {
            timeout: Duration::from_millis(500),
            retries: 0,
            backoff: Duration::ZERO,
        }));
        let first = coordinator.acquire(ProductId::new(1)).await.unwrap();

        let (acquired_tx, acquired_rx) = tokio::sync::oneshot::channel();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let waiter = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move {
                let guard = coordinator.acquire(ProductId::new(1)).await.unwrap();
                acquired_tx.send(()).unwrap();
                release_rx.await.unwrap();
                drop(guard);
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // The waiter still references the lock, so the entry must stay and
        // a third caller has to queue behind it on the same mutex.
        drop(first);
        assert_eq!(coordinator.tracked_locks(), 1);
        acquired_rx.await.unwrap();
        assert!(coordinator.acquire(ProductId::new(1)).await.is_err());

        release_tx.send(()).unwrap();
        waiter.await.unwrap();
        assert_eq!(coordinator.tracked_locks(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_acquire_forgets_its_locks() {
        let coordinator = ReservationCoordinator::new(LockPolicy {
            timeout: Duration::from_secs(5),
            retries: 0,
            backoff: Duration::ZERO,
        });
        let blocker = coordinator.acquire(ProductId::new(3)).await.unwrap();

        let pending = coordinator.acquire_all([ProductId::new(1), ProductId::new(3)]);
        assert!(
            tokio::time::timeout(Duration::from_millis(20), pending)
                .await
                .is_err()
        );
        assert_eq!(coordinator.tracked_locks(), 1);

        drop(blocker);
        assert_eq!(coordinator.tracked_locks(), 0);
    }
}
