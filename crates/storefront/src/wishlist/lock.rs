//! Per-product pending-operation locks.
//!
//! A wishlist button must not start a second add/remove for a product while
//! one is still in flight, or a remove could overtake a pending add. The lock
//! is held by a [`PendingGuard`] and released when the guard drops, on every
//! exit path.
//!
//! Locks older than the configured timeout count as abandoned (the request
//! holding them never finished) and can be taken over. A guard only ever
//! releases its own lock, never a newer holder's.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use wishlist_core::{OperationKind, ProductId};

/// An add or remove that has been issued and not yet resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOperation {
    pub product_id: ProductId,
    pub kind: OperationKind,
    pub issued_at: DateTime<Utc>,
}

/// Table of pending operations for one visitor, keyed by product.
///
/// Cheaply cloneable; clones share the same table.
#[derive(Clone)]
pub struct PendingOperations {
    inner: Arc<PendingOperationsInner>,
}

struct PendingOperationsInner {
    slots: Mutex<HashMap<ProductId, Slot>>,
    stale_after: TimeDelta,
    next_token: AtomicU64,
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    operation: PendingOperation,
    token: u64,
}

impl PendingOperations {
    /// Create an empty table whose locks expire after `stale_after`.
    #[must_use]
    pub fn new(stale_after: Duration) -> Self {
        Self {
            inner: Arc::new(PendingOperationsInner {
                slots: Mutex::new(HashMap::new()),
                stale_after: TimeDelta::from_std(stale_after).unwrap_or(TimeDelta::MAX),
                next_token: AtomicU64::new(1),
            }),
        }
    }

    /// Try to lock `product_id` for an operation of `kind`.
    ///
    /// Returns `None` while another live operation holds the product.
    #[must_use]
    pub fn try_acquire(&self, product_id: ProductId, kind: OperationKind) -> Option<PendingGuard> {
        let now = Utc::now();
        let mut slots = self.lock_slots();

        if let Some(slot) = slots.get(&product_id) {
            if !self.is_stale(&slot.operation, now) {
                return None;
            }
            tracing::warn!(
                product_id = %product_id,
                kind = %slot.operation.kind,
                issued_at = %slot.operation.issued_at,
                "Taking over abandoned wishlist lock"
            );
        }

        let operation = PendingOperation {
            product_id,
            kind,
            issued_at: now,
        };
        let token = self.inner.next_token.fetch_add(1, Ordering::Relaxed);
        slots.insert(product_id, Slot { operation, token });
        drop(slots);

        Some(PendingGuard {
            table: self.clone(),
            operation,
            token,
        })
    }

    /// The live operation holding `product_id`, if any.
    #[must_use]
    pub fn pending(&self, product_id: ProductId) -> Option<PendingOperation> {
        let now = Utc::now();
        self.lock_slots()
            .get(&product_id)
            .map(|slot| slot.operation)
            .filter(|op| !self.is_stale(op, now))
    }

    /// Whether a live operation holds `product_id`.
    #[must_use]
    pub fn is_pending(&self, product_id: ProductId) -> bool {
        self.pending(product_id).is_some()
    }

    fn is_stale(&self, operation: &PendingOperation, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(operation.issued_at) >= self.inner.stale_after
    }

    fn release(&self, product_id: ProductId, token: u64) {
        let mut slots = self.lock_slots();
        if slots.get(&product_id).is_some_and(|slot| slot.token == token) {
            slots.remove(&product_id);
        }
    }

    fn lock_slots(&self) -> std::sync::MutexGuard<'_, HashMap<ProductId, Slot>> {
        self.inner
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for PendingOperations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingOperations")
            .field("held", &self.lock_slots().len())
            .field("stale_after", &self.inner.stale_after)
            .finish()
    }
}

/// Proof of holding a product's lock. Releases it on drop.
#[derive(Debug)]
pub struct PendingGuard {
    table: PendingOperations,
    operation: PendingOperation,
    token: u64,
}

impl PendingGuard {
    /// The operation this guard holds the lock for.
    #[must_use]
    pub const fn operation(&self) -> &PendingOperation {
        &self.operation
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.table.release(self.operation.product_id, self.token);
    }
}
