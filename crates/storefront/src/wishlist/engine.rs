//! Wishlist reconciliation engine.
//!
//! The engine owns the visitor's [`MembershipSet`] and is the only code that
//! mutates it. Which backing store is authoritative depends on the customer
//! handed in at construction:
//!
//! - no customer: the [`LocalCache`] is authoritative
//! - customer: the [`RemoteWishlist`] is authoritative and the local cache is
//!   drained into it once per login, on initialization
//!
//! Membership changes only after the backing store confirms an operation.

use std::str::FromStr;

use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};
use wishlist_core::{
    CustomerId, MembershipChange, MembershipSet, MembershipState, OperationKind, ProductId,
    WishlistEntry,
};

use super::WishlistError;
use super::local::LocalCache;
use super::lock::PendingOperations;
use super::remote::RemoteWishlist;
use crate::config::WishlistConfig;

/// What happens to local cache entries whose remote add failed during
/// merge-on-login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergePolicy {
    /// Clear the whole cache after the merge, losing entries that failed.
    ClearAll,
    /// Keep failed entries in the cache so the next login retries them.
    #[default]
    RetainFailed,
}

impl FromStr for MergePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "clear-all" | "clear_all" => Ok(Self::ClearAll),
            "retain-failed" | "retain_failed" => Ok(Self::RetainFailed),
            other => Err(format!(
                "unknown merge policy '{other}' (expected clear-all or retain-failed)"
            )),
        }
    }
}

/// Engine behavior knobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineSettings {
    pub merge_policy: MergePolicy,
}

impl From<&WishlistConfig> for EngineSettings {
    fn from(config: &WishlistConfig) -> Self {
        Self {
            merge_policy: config.merge_policy,
        }
    }
}

/// Result of [`WishlistEngine::initialize`].
///
/// Initialization never fails outright: if the authoritative store could not
/// be read, `membership` is empty and `error` says why.
#[derive(Debug, Clone)]
pub struct Initialization {
    pub membership: MembershipSet,
    pub error: Option<WishlistError>,
}

impl Initialization {
    /// Whether the membership set reflects the authoritative store.
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        self.error.is_some()
    }
}

/// Outcome of merging local cache entries into the remote list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Entries added to the remote list.
    pub migrated: Vec<ProductId>,
    /// Entries the remote list already had.
    pub already_remote: Vec<ProductId>,
    /// Entries whose remote add failed.
    pub failed: Vec<ProductId>,
    /// Entries left in the local cache afterwards.
    pub retained: Vec<ProductId>,
}

impl MergeReport {
    /// Whether any local entry was considered.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.migrated.is_empty() && self.already_remote.is_empty() && self.failed.is_empty()
    }
}

/// Keeps local cache, remote list and the in-memory membership set consistent.
pub struct WishlistEngine<R, C> {
    customer: Option<CustomerId>,
    remote: R,
    cache: C,
    locks: PendingOperations,
    settings: EngineSettings,
    membership: RwLock<MembershipSet>,
}

impl<R, C> WishlistEngine<R, C>
where
    R: RemoteWishlist,
    C: LocalCache,
{
    /// Create an engine for one visitor.
    ///
    /// `locks` should be shared by every engine built for the same visitor so
    /// that concurrent requests see each other's pending operations.
    pub fn new(
        customer: Option<CustomerId>,
        remote: R,
        cache: C,
        locks: PendingOperations,
        settings: EngineSettings,
    ) -> Self {
        Self {
            customer,
            remote,
            cache,
            locks,
            settings,
            membership: RwLock::new(MembershipSet::new()),
        }
    }

    /// The customer this engine acts for, if logged in.
    #[must_use]
    pub const fn customer(&self) -> Option<&CustomerId> {
        self.customer.as_ref()
    }

    /// The visitor's pending-operation table.
    #[must_use]
    pub const fn locks(&self) -> &PendingOperations {
        &self.locks
    }

    /// Snapshot of the current membership set.
    pub async fn membership(&self) -> MembershipSet {
        self.membership.read().await.clone()
    }

    /// Current membership state of a product.
    pub async fn state_of(&self, product_id: ProductId) -> MembershipState {
        self.membership.read().await.state_of(product_id)
    }

    /// Load the membership set from the authoritative store.
    ///
    /// Anonymous visitors read the local cache. Customers fetch the remote
    /// list and then merge any local entries into it. A fetch failure leaves
    /// the set empty and skips the merge, so the local cache survives.
    #[instrument(skip(self), fields(customer = ?self.customer))]
    pub async fn initialize(&self) -> Initialization {
        let Some(customer) = &self.customer else {
            return match self.cache.read().await {
                Ok(entries) => {
                    let set = MembershipSet::from_entries(entries);
                    debug!(count = set.len(), "Loaded local wishlist");
                    *self.membership.write().await = set.clone();
                    Initialization {
                        membership: set,
                        error: None,
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Local wishlist unavailable");
                    self.degrade(e).await
                }
            };
        };

        match self.remote.list(customer).await {
            Ok(snapshot) => {
                let remote_set = snapshot.into_membership();
                debug!(count = remote_set.len(), "Loaded remote wishlist");
                *self.membership.write().await = remote_set.clone();

                self.merge_local_into_remote(&remote_set).await;

                Initialization {
                    membership: self.membership().await,
                    error: None,
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to fetch remote wishlist");
                self.degrade(e).await
            }
        }
    }

    async fn degrade(&self, error: WishlistError) -> Initialization {
        *self.membership.write().await = MembershipSet::new();
        Initialization {
            membership: MembershipSet::new(),
            error: Some(error),
        }
    }

    /// Drain local cache entries into the customer's remote list.
    ///
    /// The cache is taken in one step, so concurrent requests for the same
    /// login see it drained and only one of them migrates. Every taken
    /// product missing from `remote_set` gets one remote add while its
    /// product lock is held; a product whose lock is already held counts as
    /// failed. Failed adds are logged and not retried. Under
    /// [`MergePolicy::RetainFailed`] they go back into the cache for the next
    /// login. No-op for anonymous visitors or an empty cache.
    #[instrument(skip_all, fields(customer = ?self.customer))]
    pub async fn merge_local_into_remote(&self, remote_set: &MembershipSet) -> MergeReport {
        let mut report = MergeReport::default();

        let Some(customer) = &self.customer else {
            return report;
        };

        let local = match self.cache.take_for_merge(customer).await {
            Ok(Some(entries)) => MembershipSet::from_entries(entries),
            Ok(None) => {
                debug!("Local wishlist already merged for this login");
                return report;
            }
            Err(e) => {
                warn!(error = %e, "Skipping wishlist merge, local cache unavailable");
                return report;
            }
        };

        if local.is_empty() {
            return report;
        }

        let mut failed = Vec::new();
        for entry in Vec::from(local) {
            let product_id = entry.product_id;

            if remote_set.contains(product_id) {
                report.already_remote.push(product_id);
                continue;
            }

            let Some(_guard) = self.locks.try_acquire(product_id, OperationKind::Add) else {
                debug!(product_id = %product_id, "Wishlist operation pending, not migrating entry");
                report.failed.push(product_id);
                failed.push(entry);
                continue;
            };

            match self.remote.add(customer, product_id).await {
                Ok(_) => {
                    report.migrated.push(product_id);
                    self.membership.write().await.insert(entry);
                }
                Err(e) => {
                    warn!(product_id = %product_id, error = %e, "Failed to migrate wishlist entry");
                    report.failed.push(product_id);
                    failed.push(entry);
                }
            }
        }

        if self.settings.merge_policy == MergePolicy::RetainFailed && !failed.is_empty() {
            report.retained = failed.iter().map(|e| e.product_id).collect();
            let restored = self
                .cache
                .update(Box::new(move |entries| {
                    for entry in failed {
                        if !entries.contains(&entry) {
                            entries.push(entry);
                        }
                    }
                }))
                .await;

            if let Err(e) = restored {
                tracing::error!(error = %e, "Failed to retain unmigrated wishlist entries");
            }
        }

        info!(
            migrated = report.migrated.len(),
            already_remote = report.already_remote.len(),
            failed = report.failed.len(),
            retained = report.retained.len(),
            "Merged local wishlist into remote"
        );

        report
    }

    /// Add the product if absent, remove it if present.
    ///
    /// # Errors
    ///
    /// Returns [`WishlistError::OperationPending`] without touching any store
    /// when an operation on the same product is still in flight. Backing
    /// store failures are reported as a change with `ok == false`.
    pub async fn toggle(&self, entry: WishlistEntry) -> Result<MembershipChange, WishlistError> {
        let kind = if self.state_of(entry.product_id).await.is_present() {
            OperationKind::Remove
        } else {
            OperationKind::Add
        };
        self.apply(kind, entry).await
    }

    /// Add a product. A product already present is a confirmed no-op.
    ///
    /// # Errors
    ///
    /// Returns [`WishlistError::OperationPending`] when the product is locked.
    pub async fn add(&self, entry: WishlistEntry) -> Result<MembershipChange, WishlistError> {
        self.apply(OperationKind::Add, entry).await
    }

    /// Remove a product. A product already absent is a confirmed no-op.
    ///
    /// # Errors
    ///
    /// Returns [`WishlistError::OperationPending`] when the product is locked.
    pub async fn remove(&self, product_id: ProductId) -> Result<MembershipChange, WishlistError> {
        self.apply(OperationKind::Remove, WishlistEntry::bare(product_id))
            .await
    }

    #[instrument(skip(self, entry), fields(product_id = %entry.product_id, kind = %kind))]
    async fn apply(
        &self,
        kind: OperationKind,
        entry: WishlistEntry,
    ) -> Result<MembershipChange, WishlistError> {
        let product_id = entry.product_id;

        let Some(_guard) = self.locks.try_acquire(product_id, kind) else {
            let held = self
                .locks
                .pending(product_id)
                .map_or(kind, |pending| pending.kind);
            debug!(held = %held, "Wishlist operation already pending");
            return Err(WishlistError::OperationPending {
                product_id,
                kind: held,
            });
        };

        let current = self.state_of(product_id).await;
        if current == kind.target_state() {
            return Ok(MembershipChange::confirmed(product_id, current));
        }

        let result = match kind {
            OperationKind::Add => self.store_add(&entry).await,
            OperationKind::Remove => self.store_remove(product_id).await,
        };

        match result {
            Ok(()) => {
                let mut membership = self.membership.write().await;
                match kind {
                    OperationKind::Add => {
                        membership.insert(entry);
                    }
                    OperationKind::Remove => {
                        membership.remove(product_id);
                    }
                }
                drop(membership);

                debug!("Wishlist operation confirmed");
                Ok(MembershipChange::confirmed(product_id, kind.target_state()))
            }
            Err(e) => {
                warn!(error = %e, "Wishlist operation failed");
                Ok(MembershipChange::failed(product_id, current))
            }
        }
    }

    /// Handle an external "item added to cart" event.
    ///
    /// Removes the product from the authoritative store and the membership
    /// set. No button triggered this, so the product lock is not taken.
    #[instrument(skip(self), fields(customer = ?self.customer))]
    pub async fn remove_by_external_event(&self, product_id: ProductId) -> MembershipChange {
        let current = self.state_of(product_id).await;

        match self.store_remove(product_id).await {
            Ok(()) => {
                self.membership.write().await.remove(product_id);
                debug!("Removed wishlist product after cart event");
                MembershipChange::confirmed(product_id, MembershipState::Absent)
            }
            Err(e) => {
                warn!(error = %e, "Failed to remove wishlist product after cart event");
                MembershipChange::failed(product_id, current)
            }
        }
    }

    async fn store_add(&self, entry: &WishlistEntry) -> Result<(), WishlistError> {
        if let Some(customer) = &self.customer {
            self.remote.add(customer, entry.product_id).await?;
            return Ok(());
        }

        let entry = entry.clone();
        self.cache
            .update(Box::new(move |entries| {
                if !entries.contains(&entry) {
                    entries.push(entry);
                }
            }))
            .await
    }

    async fn store_remove(&self, product_id: ProductId) -> Result<(), WishlistError> {
        if let Some(customer) = &self.customer {
            self.remote.remove(customer, product_id).await?;
            return Ok(());
        }

        self.cache
            .update(Box::new(move |entries| {
                entries.retain(|e| e.product_id != product_id);
            }))
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::{Arc, Mutex, PoisonError};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Notify;
    use wishlist_core::ListSnapshot;

    use super::*;
    use crate::wishlist::local::MemoryCache;

    /// Recorded remote call.
    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Add(ProductId),
        Remove(ProductId),
        List,
    }

    /// Scriptable in-memory remote list.
    #[derive(Default)]
    struct FakeRemote {
        items: Mutex<Vec<WishlistEntry>>,
        calls: Mutex<Vec<Call>>,
        fail_list: bool,
        fail_add_for: Vec<ProductId>,
        fail_remove: bool,
        /// When set, `add` waits for a notification before completing.
        gate: Option<Arc<Notify>>,
    }

    impl FakeRemote {
        fn with_items(ids: &[i64]) -> Self {
            Self {
                items: Mutex::new(ids.iter().map(|&id| WishlistEntry::bare(ProductId::new(id))).collect()),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
        }

        fn ids(&self) -> Vec<ProductId> {
            self.items
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .map(|e| e.product_id)
                .collect()
        }

        fn record(&self, call: Call) {
            self.calls.lock().unwrap_or_else(PoisonError::into_inner).push(call);
        }

        fn snapshot(&self) -> ListSnapshot {
            ListSnapshot::from_results(
                self.items.lock().unwrap_or_else(PoisonError::into_inner).clone(),
            )
        }
    }

    #[async_trait]
    impl RemoteWishlist for FakeRemote {
        async fn add(
            &self,
            _customer: &CustomerId,
            product_id: ProductId,
        ) -> Result<ListSnapshot, WishlistError> {
            self.record(Call::Add(product_id));
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.fail_add_for.contains(&product_id) {
                return Err(WishlistError::RemoteRejected {
                    status: 500,
                    body: String::new(),
                });
            }
            {
                let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
                if !items.iter().any(|e| e.product_id == product_id) {
                    items.push(WishlistEntry::bare(product_id));
                }
            }
            Ok(self.snapshot())
        }

        async fn remove(
            &self,
            _customer: &CustomerId,
            product_id: ProductId,
        ) -> Result<ListSnapshot, WishlistError> {
            self.record(Call::Remove(product_id));
            if self.fail_remove {
                return Err(WishlistError::NetworkFailure("connection reset".to_string()));
            }
            self.items
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|e| e.product_id != product_id);
            Ok(self.snapshot())
        }

        async fn list(&self, _customer: &CustomerId) -> Result<ListSnapshot, WishlistError> {
            self.record(Call::List);
            if self.fail_list {
                return Err(WishlistError::NetworkFailure("timed out".to_string()));
            }
            Ok(self.snapshot())
        }
    }

    fn customer() -> Option<CustomerId> {
        Some(CustomerId::parse("6104581734514").unwrap())
    }

    fn locks() -> PendingOperations {
        PendingOperations::new(Duration::from_secs(30))
    }

    fn engine(
        customer: Option<CustomerId>,
        remote: Arc<FakeRemote>,
        cache: Arc<MemoryCache>,
        policy: MergePolicy,
    ) -> WishlistEngine<Arc<FakeRemote>, Arc<MemoryCache>> {
        WishlistEngine::new(
            customer,
            remote,
            cache,
            locks(),
            EngineSettings {
                merge_policy: policy,
            },
        )
    }

    fn cached(ids: &[i64]) -> Arc<MemoryCache> {
        Arc::new(MemoryCache::with_entries(
            ids.iter()
                .map(|&id| WishlistEntry::bare(ProductId::new(id)))
                .collect(),
        ))
    }

    fn ids(values: &[i64]) -> Vec<ProductId> {
        values.iter().copied().map(ProductId::new).collect()
    }

    #[tokio::test]
    async fn test_initialize_anonymous_creates_empty_cache() {
        let cache = Arc::new(MemoryCache::new());
        let engine = engine(None, Arc::default(), cache.clone(), MergePolicy::default());

        let init = engine.initialize().await;
        assert!(init.membership.is_empty());
        assert!(!init.is_degraded());
        assert_eq!(cache.peek(), Some(Vec::new()));
    }

    #[tokio::test]
    async fn test_initialize_anonymous_reads_cache() {
        let engine = engine(None, Arc::default(), cached(&[3, 1]), MergePolicy::default());
        let init = engine.initialize().await;
        assert_eq!(init.membership.product_ids(), ids(&[3, 1]));
    }

    #[tokio::test]
    async fn test_initialize_anonymous_storage_unavailable_degrades() {
        let engine = engine(
            None,
            Arc::default(),
            Arc::new(MemoryCache::unavailable()),
            MergePolicy::default(),
        );
        let init = engine.initialize().await;
        assert!(init.membership.is_empty());
        assert!(matches!(
            init.error,
            Some(WishlistError::StorageUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_initialize_merges_local_into_remote() {
        let remote = Arc::new(FakeRemote::with_items(&[9]));
        let cache = cached(&[7, 9]);
        let engine = engine(customer(), remote.clone(), cache.clone(), MergePolicy::default());

        let init = engine.initialize().await;

        assert_eq!(
            remote.calls(),
            vec![Call::List, Call::Add(ProductId::new(7))]
        );
        assert_eq!(cache.peek(), Some(Vec::new()));
        let mut members = init.membership.product_ids();
        members.sort();
        assert_eq!(members, ids(&[7, 9]));
    }

    #[tokio::test]
    async fn test_initialize_remote_failure_degrades_and_keeps_cache() {
        let remote = Arc::new(FakeRemote {
            fail_list: true,
            ..FakeRemote::default()
        });
        let cache = cached(&[7]);
        let engine = engine(customer(), remote.clone(), cache.clone(), MergePolicy::default());

        let init = engine.initialize().await;

        assert!(init.membership.is_empty());
        assert!(matches!(init.error, Some(WishlistError::NetworkFailure(_))));
        assert_eq!(remote.calls(), vec![Call::List]);
        assert_eq!(cache.peek().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_merge_is_idempotent() {
        let remote = Arc::new(FakeRemote::with_items(&[9]));
        let cache = cached(&[7, 9]);

        let first = engine(customer(), remote.clone(), cache.clone(), MergePolicy::default());
        let report = first
            .merge_local_into_remote(&MembershipSet::from_entries(remote.snapshot().results))
            .await;
        assert_eq!(report.migrated, ids(&[7]));
        assert_eq!(report.already_remote, ids(&[9]));
        let after_first = remote.ids();

        let second = engine(customer(), remote.clone(), cache.clone(), MergePolicy::default());
        let report = second
            .merge_local_into_remote(&MembershipSet::from_entries(remote.snapshot().results))
            .await;
        assert!(report.is_empty());
        assert_eq!(remote.ids(), after_first);
        assert_eq!(
            remote.calls().iter().filter(|c| matches!(c, Call::Add(_))).count(),
            1
        );
    }

    #[tokio::test]
    async fn test_merge_runs_once_per_login() {
        let remote = Arc::new(FakeRemote::default());
        let cache = cached(&[7]);
        let engine = engine(customer(), remote.clone(), cache.clone(), MergePolicy::default());

        engine.merge_local_into_remote(&MembershipSet::new()).await;
        cache.write(&[WishlistEntry::bare(ProductId::new(8))]).await.unwrap();
        let report = engine.merge_local_into_remote(&MembershipSet::new()).await;

        assert!(report.is_empty());
        assert_eq!(remote.calls(), vec![Call::Add(ProductId::new(7))]);

        cache.reset_merge();
        let report = engine
            .merge_local_into_remote(&MembershipSet::from_entries(remote.snapshot().results))
            .await;
        assert_eq!(report.migrated, ids(&[8]));
    }

    #[tokio::test]
    async fn test_concurrent_merges_migrate_once() {
        let gate = Arc::new(Notify::new());
        let remote = Arc::new(FakeRemote {
            gate: Some(gate.clone()),
            ..FakeRemote::default()
        });
        let cache = cached(&[7]);
        let first = Arc::new(engine(customer(), remote.clone(), cache.clone(), MergePolicy::default()));
        let second = engine(customer(), remote.clone(), cache.clone(), MergePolicy::default());

        let running = tokio::spawn({
            let first = first.clone();
            async move { first.merge_local_into_remote(&MembershipSet::new()).await }
        });
        while remote.calls().is_empty() {
            tokio::task::yield_now().await;
        }

        let report = second.merge_local_into_remote(&MembershipSet::new()).await;
        assert!(report.is_empty());

        gate.notify_one();
        assert_eq!(running.await.unwrap().migrated, ids(&[7]));
        assert_eq!(remote.calls(), vec![Call::Add(ProductId::new(7))]);
        assert_eq!(cache.peek(), Some(Vec::new()));
    }

    #[tokio::test]
    async fn test_merge_skips_product_with_pending_operation() {
        let remote = Arc::new(FakeRemote::default());
        let cache = cached(&[7, 8]);
        let engine = engine(customer(), remote.clone(), cache.clone(), MergePolicy::RetainFailed);

        let held = engine.locks().try_acquire(ProductId::new(7), OperationKind::Add).unwrap();
        let report = engine.merge_local_into_remote(&MembershipSet::new()).await;
        drop(held);

        assert_eq!(report.migrated, ids(&[8]));
        assert_eq!(report.failed, ids(&[7]));
        assert_eq!(remote.calls(), vec![Call::Add(ProductId::new(8))]);
        assert_eq!(cache.peek().unwrap(), vec![WishlistEntry::bare(ProductId::new(7))]);
    }

    #[tokio::test]
    async fn test_concurrent_anonymous_adds_all_land() {
        let cache = cached(&[]);
        let engine = Arc::new(engine(None, Arc::default(), cache.clone(), MergePolicy::default()));
        engine.initialize().await;

        let tasks: Vec<_> = (1..=20)
            .map(|id| {
                let engine = engine.clone();
                tokio::spawn(async move { engine.add(WishlistEntry::bare(ProductId::new(id))).await })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap().unwrap().ok);
        }

        assert_eq!(cache.peek().unwrap().len(), 20);
        assert_eq!(engine.membership().await.len(), 20);
    }

    #[tokio::test]
    async fn test_merge_retain_failed_keeps_failed_entries() {
        let remote = Arc::new(FakeRemote {
            fail_add_for: ids(&[8]),
            ..FakeRemote::default()
        });
        let cache = cached(&[7, 8]);
        let engine = engine(customer(), remote.clone(), cache.clone(), MergePolicy::RetainFailed);

        let report = engine.merge_local_into_remote(&MembershipSet::new()).await;

        assert_eq!(report.migrated, ids(&[7]));
        assert_eq!(report.failed, ids(&[8]));
        assert_eq!(report.retained, ids(&[8]));
        assert_eq!(cache.peek().unwrap(), vec![WishlistEntry::bare(ProductId::new(8))]);
        assert_eq!(engine.membership().await.product_ids(), ids(&[7]));
    }

    #[tokio::test]
    async fn test_merge_clear_all_drops_failed_entries() {
        let remote = Arc::new(FakeRemote {
            fail_add_for: ids(&[8]),
            ..FakeRemote::default()
        });
        let cache = cached(&[7, 8]);
        let engine = engine(customer(), remote.clone(), cache.clone(), MergePolicy::ClearAll);

        let report = engine.merge_local_into_remote(&MembershipSet::new()).await;

        assert_eq!(report.failed, ids(&[8]));
        assert!(report.retained.is_empty());
        assert_eq!(cache.peek(), Some(Vec::new()));
    }

    #[tokio::test]
    async fn test_merge_anonymous_is_noop() {
        let cache = cached(&[7]);
        let engine = engine(None, Arc::default(), cache.clone(), MergePolicy::default());
        assert!(engine.merge_local_into_remote(&MembershipSet::new()).await.is_empty());
        assert_eq!(cache.peek().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_toggle_adds_then_removes() {
        let remote = Arc::new(FakeRemote::default());
        let engine = engine(customer(), remote.clone(), cached(&[]), MergePolicy::default());
        engine.initialize().await;

        let change = engine.toggle(WishlistEntry::bare(ProductId::new(42))).await.unwrap();
        assert_eq!(
            change,
            MembershipChange::confirmed(ProductId::new(42), MembershipState::Present)
        );
        assert!(engine.membership().await.contains(ProductId::new(42)));

        let change = engine.toggle(WishlistEntry::bare(ProductId::new(42))).await.unwrap();
        assert_eq!(change.new_state, MembershipState::Absent);
        assert!(change.ok);
        assert!(engine.membership().await.is_empty());
        assert!(remote.ids().is_empty());
    }

    #[tokio::test]
    async fn test_toggle_anonymous_writes_cache() {
        let cache = cached(&[]);
        let remote = Arc::new(FakeRemote::default());
        let engine = engine(None, remote.clone(), cache.clone(), MergePolicy::default());
        engine.initialize().await;

        engine
            .toggle(WishlistEntry::new(ProductId::new(5), "wool-hat"))
            .await
            .unwrap();
        let stored = cache.peek().unwrap();
        assert_eq!(stored, vec![WishlistEntry::bare(ProductId::new(5))]);
        assert_eq!(stored[0].handle.as_deref(), Some("wool-hat"));

        engine.toggle(WishlistEntry::bare(ProductId::new(5))).await.unwrap();
        assert_eq!(cache.peek(), Some(Vec::new()));
        assert!(remote.calls().is_empty());
    }

    #[tokio::test]
    async fn test_toggle_failure_leaves_membership_unchanged() {
        let remote = Arc::new(FakeRemote {
            fail_add_for: ids(&[42]),
            ..FakeRemote::default()
        });
        let engine = engine(customer(), remote, cached(&[]), MergePolicy::default());
        engine.initialize().await;

        let change = engine.toggle(WishlistEntry::bare(ProductId::new(42))).await.unwrap();
        assert!(!change.ok);
        assert_eq!(change.new_state, MembershipState::Absent);
        assert!(engine.membership().await.is_empty());
        assert!(!engine.locks().is_pending(ProductId::new(42)));
    }

    #[tokio::test]
    async fn test_toggle_anonymous_storage_failure() {
        let engine = engine(
            None,
            Arc::default(),
            Arc::new(MemoryCache::unavailable()),
            MergePolicy::default(),
        );
        let change = engine.toggle(WishlistEntry::bare(ProductId::new(1))).await.unwrap();
        assert!(!change.ok);
        assert!(engine.membership().await.is_empty());
    }

    #[tokio::test]
    async fn test_toggle_while_pending_issues_no_second_call() {
        let gate = Arc::new(Notify::new());
        let remote = Arc::new(FakeRemote {
            gate: Some(gate.clone()),
            ..FakeRemote::default()
        });
        let engine = Arc::new(engine(customer(), remote.clone(), cached(&[]), MergePolicy::default()));
        engine.initialize().await;

        let first = tokio::spawn({
            let engine = engine.clone();
            async move { engine.toggle(WishlistEntry::bare(ProductId::new(42))).await }
        });

        while !engine.locks().is_pending(ProductId::new(42)) {
            tokio::task::yield_now().await;
        }

        let second = engine.toggle(WishlistEntry::bare(ProductId::new(42))).await;
        assert_eq!(
            second,
            Err(WishlistError::OperationPending {
                product_id: ProductId::new(42),
                kind: OperationKind::Add,
            })
        );

        gate.notify_one();
        let first = first.await.unwrap().unwrap();
        assert_eq!(first.new_state, MembershipState::Present);
        assert_eq!(
            remote.calls(),
            vec![Call::List, Call::Add(ProductId::new(42))]
        );
        assert!(!engine.locks().is_pending(ProductId::new(42)));
    }

    #[tokio::test]
    async fn test_add_present_is_noop() {
        let remote = Arc::new(FakeRemote::with_items(&[3]));
        let engine = engine(customer(), remote.clone(), cached(&[]), MergePolicy::default());
        engine.initialize().await;

        let change = engine.add(WishlistEntry::bare(ProductId::new(3))).await.unwrap();
        assert!(change.ok);
        assert_eq!(change.new_state, MembershipState::Present);
        assert_eq!(remote.calls(), vec![Call::List]);
    }

    #[tokio::test]
    async fn test_remove_by_external_event() {
        let remote = Arc::new(FakeRemote::with_items(&[9, 4]));
        let engine = engine(customer(), remote.clone(), cached(&[]), MergePolicy::default());
        engine.initialize().await;

        let change = engine.remove_by_external_event(ProductId::new(9)).await;

        assert_eq!(
            change,
            MembershipChange::confirmed(ProductId::new(9), MembershipState::Absent)
        );
        assert_eq!(engine.membership().await.product_ids(), ids(&[4]));
        assert_eq!(
            remote.calls(),
            vec![Call::List, Call::Remove(ProductId::new(9))]
        );
    }

    #[tokio::test]
    async fn test_remove_by_external_event_ignores_button_lock() {
        let remote = Arc::new(FakeRemote::with_items(&[9]));
        let engine = engine(customer(), remote.clone(), cached(&[]), MergePolicy::default());
        engine.initialize().await;

        let _held = engine.locks().try_acquire(ProductId::new(9), OperationKind::Remove).unwrap();
        let change = engine.remove_by_external_event(ProductId::new(9)).await;
        assert!(change.ok);
        assert!(remote.ids().is_empty());
    }

    #[tokio::test]
    async fn test_remove_by_external_event_failure() {
        let remote = Arc::new(FakeRemote {
            fail_remove: true,
            ..FakeRemote::with_items(&[9])
        });
        let engine = engine(customer(), remote, cached(&[]), MergePolicy::default());
        engine.initialize().await;

        let change = engine.remove_by_external_event(ProductId::new(9)).await;
        assert_eq!(
            change,
            MembershipChange::failed(ProductId::new(9), MembershipState::Present)
        );
        assert!(engine.membership().await.contains(ProductId::new(9)));
    }

    #[tokio::test]
    async fn test_remove_by_external_event_anonymous() {
        let cache = cached(&[9, 2]);
        let engine = engine(None, Arc::default(), cache.clone(), MergePolicy::default());
        engine.initialize().await;

        assert!(engine.remove_by_external_event(ProductId::new(9)).await.ok);
        assert_eq!(cache.peek().unwrap(), vec![WishlistEntry::bare(ProductId::new(2))]);
    }

    #[test]
    fn test_merge_policy_from_str() {
        assert_eq!("clear-all".parse::<MergePolicy>(), Ok(MergePolicy::ClearAll));
        assert_eq!(
            " Retain_Failed ".parse::<MergePolicy>(),
            Ok(MergePolicy::RetainFailed)
        );
        assert!("sometimes".parse::<MergePolicy>().is_err());
    }
}
