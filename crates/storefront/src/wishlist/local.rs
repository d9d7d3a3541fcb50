//! Visitor-scoped local wishlist cache.
//!
//! Anonymous visitors keep their wishlist under the session key
//! [`LOCAL_STORAGE_KEY`] as an array of `{ id, handle }`. Once the visitor
//! logs in, the cache is drained into the remote list by the engine and
//! [`MERGED_FOR_KEY`] records which customer it was drained for.
//!
//! Every mutation is a read-modify-write of the stored record, serialized by
//! a [`SessionGate`] shared between all requests carrying the same session
//! id. Gates live in process memory, so two storefront processes serving the
//! same visitor still race.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;
use tower_sessions::session::Error as SessionError;
use tower_sessions::{Session, SessionStore};
use wishlist_core::{CustomerId, WishlistEntry};

use super::WishlistError;

/// Storage key for the anonymous wishlist.
pub const LOCAL_STORAGE_KEY: &str = "wishlist";

/// Storage key recording the customer the cache was last merged for.
pub const MERGED_FOR_KEY: &str = "wishlist_merged_for";

const CACHE_KEYS: [&str; 2] = [LOCAL_STORAGE_KEY, MERGED_FOR_KEY];

/// In-place edit of the cached entries, applied atomically by
/// [`LocalCache::update`].
pub type CacheEdit<'a> = Box<dyn FnOnce(&mut Vec<WishlistEntry>) + Send + 'a>;

/// Serializes cache edits for one session id.
pub type SessionGate = Arc<tokio::sync::Mutex<()>>;

/// Access to the visitor's cached wishlist entries.
#[async_trait]
pub trait LocalCache: Send + Sync {
    /// Read cached entries in insertion order.
    ///
    /// Returns an empty list (never "absent") when nothing is stored, and
    /// initializes the storage slot on first read.
    async fn read(&self) -> Result<Vec<WishlistEntry>, WishlistError>;

    /// Replace the cached entries.
    async fn write(&self, entries: &[WishlistEntry]) -> Result<(), WishlistError>;

    /// Empty the cache.
    async fn clear(&self) -> Result<(), WishlistError>;

    /// Apply `edit` to the stored entries with no other edit interleaving.
    async fn update(&self, edit: CacheEdit<'_>) -> Result<(), WishlistError>;

    /// Take every cached entry for merging into `customer`'s remote list.
    ///
    /// Empties the cache and marks it merged for `customer` in one step.
    /// Returns `None` when it was already merged for that customer, so a
    /// login drains the cache exactly once however many requests race.
    async fn take_for_merge(
        &self,
        customer: &CustomerId,
    ) -> Result<Option<Vec<WishlistEntry>>, WishlistError>;
}

#[async_trait]
impl<T: LocalCache + ?Sized> LocalCache for Arc<T> {
    async fn read(&self) -> Result<Vec<WishlistEntry>, WishlistError> {
        (**self).read().await
    }

    async fn write(&self, entries: &[WishlistEntry]) -> Result<(), WishlistError> {
        (**self).write(entries).await
    }

    async fn clear(&self) -> Result<(), WishlistError> {
        (**self).clear().await
    }

    async fn update(&self, edit: CacheEdit<'_>) -> Result<(), WishlistError> {
        (**self).update(edit).await
    }

    async fn take_for_merge(
        &self,
        customer: &CustomerId,
    ) -> Result<Option<Vec<WishlistEntry>>, WishlistError> {
        (**self).take_for_merge(customer).await
    }
}

// =============================================================================
// SessionCache
// =============================================================================

type Data = HashMap<String, Value>;

/// Local cache stored in the visitor's `tower-sessions` session.
///
/// Once the session has been persisted, edits load the record from `store`,
/// change it and save it straight back under the gate. The request's
/// in-memory session is left untouched so the end-of-response save cannot
/// overwrite edits made by concurrent requests. A session that has no stored
/// record yet is edited in memory and persisted by the session layer.
#[derive(Clone)]
pub struct SessionCache {
    session: Session,
    store: Arc<dyn SessionStore>,
    gate: SessionGate,
}

impl SessionCache {
    /// Wrap the request's session. `store` must be the store backing it.
    #[must_use]
    pub fn new(session: Session, store: Arc<dyn SessionStore>, gate: SessionGate) -> Self {
        Self {
            session,
            store,
            gate,
        }
    }

    async fn transact<T, F>(&self, apply: F) -> Result<T, WishlistError>
    where
        T: Send,
        F: FnOnce(&mut Data) -> Result<T, WishlistError> + Send,
    {
        let _gate = self.gate.lock().await;

        // A modified session is saved whole at the end of the response, so
        // edits must go through it.
        if !self.session.is_modified()
            && let Some(id) = self.session.id()
            && let Some(mut record) = self
                .store
                .load(&id)
                .await
                .map_err(SessionError::Store)?
        {
            let before = cache_view(&record.data);
            let value = apply(&mut record.data)?;
            if cache_view(&record.data) != before {
                record.expiry_date = self.session.expiry_date();
                self.store
                    .save(&record)
                    .await
                    .map_err(SessionError::Store)?;
            }
            return Ok(value);
        }

        let mut data = Data::new();
        for key in CACHE_KEYS {
            if let Some(value) = self.session.get_value(key).await? {
                data.insert(key.to_owned(), value);
            }
        }

        let before = data.clone();
        let value = apply(&mut data)?;
        if data != before {
            for key in CACHE_KEYS {
                match data.remove(key) {
                    Some(value) => {
                        self.session.insert_value(key, value).await?;
                    }
                    None => {
                        self.session.remove_value(key).await?;
                    }
                }
            }
        }
        Ok(value)
    }
}

fn cache_view(data: &Data) -> [Option<Value>; 2] {
    CACHE_KEYS.map(|key| data.get(key).cloned())
}

fn entries(data: &Data) -> Result<Vec<WishlistEntry>, WishlistError> {
    data.get(LOCAL_STORAGE_KEY).map_or_else(
        || Ok(Vec::new()),
        |value| {
            serde_json::from_value(value.clone())
                .map_err(|e| WishlistError::StorageUnavailable(e.to_string()))
        },
    )
}

fn put_entries(data: &mut Data, entries: &[WishlistEntry]) -> Result<(), WishlistError> {
    let value = serde_json::to_value(entries)
        .map_err(|e| WishlistError::StorageUnavailable(e.to_string()))?;
    data.insert(LOCAL_STORAGE_KEY.to_owned(), value);
    Ok(())
}

#[async_trait]
impl LocalCache for SessionCache {
    async fn read(&self) -> Result<Vec<WishlistEntry>, WishlistError> {
        self.transact(|data| {
            let stored = entries(data)?;
            if !data.contains_key(LOCAL_STORAGE_KEY) {
                put_entries(data, &[])?;
            }
            Ok(stored)
        })
        .await
    }

    async fn write(&self, entries: &[WishlistEntry]) -> Result<(), WishlistError> {
        self.transact(|data| put_entries(data, entries)).await
    }

    async fn clear(&self) -> Result<(), WishlistError> {
        tracing::debug!("Cleared local wishlist cache");
        self.write(&[]).await
    }

    async fn update(&self, edit: CacheEdit<'_>) -> Result<(), WishlistError> {
        self.transact(move |data| {
            let mut stored = entries(data)?;
            edit(&mut stored);
            put_entries(data, &stored)
        })
        .await
    }

    async fn take_for_merge(
        &self,
        customer: &CustomerId,
    ) -> Result<Option<Vec<WishlistEntry>>, WishlistError> {
        let customer = customer.as_str().to_owned();
        self.transact(move |data| {
            if data.get(MERGED_FOR_KEY).and_then(Value::as_str) == Some(customer.as_str()) {
                return Ok(None);
            }

            let taken = entries(data)?;
            put_entries(data, &[])?;
            data.insert(MERGED_FOR_KEY.to_owned(), Value::String(customer));
            Ok(Some(taken))
        })
        .await
    }
}

// =============================================================================
// MemoryCache
// =============================================================================

#[derive(Debug, Default)]
struct MemorySlot {
    entries: Option<Vec<WishlistEntry>>,
    merged_for: Option<CustomerId>,
}

/// In-process local cache.
///
/// Used by tests and tools that have no session. `unavailable()` builds a
/// cache whose every operation fails, for exercising degraded paths.
#[derive(Debug, Default)]
pub struct MemoryCache {
    slot: Mutex<MemorySlot>,
    unavailable: bool,
}

impl MemoryCache {
    /// An empty, uninitialized cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache pre-populated with entries.
    #[must_use]
    pub fn with_entries(entries: Vec<WishlistEntry>) -> Self {
        Self {
            slot: Mutex::new(MemorySlot {
                entries: Some(entries),
                merged_for: None,
            }),
            unavailable: false,
        }
    }

    /// A cache whose storage cannot be accessed.
    #[must_use]
    pub fn unavailable() -> Self {
        Self {
            slot: Mutex::default(),
            unavailable: true,
        }
    }

    /// Current contents without initializing the slot (`None` if never written).
    #[must_use]
    pub fn peek(&self) -> Option<Vec<WishlistEntry>> {
        self.lock().entries.clone()
    }

    /// Forget which customer the cache was merged for, as a new login does.
    pub fn reset_merge(&self) {
        self.lock().merged_for = None;
    }

    fn lock(&self) -> MutexGuard<'_, MemorySlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(&self) -> Result<(), WishlistError> {
        if self.unavailable {
            return Err(WishlistError::StorageUnavailable(
                "memory cache marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl LocalCache for MemoryCache {
    async fn read(&self) -> Result<Vec<WishlistEntry>, WishlistError> {
        self.check()?;
        Ok(self.lock().entries.get_or_insert_with(Vec::new).clone())
    }

    async fn write(&self, entries: &[WishlistEntry]) -> Result<(), WishlistError> {
        self.check()?;
        self.lock().entries = Some(entries.to_vec());
        Ok(())
    }

    async fn clear(&self) -> Result<(), WishlistError> {
        self.write(&[]).await
    }

    async fn update(&self, edit: CacheEdit<'_>) -> Result<(), WishlistError> {
        self.check()?;
        edit(self.lock().entries.get_or_insert_with(Vec::new));
        Ok(())
    }

    async fn take_for_merge(
        &self,
        customer: &CustomerId,
    ) -> Result<Option<Vec<WishlistEntry>>, WishlistError> {
        self.check()?;
        let mut slot = self.lock();
        if slot.merged_for.as_ref() == Some(customer) {
            return Ok(None);
        }
        slot.merged_for = Some(customer.clone());
        Ok(Some(slot.entries.replace(Vec::new()).unwrap_or_default()))
    }
}
