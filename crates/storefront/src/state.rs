//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use sqlx::PgPool;
use tower_sessions::SessionStore;

use crate::config::StorefrontConfig;
use crate::wishlist::{PendingOperations, SessionGate, StackletClient};

/// Idle time after which a visitor's lock table and session gate are dropped.
///
/// Tables are never evicted for space: dropping one while a request still
/// holds it would let a second request start a duplicate operation.
const VISITOR_IDLE: Duration = Duration::from_secs(30 * 60);

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    pool: PgPool,
    wishlist: StackletClient,
    sessions: Arc<dyn SessionStore>,
    locks: Cache<String, PendingOperations>,
    gates: Cache<String, SessionGate>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// `sessions` must be the store behind the session layer; the local
    /// wishlist cache writes through it.
    ///
    /// # Errors
    ///
    /// Returns an error if the wishlist HTTP client cannot be built.
    pub fn new(
        config: StorefrontConfig,
        pool: PgPool,
        sessions: Arc<dyn SessionStore>,
    ) -> Result<Self, reqwest::Error> {
        let wishlist = StackletClient::new(&config.wishlist)?;
        let locks = Cache::builder()
            .time_to_idle(VISITOR_IDLE.max(config.wishlist.lock_timeout))
            .build();
        let gates = Cache::builder().time_to_idle(VISITOR_IDLE).build();

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                wishlist,
                sessions,
                locks,
                gates,
            }),
        })
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Get a reference to the wishlist API client.
    #[must_use]
    pub fn wishlist(&self) -> &StackletClient {
        &self.inner.wishlist
    }

    /// The session store backing the session layer.
    #[must_use]
    pub fn session_store(&self) -> Arc<dyn SessionStore> {
        self.inner.sessions.clone()
    }

    /// The gate serializing local cache edits for one session id.
    pub async fn session_gate(&self, session_id: &str) -> SessionGate {
        self.inner
            .gates
            .get_with(session_id.to_string(), async { SessionGate::default() })
            .await
    }

    /// The pending-operation table for one visitor.
    ///
    /// Every request from the same visitor gets the same table, so a toggle
    /// still in flight in one request blocks a second toggle in another.
    pub async fn pending_operations(&self, visitor_key: &str) -> PendingOperations {
        let lock_timeout = self.inner.config.wishlist.lock_timeout;
        self.inner
            .locks
            .get_with(visitor_key.to_string(), async move {
                PendingOperations::new(lock_timeout)
            })
            .await
    }
}
