//! Wishlist state reconciliation.
//!
//! # Architecture
//!
//! Three representations of "is product P wishlisted" are kept consistent:
//!
//! - Rendered button/icon state (owned by the routes in `crate::routes::wishlist`)
//! - The visitor's local cache, authoritative while anonymous ([`LocalCache`])
//! - The customer's remote list, authoritative once logged in ([`RemoteWishlist`])
//!
//! [`WishlistEngine`] is the single owner of the in-memory [`MembershipSet`]
//! and of the merge-on-login and lock-guarded update protocols. It changes
//! membership only after the backing store confirms an operation.
//!
//! # Example
//!
//! ```rust,ignore
//! let engine = WishlistEngine::new(
//!     customer,
//!     state.wishlist().clone(),
//!     SessionCache::new(session, state.session_store(), state.session_gate(&id).await),
//!     state.pending_operations(visitor_key).await,
//!     EngineSettings::from(&state.config().wishlist),
//! );
//!
//! let init = engine.initialize().await;
//! let change = engine.toggle(WishlistEntry::new(product_id, "linen-shirt")).await?;
//! ```
//!
//! [`MembershipSet`]: wishlist_core::MembershipSet

pub mod engine;
pub mod local;
pub mod lock;
pub mod remote;

pub use engine::{EngineSettings, Initialization, MergePolicy, MergeReport, WishlistEngine};
pub use local::{
    CacheEdit, LOCAL_STORAGE_KEY, LocalCache, MERGED_FOR_KEY, MemoryCache, SessionCache,
    SessionGate,
};
pub use lock::{PendingGuard, PendingOperation, PendingOperations};
pub use remote::{RemoteWishlist, StackletClient};

use thiserror::Error;
use wishlist_core::{OperationKind, ProductId};

/// Errors surfaced by the wishlist backing stores and the engine.
///
/// Clients and caches never panic or leak library error types past their
/// boundary; every failure arrives as one of these variants.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WishlistError {
    /// The request never completed (connect, timeout, broken body).
    #[error("Network failure: {0}")]
    NetworkFailure(String),

    /// The backend answered with a non-success status.
    #[error("Remote rejected request: HTTP {status}")]
    RemoteRejected { status: u16, body: String },

    /// The backend answered with a body of unexpected shape.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// The visitor's local cache could not be read or written.
    #[error("Local storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Another operation on this product is still in flight.
    #[error("Pending {kind} operation for product {product_id}")]
    OperationPending {
        product_id: ProductId,
        kind: OperationKind,
    },
}

impl WishlistError {
    /// Whether the error came from the remote backend rather than local state.
    #[must_use]
    pub const fn is_remote(&self) -> bool {
        matches!(
            self,
            Self::NetworkFailure(_) | Self::RemoteRejected { .. } | Self::MalformedPayload(_)
        )
    }
}

impl From<reqwest::Error> for WishlistError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::MalformedPayload(err.to_string())
        } else if let Some(status) = err.status() {
            Self::RemoteRejected {
                status: status.as_u16(),
                body: String::new(),
            }
        } else {
            Self::NetworkFailure(err.to_string())
        }
    }
}

impl From<tower_sessions::session::Error> for WishlistError {
    fn from(err: tower_sessions::session::Error) -> Self {
        Self::StorageUnavailable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wishlist_error_display() {
        let err = WishlistError::RemoteRejected {
            status: 503,
            body: "down".to_string(),
        };
        assert_eq!(err.to_string(), "Remote rejected request: HTTP 503");

        let err = WishlistError::OperationPending {
            product_id: ProductId::new(42),
            kind: OperationKind::Add,
        };
        assert_eq!(
            err.to_string(),
            "Pending add operation for product 42"
        );
    }

    #[test]
    fn test_is_remote() {
        assert!(WishlistError::NetworkFailure("timeout".to_string()).is_remote());
        assert!(WishlistError::MalformedPayload("bad".to_string()).is_remote());
        assert!(!WishlistError::StorageUnavailable("gone".to_string()).is_remote());
    }
}
