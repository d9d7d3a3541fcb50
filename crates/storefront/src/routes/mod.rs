//! HTTP route handlers for the storefront wishlist.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                        - Liveness check
//! GET  /health/ready                  - Readiness check (database)
//!
//! # Wishlist (HTMX fragments)
//! GET  /wishlist                      - Wishlist page (cards or empty message)
//! GET  /wishlist/icon                 - Nav heart icon (filled when non-empty)
//! GET  /wishlist/button/{product_id}  - Heart button (?handle=)
//! POST /wishlist/toggle               - Toggle (returns heart button)
//! POST /wishlist/remove               - Remove from list page (returns card list)
//!
//! # Wishlist JSON API
//! GET  /api/wishlist                  - Membership set
//! POST /api/wishlist/toggle           - Toggle (returns membership change)
//! POST /api/wishlist/cart-events      - Product added to cart
//! ```

pub mod health;
pub mod wishlist;

use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;

/// Create the wishlist page and fragment routes router.
pub fn wishlist_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(wishlist::show))
        .route("/icon", get(wishlist::icon))
        .route("/button/{product_id}", get(wishlist::button))
        .route("/toggle", post(wishlist::toggle))
        .route("/remove", post(wishlist::remove))
}

/// Create the wishlist JSON API routes router.
pub fn wishlist_api_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(wishlist::api_show))
        .route("/toggle", post(wishlist::api_toggle))
        .route("/cart-events", post(wishlist::cart_event))
}

/// Build all routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .nest("/wishlist", wishlist_routes())
        .nest("/api/wishlist", wishlist_api_routes())
}
