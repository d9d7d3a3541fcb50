//! Session-stored identity.
//!
//! The storefront does not authenticate customers itself. The login flow that
//! does writes the customer's ID under [`keys::CUSTOMER_ID`]; a session
//! without it belongs to an anonymous visitor.

/// Session keys.
pub mod keys {
    /// Key for the logged-in customer's ID.
    pub const CUSTOMER_ID: &str = "customer_id";

    /// Key for the customer the anonymous wishlist was last merged for.
    /// Removed whenever the customer changes, so each login merges once.
    pub const WISHLIST_MERGED_FOR: &str = crate::wishlist::MERGED_FOR_KEY;
}
