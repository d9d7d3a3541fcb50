//! Core types for wishlists.
//!
//! This module provides type-safe wrappers for wishlist domain concepts.

pub mod customer;
pub mod id;
pub mod wishlist;

pub use customer::{CustomerId, CustomerIdError};
pub use id::*;
pub use wishlist::{
    ListSnapshot, MembershipChange, MembershipSet, MembershipState, OperationKind, WishlistEntry,
};
