//! Wishlist Core - Shared types library.
//!
//! This crate provides the types shared by every wishlist component:
//! - `storefront` - Reconciliation engine and the routes that render it
//! - `cli` - Command-line tools for migrations and remote list inspection
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no database access,
//! no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Product and customer identifiers, wishlist entries, membership sets

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
