//! HTTP middleware stack for the storefront.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (hub per request, transactions)
//! 2. `TraceLayer` (request span with `request_id` field)
//! 3. Request ID (fills the span field, Sentry tag, response header)
//! 4. Session layer (tower-sessions with `PostgreSQL` store)

pub mod customer;
pub mod request_id;
pub mod session;

pub use customer::{
    OptionalCustomer, clear_current_customer, current_customer, set_current_customer,
};
pub use request_id::request_id_middleware;
pub use session::{create_session_layer, create_session_store, session_layer};
