//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use wishlist_core::ProductIdError;

use crate::wishlist::WishlistError;

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Wishlist backing store or engine failure.
    #[error("Wishlist error: {0}")]
    Wishlist(#[from] WishlistError),

    /// Template rendering failed.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl From<ProductIdError> for AppError {
    fn from(err: ProductIdError) -> Self {
        Self::BadRequest(format!("invalid product id: {err}"))
    }
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Wishlist(err) => match err {
                WishlistError::OperationPending { .. } => StatusCode::CONFLICT,
                WishlistError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                WishlistError::NetworkFailure(_)
                | WishlistError::RemoteRejected { .. }
                | WishlistError::MalformedPayload(_) => StatusCode::BAD_GATEWAY,
            },
            Self::Template(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Whether the error is worth a Sentry event.
    const fn is_server_error(&self) -> bool {
        match self {
            Self::Wishlist(err) => !matches!(err, WishlistError::OperationPending { .. }),
            Self::Template(_) => true,
            Self::BadRequest(_) => false,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        // Don't expose internal error details to clients
        let message = match &self {
            Self::Template(_) => "Internal server error".to_string(),
            Self::Wishlist(WishlistError::OperationPending { .. }) => {
                "Wishlist update already in progress".to_string()
            }
            Self::Wishlist(WishlistError::StorageUnavailable(_)) => {
                "Wishlist storage unavailable".to_string()
            }
            Self::Wishlist(_) => "Wishlist service error".to_string(),
            Self::BadRequest(_) => self.to_string(),
        };

        (self.status(), message).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of user actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("wishlist", "Toggled product", Some(&[("product_id", "123")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

/// Set the Sentry user context to the logged-in customer.
pub fn set_sentry_customer(customer_id: &impl ToString) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(customer_id.to_string()),
            ..Default::default()
        }));
    });
}

#[cfg(test)]
mod tests {
    use wishlist_core::{OperationKind, ProductId};

    use super::*;

    fn get_status(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::BadRequest("invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: invalid input");

        let err = AppError::from(ProductIdError::Empty);
        assert!(err.to_string().starts_with("Bad request: invalid product id"));
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            get_status(AppError::BadRequest("test".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(AppError::Template(askama::Error::Fmt)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            get_status(AppError::Wishlist(WishlistError::OperationPending {
                product_id: ProductId::new(1),
                kind: OperationKind::Remove,
            })),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(AppError::Wishlist(WishlistError::RemoteRejected {
                status: 500,
                body: "boom".to_string(),
            })),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            get_status(AppError::Wishlist(WishlistError::StorageUnavailable(
                "gone".to_string()
            ))),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
