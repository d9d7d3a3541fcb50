//! Customer identity extractors.
//!
//! The external login flow stores the customer's ID in the session; these
//! extractors read it back so wishlist handlers know which backing store is
//! authoritative. A missing or unreadable session means "anonymous".

use axum::{extract::FromRequestParts, http::request::Parts};
use tower_sessions::Session;
use wishlist_core::CustomerId;

use crate::models::session_keys;

/// Extractor that optionally gets the logged-in customer.
///
/// # Example
///
/// ```rust,ignore
/// async fn handler(OptionalCustomer(customer): OptionalCustomer) -> impl IntoResponse {
///     match customer {
///         Some(id) => format!("Customer {id}"),
///         None => "Guest visitor".to_string(),
///     }
/// }
/// ```
pub struct OptionalCustomer(pub Option<CustomerId>);

impl<S> FromRequestParts<S> for OptionalCustomer
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let customer = match parts.extensions.get::<Session>() {
            Some(session) => current_customer(session).await,
            None => None,
        };

        Ok(Self(customer))
    }
}

/// Read the logged-in customer from the session.
///
/// An unreadable value is treated as anonymous. An invalid one is also
/// removed from the session.
pub async fn current_customer(session: &Session) -> Option<CustomerId> {
    let raw = match session.get::<String>(session_keys::CUSTOMER_ID).await {
        Ok(raw) => raw?,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read customer from session");
            return None;
        }
    };

    match CustomerId::parse(&raw) {
        Ok(customer) => Some(customer),
        Err(e) => {
            tracing::warn!(error = %e, "Clearing invalid customer id from session");
            if let Err(e) = clear_current_customer(session).await {
                tracing::warn!(error = %e, "Failed to clear invalid customer id");
            }
            None
        }
    }
}

/// Helper to set the current customer in the session.
///
/// Starts a new login: the anonymous wishlist is merged again on the next
/// wishlist request.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_current_customer(
    session: &Session,
    customer: &CustomerId,
) -> Result<(), tower_sessions::session::Error> {
    session.remove_value(session_keys::WISHLIST_MERGED_FOR).await?;
    session
        .insert(session_keys::CUSTOMER_ID, customer.as_str())
        .await
}

/// Helper to clear the current customer from the session.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_current_customer(
    session: &Session,
) -> Result<(), tower_sessions::session::Error> {
    session.remove_value(session_keys::CUSTOMER_ID).await?;
    session.remove_value(session_keys::WISHLIST_MERGED_FOR).await?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use axum::http::Request;
    use tower_sessions::MemoryStore;

    use super::*;

    fn session() -> Session {
        Session::new(None, Arc::new(MemoryStore::default()), None)
    }

    async fn extract(session: Option<Session>) -> Option<CustomerId> {
        let (mut parts, ()) = Request::builder()
            .uri("/wishlist")
            .body(())
            .unwrap()
            .into_parts();
        if let Some(session) = session {
            parts.extensions.insert(session);
        }
        OptionalCustomer::from_request_parts(&mut parts, &())
            .await
            .unwrap()
            .0
    }

    #[tokio::test]
    async fn test_set_and_clear_customer() {
        let session = session();
        let customer = CustomerId::parse("6104581734514").unwrap();

        assert!(current_customer(&session).await.is_none());

        set_current_customer(&session, &customer).await.unwrap();
        assert_eq!(current_customer(&session).await, Some(customer));

        clear_current_customer(&session).await.unwrap();
        assert!(current_customer(&session).await.is_none());
    }

    #[tokio::test]
    async fn test_login_resets_merge_marker() {
        let session = session();
        let customer = CustomerId::parse("42").unwrap();
        session
            .insert(session_keys::WISHLIST_MERGED_FOR, "42")
            .await
            .unwrap();

        set_current_customer(&session, &customer).await.unwrap();
        assert!(
            session
                .get_value(session_keys::WISHLIST_MERGED_FOR)
                .await
                .unwrap()
                .is_none()
        );

        session
            .insert(session_keys::WISHLIST_MERGED_FOR, "42")
            .await
            .unwrap();
        clear_current_customer(&session).await.unwrap();
        assert!(
            session
                .get_value(session_keys::WISHLIST_MERGED_FOR)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_blank_customer_is_anonymous() {
        let session = session();
        session
            .insert(session_keys::CUSTOMER_ID, "   ")
            .await
            .unwrap();
        assert!(current_customer(&session).await.is_none());
        assert!(
            session
                .get_value(session_keys::CUSTOMER_ID)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_extractor_reads_session() {
        let session = session();
        set_current_customer(&session, &CustomerId::parse("42").unwrap())
            .await
            .unwrap();

        assert_eq!(extract(Some(session)).await.unwrap().as_str(), "42");
        assert!(extract(None).await.is_none());
    }
}
