//! Remote wishlist inspection commands.
//!
//! Talk to the wishlist backend directly, bypassing the storefront's
//! engine. Useful for checking what a customer's list holds after a merge.
//!
//! # Usage
//!
//! ```bash
//! wishlist-cli wishlist list -c 6104581734514
//! wishlist-cli wishlist add -c 6104581734514 -p gid://shopify/Product/7
//! wishlist-cli wishlist remove -c 6104581734514 -p 7
//! ```
//!
//! # Environment Variables
//!
//! - `WISHLIST_API_ENDPOINT` - Wishlist backend base URL
//! - `WISHLIST_API_TOKEN` - Optional bearer token

use thiserror::Error;
use wishlist_core::{CustomerId, CustomerIdError, ListSnapshot, ProductId, ProductIdError};
use wishlist_storefront::config::{ConfigError, WishlistConfig};
use wishlist_storefront::wishlist::{RemoteWishlist, StackletClient, WishlistError};

/// Errors that can occur during wishlist commands.
#[derive(Debug, Error)]
pub enum WishlistCommandError {
    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    /// Invalid customer ID argument.
    #[error("Invalid customer: {0}")]
    Customer(#[from] CustomerIdError),

    /// Invalid product ID argument.
    #[error("Invalid product: {0}")]
    Product(#[from] ProductIdError),

    /// Backend call failed.
    #[error("Wishlist backend error: {0}")]
    Backend(#[from] WishlistError),

    /// Snapshot could not be printed.
    #[error("Output error: {0}")]
    Output(#[from] serde_json::Error),
}

/// What to do with the customer's list. Products are raw IDs or GIDs.
#[derive(Debug, Clone)]
pub enum Action {
    List,
    Add(String),
    Remove(String),
}

/// [`Action`] with its product ID parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolved {
    List,
    Add(ProductId),
    Remove(ProductId),
}

impl Action {
    fn resolve(&self, gid_prefix: &str) -> Result<Resolved, ProductIdError> {
        Ok(match self {
            Self::List => Resolved::List,
            Self::Add(raw) => Resolved::Add(ProductId::from_gid_with_prefix(raw, gid_prefix)?),
            Self::Remove(raw) => {
                Resolved::Remove(ProductId::from_gid_with_prefix(raw, gid_prefix)?)
            }
        })
    }
}

/// Run a wishlist command and print the resulting list as JSON.
///
/// # Errors
///
/// Returns an error if configuration or arguments are invalid, or the
/// backend call fails.
pub async fn run(action: &Action, customer: &str) -> Result<(), WishlistCommandError> {
    dotenvy::dotenv().ok();

    let config = WishlistConfig::from_env()?;
    let client = StackletClient::new(&config)?;
    let customer = CustomerId::parse(customer)?;
    let action = action.resolve(&config.product_gid_prefix)?;

    let snapshot = execute(&client, action, &customer).await?;

    tracing::info!(
        customer = %customer,
        count = snapshot.results_count,
        "Wishlist command complete"
    );

    #[allow(clippy::print_stdout)]
    {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    }

    Ok(())
}

async fn execute<R: RemoteWishlist>(
    remote: &R,
    action: Resolved,
    customer: &CustomerId,
) -> Result<ListSnapshot, WishlistError> {
    match action {
        Resolved::List => remote.list(customer).await,
        Resolved::Add(product) => remote.add(customer, product).await,
        Resolved::Remove(product) => remote.remove(customer, product).await,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_strips_gid_prefix() {
        let prefix = wishlist_core::SHOPIFY_PRODUCT_GID_PREFIX;
        assert_eq!(Action::List.resolve(prefix).unwrap(), Resolved::List);
        assert_eq!(
            Action::Add("gid://shopify/Product/7".to_string())
                .resolve(prefix)
                .unwrap(),
            Resolved::Add(ProductId::new(7))
        );
        assert_eq!(
            Action::Remove("9".to_string()).resolve(prefix).unwrap(),
            Resolved::Remove(ProductId::new(9))
        );
        assert!(Action::Add("abc".to_string()).resolve(prefix).is_err());
    }
}
