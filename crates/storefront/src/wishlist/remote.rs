//! Remote wishlist backend client.
//!
//! The backend keeps one list per customer and exposes three `GET` endpoints:
//!
//! ```text
//! GET {endpoint}/api/wishlist/add-product?wishlist=<customer>&product=<product>
//! GET {endpoint}/api/wishlist/remove-product?wishlist=<customer>&product=<product>
//! GET {endpoint}/api/wishlist/get-list?wishlist=<customer>
//! ```
//!
//! Each call is a single round trip. There is no retry here; callers decide
//! what a failure means.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};
use wishlist_core::{CustomerId, ListSnapshot, ProductId, ProductIdInput, WishlistEntry};

use super::WishlistError;
use crate::config::WishlistConfig;

/// Maximum number of body characters kept in errors and logs.
const BODY_EXCERPT_CHARS: usize = 500;

/// Add/remove/list operations against a customer's remote wishlist.
#[async_trait]
pub trait RemoteWishlist: Send + Sync {
    /// Add a product to the customer's list.
    async fn add(
        &self,
        customer: &CustomerId,
        product_id: ProductId,
    ) -> Result<ListSnapshot, WishlistError>;

    /// Remove a product from the customer's list.
    async fn remove(
        &self,
        customer: &CustomerId,
        product_id: ProductId,
    ) -> Result<ListSnapshot, WishlistError>;

    /// Fetch the customer's list.
    async fn list(&self, customer: &CustomerId) -> Result<ListSnapshot, WishlistError>;
}

#[async_trait]
impl<T: RemoteWishlist + ?Sized> RemoteWishlist for Arc<T> {
    async fn add(
        &self,
        customer: &CustomerId,
        product_id: ProductId,
    ) -> Result<ListSnapshot, WishlistError> {
        (**self).add(customer, product_id).await
    }

    async fn remove(
        &self,
        customer: &CustomerId,
        product_id: ProductId,
    ) -> Result<ListSnapshot, WishlistError> {
        (**self).remove(customer, product_id).await
    }

    async fn list(&self, customer: &CustomerId) -> Result<ListSnapshot, WishlistError> {
        (**self).list(customer).await
    }
}

// =============================================================================
// StackletClient
// =============================================================================

/// HTTP client for the Stacklet wishlist API.
#[derive(Clone)]
pub struct StackletClient {
    inner: Arc<StackletClientInner>,
}

struct StackletClientInner {
    client: reqwest::Client,
    base_url: String,
    api_token: Option<SecretString>,
    product_gid_prefix: String,
}

impl StackletClient {
    /// Create a new wishlist API client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &WishlistConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(StackletClientInner {
                client,
                base_url: format!(
                    "{}/api/wishlist",
                    config.api_endpoint.as_str().trim_end_matches('/')
                ),
                api_token: config.api_token.clone(),
                product_gid_prefix: config.product_gid_prefix.clone(),
            }),
        })
    }

    /// Issue one `GET` against the wishlist API and parse the list snapshot.
    async fn get(
        &self,
        action: &str,
        query: &[(&str, String)],
    ) -> Result<ListSnapshot, WishlistError> {
        let url = format!("{}/{action}", self.inner.base_url);

        let mut request = self.inner.client.get(&url).query(query);
        if let Some(token) = &self.inner.api_token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request.send().await.map_err(|e| {
            tracing::warn!(error = %e, action, "Wishlist API request failed");
            WishlistError::NetworkFailure(e.to_string())
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| WishlistError::NetworkFailure(e.to_string()))?;

        if !status.is_success() {
            let excerpt = excerpt(&body);
            tracing::error!(
                status = %status,
                body = %excerpt,
                action,
                "Wishlist API returned non-success status"
            );
            return Err(WishlistError::RemoteRejected {
                status: status.as_u16(),
                body: excerpt,
            });
        }

        parse_snapshot(&body, &self.inner.product_gid_prefix).inspect_err(|e| {
            tracing::error!(
                error = %e,
                body = %excerpt(&body),
                action,
                "Failed to parse wishlist API response"
            );
        })
    }
}

#[async_trait]
impl RemoteWishlist for StackletClient {
    #[instrument(skip_all, fields(customer = %customer, product_id = %product_id))]
    async fn add(
        &self,
        customer: &CustomerId,
        product_id: ProductId,
    ) -> Result<ListSnapshot, WishlistError> {
        debug!("Adding product to remote wishlist");
        self.get(
            "add-product",
            &[
                ("wishlist", customer.to_string()),
                ("product", product_id.to_string()),
            ],
        )
        .await
    }

    #[instrument(skip_all, fields(customer = %customer, product_id = %product_id))]
    async fn remove(
        &self,
        customer: &CustomerId,
        product_id: ProductId,
    ) -> Result<ListSnapshot, WishlistError> {
        debug!("Removing product from remote wishlist");
        self.get(
            "remove-product",
            &[
                ("wishlist", customer.to_string()),
                ("product", product_id.to_string()),
            ],
        )
        .await
    }

    #[instrument(skip_all, fields(customer = %customer))]
    async fn list(&self, customer: &CustomerId) -> Result<ListSnapshot, WishlistError> {
        self.get("get-list", &[("wishlist", customer.to_string())])
            .await
    }
}

// =============================================================================
// Payload parsing
// =============================================================================

/// Raw list response. Product fields beyond `id`, `handle`, `title` and the
/// featured image are ignored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawListResponse {
    #[serde(default)]
    results_count: Option<usize>,
    #[serde(default)]
    results: Option<RawResults>,
}

/// `results` is either a plain array or a GraphQL connection (`data.nodes`).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawResults {
    Products(Vec<RawProduct>),
    Connection { data: RawConnection },
}

#[derive(Debug, Deserialize)]
struct RawConnection {
    nodes: Vec<RawProduct>,
}

#[derive(Debug, Deserialize)]
struct RawProduct {
    id: ProductIdInput,
    #[serde(default)]
    handle: Option<String>,
    #[serde(default)]
    title: Option<String>,
    /// Flat results: an array of image URLs or image objects.
    #[serde(default)]
    images: Option<Value>,
    /// GraphQL results: `{ "transformedSrc": ... }`.
    #[serde(default, rename = "imageS")]
    image_s: Option<Value>,
}

impl RawProduct {
    fn image(&self) -> Option<String> {
        self.image_s.as_ref().and_then(image_url).or_else(|| {
            self.images
                .as_ref()
                .and_then(Value::as_array)
                .and_then(|images| images.first())
                .and_then(image_url)
        })
    }
}

/// An image URL given as a string or as an object with a URL field.
fn image_url(value: &Value) -> Option<String> {
    let url = match value {
        Value::String(url) => Some(url.as_str()),
        Value::Object(image) => ["transformedSrc", "src", "url"]
            .into_iter()
            .find_map(|key| image.get(key).and_then(Value::as_str)),
        _ => None,
    };
    url.filter(|url| !url.is_empty()).map(str::to_owned)
}

/// Parse a list response body into a snapshot with normalized product IDs.
///
/// An empty body is an empty snapshot; add/remove may answer with nothing.
fn parse_snapshot(body: &str, gid_prefix: &str) -> Result<ListSnapshot, WishlistError> {
    if body.trim().is_empty() {
        return Ok(ListSnapshot::default());
    }

    let raw: RawListResponse =
        serde_json::from_str(body).map_err(|e| WishlistError::MalformedPayload(e.to_string()))?;

    let products = match raw.results {
        Some(RawResults::Products(products)) => products,
        Some(RawResults::Connection { data }) => data.nodes,
        None => Vec::new(),
    };

    let results = products
        .into_iter()
        .map(|product| {
            let product_id = product.id.parse_with_prefix(gid_prefix).map_err(|e| {
                WishlistError::MalformedPayload(format!("invalid product id: {e}"))
            })?;
            let image = product.image();
            Ok(WishlistEntry {
                product_id,
                handle: product.handle.filter(|h| !h.is_empty()),
                title: product.title.filter(|t| !t.is_empty()),
                image,
            })
        })
        .collect::<Result<Vec<_>, WishlistError>>()?;

    Ok(ListSnapshot {
        results_count: raw.results_count.unwrap_or(results.len()),
        results,
    })
}

fn excerpt(body: &str) -> String {
    body.chars().take(BODY_EXCERPT_CHARS).collect()
}
