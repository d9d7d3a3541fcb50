//! Integration test harness for the wishlist service.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p wishlist-integration-tests
//! ```
//!
//! Nothing external is needed. [`MockBackend`] serves the wishlist API from
//! memory on an ephemeral port, and [`TestStorefront`] runs the real
//! storefront router against it with in-memory sessions. The database pool is
//! lazy and never connected, so `/health/ready` reports unavailable.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use secrecy::SecretString;
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tower_sessions::{MemoryStore, Session};
use url::Url;
use wishlist_core::{CustomerId, SHOPIFY_PRODUCT_GID_PREFIX};
use wishlist_storefront::config::{StorefrontConfig, WishlistConfig};
use wishlist_storefront::middleware::{
    clear_current_customer, session_layer, set_current_customer,
};
use wishlist_storefront::routes;
use wishlist_storefront::state::AppState;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener
        .local_addr()
        .expect("Failed to read test listener address");

    tokio::spawn(async move {
        axum::serve(listener, router)
            .await
            .expect("Test server error");
    });

    addr
}

// =============================================================================
// MockBackend
// =============================================================================

/// One request received by the mock backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendCall {
    pub action: &'static str,
    pub wishlist: String,
    pub product: Option<i64>,
}

#[derive(Default)]
struct MockState {
    lists: Mutex<HashMap<String, Vec<i64>>>,
    calls: Mutex<Vec<BackendCall>>,
    failing_adds: Mutex<HashSet<i64>>,
    fail_lists: AtomicBool,
    hold_adds: AtomicBool,
    release: Notify,
}

#[derive(Debug, Deserialize)]
struct MockQuery {
    wishlist: String,
    product: Option<i64>,
}

/// In-memory wishlist backend speaking the `add-product` / `remove-product`
/// / `get-list` API.
///
/// `get-list` and `add-product` answer with the list in the GID form the real
/// backend uses; `remove-product` answers with an empty body.
#[derive(Clone)]
pub struct MockBackend {
    url: Url,
    state: Arc<MockState>,
}

impl MockBackend {
    /// Start the backend on an ephemeral port.
    pub async fn start() -> Self {
        let state = Arc::new(MockState::default());

        let router = Router::new()
            .route("/api/wishlist/add-product", get(mock_add))
            .route("/api/wishlist/remove-product", get(mock_remove))
            .route("/api/wishlist/get-list", get(mock_list))
            .with_state(state.clone());

        let addr = serve(router).await;
        let url = Url::parse(&format!("http://{addr}")).expect("Invalid mock backend URL");

        Self { url, state }
    }

    /// Base URL to configure as the wishlist API endpoint.
    #[must_use]
    pub fn url(&self) -> Url {
        self.url.clone()
    }

    /// Replace a customer's stored list.
    pub fn seed(&self, customer: &str, products: &[i64]) {
        lock(&self.state.lists).insert(customer.to_string(), products.to_vec());
    }

    /// A customer's stored list.
    #[must_use]
    pub fn list(&self, customer: &str) -> Vec<i64> {
        lock(&self.state.lists)
            .get(customer)
            .cloned()
            .unwrap_or_default()
    }

    /// Every call received so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<BackendCall> {
        lock(&self.state.calls).clone()
    }

    /// Number of calls received for `action`.
    #[must_use]
    pub fn count(&self, action: &str) -> usize {
        lock(&self.state.calls)
            .iter()
            .filter(|call| call.action == action)
            .count()
    }

    /// Make `add-product` for `product` answer `500`.
    pub fn fail_add(&self, product: i64) {
        lock(&self.state.failing_adds).insert(product);
    }

    /// Make `get-list` answer `503`.
    pub fn fail_lists(&self, fail: bool) {
        self.state.fail_lists.store(fail, Ordering::SeqCst);
    }

    /// Hold every `add-product` call until [`MockBackend::release_adds`].
    pub fn hold_adds(&self) {
        self.state.hold_adds.store(true, Ordering::SeqCst);
    }

    /// Let held `add-product` calls complete and stop holding new ones.
    pub fn release_adds(&self) {
        self.state.hold_adds.store(false, Ordering::SeqCst);
        self.state.release.notify_waiters();
    }

    /// Wait until `count` calls for `action` have arrived.
    pub async fn wait_for(&self, action: &str, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.count(action) < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("Timed out waiting for backend call");
    }
}

fn record(state: &MockState, action: &'static str, query: &MockQuery) {
    lock(&state.calls).push(BackendCall {
        action,
        wishlist: query.wishlist.clone(),
        product: query.product,
    });
}

fn list_body(products: &[i64]) -> Json<serde_json::Value> {
    let results: Vec<_> = products
        .iter()
        .map(|id| {
            json!({
                "id": format!("{SHOPIFY_PRODUCT_GID_PREFIX}{id}"),
                "handle": format!("product-{id}"),
                "title": format!("Product {id}"),
                "images": [format!("https://cdn.example.com/product-{id}.jpg")],
            })
        })
        .collect();

    Json(json!({ "resultsCount": results.len(), "results": results }))
}

async fn mock_add(State(state): State<Arc<MockState>>, Query(query): Query<MockQuery>) -> Response {
    let released = state.release.notified();
    record(&state, "add-product", &query);

    if state.hold_adds.load(Ordering::SeqCst) {
        released.await;
    }

    let Some(product) = query.product else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    if lock(&state.failing_adds).contains(&product) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "add failed").into_response();
    }

    let mut lists = lock(&state.lists);
    let list = lists.entry(query.wishlist).or_default();
    if !list.contains(&product) {
        list.push(product);
    }
    list_body(list).into_response()
}

async fn mock_remove(
    State(state): State<Arc<MockState>>,
    Query(query): Query<MockQuery>,
) -> Response {
    record(&state, "remove-product", &query);

    let Some(product) = query.product else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    if let Some(list) = lock(&state.lists).get_mut(&query.wishlist) {
        list.retain(|id| *id != product);
    }
    StatusCode::OK.into_response()
}

async fn mock_list(
    State(state): State<Arc<MockState>>,
    Query(query): Query<MockQuery>,
) -> Response {
    record(&state, "get-list", &query);

    if state.fail_lists.load(Ordering::SeqCst) {
        return (StatusCode::SERVICE_UNAVAILABLE, "maintenance").into_response();
    }

    let lists = lock(&state.lists);
    let list = lists.get(&query.wishlist).cloned().unwrap_or_default();
    list_body(&list).into_response()
}

// =============================================================================
// TestStorefront
// =============================================================================

/// The storefront router served on an ephemeral port, wired to a
/// [`MockBackend`].
///
/// Adds `POST /test/login/{customer}` and `POST /test/logout`, standing in for
/// the external login flow that stores the customer ID in the session.
pub struct TestStorefront {
    pub backend: MockBackend,
    pub client: reqwest::Client,
    base_url: String,
}

impl TestStorefront {
    /// Start with default wishlist settings.
    pub async fn start() -> Self {
        Self::start_with(|_| {}).await
    }

    /// Start after adjusting the wishlist settings.
    pub async fn start_with(configure: impl FnOnce(&mut WishlistConfig)) -> Self {
        let backend = MockBackend::start().await;

        let mut wishlist = WishlistConfig::with_endpoint(backend.url());
        wishlist.request_timeout = Duration::from_secs(5);
        configure(&mut wishlist);

        let config = test_config(wishlist);
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://wishlist@127.0.0.1:1/unused")
            .expect("Invalid lazy database URL");
        let store = MemoryStore::default();
        let state = AppState::new(config, pool, Arc::new(store.clone()))
            .expect("Failed to build app state");

        let router = routes::routes()
            .route("/test/login/{customer}", post(test_login))
            .route("/test/logout", post(test_logout))
            .layer(session_layer(store, false))
            .with_state(state);

        let addr = serve(router).await;

        Self {
            backend,
            client: new_client(),
            base_url: format!("http://{addr}"),
        }
    }

    /// Absolute URL for `path`.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Log the default client in as `customer`.
    pub async fn login(&self, customer: &str) {
        let response = self
            .client
            .post(self.url(&format!("/test/login/{customer}")))
            .send()
            .await
            .expect("Login request failed");
        assert_eq!(response.status(), reqwest::StatusCode::NO_CONTENT);
    }

    /// Log the default client out.
    pub async fn logout(&self) {
        let response = self
            .client
            .post(self.url("/test/logout"))
            .send()
            .await
            .expect("Logout request failed");
        assert_eq!(response.status(), reqwest::StatusCode::NO_CONTENT);
    }
}

/// A cookie-keeping HTTP client (one visitor).
#[must_use]
pub fn new_client() -> reqwest::Client {
    reqwest::Client::builder()
        .cookie_store(true)
        .build()
        .expect("Failed to create HTTP client")
}

fn test_config(wishlist: WishlistConfig) -> StorefrontConfig {
    StorefrontConfig {
        database_url: SecretString::from("postgres://wishlist@127.0.0.1:1/unused"),
        host: [127, 0, 0, 1].into(),
        port: 0,
        base_url: "http://localhost".to_string(),
        wishlist,
        sentry_dsn: None,
        sentry_environment: None,
        sentry_sample_rate: 1.0,
        sentry_traces_sample_rate: 0.0,
    }
}

async fn test_login(session: Session, Path(customer): Path<String>) -> StatusCode {
    let Ok(customer) = CustomerId::parse(&customer) else {
        return StatusCode::BAD_REQUEST;
    };
    match set_current_customer(&session, &customer).await {
        Ok(()) => StatusCode::NO_CONTENT,
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn test_logout(session: Session) -> StatusCode {
    match clear_current_customer(&session).await {
        Ok(()) => StatusCode::NO_CONTENT,
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
