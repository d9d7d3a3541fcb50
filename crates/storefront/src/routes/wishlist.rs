//! Wishlist route handlers.
//!
//! HTML routes return HTMX fragments. Every request builds a
//! [`WishlistEngine`] for the visitor, so logged-in visitors get their local
//! cache merged into the remote list on the first request after login.
//!
//! Toggles are optimistic on the client: the button flips before the request
//! and the response either confirms the flip or re-renders the real state
//! with an error marker.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{AppendHeaders, IntoResponse, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;
use wishlist_core::{
    CustomerId, MembershipChange, MembershipSet, MembershipState, ProductId, ProductIdInput,
    WishlistEntry,
};

use crate::error::{Result, add_breadcrumb, set_sentry_customer};
use crate::middleware::OptionalCustomer;
use crate::state::AppState;
use crate::wishlist::{
    EngineSettings, Initialization, PendingOperations, SessionCache, SessionGate, StackletClient,
    WishlistEngine, WishlistError,
};

/// HTMX event fired after a confirmed membership change.
pub const WISHLIST_UPDATED_EVENT: &str = "wishlist-updated";

/// Shown above the list when the authoritative store could not be read.
const LOAD_FAILED_NOTICE: &str =
    "We couldn't load your wishlist right now. Please try again shortly.";

type Engine = WishlistEngine<StackletClient, SessionCache>;

// =============================================================================
// View Types
// =============================================================================

/// Wishlist card display data for templates.
///
/// Labelled with the product title when the remote list supplied one, else
/// with the handle. Local entries only know the handle.
#[derive(Clone)]
pub struct WishlistItemView {
    pub product_id: ProductId,
    pub label: String,
    pub url: Option<String>,
    pub image: Option<String>,
}

impl From<&WishlistEntry> for WishlistItemView {
    fn from(entry: &WishlistEntry) -> Self {
        let label = entry
            .title
            .clone()
            .or_else(|| entry.handle.as_ref().map(|handle| handle.replace('-', " ")))
            .unwrap_or_else(|| format!("Product {}", entry.product_id));

        Self {
            product_id: entry.product_id,
            label,
            url: entry
                .handle
                .as_ref()
                .map(|handle| format!("/products/{handle}")),
            image: entry.image.clone(),
        }
    }
}

fn item_views(membership: &MembershipSet) -> Vec<WishlistItemView> {
    membership.iter().map(WishlistItemView::from).collect()
}

// =============================================================================
// Templates
// =============================================================================

/// Wishlist page template.
#[derive(Template, WebTemplate)]
#[template(path = "wishlist/show.html")]
pub struct WishlistShowTemplate {
    pub items: Vec<WishlistItemView>,
    pub empty_message: String,
    pub notice: Option<String>,
    pub filled: bool,
}

/// Wishlist card list fragment template (for HTMX).
#[derive(Template, WebTemplate)]
#[template(path = "partials/wishlist_items.html")]
pub struct WishlistItemsTemplate {
    pub items: Vec<WishlistItemView>,
    pub empty_message: String,
    pub notice: Option<String>,
}

/// Heart button fragment template (for HTMX).
#[derive(Template, WebTemplate)]
#[template(path = "partials/wishlist_button.html")]
pub struct WishlistButtonTemplate {
    pub product_id: ProductId,
    pub handle: Option<String>,
    pub present: bool,
    pub error: bool,
}

/// Nav icon fragment template (for HTMX).
#[derive(Template, WebTemplate)]
#[template(path = "partials/wishlist_icon.html")]
pub struct WishlistIconTemplate {
    pub filled: bool,
}

// =============================================================================
// Request Types
// =============================================================================

/// Toggle form data (HTMX).
#[derive(Debug, Deserialize)]
pub struct ToggleForm {
    pub product_id: String,
    pub handle: Option<String>,
}

/// Remove form data (HTMX).
#[derive(Debug, Deserialize)]
pub struct RemoveForm {
    pub product_id: String,
}

/// Button query parameters.
#[derive(Debug, Deserialize)]
pub struct ButtonQuery {
    pub handle: Option<String>,
}

/// JSON toggle request.
#[derive(Debug, Deserialize)]
pub struct ToggleRequest {
    pub product_id: ProductIdInput,
    #[serde(default)]
    pub handle: Option<String>,
}

/// External "item added to cart" event.
#[derive(Debug, Deserialize)]
pub struct CartEvent {
    pub product_id: ProductIdInput,
}

// =============================================================================
// Engine Helpers
// =============================================================================

/// Key of the visitor's lock table: the customer if logged in, else the session.
fn visitor_key(customer: Option<&CustomerId>, session: &Session) -> Option<String> {
    match customer {
        Some(customer) => Some(format!("customer:{customer}")),
        None => session.id().map(|id| format!("session:{id}")),
    }
}

/// Build and initialize the visitor's engine.
async fn load_engine(
    state: &AppState,
    session: Session,
    customer: Option<CustomerId>,
) -> (Engine, Initialization) {
    if let Some(customer) = &customer {
        set_sentry_customer(customer);
    }

    let locks = match visitor_key(customer.as_ref(), &session) {
        Some(key) => state.pending_operations(&key).await,
        // A visitor without a session ID has no earlier request to race with.
        None => PendingOperations::new(state.config().wishlist.lock_timeout),
    };
    let gate = match session.id() {
        Some(id) => state.session_gate(&id.to_string()).await,
        None => SessionGate::default(),
    };

    let engine = WishlistEngine::new(
        customer,
        state.wishlist().clone(),
        SessionCache::new(session, state.session_store(), gate),
        locks,
        EngineSettings::from(&state.config().wishlist),
    );
    let init = engine.initialize().await;

    if let Some(e) = &init.error {
        tracing::warn!(error = %e, "Serving wishlist from empty membership");
    }

    (engine, init)
}

fn parse_product_id(state: &AppState, raw: &str) -> Result<ProductId> {
    Ok(ProductId::from_gid_with_prefix(
        raw,
        &state.config().wishlist.product_gid_prefix,
    )?)
}

fn parse_product_input(state: &AppState, input: &ProductIdInput) -> Result<ProductId> {
    Ok(input.parse_with_prefix(&state.config().wishlist.product_gid_prefix)?)
}

fn items_fragment(
    state: &AppState,
    membership: &MembershipSet,
    notice: Option<String>,
) -> WishlistItemsTemplate {
    WishlistItemsTemplate {
        items: item_views(membership),
        empty_message: state.config().wishlist.empty_message.clone(),
        notice,
    }
}

// =============================================================================
// HTML Handlers
// =============================================================================

/// Display wishlist page.
#[instrument(skip(state, session, customer))]
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    OptionalCustomer(customer): OptionalCustomer,
) -> impl IntoResponse {
    let (_engine, init) = load_engine(&state, session, customer).await;
    let notice = init.error.as_ref().map(|_| LOAD_FAILED_NOTICE.to_string());

    WishlistShowTemplate {
        filled: !init.membership.is_empty(),
        items: item_views(&init.membership),
        empty_message: state.config().wishlist.empty_message.clone(),
        notice,
    }
}

/// Nav heart icon (HTMX).
#[instrument(skip(state, session, customer))]
pub async fn icon(
    State(state): State<AppState>,
    session: Session,
    OptionalCustomer(customer): OptionalCustomer,
) -> impl IntoResponse {
    let (_engine, init) = load_engine(&state, session, customer).await;

    WishlistIconTemplate {
        filled: !init.membership.is_empty(),
    }
}

/// Heart button for one product (HTMX).
#[instrument(skip(state, session, customer, query))]
pub async fn button(
    State(state): State<AppState>,
    session: Session,
    OptionalCustomer(customer): OptionalCustomer,
    Path(product_id): Path<String>,
    Query(query): Query<ButtonQuery>,
) -> Result<Response> {
    let product_id = parse_product_id(&state, &product_id)?;
    let (_engine, init) = load_engine(&state, session, customer).await;

    Ok(WishlistButtonTemplate {
        product_id,
        handle: query.handle.filter(|h| !h.is_empty()),
        present: init.membership.contains(product_id),
        error: init.error.is_some(),
    }
    .into_response())
}

/// Toggle a product (HTMX).
///
/// Returns the re-rendered button. A toggle on a product with an operation
/// still in flight is answered with `202 Accepted` and `HX-Reswap: none`, so
/// the optimistic state stays until the first request lands.
#[instrument(skip(state, session, customer))]
pub async fn toggle(
    State(state): State<AppState>,
    session: Session,
    OptionalCustomer(customer): OptionalCustomer,
    Form(form): Form<ToggleForm>,
) -> Result<Response> {
    let product_id = parse_product_id(&state, &form.product_id)?;
    let handle = form.handle.filter(|h| !h.is_empty());
    let entry = WishlistEntry {
        handle: handle.clone(),
        ..WishlistEntry::bare(product_id)
    };

    let (engine, _init) = load_engine(&state, session, customer).await;

    match engine.toggle(entry).await {
        Ok(change) => {
            let id = product_id.to_string();
            add_breadcrumb(
                "wishlist",
                "Toggled product",
                Some(&[
                    ("product_id", id.as_str()),
                    ("ok", if change.ok { "true" } else { "false" }),
                ]),
            );
            Ok(button_response(change, handle))
        }
        Err(WishlistError::OperationPending { .. }) => {
            Ok((StatusCode::ACCEPTED, AppendHeaders([("HX-Reswap", "none")])).into_response())
        }
        Err(e) => Err(e.into()),
    }
}

fn button_response(change: MembershipChange, handle: Option<String>) -> Response {
    let template = WishlistButtonTemplate {
        product_id: change.product_id,
        handle,
        present: change.new_state.is_present(),
        error: !change.ok,
    };

    if change.ok {
        (
            AppendHeaders([("HX-Trigger", WISHLIST_UPDATED_EVENT)]),
            template,
        )
            .into_response()
    } else {
        template.into_response()
    }
}

/// Remove a product from the wishlist page (HTMX).
///
/// Returns the re-rendered card list.
#[instrument(skip(state, session, customer))]
pub async fn remove(
    State(state): State<AppState>,
    session: Session,
    OptionalCustomer(customer): OptionalCustomer,
    Form(form): Form<RemoveForm>,
) -> Result<Response> {
    let product_id = parse_product_id(&state, &form.product_id)?;
    let (engine, _init) = load_engine(&state, session, customer).await;

    let (ok, notice) = match engine.remove(product_id).await {
        Ok(change) if change.ok => (true, None),
        Ok(_) => (
            false,
            Some("We couldn't remove that item. Please try again.".to_string()),
        ),
        Err(WishlistError::OperationPending { .. }) => (false, None),
        Err(e) => return Err(e.into()),
    };

    let fragment = items_fragment(&state, &engine.membership().await, notice);
    if ok {
        Ok((
            AppendHeaders([("HX-Trigger", WISHLIST_UPDATED_EVENT)]),
            fragment,
        )
            .into_response())
    } else {
        Ok(fragment.into_response())
    }
}

// =============================================================================
// JSON API Handlers
// =============================================================================

/// Current membership set as JSON.
#[instrument(skip(state, session, customer))]
pub async fn api_show(
    State(state): State<AppState>,
    session: Session,
    OptionalCustomer(customer): OptionalCustomer,
) -> Result<Json<MembershipSet>> {
    let (_engine, init) = load_engine(&state, session, customer).await;
    match init.error {
        Some(e) => Err(e.into()),
        None => Ok(Json(init.membership)),
    }
}

/// Toggle a product; returns the resulting change as JSON.
///
/// A product with an operation in flight is rejected with `409 Conflict`.
#[instrument(skip(state, session, customer))]
pub async fn api_toggle(
    State(state): State<AppState>,
    session: Session,
    OptionalCustomer(customer): OptionalCustomer,
    Json(request): Json<ToggleRequest>,
) -> Result<Json<MembershipChange>> {
    let product_id = parse_product_input(&state, &request.product_id)?;
    let (engine, _init) = load_engine(&state, session, customer).await;

    let change = engine
        .toggle(WishlistEntry {
            handle: request.handle.filter(|h| !h.is_empty()),
            ..WishlistEntry::bare(product_id)
        })
        .await?;

    Ok(Json(change))
}

/// Handle an "item added to cart" event from the cart integration.
///
/// A product moved to the cart leaves the wishlist.
#[instrument(skip(state, session, customer))]
pub async fn cart_event(
    State(state): State<AppState>,
    session: Session,
    OptionalCustomer(customer): OptionalCustomer,
    Json(event): Json<CartEvent>,
) -> Result<Response> {
    let product_id = parse_product_input(&state, &event.product_id)?;
    let (engine, _init) = load_engine(&state, session, customer).await;

    let change = engine.remove_by_external_event(product_id).await;
    if change.ok && change.new_state == MembershipState::Absent {
        Ok((
            AppendHeaders([("HX-Trigger", WISHLIST_UPDATED_EVENT)]),
            Json(change),
        )
            .into_response())
    } else {
        Ok(Json(change).into_response())
    }
}
