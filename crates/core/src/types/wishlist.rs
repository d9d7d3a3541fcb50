//! Wishlist entries, membership sets and change results.

use core::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::types::id::ProductId;

/// A single wishlisted product.
///
/// Identity is the product ID alone. `handle`, `title` and `image` are
/// denormalized display data and are ignored by equality and hashing.
///
/// Serializes as `{ "id": 123, "handle": "my-product" }`, the shape kept in
/// the visitor's local wishlist storage. `title` and `image` only appear on
/// entries read from the remote list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WishlistEntry {
    #[serde(rename = "id")]
    pub product_id: ProductId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Featured image URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl WishlistEntry {
    /// Create an entry with a product handle.
    #[must_use]
    pub fn new(product_id: ProductId, handle: impl Into<String>) -> Self {
        Self {
            handle: Some(handle.into()),
            ..Self::bare(product_id)
        }
    }

    /// Create an entry without display data.
    #[must_use]
    pub const fn bare(product_id: ProductId) -> Self {
        Self {
            product_id,
            handle: None,
            title: None,
            image: None,
        }
    }
}

impl PartialEq for WishlistEntry {
    fn eq(&self, other: &Self) -> bool {
        self.product_id == other.product_id
    }
}

impl Eq for WishlistEntry {}

impl Hash for WishlistEntry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.product_id.hash(state);
    }
}

impl From<ProductId> for WishlistEntry {
    fn from(product_id: ProductId) -> Self {
        Self::bare(product_id)
    }
}

/// The set of wishlisted products, keyed by product ID.
///
/// Membership tests ignore order, but iteration follows insertion order so
/// rendered lists stay stable. At most one entry exists per product ID; this
/// holds for every constructor, including deserialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<WishlistEntry>", into = "Vec<WishlistEntry>")]
pub struct MembershipSet {
    entries: Vec<WishlistEntry>,
}

impl MembershipSet {
    /// Create an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Build a set from entries, keeping the first occurrence of each product.
    #[must_use]
    pub fn from_entries(entries: impl IntoIterator<Item = WishlistEntry>) -> Self {
        let mut set = Self::new();
        for entry in entries {
            set.insert(entry);
        }
        set
    }

    /// Whether the product is in the set.
    #[must_use]
    pub fn contains(&self, product_id: ProductId) -> bool {
        self.entries.iter().any(|e| e.product_id == product_id)
    }

    /// Get the entry for a product.
    #[must_use]
    pub fn get(&self, product_id: ProductId) -> Option<&WishlistEntry> {
        self.entries.iter().find(|e| e.product_id == product_id)
    }

    /// Insert an entry. Returns `true` if the product was not already present.
    ///
    /// An existing entry keeps its position; missing display fields are
    /// filled in from the new entry.
    pub fn insert(&mut self, entry: WishlistEntry) -> bool {
        if let Some(existing) = self
            .entries
            .iter_mut()
            .find(|e| e.product_id == entry.product_id)
        {
            existing.handle = existing.handle.take().or(entry.handle);
            existing.title = existing.title.take().or(entry.title);
            existing.image = existing.image.take().or(entry.image);
            return false;
        }

        self.entries.push(entry);
        true
    }

    /// Remove a product. Returns the removed entry, if it was present.
    pub fn remove(&mut self, product_id: ProductId) -> Option<WishlistEntry> {
        let index = self
            .entries
            .iter()
            .position(|e| e.product_id == product_id)?;
        Some(self.entries.remove(index))
    }

    /// Number of products in the set.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over entries in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, WishlistEntry> {
        self.entries.iter()
    }

    /// Entries in insertion order.
    #[must_use]
    pub fn entries(&self) -> &[WishlistEntry] {
        &self.entries
    }

    /// Product IDs in insertion order.
    #[must_use]
    pub fn product_ids(&self) -> Vec<ProductId> {
        self.entries.iter().map(|e| e.product_id).collect()
    }

    /// Membership state of a product.
    #[must_use]
    pub fn state_of(&self, product_id: ProductId) -> MembershipState {
        MembershipState::from_present(self.contains(product_id))
    }
}

impl From<Vec<WishlistEntry>> for MembershipSet {
    fn from(entries: Vec<WishlistEntry>) -> Self {
        Self::from_entries(entries)
    }
}

impl From<MembershipSet> for Vec<WishlistEntry> {
    fn from(set: MembershipSet) -> Self {
        set.entries
    }
}

impl FromIterator<WishlistEntry> for MembershipSet {
    fn from_iter<I: IntoIterator<Item = WishlistEntry>>(iter: I) -> Self {
        Self::from_entries(iter)
    }
}

impl<'a> IntoIterator for &'a MembershipSet {
    type Item = &'a WishlistEntry;
    type IntoIter = std::slice::Iter<'a, WishlistEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Contents of a customer's remote wishlist as reported by the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListSnapshot {
    /// Count reported by the backend (may disagree with `results.len()`).
    pub results_count: usize,
    /// Products in backend order.
    pub results: Vec<WishlistEntry>,
}

impl ListSnapshot {
    /// Build a snapshot whose count matches its results.
    #[must_use]
    pub const fn from_results(results: Vec<WishlistEntry>) -> Self {
        Self {
            results_count: results.len(),
            results,
        }
    }

    /// Convert into a membership set, dropping duplicate products.
    #[must_use]
    pub fn into_membership(self) -> MembershipSet {
        MembershipSet::from_entries(self.results)
    }
}

/// Whether a product is on the wishlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipState {
    Present,
    Absent,
}

impl MembershipState {
    /// `Present` when `present` is true, `Absent` otherwise.
    #[must_use]
    pub const fn from_present(present: bool) -> Self {
        if present { Self::Present } else { Self::Absent }
    }

    /// Whether this is `Present`.
    #[must_use]
    pub const fn is_present(self) -> bool {
        matches!(self, Self::Present)
    }
}

/// The kind of backing-store operation a wishlist action issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Add,
    Remove,
}

impl OperationKind {
    /// The membership state this operation produces when it succeeds.
    #[must_use]
    pub const fn target_state(self) -> MembershipState {
        match self {
            Self::Add => MembershipState::Present,
            Self::Remove => MembershipState::Absent,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add => write!(f, "add"),
            Self::Remove => write!(f, "remove"),
        }
    }
}

/// Outcome of a wishlist action.
///
/// `new_state` is the product's membership after the action: the target
/// state when `ok`, the unchanged state otherwise. A caller that applied an
/// optimistic visual change must revert it when `ok` is false.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipChange {
    pub product_id: ProductId,
    pub new_state: MembershipState,
    pub ok: bool,
}

impl MembershipChange {
    /// A change the backing store confirmed.
    #[must_use]
    pub const fn confirmed(product_id: ProductId, new_state: MembershipState) -> Self {
        Self {
            product_id,
            new_state,
            ok: true,
        }
    }

    /// A change the backing store rejected; `unchanged` is the current state.
    #[must_use]
    pub const fn failed(product_id: ProductId, unchanged: MembershipState) -> Self {
        Self {
            product_id,
            new_state: unchanged,
            ok: false,
        }
    }
}
