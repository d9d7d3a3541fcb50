//! Newtype IDs for type-safe entity references.
//!
//! Use the `define_id!` macro to create type-safe ID wrappers that prevent
//! accidentally mixing IDs from different entity types.

/// Default prefix of Shopify product global IDs (`gid://shopify/Product/123`).
pub const SHOPIFY_PRODUCT_GID_PREFIX: &str = "gid://shopify/Product/";

/// Macro to define a type-safe ID wrapper.
///
/// Creates a newtype wrapper around `i64` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `Copy`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - Conversion methods: `new()`, `as_i64()`
/// - `From<i64>` and `Into<i64>` implementations
///
/// Shopify numeric IDs exceed the `i32` range, so the wrapper is 64-bit.
///
/// # Example
///
/// ```rust
/// # use wishlist_core::define_id;
/// define_id!(ProductId);
/// define_id!(VariantId);
///
/// let product_id = ProductId::new(1);
/// let variant_id = VariantId::new(1);
///
/// // These are different types, so this won't compile:
/// // let _: ProductId = variant_id;
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Create a new ID from an i64 value.
            #[must_use]
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            /// Get the underlying i64 value.
            #[must_use]
            pub const fn as_i64(&self) -> i64 {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id!(ProductId);

/// Errors that can occur when parsing a [`ProductId`] from text.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ProductIdError {
    /// The input string is empty (or only whitespace).
    #[error("product id cannot be empty")]
    Empty,
    /// The input (after stripping any GID prefix) is not an integer.
    #[error("product id is not numeric: {0}")]
    NotNumeric(String),
    /// Product IDs are strictly positive.
    #[error("product id must be positive, got {0}")]
    NotPositive(i64),
}

impl ProductId {
    /// Parse a product ID from a Shopify global ID using the default prefix.
    ///
    /// Bare numeric strings are accepted too, so the same parser works for
    /// `data-product-id` attributes and for GIDs returned by the backend.
    ///
    /// ```
    /// use wishlist_core::ProductId;
    ///
    /// assert_eq!(
    ///     ProductId::from_gid("gid://shopify/Product/7").unwrap(),
    ///     ProductId::new(7)
    /// );
    /// assert_eq!(ProductId::from_gid("42").unwrap(), ProductId::new(42));
    /// assert!(ProductId::from_gid("gid://shopify/Product/").is_err());
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error if the remainder is empty, not an integer, or not positive.
    pub fn from_gid(gid: &str) -> Result<Self, ProductIdError> {
        Self::from_gid_with_prefix(gid, SHOPIFY_PRODUCT_GID_PREFIX)
    }

    /// Parse a product ID, stripping `prefix` when present.
    ///
    /// # Errors
    ///
    /// Returns an error if the remainder is empty, not an integer, or not positive.
    pub fn from_gid_with_prefix(gid: &str, prefix: &str) -> Result<Self, ProductIdError> {
        let trimmed = gid.trim();
        let raw = trimmed.strip_prefix(prefix).unwrap_or(trimmed);

        if raw.is_empty() {
            return Err(ProductIdError::Empty);
        }

        let id = raw
            .parse::<i64>()
            .map_err(|_| ProductIdError::NotNumeric(raw.to_owned()))?;

        if id <= 0 {
            return Err(ProductIdError::NotPositive(id));
        }

        Ok(Self(id))
    }
}

/// A product ID as it appears on the wire.
///
/// Backends and browsers send product IDs as JSON numbers, numeric strings
/// (`data-product-id` attributes) or GIDs. Parse with
/// [`ProductIdInput::parse_with_prefix`] to normalize.
#[derive(Debug, Clone, PartialEq, Eq, ::serde::Deserialize)]
#[serde(untagged)]
pub enum ProductIdInput {
    Number(i64),
    Text(String),
}

impl ProductIdInput {
    /// Normalize to a [`ProductId`], stripping `prefix` from textual GIDs.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is empty, not numeric, or not positive.
    pub fn parse_with_prefix(&self, prefix: &str) -> Result<ProductId, ProductIdError> {
        match self {
            Self::Number(id) if *id > 0 => Ok(ProductId::new(*id)),
            Self::Number(id) => Err(ProductIdError::NotPositive(*id)),
            Self::Text(text) => ProductId::from_gid_with_prefix(text, prefix),
        }
    }
}

impl std::str::FromStr for ProductId {
    type Err = ProductIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_gid(s)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_from_gid_strips_prefix() {
        let id = ProductId::from_gid("gid://shopify/Product/7234567890123").unwrap();
        assert_eq!(id.as_i64(), 7_234_567_890_123);
    }

    #[test]
    fn test_from_gid_accepts_bare_number() {
        assert_eq!(ProductId::from_gid(" 42 ").unwrap(), ProductId::new(42));
    }

    #[test]
    fn test_from_gid_custom_prefix() {
        let id = ProductId::from_gid_with_prefix("gid://acme/Item/9", "gid://acme/Item/").unwrap();
        assert_eq!(id, ProductId::new(9));
    }

    #[test]
    fn test_from_gid_wrong_prefix_is_not_numeric() {
        assert!(matches!(
            ProductId::from_gid("gid://shopify/Collection/9"),
            Err(ProductIdError::NotNumeric(_))
        ));
    }

    #[test]
    fn test_from_gid_empty() {
        assert_eq!(ProductId::from_gid(""), Err(ProductIdError::Empty));
        assert_eq!(
            ProductId::from_gid(SHOPIFY_PRODUCT_GID_PREFIX),
            Err(ProductIdError::Empty)
        );
    }

    #[test]
    fn test_from_gid_not_positive() {
        assert_eq!(ProductId::from_gid("0"), Err(ProductIdError::NotPositive(0)));
        assert_eq!(
            ProductId::from_gid("-3"),
            Err(ProductIdError::NotPositive(-3))
        );
    }

    #[test]
    fn test_product_id_input_variants() {
        let number: ProductIdInput = serde_json::from_str("42").unwrap();
        let text: ProductIdInput = serde_json::from_str("\"42\"").unwrap();
        let gid: ProductIdInput = serde_json::from_str("\"gid://shopify/Product/42\"").unwrap();

        for input in [number, text, gid] {
            assert_eq!(
                input.parse_with_prefix(SHOPIFY_PRODUCT_GID_PREFIX).unwrap(),
                ProductId::new(42)
            );
        }

        assert_eq!(
            ProductIdInput::Number(0).parse_with_prefix(SHOPIFY_PRODUCT_GID_PREFIX),
            Err(ProductIdError::NotPositive(0))
        );
    }

    #[test]
    fn test_serde_transparent() {
        let json = serde_json::to_string(&ProductId::new(12)).unwrap();
        assert_eq!(json, "12");
        let parsed: ProductId = serde_json::from_str("12").unwrap();
        assert_eq!(parsed, ProductId::new(12));
    }
}
