//! Customer identifier type.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`CustomerId`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CustomerIdError {
    /// The input string is empty (or only whitespace).
    #[error("customer id cannot be empty")]
    Empty,
    /// The input string is too long.
    #[error("customer id must be at most {max} characters")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
    },
}

/// An opaque customer identifier.
///
/// The wishlist backend keys lists by this value. Its presence means the
/// visitor is logged in and the remote list is authoritative; its absence
/// means the session-local cache is authoritative.
///
/// ## Examples
///
/// ```
/// use wishlist_core::CustomerId;
///
/// assert!(CustomerId::parse("6104581734514").is_ok());
/// assert!(CustomerId::parse("   ").is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct CustomerId(String);

impl CustomerId {
    /// Maximum length of a customer identifier.
    pub const MAX_LENGTH: usize = 255;

    /// Parse a `CustomerId` from a string, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the trimmed input is empty or longer than 255 characters.
    pub fn parse(s: &str) -> Result<Self, CustomerIdError> {
        let trimmed = s.trim();

        if trimmed.is_empty() {
            return Err(CustomerIdError::Empty);
        }

        if trimmed.len() > Self::MAX_LENGTH {
            return Err(CustomerIdError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }

        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CustomerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for CustomerId {
    type Err = CustomerIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for CustomerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
