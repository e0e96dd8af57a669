//! Route keys: canonical identifiers for prefetchable targets.
//!
//! A key is an ordered sequence of primitive parts. Its canonical encoding is
//! the compact JSON array of those parts, e.g. `["users",1]`. The encoding is
//! order-sensitive and type-sensitive: `[1,"a"]` and `["1","a"]` are distinct
//! keys, as are `[1]` and `[1.0]`. No normalization between kinds happens, so
//! callers must build the same key the same way every time.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::prefetch::error::{PrefetchError, Result};

/// One primitive component of a route key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyPart {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl From<&str> for KeyPart {
    fn from(value: &str) -> Self {
        KeyPart::Str(value.to_string())
    }
}

impl From<String> for KeyPart {
    fn from(value: String) -> Self {
        KeyPart::Str(value)
    }
}

impl From<bool> for KeyPart {
    fn from(value: bool) -> Self {
        KeyPart::Bool(value)
    }
}

impl From<i64> for KeyPart {
    fn from(value: i64) -> Self {
        KeyPart::Int(value)
    }
}

impl From<i32> for KeyPart {
    fn from(value: i32) -> Self {
        KeyPart::Int(value.into())
    }
}

impl From<u32> for KeyPart {
    fn from(value: u32) -> Self {
        KeyPart::Int(value.into())
    }
}

impl From<f64> for KeyPart {
    fn from(value: f64) -> Self {
        KeyPart::Float(value)
    }
}

impl<T: Into<KeyPart>> From<Option<T>> for KeyPart {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(KeyPart::Null)
    }
}

/// Build a `Vec<KeyPart>` from heterogeneous values.
///
/// ```
/// use route_prefetch::key_parts;
/// let parts = key_parts!["users", 1];
/// assert_eq!(parts.len(), 2);
/// ```
#[macro_export]
macro_rules! key_parts {
    ($($part:expr),* $(,)?) => {
        vec![$($crate::prefetch::key::KeyPart::from($part)),*]
    };
}

/// A validated, canonically encoded route key.
///
/// Equality and hashing use the encoded form only.
#[derive(Debug, Clone)]
pub struct RouteKey {
    parts: Arc<[KeyPart]>,
    encoded: Arc<str>,
}

impl RouteKey {
    /// Validate and encode a key.
    ///
    /// Fails fast on an empty key or a non-finite float: both are caller bugs,
    /// not transient conditions.
    pub fn new(parts: Vec<KeyPart>) -> Result<Self> {
        if parts.is_empty() {
            return Err(PrefetchError::EmptyKey);
        }
        for (index, part) in parts.iter().enumerate() {
            if let KeyPart::Float(f) = part {
                if !f.is_finite() {
                    return Err(PrefetchError::InvalidKey(format!(
                        "part {index} is a non-finite float ({f})"
                    )));
                }
            }
        }

        let encoded = serde_json::to_string(&parts)
            .map_err(|e| PrefetchError::InvalidKey(e.to_string()))?;

        Ok(Self {
            parts: parts.into(),
            encoded: encoded.into(),
        })
    }

    /// The parts this key was built from, in order.
    pub fn parts(&self) -> &[KeyPart] {
        &self.parts
    }

    /// The canonical encoding.
    pub fn as_str(&self) -> &str {
        &self.encoded
    }
}

impl PartialEq for RouteKey {
    fn eq(&self, other: &Self) -> bool {
        self.encoded == other.encoded
    }
}

impl Eq for RouteKey {}

impl Hash for RouteKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.encoded.hash(state);
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded)
    }
}

impl TryFrom<Vec<KeyPart>> for RouteKey {
    type Error = PrefetchError;

    fn try_from(parts: Vec<KeyPart>) -> Result<Self> {
        RouteKey::new(parts)
    }
}
