// ── Object identity ──
//
// Every controller object is addressed by its `objnam`, a short string
// such as `"C0003"` or `"B1101"`. Identifiers are unique across the whole
// controller and are the join key for update routing.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Heat-source value meaning "no heater selected".
pub const NO_HEATER_ID: &str = "00000";

/// Controller object identifier (`objnam`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `true` for the `"00000"` no-heater sentinel.
    pub fn is_no_heater(&self) -> bool {
        self.0 == NO_HEATER_ID
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ObjectId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ObjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for ObjectId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ObjectId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl PartialEq<str> for ObjectId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for ObjectId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}
