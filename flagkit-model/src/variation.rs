use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Name of a test bucket. Compared and hashed case-insensitively, displayed
/// with its original spelling.
#[derive(Debug, Clone)]
pub struct Variation {
    name: String,
    key: String,
}

impl Variation {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let key = name.to_lowercase();
        Self { name, key }
    }

    pub fn enabled() -> Self {
        Self::new("Enabled")
    }

    pub fn disabled() -> Self {
        Self::new("Disabled")
    }

    /// Returned when a draw cannot be bucketed. Seeing this outside a test
    /// means the bias table bypassed validation.
    pub fn unassigned() -> Self {
        Self::new("Unassigned")
    }

    pub fn a() -> Self {
        Self::new("A")
    }

    pub fn b() -> Self {
        Self::new("B")
    }

    pub fn c() -> Self {
        Self::new("C")
    }

    pub fn d() -> Self {
        Self::new("D")
    }

    pub fn e() -> Self {
        Self::new("E")
    }

    pub fn f() -> Self {
        Self::new("F")
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lowercased comparison key.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_enabled(&self) -> bool {
        self.key == "enabled"
    }

    pub fn is_disabled(&self) -> bool {
        self.key == "disabled"
    }

    pub fn is_unassigned(&self) -> bool {
        self.key == "unassigned"
    }

    /// Synthetic opposite used for single-variation flags: `X` -> `!X`.
    pub fn negated(&self) -> Self {
        Self::new(format!("!{}", self.name))
    }
}

impl PartialEq for Variation {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Variation {}

impl Hash for Variation {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl From<&str> for Variation {
    fn from(name: &str) -> Self {
        Variation::new(name)
    }
}

impl From<String> for Variation {
    fn from(name: String) -> Self {
        Variation::new(name)
    }
}

impl fmt::Display for Variation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl Serialize for Variation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name)
    }
}

impl<'de> Deserialize<'de> for Variation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Variation::new)
    }
}
