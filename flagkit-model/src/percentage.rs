use std::fmt;
use std::ops::Add;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A weight in `[0, 100]`. Out of range inputs are clamped, never rejected.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct Percentage(f64);

impl Percentage {
    pub const MIN: Percentage = Percentage(0.0);
    pub const MAX: Percentage = Percentage(100.0);

    pub fn new(value: f64) -> Self {
        if value.is_nan() || value < 0.0 {
            Self::MIN
        } else if value > 100.0 {
            Self::MAX
        } else {
            Percentage(value)
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl From<f64> for Percentage {
    fn from(value: f64) -> Self {
        Percentage::new(value)
    }
}

/// Saturating: the raw sum is clamped back into range.
impl Add for Percentage {
    type Output = Percentage;

    fn add(self, rhs: Percentage) -> Percentage {
        Percentage::new(self.0 + rhs.0)
    }
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

impl Serialize for Percentage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.0)
    }
}

impl<'de> Deserialize<'de> for Percentage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        f64::deserialize(deserializer).map(Percentage::new)
    }
}
