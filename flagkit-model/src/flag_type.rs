//! Flag types and decode-time classification of raw variation lists.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::variation::Variation;

/// Flavour of experiment carried by a [`FlagType::Test`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TestKind {
    /// Two arbitrary arms.
    AB,
    /// Two arms that are literally on and off.
    OnOffAB,
    /// Three or more arms.
    MVT,
}

/// Equality compares the whole discriminant, test kind included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlagType {
    Deprecated,
    SimpleFlag,
    UnlockFlag,
    Test(TestKind),
}

impl FlagType {
    pub const ALL: [FlagType; 6] = [
        FlagType::Deprecated,
        FlagType::SimpleFlag,
        FlagType::UnlockFlag,
        FlagType::Test(TestKind::AB),
        FlagType::Test(TestKind::OnOffAB),
        FlagType::Test(TestKind::MVT),
    ];

    /// Identifier used in the serialized `type` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            FlagType::Deprecated => "deprecated",
            FlagType::SimpleFlag => "feature-flag",
            FlagType::UnlockFlag => "unlock-flag",
            FlagType::Test(TestKind::AB) => "ab-test",
            FlagType::Test(TestKind::OnOffAB) => "on-off-ab-test",
            FlagType::Test(TestKind::MVT) => "mvt-test",
        }
    }

    pub fn from_str_id(id: &str) -> Option<FlagType> {
        FlagType::ALL.into_iter().find(|t| t.as_str() == id)
    }

    pub fn is_test(&self) -> bool {
        matches!(self, FlagType::Test(_))
    }
}

impl fmt::Display for FlagType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlagType::Deprecated => "Deprecated",
            FlagType::SimpleFlag => "Feature Flag",
            FlagType::UnlockFlag => "Unlock Flag",
            FlagType::Test(TestKind::AB) => "A/B Test",
            FlagType::Test(TestKind::OnOffAB) => "Feature On/Off (A/B) Test",
            FlagType::Test(TestKind::MVT) => "MVT Test",
        };
        write!(f, "{name}")
    }
}

impl Serialize for FlagType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FlagType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let id = String::deserialize(deserializer)?;
        FlagType::from_str_id(&id)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown flag type '{id}'")))
    }
}

/// Variation pairs that mark a two-arm test as an on/off test, in
/// enabled-first order.
const ON_OFF_PAIRS: [(&str, &str); 2] = [("enabled", "disabled"), ("on", "off")];

/// Result of classifying a decoded record.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub flag_type: FlagType,
    pub variations: Vec<Variation>,
    /// `enabled` to use when the record doesn't say.
    pub enabled_default: bool,
    /// Plain flags pin their draw so bucketing lands on the side matching
    /// `enabled`.
    pub pins_draw: bool,
}

/// Classify a record from its raw `test-variations` list.
///
/// An explicit type wins over inference, except that a record carrying an
/// `unlocked` field is always an unlock flag, and an explicit `unlock-flag`
/// type without that field is ignored.
pub fn classify(
    raw_variations: Option<&[String]>,
    explicit_type: Option<FlagType>,
    has_unlocked_field: bool,
) -> Classification {
    let explicit_type = if has_unlocked_field {
        Some(FlagType::UnlockFlag)
    } else {
        explicit_type.filter(|t| *t != FlagType::UnlockFlag)
    };

    let default_variations = || vec![Variation::enabled(), Variation::disabled()];

    let (inferred, variations, enabled_default, pins_draw) = match raw_variations {
        None | Some([]) => (FlagType::SimpleFlag, default_variations(), false, true),
        Some([only]) => {
            let only = Variation::new(only.as_str());
            let negated = only.negated();
            (FlagType::SimpleFlag, vec![only, negated], false, false)
        }
        Some([first, second]) => match on_off_order(first, second) {
            Some(disabled_first) => {
                let mut variations = default_variations();
                if disabled_first {
                    variations.reverse();
                }
                (FlagType::Test(TestKind::OnOffAB), variations, true, false)
            }
            None => (
                FlagType::Test(TestKind::AB),
                vec![Variation::new(first.as_str()), Variation::new(second.as_str())],
                true,
                false,
            ),
        },
        Some(many) => (
            FlagType::Test(TestKind::MVT),
            many.iter().map(|v| Variation::new(v.as_str())).collect(),
            true,
            false,
        ),
    };

    Classification {
        flag_type: explicit_type.unwrap_or(inferred),
        variations,
        enabled_default,
        pins_draw,
    }
}

/// `Some(disabled_first)` when the pair is an on/off pair in either order.
fn on_off_order(first: &str, second: &str) -> Option<bool> {
    let first = first.to_lowercase();
    let second = second.to_lowercase();
    ON_OFF_PAIRS.iter().find_map(|(on, off)| {
        if first == *on && second == *off {
            Some(false)
        } else if first == *off && second == *on {
            Some(true)
        } else {
            None
        }
    })
}
