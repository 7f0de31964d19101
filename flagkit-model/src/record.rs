//! Persisted shape of a flag and the decode rules that turn it into a [`Flag`].

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::assignment::{Assignment, biases_are_valid, random_draw, uniform_biases};
use crate::flag::Flag;
use crate::flag_type::{FlagType, classify};
use crate::percentage::Percentage;

/// Draw pinned onto plain flags so that bucketing agrees with `enabled`.
const PINNED_ENABLED_DRAW: f64 = 1.0;
const PINNED_DISABLED_DRAW: f64 = 99.0;

/// One entry of a flag document, exactly as it is stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FlagRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub development: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unlocked: Option<bool>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub flag_type: Option<FlagType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_biases: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_variation_assignment: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_variations: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<Option<String>>>,
}

impl FlagRecord {
    /// Decode using `rng` for a missing draw.
    pub fn into_flag_with<R: Rng + ?Sized>(self, rng: &mut R) -> Flag {
        let classification = classify(
            self.test_variations.as_deref(),
            self.flag_type,
            self.unlocked.is_some(),
        );
        let count = classification.variations.len();
        let enabled = self.enabled.unwrap_or(classification.enabled_default);

        let test_biases = match self.test_biases {
            Some(raw) if biases_are_valid(&raw, count) => {
                raw.into_iter().map(Percentage::new).collect()
            }
            Some(raw) => {
                tracing::debug!(
                    flag = %self.name,
                    biases = ?raw,
                    "test biases do not sum to 100 for {count} variations, using uniform"
                );
                uniform_biases(count)
            }
            None => uniform_biases(count),
        };

        let draw = if classification.pins_draw {
            if enabled {
                PINNED_ENABLED_DRAW
            } else {
                PINNED_DISABLED_DRAW
            }
        } else {
            match self
                .test_variation_assignment
                .filter(|d| (Percentage::MIN.value()..=Percentage::MAX.value()).contains(d))
            {
                Some(draw) => draw,
                None => random_draw(rng),
            }
        };

        let mut labels = self.labels.unwrap_or_default();
        labels.resize(count, None);

        Flag {
            name: self.name,
            detail_text: self.description,
            section: self.section,
            enabled,
            flag_type: classification.flag_type,
            is_development: self.development.unwrap_or(false),
            unlocked: self.unlocked,
            assignment: Assignment::Computed(draw),
            test_biases,
            test_variations: classification.variations,
            labels,
        }
    }
}

impl From<FlagRecord> for Flag {
    fn from(record: FlagRecord) -> Self {
        record.into_flag_with(&mut rand::thread_rng())
    }
}

impl From<Flag> for FlagRecord {
    fn from(flag: Flag) -> Self {
        FlagRecord::from(&flag)
    }
}

/// Every field is written back; overrides are in-memory only and dropped.
impl From<&Flag> for FlagRecord {
    fn from(flag: &Flag) -> Self {
        FlagRecord {
            name: flag.name.clone(),
            description: flag.detail_text.clone(),
            section: flag.section.clone(),
            development: Some(flag.is_development),
            enabled: Some(flag.enabled),
            unlocked: flag.unlocked,
            flag_type: Some(flag.flag_type),
            test_biases: Some(flag.test_biases.iter().map(|b| b.value()).collect()),
            test_variation_assignment: Some(flag.assignment.draw()),
            test_variations: Some(
                flag.test_variations
                    .iter()
                    .map(|v| v.name().to_string())
                    .collect(),
            ),
            labels: Some(flag.labels.clone()),
        }
    }
}
