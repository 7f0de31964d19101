use std::fmt;

use serde::{Deserialize, Serialize};

use crate::assignment::{Assignment, assign};
use crate::flag_type::{FlagType, TestKind};
use crate::percentage::Percentage;
use crate::record::FlagRecord;
use crate::variation::Variation;

/// A named toggle, optionally carrying an experiment.
///
/// Identity is the case-sensitive name. Records are built by decoding a
/// [`FlagRecord`]; see [`crate::record`] for the classification rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "FlagRecord", into = "FlagRecord")]
pub struct Flag {
    pub(crate) name: String,
    pub(crate) detail_text: Option<String>,
    pub(crate) section: Option<String>,
    pub(crate) enabled: bool,
    pub(crate) flag_type: FlagType,
    pub(crate) is_development: bool,
    pub(crate) unlocked: Option<bool>,
    pub(crate) assignment: Assignment,
    pub(crate) test_biases: Vec<Percentage>,
    pub(crate) test_variations: Vec<Variation>,
    pub(crate) labels: Vec<Option<String>>,
}

impl PartialEq for Flag {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Flag {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn detail_text(&self) -> Option<&str> {
        self.detail_text.as_deref()
    }

    pub fn section(&self) -> Option<&str> {
        self.section.as_deref()
    }

    pub fn flag_type(&self) -> FlagType {
        self.flag_type
    }

    /// The raw toggle, ignoring development gating and test state.
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_development(&self) -> bool {
        self.is_development
    }

    pub fn unlocked(&self) -> Option<bool> {
        self.unlocked
    }

    pub fn assignment(&self) -> &Assignment {
        &self.assignment
    }

    /// The persisted draw in `[0, 100)`.
    pub fn draw(&self) -> f64 {
        self.assignment.draw()
    }

    pub fn test_variations(&self) -> &[Variation] {
        &self.test_variations
    }

    pub fn test_biases(&self) -> &[Percentage] {
        &self.test_biases
    }

    pub fn labels(&self) -> &[Option<String>] {
        &self.labels
    }

    /// Whether the flag is on.
    ///
    /// On/off tests report whether the device is bucketed into `Enabled`.
    /// Development-only flags are reported off unless `development_mode`.
    pub fn is_enabled(&self, development_mode: bool) -> bool {
        match self.flag_type {
            FlagType::Test(TestKind::OnOffAB) => self.test_variation().is_enabled(),
            _ if self.is_development && !development_mode => false,
            _ => self.enabled,
        }
    }

    pub fn is_test_variation(&self, variation: &Variation) -> bool {
        self.test_variation() == *variation
    }

    /// Bias of `variation`. A disabled flag reports 0 for everything.
    pub fn test_bias(&self, variation: &Variation) -> Option<Percentage> {
        if !self.enabled {
            return Some(Percentage::MIN);
        }
        self.test_variations
            .iter()
            .zip(self.test_biases.iter())
            .find(|(v, _)| *v == variation)
            .map(|(_, bias)| *bias)
    }

    /// The variation this device is in: the override if one is set, else
    /// `Disabled` for a disabled flag, else the bucket of the draw.
    pub fn test_variation(&self) -> Variation {
        if let Some(variation) = self.assignment.override_variation() {
            return variation.clone();
        }
        if !self.enabled {
            return Variation::disabled();
        }
        let draw = self.assignment.draw();
        match assign(draw, self.test_variations.iter().zip(self.test_biases.iter())) {
            Some(variation) => variation.clone(),
            None => self.unassigned(draw),
        }
    }

    fn unassigned(&self, draw: f64) -> Variation {
        let message = format!(
            "flag '{}' could not bucket draw {} into {:?}",
            self.name, draw, self.test_biases
        );
        debug_assert!(false, "{message}");
        tracing::error!(flag = %self.name, draw, "{message}");
        sentry::capture_message(&message, sentry::Level::Error);
        Variation::unassigned()
    }

    /// Label of `variation`, `None` when disabled or unlabelled.
    pub fn label(&self, variation: &Variation) -> Option<&str> {
        if !self.enabled {
            return None;
        }
        self.test_variations
            .iter()
            .zip(self.labels.iter())
            .find(|(v, _)| *v == variation)
            .and_then(|(_, label)| label.as_deref())
    }

    /// Label of the variation this device is currently in.
    pub fn current_label(&self) -> Option<&str> {
        self.label(&self.test_variation())
    }

    pub fn is_unlocked(&self, development_mode: bool) -> bool {
        self.flag_type == FlagType::UnlockFlag
            && self.unlocked == Some(true)
            && self.is_enabled(development_mode)
    }

    /// First variation that differs from the current one.
    pub fn sibling_variation(&self) -> Option<&Variation> {
        let current = self.test_variation();
        self.test_variations.iter().find(|v| **v != current)
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Pin the variation in memory. Never persisted.
    pub fn set_test_variation(&mut self, variation: Variation) {
        let assignment = std::mem::replace(&mut self.assignment, Assignment::Computed(0.0));
        self.assignment = assignment.overridden(variation);
    }

    pub fn clear_test_variation(&mut self) {
        self.assignment = Assignment::Computed(self.assignment.draw());
    }

    pub fn set_unlocked(&mut self, unlocked: bool) {
        self.unlocked = Some(unlocked);
    }

    pub(crate) fn set_draw(&mut self, draw: f64) {
        let assignment = std::mem::replace(&mut self.assignment, Assignment::Computed(0.0));
        self.assignment = assignment.with_draw(draw);
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Feature: {}", self.name)?;
        writeln!(f, "Enabled: {}", self.is_enabled(true))?;
        if self.flag_type == FlagType::UnlockFlag {
            writeln!(f, "Unlocked: {}", self.is_unlocked(true))?;
        }
        let variations: Vec<String> = self
            .test_variations
            .iter()
            .zip(self.test_biases.iter())
            .map(|(variation, bias)| format!("{variation} ({bias})"))
            .collect();
        writeln!(f, "Test variations: {}", variations.join(", "))?;
        write!(
            f,
            "Test variation assignment: {:.0}% -> {}",
            self.draw(),
            self.test_variation()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FlagRecord;

    fn decode(json: &str) -> Flag {
        serde_json::from_str(json).unwrap()
    }

    fn ab_test(enabled: bool, biases: &str, draw: f64) -> Flag {
        decode(&format!(
            r#"{{"name": "Example A/B Test", "enabled": {enabled}, "test-biases": {biases},
                "test-variations": ["Group A", "Group B"], "test-variation-assignment": {draw}}}"#
        ))
    }

    #[test]
    fn test_draw_buckets_fifty_fifty() {
        let group_a = Variation::new("Group A");
        let group_b = Variation::new("Group B");
        for draw in [0.0, 1e-28, 25.0, 49.999] {
            let flag = ab_test(true, "[50, 50]", draw);
            assert!(flag.is_test_variation(&group_a), "draw {draw}");
            assert!(!flag.is_test_variation(&group_b), "draw {draw}");
        }
        for draw in [50.0, 75.0, 99.999] {
            let flag = ab_test(true, "[50, 50]", draw);
            assert!(flag.is_test_variation(&group_b), "draw {draw}");
        }
    }

    #[test]
    fn test_draw_of_hundred_lands_in_last_group() {
        let flag = ab_test(true, "[50, 50]", 100.0);
        assert!(flag.is_test_variation(&Variation::new("Group B")));
    }

    #[test]
    fn test_zero_hundred_biases() {
        let flag = ab_test(true, "[0, 100]", 0.0);
        assert!(flag.is_test_variation(&Variation::new("Group B")));
        let flag = ab_test(true, "[100, 0]", 99.0);
        assert!(flag.is_test_variation(&Variation::new("Group A")));
    }

    #[test]
    fn test_disabled_flag_reports_disabled() {
        let flag = ab_test(false, "[50, 50]", 0.0);
        assert!(!flag.is_test_variation(&Variation::new("Group A")));
        assert!(!flag.is_test_variation(&Variation::new("Group B")));
        assert!(flag.is_test_variation(&Variation::disabled()));
        assert!(!flag.is_enabled(true));
        assert_eq!(flag.test_bias(&Variation::new("Group A")), Some(Percentage::MIN));
    }

    #[test]
    fn test_disabled_on_off_test() {
        let flag = decode(
            r#"{"name": "Example Feature A/B Test", "enabled": false,
                "test-variations": ["Enabled", "Disabled"], "test-variation-assignment": 0}"#,
        );
        assert!(!flag.is_test_variation(&Variation::enabled()));
        assert!(flag.is_test_variation(&Variation::disabled()));
        assert!(!flag.is_enabled(true));
    }

    #[test]
    fn test_on_off_test_follows_bucket() {
        let json = |draw: f64| {
            format!(
                r#"{{"name": "Example Feature A/B Test", "enabled": true,
                    "test-variations": ["Enabled", "Disabled"], "test-variation-assignment": {draw}}}"#
            )
        };
        let flag = decode(&json(0.0));
        assert!(flag.is_test_variation(&Variation::enabled()));
        assert!(flag.is_enabled(false));

        let flag = decode(&json(50.0));
        assert!(flag.is_test_variation(&Variation::disabled()));
        assert!(!flag.is_enabled(false));
    }

    #[test]
    fn test_on_off_biases_follow_serialized_order() {
        let flag = decode(
            r#"{"name": "t", "enabled": true, "test-biases": [80, 20],
                "test-variations": ["Enabled", "Disabled"]}"#,
        );
        assert_eq!(flag.test_variations().len(), 2);
        assert_eq!(flag.test_bias(&Variation::enabled()), Some(Percentage::new(80.0)));
        assert_eq!(flag.test_bias(&Variation::disabled()), Some(Percentage::new(20.0)));

        let flag = decode(
            r#"{"name": "t", "enabled": true, "test-biases": [80, 20],
                "test-variations": ["Disabled", "Enabled"]}"#,
        );
        assert_eq!(flag.flag_type(), FlagType::Test(TestKind::OnOffAB));
        assert_eq!(flag.test_bias(&Variation::enabled()), Some(Percentage::new(20.0)));
        assert_eq!(flag.test_bias(&Variation::disabled()), Some(Percentage::new(80.0)));
    }

    #[test]
    fn test_thirds_boundaries() {
        let json = |draw: f64| {
            format!(
                r#"{{"name": "mvt", "enabled": true, "test-variation-assignment": {draw},
                    "test-variations": ["Group A", "Group B", "Group C"]}}"#
            )
        };
        assert!(decode(&json(33.0)).is_test_variation(&Variation::new("Group A")));
        assert!(decode(&json(34.0)).is_test_variation(&Variation::new("Group B")));
        assert!(decode(&json(66.6)).is_test_variation(&Variation::new("Group B")));
        assert!(decode(&json(66.7)).is_test_variation(&Variation::new("Group C")));
    }

    #[test]
    fn test_override_wins_over_bucket_and_disabled() {
        let mut flag = ab_test(true, "[50, 50]", 10.0);
        flag.set_test_variation(Variation::new("Group B"));
        assert_eq!(flag.test_variation(), Variation::new("Group B"));
        assert_eq!(flag.draw(), 10.0);

        flag.set_enabled(false);
        assert_eq!(flag.test_variation(), Variation::new("Group B"));

        flag.clear_test_variation();
        assert_eq!(flag.test_variation(), Variation::disabled());
    }

    #[test]
    fn test_development_flag_needs_development_mode() {
        let flag = decode(r#"{"name": "wip", "enabled": true, "development": true}"#);
        assert!(!flag.is_enabled(false));
        assert!(flag.is_enabled(true));
    }

    #[test]
    fn test_labels() {
        let flag = decode(
            r#"{"name": "copy", "enabled": true, "test-variations": ["A", "B"],
                "labels": ["Buy now", null], "test-variation-assignment": 10}"#,
        );
        assert_eq!(flag.label(&Variation::a()), Some("Buy now"));
        assert_eq!(flag.label(&Variation::b()), None);
        assert_eq!(flag.current_label(), Some("Buy now"));

        let mut disabled = flag.clone();
        disabled.set_enabled(false);
        assert_eq!(disabled.label(&Variation::a()), None);
    }

    #[test]
    fn test_unlock_flag() {
        let flag = decode(r#"{"name": "pro", "enabled": true, "unlocked": true}"#);
        assert_eq!(flag.flag_type(), FlagType::UnlockFlag);
        assert!(flag.is_unlocked(false));

        let locked = decode(r#"{"name": "pro", "enabled": true, "unlocked": false}"#);
        assert!(!locked.is_unlocked(false));

        let off = decode(r#"{"name": "pro", "enabled": false, "unlocked": true}"#);
        assert!(!off.is_unlocked(false));
    }

    #[test]
    fn test_sibling_variation() {
        let flag = decode(
            r#"{"name": "t", "enabled": true, "test-variations": ["Enabled", "Disabled"],
                "test-variation-assignment": 5}"#,
        );
        assert_eq!(flag.sibling_variation(), Some(&Variation::disabled()));
    }

    #[test]
    fn test_identity_is_name() {
        let a = decode(r#"{"name": "same", "enabled": true}"#);
        let b = decode(r#"{"name": "same", "enabled": false}"#);
        let c = decode(r#"{"name": "Same", "enabled": true}"#);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_display() {
        let flag = ab_test(true, "[50, 50]", 75.0);
        let text = flag.to_string();
        assert!(text.contains("Feature: Example A/B Test"));
        assert!(text.contains("Group A (50%), Group B (50%)"));
        assert!(text.contains("75% -> Group B"));
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic(expected = "could not bucket"))]
    fn test_uncovered_draw_is_unassigned() {
        let mut flag = Flag::from(FlagRecord {
            name: "broken".into(),
            enabled: Some(true),
            test_variations: Some(vec!["A".into(), "B".into()]),
            ..Default::default()
        });
        flag.test_biases = vec![Percentage::new(10.0), Percentage::new(10.0)];
        flag.set_draw(50.0);
        assert_eq!(flag.test_variation(), Variation::unassigned());
    }
}
