//! Deterministic bucketing of a persisted draw into a test variation.

use rand::Rng;

use crate::percentage::Percentage;
use crate::variation::Variation;

/// Draws are uniform in `[0, 100)`.
pub fn random_draw<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    rng.gen_range(0.0..100.0)
}

/// Where a flag's variation comes from.
///
/// The draw is kept even while overridden so that it is still persisted
/// and restored once the override goes away on the next refresh.
#[derive(Debug, Clone, PartialEq)]
pub enum Assignment {
    Computed(f64),
    Overridden { draw: f64, variation: Variation },
}

impl Assignment {
    pub fn draw(&self) -> f64 {
        match self {
            Assignment::Computed(draw) => *draw,
            Assignment::Overridden { draw, .. } => *draw,
        }
    }

    pub fn override_variation(&self) -> Option<&Variation> {
        match self {
            Assignment::Computed(_) => None,
            Assignment::Overridden { variation, .. } => Some(variation),
        }
    }

    /// Replace the draw, keeping any override.
    pub fn with_draw(self, draw: f64) -> Self {
        match self {
            Assignment::Computed(_) => Assignment::Computed(draw),
            Assignment::Overridden { variation, .. } => Assignment::Overridden { draw, variation },
        }
    }

    pub fn overridden(self, variation: Variation) -> Self {
        Assignment::Overridden {
            draw: self.draw(),
            variation,
        }
    }
}

/// Pick the variation whose cumulative range contains `draw`.
///
/// Ranges are half-open `[lower, lower + bias)` walked in order. A draw of
/// exactly 100 falls outside every half-open range, so when the last upper
/// bound is exactly 100 that range is retried as closed. `None` means the
/// biases did not cover the draw, which validation should have prevented.
pub fn assign<'a, I>(draw: f64, pairs: I) -> Option<&'a Variation>
where
    I: IntoIterator<Item = (&'a Variation, &'a Percentage)>,
{
    let mut lower = Percentage::MIN.value();
    let mut last: Option<(f64, f64, &'a Variation)> = None;

    for (variation, bias) in pairs {
        let upper = lower + bias.value();
        if (lower..upper).contains(&draw) {
            return Some(variation);
        }
        last = Some((lower, upper, variation));
        lower = upper;
    }

    match last {
        Some((lower, upper, variation))
            if upper == Percentage::MAX.value() && (lower..=upper).contains(&draw) =>
        {
            Some(variation)
        }
        _ => None,
    }
}

/// Whether `biases` may be kept for `count` variations: same length and a raw
/// (unclamped) sum of exactly 100.
pub fn biases_are_valid(biases: &[f64], count: usize) -> bool {
    biases.len() == count && biases.iter().sum::<f64>() == Percentage::MAX.value()
}

/// `100 / count` for each variation.
pub fn uniform_biases(count: usize) -> Vec<Percentage> {
    if count == 0 {
        return Vec::new();
    }
    vec![Percentage::new(Percentage::MAX.value() / count as f64); count]
}
