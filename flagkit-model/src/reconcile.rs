//! Merging a freshly fetched flag list with the cached and fallback lists.

use std::collections::{HashMap, HashSet};

use crate::flag::Flag;

/// Merge `fresh` against what the device already knows.
///
/// Fresh flags win on every field except the draw and the unlocked state,
/// which are carried over from the cached flag of the same name so a device
/// stays in its bucket. Cached flags missing from `fresh` are kept. The
/// fallback only contributes development status (sticky once set) and
/// flags that nothing else declares. Order is fresh, then cached-only, then
/// fallback-only.
pub fn reconcile(fresh: &[Flag], cached: Option<&[Flag]>, fallback: Option<&[Flag]>) -> Vec<Flag> {
    let cached = cached.unwrap_or_default();
    let cached_by_name = first_by_name(cached);

    let mut merged: Vec<Flag> = fresh
        .iter()
        .map(|flag| {
            let mut flag = flag.clone();
            if let Some(previous) = cached_by_name.get(flag.name()) {
                flag.set_draw(previous.draw());
                flag.unlocked = previous.unlocked();
            }
            flag
        })
        .collect();

    let fresh_names: HashSet<&str> = fresh.iter().map(Flag::name).collect();
    merged.extend(
        cached
            .iter()
            .filter(|flag| !fresh_names.contains(flag.name()))
            .cloned(),
    );

    if let Some(fallback) = fallback {
        let fallback_by_name = first_by_name(fallback);
        for flag in merged.iter_mut() {
            if let Some(local) = fallback_by_name.get(flag.name()) {
                flag.is_development |= local.is_development();
            }
        }

        let known: HashSet<String> = merged.iter().map(|f| f.name().to_string()).collect();
        merged.extend(
            fallback
                .iter()
                .filter(|flag| !known.contains(flag.name()))
                .cloned(),
        );
    }

    merged
}

/// Index by name. A duplicated name resolves to its first occurrence.
fn first_by_name(flags: &[Flag]) -> HashMap<&str, &Flag> {
    let mut by_name = HashMap::with_capacity(flags.len());
    for flag in flags {
        by_name.entry(flag.name()).or_insert(flag);
    }
    by_name
}
