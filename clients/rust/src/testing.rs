//! Testing utilities for pinning flags in tests.
//!
//! # Example
//!
//! ```rust,ignore
//! use flagkit::testing::{FlagOverride, override_flags};
//!
//! #[test]
//! fn test_checkout() {
//!     let _guard = override_flags(&[("Checkout", FlagOverride::Enabled(true))]).unwrap();
//!     assert!(flagkit::is_enabled("Checkout"));
//! }
//! ```

use std::cell::RefCell;
use std::collections::HashMap;

use flagkit_model::{Flag, Variation};

use crate::store::pin_variation;
use crate::{GLOBAL_FLAGS, Result};

/// What a test pins a flag to.
#[derive(Debug, Clone, PartialEq)]
pub enum FlagOverride {
    Enabled(bool),
    Variation(Variation),
}

impl FlagOverride {
    pub(crate) fn apply(&self, flag: &mut Flag) {
        match self {
            FlagOverride::Enabled(enabled) => {
                let arm = if *enabled {
                    Variation::enabled()
                } else {
                    Variation::disabled()
                };
                if flag.test_variations().contains(&arm) {
                    flag.set_test_variation(arm);
                }
                flag.set_enabled(*enabled);
            }
            FlagOverride::Variation(variation) => pin_variation(flag, variation.clone()),
        }
    }
}

thread_local! {
    static OVERRIDES: RefCell<HashMap<String, FlagOverride>> = RefCell::new(HashMap::new());
}

/// Set an override for a flag.
pub fn set_override(name: &str, pinned: FlagOverride) {
    OVERRIDES.with(|o| {
        o.borrow_mut().insert(name.to_string(), pinned);
    });
}

/// Get the override for a flag if one exists.
pub fn get_override(name: &str) -> Option<FlagOverride> {
    OVERRIDES.with(|o| {
        let map = o.borrow();
        if map.is_empty() {
            return None;
        }
        map.get(name).cloned()
    })
}

/// Clear the override for a flag.
pub fn clear_override(name: &str) {
    OVERRIDES.with(|o| {
        o.borrow_mut().remove(name);
    });
}

/// Guard that restores overrides when dropped.
pub struct OverrideGuard {
    previous: Vec<(String, Option<FlagOverride>)>,
}

impl Drop for OverrideGuard {
    fn drop(&mut self) {
        OVERRIDES.with(|o| {
            let mut map = o.borrow_mut();
            // Reverse so a name listed twice ends up at its original value.
            for (name, prev) in self.previous.drain(..).rev() {
                match prev {
                    Some(pinned) => {
                        map.insert(name, pinned);
                    }
                    None => {
                        map.remove(&name);
                    }
                }
            }
        });
    }
}

/// Set overrides for the lifetime of the returned guard.
///
/// When the global store is initialized, every name must be a known flag and
/// every pinned variation one of its variations. Nothing is applied if any
/// check fails.
///
/// # Note
///
/// Overrides are thread-local. They won't apply to spawned threads.
pub fn override_flags(overrides: &[(&str, FlagOverride)]) -> Result<OverrideGuard> {
    if let Some(store) = GLOBAL_FLAGS.get() {
        for (name, pinned) in overrides {
            store.validate_override(name, pinned)?;
        }
    }

    let mut previous = Vec::with_capacity(overrides.len());

    OVERRIDES.with(|o| {
        let mut map = o.borrow_mut();
        for (name, pinned) in overrides {
            let prev = map.insert(name.to_string(), pinned.clone());
            previous.push((name.to_string(), prev));
        }
    });

    Ok(OverrideGuard { previous })
}

/// Initialize the global store from the environment unless already done.
pub fn ensure_initialized() -> Result<()> {
    match crate::init() {
        Ok(()) | Err(crate::FlagsError::AlreadyInitialized) => Ok(()),
        Err(e) => Err(e),
    }
}
