//! The flag store: load chain, queries and single-flag mutations.

use std::sync::{Arc, Mutex, MutexGuard};

use arc_swap::ArcSwapOption;
use flagkit_model::{
    ConfigFormat, Flag, FlagType, Parser, TestKind, Variation, reconcile,
};

use crate::config::FlagsConfig;
use crate::snapshot::{LoadSource, Snapshot};
use crate::source::ByteSource;
use crate::testing;
use crate::{FlagsError, Result};

/// Pin `variation`, keeping `enabled` in step when it is the on or off arm.
pub(crate) fn pin_variation(flag: &mut Flag, variation: Variation) {
    if variation.is_enabled() {
        flag.set_enabled(true);
    } else if variation.is_disabled() {
        flag.set_enabled(false);
    }
    flag.set_test_variation(variation);
}

/// Flags for one process.
///
/// Readers load the current [`Snapshot`] without locking. Writers (refreshes
/// and mutations) are serialized and publish a whole new snapshot.
pub struct FlagStore {
    source: Box<dyn ByteSource>,
    parser: &'static dyn Parser,
    development_mode: bool,
    snapshot: ArcSwapOption<Snapshot>,
    write_lock: Mutex<()>,
}

impl FlagStore {
    /// Store over the files named by `config`. Nothing is loaded yet.
    pub fn new(config: &FlagsConfig) -> Self {
        Self::with_source(config.file_source(), config.format, config.development_mode)
    }

    pub fn with_source(
        source: impl ByteSource + 'static,
        format: ConfigFormat,
        development_mode: bool,
    ) -> Self {
        Self {
            source: Box::new(source),
            parser: format.parser(),
            development_mode,
            snapshot: ArcSwapOption::empty(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn development_mode(&self) -> bool {
        self.development_mode
    }

    /// Current configuration, `None` until something loaded.
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.snapshot.load_full()
    }

    /// Fetch the remote document and run the load chain.
    pub fn refresh(&self) -> Option<LoadSource> {
        let remote = self.source.fetch_remote();
        self.load(remote)
    }

    /// Run the load chain with `bytes` standing in for the remote document.
    pub fn refresh_with_bytes(&self, bytes: &[u8]) -> Option<LoadSource> {
        self.load(Some(bytes.to_vec()))
    }

    fn parse(&self, bytes: Option<Vec<u8>>, tier: &str) -> Option<Vec<Flag>> {
        let bytes = bytes?;
        let flags = self.parser.parse(&bytes);
        if flags.is_none() {
            tracing::debug!("{tier} flag document did not parse, falling through");
        }
        flags
    }

    /// Remote, then cache, then local fallback, then bundled default. Only
    /// the first that parses is used. When nothing does, the current
    /// snapshot is left alone.
    fn load(&self, remote: Option<Vec<u8>>) -> Option<LoadSource> {
        let _guard = self.write_lock();

        let cached = self.parse(self.source.fetch_cache(), "cached");
        let local = self.parse(self.source.fetch_local_fallback(), "fallback");

        let (flags, source) = if let Some(fresh) = self.parse(remote, "remote") {
            let merged = reconcile(&fresh, cached.as_deref(), local.as_deref());
            self.persist(&merged);
            (merged, LoadSource::Remote)
        } else if let Some(cached) = cached {
            let fallback = local.or_else(|| self.parse(self.source.fetch_bundled(), "bundled"));
            let merged = reconcile(&cached, Some(&cached), fallback.as_deref());
            (merged, LoadSource::Cache)
        } else if let Some(local) = local {
            self.seed_cache(&local);
            (local, LoadSource::LocalFallback)
        } else if let Some(bundled) = self.parse(self.source.fetch_bundled(), "bundled") {
            self.seed_cache(&bundled);
            (bundled, LoadSource::Bundled)
        } else {
            tracing::debug!("no flag configuration available");
            return None;
        };

        tracing::info!(source = ?source, flags = flags.len(), "flag configuration loaded");
        self.snapshot.store(Some(Arc::new(Snapshot::new(flags, source))));
        Some(source)
    }

    fn seed_cache(&self, flags: &[Flag]) {
        if !self.source.cache_exists() {
            self.persist(flags);
        }
    }

    /// Cache failures never fail a load; the flags are still served.
    fn persist(&self, flags: &[Flag]) {
        if let Err(e) = self.try_persist(flags) {
            tracing::warn!(error = %e, "failed to persist flag cache");
        }
    }

    fn try_persist(&self, flags: &[Flag]) -> Result<()> {
        let bytes = self.parser.encode(flags)?;
        self.source.persist_cache(&bytes)?;
        Ok(())
    }

    fn write_lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `f` on the named flag, with any test override applied.
    fn with_flag<T>(&self, name: &str, f: impl FnOnce(&Flag) -> T) -> Option<T> {
        let guard = self.snapshot.load();
        let flag = guard.as_deref()?.get(name)?;
        match testing::get_override(name) {
            Some(pinned) => {
                let mut flag = flag.clone();
                pinned.apply(&mut flag);
                Some(f(&flag))
            }
            None => Some(f(flag)),
        }
    }

    fn collect(&self, mut keep: impl FnMut(&Flag) -> bool) -> Vec<Flag> {
        self.snapshot
            .load()
            .as_deref()
            .map(|s| s.flags.iter().filter(|f| keep(f)).cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.with_flag(name, |f| f.is_enabled(self.development_mode))
            .unwrap_or(false)
    }

    pub fn is_test_variation(&self, name: &str, variation: &Variation) -> bool {
        self.test_variation(name).as_ref() == Some(variation)
    }

    pub fn test_variation(&self, name: &str) -> Option<Variation> {
        self.with_flag(name, Flag::test_variation)
    }

    /// Label of `variation`, `None` when the flag is disabled or the
    /// variation has no label.
    pub fn label(&self, name: &str, variation: &Variation) -> Option<String> {
        self.with_flag(name, |f| f.label(variation).map(str::to_string))
            .flatten()
    }

    /// Label of the variation this device is in.
    pub fn current_label(&self, name: &str) -> Option<String> {
        self.with_flag(name, |f| f.current_label().map(str::to_string))
            .flatten()
    }

    pub fn is_unlocked(&self, name: &str) -> bool {
        self.with_flag(name, |f| f.is_unlocked(self.development_mode))
            .unwrap_or(false)
    }

    pub fn flag(&self, name: &str) -> Option<Flag> {
        self.with_flag(name, Flag::clone)
    }

    pub fn all(&self) -> Vec<Flag> {
        self.collect(|_| true)
    }

    /// Distinct sections in order of first appearance. `None` is the
    /// uncategorized section.
    pub fn sections(&self) -> Vec<Option<String>> {
        let mut sections: Vec<Option<String>> = Vec::new();
        for flag in self.all() {
            let section = flag.section().map(str::to_string);
            if !sections.contains(&section) {
                sections.push(section);
            }
        }
        sections
    }

    pub fn filter_by_section(&self, section: Option<&str>) -> Vec<Flag> {
        self.collect(|f| f.section() == section)
    }

    pub fn filter_by_type(&self, flag_type: FlagType) -> Vec<Flag> {
        self.collect(|f| f.flag_type() == flag_type)
    }

    /// All flags ordered by name.
    pub fn sorted(&self) -> Vec<Flag> {
        let mut flags = self.all();
        flags.sort_by(|a, b| a.name().cmp(b.name()));
        flags
    }

    pub fn describe(&self) -> String {
        self.all()
            .iter()
            .map(|flag| flag.to_string())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Swap in a copy of the snapshot with the named flag changed by `f`.
    fn update_flag(&self, name: &str, f: impl FnOnce(&mut Flag)) -> Result<Flag> {
        let _guard = self.write_lock();
        self.update_flag_locked(name, f)
    }

    /// [`Self::update_flag`] for callers already holding the write lock.
    fn update_flag_locked(&self, name: &str, f: impl FnOnce(&mut Flag)) -> Result<Flag> {
        let snapshot = self
            .snapshot
            .load_full()
            .ok_or_else(|| FlagsError::UnknownFlag(name.to_string()))?;

        let mut flags = snapshot.flags.clone();
        let flag = flags
            .iter_mut()
            .find(|flag| flag.name() == name)
            .ok_or_else(|| FlagsError::UnknownFlag(name.to_string()))?;
        f(flag);
        let updated = flag.clone();

        self.snapshot
            .store(Some(Arc::new(snapshot.with_flags(flags))));
        Ok(updated)
    }

    /// Turn a flag on or off in memory.
    ///
    /// On/off tests and plain flags do it by pinning the other variation, so
    /// bucketing agrees with the new state. The current state is the flag's
    /// own, ignoring development gating. Not persisted.
    pub fn update_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        self.update_flag(name, |flag| {
            let current = match flag.flag_type() {
                FlagType::Test(TestKind::OnOffAB) => Some(flag.test_variation().is_enabled()),
                FlagType::SimpleFlag => Some(flag.enabled()),
                _ => None,
            };
            if let Some(current) = current {
                if current == enabled {
                    return;
                }
                if let Some(sibling) = flag.sibling_variation().cloned() {
                    pin_variation(flag, sibling);
                }
            }
            flag.set_enabled(enabled);
        })?;
        Ok(())
    }

    /// Pin the variation in memory. Not persisted.
    pub fn update_test_variation(&self, name: &str, variation: Variation) -> Result<()> {
        self.update_flag(name, |flag| pin_variation(flag, variation))?;
        Ok(())
    }

    /// Set the unlocked state and write it through to the cache, so it
    /// survives refreshes.
    pub fn set_unlocked(&self, name: &str, unlocked: bool) -> Result<()> {
        let _guard = self.write_lock();
        let updated = self.update_flag_locked(name, |flag| flag.set_unlocked(unlocked))?;

        let mut cached = self
            .parse(self.source.fetch_cache(), "cached")
            .unwrap_or_default();
        match cached.iter_mut().find(|flag| flag.name() == name) {
            Some(flag) => flag.set_unlocked(unlocked),
            None => {
                let mut record = updated;
                record.clear_test_variation();
                cached.push(record);
            }
        }
        self.try_persist(&cached)
    }

    /// Returns whether the flag is now unlocked.
    pub fn unlock(&self, name: &str) -> Result<bool> {
        self.set_unlocked(name, true)?;
        Ok(self.is_unlocked(name))
    }

    /// Returns whether the flag is now locked.
    pub fn lock(&self, name: &str) -> Result<bool> {
        self.set_unlocked(name, false)?;
        Ok(!self.is_unlocked(name))
    }

    /// Remove from memory and from the cache. A remote document that still
    /// declares the flag brings it back on the next refresh.
    pub fn delete_flag(&self, name: &str) -> Result<()> {
        let _guard = self.write_lock();
        let snapshot = self
            .snapshot
            .load_full()
            .ok_or_else(|| FlagsError::UnknownFlag(name.to_string()))?;
        if snapshot.get(name).is_none() {
            return Err(FlagsError::UnknownFlag(name.to_string()));
        }

        let flags = snapshot
            .flags
            .iter()
            .filter(|flag| flag.name() != name)
            .cloned()
            .collect();
        self.snapshot
            .store(Some(Arc::new(snapshot.with_flags(flags))));

        self.remove_from_cache(name)
    }

    /// Forget the cached record so sticky development status is recomputed
    /// on the next refresh. The in-memory flag is untouched.
    pub fn mark_no_longer_in_development(&self, name: &str) -> Result<()> {
        let _guard = self.write_lock();
        let known = self
            .snapshot
            .load()
            .as_deref()
            .is_some_and(|s| s.get(name).is_some());
        if !known {
            return Err(FlagsError::UnknownFlag(name.to_string()));
        }
        self.remove_from_cache(name)
    }

    fn remove_from_cache(&self, name: &str) -> Result<()> {
        let Some(mut cached) = self.parse(self.source.fetch_cache(), "cached") else {
            return Ok(());
        };
        let before = cached.len();
        cached.retain(|flag| flag.name() != name);
        if cached.len() != before {
            self.try_persist(&cached)?;
        }
        Ok(())
    }

    /// Add a flag built in code. Returns `false` and leaves the store alone
    /// if the name is taken.
    pub fn add_flag(&self, flag: Flag) -> bool {
        let _guard = self.write_lock();
        let current = self.snapshot.load_full();

        if let Some(snapshot) = current.as_deref()
            && snapshot.get(flag.name()).is_some()
        {
            tracing::warn!(flag = flag.name(), "flag already exists, not adding");
            return false;
        }

        let next = match current.as_deref() {
            Some(snapshot) => {
                let mut flags = snapshot.flags.clone();
                flags.push(flag);
                snapshot.with_flags(flags)
            }
            None => Snapshot::new(vec![flag], LoadSource::Programmatic),
        };
        self.snapshot.store(Some(Arc::new(next)));
        true
    }

    pub fn clear_cache(&self) -> Result<()> {
        let _guard = self.write_lock();
        self.source.clear_cache()?;
        Ok(())
    }

    /// Check that a test override names a real flag and variation.
    pub(crate) fn validate_override(&self, name: &str, pinned: &testing::FlagOverride) -> Result<()> {
        let guard = self.snapshot.load();
        let flag = guard
            .as_deref()
            .and_then(|s| s.get(name))
            .ok_or_else(|| FlagsError::UnknownFlag(name.to_string()))?;

        if let testing::FlagOverride::Variation(variation) = pinned
            && !flag.test_variations().contains(variation)
            && !variation.is_disabled()
        {
            return Err(FlagsError::UnknownVariation {
                flag: name.to_string(),
                variation: variation.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use flagkit_model::JsonParser;

    const DOCUMENT: &str = r#"[
        {"name": "Dark Mode", "enabled": true, "section": "UI"},
        {"name": "Checkout", "section": "Shop", "test-variations": ["A", "B"],
         "labels": ["Buy now", "Purchase"], "test-variation-assignment": 10},
        {"name": "Onboarding", "test-variations": ["Enabled", "Disabled"],
         "test-variation-assignment": 20},
        {"name": "Pro", "enabled": true, "unlocked": false, "section": "Shop"},
        {"name": "Beta", "enabled": true, "development": true}
    ]"#;

    fn store(development_mode: bool) -> FlagStore {
        let store = FlagStore::with_source(
            MemorySource::new().with_remote(DOCUMENT),
            ConfigFormat::Json,
            development_mode,
        );
        assert_eq!(store.refresh(), Some(LoadSource::Remote));
        store
    }

    #[test]
    fn test_queries() {
        let store = store(false);
        assert!(store.is_enabled("Dark Mode"));
        assert!(store.is_enabled("Onboarding"));
        assert!(!store.is_enabled("Beta"));
        assert!(!store.is_enabled("Missing"));

        assert_eq!(store.test_variation("Checkout"), Some(Variation::a()));
        assert!(store.is_test_variation("Checkout", &Variation::a()));
        assert_eq!(store.current_label("Checkout").as_deref(), Some("Buy now"));
        assert_eq!(store.test_variation("Missing"), None);
        assert_eq!(store.current_label("Missing"), None);
        assert!(!store.is_unlocked("Pro"));
    }

    #[test]
    fn test_development_mode_enables_development_flags() {
        assert!(store(true).is_enabled("Beta"));
    }

    #[test]
    fn test_empty_store_degrades() {
        let store = FlagStore::with_source(MemorySource::new(), ConfigFormat::Json, false);
        assert_eq!(store.refresh(), None);
        assert!(store.snapshot().is_none());
        assert!(!store.is_enabled("Dark Mode"));
        assert!(store.all().is_empty());
        assert!(matches!(
            store.update_enabled("Dark Mode", false),
            Err(FlagsError::UnknownFlag(_))
        ));
    }

    #[test]
    fn test_sections_and_filters() {
        let store = store(false);
        assert_eq!(
            store.sections(),
            vec![Some("UI".to_string()), Some("Shop".to_string()), None]
        );
        let shop: Vec<String> = store
            .filter_by_section(Some("Shop"))
            .iter()
            .map(|f| f.name().to_string())
            .collect();
        assert_eq!(shop, vec!["Checkout", "Pro"]);
        assert_eq!(store.filter_by_section(None).len(), 2);
        assert_eq!(store.filter_by_type(FlagType::UnlockFlag).len(), 1);
        assert_eq!(
            store.filter_by_type(FlagType::Test(TestKind::OnOffAB))[0].name(),
            "Onboarding"
        );
    }

    #[test]
    fn test_sorted_and_describe() {
        let store = store(false);
        let names: Vec<String> = store.sorted().iter().map(|f| f.name().to_string()).collect();
        assert_eq!(names, vec!["Beta", "Checkout", "Dark Mode", "Onboarding", "Pro"]);
        let text = store.describe();
        assert!(text.contains("Feature: Checkout"));
        assert!(text.contains("Feature: Pro\nEnabled: true\nUnlocked: false"));
    }

    #[test]
    fn test_update_enabled_toggles_on_off_test() {
        let store = store(false);
        store.update_enabled("Onboarding", false).unwrap();
        assert!(!store.is_enabled("Onboarding"));
        assert_eq!(store.test_variation("Onboarding"), Some(Variation::disabled()));

        // Already off, nothing to do.
        store.update_enabled("Onboarding", false).unwrap();
        assert!(!store.is_enabled("Onboarding"));

        store.update_enabled("Onboarding", true).unwrap();
        assert!(store.is_enabled("Onboarding"));
    }

    #[test]
    fn test_label_of_named_variation() {
        let store = store(false);
        assert_eq!(store.label("Checkout", &Variation::b()).as_deref(), Some("Purchase"));
        assert_eq!(store.label("Checkout", &Variation::a()).as_deref(), Some("Buy now"));
        assert_eq!(store.label("Checkout", &Variation::c()), None);
        assert_eq!(store.label("Missing", &Variation::a()), None);
    }

    #[test]
    fn test_update_enabled_single_variation_flag() {
        let store = FlagStore::with_source(
            MemorySource::new().with_remote(
                r#"[{"name": "Single", "enabled": true, "test-variations": ["Dark"],
                     "test-variation-assignment": 10}]"#,
            ),
            ConfigFormat::Json,
            false,
        );
        store.refresh();
        assert_eq!(store.flag("Single").unwrap().flag_type(), FlagType::SimpleFlag);
        assert!(store.is_enabled("Single"));

        store.update_enabled("Single", false).unwrap();
        assert!(!store.is_enabled("Single"));

        store.update_enabled("Single", true).unwrap();
        assert!(store.is_enabled("Single"));
        assert_eq!(store.test_variation("Single"), Some(Variation::from("Dark")));
    }

    #[test]
    fn test_update_enabled_ignores_development_gating() {
        let store = store(false);
        assert!(!store.is_enabled("Beta"));

        store.update_enabled("Beta", true).unwrap();
        assert!(store.flag("Beta").unwrap().enabled());

        store.update_enabled("Beta", false).unwrap();
        assert!(!store.flag("Beta").unwrap().enabled());
    }

    #[test]
    fn test_update_enabled_plain_flag() {
        let store = store(false);
        store.update_enabled("Dark Mode", false).unwrap();
        assert!(!store.is_enabled("Dark Mode"));
    }

    #[test]
    fn test_update_enabled_other_types() {
        let store = store(false);
        store.update_enabled("Checkout", false).unwrap();
        assert_eq!(store.test_variation("Checkout"), Some(Variation::disabled()));
        assert_eq!(store.current_label("Checkout"), None);
        assert_eq!(store.label("Checkout", &Variation::a()), None);
    }

    #[test]
    fn test_update_test_variation() {
        let store = store(false);
        store.update_test_variation("Checkout", Variation::b()).unwrap();
        assert_eq!(store.test_variation("Checkout"), Some(Variation::b()));
        assert_eq!(store.current_label("Checkout").as_deref(), Some("Purchase"));

        store
            .update_test_variation("Dark Mode", Variation::disabled())
            .unwrap();
        assert!(!store.is_enabled("Dark Mode"));

        assert!(matches!(
            store.update_test_variation("Missing", Variation::a()),
            Err(FlagsError::UnknownFlag(_))
        ));
    }

    #[test]
    fn test_mutations_keep_order() {
        let store = store(false);
        store.update_enabled("Checkout", false).unwrap();
        let names: Vec<String> = store.all().iter().map(|f| f.name().to_string()).collect();
        assert_eq!(names[1], "Checkout");
    }

    #[test]
    fn test_unlock_persists_to_cache() {
        let source = Arc::new(MemorySource::new().with_remote(DOCUMENT));
        let store = FlagStore::with_source(Arc::clone(&source), ConfigFormat::Json, false);
        store.refresh();

        assert!(store.unlock("Pro").unwrap());
        assert!(store.is_unlocked("Pro"));

        let cached = JsonParser.parse(&source.cached_bytes().unwrap()).unwrap();
        let pro = cached.iter().find(|f| f.name() == "Pro").unwrap();
        assert_eq!(pro.unlocked(), Some(true));

        assert!(store.lock("Pro").unwrap());
        assert!(!store.is_unlocked("Pro"));
    }

    #[test]
    fn test_unlock_survives_concurrent_refresh() {
        let source = Arc::new(MemorySource::new().with_remote(DOCUMENT));
        let store = FlagStore::with_source(Arc::clone(&source), ConfigFormat::Json, false);
        store.refresh();

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for _ in 0..50 {
                    store.refresh();
                }
            });
            for _ in 0..50 {
                store.lock("Pro").unwrap();
                assert!(store.unlock("Pro").unwrap());
            }
        });
        assert!(store.is_unlocked("Pro"));
    }

    #[test]
    fn test_delete_flag() {
        let source = Arc::new(MemorySource::new().with_remote(DOCUMENT));
        let store = FlagStore::with_source(Arc::clone(&source), ConfigFormat::Json, false);
        store.refresh();

        store.delete_flag("Dark Mode").unwrap();
        assert!(store.flag("Dark Mode").is_none());
        let cached = JsonParser.parse(&source.cached_bytes().unwrap()).unwrap();
        assert!(cached.iter().all(|f| f.name() != "Dark Mode"));

        assert!(matches!(
            store.delete_flag("Dark Mode"),
            Err(FlagsError::UnknownFlag(_))
        ));
    }

    #[test]
    fn test_mark_no_longer_in_development_touches_cache_only() {
        let source = Arc::new(MemorySource::new().with_remote(DOCUMENT));
        let store = FlagStore::with_source(Arc::clone(&source), ConfigFormat::Json, true);
        store.refresh();

        store.mark_no_longer_in_development("Beta").unwrap();
        assert!(store.flag("Beta").is_some());
        let cached = JsonParser.parse(&source.cached_bytes().unwrap()).unwrap();
        assert!(cached.iter().all(|f| f.name() != "Beta"));
    }

    #[test]
    fn test_add_flag() {
        let store = store(false);
        let flag: Flag = serde_json::from_str(r#"{"name": "New", "enabled": true}"#).unwrap();
        assert!(store.add_flag(flag.clone()));
        assert!(store.is_enabled("New"));

        let mut duplicate = flag;
        duplicate.set_enabled(false);
        assert!(!store.add_flag(duplicate));
        assert!(store.is_enabled("New"));
    }

    #[test]
    fn test_add_flag_to_empty_store() {
        let store = FlagStore::with_source(MemorySource::new(), ConfigFormat::Json, false);
        let flag: Flag = serde_json::from_str(r#"{"name": "New", "enabled": true}"#).unwrap();
        assert!(store.add_flag(flag));
        assert_eq!(
            store.snapshot().map(|s| s.source),
            Some(LoadSource::Programmatic)
        );
    }

    #[test]
    fn test_clear_cache() {
        let source = Arc::new(MemorySource::new().with_remote(DOCUMENT));
        let store = FlagStore::with_source(Arc::clone(&source), ConfigFormat::Json, false);
        store.refresh();
        assert!(source.cache_exists());
        store.clear_cache().unwrap();
        assert!(!source.cache_exists());
    }
}
