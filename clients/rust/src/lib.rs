//! Flags client: loads flag documents, keeps devices in their test buckets
//! across refreshes, and answers flag queries.

pub mod config;
pub mod snapshot;
pub mod source;
pub mod store;
pub mod testing;

pub use config::{FlagsConfig, resolve_flags_dir};
pub use flagkit_model::{ConfigFormat, Flag, FlagType, ModelError, TestKind, Variation};
pub use snapshot::{LoadSource, Snapshot};
pub use source::{ByteSource, FileSource, MemorySource};
pub use store::FlagStore;

use std::sync::OnceLock;

use thiserror::Error;

static GLOBAL_FLAGS: OnceLock<FlagStore> = OnceLock::new();

#[derive(Debug, Error)]
pub enum FlagsError {
    #[error("Unknown flag: {0}")]
    UnknownFlag(String),

    #[error("Unknown variation '{variation}' for flag '{flag}'")]
    UnknownVariation { flag: String, variation: String },

    #[error("Cache error: {0}")]
    Cache(#[from] std::io::Error),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Flags already initialized")]
    AlreadyInitialized,
}

pub type Result<T> = std::result::Result<T, FlagsError>;

/// Initialize global flags using fallback chain: `FLAGKIT_DIR` env var,
/// then `/etc/flagkit` if it exists, otherwise `flagkit/`.
pub fn init() -> Result<()> {
    init_with(FlagsConfig::from_env())
}

/// Initialize global flags from an explicit configuration and run the load
/// chain once.
pub fn init_with(config: FlagsConfig) -> Result<()> {
    if GLOBAL_FLAGS.get().is_some() {
        return Err(FlagsError::AlreadyInitialized);
    }
    let store = FlagStore::new(&config);
    store.refresh();
    GLOBAL_FLAGS
        .set(store)
        .map_err(|_| FlagsError::AlreadyInitialized)?;
    Ok(())
}

/// The global store, `None` before [`init`].
pub fn flags() -> Option<&'static FlagStore> {
    GLOBAL_FLAGS.get()
}

/// `false` before [`init`] or for an unknown flag.
pub fn is_enabled(name: &str) -> bool {
    flags().is_some_and(|store| store.is_enabled(name))
}

pub fn is_test_variation(name: &str, variation: &Variation) -> bool {
    flags().is_some_and(|store| store.is_test_variation(name, variation))
}

pub fn test_variation(name: &str) -> Option<Variation> {
    flags().and_then(|store| store.test_variation(name))
}

pub fn label(name: &str, variation: &Variation) -> Option<String> {
    flags().and_then(|store| store.label(name, variation))
}

/// Label of the variation this device is in.
pub fn current_label(name: &str) -> Option<String> {
    flags().and_then(|store| store.current_label(name))
}

pub fn is_unlocked(name: &str) -> bool {
    flags().is_some_and(|store| store.is_unlocked(name))
}

/// Re-run the load chain on the global store.
pub fn refresh() -> Option<LoadSource> {
    flags().and_then(FlagStore::refresh)
}
