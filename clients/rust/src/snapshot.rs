use chrono::{DateTime, Utc};
use flagkit_model::Flag;

/// Which tier of the load chain produced a configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    Remote,
    Cache,
    LocalFallback,
    Bundled,
    /// Built from flags added in code before anything was loaded.
    Programmatic,
}

/// An immutable, published flag configuration.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub flags: Vec<Flag>,
    pub source: LoadSource,
    pub loaded_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(flags: Vec<Flag>, source: LoadSource) -> Self {
        Self {
            flags,
            source,
            loaded_at: Utc::now(),
        }
    }

    /// Same provenance, different flags.
    pub fn with_flags(&self, flags: Vec<Flag>) -> Self {
        Self {
            flags,
            source: self.source,
            loaded_at: self.loaded_at,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Flag> {
        self.flags.iter().find(|flag| flag.name() == name)
    }
}
