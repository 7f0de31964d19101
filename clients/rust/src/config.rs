use std::env;
use std::path::{Path, PathBuf};

use flagkit_model::ConfigFormat;

use crate::source::FileSource;

const FLAGS_DIR_ENV: &str = "FLAGKIT_DIR";
const FLAGS_FORMAT_ENV: &str = "FLAGKIT_FORMAT";
const FLAGS_DEVELOPMENT_ENV: &str = "FLAGKIT_DEVELOPMENT";
const DEFAULT_SYSTEM_DIR: &str = "/etc/flagkit";
const DEFAULT_LOCAL_DIR: &str = "flagkit";
const DOCUMENT_STEM: &str = "Features";

/// Resolve the flags directory: `FLAGKIT_DIR` env var, then `/etc/flagkit`
/// if it exists, otherwise `flagkit/`.
pub fn resolve_flags_dir() -> PathBuf {
    if let Ok(dir) = env::var(FLAGS_DIR_ENV) {
        return PathBuf::from(dir);
    }
    let system = Path::new(DEFAULT_SYSTEM_DIR);
    if system.is_dir() {
        return system.to_path_buf();
    }
    PathBuf::from(DEFAULT_LOCAL_DIR)
}

/// Where flag documents live and how they are read.
#[derive(Debug, Clone, PartialEq)]
pub struct FlagsConfig {
    pub remote_path: Option<PathBuf>,
    pub fallback_path: Option<PathBuf>,
    pub bundled_path: Option<PathBuf>,
    pub cache_path: PathBuf,
    pub format: ConfigFormat,
    pub development_mode: bool,
}

impl FlagsConfig {
    /// Build from the environment, see [`resolve_flags_dir`].
    pub fn from_env() -> Self {
        let format = env::var(FLAGS_FORMAT_ENV)
            .ok()
            .and_then(|name| {
                let format = ConfigFormat::from_name(&name);
                if format.is_none() {
                    tracing::warn!(format = %name, "unknown {FLAGS_FORMAT_ENV}, using json");
                }
                format
            })
            .unwrap_or_default();
        let development_mode = match env::var(FLAGS_DEVELOPMENT_ENV) {
            Ok(value) => matches!(value.to_ascii_lowercase().as_str(), "1" | "true"),
            Err(_) => cfg!(debug_assertions),
        };

        Self::from_directory(&resolve_flags_dir(), format).with_development_mode(development_mode)
    }

    /// Expects `{dir}/remote/`, `{dir}/fallback/`, `{dir}/bundled/` and
    /// `{dir}/cache/`, each holding `Features.{ext}`. Missing files are fine.
    pub fn from_directory(dir: &Path, format: ConfigFormat) -> Self {
        let file = |sub: &str| dir.join(sub).join(format!("{DOCUMENT_STEM}.{}", format.extension()));
        Self {
            remote_path: Some(file("remote")),
            fallback_path: Some(file("fallback")),
            bundled_path: Some(file("bundled")),
            cache_path: file("cache"),
            format,
            development_mode: cfg!(debug_assertions),
        }
    }

    pub fn with_remote_path(mut self, path: Option<PathBuf>) -> Self {
        self.remote_path = path;
        self
    }

    pub fn with_fallback_path(mut self, path: Option<PathBuf>) -> Self {
        self.fallback_path = path;
        self
    }

    pub fn with_bundled_path(mut self, path: Option<PathBuf>) -> Self {
        self.bundled_path = path;
        self
    }

    pub fn with_cache_path(mut self, path: PathBuf) -> Self {
        self.cache_path = path;
        self
    }

    pub fn with_format(mut self, format: ConfigFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_development_mode(mut self, development_mode: bool) -> Self {
        self.development_mode = development_mode;
        self
    }

    pub fn file_source(&self) -> FileSource {
        FileSource {
            remote: self.remote_path.clone(),
            fallback: self.fallback_path.clone(),
            bundled: self.bundled_path.clone(),
            cache: self.cache_path.clone(),
        }
    }
}
