//! Flag model for flagkit
//!
//! Everything here is pure: decoding flag documents, bucketing a device into
//! a test variation, and reconciling a fresh configuration with the cached
//! one. Loading and caching live in the `flagkit` client crate.

pub mod assignment;
pub mod flag;
pub mod flag_type;
pub mod parser;
pub mod percentage;
pub mod reconcile;
pub mod record;
pub mod schema;
pub mod variation;

pub use assignment::{Assignment, assign};
pub use flag::Flag;
pub use flag_type::{FlagType, TestKind};
pub use parser::{ConfigFormat, JsonParser, Parser, PropertyListParser};
pub use percentage::Percentage;
pub use reconcile::reconcile;
pub use record::FlagRecord;
pub use schema::DocumentValidator;
pub use variation::Variation;

/// Result type for model operations
pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Property list error: {0}")]
    Plist(#[from] plist::Error),
}
