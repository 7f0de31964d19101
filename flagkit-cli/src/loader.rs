use std::fs;
use std::path::Path;

use clap::ValueEnum;
use flagkit_model::{ConfigFormat, DocumentValidator, Flag, JsonParser};

use crate::{AppError, Result};

/// Document encoding, when it can't be told from the extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DocumentFormat {
    Json,
    Plist,
}

impl From<DocumentFormat> for ConfigFormat {
    fn from(format: DocumentFormat) -> Self {
        match format {
            DocumentFormat::Json => ConfigFormat::Json,
            DocumentFormat::Plist => ConfigFormat::Plist,
        }
    }
}

/// An explicit `--format` wins, otherwise the file extension decides.
pub fn resolve_format(path: &Path, explicit: Option<DocumentFormat>) -> Result<ConfigFormat> {
    if let Some(format) = explicit {
        return Ok(format.into());
    }
    ConfigFormat::from_path(path).ok_or_else(|| {
        AppError::Validation(format!(
            "Cannot tell the format of {}: expected a .json or .plist file, or pass --format",
            path.display()
        ))
    })
}

pub fn read_flags(path: &Path, format: ConfigFormat) -> Result<Vec<Flag>> {
    let bytes = fs::read(path)?;
    format.parser().parse(&bytes).ok_or_else(|| {
        AppError::Validation(format!(
            "Could not parse {} as a {} flag document",
            path.display(),
            format.extension()
        ))
    })
}

/// Strict check of a document. JSON documents must also satisfy the schema.
/// Returns the number of flags.
pub fn validate_document(path: &Path, format: ConfigFormat) -> Result<usize> {
    let flags = match format {
        ConfigFormat::Json => {
            let document = DocumentValidator::new()?.validate_file(path)?;
            JsonParser.parse_value(document)?
        }
        ConfigFormat::Plist => read_flags(path, format)?,
    };

    let mut seen = std::collections::HashSet::new();
    for flag in &flags {
        if !seen.insert(flag.name()) {
            return Err(AppError::Validation(format!(
                "Duplicate flag '{}' in {}",
                flag.name(),
                path.display()
            )));
        }
    }
    Ok(flags.len())
}

pub fn write_flags(path: &Path, format: ConfigFormat, flags: &[Flag]) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let bytes = format.parser().encode(flags)?;
    fs::write(path, bytes)?;
    Ok(())
}
