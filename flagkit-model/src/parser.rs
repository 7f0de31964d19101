//! Flag document codecs.

use std::io::Cursor;
use std::path::Path;

use serde_json::Value;

use crate::flag::Flag;
use crate::record::FlagRecord;
use crate::{ModelError, ModelResult};

/// Turns document bytes into flags and back.
///
/// `parse` returns `None` for anything it cannot read; the caller moves on to
/// the next source.
pub trait Parser: Send + Sync {
    fn parse(&self, bytes: &[u8]) -> Option<Vec<Flag>>;
    fn encode(&self, flags: &[Flag]) -> ModelResult<Vec<u8>>;
}

/// Reads a bare JSON array of records, or an object holding it under
/// `features`. Writes a bare array.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonParser;

impl JsonParser {
    pub fn parse_value(&self, value: Value) -> ModelResult<Vec<Flag>> {
        let records = match value {
            Value::Object(mut map) => map.remove("features").ok_or_else(|| {
                ModelError::Schema("object document has no 'features' key".to_string())
            })?,
            other => other,
        };
        Ok(serde_json::from_value(records)?)
    }
}

impl Parser for JsonParser {
    fn parse(&self, bytes: &[u8]) -> Option<Vec<Flag>> {
        let parsed = serde_json::from_slice::<Value>(bytes)
            .map_err(ModelError::from)
            .and_then(|value| self.parse_value(value));
        match parsed {
            Ok(flags) => Some(flags),
            Err(e) => {
                tracing::warn!(error = %e, "could not parse JSON flag document");
                None
            }
        }
    }

    fn encode(&self, flags: &[Flag]) -> ModelResult<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(flags)?)
    }
}

/// Reads an XML or binary property list holding an array of dictionaries.
/// Writes XML.
///
/// Documents are bridged through the JSON record shape. Property lists have
/// no null, so a missing label is written as an empty string and an empty
/// label reads back as missing.
#[derive(Debug, Clone, Copy, Default)]
pub struct PropertyListParser;

impl PropertyListParser {
    pub fn parse_value(&self, value: plist::Value) -> ModelResult<Vec<Flag>> {
        JsonParser.parse_value(plist_to_json(value))
    }
}

impl Parser for PropertyListParser {
    fn parse(&self, bytes: &[u8]) -> Option<Vec<Flag>> {
        let parsed = plist::Value::from_reader(Cursor::new(bytes))
            .map_err(ModelError::from)
            .and_then(|value| self.parse_value(value));
        match parsed {
            Ok(flags) => Some(flags),
            Err(e) => {
                tracing::warn!(error = %e, "could not parse property list flag document");
                None
            }
        }
    }

    fn encode(&self, flags: &[Flag]) -> ModelResult<Vec<u8>> {
        let records: Vec<FlagRecord> = flags.iter().map(FlagRecord::from).collect();
        let value = json_to_plist(serde_json::to_value(records)?);
        let mut out = Cursor::new(Vec::new());
        value.to_writer_xml(&mut out)?;
        Ok(out.into_inner())
    }
}

fn plist_to_json(value: plist::Value) -> Value {
    match value {
        plist::Value::Array(items) => {
            Value::Array(items.into_iter().map(plist_to_json).collect())
        }
        plist::Value::Dictionary(dict) => Value::Object(
            dict.into_iter()
                .map(|(key, value)| match (key.as_str(), value) {
                    ("labels", plist::Value::Array(labels)) => {
                        let labels = labels.into_iter().map(plist_label_to_json).collect();
                        (key, Value::Array(labels))
                    }
                    (_, value) => (key, plist_to_json(value)),
                })
                .collect(),
        ),
        plist::Value::Boolean(b) => Value::Bool(b),
        plist::Value::Integer(i) => match (i.as_signed(), i.as_unsigned()) {
            (Some(n), _) => Value::from(n),
            (None, Some(n)) => Value::from(n),
            (None, None) => Value::Null,
        },
        plist::Value::Real(f) => Value::from(f),
        plist::Value::String(s) => Value::String(s),
        _ => Value::Null,
    }
}

/// An empty label string stands in for a missing label.
fn plist_label_to_json(value: plist::Value) -> Value {
    match value {
        plist::Value::String(s) if s.is_empty() => Value::Null,
        other => plist_to_json(other),
    }
}

fn json_to_plist(value: Value) -> plist::Value {
    match value {
        Value::Array(items) => {
            plist::Value::Array(items.into_iter().map(json_to_plist).collect())
        }
        Value::Object(map) => {
            let mut dict = plist::Dictionary::new();
            for (key, value) in map {
                if !value.is_null() {
                    dict.insert(key, json_to_plist(value));
                }
            }
            plist::Value::Dictionary(dict)
        }
        Value::Bool(b) => plist::Value::Boolean(b),
        Value::Number(n) => match (n.as_i64(), n.as_u64()) {
            (Some(i), _) => plist::Value::Integer(i.into()),
            (None, Some(u)) => plist::Value::Integer(u.into()),
            _ => plist::Value::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => plist::Value::String(s),
        Value::Null => plist::Value::String(String::new()),
    }
}

/// On-disk encoding of a flag document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfigFormat {
    #[default]
    Json,
    Plist,
}

static JSON_PARSER: JsonParser = JsonParser;
static PLIST_PARSER: PropertyListParser = PropertyListParser;

impl ConfigFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ConfigFormat::Json => "json",
            ConfigFormat::Plist => "plist",
        }
    }

    pub fn from_name(name: &str) -> Option<ConfigFormat> {
        match name.to_ascii_lowercase().as_str() {
            "json" => Some(ConfigFormat::Json),
            "plist" => Some(ConfigFormat::Plist),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<ConfigFormat> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(ConfigFormat::from_name)
    }

    pub fn parser(&self) -> &'static dyn Parser {
        match self {
            ConfigFormat::Json => &JSON_PARSER,
            ConfigFormat::Plist => &PLIST_PARSER,
        }
    }
}
