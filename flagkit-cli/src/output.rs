use clap::ValueEnum;
use flagkit_model::Flag;
use serde::Serialize;

use crate::Result;

const UNCATEGORIZED: &str = "Uncategorized";

/// Output format for the list and evaluate commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// What one flag evaluates to on this machine
#[derive(Debug, Serialize)]
pub struct Evaluation {
    pub name: String,
    #[serde(rename = "type")]
    pub flag_type: String,
    pub section: Option<String>,
    pub enabled: bool,
    pub variation: String,
    pub label: Option<String>,
    pub draw: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unlocked: Option<bool>,
}

impl Evaluation {
    pub fn of(flag: &Flag, development_mode: bool) -> Self {
        Self {
            name: flag.name().to_string(),
            flag_type: flag.flag_type().to_string(),
            section: flag.section().map(str::to_string),
            enabled: flag.is_enabled(development_mode),
            variation: flag.test_variation().to_string(),
            label: flag.current_label().map(str::to_string),
            draw: flag.draw(),
            unlocked: flag
                .unlocked()
                .map(|_| flag.is_unlocked(development_mode)),
        }
    }
}

pub fn render_list(evaluations: &[Evaluation], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(evaluations)?),
        OutputFormat::Text => {
            let mut out = String::new();
            let mut current_section: Option<&str> = None;
            for (i, e) in evaluations.iter().enumerate() {
                let section = e.section.as_deref().unwrap_or(UNCATEGORIZED);
                if i == 0 || current_section != Some(section) {
                    if i > 0 {
                        out.push('\n');
                    }
                    out.push_str(&format!("[{section}]\n"));
                    current_section = Some(section);
                }
                let state = if e.enabled { "on" } else { "off" };
                out.push_str(&format!(
                    "  {:<32} {:<26} {:<4} {}\n",
                    e.name, e.flag_type, state, e.variation
                ));
            }
            Ok(out)
        }
    }
}

pub fn render_evaluation(evaluation: &Evaluation, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(evaluation)?),
        OutputFormat::Text => {
            let mut lines = vec![
                format!("Feature: {}", evaluation.name),
                format!("Type: {}", evaluation.flag_type),
                format!("Enabled: {}", evaluation.enabled),
                format!("Variation: {}", evaluation.variation),
                format!("Assignment: {:.2}%", evaluation.draw),
            ];
            if let Some(label) = &evaluation.label {
                lines.push(format!("Label: {label}"));
            }
            if let Some(unlocked) = evaluation.unlocked {
                lines.push(format!("Unlocked: {unlocked}"));
            }
            Ok(lines.join("\n"))
        }
    }
}
