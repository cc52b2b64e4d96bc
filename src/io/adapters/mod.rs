//! Provider adapters.
//!
//! Each adapter is a pure conversion from one third-party record shape into
//! a canonical [`Prompt`]. Unknown fields are ignored. A record missing the
//! fields an adapter needs is rejected with an [`Error::IntegrityViolation`]
//! carrying `missing_required_field` or `data_type_violation`.

mod anthropic;
mod huggingface;
mod openai;

pub use anthropic::AnthropicAdapter;
pub use huggingface::HuggingFaceAdapter;
pub use openai::OpenAiAdapter;

use crate::io::fields::{get_path, set_path};
use crate::io::formats::ImportSourceFormat;
use crate::models::{Prompt, Shot, is_valid_prompt_id, mint_prompt_id};
use crate::{Error, Result};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Project assigned to converted records that carry none.
pub const DEFAULT_PROJECT_ID: &str = "imported";

/// Maximum characters of message text used for a derived title.
const TITLE_MAX_CHARS: usize = 60;

/// Options passed to every adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterOptions {
    /// Derive tags and token estimates from the record content.
    pub generate_metadata: bool,
    /// Turn user turns into a shot breakdown.
    pub infer_structure: bool,
    /// Project for converted prompts.
    pub project_id: String,
}

impl Default for AdapterOptions {
    fn default() -> Self {
        Self {
            generate_metadata: true,
            infer_structure: true,
            project_id: DEFAULT_PROJECT_ID.to_string(),
        }
    }
}

/// Converts provider records into canonical prompts.
pub trait ProviderAdapter: Send + Sync {
    /// Provider name recorded in generation settings.
    fn provider(&self) -> &'static str;

    /// Converts one record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IntegrityViolation`] if the record lacks the fields
    /// this provider requires or carries them with the wrong type.
    fn convert_to_canonical(&self, record: &Value, options: &AdapterOptions) -> Result<Prompt>;
}

static OPENAI: OpenAiAdapter = OpenAiAdapter;
static ANTHROPIC: AnthropicAdapter = AnthropicAdapter;
static HUGGINGFACE: HuggingFaceAdapter = HuggingFaceAdapter;

/// Returns the adapter for a provider format.
#[must_use]
pub fn adapter_for(format: ImportSourceFormat) -> Option<&'static dyn ProviderAdapter> {
    match format {
        ImportSourceFormat::OpenAi => Some(&OPENAI),
        ImportSourceFormat::Anthropic => Some(&ANTHROPIC),
        ImportSourceFormat::HuggingFace => Some(&HUGGINGFACE),
        ImportSourceFormat::Native | ImportSourceFormat::Csv => None,
    }
}

/// Brings a raw record into canonical shape.
///
/// Provider records go through their adapter; native and CSV records are
/// already canonical. Entries in `field_mapping` (target path to source
/// path) then overwrite the result wherever the source path is present.
///
/// # Errors
///
/// Returns the adapter's error if conversion fails.
pub fn normalize_record(
    raw: &Value,
    format: ImportSourceFormat,
    field_mapping: &BTreeMap<String, String>,
    options: &AdapterOptions,
) -> Result<Value> {
    let mut normalized = match adapter_for(format) {
        Some(adapter) => {
            let prompt = adapter.convert_to_canonical(raw, options)?;
            serde_json::to_value(prompt).map_err(|e| Error::OperationFailed {
                operation: "normalize_record".to_string(),
                cause: e.to_string(),
            })?
        },
        None => raw.clone(),
    };

    for (target, source) in field_mapping {
        if let Some(value) = get_path(raw, source) {
            set_path(&mut normalized, target, value.clone());
        }
    }
    Ok(normalized)
}

pub(crate) fn missing(field: &str, provider: &str) -> Error {
    Error::IntegrityViolation {
        code: "missing_required_field".to_string(),
        message: format!("{provider} record is missing '{field}'"),
    }
}

pub(crate) fn wrong_type(field: &str, expected: &str, provider: &str) -> Error {
    Error::IntegrityViolation {
        code: "data_type_violation".to_string(),
        message: format!("{provider} record field '{field}' must be {expected}"),
    }
}

/// Requires `record` to be an object.
pub(crate) fn as_record<'a>(record: &'a Value, provider: &str) -> Result<&'a Map<String, Value>> {
    record
        .as_object()
        .ok_or_else(|| wrong_type("record", "an object", provider))
}

/// Reads a required string field.
pub(crate) fn required_str<'a>(
    record: &'a Map<String, Value>,
    field: &str,
    provider: &str,
) -> Result<&'a str> {
    match record.get(field) {
        None | Some(Value::Null) => Err(missing(field, provider)),
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s),
        Some(Value::String(_)) => Err(missing(field, provider)),
        Some(_) => Err(wrong_type(field, "a string", provider)),
    }
}

/// Reads an optional string field, ignoring other types.
pub(crate) fn optional_str<'a>(record: &'a Map<String, Value>, field: &str) -> Option<&'a str> {
    record
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

/// One chat turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Message {
    pub role: String,
    pub content: String,
}

/// Reads a `messages` array.
///
/// Content may be a string or a list of parts with `text` fields.
pub(crate) fn messages(record: &Map<String, Value>, provider: &str) -> Result<Vec<Message>> {
    let items = match record.get("messages") {
        None | Some(Value::Null) => return Err(missing("messages", provider)),
        Some(Value::Array(items)) => items,
        Some(_) => return Err(wrong_type("messages", "an array", provider)),
    };

    items
        .iter()
        .map(|item| {
            let role = item
                .get("role")
                .and_then(Value::as_str)
                .ok_or_else(|| wrong_type("messages[].role", "a string", provider))?;
            Ok(Message {
                role: role.to_lowercase(),
                content: content_text(item.get("content")),
            })
        })
        .collect()
}

fn content_text(content: Option<&Value>) -> String {
    match content {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|p| p.get("text").and_then(Value::as_str).or_else(|| p.as_str()))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

/// Uses the record's `id` when it is a valid prompt id, otherwise mints one.
pub(crate) fn record_id(record: &Map<String, Value>) -> String {
    optional_str(record, "id")
        .filter(|id| is_valid_prompt_id(id))
        .map_or_else(mint_prompt_id, String::from)
}

/// Derives a title from free text: first line, truncated on a char boundary.
pub(crate) fn derive_title(text: &str, fallback: &str) -> String {
    let first_line = text.lines().map(str::trim).find(|l| !l.is_empty());
    match first_line {
        Some(line) if line.chars().count() > TITLE_MAX_CHARS => {
            let truncated: String = line.chars().take(TITLE_MAX_CHARS).collect();
            format!("{}...", truncated.trim_end())
        },
        Some(line) => line.to_string(),
        None => fallback.to_string(),
    }
}

/// Rough token estimate: one token per four characters, rounded up.
pub(crate) fn estimate_tokens(text: &str) -> u64 {
    let chars = u64::try_from(text.chars().count()).unwrap_or(u64::MAX);
    chars.div_ceil(4)
}

/// Builds shots from the user turns of a conversation.
pub(crate) fn shots_from_turns(turns: &[&str]) -> Vec<Shot> {
    turns
        .iter()
        .filter(|t| !t.trim().is_empty())
        .enumerate()
        .map(|(index, text)| Shot {
            index: u32::try_from(index).unwrap_or(u32::MAX),
            description: (*text).to_string(),
            duration_seconds: None,
            camera: None,
        })
        .collect()
}

/// Copies the listed numeric/string generation parameters that are present.
pub(crate) fn pick_parameters(record: &Map<String, Value>, names: &[&str]) -> Map<String, Value> {
    names
        .iter()
        .filter_map(|name| {
            record
                .get(*name)
                .filter(|v| !v.is_null())
                .map(|v| ((*name).to_string(), v.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_adapter_lookup() {
        assert_eq!(
            adapter_for(ImportSourceFormat::OpenAi).map(|a| a.provider()),
            Some("openai")
        );
        assert!(adapter_for(ImportSourceFormat::Native).is_none());
    }

    #[test]
    fn test_normalize_native_applies_mapping() {
        let raw = json!({"id": "p1", "metadata": {"title": "T"}, "headline": "Better title"});
        let mapping = BTreeMap::from([("metadata.title".to_string(), "headline".to_string())]);
        let normalized = normalize_record(
            &raw,
            ImportSourceFormat::Native,
            &mapping,
            &AdapterOptions::default(),
        )
        .unwrap();
        assert_eq!(normalized["metadata"]["title"], "Better title");
    }

    #[test]
    fn test_mapping_overrides_adapter_defaults() {
        let raw = json!({
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": "Wide shot of a harbor"}],
            "meta": {"project": "harbor-film"}
        });
        let mapping = BTreeMap::from([("projectId".to_string(), "meta.project".to_string())]);
        let normalized = normalize_record(
            &raw,
            ImportSourceFormat::OpenAi,
            &mapping,
            &AdapterOptions::default(),
        )
        .unwrap();
        assert_eq!(normalized["projectId"], "harbor-film");
        assert_eq!(normalized["generationSettings"]["provider"], "openai");
    }

    #[test]
    fn test_derive_title() {
        assert_eq!(derive_title("\n  Hello there \nsecond", "x"), "Hello there");
        assert_eq!(derive_title("", "fallback"), "fallback");
        let long = "a".repeat(100);
        assert_eq!(derive_title(&long, "x").chars().count(), TITLE_MAX_CHARS + 3);
    }

    #[test]
    fn test_estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn test_record_id_mints_for_invalid() {
        let record = json!({"id": "bad id!"});
        let id = record_id(record.as_object().unwrap());
        assert!(id.starts_with("prompt-"));
    }
}
