//! `HuggingFace` inference records.
//!
//! `{id?, model_id|model, inputs|prompt, parameters?, task?, tags[]?}`

use super::{
    AdapterOptions, ProviderAdapter, as_record, derive_title, estimate_tokens, missing,
    optional_str, record_id, shots_from_turns, wrong_type,
};
use crate::Result;
use crate::models::{Category, GenerationSettings, Prompt, PromptStructure};
use serde_json::{Map, Value};

const PROVIDER: &str = "huggingface";

/// Adapter for `HuggingFace`-style records.
#[derive(Debug, Clone, Copy, Default)]
pub struct HuggingFaceAdapter;

impl ProviderAdapter for HuggingFaceAdapter {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    fn convert_to_canonical(&self, record: &Value, options: &AdapterOptions) -> Result<Prompt> {
        let record = as_record(record, PROVIDER)?;
        let model = optional_str(record, "model_id")
            .or_else(|| optional_str(record, "model"))
            .ok_or_else(|| missing("model_id", PROVIDER))?;
        let inputs = match record.get("inputs").or_else(|| record.get("prompt")) {
            Some(Value::String(s)) if !s.trim().is_empty() => s.as_str(),
            Some(Value::String(_) | Value::Null) | None => return Err(missing("inputs", PROVIDER)),
            Some(_) => return Err(wrong_type("inputs", "a string", PROVIDER)),
        };
        let parameters = match record.get("parameters") {
            Some(Value::Object(map)) => map.clone(),
            Some(Value::Null) | None => Map::new(),
            Some(_) => return Err(wrong_type("parameters", "an object", PROVIDER)),
        };

        let mut prompt = Prompt::new(
            record_id(record),
            &options.project_id,
            derive_title(inputs, "Imported HuggingFace prompt"),
            Category::General,
        )
        .with_description(inputs)
        .with_generation_settings(GenerationSettings {
            provider: PROVIDER.to_string(),
            model: model.to_string(),
            parameters,
            batch_settings: None,
        });

        if let Some(Value::Array(tags)) = record.get("tags") {
            for tag in tags.iter().filter_map(Value::as_str) {
                prompt = prompt.with_tag(tag);
            }
        }
        if options.generate_metadata {
            prompt = prompt
                .with_tag(PROVIDER)
                .with_estimated_tokens(estimate_tokens(inputs));
            if let Some(task) = optional_str(record, "task") {
                prompt = prompt.with_tag(task);
            }
        }
        if options.infer_structure {
            prompt = prompt.with_structure(PromptStructure {
                shots: shots_from_turns(&[inputs]),
                style_guide: None,
            });
        }
        Ok(prompt)
    }
}
