//! OpenAI chat-completion records.
//!
//! `{id?, model, messages[{role, content}], temperature?, max_tokens?, top_p?, name?}`

use super::{
    AdapterOptions, ProviderAdapter, as_record, derive_title, estimate_tokens, messages,
    optional_str, pick_parameters, record_id, required_str, shots_from_turns,
};
use crate::Result;
use crate::models::{Category, GenerationSettings, Prompt, PromptStructure};
use serde_json::Value;

const PROVIDER: &str = "openai";

/// Adapter for OpenAI-style records.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiAdapter;

impl ProviderAdapter for OpenAiAdapter {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    fn convert_to_canonical(&self, record: &Value, options: &AdapterOptions) -> Result<Prompt> {
        let record = as_record(record, PROVIDER)?;
        let model = required_str(record, "model", PROVIDER)?;
        let turns = messages(record, PROVIDER)?;

        let system: Vec<&str> = turns
            .iter()
            .filter(|m| m.role == "system")
            .map(|m| m.content.as_str())
            .collect();
        let user: Vec<&str> = turns
            .iter()
            .filter(|m| m.role == "user")
            .map(|m| m.content.as_str())
            .collect();

        let title = optional_str(record, "name").map_or_else(
            || derive_title(user.first().copied().unwrap_or_default(), "Imported OpenAI prompt"),
            String::from,
        );

        let mut prompt = Prompt::new(record_id(record), &options.project_id, title, Category::General)
            .with_description(system.join("\n"))
            .with_generation_settings(GenerationSettings {
                provider: PROVIDER.to_string(),
                model: model.to_string(),
                parameters: pick_parameters(record, &["temperature", "max_tokens", "top_p"]),
                batch_settings: None,
            });

        if options.generate_metadata {
            let all_text: String = turns.iter().map(|m| m.content.as_str()).collect::<Vec<_>>().join(" ");
            prompt = prompt
                .with_tag(PROVIDER)
                .with_tag(model)
                .with_estimated_tokens(estimate_tokens(&all_text));
        }
        if options.infer_structure && !user.is_empty() {
            prompt = prompt.with_structure(PromptStructure {
                shots: shots_from_turns(&user),
                style_guide: None,
            });
        }
        Ok(prompt)
    }
}
