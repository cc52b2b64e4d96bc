//! Anthropic messages records.
//!
//! `{id?, model, system?, messages[{role, content}], max_tokens?, temperature?, title?}`

use super::{
    AdapterOptions, ProviderAdapter, as_record, derive_title, estimate_tokens, messages,
    optional_str, pick_parameters, record_id, required_str, shots_from_turns,
};
use crate::Result;
use crate::models::{Category, GenerationSettings, Prompt, PromptStructure};
use serde_json::Value;

const PROVIDER: &str = "anthropic";

/// Adapter for Anthropic-style records.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnthropicAdapter;

impl ProviderAdapter for AnthropicAdapter {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    fn convert_to_canonical(&self, record: &Value, options: &AdapterOptions) -> Result<Prompt> {
        let record = as_record(record, PROVIDER)?;
        let model = required_str(record, "model", PROVIDER)?;
        let turns = messages(record, PROVIDER)?;
        let system = optional_str(record, "system").unwrap_or_default();

        let user: Vec<&str> = turns
            .iter()
            .filter(|m| m.role == "user")
            .map(|m| m.content.as_str())
            .collect();

        let title = optional_str(record, "title").map_or_else(
            || derive_title(user.first().copied().unwrap_or_default(), "Imported Anthropic prompt"),
            String::from,
        );

        let mut prompt = Prompt::new(record_id(record), &options.project_id, title, Category::General)
            .with_description(system)
            .with_generation_settings(GenerationSettings {
                provider: PROVIDER.to_string(),
                model: model.to_string(),
                parameters: pick_parameters(record, &["max_tokens", "temperature"]),
                batch_settings: None,
            });

        if options.generate_metadata {
            let mut all_text = system.to_string();
            for turn in &turns {
                all_text.push(' ');
                all_text.push_str(&turn.content);
            }
            prompt = prompt
                .with_tag(PROVIDER)
                .with_tag(model)
                .with_estimated_tokens(estimate_tokens(all_text.trim()));
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_converts_messages_record() {
        let record = json!({
            "model": "claude-sonnet",
            "system": "Cinematic storyboard assistant",
            "title": "Night market",
            "messages": [
                {"role": "user", "content": "Tracking shot through a night market"},
                {"role": "assistant", "content": "Sure."}
            ],
            "max_tokens": 1024
        });

        let prompt = AnthropicAdapter
            .convert_to_canonical(&record, &AdapterOptions::default())
            .unwrap();

        assert_eq!(prompt.metadata.title, "Night market");
        assert_eq!(prompt.metadata.description, "Cinematic storyboard assistant");
        assert_eq!(prompt.provider(), Some("anthropic"));
        assert_eq!(prompt.prompt_structure.unwrap().shots.len(), 1);
        assert_eq!(
            prompt.generation_settings.unwrap().parameters["max_tokens"],
            json!(1024)
        );
    }

    #[test]
    fn test_bad_role_type_is_rejected() {
        let record = json!({"model": "m", "messages": [{"role": 3, "content": "x"}]});
        let err = AnthropicAdapter
            .convert_to_canonical(&record, &AdapterOptions::default())
            .unwrap_err();
        assert_eq!(err.code(), "data_type_violation");
    }
}
