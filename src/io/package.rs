//! Native JSON export package.

use crate::io::validation::check_record;
use crate::models::{Prompt, is_valid_version};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

/// Version of the package wire format.
pub const PACKAGE_FORMAT_VERSION: &str = "1.0.0";

/// Self-describing export envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportPackage {
    /// Export identifier.
    pub export_id: String,
    /// Package format version.
    pub version: String,
    /// Export-level metadata.
    pub metadata: PackageMetadata,
    /// Prompt records after field selection.
    pub prompts: Vec<Value>,
    /// Features and providers a consumer must understand.
    pub compatibility: Compatibility,
}

/// Export-level metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageMetadata {
    /// Export title.
    pub title: String,
    /// Requester identity.
    pub exported_by: String,
    /// RFC 3339 export time.
    pub exported_at: String,
    /// Number of prompts in the package.
    pub total_prompts: usize,
    /// Distinct categories, sorted.
    pub categories: Vec<String>,
}

/// Compatibility block.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Compatibility {
    /// Package format version.
    pub format_version: String,
    /// Optional prompt sections the package uses.
    pub required_features: Vec<String>,
    /// Providers referenced by generation settings.
    pub supported_providers: Vec<String>,
}

impl Compatibility {
    /// Derives the compatibility block from the prompts being exported.
    #[must_use]
    pub fn for_prompts(prompts: &[Prompt]) -> Self {
        let mut features = BTreeSet::new();
        let mut providers = BTreeSet::new();

        for prompt in prompts {
            if prompt.prompt_structure.is_some() {
                features.insert("prompt_structure");
            }
            if let Some(settings) = &prompt.generation_settings {
                features.insert("generation_settings");
                if settings.batch_settings.is_some() {
                    features.insert("batch_settings");
                }
            }
            if prompt.usage.is_some() {
                features.insert("usage");
            }
            if let Some(provider) = prompt.provider() {
                providers.insert(provider.to_lowercase());
            }
        }

        Self {
            format_version: PACKAGE_FORMAT_VERSION.to_string(),
            required_features: features.into_iter().map(String::from).collect(),
            supported_providers: providers.into_iter().collect(),
        }
    }
}

/// Returns the distinct category names of `prompts`, sorted.
#[must_use]
pub fn distinct_categories(prompts: &[Prompt]) -> Vec<String> {
    prompts
        .iter()
        .map(|p| p.metadata.category.as_str())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(String::from)
        .collect()
}

impl ExportPackage {
    /// Validates the envelope before it is serialized.
    ///
    /// Records may be reshaped by field selection, so only the envelope and
    /// the presence of a string `id` per record are checked.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IntegrityViolation`] with code `invalid_package`.
    pub fn validate(&self) -> Result<()> {
        let fail = |message: String| {
            Err(Error::IntegrityViolation {
                code: "invalid_package".to_string(),
                message,
            })
        };

        if self.export_id.trim().is_empty() {
            return fail("exportId is empty".to_string());
        }
        if !is_valid_version(&self.version) {
            return fail(format!("version '{}' is not a semantic version", self.version));
        }
        if self.metadata.title.trim().is_empty() {
            return fail("metadata.title is empty".to_string());
        }
        if chrono::DateTime::parse_from_rfc3339(&self.metadata.exported_at).is_err() {
            return fail(format!(
                "metadata.exportedAt '{}' is not RFC 3339",
                self.metadata.exported_at
            ));
        }
        if self.metadata.total_prompts != self.prompts.len() {
            return fail(format!(
                "metadata.totalPrompts is {} but the package holds {} prompts",
                self.metadata.total_prompts,
                self.prompts.len()
            ));
        }
        if let Some(index) = self
            .prompts
            .iter()
            .position(|p| !p.get("id").is_some_and(Value::is_string))
        {
            return fail(format!("prompt at index {index} has no string id"));
        }
        Ok(())
    }

    /// Checks every record against the prompt schema.
    ///
    /// Only meaningful when no field selection reshaped the records.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IntegrityViolation`] with code `invalid_package` for
    /// the first record with a finding.
    pub fn validate_prompts(&self) -> Result<()> {
        self.prompts
            .iter()
            .enumerate()
            .try_for_each(|(index, record)| validate_record(index, record))
    }
}

/// Checks one package record against the prompt schema.
///
/// # Errors
///
/// Returns [`Error::IntegrityViolation`] with code `invalid_package` when the
/// record has any finding.
pub fn validate_record(index: usize, record: &Value) -> Result<()> {
    match check_record(record, Some(index)).into_iter().next() {
        None => Ok(()),
        Some(finding) => Err(Error::IntegrityViolation {
            code: "invalid_package".to_string(),
            message: format!("prompt at index {index} is invalid: {}", finding.message),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, GenerationSettings, PromptStructure};
    use serde_json::json;

    fn package(prompts: Vec<Value>) -> ExportPackage {
        ExportPackage {
            export_id: "exp-1".to_string(),
            version: PACKAGE_FORMAT_VERSION.to_string(),
            metadata: PackageMetadata {
                title: "Weekly".to_string(),
                exported_by: "tester".to_string(),
                exported_at: "2026-01-02T03:04:05.000Z".to_string(),
                total_prompts: prompts.len(),
                categories: vec![],
            },
            prompts,
            compatibility: Compatibility::default(),
        }
    }

    #[test]
    fn test_valid_package() {
        assert!(package(vec![json!({"id": "a"})]).validate().is_ok());
    }

    #[test]
    fn test_record_without_id_is_invalid() {
        let err = package(vec![json!({"metadata": {}})]).validate().unwrap_err();
        assert_eq!(err.code(), "invalid_package");
    }

    #[test]
    fn test_schema_violations_are_invalid() {
        let good = serde_json::to_value(Prompt::new("a", "p", "A", Category::General)).unwrap();
        assert!(package(vec![good.clone()]).validate_prompts().is_ok());

        let mut bad_id = good.clone();
        bad_id["id"] = json!("bad id!");
        let mut short_version = good;
        short_version["version"] = json!("1.0");

        for record in [bad_id, short_version] {
            let err = package(vec![record]).validate_prompts().unwrap_err();
            assert_eq!(err.code(), "invalid_package");
        }
    }

    #[test]
    fn test_count_mismatch_is_invalid() {
        let mut pkg = package(vec![json!({"id": "a"})]);
        pkg.metadata.total_prompts = 3;
        assert!(pkg.validate().is_err());
    }

    #[test]
    fn test_compatibility_and_categories() {
        let prompts = vec![
            Prompt::new("a", "p", "A", Category::Documentary).with_generation_settings(
                GenerationSettings {
                    provider: "OpenAI".to_string(),
                    model: "gpt-4o".to_string(),
                    ..GenerationSettings::default()
                },
            ),
            Prompt::new("b", "p", "B", Category::Cinematic).with_structure(PromptStructure::default()),
            Prompt::new("c", "p", "C", Category::Cinematic),
        ];

        let compat = Compatibility::for_prompts(&prompts);
        assert_eq!(compat.supported_providers, vec!["openai"]);
        assert_eq!(
            compat.required_features,
            vec!["generation_settings", "prompt_structure"]
        );
        assert_eq!(distinct_categories(&prompts), vec!["cinematic", "documentary"]);
    }

    #[test]
    fn test_package_wire_names() {
        let value = serde_json::to_value(package(vec![])).unwrap();
        assert!(value.get("exportId").is_some());
        assert!(value["metadata"].get("totalPrompts").is_some());
        assert!(value["compatibility"].get("requiredFeatures").is_some());
    }
}
