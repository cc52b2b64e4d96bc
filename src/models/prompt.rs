//! Canonical prompt entity.
//!
//! A [`Prompt`] is the generation request that the pipeline exports and
//! imports. All wire representations use camelCase keys.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::LazyLock;

use super::domain::{Category, Difficulty, PromptStatus};

/// Creates a compile-time verified regex wrapped in [`LazyLock`].
macro_rules! lazy_regex {
    ($pattern:expr) => {
        LazyLock::new(|| Regex::new($pattern).unwrap_or_else(|_| unreachable!()))
    };
}

/// Accepted prompt identifiers.
static PROMPT_ID_PATTERN: LazyLock<Regex> = lazy_regex!(r"^[A-Za-z0-9][A-Za-z0-9_.:-]{0,127}$");

/// Semantic version with optional pre-release/build suffix.
static SEMVER_PATTERN: LazyLock<Regex> =
    lazy_regex!(r"^(0|[1-9]\d*)\.(0|[1-9]\d*)\.(0|[1-9]\d*)(-[0-9A-Za-z.-]+)?(\+[0-9A-Za-z.-]+)?$");

/// Prefix for identifiers minted by the pipeline.
pub const MINTED_ID_PREFIX: &str = "prompt-";

/// Default version assigned to prompts built without one.
pub const DEFAULT_VERSION: &str = "1.0.0";

/// Returns whether `id` is an acceptable prompt identifier.
#[must_use]
pub fn is_valid_prompt_id(id: &str) -> bool {
    PROMPT_ID_PATTERN.is_match(id)
}

/// Returns whether `version` is a semantic version string.
#[must_use]
pub fn is_valid_version(version: &str) -> bool {
    SEMVER_PATTERN.is_match(version)
}

/// Mints a fresh, time-ordered prompt identifier.
#[must_use]
pub fn mint_prompt_id() -> String {
    format!("{MINTED_ID_PREFIX}{}", uuid::Uuid::now_v7().simple())
}

/// Canonical generation prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prompt {
    /// Unique identifier within a project.
    pub id: String,
    /// Owning project.
    pub project_id: String,
    /// Semantic version of this prompt.
    pub version: String,
    /// Descriptive metadata.
    pub metadata: PromptMetadata,
    /// Ordered shot breakdown and style guide.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_structure: Option<PromptStructure>,
    /// Provider, model and generation parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_settings: Option<GenerationSettings>,
    /// Usage tracking.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageInfo>,
    /// Lifecycle status.
    #[serde(default)]
    pub status: PromptStatus,
}

impl Prompt {
    /// Creates an active prompt with default metadata.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        project_id: impl Into<String>,
        title: impl Into<String>,
        category: Category,
    ) -> Self {
        Self {
            id: id.into(),
            project_id: project_id.into(),
            version: DEFAULT_VERSION.to_string(),
            metadata: PromptMetadata {
                title: title.into(),
                category,
                ..PromptMetadata::default()
            },
            prompt_structure: None,
            generation_settings: None,
            usage: None,
            status: PromptStatus::Active,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.metadata.description = description.into();
        self
    }

    /// Adds a tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.metadata.tags.insert(tag.into());
        self
    }

    /// Sets the difficulty.
    #[must_use]
    pub const fn with_difficulty(mut self, difficulty: Difficulty) -> Self {
        self.metadata.difficulty = difficulty;
        self
    }

    /// Sets the token estimate.
    #[must_use]
    pub const fn with_estimated_tokens(mut self, tokens: u64) -> Self {
        self.metadata.estimated_tokens = tokens;
        self
    }

    /// Sets the version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Sets the prompt structure.
    #[must_use]
    pub fn with_structure(mut self, structure: PromptStructure) -> Self {
        self.prompt_structure = Some(structure);
        self
    }

    /// Sets the generation settings.
    #[must_use]
    pub fn with_generation_settings(mut self, settings: GenerationSettings) -> Self {
        self.generation_settings = Some(settings);
        self
    }

    /// Sets the usage info.
    #[must_use]
    pub fn with_usage(mut self, usage: UsageInfo) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Sets the status.
    #[must_use]
    pub const fn with_status(mut self, status: PromptStatus) -> Self {
        self.status = status;
        self
    }

    /// Returns the provider named in the generation settings, if any.
    #[must_use]
    pub fn provider(&self) -> Option<&str> {
        self.generation_settings
            .as_ref()
            .map(|s| s.provider.as_str())
            .filter(|p| !p.is_empty())
    }
}

/// Descriptive prompt metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptMetadata {
    /// Display title.
    pub title: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Closed-set category.
    pub category: Category,
    /// Tag set (serialized sorted).
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Difficulty rating.
    #[serde(default)]
    pub difficulty: Difficulty,
    /// Estimated token count.
    #[serde(default)]
    pub estimated_tokens: u64,
}

/// Shot breakdown plus style guide.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptStructure {
    /// Shots in playback order.
    #[serde(default)]
    pub shots: Vec<Shot>,
    /// Visual style guide.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style_guide: Option<StyleGuide>,
}

/// A single shot in a prompt structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shot {
    /// Zero-based position.
    pub index: u32,
    /// What happens in the shot.
    pub description: String,
    /// Target duration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u32>,
    /// Camera direction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera: Option<String>,
}

/// Visual style guide.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleGuide {
    /// Overall tone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
    /// Visual style.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual_style: Option<String>,
    /// Palette entries.
    #[serde(default)]
    pub color_palette: Vec<String>,
}

/// Provider and model parameters.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationSettings {
    /// Provider name (e.g. `openai`).
    pub provider: String,
    /// Model identifier.
    pub model: String,
    /// Provider-specific generation parameters.
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,
    /// Batch execution settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_settings: Option<BatchSettings>,
}

/// Batch execution settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSettings {
    /// Items per batch.
    pub batch_size: u32,
    /// Concurrent generations.
    pub concurrency: u32,
}

/// Usage tracking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageInfo {
    /// Creator identity.
    pub created_by: String,
    /// RFC 3339 creation time.
    pub created_at: String,
    /// Number of times used.
    #[serde(default)]
    pub usage_count: u64,
}
