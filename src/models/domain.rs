//! Closed vocabularies for prompt metadata.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Prompt categories.
///
/// The set is closed: a record carrying any other value is rejected during
/// validation rather than mapped to a default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Film-style narrative shots.
    Cinematic,
    /// Advertising and product spots.
    Commercial,
    /// Factual, interview or archival material.
    Documentary,
    /// Tutorials and explainers.
    Educational,
    /// Animated or stylized content.
    Animation,
    /// Short-form social content.
    SocialMedia,
    /// Anything else.
    #[default]
    General,
}

impl Category {
    /// Returns all category variants.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Cinematic,
            Self::Commercial,
            Self::Documentary,
            Self::Educational,
            Self::Animation,
            Self::SocialMedia,
            Self::General,
        ]
    }

    /// Returns the category as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Cinematic => "cinematic",
            Self::Commercial => "commercial",
            Self::Documentary => "documentary",
            Self::Educational => "educational",
            Self::Animation => "animation",
            Self::SocialMedia => "social_media",
            Self::General => "general",
        }
    }

    /// Parses a category from its wire name.
    ///
    /// Parsing is exact apart from case; unknown names return `None`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "cinematic" => Some(Self::Cinematic),
            "commercial" => Some(Self::Commercial),
            "documentary" => Some(Self::Documentary),
            "educational" => Some(Self::Educational),
            "animation" => Some(Self::Animation),
            "social_media" => Some(Self::SocialMedia),
            "general" => Some(Self::General),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Prompt difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    /// Straightforward single-shot prompts.
    Easy,
    /// Multi-shot or parameter-sensitive prompts.
    #[default]
    Medium,
    /// Prompts that need careful tuning.
    Hard,
}

impl Difficulty {
    /// Returns the difficulty as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }

    /// Parses a difficulty string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "easy" => Some(Self::Easy),
            "medium" => Some(Self::Medium),
            "hard" => Some(Self::Hard),
            _ => None,
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status of a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptStatus {
    /// In use.
    #[default]
    Active,
    /// Retained but hidden from default listings.
    Archived,
    /// Soft-deleted.
    Deleted,
}

impl PromptStatus {
    /// Returns the status as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Archived => "archived",
            Self::Deleted => "deleted",
        }
    }

    /// Parses a status string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(Self::Active),
            "archived" => Some(Self::Archived),
            "deleted" => Some(Self::Deleted),
            _ => None,
        }
    }
}

impl fmt::Display for PromptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_roundtrip() {
        for category in Category::all() {
            assert_eq!(Category::parse(category.as_str()), Some(*category));
        }
        assert_eq!(Category::parse("SOCIAL_MEDIA"), Some(Category::SocialMedia));
        assert_eq!(Category::parse("horror"), None);
    }

    #[test]
    fn test_category_serde_uses_snake_case() {
        let json = serde_json::to_string(&Category::SocialMedia).unwrap_or_default();
        assert_eq!(json, "\"social_media\"");
        assert!(serde_json::from_str::<Category>("\"thriller\"").is_err());
    }

    #[test]
    fn test_difficulty_and_status_parse() {
        assert_eq!(Difficulty::parse("Hard"), Some(Difficulty::Hard));
        assert_eq!(Difficulty::parse("extreme"), None);
        assert_eq!(PromptStatus::parse("archived"), Some(PromptStatus::Archived));
        assert_eq!(PromptStatus::default(), PromptStatus::Active);
    }
}
