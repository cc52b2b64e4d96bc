//! Data models for promptport.
//!
//! The canonical [`Prompt`] entity and the closed vocabularies its metadata
//! draws from.

mod domain;
mod prompt;

pub use domain::{Category, Difficulty, PromptStatus};
pub use prompt::{
    BatchSettings, DEFAULT_VERSION, GenerationSettings, MINTED_ID_PREFIX, Prompt, PromptMetadata,
    PromptStructure, Shot, StyleGuide, UsageInfo, is_valid_prompt_id, is_valid_version,
    mint_prompt_id,
};
