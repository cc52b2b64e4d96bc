//! Storage backend traits.

mod prompt;

pub use prompt::PromptStore;
