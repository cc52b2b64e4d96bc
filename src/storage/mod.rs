//! Storage layer abstraction.
//!
//! The import pipeline talks to a [`PromptStore`]; the crate ships a
//! concurrency-safe [`InMemoryPromptStore`]. [`IdentityLocks`] serialize
//! read-then-write sequences per prompt id across concurrent jobs.

pub mod locks;
pub mod memory;
pub mod traits;

pub use locks::{IdentityGuard, IdentityLocks};
pub use memory::InMemoryPromptStore;
pub use traits::PromptStore;
