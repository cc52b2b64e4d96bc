//! Conflict resolution between incoming prompts and the store.
//!
//! A conflict is an id collision. Every collision produces one
//! [`ConflictRecord`], whatever the strategy decides.

use crate::io::fields::get_path;
use crate::models::Prompt;
use crate::storage::PromptStore;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Longest id base kept when appending a rename suffix.
const RENAME_BASE_MAX_CHARS: usize = 119;

/// How an id collision is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    /// The stored prompt wins; the incoming one is dropped.
    #[default]
    SkipExisting,
    /// The incoming prompt replaces the stored one.
    Overwrite,
    /// Field-level merge, incoming non-empty fields win.
    Merge,
    /// The incoming prompt is stored under a fresh id.
    RenameNew,
}

impl ConflictStrategy {
    /// Returns the strategy name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SkipExisting => "skip_existing",
            Self::Overwrite => "overwrite",
            Self::Merge => "merge",
            Self::RenameNew => "rename_new",
        }
    }
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ConflictStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "skip_existing" | "skip" => Ok(Self::SkipExisting),
            "overwrite" => Ok(Self::Overwrite),
            "merge" => Ok(Self::Merge),
            "rename_new" | "rename" => Ok(Self::RenameNew),
            _ => Err(Error::InvalidInput(format!(
                "Unknown conflict strategy: {s}. Expected skip_existing, overwrite, merge or rename_new"
            ))),
        }
    }
}

/// Strategy override for incoming prompts matching a category and/or tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictRule {
    /// Category the incoming prompt must have.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<crate::models::Category>,
    /// Tag the incoming prompt must carry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Strategy applied on match.
    pub strategy: ConflictStrategy,
}

impl ConflictRule {
    fn matches(&self, prompt: &Prompt) -> bool {
        self.category.is_none_or(|c| c == prompt.metadata.category)
            && self
                .tag
                .as_ref()
                .is_none_or(|t| prompt.metadata.tags.contains(t))
    }
}

/// Default strategy plus ordered overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictPolicy {
    /// Applied when no rule matches.
    #[serde(default)]
    pub strategy: ConflictStrategy,
    /// Checked in order, first match wins.
    #[serde(default)]
    pub rules: Vec<ConflictRule>,
}

impl ConflictPolicy {
    /// A policy with no rules.
    #[must_use]
    pub const fn new(strategy: ConflictStrategy) -> Self {
        Self {
            strategy,
            rules: Vec::new(),
        }
    }

    /// Adds a rule.
    #[must_use]
    pub fn with_rule(mut self, rule: ConflictRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Strategy for `incoming`.
    #[must_use]
    pub fn strategy_for(&self, incoming: &Prompt) -> ConflictStrategy {
        self.rules
            .iter()
            .find(|rule| rule.matches(incoming))
            .map_or(self.strategy, |rule| rule.strategy)
    }
}

/// Kind of conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    /// Incoming id already stored.
    IdCollision,
}

/// What happened to the incoming prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum ConflictResolution {
    /// Dropped.
    Skipped,
    /// Replaced the stored prompt.
    Overwritten,
    /// Merged into the stored prompt.
    Merged,
    /// Stored under `new_id`.
    Renamed {
        /// Id assigned to the incoming prompt.
        #[serde(rename = "newId")]
        new_id: String,
    },
}

impl ConflictResolution {
    /// Returns the resolution name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Skipped => "skipped",
            Self::Overwritten => "overwritten",
            Self::Merged => "merged",
            Self::Renamed { .. } => "renamed",
        }
    }
}

/// Audit entry for one collision.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictRecord {
    /// Source index of the incoming record.
    pub index: usize,
    /// Colliding id.
    pub id: String,
    /// Kind of conflict.
    #[serde(rename = "type")]
    pub conflict_type: ConflictType,
    /// Stored prompt at resolution time.
    pub existing: Prompt,
    /// Incoming prompt as received.
    pub incoming: Prompt,
    /// Outcome.
    pub resolution: ConflictResolution,
}

/// Store operation chosen for a resolved prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteAction {
    /// No stored prompt had this id.
    Insert,
    /// Replace the stored prompt.
    Overwrite,
    /// Replace the stored prompt with a merged one.
    Merge,
    /// Insert under a fresh id.
    Rename,
}

/// An incoming prompt awaiting resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Source record index.
    pub index: usize,
    /// Typed prompt read from the record.
    pub prompt: Prompt,
    /// Canonical record the prompt was read from. Merge only takes the
    /// fields this record sets.
    pub record: Value,
}

impl Candidate {
    /// A candidate whose record sets every field of `prompt`.
    #[must_use]
    pub fn new(index: usize, prompt: Prompt) -> Self {
        let record = serde_json::to_value(&prompt).unwrap_or(Value::Null);
        Self {
            index,
            prompt,
            record,
        }
    }

    /// A candidate read from `record`.
    #[must_use]
    pub const fn from_record(index: usize, prompt: Prompt, record: Value) -> Self {
        Self {
            index,
            prompt,
            record,
        }
    }
}

/// A prompt ready for persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPrompt {
    /// Source record index.
    pub index: usize,
    /// Prompt to write.
    pub prompt: Prompt,
    /// Store operation.
    pub action: WriteAction,
}

/// Outcome of resolving a candidate set.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Prompts to persist, in candidate order.
    pub resolved: Vec<ResolvedPrompt>,
    /// One entry per collision.
    pub conflicts: Vec<ConflictRecord>,
    /// Source indexes dropped by `skip_existing`.
    pub skipped: Vec<usize>,
}

/// Resolves candidates against a store snapshot.
#[derive(Debug, Clone, Default)]
pub struct ConflictResolver {
    policy: ConflictPolicy,
}

impl ConflictResolver {
    /// Creates a resolver for `policy`.
    #[must_use]
    pub const fn new(policy: ConflictPolicy) -> Self {
        Self { policy }
    }

    /// Resolves `candidates` against `store`.
    ///
    /// The caller must hold identity locks for every candidate id until the
    /// resolved prompts are persisted.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn resolve<S: PromptStore + ?Sized>(
        &self,
        candidates: Vec<Candidate>,
        store: &S,
    ) -> Result<Resolution> {
        let mut resolution = Resolution::default();
        let mut claimed: HashSet<String> = candidates.iter().map(|c| c.prompt.id.clone()).collect();

        for Candidate {
            index,
            prompt: incoming,
            record,
        } in candidates
        {
            let Some(existing) = store.get(&incoming.id)? else {
                resolution.resolved.push(ResolvedPrompt {
                    index,
                    prompt: incoming,
                    action: WriteAction::Insert,
                });
                continue;
            };

            let strategy = self.policy.strategy_for(&incoming);
            let (outcome, action) = match strategy {
                ConflictStrategy::SkipExisting => (ConflictResolution::Skipped, None),
                ConflictStrategy::Overwrite => {
                    (ConflictResolution::Overwritten, Some((incoming.clone(), WriteAction::Overwrite)))
                },
                ConflictStrategy::Merge => (
                    ConflictResolution::Merged,
                    Some((merge_prompts(&existing, &incoming, &record), WriteAction::Merge)),
                ),
                ConflictStrategy::RenameNew => {
                    let new_id = unique_rename(&incoming.id, store, &claimed)?;
                    claimed.insert(new_id.clone());
                    let mut renamed = incoming.clone();
                    renamed.id.clone_from(&new_id);
                    (ConflictResolution::Renamed { new_id }, Some((renamed, WriteAction::Rename)))
                },
            };

            tracing::debug!(
                id = %incoming.id,
                strategy = %strategy,
                resolution = outcome.as_str(),
                "Resolved id collision"
            );

            match action {
                Some((prompt, action)) => resolution.resolved.push(ResolvedPrompt {
                    index,
                    prompt,
                    action,
                }),
                None => resolution.skipped.push(index),
            }
            resolution.conflicts.push(ConflictRecord {
                index,
                id: incoming.id.clone(),
                conflict_type: ConflictType::IdCollision,
                existing,
                incoming,
                resolution: outcome,
            });
        }

        Ok(resolution)
    }
}

/// Field-level merge: non-empty values that `record` sets win, everything
/// else keeps the stored value. The stored id is kept.
#[must_use]
pub fn merge_prompts(existing: &Prompt, incoming: &Prompt, record: &Value) -> Prompt {
    let sets = |path: &str| get_path(record, path).is_some_and(|v| !v.is_null());
    let pick = |path: &str, new: &str, old: &str| {
        if sets(path) && !new.trim().is_empty() { new } else { old }.to_string()
    };

    let mut merged = existing.clone();
    merged.project_id = pick("projectId", &incoming.project_id, &existing.project_id);
    merged.version = pick("version", &incoming.version, &existing.version);
    merged.metadata.title = pick(
        "metadata.title",
        &incoming.metadata.title,
        &existing.metadata.title,
    );
    merged.metadata.description = pick(
        "metadata.description",
        &incoming.metadata.description,
        &existing.metadata.description,
    );
    if sets("metadata.category") {
        merged.metadata.category = incoming.metadata.category;
    }
    if sets("metadata.difficulty") {
        merged.metadata.difficulty = incoming.metadata.difficulty;
    }
    if sets("metadata.tags") && !incoming.metadata.tags.is_empty() {
        merged.metadata.tags.clone_from(&incoming.metadata.tags);
    }
    if sets("metadata.estimatedTokens") && incoming.metadata.estimated_tokens > 0 {
        merged.metadata.estimated_tokens = incoming.metadata.estimated_tokens;
    }
    if sets("promptStructure") {
        merged.prompt_structure.clone_from(&incoming.prompt_structure);
    }
    if sets("generationSettings") {
        merged.generation_settings.clone_from(&incoming.generation_settings);
    }
    if sets("usage") {
        merged.usage.clone_from(&incoming.usage);
    }
    if sets("status") {
        merged.status = incoming.status;
    }
    merged
}

/// `{base}-{8 hex}`, re-drawn until neither the store nor this job uses it.
fn unique_rename<S: PromptStore + ?Sized>(
    id: &str,
    store: &S,
    claimed: &HashSet<String>,
) -> Result<String> {
    let base: String = id.chars().take(RENAME_BASE_MAX_CHARS).collect();
    loop {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let candidate = format!("{base}-{}", &suffix[..8]);
        if !claimed.contains(&candidate) && !store.contains(&candidate)? {
            return Ok(candidate);
        }
    }
}
