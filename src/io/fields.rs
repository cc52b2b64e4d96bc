//! Dotted field paths over JSON records.
//!
//! Export field selection, CSV columns and import field mappings all address
//! nested prompt fields as dotted camelCase paths such as `metadata.title`.

use serde_json::{Map, Value};

/// Separator used when flattening tag sets into a single CSV cell.
pub const TAG_SEPARATOR: &str = ";";

/// Columns written by CSV export when no explicit selection is given.
pub const DEFAULT_COLUMNS: &[&str] = &[
    "id",
    "projectId",
    "version",
    "metadata.title",
    "metadata.description",
    "metadata.category",
    "metadata.tags",
    "metadata.difficulty",
    "metadata.estimatedTokens",
    "status",
];

/// Usage columns appended to the defaults when usage is included.
pub const USAGE_COLUMNS: &[&str] = &["usage.createdBy", "usage.createdAt", "usage.usageCount"];

/// Metadata fields kept when detailed metadata is excluded.
const CORE_METADATA_FIELDS: &[&str] = &["title", "category"];

/// Returns the value at `path`, if present.
#[must_use]
pub fn get_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(value, |current, segment| current.as_object()?.get(segment))
}

/// Sets `path` to `new_value`, creating intermediate objects.
///
/// Non-object intermediates are replaced by objects.
pub fn set_path(value: &mut Value, path: &str, new_value: Value) {
    let segments: Vec<&str> = path.split('.').collect();
    let Some((leaf, parents)) = segments.split_last() else {
        return;
    };

    let mut current = value;
    for segment in parents {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        current = match current {
            Value::Object(map) => map
                .entry((*segment).to_string())
                .or_insert_with(|| Value::Object(Map::new())),
            _ => return,
        };
    }

    if !current.is_object() {
        *current = Value::Object(Map::new());
    }
    if let Value::Object(map) = current {
        map.insert((*leaf).to_string(), new_value);
    }
}

/// Removes the value at `path`, returning it.
pub fn remove_path(value: &mut Value, path: &str) -> Option<Value> {
    let (parent, leaf) = match path.rsplit_once('.') {
        Some((parent, leaf)) => (get_path_mut(value, parent)?, leaf),
        None => (value, path),
    };
    parent.as_object_mut()?.remove(leaf)
}

fn get_path_mut<'a>(value: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    path.split('.')
        .try_fold(value, |current, segment| current.as_object_mut()?.get_mut(segment))
}

/// Builds a record containing only `paths` (plus `id`, which is always kept).
#[must_use]
pub fn select_fields(record: &Value, paths: &[String]) -> Value {
    let mut selected = Value::Object(Map::new());
    if let Some(id) = record.get("id") {
        set_path(&mut selected, "id", id.clone());
    }
    for path in paths {
        if let Some(found) = get_path(record, path) {
            set_path(&mut selected, path, found.clone());
        }
    }
    selected
}

/// Removes every path in `paths` from `record`.
pub fn exclude_fields(record: &mut Value, paths: &[String]) {
    for path in paths {
        remove_path(record, path);
    }
}

/// Drops descriptive metadata, keeping only the fields a prompt requires.
pub fn strip_detailed_metadata(record: &mut Value) {
    if let Some(Value::Object(metadata)) = record.get_mut("metadata") {
        metadata.retain(|key, _| CORE_METADATA_FIELDS.contains(&key.as_str()));
    }
}

/// Renders a value as a flat text cell.
///
/// Absent and null values render as an empty string. String arrays are
/// joined with [`TAG_SEPARATOR`]; objects render as compact JSON.
#[must_use]
pub fn render_cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Array(items)) if items.iter().all(Value::is_string) => items
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(TAG_SEPARATOR),
        Some(other) => other.to_string(),
    }
}

/// Parses a flat text cell back into a value for `path`.
///
/// Returns `None` for blank cells so absent fields stay absent. Free-text
/// columns keep the cell exactly as written; only composite paths are read
/// as JSON.
#[must_use]
pub fn parse_cell(path: &str, cell: &str) -> Option<Value> {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return None;
    }

    if path == "metadata.tags" {
        let tags = trimmed
            .split(TAG_SEPARATOR)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| Value::String(t.to_string()))
            .collect();
        return Some(Value::Array(tags));
    }

    if is_integer_path(path) {
        // Unparseable counts stay strings and fail validation downstream.
        return Some(
            trimmed
                .parse::<i64>()
                .map_or_else(|_| Value::String(trimmed.to_string()), Value::from),
        );
    }

    if is_composite_path(path) {
        // Malformed JSON stays a string and fails validation downstream.
        return Some(
            serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(trimmed.to_string())),
        );
    }

    if is_token_path(path) {
        return Some(Value::String(trimmed.to_string()));
    }

    Some(Value::String(cell.to_string()))
}

fn is_integer_path(path: &str) -> bool {
    matches!(
        path,
        "metadata.estimatedTokens"
            | "usage.usageCount"
            | "generationSettings.batchSettings.batchSize"
            | "generationSettings.batchSettings.concurrency"
    )
}

/// Paths whose values are objects or arrays.
fn is_composite_path(path: &str) -> bool {
    matches!(
        path,
        "metadata"
            | "promptStructure"
            | "promptStructure.shots"
            | "promptStructure.styleGuide"
            | "promptStructure.styleGuide.colorPalette"
            | "generationSettings"
            | "generationSettings.parameters"
            | "generationSettings.batchSettings"
            | "usage"
    )
}

/// Identifier and closed-set columns, where surrounding whitespace is noise.
fn is_token_path(path: &str) -> bool {
    matches!(
        path,
        "id" | "projectId"
            | "version"
            | "status"
            | "metadata.category"
            | "metadata.difficulty"
            | "usage.createdAt"
            | "generationSettings.provider"
            | "generationSettings.model"
    )
}

/// Resolves the columns for a CSV export.
#[must_use]
pub fn export_columns(selected: &[String], excluded: &[String], include_usage: bool) -> Vec<String> {
    let usage: &[&str] = if include_usage { USAGE_COLUMNS } else { &[] };
    let mut columns: Vec<String> = if selected.is_empty() {
        DEFAULT_COLUMNS
            .iter()
            .chain(usage)
            .map(ToString::to_string)
            .collect()
    } else {
        selected.to_vec()
    };
    columns.retain(|c| !excluded.iter().any(|e| c == e || c.starts_with(&format!("{e}."))));
    columns
}
