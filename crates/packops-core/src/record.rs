//! Work-item records as ordered JSON documents.
//!
//! The catalog is owned by another system, so a record is kept as a generic
//! ordered map rather than a fixed struct: unknown fields and key order
//! survive every read-modify-write. `WorkItem` adds a typed view over the
//! handful of fields the orchestrator reads and writes.

use crate::error::{PackopsError, Result};
use crate::types::{Stage, StageStatus};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Fields this orchestrator owns. Only these are merged back into the store;
/// everything else in a stored record is left untouched.
pub const OWNED_FIELDS: &[&[&str]] = &[
    &["currentStage"],
    &["stages"],
    &["research", "researchCompleted"],
    &["research", "researchArtifacts"],
    &["deployment", "frontendDeployed"],
    &["crm", "icpSummary"],
    &["crm", "gateDecisionNotes"],
    &["metadata", "updatedAt"],
    &["metadata", "build_attempted"],
    &["metadata", "tests_run"],
];

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkItem(Map<String, Value>);

impl WorkItem {
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(PackopsError::MalformedCatalog(format!(
                "expected a JSON object per work item, got {}",
                type_name(&other)
            ))),
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    // -----------------------------------------------------------------------
    // Generic path access
    // -----------------------------------------------------------------------

    pub fn get_path(&self, path: &[&str]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        let mut cur = self.0.get(*first)?;
        for key in rest {
            cur = cur.as_object()?.get(*key)?;
        }
        Some(cur)
    }

    pub fn str_at(&self, path: &[&str]) -> Option<&str> {
        self.get_path(path).and_then(Value::as_str)
    }

    pub fn bool_at(&self, path: &[&str]) -> bool {
        self.get_path(path).and_then(Value::as_bool).unwrap_or(false)
    }

    /// Walk to the object at `path`, creating (or replacing non-object values
    /// with) empty objects along the way.
    pub fn object_at_mut(&mut self, path: &[&str]) -> &mut Map<String, Value> {
        let mut cur = &mut self.0;
        for key in path {
            let slot = cur
                .entry((*key).to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            cur = match slot {
                Value::Object(map) => map,
                _ => unreachable!("slot was just made an object"),
            };
        }
        cur
    }

    pub fn set_path(&mut self, path: &[&str], value: Value) {
        let Some((last, parents)) = path.split_last() else {
            return;
        };
        self.object_at_mut(parents).insert((*last).to_string(), value);
    }

    // -----------------------------------------------------------------------
    // Typed view
    // -----------------------------------------------------------------------

    pub fn slug(&self) -> Option<&str> {
        self.str_at(&["slug"])
    }

    pub fn name(&self) -> Option<&str> {
        self.str_at(&["name"])
    }

    /// Pack number rendered for display (`?` when absent).
    pub fn number_label(&self) -> String {
        match self.get_path(&["packNumber"]) {
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::String(s)) => s.clone(),
            _ => "?".to_string(),
        }
    }

    /// Stage name from `currentStage`; `idea` when absent.
    pub fn current_stage(&self) -> &str {
        self.str_at(&["currentStage"])
            .filter(|s| !s.is_empty())
            .unwrap_or(Stage::Idea.as_str())
    }

    pub fn set_current_stage(&mut self, stage: Stage) {
        self.0.insert(
            "currentStage".to_string(),
            Value::String(stage.as_str().to_string()),
        );
    }

    pub fn research_completed(&self) -> bool {
        self.bool_at(&["research", "researchCompleted"]) || !self.research_artifacts().is_empty()
    }

    pub fn research_artifacts(&self) -> Vec<String> {
        string_list(self.get_path(&["research", "researchArtifacts"]))
    }

    /// Non-blank ICP summary, if any.
    pub fn icp_summary(&self) -> Option<&str> {
        self.str_at(&["crm", "icpSummary"])
            .filter(|s| !s.trim().is_empty())
    }

    pub fn idea_notes(&self) -> Option<&str> {
        self.str_at(&["crm", "ideaNotes"])
            .filter(|s| !s.trim().is_empty())
    }

    pub fn regulation_name(&self) -> &str {
        self.str_at(&["metadata", "regulationName"])
            .unwrap_or("Unknown regulation")
    }

    pub fn target_audience(&self) -> Vec<String> {
        string_list(self.get_path(&["metadata", "targetAudience"]))
    }

    /// Price in cents, 0 when absent or malformed.
    pub fn price_cents(&self) -> u64 {
        self.get_path(&["metadata", "price"])
            .and_then(Value::as_u64)
            .unwrap_or(0)
    }

    pub fn stage_status(&self, stage: &str) -> Option<&str> {
        self.str_at(&["stages", stage, "status"])
    }

    /// Stages whose status is `completed`, in record order.
    pub fn completed_stages(&self) -> Vec<String> {
        let Some(Value::Object(stages)) = self.get_path(&["stages"]) else {
            return Vec::new();
        };
        stages
            .iter()
            .filter(|(_, v)| {
                v.get("status").and_then(Value::as_str) == Some(StageStatus::Completed.as_str())
            })
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Gates that have a recorded decision note.
    pub fn gate_note_keys(&self) -> Vec<String> {
        match self.get_path(&["crm", "gateDecisionNotes"]) {
            Some(Value::Object(notes)) => notes.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Mutations used by pipeline stages
    // -----------------------------------------------------------------------

    /// Mark `stage` completed, stamping `startedAt` (if unset) and `completedAt`.
    /// Returns the stage object so callers can add stage-specific fields.
    pub fn complete_stage(&mut self, stage: &str, now: &str) -> &mut Map<String, Value> {
        let entry = self.object_at_mut(&["stages", stage]);
        entry.insert(
            "status".to_string(),
            Value::String(StageStatus::Completed.as_str().to_string()),
        );
        let started = entry
            .get("startedAt")
            .and_then(Value::as_str)
            .is_some_and(|s| !s.is_empty());
        if !started {
            entry.insert("startedAt".to_string(), Value::String(now.to_string()));
        }
        entry.insert("completedAt".to_string(), Value::String(now.to_string()));
        entry
    }

    pub fn set_gate_note(&mut self, gate: &str, note: impl Into<String>) {
        self.object_at_mut(&["crm", "gateDecisionNotes"])
            .insert(gate.to_string(), Value::String(note.into()));
    }

    pub fn touch(&mut self, now: &str) {
        self.set_path(&["metadata", "updatedAt"], Value::String(now.to_string()));
    }
}

// ---------------------------------------------------------------------------
// Owned-field merge
// ---------------------------------------------------------------------------

/// Three-way merge of this run's changes into the stored record.
///
/// For every owned field, whatever changed between `base` (the record this
/// run started from) and `updated` (the record this run produced) is written
/// into a copy of `stored`. Nested objects merge key by key, so a concurrent
/// run's edits to sibling keys survive. Unowned fields are never touched.
pub fn merge_owned(stored: &WorkItem, base: &WorkItem, updated: &WorkItem) -> WorkItem {
    let mut merged = stored.clone();
    for path in OWNED_FIELDS {
        let Some(new_value) = updated.get_path(path) else {
            continue;
        };
        let old_value = base.get_path(path);
        if old_value == Some(new_value) {
            continue;
        }
        let Some((last, parents)) = path.split_last() else {
            continue;
        };
        let parent = merged.object_at_mut(parents);
        let slot = parent.entry((*last).to_string()).or_insert(Value::Null);
        merge_changed(slot, old_value, new_value);
    }
    merged
}

fn merge_changed(target: &mut Value, base: Option<&Value>, updated: &Value) {
    if base == Some(updated) {
        return;
    }
    match (target, updated) {
        (Value::Object(target_map), Value::Object(updated_map)) => {
            let base_map = base.and_then(Value::as_object);
            for (key, new_value) in updated_map {
                let old_value = base_map.and_then(|m| m.get(key));
                let slot = target_map.entry(key.clone()).or_insert(Value::Null);
                merge_changed(slot, old_value, new_value);
            }
        }
        (slot, _) => *slot = updated.clone(),
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
