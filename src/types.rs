use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ── Records ──────────────────────────────────────────────────────────────

/// A stored record. `id` is opaque and immutable; `version` starts at 1 and
/// increases by exactly one on every successful update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub(crate) struct Record {
    pub(crate) id: String,
    pub(crate) body: String,
    #[serde(default)]
    pub(crate) tags: Vec<String>,
    #[serde(default)]
    pub(crate) metadata: BTreeMap<String, serde_json::Value>,
    pub(crate) version: u64,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct RecordSummary {
    pub(crate) id: String,
    pub(crate) version: u64,
    pub(crate) tags: Vec<String>,
}

/// Partial update applied on top of the current record state. `None` fields
/// keep their current value; metadata keys merge over existing keys.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct RecordPatch {
    pub(crate) body: Option<String>,
    pub(crate) tags: Option<Vec<String>>,
    pub(crate) metadata: Option<BTreeMap<String, serde_json::Value>>,
}

/// A point-in-time copy of a record, taken before the overwrite that
/// superseded it. `version` is the version the record had when captured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Snapshot {
    pub(crate) record: Record,
    pub(crate) captured_at: String,
}

impl Snapshot {
    pub(crate) fn version(&self) -> u64 {
        self.record.version
    }
}

// ── Callers ──────────────────────────────────────────────────────────────

/// Where an invocation came from. Remote callers are subject to the
/// category exposure allow-list; local callers are not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Caller {
    Local,
    Remote,
}

// ── Errors ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ToolError {
    NotFound(String),
    Validation(String),
    ToolDisabled(String),
    Forbidden(String),
    Storage(String),
    ToolExecution(String),
    IndexBuild(String),
}

impl ToolError {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            ToolError::NotFound(_) => "NotFoundError",
            ToolError::Validation(_) => "ValidationError",
            ToolError::ToolDisabled(_) => "ToolDisabledError",
            ToolError::Forbidden(_) => "ForbiddenError",
            ToolError::Storage(_) => "StorageError",
            ToolError::ToolExecution(_) => "ToolExecutionError",
            ToolError::IndexBuild(_) => "IndexBuildError",
        }
    }

    pub(crate) fn message(&self) -> &str {
        match self {
            ToolError::NotFound(m)
            | ToolError::Validation(m)
            | ToolError::ToolDisabled(m)
            | ToolError::Forbidden(m)
            | ToolError::Storage(m)
            | ToolError::ToolExecution(m)
            | ToolError::IndexBuild(m) => m,
        }
    }
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind(), self.message())
    }
}

impl std::error::Error for ToolError {}

// ── Invocation envelope ──────────────────────────────────────────────────

pub(crate) fn ok_envelope(result: serde_json::Value) -> serde_json::Value {
    serde_json::json!({ "ok": true, "result": result })
}

pub(crate) fn err_envelope(err: &ToolError) -> serde_json::Value {
    serde_json::json!({
        "ok": false,
        "error": { "kind": err.kind(), "message": err.message() }
    })
}
