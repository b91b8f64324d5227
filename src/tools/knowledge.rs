use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::json;

use crate::{Record, RecordPatch, ToolContext, ToolError, ToolRegistry, DEFAULT_TOP_K};

pub(crate) const CATEGORY: &str = "knowledge_base";

const DEFAULT_LIST_LIMIT: usize = 50;

// ── Arguments ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct AddEntryArgs {
    content: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    metadata: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct EntryIdArgs {
    entry_id: String,
}

#[derive(Debug, Deserialize)]
struct UpdateEntryArgs {
    entry_id: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default)]
    metadata: Option<BTreeMap<String, serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct DeleteEntriesArgs {
    entry_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ListEntriesArgs {
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct SearchEntriesArgs {
    query: String,
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct SearchByTagArgs {
    tag: String,
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct SearchSemanticArgs {
    query: String,
    #[serde(default)]
    top_k: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EntryVersionArgs {
    entry_id: String,
    version: u64,
}

// ── Registration ─────────────────────────────────────────────────────────

pub(crate) fn register(registry: &mut ToolRegistry) -> Vec<Result<(), String>> {
    let id_schema = |desc: &str| {
        json!({
            "type": "object",
            "properties": { "entry_id": { "type": "string", "description": desc } },
            "required": ["entry_id"]
        })
    };
    vec![
        registry.register(
            "add_entry",
            CATEGORY,
            "Store a new knowledge entry with optional tags and metadata",
            json!({
                "type": "object",
                "properties": {
                    "content": { "type": "string", "description": "Entry text" },
                    "tags": { "type": "array", "items": { "type": "string" } },
                    "metadata": { "type": "object" }
                },
                "required": ["content"]
            }),
            add_entry,
        ),
        registry.register(
            "get_entry",
            CATEGORY,
            "Fetch a single knowledge entry by id",
            id_schema("Id of the entry to fetch"),
            get_entry,
        ),
        registry.register(
            "update_entry",
            CATEGORY,
            "Update an entry's content, tags, or metadata; the prior state is snapshotted",
            json!({
                "type": "object",
                "properties": {
                    "entry_id": { "type": "string" },
                    "content": { "type": "string" },
                    "tags": { "type": "array", "items": { "type": "string" } },
                    "metadata": { "type": "object" }
                },
                "required": ["entry_id"]
            }),
            update_entry,
        ),
        registry.register(
            "update_entry_versioned",
            CATEGORY,
            "Update an entry and report the snapshot version that preserved the prior state",
            json!({
                "type": "object",
                "properties": {
                    "entry_id": { "type": "string" },
                    "content": { "type": "string" },
                    "tags": { "type": "array", "items": { "type": "string" } },
                    "metadata": { "type": "object" }
                },
                "required": ["entry_id"]
            }),
            update_entry_versioned,
        ),
        registry.register(
            "delete_entry",
            CATEGORY,
            "Delete a knowledge entry; its snapshots survive until purged",
            id_schema("Id of the entry to delete"),
            delete_entry,
        ),
        registry.register(
            "delete_entries",
            CATEGORY,
            "Delete several knowledge entries at once",
            json!({
                "type": "object",
                "properties": {
                    "entry_ids": { "type": "array", "items": { "type": "string" } }
                },
                "required": ["entry_ids"]
            }),
            delete_entries,
        ),
        registry.register(
            "list_entries",
            CATEGORY,
            "List knowledge entries (unspecified order)",
            json!({
                "type": "object",
                "properties": { "limit": { "type": "integer" } }
            }),
            list_entries,
        ),
        registry.register(
            "search_entries",
            CATEGORY,
            "Case-insensitive substring search over entry content",
            json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string" },
                    "limit": { "type": "integer" }
                },
                "required": ["query"]
            }),
            search_entries,
        ),
        registry.register(
            "search_by_tag",
            CATEGORY,
            "List entries carrying an exact tag",
            json!({
                "type": "object",
                "properties": {
                    "tag": { "type": "string" },
                    "limit": { "type": "integer" }
                },
                "required": ["tag"]
            }),
            search_by_tag,
        ),
        registry.register(
            "search_semantic",
            CATEGORY,
            "Rank entries against a query with TF-IDF cosine similarity",
            json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string" },
                    "top_k": { "type": "integer" }
                },
                "required": ["query"]
            }),
            search_semantic,
        ),
        registry.register(
            "list_entry_versions",
            CATEGORY,
            "List the preserved snapshots of an entry, newest first",
            id_schema("Id of the entry"),
            list_entry_versions,
        ),
        registry.register(
            "restore_entry_version",
            CATEGORY,
            "Restore an entry to a snapshotted version (applied as a new version)",
            json!({
                "type": "object",
                "properties": {
                    "entry_id": { "type": "string" },
                    "version": { "type": "integer" }
                },
                "required": ["entry_id", "version"]
            }),
            restore_entry_version,
        ),
        registry.register(
            "purge_entry_versions",
            CATEGORY,
            "Delete all preserved snapshots of an entry",
            id_schema("Id of the entry"),
            purge_entry_versions,
        ),
    ]
}

// ── Handlers ─────────────────────────────────────────────────────────────

fn parse_args<T: serde::de::DeserializeOwned>(args: serde_json::Value) -> Result<T, ToolError> {
    serde_json::from_value(args).map_err(|e| ToolError::Validation(format!("arguments: {e}")))
}

fn entry_json(record: &Record) -> serde_json::Value {
    json!({
        "id": record.id,
        "content": record.body,
        "tags": record.tags,
        "metadata": record.metadata,
        "version": record.version,
    })
}

fn add_entry(ctx: &ToolContext, args: serde_json::Value) -> Result<serde_json::Value, ToolError> {
    let args: AddEntryArgs = parse_args(args)?;
    let record = ctx.kb.create(args.content, args.tags, args.metadata)?;
    Ok(json!({ "id": record.id, "version": record.version }))
}

fn get_entry(ctx: &ToolContext, args: serde_json::Value) -> Result<serde_json::Value, ToolError> {
    let args: EntryIdArgs = parse_args(args)?;
    let record = ctx.kb.read(&args.entry_id)?;
    Ok(entry_json(&record))
}

fn apply_update(ctx: &ToolContext, args: UpdateEntryArgs) -> Result<Record, ToolError> {
    ctx.kb.update(
        &args.entry_id,
        RecordPatch {
            body: args.content,
            tags: args.tags,
            metadata: args.metadata,
        },
    )
}

fn update_entry(ctx: &ToolContext, args: serde_json::Value) -> Result<serde_json::Value, ToolError> {
    let args: UpdateEntryArgs = parse_args(args)?;
    let record = apply_update(ctx, args)?;
    Ok(json!({ "id": record.id, "version": record.version }))
}

fn update_entry_versioned(
    ctx: &ToolContext,
    args: serde_json::Value,
) -> Result<serde_json::Value, ToolError> {
    let args: UpdateEntryArgs = parse_args(args)?;
    let record = apply_update(ctx, args)?;
    Ok(json!({
        "id": record.id,
        "version": record.version,
        "snapshot_version": record.version - 1,
    }))
}

fn delete_entry(ctx: &ToolContext, args: serde_json::Value) -> Result<serde_json::Value, ToolError> {
    let args: EntryIdArgs = parse_args(args)?;
    ctx.kb.delete(&args.entry_id)?;
    Ok(json!({ "deleted": args.entry_id }))
}

fn delete_entries(
    ctx: &ToolContext,
    args: serde_json::Value,
) -> Result<serde_json::Value, ToolError> {
    let args: DeleteEntriesArgs = parse_args(args)?;
    let mut deleted = Vec::new();
    let mut missing = Vec::new();
    for id in args.entry_ids {
        match ctx.kb.delete(&id) {
            Ok(()) => deleted.push(id),
            Err(ToolError::NotFound(_)) => missing.push(id),
            Err(err) => return Err(err),
        }
    }
    Ok(json!({ "deleted": deleted, "missing": missing }))
}

fn list_entries(ctx: &ToolContext, args: serde_json::Value) -> Result<serde_json::Value, ToolError> {
    let args: ListEntriesArgs = parse_args(args)?;
    let limit = args.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    let mut summaries = ctx.kb.list()?;
    let total = summaries.len();
    summaries.truncate(limit);
    Ok(json!({ "entries": summaries, "total": total }))
}

fn search_entries(
    ctx: &ToolContext,
    args: serde_json::Value,
) -> Result<serde_json::Value, ToolError> {
    let args: SearchEntriesArgs = parse_args(args)?;
    let needle = args.query.to_lowercase();
    let limit = args.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    let mut matches: Vec<serde_json::Value> = ctx
        .kb
        .list_records()?
        .iter()
        .filter(|r| r.body.to_lowercase().contains(&needle))
        .map(entry_json)
        .collect();
    matches.truncate(limit);
    Ok(json!({ "entries": matches }))
}

fn search_by_tag(
    ctx: &ToolContext,
    args: serde_json::Value,
) -> Result<serde_json::Value, ToolError> {
    let args: SearchByTagArgs = parse_args(args)?;
    let limit = args.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    let mut matches: Vec<serde_json::Value> = ctx
        .kb
        .list_records()?
        .iter()
        .filter(|r| r.tags.iter().any(|t| t == &args.tag))
        .map(entry_json)
        .collect();
    matches.truncate(limit);
    Ok(json!({ "entries": matches }))
}

fn search_semantic(
    ctx: &ToolContext,
    args: serde_json::Value,
) -> Result<serde_json::Value, ToolError> {
    let args: SearchSemanticArgs = parse_args(args)?;
    let hits = ctx
        .kb_index
        .search(&args.query, args.top_k.unwrap_or(DEFAULT_TOP_K))?;
    Ok(json!({ "results": hits }))
}

fn list_entry_versions(
    ctx: &ToolContext,
    args: serde_json::Value,
) -> Result<serde_json::Value, ToolError> {
    let args: EntryIdArgs = parse_args(args)?;
    let versions: Vec<serde_json::Value> = ctx
        .kb
        .list_snapshots(&args.entry_id)?
        .iter()
        .map(|s| {
            json!({
                "version": s.version(),
                "captured_at": s.captured_at,
                "content": s.record.body,
                "tags": s.record.tags,
            })
        })
        .collect();
    Ok(json!({ "entry_id": args.entry_id, "versions": versions }))
}

fn restore_entry_version(
    ctx: &ToolContext,
    args: serde_json::Value,
) -> Result<serde_json::Value, ToolError> {
    let args: EntryVersionArgs = parse_args(args)?;
    let record = ctx.kb.restore(&args.entry_id, args.version)?;
    Ok(json!({
        "id": record.id,
        "version": record.version,
        "restored_from": args.version,
    }))
}

fn purge_entry_versions(
    ctx: &ToolContext,
    args: serde_json::Value,
) -> Result<serde_json::Value, ToolError> {
    let args: EntryIdArgs = parse_args(args)?;
    let purged = ctx.kb.purge_snapshots(&args.entry_id)?;
    Ok(json!({ "entry_id": args.entry_id, "purged": purged }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testutil::test_context;

    fn add(ctx: &ToolContext, content: &str, tags: &[&str]) -> String {
        let out = add_entry(ctx, json!({ "content": content, "tags": tags })).unwrap();
        out["id"].as_str().unwrap().to_string()
    }

    #[test]
    fn add_get_round_trip() {
        let ctx = test_context("kb_round_trip");
        let id = add(&ctx, "rust borrow checker notes", &["rust"]);
        let entry = get_entry(&ctx, json!({ "entry_id": id })).unwrap();
        assert_eq!(entry["content"], "rust borrow checker notes");
        assert_eq!(entry["tags"][0], "rust");
        assert_eq!(entry["version"], 1);
    }

    #[test]
    fn versioned_update_reports_snapshot() {
        let ctx = test_context("kb_versioned");
        let id = add(&ctx, "first draft", &[]);
        let out = update_entry_versioned(
            &ctx,
            json!({ "entry_id": id, "content": "second draft" }),
        )
        .unwrap();
        assert_eq!(out["version"], 2);
        assert_eq!(out["snapshot_version"], 1);

        let versions = list_entry_versions(&ctx, json!({ "entry_id": id })).unwrap();
        assert_eq!(versions["versions"][0]["version"], 1);
        assert_eq!(versions["versions"][0]["content"], "first draft");
    }

    #[test]
    fn restore_and_purge_versions() {
        let ctx = test_context("kb_restore");
        let id = add(&ctx, "original", &[]);
        update_entry(&ctx, json!({ "entry_id": id, "content": "edited" })).unwrap();

        let out = restore_entry_version(&ctx, json!({ "entry_id": id, "version": 1 })).unwrap();
        assert_eq!(out["version"], 3);
        let entry = get_entry(&ctx, json!({ "entry_id": id })).unwrap();
        assert_eq!(entry["content"], "original");

        let purged = purge_entry_versions(&ctx, json!({ "entry_id": id })).unwrap();
        assert_eq!(purged["purged"], 2);
    }

    #[test]
    fn delete_entries_reports_missing_ids() {
        let ctx = test_context("kb_delete_many");
        let id = add(&ctx, "to be deleted", &[]);
        let out = delete_entries(
            &ctx,
            json!({ "entry_ids": [id.clone(), "feedfacefeedface"] }),
        )
        .unwrap();
        assert_eq!(out["deleted"][0], id.as_str());
        assert_eq!(out["missing"][0], "feedfacefeedface");
    }

    #[test]
    fn substring_and_tag_search() {
        let ctx = test_context("kb_search");
        add(&ctx, "Deploy notes for the staging cluster", &["ops"]);
        add(&ctx, "Recipe for sourdough bread", &["cooking"]);

        let out = search_entries(&ctx, json!({ "query": "STAGING" })).unwrap();
        assert_eq!(out["entries"].as_array().unwrap().len(), 1);

        let out = search_by_tag(&ctx, json!({ "tag": "cooking" })).unwrap();
        let entries = out["entries"].as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0]["content"]
            .as_str()
            .unwrap()
            .contains("sourdough"));
    }

    #[test]
    fn semantic_search_end_to_end() {
        let ctx = test_context("kb_semantic");
        let fox = add(&ctx, "the quick brown fox", &[]);
        let dog = add(&ctx, "a slow brown dog", &[]);

        let out = search_semantic(&ctx, json!({ "query": "brown", "top_k": 2 })).unwrap();
        let results = out["results"].as_array().unwrap();
        assert_eq!(results.len(), 2);
        let ids: Vec<&str> = results.iter().map(|r| r["id"].as_str().unwrap()).collect();
        assert!(ids.contains(&fox.as_str()));
        assert!(ids.contains(&dog.as_str()));

        let out = search_semantic(&ctx, json!({ "query": "quick" })).unwrap();
        let results = out["results"].as_array().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["id"], fox.as_str());
    }

    #[test]
    fn list_entries_respects_limit() {
        let ctx = test_context("kb_list");
        for i in 0..5 {
            add(&ctx, &format!("entry {i}"), &[]);
        }
        let out = list_entries(&ctx, json!({ "limit": 3 })).unwrap();
        assert_eq!(out["entries"].as_array().unwrap().len(), 3);
        assert_eq!(out["total"], 5);
    }
}
