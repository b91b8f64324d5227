use std::collections::BTreeMap;

use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::{parse_date_to_ts, Record, RecordPatch, ToolContext, ToolError, ToolRegistry};

pub(crate) const CATEGORY: &str = "todo";

const DEFAULT_LIST_LIMIT: usize = 50;

// ── Arguments ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct AddTodoArgs {
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    due_by: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListTodosArgs {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct SearchTodosArgs {
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    due_before: Option<String>,
    #[serde(default)]
    due_after: Option<String>,
    #[serde(default)]
    order_by: Option<String>,
    #[serde(default)]
    ascending: Option<bool>,
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct UpdateTodoArgs {
    todo_id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    due_by: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TodoIdArgs {
    todo_id: String,
}

// ── Registration ─────────────────────────────────────────────────────────

pub(crate) fn register(registry: &mut ToolRegistry) -> Vec<Result<(), String>> {
    vec![
        registry.register(
            "add_todo_item",
            CATEGORY,
            "Create a todo item with optional description and due date",
            json!({
                "type": "object",
                "properties": {
                    "title": { "type": "string" },
                    "description": { "type": "string" },
                    "due_by": { "type": "string", "description": "YYYY-MM-DD or ISO datetime" }
                },
                "required": ["title"]
            }),
            add_todo_item,
        ),
        registry.register(
            "list_todo_items",
            CATEGORY,
            "List todo items, optionally filtered by status, newest first",
            json!({
                "type": "object",
                "properties": {
                    "status": { "type": "string" },
                    "limit": { "type": "integer" }
                }
            }),
            list_todo_items,
        ),
        registry.register(
            "search_todo_items",
            CATEGORY,
            "Search todos by text, status, and due-date window, with ordering",
            json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string" },
                    "status": { "type": "string" },
                    "due_before": { "type": "string" },
                    "due_after": { "type": "string" },
                    "order_by": { "type": "string", "enum": ["created_at", "due_by", "title"] },
                    "ascending": { "type": "boolean" },
                    "limit": { "type": "integer" }
                }
            }),
            search_todo_items,
        ),
        registry.register(
            "update_todo_item",
            CATEGORY,
            "Update a todo's title, description, status, or due date",
            json!({
                "type": "object",
                "properties": {
                    "todo_id": { "type": "string" },
                    "title": { "type": "string" },
                    "description": { "type": "string" },
                    "status": { "type": "string" },
                    "due_by": { "type": "string" }
                },
                "required": ["todo_id"]
            }),
            update_todo_item,
        ),
        registry.register(
            "delete_todo_item",
            CATEGORY,
            "Delete a todo item by id",
            json!({
                "type": "object",
                "properties": { "todo_id": { "type": "string" } },
                "required": ["todo_id"]
            }),
            delete_todo_item,
        ),
        registry.register(
            "delete_all_todo_items",
            CATEGORY,
            "Delete every todo item",
            json!({ "type": "object", "properties": {} }),
            delete_all_todo_items,
        ),
    ]
}

// ── Handlers ─────────────────────────────────────────────────────────────

fn parse_args<T: serde::de::DeserializeOwned>(args: serde_json::Value) -> Result<T, ToolError> {
    serde_json::from_value(args).map_err(|e| ToolError::Validation(format!("arguments: {e}")))
}

fn check_due_by(value: &str) -> Result<(), ToolError> {
    if parse_date_to_ts(value).is_none() {
        return Err(ToolError::Validation(format!(
            "due_by '{value}' is not a date (expected YYYY-MM-DD or ISO datetime)"
        )));
    }
    Ok(())
}

fn meta_str<'a>(record: &'a Record, key: &str) -> Option<&'a str> {
    record.metadata.get(key).and_then(|v| v.as_str())
}

fn todo_json(record: &Record) -> serde_json::Value {
    json!({
        "id": record.id,
        "title": record.body,
        "description": meta_str(record, "description"),
        "status": meta_str(record, "status").unwrap_or("open"),
        "due_by": meta_str(record, "due_by"),
        "created_at": meta_str(record, "created_at"),
        "version": record.version,
    })
}

fn add_todo_item(
    ctx: &ToolContext,
    args: serde_json::Value,
) -> Result<serde_json::Value, ToolError> {
    let args: AddTodoArgs = parse_args(args)?;
    let mut metadata = BTreeMap::new();
    metadata.insert("status".to_string(), json!("open"));
    metadata.insert("created_at".to_string(), json!(Utc::now().to_rfc3339()));
    if let Some(description) = args.description {
        metadata.insert("description".to_string(), json!(description));
    }
    if let Some(due_by) = args.due_by {
        check_due_by(&due_by)?;
        metadata.insert("due_by".to_string(), json!(due_by));
    }
    let record = ctx.todos.create(args.title, vec![], metadata)?;
    Ok(todo_json(&record))
}

fn filtered_todos(
    ctx: &ToolContext,
    status: Option<&str>,
) -> Result<Vec<Record>, ToolError> {
    let mut records = ctx.todos.list_records()?;
    if let Some(status) = status {
        records.retain(|r| meta_str(r, "status").unwrap_or("open") == status);
    }
    Ok(records)
}

fn list_todo_items(
    ctx: &ToolContext,
    args: serde_json::Value,
) -> Result<serde_json::Value, ToolError> {
    let args: ListTodosArgs = parse_args(args)?;
    let mut records = filtered_todos(ctx, args.status.as_deref())?;
    // RFC 3339 strings compare chronologically.
    records.sort_by(|a, b| {
        meta_str(b, "created_at")
            .unwrap_or("")
            .cmp(meta_str(a, "created_at").unwrap_or(""))
            .then_with(|| a.id.cmp(&b.id))
    });
    records.truncate(args.limit.unwrap_or(DEFAULT_LIST_LIMIT));
    let items: Vec<serde_json::Value> = records.iter().map(todo_json).collect();
    Ok(json!({ "items": items }))
}

fn search_todo_items(
    ctx: &ToolContext,
    args: serde_json::Value,
) -> Result<serde_json::Value, ToolError> {
    let args: SearchTodosArgs = parse_args(args)?;
    let mut records = filtered_todos(ctx, args.status.as_deref())?;

    if let Some(query) = &args.query {
        let needle = query.to_lowercase();
        records.retain(|r| {
            r.body.to_lowercase().contains(&needle)
                || meta_str(r, "description")
                    .map(|d| d.to_lowercase().contains(&needle))
                    .unwrap_or(false)
        });
    }
    if let Some(before) = &args.due_before {
        check_due_by(before)?;
        if let Some(cutoff) = parse_date_to_ts(before) {
            records.retain(|r| {
                meta_str(r, "due_by")
                    .and_then(parse_date_to_ts)
                    .is_some_and(|due| due <= cutoff)
            });
        }
    }
    if let Some(after) = &args.due_after {
        check_due_by(after)?;
        if let Some(cutoff) = parse_date_to_ts(after) {
            records.retain(|r| {
                meta_str(r, "due_by")
                    .and_then(parse_date_to_ts)
                    .is_some_and(|due| due >= cutoff)
            });
        }
    }

    let order_by = args.order_by.as_deref().unwrap_or("created_at");
    let key = |r: &Record| -> String {
        match order_by {
            "title" => r.body.to_lowercase(),
            "due_by" => meta_str(r, "due_by").unwrap_or("9999").to_string(),
            _ => meta_str(r, "created_at").unwrap_or("").to_string(),
        }
    };
    records.sort_by(|a, b| key(a).cmp(&key(b)).then_with(|| a.id.cmp(&b.id)));
    if !args.ascending.unwrap_or(true) {
        records.reverse();
    }
    records.truncate(args.limit.unwrap_or(DEFAULT_LIST_LIMIT));

    let items: Vec<serde_json::Value> = records.iter().map(todo_json).collect();
    Ok(json!({ "items": items }))
}

fn update_todo_item(
    ctx: &ToolContext,
    args: serde_json::Value,
) -> Result<serde_json::Value, ToolError> {
    let args: UpdateTodoArgs = parse_args(args)?;
    let mut metadata = BTreeMap::new();
    if let Some(description) = args.description {
        metadata.insert("description".to_string(), json!(description));
    }
    if let Some(status) = args.status {
        metadata.insert("status".to_string(), json!(status));
    }
    if let Some(due_by) = args.due_by {
        check_due_by(&due_by)?;
        metadata.insert("due_by".to_string(), json!(due_by));
    }
    let record = ctx.todos.update(
        &args.todo_id,
        RecordPatch {
            body: args.title,
            tags: None,
            metadata: if metadata.is_empty() {
                None
            } else {
                Some(metadata)
            },
        },
    )?;
    Ok(todo_json(&record))
}

fn delete_todo_item(
    ctx: &ToolContext,
    args: serde_json::Value,
) -> Result<serde_json::Value, ToolError> {
    let args: TodoIdArgs = parse_args(args)?;
    ctx.todos.delete(&args.todo_id)?;
    Ok(json!({ "deleted": args.todo_id }))
}

fn delete_all_todo_items(
    ctx: &ToolContext,
    _args: serde_json::Value,
) -> Result<serde_json::Value, ToolError> {
    let mut deleted = 0usize;
    for summary in ctx.todos.list()? {
        match ctx.todos.delete(&summary.id) {
            Ok(()) => deleted += 1,
            Err(ToolError::NotFound(_)) => {}
            Err(err) => return Err(err),
        }
    }
    Ok(json!({ "deleted": deleted }))
}
