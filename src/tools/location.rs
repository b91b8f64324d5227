use chrono::{Local, Utc};
use serde_json::json;

use crate::{ToolContext, ToolError, ToolRegistry};

pub(crate) const CATEGORY: &str = "location";

pub(crate) fn register(registry: &mut ToolRegistry) -> Vec<Result<(), String>> {
    vec![registry.register(
        "get_time",
        CATEGORY,
        "Current time in UTC and the server's local zone",
        json!({ "type": "object", "properties": {} }),
        get_time,
    )]
}

fn get_time(_ctx: &ToolContext, _args: serde_json::Value) -> Result<serde_json::Value, ToolError> {
    let utc = Utc::now();
    Ok(json!({
        "utc": utc.to_rfc3339(),
        "local": Local::now().to_rfc3339(),
        "unix": utc.timestamp(),
    }))
}
