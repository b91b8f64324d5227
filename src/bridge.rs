use std::io;

use tiny_http::{Method, Response, Server};

use super::{Caller, Dispatcher, ToolRegistry};

pub(crate) fn parse_json_body(
    request: &mut tiny_http::Request,
) -> Result<serde_json::Value, String> {
    let mut body = String::new();
    request
        .as_reader()
        .read_to_string(&mut body)
        .map_err(|e| format!("read body: {e}"))?;
    if body.trim().is_empty() {
        return Ok(serde_json::json!({}));
    }
    serde_json::from_str(&body).map_err(|e| format!("json: {e}"))
}

/// Handles one A2A JSON-RPC payload. Everything arriving here is a remote
/// caller, so the category exposure allow-list applies to both discovery and
/// calls.
pub(crate) fn handle_a2a_request(
    dispatcher: &Dispatcher,
    payload: &serde_json::Value,
) -> serde_json::Value {
    let id = payload.get("id").cloned().unwrap_or(serde_json::Value::Null);
    let method = payload.get("method").and_then(|m| m.as_str()).unwrap_or("");
    let params = payload
        .get("params")
        .cloned()
        .unwrap_or_else(|| serde_json::json!({}));

    match method {
        "a2a.discover" => {
            let category = params.get("category").and_then(|c| c.as_str());
            let tools: Vec<serde_json::Value> = dispatcher
                .registry()
                .list_exposed(category)
                .iter()
                .map(|tool| ToolRegistry::descriptor_json(tool))
                .collect();
            serde_json::json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": { "tools": tools }
            })
        }
        "a2a.call" => {
            let Some(name) = params.get("name").and_then(|v| v.as_str()) else {
                return serde_json::json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": { "code": -32602, "message": "params.name is required" }
                });
            };
            let arguments = params
                .get("arguments")
                .cloned()
                .unwrap_or_else(|| serde_json::json!({}));
            let envelope = dispatcher.call(name, arguments, Caller::Remote);
            serde_json::json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": envelope
            })
        }
        _ => serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": -32601, "message": "method not found" }
        }),
    }
}

/// Blocking HTTP loop exposing POST /a2a to remote peers.
pub(crate) fn run_a2a_bridge(
    dispatcher: &Dispatcher,
    bind: String,
    port: u16,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{bind}:{port}");
    let server = Server::http(&addr)
        .map_err(|e| io::Error::other(format!("server: {e}")))?;
    eprintln!("[a2a] bridge listening on http://{addr}");

    for mut request in server.incoming_requests() {
        if *request.method() != Method::Post || request.url() != "/a2a" {
            let _ = request.respond(Response::from_string("ok"));
            continue;
        }
        let response = match parse_json_body(&mut request) {
            Ok(payload) => handle_a2a_request(dispatcher, &payload),
            Err(err) => serde_json::json!({
                "jsonrpc": "2.0",
                "id": null,
                "error": { "code": -32700, "message": err }
            }),
        };
        let body = response.to_string();
        let mut http_response = Response::from_string(body);
        if let Ok(header) =
            tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
        {
            http_response = http_response.with_header(header);
        }
        let _ = request.respond(http_response);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HubConfig;
    use serde_json::json;

    fn test_dispatcher(name: &str, exposed: Vec<String>) -> Dispatcher {
        let dir = std::env::temp_dir()
            .join("lorevault_test")
            .join(format!("bridge_{}_{name}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        HubConfig {
            data_dir: dir,
            disabled_tools: vec![],
            exposed_categories: exposed,
        }
        .build_dispatcher()
        .unwrap()
    }

    #[test]
    fn discover_lists_only_exposed_categories() {
        let d = test_dispatcher("discover", vec!["location".to_string()]);
        let out = handle_a2a_request(
            &d,
            &json!({ "jsonrpc": "2.0", "id": 1, "method": "a2a.discover" }),
        );
        let tools = out["result"]["tools"].as_array().unwrap();
        assert!(!tools.is_empty());
        for tool in tools {
            assert_eq!(tool["category"], "location");
        }
    }

    #[test]
    fn call_enforces_exposure_for_remote_callers() {
        let d = test_dispatcher("call_forbidden", vec!["location".to_string()]);
        let out = handle_a2a_request(
            &d,
            &json!({
                "jsonrpc": "2.0", "id": 2, "method": "a2a.call",
                "params": { "name": "add_entry", "arguments": { "content": "x" } }
            }),
        );
        assert_eq!(out["result"]["ok"], false);
        assert_eq!(out["result"]["error"]["kind"], "ForbiddenError");

        let out = handle_a2a_request(
            &d,
            &json!({
                "jsonrpc": "2.0", "id": 3, "method": "a2a.call",
                "params": { "name": "get_time", "arguments": {} }
            }),
        );
        assert_eq!(out["result"]["ok"], true);
    }

    #[test]
    fn unknown_method_and_missing_name_are_rpc_errors() {
        let d = test_dispatcher("rpc_errors", vec![]);
        let out = handle_a2a_request(&d, &json!({ "id": 4, "method": "a2a.nope" }));
        assert_eq!(out["error"]["code"], -32601);

        let out = handle_a2a_request(&d, &json!({ "id": 5, "method": "a2a.call", "params": {} }));
        assert_eq!(out["error"]["code"], -32602);
    }

    #[test]
    fn empty_allow_list_exposes_all_tools_to_discovery() {
        let d = test_dispatcher("discover_all", vec![]);
        let out = handle_a2a_request(&d, &json!({ "id": 6, "method": "a2a.discover" }));
        let tools = out["result"]["tools"].as_array().unwrap();
        let names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
        assert!(names.contains(&"add_entry"));
        assert!(names.contains(&"get_time"));
    }
}
