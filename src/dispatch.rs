use std::panic::{catch_unwind, AssertUnwindSafe};

use super::{err_envelope, ok_envelope, schema, Caller, ToolContext, ToolError, ToolRegistry};

/// Routes every invocation, local or remote, through the same checks:
/// resolve, disablement, exposure, schema validation, then the handler under
/// `catch_unwind` so a panicking tool cannot take the process down.
pub(crate) struct Dispatcher {
    registry: ToolRegistry,
    context: ToolContext,
}

impl Dispatcher {
    pub(crate) fn new(registry: ToolRegistry, context: ToolContext) -> Self {
        Dispatcher { registry, context }
    }

    pub(crate) fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Always returns the uniform envelope; failures are structured values,
    /// never a crash or an unstructured string.
    pub(crate) fn call(
        &self,
        name: &str,
        arguments: serde_json::Value,
        caller: Caller,
    ) -> serde_json::Value {
        match self.try_call(name, arguments, caller) {
            Ok(result) => ok_envelope(result),
            Err(err) => {
                eprintln!("[dispatch] '{name}' failed: {err}");
                err_envelope(&err)
            }
        }
    }

    fn try_call(
        &self,
        name: &str,
        arguments: serde_json::Value,
        caller: Caller,
    ) -> Result<serde_json::Value, ToolError> {
        let tool = self
            .registry
            .get(name)
            .ok_or_else(|| ToolError::NotFound(format!("no tool named '{name}'")))?;
        if !tool.enabled {
            return Err(ToolError::ToolDisabled(format!(
                "tool '{name}' is disabled by configuration"
            )));
        }
        if caller == Caller::Remote && !self.registry.is_exposed(&tool.category) {
            return Err(ToolError::Forbidden(format!(
                "category '{}' is not exposed to remote callers",
                tool.category
            )));
        }
        schema::validate(&tool.schema, &arguments).map_err(ToolError::Validation)?;

        let handler = tool.handler;
        match catch_unwind(AssertUnwindSafe(|| handler(&self.context, arguments))) {
            Ok(result) => result,
            Err(panic_info) => {
                let msg = panic_info
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic_info.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                eprintln!("[dispatch] tool '{name}' panicked: {msg}");
                Err(ToolError::ToolExecution(format!(
                    "tool '{name}' panicked: {msg}"
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RecordStore, SemanticIndex};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    static SIDE_EFFECTS: AtomicUsize = AtomicUsize::new(0);
    // Separate counter for tools that must never run, so parallel tests
    // exercising the happy path cannot disturb the assertion.
    static GUARDED_RUNS: AtomicUsize = AtomicUsize::new(0);

    fn counting_handler(
        _ctx: &ToolContext,
        _args: serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        SIDE_EFFECTS.fetch_add(1, Ordering::SeqCst);
        Ok(json!({"done": true}))
    }

    fn guarded_handler(
        _ctx: &ToolContext,
        _args: serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        GUARDED_RUNS.fetch_add(1, Ordering::SeqCst);
        Ok(json!({"done": true}))
    }

    fn panicking_handler(
        _ctx: &ToolContext,
        _args: serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        panic!("boom in handler");
    }

    fn failing_handler(
        _ctx: &ToolContext,
        _args: serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        Err(ToolError::Storage("disk on fire".to_string()))
    }

    fn test_context(name: &str) -> ToolContext {
        let dir = std::env::temp_dir()
            .join("lorevault_test")
            .join(format!("dispatch_{}_{name}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let kb = Arc::new(RecordStore::open(&dir.join("kb")).unwrap());
        let todos = Arc::new(RecordStore::open(&dir.join("todos")).unwrap());
        let kb_index = Arc::new(SemanticIndex::new(kb.clone()));
        ToolContext {
            kb,
            kb_index,
            todos,
        }
    }

    fn schema_requiring_text() -> serde_json::Value {
        json!({
            "type": "object",
            "properties": { "text": { "type": "string" } },
            "required": ["text"]
        })
    }

    fn build_dispatcher(
        name: &str,
        disabled: Vec<String>,
        exposed: Vec<String>,
    ) -> Dispatcher {
        let mut registry = ToolRegistry::new(disabled, exposed);
        registry
            .register("echo", "knowledge_base", "d", schema_requiring_text(), counting_handler)
            .unwrap();
        registry
            .register("crash", "knowledge_base", "d", json!({"type": "object"}), panicking_handler)
            .unwrap();
        registry
            .register("fail", "knowledge_base", "d", json!({"type": "object"}), failing_handler)
            .unwrap();
        registry
            .register("get_time", "location", "d", json!({"type": "object"}), counting_handler)
            .unwrap();
        registry
            .register("guarded", "knowledge_base", "d", schema_requiring_text(), guarded_handler)
            .unwrap();
        Dispatcher::new(registry, test_context(name))
    }

    #[test]
    fn success_uses_ok_envelope() {
        let d = build_dispatcher("ok", vec![], vec![]);
        let out = d.call("echo", json!({"text": "hi"}), Caller::Local);
        assert_eq!(out["ok"], true);
        assert_eq!(out["result"]["done"], true);
    }

    #[test]
    fn unknown_tool_is_not_found() {
        let d = build_dispatcher("unknown", vec![], vec![]);
        let out = d.call("nope", json!({}), Caller::Local);
        assert_eq!(out["ok"], false);
        assert_eq!(out["error"]["kind"], "NotFoundError");
    }

    #[test]
    fn disabled_tool_is_rejected_without_running() {
        let d = build_dispatcher("disabled", vec!["knowledge_base:guarded".to_string()], vec![]);
        let before = GUARDED_RUNS.load(Ordering::SeqCst);
        let out = d.call("guarded", json!({"text": "hi"}), Caller::Local);
        assert_eq!(out["error"]["kind"], "ToolDisabledError");
        assert_eq!(GUARDED_RUNS.load(Ordering::SeqCst), before);
    }

    #[test]
    fn invalid_arguments_never_reach_the_handler() {
        let d = build_dispatcher("validation", vec![], vec![]);
        let before = GUARDED_RUNS.load(Ordering::SeqCst);
        let out = d.call("guarded", json!({"text": 42}), Caller::Local);
        assert_eq!(out["error"]["kind"], "ValidationError");
        let out = d.call("guarded", json!({}), Caller::Local);
        assert_eq!(out["error"]["kind"], "ValidationError");
        assert_eq!(GUARDED_RUNS.load(Ordering::SeqCst), before);
    }

    #[test]
    fn remote_callers_hit_the_exposure_check() {
        let d = build_dispatcher("exposure", vec![], vec!["location".to_string()]);
        let out = d.call("echo", json!({"text": "hi"}), Caller::Remote);
        assert_eq!(out["error"]["kind"], "ForbiddenError");

        let out = d.call("get_time", json!({}), Caller::Remote);
        assert_eq!(out["ok"], true);

        // Local callers bypass the allow-list entirely.
        let out = d.call("echo", json!({"text": "hi"}), Caller::Local);
        assert_eq!(out["ok"], true);
    }

    #[test]
    fn panics_normalize_to_tool_execution_error() {
        let d = build_dispatcher("panic", vec![], vec![]);
        let out = d.call("crash", json!({}), Caller::Local);
        assert_eq!(out["ok"], false);
        assert_eq!(out["error"]["kind"], "ToolExecutionError");
        let msg = out["error"]["message"].as_str().unwrap();
        assert!(msg.contains("boom in handler"), "got: {msg}");
    }

    #[test]
    fn handler_errors_keep_their_kind() {
        let d = build_dispatcher("kinds", vec![], vec![]);
        let out = d.call("fail", json!({}), Caller::Local);
        assert_eq!(out["error"]["kind"], "StorageError");
        assert_eq!(out["error"]["message"], "disk on fire");
    }
}
