use std::collections::HashMap;
use std::sync::Arc;

use super::{RecordStore, SemanticIndex, ToolError};

/// Shared state handed to every tool handler.
pub(crate) struct ToolContext {
    pub(crate) kb: Arc<RecordStore>,
    pub(crate) kb_index: Arc<SemanticIndex>,
    pub(crate) todos: Arc<RecordStore>,
}

pub(crate) type ToolHandler =
    fn(&ToolContext, serde_json::Value) -> Result<serde_json::Value, ToolError>;

pub(crate) struct ToolDescriptor {
    pub(crate) name: String,
    pub(crate) category: String,
    pub(crate) description: String,
    pub(crate) schema: serde_json::Value,
    pub(crate) handler: ToolHandler,
    pub(crate) enabled: bool,
}

/// The tool catalog. Assembled once at startup from explicit per-category
/// registration functions and handed to the dispatcher and transports by
/// reference. The deny-list and exposure allow-list are fixed at
/// construction.
pub(crate) struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
    by_name: HashMap<String, usize>,
    disabled_patterns: Vec<String>,
    exposed_categories: Vec<String>,
}

impl ToolRegistry {
    /// `disabled_patterns` entries take the forms `tool`, `category:tool`,
    /// or `category:*`. An empty `exposed_categories` exposes everything to
    /// remote callers.
    pub(crate) fn new(disabled_patterns: Vec<String>, exposed_categories: Vec<String>) -> Self {
        ToolRegistry {
            tools: Vec::new(),
            by_name: HashMap::new(),
            disabled_patterns,
            exposed_categories,
        }
    }

    pub(crate) fn register(
        &mut self,
        name: &str,
        category: &str,
        description: &str,
        schema: serde_json::Value,
        handler: ToolHandler,
    ) -> Result<(), String> {
        if name.trim().is_empty() {
            return Err("tool name cannot be empty".to_string());
        }
        if category.trim().is_empty() {
            return Err(format!("tool '{name}': category cannot be empty"));
        }
        if schema.get("type").and_then(|t| t.as_str()) != Some("object") {
            return Err(format!("tool '{name}': input schema must be an object schema"));
        }
        if self.by_name.contains_key(name) {
            return Err(format!("tool '{name}' is already registered"));
        }
        let enabled = !self.is_disabled(name, category);
        self.by_name.insert(name.to_string(), self.tools.len());
        self.tools.push(ToolDescriptor {
            name: name.to_string(),
            category: category.to_string(),
            description: description.to_string(),
            schema,
            handler,
            enabled,
        });
        Ok(())
    }

    fn is_disabled(&self, name: &str, category: &str) -> bool {
        let qualified = format!("{category}:{name}");
        let wildcard = format!("{category}:*");
        self.disabled_patterns
            .iter()
            .any(|p| p == name || *p == qualified || *p == wildcard)
    }

    pub(crate) fn is_exposed(&self, category: &str) -> bool {
        self.exposed_categories.is_empty()
            || self.exposed_categories.iter().any(|c| c == category)
    }

    pub(crate) fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.by_name.get(name).map(|idx| &self.tools[*idx])
    }

    /// Enabled tools, sorted by name. `category` narrows to one category.
    pub(crate) fn list(&self, category: Option<&str>) -> Vec<&ToolDescriptor> {
        let mut tools: Vec<&ToolDescriptor> = self
            .tools
            .iter()
            .filter(|t| t.enabled)
            .filter(|t| category.is_none_or(|c| t.category == c))
            .collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    /// Discovery listing for remote callers: enabled tools in exposed
    /// categories only.
    pub(crate) fn list_exposed(&self, category: Option<&str>) -> Vec<&ToolDescriptor> {
        self.list(category)
            .into_iter()
            .filter(|t| self.is_exposed(&t.category))
            .collect()
    }

    pub(crate) fn descriptor_json(tool: &ToolDescriptor) -> serde_json::Value {
        serde_json::json!({
            "name": tool.name,
            "category": tool.category,
            "description": tool.description,
            "inputSchema": tool.schema,
        })
    }
}
