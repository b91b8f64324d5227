use std::path::PathBuf;
use std::sync::Arc;

use super::{
    env_optional, parse_csv_list, tools, Dispatcher, RecordStore, SemanticIndex, ToolContext,
    ToolError, ToolRegistry,
};

pub(crate) const DEFAULT_DATA_DIR: &str = "lorevault_data";

/// Runtime configuration, assembled once at startup. CLI flags win over
/// environment variables, which win over defaults.
#[derive(Debug, Clone)]
pub(crate) struct HubConfig {
    pub(crate) data_dir: PathBuf,
    pub(crate) disabled_tools: Vec<String>,
    pub(crate) exposed_categories: Vec<String>,
}

impl HubConfig {
    pub(crate) fn from_env(cli_data_dir: Option<PathBuf>) -> Self {
        let data_dir = cli_data_dir
            .or_else(|| env_optional("LOREVAULT_DATA").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
        let disabled_tools = env_optional("DISABLED_TOOLS")
            .map(|raw| parse_csv_list(&raw))
            .unwrap_or_default();
        let exposed_categories = env_optional("EXPOSED_CATEGORIES")
            .map(|raw| parse_csv_list(&raw))
            .unwrap_or_default();
        HubConfig {
            data_dir,
            disabled_tools,
            exposed_categories,
        }
    }

    /// Opens the stores, assembles the tool catalog, and wires up the
    /// dispatcher. Knowledge entries and todos live in separate stores under
    /// the data directory; the semantic index covers knowledge entries only.
    pub(crate) fn build_dispatcher(&self) -> Result<Dispatcher, ToolError> {
        let kb = Arc::new(RecordStore::open(&self.data_dir.join("kb"))?);
        let todos = Arc::new(RecordStore::open(&self.data_dir.join("todos"))?);
        let kb_index = Arc::new(SemanticIndex::new(kb.clone()));

        let mut registry = ToolRegistry::new(
            self.disabled_tools.clone(),
            self.exposed_categories.clone(),
        );
        tools::register_all(&mut registry);

        if !self.disabled_tools.is_empty() {
            eprintln!("[config] disabled tools: {}", self.disabled_tools.join(", "));
        }
        if !self.exposed_categories.is_empty() {
            eprintln!(
                "[config] remote-exposed categories: {}",
                self.exposed_categories.join(", ")
            );
        }

        let context = ToolContext {
            kb,
            kb_index,
            todos,
        };
        Ok(Dispatcher::new(registry, context))
    }
}
