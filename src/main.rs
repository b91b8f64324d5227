// Module declarations
mod bridge;
mod cli;
mod config;
mod dispatch;
mod index;
mod mcp;
mod registry;
mod schema;
mod store;
mod tools;
mod types;
mod util;

// Re-export module items at the crate root so cross-module references stay
// short.
#[allow(unused_imports)]
pub(crate) use bridge::*;
#[allow(unused_imports)]
pub(crate) use cli::*;
#[allow(unused_imports)]
pub(crate) use config::*;
#[allow(unused_imports)]
pub(crate) use dispatch::*;
#[allow(unused_imports)]
pub(crate) use index::*;
#[allow(unused_imports)]
pub(crate) use mcp::*;
#[allow(unused_imports)]
pub(crate) use registry::*;
#[allow(unused_imports)]
pub(crate) use store::*;
#[allow(unused_imports)]
pub(crate) use types::*;
#[allow(unused_imports)]
pub(crate) use util::*;

use std::sync::Arc;

use clap::Parser;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve { data } => {
            let config = HubConfig::from_env(data);
            let dispatcher = config.build_dispatcher()?;
            run_mcp_server(&dispatcher)
        }

        Command::Bridge { data, bind, port } => {
            let config = HubConfig::from_env(data);
            let dispatcher = config.build_dispatcher()?;
            run_a2a_bridge(&dispatcher, bind, port)
        }

        Command::Status { data } => {
            let config = HubConfig::from_env(data);
            let kb = RecordStore::open(&config.data_dir.join("kb"))?;
            let todos = RecordStore::open(&config.data_dir.join("todos"))?;
            let dispatcher = config.build_dispatcher()?;

            println!("data: {}", config.data_dir.display());
            println!("entries: {}", kb.list()?.len());
            println!("todos: {}", todos.list()?.len());
            println!("tools: {}", dispatcher.registry().list(None).len());
            if !config.disabled_tools.is_empty() {
                println!("disabled: {}", config.disabled_tools.join(", "));
            }
            if !config.exposed_categories.is_empty() {
                println!("exposed: {}", config.exposed_categories.join(", "));
            }
            Ok(())
        }

        Command::Search { query, data, top_k } => {
            let config = HubConfig::from_env(data);
            let kb = Arc::new(RecordStore::open(&config.data_dir.join("kb"))?);
            let index = SemanticIndex::new(kb);
            let hits = index.search(&query, top_k)?;
            if hits.is_empty() {
                println!("no matches");
                return Ok(());
            }
            for hit in hits {
                let preview: String = hit.body.chars().take(80).collect();
                println!("{:.4}  {}  {}", hit.score, hit.id, preview);
            }
            Ok(())
        }
    }
}
