use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "lorevault",
    about = "Tool-serving hub with versioned flat-file storage and TF-IDF search",
    version
)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Serve tools over MCP JSON-RPC on stdio
    Serve {
        /// Data directory (overrides LOREVAULT_DATA)
        #[arg(long)]
        data: Option<PathBuf>,
    },

    /// Expose the category-filtered tool subset over HTTP (POST /a2a)
    Bridge {
        /// Data directory (overrides LOREVAULT_DATA)
        #[arg(long)]
        data: Option<PathBuf>,

        /// Bind address
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,

        /// Port to listen on
        #[arg(short, long, default_value_t = 8700)]
        port: u16,
    },

    /// Print store and catalog counts
    Status {
        /// Data directory (overrides LOREVAULT_DATA)
        #[arg(long)]
        data: Option<PathBuf>,
    },

    /// Run a semantic search over knowledge entries from the command line
    Search {
        /// Query text
        query: String,

        /// Data directory (overrides LOREVAULT_DATA)
        #[arg(long)]
        data: Option<PathBuf>,

        /// Maximum number of hits
        #[arg(short = 'k', long, default_value_t = 10)]
        top_k: usize,
    },
}
