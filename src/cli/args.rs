//! CLI argument definitions using clap

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand, ValueHint};

/// Hierarchical category catalog: browse, search and pick categories from a JSON snapshot
#[derive(Parser, Debug)]
#[command(name = "catpick")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Debug output (-d info, -dd debug, -ddd trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub debug: u8,

    /// Category snapshot (default: `source` from config)
    #[arg(short, long, global = true, value_hint = ValueHint::FilePath)]
    pub file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the category tree
    Tree {
        /// Keep only matches and their ancestors
        #[arg(long)]
        filter: Option<String>,
        /// Show every level instead of roots and their children
        #[arg(short, long)]
        all: bool,
    },

    /// List categories without children
    Leaves,

    /// Search categories by text
    Search {
        /// Case-insensitive substring
        query: String,
        /// Search descriptive fields too
        #[arg(long)]
        all_text: bool,
    },

    /// Show the reference card of a category
    Show {
        /// Id or code
        key: String,
    },

    /// Print the path from the root to a category
    Path {
        /// Id or code
        key: String,
    },

    /// Pick categories interactively and print the selection as JSON
    Pick {
        /// Multiple selection (each choice toggles, "done" finishes)
        #[arg(short, long)]
        multiple: bool,
        /// Selection policy: any, leaf-only, non-root-leaf, prefix:<code>
        #[arg(long)]
        policy: Option<String>,
        /// Current value (id); repeat in multiple mode
        #[arg(long = "current", value_name = "ID")]
        current: Vec<i64>,
    },

    /// Manage settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Generate shell completions
    Completion {
        /// Shell type
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show merged config
    Show,

    /// Create config template
    Init {
        /// Create global config
        #[arg(short, long)]
        global: bool,
    },

    /// Show config paths
    Path,
}
