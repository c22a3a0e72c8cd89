use std::path::PathBuf;

use clap::{Args, Subcommand};

use super::parsers::{parse_min_one_usize, parse_record_id};

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// Directory walked recursively for `.md` / `.markdown` files.
    pub dir: PathBuf,
    /// Collection receiving every imported note (default collection when omitted).
    #[arg(long, value_parser = parse_record_id)]
    pub collection: Option<i64>,
    /// Exclude relative paths by glob pattern.
    #[arg(long = "exclude", value_name = "GLOB")]
    pub exclude: Vec<String>,
    #[arg(long, default_value_t = false)]
    pub include_hidden: bool,
}

#[derive(Debug, Args)]
pub struct AddArgs {
    pub file: PathBuf,
    #[arg(long, value_parser = parse_record_id)]
    pub collection: Option<i64>,
}

#[derive(Debug, Args)]
pub struct CollectionArgs {
    #[command(subcommand)]
    pub command: CollectionCommand,
}

#[derive(Debug, Subcommand)]
pub enum CollectionCommand {
    Create {
        name: String,
        #[arg(long, value_parser = parse_record_id)]
        parent: Option<i64>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        position: i64,
    },
    Get {
        #[arg(value_parser = parse_record_id)]
        id: i64,
    },
    /// Look a collection up by its materialized path, e.g. `projects/alpha`.
    Path { path: String },
    Ls {
        /// Parent collection; top-level collections when omitted.
        #[arg(long, value_parser = parse_record_id)]
        parent: Option<i64>,
        #[arg(long, value_parser = parse_min_one_usize)]
        page_size: Option<usize>,
        #[arg(long)]
        page_token: Option<String>,
    },
    Tree {
        #[arg(value_parser = parse_record_id)]
        id: i64,
        /// Levels below the root to include; 0 means unlimited.
        #[arg(long, default_value_t = 0)]
        max_depth: u32,
    },
    /// Replaces name, parent, description and position. Omitted optional
    /// values keep their current setting.
    Update {
        #[arg(value_parser = parse_record_id)]
        id: i64,
        #[arg(long)]
        name: String,
        #[arg(long, value_parser = parse_record_id, conflicts_with = "top_level")]
        parent: Option<i64>,
        /// Detach from the current parent.
        #[arg(long, default_value_t = false)]
        top_level: bool,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, allow_hyphen_values = true)]
        position: Option<i64>,
    },
    Rm {
        #[arg(value_parser = parse_record_id)]
        id: i64,
    },
}

#[derive(Debug, Args)]
pub struct NoteArgs {
    #[command(subcommand)]
    pub command: NoteCommand,
}

#[derive(Debug, Subcommand)]
pub enum NoteCommand {
    Get {
        #[arg(value_parser = parse_record_id)]
        id: i64,
    },
    Rm {
        #[arg(value_parser = parse_record_id)]
        id: i64,
    },
    Links {
        #[arg(value_parser = parse_record_id)]
        id: i64,
    },
    Backlinks {
        #[arg(value_parser = parse_record_id)]
        id: i64,
    },
}

#[derive(Debug, Args)]
pub struct ResolveArgs {
    pub title: String,
}

#[derive(Debug, Args)]
pub struct SearchArgs {
    #[arg(allow_hyphen_values = true)]
    pub query: String,
    #[arg(long, value_parser = parse_min_one_usize)]
    pub page_size: Option<usize>,
    #[arg(long)]
    pub page_token: Option<String>,
    /// Return highlighted excerpts instead of full bodies.
    #[arg(long, default_value_t = false)]
    pub snippets: bool,
}

#[derive(Debug, Args)]
pub struct IndexArgs {
    #[command(subcommand)]
    pub command: IndexCommand,
}

#[derive(Debug, Subcommand)]
pub enum IndexCommand {
    Rebuild,
    Check,
}
