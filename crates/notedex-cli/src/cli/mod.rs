use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod args;
mod parsers;

#[cfg(test)]
mod tests;

pub use args::{
    AddArgs, CollectionArgs, CollectionCommand, ImportArgs, IndexArgs, IndexCommand, NoteArgs,
    NoteCommand, ResolveArgs, SearchArgs,
};

#[derive(Debug, Parser)]
#[command(name = "notedex")]
#[command(about = "Markdown knowledge base indexer", version)]
pub struct Cli {
    #[arg(long, default_value = ".notedex")]
    pub root: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    Init,
    Import(ImportArgs),
    Add(AddArgs),
    Collection(CollectionArgs),
    Note(NoteArgs),
    Resolve(ResolveArgs),
    Search(SearchArgs),
    Tags,
    Index(IndexArgs),
}

impl Commands {
    /// Dotted operation name used in error payloads.
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Import(_) => "import",
            Self::Add(_) => "note.process",
            Self::Collection(args) => match args.command {
                CollectionCommand::Create { .. } => "collection.create",
                CollectionCommand::Get { .. } => "collection.get",
                CollectionCommand::Path { .. } => "collection.get_by_path",
                CollectionCommand::Ls { .. } => "collection.list_children",
                CollectionCommand::Tree { .. } => "collection.subtree",
                CollectionCommand::Update { .. } => "collection.update",
                CollectionCommand::Rm { .. } => "collection.delete",
            },
            Self::Note(args) => match args.command {
                NoteCommand::Get { .. } => "note.get",
                NoteCommand::Rm { .. } => "note.delete",
                NoteCommand::Links { .. } => "note.links",
                NoteCommand::Backlinks { .. } => "note.backlinks",
            },
            Self::Resolve(_) => "title.resolve",
            Self::Search(_) => "search",
            Self::Tags => "tags.list",
            Self::Index(args) => match args.command {
                IndexCommand::Rebuild => "title_index.rebuild",
                IndexCommand::Check => "title_index.check",
            },
        }
    }
}
