use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use notedex_core::Notedex;
use notedex_core::models::ImportOptions;

use crate::cli::{Commands, IndexCommand};

mod handlers;
mod support;

use self::handlers::{handle_collection, handle_note};
use self::support::print_json;

pub(crate) fn run_from_root(root: &Path, command: Commands) -> Result<()> {
    let app = Notedex::new(root).context("failed to open notedex root")?;
    let outcome = run_validated(&app, root, command);
    let closed = app.close();
    outcome?;
    closed.context("failed to flush title index")?;
    Ok(())
}

fn run_validated(app: &Notedex, root: &Path, command: Commands) -> Result<()> {
    match command {
        Commands::Init => {
            print_json(&serde_json::json!({
                "status": "ok",
                "root": root.display().to_string(),
                "default_collection_id": app.state.default_collection_id()?,
                "inbox_collection_id": app.state.inbox_collection_id()?,
            }))?;
        }
        Commands::Import(args) => {
            let options = ImportOptions {
                collection_id: args.collection,
                exclude_globs: args.exclude,
                include_hidden: args.include_hidden,
            };
            let report = app.import_directory(&args.dir, &options)?;
            print_json(&report)?;
        }
        Commands::Add(args) => {
            let source = fs::canonicalize(&args.file)
                .with_context(|| format!("failed to resolve {}", args.file.display()))?;
            let raw = fs::read(&source)
                .with_context(|| format!("failed to read {}", source.display()))?;
            let source_key = source.to_string_lossy();
            let processed = app.process_source_note(args.collection, &source_key, &raw)?;
            print_json(&processed)?;
        }
        Commands::Collection(args) => handle_collection(app, args.command)?,
        Commands::Note(args) => handle_note(app, args.command)?,
        Commands::Resolve(args) => {
            let note_id = app.resolve_link(&args.title)?;
            print_json(&serde_json::json!({
                "title": args.title,
                "note_id": note_id,
            }))?;
        }
        Commands::Search(args) => {
            let page = app.search_page(
                &args.query,
                args.page_size,
                args.page_token.as_deref(),
                args.snippets,
            )?;
            print_json(&page)?;
        }
        Commands::Tags => {
            print_json(&app.state.list_tags()?)?;
        }
        Commands::Index(args) => match args.command {
            IndexCommand::Rebuild => print_json(&app.rebuild_title_index()?)?,
            IndexCommand::Check => print_json(&app.check_title_index()?)?,
        },
    }
    Ok(())
}
