use anyhow::Result;
use notedex_core::Notedex;
use notedex_core::models::CollectionUpdate;

use crate::cli::{CollectionCommand, NoteCommand};

use super::support::print_json;

pub(super) fn handle_collection(app: &Notedex, command: CollectionCommand) -> Result<()> {
    match command {
        CollectionCommand::Create {
            name,
            parent,
            description,
            position,
        } => {
            let created =
                app.state
                    .create_collection(&name, parent, description.as_deref(), position)?;
            print_json(&created)?;
        }
        CollectionCommand::Get { id } => {
            print_json(&app.state.get_collection(id)?)?;
        }
        CollectionCommand::Path { path } => {
            print_json(&app.state.get_collection_by_path(&path)?)?;
        }
        CollectionCommand::Ls {
            parent,
            page_size,
            page_token,
        } => {
            let page = app.list_children_page(parent, page_size, page_token.as_deref())?;
            print_json(&page)?;
        }
        CollectionCommand::Tree { id, max_depth } => {
            print_json(&app.state.get_subtree(id, max_depth)?)?;
        }
        CollectionCommand::Update {
            id,
            name,
            parent,
            top_level,
            description,
            position,
        } => {
            let current = app.state.get_collection(id)?;
            let mut update = CollectionUpdate::from_current(&current);
            update.name = name;
            if top_level {
                update.parent_id = None;
            } else if parent.is_some() {
                update.parent_id = parent;
            }
            if description.is_some() {
                update.description = description;
            }
            if let Some(position) = position {
                update.position = position;
            }
            print_json(&app.state.update_collection(id, &update)?)?;
        }
        CollectionCommand::Rm { id } => {
            app.state.delete_collection(id)?;
            print_json(&serde_json::json!({
                "status": "ok",
                "id": id,
            }))?;
        }
    }
    Ok(())
}

pub(super) fn handle_note(app: &Notedex, command: NoteCommand) -> Result<()> {
    match command {
        NoteCommand::Get { id } => print_json(&app.state.get_note(id)?)?,
        NoteCommand::Rm { id } => print_json(&app.delete_note(id)?)?,
        NoteCommand::Links { id } => {
            app.state.get_note(id)?;
            print_json(&app.state.outgoing_links(id)?)?;
        }
        NoteCommand::Backlinks { id } => {
            app.state.get_note(id)?;
            print_json(&app.state.backlinks(id)?)?;
        }
    }
    Ok(())
}
