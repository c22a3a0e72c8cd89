use std::fs;
use std::path::PathBuf;

use tracing::info;

use crate::bulk::BulkWriter;
use crate::config::CoreConfig;
use crate::error::Result;
use crate::search::SearchEngine;
use crate::state::SqliteStateStore;
use crate::title_index::TitleIndex;

mod note_service;
mod query_service;
mod title_index_service;

/// Owns the relational store and the title index. The store is the source of
/// truth; the index is written after it and can always be rebuilt from it.
#[derive(Clone)]
pub struct Notedex {
    pub state: SqliteStateStore,
    config: CoreConfig,
    titles: TitleIndex,
    search: SearchEngine,
}

impl std::fmt::Debug for Notedex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notedex")
            .field("root", &self.config.root)
            .finish_non_exhaustive()
    }
}

impl Notedex {
    /// Opens (creating if needed) the data root with config from
    /// `<root>/notedex.toml` and the environment.
    pub fn new(root_dir: impl Into<PathBuf>) -> Result<Self> {
        let root = root_dir.into();
        fs::create_dir_all(&root)?;
        Self::with_config(CoreConfig::load(&root)?)
    }

    pub fn with_config(config: CoreConfig) -> Result<Self> {
        fs::create_dir_all(&config.root)?;
        let state = SqliteStateStore::open_with_writer(
            &config.db_path,
            BulkWriter::new(config.bulk_batch_size),
        )?;
        let titles = TitleIndex::open(&config.title_index_path)?;
        let search = SearchEngine::with_snippet_tokens(state.clone(), config.snippet_tokens);
        let app = Self {
            state,
            config,
            titles,
            search,
        };

        if app.titles.is_empty() && app.state.count_notes()? > 0 {
            info!("title index is empty; rebuilding from the notes table");
            app.rebuild_title_index()?;
        }
        Ok(app)
    }

    #[must_use]
    pub const fn config(&self) -> &CoreConfig {
        &self.config
    }

    #[must_use]
    pub const fn search_engine(&self) -> &SearchEngine {
        &self.search
    }

    #[must_use]
    pub const fn title_index(&self) -> &TitleIndex {
        &self.titles
    }

    /// Flushes the title index. Writes made after the last flush are otherwise
    /// only recoverable through a rebuild.
    pub fn close(self) -> Result<()> {
        self.titles.close()?;
        info!(root = %self.config.root.display(), "notedex closed");
        Ok(())
    }
}
