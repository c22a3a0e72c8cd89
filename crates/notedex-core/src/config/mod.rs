use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::bulk::{DEFAULT_BATCH_SIZE, MAX_BATCH_SIZE};
use crate::error::Result;
use crate::search::{DEFAULT_SNIPPET_TOKENS, MAX_SNIPPET_TOKENS};

mod env;

use env::{EnvSource, ProcessEnv, read_env_usize, read_non_empty_env};

pub const CONFIG_FILE_NAME: &str = "notedex.toml";

const ENV_DB_PATH: &str = "NOTEDEX_DB_PATH";
const ENV_TITLE_INDEX_PATH: &str = "NOTEDEX_TITLE_INDEX_PATH";
const ENV_BULK_BATCH_SIZE: &str = "NOTEDEX_BULK_BATCH_SIZE";
const ENV_DEFAULT_PAGE_SIZE: &str = "NOTEDEX_DEFAULT_PAGE_SIZE";
const ENV_MAX_PAGE_SIZE: &str = "NOTEDEX_MAX_PAGE_SIZE";
const ENV_SNIPPET_TOKENS: &str = "NOTEDEX_SNIPPET_TOKENS";

const DEFAULT_DB_FILE: &str = "notedex.sqlite3";
const DEFAULT_TITLE_INDEX_DIR: &str = "title-index";
const DEFAULT_PAGE_SIZE: usize = 50;
const DEFAULT_MAX_PAGE_SIZE: usize = 500;

/// Runtime settings: built-in defaults, then `<root>/notedex.toml`, then env.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    pub root: PathBuf,
    pub db_path: PathBuf,
    pub title_index_path: PathBuf,
    pub bulk_batch_size: usize,
    pub default_page_size: usize,
    pub max_page_size: usize,
    pub snippet_tokens: usize,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    db_path: Option<PathBuf>,
    title_index_path: Option<PathBuf>,
    bulk_batch_size: Option<usize>,
    default_page_size: Option<usize>,
    max_page_size: Option<usize>,
    snippet_tokens: Option<usize>,
}

impl CoreConfig {
    #[must_use]
    pub fn defaults(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        Self {
            db_path: root.join(DEFAULT_DB_FILE),
            title_index_path: root.join(DEFAULT_TITLE_INDEX_DIR),
            root,
            bulk_batch_size: DEFAULT_BATCH_SIZE,
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            snippet_tokens: DEFAULT_SNIPPET_TOKENS,
        }
    }

    pub fn load(root: impl AsRef<Path>) -> Result<Self> {
        Self::load_with(root.as_ref(), &ProcessEnv)
    }

    fn load_with(root: &Path, env: &impl EnvSource) -> Result<Self> {
        let mut config = Self::defaults(root);
        let file_path = root.join(CONFIG_FILE_NAME);
        if file_path.is_file() {
            let raw = std::fs::read_to_string(&file_path)?;
            let file = toml::from_str::<FileConfig>(&raw)?;
            config.apply_file(file);
            debug!(path = %file_path.display(), "config file applied");
        }
        config.apply_env(env);
        Ok(config.normalized())
    }

    /// Page size for a request: the default when unset or zero, capped at the maximum.
    #[must_use]
    pub fn page_size(&self, requested: Option<usize>) -> usize {
        requested
            .filter(|size| *size > 0)
            .unwrap_or(self.default_page_size)
            .min(self.max_page_size)
    }

    fn apply_file(&mut self, file: FileConfig) {
        if let Some(path) = file.db_path {
            self.db_path = self.resolve(path);
        }
        if let Some(path) = file.title_index_path {
            self.title_index_path = self.resolve(path);
        }
        if let Some(value) = file.bulk_batch_size {
            self.bulk_batch_size = value;
        }
        if let Some(value) = file.default_page_size {
            self.default_page_size = value;
        }
        if let Some(value) = file.max_page_size {
            self.max_page_size = value;
        }
        if let Some(value) = file.snippet_tokens {
            self.snippet_tokens = value;
        }
    }

    fn apply_env(&mut self, env: &impl EnvSource) {
        if let Some(path) = read_non_empty_env(env, ENV_DB_PATH) {
            self.db_path = self.resolve(PathBuf::from(path));
        }
        if let Some(path) = read_non_empty_env(env, ENV_TITLE_INDEX_PATH) {
            self.title_index_path = self.resolve(PathBuf::from(path));
        }
        if let Some(value) = read_env_usize(env, ENV_BULK_BATCH_SIZE, 1) {
            self.bulk_batch_size = value;
        }
        if let Some(value) = read_env_usize(env, ENV_DEFAULT_PAGE_SIZE, 1) {
            self.default_page_size = value;
        }
        if let Some(value) = read_env_usize(env, ENV_MAX_PAGE_SIZE, 1) {
            self.max_page_size = value;
        }
        if let Some(value) = read_env_usize(env, ENV_SNIPPET_TOKENS, 1) {
            self.snippet_tokens = value;
        }
    }

    fn normalized(mut self) -> Self {
        self.bulk_batch_size = self.bulk_batch_size.clamp(1, MAX_BATCH_SIZE);
        self.snippet_tokens = self.snippet_tokens.clamp(1, MAX_SNIPPET_TOKENS);
        self.default_page_size = self.default_page_size.max(1);
        self.max_page_size = self.max_page_size.max(self.default_page_size);
        self
    }

    fn resolve(&self, path: PathBuf) -> PathBuf {
        if path.is_absolute() {
            path
        } else {
            self.root.join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn defaults_live_under_root() {
        let env = HashMap::<&str, &str>::new();
        let config = CoreConfig::load_with(Path::new("/data/kb"), &env).expect("load");
        assert_eq!(config.db_path, PathBuf::from("/data/kb/notedex.sqlite3"));
        assert_eq!(config.title_index_path, PathBuf::from("/data/kb/title-index"));
        assert_eq!(config.bulk_batch_size, 500);
        assert_eq!(config.page_size(None), 50);
        assert_eq!(config.page_size(Some(0)), 50);
        assert_eq!(config.page_size(Some(10_000)), 500);
    }

    #[test]
    fn env_overrides_file_and_values_are_clamped() {
        let temp = tempdir().expect("tempdir");
        std::fs::write(
            temp.path().join(CONFIG_FILE_NAME),
            "db_path = \"store/db.sqlite3\"\nbulk_batch_size = 5000\nsnippet_tokens = 16\n",
        )
        .expect("write config");
        let env = HashMap::from([
            (ENV_SNIPPET_TOKENS, "200"),
            (ENV_DEFAULT_PAGE_SIZE, "not-a-number"),
            (ENV_TITLE_INDEX_PATH, "/abs/titles"),
        ]);

        let config = CoreConfig::load_with(temp.path(), &env).expect("load");
        assert_eq!(config.db_path, temp.path().join("store/db.sqlite3"));
        assert_eq!(config.title_index_path, PathBuf::from("/abs/titles"));
        assert_eq!(config.bulk_batch_size, MAX_BATCH_SIZE);
        assert_eq!(config.snippet_tokens, MAX_SNIPPET_TOKENS);
        assert_eq!(config.default_page_size, 50);
    }

    #[test]
    fn unknown_file_keys_are_rejected() {
        let temp = tempdir().expect("tempdir");
        std::fs::write(temp.path().join(CONFIG_FILE_NAME), "page_sise = 3\n").expect("write");
        let env = HashMap::<&str, &str>::new();
        let err = CoreConfig::load_with(temp.path(), &env).expect_err("typo");
        assert_eq!(err.code(), "CONFIG_ERROR");
    }

    #[test]
    fn max_page_size_never_drops_below_default() {
        let env = HashMap::from([(ENV_DEFAULT_PAGE_SIZE, "80"), (ENV_MAX_PAGE_SIZE, "20")]);
        let config = CoreConfig::load_with(Path::new("/kb"), &env).expect("load");
        assert_eq!(config.max_page_size, 80);
    }
}
