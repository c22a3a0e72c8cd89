//! From raw Markdown bytes to a [`NoteWrite`], and directory walks feeding
//! files through that path.

use std::fs;
use std::path::{Component, Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{NotedexError, Result};
use crate::markdown::{self, ParseResult};
use crate::models::{CollectionId, ImportFailure, ImportOptions, ImportReport, ProcessedNote};
use crate::state::{LinkWrite, NoteWrite};

pub const UNTITLED: &str = "Untitled";
const MAX_DERIVED_TITLE_CHARS: usize = 120;

/// Parses `raw` and assembles everything the store needs for a note with no
/// source identity. Link hints are left empty for the caller to fill from the
/// title index.
pub fn prepare_note(raw: &[u8], collection_id: Option<CollectionId>) -> Result<NoteWrite> {
    let parsed = markdown::parse(raw)?;
    let title = derive_title(&parsed, None);
    Ok(assemble(raw, parsed, title, collection_id, None))
}

/// Like [`prepare_note`], keyed on `source_key` (a `/`-separated path). The
/// file stem stands in for a title before the first body line does.
pub fn prepare_source_note(
    raw: &[u8],
    source_key: &str,
    collection_id: Option<CollectionId>,
) -> Result<NoteWrite> {
    let parsed = markdown::parse(raw)?;
    let stem = Path::new(source_key)
        .file_stem()
        .and_then(|stem| stem.to_str());
    let title = derive_title(&parsed, stem);
    Ok(assemble(
        raw,
        parsed,
        title,
        collection_id,
        Some(source_key.to_string()),
    ))
}

fn assemble(
    raw: &[u8],
    parsed: ParseResult,
    title: String,
    collection_id: Option<CollectionId>,
    source_key: Option<String>,
) -> NoteWrite {
    let mut tags = parsed.frontmatter_tags();
    for tag in &parsed.tags {
        if !tags.contains(tag) {
            tags.push(tag.clone());
        }
    }
    tags.sort();

    let links = parsed
        .links
        .iter()
        .map(|link| LinkWrite {
            target_title: link.target.clone(),
            display_text: link.display.clone(),
            is_embed: link.is_embed,
            target_hint: None,
        })
        .collect();

    NoteWrite {
        title,
        body: parsed.body,
        collection_id,
        source_key,
        frontmatter: parsed.frontmatter,
        content_hash: blake3::hash(raw).to_hex().to_string(),
        tags,
        links,
    }
}

/// Frontmatter `title`, else the first H1, else the file stem when there is
/// one, else the first non-blank body line.
#[must_use]
pub fn derive_title(parsed: &ParseResult, file_stem: Option<&str>) -> String {
    if let Some(title) = parsed.frontmatter_title() {
        return title.to_string();
    }
    if let Some(heading) = parsed.heading.as_deref().map(str::trim)
        && !heading.is_empty()
    {
        return heading.to_string();
    }
    if let Some(stem) = file_stem.map(str::trim)
        && !stem.is_empty()
    {
        return stem.to_string();
    }
    parsed
        .body
        .lines()
        .map(|line| line.trim().trim_start_matches('#').trim())
        .find(|line| !line.is_empty())
        .map_or_else(
            || UNTITLED.to_string(),
            |line| line.chars().take(MAX_DERIVED_TITLE_CHARS).collect(),
        )
}

/// Feeds every Markdown file under `root` through `process` along with its
/// `/`-separated path relative to `root`. Per-file failures are collected in
/// the report; only an unreadable root or bad globs abort.
pub fn import_directory<F>(root: &Path, options: &ImportOptions, mut process: F) -> Result<ImportReport>
where
    F: FnMut(&[u8], &str, Option<CollectionId>) -> Result<ProcessedNote>,
{
    if !root.is_dir() {
        return Err(NotedexError::Validation(format!(
            "import source is not a directory: {}",
            root.display()
        )));
    }
    let filter = ImportPathFilter::new(options)?;
    let (files, skipped) = collect_markdown_files(root, &filter)?;

    let mut report = ImportReport {
        skipped,
        ..ImportReport::default()
    };
    for relative in files {
        let relative_path = relative_to_unix_path(&relative);
        let outcome = fs::read(root.join(&relative))
            .map_err(NotedexError::from)
            .and_then(|raw| process(&raw, &relative_path, options.collection_id));
        match outcome {
            Ok(processed) => {
                debug!(path = %relative_path, note_id = processed.note_id, "imported");
                report.imported.push(processed);
            }
            Err(err) if err.is_client_error() || matches!(err, NotedexError::Io(_)) => {
                warn!(path = %relative_path, error = %err, "note import failed");
                report.failed.push(ImportFailure {
                    relative_path,
                    code: err.code().to_string(),
                    message: err.to_string(),
                });
            }
            Err(err) => return Err(err),
        }
    }
    info!(
        root = %root.display(),
        imported = report.imported.len(),
        failed = report.failed.len(),
        skipped = report.skipped,
        "directory import finished"
    );
    Ok(report)
}

/// Relative paths of accepted Markdown files in walk order, plus the count of
/// regular files that were filtered out.
fn collect_markdown_files(root: &Path, filter: &ImportPathFilter) -> Result<(Vec<PathBuf>, usize)> {
    let entries = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if entry.path() == root {
                return true;
            }
            let Ok(relative) = entry.path().strip_prefix(root) else {
                return true;
            };
            if entry.file_type().is_dir() {
                filter.allows_directory(relative)
            } else {
                true
            }
        });

    let mut files = Vec::new();
    let mut skipped = 0usize;
    for entry in entries {
        let entry = entry.map_err(|err| NotedexError::Validation(err.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|err| NotedexError::Validation(err.to_string()))?;
        if filter.allows_file(relative) {
            files.push(relative.to_path_buf());
        } else {
            skipped += 1;
        }
    }
    Ok((files, skipped))
}

#[derive(Debug)]
struct ImportPathFilter {
    include_hidden: bool,
    exclude: GlobSet,
}

impl ImportPathFilter {
    fn new(options: &ImportOptions) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &options.exclude_globs {
            let trimmed = pattern.trim();
            if trimmed.is_empty() {
                continue;
            }
            let glob = Glob::new(trimmed).map_err(|err| {
                NotedexError::Validation(format!("invalid import exclude glob '{trimmed}': {err}"))
            })?;
            builder.add(glob);
        }

        let exclude = builder.build().map_err(|err| {
            NotedexError::Validation(format!("invalid import exclude globs: {err}"))
        })?;

        Ok(Self {
            include_hidden: options.include_hidden,
            exclude,
        })
    }

    fn allows_directory(&self, relative: &Path) -> bool {
        if relative.as_os_str().is_empty() {
            return true;
        }
        if !self.include_hidden && path_has_hidden_component(relative) {
            return false;
        }
        !self.exclude.is_match(relative_to_unix_path(relative))
    }

    fn allows_file(&self, relative: &Path) -> bool {
        if !self.include_hidden && path_has_hidden_component(relative) {
            return false;
        }
        if self.exclude.is_match(relative_to_unix_path(relative)) {
            return false;
        }
        relative
            .extension()
            .and_then(|x| x.to_str())
            .is_some_and(|x| matches!(x.to_ascii_lowercase().as_str(), "md" | "markdown"))
    }
}

fn path_has_hidden_component(path: &Path) -> bool {
    path.components().any(|component| match component {
        Component::Normal(value) => value.to_string_lossy().starts_with('.'),
        _ => false,
    })
}

fn relative_to_unix_path(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(value) => Some(value.to_string_lossy().to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
