//! Opaque offset page tokens.
//!
//! A token is base64 (standard alphabet) of `offset:<n>`. Pages fetch one row
//! past the page size to decide whether a next token exists; the total count is
//! only computed for the first page.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::error::{NotedexError, Result};

const TOKEN_PREFIX: &str = "offset:";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
    /// Present on first pages only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_count: Option<u64>,
}

#[must_use]
pub fn encode_page_token(offset: usize) -> String {
    STANDARD.encode(format!("{TOKEN_PREFIX}{offset}"))
}

/// Empty or absent tokens mean the first page.
pub fn decode_page_token(token: Option<&str>) -> Result<usize> {
    let token = token.map(str::trim).unwrap_or_default();
    if token.is_empty() {
        return Ok(0);
    }
    let invalid = || NotedexError::Validation(format!("invalid page token: {token}"));
    let raw = STANDARD.decode(token).map_err(|_| invalid())?;
    let text = String::from_utf8(raw).map_err(|_| invalid())?;
    text.strip_prefix(TOKEN_PREFIX)
        .and_then(|offset| offset.parse::<usize>().ok())
        .ok_or_else(invalid)
}

/// Assembles a page from up to `page_size + 1` fetched rows starting at `offset`.
pub(crate) fn build_page<T>(
    mut rows: Vec<T>,
    offset: usize,
    page_size: usize,
    total_count: Option<u64>,
) -> Page<T> {
    let next_page_token = if rows.len() > page_size {
        rows.truncate(page_size);
        Some(encode_page_token(offset.saturating_add(page_size)))
    } else {
        None
    };
    Page {
        items: rows,
        next_page_token,
        total_count,
    }
}
