// Public fallible APIs in this crate share one concrete error contract (`NotedexError`).
// Repeating per-function `# Errors` boilerplate obscures behavior more than it clarifies.
#![allow(
    clippy::missing_errors_doc,
    reason = "crate-wide fallible API uses one explicit error type; per-item boilerplate would duplicate contract"
)]

pub mod bulk;
pub mod client;
pub mod config;
pub mod error;
pub mod ingest;
pub mod markdown;
pub mod models;
pub mod pagination;
pub mod search;
pub mod state;
pub(crate) mod text;
pub mod title_index;

pub use client::Notedex;
pub use error::{NotedexError, Result};
pub use pagination::Page;
pub use text::normalize_title;
