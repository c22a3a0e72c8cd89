use tracing::debug;

use crate::error::Result;
use crate::models::{Collection, CollectionId, SearchResult};
use crate::pagination::{Page, build_page, decode_page_token};

use super::Notedex;

impl Notedex {
    /// Children of `parent_id` (roots when `None`) one page at a time.
    pub fn list_children_page(
        &self,
        parent_id: Option<CollectionId>,
        page_size: Option<usize>,
        page_token: Option<&str>,
    ) -> Result<Page<Collection>> {
        let offset = decode_page_token(page_token)?;
        let page_size = self.config.page_size(page_size);
        let rows = self
            .state
            .list_children(parent_id, page_size.saturating_add(1), offset)?;
        let total_count = if is_first_page(page_token) {
            Some(self.state.count_children(parent_id)?)
        } else {
            None
        };
        Ok(build_page(rows, offset, page_size, total_count))
    }

    /// Ranked search one page at a time; `snippets` swaps bodies for highlighted excerpts.
    pub fn search_page(
        &self,
        query: &str,
        page_size: Option<usize>,
        page_token: Option<&str>,
        snippets: bool,
    ) -> Result<Page<SearchResult>> {
        let offset = decode_page_token(page_token)?;
        let page_size = self.config.page_size(page_size);
        let fetch = page_size.saturating_add(1);
        let rows = if snippets {
            self.search.search_with_snippet(query, fetch, offset)?
        } else {
            self.search.search(query, fetch, offset)?
        };
        let total_count = if is_first_page(page_token) {
            Some(self.search.count(query)?)
        } else {
            None
        };
        debug!(offset, page_size, hits = rows.len(), "search page");
        Ok(build_page(rows, offset, page_size, total_count))
    }
}

fn is_first_page(page_token: Option<&str>) -> bool {
    page_token.is_none_or(|token| token.trim().is_empty())
}
