//! Drains paginated store listings.

use std::collections::HashSet;

use tracing::{debug, instrument};

use crate::application::records::{Transform, transform};
use crate::application::store::{DocumentStore, FilterSpec, ResultPage, StoreError};
use crate::domain::entities::ContentBlock;

/// Fetch every record matching `spec`, keeping the valid ones in store order.
#[instrument(skip(store, spec), fields(kind = T::KIND, database_id = spec.database_id()))]
pub async fn fetch_all<T: Transform>(
    store: &dyn DocumentStore,
    spec: &FilterSpec,
) -> Result<Vec<T>, StoreError> {
    let mut items = Vec::new();
    let mut cursors = CursorTrail::default();
    let mut seen = 0usize;

    loop {
        let page = store.query_database(spec, cursors.current()).await?;
        seen += page.results.len();
        items.extend(page.results.iter().filter_map(transform::<T>));

        if !cursors.advance(&page)? {
            break;
        }
    }

    debug!(
        fetched = seen,
        kept = items.len(),
        pages = cursors.pages,
        "fetched database records"
    );
    Ok(items)
}

/// Fetch all first-level child blocks of `block_id`, in order.
#[instrument(skip(store))]
pub async fn fetch_block_children(
    store: &dyn DocumentStore,
    block_id: &str,
    page_size: u32,
) -> Result<Vec<ContentBlock>, StoreError> {
    let mut blocks = Vec::new();
    let mut cursors = CursorTrail::default();

    loop {
        let mut page = store
            .block_children(block_id, page_size, cursors.current())
            .await?;
        let more = cursors.advance(&page)?;
        blocks.append(&mut page.results);
        if !more {
            break;
        }
    }

    debug!(
        blocks = blocks.len(),
        pages = cursors.pages,
        "fetched child blocks"
    );
    Ok(blocks)
}

/// Tracks pagination cursors and rejects listings that would never finish.
#[derive(Default)]
struct CursorTrail {
    next: Option<String>,
    seen: HashSet<String>,
    pages: usize,
}

impl CursorTrail {
    fn current(&self) -> Option<&str> {
        self.next.as_deref()
    }

    /// Record `page`; returns whether another request is needed.
    fn advance<T>(&mut self, page: &ResultPage<T>) -> Result<bool, StoreError> {
        self.pages += 1;
        if !page.has_more {
            return Ok(false);
        }

        let cursor = page
            .next_cursor
            .as_deref()
            .filter(|cursor| !cursor.is_empty())
            .ok_or_else(|| StoreError::protocol("listing has more results but no next cursor"))?;
        if !self.seen.insert(cursor.to_string()) {
            return Err(StoreError::protocol(format!(
                "listing repeated cursor `{cursor}`"
            )));
        }
        self.next = Some(cursor.to_string());
        Ok(true)
    }
}
