//! In-memory document store for previews and tests.
//!
//! Databases are lists of raw records kept in insertion order, which is
//! treated as the store-side sort order. Checkbox filters are honoured.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::Value;

use crate::application::store::{
    DocumentStore, FilterSpec, PropertyFilter, RawRecord, ResultPage, StoreError,
};
use crate::cache::lock::MutexRecover;
use crate::domain::entities::ContentBlock;

#[derive(Default)]
pub struct MemoryStore {
    databases: Mutex<HashMap<String, Vec<RawRecord>>>,
    blocks: Mutex<HashMap<String, Vec<ContentBlock>>>,
    queries: AtomicUsize,
    block_requests: AtomicUsize,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents of `database_id`.
    pub fn insert_records(&self, database_id: &str, records: Vec<RawRecord>) {
        self.databases
            .lock_recover("memory_store.insert_records")
            .insert(database_id.to_string(), records);
    }

    pub fn insert_blocks(&self, block_id: &str, blocks: Vec<ContentBlock>) {
        self.blocks
            .lock_recover("memory_store.insert_blocks")
            .insert(block_id.to_string(), blocks);
    }

    /// Make every subsequent request fail with a transport error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of `query_database` calls served so far, one per result page.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn block_request_count(&self) -> usize {
        self.block_requests.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::transport("memory store marked unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn query_database(
        &self,
        spec: &FilterSpec,
        cursor: Option<&str>,
    ) -> Result<ResultPage<RawRecord>, StoreError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        let databases = self.databases.lock_recover("memory_store.query_database");
        let records = databases
            .get(spec.database_id())
            .ok_or_else(|| not_found("database", spec.database_id()))?;
        let matching: Vec<&RawRecord> = records
            .iter()
            .filter(|record| matches_filter(record, spec.filter()))
            .collect();

        let page = slice_page(&matching, cursor, spec.page_size())?;
        Ok(ResultPage {
            results: page.results.into_iter().cloned().collect(),
            has_more: page.has_more,
            next_cursor: page.next_cursor,
        })
    }

    async fn block_children(
        &self,
        block_id: &str,
        page_size: u32,
        cursor: Option<&str>,
    ) -> Result<ResultPage<ContentBlock>, StoreError> {
        self.block_requests.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        let blocks = self.blocks.lock_recover("memory_store.block_children");
        let children = blocks
            .get(block_id)
            .ok_or_else(|| not_found("block", block_id))?;
        let all: Vec<&ContentBlock> = children.iter().collect();

        let page = slice_page(&all, cursor, page_size)?;
        Ok(ResultPage {
            results: page.results.into_iter().cloned().collect(),
            has_more: page.has_more,
            next_cursor: page.next_cursor,
        })
    }
}

fn slice_page<'a, T>(
    items: &[&'a T],
    cursor: Option<&str>,
    page_size: u32,
) -> Result<ResultPage<&'a T>, StoreError> {
    let start = match cursor {
        Some(cursor) => cursor.parse::<usize>().map_err(|_| StoreError::Api {
            status: 400,
            code: "validation_error".to_string(),
            message: format!("invalid start_cursor `{cursor}`"),
        })?,
        None => 0,
    };
    let size = page_size.max(1) as usize;
    let end = start.saturating_add(size).min(items.len());
    let results = items.get(start..end).unwrap_or_default().to_vec();
    let has_more = end < items.len();

    Ok(ResultPage {
        results,
        has_more,
        next_cursor: has_more.then(|| end.to_string()),
    })
}

fn matches_filter(record: &RawRecord, filter: Option<&PropertyFilter>) -> bool {
    match filter {
        None => true,
        Some(PropertyFilter::Checkbox { property, equals }) => {
            let checked = record
                .properties
                .get(property)
                .and_then(|value| value.get("checkbox"))
                .and_then(Value::as_bool)
                .unwrap_or(false);
            checked == *equals
        }
    }
}

fn not_found(kind: &str, id: &str) -> StoreError {
    StoreError::Api {
        status: 404,
        code: "object_not_found".to_string(),
        message: format!("could not find {kind} with id: {id}"),
    }
}
