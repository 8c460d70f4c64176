//! The sync pipeline: load cache, list pages, diff, re-cache stale pages.
//!
//! [`Syncer`] wires the injected clients together and runs the five steps
//! strictly in order, one page at a time. Page-level work is sequential by
//! design: the admission queue is the only throttle, and uniform progress
//! reporting is the only reason the page loop exists at all.

use crate::cache::CacheStore;
use crate::config::RETRY_BUDGET;
use crate::diff::stale_pages;
use crate::fetch::BlockFetcher;
use crate::notion::DocumentApi;
use crate::queue::AdmissionQueue;
use crate::retry::retry;
use crate::store::ObjectStore;
use crate::types::{CachedBundle, Page, PageBundle};
use crate::{Error, Result};
use tracing::{info, warn};

/// Sink for coarse progress reporting, implemented by the CLI with real
/// progress bars and by tests with a no-op.
pub trait Progress: Send + Sync {
    /// A new pass over `total` items begins.
    fn begin(&self, label: &str, total: usize);
    /// One item finished.
    fn tick(&self);
    /// The current pass is complete.
    fn finish(&self);
}

/// No-op progress sink.
pub struct NoProgress;

impl Progress for NoProgress {
    fn begin(&self, _label: &str, _total: usize) {}
    fn tick(&self) {}
    fn finish(&self) {}
}

/// Outcome counts for one sync run, for the final log line only; skipped
/// pages do not affect the exit status.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct SyncReport {
    /// Bundles successfully loaded from the cache.
    pub cached: usize,
    /// Published pages listed from the database.
    pub pages: usize,
    /// Pages that needed re-caching.
    pub stale: usize,
    /// Pages re-cached this run.
    pub synced: usize,
    /// Stale pages left uncached because their block tree could not be
    /// fetched; they will be retried on the next run.
    pub skipped: usize,
}

/// Orchestrates one full sync run over injected clients.
pub struct Syncer<'a, D: DocumentApi, O: ObjectStore> {
    api: &'a D,
    cache: CacheStore<'a, O>,
    queue: &'a AdmissionQueue,
    database_id: String,
    budget: u32,
}

impl<'a, D: DocumentApi, O: ObjectStore> Syncer<'a, D, O> {
    /// Creates a syncer with the default retry budget.
    pub fn new(
        api: &'a D,
        cache: CacheStore<'a, O>,
        queue: &'a AdmissionQueue,
        database_id: impl Into<String>,
    ) -> Self {
        Self {
            api,
            cache,
            queue,
            database_id: database_id.into(),
            budget: RETRY_BUDGET,
        }
    }

    /// Overrides the retry budget (tests use 0 to fail fast).
    #[must_use]
    pub fn with_retry_budget(mut self, budget: u32) -> Self {
        self.budget = budget;
        self
    }

    /// Run the pipeline start to finish.
    ///
    /// Fails only when the page listing cannot be fetched at all or a local
    /// disk write fails; everything else degrades to logged skips.
    pub async fn run(&self, progress: &dyn Progress) -> Result<SyncReport> {
        let mut report = SyncReport::default();

        // 1. Previously cached bundles.
        let keys = self.cache.list_keys().await;
        progress.begin("loading cache", keys.len());
        let mut cached: Vec<CachedBundle> = Vec::new();
        for key in &keys {
            if let Some(bundle) = self.cache.load_bundle(key).await {
                cached.push(bundle);
            }
            progress.tick();
        }
        progress.finish();
        report.cached = cached.len();
        info!(objects = keys.len(), bundles = cached.len(), "loaded cache");

        // 2. Live published pages.
        let pages = self.list_pages().await?;
        report.pages = pages.len();

        // 3. Update set.
        let stale = stale_pages(&pages, &cached);
        report.stale = stale.len();
        info!(pages = pages.len(), stale = stale.len(), "computed update set");

        // 4 + 5. Re-cache stale pages, one at a time.
        let fetcher = BlockFetcher::new(self.api, self.queue).with_retry_budget(self.budget);
        progress.begin("caching pages", stale.len());
        for page in stale {
            info!(slug = page.cache_key(), "caching page");
            match fetcher.fetch_page_tree(&page.id).await {
                Some(blocks) => {
                    let bundle = PageBundle {
                        page_id: page.id.clone(),
                        last_edited_time: page.last_edited_time.clone(),
                        slug: page.slug.clone(),
                        blocks,
                    };
                    self.cache.save_bundle(page.cache_key(), &bundle).await?;
                    report.synced += 1;
                },
                None => {
                    warn!(page_id = page.id, "page left uncached this run");
                    report.skipped += 1;
                },
            }
            progress.tick();
        }
        progress.finish();

        info!(
            synced = report.synced,
            skipped = report.skipped,
            "sync complete"
        );
        Ok(report)
    }

    /// Query the database to exhaustion, mapping records into [`Page`]s.
    ///
    /// Records missing their id or timestamp are logged and dropped rather
    /// than failing the listing.
    async fn list_pages(&self) -> Result<Vec<Page>> {
        let mut pages = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let result = retry(self.budget, || {
                let cursor = cursor.clone();
                async move {
                    self.queue.acquire().await;
                    self.api
                        .query_database(&self.database_id, cursor.as_deref())
                        .await
                }
            })
            .await
            .ok_or_else(|| Error::Exhausted {
                operation: "listing published pages".to_string(),
            })?;

            for record in &result.results {
                match Page::from_record(record) {
                    Some(page) => pages.push(page),
                    None => warn!("dropping malformed page record"),
                }
            }

            if !result.has_more {
                break;
            }
            match result.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(pages)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::notion::{ChildrenPage, QueryPage};
    use crate::store::ListPage;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct MockApi {
        query_pages: Vec<QueryPage>,
        children: HashMap<String, Vec<crate::Block>>,
        query_calls: Mutex<usize>,
    }

    #[async_trait]
    impl DocumentApi for MockApi {
        async fn query_database(&self, _: &str, cursor: Option<&str>) -> crate::Result<QueryPage> {
            *self.query_calls.lock().unwrap() += 1;
            let index = cursor.map_or(0, |c| c.parse::<usize>().unwrap());
            self.query_pages.get(index).cloned().ok_or(Error::Api {
                status: 500,
                message: "no query fixture".to_string(),
            })
        }

        async fn list_children(
            &self,
            block_id: &str,
            _cursor: Option<&str>,
        ) -> crate::Result<ChildrenPage> {
            self.children
                .get(block_id)
                .map(|results| ChildrenPage {
                    results: results.clone(),
                    has_more: false,
                    next_cursor: None,
                })
                .ok_or(Error::Api {
                    status: 404,
                    message: format!("no children fixture for {block_id}"),
                })
        }

        async fn retrieve_block(&self, block_id: &str) -> crate::Result<crate::Block> {
            Err(Error::Api {
                status: 404,
                message: format!("no block fixture for {block_id}"),
            })
        }
    }

    #[derive(Default)]
    struct MockStore {
        objects: Mutex<HashMap<String, Vec<u8>>>,
    }

    #[async_trait]
    impl crate::store::ObjectStore for MockStore {
        async fn put(&self, key: &str, bytes: Vec<u8>, _: &str) -> crate::Result<()> {
            self.objects.lock().unwrap().insert(key.to_string(), bytes);
            Ok(())
        }

        async fn list(&self, _: &str, _: Option<&str>) -> crate::Result<ListPage> {
            Ok(ListPage {
                keys: self.objects.lock().unwrap().keys().cloned().collect(),
                is_truncated: false,
                next_continuation: None,
            })
        }

        async fn get(&self, key: &str) -> crate::Result<Vec<u8>> {
            self.objects
                .lock()
                .unwrap()
                .get(key)
                .cloned()
                .ok_or_else(|| Error::Storage(format!("no such key: {key}")))
        }
    }

    fn page_record(id: &str, edited: &str, slug: &str) -> Value {
        json!({
            "id": id,
            "last_edited_time": edited,
            "properties": {
                "Slug": { "rich_text": [{ "plain_text": slug }] }
            }
        })
    }

    fn query_page(records: Vec<Value>, next: Option<&str>) -> QueryPage {
        QueryPage {
            results: records,
            has_more: next.is_some(),
            next_cursor: next.map(String::from),
        }
    }

    fn test_queue() -> AdmissionQueue {
        AdmissionQueue::new(1000, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn listing_follows_cursors_and_merges_in_order() {
        let api = MockApi {
            query_pages: vec![
                query_page(vec![page_record("a", "t1", "a")], Some("1")),
                query_page(vec![page_record("b", "t1", "b")], Some("2")),
                query_page(vec![page_record("c", "t1", "c")], None),
            ],
            ..MockApi::default()
        };
        let store = MockStore::default();
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::new(&store, dir.path()).unwrap();
        let queue = test_queue();
        let syncer = Syncer::new(&api, cache, &queue, "db-1");

        let pages = syncer.list_pages().await.unwrap();
        assert_eq!(
            pages.iter().map(|p| p.id.as_str()).collect::<Vec<_>>(),
            vec!["a", "b", "c"]
        );
        assert_eq!(*api.query_calls.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn malformed_records_are_dropped_not_fatal() {
        let api = MockApi {
            query_pages: vec![query_page(
                vec![json!({ "id": "no-timestamp" }), page_record("a", "t1", "a")],
                None,
            )],
            ..MockApi::default()
        };
        let store = MockStore::default();
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::new(&store, dir.path()).unwrap();
        let queue = test_queue();
        let syncer = Syncer::new(&api, cache, &queue, "db-1");

        let pages = syncer.list_pages().await.unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].id, "a");
    }

    #[tokio::test]
    async fn exhausted_listing_aborts_the_run() {
        let api = MockApi::default(); // no fixtures: every query errors
        let store = MockStore::default();
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::new(&store, dir.path()).unwrap();
        let queue = test_queue();
        let syncer = Syncer::new(&api, cache, &queue, "db-1").with_retry_budget(0);

        let result = syncer.run(&NoProgress).await;
        assert!(matches!(result, Err(Error::Exhausted { .. })));
    }

    #[tokio::test]
    async fn unfetchable_page_is_counted_skipped_not_fatal() {
        let api = MockApi {
            query_pages: vec![query_page(vec![page_record("a", "t1", "post-a")], None)],
            // No children fixture for "a": the root listing fails.
            ..MockApi::default()
        };
        let store = MockStore::default();
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::new(&store, dir.path()).unwrap();
        let queue = test_queue();
        let syncer = Syncer::new(&api, cache, &queue, "db-1").with_retry_budget(0);

        let report = syncer.run(&NoProgress).await.unwrap();
        assert_eq!(report.stale, 1);
        assert_eq!(report.synced, 0);
        assert_eq!(report.skipped, 1);
        assert!(store.objects.lock().unwrap().is_empty());
    }
}
