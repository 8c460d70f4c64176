//! Recursive block tree retrieval with synced-block dereferencing.
//!
//! [`BlockFetcher`] materializes the complete block tree rooted at a page
//! into a flat list of [`BundleEntry`] records, one per listed subtree, in
//! traversal order. Every API call goes through the admission queue and the
//! retry wrapper; a branch whose calls exhaust their retries is logged and
//! skipped without failing the rest of the tree.

use crate::config::RETRY_BUDGET;
use crate::notion::DocumentApi;
use crate::queue::AdmissionQueue;
use crate::retry::retry;
use crate::types::{Block, BundleEntry};
use std::future::Future;
use std::pin::Pin;
use tracing::warn;

/// Fetches block trees through an injected document API client.
pub struct BlockFetcher<'a, D: DocumentApi> {
    api: &'a D,
    queue: &'a AdmissionQueue,
    budget: u32,
}

impl<'a, D: DocumentApi> BlockFetcher<'a, D> {
    /// Creates a fetcher with the default retry budget.
    #[must_use]
    pub const fn new(api: &'a D, queue: &'a AdmissionQueue) -> Self {
        Self {
            api,
            queue,
            budget: RETRY_BUDGET,
        }
    }

    /// Overrides the retry budget (tests use 0 to fail fast).
    #[must_use]
    pub const fn with_retry_budget(mut self, budget: u32) -> Self {
        self.budget = budget;
        self
    }

    /// Materialize the full block tree rooted at a page.
    ///
    /// Returns `None` only when the root listing itself exhausts its
    /// retries; deeper branch failures leave gaps in the bundle but do not
    /// abandon the page.
    pub async fn fetch_page_tree(&self, page_id: &str) -> Option<Vec<BundleEntry>> {
        let mut entries = Vec::new();
        if self.fetch_subtree(page_id, &mut entries).await {
            Some(entries)
        } else {
            None
        }
    }

    /// Paginate through the children of `root_id`, record the subtree entry,
    /// then descend into children in order.
    ///
    /// Recursion has no depth limit; termination relies on the document tree
    /// being finite and synced-block references not forming cycles, which is
    /// assumed rather than verified.
    fn fetch_subtree<'b>(
        &'b self,
        root_id: &'b str,
        acc: &'b mut Vec<BundleEntry>,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'b>> {
        Box::pin(async move {
            let Some(children) = self.list_all_children(root_id).await else {
                warn!(root_id, "skipping branch: could not list children");
                return false;
            };

            acc.push(BundleEntry {
                root_id: root_id.to_string(),
                children: children.clone(),
            });

            // Sequential, never concurrent: child order determines entry
            // order, and the admission queue is the only throttle.
            for child in &children {
                match child.synced_source() {
                    Some(source_id) if source_id != child.id => {
                        let source_id = source_id.to_string();
                        self.fetch_synced_source(&source_id, acc).await;
                    },
                    _ if child.has_children => {
                        self.fetch_subtree(&child.id, acc).await;
                    },
                    _ => {},
                }
            }
            true
        })
    }

    /// Dereference a synced block: retrieve the source block, record it as
    /// its own entry, and descend into its subtree when it has children.
    async fn fetch_synced_source(&self, source_id: &str, acc: &mut Vec<BundleEntry>) {
        let retrieved = retry(self.budget, || async {
            self.queue.acquire().await;
            self.api.retrieve_block(source_id).await
        })
        .await;

        let Some(source_block) = retrieved else {
            warn!(source_id, "skipping synced source: could not retrieve block");
            return;
        };

        let descend = source_block.has_children;
        acc.push(BundleEntry {
            root_id: source_id.to_string(),
            children: vec![source_block],
        });
        if descend {
            self.fetch_subtree(source_id, acc).await;
        }
    }

    /// Follow the children cursor to exhaustion, merging result pages in
    /// order. `None` when any page of the listing exhausts its retries.
    async fn list_all_children(&self, root_id: &str) -> Option<Vec<Block>> {
        let mut children = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = retry(self.budget, || {
                let cursor = cursor.clone();
                async move {
                    self.queue.acquire().await;
                    self.api.list_children(root_id, cursor.as_deref()).await
                }
            })
            .await?;

            children.extend(page.results);
            if !page.has_more {
                break;
            }
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Some(children)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::notion::{ChildrenPage, QueryPage};
    use crate::{Error, Result};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    fn block(id: &str, has_children: bool) -> Block {
        serde_json::from_value(json!({
            "id": id,
            "type": "paragraph",
            "has_children": has_children
        }))
        .unwrap()
    }

    fn synced(id: &str, source: &str) -> Block {
        serde_json::from_value(json!({
            "id": id,
            "type": "synced_block",
            "has_children": true,
            "synced_block": { "synced_from": { "block_id": source } }
        }))
        .unwrap()
    }

    /// In-memory document API: children pages keyed by (root, cursor index),
    /// retrievable blocks keyed by id.
    #[derive(Default)]
    struct MockApi {
        children: HashMap<String, Vec<ChildrenPage>>,
        blocks: HashMap<String, Block>,
        list_calls: Mutex<Vec<String>>,
    }

    impl MockApi {
        fn children_pages(&mut self, root: &str, pages: Vec<ChildrenPage>) {
            self.children.insert(root.to_string(), pages);
        }

        fn single_page(&mut self, root: &str, results: Vec<Block>) {
            self.children_pages(
                root,
                vec![ChildrenPage {
                    results,
                    has_more: false,
                    next_cursor: None,
                }],
            );
        }
    }

    #[async_trait]
    impl DocumentApi for MockApi {
        async fn query_database(&self, _: &str, _: Option<&str>) -> Result<QueryPage> {
            unreachable!("block fetcher never queries the database")
        }

        async fn list_children(&self, block_id: &str, cursor: Option<&str>) -> Result<ChildrenPage> {
            self.list_calls.lock().unwrap().push(block_id.to_string());
            let index = cursor.map_or(0, |c| c.parse::<usize>().unwrap());
            self.children
                .get(block_id)
                .and_then(|pages| pages.get(index))
                .cloned()
                .ok_or(Error::Api {
                    status: 404,
                    message: format!("no children fixture for {block_id}"),
                })
        }

        async fn retrieve_block(&self, block_id: &str) -> Result<Block> {
            self.blocks.get(block_id).cloned().ok_or(Error::Api {
                status: 404,
                message: format!("no block fixture for {block_id}"),
            })
        }
    }

    fn test_queue() -> AdmissionQueue {
        AdmissionQueue::new(1000, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn plain_tree_yields_one_entry_per_parent() {
        let mut api = MockApi::default();
        api.single_page("page-1", vec![block("a", true), block("b", false)]);
        api.single_page("a", vec![block("a1", false), block("a2", false)]);

        let queue = test_queue();
        let entries = BlockFetcher::new(&api, &queue)
            .fetch_page_tree("page-1")
            .await
            .unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].root_id, "page-1");
        assert_eq!(
            entries[0].children.iter().map(|b| b.id.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        assert_eq!(entries[1].root_id, "a");
        assert_eq!(
            entries[1].children.iter().map(|b| b.id.as_str()).collect::<Vec<_>>(),
            vec!["a1", "a2"]
        );
        // Leaf blocks never trigger a listing.
        assert!(!api.list_calls.lock().unwrap().contains(&"b".to_string()));
    }

    #[tokio::test]
    async fn children_pagination_merges_in_order() {
        let mut api = MockApi::default();
        api.children_pages(
            "page-1",
            vec![
                ChildrenPage {
                    results: vec![block("a", false)],
                    has_more: true,
                    next_cursor: Some("1".to_string()),
                },
                ChildrenPage {
                    results: vec![block("b", false)],
                    has_more: true,
                    next_cursor: Some("2".to_string()),
                },
                ChildrenPage {
                    results: vec![block("c", false)],
                    has_more: false,
                    next_cursor: None,
                },
            ],
        );

        let queue = test_queue();
        let entries = BlockFetcher::new(&api, &queue)
            .fetch_page_tree("page-1")
            .await
            .unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(
            entries[0].children.iter().map(|b| b.id.as_str()).collect::<Vec<_>>(),
            vec!["a", "b", "c"]
        );
    }

    #[tokio::test]
    async fn synced_block_appends_source_entries_after_parent() {
        let mut api = MockApi::default();
        api.single_page("page-1", vec![synced("syn-1", "src-1")]);
        api.single_page("src-1", vec![block("s1", false)]);
        api.blocks.insert(
            "src-1".to_string(),
            serde_json::from_value(json!({
                "id": "src-1",
                "type": "synced_block",
                "has_children": true,
                "synced_block": { "synced_from": null }
            }))
            .unwrap(),
        );

        let queue = test_queue();
        let entries = BlockFetcher::new(&api, &queue)
            .fetch_page_tree("page-1")
            .await
            .unwrap();

        let roots: Vec<&str> = entries.iter().map(|e| e.root_id.as_str()).collect();
        assert_eq!(roots, vec!["page-1", "src-1", "src-1"]);
        // The retrieve entry wraps the source block itself...
        assert_eq!(entries[1].children.len(), 1);
        assert_eq!(entries[1].children[0].id, "src-1");
        // ...and the subtree entry holds its children.
        assert_eq!(entries[2].children[0].id, "s1");
    }

    #[tokio::test]
    async fn childless_synced_source_is_not_descended() {
        let mut api = MockApi::default();
        api.single_page("page-1", vec![synced("syn-1", "src-1")]);
        api.blocks.insert(
            "src-1".to_string(),
            serde_json::from_value(json!({
                "id": "src-1",
                "type": "synced_block",
                "has_children": false,
                "synced_block": { "synced_from": null }
            }))
            .unwrap(),
        );

        let queue = test_queue();
        let entries = BlockFetcher::new(&api, &queue)
            .fetch_page_tree("page-1")
            .await
            .unwrap();

        assert_eq!(entries.len(), 2);
        assert!(!api.list_calls.lock().unwrap().contains(&"src-1".to_string()));
    }

    #[tokio::test]
    async fn failed_root_listing_abandons_page() {
        let api = MockApi::default();
        let queue = test_queue();
        let result = BlockFetcher::new(&api, &queue)
            .with_retry_budget(0)
            .fetch_page_tree("page-1")
            .await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn failed_branch_keeps_rest_of_tree() {
        let mut api = MockApi::default();
        api.single_page("page-1", vec![block("broken", true), block("ok", true)]);
        api.single_page("ok", vec![block("ok1", false)]);
        // No fixture for "broken": its listing fails and the branch is skipped.

        let queue = test_queue();
        let entries = BlockFetcher::new(&api, &queue)
            .with_retry_budget(0)
            .fetch_page_tree("page-1")
            .await
            .unwrap();

        let roots: Vec<&str> = entries.iter().map(|e| e.root_id.as_str()).collect();
        assert_eq!(roots, vec!["page-1", "ok"]);
    }

    #[tokio::test]
    async fn failed_synced_retrieve_is_skipped() {
        let mut api = MockApi::default();
        api.single_page("page-1", vec![synced("syn-1", "src-1"), block("b", false)]);
        // No fixture for "src-1": the retrieve fails and only the parent
        // entry is recorded.

        let queue = test_queue();
        let entries = BlockFetcher::new(&api, &queue)
            .with_retry_budget(0)
            .fetch_page_tree("page-1")
            .await
            .unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].root_id, "page-1");
    }
}
