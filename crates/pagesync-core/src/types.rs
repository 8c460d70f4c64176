//! Core data types shared across the sync pipeline.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A published page as listed by the document database query.
///
/// Read fresh from the API each run and never mutated. The slug doubles as
/// the cache object name; [`Page::cache_key`] falls back to the page id when
/// the slug property is empty so the bundle always has a usable key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Page {
    /// Opaque page identifier.
    pub id: String,
    /// Last-edited timestamp, kept as the raw API string. Staleness is
    /// decided by bit-exact comparison, never by parsing.
    pub last_edited_time: String,
    /// Human-readable slug from the `Slug` property; empty when unset.
    pub slug: String,
}

impl Page {
    /// Extract a page from a raw database query record.
    ///
    /// Returns `None` when the record is missing its id or timestamp; the
    /// slug defaults to the empty string like the upstream property does.
    #[must_use]
    pub fn from_record(record: &Value) -> Option<Self> {
        let id = record.get("id")?.as_str()?.to_string();
        let last_edited_time = record.get("last_edited_time")?.as_str()?.to_string();
        let slug = record
            .pointer("/properties/Slug/rich_text/0/plain_text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Some(Self {
            id,
            last_edited_time,
            slug,
        })
    }

    /// Name under which this page's bundle is cached.
    #[must_use]
    pub fn cache_key(&self) -> &str {
        if self.slug.is_empty() {
            &self.id
        } else {
            &self.slug
        }
    }
}

/// A node in a page's content tree.
///
/// Only the fields the traversal needs are typed; everything else in the API
/// record is carried through `payload` so the cached bundle preserves the
/// full block verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    /// Opaque block identifier.
    pub id: String,
    /// Type tag (`paragraph`, `synced_block`, ...).
    #[serde(rename = "type")]
    pub block_type: String,
    /// Whether the API reports nested children under this block.
    #[serde(default)]
    pub has_children: bool,
    /// Remaining fields of the API record, round-tripped untouched.
    #[serde(flatten)]
    pub payload: serde_json::Map<String, Value>,
}

impl Block {
    /// Identifier of the block this synced block mirrors, if any.
    ///
    /// Populated only for `synced_block` records carrying a
    /// `synced_from.block_id` reference; the original copy of a synced block
    /// has `synced_from: null` and is traversed like any other parent.
    #[must_use]
    pub fn synced_source(&self) -> Option<&str> {
        if self.block_type != "synced_block" {
            return None;
        }
        self.payload
            .get("synced_block")?
            .get("synced_from")?
            .get("block_id")?
            .as_str()
    }
}

/// One fetched subtree: a root id and its direct children, in API order.
///
/// Entries accumulate in traversal order and are never deduplicated or
/// merged; ownership of a root id is by first write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleEntry {
    /// Id of the block (or page) whose children were listed.
    pub root_id: String,
    /// Direct children of the root, in the order the API returned them.
    pub children: Vec<Block>,
}

/// The persisted unit: page metadata plus its flattened block tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageBundle {
    /// Identity of the bundled page.
    pub page_id: String,
    /// Timestamp the bundle was built from, compared verbatim on later runs.
    pub last_edited_time: String,
    /// Slug at bundle time.
    pub slug: String,
    /// Every subtree fetched during traversal, one entry per listing.
    pub blocks: Vec<BundleEntry>,
}

/// Storage-side mirror of a [`PageBundle`], reduced to the fields the diff
/// filter consults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedBundle {
    /// Identity of the cached page.
    pub page_id: String,
    /// Timestamp recorded when the bundle was written.
    pub last_edited_time: String,
}
