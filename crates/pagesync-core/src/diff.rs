//! Staleness filter comparing live pages against cached bundles.

use crate::{CachedBundle, Page};

/// Pages that need re-caching: no cached bundle exists for the page id, or
/// the cached `last_edited_time` string differs from the live one.
///
/// The comparison is bit-exact string inequality, not "older-than" — any
/// drift in timestamp formatting counts as changed. That is deliberate: it
/// errs toward re-caching rather than serving stale content.
#[must_use]
pub fn stale_pages<'a>(pages: &'a [Page], cached: &[CachedBundle]) -> Vec<&'a Page> {
    pages
        .iter()
        .filter(|page| {
            cached
                .iter()
                .find(|bundle| bundle.page_id == page.id)
                .is_none_or(|bundle| bundle.last_edited_time != page.last_edited_time)
        })
        .collect()
}
