//! Write-through bundle cache: local `tmp/` directory plus object storage.
//!
//! The local directory mirrors the bucket so repeated runs on the same
//! machine skip re-downloading unchanged cache objects. Upload and download
//! failures are logged and swallowed; only local writes on the save path are
//! fatal, because a bundle that cannot be written locally cannot be uploaded
//! either.

use crate::store::ObjectStore;
use crate::types::{CachedBundle, PageBundle};
use crate::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Bundle cache backed by an injected object store and a local directory.
pub struct CacheStore<'a, O: ObjectStore> {
    store: &'a O,
    tmp_dir: PathBuf,
}

impl<'a, O: ObjectStore> CacheStore<'a, O> {
    /// Creates the cache, ensuring the local directory exists.
    pub fn new(store: &'a O, tmp_dir: impl Into<PathBuf>) -> Result<Self> {
        let tmp_dir = tmp_dir.into();
        fs::create_dir_all(&tmp_dir)
            .map_err(|e| Error::Storage(format!("failed to create cache directory: {e}")))?;
        Ok(Self { store, tmp_dir })
    }

    /// List every object key in the bucket, following continuation tokens.
    ///
    /// A listing error mid-pagination logs and returns the keys gathered so
    /// far; a missing cache only means every page looks stale.
    pub async fn list_keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            match self.store.list("", continuation.as_deref()).await {
                Ok(page) => {
                    keys.extend(page.keys);
                    if !page.is_truncated {
                        break;
                    }
                    match page.next_continuation {
                        Some(token) => continuation = Some(token),
                        None => break,
                    }
                },
                Err(err) => {
                    warn!(category = err.category(), "listing cache objects failed: {err}");
                    break;
                },
            }
        }
        keys
    }

    /// Load one cached bundle, downloading it unless the local copy exists.
    ///
    /// Returns `None` (logged) when the download fails or the object is not
    /// a parseable bundle; the key is then treated as uncached.
    pub async fn load_bundle(&self, key: &str) -> Option<CachedBundle> {
        let path = self.local_path(key);
        let bytes = if path.exists() {
            debug!(key, "using local copy");
            match fs::read(&path) {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!(key, "failed to read local copy: {err}");
                    return None;
                },
            }
        } else {
            let bytes = match self.store.get(key).await {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!(key, category = err.category(), "download failed: {err}");
                    return None;
                },
            };
            if let Err(err) = fs::write(&path, &bytes) {
                warn!(key, "failed to write local copy: {err}");
            }
            bytes
        };

        match serde_json::from_slice::<CachedBundle>(&bytes) {
            Ok(bundle) => Some(bundle),
            Err(err) => {
                warn!(key, "cached object is not a page bundle: {err}");
                None
            },
        }
    }

    /// Persist a bundle: local JSON file first, then upload the same bytes.
    ///
    /// The local write is fatal on failure; the upload is best-effort and a
    /// failure only logs (the next run re-caches the page).
    pub async fn save_bundle(&self, key: &str, bundle: &PageBundle) -> Result<()> {
        let bytes = serde_json::to_vec(bundle)?;
        fs::write(self.local_path(key), &bytes)?;

        match self
            .store
            .put(key, bytes.clone(), "application/json")
            .await
        {
            Ok(()) => info!(key, bytes = bytes.len(), "uploaded bundle"),
            Err(err) => {
                warn!(key, category = err.category(), "upload failed: {err}");
            },
        }
        Ok(())
    }

    /// Local path for a cache key, with the key reduced to a safe filename.
    fn local_path(&self, key: &str) -> PathBuf {
        self.tmp_dir.join(format!("{}.json", sanitize_file_name(key)))
    }

    /// Returns the local cache directory.
    #[must_use]
    pub fn tmp_dir(&self) -> &Path {
        &self.tmp_dir
    }
}

/// Reduce a cache key to a conservative filename so a hostile slug cannot
/// escape the cache directory. The object key itself is used verbatim.
fn sanitize_file_name(key: &str) -> String {
    let mut sanitized: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    while sanitized.contains("..") {
        sanitized = sanitized.replace("..", "_");
    }

    if sanitized.is_empty() {
        "bundle".to_string()
    } else {
        sanitized
    }
}
