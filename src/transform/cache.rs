// src/transform/cache.rs

//! Persistent content-addressed cache for expensive steps.
//!
//! Entries live under `<cache_dir>/<first two hex chars>/<hash>` where the
//! hash covers the step identity, the asset's relative path and its input
//! bytes. A hit skips the wrapped transform entirely.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use blake3::Hasher;
use tracing::{debug, warn};

use crate::fs::FileSystem;

use super::{Asset, Transform, TransformFuture};

/// On-disk store of cached step outputs.
#[derive(Debug, Clone)]
pub struct ContentCache {
    fs: Arc<dyn FileSystem>,
    dir: PathBuf,
}

impl ContentCache {
    pub fn new(fs: Arc<dyn FileSystem>, dir: PathBuf) -> Self {
        Self { fs, dir }
    }

    /// Compute the cache key for `asset` under a given step identity.
    pub fn key(step_identity: &str, asset: &Asset) -> String {
        let mut hasher = Hasher::new();
        hasher.update(step_identity.as_bytes());
        hasher.update(&[0]);
        hasher.update(asset.rel_path.to_string_lossy().as_bytes());
        hasher.update(&[0]);
        hasher.update(&asset.contents);
        hasher.finalize().to_hex().to_string()
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let shard = key.get(..2).unwrap_or(key);
        self.dir.join(shard).join(key)
    }

    pub fn load(&self, key: &str) -> Option<Vec<u8>> {
        let path = self.entry_path(key);
        if !self.fs.is_file(&path) {
            return None;
        }
        match self.fs.read(&path) {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                warn!(?path, error = %err, "unreadable cache entry; ignoring");
                None
            }
        }
    }

    pub fn store(&self, key: &str, contents: &[u8]) -> Result<()> {
        self.fs.write(&self.entry_path(key), contents)
    }
}

/// Wraps a transform with a [`ContentCache`].
///
/// Only the contents are cached; the output keeps the input's relative path,
/// so renaming steps should not be wrapped.
#[derive(Debug)]
pub struct Cached {
    inner: Arc<dyn Transform>,
    key_prefix: String,
    store: ContentCache,
}

impl Cached {
    pub fn new(inner: Arc<dyn Transform>, key_prefix: String, store: ContentCache) -> Self {
        Self {
            inner,
            key_prefix,
            store,
        }
    }
}

impl Transform for Cached {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn apply(&self, asset: Asset) -> TransformFuture<'_> {
        Box::pin(async move {
            let key = ContentCache::key(&self.key_prefix, &asset);

            if let Some(hit) = self.store.load(&key) {
                debug!(step = self.inner.name(), file = ?asset.rel_path, "cache hit");
                return Ok(asset.with_contents(hit));
            }

            let out = self.inner.apply(asset).await?;
            if let Err(err) = self.store.store(&key, &out.contents) {
                // A failed write only costs a recomputation next time.
                warn!(step = self.inner.name(), error = %err, "failed to store cache entry");
            }
            Ok(out)
        })
    }
}
