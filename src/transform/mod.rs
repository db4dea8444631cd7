// src/transform/mod.rs

//! Asset transforms invoked by the pipeline executor.
//!
//! Each transform is an opaque `(bytes, options) -> bytes` function behind
//! the [`Transform`] trait:
//!
//! - [`builtin`] holds small text transforms (minifiers, strippers, rename).
//! - [`external`] pipes the asset through a shell command (stylesheet
//!   compiler, autoprefixer, image optimizer, arbitrary `exec`).
//! - [`cache`] wraps any transform with a persistent content-addressed
//!   result cache.
//!
//! [`build_transform`] turns a [`StepSpec`] into a ready-to-run transform,
//! applying the cache and timeout wrappers the step asks for.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::errors::TransformError;
use crate::fs::FileSystem;
use crate::pipeline::step::{StepKind, StepSpec};

pub mod builtin;
pub mod cache;
pub mod external;
mod literals;

pub use builtin::Builtin;
pub use cache::{Cached, ContentCache};
pub use external::ExternalCommand;

/// A file flowing through a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    /// Path relative to the source pattern's base directory; becomes the
    /// path under the task's destination directory.
    pub rel_path: PathBuf,
    pub contents: Vec<u8>,
}

impl Asset {
    pub fn new(rel_path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            rel_path: rel_path.into(),
            contents: contents.into(),
        }
    }

    /// Contents as UTF-8, or a `TransformError` attributed to `step`.
    pub fn text(&self, step: &str) -> Result<&str, TransformError> {
        std::str::from_utf8(&self.contents).map_err(|e| {
            TransformError::new(
                step,
                format!("{} is not valid UTF-8: {e}", self.rel_path.display()),
            )
        })
    }

    pub fn with_contents(self, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            rel_path: self.rel_path,
            contents: contents.into(),
        }
    }
}

pub type TransformFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Asset, TransformError>> + Send + 'a>>;

/// One per-file transformation step.
pub trait Transform: Send + Sync + fmt::Debug {
    /// Step identifier used in logs and error reports.
    fn name(&self) -> &str;

    /// Transform a single asset.
    fn apply(&self, asset: Asset) -> TransformFuture<'_>;
}

/// Shared resources available when constructing transforms.
#[derive(Debug, Clone)]
pub struct TransformContext {
    pub fs: Arc<dyn FileSystem>,
    /// Absolute (or root-joined) directory for cached step outputs.
    pub cache_dir: PathBuf,
    /// Working directory for external commands.
    pub work_dir: PathBuf,
}

impl TransformContext {
    pub fn new(fs: Arc<dyn FileSystem>, root: &Path, cache_dir: impl AsRef<Path>) -> Self {
        Self {
            fs,
            cache_dir: root.join(cache_dir),
            work_dir: root.to_path_buf(),
        }
    }
}

/// Build the transform for a per-file step.
///
/// `concat` is not a per-file transform; the executor handles it itself and
/// callers must not pass it here.
pub fn build_transform(
    step: &StepSpec,
    ctx: &TransformContext,
) -> Result<Arc<dyn Transform>, String> {
    step.validate()?;

    let base: Arc<dyn Transform> = match &step.kind {
        StepKind::Concat { .. } => {
            return Err("`concat` is handled by the executor, not as a transform".to_string());
        }
        StepKind::MinifyCss
        | StepKind::MinifyJs
        | StepKind::StripDebug
        | StepKind::StripHtmlComments
        | StepKind::MinifyHtml { .. }
        | StepKind::Rename { .. } => Arc::new(Builtin::from_kind(&step.kind)?),
        StepKind::Sass { .. }
        | StepKind::Autoprefix
        | StepKind::OptimizeImage { .. }
        | StepKind::Exec => Arc::new(ExternalCommand::from_step(step, &ctx.work_dir)?),
    };

    let cached: Arc<dyn Transform> = if step.effective_cache() {
        let store = ContentCache::new(ctx.fs.clone(), ctx.cache_dir.clone());
        Arc::new(Cached::new(base, step.to_string(), store))
    } else {
        base
    };

    match step.timeout_duration()? {
        Some(limit) => Ok(Arc::new(Timed::new(cached, limit))),
        None => Ok(cached),
    }
}

/// Fails the wrapped step if it does not finish within `limit`.
#[derive(Debug)]
pub struct Timed {
    inner: Arc<dyn Transform>,
    limit: Duration,
}

impl Timed {
    pub fn new(inner: Arc<dyn Transform>, limit: Duration) -> Self {
        Self { inner, limit }
    }
}

impl Transform for Timed {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn apply(&self, asset: Asset) -> TransformFuture<'_> {
        Box::pin(async move {
            let path = asset.rel_path.clone();
            match tokio::time::timeout(self.limit, self.inner.apply(asset)).await {
                Ok(res) => res,
                Err(_) => Err(TransformError::new(
                    self.inner.name(),
                    format!("timed out after {:?} on {}", self.limit, path.display()),
                )),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    #[derive(Debug)]
    struct Sleepy;

    impl Transform for Sleepy {
        fn name(&self) -> &str {
            "sleepy"
        }

        fn apply(&self, asset: Asset) -> TransformFuture<'_> {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(asset)
            })
        }
    }

    #[tokio::test]
    async fn timed_reports_timeout_as_transform_error() {
        let timed = Timed::new(Arc::new(Sleepy), Duration::from_millis(20));
        let err = timed
            .apply(Asset::new("a.js", b"x".to_vec()))
            .await
            .unwrap_err();

        assert_eq!(err.step, "sleepy");
        assert!(err.message.contains("timed out"));
    }

    #[test]
    fn build_transform_rejects_concat() {
        let ctx = TransformContext::new(Arc::new(MockFileSystem::new()), Path::new("."), ".cache");
        let step = StepSpec::new(StepKind::Concat {
            file: "main.js".into(),
        });
        assert!(build_transform(&step, &ctx).is_err());
    }

    #[test]
    fn build_transform_wraps_cached_and_timed_steps() {
        let ctx = TransformContext::new(Arc::new(MockFileSystem::new()), Path::new("."), ".cache");
        let step = StepSpec::new(StepKind::MinifyJs)
            .with_cache(true)
            .with_timeout("1s");

        let t = build_transform(&step, &ctx).unwrap();
        assert_eq!(t.name(), "minify-js");
        let dbg = format!("{t:?}");
        assert!(dbg.contains("Timed"));
        assert!(dbg.contains("Cached"));
    }
}
