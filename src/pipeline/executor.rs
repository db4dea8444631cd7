// src/pipeline/executor.rs

//! Runs one task's pipeline.
//!
//! The step list is split into *stages* at every `concat`: within a stage
//! each file flows through the transforms on its own, concurrently with the
//! other files (bounded by `max_parallel_files`). At a `concat` the surviving
//! files are joined, in source order, into one asset which continues
//! through the next stage.
//!
//! A transform error drops only that file; it is recorded in the report and
//! the remaining files carry on. Only problems that stop the task as a whole
//! (a step that cannot be built, a missing source directory) produce
//! [`TaskStatus::Failed`](super::TaskStatus::Failed).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result, anyhow};
use tokio::sync::Semaphore;
use tracing::{debug, error, info};

use crate::fs::FileSystem;
use crate::registry::Task;
use crate::transform::{Asset, Transform, TransformContext, build_transform};

use super::report::{FileFailure, Notifier, TaskReport};
use super::source::select_sources;
use super::step::StepKind;
use super::PipelineSpec;

/// A file in flight.
#[derive(Debug)]
struct Item {
    /// Position in source order.
    idx: usize,
    /// Root-relative path used in failure reports.
    origin: PathBuf,
    asset: Asset,
}

type Chain = Arc<[(usize, Arc<dyn Transform>)]>;

/// Steps between two gather points.
struct Stage {
    transforms: Chain,
    /// `concat` closing this stage: its step index and output file name.
    gather: Option<(usize, String)>,
}

/// Executes task pipelines against a [`FileSystem`].
#[derive(Debug, Clone)]
pub struct PipelineExecutor {
    fs: Arc<dyn FileSystem>,
    root: PathBuf,
    ctx: TransformContext,
    max_parallel_files: usize,
    notifier: Arc<dyn Notifier>,
}

impl PipelineExecutor {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        root: impl Into<PathBuf>,
        cache_dir: impl AsRef<Path>,
        max_parallel_files: usize,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let root = root.into();
        let ctx = TransformContext::new(fs.clone(), &root, cache_dir);
        Self {
            fs,
            root,
            ctx,
            max_parallel_files: max_parallel_files.max(1),
            notifier,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Run `task` once and notify the observer with the resulting report.
    ///
    /// Tasks without a pipeline (pure aggregates) succeed immediately with
    /// zero files.
    pub async fn execute(&self, task: &Task) -> TaskReport {
        let started = Instant::now();
        info!(task = %task.name, "starting task");

        let report = match &task.pipeline {
            None => TaskReport::succeeded(&task.name, 0, started.elapsed()),
            Some(pipeline) => match self.run_pipeline(pipeline).await {
                Ok((written, failures)) => {
                    TaskReport::from_files(&task.name, written, failures, started.elapsed())
                }
                Err(err) => {
                    error!(task = %task.name, error = %format!("{err:#}"), "task aborted");
                    TaskReport::failed(&task.name, format!("{err:#}"), started.elapsed())
                }
            },
        };

        self.notifier.notify(&task.name, &report);
        report
    }

    async fn run_pipeline(&self, pipeline: &PipelineSpec) -> Result<(usize, Vec<FileFailure>)> {
        // Build every step before touching any file.
        let stages = self.build_stages(pipeline)?;

        let fs = self.fs.clone();
        let root = self.root.clone();
        let patterns = pipeline.sources.clone();
        let sources = tokio::task::spawn_blocking(move || select_sources(fs.as_ref(), &root, &patterns))
            .await
            .context("source selection panicked")??;
        debug!(files = sources.len(), "selected source files");

        let mut failures = Vec::new();
        let mut items = self.read_all(sources, &mut failures).await;

        for stage in stages {
            items = self.run_chain(&stage.transforms, items, &mut failures).await;

            if let Some((step_index, file)) = stage.gather {
                if items.is_empty() {
                    debug!(step_index, "nothing left to concatenate");
                    continue;
                }
                items.sort_by_key(|item| item.idx);
                let parts: Vec<&[u8]> = items.iter().map(|i| i.asset.contents.as_slice()).collect();
                let joined = parts.join(&b"\n"[..]);
                debug!(step_index, inputs = items.len(), file = %file, "concatenated assets");
                items = vec![Item {
                    idx: 0,
                    origin: PathBuf::from(&file),
                    asset: Asset::new(file, joined),
                }];
            }
        }

        let dest = self.root.join(&pipeline.dest);
        let written = self.write_all(&dest, items, &mut failures).await;
        Ok((written, failures))
    }

    fn build_stages(&self, pipeline: &PipelineSpec) -> Result<Vec<Stage>> {
        let mut stages = Vec::new();
        let mut current: Vec<(usize, Arc<dyn Transform>)> = Vec::new();

        for (i, step) in pipeline.steps.iter().enumerate() {
            if let StepKind::Concat { file } = &step.kind {
                step.validate()
                    .map_err(|e| anyhow!("step {i} ({}): {e}", step.name()))?;
                stages.push(Stage {
                    transforms: std::mem::take(&mut current).into(),
                    gather: Some((i, file.clone())),
                });
                continue;
            }
            let transform = build_transform(step, &self.ctx)
                .map_err(|e| anyhow!("step {i} ({}): {e}", step.name()))?;
            current.push((i, transform));
        }

        stages.push(Stage {
            transforms: current.into(),
            gather: None,
        });
        Ok(stages)
    }

    async fn read_all(&self, sources: Vec<super::SourceFile>, failures: &mut Vec<FileFailure>) -> Vec<Item> {
        let semaphore = Arc::new(Semaphore::new(self.max_parallel_files));
        let mut handles = Vec::with_capacity(sources.len());

        for (idx, source) in sources.into_iter().enumerate() {
            let fs = self.fs.clone();
            let semaphore = semaphore.clone();
            let path = source.path.clone();
            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                match tokio::task::spawn_blocking(move || fs.read(&path)).await {
                    Ok(res) => res,
                    Err(e) => Err(anyhow!("read task panicked: {e}")),
                }
            });
            handles.push((idx, source, handle));
        }

        let mut items = Vec::new();
        for (idx, source, handle) in handles {
            let origin = self.display_path(&source.path);
            match handle.await.map_err(anyhow::Error::from).and_then(|r| r) {
                Ok(contents) => items.push(Item {
                    idx,
                    origin,
                    asset: Asset::new(source.rel_path, contents),
                }),
                Err(err) => failures.push(FileFailure {
                    path: origin,
                    step_index: None,
                    step: "read".to_string(),
                    error: format!("{err:#}"),
                }),
            }
        }
        items
    }

    async fn run_chain(&self, chain: &Chain, items: Vec<Item>, failures: &mut Vec<FileFailure>) -> Vec<Item> {
        if chain.is_empty() {
            return items;
        }

        let semaphore = Arc::new(Semaphore::new(self.max_parallel_files));
        let mut handles = Vec::with_capacity(items.len());

        for item in items {
            let chain = chain.clone();
            let semaphore = semaphore.clone();
            let Item { idx, origin, asset } = item;
            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let mut asset = asset;
                for (step_index, transform) in chain.iter() {
                    match transform.apply(asset).await {
                        Ok(next) => asset = next,
                        Err(err) => return Err((*step_index, err)),
                    }
                }
                Ok(asset)
            });
            handles.push((idx, origin, handle));
        }

        let mut survivors = Vec::new();
        for (idx, origin, handle) in handles {
            match handle.await {
                Ok(Ok(asset)) => survivors.push(Item { idx, origin, asset }),
                Ok(Err((step_index, err))) => {
                    debug!(file = ?origin, step = %err.step, "file dropped from pipeline");
                    failures.push(FileFailure {
                        path: origin,
                        step_index: Some(step_index),
                        step: err.step,
                        error: err.message,
                    });
                }
                Err(join_err) => failures.push(FileFailure {
                    path: origin,
                    step_index: None,
                    step: "transform".to_string(),
                    error: join_err.to_string(),
                }),
            }
        }
        survivors
    }

    async fn write_all(&self, dest: &Path, items: Vec<Item>, failures: &mut Vec<FileFailure>) -> usize {
        let semaphore = Arc::new(Semaphore::new(self.max_parallel_files));
        let mut handles = Vec::with_capacity(items.len());

        for item in items {
            let fs = self.fs.clone();
            let semaphore = semaphore.clone();
            let target = dest.join(&item.asset.rel_path);
            let contents = item.asset.contents;
            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                match tokio::task::spawn_blocking(move || fs.write(&target, &contents)).await {
                    Ok(res) => res,
                    Err(e) => Err(anyhow!("write task panicked: {e}")),
                }
            });
            handles.push((item.origin, handle));
        }

        let mut written = 0;
        for (origin, handle) in handles {
            match handle.await.map_err(anyhow::Error::from).and_then(|r| r) {
                Ok(()) => written += 1,
                Err(err) => failures.push(FileFailure {
                    path: origin,
                    step_index: None,
                    step: "write".to_string(),
                    error: format!("{err:#}"),
                }),
            }
        }
        written
    }

    fn display_path(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.to_path_buf())
    }
}
