// src/transform/external.rs

//! Shell-command filters.
//!
//! The asset is written to the command's stdin and its stdout becomes the
//! new contents. The asset's path (relative to its source base) is exposed
//! as `ASSETDAG_FILE`, and kind-specific options as further `ASSETDAG_*`
//! variables, so wrapper scripts can make decisions per file.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::errors::TransformError;
use crate::pipeline::step::{StepKind, StepSpec};

use super::{Asset, Transform, TransformFuture};

/// Maximum number of stderr bytes quoted in a failure message.
const STDERR_TAIL: usize = 2048;

#[derive(Debug, Clone)]
pub struct ExternalCommand {
    name: &'static str,
    cmd: String,
    env: Vec<(String, String)>,
    work_dir: PathBuf,
}

impl ExternalCommand {
    pub fn new(name: &'static str, cmd: impl Into<String>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            name,
            cmd: cmd.into(),
            env: Vec::new(),
            work_dir: work_dir.into(),
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.env.push((key.into(), value.to_string()));
        self
    }

    /// Build the command for an external step, using its default command
    /// unless `cmd` overrides it.
    pub fn from_step(step: &StepSpec, work_dir: &Path) -> Result<Self, String> {
        let name = step.name();
        let explicit = step.cmd.clone();

        let ext = match &step.kind {
            StepKind::Sass { style } => Self::new(
                name,
                explicit.unwrap_or_else(|| format!("sass --stdin --style={style}")),
                work_dir,
            )
            .with_env("ASSETDAG_SASS_STYLE", style),
            StepKind::Autoprefix => Self::new(
                name,
                explicit.unwrap_or_else(|| "postcss --use autoprefixer".to_string()),
                work_dir,
            ),
            StepKind::OptimizeImage {
                level,
                progressive,
                interlaced,
            } => Self::new(
                name,
                explicit.unwrap_or_else(|| "imagemin".to_string()),
                work_dir,
            )
            .with_env("ASSETDAG_OPTIMIZATION_LEVEL", level)
            .with_env("ASSETDAG_PROGRESSIVE", progressive)
            .with_env("ASSETDAG_INTERLACED", interlaced),
            StepKind::Exec => {
                let cmd = explicit.ok_or_else(|| "`exec` requires a `cmd`".to_string())?;
                Self::new(name, cmd, work_dir)
            }
            other => return Err(format!("'{}' is not an external step", other.name())),
        };

        Ok(ext)
    }

    pub fn command_line(&self) -> &str {
        &self.cmd
    }

    async fn run(&self, asset: &Asset) -> Result<Vec<u8>> {
        // Build a shell command appropriate for the platform.
        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&self.cmd);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&self.cmd);
            c
        };

        cmd.current_dir(&self.work_dir)
            .env("ASSETDAG_FILE", asset.rel_path.to_string_lossy().as_ref())
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning '{}'", self.cmd))?;

        // Feed stdin concurrently so large outputs cannot deadlock the pipe.
        let stdin = child.stdin.take();
        let input = asset.contents.clone();
        let writer = tokio::spawn(async move {
            if let Some(mut stdin) = stdin {
                if let Err(e) = stdin.write_all(&input).await {
                    debug!(error = %e, "stdin closed early by external command");
                }
            }
        });

        let output = child
            .wait_with_output()
            .await
            .with_context(|| format!("waiting for '{}'", self.cmd))?;
        if let Err(e) = writer.await {
            warn!(error = %e, "stdin writer task failed");
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: String = stderr
                .chars()
                .rev()
                .take(STDERR_TAIL)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            anyhow::bail!(
                "'{}' exited with {}: {}",
                self.cmd,
                output.status.code().map_or("signal".to_string(), |c| c.to_string()),
                tail.trim()
            );
        }

        Ok(output.stdout)
    }
}

impl Transform for ExternalCommand {
    fn name(&self) -> &str {
        self.name
    }

    fn apply(&self, asset: Asset) -> TransformFuture<'_> {
        Box::pin(async move {
            debug!(step = self.name, file = ?asset.rel_path, cmd = %self.cmd, "running external step");
            match self.run(&asset).await {
                Ok(out) => Ok(asset.with_contents(out)),
                Err(err) => Err(TransformError::new(
                    self.name,
                    format!("{}: {err:#}", asset.rel_path.display()),
                )),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::step::SassStyle;

    #[test]
    fn default_commands_per_kind() {
        let sass = StepSpec::new(StepKind::Sass {
            style: SassStyle::Compressed,
        });
        let ext = ExternalCommand::from_step(&sass, Path::new(".")).unwrap();
        assert_eq!(ext.command_line(), "sass --stdin --style=compressed");

        let overridden = StepSpec::new(StepKind::Autoprefix).with_cmd("cat");
        let ext = ExternalCommand::from_step(&overridden, Path::new(".")).unwrap();
        assert_eq!(ext.command_line(), "cat");

        assert!(ExternalCommand::from_step(&StepSpec::new(StepKind::MinifyCss), Path::new(".")).is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn pipes_contents_through_shell() {
        let ext = ExternalCommand::new("exec", "tr a-z A-Z", ".");
        let out = ext.apply(Asset::new("a.txt", b"hello".to_vec())).await.unwrap();
        assert_eq!(out.contents, b"HELLO");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn exposes_file_and_options_as_env() {
        let ext = ExternalCommand::new("exec", "printf '%s:%s' \"$ASSETDAG_FILE\" \"$ASSETDAG_LEVEL\"", ".")
            .with_env("ASSETDAG_LEVEL", 5);
        let out = ext.apply(Asset::new("img/a.png", Vec::new())).await.unwrap();
        assert_eq!(out.contents, b"img/a.png:5");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_transform_error_with_stderr() {
        let ext = ExternalCommand::new("sass", "echo 'bad syntax' >&2; exit 3", ".");
        let err = ext.apply(Asset::new("a.scss", b"x".to_vec())).await.unwrap_err();
        assert_eq!(err.step, "sass");
        assert!(err.message.contains("exited with 3"));
        assert!(err.message.contains("bad syntax"));
    }
}
