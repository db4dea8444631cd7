// src/pipeline/step.rs

//! Step descriptors.
//!
//! A task's pipeline is an ordered list of [`StepSpec`]s, deserialized
//! straight from `steps = [{ kind = "...", ... }]` in the config. The
//! executor interprets them; it never needs to know what a given transform
//! does to the bytes.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use crate::types::parse_duration;

/// One entry of `steps = [...]`.
///
/// Options shared by all kinds (`cmd`, `timeout`, `cache`) live here; the
/// kind-specific ones live on [`StepKind`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StepSpec {
    #[serde(flatten)]
    pub kind: StepKind,

    /// Override the shell command of an external step (required for `exec`).
    #[serde(default)]
    pub cmd: Option<String>,

    /// Optional per-file timeout for this step, e.g. `"30s"`.
    #[serde(default)]
    pub timeout: Option<String>,

    /// Cache this step's output on disk keyed by input content.
    ///
    /// `None` means "use the kind's default" (only `optimize-image` caches by
    /// default).
    #[serde(default)]
    pub cache: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum StepKind {
    /// Stylesheet compiler.
    Sass {
        #[serde(default)]
        style: SassStyle,
    },
    /// Vendor-prefix inserter.
    Autoprefix,
    MinifyCss,
    OptimizeImage {
        #[serde(default = "default_optimization_level")]
        level: u8,
        #[serde(default = "default_true")]
        progressive: bool,
        #[serde(default = "default_true")]
        interlaced: bool,
    },
    /// Join every surviving file into a single output file.
    Concat { file: String },
    MinifyJs,
    /// Remove `console.*(...)` calls and `debugger` statements.
    StripDebug,
    StripHtmlComments,
    MinifyHtml {
        #[serde(default = "default_true")]
        collapse_whitespace: bool,
    },
    /// Rewrite the output file name, or only its extension.
    Rename {
        #[serde(default)]
        file: Option<String>,
        #[serde(default)]
        extname: Option<String>,
    },
    /// Arbitrary stdin -> stdout filter given by `cmd`.
    Exec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SassStyle {
    #[default]
    Expanded,
    Compressed,
}

impl fmt::Display for SassStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SassStyle::Expanded => f.write_str("expanded"),
            SassStyle::Compressed => f.write_str("compressed"),
        }
    }
}

fn default_optimization_level() -> u8 {
    5
}

fn default_true() -> bool {
    true
}

impl StepSpec {
    pub fn new(kind: StepKind) -> Self {
        Self {
            kind,
            cmd: None,
            timeout: None,
            cache: None,
        }
    }

    pub fn with_cmd(mut self, cmd: impl Into<String>) -> Self {
        self.cmd = Some(cmd.into());
        self
    }

    pub fn with_timeout(mut self, timeout: impl Into<String>) -> Self {
        self.timeout = Some(timeout.into());
        self
    }

    pub fn with_cache(mut self, cache: bool) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Stable kebab-case identifier, as written in the config.
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn timeout_duration(&self) -> Result<Option<Duration>, String> {
        self.timeout.as_deref().map(parse_duration).transpose()
    }

    /// Whether the step's output should go through the content cache.
    pub fn effective_cache(&self) -> bool {
        self.cache
            .unwrap_or(matches!(self.kind, StepKind::OptimizeImage { .. }))
    }

    /// Whether this step gathers all files into one (a `concat`).
    pub fn is_gather(&self) -> bool {
        matches!(self.kind, StepKind::Concat { .. })
    }

    /// Check step-local invariants that serde cannot express.
    pub fn validate(&self) -> Result<(), String> {
        self.timeout_duration()
            .map_err(|e| format!("invalid timeout: {e}"))?;

        match &self.kind {
            StepKind::Concat { file } if file.trim().is_empty() => {
                Err("`concat` requires a non-empty `file`".to_string())
            }
            StepKind::Rename { file: None, extname: None } => {
                Err("`rename` requires `file` or `extname`".to_string())
            }
            StepKind::Rename { file: Some(_), extname: Some(_) } => {
                Err("`rename` accepts either `file` or `extname`, not both".to_string())
            }
            StepKind::Exec if self.cmd.as_deref().is_none_or(|c| c.trim().is_empty()) => {
                Err("`exec` requires a `cmd`".to_string())
            }
            StepKind::Concat { .. } | StepKind::Rename { .. } if self.cache == Some(true) => {
                Err(format!("`{}` cannot be cached", self.name()))
            }
            _ => Ok(()),
        }
    }
}

impl StepKind {
    pub fn name(&self) -> &'static str {
        match self {
            StepKind::Sass { .. } => "sass",
            StepKind::Autoprefix => "autoprefix",
            StepKind::MinifyCss => "minify-css",
            StepKind::OptimizeImage { .. } => "optimize-image",
            StepKind::Concat { .. } => "concat",
            StepKind::MinifyJs => "minify-js",
            StepKind::StripDebug => "strip-debug",
            StepKind::StripHtmlComments => "strip-html-comments",
            StepKind::MinifyHtml { .. } => "minify-html",
            StepKind::Rename { .. } => "rename",
            StepKind::Exec => "exec",
        }
    }
}

impl fmt::Display for StepSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            StepKind::Sass { style } => write!(f, "sass (style={style})")?,
            StepKind::OptimizeImage {
                level,
                progressive,
                interlaced,
            } => write!(
                f,
                "optimize-image (level={level}, progressive={progressive}, interlaced={interlaced})"
            )?,
            StepKind::Concat { file } => write!(f, "concat -> {file}")?,
            StepKind::MinifyHtml { collapse_whitespace } => {
                write!(f, "minify-html (collapse_whitespace={collapse_whitespace})")?
            }
            StepKind::Rename { file: Some(file), .. } => write!(f, "rename -> {file}")?,
            StepKind::Rename {
                extname: Some(ext), ..
            } => write!(f, "rename *{ext}")?,
            other => f.write_str(other.name())?,
        }
        if let Some(cmd) = &self.cmd {
            write!(f, " [cmd: {cmd}]")?;
        }
        Ok(())
    }
}
