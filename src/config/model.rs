// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::pipeline::StepSpec;
use crate::types::{TaskKind, parse_duration};

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [config]
/// debounce = "200ms"
///
/// [group.css]
/// src = ["src/scss/*.scss"]
/// dest = "build/css"
///
/// [task.build-css]
/// group = "css"
/// steps = [{ kind = "sass" }, { kind = "minify-css" }]
///
/// [clean]
/// paths = ["build/css"]
/// ```
///
/// All sections are optional and have reasonable defaults. This is the
/// unvalidated form; see [`ConfigFile`].
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    /// Global behaviour config from `[config]`.
    #[serde(default)]
    pub config: ConfigSection,

    /// Named asset groups from `[group.<name>]`.
    #[serde(default)]
    pub group: BTreeMap<String, GroupConfig>,

    /// All tasks from `[task.<name>]`, keyed by task name.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,

    #[serde(default)]
    pub clean: CleanSection,
}

/// A configuration that passed validation.
///
/// Only obtainable through `ConfigFile::try_from(raw)`, so holding one means
/// every reference in it resolves and the task graph is acyclic.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    config: ConfigSection,
    group: BTreeMap<String, GroupConfig>,
    task: BTreeMap<String, TaskConfig>,
    clean: CleanSection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            config: raw.config,
            group: raw.group,
            task: raw.task,
            clean: raw.clean,
        }
    }

    pub fn config(&self) -> &ConfigSection {
        &self.config
    }

    pub fn groups(&self) -> &BTreeMap<String, GroupConfig> {
        &self.group
    }

    pub fn tasks(&self) -> &BTreeMap<String, TaskConfig> {
        &self.task
    }

    pub fn task(&self, name: &str) -> Option<&TaskConfig> {
        self.task.get(name)
    }

    pub fn clean_paths(&self) -> &[String] {
        &self.clean.paths
    }

    /// Validated quiet period for the watch coordinator.
    pub fn debounce(&self) -> Duration {
        self.config
            .debounce_duration()
            .unwrap_or(Duration::from_millis(DEFAULT_DEBOUNCE_MS))
    }

    /// Sources of a task: its own `src`, or its group's.
    pub fn effective_sources(&self, task: &TaskConfig) -> Vec<String> {
        effective_sources(&self.group, task)
    }

    /// Destination of a task: its own `dest`, or its group's.
    pub fn effective_dest(&self, task: &TaskConfig) -> Option<String> {
        effective_dest(&self.group, task)
    }
}

pub(crate) fn effective_sources(groups: &BTreeMap<String, GroupConfig>, task: &TaskConfig) -> Vec<String> {
    match (&task.src, &task.group) {
        (Some(src), _) => src.clone(),
        (None, Some(group)) => groups.get(group).map(|g| g.src.clone()).unwrap_or_default(),
        (None, None) => Vec::new(),
    }
}

pub(crate) fn effective_dest(groups: &BTreeMap<String, GroupConfig>, task: &TaskConfig) -> Option<String> {
    match (&task.dest, &task.group) {
        (Some(dest), _) => Some(dest.clone()),
        (None, Some(group)) => groups.get(group).and_then(|g| g.dest.clone()),
        (None, None) => None,
    }
}

const DEFAULT_DEBOUNCE_MS: u64 = 200;

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Quiet period after the last change before a watch re-run starts.
    #[serde(default = "default_debounce")]
    pub debounce: String,

    /// How many tasks the scheduler may run at once.
    #[serde(default = "default_max_parallel_tasks")]
    pub max_parallel_tasks: usize,

    /// How many files one task may process at once.
    #[serde(default = "default_max_parallel_files")]
    pub max_parallel_files: usize,

    /// Directory for the step result cache, relative to the project root.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
}

impl ConfigSection {
    pub fn debounce_duration(&self) -> Result<Duration, String> {
        parse_duration(&self.debounce)
    }
}

fn default_debounce() -> String {
    format!("{DEFAULT_DEBOUNCE_MS}ms")
}

fn default_max_parallel_tasks() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_max_parallel_files() -> usize {
    8
}

fn default_cache_dir() -> String {
    ".assetdag/cache".to_string()
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            debounce: default_debounce(),
            max_parallel_tasks: default_max_parallel_tasks(),
            max_parallel_files: default_max_parallel_files(),
            cache_dir: default_cache_dir(),
        }
    }
}

/// `[group.<name>]`: a logical asset group (source globs + destination).
#[derive(Debug, Clone, Deserialize, Default)]
pub struct GroupConfig {
    #[serde(default)]
    pub src: Vec<String>,
    #[serde(default)]
    pub dest: Option<String>,
}

/// `[task.<name>]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TaskConfig {
    /// Asset group supplying `src` and `dest`.
    #[serde(default)]
    pub group: Option<String>,

    /// Source patterns; overrides the group's.
    #[serde(default)]
    pub src: Option<Vec<String>>,

    /// Destination directory; overrides the group's.
    #[serde(default)]
    pub dest: Option<String>,

    /// Prerequisites: this task waits for all tasks listed here.
    #[serde(default)]
    pub after: Vec<String>,

    /// Ordered transformation steps.
    #[serde(default)]
    pub steps: Vec<StepSpec>,

    #[serde(default)]
    pub kind: TaskKind,

    /// Extra patterns that re-trigger this task in watch mode.
    #[serde(default)]
    pub watch: Vec<String>,

    /// Message shown when the task completes.
    #[serde(default)]
    pub notify: Option<String>,
}

/// `[clean]` section: output paths removed by `assetdag clean`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct CleanSection {
    #[serde(default)]
    pub paths: Vec<String>,
}
