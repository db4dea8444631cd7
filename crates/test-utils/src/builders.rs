use assetdag::config::{ConfigFile, GroupConfig, RawConfigFile, TaskConfig};
use assetdag::errors::Result;
use assetdag::pipeline::StepSpec;
use assetdag::types::TaskKind;

/// Builder for `ConfigFile` to simplify test setup.
#[derive(Default)]
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn debounce(mut self, debounce: &str) -> Self {
        self.config.config.debounce = debounce.to_string();
        self
    }

    pub fn max_parallel_tasks(mut self, n: usize) -> Self {
        self.config.config.max_parallel_tasks = n;
        self
    }

    pub fn max_parallel_files(mut self, n: usize) -> Self {
        self.config.config.max_parallel_files = n;
        self
    }

    pub fn with_group(mut self, name: &str, src: &[&str], dest: &str) -> Self {
        self.config.group.insert(
            name.to_string(),
            GroupConfig {
                src: src.iter().map(|s| s.to_string()).collect(),
                dest: Some(dest.to_string()),
            },
        );
        self
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.config.task.insert(name.to_string(), task);
        self
    }

    pub fn with_clean(mut self, path: &str) -> Self {
        self.config.clean.paths.push(path.to_string());
        self
    }

    /// The unvalidated config, for tests that exercise validation itself.
    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn try_build(self) -> Result<ConfigFile> {
        ConfigFile::try_from(self.config)
    }

    pub fn build(self) -> ConfigFile {
        self.try_build()
            .expect("Failed to build valid config from builder")
    }
}

/// Builder for `TaskConfig`.
#[derive(Default)]
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    /// A task with no sources and no steps (an aggregate until told
    /// otherwise).
    pub fn new() -> Self {
        Self::default()
    }

    /// A pipeline task reading `src` and writing into `dest`.
    pub fn pipeline(src: &str, dest: &str) -> Self {
        Self::new().src(src).dest(dest)
    }

    pub fn group(mut self, group: &str) -> Self {
        self.task.group = Some(group.to_string());
        self
    }

    pub fn src(mut self, pattern: &str) -> Self {
        self.task
            .src
            .get_or_insert_with(Vec::new)
            .push(pattern.to_string());
        self
    }

    pub fn dest(mut self, dest: &str) -> Self {
        self.task.dest = Some(dest.to_string());
        self
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    pub fn step(mut self, step: StepSpec) -> Self {
        self.task.steps.push(step);
        self
    }

    pub fn kind(mut self, kind: TaskKind) -> Self {
        self.task.kind = kind;
        self
    }

    pub fn watch(mut self, pattern: &str) -> Self {
        self.task.watch.push(pattern.to_string());
        self
    }

    pub fn notify(mut self, message: &str) -> Self {
        self.task.notify = Some(message.to_string());
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}
