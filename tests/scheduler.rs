// tests/scheduler.rs

use std::sync::Arc;
use std::time::Duration;

use assetdag::dag::{RunFailure, Scheduler, TaskRunState};
use assetdag::errors::AssetdagError;
use assetdag::pipeline::{PipelineSpec, TaskReport};
use assetdag::registry::{Registry, Task};

fn names(step: &assetdag::dag::SchedulerStep) -> Vec<String> {
    step.newly_scheduled.iter().map(|t| t.name.clone()).collect()
}

fn ok(task: &str) -> TaskReport {
    TaskReport::succeeded(task, 1, Duration::ZERO)
}

fn failed(task: &str) -> TaskReport {
    TaskReport::failed(task, "boom", Duration::ZERO)
}

/// css, js -> build ; images alone
fn site_registry() -> Arc<Registry> {
    let mut r = Registry::new();
    r.register(Task::new("css").with_pipeline(PipelineSpec::new(["src/scss/*.scss"], "build/css")))
        .unwrap();
    r.register(Task::new("js").with_pipeline(PipelineSpec::new(["src/js/*.js"], "build/js")))
        .unwrap();
    r.register(Task::new("images").with_pipeline(PipelineSpec::new(["src/img/*"], "build/img")))
        .unwrap();
    r.register(Task::new("build").with_prerequisites(["css", "js"]))
        .unwrap();
    Arc::new(r)
}

#[test]
fn plan_lists_prerequisites_before_dependents() {
    let scheduler = Scheduler::new(site_registry(), 4);
    assert_eq!(scheduler.plan("build").unwrap(), vec!["css", "js", "build"]);
    assert_eq!(scheduler.plan("images").unwrap(), vec!["images"]);
}

#[test]
fn cycle_is_reported_and_nothing_is_scheduled() {
    let mut r = Registry::new();
    r.declare(Task::new("a").with_prerequisites(["b"])).unwrap();
    r.declare(Task::new("b").with_prerequisites(["a"])).unwrap();
    let mut scheduler = Scheduler::new(Arc::new(r), 4);

    let err = scheduler.start_run(&["a".to_string()]).unwrap_err();
    match err {
        AssetdagError::CyclicDependency(path) => {
            assert_eq!(path, vec!["a", "b", "a"]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(scheduler.is_idle());
    assert_eq!(scheduler.run_state_of("a"), Some(TaskRunState::NotInRun));
}

#[test]
fn dependent_waits_for_all_prerequisites() {
    let mut scheduler = Scheduler::new(site_registry(), 4);

    let step = scheduler.start_run(&["build".to_string()]).unwrap();
    assert_eq!(names(&step), vec!["css", "js"]);
    assert_eq!(scheduler.deps_satisfied("build"), Some(false));

    let step = scheduler.handle_completion(ok("css"));
    assert!(step.newly_scheduled.is_empty());

    let step = scheduler.handle_completion(ok("js"));
    assert_eq!(names(&step), vec!["build"]);

    let step = scheduler.handle_completion(ok("build"));
    let summary = step.finished.expect("run finished");
    assert!(summary.is_success());
    assert_eq!(summary.executed(), vec!["css", "js", "build"]);
    assert!(scheduler.is_idle());
}

#[test]
fn failed_prerequisite_skips_dependent() {
    let mut scheduler = Scheduler::new(site_registry(), 1);

    let step = scheduler.start_run(&["build".to_string()]).unwrap();
    assert_eq!(names(&step), vec!["css"]);

    let step = scheduler.handle_completion(failed("css"));
    assert_eq!(step.newly_skipped, vec!["js", "build"]);

    let summary = step.finished.expect("run finished");
    assert_eq!(
        summary.failure,
        Some(RunFailure::PrerequisiteFailed {
            task: "build".into(),
            prerequisite: "css".into(),
        })
    );
    assert_eq!(scheduler.run_state_of("build"), Some(TaskRunState::Skipped));

    let err = summary.into_result().unwrap_err();
    assert!(matches!(err, AssetdagError::PrerequisiteFailed { .. }));
}

#[test]
fn running_tasks_finish_before_a_failed_run_ends() {
    let mut scheduler = Scheduler::new(site_registry(), 4);
    scheduler.start_run(&["build".to_string()]).unwrap();

    let step = scheduler.handle_completion(failed("js"));
    assert_eq!(step.newly_skipped, vec!["build"]);
    assert!(step.finished.is_none(), "css is still running");

    let step = scheduler.handle_completion(ok("css"));
    let summary = step.finished.expect("run finished");
    assert!(!summary.is_success());
    assert_eq!(summary.reports.len(), 2);
}

#[test]
fn failing_target_reports_task_failed() {
    let mut scheduler = Scheduler::new(site_registry(), 4);
    scheduler.start_run(&["images".to_string()]).unwrap();

    let summary = scheduler.handle_completion(failed("images")).finished.unwrap();
    assert!(matches!(
        summary.failure,
        Some(RunFailure::TaskFailed { ref task, .. }) if task == "images"
    ));
}

#[test]
fn parallelism_is_bounded() {
    let mut scheduler = Scheduler::new(site_registry(), 2);
    let step = scheduler
        .start_run(&["images".to_string(), "build".to_string()])
        .unwrap();
    assert_eq!(names(&step), vec!["images", "css"]);

    let step = scheduler.handle_completion(ok("images"));
    assert_eq!(names(&step), vec!["js"]);
}

#[test]
fn overlapping_destinations_never_run_together() {
    let mut r = Registry::new();
    r.register(Task::new("html").with_pipeline(PipelineSpec::new(["index_uncompressed.html"], "build")))
        .unwrap();
    r.register(Task::new("css").with_pipeline(PipelineSpec::new(["src/scss/*.scss"], "build/css")))
        .unwrap();
    let mut scheduler = Scheduler::new(Arc::new(r), 4);

    let step = scheduler
        .start_run(&["html".to_string(), "css".to_string()])
        .unwrap();
    assert_eq!(names(&step), vec!["html"]);

    let step = scheduler.handle_completion(ok("html"));
    assert_eq!(names(&step), vec!["css"]);
}

#[test]
fn second_run_while_active_is_rejected() {
    let mut scheduler = Scheduler::new(site_registry(), 4);
    scheduler.start_run(&["css".to_string()]).unwrap();
    assert!(scheduler.start_run(&["js".to_string()]).is_err());
}
