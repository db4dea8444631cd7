// tests/original_build.rs

use std::path::Path;

use assetdag::config::load_and_validate;
use assetdag::dag::Scheduler;
use assetdag::registry::Registry;
use assetdag::watch::build_bindings;
use assetdag::{run_tasks, watch_task};
use assetdag_test_utils::{init_tracing, ProjectDir};
use std::sync::Arc;

fn demo_config_path() -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("demos/Assetdag.toml")
}

#[test]
fn demo_config_plans_the_full_build() {
    let cfg = load_and_validate(demo_config_path()).unwrap();
    let registry = Arc::new(Registry::from_config(&cfg).unwrap());
    let scheduler = Scheduler::new(Arc::clone(&registry), 4);

    let plan = scheduler.plan("b").unwrap();
    assert_eq!(plan.last().map(String::as_str), Some("b"));
    let pos = |t: &str| plan.iter().position(|n| n == t).unwrap();
    assert!(pos("build-html-main-page") < pos("build-html"));
    assert!(pos("build-html-partials") < pos("build-html"));
    assert_eq!(plan.len(), 7);

    let bindings = build_bindings(&registry, &plan).unwrap();
    let watched: Vec<&str> = bindings.iter().map(|b| b.task()).collect();
    assert_eq!(watched.len(), 5);
    assert!(!watched.contains(&"build-html"));

    let js = bindings.iter().find(|b| b.task() == "build-js").unwrap();
    assert!(js.matches("src/js/controllers/mainCtrl.js"));
    assert!(js.matches("src/js/app.js"));
    assert!(!js.matches("build/js/main.min.js"));

    assert_eq!(cfg.clean_paths().len(), 4);
}

const SITE_CONFIG: &str = r#"
[group.js]
src = ["src/js/ui/*.js", "src/js/app.js"]
dest = "build/js"

[task.build-js]
group = "js"
steps = [
  { kind = "concat", file = "main.min.js" },
  { kind = "minify-js" },
  { kind = "strip-debug" },
]

[task.build-html-main-page]
src = ["./index_uncompressed.html"]
dest = "./"
kind = "build"
steps = [
  { kind = "strip-html-comments" },
  { kind = "minify-html" },
  { kind = "rename", file = "index.html" },
]

[task.b]
after = ["build-js", "build-html-main-page"]
"#;

#[tokio::test]
async fn run_builds_scripts_and_main_page() {
    init_tracing();
    let project = ProjectDir::new();
    project
        .write("Assetdag.toml", SITE_CONFIG)
        .write("src/js/ui/widget.js", "function widget() {\n    debugger;\n    return 1;\n}\n")
        .write("src/js/app.js", "// boot\nwidget();\nconsole.log('ready');\n")
        .write(
            "index_uncompressed.html",
            "<html>\n  <!-- dev only -->\n  <body>\n    <p>hi</p>\n  </body>\n</html>\n",
        );

    let cfg = load_and_validate(project.path("Assetdag.toml")).unwrap();
    let summary = run_tasks(&cfg, project.root(), vec!["b".into()]).await.unwrap();

    assert!(summary.is_success(), "{:?}", summary.failure);
    assert_eq!(summary.executed().len(), 3);

    let js = project.read("build/js/main.min.js");
    assert!(js.starts_with("function widget()"));
    assert!(js.contains("widget();"));
    assert!(!js.contains("debugger"));
    assert!(!js.contains("console.log"));

    let html = project.read("index.html");
    assert_eq!(html, "<html><body><p>hi</p></body></html>");
}

#[tokio::test]
async fn run_rejects_unknown_task_before_executing() {
    let project = ProjectDir::new();
    project.write("Assetdag.toml", SITE_CONFIG);
    let cfg = load_and_validate(project.path("Assetdag.toml")).unwrap();

    let err = run_tasks(&cfg, project.root(), vec!["w2015".into()]).await.unwrap_err();
    assert!(err.to_string().contains("w2015"));

    let err = watch_task(&cfg, project.root(), "w2015".into()).await.unwrap_err();
    assert!(err.to_string().contains("w2015"));
    assert!(!project.exists("build"));
}
