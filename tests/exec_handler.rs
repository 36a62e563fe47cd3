// tests/exec_handler.rs
#![cfg(unix)]

mod common;
use crate::common::{ActionBuilder, ProjectBuilder, init_tracing, with_timeout};

use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use tempfile::tempdir;
use trellis::config::ProjectConfig;
use trellis::engine::{Engine, EngineOptions, ProcessOptions, ProcessResults};
use trellis::exec::{EXEC_TYPE, HandlerRegistry};
use trellis::fs::RealFileSystem;
use trellis::tasks::{Task, TaskKey};
use trellis::types::{ActionKey, ResultState};

type TestResult = Result<(), Box<dyn Error>>;

fn exec(key: &str, dir: &Path) -> ActionBuilder {
    ActionBuilder::new(key).type_name(EXEC_TYPE).config_dir(dir)
}

fn engine(project: ProjectConfig) -> Engine {
    Engine::new(
        project,
        HandlerRegistry::with_builtins(),
        Arc::new(RealFileSystem),
        EngineOptions::default(),
    )
    .expect("engine should build")
}

async fn process(engine: &Engine, key: &str, options: ProcessOptions) -> ProcessResults {
    let action: ActionKey = key.parse().unwrap();
    with_timeout(engine.process(vec![Task::process(action)], options))
        .await
        .expect("processing should not error")
}

fn task(s: &str) -> TaskKey {
    s.parse().unwrap()
}

#[tokio::test]
async fn commands_run_in_the_action_source_directory() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    std::fs::create_dir_all(dir.path().join("app"))?;
    std::fs::write(dir.path().join("app/input.txt"), "hello")?;

    let project = ProjectBuilder::new()
        .root(dir.path())
        .action(
            exec("run.cat", dir.path())
                .source("app")
                .spec(json!({ "command": ["sh", "-c", "cat input.txt"] }))
                .build(),
        )
        .build();
    let engine = engine(project);

    let results = process(&engine, "run.cat", ProcessOptions::default()).await;
    let result = results.get(&task("process.run.cat")).expect("result");
    assert_eq!(result.state, ResultState::Ready, "{:?}", result.error);
    assert_eq!(result.outputs["stdout"], json!("hello"));
    assert_eq!(result.outputs["exit_code"], json!(0));
    Ok(())
}

#[tokio::test]
async fn executed_outputs_flow_into_dependent_commands() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let project = ProjectBuilder::new()
        .root(dir.path())
        .action(
            exec("deploy.api", dir.path())
                .spec(json!({ "command": ["echo", "http://api.local"] }))
                .build(),
        )
        .action(
            exec("run.smoke", dir.path())
                .spec(json!({
                    "command": ["echo", "checking ${deploy.api.outputs.stdout}"],
                    "env": { "API_URL": "${deploy.api.outputs.stdout}" }
                }))
                .build(),
        )
        .build();
    let engine = engine(project);

    let results = process(&engine, "run.smoke", ProcessOptions::default()).await;
    let smoke = results.get(&task("process.run.smoke")).expect("smoke result");
    assert!(smoke.is_success(), "{:?}", smoke.error);
    assert_eq!(smoke.outputs["stdout"], json!("checking http://api.local"));
    assert!(results.get(&task("process.deploy.api")).is_some_and(|r| r.is_success()));
    Ok(())
}

#[tokio::test]
async fn steps_see_earlier_step_outputs() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let project = ProjectBuilder::new()
        .root(dir.path())
        .action(
            exec("test.pipeline", dir.path())
                .spec(json!({
                    "steps": [
                        { "name": "first", "command": ["echo", "one"] },
                        { "name": "second", "command": ["echo", "${steps.first.outputs.stdout}-two"] }
                    ]
                }))
                .build(),
        )
        .build();
    let engine = engine(project);

    let results = process(&engine, "test.pipeline", ProcessOptions::default()).await;
    let result = results.get(&task("process.test.pipeline")).expect("result");
    assert!(result.is_success(), "{:?}", result.error);
    assert_eq!(result.outputs["steps"]["first"]["outputs"]["stdout"], json!("one"));
    assert_eq!(result.outputs["stdout"], json!("one-two"));
    Ok(())
}

#[tokio::test]
async fn non_zero_exit_fails_the_task() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let project = ProjectBuilder::new()
        .root(dir.path())
        .action(
            exec("test.broken", dir.path())
                .spec(json!({ "command": ["sh", "-c", "echo boom >&2; exit 3"] }))
                .build(),
        )
        .build();
    let engine = engine(project);

    let results = process(&engine, "test.broken", ProcessOptions::default()).await;
    let result = results.get(&task("process.test.broken")).expect("result");
    assert!(result.is_failed());
    let error = result.error.clone().unwrap_or_default();
    assert!(error.contains("exited with code 3"), "{error}");
    assert!(error.contains("boom"), "{error}");
    Ok(())
}

#[tokio::test]
async fn run_without_anything_to_run_fails() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let project = ProjectBuilder::new()
        .root(dir.path())
        .action(exec("run.empty", dir.path()).build())
        .action(exec("build.empty", dir.path()).build())
        .build();
    let engine = engine(project);

    let results = process(&engine, "run.empty", ProcessOptions::default()).await;
    assert!(results.get(&task("process.run.empty")).is_some_and(|r| r.is_failed()));

    let results = process(&engine, "build.empty", ProcessOptions::default()).await;
    assert!(results.get(&task("process.build.empty")).is_some_and(|r| r.is_success()));
    Ok(())
}

#[tokio::test]
async fn status_command_decides_deploy_status() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let project = ProjectBuilder::new()
        .root(dir.path())
        .action(
            exec("deploy.up", dir.path())
                .spec(json!({ "command": ["true"], "status_command": ["true"] }))
                .build(),
        )
        .action(
            exec("deploy.stale", dir.path())
                .spec(json!({ "command": ["true"], "status_command": ["sh", "-c", "exit 1"] }))
                .build(),
        )
        .action(
            exec("deploy.unknown", dir.path())
                .spec(json!({ "command": ["true"] }))
                .build(),
        )
        .build();
    let engine = engine(project);
    let status_only = ProcessOptions {
        status_only: true,
        ..ProcessOptions::default()
    };

    for (name, expected) in [
        ("deploy.up", ResultState::Ready),
        ("deploy.stale", ResultState::Outdated),
        ("deploy.unknown", ResultState::Unknown),
    ] {
        let results = process(&engine, name, status_only).await;
        let status = results
            .get(&task(&format!("status.{name}")))
            .expect("status result");
        assert_eq!(status.state, expected, "{name}");
    }
    Ok(())
}
