// tests/engine_cache.rs

mod common;
use crate::common::{
    ActionBuilder, CountingHandler, FailingHandler, ProjectBuilder, engine, engine_with_fs,
    init_tracing, registry, with_timeout,
};

use std::error::Error;
use std::sync::Arc;

use tempfile::tempdir;
use trellis::cache::results_file_path;
use trellis::engine::{Engine, EngineOptions, ProcessOptions};
use trellis::exec::ActionTypeHandler;
use trellis::fs::RealFileSystem;
use trellis::fs::mock::MockFileSystem;
use trellis::tasks::{Task, TaskKey};
use trellis::types::{ActionKey, ActionKind, CacheStorageMode};

type TestResult = Result<(), Box<dyn Error>>;

fn action(s: &str) -> ActionKey {
    s.parse().unwrap()
}

fn chain() -> trellis::config::ProjectConfig {
    ProjectBuilder::new()
        .action(ActionBuilder::new("build.web").source("web").build())
        .action(ActionBuilder::new("deploy.web").source("deploy").depends_on("build.web").build())
        .build()
}

async fn deploy(engine: &Engine, options: ProcessOptions) -> TestResult {
    let results = with_timeout(engine.process(vec![Task::process(action("deploy.web"))], options)).await?;
    assert!(!results.has_failures(), "{}", results.summary());
    Ok(())
}

#[tokio::test]
async fn unchanged_actions_are_served_from_cache() -> TestResult {
    init_tracing();
    let build = CountingHandler::new(ActionKind::Build);
    let deployer = CountingHandler::new(ActionKind::Deploy);
    let engine = engine(
        chain(),
        vec![Arc::new(build.clone()) as Arc<dyn ActionTypeHandler>, Arc::new(deployer.clone())],
    );

    deploy(&engine, ProcessOptions::default()).await?;
    deploy(&engine, ProcessOptions::default()).await?;

    assert_eq!(build.executions(), 1);
    assert_eq!(deployer.executions(), 1);
    Ok(())
}

#[tokio::test]
async fn force_reruns_requested_task_but_not_its_dependencies() -> TestResult {
    init_tracing();
    let build = CountingHandler::new(ActionKind::Build);
    let deployer = CountingHandler::new(ActionKind::Deploy);
    let engine = engine(
        chain(),
        vec![Arc::new(build.clone()) as Arc<dyn ActionTypeHandler>, Arc::new(deployer.clone())],
    );

    deploy(&engine, ProcessOptions::default()).await?;
    deploy(
        &engine,
        ProcessOptions {
            force: true,
            ..ProcessOptions::default()
        },
    )
    .await?;

    assert_eq!(build.executions(), 1);
    assert_eq!(deployer.executions(), 2);
    Ok(())
}

#[tokio::test]
async fn no_cache_reruns_the_whole_chain() -> TestResult {
    init_tracing();
    let build = CountingHandler::new(ActionKind::Build);
    let deployer = CountingHandler::new(ActionKind::Deploy);
    let engine = engine(
        chain(),
        vec![Arc::new(build.clone()) as Arc<dyn ActionTypeHandler>, Arc::new(deployer.clone())],
    );

    deploy(&engine, ProcessOptions::default()).await?;
    deploy(
        &engine,
        ProcessOptions {
            no_cache: true,
            ..ProcessOptions::default()
        },
    )
    .await?;

    assert_eq!(build.executions(), 2);
    assert_eq!(deployer.executions(), 2);
    Ok(())
}

#[tokio::test]
async fn source_change_invalidates_cached_results() -> TestResult {
    init_tracing();
    let fs = Arc::new(MockFileSystem::new());
    fs.add_file("web/index.js", "v1");
    let build = CountingHandler::new(ActionKind::Build);
    let deployer = CountingHandler::new(ActionKind::Deploy);
    let engine = engine_with_fs(
        chain(),
        vec![Arc::new(build.clone()) as Arc<dyn ActionTypeHandler>, Arc::new(deployer.clone())],
        fs.clone(),
    );

    deploy(&engine, ProcessOptions::default()).await?;
    fs.add_file("web/index.js", "v2");
    deploy(&engine, ProcessOptions::default()).await?;

    assert_eq!(build.executions(), 2);
    // deploy.web's version embeds build.web's, so it re-runs as well.
    assert_eq!(deployer.executions(), 2);
    Ok(())
}

#[tokio::test]
async fn failed_results_are_never_reused() -> TestResult {
    init_tracing();
    let failing = FailingHandler::new(ActionKind::Build, &["web"]);
    let project = ProjectBuilder::new()
        .action(ActionBuilder::new("build.web").source("web").build())
        .build();
    let engine = engine(project, vec![Arc::new(failing.clone()) as Arc<dyn ActionTypeHandler>]);

    for _ in 0..2 {
        let results = with_timeout(
            engine.process(vec![Task::process(action("build.web"))], ProcessOptions::default()),
        )
        .await?;
        assert_eq!(results.failed().len(), 1);
    }

    assert_eq!(failing.executions(), 2);
    let stored = engine
        .context()
        .cache()
        .get_any(&"process.build.web".parse::<TaskKey>()?)?
        .expect("failed result is still stored");
    assert!(stored.result.is_failed());
    Ok(())
}

#[tokio::test]
async fn file_cache_survives_engine_restarts() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    std::fs::create_dir_all(dir.path().join("web"))?;
    std::fs::write(dir.path().join("web/main.rs"), "fn main() {}")?;

    let project = || {
        ProjectBuilder::new()
            .root(dir.path())
            .cache(CacheStorageMode::File)
            .action(
                ActionBuilder::new("build.web")
                    .config_dir(dir.path())
                    .source("web")
                    .build(),
            )
            .build()
    };
    let build = CountingHandler::new(ActionKind::Build);

    for _ in 0..2 {
        let engine = Engine::new(
            project(),
            registry(vec![Arc::new(build.clone()) as Arc<dyn ActionTypeHandler>]),
            Arc::new(RealFileSystem),
            EngineOptions::default(),
        )?;
        let results = with_timeout(
            engine.process(vec![Task::process(action("build.web"))], ProcessOptions::default()),
        )
        .await?;
        assert!(!results.has_failures());
    }

    assert_eq!(build.executions(), 1);
    let stored = std::fs::read_to_string(results_file_path(dir.path()))?;
    assert!(stored.contains("process.build.web"));
    Ok(())
}

#[tokio::test]
async fn results_of_removed_actions_are_dropped_on_startup() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let build = CountingHandler::new(ActionKind::Build);
    let handlers = || registry(vec![Arc::new(build.clone()) as Arc<dyn ActionTypeHandler>]);
    let project = |names: &[&str]| {
        let mut builder = ProjectBuilder::new().root(dir.path()).cache(CacheStorageMode::File);
        for name in names {
            builder = builder.action(
                ActionBuilder::new(&format!("build.{name}"))
                    .config_dir(dir.path())
                    .build(),
            );
        }
        builder.build()
    };

    let engine = Engine::new(
        project(&["web", "legacy"]),
        handlers(),
        Arc::new(RealFileSystem),
        EngineOptions::default(),
    )?;
    let tasks = vec![Task::process(action("build.web")), Task::process(action("build.legacy"))];
    let results = with_timeout(engine.process(tasks, ProcessOptions::default())).await?;
    assert!(!results.has_failures());
    let stored = std::fs::read_to_string(results_file_path(dir.path()))?;
    assert!(stored.contains("process.build.legacy"));

    Engine::new(
        project(&["web"]),
        handlers(),
        Arc::new(RealFileSystem),
        EngineOptions::default(),
    )?;
    let stored = std::fs::read_to_string(results_file_path(dir.path()))?;
    assert!(!stored.contains("process.build.legacy"), "{stored}");
    assert!(stored.contains("process.build.web"));
    Ok(())
}
