// tests/config_loading.rs

mod common;
use crate::common::{init_tracing, with_timeout};

use std::error::Error;
use std::fs;
use std::path::Path;

use serde_json::json;
use tempfile::{NamedTempFile, tempdir};
use trellis::config::load_and_validate;
use trellis::engine::{Engine, EngineOptions, ProcessOptions};
use trellis::errors::TrellisError;
use trellis::tasks::{Task, TaskKey};
use trellis::types::ActionKey;

type TestResult = Result<(), Box<dyn Error>>;

fn write(dir: &Path, rel: &str, contents: &str) {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

const PROJECT: &str = r#"
[project]
name = "shop"
default_environment = "local"
includes = ["services/api/actions.toml"]

[variables]
registry = "registry.example.com"
replicas = 1

[environments.local]
variables = { replicas = 2 }
varfiles = ["env/local.toml"]

[environments.prod]
variables = { replicas = 5 }

[[action]]
kind = "Build"
name = "web"
type = "exec"
source = "web"
[action.spec]
command = ["echo", "build"]
outputs = { image = "${var.registry}/web" }

[[action]]
kind = "Deploy"
name = "web"
type = "exec"
source = "web"
dependencies = ["build.web"]
variables = { tier = "frontend" }
[action.spec]
command = ["echo", "${build.web.outputs.image}"]
env = { REPLICAS = "${var.replicas}", TIER = "${var.tier}", ENVIRONMENT = "${environment.name}" }
"#;

const INCLUDED: &str = r#"
[[action]]
kind = "Build"
name = "api"
type = "exec"
[action.spec]
command = ["echo", "api"]
"#;

fn project_dir() -> tempfile::TempDir {
    let dir = tempdir().unwrap();
    write(dir.path(), "trellis.toml", PROJECT);
    write(dir.path(), "services/api/actions.toml", INCLUDED);
    write(dir.path(), "services/api/main.go", "package main");
    write(dir.path(), "env/local.toml", "registry = \"localhost:5000\"\n");
    write(dir.path(), "web/index.html", "<html></html>");
    dir
}

#[test]
fn loads_includes_and_varfiles() -> TestResult {
    let dir = project_dir();
    let project = load_and_validate(dir.path().join("trellis.toml"))?;

    assert_eq!(project.name(), "shop");
    assert_eq!(project.default_environment(), "local");
    assert_eq!(project.actions().len(), 3);

    let api = project
        .actions()
        .iter()
        .find(|a| a.name == "api")
        .expect("included action");
    assert_eq!(api.config_dir(), dir.path().join("services/api"));
    assert_eq!(api.base_path(), dir.path().join("services/api"));

    let local = project.environment("local").expect("local environment");
    assert_eq!(local.varfile_variables["registry"], json!("localhost:5000"));
    Ok(())
}

#[tokio::test]
async fn variables_follow_precedence_per_environment() -> TestResult {
    init_tracing();
    let dir = project_dir();
    let deploy: ActionKey = "deploy.web".parse()?;
    let resolve_key: TaskKey = "resolve.deploy.web".parse()?;

    let local = Engine::load(dir.path().join("trellis.toml"), EngineOptions::default())?;
    let results = with_timeout(
        local.process(vec![Task::resolve(deploy.clone())], ProcessOptions::default()),
    )
    .await?;
    let spec = results
        .get(&resolve_key)
        .and_then(|r| r.resolved.clone())
        .expect("resolved deploy.web")
        .spec;
    assert_eq!(spec["command"], json!(["echo", "localhost:5000/web"]));
    assert_eq!(
        spec["env"],
        json!({ "REPLICAS": 2, "TIER": "frontend", "ENVIRONMENT": "local" })
    );

    let prod = Engine::load(
        dir.path().join("trellis.toml"),
        EngineOptions {
            environment: Some("prod".to_string()),
            ..EngineOptions::default()
        },
    )?;
    let results = with_timeout(
        prod.process(vec![Task::resolve(deploy)], ProcessOptions::default()),
    )
    .await?;
    let spec = results
        .get(&resolve_key)
        .and_then(|r| r.resolved.clone())
        .expect("resolved deploy.web")
        .spec;
    assert_eq!(spec["command"], json!(["echo", "registry.example.com/web"]));
    assert_eq!(spec["env"]["REPLICAS"], json!(5));
    assert_eq!(spec["env"]["ENVIRONMENT"], json!("prod"));
    Ok(())
}

#[test]
fn undeclared_default_environment_is_rejected() {
    let mut file = NamedTempFile::new().unwrap();
    std::io::Write::write_all(
        &mut file,
        br#"
[project]
default_environment = "staging"

[environments.local]
variables = {}
"#,
    )
    .unwrap();

    match load_and_validate(file.path()) {
        Err(TrellisError::Configuration(msg)) => assert!(msg.contains("staging")),
        Err(e) => panic!("Expected Configuration error, got: {e:?}"),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn invalid_action_name_is_rejected() {
    let mut file = NamedTempFile::new().unwrap();
    std::io::Write::write_all(
        &mut file,
        br#"
[[action]]
kind = "Build"
name = "web app"
type = "exec"
"#,
    )
    .unwrap();

    let err = load_and_validate(file.path()).unwrap_err();
    assert!(err.to_string().contains("invalid action name"), "{err}");
}

#[test]
fn missing_include_is_a_configuration_error() {
    let dir = tempdir().unwrap();
    write(
        dir.path(),
        "trellis.toml",
        "[project]\nincludes = [\"nope/actions.toml\"]\n",
    );
    let err = load_and_validate(dir.path().join("trellis.toml")).unwrap_err();
    assert!(matches!(err, TrellisError::Configuration(_)), "{err}");
    assert!(err.to_string().contains("nope/actions.toml"));
}
