// src/lib.rs

pub mod cache;
pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod tasks;
pub mod template;
pub mod types;
pub mod version;

use anyhow::Result;
use tracing::{debug, info};

use crate::cli::{CliArgs, Command};
use crate::dag::ActionGraph;
use crate::engine::{Engine, EngineOptions, ProcessOptions, ProcessResults};
use crate::errors::TrellisError;
use crate::tasks::Task;
use crate::types::{ActionKey, ActionKind};

/// High-level entry point used by `main.rs`. Returns the process exit code.
///
/// This wires together:
/// - config loading and engine construction
/// - target selection from the command line
/// - processing (or planning, with `--dry-run`) and the final report
pub async fn run(args: CliArgs) -> Result<i32> {
    let engine = Engine::load(
        &args.config,
        EngineOptions {
            environment: args.environment.clone(),
            concurrency: args.concurrency,
            cache: args.cache.map(Into::into),
            write_version_files: None,
        },
    )?;

    let mut options = ProcessOptions {
        force: args.force,
        no_cache: args.no_cache,
        ..ProcessOptions::default()
    };

    let tasks = match &args.command {
        Command::Graph => {
            print_graph(engine.graph());
            return Ok(0);
        }
        Command::Versions { write } => {
            if args.dry_run {
                let tasks = resolve_tasks(engine.graph());
                print_plan(&engine, tasks, &options)?;
                return Ok(0);
            }
            return print_versions(&engine, *write).await;
        }
        Command::Status { keys } => {
            options.status_only = true;
            status_tasks(engine.graph(), keys)?
        }
        other => match other.targets() {
            Some((kind, names)) => process_tasks(engine.graph(), kind, names)?,
            None => Vec::new(),
        },
    };

    if tasks.is_empty() {
        info!("nothing to do");
        return Ok(0);
    }

    if args.dry_run {
        print_plan(&engine, tasks, &options)?;
        return Ok(0);
    }

    let results = engine.process(tasks, options).await?;
    print_report(&results);

    let failed = results
        .requested()
        .iter()
        .any(|key| results.get(key).is_none_or(|r| !r.is_success()));
    Ok(if failed { 1 } else { 0 })
}

/// Process tasks for the named actions of `kind`, or every enabled action
/// of that kind when no names are given.
fn process_tasks(graph: &ActionGraph, kind: ActionKind, names: &[String]) -> Result<Vec<Task>> {
    if names.is_empty() {
        return Ok(graph
            .actions_of_kind(kind)
            .map(|a| Task::process(a.key.clone()))
            .collect());
    }
    names
        .iter()
        .map(|name| {
            let key = ActionKey::new(kind, name.clone());
            if !graph.contains(&key) {
                return Err(TrellisError::ActionNotFound(key.to_string()).into());
            }
            Ok(Task::process(key))
        })
        .collect()
}

fn status_tasks(graph: &ActionGraph, keys: &[String]) -> Result<Vec<Task>> {
    if keys.is_empty() {
        return process_tasks(graph, ActionKind::Deploy, &[]);
    }
    keys.iter()
        .map(|raw| {
            let key: ActionKey = raw.parse().map_err(anyhow::Error::msg)?;
            if !graph.contains(&key) {
                return Err(TrellisError::ActionNotFound(key.to_string()).into());
            }
            Ok(Task::process(key))
        })
        .collect()
}

fn resolve_tasks(graph: &ActionGraph) -> Vec<Task> {
    graph
        .actions()
        .filter(|a| !a.disabled)
        .map(|a| Task::resolve(a.key.clone()))
        .collect()
}

async fn print_versions(engine: &Engine, write: bool) -> Result<i32> {
    let versions = if write {
        engine.freeze_versions().await?
    } else {
        engine.resolve_versions().await?
    };
    for (key, version) in versions.iter() {
        println!("{key:<32} {version}");
    }
    let expected = engine.graph().actions().filter(|a| !a.disabled).count();
    Ok(if versions.len() < expected { 1 } else { 0 })
}

fn print_graph(graph: &ActionGraph) {
    println!("actions ({}):", graph.len());
    for action in graph.actions() {
        let disabled = if action.disabled { " (disabled)" } else { "" };
        println!("  - {} [{}]{disabled}", action.key, action.type_name);
        for dep in action.dependencies.iter() {
            let mut flags = Vec::new();
            if dep.explicit {
                flags.push("explicit");
            }
            if dep.needs_static_outputs {
                flags.push("static");
            }
            if dep.needs_executed_outputs {
                flags.push("executed");
            }
            if dep.optional {
                flags.push("optional");
            }
            println!("      -> {} ({})", dep.key, flags.join(", "));
        }
    }
}

fn print_plan(engine: &Engine, tasks: Vec<Task>, options: &ProcessOptions) -> Result<()> {
    let order = engine.plan(tasks, options)?;
    println!("trellis dry-run");
    println!("  environment = {}", engine.context().environment());
    println!("  concurrency = {}", engine.context().concurrency());
    println!();
    println!("tasks ({}):", order.len());
    for key in order {
        println!("  - {key}");
    }
    debug!("dry-run complete (no execution)");
    Ok(())
}

fn print_report(results: &ProcessResults) {
    for key in results.requested() {
        let Some(result) = results.get(key) else {
            continue;
        };
        let version = result.version.as_deref().unwrap_or("-");
        let state = if result.aborted {
            "skipped".to_string()
        } else {
            result.state.to_string()
        };
        println!("{key:<40} {state:<10} {version}");
        if let Some(error) = &result.error {
            println!("    {error}");
        }
    }
    println!("{}", results.summary());
}
