// src/exec/exec_handler.rs

//! Built-in `exec` handler: runs local commands.
//!
//! ```toml
//! [[action]]
//! kind = "Run"
//! name = "migrate"
//! type = "exec"
//! [action.spec]
//! command = ["./migrate.sh", "${deploy.db.outputs.url}"]
//! env = { RUST_LOG = "info" }
//! outputs = { report = "migrations.log" }
//! ```
//!
//! Specs may also carry a `steps` array; steps run in order after `command`
//! and can read earlier steps' outputs through `${steps.<name>.outputs.*}`.

use std::path::Path;
use std::process::Stdio;

use anyhow::{Context, Result, bail};
use serde_json::{Map, Value, json};
use tokio::process::Command;
use tracing::{debug, info};

use crate::exec::handler::{ActionTypeHandler, HandlerFuture, HandlerOutput, ResolvedAction};
use crate::exec::schema::{ActionSchema, FieldType};
use crate::template::{Pass, TemplateContext, resolve_str, step_name};
use crate::types::{ActionKind, ResultState};

pub const EXEC_TYPE: &str = "exec";

#[derive(Debug, Clone)]
pub struct ExecHandler {
    kind: ActionKind,
}

impl ExecHandler {
    pub fn new(kind: ActionKind) -> Self {
        Self { kind }
    }
}

/// Captured result of one process.
#[derive(Debug, Clone)]
struct ProcessOutput {
    stdout: String,
    stderr: String,
    exit_code: i32,
}

impl ProcessOutput {
    fn to_outputs(&self) -> Map<String, Value> {
        let mut out = Map::new();
        out.insert("stdout".to_string(), Value::String(self.stdout.clone()));
        out.insert("stderr".to_string(), Value::String(self.stderr.clone()));
        out.insert("exit_code".to_string(), json!(self.exit_code));
        out
    }
}

impl ActionTypeHandler for ExecHandler {
    fn kind(&self) -> ActionKind {
        self.kind
    }

    fn type_name(&self) -> &str {
        EXEC_TYPE
    }

    fn schema(&self) -> ActionSchema {
        let schema = ActionSchema::new()
            .optional("command", FieldType::array_of(FieldType::String))
            .with_default("shell", FieldType::Bool, json!(false))
            .with_default("env", FieldType::Object, json!({}))
            .with_default("outputs", FieldType::Object, json!({}))
            .optional("steps", FieldType::array_of(FieldType::Object));
        match self.kind {
            ActionKind::Deploy => {
                schema.optional("status_command", FieldType::array_of(FieldType::String))
            }
            _ => schema,
        }
    }

    fn output_schema(&self) -> ActionSchema {
        ActionSchema::open()
            .optional("stdout", FieldType::String)
            .optional("stderr", FieldType::String)
            .optional("exit_code", FieldType::Integer)
            .optional("path", FieldType::String)
    }

    /// Declared `outputs` plus the action's `path`.
    fn static_outputs(&self, action: &ResolvedAction) -> Result<Map<String, Value>> {
        let mut out = action
            .spec
            .get("outputs")
            .and_then(|o| o.as_object())
            .cloned()
            .unwrap_or_default();
        out.insert(
            "path".to_string(),
            Value::String(action.base_path.to_string_lossy().into_owned()),
        );
        Ok(out)
    }

    fn get_status<'a>(&'a self, action: &'a ResolvedAction) -> HandlerFuture<'a> {
        Box::pin(self.status(action))
    }

    fn execute<'a>(&'a self, action: &'a ResolvedAction) -> HandlerFuture<'a> {
        Box::pin(self.run(action))
    }
}

impl ExecHandler {
    async fn status(&self, action: &ResolvedAction) -> Result<HandlerOutput> {
        let Some(status_command) = string_array(&action.spec, "status_command")? else {
            return Ok(HandlerOutput::new(ResultState::Unknown));
        };
        let result = run_process(action, &status_command, false).await?;
        let state = if result.exit_code == 0 {
            ResultState::Ready
        } else {
            ResultState::Outdated
        };
        Ok(HandlerOutput {
            state,
            outputs: action.static_outputs.clone(),
            detail: json!({ "exit_code": result.exit_code }),
        })
    }

    async fn run(&self, action: &ResolvedAction) -> Result<HandlerOutput> {
        let command = string_array(&action.spec, "command")?;
        let steps = action
            .spec
            .get("steps")
            .and_then(|s| s.as_array())
            .cloned()
            .unwrap_or_default();

        if command.is_none() && steps.is_empty() {
            if matches!(self.kind, ActionKind::Run | ActionKind::Test) {
                bail!("{} has neither `command` nor `steps` to run", action.key);
            }
            debug!(action = %action.key, "nothing to execute");
            return Ok(HandlerOutput::ready(action.static_outputs.clone()));
        }

        let shell = action
            .spec
            .get("shell")
            .and_then(|s| s.as_bool())
            .unwrap_or(false);

        let mut outputs = action.static_outputs.clone();

        if let Some(command) = command {
            let result = run_process(action, &command, shell).await?;
            check_exit(action, "command", &result)?;
            outputs.extend(result.to_outputs());
        }

        let mut completed: Vec<(String, Map<String, Value>)> = Vec::new();
        for (i, step) in steps.iter().enumerate() {
            let name = step_name(step, i);
            let ctx = TemplateContext::new().with_steps(&completed);
            let raw = string_array(step, "command")?
                .with_context(|| format!("step '{name}' of {} has no `command`", action.key))?;
            let mut argv = Vec::with_capacity(raw.len());
            for arg in raw {
                let value = resolve_str(&arg, &ctx, Pass::Steps)
                    .map_err(|e| anyhow::anyhow!("step '{name}': {e}"))?;
                argv.push(match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                });
            }

            info!(action = %action.key, step = %name, "running step");
            let result = run_process(action, &argv, shell).await?;
            check_exit(action, &format!("step '{name}'"), &result)?;
            completed.push((name, result.to_outputs()));
        }

        if !completed.is_empty() {
            let mut by_name = Map::new();
            for (name, step_outputs) in completed.iter() {
                by_name.insert(
                    name.clone(),
                    json!({ "outputs": Value::Object(step_outputs.clone()) }),
                );
            }
            outputs.insert("steps".to_string(), Value::Object(by_name));
            if let Some((_, last)) = completed.last() {
                for (k, v) in last {
                    outputs.entry(k.clone()).or_insert_with(|| v.clone());
                }
            }
        }

        Ok(HandlerOutput::ready(outputs))
    }
}

fn string_array(spec: &Value, field: &str) -> Result<Option<Vec<String>>> {
    let Some(value) = spec.get(field) else {
        return Ok(None);
    };
    let Some(items) = value.as_array() else {
        bail!("`{field}` must be an array of strings");
    };
    items
        .iter()
        .map(|v| {
            v.as_str()
                .map(String::from)
                .with_context(|| format!("`{field}` must be an array of strings"))
        })
        .collect::<Result<Vec<_>>>()
        .map(Some)
}

fn check_exit(action: &ResolvedAction, what: &str, result: &ProcessOutput) -> Result<()> {
    if result.exit_code != 0 {
        let stderr = result.stderr.trim();
        bail!(
            "{what} of {} exited with code {}{}",
            action.key,
            result.exit_code,
            if stderr.is_empty() {
                String::new()
            } else {
                format!(": {stderr}")
            }
        );
    }
    Ok(())
}

/// Run `argv` in the action's base path, capturing stdout and stderr.
async fn run_process(action: &ResolvedAction, argv: &[String], shell: bool) -> Result<ProcessOutput> {
    let Some((program, args)) = argv.split_first() else {
        bail!("{}: empty command", action.key);
    };

    let mut cmd = if shell {
        let line = argv.join(" ");
        if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(line);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(line);
            c
        }
    } else {
        let mut c = Command::new(program);
        c.args(args);
        c
    };

    if let Some(env) = action.spec.get("env").and_then(|e| e.as_object()) {
        for (k, v) in env {
            let value = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            cmd.env(k, value);
        }
    }

    if !action.base_path.as_os_str().is_empty() && action.base_path != Path::new(".") {
        cmd.current_dir(&action.base_path);
    }

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    info!(action = %action.key, cmd = %argv.join(" "), "starting process");

    let output = cmd
        .output()
        .await
        .with_context(|| format!("spawning process for {}", action.key))?;

    let stdout = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).trim_end().to_string();
    for line in stderr.lines() {
        debug!(action = %action.key, "stderr: {}", line);
    }

    let exit_code = output.status.code().unwrap_or(-1);
    info!(
        action = %action.key,
        exit_code,
        success = output.status.success(),
        "process exited"
    );

    Ok(ProcessOutput {
        stdout,
        stderr,
        exit_code,
    })
}
