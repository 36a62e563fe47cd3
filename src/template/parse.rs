// src/template/parse.rs

//! Tokenizer for `${...}` expressions embedded in strings.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::types::{ActionKey, ActionKind};

/// `$${` is an escaped literal `${`; `${path}` is an expression, optionally
/// followed by `?`.
static EXPRESSION: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"\$\$\{|\$\{([^{}]*)\}(\?)?"));

/// One parsed `${...}` expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expression {
    /// Dot-separated path segments.
    pub path: Vec<String>,
    /// `?` suffix: a missing value resolves to null instead of failing.
    pub optional: bool,
    /// The exact source text, used to leave deferred expressions verbatim.
    pub raw: String,
}

impl Expression {
    pub fn dotted(&self) -> String {
        self.path.join(".")
    }

    pub fn scope(&self) -> Scope {
        Scope::of(&self.path)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    /// `$${`, kept apart so that intermediate passes can re-emit it.
    Escape,
    Expr(Expression),
}

/// Which part of the context an expression reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Variables,
    Environment,
    Project,
    Providers,
    This,
    Local,
    /// `<kind>.<name>...` or `actions.<kind>.<name>...`
    Action,
    Steps,
    Unknown,
}

impl Scope {
    pub fn of(path: &[String]) -> Scope {
        let Some(first) = path.first() else {
            return Scope::Unknown;
        };
        match first.as_str() {
            "var" | "variables" => Scope::Variables,
            "environment" => Scope::Environment,
            "project" => Scope::Project,
            "providers" => Scope::Providers,
            "this" => Scope::This,
            "local" => Scope::Local,
            "steps" => Scope::Steps,
            "actions" => Scope::Action,
            other if other.parse::<ActionKind>().is_ok() => Scope::Action,
            _ => Scope::Unknown,
        }
    }
}

/// Which field of another action an expression reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionField {
    Outputs,
    Version,
    Name,
    /// The bare action (`${build.web}`) or another field.
    Other,
}

/// An expression pointing at another action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionReference {
    pub key: ActionKey,
    pub field: ActionField,
    pub optional: bool,
    pub raw: String,
}

impl ActionReference {
    /// The referenced outputs only exist once the action has executed.
    pub fn needs_executed_outputs(&self) -> bool {
        self.field == ActionField::Outputs && self.key.kind.has_runtime_outputs()
    }
}

impl Expression {
    /// Interpret an action-scoped expression. `Err` carries a message for
    /// malformed paths such as `${deploy}`.
    pub fn action_reference(&self) -> Option<Result<ActionReference, String>> {
        if self.scope() != Scope::Action {
            return None;
        }
        let path = action_path(&self.path);
        if path.len() < 2 {
            return Some(Err(format!(
                "'{}' must name an action as <kind>.<name>",
                self.dotted()
            )));
        }
        let kind = match path[0].parse::<ActionKind>() {
            Ok(kind) => kind,
            Err(e) => return Some(Err(e)),
        };
        let field = match path.get(2).map(|s| s.as_str()) {
            Some("outputs") => ActionField::Outputs,
            Some("version") => ActionField::Version,
            Some("name") => ActionField::Name,
            _ => ActionField::Other,
        };
        Some(Ok(ActionReference {
            key: ActionKey::new(kind, path[1].clone()),
            field,
            optional: self.optional,
            raw: self.raw.clone(),
        }))
    }
}

/// Strip the `actions.` alias from an action-scoped path.
pub fn action_path(path: &[String]) -> &[String] {
    match path.first().map(|s| s.as_str()) {
        Some("actions") => &path[1..],
        _ => path,
    }
}

/// Split a string into literals, escapes and expressions.
pub fn parse_template(input: &str) -> Result<Vec<Segment>, String> {
    let regex = EXPRESSION
        .as_ref()
        .map_err(|e| format!("template pattern failed to compile: {e}"))?;

    let mut segments = Vec::new();
    let mut last = 0;

    for caps in regex.captures_iter(input) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        push_literal(&mut segments, &input[last..whole.start()])?;
        last = whole.end();

        if whole.as_str() == "$${" {
            segments.push(Segment::Escape);
            continue;
        }

        let body = caps.get(1).map(|m| m.as_str()).unwrap_or_default().trim();
        let path: Vec<String> = body.split('.').map(|s| s.trim().to_string()).collect();
        if path.iter().any(|s| !is_valid_segment(s)) {
            return Err(format!("invalid expression '{}'", whole.as_str()));
        }

        segments.push(Segment::Expr(Expression {
            path,
            optional: caps.get(2).is_some(),
            raw: whole.as_str().to_string(),
        }));
    }

    push_literal(&mut segments, &input[last..])?;
    Ok(segments)
}

/// Whether the string contains anything other than plain text.
pub fn has_template(input: &str) -> bool {
    input.contains("${")
}

fn push_literal(segments: &mut Vec<Segment>, text: &str) -> Result<(), String> {
    if text.is_empty() {
        return Ok(());
    }
    if text.contains("${") {
        return Err(format!("unterminated expression in '{text}'"));
    }
    segments.push(Segment::Literal(text.to_string()));
    Ok(())
}

fn is_valid_segment(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
