// src/template/resolve.rs

//! Substitution of `${...}` expressions inside JSON values.

use serde_json::{Map, Value};

use crate::errors::{Result, TrellisError};
use crate::template::context::TemplateContext;
use crate::template::parse::{Expression, Scope, Segment, parse_template};

/// Which scopes a substitution pass fills in.
///
/// Expressions outside the pass are written back verbatim so a later pass
/// can pick them up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    /// Everything except action and step scopes. Escapes stay escaped.
    Partial,
    /// Everything except step scopes. Escapes are turned into `${`.
    Full,
    /// Step scopes only, applied at execution time.
    Steps,
}

impl Pass {
    fn substitutes(&self, scope: Scope) -> bool {
        match self {
            Pass::Partial => !matches!(scope, Scope::Action | Scope::Steps),
            Pass::Full => scope != Scope::Steps,
            Pass::Steps => scope == Scope::Steps,
        }
    }

    fn unescapes(&self) -> bool {
        matches!(self, Pass::Full)
    }
}

/// Resolve every string in `value`. `context` names the owner (usually a
/// task key) for error messages.
pub fn resolve_template(
    value: &Value,
    ctx: &TemplateContext,
    pass: Pass,
    context: &str,
) -> Result<Value> {
    resolve_at(value, ctx, pass, "spec")
        .map_err(|message| TrellisError::template(context, message))
}

/// Resolve a single string, e.g. a step command fragment.
pub fn resolve_str(input: &str, ctx: &TemplateContext, pass: Pass) -> std::result::Result<Value, String> {
    resolve_string(input, ctx, pass)
}

fn resolve_at(
    value: &Value,
    ctx: &TemplateContext,
    pass: Pass,
    at: &str,
) -> std::result::Result<Value, String> {
    match value {
        Value::String(s) => resolve_string(s, ctx, pass).map_err(|e| format!("{at}: {e}")),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| resolve_at(item, ctx, pass, &format!("{at}[{i}]")))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut out = Map::new();
            for (k, v) in map {
                out.insert(k.clone(), resolve_at(v, ctx, pass, &format!("{at}.{k}"))?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

fn resolve_string(input: &str, ctx: &TemplateContext, pass: Pass) -> std::result::Result<Value, String> {
    if !input.contains("${") {
        return Ok(Value::String(input.to_string()));
    }

    let segments = parse_template(input)?;

    // A lone expression keeps the JSON type of what it points at.
    if let [Segment::Expr(expr)] = segments.as_slice() {
        return match lookup(expr, ctx, pass)? {
            Lookup::Found(value) => Ok(value),
            Lookup::Missing => Ok(Value::Null),
            Lookup::Deferred => Ok(Value::String(expr.raw.clone())),
        };
    }

    let mut out = String::with_capacity(input.len());
    for segment in segments {
        match segment {
            Segment::Literal(text) => out.push_str(&text),
            Segment::Escape if pass.unescapes() => out.push_str("${"),
            Segment::Escape => out.push_str("$${"),
            Segment::Expr(expr) => match lookup(&expr, ctx, pass)? {
                Lookup::Found(value) => out.push_str(&render(&value)),
                Lookup::Missing => {}
                Lookup::Deferred => out.push_str(&expr.raw),
            },
        }
    }

    Ok(Value::String(out))
}

enum Lookup {
    Found(Value),
    /// Optional expression without a value.
    Missing,
    /// Not this pass's business.
    Deferred,
}

fn lookup(expr: &Expression, ctx: &TemplateContext, pass: Pass) -> std::result::Result<Lookup, String> {
    let scope = expr.scope();
    if scope == Scope::Unknown {
        if pass == Pass::Steps {
            return Ok(Lookup::Deferred);
        }
        return Err(format!(
            "unknown scope '{}' in '{}'",
            expr.path.first().map(|s| s.as_str()).unwrap_or_default(),
            expr.raw
        ));
    }
    if !pass.substitutes(scope) {
        return Ok(Lookup::Deferred);
    }

    match ctx.lookup(&expr.path) {
        Ok(value) => Ok(Lookup::Found(value.clone())),
        Err(_) if expr.optional => Ok(Lookup::Missing),
        Err(e) => Err(e),
    }
}

/// Interpolated rendering: strings verbatim, null as nothing, everything
/// else as compact JSON.
fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
