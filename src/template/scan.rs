// src/template/scan.rs

use std::collections::HashMap;

use serde_json::Value;

use crate::template::parse::{ActionReference, Expression, Scope, Segment, parse_template};

/// Every expression in `value`, in document order.
pub fn collect_expressions(value: &Value) -> Result<Vec<Expression>, String> {
    let mut out = Vec::new();
    collect_into(value, &mut out)?;
    Ok(out)
}

fn collect_into(value: &Value, out: &mut Vec<Expression>) -> Result<(), String> {
    match value {
        Value::String(s) if s.contains("${") => {
            for segment in parse_template(s)? {
                if let Segment::Expr(expr) = segment {
                    out.push(expr);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_into(item, out)?;
            }
        }
        Value::Object(map) => {
            for item in map.values() {
                collect_into(item, out)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// References to other actions, merged per action key. A key referenced
/// both optionally and non-optionally counts as non-optional, and any
/// reference needing executed outputs wins.
pub fn scan_action_references(value: &Value) -> Result<Vec<ActionReference>, String> {
    let mut merged: Vec<ActionReference> = Vec::new();

    for expr in collect_expressions(value)? {
        let Some(reference) = expr.action_reference() else {
            continue;
        };
        let reference = reference?;
        match merged.iter_mut().find(|r| r.key == reference.key) {
            Some(existing) => {
                existing.optional &= reference.optional;
                if reference.needs_executed_outputs() && !existing.needs_executed_outputs() {
                    existing.field = reference.field;
                    existing.raw = reference.raw;
                }
            }
            None => merged.push(reference),
        }
    }

    Ok(merged)
}

/// Check `steps.<name>` references inside a workflow-style `steps` array:
/// a step may only read outputs of steps declared before it.
pub fn check_step_references(spec: &Value) -> Result<(), String> {
    let Some(steps) = spec.get("steps").and_then(|s| s.as_array()) else {
        return Ok(());
    };

    let names: Vec<String> = steps
        .iter()
        .enumerate()
        .map(|(i, step)| step_name(step, i))
        .collect();
    let index: HashMap<&str, usize> = names
        .iter()
        .enumerate()
        .map(|(i, n)| (n.as_str(), i))
        .collect();

    for (i, step) in steps.iter().enumerate() {
        for expr in collect_expressions(step)? {
            if expr.scope() != Scope::Steps {
                continue;
            }
            let Some(target) = expr.path.get(1) else {
                return Err(format!("'{}' must name a step", expr.raw));
            };
            match index.get(target.as_str()) {
                None => {
                    return Err(format!(
                        "step '{}' references unknown step '{}' in '{}'",
                        names[i], target, expr.raw
                    ));
                }
                Some(&j) if j == i => {
                    return Err(format!(
                        "step '{}' references itself in '{}'",
                        names[i], expr.raw
                    ));
                }
                Some(&j) if j > i => {
                    return Err(format!(
                        "step '{}' has an out-of-order reference to later step '{}' in '{}'",
                        names[i], target, expr.raw
                    ));
                }
                Some(_) => {}
            }
        }
    }

    Ok(())
}

/// A step's `name`, or `step-<n>` (1-based) when it has none.
pub fn step_name(step: &Value, index: usize) -> String {
    step.get("name")
        .and_then(|n| n.as_str())
        .map(String::from)
        .unwrap_or_else(|| format!("step-{}", index + 1))
}
