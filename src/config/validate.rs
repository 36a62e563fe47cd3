use crate::config::model::{DependencyConfig, ProjectConfig, RawProjectConfig};
use crate::errors::{Result, TrellisError};
use crate::types::{ActionKey, ActionKind};

impl TryFrom<RawProjectConfig> for ProjectConfig {
    type Error = TrellisError;

    fn try_from(raw: RawProjectConfig) -> std::result::Result<Self, Self::Error> {
        validate_config(&raw)?;
        Ok(ProjectConfig::new_unchecked(raw))
    }
}

/// Syntactic validation of a raw project config.
pub fn validate_config(cfg: &RawProjectConfig) -> Result<()> {
    validate_project_section(cfg)?;
    validate_actions(cfg)?;
    Ok(())
}

fn validate_project_section(cfg: &RawProjectConfig) -> Result<()> {
    if cfg.project.concurrency == 0 {
        return Err(TrellisError::Configuration(
            "[project].concurrency must be >= 1 (got 0)".to_string(),
        ));
    }

    if let Some(env) = &cfg.project.default_environment {
        if !cfg.environments.is_empty() && !cfg.environments.contains_key(env) {
            return Err(TrellisError::Configuration(format!(
                "[project].default_environment '{}' is not declared in [environments]",
                env
            )));
        }
    }

    Ok(())
}

fn validate_actions(cfg: &RawProjectConfig) -> Result<()> {
    for action in cfg.actions.iter() {
        let key = format!("{}.{}", action.kind, action.name);

        if !is_valid_name(&action.name) {
            return Err(TrellisError::Configuration(format!(
                "invalid action name '{}' (use letters, digits, '-' and '_')",
                action.name
            )));
        }

        if action.type_name.trim().is_empty() {
            return Err(TrellisError::Configuration(format!(
                "action '{}' must declare a non-empty `type`",
                key
            )));
        }

        if !action.spec.is_object() {
            return Err(TrellisError::Configuration(format!(
                "action '{}' has a `spec` that is not a table",
                key
            )));
        }

        for dep in action.dependencies.iter() {
            validate_dependency(&key, dep)?;
        }

        if !action.copy_from.is_empty() && action.kind != ActionKind::Build {
            return Err(TrellisError::Configuration(format!(
                "action '{}' uses `copy_from`, which is only allowed on Build actions",
                key
            )));
        }

        for copy in action.copy_from.iter() {
            if !is_valid_name(&copy.build) {
                return Err(TrellisError::Configuration(format!(
                    "action '{}' has invalid `copy_from` build name '{}'",
                    key, copy.build
                )));
            }
        }
    }

    Ok(())
}

fn validate_dependency(owner: &str, dep: &DependencyConfig) -> Result<()> {
    let target = dep.target();
    let parsed: ActionKey = target.parse().map_err(|e: String| {
        TrellisError::Configuration(format!("action '{}' has an invalid dependency: {}", owner, e))
    })?;

    if parsed.to_string() == owner {
        return Err(TrellisError::Configuration(format!(
            "action '{}' cannot depend on itself",
            owner
        )));
    }

    Ok(())
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> RawProjectConfig {
        toml::from_str(toml_src).unwrap()
    }

    #[test]
    fn accepts_minimal_config() {
        let raw = parse(
            r#"
[[action]]
kind = "Build"
name = "web"
type = "exec"
"#,
        );
        let cfg = ProjectConfig::try_from(raw).unwrap();
        assert_eq!(cfg.actions().len(), 1);
        assert_eq!(cfg.default_environment(), "default");
    }

    #[test]
    fn rejects_zero_concurrency() {
        let raw = parse(
            r#"
[project]
concurrency = 0
"#,
        );
        let err = ProjectConfig::try_from(raw).unwrap_err();
        assert!(err.to_string().contains("concurrency"));
    }

    #[test]
    fn rejects_malformed_dependency_reference() {
        let raw = parse(
            r#"
[[action]]
kind = "Deploy"
name = "api"
type = "exec"
dependencies = ["api"]
"#,
        );
        match ProjectConfig::try_from(raw) {
            Err(TrellisError::Configuration(msg)) => assert!(msg.contains("invalid dependency")),
            other => panic!("expected configuration error, got {other:?}"),
        }
    }

    #[test]
    fn rejects_copy_from_outside_builds() {
        let raw = parse(
            r#"
[[action]]
kind = "Deploy"
name = "api"
type = "exec"
copy_from = [{ build = "base" }]
"#,
        );
        assert!(ProjectConfig::try_from(raw).is_err());
    }

    #[test]
    fn rejects_undeclared_default_environment() {
        let raw = parse(
            r#"
[project]
default_environment = "prod"

[environments.local]
variables = { replicas = 1 }
"#,
        );
        assert!(ProjectConfig::try_from(raw).is_err());
    }
}
