use std::collections::BTreeMap;

use crate::{ConfigError, Result, SolutionConfig};

pub const SOLUTION_ENV_PREFIX: &str = "SHARR_SOLUTION_";
pub const PARAM_ENV_PREFIX: &str = "SHARR_PARAM_";

const SOLUTION_FIELDS: &[&str] = &[
    "solution_id",
    "namespace",
    "version",
    "distribution_bucket",
    "description",
];

pub fn env_var_for_field(field: &str) -> Result<String> {
    if !SOLUTION_FIELDS.contains(&field) {
        return Err(ConfigError::env(format!(
            "{field:?} cannot be set from the environment (settable: {})",
            SOLUTION_FIELDS.join(", ")
        )));
    }
    Ok(format!(
        "{}{}",
        SOLUTION_ENV_PREFIX,
        field.to_ascii_uppercase()
    ))
}

pub fn env_var_to_field(var: &str) -> Result<String> {
    let rest = var
        .strip_prefix(SOLUTION_ENV_PREFIX)
        .ok_or_else(|| {
            ConfigError::env(format!("{var} is not a {SOLUTION_ENV_PREFIX}* variable"))
        })?;
    if rest.is_empty() {
        return Err(ConfigError::env(format!(
            "invalid env var {var:?}: missing field suffix"
        )));
    }
    let field = rest.to_ascii_lowercase();
    if !SOLUTION_FIELDS.contains(&field.as_str()) {
        return Err(ConfigError::env(format!(
            "{var} does not correspond to a solution field"
        )));
    }
    Ok(field)
}

/// Applies `SHARR_SOLUTION_*` overrides. Variables with other prefixes are
/// ignored; empty values leave the field untouched.
pub fn apply_env_overrides(
    config: &mut SolutionConfig,
    env: &BTreeMap<String, String>,
) -> Result<()> {
    for (var, value) in env {
        if !var.starts_with(SOLUTION_ENV_PREFIX) || value.is_empty() {
            continue;
        }
        let field = env_var_to_field(var)?;
        let slot = match field.as_str() {
            "solution_id" => &mut config.solution_id,
            "namespace" => &mut config.namespace,
            "version" => &mut config.version,
            "distribution_bucket" => &mut config.distribution_bucket,
            "description" => {
                config.description = Some(value.clone());
                continue;
            }
            other => {
                return Err(ConfigError::env(format!("unknown solution field {other:?}")));
            }
        };
        *slot = value.clone();
    }
    Ok(())
}

/// Deployment-time parameter values from `SHARR_PARAM_<ParameterName>`
/// variables. The suffix is the parameter name verbatim.
pub fn parameter_values_from_env(env: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    env.iter()
        .filter_map(|(var, value)| {
            let name = var.strip_prefix(PARAM_ENV_PREFIX)?;
            (!name.is_empty() && !value.is_empty()).then(|| (name.to_string(), value.clone()))
        })
        .collect()
}
