mod diagnostics;
mod env;
mod error;
mod solution;

use std::{collections::BTreeMap, path::Path, sync::Arc};

pub use diagnostics::json5_error_span;

pub use env::{
    PARAM_ENV_PREFIX, SOLUTION_ENV_PREFIX, apply_env_overrides, env_var_for_field,
    env_var_to_field, parameter_values_from_env,
};
pub use error::{ConfigError, Result};
pub use solution::{
    DEFAULT_DISTRIBUTION_BUCKET, DEFAULT_NAMESPACE, DEFAULT_SOLUTION_ID, DEFAULT_VERSION,
    Playbook, REFERENCE_HOST_SUFFIX, SolutionConfig, default_playbooks,
};

/// Parses a JSON5 solution config. Missing fields take their defaults.
pub fn parse_solution_config(source: &str) -> Result<SolutionConfig> {
    parse_solution_config_named("<solution config>", Arc::from(source))
}

/// Like [`parse_solution_config`]; errors point into `source` under `name`.
pub fn parse_solution_config_named(
    name: impl AsRef<str>,
    source: Arc<str>,
) -> Result<SolutionConfig> {
    json5::from_str(&source).map_err(|e| ConfigError::json5(name, Arc::clone(&source), &e))
}

/// Builds the effective config: the file (or defaults), then `SHARR_SOLUTION_*`
/// overrides from `env`, then validation.
pub fn load_solution_config(
    path: Option<&Path>,
    env: &BTreeMap<String, String>,
) -> Result<SolutionConfig> {
    let mut config = match path {
        Some(path) => {
            let source = std::fs::read_to_string(path).map_err(|e| {
                ConfigError::io(format!("failed to read {}: {e}", path.display()))
            })?;
            parse_solution_config_named(path.display().to_string(), Arc::from(source))?
        }
        None => SolutionConfig::default(),
    };
    apply_env_overrides(&mut config, env)?;
    config.validate()?;
    Ok(config)
}
