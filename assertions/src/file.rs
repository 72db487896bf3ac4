use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use miette::{Diagnostic, NamedSource, SourceSpan};
use serde::Deserialize;
use serde_json::Value as Json;
use serde_with::{MapPreventDuplicates, serde_as};
use sharr_config::json5_error_span;
use sharr_document::{ConditionExpr, ParameterType, RetentionPolicy};
use sharr_template::Value;
use thiserror::Error;

use crate::{Assertion, ExpectMapping, ExpectParameter, ExpectResource, Guard};

#[allow(unused_assignments)]
#[derive(Debug, Error, Diagnostic)]
#[non_exhaustive]
pub enum AssertionFileError {
    #[error("invalid assertion file: {message}")]
    #[diagnostic(
        code(assertion::invalid_file),
        help("Sections are `parameters`, `conditions`, `mappings` and `resources`.")
    )]
    Parse {
        message: String,
        #[source_code]
        src: NamedSource<Arc<str>>,
        #[label("{message}")]
        span: SourceSpan,
    },

    #[error("invalid expression for condition `{name}`: {message}")]
    #[diagnostic(
        code(assertion::invalid_condition),
        help("Leaves are `{{ \"Fn::Equals\": [{{ Ref: \"Param\" }}, \"literal\"] }}`.")
    )]
    InvalidCondition { name: String, message: String },

    #[error("invalid guard for resource `{name}`")]
    #[diagnostic(code(assertion::invalid_guard))]
    InvalidGuard {
        name: String,
        #[source]
        #[diagnostic_source]
        source: sharr_document::Error,
    },
}

#[serde_as]
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct AssertionFile {
    #[serde_as(as = "MapPreventDuplicates<_, _>")]
    parameters: BTreeMap<String, ParameterEntry>,
    #[serde_as(as = "MapPreventDuplicates<_, _>")]
    conditions: BTreeMap<String, Json>,
    #[serde_as(as = "MapPreventDuplicates<_, _>")]
    mappings: BTreeMap<String, BTreeMap<String, BTreeMap<String, Value>>>,
    #[serde_as(as = "MapPreventDuplicates<_, _>")]
    resources: BTreeMap<String, ResourceEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ParameterEntry {
    #[serde(default, rename = "type")]
    kind: Option<ParameterType>,
    #[serde(default)]
    allowed_values: Option<BTreeSet<String>>,
    #[serde(default)]
    default: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ResourceEntry {
    #[serde(default, rename = "type")]
    resource_type: Option<String>,
    /// Absent: any guard. `null`: no guard.
    #[serde(default, with = "::serde_with::rust::double_option")]
    condition: Option<Option<String>>,
    #[serde(default)]
    deletion_policy: Option<RetentionPolicy>,
    #[serde(default)]
    update_replace_policy: Option<RetentionPolicy>,
    #[serde(default)]
    properties: BTreeMap<String, Value>,
}

/// Reads a JSON5 assertion file. Assertions come out grouped by section
/// (parameters, conditions, mappings, resources), each section in name order.
pub fn parse_assertions(source: &str) -> Result<Vec<Assertion>, AssertionFileError> {
    parse_assertions_named("<assertions>", Arc::from(source))
}

/// Like [`parse_assertions`]; syntax errors point into `source` under `name`.
pub fn parse_assertions_named(
    name: impl AsRef<str>,
    source: Arc<str>,
) -> Result<Vec<Assertion>, AssertionFileError> {
    let file: AssertionFile = json5::from_str(&source).map_err(|e| {
        let (message, span) = json5_error_span(&source, &e);
        AssertionFileError::Parse {
            message,
            src: NamedSource::new(name, Arc::clone(&source)).with_language("json5"),
            span,
        }
    })?;

    let mut assertions = Vec::new();
    for (name, entry) in file.parameters {
        assertions.push(Assertion::Parameter {
            name,
            expect: ExpectParameter {
                kind: entry.kind,
                allowed_values: entry.allowed_values,
                default: entry.default,
            },
        });
    }
    for (name, raw) in file.conditions {
        let expr = ConditionExpr::from_json(&raw).map_err(|message| {
            AssertionFileError::InvalidCondition {
                name: name.clone(),
                message,
            }
        })?;
        assertions.push(Assertion::Condition { name, expr });
    }
    for (name, entries) in file.mappings {
        assertions.push(Assertion::Mapping {
            name,
            expect: ExpectMapping { entries },
        });
    }
    for (name, entry) in file.resources {
        let guard = match entry.condition {
            None => Guard::Any,
            Some(None) => Guard::Unconditional,
            Some(Some(condition)) => {
                Guard::when(&condition).map_err(|source| AssertionFileError::InvalidGuard {
                    name: name.clone(),
                    source,
                })?
            }
        };
        assertions.push(Assertion::Resource {
            name,
            expect: ExpectResource {
                resource_type: entry.resource_type,
                guard,
                deletion_policy: entry.deletion_policy,
                update_replace_policy: entry.update_replace_policy,
                properties: entry.properties,
            },
        });
    }
    Ok(assertions)
}
