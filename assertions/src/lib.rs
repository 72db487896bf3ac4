#![allow(unused_assignments)]

mod file;
mod matcher;
mod template;
#[cfg(test)]
mod tests;

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use miette::Diagnostic;
use sharr_document::{ConditionExpr, ConditionName, Document, ParameterType, RetentionPolicy};
use sharr_template::Value;
use thiserror::Error;

pub use file::{AssertionFileError, parse_assertions, parse_assertions_named};
pub use template::Template;

use crate::matcher::Mismatch;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TargetKind {
    Parameter,
    Condition,
    Mapping,
    Resource,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Parameter => "parameter",
            Self::Condition => "condition",
            Self::Mapping => "mapping",
            Self::Resource => "resource",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FailureReason {
    NotFound,
    /// Parameter type or resource type differs.
    TypeMismatch,
    /// Same kind of value, different content.
    ValueMismatch,
    ConditionMismatch,
    PropertyMissing,
    /// A property holds a different kind of value, e.g. a literal where a
    /// `Ref` was expected.
    PropertyMismatch,
}

impl FailureReason {
    pub fn code(self) -> &'static str {
        match self {
            Self::NotFound => "assertion::not_found",
            Self::TypeMismatch => "assertion::type_mismatch",
            Self::ValueMismatch => "assertion::value_mismatch",
            Self::ConditionMismatch => "assertion::condition_mismatch",
            Self::PropertyMissing => "assertion::property_missing",
            Self::PropertyMismatch => "assertion::property_mismatch",
        }
    }
}

/// One failed assertion.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{target_kind} `{target_name}`: {detail}")]
pub struct AssertionFailure {
    pub target_kind: TargetKind,
    pub target_name: String,
    pub reason: FailureReason,
    pub detail: String,
}

impl AssertionFailure {
    pub fn new(
        target_kind: TargetKind,
        target_name: impl Into<String>,
        reason: FailureReason,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            target_kind,
            target_name: target_name.into(),
            reason,
            detail: detail.into(),
        }
    }
}

impl Diagnostic for AssertionFailure {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(self.reason.code()))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        let help = match self.reason {
            FailureReason::NotFound => "check the logical name and the composed toggles",
            FailureReason::PropertyMismatch => {
                "an intrinsic and a literal never match; expect the same kind of value"
            }
            _ => return None,
        };
        Some(Box::new(help))
    }
}

/// Which guard a resource must carry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Guard {
    #[default]
    Any,
    Unconditional,
    When(ConditionName),
}

impl Guard {
    pub fn when(condition: &str) -> Result<Self, sharr_document::Error> {
        Ok(Self::When(ConditionName::try_from(condition)?))
    }
}

/// Unset fields are not checked; set fields must match exactly.
#[derive(Clone, Debug, Default, PartialEq, Eq, bon::Builder)]
pub struct ExpectParameter {
    pub kind: Option<ParameterType>,
    pub allowed_values: Option<BTreeSet<String>>,
    #[builder(into)]
    pub default: Option<String>,
}

/// Top-level properties match partially: properties not listed here are
/// ignored. Each listed property must match exactly.
#[derive(Clone, Debug, Default, PartialEq, bon::Builder)]
pub struct ExpectResource {
    #[builder(into)]
    pub resource_type: Option<String>,
    #[builder(default)]
    pub guard: Guard,
    pub deletion_policy: Option<RetentionPolicy>,
    pub update_replace_policy: Option<RetentionPolicy>,
    #[builder(default)]
    pub properties: BTreeMap<String, Value>,
}

/// Listed entries must exist with equal values; other entries are ignored.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExpectMapping {
    pub entries: BTreeMap<String, BTreeMap<String, Value>>,
}

impl ExpectMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(
        mut self,
        top_key: impl Into<String>,
        second_key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.entries
            .entry(top_key.into())
            .or_default()
            .insert(second_key.into(), value.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Assertion {
    Parameter {
        name: String,
        expect: ExpectParameter,
    },
    Condition {
        name: String,
        expr: ConditionExpr,
    },
    Mapping {
        name: String,
        expect: ExpectMapping,
    },
    Resource {
        name: String,
        expect: ExpectResource,
    },
}

impl Assertion {
    pub fn target_kind(&self) -> TargetKind {
        match self {
            Self::Parameter { .. } => TargetKind::Parameter,
            Self::Condition { .. } => TargetKind::Condition,
            Self::Mapping { .. } => TargetKind::Mapping,
            Self::Resource { .. } => TargetKind::Resource,
        }
    }

    pub fn target_name(&self) -> &str {
        match self {
            Self::Parameter { name, .. }
            | Self::Condition { name, .. }
            | Self::Mapping { name, .. }
            | Self::Resource { name, .. } => name,
        }
    }
}

/// Checks one assertion. Never mutates `doc`.
pub fn check(doc: &Document, assertion: &Assertion) -> Result<(), AssertionFailure> {
    let kind = assertion.target_kind();
    let name = assertion.target_name();
    tracing::debug!(%kind, assertion = name, "checking assertion");

    let outcome = match assertion {
        Assertion::Parameter { name, expect } => check_parameter(doc, name, expect),
        Assertion::Condition { name, expr } => check_condition(doc, name, expr),
        Assertion::Mapping { name, expect } => check_mapping(doc, name, expect),
        Assertion::Resource { name, expect } => check_resource(doc, name, expect),
    };

    outcome.map_err(|mismatch| {
        let failure = AssertionFailure::new(kind, name, mismatch.reason, mismatch.detail);
        tracing::warn!(
            %kind,
            assertion = name,
            code = failure.reason.code(),
            "{}",
            failure.detail
        );
        failure
    })
}

/// Outcome of a batch of assertions.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AssertionReport {
    pub checked: usize,
    pub failures: Vec<AssertionFailure>,
}

impl AssertionReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn passed(&self) -> usize {
        self.checked - self.failures.len()
    }
}

/// Checks every assertion; a failure never stops the ones after it.
pub fn check_all<'a>(
    doc: &Document,
    assertions: impl IntoIterator<Item = &'a Assertion>,
) -> AssertionReport {
    let mut report = AssertionReport::default();
    for assertion in assertions {
        report.checked += 1;
        if let Err(failure) = check(doc, assertion) {
            report.failures.push(failure);
        }
    }
    report
}

fn not_found(kind: TargetKind) -> Mismatch {
    Mismatch::new(
        FailureReason::NotFound,
        format!("no {kind} with this name is declared"),
    )
}

fn check_parameter(doc: &Document, name: &str, expect: &ExpectParameter) -> Result<(), Mismatch> {
    let parameter = doc
        .parameter(name)
        .ok_or_else(|| not_found(TargetKind::Parameter))?;

    if let Some(kind) = &expect.kind
        && *kind != parameter.kind
    {
        return Err(Mismatch::new(
            FailureReason::TypeMismatch,
            format!("expected type `{kind}`, found `{}`", parameter.kind),
        ));
    }
    if let Some(allowed) = &expect.allowed_values
        && parameter.allowed_values.as_ref() != Some(allowed)
    {
        return Err(Mismatch::new(
            FailureReason::ValueMismatch,
            format!(
                "expected allowed values {}, found {}",
                format_set(Some(allowed)),
                format_set(parameter.allowed_values.as_ref())
            ),
        ));
    }
    if let Some(default) = &expect.default
        && parameter.default.as_ref() != Some(default)
    {
        return Err(Mismatch::new(
            FailureReason::ValueMismatch,
            format!(
                "expected default `{default}`, found {}",
                parameter
                    .default
                    .as_ref()
                    .map_or_else(|| "none".to_string(), |d| format!("`{d}`"))
            ),
        ));
    }
    Ok(())
}

fn format_set(values: Option<&BTreeSet<String>>) -> String {
    match values {
        Some(values) => format!(
            "[{}]",
            values
                .iter()
                .map(|v| format!("`{v}`"))
                .collect::<Vec<_>>()
                .join(", ")
        ),
        None => "none".to_string(),
    }
}

fn check_condition(doc: &Document, name: &str, expr: &ConditionExpr) -> Result<(), Mismatch> {
    let condition = doc
        .condition(name)
        .ok_or_else(|| not_found(TargetKind::Condition))?;
    if condition.expr != *expr {
        return Err(Mismatch::new(
            FailureReason::ConditionMismatch,
            format!(
                "expected expression {}, found {}",
                expr.to_json(),
                condition.expr.to_json()
            ),
        ));
    }
    Ok(())
}

fn check_mapping(doc: &Document, name: &str, expect: &ExpectMapping) -> Result<(), Mismatch> {
    let mapping = doc
        .mapping(name)
        .ok_or_else(|| not_found(TargetKind::Mapping))?;
    for (top_key, entries) in &expect.entries {
        for (second_key, want) in entries {
            let path = format!("{top_key}.{second_key}");
            let got = mapping.get(top_key, second_key).ok_or_else(|| {
                Mismatch::new(
                    FailureReason::PropertyMissing,
                    format!("entry `{path}` is absent"),
                )
            })?;
            matcher::match_exact(&path, want, got)?;
        }
    }
    Ok(())
}

fn check_resource(doc: &Document, name: &str, expect: &ExpectResource) -> Result<(), Mismatch> {
    let resource = doc
        .resource(name)
        .ok_or_else(|| not_found(TargetKind::Resource))?;

    if let Some(resource_type) = &expect.resource_type
        && *resource_type != resource.resource_type
    {
        return Err(Mismatch::new(
            FailureReason::TypeMismatch,
            format!(
                "expected type `{resource_type}`, found `{}`",
                resource.resource_type
            ),
        ));
    }

    let actual = resource.condition.as_ref();
    let guard_matches = match &expect.guard {
        Guard::Any => true,
        Guard::Unconditional => actual.is_none(),
        Guard::When(condition) => actual == Some(condition),
    };
    if !guard_matches {
        let describe = |c: Option<&ConditionName>| {
            c.map_or_else(|| "no condition".to_string(), |c| format!("condition `{c}`"))
        };
        let expected = match &expect.guard {
            Guard::When(condition) => describe(Some(condition)),
            _ => describe(None),
        };
        return Err(Mismatch::new(
            FailureReason::ConditionMismatch,
            format!("expected {expected}, found {}", describe(actual)),
        ));
    }

    for (label, want, got) in [
        (
            "DeletionPolicy",
            expect.deletion_policy,
            resource.deletion_policy,
        ),
        (
            "UpdateReplacePolicy",
            expect.update_replace_policy,
            resource.update_replace_policy,
        ),
    ] {
        if let Some(want) = want
            && got != Some(want)
        {
            return Err(Mismatch::new(
                FailureReason::ValueMismatch,
                format!(
                    "expected {label} `{want}`, found {}",
                    got.map_or_else(|| "none".to_string(), |p| format!("`{p}`"))
                ),
            ));
        }
    }

    matcher::match_properties(&expect.properties, &resource.properties)
}
