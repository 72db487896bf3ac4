#[cfg(test)]
mod tests;

mod member;

use std::collections::{BTreeMap, BTreeSet};

use miette::Diagnostic;
use sharr_config::{ConfigError, SolutionConfig};
use sharr_document::{
    Condition, ConditionExpr, ConditionName, Document, Mapping, Parameter, ParameterName,
    ParameterType, RawDocument, Resource,
};
use thiserror::Error;

pub use member::{
    ADMIN_ACCOUNT_PARAMETER, AUDIT_BUCKET, AUDIT_BUCKET_NAME_PARAMETER, AUDIT_BUCKET_POLICY,
    AUDIT_BUCKET_TOGGLE, KEY_ALIAS, KEY_ARN_PARAMETER, LOG_GROUP_PARAMETER, LOG_GROUP_SSM_PARAMETER,
    MemberStack, REMEDIATION_KEY, RUNBOOK_STACK, RUNBOOK_TEMPLATE, SEC_HUB_ADMIN_PARAMETER,
    SOLUTION_INFO_MAPPING, SOURCE_CODE_MAPPING, playbook_stack_id,
};

pub const YES: &str = "yes";
pub const NO: &str = "no";

#[allow(unused_assignments)]
#[derive(Debug, Error, Diagnostic)]
#[non_exhaustive]
pub enum CompositionError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Document(#[from] sharr_document::Error),

    #[error("unknown toggle `{name}`")]
    #[diagnostic(code(composer::unknown_toggle), help("Known toggles: {known}"))]
    UnknownToggle { name: String, known: String },

    #[error("invalid solution config: {0}")]
    #[diagnostic(code(composer::invalid_solution))]
    Solution(#[from] ConfigError),
}

/// A yes/no switch. Emits a parameter restricted to `yes`/`no` and a
/// condition that holds when the parameter is `yes`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Toggle {
    pub parameter: ParameterName,
    pub condition: ConditionName,
    pub default: bool,
    pub description: Option<String>,
}

impl Toggle {
    pub fn new(parameter: &str, default: bool) -> Result<Self, CompositionError> {
        Ok(Self {
            parameter: ParameterName::try_from(parameter)?,
            condition: ConditionName::new(Self::condition_name_for(parameter))?,
            default,
            description: None,
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// `LoadAFSBP` -> `loadAFSBPCond`.
    pub fn condition_name_for(parameter: &str) -> String {
        let mut chars = parameter.chars();
        let mut out = String::with_capacity(parameter.len() + 4);
        if let Some(first) = chars.next() {
            out.extend(first.to_lowercase());
        }
        out.extend(chars);
        out.push_str("Cond");
        out
    }

    fn to_parameter(&self, default: bool) -> Parameter {
        Parameter {
            name: self.parameter.clone(),
            kind: ParameterType::String,
            allowed_values: Some(BTreeSet::from([YES.to_string(), NO.to_string()])),
            default: Some(if default { YES } else { NO }.to_string()),
            description: self.description.clone(),
            allowed_pattern: None,
        }
    }

    fn to_condition(&self) -> Condition {
        Condition::new(
            self.condition.clone(),
            ConditionExpr::equals(self.parameter.clone(), YES),
        )
    }
}

/// Collects declarations for one document. Nothing is checked until
/// [`Composer::compose`], which fails on the first collision or dangling
/// reference.
#[derive(Clone, Debug, Default)]
pub struct Composer {
    description: Option<String>,
    toggles: Vec<Toggle>,
    parameters: Vec<Parameter>,
    conditions: Vec<Condition>,
    mappings: Vec<Mapping>,
    resources: Vec<Resource>,
}

impl Composer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn description(&mut self, description: impl Into<String>) -> &mut Self {
        self.description = Some(description.into());
        self
    }

    pub fn toggle(&mut self, toggle: Toggle) -> &mut Self {
        self.toggles.push(toggle);
        self
    }

    pub fn parameter(&mut self, parameter: Parameter) -> &mut Self {
        self.parameters.push(parameter);
        self
    }

    pub fn condition(&mut self, condition: Condition) -> &mut Self {
        self.conditions.push(condition);
        self
    }

    pub fn mapping(&mut self, mapping: Mapping) -> &mut Self {
        self.mappings.push(mapping);
        self
    }

    pub fn resource(&mut self, resource: Resource) -> &mut Self {
        self.resources.push(resource);
        self
    }

    /// Builds the document. `overrides` replaces the default of the named
    /// toggles (`true` -> `yes`).
    pub fn compose(
        &self,
        overrides: &BTreeMap<String, bool>,
    ) -> Result<Document, CompositionError> {
        for name in overrides.keys() {
            if !self.toggles.iter().any(|t| t.parameter.as_str() == name) {
                let known = self
                    .toggles
                    .iter()
                    .map(|t| t.parameter.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(CompositionError::UnknownToggle {
                    name: name.clone(),
                    known,
                });
            }
        }

        let mut raw = RawDocument {
            description: self.description.clone(),
            ..RawDocument::default()
        };
        for toggle in &self.toggles {
            let default = overrides
                .get(toggle.parameter.as_str())
                .copied()
                .unwrap_or(toggle.default);
            tracing::debug!(
                toggle = toggle.parameter.as_str(),
                condition = toggle.condition.as_str(),
                default,
                "emitting toggle"
            );
            raw.parameters.push(toggle.to_parameter(default));
            raw.conditions.push(toggle.to_condition());
        }
        raw.parameters.extend(self.parameters.iter().cloned());
        raw.conditions.extend(self.conditions.iter().cloned());
        raw.mappings.extend(self.mappings.iter().cloned());
        for resource in &self.resources {
            tracing::debug!(
                logical_id = resource.logical_id.as_str(),
                resource_type = resource.resource_type.as_str(),
                condition = resource.condition.as_ref().map(ConditionName::as_str),
                "emitting resource"
            );
            raw.resources.push(resource.clone());
        }

        let doc = raw.validate()?;
        tracing::info!(
            parameters = doc.parameters().len(),
            conditions = doc.conditions().len(),
            mappings = doc.mappings().len(),
            resources = doc.resources().len(),
            "composed document"
        );
        Ok(doc)
    }
}

/// Composes the member stack for `solution`. `toggles` overrides toggle
/// defaults by parameter name; `base_parameters` are declared alongside the
/// built-in ones and must not collide with them.
pub fn compose(
    solution: &SolutionConfig,
    toggles: &BTreeMap<String, bool>,
    base_parameters: &[Parameter],
) -> Result<Document, CompositionError> {
    MemberStack::new(solution.clone()).compose(toggles, base_parameters)
}
