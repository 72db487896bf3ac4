#![allow(unused_assignments)]

mod binding;
mod condition;
mod error;
mod json;
mod names;
mod parameter;
mod resource;

use std::collections::{BTreeMap, BTreeSet};

use bon::bon;
pub use binding::Bindings;
pub use condition::{AND, Condition, ConditionExpr, EQUALS, NOT, OR};
pub use error::{Error, EvalError};
pub use names::{ConditionName, LogicalId, MappingName, ParameterName};
pub use parameter::{Parameter, ParameterType};
pub use resource::{Mapping, Resource, RetentionPolicy};
use sharr_template::{Reference, Value};

pub const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";

/// Pseudo parameters the deployment engine supplies; `Ref` may name them
/// without a declaration.
pub const PSEUDO_PARAMETERS: &[&str] = &[
    "AWS::AccountId",
    "AWS::NoValue",
    "AWS::NotificationARNs",
    "AWS::Partition",
    "AWS::Region",
    "AWS::StackId",
    "AWS::StackName",
    "AWS::URLSuffix",
];

pub fn is_pseudo_parameter(name: &str) -> bool {
    PSEUDO_PARAMETERS.contains(&name)
}

/// Unvalidated document contents in declaration order. [`RawDocument::validate`]
/// turns it into a [`Document`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawDocument {
    pub description: Option<String>,
    pub parameters: Vec<Parameter>,
    pub conditions: Vec<Condition>,
    pub mappings: Vec<Mapping>,
    pub resources: Vec<Resource>,
}

/// A validated template document: names are unique and every reference
/// resolves. Immutable once built.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    description: Option<String>,
    parameters: BTreeMap<ParameterName, Parameter>,
    conditions: BTreeMap<ConditionName, Condition>,
    mappings: BTreeMap<MappingName, Mapping>,
    resources: BTreeMap<LogicalId, Resource>,
}

impl RawDocument {
    pub fn validate(self) -> Result<Document, Error> {
        let parameters = unique(self.parameters, |p| p.name.clone(), |name| {
            Error::DuplicateParameter { name }
        })?;
        let conditions = unique(self.conditions, |c| c.name.clone(), |name| {
            Error::DuplicateCondition { name }
        })?;
        let mappings = unique(self.mappings, |m| m.name.clone(), |name| {
            Error::DuplicateMapping { name }
        })?;
        let resources = unique(self.resources, |r| r.logical_id.clone(), |name| {
            Error::DuplicateResource { name }
        })?;

        let doc = Document {
            description: self.description,
            parameters,
            conditions,
            mappings,
            resources,
        };
        doc.validate_parameters()?;
        doc.validate_conditions()?;
        doc.validate_mappings()?;
        doc.validate_resources()?;
        Ok(doc)
    }
}

fn unique<K: Ord + ToString, T>(
    items: Vec<T>,
    key: impl Fn(&T) -> K,
    duplicate: impl Fn(String) -> Error,
) -> Result<BTreeMap<K, T>, Error> {
    let mut out = BTreeMap::new();
    for item in items {
        let k = key(&item);
        if out.contains_key(&k) {
            return Err(duplicate(k.to_string()));
        }
        out.insert(k, item);
    }
    Ok(out)
}

impl Document {
    pub fn empty() -> Self {
        RawDocument::default()
            .validate()
            .expect("empty document is valid")
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn parameters(&self) -> &BTreeMap<ParameterName, Parameter> {
        &self.parameters
    }

    pub fn conditions(&self) -> &BTreeMap<ConditionName, Condition> {
        &self.conditions
    }

    pub fn mappings(&self) -> &BTreeMap<MappingName, Mapping> {
        &self.mappings
    }

    pub fn resources(&self) -> &BTreeMap<LogicalId, Resource> {
        &self.resources
    }

    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.get(name)
    }

    pub fn condition(&self, name: &str) -> Option<&Condition> {
        self.conditions.get(name)
    }

    pub fn mapping(&self, name: &str) -> Option<&Mapping> {
        self.mappings.get(name)
    }

    pub fn resource(&self, logical_id: &str) -> Option<&Resource> {
        self.resources.get(logical_id)
    }

    pub fn resources_of_type<'a>(
        &'a self,
        resource_type: &str,
    ) -> impl Iterator<Item = &'a Resource> {
        self.resources
            .values()
            .filter(move |r| r.resource_type == resource_type)
    }

    fn validate_parameters(&self) -> Result<(), Error> {
        for parameter in self.parameters.values() {
            if self.resources.contains_key(parameter.name.as_str()) {
                return Err(Error::NameConflict {
                    name: parameter.name.to_string(),
                });
            }
            if let Some(default) = &parameter.default
                && !parameter.allows(default)
            {
                return Err(Error::InvalidDefault {
                    parameter: parameter.name.to_string(),
                    value: default.clone(),
                });
            }
        }
        Ok(())
    }

    fn validate_conditions(&self) -> Result<(), Error> {
        for condition in self.conditions.values() {
            let mut missing = None;
            condition.expr.visit_parameters(&mut |parameter| {
                if missing.is_none() && !self.parameters.contains_key(parameter) {
                    missing = Some(parameter.clone());
                }
            });
            if let Some(parameter) = missing {
                return Err(Error::UnknownConditionParameter {
                    condition: condition.name.to_string(),
                    parameter: parameter.to_string(),
                });
            }
        }
        Ok(())
    }

    fn validate_mappings(&self) -> Result<(), Error> {
        for mapping in self.mappings.values() {
            for entries in mapping.entries.values() {
                for value in entries.values() {
                    self.validate_value(mapping.name.as_str(), value)?;
                }
            }
        }
        Ok(())
    }

    fn validate_resources(&self) -> Result<(), Error> {
        for resource in self.resources.values() {
            let owner = resource.logical_id.as_str();
            if let Some(condition) = &resource.condition
                && !self.conditions.contains_key(condition)
            {
                return Err(Error::UnknownGuard {
                    resource: owner.to_string(),
                    condition: condition.to_string(),
                });
            }
            for target in &resource.depends_on {
                if !self.resources.contains_key(target) {
                    return Err(Error::UnknownDependency {
                        resource: owner.to_string(),
                        target: target.to_string(),
                    });
                }
            }
            for value in resource.properties.values() {
                self.validate_value(owner, value)?;
            }
        }
        Ok(())
    }

    fn validate_value(&self, owner: &str, value: &Value) -> Result<(), Error> {
        let mut first_error = None;
        value.visit_references(&mut |reference| {
            if first_error.is_none() {
                first_error = self.check_reference(owner, reference, value).err();
            }
        });
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn check_reference(
        &self,
        owner: &str,
        reference: Reference<'_>,
        root: &Value,
    ) -> Result<(), Error> {
        match reference {
            Reference::Name(target) => {
                if self.parameters.contains_key(target)
                    || self.resources.contains_key(target)
                    || is_pseudo_parameter(target)
                {
                    return Ok(());
                }
                Err(Error::UnknownReference {
                    owner: owner.to_string(),
                    target: target.to_string(),
                })
            }
            Reference::Attribute(target) => {
                if self.resources.contains_key(target) {
                    return Ok(());
                }
                Err(Error::UnknownAttributeTarget {
                    owner: owner.to_string(),
                    target: target.to_string(),
                })
            }
            Reference::Mapping(map) => self.check_mapping_lookups(owner, map, root),
            Reference::Condition(condition) => {
                if self.conditions.contains_key(condition) {
                    return Ok(());
                }
                Err(Error::UnknownCondition {
                    owner: owner.to_string(),
                    condition: condition.to_string(),
                })
            }
        }
    }

    /// `Fn::FindInMap` keys are literals here, so every lookup against `map`
    /// inside `root` can be checked up front.
    fn check_mapping_lookups(&self, owner: &str, map: &str, root: &Value) -> Result<(), Error> {
        let mut lookups = BTreeSet::new();
        collect_lookups(root, map, &mut lookups);
        for (top_key, second_key) in lookups {
            let found = self
                .mappings
                .get(map)
                .and_then(|m| m.get(top_key, second_key))
                .is_some();
            if !found {
                return Err(Error::UnknownMappingEntry {
                    owner: owner.to_string(),
                    mapping: map.to_string(),
                    top_key: top_key.to_string(),
                    second_key: second_key.to_string(),
                });
            }
        }
        Ok(())
    }
}

fn collect_lookups<'a>(value: &'a Value, map_name: &str, out: &mut BTreeSet<(&'a str, &'a str)>) {
    match value {
        Value::FindInMap {
            map,
            top_key,
            second_key,
        } if map == map_name => {
            out.insert((top_key.as_str(), second_key.as_str()));
        }
        Value::Array(items) | Value::Join { parts: items, .. } => {
            items.iter().for_each(|v| collect_lookups(v, map_name, out))
        }
        Value::Object(entries) => entries
            .values()
            .for_each(|v| collect_lookups(v, map_name, out)),
        Value::If {
            then, otherwise, ..
        } => {
            collect_lookups(then, map_name, out);
            collect_lookups(otherwise, map_name, out);
        }
        _ => {}
    }
}

#[bon]
impl Document {
    #[builder]
    pub fn new(
        #[builder(into)] description: Option<String>,
        #[builder(default)] parameters: Vec<Parameter>,
        #[builder(default)] conditions: Vec<Condition>,
        #[builder(default)] mappings: Vec<Mapping>,
        #[builder(default)] resources: Vec<Resource>,
    ) -> Result<Self, Error> {
        RawDocument {
            description,
            parameters,
            conditions,
            mappings,
            resources,
        }
        .validate()
    }
}
