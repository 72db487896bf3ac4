use std::collections::BTreeMap;

use sharr_document::{ConditionExpr, Document, Resource};
use sharr_template::Value;

use crate::{
    Assertion, AssertionFailure, ExpectMapping, ExpectParameter, ExpectResource, FailureReason,
    TargetKind, check,
};

/// Read-only assertion helpers over one composed document.
#[derive(Clone, Copy, Debug)]
pub struct Template<'a> {
    doc: &'a Document,
}

impl<'a> Template<'a> {
    pub fn new(doc: &'a Document) -> Self {
        Self { doc }
    }

    pub fn has_parameter(
        &self,
        name: &str,
        expect: ExpectParameter,
    ) -> Result<(), AssertionFailure> {
        check(
            self.doc,
            &Assertion::Parameter {
                name: name.to_string(),
                expect,
            },
        )
    }

    pub fn has_condition(&self, name: &str, expr: ConditionExpr) -> Result<(), AssertionFailure> {
        check(
            self.doc,
            &Assertion::Condition {
                name: name.to_string(),
                expr,
            },
        )
    }

    pub fn has_mapping(&self, name: &str, expect: ExpectMapping) -> Result<(), AssertionFailure> {
        check(
            self.doc,
            &Assertion::Mapping {
                name: name.to_string(),
                expect,
            },
        )
    }

    pub fn has_resource(&self, name: &str, expect: ExpectResource) -> Result<(), AssertionFailure> {
        check(
            self.doc,
            &Assertion::Resource {
                name: name.to_string(),
                expect,
            },
        )
    }

    /// Properties only; the guard and policies are not checked.
    pub fn has_resource_properties<K: Into<String>>(
        &self,
        name: &str,
        properties: impl IntoIterator<Item = (K, Value)>,
    ) -> Result<(), AssertionFailure> {
        let properties = properties
            .into_iter()
            .map(|(k, v)| (k.into(), v))
            .collect::<BTreeMap<_, _>>();
        self.has_resource(
            name,
            ExpectResource {
                properties,
                ..ExpectResource::default()
            },
        )
    }

    pub fn find_resources(&self, resource_type: &str) -> Vec<&'a Resource> {
        self.doc.resources_of_type(resource_type).collect()
    }

    pub fn resource_count_is(
        &self,
        resource_type: &str,
        count: usize,
    ) -> Result<(), AssertionFailure> {
        let found = self.doc.resources_of_type(resource_type).count();
        if found == count {
            return Ok(());
        }
        let failure = AssertionFailure::new(
            TargetKind::Resource,
            resource_type,
            FailureReason::ValueMismatch,
            format!("expected {count} resources of this type, found {found}"),
        );
        tracing::warn!(resource_type, expected = count, found, "resource count differs");
        Err(failure)
    }
}
