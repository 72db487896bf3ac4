use miette::Diagnostic;
use thiserror::Error;

#[allow(unused_assignments)]
#[derive(Debug, Error, Diagnostic)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid {kind} name `{name}`: only ASCII letters and digits are allowed")]
    #[diagnostic(code(document::invalid_name))]
    InvalidName { kind: &'static str, name: String },

    #[error("parameter `{name}` is declared more than once")]
    #[diagnostic(code(document::duplicate_parameter))]
    DuplicateParameter { name: String },

    #[error("condition `{name}` is declared more than once")]
    #[diagnostic(code(document::duplicate_condition))]
    DuplicateCondition { name: String },

    #[error("mapping `{name}` is declared more than once")]
    #[diagnostic(code(document::duplicate_mapping))]
    DuplicateMapping { name: String },

    #[error("resource `{name}` is declared more than once")]
    #[diagnostic(code(document::duplicate_resource))]
    DuplicateResource { name: String },

    #[error("`{name}` is declared as both a parameter and a resource")]
    #[diagnostic(
        code(document::name_conflict),
        help("Parameters and resources share one namespace for `Ref`.")
    )]
    NameConflict { name: String },

    #[error("parameter `{parameter}` has default `{value}` which is not an allowed value")]
    #[diagnostic(code(document::invalid_default))]
    InvalidDefault { parameter: String, value: String },

    #[error("condition `{condition}` references unknown parameter `{parameter}`")]
    #[diagnostic(code(document::unknown_condition_parameter))]
    UnknownConditionParameter {
        condition: String,
        parameter: String,
    },

    #[error("resource `{resource}` is guarded by unknown condition `{condition}`")]
    #[diagnostic(code(document::unknown_guard))]
    UnknownGuard { resource: String, condition: String },

    #[error("`{owner}` references unknown parameter or resource `{target}`")]
    #[diagnostic(code(document::unknown_reference))]
    UnknownReference { owner: String, target: String },

    #[error("`{owner}` reads an attribute of unknown resource `{target}`")]
    #[diagnostic(code(document::unknown_attribute_target))]
    UnknownAttributeTarget { owner: String, target: String },

    #[error("`{owner}` looks up unknown mapping entry `{mapping}.{top_key}.{second_key}`")]
    #[diagnostic(code(document::unknown_mapping_entry))]
    UnknownMappingEntry {
        owner: String,
        mapping: String,
        top_key: String,
        second_key: String,
    },

    #[error("`{owner}` references unknown condition `{condition}`")]
    #[diagnostic(code(document::unknown_condition))]
    UnknownCondition { owner: String, condition: String },

    #[error("resource `{resource}` depends on unknown resource `{target}`")]
    #[diagnostic(code(document::unknown_dependency))]
    UnknownDependency { resource: String, target: String },

    #[error("malformed template at `{path}`: {message}")]
    #[diagnostic(code(document::malformed_template))]
    Malformed { path: String, message: String },
}

impl Error {
    pub(crate) fn malformed(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Malformed {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Failure to evaluate part of a document against deployment-time parameter
/// values.
#[allow(unused_assignments)]
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
#[non_exhaustive]
pub enum EvalError {
    #[error("unknown parameter `{name}`")]
    #[diagnostic(code(document::eval::unknown_parameter))]
    UnknownParameter { name: String },

    #[error("value `{value}` is not allowed for parameter `{parameter}` (allowed: {allowed})")]
    #[diagnostic(code(document::eval::disallowed_value))]
    DisallowedValue {
        parameter: String,
        value: String,
        allowed: String,
    },

    #[error("parameter `{parameter}` has no value and no default")]
    #[diagnostic(code(document::eval::missing_value))]
    MissingValue { parameter: String },

    #[error("unknown condition `{name}`")]
    #[diagnostic(code(document::eval::unknown_condition))]
    UnknownCondition { name: String },

    #[error("mapping entry `{mapping}.{top_key}.{second_key}` does not exist")]
    #[diagnostic(code(document::eval::unknown_mapping_entry))]
    UnknownMappingEntry {
        mapping: String,
        top_key: String,
        second_key: String,
    },

    #[error("{what} cannot be resolved before deployment")]
    #[diagnostic(
        code(document::eval::unresolvable),
        help("Only literals, parameters, mappings, joins and conditionals resolve statically.")
    )]
    Unresolvable { what: String },

    #[error("{what} does not resolve to a string")]
    #[diagnostic(code(document::eval::not_a_string))]
    NotAString { what: String },
}
