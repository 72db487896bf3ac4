use std::collections::BTreeMap;

use serde_json::Value as Json;
use sharr_template::Value;

use crate::{Document, EvalError, ParameterName, Resource, is_pseudo_parameter};

/// Deployment-time parameter values: explicit values first, then declared
/// defaults. Parameters with neither stay unbound. Pseudo parameters only
/// have a value when one is given explicitly.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Bindings {
    values: BTreeMap<ParameterName, String>,
    pseudo: BTreeMap<String, String>,
}

impl Bindings {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .get(name)
            .or_else(|| self.pseudo.get(name))
            .map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ParameterName, &str)> {
        self.values.iter().map(|(k, v)| (k, v.as_str()))
    }

    fn require(&self, name: &str) -> Result<String, EvalError> {
        self.get(name)
            .map(str::to_string)
            .ok_or_else(|| EvalError::MissingValue {
                parameter: name.to_string(),
            })
    }
}

impl Document {
    /// Binds explicit values over the declared defaults, rejecting unknown
    /// parameters and values outside a parameter's allowed set. Values for
    /// pseudo parameters (`AWS::Region`, ...) are kept as given.
    pub fn bind(&self, values: &BTreeMap<String, String>) -> Result<Bindings, EvalError> {
        let mut pseudo = BTreeMap::new();
        for (name, value) in values {
            if is_pseudo_parameter(name) {
                pseudo.insert(name.clone(), value.clone());
            } else if self.parameter(name).is_none() {
                return Err(EvalError::UnknownParameter { name: name.clone() });
            }
        }

        let mut bound = BTreeMap::new();
        for (name, parameter) in self.parameters() {
            let Some(value) = values
                .get(name.as_str())
                .or(parameter.default.as_ref())
            else {
                continue;
            };
            if !parameter.allows(value) {
                let allowed = parameter
                    .allowed_values
                    .iter()
                    .flatten()
                    .map(|v| format!("`{v}`"))
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(EvalError::DisallowedValue {
                    parameter: name.to_string(),
                    value: value.clone(),
                    allowed,
                });
            }
            bound.insert(name.clone(), value.clone());
        }
        Ok(Bindings {
            values: bound,
            pseudo,
        })
    }

    pub fn condition_holds(&self, name: &str, bindings: &Bindings) -> Result<bool, EvalError> {
        let condition = self
            .condition(name)
            .ok_or_else(|| EvalError::UnknownCondition {
                name: name.to_string(),
            })?;
        condition.expr.evaluate(&|parameter| bindings.require(parameter))
    }

    /// Resources whose guard holds under `bindings`, in logical-id order.
    pub fn active_resources(&self, bindings: &Bindings) -> Result<Vec<&Resource>, EvalError> {
        let mut active = Vec::new();
        for resource in self.resources().values() {
            let enabled = match &resource.condition {
                Some(condition) => self.condition_holds(condition.as_str(), bindings)?,
                None => true,
            };
            if enabled {
                active.push(resource);
            }
        }
        Ok(active)
    }

    /// Statically evaluates `value`. Resource references and attributes only
    /// exist after deployment and fail with [`EvalError::Unresolvable`].
    pub fn resolve(&self, value: &Value, bindings: &Bindings) -> Result<Json, EvalError> {
        match value {
            Value::Literal(literal) => Ok(literal.clone()),
            Value::Array(items) => items
                .iter()
                .map(|item| self.resolve(item, bindings))
                .collect::<Result<Vec<_>, _>>()
                .map(Json::Array),
            Value::Object(entries) => entries
                .iter()
                .map(|(k, v)| Ok((k.clone(), self.resolve(v, bindings)?)))
                .collect::<Result<serde_json::Map<_, _>, EvalError>>()
                .map(Json::Object),
            Value::Ref(target) => {
                if self.parameter(target).is_some() {
                    bindings.require(target).map(Json::String)
                } else if is_pseudo_parameter(target)
                    && let Some(value) = bindings.get(target)
                {
                    Ok(Json::String(value.to_string()))
                } else {
                    Err(EvalError::Unresolvable {
                        what: format!("`Ref` to `{target}`"),
                    })
                }
            }
            Value::GetAtt {
                logical_id,
                attribute,
            } => Err(EvalError::Unresolvable {
                what: format!("attribute `{logical_id}.{attribute}`"),
            }),
            Value::Join { delimiter, parts } => {
                let mut rendered = Vec::with_capacity(parts.len());
                for part in parts {
                    rendered.push(self.resolve_string(part, bindings)?);
                }
                Ok(Json::String(rendered.join(delimiter)))
            }
            Value::FindInMap {
                map,
                top_key,
                second_key,
            } => {
                let entry = self
                    .mapping(map)
                    .and_then(|m| m.get(top_key, second_key))
                    .ok_or_else(|| EvalError::UnknownMappingEntry {
                        mapping: map.clone(),
                        top_key: top_key.clone(),
                        second_key: second_key.clone(),
                    })?;
                self.resolve(entry, bindings)
            }
            Value::If {
                condition,
                then,
                otherwise,
            } => {
                if self.condition_holds(condition, bindings)? {
                    self.resolve(then, bindings)
                } else {
                    self.resolve(otherwise, bindings)
                }
            }
        }
    }

    pub fn resolve_string(&self, value: &Value, bindings: &Bindings) -> Result<String, EvalError> {
        match self.resolve(value, bindings)? {
            Json::String(s) => Ok(s),
            Json::Number(n) => Ok(n.to_string()),
            Json::Bool(b) => Ok(b.to_string()),
            other => Err(EvalError::NotAString {
                what: format!("value `{other}`"),
            }),
        }
    }
}
