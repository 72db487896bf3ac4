use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value as Json};
use sharr_template::Value;

use crate::{
    Condition, ConditionExpr, ConditionName, Document, Error, LogicalId, Mapping, MappingName,
    Parameter, ParameterName, RawDocument, Resource, RetentionPolicy, TEMPLATE_FORMAT_VERSION,
};

/// Template sections that are accepted but not modelled.
const IGNORED_SECTIONS: &[&str] = &["Metadata", "Outputs", "Rules", "Transform"];

impl Document {
    /// Renders the document in deployment template form.
    pub fn to_json(&self) -> Json {
        let mut root = Map::new();
        root.insert(
            "AWSTemplateFormatVersion".to_string(),
            Json::String(TEMPLATE_FORMAT_VERSION.to_string()),
        );
        if let Some(description) = self.description() {
            root.insert(
                "Description".to_string(),
                Json::String(description.to_string()),
            );
        }
        if !self.parameters().is_empty() {
            let section = self
                .parameters()
                .iter()
                .map(|(name, p)| (name.to_string(), parameter_to_json(p)))
                .collect();
            root.insert("Parameters".to_string(), Json::Object(section));
        }
        if !self.conditions().is_empty() {
            let section = self
                .conditions()
                .iter()
                .map(|(name, c)| (name.to_string(), c.expr.to_json()))
                .collect();
            root.insert("Conditions".to_string(), Json::Object(section));
        }
        if !self.mappings().is_empty() {
            let section = self
                .mappings()
                .iter()
                .map(|(name, m)| (name.to_string(), mapping_to_json(m)))
                .collect();
            root.insert("Mappings".to_string(), Json::Object(section));
        }
        let resources = self
            .resources()
            .iter()
            .map(|(id, r)| (id.to_string(), resource_to_json(r)))
            .collect();
        root.insert("Resources".to_string(), Json::Object(resources));
        Json::Object(root)
    }

    /// Reads a deployment template. The result is validated like any
    /// composed document.
    pub fn from_json(value: &Json) -> Result<Self, Error> {
        let root = as_object(value, "")?;
        let mut raw = RawDocument::default();

        for (key, section) in root {
            match key.as_str() {
                "AWSTemplateFormatVersion" => {}
                "Description" => {
                    let description = section
                        .as_str()
                        .ok_or_else(|| Error::malformed("Description", "expected a string"))?;
                    raw.description = Some(description.to_string());
                }
                "Parameters" => {
                    for (name, body) in as_object(section, "Parameters")? {
                        raw.parameters.push(parameter_from_json(name, body)?);
                    }
                }
                "Conditions" => {
                    for (name, body) in as_object(section, "Conditions")? {
                        let path = format!("Conditions.{name}");
                        let expr = ConditionExpr::from_json(body)
                            .map_err(|message| Error::malformed(&path, message))?;
                        raw.conditions
                            .push(Condition::new(ConditionName::try_from(name.as_str())?, expr));
                    }
                }
                "Mappings" => {
                    for (name, body) in as_object(section, "Mappings")? {
                        raw.mappings.push(mapping_from_json(name, body)?);
                    }
                }
                "Resources" => {
                    for (id, body) in as_object(section, "Resources")? {
                        raw.resources.push(resource_from_json(id, body)?);
                    }
                }
                other if IGNORED_SECTIONS.contains(&other) => {}
                other => {
                    return Err(Error::malformed(other, "unknown template section"));
                }
            }
        }

        raw.validate()
    }
}

impl serde::Serialize for Document {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

fn parameter_to_json(parameter: &Parameter) -> Json {
    let mut out = Map::new();
    out.insert(
        "Type".to_string(),
        Json::String(parameter.kind.to_string()),
    );
    if let Some(description) = &parameter.description {
        out.insert("Description".to_string(), Json::String(description.clone()));
    }
    if let Some(allowed) = &parameter.allowed_values {
        out.insert(
            "AllowedValues".to_string(),
            Json::Array(allowed.iter().cloned().map(Json::String).collect()),
        );
    }
    if let Some(pattern) = &parameter.allowed_pattern {
        out.insert("AllowedPattern".to_string(), Json::String(pattern.clone()));
    }
    if let Some(default) = &parameter.default {
        out.insert("Default".to_string(), Json::String(default.clone()));
    }
    Json::Object(out)
}

fn mapping_to_json(mapping: &Mapping) -> Json {
    Json::Object(
        mapping
            .entries
            .iter()
            .map(|(top, entries)| {
                let inner = entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect();
                (top.clone(), Json::Object(inner))
            })
            .collect(),
    )
}

fn resource_to_json(resource: &Resource) -> Json {
    let mut out = Map::new();
    out.insert(
        "Type".to_string(),
        Json::String(resource.resource_type.clone()),
    );
    if let Some(condition) = &resource.condition {
        out.insert("Condition".to_string(), Json::String(condition.to_string()));
    }
    if !resource.depends_on.is_empty() {
        out.insert(
            "DependsOn".to_string(),
            Json::Array(
                resource
                    .depends_on
                    .iter()
                    .map(|id| Json::String(id.to_string()))
                    .collect(),
            ),
        );
    }
    if !resource.properties.is_empty() {
        out.insert(
            "Properties".to_string(),
            Json::Object(
                resource
                    .properties
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        );
    }
    if let Some(policy) = resource.deletion_policy {
        out.insert(
            "DeletionPolicy".to_string(),
            Json::String(policy.to_string()),
        );
    }
    if let Some(policy) = resource.update_replace_policy {
        out.insert(
            "UpdateReplacePolicy".to_string(),
            Json::String(policy.to_string()),
        );
    }
    Json::Object(out)
}

fn as_object<'a>(value: &'a Json, path: &str) -> Result<&'a Map<String, Json>, Error> {
    value
        .as_object()
        .ok_or_else(|| Error::malformed(path, "expected an object"))
}

fn string_field(body: &Map<String, Json>, path: &str, key: &str) -> Result<Option<String>, Error> {
    match body.get(key) {
        None => Ok(None),
        Some(Json::String(s)) => Ok(Some(s.clone())),
        // Numeric defaults are legal in templates; keep them as text.
        Some(Json::Number(n)) => Ok(Some(n.to_string())),
        Some(_) => Err(Error::malformed(
            format!("{path}.{key}"),
            "expected a string",
        )),
    }
}

fn parameter_from_json(name: &str, body: &Json) -> Result<Parameter, Error> {
    let path = format!("Parameters.{name}");
    let body = as_object(body, &path)?;
    let kind = string_field(body, &path, "Type")?
        .ok_or_else(|| Error::malformed(&path, "missing `Type`"))?;

    let allowed_values = match body.get("AllowedValues") {
        None => None,
        Some(Json::Array(items)) => Some(
            items
                .iter()
                .map(|item| match item {
                    Json::String(s) => Ok(s.clone()),
                    Json::Number(n) => Ok(n.to_string()),
                    _ => Err(Error::malformed(
                        format!("{path}.AllowedValues"),
                        "expected strings",
                    )),
                })
                .collect::<Result<BTreeSet<_>, _>>()?,
        ),
        Some(_) => {
            return Err(Error::malformed(
                format!("{path}.AllowedValues"),
                "expected an array",
            ));
        }
    };

    Ok(Parameter {
        name: ParameterName::try_from(name)?,
        kind: kind.parse().unwrap_or_default(),
        allowed_values,
        default: string_field(body, &path, "Default")?,
        description: string_field(body, &path, "Description")?,
        allowed_pattern: string_field(body, &path, "AllowedPattern")?,
    })
}

fn mapping_from_json(name: &str, body: &Json) -> Result<Mapping, Error> {
    let path = format!("Mappings.{name}");
    let mut entries = BTreeMap::new();
    for (top, inner) in as_object(body, &path)? {
        let inner_path = format!("{path}.{top}");
        let mut values = BTreeMap::new();
        for (key, value) in as_object(inner, &inner_path)? {
            let value = Value::from_json(value.clone())
                .map_err(|message| Error::malformed(format!("{inner_path}.{key}"), message))?;
            values.insert(key.clone(), value);
        }
        entries.insert(top.clone(), values);
    }
    Ok(Mapping {
        name: MappingName::try_from(name)?,
        entries,
    })
}

fn resource_from_json(id: &str, body: &Json) -> Result<Resource, Error> {
    let path = format!("Resources.{id}");
    let body = as_object(body, &path)?;

    let resource_type = string_field(body, &path, "Type")?
        .ok_or_else(|| Error::malformed(&path, "missing `Type`"))?;

    let condition = string_field(body, &path, "Condition")?
        .map(ConditionName::new)
        .transpose()?;

    let depends_on = match body.get("DependsOn") {
        None => Vec::new(),
        Some(Json::String(single)) => vec![LogicalId::try_from(single.as_str())?],
        Some(Json::Array(items)) => items
            .iter()
            .map(|item| {
                let id = item.as_str().ok_or_else(|| {
                    Error::malformed(format!("{path}.DependsOn"), "expected strings")
                })?;
                LogicalId::try_from(id)
            })
            .collect::<Result<_, _>>()?,
        Some(_) => {
            return Err(Error::malformed(
                format!("{path}.DependsOn"),
                "expected a string or an array",
            ));
        }
    };

    let properties = match body.get("Properties") {
        None => BTreeMap::new(),
        Some(props) => as_object(props, &format!("{path}.Properties"))?
            .iter()
            .map(|(k, v)| {
                let value = Value::from_json(v.clone()).map_err(|message| {
                    Error::malformed(format!("{path}.Properties.{k}"), message)
                })?;
                Ok((k.clone(), value))
            })
            .collect::<Result<_, Error>>()?,
    };

    let policy = |key: &str| -> Result<Option<RetentionPolicy>, Error> {
        string_field(body, &path, key)?
            .map(|raw| {
                raw.parse()
                    .map_err(|message: String| Error::malformed(format!("{path}.{key}"), message))
            })
            .transpose()
    };

    Ok(Resource {
        logical_id: LogicalId::try_from(id)?,
        resource_type,
        condition,
        properties,
        depends_on,
        deletion_policy: policy("DeletionPolicy")?,
        update_replace_policy: policy("UpdateReplacePolicy")?,
    })
}
