use std::{borrow::Cow, collections::BTreeMap, fmt};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value as Json};

pub const REF: &str = "Ref";
pub const GET_ATT: &str = "Fn::GetAtt";
pub const JOIN: &str = "Fn::Join";
pub const FIND_IN_MAP: &str = "Fn::FindInMap";
pub const IF: &str = "Fn::If";

/// A property value inside a template: either plain data or an intrinsic
/// expression that the deployment engine evaluates.
///
/// Equality follows the JSON form, so a `Literal` holding an array or object
/// equals the `Array`/`Object` that [`Value::from_json`] builds from it.
#[derive(Clone, Debug)]
pub enum Value {
    /// String, number, bool or null. Arrays and objects parse into
    /// [`Value::Array`] and [`Value::Object`].
    Literal(Json),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
    /// `Ref` to a parameter, a resource or a pseudo parameter.
    Ref(String),
    GetAtt {
        logical_id: String,
        attribute: String,
    },
    Join {
        delimiter: String,
        parts: Vec<Value>,
    },
    FindInMap {
        map: String,
        top_key: String,
        second_key: String,
    },
    If {
        condition: String,
        then: Box<Value>,
        otherwise: Box<Value>,
    },
}

/// Coarse shape of a [`Value`]; two values of different kinds never compare
/// equal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValueKind {
    Null,
    Bool,
    Number,
    String,
    Array,
    Object,
    Ref,
    GetAtt,
    Join,
    FindInMap,
    If,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Number => "number",
            Self::String => "string",
            Self::Array => "array",
            Self::Object => "object",
            Self::Ref => REF,
            Self::GetAtt => GET_ATT,
            Self::Join => JOIN,
            Self::FindInMap => FIND_IN_MAP,
            Self::If => IF,
        };
        f.write_str(name)
    }
}

/// A name that a value points at. Used to check that every reference in a
/// document resolves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reference<'a> {
    /// Target of `Ref`: a parameter, resource or pseudo parameter.
    Name(&'a str),
    /// Resource named by `Fn::GetAtt`.
    Attribute(&'a str),
    Mapping(&'a str),
    Condition(&'a str),
}

impl Value {
    pub fn string(value: impl Into<String>) -> Self {
        Self::Literal(Json::String(value.into()))
    }

    pub fn bool(value: bool) -> Self {
        Self::Literal(Json::Bool(value))
    }

    pub fn reference(target: impl Into<String>) -> Self {
        Self::Ref(target.into())
    }

    pub fn get_att(logical_id: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::GetAtt {
            logical_id: logical_id.into(),
            attribute: attribute.into(),
        }
    }

    pub fn join(delimiter: impl Into<String>, parts: impl IntoIterator<Item = Value>) -> Self {
        Self::Join {
            delimiter: delimiter.into(),
            parts: parts.into_iter().collect(),
        }
    }

    pub fn find_in_map(
        map: impl Into<String>,
        top_key: impl Into<String>,
        second_key: impl Into<String>,
    ) -> Self {
        Self::FindInMap {
            map: map.into(),
            top_key: top_key.into(),
            second_key: second_key.into(),
        }
    }

    pub fn if_condition(condition: impl Into<String>, then: Value, otherwise: Value) -> Self {
        Self::If {
            condition: condition.into(),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        }
    }

    pub fn object<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn array(items: impl IntoIterator<Item = Value>) -> Self {
        Self::Array(items.into_iter().collect())
    }

    /// Plain JSON data, with arrays and objects parsed the way
    /// [`Value::from_json`] reads them.
    pub fn literal(value: Json) -> Self {
        match value {
            Json::Array(_) | Json::Object(_) => {
                Self::from_json(value.clone()).unwrap_or(Self::Literal(value))
            }
            other => Self::Literal(other),
        }
    }

    /// This value with a composite `Literal` at the top replaced by its parsed
    /// form. Anything else is borrowed as is.
    pub fn normalized(&self) -> Cow<'_, Value> {
        match self {
            Self::Literal(json @ (Json::Array(_) | Json::Object(_))) => {
                match Self::from_json(json.clone()) {
                    Ok(parsed) => Cow::Owned(parsed),
                    Err(_) => Cow::Borrowed(self),
                }
            }
            _ => Cow::Borrowed(self),
        }
    }

    fn is_composite_literal(&self) -> bool {
        matches!(self, Self::Literal(Json::Array(_) | Json::Object(_)))
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Literal(Json::Null) => ValueKind::Null,
            Self::Literal(Json::Bool(_)) => ValueKind::Bool,
            Self::Literal(Json::Number(_)) => ValueKind::Number,
            Self::Literal(Json::String(_)) => ValueKind::String,
            // `from_json` never builds these; treat a hand-built one by shape.
            Self::Literal(Json::Array(_)) => ValueKind::Array,
            Self::Literal(Json::Object(_)) => ValueKind::Object,
            Self::Array(_) => ValueKind::Array,
            Self::Object(_) => ValueKind::Object,
            Self::Ref(_) => ValueKind::Ref,
            Self::GetAtt { .. } => ValueKind::GetAtt,
            Self::Join { .. } => ValueKind::Join,
            Self::FindInMap { .. } => ValueKind::FindInMap,
            Self::If { .. } => ValueKind::If,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Literal(Json::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Calls `visit` for every name this value (recursively) points at.
    pub fn visit_references<'a>(&'a self, visit: &mut impl FnMut(Reference<'a>)) {
        match self {
            Self::Literal(_) => {}
            Self::Array(items) => items.iter().for_each(|v| v.visit_references(visit)),
            Self::Object(map) => map.values().for_each(|v| v.visit_references(visit)),
            Self::Ref(target) => visit(Reference::Name(target)),
            Self::GetAtt { logical_id, .. } => visit(Reference::Attribute(logical_id)),
            Self::Join { parts, .. } => parts.iter().for_each(|v| v.visit_references(visit)),
            Self::FindInMap { map, .. } => visit(Reference::Mapping(map)),
            Self::If {
                condition,
                then,
                otherwise,
            } => {
                visit(Reference::Condition(condition));
                then.visit_references(visit);
                otherwise.visit_references(visit);
            }
        }
    }

    pub fn to_json(&self) -> Json {
        match self {
            Self::Literal(value) => value.clone(),
            Self::Array(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Self::Object(map) => Json::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Self::Ref(target) => single(REF, Json::String(target.clone())),
            Self::GetAtt {
                logical_id,
                attribute,
            } => single(
                GET_ATT,
                Json::Array(vec![
                    Json::String(logical_id.clone()),
                    Json::String(attribute.clone()),
                ]),
            ),
            Self::Join { delimiter, parts } => single(
                JOIN,
                Json::Array(vec![
                    Json::String(delimiter.clone()),
                    Json::Array(parts.iter().map(Value::to_json).collect()),
                ]),
            ),
            Self::FindInMap {
                map,
                top_key,
                second_key,
            } => single(
                FIND_IN_MAP,
                Json::Array(vec![
                    Json::String(map.clone()),
                    Json::String(top_key.clone()),
                    Json::String(second_key.clone()),
                ]),
            ),
            Self::If {
                condition,
                then,
                otherwise,
            } => single(
                IF,
                Json::Array(vec![
                    Json::String(condition.clone()),
                    then.to_json(),
                    otherwise.to_json(),
                ]),
            ),
        }
    }

    /// Parses the JSON form of a template value. A single-key object whose key
    /// names a supported intrinsic is read as that intrinsic; any other object
    /// is plain data.
    pub fn from_json(value: Json) -> Result<Self, String> {
        match value {
            Json::Object(map) => Self::from_map(map),
            Json::Array(items) => Ok(Self::Array(
                items
                    .into_iter()
                    .map(Self::from_json)
                    .collect::<Result<_, _>>()?,
            )),
            other => Ok(Self::Literal(other)),
        }
    }

    fn from_map(mut map: Map<String, Json>) -> Result<Self, String> {
        if map.len() == 1 {
            if let Some(value) = map.remove(REF) {
                let Json::String(target) = value else {
                    return Err(format!("{REF} value must be a string"));
                };
                return Ok(Self::Ref(target));
            }
            if let Some(value) = map.remove(GET_ATT) {
                let [logical_id, attribute] = string_args::<2>(GET_ATT, value)?;
                return Ok(Self::GetAtt {
                    logical_id,
                    attribute,
                });
            }
            if let Some(value) = map.remove(FIND_IN_MAP) {
                let [map, top_key, second_key] = string_args::<3>(FIND_IN_MAP, value)?;
                return Ok(Self::FindInMap {
                    map,
                    top_key,
                    second_key,
                });
            }
            if let Some(value) = map.remove(JOIN) {
                let Json::Array(args) = value else {
                    return Err(format!("{JOIN} expects [delimiter, [parts...]]"));
                };
                let mut args = args.into_iter();
                let (Some(Json::String(delimiter)), Some(Json::Array(parts)), None) =
                    (args.next(), args.next(), args.next())
                else {
                    return Err(format!("{JOIN} expects [delimiter, [parts...]]"));
                };
                let parts = parts
                    .into_iter()
                    .map(Self::from_json)
                    .collect::<Result<_, _>>()?;
                return Ok(Self::Join { delimiter, parts });
            }
            if let Some(value) = map.remove(IF) {
                let Json::Array(args) = value else {
                    return Err(format!("{IF} expects [condition, then, else]"));
                };
                let mut args = args.into_iter();
                let (Some(Json::String(condition)), Some(then), Some(otherwise), None) =
                    (args.next(), args.next(), args.next(), args.next())
                else {
                    return Err(format!("{IF} expects [condition, then, else]"));
                };
                return Ok(Self::If {
                    condition,
                    then: Box::new(Self::from_json(then)?),
                    otherwise: Box::new(Self::from_json(otherwise)?),
                });
            }
        }

        let values = map
            .into_iter()
            .map(|(k, v)| Ok((k, Self::from_json(v)?)))
            .collect::<Result<BTreeMap<_, _>, String>>()?;
        Ok(Self::Object(values))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        if self.is_composite_literal() || other.is_composite_literal() {
            return self.to_json() == other.to_json();
        }
        match (self, other) {
            (Self::Literal(a), Self::Literal(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a == b,
            (Self::Ref(a), Self::Ref(b)) => a == b,
            (
                Self::GetAtt {
                    logical_id: a_id,
                    attribute: a_attr,
                },
                Self::GetAtt {
                    logical_id: b_id,
                    attribute: b_attr,
                },
            ) => a_id == b_id && a_attr == b_attr,
            (
                Self::Join {
                    delimiter: a_delimiter,
                    parts: a_parts,
                },
                Self::Join {
                    delimiter: b_delimiter,
                    parts: b_parts,
                },
            ) => a_delimiter == b_delimiter && a_parts == b_parts,
            (
                Self::FindInMap {
                    map: a_map,
                    top_key: a_top,
                    second_key: a_second,
                },
                Self::FindInMap {
                    map: b_map,
                    top_key: b_top,
                    second_key: b_second,
                },
            ) => a_map == b_map && a_top == b_top && a_second == b_second,
            (
                Self::If {
                    condition: a_condition,
                    then: a_then,
                    otherwise: a_otherwise,
                },
                Self::If {
                    condition: b_condition,
                    then: b_then,
                    otherwise: b_otherwise,
                },
            ) => a_condition == b_condition && a_then == b_then && a_otherwise == b_otherwise,
            _ => false,
        }
    }
}

fn single(key: &str, value: Json) -> Json {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    Json::Object(map)
}

fn string_args<const N: usize>(name: &str, value: Json) -> Result<[String; N], String> {
    let err = || format!("{name} expects an array of {N} strings");
    let Json::Array(items) = value else {
        return Err(err());
    };
    let strings = items
        .into_iter()
        .map(|item| match item {
            Json::String(s) => Ok(s),
            _ => Err(err()),
        })
        .collect::<Result<Vec<_>, _>>()?;
    strings.try_into().map_err(|_| err())
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::string(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::string(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::bool(value)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Json::deserialize(deserializer)?;
        Self::from_json(raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn intrinsics_parse_into_tagged_variants() {
        let value = Value::from_json(json!({
            "Fn::Join": ["", [
                "https://",
                { "Fn::FindInMap": ["SourceCode", "General", "S3Bucket"] },
                "/",
                { "Ref": "AWS::Region" }
            ]]
        }))
        .expect("join should parse");

        assert_eq!(
            value,
            Value::join(
                "",
                [
                    Value::string("https://"),
                    Value::find_in_map("SourceCode", "General", "S3Bucket"),
                    Value::string("/"),
                    Value::reference("AWS::Region"),
                ]
            )
        );
    }

    #[test]
    fn multi_key_object_is_plain_data() {
        let value = Value::from_json(json!({ "Ref": "A", "Other": 1 })).unwrap();
        assert_eq!(value.kind(), ValueKind::Object);
    }

    #[test]
    fn malformed_intrinsics_are_rejected() {
        let err = Value::from_json(json!({ "Fn::GetAtt": ["OnlyOne"] })).unwrap_err();
        assert!(err.contains("Fn::GetAtt"), "unexpected error: {err}");

        let err = Value::from_json(json!({ "Ref": 3 })).unwrap_err();
        assert!(err.contains("Ref"), "unexpected error: {err}");
    }

    #[test]
    fn to_json_emits_template_syntax() {
        let value = Value::if_condition(
            "createAuditBucketCond",
            Value::get_att("Bucket", "Arn"),
            Value::reference("AWS::NoValue"),
        );
        assert_eq!(
            value.to_json(),
            json!({
                "Fn::If": [
                    "createAuditBucketCond",
                    { "Fn::GetAtt": ["Bucket", "Arn"] },
                    { "Ref": "AWS::NoValue" }
                ]
            })
        );
        assert_eq!(Value::from_json(value.to_json()).unwrap(), value);
    }

    #[test]
    fn composite_literals_equal_their_parsed_form() {
        let parsed = Value::array([Value::string("a"), Value::reference("B")]);
        let literal = Value::Literal(json!(["a", { "Ref": "B" }]));
        assert_eq!(literal, parsed);
        assert_eq!(parsed, literal);
        assert_eq!(literal.normalized().kind(), ValueKind::Array);
        assert_eq!(Value::literal(json!(["a", { "Ref": "B" }])), parsed);
        assert!(matches!(Value::literal(json!({ "k": 1 })), Value::Object(_)));

        assert_ne!(Value::Literal(json!(["a"])), Value::array([Value::string("b")]));
        assert_ne!(Value::Literal(json!({ "Ref": "B" })), Value::string("B"));
    }

    #[test]
    fn visit_references_walks_nested_values() {
        let value = Value::object([
            ("A", Value::reference("Param")),
            (
                "B",
                Value::array([
                    Value::get_att("Key", "Arn"),
                    Value::if_condition(
                        "cond",
                        Value::find_in_map("Map", "a", "b"),
                        Value::bool(false),
                    ),
                ]),
            ),
        ]);

        let mut seen = Vec::new();
        value.visit_references(&mut |r| seen.push(r));
        assert_eq!(
            seen,
            vec![
                Reference::Name("Param"),
                Reference::Attribute("Key"),
                Reference::Condition("cond"),
                Reference::Mapping("Map"),
            ]
        );
    }
}
