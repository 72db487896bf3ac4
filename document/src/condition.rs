use serde_json::{Value as Json, json};
use sharr_template::REF;

use crate::{ConditionName, ParameterName, is_pseudo_parameter};

pub const EQUALS: &str = "Fn::Equals";
pub const NOT: &str = "Fn::Not";
pub const AND: &str = "Fn::And";
pub const OR: &str = "Fn::Or";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Condition {
    pub name: ConditionName,
    pub expr: ConditionExpr,
}

impl Condition {
    pub fn new(name: ConditionName, expr: ConditionExpr) -> Self {
        Self { name, expr }
    }
}

/// Boolean expression over parameter values. Every leaf compares one
/// parameter, declared or pseudo, with a literal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConditionExpr {
    Equals {
        parameter: ParameterName,
        literal: String,
    },
    /// Leaf over a pseudo parameter such as `AWS::Region`.
    PseudoEquals {
        pseudo: String,
        literal: String,
    },
    Not(Box<ConditionExpr>),
    And(Vec<ConditionExpr>),
    Or(Vec<ConditionExpr>),
}

impl ConditionExpr {
    pub fn equals(parameter: ParameterName, literal: impl Into<String>) -> Self {
        Self::Equals {
            parameter,
            literal: literal.into(),
        }
    }

    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }

    pub fn visit_parameters<'a>(&'a self, visit: &mut impl FnMut(&'a ParameterName)) {
        match self {
            Self::Equals { parameter, .. } => visit(parameter),
            Self::PseudoEquals { .. } => {}
            Self::Not(inner) => inner.visit_parameters(visit),
            Self::And(items) | Self::Or(items) => {
                items.iter().for_each(|item| item.visit_parameters(visit))
            }
        }
    }

    /// Evaluates the expression, looking parameter values up by name through
    /// `value`.
    pub fn evaluate<E>(&self, value: &impl Fn(&str) -> Result<String, E>) -> Result<bool, E> {
        match self {
            Self::Equals { parameter, literal } => Ok(value(parameter.as_str())? == *literal),
            Self::PseudoEquals { pseudo, literal } => Ok(value(pseudo)? == *literal),
            Self::Not(inner) => Ok(!inner.evaluate(value)?),
            Self::And(items) => {
                for item in items {
                    if !item.evaluate(value)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Self::Or(items) => {
                for item in items {
                    if item.evaluate(value)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }

    pub fn to_json(&self) -> Json {
        match self {
            Self::Equals { parameter, literal } => {
                json!({ EQUALS: [{ REF: parameter.as_str() }, literal] })
            }
            Self::PseudoEquals { pseudo, literal } => {
                json!({ EQUALS: [{ REF: pseudo }, literal] })
            }
            Self::Not(inner) => json!({ NOT: [inner.to_json()] }),
            Self::And(items) => {
                json!({ AND: items.iter().map(Self::to_json).collect::<Vec<_>>() })
            }
            Self::Or(items) => json!({ OR: items.iter().map(Self::to_json).collect::<Vec<_>>() }),
        }
    }

    /// Parses a condition expression. `Fn::Equals` accepts the parameter
    /// reference on either side.
    pub fn from_json(value: &Json) -> Result<Self, String> {
        let Json::Object(map) = value else {
            return Err("condition must be an object".to_string());
        };
        let mut entries = map.iter();
        let (Some((op, args)), None) = (entries.next(), entries.next()) else {
            return Err("condition must have exactly one operator".to_string());
        };
        let Json::Array(args) = args else {
            return Err(format!("{op} expects an array of arguments"));
        };

        match op.as_str() {
            EQUALS => {
                let [lhs, rhs] = args.as_slice() else {
                    return Err(format!("{EQUALS} expects two arguments"));
                };
                let (parameter, literal) = match (parameter_ref(lhs), parameter_ref(rhs)) {
                    (Some(parameter), None) => (parameter, rhs),
                    (None, Some(parameter)) => (parameter, lhs),
                    _ => {
                        return Err(format!(
                            "{EQUALS} must compare one parameter reference with a literal"
                        ));
                    }
                };
                let Json::String(literal) = literal else {
                    return Err(format!("{EQUALS} literal must be a string"));
                };
                if is_pseudo_parameter(parameter) {
                    return Ok(Self::PseudoEquals {
                        pseudo: parameter.to_string(),
                        literal: literal.clone(),
                    });
                }
                let parameter = ParameterName::try_from(parameter).map_err(|e| e.to_string())?;
                Ok(Self::equals(parameter, literal.clone()))
            }
            NOT => {
                let [inner] = args.as_slice() else {
                    return Err(format!("{NOT} expects one argument"));
                };
                Ok(Self::from_json(inner)?.negate())
            }
            AND | OR => {
                if args.len() < 2 {
                    return Err(format!("{op} expects at least two arguments"));
                }
                let items = args
                    .iter()
                    .map(Self::from_json)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(if op == AND {
                    Self::And(items)
                } else {
                    Self::Or(items)
                })
            }
            other => Err(format!("unsupported condition operator `{other}`")),
        }
    }
}

fn parameter_ref(value: &Json) -> Option<&str> {
    let Json::Object(map) = value else {
        return None;
    };
    if map.len() != 1 {
        return None;
    }
    map.get(REF).and_then(Json::as_str)
}
