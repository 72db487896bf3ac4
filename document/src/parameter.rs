use std::{collections::BTreeSet, fmt, str::FromStr};

use crate::ParameterName;

#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ParameterType {
    #[default]
    String,
    Number,
    CommaDelimitedList,
    /// Provider-specific types such as `AWS::EC2::KeyPair::KeyName`, kept
    /// verbatim.
    Other(String),
}

impl ParameterType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::String => "String",
            Self::Number => "Number",
            Self::CommaDelimitedList => "CommaDelimitedList",
            Self::Other(other) => other.as_str(),
        }
    }
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParameterType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "String" => Self::String,
            "Number" => Self::Number,
            "CommaDelimitedList" => Self::CommaDelimitedList,
            other => Self::Other(other.to_string()),
        })
    }
}

impl serde::Serialize for ParameterType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> serde::Deserialize<'de> for ParameterType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(raw.parse().unwrap_or_default())
    }
}

/// A deployment-time input of the template.
#[derive(Clone, Debug, PartialEq, Eq, bon::Builder)]
pub struct Parameter {
    pub name: ParameterName,
    #[builder(default)]
    pub kind: ParameterType,
    pub allowed_values: Option<BTreeSet<String>>,
    #[builder(into)]
    pub default: Option<String>,
    #[builder(into)]
    pub description: Option<String>,
    /// Passed through to the template; not enforced when binding values.
    #[builder(into)]
    pub allowed_pattern: Option<String>,
}

impl Parameter {
    pub fn allows(&self, value: &str) -> bool {
        self.allowed_values
            .as_ref()
            .is_none_or(|allowed| allowed.contains(value))
    }
}
