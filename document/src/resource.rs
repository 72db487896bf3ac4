use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sharr_template::Value;

use crate::{ConditionName, LogicalId, MappingName};

/// What the deployment engine does with a resource when it is deleted or
/// replaced. Carried through composition without interpretation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RetentionPolicy {
    Retain,
    Delete,
    Snapshot,
}

impl RetentionPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Retain => "Retain",
            Self::Delete => "Delete",
            Self::Snapshot => "Snapshot",
        }
    }
}

impl fmt::Display for RetentionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RetentionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Retain" => Ok(Self::Retain),
            "Delete" => Ok(Self::Delete),
            "Snapshot" => Ok(Self::Snapshot),
            other => Err(format!("unknown retention policy `{other}`")),
        }
    }
}

/// A block of the template: one provider resource, optionally guarded by a
/// condition.
#[derive(Clone, Debug, PartialEq, bon::Builder)]
pub struct Resource {
    pub logical_id: LogicalId,
    #[builder(into)]
    pub resource_type: String,
    pub condition: Option<ConditionName>,
    #[builder(default)]
    pub properties: BTreeMap<String, Value>,
    #[builder(default)]
    pub depends_on: Vec<LogicalId>,
    pub deletion_policy: Option<RetentionPolicy>,
    pub update_replace_policy: Option<RetentionPolicy>,
}

impl Resource {
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }
}

/// Two-level lookup table read by `Fn::FindInMap`.
#[derive(Clone, Debug, PartialEq)]
pub struct Mapping {
    pub name: MappingName,
    pub entries: BTreeMap<String, BTreeMap<String, Value>>,
}

impl Mapping {
    pub fn new(name: MappingName) -> Self {
        Self {
            name,
            entries: BTreeMap::new(),
        }
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

    pub fn get(&self, top_key: &str, second_key: &str) -> Option<&Value> {
        self.entries.get(top_key)?.get(second_key)
    }
}
