use std::collections::BTreeSet;

use semver::Version;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{ConfigError, Result};

pub const DEFAULT_SOLUTION_ID: &str = "SO0111";
pub const DEFAULT_NAMESPACE: &str = "aws-security-hub-automated-response-and-remediation";
pub const DEFAULT_VERSION: &str = "v1.5.0";
pub const DEFAULT_DISTRIBUTION_BUCKET: &str = "solutions";

/// Host suffix of the bucket that serves published templates.
pub const REFERENCE_HOST_SUFFIX: &str = "-reference.s3.amazonaws.com";

/// A remediation playbook deployed as a nested stack of the member stack.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Playbook {
    pub name: String,
    /// Template path relative to `<namespace>/<version>/`.
    pub template: String,
    #[serde(default = "default_enabled")]
    pub enabled_by_default: bool,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl Playbook {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            template: format!("playbooks/{name}MemberStack.template"),
            name,
            enabled_by_default: true,
            description: None,
        }
    }

    /// Name of the yes/no parameter that loads this playbook.
    pub fn toggle_name(&self) -> String {
        format!("Load{}", self.name)
    }
}

pub fn default_playbooks() -> Vec<Playbook> {
    [
        ("AFSBP", "AWS Foundational Security Best Practices"),
        ("CIS120", "CIS AWS Foundations Benchmark v1.2.0"),
        ("CIS140", "CIS AWS Foundations Benchmark v1.4.0"),
        ("PCI321", "PCI-DSS v3.2.1"),
        ("NIST80053", "NIST SP 800-53 Rev. 5"),
        ("SC", "Security Control consolidated findings"),
    ]
    .into_iter()
    .map(|(name, standard)| Playbook {
        description: Some(format!("Load the {standard} member playbook")),
        ..Playbook::new(name)
    })
    .collect()
}

/// Identifiers shared by everything the member stack emits. Passed
/// explicitly to composition; never read from global state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolutionConfig {
    pub solution_id: String,
    pub namespace: String,
    pub version: String,
    pub distribution_bucket: String,
    pub description: Option<String>,
    pub playbooks: Vec<Playbook>,
}

impl Default for SolutionConfig {
    fn default() -> Self {
        Self {
            solution_id: DEFAULT_SOLUTION_ID.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            version: DEFAULT_VERSION.to_string(),
            distribution_bucket: DEFAULT_DISTRIBUTION_BUCKET.to_string(),
            description: None,
            playbooks: default_playbooks(),
        }
    }
}

impl SolutionConfig {
    pub fn description(&self) -> String {
        match &self.description {
            Some(description) => description.clone(),
            None => format!(
                "({}) AWS Security Hub Automated Response & Remediation Member Account Stack, {}",
                self.solution_id, self.version
            ),
        }
    }

    /// `<namespace>/<version>`, the key prefix of every published artifact.
    pub fn key_prefix(&self) -> String {
        format!("{}/{}", self.namespace, self.version)
    }

    /// `https://<bucket>-reference.s3.amazonaws.com/<namespace>`.
    pub fn distribution_prefix(&self) -> String {
        format!(
            "https://{}{}/{}",
            self.distribution_bucket, REFERENCE_HOST_SUFFIX, self.namespace
        )
    }

    /// URL of a published template, `<prefix>/<version>/<relative>`.
    /// `relative` is `/`-separated segments of letters, digits, `-`, `_` and
    /// `.`, with no empty, `.` or `..` segment.
    pub fn template_url(&self, relative: &str) -> Result<Url> {
        let valid = relative.split('/').all(|segment| {
            !matches!(segment, "" | "." | "..")
                && segment
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
        });
        if !valid {
            return Err(ConfigError::validation(format!(
                "template path {relative:?} must be relative segments of letters, digits, \
                 '-', '_' and '.'"
            )));
        }
        let raw = format!("{}/{}/{}", self.distribution_prefix(), self.version, relative);
        Url::parse(&raw)
            .map_err(|e| ConfigError::validation(format!("invalid template URL {raw:?}: {e}")))
    }

    /// Parsed form of `version`, which is `v` followed by a semantic version.
    pub fn semver(&self) -> Result<Version> {
        let raw = self.version.strip_prefix('v').ok_or_else(|| {
            ConfigError::validation(format!(
                "version {:?} must start with `v` (e.g. \"v1.5.0\")",
                self.version
            ))
        })?;
        Version::parse(raw).map_err(|e| {
            ConfigError::validation(format!("version {:?} is not semver: {e}", self.version))
        })
    }

    /// Prefix of SSM parameter names the stack publishes.
    pub fn ssm_prefix(&self) -> String {
        format!("/Solutions/{}", self.solution_id)
    }

    pub fn validate(&self) -> Result<()> {
        if self.solution_id.is_empty()
            || !self.solution_id.bytes().all(|b| b.is_ascii_alphanumeric())
        {
            return Err(ConfigError::validation(format!(
                "solution_id {:?} must be non-empty and alphanumeric",
                self.solution_id
            )));
        }
        ensure_label("namespace", &self.namespace)?;
        ensure_label("distribution_bucket", &self.distribution_bucket)?;
        self.semver()?;
        Url::parse(&self.distribution_prefix()).map_err(|e| {
            ConfigError::validation(format!(
                "invalid distribution prefix {:?}: {e}",
                self.distribution_prefix()
            ))
        })?;

        let mut seen = BTreeSet::new();
        for playbook in &self.playbooks {
            if playbook.name.is_empty()
                || !playbook.name.bytes().all(|b| b.is_ascii_alphanumeric())
            {
                return Err(ConfigError::validation(format!(
                    "playbook name {:?} must be non-empty and alphanumeric",
                    playbook.name
                )));
            }
            if !seen.insert(playbook.name.as_str()) {
                return Err(ConfigError::validation(format!(
                    "playbook {:?} is listed more than once",
                    playbook.name
                )));
            }
            self.template_url(&playbook.template).map_err(|e| {
                ConfigError::validation(format!("playbook {:?}: {e}", playbook.name))
            })?;
        }
        Ok(())
    }
}

/// Lowercase letters, digits, `-` and `.`, starting with a letter or digit.
fn ensure_label(field: &str, value: &str) -> Result<()> {
    let valid = value
        .bytes()
        .next()
        .is_some_and(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
        && value
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'.');
    if !valid {
        return Err(ConfigError::validation(format!(
            "{field} {value:?} must contain only lowercase letters, digits, '-' and '.'"
        )));
    }
    Ok(())
}
