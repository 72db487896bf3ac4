use std::collections::BTreeMap;

use sharr_config::{Playbook, SolutionConfig};
use sharr_document::{
    ConditionName, Document, LogicalId, Mapping, MappingName, Parameter, ParameterName,
    ParameterType, Resource, RetentionPolicy,
};
use sharr_template::Value;

use crate::{Composer, CompositionError, Toggle};

pub const SEC_HUB_ADMIN_PARAMETER: &str = "SecHubAdminAccount";
pub const LOG_GROUP_PARAMETER: &str = "LogGroupName";
pub const AUDIT_BUCKET_TOGGLE: &str = "CreateAuditBucket";

pub const SOURCE_CODE_MAPPING: &str = "SourceCode";
pub const SOLUTION_INFO_MAPPING: &str = "SolutionInfo";

pub const LOG_GROUP_SSM_PARAMETER: &str = "SSMParameterLogGroupName";
pub const ADMIN_ACCOUNT_PARAMETER: &str = "SSMParameterSecHubAdminAccount";
pub const REMEDIATION_KEY: &str = "SHARRRemediationKey";
pub const KEY_ALIAS: &str = "SHARRRemediationKeyAlias";
pub const KEY_ARN_PARAMETER: &str = "SHARRKeyArnParameter";
pub const AUDIT_BUCKET: &str = "S3BucketForAuditLogging";
pub const AUDIT_BUCKET_POLICY: &str = "S3BucketForAuditLoggingPolicy";
pub const AUDIT_BUCKET_NAME_PARAMETER: &str = "SSMParameterForAuditBucketName";
pub const RUNBOOK_STACK: &str = "RunbookStackNoRoles";
pub const RUNBOOK_TEMPLATE: &str = "aws-sharr-remediations.template";

const NESTED_STACK: &str = "AWS::CloudFormation::Stack";
const SSM_PARAMETER: &str = "AWS::SSM::Parameter";

pub fn playbook_stack_id(playbook: &str) -> String {
    format!("PlaybookMemberStack{playbook}")
}

fn id(name: &str) -> Result<LogicalId, CompositionError> {
    Ok(LogicalId::try_from(name)?)
}

fn props<const N: usize>(entries: [(&str, Value); N]) -> BTreeMap<String, Value> {
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// The member account stack: shared key material, logging parameters, the
/// optional audit bucket and one nested stack per playbook.
#[derive(Clone, Debug)]
pub struct MemberStack {
    solution: SolutionConfig,
}

impl MemberStack {
    pub fn new(solution: SolutionConfig) -> Self {
        Self { solution }
    }

    pub fn compose(
        &self,
        toggles: &BTreeMap<String, bool>,
        base_parameters: &[Parameter],
    ) -> Result<Document, CompositionError> {
        let mut composer = self.composer()?;
        for parameter in base_parameters {
            composer.parameter(parameter.clone());
        }
        composer.compose(toggles)
    }

    /// Declarations of the member stack, before any caller additions.
    pub fn composer(&self) -> Result<Composer, CompositionError> {
        self.solution.validate()?;

        let mut composer = Composer::new();
        composer.description(self.solution.description());

        composer.toggle(
            Toggle::new(AUDIT_BUCKET_TOGGLE, false)?
                .with_description("Create an S3 bucket to receive audit logs from remediations"),
        );
        for playbook in &self.solution.playbooks {
            composer.toggle(Self::playbook_toggle(playbook)?);
        }

        composer
            .parameter(
                Parameter::builder()
                    .name(ParameterName::try_from(SEC_HUB_ADMIN_PARAMETER)?)
                    .kind(ParameterType::String)
                    .description("Admin account number")
                    .allowed_pattern(r"^\d{12}$")
                    .build(),
            )
            .parameter(
                Parameter::builder()
                    .name(ParameterName::try_from(LOG_GROUP_PARAMETER)?)
                    .kind(ParameterType::String)
                    .description(
                        "Name of the log group used to create metric filters and alarms for \
                         remediation activity",
                    )
                    .build(),
            );

        composer
            .mapping(
                Mapping::new(MappingName::try_from(SOURCE_CODE_MAPPING)?)
                    .with_entry("General", "S3Bucket", self.solution.distribution_bucket.as_str())
                    .with_entry("General", "KeyPrefix", self.solution.key_prefix()),
            )
            .mapping(
                Mapping::new(MappingName::try_from(SOLUTION_INFO_MAPPING)?)
                    .with_entry("Data", "SolutionId", self.solution.solution_id.as_str())
                    .with_entry("Data", "Version", self.solution.version.as_str()),
            );

        composer.resource(self.log_group_parameter()?);
        composer.resource(self.admin_account_parameter()?);
        for resource in self.key_material()? {
            composer.resource(resource);
        }
        for resource in self.audit_bucket()? {
            composer.resource(resource);
        }
        composer.resource(self.runbook_stack()?);
        for playbook in &self.solution.playbooks {
            composer.resource(self.playbook_stack(playbook)?);
        }

        Ok(composer)
    }

    fn playbook_toggle(playbook: &Playbook) -> Result<Toggle, CompositionError> {
        let toggle = Toggle::new(&playbook.toggle_name(), playbook.enabled_by_default)?;
        Ok(match &playbook.description {
            Some(description) => toggle.with_description(description.clone()),
            None => toggle,
        })
    }

    fn ssm_name(&self, suffix: &str) -> Value {
        Value::string(format!("{}/{suffix}", self.solution.ssm_prefix()))
    }

    fn log_group_parameter(&self) -> Result<Resource, CompositionError> {
        Ok(Resource::builder()
            .logical_id(id(LOG_GROUP_SSM_PARAMETER)?)
            .resource_type(SSM_PARAMETER)
            .properties(props([
                ("Name", self.ssm_name("Metrics_LogGroupName")),
                ("Description", Value::string("Log group for remediation metrics")),
                ("Type", Value::string("String")),
                ("Value", Value::reference(LOG_GROUP_PARAMETER)),
            ]))
            .build())
    }

    fn admin_account_parameter(&self) -> Result<Resource, CompositionError> {
        Ok(Resource::builder()
            .logical_id(id(ADMIN_ACCOUNT_PARAMETER)?)
            .resource_type(SSM_PARAMETER)
            .properties(props([
                ("Name", self.ssm_name("SecHubAdmin")),
                ("Description", Value::string("Security Hub administrator account")),
                ("Type", Value::string("String")),
                ("Value", Value::reference(SEC_HUB_ADMIN_PARAMETER)),
            ]))
            .build())
    }

    fn key_material(&self) -> Result<Vec<Resource>, CompositionError> {
        let account_root = Value::join(
            "",
            [
                Value::string("arn:"),
                Value::reference("AWS::Partition"),
                Value::string(":iam::"),
                Value::reference("AWS::AccountId"),
                Value::string(":root"),
            ],
        );
        let regional_logs = Value::join(
            "",
            [
                Value::string("logs."),
                Value::reference("AWS::Region"),
                Value::string("."),
                Value::reference("AWS::URLSuffix"),
            ],
        );
        let key_policy = Value::object([
            ("Version", Value::string("2012-10-17")),
            (
                "Statement",
                Value::array([
                    Value::object([
                        ("Sid", Value::string("EnableIAMUserPermissions")),
                        ("Effect", Value::string("Allow")),
                        ("Principal", Value::object([("AWS", account_root)])),
                        ("Action", Value::string("kms:*")),
                        ("Resource", Value::string("*")),
                    ]),
                    Value::object([
                        ("Sid", Value::string("AllowLogsToUseKey")),
                        ("Effect", Value::string("Allow")),
                        ("Principal", Value::object([("Service", regional_logs)])),
                        (
                            "Action",
                            Value::array(
                                [
                                    "kms:Encrypt*",
                                    "kms:Decrypt*",
                                    "kms:ReEncrypt*",
                                    "kms:GenerateDataKey*",
                                    "kms:Describe*",
                                ]
                                .map(Value::string),
                            ),
                        ),
                        ("Resource", Value::string("*")),
                    ]),
                ]),
            ),
        ]);

        let key = Resource::builder()
            .logical_id(id(REMEDIATION_KEY)?)
            .resource_type("AWS::KMS::Key")
            .properties(props([
                (
                    "Description",
                    Value::string(format!(
                        "{} remediation data encryption key",
                        self.solution.solution_id
                    )),
                ),
                ("EnableKeyRotation", Value::bool(true)),
                ("KeyPolicy", key_policy),
            ]))
            .deletion_policy(RetentionPolicy::Retain)
            .update_replace_policy(RetentionPolicy::Retain)
            .build();

        let alias = Resource::builder()
            .logical_id(id(KEY_ALIAS)?)
            .resource_type("AWS::KMS::Alias")
            .properties(props([
                (
                    "AliasName",
                    Value::string(format!(
                        "alias/{}-SHARR-Remediation-Key",
                        self.solution.solution_id
                    )),
                ),
                ("TargetKeyId", Value::get_att(REMEDIATION_KEY, "Arn")),
            ]))
            .build();

        let arn = Resource::builder()
            .logical_id(id(KEY_ARN_PARAMETER)?)
            .resource_type(SSM_PARAMETER)
            .properties(props([
                ("Name", self.ssm_name("CMK_REMEDIATION_ARN")),
                (
                    "Description",
                    Value::string("KMS Customer Managed Key that will encrypt data for remediations"),
                ),
                ("Type", Value::string("String")),
                ("Value", Value::get_att(REMEDIATION_KEY, "Arn")),
            ]))
            .build();

        Ok(vec![key, alias, arn])
    }

    fn audit_bucket(&self) -> Result<Vec<Resource>, CompositionError> {
        let guard = ConditionName::new(Toggle::condition_name_for(AUDIT_BUCKET_TOGGLE))?;
        let bucket_arn = Value::get_att(AUDIT_BUCKET, "Arn");
        let bucket_objects = Value::join("", [bucket_arn.clone(), Value::string("/*")]);

        let bucket = Resource::builder()
            .logical_id(id(AUDIT_BUCKET)?)
            .resource_type("AWS::S3::Bucket")
            .condition(guard.clone())
            .properties(props([
                (
                    "BucketEncryption",
                    Value::object([(
                        "ServerSideEncryptionConfiguration",
                        Value::array([Value::object([(
                            "ServerSideEncryptionByDefault",
                            Value::object([("SSEAlgorithm", Value::string("AES256"))]),
                        )])]),
                    )]),
                ),
                (
                    "PublicAccessBlockConfiguration",
                    Value::object([
                        ("BlockPublicAcls", Value::bool(true)),
                        ("BlockPublicPolicy", Value::bool(true)),
                        ("IgnorePublicAcls", Value::bool(true)),
                        ("RestrictPublicBuckets", Value::bool(true)),
                    ]),
                ),
            ]))
            .deletion_policy(RetentionPolicy::Retain)
            .update_replace_policy(RetentionPolicy::Retain)
            .build();

        let policy = Resource::builder()
            .logical_id(id(AUDIT_BUCKET_POLICY)?)
            .resource_type("AWS::S3::BucketPolicy")
            .condition(guard.clone())
            .properties(props([
                ("Bucket", Value::reference(AUDIT_BUCKET)),
                (
                    "PolicyDocument",
                    Value::object([
                        ("Version", Value::string("2012-10-17")),
                        (
                            "Statement",
                            Value::array([
                                Value::object([
                                    ("Sid", Value::string("AllowAuditLogDelivery")),
                                    ("Effect", Value::string("Allow")),
                                    (
                                        "Principal",
                                        Value::object([(
                                            "Service",
                                            Value::string("redshift.amazonaws.com"),
                                        )]),
                                    ),
                                    (
                                        "Action",
                                        Value::array(
                                            ["s3:GetBucketAcl", "s3:PutObject"].map(Value::string),
                                        ),
                                    ),
                                    (
                                        "Resource",
                                        Value::array([bucket_arn.clone(), bucket_objects.clone()]),
                                    ),
                                ]),
                                Value::object([
                                    ("Sid", Value::string("EnforceSecureTransport")),
                                    ("Effect", Value::string("Deny")),
                                    ("Principal", Value::string("*")),
                                    ("Action", Value::string("s3:*")),
                                    (
                                        "Condition",
                                        Value::object([(
                                            "Bool",
                                            Value::object([(
                                                "aws:SecureTransport",
                                                Value::string("false"),
                                            )]),
                                        )]),
                                    ),
                                    ("Resource", Value::array([bucket_arn, bucket_objects])),
                                ]),
                            ]),
                        ),
                    ]),
                ),
            ]))
            .build();

        let name = Resource::builder()
            .logical_id(id(AUDIT_BUCKET_NAME_PARAMETER)?)
            .resource_type(SSM_PARAMETER)
            .condition(guard)
            .properties(props([
                ("Name", self.ssm_name("AuditBucketName")),
                ("Description", Value::string("Bucket receiving remediation audit logs")),
                ("Type", Value::string("String")),
                ("Value", Value::reference(AUDIT_BUCKET)),
            ]))
            .build();

        Ok(vec![bucket, policy, name])
    }

    /// `https://<bucket>-reference.s3.amazonaws.com/<namespace>/<version>/<relative>`,
    /// assembled from the `SourceCode` mapping so the bucket and prefix stay
    /// in one place.
    fn template_url(relative: &str) -> Value {
        Value::join(
            "",
            [
                Value::string("https://"),
                Value::find_in_map(SOURCE_CODE_MAPPING, "General", "S3Bucket"),
                Value::string(format!("{}/", sharr_config::REFERENCE_HOST_SUFFIX)),
                Value::find_in_map(SOURCE_CODE_MAPPING, "General", "KeyPrefix"),
                Value::string(format!("/{relative}")),
            ],
        )
    }

    fn runbook_stack(&self) -> Result<Resource, CompositionError> {
        Ok(Resource::builder()
            .logical_id(id(RUNBOOK_STACK)?)
            .resource_type(NESTED_STACK)
            .properties(props([("TemplateURL", Self::template_url(RUNBOOK_TEMPLATE))]))
            .build())
    }

    fn playbook_stack(&self, playbook: &Playbook) -> Result<Resource, CompositionError> {
        let guard = ConditionName::new(Toggle::condition_name_for(&playbook.toggle_name()))?;
        Ok(Resource::builder()
            .logical_id(LogicalId::new(playbook_stack_id(&playbook.name))?)
            .resource_type(NESTED_STACK)
            .condition(guard)
            .properties(props([
                ("TemplateURL", Self::template_url(&playbook.template)),
                (
                    "Parameters",
                    Value::object([(
                        SEC_HUB_ADMIN_PARAMETER,
                        Value::reference(SEC_HUB_ADMIN_PARAMETER),
                    )]),
                ),
            ]))
            .depends_on(vec![id(RUNBOOK_STACK)?])
            .build())
    }
}
