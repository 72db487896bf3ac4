use sharr_document::{
    Condition, ConditionExpr, ConditionName, Document, Error, LogicalId, Parameter, ParameterName,
    ParameterType, Resource, RetentionPolicy,
};
use sharr_template::Value;
use bon::{map, set};

#[test]
fn document_builder_constructs_a_valid_document() {
    let parameter = Parameter::builder()
        .name(ParameterName::try_from("CreateAuditBucket").unwrap())
        .kind(ParameterType::String)
        .allowed_values(set!["yes", "no"])
        .default("no")
        .description("Create an S3 bucket for audit logging")
        .build();

    let condition = Condition::new(
        ConditionName::try_from("createAuditBucketCond").unwrap(),
        ConditionExpr::equals(parameter.name.clone(), "yes"),
    );

    let bucket = Resource::builder()
        .logical_id(LogicalId::try_from("S3BucketForAuditLogging").unwrap())
        .resource_type("AWS::S3::Bucket")
        .condition(condition.name.clone())
        .properties(map! {
            "BucketEncryption": Value::object([(
                "ServerSideEncryptionConfiguration",
                Value::array([Value::object([(
                    "ServerSideEncryptionByDefault",
                    Value::object([("SSEAlgorithm", Value::string("AES256"))]),
                )])]),
            )]),
        })
        .deletion_policy(RetentionPolicy::Retain)
        .update_replace_policy(RetentionPolicy::Retain)
        .build();

    let doc = Document::builder()
        .parameters(vec![parameter])
        .conditions(vec![condition])
        .resources(vec![bucket])
        .build()
        .expect("builder should produce a valid document");

    assert_eq!(doc.parameters().len(), 1);
    let bucket = doc
        .resource("S3BucketForAuditLogging")
        .expect("bucket should exist");
    assert_eq!(
        bucket.condition.as_ref().map(ConditionName::as_str),
        Some("createAuditBucketCond")
    );
    assert_eq!(bucket.deletion_policy, Some(RetentionPolicy::Retain));
}

#[test]
fn document_builder_rejects_dependency_on_missing_resource() {
    let alias = Resource::builder()
        .logical_id(LogicalId::try_from("KeyAlias").unwrap())
        .resource_type("AWS::KMS::Alias")
        .depends_on(vec![LogicalId::try_from("Key").unwrap()])
        .build();

    let err = Document::builder()
        .resources(vec![alias])
        .build()
        .unwrap_err();

    assert!(matches!(err, Error::UnknownDependency { .. }));
}

#[test]
fn document_builder_rejects_reference_to_undeclared_name() {
    let param = Resource::builder()
        .logical_id(LogicalId::try_from("LogGroupParameter").unwrap())
        .resource_type("AWS::SSM::Parameter")
        .properties(map! {
            "Value": Value::reference("LogGroupName"),
        })
        .build();

    let err = Document::builder()
        .resources(vec![param])
        .build()
        .unwrap_err();

    assert!(matches!(err, Error::UnknownReference { ref target, .. } if target == "LogGroupName"));
}
