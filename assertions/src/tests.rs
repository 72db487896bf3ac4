use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use miette::Diagnostic as _;
use serde_json::json;
use sharr_document::{
    Condition, ConditionName, LogicalId, Mapping, MappingName, Parameter, ParameterName,
    Resource,
};

use super::*;

fn yes_no() -> BTreeSet<String> {
    BTreeSet::from(["yes".to_string(), "no".to_string()])
}

fn fixture() -> Document {
    let toggle = Parameter::builder()
        .name(ParameterName::try_from("CreateAuditBucket").unwrap())
        .kind(ParameterType::String)
        .allowed_values(yes_no())
        .default("no")
        .build();
    let log_group = Parameter::builder()
        .name(ParameterName::try_from("LogGroupName").unwrap())
        .build();
    let guard = Condition::new(
        ConditionName::try_from("createAuditBucketCond").unwrap(),
        ConditionExpr::equals(ParameterName::try_from("CreateAuditBucket").unwrap(), "yes"),
    );

    let bucket = Resource::builder()
        .logical_id(LogicalId::try_from("AuditBucket").unwrap())
        .resource_type("AWS::S3::Bucket")
        .condition(guard.name.clone())
        .deletion_policy(RetentionPolicy::Retain)
        .update_replace_policy(RetentionPolicy::Retain)
        .properties(BTreeMap::from([
            (
                "BucketEncryption".to_string(),
                Value::from_json(json!({
                    "ServerSideEncryptionConfiguration": [
                        { "ServerSideEncryptionByDefault": { "SSEAlgorithm": "AES256" } }
                    ]
                }))
                .unwrap(),
            ),
            ("BucketName".to_string(), Value::string("audit")),
        ]))
        .build();
    let ssm = Resource::builder()
        .logical_id(LogicalId::try_from("LogGroupParameter").unwrap())
        .resource_type("AWS::SSM::Parameter")
        .properties(BTreeMap::from([
            ("Type".to_string(), Value::string("String")),
            ("Value".to_string(), Value::reference("LogGroupName")),
        ]))
        .build();

    Document::builder()
        .parameters(vec![toggle, log_group])
        .conditions(vec![guard])
        .mappings(vec![
            Mapping::new(MappingName::try_from("SourceCode").unwrap())
                .with_entry("General", "S3Bucket", "solutions")
                .with_entry("General", "KeyPrefix", "sharr/v1.5.0"),
        ])
        .resources(vec![bucket, ssm])
        .build()
        .expect("fixture should validate")
}

fn properties(json: serde_json::Value) -> BTreeMap<String, Value> {
    match Value::from_json(json).unwrap() {
        Value::Object(map) => map,
        other => panic!("expected an object, got {other:?}"),
    }
}

#[test]
fn parameter_shape_matches() {
    let doc = fixture();
    let template = Template::new(&doc);
    template
        .has_parameter(
            "CreateAuditBucket",
            ExpectParameter::builder()
                .kind(ParameterType::String)
                .allowed_values(yes_no())
                .default("no")
                .build(),
        )
        .expect("toggle parameter should match");
    template
        .has_parameter("LogGroupName", ExpectParameter::default())
        .expect("existence alone should match");
}

#[test]
fn parameter_default_difference_is_value_mismatch() {
    let doc = fixture();
    let err = Template::new(&doc)
        .has_parameter(
            "CreateAuditBucket",
            ExpectParameter::builder().default("yes").build(),
        )
        .unwrap_err();
    assert_eq!(err.reason, FailureReason::ValueMismatch);
    assert_eq!(err.target_kind, TargetKind::Parameter);
    assert_eq!(err.target_name, "CreateAuditBucket");
    assert!(err.detail.contains("expected default `yes`, found `no`"), "{err}");
}

#[test]
fn parameter_type_and_allowed_values_are_exact() {
    let doc = fixture();
    let template = Template::new(&doc);

    let err = template
        .has_parameter(
            "LogGroupName",
            ExpectParameter::builder().kind(ParameterType::Number).build(),
        )
        .unwrap_err();
    assert_eq!(err.reason, FailureReason::TypeMismatch);

    let err = template
        .has_parameter(
            "CreateAuditBucket",
            ExpectParameter::builder()
                .allowed_values(BTreeSet::from(["yes".to_string()]))
                .build(),
        )
        .unwrap_err();
    assert_eq!(err.reason, FailureReason::ValueMismatch);
    assert!(err.detail.contains("[`no`, `yes`]"), "{err}");
}

#[test]
fn missing_targets_are_not_found() {
    let doc = fixture();
    let template = Template::new(&doc);
    let err = template
        .has_parameter("LoadAFSBP", ExpectParameter::default())
        .unwrap_err();
    assert_eq!(err.reason, FailureReason::NotFound);
    assert_eq!(err.code().unwrap().to_string(), "assertion::not_found");

    let err = template
        .has_resource("Nope", ExpectResource::default())
        .unwrap_err();
    assert_eq!(err.target_kind, TargetKind::Resource);
    assert_eq!(err.reason, FailureReason::NotFound);
}

#[test]
fn condition_expression_is_compared_structurally() {
    let doc = fixture();
    let template = Template::new(&doc);
    let expected =
        ConditionExpr::equals(ParameterName::try_from("CreateAuditBucket").unwrap(), "yes");
    template
        .has_condition("createAuditBucketCond", expected.clone())
        .expect("condition should match");

    let err = template
        .has_condition("createAuditBucketCond", expected.negate())
        .unwrap_err();
    assert_eq!(err.reason, FailureReason::ConditionMismatch);
}

#[test]
fn partial_properties_pass() {
    let doc = fixture();
    Template::new(&doc)
        .has_resource_properties(
            "AuditBucket",
            properties(json!({
                "BucketEncryption": {
                    "ServerSideEncryptionConfiguration": [
                        { "ServerSideEncryptionByDefault": { "SSEAlgorithm": "AES256" } }
                    ]
                }
            })),
        )
        .expect("subset of properties should match");
}

#[test]
fn differing_property_value_is_value_mismatch() {
    let doc = fixture();
    let err = Template::new(&doc)
        .has_resource_properties("AuditBucket", [("BucketName", Value::string("other"))])
        .unwrap_err();
    assert_eq!(err.reason, FailureReason::ValueMismatch);
    assert_eq!(err.code().unwrap().to_string(), "assertion::value_mismatch");
}

#[test]
fn absent_property_is_property_missing() {
    let doc = fixture();
    let err = Template::new(&doc)
        .has_resource_properties("AuditBucket", [("VersioningConfiguration", Value::bool(true))])
        .unwrap_err();
    assert_eq!(err.reason, FailureReason::PropertyMissing);
}

#[test]
fn literal_where_reference_expected_is_property_mismatch() {
    let doc = fixture();
    let err = Template::new(&doc)
        .has_resource_properties("LogGroupParameter", [("Value", Value::string("LogGroupName"))])
        .unwrap_err();
    assert_eq!(err.reason, FailureReason::PropertyMismatch);
    assert!(err.help().is_some());
}

#[test]
fn guard_expectations() {
    let doc = fixture();
    let template = Template::new(&doc);

    let when = ExpectResource::builder()
        .guard(Guard::when("createAuditBucketCond").unwrap())
        .build();
    template.has_resource("AuditBucket", when.clone()).unwrap();

    let err = template
        .has_resource("LogGroupParameter", when)
        .unwrap_err();
    assert_eq!(err.reason, FailureReason::ConditionMismatch);
    assert!(
        err.detail
            .contains("expected condition `createAuditBucketCond`, found no condition"),
        "{err}"
    );

    let unconditional = ExpectResource::builder().guard(Guard::Unconditional).build();
    template
        .has_resource("LogGroupParameter", unconditional.clone())
        .unwrap();
    let err = template
        .has_resource("AuditBucket", unconditional)
        .unwrap_err();
    assert_eq!(err.reason, FailureReason::ConditionMismatch);

    template
        .has_resource("AuditBucket", ExpectResource::default())
        .expect("any guard should match");
}

#[test]
fn resource_type_and_retention() {
    let doc = fixture();
    let template = Template::new(&doc);
    template
        .has_resource(
            "AuditBucket",
            ExpectResource::builder()
                .resource_type("AWS::S3::Bucket")
                .deletion_policy(RetentionPolicy::Retain)
                .update_replace_policy(RetentionPolicy::Retain)
                .build(),
        )
        .unwrap();

    let err = template
        .has_resource(
            "AuditBucket",
            ExpectResource::builder()
                .resource_type("AWS::S3::BucketPolicy")
                .build(),
        )
        .unwrap_err();
    assert_eq!(err.reason, FailureReason::TypeMismatch);

    let err = template
        .has_resource(
            "LogGroupParameter",
            ExpectResource::builder()
                .deletion_policy(RetentionPolicy::Retain)
                .build(),
        )
        .unwrap_err();
    assert_eq!(err.reason, FailureReason::ValueMismatch);
    assert!(err.detail.contains("DeletionPolicy"), "{err}");
}

#[test]
fn mapping_entries() {
    let doc = fixture();
    let template = Template::new(&doc);
    template
        .has_mapping(
            "SourceCode",
            ExpectMapping::new().with_entry("General", "S3Bucket", "solutions"),
        )
        .unwrap();

    let err = template
        .has_mapping(
            "SourceCode",
            ExpectMapping::new().with_entry("General", "Region", "us-east-1"),
        )
        .unwrap_err();
    assert_eq!(err.reason, FailureReason::PropertyMissing);
    assert!(err.detail.contains("General.Region"), "{err}");
}

#[test]
fn counts_and_lookup_by_type() {
    let doc = fixture();
    let template = Template::new(&doc);
    template.resource_count_is("AWS::S3::Bucket", 1).unwrap();
    let err = template
        .resource_count_is("AWS::KMS::Key", 1)
        .unwrap_err();
    assert_eq!(err.target_name, "AWS::KMS::Key");
    assert!(err.detail.contains("found 0"), "{err}");

    let found = template.find_resources("AWS::SSM::Parameter");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].logical_id.as_str(), "LogGroupParameter");
}

#[test]
fn check_all_collects_every_failure() {
    let doc = fixture();
    let assertions = vec![
        Assertion::Parameter {
            name: "Missing".to_string(),
            expect: ExpectParameter::default(),
        },
        Assertion::Resource {
            name: "AuditBucket".to_string(),
            expect: ExpectResource::default(),
        },
        Assertion::Resource {
            name: "LogGroupParameter".to_string(),
            expect: ExpectResource::builder()
                .resource_type("AWS::S3::Bucket")
                .build(),
        },
    ];
    let report = check_all(&doc, &assertions);
    assert_eq!(report.checked, 3);
    assert_eq!(report.passed(), 1);
    assert!(!report.is_success());
    let reasons = report
        .failures
        .iter()
        .map(|f| f.reason)
        .collect::<Vec<_>>();
    assert_eq!(
        reasons,
        vec![FailureReason::NotFound, FailureReason::TypeMismatch]
    );
}

#[test]
fn assertions_share_the_document_across_threads() {
    let doc = fixture();
    let assertions = parse_assertions(
        r#"{
          parameters: { CreateAuditBucket: { default: "no" }, LogGroupName: {} },
          resources: {
            AuditBucket: { condition: "createAuditBucketCond" },
            LogGroupParameter: { condition: null, properties: { Value: { Ref: "LogGroupName" } } },
          },
        }"#,
    )
    .unwrap();

    let shared = &doc;
    let outcomes = std::thread::scope(|scope| {
        let handles = assertions
            .iter()
            .map(|assertion| scope.spawn(move || check(shared, assertion)))
            .collect::<Vec<_>>();
        handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .collect::<Vec<_>>()
    });
    assert_eq!(outcomes.len(), 4);
    assert!(outcomes.iter().all(Result::is_ok), "{outcomes:?}");
    assert_eq!(doc, fixture());
}

#[test]
fn assertion_file_sections_and_guards() {
    let assertions = parse_assertions(
        r#"{
          // every section is optional
          parameters: { CreateAuditBucket: { type: "String", allowedValues: ["yes", "no"], default: "no" } },
          conditions: { createAuditBucketCond: { "Fn::Equals": [{ Ref: "CreateAuditBucket" }, "yes"] } },
          mappings: { SourceCode: { General: { S3Bucket: "solutions" } } },
          resources: {
            AuditBucket: { type: "AWS::S3::Bucket", deletionPolicy: "Retain" },
            LogGroupParameter: { condition: null },
          },
        }"#,
    )
    .unwrap();
    assert_eq!(assertions.len(), 5);
    assert_eq!(
        assertions
            .iter()
            .map(Assertion::target_kind)
            .collect::<Vec<_>>(),
        vec![
            TargetKind::Parameter,
            TargetKind::Condition,
            TargetKind::Mapping,
            TargetKind::Resource,
            TargetKind::Resource,
        ]
    );

    let Assertion::Resource { expect, .. } = &assertions[3] else {
        panic!("expected a resource assertion");
    };
    assert_eq!(expect.guard, Guard::Any);
    assert_eq!(expect.deletion_policy, Some(RetentionPolicy::Retain));
    let Assertion::Resource { expect, .. } = &assertions[4] else {
        panic!("expected a resource assertion");
    };
    assert_eq!(expect.guard, Guard::Unconditional);

    let report = check_all(&fixture(), &assertions);
    assert!(report.is_success(), "{:?}", report.failures);
}

#[test]
fn assertion_file_errors() {
    let err = parse_assertions("{ outputs: {} }").unwrap_err();
    assert!(matches!(err, AssertionFileError::Parse { .. }), "{err}");

    let err = parse_assertions(r#"{ conditions: { c: { "Fn::Equals": ["a", "b"] } } }"#)
        .unwrap_err();
    assert!(
        matches!(err, AssertionFileError::InvalidCondition { ref name, .. } if name == "c"),
        "{err}"
    );

    let err = parse_assertions(r#"{ resources: { A: { condition: "not-a-name" } } }"#)
        .unwrap_err();
    assert!(matches!(err, AssertionFileError::InvalidGuard { .. }), "{err}");

    let err = parse_assertions(r#"{ parameters: { A: {}, A: {} } }"#).unwrap_err();
    assert!(matches!(err, AssertionFileError::Parse { .. }), "{err}");
}

#[test]
fn assertion_file_syntax_errors_point_at_the_source() {
    let source = "{\n  parameters: {\n    LoadSC: { default: yes },\n  },\n}";
    let err = parse_assertions_named("member.json5", Arc::from(source)).unwrap_err();
    let AssertionFileError::Parse { message, .. } = &err else {
        panic!("expected a parse error, got {err}");
    };
    assert!(!message.contains('\n'), "{message}");

    let label = err
        .labels()
        .and_then(|mut labels| labels.next())
        .expect("parse errors carry a label");
    let line = source[..label.offset()].lines().count();
    assert_eq!(line, 3, "label at {}", label.offset());
    assert!(err.source_code().is_some());
}
