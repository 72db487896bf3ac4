use std::collections::BTreeMap;

use miette::Diagnostic as _;
use serde_json::json;
use sharr_config::{Playbook, SolutionConfig};
use sharr_document::{EvalError, Resource, RetentionPolicy};
use sharr_template::Value;

use super::*;

fn toggles(entries: &[(&str, bool)]) -> BTreeMap<String, bool> {
    entries
        .iter()
        .map(|(name, on)| (name.to_string(), *on))
        .collect()
}

fn values(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn composing_twice_gives_equal_documents() {
    let solution = SolutionConfig::default();
    let overrides = toggles(&[("LoadCIS120", false)]);
    let first = compose(&solution, &overrides, &[]).unwrap();
    let second = compose(&solution, &overrides, &[]).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.to_json(), second.to_json());
}

#[test]
fn toggle_emits_yes_no_parameter_and_condition() {
    let mut composer = Composer::new();
    composer.toggle(Toggle::new("CreateAuditBucket", false).unwrap());
    let doc = composer.compose(&BTreeMap::new()).unwrap();

    let json = doc.to_json();
    assert_eq!(
        json["Parameters"]["CreateAuditBucket"],
        json!({ "Type": "String", "AllowedValues": ["no", "yes"], "Default": "no" })
    );
    assert_eq!(
        json["Conditions"]["createAuditBucketCond"],
        json!({ "Fn::Equals": [{ "Ref": "CreateAuditBucket" }, "yes"] })
    );
}

#[test]
fn condition_names_lowercase_the_first_letter() {
    assert_eq!(Toggle::condition_name_for("LoadAFSBP"), "loadAFSBPCond");
    assert_eq!(
        Toggle::condition_name_for("CreateAuditBucket"),
        "createAuditBucketCond"
    );
    assert_eq!(Toggle::condition_name_for("LoadNIST80053"), "loadNIST80053Cond");
}

#[test]
fn duplicate_toggles_collide() {
    let mut composer = Composer::new();
    composer
        .toggle(Toggle::new("LoadAFSBP", true).unwrap())
        .toggle(Toggle::new("LoadAFSBP", false).unwrap());
    let err = composer.compose(&BTreeMap::new()).unwrap_err();
    assert!(
        matches!(
            &err,
            CompositionError::Document(sharr_document::Error::DuplicateParameter { name })
                if name == "LoadAFSBP"
        ),
        "unexpected error: {err}"
    );
    assert_eq!(
        err.code().unwrap().to_string(),
        "document::duplicate_parameter"
    );
}

#[test]
fn duplicate_playbooks_are_rejected_before_composition() {
    let solution = SolutionConfig {
        playbooks: vec![Playbook::new("AFSBP"), Playbook::new("AFSBP")],
        ..SolutionConfig::default()
    };
    let err = compose(&solution, &BTreeMap::new(), &[]).unwrap_err();
    assert!(matches!(err, CompositionError::Solution(_)), "{err}");
}

#[test]
fn unknown_toggle_override_fails() {
    let err = compose(
        &SolutionConfig::default(),
        &toggles(&[("LoadXYZ", true)]),
        &[],
    )
    .unwrap_err();
    let CompositionError::UnknownToggle { name, known } = &err else {
        panic!("unexpected error: {err}");
    };
    assert_eq!(name, "LoadXYZ");
    assert!(known.contains("CreateAuditBucket"), "{known}");
    assert!(known.contains("LoadAFSBP"), "{known}");
}

#[test]
fn dangling_reference_fails() {
    let mut composer = Composer::new();
    composer.resource(
        Resource::builder()
            .logical_id(sharr_document::LogicalId::try_from("Alias").unwrap())
            .resource_type("AWS::KMS::Alias")
            .properties(BTreeMap::from([(
                "TargetKeyId".to_string(),
                Value::get_att("MissingKey", "Arn"),
            )]))
            .build(),
    );
    let err = composer.compose(&BTreeMap::new()).unwrap_err();
    assert!(
        matches!(
            err,
            CompositionError::Document(sharr_document::Error::UnknownAttributeTarget { .. })
        ),
        "{err}"
    );
}

#[test]
fn base_parameters_must_not_collide_with_built_ins() {
    let base = Parameter::builder()
        .name(ParameterName::try_from(LOG_GROUP_PARAMETER).unwrap())
        .build();
    let err = compose(&SolutionConfig::default(), &BTreeMap::new(), &[base]).unwrap_err();
    assert!(
        matches!(
            err,
            CompositionError::Document(sharr_document::Error::DuplicateParameter { .. })
        ),
        "{err}"
    );

    let extra = Parameter::builder()
        .name(ParameterName::try_from("Environment").unwrap())
        .default("prod")
        .build();
    let doc = compose(&SolutionConfig::default(), &BTreeMap::new(), &[extra]).unwrap();
    assert_eq!(
        doc.parameter("Environment").unwrap().default.as_deref(),
        Some("prod")
    );
}

#[test]
fn audit_bucket_condition_holds_only_for_explicit_yes() {
    let doc = compose(&SolutionConfig::default(), &BTreeMap::new(), &[]).unwrap();
    assert_eq!(
        doc.parameter(AUDIT_BUCKET_TOGGLE).unwrap().default.as_deref(),
        Some(NO)
    );

    let defaults = doc.bind(&BTreeMap::new()).unwrap();
    assert!(!doc.condition_holds("createAuditBucketCond", &defaults).unwrap());

    let no = doc.bind(&values(&[("CreateAuditBucket", "no")])).unwrap();
    assert!(!doc.condition_holds("createAuditBucketCond", &no).unwrap());

    let yes = doc.bind(&values(&[("CreateAuditBucket", "yes")])).unwrap();
    assert!(doc.condition_holds("createAuditBucketCond", &yes).unwrap());

    let err = doc
        .bind(&values(&[("CreateAuditBucket", "true")]))
        .unwrap_err();
    assert!(matches!(err, EvalError::DisallowedValue { .. }), "{err}");
}

#[test]
fn toggle_override_changes_only_the_default() {
    let doc = compose(
        &SolutionConfig::default(),
        &toggles(&[("CreateAuditBucket", true), ("LoadSC", false)]),
        &[],
    )
    .unwrap();
    assert_eq!(
        doc.parameter("CreateAuditBucket").unwrap().default.as_deref(),
        Some(YES)
    );
    assert_eq!(doc.parameter("LoadSC").unwrap().default.as_deref(), Some(NO));

    // gated resources stay in the document either way
    assert!(doc.resource(&playbook_stack_id("SC")).is_some());
    let bindings = doc.bind(&BTreeMap::new()).unwrap();
    let active = doc
        .active_resources(&bindings)
        .unwrap()
        .into_iter()
        .map(|r| r.logical_id.as_str())
        .collect::<Vec<_>>();
    assert!(active.contains(&AUDIT_BUCKET));
    assert!(!active.contains(&"PlaybookMemberStackSC"));
    assert!(active.contains(&"PlaybookMemberStackAFSBP"));
}

#[test]
fn playbook_template_url_resolves_under_prefix_and_version() {
    let solution = SolutionConfig::default();
    let doc = compose(&solution, &BTreeMap::new(), &[]).unwrap();
    let stack = doc.resource(&playbook_stack_id("AFSBP")).unwrap();
    let bindings = doc.bind(&BTreeMap::new()).unwrap();

    let url = doc
        .resolve_string(stack.property("TemplateURL").unwrap(), &bindings)
        .unwrap();
    assert_eq!(
        url,
        format!(
            "{}/{}/playbooks/AFSBPMemberStack.template",
            solution.distribution_prefix(),
            solution.version
        )
    );
    assert_eq!(
        url,
        solution
            .template_url("playbooks/AFSBPMemberStack.template")
            .unwrap()
            .as_str()
    );
}

#[test]
fn custom_solution_values_flow_into_the_document() {
    let solution = SolutionConfig {
        solution_id: "SO9999".to_string(),
        version: "v2.0.1".to_string(),
        distribution_bucket: "my-dist".to_string(),
        playbooks: vec![Playbook {
            enabled_by_default: false,
            ..Playbook::new("Custom")
        }],
        ..SolutionConfig::default()
    };
    let doc = compose(&solution, &BTreeMap::new(), &[]).unwrap();
    assert_eq!(doc.parameter("LoadCustom").unwrap().default.as_deref(), Some(NO));
    assert_eq!(
        doc.resources_of_type("AWS::CloudFormation::Stack").count(),
        2
    );

    let bindings = doc.bind(&BTreeMap::new()).unwrap();
    let runbook = doc.resource(RUNBOOK_STACK).unwrap();
    assert_eq!(
        doc.resolve_string(runbook.property("TemplateURL").unwrap(), &bindings)
            .unwrap(),
        "https://my-dist-reference.s3.amazonaws.com/\
         aws-security-hub-automated-response-and-remediation/v2.0.1/\
         aws-sharr-remediations.template"
    );
    let alias = doc.resource(KEY_ALIAS).unwrap();
    assert_eq!(
        alias.property("AliasName"),
        Some(&Value::string("alias/SO9999-SHARR-Remediation-Key"))
    );
}

#[test]
fn key_material_and_bucket_are_retained() {
    let doc = compose(&SolutionConfig::default(), &BTreeMap::new(), &[]).unwrap();
    for id in [REMEDIATION_KEY, AUDIT_BUCKET] {
        let resource = doc.resource(id).unwrap();
        assert_eq!(resource.deletion_policy, Some(RetentionPolicy::Retain), "{id}");
        assert_eq!(
            resource.update_replace_policy,
            Some(RetentionPolicy::Retain),
            "{id}"
        );
    }
    assert!(doc.resource(KEY_ALIAS).unwrap().deletion_policy.is_none());
}

#[test]
fn serialized_template_has_every_section() {
    let doc = compose(&SolutionConfig::default(), &BTreeMap::new(), &[]).unwrap();
    let json = doc.to_json();
    for section in [
        "AWSTemplateFormatVersion",
        "Description",
        "Parameters",
        "Conditions",
        "Mappings",
        "Resources",
    ] {
        assert!(json.get(section).is_some(), "missing {section}");
    }
    assert_eq!(
        json["Mappings"]["SourceCode"]["General"]["KeyPrefix"],
        json!("aws-security-hub-automated-response-and-remediation/v1.5.0")
    );
    assert_eq!(
        json["Resources"]["PlaybookMemberStackAFSBP"]["DependsOn"],
        json!(["RunbookStackNoRoles"])
    );

    let reparsed = sharr_document::Document::from_json(&json).unwrap();
    assert_eq!(reparsed, doc);
}
