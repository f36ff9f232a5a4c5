// Rule sets, definitions and controllers spread over several manifest files
use openapi_from_metadata::config::{BuildConfig, UnresolvedRuleSetPolicy};
use openapi_from_metadata::error::Error;
use openapi_from_metadata::generator::{BuildReport, DocumentGenerator};
use openapi_from_metadata::metadata::Catalog;
use openapi_from_metadata::parser::{Manifest, ManifestParser};
use openapi_from_metadata::rule_set::RuleSetIndex;
use openapi_from_metadata::scanner::FileScanner;
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;

const ORDER_CONTROLLER: &str = r#"
controllers:
  - class: OrderController
    prefix: /orders
    routes:
      - action: create
        methods: [POST]
        declarations:
          - kind: validation
            rule_set: OrderValidate
            scene: create
          - kind: response
            ref: Order
      - action: list
        methods: [GET]
        declarations:
          - kind: validation
            rule_set: OrderValidate
"#;

const ORDER_RULES: &str = r#"
rule_sets:
  - name: OrderValidate
    rules:
      sku: required|string
      quantity: required|integer|min:1
      "address.city|城市": string
    scenes:
      create: [sku, quantity, address.city]
"#;

const ORDER_DEFINITIONS: &str = r#"
definitions:
  - name: Order
    properties:
      "id|订单号": 1001
      status: paid
"#;

fn write_project(files: &[(&str, &str)]) -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    for (name, content) in files {
        let path = temp_dir.path().join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }
    temp_dir
}

fn build(files: &[(&str, &str)], config: &BuildConfig) -> BuildReport {
    let project = write_project(files);
    let scan_result = FileScanner::new(project.path().to_path_buf()).scan().unwrap();
    let manifests: Vec<Manifest> = ManifestParser::parse_files(&scan_result.manifest_files)
        .into_iter()
        .map(|r| r.unwrap().manifest)
        .collect();

    let catalog = Catalog::from_manifests(&manifests);
    let rule_sets = RuleSetIndex::from_manifests(&manifests);
    DocumentGenerator::new(config, &catalog, &rule_sets)
        .build_all()
        .unwrap()
}

#[test]
fn test_rule_set_resolved_from_another_file() {
    let report = build(
        &[
            ("controllers/order.yaml", ORDER_CONTROLLER),
            ("rules/order.yaml", ORDER_RULES),
            ("definitions.yaml", ORDER_DEFINITIONS),
        ],
        &BuildConfig::default(),
    );

    let doc = serde_json::to_value(report.document("http").unwrap()).unwrap();
    let create = &doc["paths"]["/orders"]["post"];
    let schema = &create["requestBody"]["content"]["application/json"]["schema"];

    assert_eq!(schema["required"], json!(["sku", "quantity"]));
    assert_eq!(schema["properties"]["quantity"]["type"], "integer");
    assert_eq!(
        schema["properties"]["address"]["properties"]["city"]["description"],
        "城市"
    );
    assert_eq!(
        create["responses"]["200"]["content"]["application/json"]["schema"],
        json!({"$ref": "#/components/schemas/Order"})
    );
    assert_eq!(
        doc["components"]["schemas"]["Order"]["properties"]["id"],
        json!({"type": "integer", "description": "订单号", "default": 1001})
    );
}

#[test]
fn test_rule_set_without_scene_uses_all_rules() {
    let report = build(
        &[("order.yaml", ORDER_CONTROLLER), ("rules.yaml", ORDER_RULES)],
        &BuildConfig::default(),
    );

    let document = report.document("http").unwrap();
    let list = document.paths["/orders"].get.as_ref().unwrap();
    let names: Vec<&str> = list.parameters.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["sku", "quantity", "address.city"]);
    assert!(list.parameters.iter().all(|p| p.location == "query"));
}

#[test]
fn test_missing_rule_set_skips_route_by_default() {
    let report = build(&[("order.yaml", ORDER_CONTROLLER)], &BuildConfig::default());

    let outcome = report.outcome("http").unwrap();
    let document = outcome.result.as_ref().unwrap();
    assert!(document.paths.is_empty());
    assert_eq!(outcome.diagnostics.len(), 2);
    assert!(outcome.diagnostics[0].message.contains("OrderValidate"));
}

#[test]
fn test_missing_rule_set_aborts_group_when_configured() {
    let config = BuildConfig {
        on_unresolved_rule_set: UnresolvedRuleSetPolicy::Abort,
        ..Default::default()
    };
    let report = build(&[("order.yaml", ORDER_CONTROLLER)], &config);

    assert!(report.has_failures());
    let outcome = report.outcome("http").unwrap();
    assert!(matches!(
        outcome.result,
        Err(Error::UnresolvedRuleSet { .. })
    ));
}

#[test]
fn test_conflicting_definitions_across_files_fail_the_group() {
    let other = r#"
definitions:
  - name: Order
    properties:
      id: "A-1"
"#;
    let report = build(
        &[
            ("a.yaml", ORDER_DEFINITIONS),
            ("b.yaml", other),
            ("order.yaml", ORDER_CONTROLLER),
            ("rules.yaml", ORDER_RULES),
        ],
        &BuildConfig::default(),
    );

    let outcome = report.outcome("http").unwrap();
    assert!(matches!(
        &outcome.result,
        Err(Error::DefinitionConflict { name }) if name == "Order"
    ));
}

#[test]
fn test_first_rule_set_wins_across_files() {
    let shadow = r#"
rule_sets:
  - name: OrderValidate
    rules:
      ignored: string
"#;
    let report = build(
        &[
            ("a_rules.yaml", ORDER_RULES),
            ("b_rules.yaml", shadow),
            ("order.yaml", ORDER_CONTROLLER),
        ],
        &BuildConfig::default(),
    );

    let document = report.document("http").unwrap();
    let list = document.paths["/orders"].get.as_ref().unwrap();
    assert!(list.parameters.iter().all(|p| p.name != "ignored"));
    assert_eq!(list.parameters.len(), 3);
}
