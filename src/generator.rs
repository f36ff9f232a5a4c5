//! Per-server-group document builds.
//!
//! Every configured group gets its own build with a fresh definition
//! registry and document. A failure inside one group (unbound route,
//! collision, dangling reference) is recorded in that group's outcome and the
//! next group is still built; only configuration-level problems fail the
//! whole call.

use crate::config::{BuildConfig, ServerGroup, UnresolvedRuleSetPolicy};
use crate::error::{Error, Result};
use crate::metadata::{MetadataSource, RouteDescriptor};
use crate::openapi_builder::{OpenApiBuilder, OpenApiDocument, Server, Tag};
use crate::operation_builder::OperationBuilder;
use crate::rule_set::RuleSetResolver;
use crate::schema_generator::SchemaGenerator;
use log::{debug, error, info, warn};
use std::collections::HashSet;

/// Builds one document per server group.
pub struct DocumentGenerator<'a> {
    config: &'a BuildConfig,
    metadata: &'a dyn MetadataSource,
    rule_sets: &'a dyn RuleSetResolver,
}

/// A recovered or skipped per-route condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub route: String,
    pub message: String,
}

/// Result of building a single group
#[derive(Debug)]
pub struct GroupOutcome {
    pub group: String,
    pub result: Result<OpenApiDocument>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Results of all requested groups, in configuration order
#[derive(Debug)]
pub struct BuildReport {
    pub outcomes: Vec<GroupOutcome>,
}

impl Diagnostic {
    fn new(route: &RouteDescriptor, error: &Error) -> Self {
        Self {
            route: route.to_string(),
            message: error.to_string(),
        }
    }
}

impl GroupOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

impl BuildReport {
    pub fn has_failures(&self) -> bool {
        self.outcomes.iter().any(|o| !o.is_success())
    }

    pub fn outcome(&self, group: &str) -> Option<&GroupOutcome> {
        self.outcomes.iter().find(|o| o.group == group)
    }

    /// Document of a group that built successfully
    pub fn document(&self, group: &str) -> Option<&OpenApiDocument> {
        self.outcome(group).and_then(|o| o.result.as_ref().ok())
    }
}

impl<'a> DocumentGenerator<'a> {
    pub fn new(
        config: &'a BuildConfig,
        metadata: &'a dyn MetadataSource,
        rule_sets: &'a dyn RuleSetResolver,
    ) -> Self {
        Self {
            config,
            metadata,
            rule_sets,
        }
    }

    /// Build every configured group.
    ///
    /// # Errors
    ///
    /// Only configuration problems: [`Error::NoServerGroups`] or
    /// [`Error::InvalidConfig`]. Group failures are reported in the outcome.
    pub fn build_all(&self) -> Result<BuildReport> {
        let names: Vec<String> = self.config.servers.iter().map(|s| s.name.clone()).collect();
        self.build_groups(&names)
    }

    /// Build the named groups, in the given order.
    pub fn build_groups(&self, names: &[String]) -> Result<BuildReport> {
        self.config.validate()?;
        if names.is_empty() {
            return Err(Error::NoServerGroups);
        }

        let mut groups = Vec::with_capacity(names.len());
        for name in names {
            let group = self.config.server(name).ok_or_else(|| {
                Error::InvalidConfig(format!("server group {} is not configured", name))
            })?;
            groups.push(group);
        }

        let outcomes = groups.into_iter().map(|g| self.build_group(g)).collect();
        Ok(BuildReport { outcomes })
    }

    /// Build the document of one group.
    pub fn build_group(&self, group: &ServerGroup) -> GroupOutcome {
        info!("Building document for server group {}", group.name);
        let mut diagnostics = Vec::new();
        let result = self.try_build_group(group, &mut diagnostics);

        match &result {
            Ok(document) => info!(
                "Server group {}: {} paths, {} diagnostics",
                group.name,
                document.paths.len(),
                diagnostics.len()
            ),
            Err(e) => error!("Server group {} failed: {}", group.name, e),
        }

        GroupOutcome {
            group: group.name.clone(),
            result,
            diagnostics,
        }
    }

    fn try_build_group(
        &self,
        group: &ServerGroup,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<OpenApiDocument> {
        self.check_bindings()?;

        let routes: Vec<&RouteDescriptor> = self
            .metadata
            .routes()
            .iter()
            .filter(|route| self.belongs_to(route, group))
            .collect();
        debug!("{} routes bound to {}", routes.len(), group.name);

        let mut schemas = SchemaGenerator::new();
        let mut document = OpenApiBuilder::new(self.config.info.clone())
            .with_security_schemes(self.config.security_schemes.clone());
        if let Some(url) = &group.url {
            document.add_server(Server {
                url: url.clone(),
                description: group.description.clone(),
            });
        }
        for tag in &self.config.tags {
            document.add_tag(tag.clone());
        }

        for definition in self.config.definitions.iter().chain(self.metadata.definitions()) {
            schemas.register_declared(definition)?;
        }
        let mut seen_controllers = HashSet::new();
        for route in &routes {
            if !seen_controllers.insert(route.owner_class.as_str()) {
                continue;
            }
            if let Some(controller) = self.metadata.controller(&route.owner_class) {
                for definition in &controller.definitions {
                    schemas.register_declared(definition)?;
                }
                document.add_tag(Tag {
                    name: controller.tag_name().to_string(),
                    description: controller.description.clone().filter(|d| !d.is_empty()),
                });
            }
        }

        let builder = OperationBuilder::new(self.config, self.metadata, self.rule_sets);
        for route in routes {
            match builder.build(route, &mut schemas) {
                Ok(built) => {
                    for recovered in &built.recovered {
                        diagnostics.push(Diagnostic::new(route, recovered));
                    }
                    document.add_operation(&built.path, built.method, built.operation)?;
                }
                Err(e) if e.is_route_scoped()
                    && self.config.on_unresolved_rule_set == UnresolvedRuleSetPolicy::Skip =>
                {
                    warn!("Skipping {}: {}", route, e);
                    diagnostics.push(Diagnostic::new(route, &e));
                }
                Err(e) => return Err(e),
            }
        }

        document.build(schemas.into_registry())
    }

    /// Every explicit binding must name a configured group.
    fn check_bindings(&self) -> Result<()> {
        for route in self.metadata.routes() {
            if let Some(binding) = &route.server_group {
                if self.config.server(binding).is_none() {
                    return Err(Error::UnboundServerGroup {
                        route: route.to_string(),
                        group: binding.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn belongs_to(&self, route: &RouteDescriptor, group: &ServerGroup) -> bool {
        let binding = route
            .server_group
            .as_deref()
            .or_else(|| self.config.default_group());
        if binding != Some(group.name.as_str()) {
            return false;
        }
        if self.config.is_ignored(&route.owner_class, &route.owner_method) {
            debug!("Ignoring {}", route);
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Catalog;
    use crate::parser::Manifest;
    use crate::rule_set::RuleSetIndex;

    fn sources(yaml: &str) -> (Catalog, RuleSetIndex) {
        let manifest: Manifest = serde_yaml::from_str(yaml).unwrap();
        let manifests = [manifest];
        (Catalog::from_manifests(&manifests), RuleSetIndex::from_manifests(&manifests))
    }

    fn two_groups() -> BuildConfig {
        BuildConfig {
            servers: vec![
                ServerGroup {
                    name: "http".to_string(),
                    url: Some("http://localhost:9501".to_string()),
                    description: None,
                },
                ServerGroup {
                    name: "admin".to_string(),
                    url: None,
                    description: None,
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_groups_are_scoped() {
        let (catalog, rule_sets) = sources(
            r#"
controllers:
  - class: UserController
    routes:
      - {action: index, methods: [GET], path: /users}
  - class: AdminController
    server: admin
    routes:
      - {action: index, methods: [GET], path: /admin/users}
"#,
        );
        let config = two_groups();
        let generator = DocumentGenerator::new(&config, &catalog, &rule_sets);
        let report = generator.build_all().unwrap();

        assert!(!report.has_failures());
        let http = report.document("http").unwrap();
        let admin = report.document("admin").unwrap();
        assert!(http.paths.contains_key("/users"));
        assert!(!http.paths.contains_key("/admin/users"));
        assert!(admin.paths.contains_key("/admin/users"));
        assert_eq!(http.servers[0].url, "http://localhost:9501");
        assert!(admin.servers.is_empty());
    }

    #[test]
    fn test_unbound_group_fails_each_group() {
        let (catalog, rule_sets) = sources(
            r#"
controllers:
  - class: RpcController
    server: rpc
    routes:
      - {action: call, methods: [POST], path: /rpc}
"#,
        );
        let config = two_groups();
        let report = DocumentGenerator::new(&config, &catalog, &rule_sets)
            .build_all()
            .unwrap();

        assert!(report.has_failures());
        assert!(matches!(
            report.outcome("http").unwrap().result,
            Err(Error::UnboundServerGroup { .. })
        ));
    }

    #[test]
    fn test_similar_paths_get_distinct_ids_and_models() {
        let (catalog, rule_sets) = sources(
            r#"
controllers:
  - class: UserController
    routes:
      - action: show
        methods: [GET]
        path: /users/{id}
        declarations:
          - {kind: response, schema: {name: alice}}
      - action: flag
        methods: [GET]
        path: /users/id
        declarations:
          - {kind: response, schema: {enabled: true}}
      - {action: snake, methods: [GET], path: /user_list}
      - {action: kebab, methods: [GET], path: /user-list}
"#,
        );
        let config = BuildConfig::default();
        let report = DocumentGenerator::new(&config, &catalog, &rule_sets)
            .build_all()
            .unwrap();

        let document = report.document("http").unwrap();
        let ids: Vec<&str> = document
            .paths
            .values()
            .filter_map(|item| item.get.as_ref())
            .map(|op| op.operation_id.as_str())
            .collect();
        assert_eq!(
            ids,
            vec!["getUsersById", "getUsersId", "getUser_list", "getUser-list"]
        );

        let schemas = &document.components.as_ref().unwrap().schemas;
        assert!(schemas.contains_key("UsersByIdGetResponse200"));
        assert!(schemas.contains_key("UsersIdGetResponse200"));
    }

    #[test]
    fn test_collision_fails_only_its_group() {
        let (catalog, rule_sets) = sources(
            r#"
controllers:
  - class: A
    routes:
      - {action: list, methods: [GET], path: /items}
  - class: B
    routes:
      - {action: list, methods: [GET], path: /items/}
  - class: C
    server: admin
    routes:
      - {action: list, methods: [GET], path: /items}
"#,
        );
        let config = two_groups();
        let report = DocumentGenerator::new(&config, &catalog, &rule_sets)
            .build_all()
            .unwrap();

        assert!(matches!(
            report.outcome("http").unwrap().result,
            Err(Error::OperationIdCollision { .. })
        ));
        assert!(report.document("admin").is_some());
    }

    const UNRESOLVED: &str = r#"
controllers:
  - class: UserController
    routes:
      - action: create
        methods: [POST]
        path: /users
        declarations:
          - {kind: validation, rule_set: Missing}
      - {action: index, methods: [GET], path: /users}
"#;

    #[test]
    fn test_unresolved_rule_set_skips_route() {
        let (catalog, rule_sets) = sources(UNRESOLVED);
        let config = BuildConfig::default();
        let report = DocumentGenerator::new(&config, &catalog, &rule_sets)
            .build_all()
            .unwrap();

        let outcome = report.outcome("http").unwrap();
        let document = outcome.result.as_ref().unwrap();
        assert!(document.paths["/users"].post.is_none());
        assert!(document.paths["/users"].get.is_some());
        assert_eq!(outcome.diagnostics.len(), 1);
        assert!(outcome.diagnostics[0].route.contains("UserController::create"));
    }

    #[test]
    fn test_unresolved_rule_set_aborts_when_configured() {
        let (catalog, rule_sets) = sources(UNRESOLVED);
        let config = BuildConfig {
            on_unresolved_rule_set: UnresolvedRuleSetPolicy::Abort,
            ..Default::default()
        };
        let report = DocumentGenerator::new(&config, &catalog, &rule_sets)
            .build_all()
            .unwrap();

        assert!(matches!(
            report.outcome("http").unwrap().result,
            Err(Error::UnresolvedRuleSet { .. })
        ));
    }

    #[test]
    fn test_no_server_groups_is_total_failure() {
        let (catalog, rule_sets) = sources("controllers: []");
        let config = BuildConfig {
            servers: Vec::new(),
            ..Default::default()
        };
        let result = DocumentGenerator::new(&config, &catalog, &rule_sets).build_all();
        assert!(matches!(result, Err(Error::NoServerGroups)));
    }

    #[test]
    fn test_unknown_requested_group() {
        let (catalog, rule_sets) = sources("controllers: []");
        let config = BuildConfig::default();
        let result = DocumentGenerator::new(&config, &catalog, &rule_sets)
            .build_groups(&["admin".to_string()]);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_ignored_handlers_and_controller_tags() {
        let (catalog, rule_sets) = sources(
            r#"
controllers:
  - class: UserController
    tag: User
    description: 用户管理
    definitions:
      - name: User
        properties: {id: 1}
    routes:
      - {action: index, methods: [GET], path: /users}
      - {action: debug, methods: [GET], path: /users/debug}
"#,
        );
        let mut config = BuildConfig::default();
        config.ignore.push(crate::config::IgnoreRule {
            controller: "UserController".to_string(),
            action: Some("debug".to_string()),
        });
        let report = DocumentGenerator::new(&config, &catalog, &rule_sets)
            .build_all()
            .unwrap();
        let document = report.document("http").unwrap();

        assert!(!document.paths.contains_key("/users/debug"));
        assert_eq!(document.tags[0].description.as_deref(), Some("用户管理"));
        let components = document.components.as_ref().unwrap();
        assert!(components.schemas.contains_key("User"));
    }
}
