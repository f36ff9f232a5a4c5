//! Route metadata records and the lookup interface the builders consume.
//!
//! Records are produced outside the synthesis engine (here: decoded from
//! manifest files by [`crate::parser`]) and are read-only from then on. The
//! builders never reach for them globally; they go through a
//! [`MetadataSource`], which [`Catalog`] implements.
//!
//! # Example
//!
//! ```
//! use openapi_from_metadata::metadata::{Catalog, HttpMethod, MetadataSource};
//! use openapi_from_metadata::parser::Manifest;
//!
//! let manifest: Manifest = serde_yaml::from_str(r#"
//! controllers:
//!   - class: UserController
//!     prefix: /users
//!     routes:
//!       - action: show
//!         methods: [GET]
//!         path: "{id:\\d+}"
//! "#).unwrap();
//!
//! let catalog = Catalog::from_manifests(&[manifest]);
//! let route = &catalog.routes()[0];
//! assert_eq!(route.http_method, HttpMethod::Get);
//! assert_eq!(route.normalized_path, "/users/{id}");
//! ```

use crate::parser::Manifest;
use crate::path_normalizer;
use indexmap::IndexMap;
use log::{debug, warn};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// HTTP methods a route can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Options,
    Head,
}

impl HttpMethod {
    /// Lowercase name, as used for `paths` keys
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "get",
            HttpMethod::Post => "post",
            HttpMethod::Put => "put",
            HttpMethod::Delete => "delete",
            HttpMethod::Patch => "patch",
            HttpMethod::Options => "options",
            HttpMethod::Head => "head",
        }
    }

    /// Methods whose arguments travel in the query string
    pub fn is_read_style(&self) -> bool {
        matches!(
            self,
            HttpMethod::Get | HttpMethod::Delete | HttpMethod::Head | HttpMethod::Options
        )
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str().to_uppercase())
    }
}

impl TryFrom<String> for HttpMethod {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.to_ascii_lowercase().as_str() {
            "get" => Ok(HttpMethod::Get),
            "post" => Ok(HttpMethod::Post),
            "put" => Ok(HttpMethod::Put),
            "delete" => Ok(HttpMethod::Delete),
            "patch" => Ok(HttpMethod::Patch),
            "options" => Ok(HttpMethod::Options),
            "head" => Ok(HttpMethod::Head),
            _ => Err(format!("unsupported HTTP method: {}", value)),
        }
    }
}

/// One (method, path, handler) triple.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteDescriptor {
    pub http_method: HttpMethod,
    /// Path as declared on the handler, before composition
    pub raw_path: String,
    /// Version, prefix and path composed and normalized
    pub normalized_path: String,
    pub owner_class: String,
    pub owner_method: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub deprecated: bool,
    /// Set by the route itself or inherited from its controller
    pub requires_auth: bool,
    /// Explicit binding; `None` means the default group
    pub server_group: Option<String>,
    /// The handler serves more than one HTTP method
    pub handler_shared: bool,
}

impl RouteDescriptor {
    /// `Owner::method`
    pub fn handler(&self) -> String {
        format!("{}::{}", self.owner_class, self.owner_method)
    }
}

impl fmt::Display for RouteDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({})",
            self.http_method,
            self.normalized_path,
            self.handler()
        )
    }
}

/// Controller-level record as it appears in a manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct ControllerDescriptor {
    #[serde(rename = "class")]
    pub class_name: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Server group binding inherited by every route
    #[serde(default)]
    pub server: Option<String>,
    /// Every route of the controller requires auth
    #[serde(default)]
    pub security: bool,
    #[serde(default)]
    pub definitions: Vec<DeclaredDefinition>,
    #[serde(default)]
    pub routes: Vec<RouteManifest>,
}

impl ControllerDescriptor {
    /// Tag operations fall back to: the declared tag, else the class name
    pub fn tag_name(&self) -> &str {
        self.tag.as_deref().unwrap_or(&self.class_name)
    }
}

/// Handler-level record as it appears in a manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct RouteManifest {
    pub action: String,
    pub methods: Vec<HttpMethod>,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub deprecated: bool,
    #[serde(default)]
    pub security: bool,
    #[serde(default)]
    pub server: Option<String>,
    #[serde(default)]
    pub declarations: Vec<Declaration>,
}

/// A declarative record attached to a handler.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Declaration {
    Param(ParamDeclaration),
    Validation(ValidationDeclaration),
    Response(ResponseDeclaration),
}

/// Explicit path/query/header parameter
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ParamDeclaration {
    pub name: String,
    #[serde(rename = "in", default)]
    pub location: ParamLocation,
    /// OpenAPI type name, `string` when absent or unknown
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub default: Option<Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    Path,
    #[default]
    Query,
    Header,
}

impl ParamLocation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamLocation::Path => "path",
            ParamLocation::Query => "query",
            ParamLocation::Header => "header",
        }
    }
}

/// Validation rules, inline or by reference to a named rule set and scene
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ValidationDeclaration {
    #[serde(default)]
    pub rules: IndexMap<String, String>,
    #[serde(default)]
    pub rule_set: Option<String>,
    #[serde(default)]
    pub scene: Option<String>,
    #[serde(default)]
    pub encoding: Encoding,
}

/// How validated fields are transported
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    #[default]
    Json,
    Xml,
    Form,
    Query,
}

impl Encoding {
    /// Whether the fields travel in a request body
    pub fn is_body(&self) -> bool {
        matches!(self, Encoding::Json | Encoding::Xml)
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Encoding::Json => "application/json",
            Encoding::Xml => "application/xml",
            Encoding::Form | Encoding::Query => "application/x-www-form-urlencoded",
        }
    }
}

/// Response declaration: literal example data or a direct reference
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResponseDeclaration {
    #[serde(default = "default_status")]
    pub code: u16,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub schema: Option<Value>,
    /// Name of an existing definition to reuse verbatim
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
}

fn default_status() -> u16 {
    200
}

impl ResponseDeclaration {
    /// Direct reference marker, either `ref:` or a `{"$ref": ...}` schema
    pub fn direct_reference(&self) -> Option<&str> {
        self.reference.as_deref().or_else(|| {
            self.schema
                .as_ref()
                .and_then(|s| s.get("$ref"))
                .and_then(Value::as_str)
        })
    }
}

/// Named definition declared verbatim
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeclaredDefinition {
    pub name: String,
    #[serde(default)]
    pub properties: IndexMap<String, Value>,
}

/// Read access to route metadata.
pub trait MetadataSource {
    /// Every discovered route, one entry per HTTP method
    fn routes(&self) -> &[RouteDescriptor];

    fn controller(&self, class_name: &str) -> Option<&ControllerDescriptor>;

    /// Declarations attached to one handler, empty when none
    fn lookup(&self, owner: &str, method: &str) -> &[Declaration];

    /// Definitions declared outside any controller
    fn definitions(&self) -> &[DeclaredDefinition] {
        &[]
    }
}

/// In-memory [`MetadataSource`] built from decoded manifests.
#[derive(Debug, Default)]
pub struct Catalog {
    controllers: IndexMap<String, ControllerDescriptor>,
    routes: Vec<RouteDescriptor>,
    declarations: HashMap<String, HashMap<String, Vec<Declaration>>>,
    definitions: Vec<DeclaredDefinition>,
}

impl Catalog {
    pub fn from_manifests(manifests: &[Manifest]) -> Self {
        let mut catalog = Catalog::default();

        for manifest in manifests {
            for controller in &manifest.controllers {
                catalog.add_controller(controller.clone());
            }
            catalog.definitions.extend(manifest.definitions.iter().cloned());
        }

        debug!(
            "Catalog holds {} controllers and {} routes",
            catalog.controllers.len(),
            catalog.routes.len()
        );
        catalog
    }

    /// Register a controller and expand its routes, one per HTTP method.
    pub fn add_controller(&mut self, controller: ControllerDescriptor) {
        if self.controllers.contains_key(&controller.class_name) {
            warn!(
                "Controller {} declared more than once, keeping the first",
                controller.class_name
            );
            return;
        }

        for route in &controller.routes {
            let normalized_path = path_normalizer::compose(
                controller.version.as_deref(),
                &controller.prefix,
                &route.path,
            );
            let handler_shared = route.methods.len() > 1;

            for method in &route.methods {
                self.routes.push(RouteDescriptor {
                    http_method: *method,
                    raw_path: route.path.clone(),
                    normalized_path: normalized_path.clone(),
                    owner_class: controller.class_name.clone(),
                    owner_method: route.action.clone(),
                    summary: route.summary.clone(),
                    description: route.description.clone(),
                    tags: route.tags.clone(),
                    deprecated: route.deprecated,
                    requires_auth: route.security || controller.security,
                    server_group: route.server.clone().or_else(|| controller.server.clone()),
                    handler_shared,
                });
            }

            self.declarations
                .entry(controller.class_name.clone())
                .or_default()
                .entry(route.action.clone())
                .or_default()
                .extend(route.declarations.iter().cloned());
        }

        self.controllers
            .insert(controller.class_name.clone(), controller);
    }

    pub fn controllers(&self) -> impl Iterator<Item = &ControllerDescriptor> {
        self.controllers.values()
    }
}

impl MetadataSource for Catalog {
    fn routes(&self) -> &[RouteDescriptor] {
        &self.routes
    }

    fn controller(&self, class_name: &str) -> Option<&ControllerDescriptor> {
        self.controllers.get(class_name)
    }

    fn lookup(&self, owner: &str, method: &str) -> &[Declaration] {
        self.declarations
            .get(owner)
            .and_then(|methods| methods.get(method))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn definitions(&self) -> &[DeclaredDefinition] {
        &self.definitions
    }
}
