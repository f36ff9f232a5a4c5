use crate::config::SecurityRequirement;
use crate::error::{Error, Result};
use crate::metadata::HttpMethod;
use crate::registry::DefinitionRegistry;
use crate::schema_generator::Schema;
use indexmap::IndexMap;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// OpenAPI version written into every document
pub const OPENAPI_VERSION: &str = "3.0.3";

/// OpenAPI document builder
///
/// Collects operations for one server group and folds them, together with the
/// group's definitions, into an [`OpenApiDocument`].
pub struct OpenApiBuilder {
    /// OpenAPI info section
    info: Info,
    servers: Vec<Server>,
    /// Paths collection (URL path -> PathItem), in insertion order
    paths: IndexMap<String, PathItem>,
    tags: IndexMap<String, Tag>,
    security_schemes: IndexMap<String, Value>,
    /// operationId -> `METHOD path` of the operation that claimed it
    operation_ids: HashMap<String, String>,
}

/// OpenAPI Info object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Info {
    /// API title
    pub title: String,
    /// API version
    pub version: String,
    /// API description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Default for Info {
    fn default() -> Self {
        Self {
            title: "API Documentation".to_string(),
            version: "1.0.0".to_string(),
            description: None,
        }
    }
}

/// OpenAPI Server object
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Server {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// OpenAPI Tag object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// OpenAPI PathItem object - represents all operations for a single path
#[derive(Debug, Clone, Default, Serialize)]
pub struct PathItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub get: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub put: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub head: Option<Operation>,
}

/// OpenAPI Operation object - represents a single API operation
#[derive(Debug, Clone, Default, Serialize)]
pub struct Operation {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "operationId")]
    pub operation_id: String,
    /// Parameters (path, query, header)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
    #[serde(rename = "requestBody", skip_serializing_if = "Option::is_none")]
    pub request_body: Option<RequestBody>,
    /// Responses by status code
    pub responses: IndexMap<String, Response>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub security: Vec<SecurityRequirement>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub deprecated: bool,
}

/// OpenAPI Parameter object
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parameter {
    pub name: String,
    /// Parameter location (path, query, header)
    #[serde(rename = "in")]
    pub location: String,
    pub required: bool,
    pub schema: Schema,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// OpenAPI RequestBody object
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub required: bool,
    /// Content types and their schemas
    pub content: IndexMap<String, MediaType>,
}

/// OpenAPI MediaType object
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaType {
    pub schema: Schema,
}

/// OpenAPI Response object
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<IndexMap<String, MediaType>>,
}

/// OpenAPI Components object
#[derive(Debug, Clone, Default, Serialize)]
pub struct Components {
    /// Schema definitions
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub schemas: IndexMap<String, Schema>,
    #[serde(rename = "securitySchemes", skip_serializing_if = "IndexMap::is_empty")]
    pub security_schemes: IndexMap<String, Value>,
}

/// Complete OpenAPI document
#[derive(Debug, Clone, Serialize)]
pub struct OpenApiDocument {
    pub openapi: String,
    pub info: Info,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub servers: Vec<Server>,
    pub paths: IndexMap<String, PathItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub components: Option<Components>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
}

impl PathItem {
    /// Operation slot for a method
    pub fn operation_mut(&mut self, method: HttpMethod) -> &mut Option<Operation> {
        match method {
            HttpMethod::Get => &mut self.get,
            HttpMethod::Post => &mut self.post,
            HttpMethod::Put => &mut self.put,
            HttpMethod::Delete => &mut self.delete,
            HttpMethod::Patch => &mut self.patch,
            HttpMethod::Options => &mut self.options,
            HttpMethod::Head => &mut self.head,
        }
    }

    pub fn operation(&self, method: HttpMethod) -> Option<&Operation> {
        match method {
            HttpMethod::Get => self.get.as_ref(),
            HttpMethod::Post => self.post.as_ref(),
            HttpMethod::Put => self.put.as_ref(),
            HttpMethod::Delete => self.delete.as_ref(),
            HttpMethod::Patch => self.patch.as_ref(),
            HttpMethod::Options => self.options.as_ref(),
            HttpMethod::Head => self.head.as_ref(),
        }
    }

    /// All present operations with their method
    pub fn operations(&self) -> impl Iterator<Item = (HttpMethod, &Operation)> {
        [
            (HttpMethod::Get, &self.get),
            (HttpMethod::Post, &self.post),
            (HttpMethod::Put, &self.put),
            (HttpMethod::Delete, &self.delete),
            (HttpMethod::Patch, &self.patch),
            (HttpMethod::Options, &self.options),
            (HttpMethod::Head, &self.head),
        ]
        .into_iter()
        .filter_map(|(method, op)| op.as_ref().map(|op| (method, op)))
    }
}

impl Operation {
    /// Every schema reachable from the operation
    fn schemas(&self) -> Vec<&Schema> {
        let parameters = self.parameters.iter().map(|p| &p.schema);
        let body = self
            .request_body
            .iter()
            .flat_map(|b| b.content.values().map(|m| &m.schema));
        let responses = self
            .responses
            .values()
            .filter_map(|r| r.content.as_ref())
            .flat_map(|content| content.values().map(|m| &m.schema));
        parameters.chain(body).chain(responses).collect()
    }
}

impl OpenApiBuilder {
    /// Create a new OpenApiBuilder with the given info
    pub fn new(info: Info) -> Self {
        debug!("Initializing OpenApiBuilder");
        Self {
            info,
            servers: Vec::new(),
            paths: IndexMap::new(),
            tags: IndexMap::new(),
            security_schemes: IndexMap::new(),
            operation_ids: HashMap::new(),
        }
    }

    pub fn add_server(&mut self, server: Server) {
        self.servers.push(server);
    }

    pub fn with_security_schemes(mut self, schemes: IndexMap<String, Value>) -> Self {
        self.security_schemes = schemes;
        self
    }

    /// Add a document tag. The first description seen for a name is kept;
    /// a later one only fills a missing description.
    pub fn add_tag(&mut self, tag: Tag) {
        match self.tags.get_mut(&tag.name) {
            Some(existing) => {
                if existing.description.is_none() {
                    existing.description = tag.description;
                }
            }
            None => {
                self.tags.insert(tag.name.clone(), tag);
            }
        }
    }

    /// Insert an operation under `paths[path][method]`.
    ///
    /// # Errors
    ///
    /// [`Error::OperationIdCollision`] when the (path, method) slot is already
    /// taken or the operationId is already used by another operation.
    pub fn add_operation(&mut self, path: &str, method: HttpMethod, operation: Operation) -> Result<()> {
        debug!("Adding operation: {} {}", method, path);
        let location = format!("{} {}", method, path);

        if let Some(existing) = self.paths.get(path).and_then(|item| item.operation(method)) {
            return Err(Error::OperationIdCollision {
                operation_id: operation.operation_id,
                path: path.to_string(),
                method: method.to_string(),
                existing: existing.operation_id.clone(),
            });
        }
        if let Some(existing) = self.operation_ids.get(&operation.operation_id) {
            return Err(Error::OperationIdCollision {
                operation_id: operation.operation_id,
                path: path.to_string(),
                method: method.to_string(),
                existing: existing.clone(),
            });
        }

        for name in &operation.tags {
            self.add_tag(Tag {
                name: name.clone(),
                description: None,
            });
        }
        self.operation_ids
            .insert(operation.operation_id.clone(), location);
        *self
            .paths
            .entry(path.to_string())
            .or_default()
            .operation_mut(method) = Some(operation);
        Ok(())
    }

    /// Build the final OpenAPI document
    ///
    /// # Errors
    ///
    /// [`Error::DanglingDefinitionReference`] when any schema, in an operation
    /// or in `components.schemas`, refers to a name the registry does not hold.
    pub fn build(self, registry: DefinitionRegistry) -> Result<OpenApiDocument> {
        debug!("Building final OpenAPI document");

        let schemas = registry.into_schemas()?;
        check_references(&self.paths, &schemas)?;

        let components = Components {
            schemas,
            security_schemes: self.security_schemes,
        };
        let components = if components.schemas.is_empty() && components.security_schemes.is_empty() {
            None
        } else {
            Some(components)
        };

        Ok(OpenApiDocument {
            openapi: OPENAPI_VERSION.to_string(),
            info: self.info,
            servers: self.servers,
            paths: self.paths,
            components,
            tags: self.tags.into_values().collect(),
        })
    }
}

fn check_references(paths: &IndexMap<String, PathItem>, schemas: &IndexMap<String, Schema>) -> Result<()> {
    let mut pending: Vec<(String, &Schema)> = Vec::new();
    for (path, item) in paths {
        for (method, operation) in item.operations() {
            for schema in operation.schemas() {
                pending.push((format!("{} {}", method, path), schema));
            }
        }
    }
    for (name, schema) in schemas {
        pending.push((format!("components.schemas.{}", name), schema));
    }

    for (location, schema) in pending {
        let mut references = Vec::new();
        schema.collect_references(&mut references);
        if let Some(name) = references.into_iter().find(|r| !schemas.contains_key(r)) {
            return Err(Error::DanglingDefinitionReference { name, location });
        }
    }
    Ok(())
}
