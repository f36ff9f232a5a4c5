//! Turns one route and its declarations into an OpenAPI operation.
//!
//! Declarations are bucketed by kind: explicit parameters, validation rule
//! sets and response declarations. Validation fields are placed according to
//! the configured [`PlacementPolicy`]: a field named like a path placeholder
//! is always a required path parameter, the rest go to the query string or are
//! folded into one request body schema.

use crate::config::{BuildConfig, OperationIdConvention, PlacementPolicy, SecurityRequirement};
use crate::error::{Error, Result};
use crate::metadata::{
    Declaration, HttpMethod, MetadataSource, ParamDeclaration, ParamLocation, ResponseDeclaration,
    RouteDescriptor, ValidationDeclaration,
};
use crate::openapi_builder::{MediaType, Operation, Parameter, RequestBody, Response};
use crate::path_normalizer;
use crate::rule_parser::{parse_rules, ConstraintDescriptor};
use crate::rule_set::RuleSetResolver;
use crate::schema_generator::{capitalize, Schema, SchemaGenerator, SchemaKind};
use indexmap::IndexMap;
use log::{debug, warn};

const JSON_CONTENT_TYPE: &str = "application/json";

/// Builds operations for the routes of one document.
pub struct OperationBuilder<'a> {
    config: &'a BuildConfig,
    metadata: &'a dyn MetadataSource,
    rule_sets: &'a dyn RuleSetResolver,
}

/// An operation ready to be inserted into a document.
#[derive(Debug)]
pub struct BuiltOperation {
    pub path: String,
    pub method: HttpMethod,
    pub operation: Operation,
    /// Conditions recovered while building, such as malformed rules
    pub recovered: Vec<Error>,
}

/// Validation fields headed for the request body
struct BodyFields {
    content_type: &'static str,
    descriptors: Vec<ConstraintDescriptor>,
}

impl<'a> OperationBuilder<'a> {
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

    /// Build the operation of `route`.
    ///
    /// # Errors
    ///
    /// [`Error::UnresolvedRuleSet`] when a validation declaration names an
    /// unknown rule set or scene, and [`Error::DefinitionConflict`] when a
    /// synthesized response model clashes with an existing definition.
    pub fn build(&self, route: &RouteDescriptor, schemas: &mut SchemaGenerator) -> Result<BuiltOperation> {
        debug!("Building operation for {}", route);

        let declarations = self
            .metadata
            .lookup(&route.owner_class, &route.owner_method);
        let mut params: Vec<&ParamDeclaration> = Vec::new();
        let mut validations: Vec<&ValidationDeclaration> = Vec::new();
        let mut responses: Vec<&ResponseDeclaration> = Vec::new();
        for declaration in declarations {
            match declaration {
                Declaration::Param(p) => params.push(p),
                Declaration::Validation(v) => validations.push(v),
                Declaration::Response(r) => responses.push(r),
            }
        }

        let placeholders = path_normalizer::placeholders(&route.normalized_path);
        let mut parameters = Vec::new();
        let mut recovered = Vec::new();
        let mut body: Option<BodyFields> = None;

        for param in params {
            parameters.push(explicit_parameter(param, &placeholders));
        }

        for validation in validations {
            let rules = match &validation.rule_set {
                Some(name) => self.rule_sets.resolve(name, validation.scene.as_deref())?,
                None => validation.rules.clone(),
            };
            let (descriptors, errors) = parse_rules(&rules);
            recovered.extend(errors);

            let into_body = self.places_in_body(route.http_method, validation);
            for descriptor in descriptors {
                let top = descriptor.field_path[0].as_str();
                if !descriptor.is_nested() && placeholders.iter().any(|p| p == top) {
                    parameters.push(rule_parameter(&descriptor, "path", true, schemas));
                } else if into_body {
                    body.get_or_insert_with(|| BodyFields {
                        content_type: validation.encoding.content_type(),
                        descriptors: Vec::new(),
                    })
                    .descriptors
                    .push(descriptor);
                } else {
                    let required = descriptor.required;
                    parameters.push(rule_parameter(&descriptor, "query", required, schemas));
                }
            }
        }

        for name in &placeholders {
            parameters.push(Parameter {
                name: name.clone(),
                location: "path".to_string(),
                required: true,
                schema: Schema::string(),
                description: None,
            });
        }

        let operation = Operation {
            tags: self.tags(route),
            summary: Some(
                route
                    .summary
                    .clone()
                    .unwrap_or_else(|| route.owner_method.clone()),
            ),
            description: route.description.clone().filter(|d| !d.is_empty()),
            operation_id: self.operation_id(route),
            parameters: finish_parameters(parameters),
            request_body: body.map(|fields| request_body(fields, schemas)),
            responses: self.responses(route, &responses, schemas)?,
            security: self.security(route),
            deprecated: route.deprecated,
        };

        Ok(BuiltOperation {
            path: route.normalized_path.clone(),
            method: route.http_method,
            operation,
            recovered,
        })
    }

    fn places_in_body(&self, method: HttpMethod, validation: &ValidationDeclaration) -> bool {
        match self.config.parameter_placement {
            PlacementPolicy::MethodFirst => !method.is_read_style() && validation.encoding.is_body(),
            PlacementPolicy::EncodingFirst => validation.encoding.is_body(),
        }
    }

    fn tags(&self, route: &RouteDescriptor) -> Vec<String> {
        if !route.tags.is_empty() {
            return route.tags.clone();
        }
        let tag = match self.metadata.controller(&route.owner_class) {
            Some(controller) => controller.tag_name().to_string(),
            None => route.owner_class.clone(),
        };
        vec![tag]
    }

    fn operation_id(&self, route: &RouteDescriptor) -> String {
        match self.config.operation_id {
            OperationIdConvention::PathMethod => {
                format!(
                    "{}{}",
                    route.http_method.as_str(),
                    path_normalizer::identifier(&route.normalized_path)
                )
            }
            OperationIdConvention::Handler if route.handler_shared => {
                format!("{}#{}", route.handler(), route.http_method.as_str())
            }
            OperationIdConvention::Handler => route.handler(),
        }
    }

    fn security(&self, route: &RouteDescriptor) -> Vec<SecurityRequirement> {
        if route.requires_auth && !self.config.security_schemes.is_empty() {
            self.config.security_requirements()
        } else {
            Vec::new()
        }
    }

    fn responses(
        &self,
        route: &RouteDescriptor,
        declarations: &[&ResponseDeclaration],
        schemas: &mut SchemaGenerator,
    ) -> Result<IndexMap<String, Response>> {
        let mut responses = IndexMap::new();

        if declarations.is_empty() {
            responses.insert("200".to_string(), json_response(default_description(200), Schema::object()));
            return Ok(responses);
        }

        for declaration in declarations {
            let code = declaration.code;
            let schema = match (declaration.direct_reference(), &declaration.schema) {
                (Some(name), _) => {
                    if !schemas.has_definition(name) {
                        warn!("{} responds with unknown definition {}", route, name);
                    }
                    Schema::reference(name)
                }
                (None, Some(example)) => {
                    let model = response_model_name(route, code);
                    schemas.generate_from_example(&model, example)?
                }
                (None, None) => Schema::object(),
            };
            let description = declaration
                .description
                .clone()
                .unwrap_or_else(|| default_description(code));

            if responses
                .insert(code.to_string(), json_response(description, schema))
                .is_some()
            {
                warn!("{} declares response {} more than once, later wins", route, code);
            }
        }
        Ok(responses)
    }
}

/// `<Path><Method>Response<Code>`, e.g. `UsersByIdGetResponse200`
pub fn response_model_name(route: &RouteDescriptor, code: u16) -> String {
    let path = path_normalizer::identifier(&route.normalized_path);
    let path = if path.is_empty() { "Root".to_string() } else { path };
    format!(
        "{}{}Response{}",
        path,
        capitalize(route.http_method.as_str()),
        code
    )
}

fn default_description(code: u16) -> String {
    match code {
        200..=299 => "Successful response",
        400..=499 => "Client error",
        500..=599 => "Server error",
        _ => "Response",
    }
    .to_string()
}

fn json_response(description: String, schema: Schema) -> Response {
    let mut content = IndexMap::new();
    content.insert(JSON_CONTENT_TYPE.to_string(), MediaType { schema });
    Response {
        description,
        content: Some(content),
    }
}

fn explicit_parameter(param: &ParamDeclaration, placeholders: &[String]) -> Parameter {
    let in_path = param.location == ParamLocation::Path || placeholders.contains(&param.name);
    let location = if in_path { ParamLocation::Path } else { param.location };
    let kind = param
        .kind
        .as_deref()
        .and_then(SchemaKind::parse)
        .unwrap_or(SchemaKind::String);

    Parameter {
        name: param.name.clone(),
        location: location.as_str().to_string(),
        required: in_path || param.required,
        schema: Schema::of(kind).with_default(param.default.clone()),
        description: param.description.clone().filter(|d| !d.is_empty()),
    }
}

fn rule_parameter(
    descriptor: &ConstraintDescriptor,
    location: &str,
    required: bool,
    schemas: &mut SchemaGenerator,
) -> Parameter {
    let mut schema = schemas.constraint_schema(descriptor);
    let description = schema.description.take();
    Parameter {
        name: descriptor.dotted_name(),
        location: location.to_string(),
        required,
        schema,
        description,
    }
}

fn request_body(fields: BodyFields, schemas: &mut SchemaGenerator) -> RequestBody {
    let required = fields.descriptors.iter().any(|d| d.required);
    let schema = schemas.generate_from_constraints(&fields.descriptors);
    let mut content = IndexMap::new();
    content.insert(fields.content_type.to_string(), MediaType { schema });
    RequestBody {
        description: None,
        required,
        content,
    }
}

/// Drop repeated (name, location) pairs, first wins, and list path
/// parameters first.
fn finish_parameters(parameters: Vec<Parameter>) -> Vec<Parameter> {
    let mut unique: Vec<Parameter> = Vec::with_capacity(parameters.len());
    for parameter in parameters {
        let seen = unique
            .iter()
            .any(|p| p.name == parameter.name && p.location == parameter.location);
        if !seen {
            unique.push(parameter);
        }
    }
    unique.sort_by_key(|p| p.location != "path");
    unique
}
