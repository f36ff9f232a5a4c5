use crate::error::Result;
use crate::metadata::DeclaredDefinition;
use crate::registry::{Canonical, DefinitionRegistry};
use crate::rule_parser::{ConstraintDescriptor, ValueKind, ELEMENT_SEGMENT};
use indexmap::IndexMap;
use log::{debug, warn};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

/// Prefix of every `$ref` emitted into the document
pub const COMPONENTS_PREFIX: &str = "#/components/schemas/";

/// Schema generator - converts constraint descriptors and example data to OpenAPI schemas
pub struct SchemaGenerator {
    /// Named definitions registered while generating
    registry: DefinitionRegistry,
}

/// Scalar and container kinds of a schema node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaKind {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

/// OpenAPI Schema definition
///
/// A node with `reference` set and no `kind` is a reference node; the stored
/// reference is the bare definition name and is expanded to a full
/// `#/components/schemas/...` pointer on serialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Schema {
    /// Reference to a named definition
    #[serde(
        rename = "$ref",
        serialize_with = "serialize_reference",
        skip_serializing_if = "Option::is_none"
    )]
    pub reference: Option<String>,
    /// The type of the schema (string, integer, object, array, etc.)
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<SchemaKind>,
    /// Format for primitive types (e.g. "email")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Items schema for array types
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Schema>>,
    /// Properties for object types
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<IndexMap<String, Schema>>,
    /// Required field names for object types
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
}

fn serialize_reference<S: Serializer>(
    reference: &Option<String>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match reference {
        Some(name) => serializer.serialize_str(&format!("{}{}", COMPONENTS_PREFIX, name)),
        None => serializer.serialize_none(),
    }
}

impl SchemaKind {
    /// Parse an OpenAPI type name.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "string" => Some(SchemaKind::String),
            "integer" => Some(SchemaKind::Integer),
            "number" => Some(SchemaKind::Number),
            "boolean" => Some(SchemaKind::Boolean),
            "array" => Some(SchemaKind::Array),
            "object" => Some(SchemaKind::Object),
            _ => None,
        }
    }
}

impl From<ValueKind> for SchemaKind {
    fn from(kind: ValueKind) -> Self {
        match kind {
            ValueKind::String => SchemaKind::String,
            ValueKind::Integer => SchemaKind::Integer,
            ValueKind::Number => SchemaKind::Number,
            ValueKind::Boolean => SchemaKind::Boolean,
            ValueKind::Array => SchemaKind::Array,
            ValueKind::Object => SchemaKind::Object,
        }
    }
}

impl Schema {
    pub fn of(kind: SchemaKind) -> Self {
        let items = (kind == SchemaKind::Array).then(|| Box::new(Schema::string()));
        Self {
            kind: Some(kind),
            items,
            ..Default::default()
        }
    }

    pub fn string() -> Self {
        Self::of(SchemaKind::String)
    }

    pub fn integer() -> Self {
        Self::of(SchemaKind::Integer)
    }

    /// An object without declared properties
    pub fn object() -> Self {
        Self::of(SchemaKind::Object)
    }

    pub fn array(items: Schema) -> Self {
        Self {
            kind: Some(SchemaKind::Array),
            items: Some(Box::new(items)),
            ..Default::default()
        }
    }

    /// A reference to the named definition
    pub fn reference(name: &str) -> Self {
        Self {
            reference: Some(name.to_string()),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        if let Some(description) = description.filter(|d| !d.is_empty()) {
            self.description = Some(description);
        }
        self
    }

    pub fn with_default(mut self, default: Option<Value>) -> Self {
        if default.is_some() {
            self.default = default;
        }
        self
    }

    pub fn with_format(mut self, format: Option<&str>) -> Self {
        self.format = format.map(str::to_string);
        self
    }

    pub fn with_properties(mut self, properties: IndexMap<String, Schema>) -> Self {
        self.kind = Some(SchemaKind::Object);
        self.properties = Some(properties);
        self
    }

    /// Collect every definition name referenced from this node or below.
    pub fn collect_references(&self, out: &mut Vec<String>) {
        if let Some(name) = &self.reference {
            out.push(name.clone());
        }
        if let Some(items) = &self.items {
            items.collect_references(out);
        }
        if let Some(properties) = &self.properties {
            for property in properties.values() {
                property.collect_references(out);
            }
        }
    }
}

/// Intermediate tree used to fold dotted field paths.
#[derive(Default)]
struct FieldNode<'a> {
    descriptor: Option<&'a ConstraintDescriptor>,
    children: IndexMap<String, FieldNode<'a>>,
}

impl<'a> FieldNode<'a> {
    fn insert(&mut self, descriptor: &'a ConstraintDescriptor) {
        let mut node = self;
        for segment in &descriptor.field_path {
            node = node.children.entry(segment.clone()).or_default();
        }
        if node.descriptor.is_some() {
            debug!(
                "Duplicate rule for {}, later entry wins",
                descriptor.dotted_name()
            );
        }
        node.descriptor = Some(descriptor);
    }

    fn is_required(&self) -> bool {
        self.descriptor.map_or(false, |d| d.required)
    }
}

impl SchemaGenerator {
    /// Create a new SchemaGenerator with an empty registry
    pub fn new() -> Self {
        debug!("Initializing SchemaGenerator");
        Self {
            registry: DefinitionRegistry::new(),
        }
    }

    /// Schema of a single leaf constraint
    pub fn constraint_schema(&mut self, descriptor: &ConstraintDescriptor) -> Schema {
        let schema = match descriptor.kind() {
            ValueKind::Array => Schema::array(Schema::string()),
            ValueKind::Object => Schema::reference(self.registry.intern(Canonical::Object)),
            kind => Schema::of(kind.into()).with_format(descriptor.format()),
        };
        schema
            .with_description(descriptor.description())
            .with_default(descriptor.default_value.clone())
    }

    /// Generate one object schema from a set of constraints.
    ///
    /// Dotted paths sharing a prefix end up under a single ancestor object.
    pub fn generate_from_constraints(&mut self, constraints: &[ConstraintDescriptor]) -> Schema {
        debug!("Generating schema from {} constraints", constraints.len());

        let mut root = FieldNode::default();
        for descriptor in constraints {
            root.insert(descriptor);
        }
        self.object_from_fields(&root.children)
    }

    fn object_from_fields(&mut self, fields: &IndexMap<String, FieldNode<'_>>) -> Schema {
        let mut properties = IndexMap::new();
        let mut required = Vec::new();

        for (name, node) in fields {
            if node.is_required() {
                required.push(name.clone());
            }
            let schema = self.field_schema(node);
            properties.insert(name.clone(), schema);
        }

        let mut schema = Schema::object().with_properties(properties);
        if !required.is_empty() {
            schema.required = Some(required);
        }
        schema
    }

    fn field_schema(&mut self, node: &FieldNode<'_>) -> Schema {
        if node.children.is_empty() {
            return match node.descriptor {
                Some(descriptor) => self.constraint_schema(descriptor),
                None => Schema::object(),
            };
        }

        let description = node.descriptor.and_then(ConstraintDescriptor::description);

        if let Some(element) = node.children.get(ELEMENT_SEGMENT) {
            if node.children.len() > 1 {
                warn!("Ignoring named fields declared next to `*` element rules");
            }
            let items = self.field_schema(element);
            return Schema::array(items).with_description(description);
        }

        self.object_from_fields(&node.children)
            .with_description(description)
    }

    /// Generate a schema from literal example data.
    ///
    /// Mappings become named definitions (`model_name` at the top,
    /// `<parent><Field>` below) and are referenced from their parent. A top
    /// level sequence of mappings yields `array` of a reference.
    pub fn generate_from_example(&mut self, model_name: &str, example: &Value) -> Result<Schema> {
        debug!("Generating schema for model {} from example", model_name);
        self.example_schema(model_name, example)
    }

    fn example_schema(&mut self, model_name: &str, value: &Value) -> Result<Schema> {
        match value {
            Value::Object(map) => self.mapping_schema(model_name, map),
            Value::Array(items) => self.sequence_schema(model_name, items),
            scalar => Ok(scalar_schema(scalar)),
        }
    }

    fn mapping_schema(&mut self, model_name: &str, map: &Map<String, Value>) -> Result<Schema> {
        if let Some(name) = direct_reference(map) {
            return Ok(Schema::reference(name));
        }
        if map.is_empty() {
            return Ok(Schema::reference(self.registry.intern(Canonical::Object)));
        }

        let slot = self.registry.reserve(model_name);
        let mut properties = IndexMap::new();

        for (key, value) in map {
            let (field, label) = split_label(key);
            let schema = match value {
                Value::Object(_) | Value::Array(_) => {
                    let nested = format!("{}{}", model_name, field_model_suffix(&field));
                    self.example_schema(&nested, value)?
                }
                scalar => scalar_schema(scalar).with_default(Some(scalar.clone()).filter(|v| !v.is_null())),
            };
            properties.insert(field, schema.with_description(label));
        }

        self.registry
            .fill(slot, Schema::object().with_properties(properties))?;
        Ok(Schema::reference(model_name))
    }

    fn sequence_schema(&mut self, model_name: &str, items: &[Value]) -> Result<Schema> {
        let mappings: Vec<&Map<String, Value>> = items.iter().filter_map(Value::as_object).collect();
        if !mappings.is_empty() {
            let merged = merge_mappings(&mappings);
            let item = self.mapping_schema(model_name, &merged)?;
            return Ok(Schema::array(item));
        }

        match items.first() {
            None => Ok(Schema::reference(self.registry.intern(Canonical::Array))),
            Some(Value::Array(inner)) => Ok(Schema::array(self.sequence_schema(model_name, inner)?)),
            Some(scalar) => Ok(Schema::array(scalar_schema(scalar))),
        }
    }

    /// Register a definition declared directly in metadata or configuration.
    pub fn register_declared(&mut self, definition: &DeclaredDefinition) -> Result<()> {
        debug!("Registering declared definition {}", definition.name);

        let mut properties = IndexMap::new();
        for (key, value) in &definition.properties {
            let (field, label) = split_label(key);
            properties.insert(field, declared_property(value, label));
        }
        self.registry
            .register(&definition.name, Schema::object().with_properties(properties))
    }

    /// Whether a definition with this name is known
    pub fn has_definition(&self, name: &str) -> bool {
        self.registry.contains(name)
    }

    /// Get the registry of generated definitions
    pub fn get_schemas(&self) -> &DefinitionRegistry {
        &self.registry
    }

    pub fn into_registry(self) -> DefinitionRegistry {
        self.registry
    }
}

impl Default for SchemaGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Upper-case the first character, leave the rest untouched.
pub fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// What a nested field adds to its parent's model name: underscores dropped,
/// first letter capitalised. `a_b` gives `Ab`, `aB` gives `AB`.
pub fn field_model_suffix(field: &str) -> String {
    capitalize(&field.replace('_', ""))
}

/// Split an example key `name|label` into name and optional label.
fn split_label(key: &str) -> (String, Option<String>) {
    match key.split_once('|') {
        Some((name, label)) => (name.trim().to_string(), Some(label.trim().to_string())),
        None => (key.trim().to_string(), None),
    }
}

fn direct_reference(map: &Map<String, Value>) -> Option<&str> {
    map.get("$ref").and_then(Value::as_str)
}

fn merge_mappings(mappings: &[&Map<String, Value>]) -> Map<String, Value> {
    let mut merged = Map::new();
    for mapping in mappings {
        for (key, value) in mapping.iter() {
            if !merged.contains_key(key) {
                merged.insert(key.clone(), value.clone());
            }
        }
    }
    merged
}

fn scalar_schema(value: &Value) -> Schema {
    match value {
        Value::Bool(_) => Schema::of(SchemaKind::Boolean),
        Value::Number(n) if n.is_i64() || n.is_u64() => Schema::integer(),
        Value::Number(_) => Schema::of(SchemaKind::Number),
        _ => Schema::string(),
    }
}

fn looks_numeric(value: &Value) -> bool {
    match value {
        Value::Number(_) => true,
        Value::String(s) => s.trim().parse::<f64>().is_ok(),
        _ => false,
    }
}

fn declared_property(value: &Value, label: Option<String>) -> Schema {
    let spec = match value {
        Value::Object(spec) => spec,
        scalar => {
            let kind = if looks_numeric(scalar) {
                SchemaKind::Integer
            } else {
                SchemaKind::String
            };
            return Schema::of(kind)
                .with_default(Some(scalar.clone()))
                .with_description(label);
        }
    };

    let mut schema = match spec.get("type").and_then(Value::as_str).and_then(SchemaKind::parse) {
        Some(kind) => Schema::of(kind),
        None => Schema::default(),
    };
    schema.reference = direct_reference(spec).map(str::to_string);
    schema.default = spec.get("default").cloned();
    if schema.kind.is_none() && schema.reference.is_none() {
        schema.kind = Some(match &schema.default {
            Some(default) if looks_numeric(default) => SchemaKind::Integer,
            _ => SchemaKind::String,
        });
    }

    let description = spec
        .get("description")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or(label);
    schema.with_description(description)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule_parser::parse_rule;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn constraints(entries: &[(&str, &str)]) -> Vec<ConstraintDescriptor> {
        entries
            .iter()
            .map(|(key, value)| parse_rule(key, value).unwrap())
            .collect()
    }

    fn to_json(schema: &Schema) -> Value {
        serde_json::to_value(schema).unwrap()
    }

    #[test]
    fn test_leaf_kinds_from_rules() {
        let mut generator = SchemaGenerator::new();
        let descriptors = constraints(&[
            ("id", "required|integer"),
            ("price", "numeric"),
            ("enabled", "bool"),
            ("tags", "array"),
            ("email", "email"),
            ("note", "max:10"),
        ]);

        let schemas: Vec<Schema> = descriptors
            .iter()
            .map(|d| generator.constraint_schema(d))
            .collect();

        assert_eq!(schemas[0].kind, Some(SchemaKind::Integer));
        assert_eq!(schemas[1].kind, Some(SchemaKind::Number));
        assert_eq!(schemas[2].kind, Some(SchemaKind::Boolean));
        assert_eq!(schemas[3].kind, Some(SchemaKind::Array));
        assert_eq!(schemas[3].items.as_deref(), Some(&Schema::string()));
        assert_eq!(schemas[4].format.as_deref(), Some("email"));
        assert_eq!(schemas[5].kind, Some(SchemaKind::String));
    }

    #[test]
    fn test_object_rule_uses_canonical_definition() {
        let mut generator = SchemaGenerator::new();
        let d = parse_rule("extra|附加", "object").unwrap();
        let schema = generator.constraint_schema(&d);
        assert_eq!(schema.reference.as_deref(), Some("ModelObject"));
        assert!(generator.get_schemas().is_filled("ModelObject"));

        generator.constraint_schema(&d);
        assert_eq!(generator.get_schemas().len(), 1);
    }

    #[test]
    fn test_dotted_paths_share_one_ancestor() {
        let mut generator = SchemaGenerator::new();
        let descriptors = constraints(&[
            ("username|用户名", "required|string|min:3|max:20"),
            ("profile.nickname|昵称", "string|max:50"),
            ("profile.bio|简介", "required|string"),
        ]);

        let schema = generator.generate_from_constraints(&descriptors);
        assert_eq!(
            to_json(&schema),
            json!({
                "type": "object",
                "properties": {
                    "username": {"type": "string", "description": "用户名 (min:3|max:20)"},
                    "profile": {
                        "type": "object",
                        "properties": {
                            "nickname": {"type": "string", "description": "昵称 (max:50)"},
                            "bio": {"type": "string", "description": "简介"}
                        },
                        "required": ["bio"]
                    }
                },
                "required": ["username"]
            })
        );
    }

    #[test]
    fn test_explicit_parent_entry_keeps_label_and_becomes_object() {
        let mut generator = SchemaGenerator::new();
        let descriptors = constraints(&[
            ("profile|个人资料", "required|array"),
            ("profile.nickname", "string"),
        ]);

        let schema = generator.generate_from_constraints(&descriptors);
        let properties = schema.properties.unwrap();
        let profile = &properties["profile"];
        assert_eq!(properties.len(), 1);
        assert_eq!(profile.kind, Some(SchemaKind::Object));
        assert_eq!(profile.description.as_deref(), Some("个人资料"));
        assert_eq!(schema.required, Some(vec!["profile".to_string()]));
    }

    #[test]
    fn test_element_rules_describe_array_items() {
        let mut generator = SchemaGenerator::new();
        let descriptors = constraints(&[
            ("ids", "array"),
            ("ids.*", "integer"),
            ("items|条目", "array"),
            ("items.*.sku", "required|string"),
        ]);

        let schema = generator.generate_from_constraints(&descriptors);
        assert_eq!(
            to_json(&schema)["properties"],
            json!({
                "ids": {"type": "array", "items": {"type": "integer"}, "description": "ids"},
                "items": {
                    "type": "array",
                    "description": "条目",
                    "items": {
                        "type": "object",
                        "properties": {"sku": {"type": "string", "description": "sku"}},
                        "required": ["sku"]
                    }
                }
            })
        );
    }

    #[test]
    fn test_example_mapping_registers_nested_definitions() {
        let mut generator = SchemaGenerator::new();
        let example = json!({
            "id|用户ID": 1,
            "profile": {"nickname": "n", "avatar_url": "a"},
            "roles": [{"name": "admin"}],
            "scores": [1, 2],
            "ratio": 0.5
        });

        let schema = generator.generate_from_example("UsersGetResponse200", &example).unwrap();
        assert_eq!(schema, Schema::reference("UsersGetResponse200"));

        let registry = generator.into_registry();
        let names: Vec<String> = registry.into_schemas().unwrap().into_keys().collect();
        assert_eq!(
            names,
            vec![
                "UsersGetResponse200",
                "UsersGetResponse200Profile",
                "UsersGetResponse200Roles"
            ]
        );
    }

    #[test]
    fn test_example_property_shapes() {
        let mut generator = SchemaGenerator::new();
        let example = json!({
            "id|用户ID": 1,
            "roles": [{"name": "admin"}],
            "scores": [1, 2],
            "ratio": 0.5,
            "nothing": null
        });
        generator.generate_from_example("Model", &example).unwrap();

        let model = to_json(generator.get_schemas().get("Model").unwrap());
        assert_eq!(
            model,
            json!({
                "type": "object",
                "properties": {
                    "id": {"type": "integer", "description": "用户ID", "default": 1},
                    "roles": {"type": "array", "items": {"$ref": "#/components/schemas/ModelRoles"}},
                    "scores": {"type": "array", "items": {"type": "integer"}},
                    "ratio": {"type": "number", "default": 0.5},
                    "nothing": {"type": "string"}
                }
            })
        );
    }

    #[test]
    fn test_example_synthesis_is_idempotent() {
        let mut generator = SchemaGenerator::new();
        let example = json!({"user": {"name": "a", "created_at": "now"}});

        let first = generator.generate_from_example("Detail", &example).unwrap();
        let count = generator.get_schemas().len();
        let second = generator.generate_from_example("Detail", &example).unwrap();

        assert_eq!(first, second);
        assert_eq!(generator.get_schemas().len(), count);
        assert!(generator.has_definition("DetailUser"));
    }

    #[test]
    fn test_top_level_list_of_mappings() {
        let mut generator = SchemaGenerator::new();
        let example = json!([{"id": 1}, {"id": 2, "name": "b"}]);
        let schema = generator.generate_from_example("List", &example).unwrap();

        assert_eq!(schema, Schema::array(Schema::reference("List")));
        let list = generator.get_schemas().get("List").unwrap();
        let keys: Vec<&String> = list.properties.as_ref().unwrap().keys().collect();
        assert_eq!(keys, vec!["id", "name"]);
    }

    #[test]
    fn test_empty_containers_use_canonical_definitions() {
        let mut generator = SchemaGenerator::new();
        let example = json!({"list": [], "meta": {}});
        generator.generate_from_example("Page", &example).unwrap();

        let page = generator.get_schemas().get("Page").unwrap().clone();
        let properties = page.properties.unwrap();
        assert_eq!(properties["list"], Schema::reference("ModelArray"));
        assert_eq!(properties["meta"], Schema::reference("ModelObject"));
        assert!(!generator.has_definition("PageList"));
    }

    #[test]
    fn test_nested_direct_reference() {
        let mut generator = SchemaGenerator::new();
        let example = json!({"owner": {"$ref": "User"}});
        generator.generate_from_example("Repo", &example).unwrap();

        let repo = generator.get_schemas().get("Repo").unwrap();
        assert_eq!(
            repo.properties.as_ref().unwrap()["owner"],
            Schema::reference("User")
        );
        assert!(!generator.has_definition("RepoOwner"));
    }

    #[test]
    fn test_register_declared_definition() {
        let mut generator = SchemaGenerator::new();
        let mut properties = IndexMap::new();
        properties.insert("id|编号".to_string(), json!(1));
        properties.insert("name".to_string(), json!("guest"));
        properties.insert("owner".to_string(), json!({"$ref": "User", "description": "所有者"}));
        properties.insert("age".to_string(), json!({"default": "18"}));
        let definition = DeclaredDefinition {
            name: "Account".to_string(),
            properties,
        };

        generator.register_declared(&definition).unwrap();
        assert_eq!(
            to_json(generator.get_schemas().get("Account").unwrap()),
            json!({
                "type": "object",
                "properties": {
                    "id": {"type": "integer", "description": "编号", "default": 1},
                    "name": {"type": "string", "default": "guest"},
                    "owner": {"$ref": "#/components/schemas/User", "description": "所有者"},
                    "age": {"type": "integer", "default": "18"}
                }
            })
        );
    }

    #[test]
    fn test_collect_references() {
        let mut properties = IndexMap::new();
        properties.insert("a".to_string(), Schema::reference("A"));
        properties.insert("b".to_string(), Schema::array(Schema::reference("B")));
        let schema = Schema::object().with_properties(properties);

        let mut refs = Vec::new();
        schema.collect_references(&mut refs);
        assert_eq!(refs, vec!["A", "B"]);
    }

    #[test]
    fn test_field_model_suffix() {
        assert_eq!(field_model_suffix("profile"), "Profile");
        assert_eq!(field_model_suffix("created_at"), "Createdat");
        assert_eq!(field_model_suffix("aB"), "AB");
        assert_eq!(field_model_suffix(""), "");
    }

    #[test]
    fn test_nested_keys_differing_in_underscore_and_case_stay_apart() {
        let mut generator = SchemaGenerator::new();
        let example = json!({"a_b": {"x": 1}, "aB": {"y": "s"}});

        let schema = generator.generate_from_example("M", &example).unwrap();
        assert_eq!(schema, Schema::reference("M"));

        let schemas = generator.into_registry().into_schemas().unwrap();
        let names: Vec<&String> = schemas.keys().collect();
        assert_eq!(names, vec!["M", "MAb", "MAB"]);
        assert_eq!(
            to_json(&schemas["M"])["properties"],
            json!({
                "a_b": {"$ref": "#/components/schemas/MAb"},
                "aB": {"$ref": "#/components/schemas/MAB"}
            })
        );
    }
}
