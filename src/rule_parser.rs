//! Parser for the validation rule mini-language.
//!
//! A rule entry is a pair of strings: the key `field[.nested...][|label]` and the
//! value `token1|token2:arg|token3[args]`. Parsing yields a [`ConstraintDescriptor`]
//! whose tokens are already classified, so schema synthesis never has to match
//! raw strings again.
//!
//! # Example
//!
//! ```
//! use openapi_from_metadata::rule_parser::{parse_rule, ValueKind};
//!
//! let descriptor = parse_rule("age|年龄", "required|integer|min:1").unwrap();
//! assert_eq!(descriptor.field_path, vec!["age".to_string()]);
//! assert_eq!(descriptor.label, "年龄");
//! assert!(descriptor.required);
//! assert_eq!(descriptor.kind(), ValueKind::Integer);
//! ```

use crate::error::{Error, Result};
use indexmap::IndexMap;
use log::{debug, warn};
use serde_json::Value;

/// Field segment standing for the elements of an array
pub const ELEMENT_SEGMENT: &str = "*";

/// One classified token of a rule value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleToken {
    Required,
    /// `integer` or `int`
    Integer,
    /// `numeric` or `float`
    Numeric,
    /// `boolean` or `bool`
    Boolean,
    Array,
    Object,
    String,
    Email,
    /// `default:<value>`
    Default(String),
    /// Any other token; `text` is the token as written.
    Other {
        name: String,
        argument: Option<String>,
        text: String,
    },
}

/// Value kind inferred from a token set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

/// Parsed form of one rule entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintDescriptor {
    /// Dotted field path split into segments; `*` stands for array elements.
    pub field_path: Vec<String>,
    /// Display label, the terminal segment name when none is given.
    pub label: String,
    /// Tokens in declaration order.
    pub raw_rule: Vec<RuleToken>,
    pub required: bool,
    pub default_value: Option<Value>,
}

impl RuleToken {
    /// Classify a single token. Arguments come after `:` or inside `[...]`,
    /// whichever opens first; bracket text never takes part in matching.
    pub fn parse(token: &str) -> Self {
        let token = token.trim();
        let split_at = token.find(|c: char| c == ':' || c == '[');
        let (name, argument) = match split_at {
            Some(idx) if token[idx..].starts_with(':') => {
                (&token[..idx], Some(token[idx + 1..].to_string()))
            }
            Some(idx) => {
                let inner = token[idx + 1..].trim_end_matches(']');
                (&token[..idx], Some(inner.to_string()))
            }
            None => (token, None),
        };

        match name {
            "required" => RuleToken::Required,
            "integer" | "int" => RuleToken::Integer,
            "numeric" | "float" => RuleToken::Numeric,
            "boolean" | "bool" => RuleToken::Boolean,
            "array" => RuleToken::Array,
            "object" => RuleToken::Object,
            "string" => RuleToken::String,
            "email" => RuleToken::Email,
            "default" => RuleToken::Default(argument.unwrap_or_default()),
            _ => RuleToken::Other {
                name: name.to_string(),
                argument,
                text: token.to_string(),
            },
        }
    }
}

impl ValueKind {
    /// OpenAPI type name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::String => "string",
            ValueKind::Integer => "integer",
            ValueKind::Number => "number",
            ValueKind::Boolean => "boolean",
            ValueKind::Array => "array",
            ValueKind::Object => "object",
        }
    }

    /// Infer a kind from a token set. Precedence is
    /// integer > numeric > boolean > array > object > string, regardless of
    /// token order.
    pub fn infer(tokens: &[RuleToken]) -> Self {
        let has = |wanted: &RuleToken| tokens.iter().any(|t| t == wanted);
        if has(&RuleToken::Integer) {
            ValueKind::Integer
        } else if has(&RuleToken::Numeric) {
            ValueKind::Number
        } else if has(&RuleToken::Boolean) {
            ValueKind::Boolean
        } else if has(&RuleToken::Array) {
            ValueKind::Array
        } else if has(&RuleToken::Object) {
            ValueKind::Object
        } else {
            ValueKind::String
        }
    }
}

impl ConstraintDescriptor {
    /// Inferred value kind of the terminal field.
    pub fn kind(&self) -> ValueKind {
        ValueKind::infer(&self.raw_rule)
    }

    /// Format hint for string fields.
    pub fn format(&self) -> Option<&'static str> {
        if self.kind() == ValueKind::String && self.raw_rule.contains(&RuleToken::Email) {
            Some("email")
        } else {
            None
        }
    }

    /// Terminal segment of the field path.
    pub fn field_name(&self) -> &str {
        self.field_path.last().map(String::as_str).unwrap_or_default()
    }

    /// The field path joined back with dots.
    pub fn dotted_name(&self) -> String {
        self.field_path.join(".")
    }

    /// Whether the field path has more than one segment.
    pub fn is_nested(&self) -> bool {
        self.field_path.len() > 1
    }

    /// Fallback descriptor used when a rule cannot be parsed: a non-required string.
    pub fn fallback(key: &str) -> Self {
        let (field_path, label) = split_field_key(key);
        let label = label.unwrap_or_else(|| field_path.last().cloned().unwrap_or_default());
        Self {
            field_path,
            label,
            raw_rule: Vec::new(),
            required: false,
            default_value: None,
        }
    }

    /// Tokens that do not affect the type, exactly as written.
    pub fn constraint_text(&self) -> Vec<&str> {
        self.raw_rule
            .iter()
            .filter_map(|t| match t {
                RuleToken::Other { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Documentation text: the label followed by the remaining constraints,
    /// `用户名 (min:3|max:20)`. Element entries (`*`) have no label.
    pub fn description(&self) -> Option<String> {
        let label = Some(self.label.as_str()).filter(|l| !l.is_empty() && *l != ELEMENT_SEGMENT);
        let constraints = self.constraint_text().join("|");
        match (label, constraints.is_empty()) {
            (Some(label), true) => Some(label.to_string()),
            (Some(label), false) => Some(format!("{} ({})", label, constraints)),
            (None, false) => Some(constraints),
            (None, true) => None,
        }
    }
}

/// Split `field.nested|label` into its path segments and optional label.
pub fn split_field_key(key: &str) -> (Vec<String>, Option<String>) {
    let (path, label) = match key.split_once('|') {
        Some((path, label)) => (path, Some(label.trim().to_string())),
        None => (key, None),
    };
    let segments = path
        .split('.')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    (segments, label.filter(|l| !l.is_empty()))
}

/// Parse one rule entry.
///
/// # Errors
///
/// Returns [`Error::MalformedRule`] when the key has no field name or the
/// value contains no token. Unknown tokens are never an error.
pub fn parse_rule(key: &str, value: &str) -> Result<ConstraintDescriptor> {
    let (field_path, label) = split_field_key(key);
    if field_path.is_empty() {
        return Err(Error::MalformedRule {
            field: key.to_string(),
            reason: "empty field name".to_string(),
        });
    }

    let raw_rule: Vec<RuleToken> = value
        .split('|')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(RuleToken::parse)
        .collect();
    if raw_rule.is_empty() {
        return Err(Error::MalformedRule {
            field: key.to_string(),
            reason: "empty rule value".to_string(),
        });
    }

    let required = raw_rule.contains(&RuleToken::Required);
    let kind = ValueKind::infer(&raw_rule);
    let default_value = raw_rule.iter().find_map(|t| match t {
        RuleToken::Default(raw) => Some(typed_default(kind, raw)),
        _ => None,
    });
    let label = label.unwrap_or_else(|| field_path.last().cloned().unwrap_or_default());

    Ok(ConstraintDescriptor {
        field_path,
        label,
        raw_rule,
        required,
        default_value,
    })
}

/// Parse one entry, recovering from [`Error::MalformedRule`] with a
/// non-required string descriptor. The error is handed back for diagnostics.
pub fn parse_rule_or_default(key: &str, value: &str) -> (ConstraintDescriptor, Option<Error>) {
    match parse_rule(key, value) {
        Ok(descriptor) => (descriptor, None),
        Err(e) => {
            warn!("{}; falling back to a non-required string", e);
            (ConstraintDescriptor::fallback(key), Some(e))
        }
    }
}

/// Parse a whole rule map in declaration order.
///
/// Entries whose key has no usable field name are dropped; the other
/// malformed entries are recovered. All errors are returned alongside.
pub fn parse_rules(rules: &IndexMap<String, String>) -> (Vec<ConstraintDescriptor>, Vec<Error>) {
    debug!("Parsing {} rule entries", rules.len());
    let mut descriptors = Vec::with_capacity(rules.len());
    let mut errors = Vec::new();

    for (key, value) in rules {
        let (descriptor, error) = parse_rule_or_default(key, value);
        if !descriptor.field_path.is_empty() {
            descriptors.push(descriptor);
        }
        errors.extend(error);
    }

    (descriptors, errors)
}

fn typed_default(kind: ValueKind, raw: &str) -> Value {
    match kind {
        ValueKind::Integer => raw
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(raw.to_string())),
        ValueKind::Number => raw
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(raw.to_string())),
        ValueKind::Boolean => match raw {
            "true" | "1" => Value::Bool(true),
            "false" | "0" => Value::Bool(false),
            _ => Value::String(raw.to_string()),
        },
        _ => Value::String(raw.to_string()),
    }
}
