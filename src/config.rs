//! Build configuration.
//!
//! Loaded from a YAML or JSON file (picked by extension); every field has a
//! default so an empty file, or no file at all, is a valid configuration with
//! a single `http` server group.

use crate::error::{Error, Result};
use crate::metadata::DeclaredDefinition;
use crate::openapi_builder::{Info, Tag};
use anyhow::Context;
use clap::ValueEnum;
use indexmap::IndexMap;
use log::debug;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Security requirement: scheme name -> scopes
pub type SecurityRequirement = IndexMap<String, Vec<String>>;

/// Complete configuration of a document build
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub info: Info,
    /// Server groups in declaration order
    pub servers: Vec<ServerGroup>,
    /// Group that unbound routes belong to; the first group when absent
    pub default_server: Option<String>,
    pub security_schemes: IndexMap<String, Value>,
    /// Explicit security requirements; one empty-scope entry per scheme when absent
    pub security: Option<Vec<SecurityRequirement>>,
    pub tags: Vec<Tag>,
    /// Definitions available to every group
    pub definitions: Vec<DeclaredDefinition>,
    /// Output path template, may contain `{server}`
    pub output_file: Option<String>,
    pub format: OutputFormat,
    pub on_unresolved_rule_set: UnresolvedRuleSetPolicy,
    pub parameter_placement: PlacementPolicy,
    pub operation_id: OperationIdConvention,
    pub ignore: Vec<IgnoreRule>,
}

/// One logical server group; each gets its own document
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerGroup {
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Output format options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JSON format
    #[default]
    Json,
    /// YAML format
    Yaml,
}

/// What to do with a route whose rule set cannot be resolved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum UnresolvedRuleSetPolicy {
    /// Drop the route, record a diagnostic and continue
    #[default]
    Skip,
    /// Fail the whole group
    Abort,
}

/// Where validation fields of non-path parameters go
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum PlacementPolicy {
    /// Read-style methods always use query parameters; otherwise the encoding decides
    #[default]
    MethodFirst,
    /// The declared encoding alone decides
    EncodingFirst,
}

/// How operationIds are derived
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum OperationIdConvention {
    /// `getUsersById`
    #[default]
    PathMethod,
    /// `UserController::show`
    Handler,
}

/// Excludes a controller, or one of its actions, from every document
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IgnoreRule {
    pub controller: String,
    #[serde(default)]
    pub action: Option<String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            info: Info::default(),
            servers: vec![ServerGroup {
                name: "http".to_string(),
                url: None,
                description: None,
            }],
            default_server: None,
            security_schemes: IndexMap::new(),
            security: None,
            tags: Vec::new(),
            definitions: Vec::new(),
            output_file: None,
            format: OutputFormat::default(),
            on_unresolved_rule_set: UnresolvedRuleSetPolicy::default(),
            parameter_placement: PlacementPolicy::default(),
            operation_id: OperationIdConvention::default(),
            ignore: Vec::new(),
        }
    }
}

impl BuildConfig {
    /// Load a configuration file. `.json` files are read as JSON, anything
    /// else as YAML.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        debug!("Loading configuration from {}", path.display());
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let is_json = path.extension().and_then(|s| s.to_str()) == Some("json");
        let config = if is_json {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        };
        Ok(config)
    }

    /// Check the structural invariants a build relies on.
    ///
    /// # Errors
    ///
    /// [`Error::NoServerGroups`] when no group is configured,
    /// [`Error::InvalidConfig`] for duplicate group names or an unknown
    /// `default_server`.
    pub fn validate(&self) -> Result<()> {
        if self.servers.is_empty() {
            return Err(Error::NoServerGroups);
        }

        let mut seen = HashSet::new();
        for server in &self.servers {
            if server.name.trim().is_empty() {
                return Err(Error::InvalidConfig("server name is empty".to_string()));
            }
            if !seen.insert(server.name.as_str()) {
                return Err(Error::InvalidConfig(format!(
                    "duplicate server group {}",
                    server.name
                )));
            }
        }

        if let Some(default) = &self.default_server {
            if self.server(default).is_none() {
                return Err(Error::InvalidConfig(format!(
                    "default_server {} is not a configured server group",
                    default
                )));
            }
        }
        Ok(())
    }

    /// Group that routes without an explicit binding belong to
    pub fn default_group(&self) -> Option<&str> {
        self.default_server
            .as_deref()
            .or_else(|| self.servers.first().map(|s| s.name.as_str()))
    }

    pub fn server(&self, name: &str) -> Option<&ServerGroup> {
        self.servers.iter().find(|s| s.name == name)
    }

    /// Security requirements attached to protected operations
    pub fn security_requirements(&self) -> Vec<SecurityRequirement> {
        match &self.security {
            Some(explicit) => explicit.clone(),
            None => self
                .security_schemes
                .keys()
                .map(|name| {
                    let mut requirement = IndexMap::new();
                    requirement.insert(name.clone(), Vec::new());
                    requirement
                })
                .collect(),
        }
    }

    /// Whether an ignore rule matches the handler
    pub fn is_ignored(&self, controller: &str, action: &str) -> bool {
        self.ignore.iter().any(|rule| {
            rule.controller == controller
                && rule.action.as_deref().map_or(true, |a| a == action)
        })
    }
}
