//! Serialization module for converting OpenAPI documents to YAML or JSON format.
//!
//! This module provides functions to serialize OpenAPI documents into standard formats,
//! resolve the per-group output path and write the result to disk.

use crate::config::OutputFormat;
use crate::error::{Error, Result};
use crate::openapi_builder::OpenApiDocument;
use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};

/// Token replaced by the server group name in output path templates
pub const SERVER_TOKEN: &str = "{server}";

/// Serializes an OpenAPI document to YAML format.
///
/// # Errors
///
/// Returns [`Error::Serialization`] if serialization fails.
pub fn serialize_yaml(doc: &OpenApiDocument) -> Result<String> {
    debug!("Serializing OpenAPI document to YAML");
    Ok(serde_yaml::to_string(doc)?)
}

/// Serializes an OpenAPI document to JSON format with pretty printing.
///
/// Key order follows insertion order, so regenerating an unchanged route set
/// yields byte-identical output.
///
/// # Errors
///
/// Returns [`Error::Serialization`] if serialization fails.
pub fn serialize_json(doc: &OpenApiDocument) -> Result<String> {
    debug!("Serializing OpenAPI document to JSON");
    Ok(serde_json::to_string_pretty(doc)?)
}

/// Serializes in the requested format.
pub fn serialize(doc: &OpenApiDocument, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => serialize_json(doc),
        OutputFormat::Yaml => serialize_yaml(doc),
    }
}

/// Resolve the output path of one group.
///
/// `{server}` is replaced by the group name. When several groups are written
/// and the template has no `{server}`, `_<group>` is inserted before the
/// extension so the documents do not overwrite each other.
///
/// ```
/// use openapi_from_metadata::serializer::resolve_output_path;
/// use std::path::PathBuf;
///
/// assert_eq!(resolve_output_path("docs/{server}.json", "http", true), PathBuf::from("docs/http.json"));
/// assert_eq!(resolve_output_path("docs/openapi.json", "admin", true), PathBuf::from("docs/openapi_admin.json"));
/// assert_eq!(resolve_output_path("docs/openapi.json", "http", false), PathBuf::from("docs/openapi.json"));
/// ```
pub fn resolve_output_path(template: &str, group: &str, multiple_groups: bool) -> PathBuf {
    if template.contains(SERVER_TOKEN) {
        return PathBuf::from(template.replace(SERVER_TOKEN, group));
    }
    if !multiple_groups {
        return PathBuf::from(template);
    }

    warn!(
        "Output path {} has no {} token but several groups are built, appending _{}",
        template, SERVER_TOKEN, group
    );
    let path = Path::new(template);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = match path.extension() {
        Some(ext) => format!("{}_{}.{}", stem, group, ext.to_string_lossy()),
        None => format!("{}_{}", stem, group),
    };
    path.with_file_name(file_name)
}

/// Writes string content to a file, creating parent directories.
///
/// # Errors
///
/// Returns [`Error::OutputWriteFailure`] if the directory or file cannot be
/// written.
pub fn write_to_file(content: &str, path: &Path) -> Result<()> {
    debug!("Writing content to file: {}", path.display());

    let failure = |source| Error::OutputWriteFailure {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(failure)?;
    }
    fs::write(path, content).map_err(failure)?;

    debug!("Successfully wrote {} bytes to {}", content.len(), path.display());
    Ok(())
}
