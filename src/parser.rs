use crate::error::Error;
use crate::metadata::{ControllerDescriptor, DeclaredDefinition};
use crate::rule_set::RuleSetDefinition;
use anyhow::{Context, Result};
use log::{debug, warn};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Parser for route manifest files.
///
/// A manifest carries the metadata records a web framework would otherwise
/// collect by reflection: controllers with their routes and declarations,
/// named rule sets, and free-standing definitions. Files ending in `.json` are
/// decoded as JSON, everything else as YAML.
///
/// # Example
///
/// ```no_run
/// use openapi_from_metadata::parser::ManifestParser;
/// use std::path::Path;
///
/// let parsed = ManifestParser::parse_file(Path::new("routes/user.yaml")).unwrap();
/// println!("Parsed {} controllers", parsed.manifest.controllers.len());
/// ```
pub struct ManifestParser;

/// Decoded content of one manifest file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Manifest {
    pub controllers: Vec<ControllerDescriptor>,
    pub rule_sets: Vec<RuleSetDefinition>,
    pub definitions: Vec<DeclaredDefinition>,
}

/// A successfully parsed manifest file.
#[derive(Debug)]
pub struct ParsedFile {
    /// Path to the manifest file
    pub path: PathBuf,
    pub manifest: Manifest,
}

impl ManifestParser {
    /// Parses a single manifest file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or does not decode as a
    /// manifest.
    pub fn parse_file(path: &Path) -> Result<ParsedFile> {
        debug!("Parsing file: {}", path.display());

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read file: {}", path.display()))?;

        let manifest = Self::parse_str(&content, path)?;

        debug!(
            "Parsed {}: {} controllers, {} rule sets",
            path.display(),
            manifest.controllers.len(),
            manifest.rule_sets.len()
        );

        Ok(ParsedFile {
            path: path.to_path_buf(),
            manifest,
        })
    }

    /// Decode manifest text; `path` only selects the format and labels errors.
    pub fn parse_str(content: &str, path: &Path) -> std::result::Result<Manifest, Error> {
        let is_json = path.extension().and_then(|s| s.to_str()) == Some("json");
        let decoded = if is_json {
            serde_json::from_str(content).map_err(|e| e.to_string())
        } else {
            serde_yaml::from_str(content).map_err(|e| e.to_string())
        };

        decoded.map_err(|message| Error::ManifestParse {
            file: path.to_path_buf(),
            message,
        })
    }

    /// Parses multiple manifest files, continuing even if some fail.
    ///
    /// Files that fail to parse are logged as warnings; the returned vector
    /// has one result per input path.
    pub fn parse_files(paths: &[PathBuf]) -> Vec<Result<ParsedFile>> {
        debug!("Parsing {} files", paths.len());

        let results: Vec<Result<ParsedFile>> = paths
            .iter()
            .map(|path| match Self::parse_file(path) {
                Ok(parsed) => Ok(parsed),
                Err(e) => {
                    warn!("Failed to parse {}: {}", path.display(), e);
                    Err(e)
                }
            })
            .collect();

        let success_count = results.iter().filter(|r| r.is_ok()).count();
        debug!(
            "Parsing complete: {} succeeded, {} failed",
            success_count,
            results.len() - success_count
        );

        results
    }
}
