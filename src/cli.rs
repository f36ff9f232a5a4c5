use crate::config::{BuildConfig, OutputFormat, PlacementPolicy, UnresolvedRuleSetPolicy};
use crate::generator::BuildReport;
use crate::openapi_builder::OpenApiDocument;
use crate::serializer::{resolve_output_path, write_to_file};
use anyhow::Result;
use clap::Parser;
use log::{debug, error, info, warn};
use std::path::PathBuf;

/// OpenAPI from Metadata - Generate OpenAPI documents from route metadata manifests
#[derive(Parser, Debug)]
#[command(name = "openapi-from-metadata")]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Manifest file, or directory scanned for manifests
    #[arg(value_name = "MANIFEST_PATH")]
    pub manifest_path: PathBuf,

    /// Build configuration file (YAML or JSON)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config_path: Option<PathBuf>,

    /// Output path template, `{server}` is replaced by the group name
    /// (if not specified, outputs to stdout)
    #[arg(short = 'o', long = "output", value_name = "TEMPLATE")]
    pub output: Option<String>,

    /// Output format (json or yaml)
    #[arg(short = 'f', long = "format", value_enum)]
    pub output_format: Option<OutputFormat>,

    /// Only build these server groups
    #[arg(long = "server", value_name = "NAME")]
    pub servers: Vec<String>,

    /// What to do with routes whose rule set cannot be resolved
    #[arg(long = "on-unresolved", value_enum)]
    pub on_unresolved: Option<UnresolvedRuleSetPolicy>,

    /// Where validation fields are placed
    #[arg(long = "placement", value_enum)]
    pub placement: Option<PlacementPolicy>,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

/// Validate and log already-parsed arguments
pub fn parse_args_from_parsed(args: CliArgs) -> Result<CliArgs> {
    debug!("Parsed arguments: {:?}", args);

    if !args.manifest_path.exists() {
        anyhow::bail!(
            "Manifest path does not exist: {}",
            args.manifest_path.display()
        );
    }
    if let Some(config) = &args.config_path {
        if !config.is_file() {
            anyhow::bail!("Config file does not exist: {}", config.display());
        }
    }

    info!("Manifest path: {}", args.manifest_path.display());
    match &args.output {
        Some(output) => info!("Output: {}", output),
        None => info!("Output: stdout"),
    }

    Ok(args)
}

/// Load the configuration file, if any, and apply command line overrides
pub fn load_config(args: &CliArgs) -> Result<BuildConfig> {
    let mut config = match &args.config_path {
        Some(path) => BuildConfig::from_file(path)?,
        None => BuildConfig::default(),
    };

    if let Some(output) = &args.output {
        config.output_file = Some(output.clone());
    }
    if let Some(format) = args.output_format {
        config.format = format;
    }
    if let Some(policy) = args.on_unresolved {
        config.on_unresolved_rule_set = policy;
    }
    if let Some(placement) = args.placement {
        config.parameter_placement = placement;
    }
    Ok(config)
}

/// Run the main workflow
pub fn run(args: CliArgs) -> Result<()> {
    use crate::generator::DocumentGenerator;
    use crate::metadata::{Catalog, MetadataSource};
    use crate::parser::{ManifestParser, Manifest};
    use crate::rule_set::RuleSetIndex;
    use crate::scanner::FileScanner;
    use crate::serializer::serialize;

    info!("Starting OpenAPI document generation...");
    let config = load_config(&args)?;

    // Step 1: Find manifest files
    info!("Scanning manifests...");
    let scanner = FileScanner::new(args.manifest_path.clone());
    let scan_result = scanner.scan()?;
    info!("Found {} manifest files", scan_result.manifest_files.len());

    if scan_result.manifest_files.is_empty() {
        anyhow::bail!("No manifest files found in {}", args.manifest_path.display());
    }

    // Step 2: Decode manifests, skipping the ones that fail
    let manifests: Vec<Manifest> = ManifestParser::parse_files(&scan_result.manifest_files)
        .into_iter()
        .filter_map(|r| match r {
            Ok(parsed) => Some(parsed.manifest),
            Err(e) => {
                debug!("Skipping manifest due to parse error: {}", e);
                None
            }
        })
        .collect();
    info!("Successfully parsed {} manifests", manifests.len());

    if manifests.is_empty() {
        anyhow::bail!("No manifest could be parsed successfully");
    }

    // Step 3: Index routes and rule sets
    let catalog = Catalog::from_manifests(&manifests);
    let rule_sets = RuleSetIndex::from_manifests(&manifests);
    info!(
        "Indexed {} routes and {} rule sets",
        catalog.routes().len(),
        rule_sets.len()
    );

    // Step 4: Build one document per group
    let generator = DocumentGenerator::new(&config, &catalog, &rule_sets);
    let report = if args.servers.is_empty() {
        generator.build_all()?
    } else {
        generator.build_groups(&args.servers)?
    };

    // Step 5: Serialize and write each successful group
    let failed = emit_documents(&report, &config, serialize);

    info!("Generation complete!");
    info!("Summary:");
    info!("  - Manifests parsed: {}", manifests.len());
    info!("  - Routes found: {}", catalog.routes().len());
    info!("  - Groups built: {}", report.outcomes.len() - failed.len());

    if !failed.is_empty() {
        anyhow::bail!("Failed to build server groups: {}", failed.join(", "));
    }
    Ok(())
}

/// Serialize and write (or print) every built group with `render`.
///
/// A group that failed to build, serialize or write is reported and skipped;
/// the others are still emitted. Returns the names of the failed groups.
pub fn emit_documents<F>(report: &BuildReport, config: &BuildConfig, render: F) -> Vec<String>
where
    F: Fn(&OpenApiDocument, OutputFormat) -> crate::error::Result<String>,
{
    let multiple_groups = report.outcomes.len() > 1;
    let mut failed = Vec::new();
    for outcome in &report.outcomes {
        for diagnostic in &outcome.diagnostics {
            warn!("[{}] {}: {}", outcome.group, diagnostic.route, diagnostic.message);
        }

        let document = match &outcome.result {
            Ok(document) => document,
            Err(_) => {
                failed.push(outcome.group.clone());
                continue;
            }
        };

        let content = match render(document, config.format) {
            Ok(content) => content,
            Err(e) => {
                error!("Failed to serialize {} document: {}", outcome.group, e);
                failed.push(outcome.group.clone());
                continue;
            }
        };
        match &config.output_file {
            Some(template) => {
                let path = resolve_output_path(template, &outcome.group, multiple_groups);
                match write_to_file(&content, &path) {
                    Ok(()) => info!("Wrote {} document to {}", outcome.group, path.display()),
                    Err(e) => {
                        error!("{}", e);
                        failed.push(outcome.group.clone());
                    }
                }
            }
            None => println!("{}", content),
        }
    }
    failed
}
