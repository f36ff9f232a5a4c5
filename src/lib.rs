//! OpenAPI from Metadata - OpenAPI documents from declarative route metadata.
//!
//! This library synthesizes OpenAPI 3 documents from metadata records attached to route
//! handlers (paths, methods, validation rule strings, response examples) without ever
//! running those handlers. One document is produced per server group.
//!
//! # Architecture
//!
//! The library is organized into several modules that work together:
//!
//! 1. [`scanner`] - Recursively finds manifest files
//! 2. [`parser`] - Decodes manifests into metadata records
//! 3. [`metadata`] - Route, controller and declaration records, and the [`metadata::MetadataSource`] lookup
//! 4. [`rule_set`] - Named rule sets and scene resolution
//! 5. [`rule_parser`] - Parses the `required|integer|min:3` rule mini-language
//! 6. [`schema_generator`] - Converts constraints and example data to schemas
//! 7. [`registry`] - Per-build store of named definitions
//! 8. [`path_normalizer`] - Canonical document paths
//! 9. [`operation_builder`] - One operation per route
//! 10. [`openapi_builder`] - Assembles the document
//! 11. [`generator`] - Per-server-group builds and their results
//! 12. [`serializer`] - Serializes the document to JSON or YAML and writes it
//!
//! # Example Usage
//!
//! ```
//! use openapi_from_metadata::{
//!     config::BuildConfig,
//!     generator::DocumentGenerator,
//!     metadata::Catalog,
//!     parser::Manifest,
//!     rule_set::RuleSetIndex,
//!     serializer::serialize_json,
//! };
//!
//! let manifest: Manifest = serde_yaml::from_str(r#"
//! controllers:
//!   - class: UserController
//!     prefix: /users
//!     routes:
//!       - action: create
//!         methods: [POST]
//!         declarations:
//!           - kind: validation
//!             rules:
//!               "username|用户名": required|string|min:3|max:20
//! "#).unwrap();
//! let manifests = [manifest];
//!
//! let config = BuildConfig::default();
//! let catalog = Catalog::from_manifests(&manifests);
//! let rule_sets = RuleSetIndex::from_manifests(&manifests);
//!
//! let report = DocumentGenerator::new(&config, &catalog, &rule_sets).build_all().unwrap();
//! let document = report.document("http").unwrap();
//! assert!(document.paths["/users"].post.is_some());
//! println!("{}", serialize_json(document).unwrap());
//! ```
//!
//! # Command-Line Interface
//!
//! For command-line usage, see the [`cli`] module which provides a complete CLI application.

pub mod cli;
pub mod config;
pub mod error;
pub mod generator;
pub mod metadata;
pub mod openapi_builder;
pub mod operation_builder;
pub mod parser;
pub mod path_normalizer;
pub mod registry;
pub mod rule_parser;
pub mod rule_set;
pub mod scanner;
pub mod schema_generator;
pub mod serializer;
