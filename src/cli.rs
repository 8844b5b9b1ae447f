use crate::adapter::plan_route;
use crate::catalog::TypeCatalog;
use crate::declare::extract_routes;
use crate::openapi_builder::{build_document, DocumentConfig, Info};
use crate::parser::AstParser;
use crate::route::RouteDecl;
use crate::scanner::FileScanner;
use crate::serializer::{serialize, write_to_file, OutputFormat};
use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info, warn};
use std::path::PathBuf;

/// Generate an OpenAPI document from route-annotated handler declarations
#[derive(Parser, Debug)]
#[command(name = "sigroute")]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to the Rust project directory
    #[arg(value_name = "PROJECT_PATH")]
    pub project_path: PathBuf,

    /// Output format; guessed from the output file extension, YAML otherwise
    #[arg(short = 'f', long = "format", value_enum)]
    pub output_format: Option<OutputFormat>,

    /// Output file path (if not specified, outputs to stdout)
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output_path: Option<PathBuf>,

    /// API title
    #[arg(long, default_value = "Generated API")]
    pub title: String,

    /// API version
    #[arg(long = "api-version", default_value = "1.0.0")]
    pub api_version: String,

    /// API description
    #[arg(long)]
    pub description: Option<String>,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

impl CliArgs {
    pub fn format(&self) -> OutputFormat {
        self.output_format
            .or_else(|| self.output_path.as_deref().and_then(OutputFormat::from_extension))
            .unwrap_or(OutputFormat::Yaml)
    }
}

/// Validate and log already-parsed arguments
pub fn validate_args(args: CliArgs) -> Result<CliArgs> {
    debug!("Parsed arguments: {:?}", args);
    if !args.project_path.is_dir() {
        anyhow::bail!("Project path is not a directory: {}", args.project_path.display());
    }

    info!("Project path: {}", args.project_path.display());
    info!("Output format: {:?}", args.format());
    match &args.output_path {
        Some(output) => info!("Output file: {}", output.display()),
        None => info!("Output: stdout"),
    }
    Ok(args)
}

/// Scans the project, collects its declared routes and type definitions,
/// and renders the document.
pub fn generate(args: &CliArgs) -> Result<String> {
    let scanner = FileScanner::new(args.project_path.clone());
    let scan_result = scanner.scan_non_empty()?;
    info!("Found {} Rust files", scan_result.rust_files.len());

    let parsed_files = AstParser::parse_project(&args.project_path, &scan_result.rust_files);
    if parsed_files.is_empty() {
        anyhow::bail!("No files could be parsed successfully");
    }

    let catalog = TypeCatalog::from_parsed_files(&parsed_files);
    let declared = extract_routes(&parsed_files);
    let routes: Vec<RouteDecl> = declared
        .into_iter()
        .filter(|route| match plan_route(route, &catalog) {
            Ok(_) => true,
            Err(e) => {
                warn!("Skipping {} {}: {}", route.method, route.path, e);
                false
            }
        })
        .collect();
    if routes.is_empty() {
        warn!("No routes found in the project");
    }
    info!(
        "Documenting {} routes with {} known types",
        routes.len(),
        catalog.len()
    );

    let config = DocumentConfig {
        info: Info {
            title: args.title.clone(),
            version: args.api_version.clone(),
            description: args.description.clone(),
        },
        ..DocumentConfig::default()
    };
    let document =
        build_document(&routes, &catalog, &config).context("Failed to build the OpenAPI document")?;
    serialize(&document, args.format())
}

/// Run the main workflow
pub fn run(args: CliArgs) -> Result<()> {
    let content = generate(&args)?;
    match &args.output_path {
        Some(output_path) => {
            write_to_file(&content, output_path)?;
            info!("Wrote OpenAPI document to {}", output_path.display());
        }
        None => println!("{}", content),
    }
    Ok(())
}
