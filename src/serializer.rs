//! Rendering OpenAPI documents as YAML or JSON, to a string or a file.

use crate::openapi_builder::OpenApiDocument;
use anyhow::{Context, Result};
use clap::ValueEnum;
use log::debug;
use std::fs;
use std::path::Path;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// YAML format
    Yaml,
    /// JSON format, pretty-printed
    Json,
}

impl OutputFormat {
    /// Picks a format from a file extension, `None` when it is neither.
    pub fn from_extension(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Some(OutputFormat::Yaml),
            "json" => Some(OutputFormat::Json),
            _ => None,
        }
    }
}

pub fn serialize(doc: &OpenApiDocument, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Yaml => serialize_yaml(doc),
        OutputFormat::Json => serialize_json(doc),
    }
}

pub fn serialize_yaml(doc: &OpenApiDocument) -> Result<String> {
    debug!("Serializing OpenAPI document to YAML");
    serde_yaml::to_string(doc).context("Failed to serialize OpenAPI document to YAML")
}

pub fn serialize_json(doc: &OpenApiDocument) -> Result<String> {
    debug!("Serializing OpenAPI document to JSON");
    serde_json::to_string_pretty(doc).context("Failed to serialize OpenAPI document to JSON")
}

/// Writes `content` to `path`, creating missing parent directories.
pub fn write_to_file(content: &str, path: &Path) -> Result<()> {
    debug!("Writing content to file: {}", path.display());
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    fs::write(path, content).with_context(|| format!("Failed to write to file: {}", path.display()))?;
    debug!("Wrote {} bytes to {}", content.len(), path.display());
    Ok(())
}
