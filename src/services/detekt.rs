//! Detekt configuration and invocation.

use crate::models::AnalyzerConfig;
use crate::services::tools::ToolInvocation;
use anyhow::{Context, Result};
use camino::Utf8Path;
use std::fs;

/// Default detekt rule configuration, written next to the project when none exists
pub const DEFAULT_DETEKT_CONFIG: &str = include_str!("../../assets/detekt-config.yml");

/// Write the default detekt config to `path` unless a file is already there.
///
/// Returns `true` if the file was written.
pub fn ensure_config_file(path: &Utf8Path) -> Result<bool> {
    if path.exists() {
        tracing::debug!("Keeping existing detekt config at {}", path);
        return Ok(false);
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent))?;
    }

    fs::write(path, DEFAULT_DETEKT_CONFIG)
        .with_context(|| format!("Failed to write detekt config: {}", path))?;

    tracing::info!("Wrote default detekt config to {}", path);
    Ok(true)
}

/// Build the detekt-cli command for the project.
///
/// Sources default to `src/main/java`, narrowed to the package directory when
/// coverage settings name one.
pub fn detekt_invocation(config: &AnalyzerConfig, project_dir: &Utf8Path) -> ToolInvocation {
    let input = config
        .coverage()
        .map(|target| target.source_dir())
        .unwrap_or_else(|| "src/main/java".to_string());

    let mut invocation = ToolInvocation::new(&config.tools().detekt)
        .current_dir(project_dir)
        .args(["--input".to_string(), input])
        .args([
            "--config".to_string(),
            config.detekt_config_file_name().to_string(),
        ])
        .args([
            "--report".to_string(),
            format!("xml:{}", config.detekt_report_path()),
        ]);

    if let Some(baseline) = config.detekt_baseline() {
        invocation = invocation.args(["--baseline", baseline]);
    }

    invocation
}
