//! Shared plumbing for the `process-photos` and `generate-icons` binaries.

use std::fmt::Display;
use std::path::PathBuf;

use anyhow::{Context, Result};
use app_settings::PipelineSettings;
use catalog::BuildReport;
use core_types::timestamp::to_iso_millis;
use engine::GeneratedIcon;
use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber. `RUST_LOG` overrides the default `info` level.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();
}

/// Both tools operate on the project in the current working directory.
pub fn project_root() -> Result<PathBuf> {
    std::env::current_dir().context("Failed to determine the project root")
}

pub fn load_settings() -> Result<PipelineSettings> {
    let root = project_root()?;
    PipelineSettings::load(&root)
        .with_context(|| format!("Failed to load settings from {}", root.display()))
}

/// End-of-run summary for `process-photos`, one line per entry.
pub fn build_summary(report: &BuildReport) -> Vec<String> {
    let mut lines = vec![
        format!("Processed {} photos", report.written),
        format!(
            "  {} new, {} updated, {} unchanged",
            report.added, report.refreshed, report.reused
        ),
    ];
    if report.error_count() > 0 {
        lines.push(format!("  {} errors", report.error_count()));
    }
    if report.retained_stale > 0 {
        lines.push(format!(
            "  {} kept previous metadata after a failed refresh",
            report.retained_stale
        ));
    }
    if !report.removed.is_empty() {
        lines.push(format!("  {} removed", report.removed.len()));
    }
    lines.push(format!("Categories found: {}", join_or_none(&report.categories)));
    lines.push(format!("Seasons found: {}", join_or_none(&report.seasons)));
    lines.push(format!("Output: {}", report.catalog_path.display()));
    lines.push(format!("Last updated: {}", to_iso_millis(report.last_updated)));
    lines
}

/// End-of-run summary for `generate-icons`.
pub fn icon_summary(icons: &[GeneratedIcon]) -> Vec<String> {
    let mut lines = vec!["Generated icons:".to_string()];
    for icon in icons {
        let name = icon
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| icon.path.display().to_string());
        lines.push(format!("  - {name} ({}x{})", icon.width, icon.height));
    }
    lines.push(
        "Note: favicon.ico is not generated; convert favicon-32x32.png with a separate tool."
            .to_string(),
    );
    lines
}

fn join_or_none<T: Display>(items: &[T]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items
            .iter()
            .map(|item| item.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}
