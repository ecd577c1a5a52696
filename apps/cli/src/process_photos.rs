use anyhow::{Context, Result};
use catalog::CatalogBuilder;
use tracing::info;

fn main() -> Result<()> {
    portfolio_cli::init_logging();

    let settings = portfolio_cli::load_settings()?;
    let catalog_path = settings.catalog_file.clone();
    let report = CatalogBuilder::new(settings)
        .build()
        .with_context(|| format!("Failed to build catalog {}", catalog_path.display()))?;

    for line in portfolio_cli::build_summary(&report) {
        info!("{line}");
    }
    Ok(())
}
