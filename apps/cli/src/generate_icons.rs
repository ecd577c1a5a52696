use anyhow::{Context, Result};
use engine::IconGenerator;
use tracing::info;

fn main() -> Result<()> {
    portfolio_cli::init_logging();

    let settings = portfolio_cli::load_settings()?;
    let generator = IconGenerator::new(&settings.icon_source, &settings.public_dir);
    info!("Generating icons from {}", generator.source().display());

    let icons = generator.generate().with_context(|| {
        format!(
            "Failed to generate icons into {}",
            settings.public_dir.display()
        )
    })?;

    for line in portfolio_cli::icon_summary(&icons) {
        info!("{line}");
    }
    Ok(())
}
