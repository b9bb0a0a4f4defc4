//! `sigcheck`: revalidates qlbridge's signatures against a server build.

use anyhow::Context;
use qlbridge::cli::CliArgs;
use qlbridge::config::{BridgeConfig, LoggingSettings};
use qlbridge::logging::setup_logging;
use qlbridge::sigcheck;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    // Resolution is logged per function at info; the report is the output.
    let logging = LoggingSettings {
        level: "warn".to_string(),
        ..Default::default()
    };
    setup_logging(&logging, false);

    let config = match &args.config {
        Some(path) => BridgeConfig::load_from_file(path).map_err(|e| anyhow::anyhow!("loading {}: {e}", path.display()))?,
        None => BridgeConfig::default(),
    };

    let image = tokio::fs::read(&args.image)
        .await
        .with_context(|| format!("reading {}", args.image.display()))?;
    info!("Scanning {} ({} bytes)", args.image.display(), image.len());

    let report = sigcheck::check(&image, args.module, &config.hooks.offsets);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{report}");
    }

    if report.missing() > 0 {
        std::process::exit(1);
    }
    Ok(())
}
