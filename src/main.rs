//! Command-line entry point.
//!
//! Exit status: 0 when every case passed, 1 when at least one case failed,
//! 2 on a fatal error (configuration, connectivity, I/O).

use ad_roundtrip::config::{HarnessConfig, ReportFormat};
use ad_roundtrip::error::HarnessError;
use ad_roundtrip::logging;
use ad_roundtrip::params::DataType;
use ad_roundtrip::pv::SimulatedIoc;
use ad_roundtrip::runner::MatrixRunner;
use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "ad_roundtrip", version, about = "Round-trip verification of detector array injection")]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "config/harness.toml")]
    config: PathBuf,

    /// Run only this scenario (repeatable)
    #[arg(short, long = "scenario")]
    scenarios: Vec<String>,

    /// Run only this data type (repeatable), e.g. uint8
    #[arg(short = 't', long = "data-type")]
    data_types: Vec<DataType>,

    /// Report format
    #[arg(short, long, value_enum)]
    format: Option<ReportFormat>,

    /// Write the report here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Seed for frame generation
    #[arg(long)]
    seed: Option<u64>,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    dump_config: bool,
}

fn effective_config(cli: &Cli) -> Result<HarnessConfig> {
    let mut config = HarnessConfig::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    if !cli.scenarios.is_empty() {
        for name in &cli.scenarios {
            if config.scenario(name).is_none() {
                bail!("unknown scenario '{name}'");
            }
        }
        config.scenarios.retain(|s| cli.scenarios.contains(&s.name));
    }
    if !cli.data_types.is_empty() {
        for scenario in &mut config.scenarios {
            scenario.data_types = cli.data_types.clone();
        }
    }
    if let Some(seed) = cli.seed {
        config.frame.seed = Some(seed);
    }
    if let Some(format) = cli.format {
        config.report.format = format;
    }
    if let Some(output) = &cli.output {
        config.report.output = Some(output.clone());
    }

    config.validate()?;
    Ok(config)
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = effective_config(&cli)?;
    if cli.dump_config {
        print!("{}", toml::to_string_pretty(&config)?);
        return Ok(ExitCode::SUCCESS);
    }

    logging::init_from_config(&config)?;
    info!(
        prefix = %config.control_plane.prefix,
        shape = %config.frame.shape(),
        scenarios = config.scenarios.len(),
        "starting round-trip run"
    );

    let ioc = Arc::new(SimulatedIoc::spawn(
        config.control_plane.clone(),
        &config.simulator,
    ));
    let mut runner = MatrixRunner::new(ioc, &config);
    let report = runner.run_all(&config.scenarios).await?;

    let rendered = report.render(config.report.format)?;
    match &config.report.output {
        Some(path) => {
            tokio::fs::write(path, rendered)
                .await
                .map_err(HarnessError::from)
                .with_context(|| format!("writing report to {}", path.display()))?;
            info!(path = %path.display(), "report written");
        }
        None => print!("{rendered}"),
    }

    if report.all_passed() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(1))
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            error!(error = %err, "run aborted");
            eprintln!("Error: {err:#}");
            ExitCode::from(2)
        }
    }
}
