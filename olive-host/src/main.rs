use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};

use olive_host::{Document, Driver, HostConfig, HostEnvironment, abi};

/// Render a WASM module's pixel buffer to a PNG.
#[derive(Parser)]
#[command(name = "olive-host")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Module to load (.wasm or .wat)
    #[arg(short, long, default_value = abi::DEFAULT_MODULE_PATH)]
    module: PathBuf,

    /// Where to save the rendered canvas
    #[arg(short, long, default_value = abi::DEFAULT_OUTPUT_PATH)]
    output: PathBuf,

    /// Canvas width in pixels
    #[arg(long, default_value_t = abi::DEFAULT_WIDTH)]
    width: u32,

    /// Canvas height in pixels
    #[arg(long, default_value_t = abi::DEFAULT_HEIGHT)]
    height: u32,
}

impl Cli {
    fn into_config(self) -> HostConfig {
        HostConfig {
            module_path: self.module,
            output_path: self.output,
            width: self.width,
            height: self.height,
            ..HostConfig::default()
        }
    }
}

fn run(config: HostConfig) -> Result<()> {
    let mut document = Document::with_canvas(config.surface_id.clone());
    let driver = Driver::new(config)?;

    let loaded = driver.run(&HostEnvironment::empty(), &mut document)?;
    if !loaded.diagnostics().is_empty() {
        info!(
            "{} call(s) reached unimplemented imports",
            loaded.diagnostics().len()
        );
    }

    let config = driver.config();
    let canvas = document
        .get(&config.surface_id)
        .context("surface disappeared after rendering")?;
    canvas.write_png(&config.output_path)?;
    info!("saved {}", config.output_path.display());
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Cli::parse().into_config();
    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
