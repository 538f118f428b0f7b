use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use swerve_module_runtime::config::ModuleConfig;
use swerve_module_runtime::swerve::OperatingMode;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    Teleop,
    Autonomous,
}

impl From<Mode> for OperatingMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Teleop => OperatingMode::Teleop,
            Mode::Autonomous => OperatingMode::Autonomous,
        }
    }
}

/// Simulated swerve module runtime over zenoh
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// JSON module config; defaults are used for missing fields
    #[arg(long)]
    config: Option<PathBuf>,

    /// Module name, used in topic keys (overrides the config file)
    #[arg(long)]
    name: Option<String>,

    /// Gain profile loaded at startup (overrides the config file)
    #[arg(long, value_enum)]
    mode: Option<Mode>,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init(); // installs the subscriber globally

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => match ModuleConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Config error ({}): {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => ModuleConfig::default(),
    };
    if let Some(name) = args.name {
        config.name = name;
    }
    if let Some(mode) = args.mode {
        config.initial_mode = mode.into();
    }

    if let Err(e) = swerve_module_runtime::runtime::run(config).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
