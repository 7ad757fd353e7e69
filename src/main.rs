use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use pantilt_runtime::config::{Config, ConfigError};

/// Pan/tilt rig controller: keyboard and UDP commands, software limits, auto tracking
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// JSON config file (defaults are used for anything it leaves out)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial port of the motor bus
    #[arg(long)]
    port: Option<String>,

    /// Serial baud rate
    #[arg(long)]
    baud: Option<u32>,

    /// Command server address (ip:port)
    #[arg(long)]
    server: Option<String>,

    /// Keyboard control only
    #[arg(long)]
    no_network: bool,

    /// Network control only
    #[arg(long)]
    no_keyboard: bool,
}

impl Args {
    fn into_config(self) -> Result<Config, ConfigError> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };

        if let Some(port) = self.port {
            config.serial.port = port;
        }
        if let Some(baud) = self.baud {
            config.serial.baud_rate = baud;
        }
        if let Some(server) = self.server {
            config.network.server_addr = server;
        }
        if self.no_network {
            config.network.enabled = false;
        }
        if self.no_keyboard {
            config.keyboard_enabled = false;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    let config = match Args::parse().into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Config error: {}", e);
            std::process::exit(2);
        }
    };

    if let Err(e) = pantilt_runtime::runtime::run(config).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
