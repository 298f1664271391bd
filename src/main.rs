use std::process::ExitCode;

use anyhow::{Context as _, Result};
use clap::Parser;

use field_relay::config::Config;

#[derive(Debug, Parser)]
#[command(name = "field-relay")]
#[command(about = "Relay between an HTTP API and radio-attached field nodes")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "RELAY_CONFIG", default_value = "relay.toml")]
    config: String,

    /// Radio modem serial port (e.g. /dev/serial0)
    #[arg(short, long, env = "RELAY_PORT")]
    port: Option<String>,

    /// HTTP listen address
    #[arg(short, long, env = "RELAY_BIND")]
    bind: Option<String>,

    /// Reading store: sqlx SQLite URL or ":memory:"
    #[arg(long, env = "DATABASE_URL")]
    database: Option<String>,

    /// Run without the modem; commands are only logged
    #[arg(long)]
    mock: bool,

    /// Verbose logging (-v, -vv for more)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(port) = &self.port {
            config.radio.port = port.clone();
        }
        if let Some(bind) = &self.bind {
            config.http.bind = bind.clone();
        }
        if let Some(database) = &self.database {
            config.storage.database = database.clone();
        }
        if self.mock {
            config.radio.mock = true;
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        log::error!("{e:#}");
        eprintln!("{e:#}");
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

async fn run(cli: Cli) -> Result<()> {
    let loaded = Config::load(&cli.config).await?;
    let found = loaded.is_some();
    let mut config = loaded.unwrap_or_default();
    init_logging(&config, cli.verbose);
    if !found {
        log::info!("No config file at {}; using defaults", cli.config);
    }

    cli.apply(&mut config);
    config.validate().context("invalid configuration")?;

    log::info!("Starting field-relay v{}", env!("CARGO_PKG_VERSION"));
    field_relay::run(config).await
}

fn init_logging(config: &Config, verbosity: u8) {
    let level = match verbosity {
        0 => config
            .logging
            .level
            .parse()
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp_secs()
        .init();
}
