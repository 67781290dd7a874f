//! lentil: entry point.
//!
//! ```text
//! lentil stats                      Server statistics
//! lentil put "hello" --tube mail    Insert a job
//! lentil drain mail                 Delete every ready job in a tube
//! lentil --json stats-tube mail     Any command, JSON output
//! lentil --gen-config               Write default config to stdout
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{CommandFactory, Parser};
use lentil_core::{Client, Observer, TracingObserver};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use lentil_cli::commands::{self, Action, Format};
use lentil_cli::config::CliConfig;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "lentil", version, about = "Command-line client for beanstalkd")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, global = true, default_value = "lentil.toml")]
    config: PathBuf,

    /// Server address (host:port); overrides the config file.
    #[arg(long, global = true)]
    addr: Option<String>,

    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    #[command(subcommand)]
    action: Option<Action>,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        println!("{}", CliConfig::default_toml()?);
        return Ok(());
    }

    let Some(action) = cli.action else {
        Cli::command().print_help()?;
        std::process::exit(2);
    };

    let config = CliConfig::load(&cli.config);

    // Logs go to stderr so stdout stays machine-readable.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let addr = cli.addr.unwrap_or(config.server.address);
    let format = if cli.json { Format::Json } else { Format::Text };
    info!("lentil v{} → {addr}", env!("CARGO_PKG_VERSION"));

    let observer: Arc<dyn Observer> = Arc::new(TracingObserver);
    let mut client = Client::connect_with(&addr, &config.client, observer).await?;

    let mut stdout = std::io::stdout();
    commands::run(&mut client, &action, &config.defaults, format, &mut stdout).await?;

    if let Err(e) = client.quit().await {
        debug!(error = %e, "quit failed");
    }
    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────
