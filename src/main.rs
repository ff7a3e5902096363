use clap::Parser;
use oauth_usage::{CliOverrides, Config, FileConfig, ReqwestTransport, UsageError};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "oauth-usage")]
#[command(about = "Query Claude OAuth usage (five_hour / seven_day) via CLIProxyAPI management endpoints")]
struct Cli {
    /// Proxy base URL (env: CLAUDE_PROXY_BASE_URL)
    #[arg(long)]
    base_url: Option<String>,

    /// Provider filter for /v0/management/auth-files [default: claude]
    #[arg(long)]
    provider: Option<String>,

    /// Limit query to specific auth_index (repeatable, or comma-separated)
    #[arg(long = "auth-index")]
    auth_index: Vec<String>,

    /// HTTP timeout in seconds (env: CLAUDE_PROXY_TIMEOUT_S) [default: 20]
    #[arg(long)]
    timeout: Option<u64>,

    /// Print full JSON per auth entry, including the raw api-call wrapper
    #[arg(long)]
    json: bool,

    /// Pretty-print the parsed upstream usage JSON per auth entry
    #[arg(long)]
    pretty_body: bool,

    /// Config file (default: ~/.config/oauth-usage/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable debug logging on stderr
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.debug);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", err);
            ExitCode::from(err.exit_code())
        }
    }
}

async fn run(cli: Cli) -> Result<(), UsageError> {
    let file = FileConfig::load_for_run(cli.config.as_deref())?;
    let overrides = CliOverrides {
        base_url: cli.base_url,
        provider: cli.provider,
        auth_indices: cli.auth_index,
        timeout_secs: cli.timeout,
        json: cli.json,
        pretty_body: cli.pretty_body,
    };
    let config = Config::resolve(overrides, |key| std::env::var(key).ok(), file)?;

    let transport = ReqwestTransport::new(config.timeout)?;
    let stdout = std::io::stdout();
    oauth_usage::run(&config, &transport, &mut stdout.lock()).await
}

fn setup_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("oauth_usage=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("oauth_usage=warn"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}
