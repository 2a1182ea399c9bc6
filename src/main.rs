use clap::Parser;
use identity_console::app::App;
use identity_console::config::{ConfigError, ConsoleConfig, normalize_api_url};
use identity_console::console::{self, Flow};
use identity_console::net::types::ApiError;
use identity_console::services::session::SessionContext;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum ConsoleError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("could not start the HTTP client: {0}")]
    Api(#[from] ApiError),
    #[error("terminal I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Parser, Debug)]
#[command(name = "identity-console", about = "Account console for the identity API")]
struct Cli {
    /// Base URL of the identity API; overrides `IDENTITY_API_URL`.
    #[arg(long)]
    api_url: Option<String>,

    /// Resume a session with an existing token instead of logging in.
    #[arg(long, env = "IDENTITY_TOKEN")]
    token: Option<String>,

    /// Log filter directives, e.g. `identity_console=debug`.
    #[arg(long, env = "IDENTITY_LOG", default_value = "warn")]
    log: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&cli.log).unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        tracing::error!(error = %e, "console exited");
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), ConsoleError> {
    let mut config = ConsoleConfig::from_env()?;
    if let Some(url) = cli.api_url.as_deref() {
        config.api_url = normalize_api_url(url);
    }
    tracing::info!(api_url = %config.api_url, refresh_secs = config.refresh_interval.as_secs(), "identity console starting");

    let session = SessionContext::from_config(&config)?;
    if let Some(token) = cli.token.as_deref() {
        if let Err(e) = session.resume(token).await {
            tracing::warn!(error = %e, "could not resume session from token");
        }
    }

    let mut app = App::new(session);
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    stdout.write_all(app.render().as_bytes()).await?;
    stdout.write_all(b"> ").await?;
    stdout.flush().await?;

    while let Some(line) = lines.next_line().await? {
        let command = match console::parse_line(&line) {
            Ok(Some(command)) => command,
            Ok(None) => {
                stdout.write_all(b"> ").await?;
                stdout.flush().await?;
                continue;
            }
            Err(e) => {
                stdout.write_all(e.render().to_string().as_bytes()).await?;
                stdout.write_all(b"> ").await?;
                stdout.flush().await?;
                continue;
            }
        };

        match console::execute(&mut app, command).await {
            Ok(Flow::Quit) => break,
            Ok(Flow::Continue) => {}
            Err(e) => tracing::debug!(error = %e, "command failed"),
        }
        stdout.write_all(app.render().as_bytes()).await?;
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
    }

    app.session().logout();
    Ok(())
}
