use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Web file manager serving a single directory tree over HTTP.
#[derive(Debug, Parser)]
#[command(name = "atticd", version, about)]
struct Cli {
    /// Host to bind
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = 8000)]
    port: u16,

    /// Root directory to serve
    #[arg(short, long, default_value = ".")]
    root: std::path::PathBuf,

    /// Shared password for basic auth (clients may send it bare or as user:password)
    #[arg(long)]
    auth: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    // The root is validated once here; the server only ever sees the
    // canonicalized result.
    let root = atticd::resolve::Root::open(&cli.root)?;

    // Startup banner at info level so something always prints at default verbosity
    info!(
        "atticd starting: root='{}', host={}, port={}, auth={}",
        root.as_path().display(),
        cli.host,
        cli.port,
        if cli.auth.is_some() { "enabled" } else { "disabled" }
    );

    let state = atticd::server::AppState::new(root, cli.auth);
    atticd::server::run(&cli.host, cli.port, state).await
}
