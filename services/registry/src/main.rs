//! Registry explorer server
//!
//! Run with: cargo run -p registry-explorer --features cli -- --registry-dir /var/lib/registry

use std::net::SocketAddr;

use camino::Utf8PathBuf;
use clap::Parser;
use registry_explorer::{Registry, Settings};
use tower_http::services::ServeDir;
use tracing_subscriber::EnvFilter;

/// Browse a Docker Registry v2 store over HTTP
#[derive(Debug, Parser)]
#[command(name = "registry-explorer", version)]
struct Args {
    /// TOML settings file; command line and environment values take precedence
    #[arg(long, short)]
    config: Option<Utf8PathBuf>,

    /// Directory holding docker/registry/v2
    #[arg(long, env = "REGISTRY_DIR")]
    registry_dir: Option<Utf8PathBuf>,

    /// Seconds before the repository listing is rescanned
    #[arg(long, env = "REGISTRY_LOAD_TTL")]
    registry_load_ttl: Option<f64>,

    /// Seconds before a repository's tags and revisions are rescanned
    #[arg(long, env = "REPOSITORY_LOAD_TTL")]
    repository_load_ttl: Option<f64>,

    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:8000")]
    listen: SocketAddr,

    /// Directory of static files served for all other paths
    #[arg(long)]
    static_dir: Option<Utf8PathBuf>,
}

impl Args {
    fn settings(&self) -> Settings {
        Settings {
            registry_dir: self.registry_dir.clone(),
            registry_load_ttl: self.registry_load_ttl,
            repository_load_ttl: self.repository_load_ttl,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let settings = match &args.config {
        Some(path) => Settings::from_file(path)?.merge(args.settings()),
        None => args.settings(),
    };
    let config = settings.build()?;

    tracing::info!(
        root = %config.root(),
        registry_ttl = ?config.registry_ttl(),
        repository_ttl = ?config.repository_ttl(),
        "Initializing registry explorer"
    );

    let mut app = registry_explorer::router(Registry::new(config));
    if let Some(dir) = &args.static_dir {
        tracing::info!(%dir, "Serving static files");
        app = app.fallback_service(ServeDir::new(dir).append_index_html_on_directories(true));
    }

    let listener = tokio::net::TcpListener::bind(args.listen).await?;
    tracing::info!("Registry explorer listening on http://{}", args.listen);

    axum::serve(listener, app).await?;

    Ok(())
}
