use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::task::LocalSet;
use tracing_subscriber::EnvFilter;

use smart_bookmarks::app::{self, AppError, AppOptions};
use smart_bookmarks::backend::BackendError;
use smart_bookmarks::backend::memory::MemoryBackend;
use smart_bookmarks::config::{self, Config, ConfigError};
use smart_bookmarks::supabase::SupabaseClient;

#[derive(Parser, Debug)]
#[command(name = "smart-bookmarks", about = "Personal bookmarks with live sync, in your terminal")]
struct Cli {
    #[arg(long, env = "SUPABASE_URL", required_unless_present = "demo")]
    supabase_url: Option<String>,

    #[arg(long, env = "SUPABASE_ANON_KEY", required_unless_present = "demo", hide_env_values = true)]
    supabase_anon_key: Option<String>,

    #[arg(long, env = "BOOKMARKS_CALLBACK_PORT", default_value_t = config::DEFAULT_CALLBACK_PORT)]
    callback_port: u16,

    #[arg(long, env = "BOOKMARKS_OAUTH_PROVIDER", default_value = "google")]
    oauth_provider: String,

    #[arg(long, env = "BOOKMARKS_SESSION_FILE", default_value = config::DEFAULT_SESSION_FILE)]
    session_file: PathBuf,

    #[arg(long, default_value_t = false, help = "Use the in-memory backend with a signed-in demo user")]
    demo: bool,
}

#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    App(#[from] AppError),
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), StartupError> {
    let _ = dotenvy::dotenv();

    // stdout carries the screen; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let local = LocalSet::new();

    if cli.demo {
        let provider = cli.oauth_provider.parse().map_err(ConfigError::from)?;
        let options = AppOptions {
            provider,
            callback_port: cli.callback_port,
            refresh_lead_secs: config::DEFAULT_SESSION_REFRESH_MARGIN_SECS,
        };
        tracing::info!("running against the in-memory demo backend");
        local.run_until(app::run(Arc::new(MemoryBackend::demo()), options)).await?;
        return Ok(());
    }

    let config = Config::new(
        cli.supabase_url.as_deref().unwrap_or_default(),
        cli.supabase_anon_key.as_deref().unwrap_or_default(),
        &cli.oauth_provider,
    )?
    .with_callback_port(cli.callback_port)
    .with_session_file(cli.session_file);

    let client = Arc::new(SupabaseClient::new(&config)?);
    tracing::info!(url = %config.supabase_url, provider = %config.provider, "supabase client initialized");

    let options = AppOptions {
        provider: config.provider,
        callback_port: config.callback_port,
        refresh_lead_secs: config.refresh_margin_secs,
    };
    local.run_until(app::run(client, options)).await?;
    Ok(())
}
