use std::path::PathBuf;

use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand};
use goesview_server::{
    create_app,
    infra::{
        app_state::AppState,
        config::{
            Config, ConfigLoader, ConfigOverrides,
            loader::load_env_file,
        },
        startup::{ProdStartupHooks, StartupHooks},
    },
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "goesview-server")]
#[command(about = "Browse GOES satellite imagery with cached thumbnails")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    serve: ServeArgs,
}

#[derive(ClapArgs, Debug, Clone)]
struct ServeArgs {
    /// Configuration file (TOML)
    #[arg(long, env = "GOESVIEW_CONFIG")]
    config: Option<PathBuf>,

    /// Environment file to load before reading configuration
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Server port (overrides config)
    #[arg(short, long, env = "GOESVIEW_PORT")]
    port: Option<u16>,

    /// Server host (overrides config)
    #[arg(long, env = "GOESVIEW_HOST")]
    host: Option<String>,

    /// Absolute path of the source image tree
    #[arg(long, env = "GOESVIEW_SOURCE_ROOT")]
    source_root: Option<PathBuf>,

    /// Directory for generated thumbnails
    #[arg(long, env = "GOESVIEW_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Channel table JSON file
    #[arg(long, env = "GOESVIEW_CHANNEL_MAP")]
    channel_map: Option<PathBuf>,

    /// Static front-end directory
    #[arg(long, env = "GOESVIEW_STATIC_DIR")]
    static_dir: Option<PathBuf>,
}

impl ServeArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            host: self.host.clone(),
            port: self.port,
            source_root: self.source_root.clone(),
            cache_dir: self.cache_dir.clone(),
            channel_map: self.channel_map.clone(),
            static_dir: self.static_dir.clone(),
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a reconciliation scan without serving HTTP
    Scan {
        /// Exit after one pass once every scheduled thumbnail is written
        #[arg(long, default_value_t = false)]
        once: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loaded before parsing so clap's env fallbacks see `.env` values.
    let env_file_loaded =
        load_env_file(env_file_arg().as_deref()).context("failed to read .env file")?;

    let cli = Cli::parse();
    init_tracing();

    let config = load_config(&cli.serve, env_file_loaded)?;

    match cli.command {
        Some(Command::Scan { once }) => run_scan(config, once).await,
        None => run_server(config).await,
    }
}

/// `--env-file` has to be known before clap runs, so pick it out by hand.
fn env_file_arg() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--env-file" {
            return args.next().map(PathBuf::from);
        }
        if let Some(path) = arg.strip_prefix("--env-file=") {
            return Some(PathBuf::from(path));
        }
    }
    None
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                // Scan summaries at info, per-request noise off. Override via RUST_LOG.
                "info,goesview_core=info,tower_http=warn".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_config(args: &ServeArgs, env_file_loaded: bool) -> anyhow::Result<Config> {
    let mut loader = ConfigLoader::new()
        .with_env_file_loaded(env_file_loaded)
        .with_overrides(args.overrides());
    if let Some(path) = &args.config {
        loader = loader.with_config_path(path);
    }
    let load = loader.load().context("failed to load configuration")?;

    if load.config.metadata.env_file_loaded {
        info!("loaded .env file");
    }
    if let Some(path) = &load.config.metadata.config_path {
        info!(path = %path.display(), "configuration file loaded");
    }
    for warning in &load.warnings {
        warn!(message = %warning, "configuration warning");
    }

    let config = load.config;
    info!(
        source_root = %config.source_root.display(),
        cache_dir = %config.cache_dir.display(),
        workers = config.preview.workers,
        dispatch.max_starts = config.preview.dispatch.max_starts,
        dispatch.window_ms = config.preview.dispatch.window_ms,
        scan_interval_secs = config.preview.scan_interval_secs,
        "configuration in effect"
    );
    Ok(config)
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    let bind_address = config.server.bind_address();
    let state = AppState::build(config).await?;
    ProdStartupHooks.run(&state).await?;

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {bind_address}"))?;
    info!("Server running at http://{bind_address}");

    let app = create_app(state.clone());
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    state.begin_shutdown();
    info!("server stopped");
    Ok(())
}

async fn run_scan(config: Config, once: bool) -> anyhow::Result<()> {
    let interval = config.preview.scan_interval();
    let state = AppState::build(config).await?;

    if once {
        let report = state.reconciler.scan_once().await?;
        info!(enqueued = report.enqueued, "waiting for scheduled thumbnails");
        tokio::select! {
            _ = state.cache.queue().wait_idle() => {}
            _ = shutdown_signal() => warn!("interrupted before the queue drained"),
        }
        let stats = state.cache.queue().stats();
        info!(completed = stats.completed, failed = stats.failed, "scan finished");
    } else {
        tokio::select! {
            _ = state.reconciler.run(interval, state.shutdown.clone()) => {}
            _ = shutdown_signal() => {}
        }
    }

    state.begin_shutdown();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
