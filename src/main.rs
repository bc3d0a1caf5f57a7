//! sooper-surface - terminal control surface for SooperLooper
//!
//! Mirrors the engine's loops over OSC and writes wet levels back, either from
//! a command prompt or as a continuously redrawn monitor table.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sooper_surface::cli::Repl;
use sooper_surface::config::{AppConfig, ConfigWatcher, Overrides};
use sooper_surface::mock;
use sooper_surface::state::ChannelStore;
use sooper_surface::surface::{render_table, LevelControl, ViewOptions};
use sooper_surface::sync::{SyncSettings, Synchronizer};
use sooper_surface::transport::{self, Transport, UdpTransport};

/// Default log file while the monitor or the prompt owns the terminal
const DEFAULT_LOG: &str = "sooper-surface.log";

/// Sooper Surface - mirror and drive SooperLooper loops over OSC
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "SOOPER_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Debug logging, including every OSC message in and out
    #[arg(long)]
    debug: bool,

    /// Log file (default sooper-surface.log; the mock logs to stderr unless set)
    #[arg(long, env = "LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Engine host
    #[arg(long, env = "SOOPER_HOST")]
    osc_host: Option<String>,

    /// Engine port
    #[arg(long, env = "SOOPER_PORT")]
    osc_port: Option<u16>,

    /// Poll interval in milliseconds
    #[arg(long)]
    refresh_rate: Option<u64>,

    /// Auxiliary gain endpoint host
    #[arg(long)]
    aux_host: Option<String>,

    /// Auxiliary gain endpoint port
    #[arg(long)]
    aux_port: Option<u16>,

    /// Show raw state codes in the table
    #[arg(long)]
    state_debug: bool,

    /// Redraw the loop table continuously instead of opening the prompt
    #[arg(long)]
    monitor: bool,

    /// Run only a mock auxiliary endpoint on this port
    #[arg(long, value_name = "PORT")]
    mock_aux: Option<u16>,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            osc_host: self.osc_host.clone(),
            osc_port: self.osc_port,
            refresh_rate_ms: self.refresh_rate,
            aux_host: self.aux_host.clone(),
            aux_port: self.aux_port,
            state_debug: self.state_debug,
            monitor: self.monitor,
        }
    }

    fn level(&self) -> &str {
        if self.debug {
            "debug"
        } else {
            &self.log_level
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    if let Some(port) = args.mock_aux {
        let _guard = init_logging(args.level(), args.log_file.as_deref())?;
        tokio::select! {
            result = mock::run(port) => result?,
            _ = shutdown_signal() => {}
        }
        return Ok(());
    }

    let (mut config, config_path) = AppConfig::load_or_default(args.config.as_deref()).await?;
    config.apply(&args.overrides());
    config.validate().context("Invalid configuration")?;

    let log_file = surface_log_path(args.log_file.as_deref());
    let _guard = init_logging(args.level(), Some(log_file.as_path()))?;

    info!("🚀 Starting sooper-surface v{}", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) => info!("Configuration file: {}", path.display()),
        None => info!("No configuration file found, using defaults"),
    }

    run_app(config, config_path).await?;

    info!("sooper-surface shutdown complete");
    Ok(())
}

/// Log destination for the interactive modes; stderr would break the display
fn surface_log_path(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG))
}

async fn run_app(config: AppConfig, config_path: Option<PathBuf>) -> Result<()> {
    let engine = transport::resolve(&config.engine.host, config.engine.port).await?;
    let auxiliary = match &config.auxiliary {
        Some(aux) => Some(transport::resolve(&aux.host, aux.port).await?),
        None => None,
    };
    let listen = transport::resolve(&config.listen.host, config.listen.port).await?;

    let udp = Arc::new(UdpTransport::bind(listen, engine, auxiliary).await?);
    let reply_url = udp.reply_url().await?;
    transport::log_endpoints(&udp, &reply_url);

    let store = ChannelStore::new();
    let _listener = udp.spawn_listener(store.clone());

    let transport: Arc<dyn Transport> = udp;
    let settings = SyncSettings {
        prefix: config.engine.prefix.clone(),
        register_interval_ms: i32::try_from(config.sync.register_interval_ms)
            .context("sync.register_interval_ms is out of range")?,
        handshake_wait: config.sync.handshake_wait(),
    };
    let synchronizer = Arc::new(Synchronizer::new(
        Arc::clone(&transport),
        store.clone(),
        settings,
        reply_url,
    ));
    synchronizer.startup().await;

    let (cadence_tx, cadence_rx) = watch::channel(config.sync.refresh_rate());
    let _poller = Arc::clone(&synchronizer).spawn_poller(cadence_rx);
    let _reload = config_path.and_then(|path| spawn_config_reload(path, cadence_tx.clone()));

    let view = ViewOptions {
        state_debug: config.ui.state_debug,
        ..Default::default()
    };

    if config.ui.monitor {
        run_monitor(store, view, cadence_tx.subscribe()).await;
    } else {
        let level = LevelControl::new(store.clone(), transport, config.engine.prefix.clone());
        let repl = Repl::new(store, level, view);
        // The prompt handles Ctrl-C itself
        tokio::task::spawn_blocking(move || repl.run())
            .await
            .context("Command prompt task failed")??;
    }

    info!("Shutting down...");
    Ok(())
}

/// Redraw the table on every cadence tick until Ctrl-C
async fn run_monitor(store: ChannelStore, view: ViewOptions, cadence: watch::Receiver<Duration>) {
    info!("📺 Monitor mode");
    let redraw = tokio::spawn(async move {
        loop {
            let table = render_table(&store.snapshot(), &view);
            {
                let mut stdout = std::io::stdout().lock();
                let _ = write!(stdout, "\x1b[2J\x1b[H{}", table);
                let _ = stdout.flush();
            }

            let interval = *cadence.borrow();
            tokio::time::sleep(interval).await;
        }
    });

    shutdown_signal().await;
    redraw.abort();
}

/// Forward live-reloadable settings from the config file
fn spawn_config_reload(path: PathBuf, cadence: watch::Sender<Duration>) -> Option<JoinHandle<()>> {
    let mut watcher = match ConfigWatcher::new(path) {
        Ok(w) => w,
        Err(e) => {
            warn!("Config hot-reload disabled: {:#}", e);
            return None;
        }
    };

    Some(tokio::spawn(async move {
        while let Some(new_config) = watcher.next_config().await {
            let rate = new_config.sync.refresh_rate();
            let current = *cadence.borrow();
            if rate != current {
                cadence.send_replace(rate);
                info!("✅ Refresh rate {:?} -> {:?}", current, rate);
            } else {
                debug!("Config reload has no live-reloadable change");
            }
        }
    }))
}

fn init_logging(level: &str, file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let Some(path) = file else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_thread_names(false)
                    .with_writer(std::io::stderr),
            )
            .init();
        return Ok(None);
    };

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = path
        .file_name()
        .with_context(|| format!("Log file path has no file name: {}", path.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer),
        )
        .init();

    Ok(Some(guard))
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");
    info!("Shutdown signal received");
}
