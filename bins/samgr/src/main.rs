use anyhow::{Context, Result};
use clap::Parser;
use samgr_profile::ProfileSet;
use samgr_registry::{
    CommandLauncher, DisabledLauncher, ProcessLauncher, RegistryConfig, SystemAbilityManager,
    SystemAbilityManagerStub,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// System ability manager daemon
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path (YAML). Defaults apply when omitted.
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// Profile document to load, in addition to the configured ones
    #[arg(short, long, value_name = "FILE")]
    profile: Vec<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Seconds between registry status lines (0 disables them)
    #[arg(long, default_value_t = 30)]
    status_interval: u64,

    /// Run duration in seconds (for testing)
    #[arg(long)]
    run_duration: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => RegistryConfig::load_from_file(path)?,
        None => RegistryConfig::default(),
    };
    initialize_logging(if args.debug { "debug" } else { &config.log_level });

    info!("Starting system ability manager");
    if let Some(path) = &args.config {
        info!("Config file: {}", path);
    }

    let mut profile_paths = config.profile_paths.clone();
    profile_paths.extend(args.profile.iter().cloned());
    let profiles = ProfileSet::load_from_files(&profile_paths)
        .context("Failed to load ability profiles")?;
    info!(
        "Loaded {} profiles ({} on demand) from {} documents",
        profiles.len(),
        profiles.on_demand().count(),
        profile_paths.len()
    );

    let launcher: Arc<dyn ProcessLauncher> = match &config.launcher_command {
        Some(command) => {
            info!("Hosting processes are launched with: {}", command);
            Arc::new(CommandLauncher::new(command.clone()))
        }
        None => {
            warn!("No launcher command configured, on-demand loads need running processes");
            Arc::new(DisabledLauncher)
        }
    };

    let registry = SystemAbilityManager::new(config, profiles, launcher);
    let handle = SystemAbilityManagerStub::into_handle(registry.clone());
    info!(
        "System ability manager ready (pid {}, handle {})",
        registry.pid(),
        handle.token()
    );

    let status = (args.status_interval > 0).then(|| {
        let registry = registry.clone();
        let period = Duration::from_secs(args.status_interval);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                log_status(&registry);
            }
        })
    });

    if let Some(duration) = args.run_duration {
        info!("Running for {} seconds (test mode)", duration);
        tokio::time::sleep(Duration::from_secs(duration)).await;
    } else {
        shutdown_signal().await;
    }

    info!("Shutting down system ability manager...");
    if let Some(status) = status {
        status.abort();
    }
    log_status(&registry);
    registry.shutdown();
    info!("System ability manager shut down");
    Ok(())
}

fn initialize_logging(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_target(false)
        .with_thread_ids(true)
        .init();
}

fn log_status(registry: &SystemAbilityManager) {
    let snapshot = registry.snapshot();
    info!(
        "Status: {} abilities, {} pending loads, {} processes ({} starting), {} subscriptions, {} remote loads",
        snapshot.abilities.len(),
        snapshot.pending.len(),
        snapshot.processes.len(),
        snapshot.starting_processes.len(),
        snapshot.subscriptions,
        snapshot.remote_loads
    );
}

async fn shutdown_signal() {
    use tokio::signal;

    #[cfg(unix)]
    {
        use signal::unix::{signal as unix_signal, SignalKind};

        match (
            unix_signal(SignalKind::terminate()),
            unix_signal(SignalKind::interrupt()),
        ) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM signal"),
                    _ = sigint.recv() => info!("Received SIGINT signal"),
                }
                return;
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!("Failed to install signal handlers: {}, falling back to Ctrl+C", e);
            }
        }
    }

    if let Err(e) = signal::ctrl_c().await {
        warn!("Failed to wait for Ctrl+C: {}", e);
        return;
    }
    info!("Received Ctrl+C signal");
}
