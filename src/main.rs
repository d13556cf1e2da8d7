use clap::Parser;
use opsdiag::cluster::{ClusterClient, CredentialError};
use opsdiag::config::{ClusterMode, DiagConfig};
use opsdiag::fswatch::{FsWatcher, WatchNotice};
use opsdiag::signals::{exit_signals, DumpListener};
use opsdiag::stacks::StackDumper;
use std::ffi::OsString;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Process diagnostics sidecar: dumps all thread stacks on SIGUSR1, logs
/// config and credential rotation, and exits cleanly on SIGTERM/SIGQUIT.
#[derive(Parser, Debug)]
#[command(name = "opsdiag", version, about)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "opsdiag.toml")]
    config: PathBuf,

    /// Stack dump directory, empty for stderr (overrides config)
    #[arg(long, value_name = "DIR")]
    dump_dir: Option<OsString>,

    /// Write one stack dump and exit
    #[arg(long)]
    dump_now: bool,

    /// Additional path to watch for changes (repeatable)
    #[arg(long = "watch", value_name = "PATH")]
    watch: Vec<PathBuf>,

    /// Validate config and print resolved settings, don't run
    #[arg(long)]
    dry_run: bool,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_thread_ids(false)
        .init();

    tracing::debug!(?cli, "parsed CLI arguments");

    if let Err(e) = run(cli).await {
        tracing::error!(error = %e, "opsdiag failed");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = DiagConfig::load(&cli.config)?;
    if let Some(dir) = cli.dump_dir {
        config.dump.dir = PathBuf::from(dir);
    }
    config.watch.paths.extend(cli.watch);
    if cli.config.exists() {
        config.watch.paths.push(cli.config.clone());
    }

    let destination = config.dump.destination();
    let dumper = StackDumper::new(config.dump.limits());
    let watch_paths = config.rotation_paths();

    if cli.dry_run {
        println!("opsdiag v{}", env!("CARGO_PKG_VERSION"));
        println!("Config file: {}", cli.config.display());
        println!("Dump destination: {destination:?}");
        println!("Dump buffer limits: {:?}", config.dump.limits());
        println!("Cluster mode: {:?}", config.cluster.mode);
        for path in &watch_paths {
            println!("Watching: {}", path.display());
        }
        return Ok(());
    }

    if cli.dump_now {
        let location = dumper.dump(&destination)?;
        tracing::info!(%location, "dumped thread stacks");
        return Ok(());
    }

    if let Some(client) = connect_cluster(&config)? {
        tracing::info!(
            server = client.base_url(),
            namespace = ?client.namespace(),
            "cluster client ready"
        );
    }

    let listener = DumpListener::spawn(dumper, destination)?;
    let mut exits = exit_signals()?;
    let mut watcher = if watch_paths.is_empty() {
        None
    } else {
        Some(FsWatcher::new(&watch_paths)?)
    };

    tracing::info!(
        pid = std::process::id(),
        watching = watch_paths.len(),
        "opsdiag running, send SIGUSR1 for a stack dump"
    );

    loop {
        let mut watcher_gone = false;
        tokio::select! {
            received = exits.recv() => {
                match received {
                    Some(signal) => tracing::info!(%signal, "shutting down"),
                    None => tracing::warn!("exit signal relay stopped, shutting down"),
                }
                break;
            }
            notice = next_notice(&mut watcher) => match notice {
                Some(WatchNotice::Changed(event)) => {
                    tracing::info!(kind = ?event.kind, paths = ?event.paths, "watched file changed");
                }
                Some(WatchNotice::Failed(e)) => {
                    tracing::warn!(error = %e, "file watcher error");
                }
                None => watcher_gone = true,
            },
        }
        if watcher_gone {
            tracing::warn!("file watcher stopped");
            if let Some(w) = watcher.take() {
                w.close();
            }
        }
    }

    if let Some(w) = watcher {
        w.close();
    }
    listener.shutdown().await;
    Ok(())
}

async fn next_notice(watcher: &mut Option<FsWatcher>) -> Option<WatchNotice> {
    match watcher {
        Some(w) => w.next_notice().await,
        None => std::future::pending().await,
    }
}

/// Build the configured cluster client. Failures are fatal only when the
/// config marks the cluster as required.
fn connect_cluster(config: &DiagConfig) -> Result<Option<ClusterClient>, CredentialError> {
    let result = match config.cluster.mode {
        ClusterMode::None => return Ok(None),
        ClusterMode::InCluster if config.cluster.required => {
            return Ok(Some(ClusterClient::must_in_cluster()))
        }
        ClusterMode::InCluster => ClusterClient::in_cluster(),
        ClusterMode::Kubeconfig => {
            ClusterClient::from_kubeconfig(&config.cluster.kubeconfig_path())
        }
    };
    match result {
        Ok(client) => Ok(Some(client)),
        Err(e) if config.cluster.required => Err(e),
        Err(e) => {
            tracing::warn!(error = %e, "continuing without cluster client");
            Ok(None)
        }
    }
}
