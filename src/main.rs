use std::path::Path;

use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use tracing::warn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use watched_cache::gather;
use watched_cache::CacheNodeConfig;
use watched_cache::ChangeLoop;
use watched_cache::ChangeWatcher;
use watched_cache::Error;
use watched_cache::FsChangeWatcher;
use watched_cache::FsSource;
use watched_cache::ResourceId;
use watched_cache::Result;
use watched_cache::WatchRegistry;
use watched_cache::WatchedCache;

/// Reads resource ids from stdin, one per line, and prints their content.
/// `:metrics` prints the Prometheus metrics instead.
#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    let settings = CacheNodeConfig::new()?.validate()?;

    // Initializing Logs
    init_observability();
    info!(?settings, "Configuration loaded");

    // Initializing Shutdown Signal
    let (graceful_tx, mut graceful_rx) = watch::channel(());

    let root = settings.cache.content_root.clone();
    let watcher: Box<dyn ChangeWatcher> = if settings.watch.enabled {
        Box::new(FsChangeWatcher::new(&root, &settings.watch)?)
    } else {
        warn!("Change notification disabled, entries only expire");
        Box::new(WatchRegistry::new())
    };

    let cache = WatchedCache::from_config(FsSource::new(&root), watcher, &settings);
    cache.start_sweeper();

    let _reload = watch_config_file(&settings)?;

    info!(?root, "Application started. Waiting for resource ids on stdin...");
    tokio::spawn(async {
        if let Err(e) = graceful_shutdown(graceful_tx).await {
            error!("Failed to shutdown: {:?}", e);
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = graceful_rx.changed() => break,
            line = lines.next_line() => line,
        };

        let id = match line {
            Ok(Some(line)) => line.trim().to_string(),
            Ok(None) => break,
            Err(e) => {
                error!("stdin closed: {:?}", e);
                break;
            }
        };

        match id.as_str() {
            "" => continue,
            ":metrics" => println!("{}", gather()),
            _ => match cache.get(id.as_str()).await {
                Ok(content) => println!("{}", String::from_utf8_lossy(&content)),
                Err(e) => error!(%id, "{}", e),
            },
        }
    }

    cache.stop_sweeper().await;
    println!("Exiting program.");
    Ok(())
}

/// Logs every change of the file named by `CONFIG_PATH`.
///
/// Settings are not hot-swapped; the running cache keeps its configuration.
fn watch_config_file(settings: &CacheNodeConfig) -> Result<Option<ChangeLoop>> {
    let Ok(config_path) = std::env::var("CONFIG_PATH") else {
        return Ok(None);
    };
    if !settings.watch.enabled {
        return Ok(None);
    }

    let path = Path::new(&config_path);
    let (Some(dir), Some(file_name)) = (path.parent(), path.file_name()) else {
        return Ok(None);
    };
    let dir = if dir.as_os_str().is_empty() { Path::new(".") } else { dir };

    let watcher = FsChangeWatcher::new(dir, &settings.watch)?;
    let resource = ResourceId::new(file_name.to_string_lossy());

    Ok(Some(ChangeLoop::start(watcher, resource, |id| {
        info!(%id, "Configuration file changed, restart to apply");
    })))
}

async fn graceful_shutdown(graceful_tx: watch::Sender<()>) -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| Error::Fatal(format!("Failed to install SIGINT handler: {}", e)))?;
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| Error::Fatal(format!("Failed to install SIGTERM handler: {}", e)))?;
    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT detected.");
        },
        _ = sigterm.recv() => {
            info!("SIGTERM detected.");
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C detected.");
        },
    }

    graceful_tx.send(()).map_err(|e| {
        error!("Failed to send shutdown signal: {}", e);
        Error::Fatal(format!("Failed to send shutdown signal: {}", e))
    })?;

    info!("Shutdown completed");
    Ok(())
}

fn init_observability() {
    let base_subscriber = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(base_subscriber).init();
}
