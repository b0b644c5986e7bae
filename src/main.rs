//! Snapcache CLI

use std::path::PathBuf;
use std::process;

use tracing::info;
use tracing_subscriber::EnvFilter;

use snapcache::config::Config;
use snapcache::server::Server;

const DEFAULT_CONFIG: &str = "snapcache.toml";

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.len() {
        1 => PathBuf::from(DEFAULT_CONFIG),
        2 if args[1] != "--help" && args[1] != "-h" => PathBuf::from(&args[1]),
        _ => {
            eprintln!("Snapcache v{}", env!("CARGO_PKG_VERSION"));
            eprintln!();
            eprintln!("Usage: snapcache [config.toml]");
            eprintln!();
            eprintln!("Record-replay caching proxy: point a client at the listen port and");
            eprintln!("responses from base_url are captured under cache_root, then replayed");
            eprintln!("offline for identical requests.");
            process::exit(1);
        }
    };

    let config = match Config::from_file(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {}: {e}", config_path.display());
            process::exit(1);
        }
    };

    info!(
        "Starting snapcache: {} -> {}",
        config.listen_port, config.base_url
    );

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start runtime: {e}");
            process::exit(1);
        }
    };

    let result = runtime.block_on(async {
        let server = Server::new(config)?;
        server.run().await
    });

    if let Err(e) = result {
        eprintln!("Server error: {e}");
        process::exit(1);
    }

    info!("Shutdown complete");
}
