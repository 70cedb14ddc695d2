//! Dockfleet Server - Entry Point
//!
//! Coordinates remote Docker agents over a pull-based task protocol.

use std::collections::HashMap;
use std::env;

use anyhow::Context;
use tracing::{error, info, warn};

use dockfleet::app::options::AppOptions;
use dockfleet::app::run::run;
use dockfleet::filesys::file::File;
use dockfleet::logs::{init_logging, LogOptions};
use dockfleet::storage::layout::StorageLayout;
use dockfleet::storage::settings::Settings;
use dockfleet::utils::version_info;

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version) {
            Ok(json) => println!("{}", json),
            Err(_) => println!("{}", version.version),
        }
        return;
    }

    let mut layout = StorageLayout::default();
    if let Some(data_dir) = cli_args.get("data-dir") {
        layout = layout.with_data_dir(data_dir);
    }

    // Retrieve the settings file
    let settings_file = match cli_args.get("config") {
        Some(path) => File::new(path),
        None => layout.settings_file(),
    };
    let loaded = match load_settings(&settings_file).await {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Unable to read settings: {:#}", e);
            return;
        }
    };
    let settings_missing = loaded.is_none();
    let settings = loaded.unwrap_or_default();

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level,
        json_format: settings.log_json,
        log_dir: settings
            .log_to_file
            .then(|| layout.logs_dir().path().to_path_buf()),
        ..Default::default()
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            println!("Failed to initialize logging: {e}");
            None
        }
    };

    if settings_missing {
        warn!(
            "Settings file {} not found, using defaults",
            settings_file.path().display()
        );
    }

    // Run the server
    let mut options = AppOptions::from_settings(&settings, layout);
    if let Some(host) = cli_args.get("host") {
        options.server.host = host.clone();
    }
    if let Some(port) = cli_args.get("port") {
        match port.parse() {
            Ok(port) => options.server.port = port,
            Err(_) => {
                error!("Invalid --port value: {}", port);
                return;
            }
        }
    }

    info!("Running Dockfleet server with options: {:?}", options);
    let result = run(version.version, options, await_shutdown_signal()).await;
    if let Err(e) = result {
        error!("Failed to run the server: {e}");
    }
}

async fn load_settings(file: &File) -> anyhow::Result<Option<Settings>> {
    Settings::load(file)
        .await
        .with_context(|| format!("loading {}", file.path().display()))
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
                _ => {
                    error!("Unable to install signal handlers, falling back to Ctrl+C");
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
        info!("Ctrl+C received, shutting down...");
    }
}
