//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::app::options::{AppOptions, LifecycleOptions};
use crate::app::state::AppState;
use crate::errors::FleetError;
use crate::rpc::emulator::tokio_sleep;
use crate::server::serve::serve;
use crate::store::flusher;

/// Run the Dockfleet server until `shutdown_signal` resolves
pub async fn run(
    server_version: String,
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), FleetError> {
    info!("Initializing Dockfleet server {}...", server_version);

    // Create shutdown channel
    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager = ShutdownManager::new(shutdown_tx.clone(), options.lifecycle.clone());

    if let Err(e) = init(&options, shutdown_tx.clone(), &mut shutdown_manager).await {
        error!("Failed to start server: {}", e);
        shutdown_manager.shutdown().await?;
        return Err(e);
    }

    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");

    drop(shutdown_tx);
    shutdown_manager.shutdown().await
}

// =============================== INITIALIZATION ================================== //

async fn init(
    options: &AppOptions,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<(), FleetError> {
    options.storage.layout.setup().await?;

    let app_state = Arc::new(
        AppState::init(&options.storage, options.liveness_timeout, options.rpc).await?,
    );
    shutdown_manager.with_app_state(app_state.clone())?;

    if options.storage.persist {
        init_store_flusher(options, &app_state, shutdown_manager, shutdown_tx.subscribe())?;
    }

    init_socket_server(options, app_state, shutdown_manager, shutdown_tx.subscribe()).await
}

fn init_store_flusher(
    options: &AppOptions,
    app_state: &AppState,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), FleetError> {
    info!("Initializing store flusher...");

    let flusher_options = flusher::Options {
        interval: options.storage.flush_interval,
    };
    let handle = tokio::spawn(flusher::run(
        flusher_options,
        app_state.store.clone(),
        tokio_sleep(),
        Box::pin(async move {
            let _ = shutdown_rx.recv().await;
        }),
    ));

    shutdown_manager.with_flusher_handle(handle)
}

async fn init_socket_server(
    options: &AppOptions,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), FleetError> {
    info!("Initializing HTTP server...");

    let server_state = Arc::new(app_state.server_state());
    let server_handle = serve(&options.server, server_state, async move {
        let _ = shutdown_rx.recv().await;
    })
    .await?;

    shutdown_manager.with_socket_server_handle(server_handle)?;
    Ok(())
}

// ================================= SHUTDOWN ===================================== //

struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    lifecycle_options: LifecycleOptions,
    app_state: Option<Arc<AppState>>,
    flusher_handle: Option<JoinHandle<()>>,
    socket_server_handle: Option<JoinHandle<Result<(), FleetError>>>,
}

impl ShutdownManager {
    pub fn new(shutdown_tx: broadcast::Sender<()>, lifecycle_options: LifecycleOptions) -> Self {
        Self {
            shutdown_tx,
            lifecycle_options,
            app_state: None,
            flusher_handle: None,
            socket_server_handle: None,
        }
    }

    pub fn with_app_state(&mut self, state: Arc<AppState>) -> Result<(), FleetError> {
        if self.app_state.is_some() {
            return Err(FleetError::ShutdownError("app_state already set".to_string()));
        }
        self.app_state = Some(state);
        Ok(())
    }

    pub fn with_flusher_handle(&mut self, handle: JoinHandle<()>) -> Result<(), FleetError> {
        if self.flusher_handle.is_some() {
            return Err(FleetError::ShutdownError("flusher_handle already set".to_string()));
        }
        self.flusher_handle = Some(handle);
        Ok(())
    }

    pub fn with_socket_server_handle(
        &mut self,
        handle: JoinHandle<Result<(), FleetError>>,
    ) -> Result<(), FleetError> {
        if self.socket_server_handle.is_some() {
            return Err(FleetError::ShutdownError("server_handle already set".to_string()));
        }
        self.socket_server_handle = Some(handle);
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), FleetError> {
        let _ = self.shutdown_tx.send(());

        match tokio::time::timeout(
            self.lifecycle_options.max_shutdown_delay,
            self.shutdown_impl(),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Shutdown timed out after {:?}, forcing shutdown...",
                    self.lifecycle_options.max_shutdown_delay
                );
                std::process::exit(1);
            }
        }
    }

    async fn shutdown_impl(&mut self) -> Result<(), FleetError> {
        info!("Shutting down Dockfleet server...");

        // 1. HTTP server, so no request writes after the final flush
        if let Some(handle) = self.socket_server_handle.take() {
            handle.await.map_err(|e| FleetError::ShutdownError(e.to_string()))??;
        }

        // 2. Flusher; the final flush below writes whatever it left dirty
        if let Some(handle) = self.flusher_handle.take() {
            handle.await.map_err(|e| FleetError::ShutdownError(e.to_string()))?;
        }

        // 3. App state
        if let Some(app_state) = self.app_state.take() {
            app_state.shutdown().await?;
        }

        info!("Shutdown complete");
        Ok(())
    }
}
