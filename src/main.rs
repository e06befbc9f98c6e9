use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use yomu_bridge::bridge::EventBridge;
use yomu_bridge::chat::MemoryMessageStore;
use yomu_bridge::config::Settings;
use yomu_bridge::hub::Hub;
use yomu_bridge::registry::Registry;
use yomu_bridge::server::{create_app, AppState};
use yomu_bridge::tcp::StreamListener;
use yomu_bridge::udp::DatagramListener;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    init_tracing();

    // Load configuration
    let settings = Settings::new()?;
    tracing::info!("Configuration loaded");

    // Hub owns all subscriber-state mutation; listeners only produce onto
    // its channels
    let registry = Arc::new(Registry::new());
    let hub = Hub::spawn(registry, &settings.hub);
    let bridge = Arc::new(EventBridge::new(hub.clone()));
    let message_store = Arc::new(MemoryMessageStore::new());

    // Start the datagram listener
    let datagram = DatagramListener::bind(&settings.udp, hub.clone()).await?;
    let datagram_handle = tokio::spawn(datagram.run(hub.subscribe_stop()));

    // Start the stream listener
    let stream =
        StreamListener::bind(settings.tcp.clone(), hub.clone(), bridge.clone()).await?;
    let stream_handle = tokio::spawn(stream.run(hub.subscribe_stop()));

    // Create Axum app (duplex transport + diagnostics API)
    let state = AppState::new(settings.clone(), hub.clone(), bridge, message_store);
    let app = create_app(state);

    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop the hub; listeners observe the same stop signal and exit
    hub.stop().await;
    let _ = tokio::join!(datagram_handle, stream_handle);

    tracing::info!("Server shutdown complete");
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
