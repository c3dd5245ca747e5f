use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use axum_server::tls_rustls::RustlsConfig;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use voice_relay::{
    ServerConfig,
    client::{self, DEFAULT_CONNECT_TIMEOUT},
    core::{BedrockCompletion, RestartPolicy},
    routes,
    state::AppState,
};

/// Voice Relay - conversational bridge between speech clients and a hosted LLM
#[derive(Parser, Debug)]
#[command(name = "voice-relay")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Subcommand to run (defaults to `serve`)
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the relay server
    Serve,

    /// Talk to a running relay from the terminal
    Chat {
        /// Relay WebSocket URL
        #[arg(long, default_value = "ws://127.0.0.1:3000/ws")]
        url: String,

        /// Handshake timeout in seconds
        #[arg(long, value_name = "SECS")]
        connect_timeout: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Initialize crypto provider for TLS connections
    // This must be done before any TLS connections are attempted
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(cli.config).await,
        Commands::Chat {
            url,
            connect_timeout,
        } => {
            let connect_timeout = connect_timeout
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT);
            client::run_chat(&url, connect_timeout, RestartPolicy::default())
                .await
                .map_err(|e| anyhow!(e))
        }
    }
}

async fn serve(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    // Load configuration from file or environment
    let config = if let Some(config_path) = config_path {
        println!("Loading configuration from {}", config_path.display());
        ServerConfig::from_file(&config_path).map_err(|e| anyhow!(e.to_string()))?
    } else {
        ServerConfig::from_env().map_err(|e| anyhow!(e.to_string()))?
    };

    let address = config.address();
    let tls_config = config.tls.clone();

    let model = BedrockCompletion::connect(config.completion.clone())
        .await
        .map_err(|e| anyhow!("Failed to initialize completion model: {}", e))?;
    let model_id = config.completion.model_id.clone();
    let region = config.completion.region.clone();

    let app_state = AppState::new(config, Arc::new(model));
    info!(
        provider = %app_state.gateway.model_name(),
        model = %model_id,
        region = %region,
        timeout_secs = app_state.gateway.timeout().as_secs(),
        "Completion gateway ready"
    );
    let app = routes::create_app(app_state)?;

    // Parse socket address
    let socket_addr: SocketAddr = address
        .parse()
        .map_err(|e| anyhow!("Invalid server address '{}': {}", address, e))?;

    // Start server with or without TLS
    if let Some(tls) = tls_config {
        let rustls_config = RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path)
            .await
            .map_err(|e| {
                anyhow!(
                    "Failed to load TLS certificates from {} and {}: {}",
                    tls.cert_path.display(),
                    tls.key_path.display(),
                    e
                )
            })?;

        println!("Server listening on https://{} (TLS enabled)", socket_addr);

        axum_server::bind_rustls(socket_addr, rustls_config)
            .serve(app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .map_err(|e| anyhow!("TLS server error: {}", e))?;
    } else {
        println!("Server listening on http://{}", socket_addr);

        let listener = TcpListener::bind(&socket_addr).await?;
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await?;
    }

    Ok(())
}
