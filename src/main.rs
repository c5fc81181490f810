//! Plughost CLI - headless OSC-controlled plugin host

use clap::{Parser, Subcommand};
use plughost::control::{
    ClientRegistry, Dispatcher, DispatcherOptions, MemoryEngine, OutboundNotifier, SocketSender,
};
use plughost::{ControlServer, HostConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "plughost")]
#[command(about = "OSC-controlled audio plugin host", long_about = None)]
struct Cli {
    /// Configuration file (default: <config dir>/plughost/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the host and accept controllers
    Serve {
        /// Root path segment for plugin commands
        #[arg(short, long)]
        name: Option<String>,

        /// TCP listen port (0 picks a free one)
        #[arg(long)]
        tcp_port: Option<u16>,

        /// UDP listen port (0 picks a free one)
        #[arg(long)]
        udp_port: Option<u16>,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = HostConfig::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
        Commands::Serve {
            name,
            tcp_port,
            udp_port,
        } => {
            if let Some(name) = name {
                config.name = name;
            }
            if let Some(port) = tcp_port {
                config.tcp.port = port;
                config.tcp.random = false;
            }
            if let Some(port) = udp_port {
                config.udp.port = port;
                config.udp.random = false;
            }
            config.validate()?;

            let engine = Arc::new(MemoryEngine::new());
            let registry = Arc::new(ClientRegistry::new(Arc::new(SocketSender::new()?)));
            engine.set_event_sink(Arc::new(OutboundNotifier::new(registry.clone())));

            let dispatcher = Arc::new(Dispatcher::new(
                engine,
                registry,
                DispatcherOptions {
                    root_name: config.name.clone(),
                    switch_plugins_first_slot: config.compat.switch_plugins_first_slot,
                },
            ));

            let server = ControlServer::bind(dispatcher, &config).await?;
            info!("Host '{}' ready", config.name);

            tokio::select! {
                result = server.run() => result?,
                _ = tokio::signal::ctrl_c() => info!("Shutting down"),
            }
        }
    }

    Ok(())
}
