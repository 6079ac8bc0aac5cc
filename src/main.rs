//! Nomadcoin node binary
//!
//! Runs a node (HTTP API plus optional P2P) or prints the wallet address.

use clap::{Parser, Subcommand};
use nomadcoin::api::{create_router, ApiState};
use nomadcoin::network::{Node, NodeConfig};
use nomadcoin::service::NodeService;
use nomadcoin::wallet::Wallet;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "nomadcoin")]
#[command(author = "Darshan")]
#[command(version = "0.1.0")]
#[command(about = "A minimal proof-of-work cryptocurrency node", long_about = None)]
struct Cli {
    /// File holding the node's private key (created if missing)
    #[arg(
        long,
        env = "PRIVATE_KEY_PATH",
        default_value = "privateKey",
        global = true
    )]
    private_key_path: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the node
    Start {
        /// HTTP API port
        #[arg(long, env = "HTTP_PORT", default_value_t = 3000)]
        http_port: u16,

        /// P2P listening port (P2P is disabled when unset)
        #[arg(long, env = "P2P_PORT")]
        p2p_port: Option<u16>,

        /// Peers to connect to on startup (host:port, comma separated)
        #[arg(long, env = "PEERS", value_delimiter = ',')]
        peers: Vec<String>,
    },

    /// Print this node's wallet address
    Address,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let wallet = Wallet::load_or_create(&cli.private_key_path)?;

    match cli.command {
        Commands::Address => {
            println!("{}", wallet.address());
            Ok(())
        }
        Commands::Start {
            http_port,
            p2p_port,
            peers,
        } => run_node(wallet, http_port, p2p_port, peers),
    }
}

fn run_node(
    wallet: Wallet,
    http_port: u16,
    p2p_port: Option<u16>,
    peers: Vec<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        let service = NodeService::new(wallet);
        log::info!("Node address: {}", service.address());

        let node = match p2p_port {
            Some(port) => {
                let config = NodeConfig {
                    port,
                    bootstrap_peers: peers,
                };
                Some(Node::start(config, service.clone()).await?)
            }
            None => {
                if !peers.is_empty() {
                    log::warn!("Ignoring PEERS because P2P_PORT is not set");
                }
                None
            }
        };

        let app = create_router(ApiState { service, node });
        let addr = format!("0.0.0.0:{}", http_port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        log::info!("HTTP API listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                tokio::signal::ctrl_c().await.ok();
                log::info!("Shutting down");
            })
            .await?;

        Ok::<(), Box<dyn std::error::Error>>(())
    })?;

    Ok(())
}
