//! quotenet -- peer-to-peer price quote exchange.
//!
//! Usage:
//!
//!   quotenet bootstrap [--config <PATH>] [--listen-addr <MULTIADDR>] [--no-relay]
//!   quotenet client --listen-addr <MULTIADDR> --topic <NAME> [--bootstrap <MULTIADDR>]...
//!
//! The bootstrap node loads its identity from a YAML key file and serves
//! as a rendezvous and relay point. A client generates a fresh identity,
//! discovers peers on its topic, reads `pair`/`price` lines from stdin
//! and prints every quote received on the topic.
//!
//! Both run until interrupted with Ctrl+C.

use clap::{Parser, Subcommand};
use tokio::io::BufReader;
use tokio::sync::mpsc;

use quotenet_network::identity;
use quotenet_node::events::NodeEvent;
use quotenet_node::node::Node;
use quotenet_node::quote_io::{run_receive_loop, run_send_loop};

mod config;

use config::{BootstrapArgs, ClientArgs};

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

/// quotenet -- gossip price quotes between peers.
#[derive(Parser, Debug)]
#[command(name = "quotenet", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a bootstrap node.
    Bootstrap(BootstrapArgs),
    /// Run an interactive quote client.
    Client(ClientArgs),
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Bootstrap(args) => run_bootstrap(args).await,
        Command::Client(args) => run_client(args).await,
    };

    // Exit explicitly: a blocking stdin read would otherwise hold the
    // runtime open.
    match result {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            tracing::error!("{e}");
            std::process::exit(1);
        }
    }
}

// ---------------------------------------------------------------------------
// Bootstrap role
// ---------------------------------------------------------------------------

async fn run_bootstrap(args: BootstrapArgs) -> Result<(), String> {
    let keypair = identity::load_keypair(&args.config)
        .map_err(|e| format!("failed to load identity from '{}': {e}", args.config.display()))?;

    let mut node = Node::new(keypair, args.to_options())
        .map_err(|e| format!("node creation failed: {e}"))?;
    tracing::info!(
        peer_id = %node.peer_id(),
        relay = !args.no_relay,
        "bootstrap node created"
    );

    if let Some(events) = node.take_event_receiver() {
        tokio::spawn(log_events(events));
    }
    let node_handle = node.start().map_err(|e| format!("node start failed: {e}"))?;

    wait_for_exit(node_handle).await;

    node.shutdown().map_err(|e| format!("shutdown failed: {e}"))?;
    tracing::info!("bootstrap node stopped");
    Ok(())
}

// ---------------------------------------------------------------------------
// Client role
// ---------------------------------------------------------------------------

async fn run_client(args: ClientArgs) -> Result<(), String> {
    let keypair = identity::generate_keypair();
    let mut node = Node::new(keypair, args.to_options())
        .map_err(|e| format!("node creation failed: {e}"))?;
    tracing::info!(peer_id = %node.peer_id(), topic = %args.topic, "client node created");

    if let Some(events) = node.take_event_receiver() {
        tokio::spawn(log_events(events));
    }
    let shutdown = node.shutdown_signal();
    let mut node_handle = node.start().map_err(|e| format!("node start failed: {e}"))?;

    let topic = node
        .pubsub()
        .join(&args.topic)
        .await
        .map_err(|e| format!("failed to join topic '{}': {e}", args.topic))?;

    let send_topic = topic.clone();
    let send_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let input = BufReader::new(tokio::io::stdin());
        if let Err(e) = run_send_loop(input, tokio::io::stdout(), &send_topic, send_shutdown).await {
            tracing::error!(%e, "send loop failed");
        }
    });

    let subscription = topic
        .subscribe()
        .await
        .map_err(|e| format!("failed to subscribe to topic '{}': {e}", args.topic))?;

    tokio::select! {
        result = run_receive_loop(subscription, tokio::io::stdout(), shutdown) => {
            if let Err(e) = result {
                tracing::error!(%e, "receive loop failed");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received Ctrl+C, shutting down...");
        }
        result = &mut node_handle => {
            if let Err(e) = result {
                tracing::error!(%e, "node event loop panicked");
            }
            return Err("node event loop exited unexpectedly".into());
        }
    }

    node.shutdown().map_err(|e| format!("shutdown failed: {e}"))?;
    if let Err(e) = node_handle.await {
        tracing::warn!(%e, "node event loop did not stop cleanly");
    }
    tracing::info!("client stopped");
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Blocks until Ctrl+C or the event loop ends on its own.
async fn wait_for_exit(mut node_handle: tokio::task::JoinHandle<()>) {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received Ctrl+C, shutting down...");
        }
        result = &mut node_handle => {
            match result {
                Ok(()) => tracing::error!("node event loop exited unexpectedly"),
                Err(e) => tracing::error!(%e, "node event loop panicked"),
            }
        }
    }
}

async fn log_events(mut events: mpsc::Receiver<NodeEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            NodeEvent::Listening(addr) => tracing::info!(%addr, "listening"),
            NodeEvent::PeerConnected(peer_id) => tracing::info!(%peer_id, "connected to peer"),
            NodeEvent::PeerDisconnected(peer_id) => {
                tracing::info!(%peer_id, "disconnected from peer")
            }
            NodeEvent::DiscoveryCompleted { peer_id } => {
                tracing::info!(%peer_id, "found a peer on the topic")
            }
            NodeEvent::DiscoveryFailed { reason } => {
                tracing::error!(%reason, "peer discovery stopped")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_defaults() {
        let cli = Cli::try_parse_from(["quotenet", "bootstrap"]).unwrap();
        let Command::Bootstrap(args) = cli.command else {
            panic!("expected bootstrap");
        };
        assert_eq!(args.config.to_str(), Some("config.yaml"));
        assert_eq!(args.listen_addr.to_string(), "/ip4/0.0.0.0/tcp/8080");
        assert!(!args.no_relay);
    }

    #[test]
    fn client_requires_listen_addr_and_topic() {
        assert!(Cli::try_parse_from(["quotenet", "client", "--topic", "fx"]).is_err());
        assert!(
            Cli::try_parse_from(["quotenet", "client", "--listen-addr", "/ip4/0.0.0.0/tcp/0"])
                .is_err()
        );
    }

    #[test]
    fn client_accepts_repeated_bootstrap() {
        let cli = Cli::try_parse_from([
            "quotenet",
            "client",
            "--listen-addr",
            "/ip4/0.0.0.0/tcp/9001",
            "--topic",
            "fx-quotes",
            "--bootstrap",
            "/ip4/10.0.0.1/tcp/8080/p2p/QmQiNTcP9yLAhgMSeh7hf524SRDKHdE3pu8jWT3Ez8xvsY",
            "--bootstrap",
            "/ip4/10.0.0.2/tcp/8080/p2p/QmQiNTcP9yLAhgMSeh7hf524SRDKHdE3pu8jWT3Ez8xvsY",
        ])
        .unwrap();
        let Command::Client(args) = cli.command else {
            panic!("expected client");
        };
        assert_eq!(args.topic, "fx-quotes");
        assert_eq!(args.bootstrap.len(), 2);
    }

    #[test]
    fn invalid_multiaddr_is_rejected() {
        assert!(Cli::try_parse_from(["quotenet", "bootstrap", "--listen-addr", "not-an-addr"]).is_err());
    }
}
