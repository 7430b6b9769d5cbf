//! Command-line arguments and their mapping onto node options.

use std::path::PathBuf;

use clap::Args;
use libp2p::Multiaddr;

use quotenet_network::config::NetworkConfig;
use quotenet_node::node::NodeOptions;
use quotenet_types::config::DEFAULT_CONFIG_PATH;

/// Default listen address of a bootstrap node.
pub const DEFAULT_BOOTSTRAP_LISTEN: &str = "/ip4/0.0.0.0/tcp/8080";

// ---------------------------------------------------------------------------
// Bootstrap
// ---------------------------------------------------------------------------

/// Arguments of `quotenet bootstrap`.
#[derive(Args, Clone, Debug)]
pub struct BootstrapArgs {
    /// YAML key file holding `private_key`.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// P2P listen address.
    #[arg(long, default_value = DEFAULT_BOOTSTRAP_LISTEN)]
    pub listen_addr: Multiaddr,

    /// Do not run the relay server or announce a relay address.
    #[arg(long)]
    pub no_relay: bool,
}

impl BootstrapArgs {
    /// A bootstrap node dials nobody; it only answers.
    pub fn to_options(&self) -> NodeOptions {
        NodeOptions::bootstrap(NetworkConfig {
            listen_addr: self.listen_addr.clone(),
            include_default_bootstrap: false,
            enable_relay_server: !self.no_relay,
            ..NetworkConfig::default()
        })
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Arguments of `quotenet client`.
#[derive(Args, Clone, Debug)]
pub struct ClientArgs {
    /// P2P listen address.
    #[arg(long)]
    pub listen_addr: Multiaddr,

    /// Gossip topic to trade quotes on.
    #[arg(long)]
    pub topic: String,

    /// Bootstrap node address with `/p2p/<id>` (repeatable). Without
    /// any, the built-in bootstrap set is used.
    #[arg(long = "bootstrap")]
    pub bootstrap: Vec<Multiaddr>,
}

impl ClientArgs {
    pub fn to_options(&self) -> NodeOptions {
        NodeOptions::client(
            self.topic.clone(),
            NetworkConfig {
                listen_addr: self.listen_addr.clone(),
                include_default_bootstrap: self.bootstrap.is_empty(),
                bootstrap_nodes: self.bootstrap.clone(),
                ..NetworkConfig::default()
            },
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use quotenet_node::node::NodeRole;

    use super::*;

    #[test]
    fn bootstrap_relay_on_by_default() {
        let args = BootstrapArgs {
            config: PathBuf::from(DEFAULT_CONFIG_PATH),
            listen_addr: DEFAULT_BOOTSTRAP_LISTEN.parse().unwrap(),
            no_relay: false,
        };
        let options = args.to_options();
        assert_eq!(options.role, NodeRole::Bootstrap);
        assert!(options.network.enable_relay_server);
        assert!(options.network.bootstrap_server);
        assert!(options.network.effective_bootstrap_nodes().is_empty());
    }

    #[test]
    fn bootstrap_no_relay() {
        let args = BootstrapArgs {
            config: PathBuf::from("key.yaml"),
            listen_addr: DEFAULT_BOOTSTRAP_LISTEN.parse().unwrap(),
            no_relay: true,
        };
        assert!(!args.to_options().network.enable_relay_server);
    }

    #[test]
    fn client_without_bootstrap_uses_builtin_set() {
        let args = ClientArgs {
            listen_addr: "/ip4/0.0.0.0/tcp/9001".parse().unwrap(),
            topic: "fx-quotes".into(),
            bootstrap: Vec::new(),
        };
        let options = args.to_options();
        assert_eq!(
            options.role,
            NodeRole::Client {
                topic: "fx-quotes".into()
            }
        );
        assert!(!options.network.effective_bootstrap_nodes().is_empty());
    }

    #[test]
    fn explicit_bootstrap_replaces_builtin_set() {
        let seed: Multiaddr = "/ip4/10.0.0.1/tcp/8080/p2p/QmQiNTcP9yLAhgMSeh7hf524SRDKHdE3pu8jWT3Ez8xvsY"
            .parse()
            .unwrap();
        let args = ClientArgs {
            listen_addr: "/ip4/0.0.0.0/tcp/9001".parse().unwrap(),
            topic: "fx-quotes".into(),
            bootstrap: vec![seed.clone()],
        };
        assert_eq!(args.to_options().network.effective_bootstrap_nodes(), vec![seed]);
    }
}
