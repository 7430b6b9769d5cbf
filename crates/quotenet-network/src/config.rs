//! Network configuration for the quotenet libp2p layer.
//!
//! All values have documented defaults. Validation ensures no
//! zero-valued timeouts or invalid protocol names at startup.

use std::net::Ipv4Addr;

use libp2p::multiaddr::Protocol;
use libp2p::Multiaddr;
use serde::{Deserialize, Serialize};

use quotenet_types::{QuotenetError, Result};

// ---------------------------------------------------------------------------
// Well-known bootstrap nodes
// ---------------------------------------------------------------------------

/// Default bootstrap nodes for the quotenet network.
///
/// The seed node that ships with the network, listening on the
/// bootstrap role's default port on the local host. Additional seeds
/// are appended through [`NetworkConfig::bootstrap_nodes`].
///
/// Format: `/ip4/<ip>/tcp/<port>/p2p/<peer_id>`
pub const DEFAULT_BOOTSTRAP_NODES: &[&str] =
    &["/ip4/127.0.0.1/tcp/8080/p2p/QmQiNTcP9yLAhgMSeh7hf524SRDKHdE3pu8jWT3Ez8xvsY"];

/// Kademlia protocol shared with the wider libp2p DHT.
pub const DEFAULT_KAD_PROTOCOL: &str = "/ipfs/kad/1.0.0";

/// Identify protocol version string.
pub const DEFAULT_IDENTIFY_PROTOCOL: &str = "/ipfs/id/1.0.0";

/// Network-layer configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkConfig {
    // -----------------------------------------------------------------------
    // Core networking
    // -----------------------------------------------------------------------
    /// Multiaddr on which this node listens for incoming connections.
    ///
    /// Default: `/ip4/0.0.0.0/tcp/0` (OS-assigned port on all interfaces).
    #[serde(with = "multiaddr_serde")]
    pub listen_addr: Multiaddr,

    /// Extra bootstrap nodes to connect to on startup.
    ///
    /// Each entry must be a fully-qualified multiaddr containing a
    /// `/p2p/<peer_id>` component.
    #[serde(with = "multiaddr_vec_serde")]
    pub bootstrap_nodes: Vec<Multiaddr>,

    /// Whether [`DEFAULT_BOOTSTRAP_NODES`] are part of the bootstrap set.
    pub include_default_bootstrap: bool,

    /// Maximum number of simultaneously connected peers. Connections
    /// to further peers are closed as soon as they are established.
    pub max_connections: usize,

    /// Seconds before an idle connection is closed by the swarm.
    pub idle_timeout_secs: u64,

    /// Seconds a bootstrap dial may stay unresolved before discovery
    /// counts it as failed.
    pub dial_timeout_secs: u64,

    /// Register every concrete listen address as an external address.
    ///
    /// Provider records carry the provider's external addresses, so
    /// without this other nodes find the rendezvous record but cannot
    /// dial it.
    pub advertise_listen_addrs: bool,

    // -----------------------------------------------------------------------
    // Kademlia DHT
    // -----------------------------------------------------------------------
    /// Kademlia protocol name. Nodes using different names do not
    /// exchange DHT messages.
    pub kad_protocol: String,

    /// Kademlia replication factor.
    pub kad_replication_factor: usize,

    /// Seconds before a Kademlia query times out.
    pub kad_query_timeout_secs: u64,

    /// Run Kademlia in server mode (answer queries, store provider
    /// records) instead of letting libp2p pick a mode.
    pub kad_server_mode: bool,

    /// Identify protocol version string.
    pub identify_protocol: String,

    // -----------------------------------------------------------------------
    // Gossip
    // -----------------------------------------------------------------------
    /// Gossipsub heartbeat interval in milliseconds.
    pub gossip_heartbeat_ms: u64,

    // -----------------------------------------------------------------------
    // Relay / bootstrap role
    // -----------------------------------------------------------------------
    /// Serve circuit relay v2 and announce a relay address.
    ///
    /// Only enable on nodes with public IP addresses.
    pub enable_relay_server: bool,

    /// Re-announce the relay address before its 24h TTL lapses.
    pub relay_announce_renewal: bool,

    /// Accept inbound streams on the `/bootstrap/1.0.0` protocol.
    pub bootstrap_server: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        let mut listen_addr = Multiaddr::empty();
        listen_addr.push(Protocol::Ip4(Ipv4Addr::UNSPECIFIED));
        listen_addr.push(Protocol::Tcp(0));

        Self {
            listen_addr,
            bootstrap_nodes: Vec::new(),
            include_default_bootstrap: true,
            max_connections: 128,
            idle_timeout_secs: 300,
            dial_timeout_secs: 20,
            advertise_listen_addrs: true,
            kad_protocol: DEFAULT_KAD_PROTOCOL.into(),
            kad_replication_factor: 20,
            kad_query_timeout_secs: 60,
            kad_server_mode: true,
            identify_protocol: DEFAULT_IDENTIFY_PROTOCOL.into(),
            gossip_heartbeat_ms: 1_000,
            enable_relay_server: false,
            relay_announce_renewal: false,
            bootstrap_server: false,
        }
    }
}

impl NetworkConfig {
    /// Returns the effective bootstrap set: hardcoded defaults (when
    /// enabled) followed by user-configured nodes, deduplicated and in
    /// order.
    pub fn effective_bootstrap_nodes(&self) -> Vec<Multiaddr> {
        let mut nodes: Vec<Multiaddr> = if self.include_default_bootstrap {
            DEFAULT_BOOTSTRAP_NODES
                .iter()
                .filter_map(|s| s.parse::<Multiaddr>().ok())
                .collect()
        } else {
            Vec::new()
        };

        for addr in &self.bootstrap_nodes {
            if !nodes.iter().any(|existing| existing == addr) {
                nodes.push(addr.clone());
            }
        }

        nodes
    }

    /// Validates all configuration values.
    ///
    /// Returns `Err(QuotenetError::ConfigError)` if any value is
    /// outside its acceptable range.
    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(QuotenetError::ConfigError {
                reason: "max_connections must be greater than 0".into(),
            });
        }
        if self.dial_timeout_secs == 0 {
            return Err(QuotenetError::ConfigError {
                reason: "dial_timeout_secs must be greater than 0".into(),
            });
        }
        if self.idle_timeout_secs == 0 {
            return Err(QuotenetError::ConfigError {
                reason: "idle_timeout_secs must be greater than 0".into(),
            });
        }
        validate_protocol_name("kad_protocol", &self.kad_protocol)?;
        validate_protocol_name("identify_protocol", &self.identify_protocol)?;
        if self.kad_replication_factor == 0 {
            return Err(QuotenetError::ConfigError {
                reason: "kad_replication_factor must be greater than 0".into(),
            });
        }
        if self.kad_query_timeout_secs == 0 {
            return Err(QuotenetError::ConfigError {
                reason: "kad_query_timeout_secs must be greater than 0".into(),
            });
        }
        if self.gossip_heartbeat_ms == 0 {
            return Err(QuotenetError::ConfigError {
                reason: "gossip_heartbeat_ms must be greater than 0".into(),
            });
        }
        if self.relay_announce_renewal && !self.enable_relay_server {
            return Err(QuotenetError::ConfigError {
                reason: "relay_announce_renewal requires enable_relay_server".into(),
            });
        }

        Ok(())
    }
}

fn validate_protocol_name(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(QuotenetError::ConfigError {
            reason: format!("{field} must not be empty"),
        });
    }
    if !value.starts_with('/') {
        return Err(QuotenetError::ConfigError {
            reason: format!("{field} must start with '/'"),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Serde helpers: Multiaddr is (de)serialized as its string form
// ---------------------------------------------------------------------------

mod multiaddr_serde {
    use libp2p::Multiaddr;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(addr: &Multiaddr, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&addr.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<Multiaddr, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

mod multiaddr_vec_serde {
    use libp2p::Multiaddr;
    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(addrs: &[Multiaddr], serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(addrs.len()))?;
        for addr in addrs {
            seq.serialize_element(&addr.to_string())?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<Vec<Multiaddr>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let strings: Vec<String> = Vec::deserialize(deserializer)?;
        strings
            .into_iter()
            .map(|s| s.parse().map_err(serde::de::Error::custom))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const SEED: &str =
        "/ip4/1.2.3.4/tcp/9000/p2p/12D3KooWDpJ7As7BWAwRMfu1VU2WCqNjvq387JEYKDBj4kx6nXTN";

    #[test]
    fn default_config_is_valid() {
        assert!(NetworkConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_idle_timeout_rejected() {
        let config = NetworkConfig {
            idle_timeout_secs: 0,
            ..NetworkConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_max_connections_rejected() {
        let config = NetworkConfig {
            max_connections: 0,
            ..NetworkConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_dial_timeout_rejected() {
        let config = NetworkConfig {
            dial_timeout_secs: 0,
            ..NetworkConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_kad_protocol_rejected() {
        let config = NetworkConfig {
            kad_protocol: String::new(),
            ..NetworkConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn kad_protocol_without_slash_rejected() {
        let config = NetworkConfig {
            kad_protocol: "ipfs/kad/1.0.0".into(),
            ..NetworkConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn identify_protocol_without_slash_rejected() {
        let config = NetworkConfig {
            identify_protocol: "id".into(),
            ..NetworkConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_replication_factor_rejected() {
        let config = NetworkConfig {
            kad_replication_factor: 0,
            ..NetworkConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_query_timeout_rejected() {
        let config = NetworkConfig {
            kad_query_timeout_secs: 0,
            ..NetworkConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_heartbeat_rejected() {
        let config = NetworkConfig {
            gossip_heartbeat_ms: 0,
            ..NetworkConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn relay_renewal_without_relay_rejected() {
        let config = NetworkConfig {
            relay_announce_renewal: true,
            enable_relay_server: false,
            ..NetworkConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn default_bootstrap_nodes_parse() {
        let config = NetworkConfig::default();
        assert_eq!(
            config.effective_bootstrap_nodes().len(),
            DEFAULT_BOOTSTRAP_NODES.len()
        );
    }

    #[test]
    fn effective_bootstrap_nodes_empty_without_defaults() {
        let config = NetworkConfig {
            include_default_bootstrap: false,
            ..NetworkConfig::default()
        };
        assert!(config.effective_bootstrap_nodes().is_empty());
    }

    #[test]
    fn effective_bootstrap_nodes_appends_and_dedups() {
        let addr: Multiaddr = SEED.parse().unwrap();
        let config = NetworkConfig {
            bootstrap_nodes: vec![addr.clone(), addr.clone()],
            ..NetworkConfig::default()
        };
        let nodes = config.effective_bootstrap_nodes();
        assert_eq!(nodes.len(), DEFAULT_BOOTSTRAP_NODES.len() + 1);
        assert_eq!(nodes.last(), Some(&addr));
    }

    #[test]
    fn config_roundtrips_through_serde() {
        let config = NetworkConfig {
            bootstrap_nodes: vec![SEED.parse().unwrap()],
            ..NetworkConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("/ip4/1.2.3.4/tcp/9000"));

        let back: NetworkConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.bootstrap_nodes, config.bootstrap_nodes);
        assert_eq!(back.listen_addr, config.listen_addr);
    }

    #[test]
    fn invalid_multiaddr_fails_deserialization() {
        let mut value = serde_json::to_value(NetworkConfig::default()).unwrap();
        value["listen_addr"] = serde_json::Value::String("not a multiaddr".into());
        assert!(serde_json::from_value::<NetworkConfig>(value).is_err());
    }
}
