//! Configuration schema and loader for meshkv nodes.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// The address this node's peer listener binds to, and the name
    /// the node is known by on the ring. Every node in the cluster
    /// must spell every address the same way, since node order is
    /// lexicographic by address.
    pub listen: String,

    /// Peer addresses forming the rest of the cluster. Empty means
    /// single-node operation.
    #[serde(default)]
    pub neighbors: Vec<String>,

    /// Cluster settings.
    #[serde(default)]
    pub cluster: ClusterConfig,

    /// Optional TLS material; when present, both the peer listener
    /// and outbound dials are TLS-wrapped.
    #[serde(default)]
    pub tls: Option<TlsConfig>,

    /// Address for the HTTP API. The API is disabled when absent.
    #[serde(default)]
    pub rest_listen: Option<String>,

    /// Optional Prometheus metrics HTTP port.
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Number of virtual partitions on the ring.
    #[serde(default = "default_partitions")]
    pub partitions: usize,

    /// How many times to retry a neighbor dial before giving up on
    /// the whole start.
    #[serde(default = "default_dial_retries")]
    pub dial_retries: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            partitions: default_partitions(),
            dial_retries: default_dial_retries(),
        }
    }
}

/// Certificate/key pair enabling TLS between nodes. Peers are not
/// authenticated; the pair only arms transport encryption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
}

// --- Defaults ---

fn default_partitions() -> usize {
    16_384
}
fn default_dial_retries() -> usize {
    5
}

// --- Loading ---

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl NodeConfig {
    /// Validate that configuration values are consistent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.listen.contains(':') {
            return Err(ConfigError::Invalid(format!(
                "listen address {:?} is not a host:port pair",
                self.listen
            )));
        }
        for neighbor in &self.neighbors {
            if !neighbor.contains(':') {
                return Err(ConfigError::Invalid(format!(
                    "neighbor address {:?} is not a host:port pair",
                    neighbor
                )));
            }
        }
        if self.cluster.partitions == 0 {
            return Err(ConfigError::Invalid(
                "cluster.partitions must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Load a `NodeConfig` from a YAML file path.
pub fn load_from_file(path: &std::path::Path) -> Result<NodeConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: NodeConfig = serde_yaml::from_str(&contents)?;
    config.validate()?;
    Ok(config)
}

/// Load a `NodeConfig` from a YAML string.
pub fn load_from_str(yaml: &str) -> Result<NodeConfig, ConfigError> {
    let config: NodeConfig = serde_yaml::from_str(yaml)?;
    config.validate()?;
    Ok(config)
}
