//! Cluster members and their channels.
//!
//! Self and peers are represented uniformly: a [`Peer`] is a wire
//! descriptor plus an optional outbound channel. The self node never
//! has one. The channel mutex is held across a full send+receive, so
//! two round-trips can never interleave their frames on one channel.

use crate::response::Response;
use meshkv_net::{Connection, NetError};
use meshkv_store::Request;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Wire descriptor of a cluster member.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NodeInfo {
    #[serde(rename = "ID", default)]
    pub id: String,

    /// The member's peer address, `host:port`. Doubles as its sort key
    /// on the ring.
    #[serde(default)]
    pub addr: String,
}

impl NodeInfo {
    pub fn new(id: impl Into<String>, addr: impl Into<String>) -> Self {
        NodeInfo {
            id: id.into(),
            addr: addr.into(),
        }
    }
}

impl std::fmt::Display for NodeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.addr, self.id)
    }
}

/// A cluster member, with a live channel for remote members.
#[derive(Debug)]
pub struct Peer {
    pub info: NodeInfo,
    local: bool,
    channel: Mutex<Option<Connection>>,
}

/// The cluster's member set, ordered lexicographically by address.
pub type Nodes = Vec<Arc<Peer>>;

impl Peer {
    /// The self node. It has no channel; requests it owns are served
    /// against the local shard.
    pub fn local(info: NodeInfo) -> Self {
        Peer {
            info,
            local: true,
            channel: Mutex::new(None),
        }
    }

    /// A remote member reached through `conn`.
    pub fn remote(info: NodeInfo, conn: Connection) -> Self {
        Peer {
            info,
            local: false,
            channel: Mutex::new(Some(conn)),
        }
    }

    /// Whether this member is the local node.
    pub fn is_local(&self) -> bool {
        self.local
    }

    /// One request/response exchange on this peer's channel. The
    /// channel lock is held for the whole exchange.
    pub async fn round_trip(&self, req: &Request) -> Result<Response, NetError> {
        let mut guard = self.channel.lock().await;
        let conn = guard.as_mut().ok_or(NetError::Closed)?;

        conn.write_message(req).await?;
        conn.read_message::<Response>().await
    }

    /// Close the channel, if any. Pending round-trips fail once their
    /// reads return.
    pub async fn close(&self) {
        if let Some(mut conn) = self.channel.lock().await.take() {
            if let Err(err) = conn.shutdown().await {
                debug!(addr = %self.info.addr, %err, "channel shutdown");
            }
            debug!(addr = %self.info.addr, "connection closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_info_wire_names() {
        let info = NodeInfo::new("node-1", "10.0.0.1:2373");
        let encoded = serde_json::to_value(&info).unwrap();
        assert_eq!(encoded["ID"], "node-1");
        assert_eq!(encoded["Addr"], "10.0.0.1:2373");
    }

    #[tokio::test]
    async fn test_local_peer_has_no_channel() {
        let peer = Peer::local(NodeInfo::new("n", "a:1"));
        assert!(peer.is_local());

        let req = Request::Keys { id: String::new() };
        let err = peer.round_trip(&req).await.unwrap_err();
        assert!(matches!(err, NetError::Closed));
    }
}
