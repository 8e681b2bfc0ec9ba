//! The cluster server: listener, mesh join and request routing.
//!
//! Startup binds the peer listener, dials every configured neighbor in
//! parallel (with exponential backoff per dial) and then publishes the
//! node set: all peers plus a self node, sorted lexicographically by
//! address, one ring element per node index in that order. Sorting is
//! what aligns every member's view of the ring; the set is immutable
//! for the life of the process afterwards.

use crate::node::{NodeInfo, Nodes, Peer};
use crate::response::Response;
use meshkv_net::{Connection, NetError, TlsContext};
use meshkv_ring::{fnv32a, Ring};
use meshkv_store::{Request, Shard, ShardConfig};
use parking_lot::{Mutex, RwLock};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Configuration of the cluster server.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the peer listener binds to; also this node's identity
    /// on the ring.
    pub local_addr: String,

    /// Neighbor addresses. Empty for single-node operation.
    pub neighbors: Vec<String>,

    /// Virtual partition count of the ring. Must be positive.
    pub partitions: usize,

    /// Retries per neighbor dial before the whole start fails.
    pub dial_retries: usize,

    /// TLS material for the listener and outbound dials.
    pub tls: Option<TlsContext>,
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind listener on {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("failed to connect neighbors: {0}")]
    Join(String),
}

/// A sharded key-value server node.
pub struct Server {
    id: String,
    laddr: String,
    neighbors: Vec<String>,
    partitions: usize,
    retries: usize,
    tls: Option<TlsContext>,

    shard: Arc<Shard>,

    /// Ring and node set, published once at the end of `start` and
    /// read-only afterwards.
    ring: RwLock<Ring<usize>>,
    nodes: RwLock<Nodes>,

    listener: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("id", &self.id)
            .field("laddr", &self.laddr)
            .finish_non_exhaustive()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if let Some(handle) = self.listener.lock().take() {
            handle.abort();
        }
    }
}

impl Server {
    /// Create a server. Call [`Server::start`] to join the cluster.
    pub fn new(config: Config) -> Arc<Server> {
        Arc::new(Server {
            id: Uuid::new_v4().to_string(),
            laddr: config.local_addr,
            neighbors: config.neighbors,
            partitions: config.partitions,
            retries: config.dial_retries,
            tls: config.tls,
            shard: Shard::new(ShardConfig {
                capacity: config.partitions,
            }),
            ring: RwLock::new(Ring::new(config.partitions)),
            nodes: RwLock::new(Nodes::new()),
            listener: Mutex::new(None),
        })
    }

    /// This server's identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The address the peer listener is configured for.
    pub fn addr(&self) -> &str {
        &self.laddr
    }

    /// Descriptor of the local node.
    pub fn local_info(&self) -> NodeInfo {
        NodeInfo::new(self.id.clone(), self.laddr.clone())
    }

    /// The cluster's node set. Empty until `start` completes.
    pub fn nodes(&self) -> Nodes {
        self.nodes.read().clone()
    }

    /// Start the server: listen for peers, join every neighbor and
    /// publish the node set. Any neighbor that stays unreachable
    /// through all retries fails the whole start, and every channel
    /// opened so far is torn down.
    pub async fn start(self: &Arc<Self>) -> Result<(), ServerError> {
        let listener =
            TcpListener::bind(&self.laddr)
                .await
                .map_err(|source| ServerError::Bind {
                    addr: self.laddr.clone(),
                    source,
                })?;
        info!(addr = %self.laddr, "peer listener started");

        let server = Arc::clone(self);
        let accept_loop = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, remote)) => {
                        debug!(%remote, "accepted peer connection");
                        let server = Arc::clone(&server);
                        tokio::spawn(async move {
                            match meshkv_net::accept(stream, server.tls.as_ref()).await {
                                Ok(conn) => server.handle(conn, remote).await,
                                Err(err) => warn!(%remote, %err, "peer handshake failed"),
                            }
                        });
                    }
                    Err(err) => {
                        warn!(%err, "failed to accept peer connection");
                    }
                }
            }
        });
        *self.listener.lock() = Some(accept_loop);

        if let Err(err) = self.join_all().await {
            self.stop().await;
            return Err(err);
        }

        info!(
            nodes = self.nodes.read().len(),
            partitions = self.partitions,
            "cluster ready"
        );
        Ok(())
    }

    /// Stop the listener and close every peer channel. In-flight
    /// handlers exit once their reads fail.
    pub async fn stop(&self) {
        if let Some(handle) = self.listener.lock().take() {
            handle.abort();
        }
        let nodes = self.nodes();
        for peer in nodes {
            peer.close().await;
        }
        info!(addr = %self.laddr, "server stopped");
    }

    /// Dial every neighbor in parallel and publish the sorted node
    /// set and ring.
    async fn join_all(self: &Arc<Self>) -> Result<(), ServerError> {
        let results =
            futures::future::join_all(self.neighbors.iter().map(|addr| self.join(addr))).await;

        let mut opened = Vec::new();
        let mut failures = Vec::new();
        for (addr, result) in self.neighbors.iter().zip(results) {
            match result {
                Ok(conn) => {
                    info!(%addr, "connected to peer");
                    opened.push((addr.clone(), conn));
                }
                Err(err) => failures.push(format!("{}: {}", addr, err)),
            }
        }

        // All-or-nothing: tear down whatever was opened when any
        // neighbor stayed unreachable.
        if !failures.is_empty() {
            for (addr, mut conn) in opened {
                if let Err(err) = conn.shutdown().await {
                    debug!(%addr, %err, "channel shutdown");
                }
                debug!(%addr, "connection closed");
            }
            return Err(ServerError::Join(failures.join(", ")));
        }

        let mut peers: Nodes = opened
            .into_iter()
            .map(|(addr, conn)| {
                Arc::new(Peer::remote(
                    NodeInfo::new(Uuid::new_v4().to_string(), addr),
                    conn,
                ))
            })
            .collect();
        peers.push(Arc::new(Peer::local(self.local_info())));
        peers.sort_by(|a, b| a.info.addr.cmp(&b.info.addr));

        let mut ring = Ring::new(self.partitions);
        for i in 0..peers.len() {
            ring.insert(i);
        }

        *self.nodes.write() = peers;
        *self.ring.write() = ring;
        Ok(())
    }

    /// Dial one neighbor, doubling the backoff after each failure.
    async fn join(&self, addr: &str) -> Result<Connection, NetError> {
        let mut backoff = Duration::from_secs(1);
        let mut attempt = 0;
        loop {
            debug!(addr, attempt, "dialing peer");
            match meshkv_net::dial(addr, self.tls.as_ref()).await {
                Ok(conn) => return Ok(conn),
                Err(err) if attempt < self.retries => {
                    warn!(addr, %err, ?backoff, "dial failed, next attempt after backoff");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    attempt += 1;
                }
                Err(err) => {
                    error!(addr, %err, "all connection attempts failed");
                    return Err(err);
                }
            }
        }
    }

    /// Execute a request, forwarding it to the owning node when the
    /// routing key hashes to a peer.
    ///
    /// Cancellation: dropping the returned future cancels the exchange
    /// at the next network await; the peer channel is left to the
    /// keepalive machinery.
    pub async fn do_request(&self, req: &Request) -> Response {
        debug!(%req, "processing request");

        // Owner-agnostic requests never leave this node.
        let owner = if req.hash().is_empty() {
            None
        } else {
            let ring = self.ring.read();
            let nodes = self.nodes.read();
            ring.find(fnv32a(req.hash()))
                .and_then(|i| nodes.get(*i))
                .cloned()
        };

        let peer = match owner {
            Some(peer) if !peer.is_local() => peer,
            // Self-owned, owner-agnostic, or the ring is not built
            // yet: all are local executions.
            _ => return self.serve_local(req),
        };

        meshkv_metrics::metrics()
            .requests_forwarded
            .with_label_values(&[req.action()])
            .inc();
        let _timer = meshkv_metrics::start_round_trip_timer(req.action());

        match peer.round_trip(req).await {
            Ok(resp) => resp,
            Err(err) => {
                error!(%req, peer = %peer.info, %err, "forwarding failed");
                meshkv_metrics::metrics().requests_failed.inc();
                Response::transport_failure(err)
            }
        }
    }

    /// Execute a request against the local shard unconditionally.
    fn serve_local(&self, req: &Request) -> Response {
        let m = meshkv_metrics::metrics();
        match self.shard.serve(req) {
            Ok(record) => {
                m.requests_served.with_label_values(&[req.action()]).inc();
                m.records_stored.set(self.shard.len() as i64);
                Response::ok(record, self.local_info())
            }
            Err(err) => {
                error!(%req, %err, "request failed");
                m.requests_failed.inc();
                Response::failure(&err)
            }
        }
    }

    /// Handler loop for one inbound peer channel. Requests read here
    /// are executed locally; the sender owns routing, which is what
    /// keeps forwarding from recursing around the mesh.
    async fn handle(self: Arc<Self>, mut conn: Connection, remote: SocketAddr) {
        loop {
            let req: Request = match conn.read_message().await {
                Ok(req) => req,
                Err(NetError::Closed) => break,
                Err(err) => {
                    // Unknown action or torn frame; drop the channel
                    // so the sender's pending read fails fast.
                    error!(%remote, %err, "failed to read peer request");
                    break;
                }
            };

            let resp = self.serve_local(&req);
            if let Err(err) = conn.write_message(&resp).await {
                error!(%remote, %err, "failed to write peer response");
                break;
            }
        }
        debug!(%remote, "closing peer connection");
    }
}
