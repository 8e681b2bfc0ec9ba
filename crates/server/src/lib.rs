//! The meshkv cluster server.
//!
//! Provides:
//! - `Server`: listener, mesh join and ring-driven request routing
//! - `Peer` / `NodeInfo` / `Nodes`: the cluster's member set
//! - `Response`: the envelope shared by local, peer and HTTP execution

pub mod node;
pub mod response;
pub mod server;

pub use node::{NodeInfo, Nodes, Peer};
pub use response::{status_of, Response};
pub use server::{Config, Server, ServerError};
