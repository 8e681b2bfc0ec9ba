//! Peer networking layer for meshkv.
//!
//! Provides:
//! - `Connection`: a framed channel carrying one JSON value per line
//! - `dial` / `accept`: channel setup with OS keepalive and optional TLS
//! - `TlsContext`: certificate/key material for both channel directions

pub mod dial;
pub mod error;
pub mod frame;
pub mod tls;

pub use dial::{accept, dial};
pub use error::NetError;
pub use frame::Connection;
pub use tls::TlsContext;
