//! Outbound and inbound channel setup.
//!
//! Dialing resolves the address (hostnames included, so /etc/hosts
//! aliases work inside containers), disables Nagle, arms OS keepalive
//! and optionally wraps the stream in TLS. The keepalive knobs are
//! deliberately aggressive: a cluster peer that stops acknowledging
//! for 90 seconds is dead to us.

use crate::error::NetError;
use crate::frame::Connection;
use crate::tls::TlsContext;
use socket2::{SockRef, TcpKeepalive};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tracing::debug;

/// Keepalive probes before the connection is declared dead.
const KEEPALIVE_RETRIES: u32 = 3;
/// Idle time before the first keepalive probe.
const KEEPALIVE_IDLE: Duration = Duration::from_secs(10);
/// Interval between keepalive probes.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);
/// Upper bound on unacknowledged transmission time.
#[cfg(target_os = "linux")]
const USER_TIMEOUT: Duration = Duration::from_secs(90);

/// Dial a peer at `addr` (`host:port`) and return a framed channel.
pub async fn dial(addr: &str, tls: Option<&TlsContext>) -> Result<Connection, NetError> {
    let mut addrs = tokio::net::lookup_host(addr).await?;
    let resolved = addrs.next().ok_or_else(|| NetError::Resolve(addr.to_string()))?;

    let stream = TcpStream::connect(resolved).await?;
    stream.set_nodelay(true)?;
    configure_keepalive(&stream)?;
    debug!(addr, "dialed peer");

    match tls {
        Some(ctx) => {
            let name = server_name(addr)?;
            let stream = ctx.connector.connect(name, stream).await?;
            Ok(Connection::new(Box::new(stream)))
        }
        None => Ok(Connection::new(Box::new(stream))),
    }
}

/// Promote an accepted stream to a framed channel, performing the TLS
/// handshake when the listener is TLS-armed.
pub async fn accept(stream: TcpStream, tls: Option<&TlsContext>) -> Result<Connection, NetError> {
    stream.set_nodelay(true)?;
    configure_keepalive(&stream)?;

    match tls {
        Some(ctx) => {
            let stream = ctx.acceptor.accept(stream).await?;
            Ok(Connection::new(Box::new(stream)))
        }
        None => Ok(Connection::new(Box::new(stream))),
    }
}

fn configure_keepalive(stream: &TcpStream) -> Result<(), NetError> {
    let sock = SockRef::from(stream);

    let keepalive = TcpKeepalive::new()
        .with_time(KEEPALIVE_IDLE)
        .with_interval(KEEPALIVE_INTERVAL);
    #[cfg(not(windows))]
    let keepalive = keepalive.with_retries(KEEPALIVE_RETRIES);
    sock.set_tcp_keepalive(&keepalive)?;

    #[cfg(target_os = "linux")]
    sock.set_tcp_user_timeout(Some(USER_TIMEOUT))?;

    Ok(())
}

fn server_name(addr: &str) -> Result<ServerName<'static>, NetError> {
    let host = addr.rsplit_once(':').map_or(addr, |(host, _)| host);
    ServerName::try_from(host.to_string()).map_err(|_| NetError::ServerName(addr.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
