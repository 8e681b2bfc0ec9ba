//! Transport errors.

#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("tls error: {0}")]
    Tls(#[from] tokio_rustls::rustls::Error),

    #[error("invalid server name in {0}")]
    ServerName(String),

    #[error("no addresses found for {0}")]
    Resolve(String),

    #[error("connection closed by peer")]
    Closed,
}
