use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("certificate parse error: {0}")]
    CertParse(String),

    #[error("client closed after {received} bytes, before the header was complete")]
    IncompleteHeader { received: usize },

    #[error("header not received within the deadline")]
    HeaderTimeout,

    #[error("destination host is not valid UTF-8")]
    InvalidHost,

    #[error("failed to connect to {host}:{port}: {source}")]
    UpstreamConnect {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("timed out connecting to {host}:{port}")]
    UpstreamTimeout { host: String, port: u16 },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// True for the failures that end a session before any destination
    /// connection exists.
    pub fn is_upstream_failure(&self) -> bool {
        matches!(
            self,
            Error::InvalidHost | Error::UpstreamConnect { .. } | Error::UpstreamTimeout { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
