use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::{Error, Result};
use crate::proxy::header::Header;

/// Open the plaintext connection named by `header` and flush its leftover
/// payload to it.
///
/// A single attempt is made. The leftover bytes are written before the
/// stream is returned, so they always precede anything relayed afterwards.
pub async fn connect(header: &Header, timeout: Option<Duration>) -> Result<TcpStream> {
    let host = std::str::from_utf8(&header.host).map_err(|_| Error::InvalidHost)?;
    let port = header.port;

    let attempt = TcpStream::connect((host, port));
    let result = match timeout {
        Some(limit) => tokio::time::timeout(limit, attempt)
            .await
            .map_err(|_| Error::UpstreamTimeout {
                host: host.to_string(),
                port,
            })?,
        None => attempt.await,
    };
    let mut upstream = result.map_err(|source| Error::UpstreamConnect {
        host: host.to_string(),
        port,
        source,
    })?;
    upstream.set_nodelay(true)?;

    if !header.leftover.is_empty() {
        upstream.write_all(&header.leftover).await?;
        debug!(bytes = header.leftover.len(), "flushed leftover payload");
    }

    Ok(upstream)
}
