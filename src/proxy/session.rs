use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::{timeout_at, Instant};
use tracing::info;

use crate::error::{Error, Result};
use crate::proxy::connector;
use crate::proxy::forwarder::{self, RelayStats};
use crate::proxy::header::read_header;

/// One accepted client connection, from header parse to relay teardown.
///
/// The session owns the client stream throughout. If it ends before the
/// destination is connected, dropping it closes the client.
pub struct Session<S> {
    client: S,
    header_deadline: Option<Instant>,
    connect_timeout: Option<Duration>,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(client: S) -> Self {
        Self {
            client,
            header_deadline: None,
            connect_timeout: None,
        }
    }

    /// Fail with [`Error::HeaderTimeout`] if the header is not complete by `deadline`.
    pub fn with_header_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.header_deadline = deadline;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub async fn run(mut self) -> Result<RelayStats> {
        let header = match self.header_deadline {
            Some(deadline) => timeout_at(deadline, read_header(&mut self.client))
                .await
                .map_err(|_| Error::HeaderTimeout)??,
            None => read_header(&mut self.client).await?,
        };

        info!(
            host = %header.host_lossy(),
            port = header.port,
            leftover = header.leftover.len(),
            "destination requested"
        );

        let upstream = connector::connect(&header, self.connect_timeout).await?;
        drop(header);

        forwarder::forward(self.client, upstream).await
    }
}
