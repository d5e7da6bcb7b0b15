use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::error::Result;

/// Read buffer size per relay direction.
const RELAY_BUFFER_SIZE: usize = 16 * 1024;

/// Bytes moved in each direction over a session's lifetime.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayStats {
    pub client_to_upstream: u64,
    pub upstream_to_client: u64,
}

/// Relay bytes between the client and the destination until one side ends.
///
/// Bytes are forwarded unmodified and in order. Writes are awaited before
/// the next read, so a slow sink pauses its source. As soon as either
/// direction hits EOF or an error, both sides are shut down; there is no
/// half-open state.
pub async fn forward<C, U>(client: C, upstream: U) -> Result<RelayStats>
where
    C: AsyncRead + AsyncWrite + Unpin,
    U: AsyncRead + AsyncWrite + Unpin,
{
    let (mut client_r, mut client_w) = tokio::io::split(client);
    let (mut upstream_r, mut upstream_w) = tokio::io::split(upstream);
    let mut stats = RelayStats::default();

    let outcome = tokio::select! {
        r = pump(&mut client_r, &mut upstream_w, &mut stats.client_to_upstream) => r,
        r = pump(&mut upstream_r, &mut client_w, &mut stats.upstream_to_client) => r,
    };

    let _ = client_w.shutdown().await;
    let _ = upstream_w.shutdown().await;

    debug!(
        client_to_upstream = stats.client_to_upstream,
        upstream_to_client = stats.upstream_to_client,
        "connection closed"
    );

    outcome?;
    Ok(stats)
}

async fn pump<R, W>(reader: &mut R, writer: &mut W, copied: &mut u64) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; RELAY_BUFFER_SIZE];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return writer.shutdown().await;
        }
        writer.write_all(&buf[..n]).await?;
        writer.flush().await?;
        *copied += n as u64;
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::duplex;

    use super::*;

    async fn read_exact_len<R: AsyncRead + Unpin>(reader: &mut R, len: usize) -> Vec<u8> {
        let mut out = vec![0u8; len];
        reader.read_exact(&mut out).await.unwrap();
        out
    }

    #[tokio::test]
    async fn large_payload_survives_small_buffers() {
        // Tiny duplex buffers force the relay through backpressure.
        let (mut client_app, client_relay) = duplex(64);
        let (upstream_relay, mut upstream_app) = duplex(64);
        let relay = tokio::spawn(forward(client_relay, upstream_relay));

        let payload: Vec<u8> = (0..1024 * 1024).map(|i| (i % 251) as u8).collect();

        let write = async {
            for chunk in payload.chunks(1000) {
                client_app.write_all(chunk).await.unwrap();
            }
        };
        let read = read_exact_len(&mut upstream_app, payload.len());
        let (_, received) = tokio::join!(write, read);
        assert_eq!(received, payload);

        let reply: Vec<u8> = payload.iter().rev().copied().collect();
        let write = async {
            for chunk in reply.chunks(777) {
                upstream_app.write_all(chunk).await.unwrap();
            }
        };
        let read = read_exact_len(&mut client_app, reply.len());
        let (_, received) = tokio::join!(write, read);
        assert_eq!(received, reply);

        drop(client_app);
        let stats = relay.await.unwrap().unwrap();
        assert_eq!(stats.client_to_upstream, payload.len() as u64);
        assert_eq!(stats.upstream_to_client, reply.len() as u64);
    }

    #[tokio::test]
    async fn client_close_closes_upstream() {
        let (mut client_app, client_relay) = duplex(1024);
        let (upstream_relay, mut upstream_app) = duplex(1024);
        let relay = tokio::spawn(forward(client_relay, upstream_relay));

        client_app.write_all(b"bye").await.unwrap();
        drop(client_app);

        let mut received = Vec::new();
        upstream_app.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"bye");
        relay.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn upstream_close_closes_client() {
        let (mut client_app, client_relay) = duplex(1024);
        let (upstream_relay, mut upstream_app) = duplex(1024);
        let relay = tokio::spawn(forward(client_relay, upstream_relay));

        upstream_app.write_all(b"done").await.unwrap();
        drop(upstream_app);

        let mut received = Vec::new();
        client_app.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"done");

        let stats = relay.await.unwrap().unwrap();
        assert_eq!(stats.upstream_to_client, 4);
    }
}
