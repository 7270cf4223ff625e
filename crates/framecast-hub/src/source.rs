use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use framecast_transport::{bind_tcp, TransportError};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::channel::Channel;
use crate::error::Result;

const READ_CHUNK_SIZE: usize = 64 * 1024;
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Accepts producer connections for one channel.
///
/// Every connection gets its own task that reads until EOF and feeds the
/// channel. The listener itself never stops on connection or accept errors.
pub struct SourceListener {
    listener: TcpListener,
    channel: Arc<Channel>,
}

impl SourceListener {
    /// Bind the producer port for `channel`.
    pub async fn bind(addr: SocketAddr, channel: Arc<Channel>) -> Result<Self> {
        let listener = bind_tcp(addr).await?;
        Ok(Self { listener, channel })
    }

    /// Address actually bound (resolves port 0).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr().map_err(TransportError::Io)?)
    }

    /// Accept producers until `shutdown` fires.
    pub async fn run(self, shutdown: CancellationToken) {
        let channel_name = self.channel.name().to_string();
        info!(
            channel = %channel_name,
            addr = ?self.listener.local_addr().ok(),
            frame_size = self.channel.config().frame_size,
            "accepting producers"
        );

        loop {
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    let channel = Arc::clone(&self.channel);
                    let shutdown = shutdown.clone();
                    tokio::spawn(pump_producer(stream, peer, channel, shutdown));
                }
                Err(err) => {
                    warn!(
                        channel = %channel_name,
                        error = %TransportError::Accept(err),
                        "producer accept failed; retrying"
                    );
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                }
            }
        }

        debug!(channel = %channel_name, "producer listener stopped");
    }
}

/// Read one producer connection to completion.
async fn pump_producer(
    mut stream: TcpStream,
    peer: SocketAddr,
    channel: Arc<Channel>,
    shutdown: CancellationToken,
) {
    let active = channel.producer_connected();
    info!(channel = %channel.name(), %peer, active, "producer connected");
    if active > 1 {
        warn!(
            channel = %channel.name(),
            active,
            "multiple producers on one channel; their bytes are merged"
        );
    }

    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    let mut received = 0u64;
    let mut frames = 0usize;

    loop {
        let read = tokio::select! {
            _ = shutdown.cancelled() => break,
            read = stream.read(&mut buf) => read,
        };

        match read {
            Ok(0) => break,
            Ok(n) => {
                received += n as u64;
                frames += channel.ingest(&buf[..n]);
            }
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => {
                warn!(channel = %channel.name(), %peer, error = %err, "producer read failed");
                break;
            }
        }
    }

    let remaining = channel.producer_disconnected();
    info!(
        channel = %channel.name(),
        %peer,
        received,
        frames,
        "producer disconnected"
    );
    if remaining == 0 {
        debug!(
            channel = %channel.name(),
            buffered = channel.buffered(),
            "no producers left; partial frame kept for the next connection"
        );
    }
}
