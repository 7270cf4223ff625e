use std::net::SocketAddr;
use std::time::Duration;

use framecast_frame::{Frame, FrameKind};
use framecast_transport::{bind_tcp, TransportError};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::broadcaster::ChannelBroadcaster;
use crate::error::Result;

const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Why a subscriber connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disconnect {
    Shutdown,
    ClientClosed,
    Dropped,
    WriteFailed,
    WriteTimedOut,
    ReadFailed,
}

impl Disconnect {
    fn as_str(self) -> &'static str {
        match self {
            Disconnect::Shutdown => "shutdown",
            Disconnect::ClientClosed => "client closed",
            Disconnect::Dropped => "dropped by broadcaster",
            Disconnect::WriteFailed => "write failed",
            Disconnect::WriteTimedOut => "write timed out",
            Disconnect::ReadFailed => "read failed",
        }
    }
}

/// WebSocket endpoint for one channel.
///
/// Each accepted client is registered with the channel's broadcaster once the
/// opening handshake completes, and unregistered when its connection task ends.
pub struct SubscriptionServer {
    listener: TcpListener,
    broadcaster: ChannelBroadcaster,
    write_timeout: Duration,
}

impl SubscriptionServer {
    pub async fn bind(
        addr: SocketAddr,
        broadcaster: ChannelBroadcaster,
        write_timeout: Duration,
    ) -> Result<Self> {
        let listener = bind_tcp(addr).await?;
        Ok(Self {
            listener,
            broadcaster,
            write_timeout,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr().map_err(TransportError::Io)?)
    }

    /// Accept subscribers until `shutdown` fires.
    pub async fn run(self, shutdown: CancellationToken) {
        let channel = self.broadcaster.channel().to_string();
        info!(
            channel = %channel,
            addr = ?self.listener.local_addr().ok(),
            "accepting subscribers"
        );

        loop {
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    tokio::spawn(serve_subscriber(
                        stream,
                        peer,
                        self.broadcaster.clone(),
                        self.write_timeout,
                        shutdown.clone(),
                    ));
                }
                Err(err) => {
                    warn!(
                        channel = %channel,
                        error = %TransportError::Accept(err),
                        "subscriber accept failed; retrying"
                    );
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                }
            }
        }

        debug!(channel = %channel, "subscriber listener stopped");
    }
}

/// Serve one subscriber connection. Returns `None` if the handshake failed.
async fn serve_subscriber(
    stream: TcpStream,
    peer: SocketAddr,
    broadcaster: ChannelBroadcaster,
    write_timeout: Duration,
    shutdown: CancellationToken,
) -> Option<Disconnect> {
    let channel = broadcaster.channel().to_string();
    let ws = match timeout(write_timeout, tokio_tungstenite::accept_async(stream)).await {
        Ok(Ok(ws)) => ws,
        Ok(Err(err)) => {
            debug!(channel = %channel, %peer, error = %err, "websocket handshake failed");
            return None;
        }
        Err(_) => {
            debug!(channel = %channel, %peer, "websocket handshake timed out");
            return None;
        }
    };

    let mut subscription = broadcaster.subscribe();
    let subscriber = subscription.id();
    info!(channel = %channel, %peer, %subscriber, "subscriber connected");

    let (mut sink, mut incoming) = ws.split();
    let mut sent = 0u64;

    let reason = loop {
        tokio::select! {
            _ = shutdown.cancelled() => break Disconnect::Shutdown,
            frame = subscription.recv() => {
                let Some(frame) = frame else {
                    break Disconnect::Dropped;
                };
                match timeout(write_timeout, sink.send(to_message(frame))).await {
                    Ok(Ok(())) => sent += 1,
                    Ok(Err(err)) => {
                        debug!(channel = %channel, %subscriber, error = %err, "send failed");
                        break Disconnect::WriteFailed;
                    }
                    Err(_) => break Disconnect::WriteTimedOut,
                }
            }
            message = incoming.next() => match message {
                Some(Ok(Message::Close(_))) | None => break Disconnect::ClientClosed,
                Some(Ok(Message::Text(text))) => {
                    debug!(
                        channel = %channel,
                        %subscriber,
                        text = %text.as_str(),
                        "ignoring client text"
                    );
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    debug!(channel = %channel, %subscriber, error = %err, "read failed");
                    break Disconnect::ReadFailed;
                }
            },
        }
    };

    drop(subscription);
    info!(
        channel = %channel,
        %peer,
        %subscriber,
        sent,
        reason = reason.as_str(),
        "subscriber disconnected"
    );

    if matches!(reason, Disconnect::Shutdown | Disconnect::Dropped) {
        let _ = timeout(write_timeout, sink.close()).await;
    }
    Some(reason)
}

/// WebSocket message for a frame: binary as-is, text as a text message.
fn to_message(frame: Frame) -> Message {
    match frame.kind {
        FrameKind::Binary => Message::binary(frame.payload),
        FrameKind::Text => match String::from_utf8(frame.payload.to_vec()) {
            Ok(text) => Message::text(text),
            Err(_) => Message::binary(frame.payload),
        },
    }
}
