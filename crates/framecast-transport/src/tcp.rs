use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::debug;

use crate::error::{Result, TransportError};

/// Bind a TCP listener, attaching the address to any failure.
///
/// Port `0` asks the OS for an ephemeral port; use `local_addr()` on the
/// returned listener to find out which one was assigned.
pub async fn bind_tcp(addr: SocketAddr) -> Result<TcpListener> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| TransportError::Bind { addr, source })?;
    debug!(%addr, "tcp listener bound");
    Ok(listener)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn binds_ephemeral_port() {
        let listener = bind_tcp("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = listener.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
    }

    #[tokio::test]
    async fn reports_address_when_port_taken() {
        let first = bind_tcp("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let taken = first.local_addr().unwrap();

        let err = bind_tcp(taken).await.unwrap_err();
        match err {
            TransportError::Bind { addr, .. } => assert_eq!(addr, taken),
            other => panic!("expected bind error, got {other:?}"),
        }
    }
}
