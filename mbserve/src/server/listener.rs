use std::net::SocketAddr;

use tokio::net::TcpListener;

use crate::common::phys::PhysLayer;
use crate::error::ServerError;

/// Bound listening socket
pub(crate) struct Listener {
    inner: TcpListener,
    local_addr: SocketAddr,
}

/// An accepted client connection
pub(crate) struct Connection {
    pub(crate) peer: SocketAddr,
    pub(crate) phys: PhysLayer,
}

impl Listener {
    /// Bind to `addr` with the OS default backlog
    pub(crate) async fn bind(addr: SocketAddr) -> Result<Self, ServerError> {
        let inner = TcpListener::bind(addr)
            .await
            .map_err(|err| ServerError::Bind(addr, err.kind()))?;

        // resolves port 0 to the port actually assigned
        let local_addr = inner
            .local_addr()
            .map_err(|err| ServerError::Bind(addr, err.kind()))?;

        tracing::info!("listening on: {}", local_addr);

        Ok(Self { inner, local_addr })
    }

    pub(crate) async fn accept(&self) -> Result<Connection, ServerError> {
        let (socket, peer) = self
            .inner
            .accept()
            .await
            .map_err(|err| ServerError::Accept(err.kind()))?;

        if let Err(err) = socket.set_nodelay(true) {
            tracing::warn!("unable to disable Nagle's algorithm: {}", err);
        }

        Ok(Connection {
            peer,
            phys: PhysLayer::new_tcp(socket),
        })
    }

    pub(crate) fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn binding_port_zero_reports_assigned_port() {
        let listener = Listener::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        assert_ne!(listener.local_addr().port(), 0);
    }

    #[tokio::test]
    async fn binding_an_address_in_use_fails() {
        let first = Listener::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let addr = first.local_addr();
        match Listener::bind(addr).await {
            Err(ServerError::Bind(x, std::io::ErrorKind::AddrInUse)) => assert_eq!(x, addr),
            Err(err) => panic!("unexpected error: {err}"),
            Ok(_) => panic!("second bind succeeded"),
        }
    }

    #[tokio::test]
    async fn accepts_a_client() {
        let listener = Listener::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let client = tokio::net::TcpStream::connect(listener.local_addr())
            .await
            .unwrap();
        let connection = listener.accept().await.unwrap();
        assert_eq!(connection.peer, client.local_addr().unwrap());
    }
}
