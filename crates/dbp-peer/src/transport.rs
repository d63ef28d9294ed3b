use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// Abstract transport layer trait.
/// Lets plain TCP and TLS-wrapped sockets (or mocks) plug in transparently.
#[async_trait]
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin {
    /// Get remote peer address.
    fn peer_addr(&self) -> io::Result<SocketAddr>;

    /// Get local address.
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

#[async_trait]
impl Transport for TcpStream {
    fn peer_addr(&self) -> io::Result<SocketAddr> {
        TcpStream::peer_addr(self)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        TcpStream::local_addr(self)
    }
}

#[async_trait]
impl Transport for tokio_rustls::client::TlsStream<TcpStream> {
    fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.get_ref().0.peer_addr()
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.get_ref().0.local_addr()
    }
}

#[async_trait]
impl Transport for tokio_rustls::server::TlsStream<TcpStream> {
    fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.get_ref().0.peer_addr()
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.get_ref().0.local_addr()
    }
}
