//! Listening sockets, accepted streams and the TLS seam.

use crate::config::ListenAddr;
use asyncd_core::{PeerAddr, ServerError};
use std::{
    future::Future,
    io,
    net::SocketAddr,
    path::{Path, PathBuf},
    pin::Pin,
};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{TcpListener, TcpSocket, TcpStream},
};

#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};

/// A duplex byte stream the session driver can read and write.
pub trait IoStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> IoStream for T {}

/// Type-erased connection stream.
pub type BoxStream = Box<dyn IoStream>;

/// Wraps accepted TCP streams in TLS.
///
/// The engine ships no TLS implementation; embedders install one with
/// [`Server::set_tls_layer`](crate::Server::set_tls_layer) and enable it with
/// `server.enable_ssl`. Unix socket connections are never wrapped.
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not a `TlsLayer`",
    label = "missing `TlsLayer` implementation",
    note = "TLS layers return the wrapped stream as a `BoxStream`."
)]
pub trait TlsLayer: Send + Sync + 'static {
    /// Run the server side of the handshake on `stream`.
    ///
    /// An error closes the connection before any event is fired for it.
    fn accept<'a>(
        &'a self,
        stream: TcpStream,
        cert: &'a Path,
    ) -> Pin<Box<dyn Future<Output = io::Result<BoxStream>> + Send + 'a>>;
}

/// A freshly accepted stream, before any TLS wrapping.
pub(crate) enum RawStream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

/// A bound listening socket.
#[derive(Debug)]
pub(crate) enum Listener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix { listener: UnixListener, path: PathBuf },
}

impl Listener {
    /// Bind and listen. Must run inside a tokio runtime context.
    pub(crate) fn bind(addr: &ListenAddr, backlog: u32) -> Result<Self, ServerError> {
        let bind_error = |source: io::Error| ServerError::Bind {
            addr: addr.to_string(),
            source,
        };
        match addr {
            ListenAddr::Inet(socket_addr) => {
                let listener = listen_tcp(*socket_addr, backlog).map_err(bind_error)?;
                Ok(Self::Tcp(listener))
            }
            #[cfg(unix)]
            ListenAddr::Unix(path) => {
                let listener = UnixListener::bind(path).map_err(bind_error)?;
                Ok(Self::Unix {
                    listener,
                    path: path.clone(),
                })
            }
            #[cfg(not(unix))]
            ListenAddr::Unix(_) => Err(bind_error(io::Error::new(
                io::ErrorKind::Unsupported,
                "unix sockets are not available on this platform",
            ))),
        }
    }

    pub(crate) async fn accept(&self) -> io::Result<(RawStream, PeerAddr)> {
        match self {
            Self::Tcp(listener) => {
                let (stream, peer) = listener.accept().await?;
                if let Err(err) = stream.set_nodelay(true) {
                    tracing::warn!(%peer, error = %err, "TCP_NODELAY not set");
                }
                Ok((RawStream::Tcp(stream), PeerAddr::Inet(peer)))
            }
            #[cfg(unix)]
            Self::Unix { listener, .. } => {
                let (stream, peer) = listener.accept().await?;
                let path = peer.as_pathname().map(Path::to_path_buf);
                Ok((RawStream::Unix(stream), PeerAddr::Local(path)))
            }
        }
    }

    pub(crate) fn local_addr(&self) -> io::Result<ListenAddr> {
        match self {
            Self::Tcp(listener) => listener.local_addr().map(ListenAddr::Inet),
            #[cfg(unix)]
            Self::Unix { path, .. } => Ok(ListenAddr::Unix(path.clone())),
        }
    }

    /// Stop listening. A Unix socket file is removed.
    pub(crate) fn close(self) {
        match self {
            Self::Tcp(listener) => drop(listener),
            #[cfg(unix)]
            Self::Unix { listener, path } => {
                drop(listener);
                if let Err(err) = std::fs::remove_file(&path) {
                    tracing::debug!(path = %path.display(), error = %err, "socket file not removed");
                }
            }
        }
    }
}

fn listen_tcp(addr: SocketAddr, backlog: u32) -> io::Result<TcpListener> {
    let socket = match addr {
        SocketAddr::V4(_) => TcpSocket::new_v4()?,
        SocketAddr::V6(_) => TcpSocket::new_v6()?,
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(backlog)
}

impl RawStream {
    /// Box the stream, running the TLS handshake on TCP streams when a layer
    /// is configured.
    pub(crate) async fn into_stream(
        self,
        tls: Option<(&dyn TlsLayer, &Path)>,
    ) -> io::Result<BoxStream> {
        match (self, tls) {
            (Self::Tcp(stream), Some((layer, cert))) => layer.accept(stream, cert).await,
            (Self::Tcp(stream), None) => Ok(Box::new(stream) as BoxStream),
            #[cfg(unix)]
            (Self::Unix(stream), _) => Ok(Box::new(stream) as BoxStream),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn test_tcp_accept_keeps_stream_with_nodelay() {
        let addr = ListenAddr::Inet(SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0));
        let listener = Listener::bind(&addr, 16).unwrap();
        let bound = match listener.local_addr().unwrap() {
            ListenAddr::Inet(bound) => bound,
            other => panic!("not a TCP listener: {other}"),
        };

        let client = TcpStream::connect(bound).await.unwrap();
        let (raw, peer) = listener.accept().await.unwrap();
        assert_eq!(peer, PeerAddr::Inet(client.local_addr().unwrap()));
        match raw {
            RawStream::Tcp(stream) => assert!(stream.nodelay().unwrap()),
            #[cfg(unix)]
            RawStream::Unix(_) => panic!("expected a TCP stream"),
        }
        listener.close();
    }
}
