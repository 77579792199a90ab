//! Session state
//!
//! [`Session`] is the metadata the registry keeps per connection;
//! [`Connection`] owns the socket and its inbound framing buffer and is only
//! touched by the server loop.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::debug;

use crate::codec::{self, LineBuffer};
use crate::error::AppError;
use crate::types::SessionId;

/// Size of a single socket read
const READ_CHUNK: usize = 2 * 1024;

/// Negotiated role of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Accepted, handshake not yet decoded
    Unidentified,
    /// Receives broadcasts only
    Viewer,
    /// Named; receives broadcasts and may send commands
    Messenger,
}

/// Connected session information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Unique identifier for this session
    pub id: SessionId,
    /// Negotiated role
    pub role: Role,
    /// Peer address
    pub remote_addr: SocketAddr,
}

impl Session {
    /// Create an unidentified session for a freshly accepted peer
    pub fn new(id: SessionId, remote_addr: SocketAddr) -> Self {
        Self {
            id,
            role: Role::Unidentified,
            remote_addr,
        }
    }

    /// Move out of `Unidentified`
    ///
    /// The role is fixed once negotiated; later calls are ignored.
    pub fn identify(&mut self, role: Role) {
        if self.role == Role::Unidentified {
            self.role = role;
        }
    }

    pub fn is_messenger(&self) -> bool {
        self.role == Role::Messenger
    }
}

/// Socket half of a session
#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,
    inbound: LineBuffer,
    faulted: bool,
}

impl Connection {
    /// Wrap an accepted stream, keeping bytes already read past the handshake
    pub fn new(stream: TcpStream, inbound: LineBuffer) -> Self {
        Self {
            stream,
            inbound,
            faulted: false,
        }
    }

    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }

    /// Whether a read or write on this connection has failed
    pub fn is_faulted(&self) -> bool {
        self.faulted
    }

    pub fn mark_faulted(&mut self) {
        self.faulted = true;
    }

    /// Pull every byte the socket has ready into the line buffer
    ///
    /// Returns whether anything arrived. An orderly close by the peer marks
    /// the connection faulted; bytes that arrived before it are kept.
    pub fn fill(&mut self) -> Result<bool, AppError> {
        let mut chunk = [0u8; READ_CHUNK];
        let mut received = false;
        loop {
            match self.stream.try_read(&mut chunk) {
                Ok(0) => {
                    self.faulted = true;
                    break;
                }
                Ok(n) => {
                    received = true;
                    self.inbound.push(&chunk[..n])?;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(received)
    }

    /// Next buffered message
    ///
    /// A complete line, or else the unterminated tail once no new bytes
    /// arrived for it (`idle`) or the peer has gone.
    pub fn next_message(&mut self, idle: bool) -> Option<String> {
        self.inbound.next_line().or_else(|| {
            if idle || self.faulted {
                self.inbound.take_partial()
            } else {
                None
            }
        })
    }

    /// Read whatever is available without waiting and return the messages
    pub fn read_available(&mut self) -> Result<Vec<String>, AppError> {
        let idle = !self.fill()?;
        Ok(std::iter::from_fn(|| self.next_message(idle)).collect())
    }

    /// Write one message, waiting at most `limit` for it to be fully sent
    pub async fn send(&mut self, text: &str, limit: Duration) -> Result<(), AppError> {
        let bytes = codec::encode(text);
        tokio::time::timeout(limit, self.stream.write_all(&bytes))
            .await
            .map_err(|_| AppError::WriteTimeout)??;
        Ok(())
    }

    /// Shut the stream down; errors are irrelevant at this point
    pub async fn close(mut self) {
        if let Err(e) = self.stream.shutdown().await {
            debug!("Error closing connection: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:6000".parse().unwrap()
    }

    #[test]
    fn test_session_creation() {
        let session = Session::new(SessionId::new(), addr());
        assert_eq!(session.role, Role::Unidentified);
        assert!(!session.is_messenger());
    }

    #[test]
    fn test_session_role_is_fixed() {
        let mut session = Session::new(SessionId::new(), addr());
        session.identify(Role::Messenger);
        assert!(session.is_messenger());

        session.identify(Role::Viewer);
        assert_eq!(session.role, Role::Messenger);
    }

    #[tokio::test]
    async fn test_connection_reads_lines_and_detects_close() {
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut client = TcpStream::connect(listener.local_addr().unwrap())
            .await
            .unwrap();
        let (stream, _) = listener.accept().await.unwrap();
        let mut conn = Connection::new(stream, LineBuffer::new());

        client.write_all(b"one\ntwo\npart").await.unwrap();
        conn.stream().readable().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(conn.read_available().unwrap(), vec!["one", "two"]);

        client.write_all(b"\nlast\n").await.unwrap();
        drop(client);
        tokio::time::sleep(Duration::from_millis(20)).await;
        conn.stream().readable().await.unwrap();
        assert_eq!(conn.read_available().unwrap(), vec!["part", "last"]);
        assert!(conn.is_faulted());
    }

    #[tokio::test]
    async fn test_connection_flushes_idle_unterminated_message() {
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut client = TcpStream::connect(listener.local_addr().unwrap())
            .await
            .unwrap();
        let (stream, _) = listener.accept().await.unwrap();
        let mut conn = Connection::new(stream, LineBuffer::new());

        client.write_all(b"chat:hi").await.unwrap();
        conn.stream().readable().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Held back while bytes are still arriving, released once idle
        assert!(conn.read_available().unwrap().is_empty());
        assert_eq!(conn.read_available().unwrap(), vec!["chat:hi"]);
        assert!(conn.read_available().unwrap().is_empty());
        assert!(!conn.is_faulted());
    }
}
