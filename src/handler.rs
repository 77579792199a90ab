//! New connection handling
//!
//! Accepts at most one pending connection per call. Accepted connections
//! wait in a [`PendingHandshake`] until their first message arrives; each
//! poll only reads what is already there, so a silent peer never holds up
//! the loop. Deciding whether the requested name is free is left to the
//! registry.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::Instant;
use tracing::{debug, error};

use crate::codec::{self, Handshake, LineBuffer};
use crate::error::AppError;
use crate::session::{Connection, Session};
use crate::types::SessionId;

/// A connection whose handshake decoded successfully
#[derive(Debug)]
pub struct Admission {
    pub session: Session,
    pub connection: Connection,
    /// Requested messenger name, or None for a viewer
    pub name: Option<String>,
}

/// Outcome of polling a pending handshake
#[derive(Debug)]
pub enum HandshakeProgress {
    /// Nothing decodable yet, try again next tick
    Waiting(PendingHandshake),
    Ready(Admission),
    /// The connection is dropped with the pending entry
    Rejected {
        remote_addr: SocketAddr,
        error: AppError,
    },
}

/// An accepted connection that hasn't identified itself yet
#[derive(Debug)]
pub struct PendingHandshake {
    session: Session,
    connection: Connection,
    deadline: Instant,
}

impl PendingHandshake {
    /// Start waiting for the handshake of a freshly accepted stream
    pub fn new(stream: TcpStream, remote_addr: SocketAddr, limit: Duration) -> Self {
        debug!("Handling a new client from {}", remote_addr);
        Self {
            session: Session::new(SessionId::new(), remote_addr),
            connection: Connection::new(stream, LineBuffer::new()),
            deadline: Instant::now() + limit,
        }
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.session.remote_addr
    }

    /// Read what has arrived and decode the handshake if it is complete
    ///
    /// The payload is the first line, or the unterminated bytes received so
    /// far once a poll brings nothing new or the deadline has passed. Bytes
    /// after the payload stay buffered in the admitted connection.
    pub fn poll(mut self, now: Instant) -> HandshakeProgress {
        let remote_addr = self.remote_addr();
        let reject = |error| HandshakeProgress::Rejected { remote_addr, error };

        let received = match self.connection.fill() {
            Ok(received) => received,
            Err(e) => return reject(e),
        };
        let expired = now >= self.deadline;

        let Some(payload) = self.connection.next_message(!received || expired) else {
            if self.connection.is_faulted() {
                return reject(AppError::PeerClosed);
            }
            if expired {
                return reject(AppError::HandshakeTimeout);
            }
            return HandshakeProgress::Waiting(self);
        };
        debug!("Handshake from {}: '{}'", remote_addr, payload);

        let name = match codec::parse_handshake(&payload) {
            Handshake::Viewer => None,
            Handshake::Messenger(name) => Some(name),
            Handshake::Invalid(reason) => return reject(AppError::HandshakeRejected(reason)),
        };

        HandshakeProgress::Ready(Admission {
            session: self.session,
            connection: self.connection,
            name,
        })
    }
}

/// Accept one pending connection if there is one, without waiting
pub fn try_accept(listener: &TcpListener) -> Option<(TcpStream, SocketAddr)> {
    match listener.accept().now_or_never()? {
        Ok(accepted) => Some(accepted),
        Err(e) => {
            error!("Failed to accept connection: {}", e);
            None
        }
    }
}
