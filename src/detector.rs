//! Disconnect detection
//!
//! A session counts as disconnected when its socket is readable but has no
//! bytes pending (the peer closed), when probing the socket fails, or when an
//! earlier read or write already faulted it. A peer that only half-closes its
//! write side is indistinguishable from a closed one.

use std::time::Duration;

use tracing::debug;

use crate::session::Connection;

/// Longest time a single probe may wait for readability
pub const POLL_TIMEOUT: Duration = Duration::from_millis(1);

/// Probe one connection without consuming any of its data
pub async fn is_disconnected(conn: &Connection) -> bool {
    if conn.is_faulted() {
        return true;
    }

    let mut probe = [0u8; 1];
    match tokio::time::timeout(POLL_TIMEOUT, conn.stream().peek(&mut probe)).await {
        // Not readable within the window: idle but alive
        Err(_) => false,
        Ok(Ok(0)) => true,
        Ok(Ok(_)) => false,
        Ok(Err(e)) => {
            debug!("Socket probe failed: {}", e);
            true
        }
    }
}
