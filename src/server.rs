//! ChatServer tick loop
//!
//! A single task owns the registry, every connection and the outbound queue.
//! Each tick runs, in order:
//! 1. accept at most one pending connection, then advance every handshake
//!    still in progress without waiting on any of them
//! 2. probe every session and drop the disconnected ones
//! 3. read and decode whatever the messengers have sent
//! 4. flush the outbound queue
//!
//! then idles until the next tick or a shutdown request.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::codec::{self, Intent};
use crate::config::ServerConfig;
use crate::detector;
use crate::error::AppError;
use crate::handler::{self, Admission, HandshakeProgress, PendingHandshake};
use crate::registry::Registry;
use crate::router::{self, Delivery};
use crate::session::Connection;
use crate::types::SessionId;

/// Cooperative shutdown signal for a running [`ChatServer`]
///
/// Only flips a flag; the loop notices it at the next tick boundary.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.sender.borrow()
    }
}

/// The chat relay
pub struct ChatServer {
    listener: TcpListener,
    /// Chat name used in the viewer welcome
    display_name: String,
    tick_interval: Duration,
    handshake_timeout: Duration,
    write_timeout: Duration,
    registry: Registry,
    /// Socket per registered session: SessionId -> Connection
    connections: HashMap<SessionId, Connection>,
    /// Accepted connections still waiting for their handshake
    pending: Vec<PendingHandshake>,
    /// Deliveries waiting for the end of the tick
    outbound: VecDeque<Delivery>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl ChatServer {
    /// Bind the listener described by `config`
    pub async fn bind(config: &ServerConfig) -> Result<Self, AppError> {
        let listener =
            TcpListener::bind((config.bind_address.as_str(), config.port)).await?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            listener,
            display_name: config.display_name.clone(),
            tick_interval: config.tick_interval(),
            handshake_timeout: config.handshake_timeout(),
            write_timeout: config.write_timeout(),
            registry: Registry::new(),
            connections: HashMap::new(),
            pending: Vec::new(),
            outbound: VecDeque::new(),
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, AppError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            sender: Arc::clone(&self.shutdown_tx),
        }
    }

    /// Run ticks until shutdown is requested, then close every session
    pub async fn run(mut self) {
        info!(
            "Starting the \"{}\" chat server on {:?}",
            self.display_name,
            self.listener.local_addr().ok()
        );

        let mut ticker = interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !*self.shutdown_rx.borrow() {
            self.tick().await;

            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.shutdown_rx.changed() => {}
            }
        }

        info!("Shutting down server");
        self.pending.clear();
        for (_, conn) in self.connections.drain() {
            conn.close().await;
        }
        self.registry = Registry::new();
        info!("Server is shut down.");
    }

    async fn tick(&mut self) {
        self.accept_pending().await;
        self.check_for_disconnects().await;
        self.check_for_messages();
        self.send_messages().await;
    }

    async fn accept_pending(&mut self) {
        if let Some((stream, addr)) = handler::try_accept(&self.listener) {
            self.pending
                .push(PendingHandshake::new(stream, addr, self.handshake_timeout));
        }

        let now = Instant::now();
        for pending in std::mem::take(&mut self.pending) {
            match pending.poll(now) {
                HandshakeProgress::Waiting(pending) => self.pending.push(pending),
                HandshakeProgress::Ready(admission) => self.admit(admission).await,
                HandshakeProgress::Rejected { remote_addr, error } => {
                    info!("Wasn't able to identify {}: {}", remote_addr, error)
                }
            }
        }
    }

    async fn admit(&mut self, admission: Admission) {
        let Admission {
            session,
            connection,
            name,
        } = admission;
        let id = session.id;
        let addr = session.remote_addr;

        match name {
            None => {
                self.registry.admit_viewer(session);
                self.connections.insert(id, connection);
                info!("{} is a Viewer.", addr);
                self.outbound
                    .push_back(router::welcome(&self.display_name, id));
            }
            Some(name) => {
                if !self.registry.admit_messenger(session, &name) {
                    info!("Rejected {}: name '{}' is taken", addr, name);
                    connection.close().await;
                    return;
                }
                self.connections.insert(id, connection);
                info!("{} is a Messenger with the name {}.", addr, name);
                self.enqueue(&Intent::Join { name });
            }
        }

        self.after_membership_change();
    }

    async fn check_for_disconnects(&mut self) {
        let mut gone = Vec::new();
        for id in self.registry.viewers() {
            match self.connections.get(id) {
                Some(conn) if !detector::is_disconnected(conn).await => {}
                _ => gone.push(*id),
            }
        }

        for id in gone {
            self.remove_session(id).await;
        }
    }

    async fn remove_session(&mut self, id: SessionId) {
        let name = self.registry.name_of(id).map(str::to_owned);
        let removed = self.registry.remove(id);
        if let Some(conn) = self.connections.remove(&id) {
            conn.close().await;
        }

        let Some(session) = removed else {
            return;
        };
        match name {
            Some(name) => {
                info!("Messenger {} has left ({}).", name, session.remote_addr);
                self.enqueue(&Intent::Leave { name });
            }
            None => info!("Viewer {} has left.", session.remote_addr),
        }

        self.after_membership_change();
    }

    fn check_for_messages(&mut self) {
        let ids = self.registry.viewers().to_vec();
        for id in ids {
            let Some(conn) = self.connections.get_mut(&id) else {
                continue;
            };
            if conn.is_faulted() {
                continue;
            }

            let lines = match conn.read_available() {
                Ok(lines) => lines,
                Err(AppError::LineTooLong(max)) => {
                    warn!("Session {} sent a line over {} bytes, dropped", id, max);
                    continue;
                }
                Err(e) => {
                    debug!("Read from session {} failed: {}", id, e);
                    conn.mark_faulted();
                    continue;
                }
            };

            // Viewers don't send commands; whatever they write is discarded
            let Some(name) = self.registry.name_of(id).map(str::to_owned) else {
                if !lines.is_empty() {
                    debug!("Discarding {} lines from viewer {}", lines.len(), id);
                }
                continue;
            };

            for line in lines {
                debug!("Message from {}: >{}<", name, line);
                match codec::decode_command(&name, &line) {
                    Some(intent) => self.enqueue(&intent),
                    None => debug!("Dropping unrecognized line from {}", name),
                }
            }
        }
    }

    async fn send_messages(&mut self) {
        while let Some(delivery) = self.outbound.pop_front() {
            let Some(conn) = self.connections.get_mut(&delivery.target) else {
                debug!("No connection for {}, dropping delivery", delivery.target);
                continue;
            };
            if conn.is_faulted() {
                continue;
            }

            if let Err(e) = conn.send(&delivery.text, self.write_timeout).await {
                warn!("Send to {} failed: {}", delivery.target, e);
                conn.mark_faulted();
            }
        }
    }

    fn enqueue(&mut self, intent: &Intent) {
        let deliveries = router::route(intent, &self.registry);
        debug!("Enqueuing {:?} for {} recipients", intent, deliveries.len());
        self.outbound.extend(deliveries);
    }

    fn after_membership_change(&self) {
        if let Err(e) = self.registry.check_invariants() {
            error!("{}", e);
            if cfg!(debug_assertions) {
                panic!("{}", e);
            }
        }
        self.show_rosters();
    }

    fn show_rosters(&self) {
        let describe = |id: &SessionId| {
            let addr = self
                .registry
                .session(*id)
                .map(|s| s.remote_addr.to_string())
                .unwrap_or_default();
            match self.registry.name_of(*id) {
                Some(name) => format!("{} ({})", addr, name),
                None => addr,
            }
        };

        let viewers: Vec<String> = self.registry.viewers().iter().map(describe).collect();
        let messengers: Vec<String> = self.registry.messengers().iter().map(describe).collect();
        debug!("Viewers ({}): {:?}", viewers.len(), viewers);
        debug!("Messengers ({}): {:?}", messengers.len(), messengers);
    }
}

/// Bind, install the Ctrl-C handler and serve until interrupted
pub async fn start(config: ServerConfig) -> Result<(), AppError> {
    let server = ChatServer::bind(&config).await?;
    let handle = server.shutdown_handle();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, shutting down");
                handle.shutdown();
            }
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    server.run().await;
    Ok(())
}
