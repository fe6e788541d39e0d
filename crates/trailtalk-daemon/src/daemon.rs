//! Core link orchestration.
//!
//! One coordinating loop owns all link state: the peer directory, the
//! single-use rendezvous, the current dial attempt, and the live session.
//! Role tasks (accept, dial, receive loop, discovery feed) communicate
//! exclusively by sending [`DaemonEvent`]s into this loop; consumer events
//! leave through a single [`LinkEvent`] channel, so the embedding
//! application observes a serialized stream.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use trailtalk_discovery::{Discovery, DiscoveryEvent, Peer};
use trailtalk_protocol::{BoxedStream, ProtocolError, Transport};
use trailtalk_types::{ChatMessage, PeerId};

use crate::config::Config;
use crate::error::DaemonError;
use crate::session::Session;
use crate::state::LinkPhase;

/// Commands accepted from the embedding application.
#[derive(Debug, Clone)]
pub enum Command {
    /// Refresh the peer directory: browse, open the rendezvous, advertise.
    StartDiscovery,
    /// Stop browsing and advertising.
    StopDiscovery,
    /// Dial a peer, superseding any in-flight attempt.
    ConnectToPeer(Peer),
    /// Send a friend request over the live session.
    SendFriendRequest { user_id: String, user_name: String },
    /// Send chat text over the live session. Dropped without a session.
    SendChatMessage(String),
}

/// Events processed by the daemon's coordinating loop.
pub enum DaemonEvent {
    /// A command from the embedding application.
    Command(Command),
    /// A discovery event from the browse feed.
    Discovered(DiscoveryEvent),
    /// The rendezvous accepted its one inbound connection.
    InboundConnection {
        stream: BoxedStream,
        remote: SocketAddr,
    },
    /// The accept loop ended without a connection.
    ListenerClosed { error: String },
    /// An outbound dial attempt finished.
    DialFinished {
        attempt: u64,
        peer: Peer,
        result: Result<BoxedStream, ProtocolError>,
    },
    /// The live session decoded one message.
    SessionMessage { token: u64, message: ChatMessage },
    /// The live session's receive loop terminated.
    SessionEnded { token: u64, error: Option<String> },
    /// Shutdown signal.
    Shutdown,
}

/// Events surfaced to the embedding application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A peer entered the directory (bonded or discovered).
    PeerDiscovered(Peer),
    /// A session was established, inbound or outbound.
    PeerConnected(Peer),
    /// The peer asked to be friends.
    FriendRequest { user_id: String, user_name: String },
    /// Chat text from the peer, verbatim.
    Chat { text: String },
    /// A connect or discovery failure, human-readable.
    ConnectionError { message: String },
    /// The live session ended. Raised exactly once per session.
    Disconnected,
}

/// Snapshot of the link for status displays and tests.
#[derive(Debug, Clone, Default)]
pub struct DaemonStatus {
    pub phase: LinkPhase,
    pub listening: bool,
    pub known_peers: usize,
    pub connected_to: Option<String>,
}

/// Command surface handed to the embedding application.
#[derive(Clone)]
pub struct LinkHandle {
    tx: mpsc::Sender<DaemonEvent>,
}

impl LinkHandle {
    pub async fn start_discovery(&self) -> Result<(), DaemonError> {
        self.send(DaemonEvent::Command(Command::StartDiscovery)).await
    }

    pub async fn stop_discovery(&self) -> Result<(), DaemonError> {
        self.send(DaemonEvent::Command(Command::StopDiscovery)).await
    }

    pub async fn connect_to_peer(&self, peer: Peer) -> Result<(), DaemonError> {
        self.send(DaemonEvent::Command(Command::ConnectToPeer(peer))).await
    }

    pub async fn send_friend_request(
        &self,
        user_id: impl Into<String>,
        user_name: impl Into<String>,
    ) -> Result<(), DaemonError> {
        self.send(DaemonEvent::Command(Command::SendFriendRequest {
            user_id: user_id.into(),
            user_name: user_name.into(),
        }))
        .await
    }

    pub async fn send_chat_message(&self, text: impl Into<String>) -> Result<(), DaemonError> {
        self.send(DaemonEvent::Command(Command::SendChatMessage(text.into())))
            .await
    }

    pub async fn shutdown(&self) -> Result<(), DaemonError> {
        self.send(DaemonEvent::Shutdown).await
    }

    async fn send(&self, event: DaemonEvent) -> Result<(), DaemonError> {
        self.tx.send(event).await.map_err(|_| DaemonError::NotRunning)
    }
}

struct DialAttempt {
    id: u64,
    peer: Peer,
    task: JoinHandle<()>,
}

/// The peer link daemon.
pub struct Daemon {
    config: Config,
    peer_id: PeerId,
    transport: Arc<dyn Transport>,
    discovery: Box<dyn Discovery>,
    directory: HashMap<PeerId, Peer>,
    event_tx: mpsc::Sender<DaemonEvent>,
    event_rx: mpsc::Receiver<DaemonEvent>,
    link_tx: mpsc::Sender<LinkEvent>,
    status_tx: watch::Sender<DaemonStatus>,
    status_rx: watch::Receiver<DaemonStatus>,
    listener: Option<JoinHandle<()>>,
    browse_task: Option<JoinHandle<()>>,
    dialer: Option<DialAttempt>,
    session: Option<Session>,
    discovering: bool,
    next_token: u64,
}

impl Daemon {
    /// Create a new daemon instance.
    pub fn new(
        config: Config,
        peer_id: PeerId,
        transport: Arc<dyn Transport>,
        discovery: Box<dyn Discovery>,
        link_tx: mpsc::Sender<LinkEvent>,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::channel(256);
        let (status_tx, status_rx) = watch::channel(DaemonStatus::default());

        Self {
            config,
            peer_id,
            transport,
            discovery,
            directory: HashMap::new(),
            event_tx,
            event_rx,
            link_tx,
            status_tx,
            status_rx,
            listener: None,
            browse_task: None,
            dialer: None,
            session: None,
            discovering: false,
            next_token: 0,
        }
    }

    /// Get the command handle for feeding the daemon.
    pub fn handle(&self) -> LinkHandle {
        LinkHandle {
            tx: self.event_tx.clone(),
        }
    }

    /// Get a receiver for status snapshots.
    pub fn status_receiver(&self) -> watch::Receiver<DaemonStatus> {
        self.status_rx.clone()
    }

    /// Run the coordinating loop until shutdown.
    pub async fn run(&mut self) -> Result<(), DaemonError> {
        info!(peer = %self.peer_id, name = %self.config.identity.name, "peer link running");
        self.publish_status();

        while let Some(event) = self.event_rx.recv().await {
            match event {
                DaemonEvent::Command(command) => self.handle_command(command).await,
                DaemonEvent::Discovered(event) => self.handle_discovered(event).await,
                DaemonEvent::InboundConnection { stream, remote } => {
                    self.handle_inbound(stream, remote).await;
                }
                DaemonEvent::ListenerClosed { error } => {
                    self.listener = None;
                    warn!(error = %error, "accept loop ended");
                    self.publish_status();
                }
                DaemonEvent::DialFinished {
                    attempt,
                    peer,
                    result,
                } => self.handle_dial_finished(attempt, peer, result).await,
                DaemonEvent::SessionMessage { token, message } => {
                    self.handle_session_message(token, message).await;
                }
                DaemonEvent::SessionEnded { token, error } => {
                    self.handle_session_ended(token, error).await;
                }
                DaemonEvent::Shutdown => {
                    info!("shutdown requested");
                    break;
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::StartDiscovery => self.start_discovery().await,
            Command::StopDiscovery => {
                self.stop_discovery().await;
                self.publish_status();
            }
            Command::ConnectToPeer(peer) => self.start_dial(peer).await,
            Command::SendFriendRequest { user_id, user_name } => {
                self.send_message(ChatMessage::FriendRequest { user_id, user_name })
                    .await;
            }
            Command::SendChatMessage(text) => {
                self.send_message(ChatMessage::Text(text)).await;
            }
        }
    }

    /// Directory refresh: browse, open the rendezvous, advertise, then
    /// repopulate from bonded peers. Any step failing rolls the others
    /// back, so a denied refresh leaves no partial state.
    async fn start_discovery(&mut self) {
        if self.discovering {
            debug!("discovery already running");
            return;
        }

        let feed = match self.discovery.browse().await {
            Ok(feed) => feed,
            Err(e) => {
                self.report_error(format!("could not start discovery: {e}")).await;
                return;
            }
        };

        let port = match self.start_listener().await {
            Ok(port) => port,
            Err(e) => {
                let _ = self.discovery.stop_browsing().await;
                self.report_error(format!("could not open rendezvous: {e}")).await;
                return;
            }
        };

        if let Err(e) = self
            .discovery
            .advertise(self.peer_id, &self.config.identity.name, port)
            .await
        {
            self.cancel_listener();
            let _ = self.discovery.stop_browsing().await;
            self.report_error(format!("could not advertise endpoint: {e}")).await;
            return;
        }

        self.directory.clear();
        for peer in self.bonded_peers() {
            self.directory.insert(peer.id, peer.clone());
            self.emit(LinkEvent::PeerDiscovered(peer)).await;
        }

        let tx = self.event_tx.clone();
        self.browse_task = Some(tokio::spawn(async move {
            let mut feed = feed;
            while let Some(event) = feed.recv().await {
                if tx.send(DaemonEvent::Discovered(event)).await.is_err() {
                    break;
                }
            }
        }));

        self.discovering = true;
        info!(port, "discovery started");
        self.publish_status();
    }

    async fn stop_discovery(&mut self) {
        if !self.discovering {
            return;
        }
        self.discovering = false;
        if let Some(task) = self.browse_task.take() {
            task.abort();
        }
        if let Err(e) = self.discovery.stop_browsing().await {
            debug!(error = %e, "stop browse failed");
        }
        if let Err(e) = self.discovery.stop_advertising().await {
            debug!(error = %e, "stop advertise failed");
        }
        info!("discovery stopped");
    }

    /// Bonded peers from config, always part of a refreshed directory.
    fn bonded_peers(&self) -> Vec<Peer> {
        let fallback_port = self.config.daemon.port;
        self.config
            .peers
            .iter()
            .filter_map(|entry| {
                let address: Result<SocketAddr, _> = entry
                    .address
                    .parse()
                    .or_else(|_| format!("{}:{fallback_port}", entry.address).parse());
                match address {
                    Ok(address) => Some(Peer {
                        id: PeerId::from_uuid(entry.id),
                        name: entry.name.clone(),
                        address,
                    }),
                    Err(e) => {
                        warn!(peer = %entry.name, error = %e, "invalid bonded peer address");
                        None
                    }
                }
            })
            .collect()
    }

    /// Bind the single-use rendezvous and spawn its accept task.
    async fn start_listener(&mut self) -> Result<u16, ProtocolError> {
        let mut rendezvous = self.transport.listen().await?;
        let port = rendezvous.local_addr()?.port();

        let tx = self.event_tx.clone();
        self.listener = Some(tokio::spawn(async move {
            match rendezvous.accept().await {
                Ok((stream, remote)) => {
                    let _ = tx
                        .send(DaemonEvent::InboundConnection { stream, remote })
                        .await;
                }
                Err(e) => {
                    let _ = tx
                        .send(DaemonEvent::ListenerClosed {
                            error: e.to_string(),
                        })
                        .await;
                }
            }
        }));

        Ok(port)
    }

    /// Abort the accept task. Dropping the rendezvous closes the endpoint
    /// and unblocks the pending accept.
    fn cancel_listener(&mut self) {
        if let Some(task) = self.listener.take() {
            task.abort();
            debug!("rendezvous cancelled");
        }
    }

    /// Dial out, superseding any in-flight attempt.
    async fn start_dial(&mut self, peer: Peer) {
        // Dialing out is mutually exclusive with discovery and with
        // listening for inbound.
        self.stop_discovery().await;
        self.cancel_listener();

        if let Some(attempt) = self.dialer.take() {
            attempt.task.abort();
            debug!(peer = %attempt.peer.name, "superseded in-flight dial");
        }

        self.next_token += 1;
        let id = self.next_token;
        let transport = Arc::clone(&self.transport);
        let tx = self.event_tx.clone();
        let dial_peer = peer.clone();
        let task = tokio::spawn(async move {
            let result = transport.connect(dial_peer.address).await;
            let _ = tx
                .send(DaemonEvent::DialFinished {
                    attempt: id,
                    peer: dial_peer,
                    result,
                })
                .await;
        });

        info!(peer = %peer.name, addr = %peer.address, "dialing");
        self.dialer = Some(DialAttempt { id, peer, task });
        self.publish_status();
    }

    async fn handle_dial_finished(
        &mut self,
        attempt: u64,
        peer: Peer,
        result: Result<BoxedStream, ProtocolError>,
    ) {
        match &self.dialer {
            Some(current) if current.id == attempt => {}
            _ => {
                // A superseded attempt may still complete; its connection
                // is discarded without an event.
                debug!(peer = %peer.name, "discarding stale dial result");
                return;
            }
        }
        self.dialer = None;

        match result {
            Ok(stream) => {
                self.promote(stream, peer.clone());
                info!(peer = %peer.name, "outbound session established");
                self.emit(LinkEvent::PeerConnected(peer)).await;
            }
            Err(e) => {
                warn!(peer = %peer.name, error = %e, "dial failed");
                self.emit(LinkEvent::ConnectionError {
                    message: format!("could not connect to {}: {e}", peer.name),
                })
                .await;
                self.publish_status();
            }
        }
    }

    async fn handle_inbound(&mut self, stream: BoxedStream, remote: SocketAddr) {
        if self.listener.take().is_none() {
            // The accept raced a cancellation; discard the connection.
            debug!(remote = %remote, "discarding connection accepted after cancel");
            return;
        }

        // Single-use rendezvous: once a peer is in, stop advertising.
        if let Err(e) = self.discovery.stop_advertising().await {
            debug!(error = %e, "stop advertise failed");
        }

        let peer = self.resolve_inbound_peer(remote);
        self.promote(stream, peer.clone());
        info!(peer = %peer.name, remote = %remote, "inbound session established");
        self.emit(LinkEvent::PeerConnected(peer)).await;
    }

    /// Match an inbound connection against the directory. The dialing side
    /// connects from an ephemeral port, so only the IP can match.
    fn resolve_inbound_peer(&self, remote: SocketAddr) -> Peer {
        self.directory
            .values()
            .find(|p| p.address.ip() == remote.ip())
            .cloned()
            .unwrap_or_else(|| Peer {
                id: PeerId::new(),
                name: remote.to_string(),
                address: remote,
            })
    }

    /// Promote a connection to the live session, closing any predecessor.
    fn promote(&mut self, stream: BoxedStream, peer: Peer) {
        if let Some(previous) = self.session.take() {
            debug!(peer = %previous.peer().name, "closing replaced session");
            previous.close();
        }
        self.next_token += 1;
        self.session = Some(Session::promote(
            self.next_token,
            peer,
            stream,
            self.event_tx.clone(),
        ));
        self.publish_status();
    }

    async fn handle_discovered(&mut self, event: DiscoveryEvent) {
        match event {
            DiscoveryEvent::PeerFound(peer) => {
                if peer.id == self.peer_id {
                    // Our own advertisement reflected back.
                    return;
                }
                let known = self.directory.insert(peer.id, peer.clone());
                if known.as_ref() != Some(&peer) {
                    debug!(peer = %peer.name, addr = %peer.address, "peer discovered");
                    self.emit(LinkEvent::PeerDiscovered(peer)).await;
                }
                self.publish_status();
            }
            DiscoveryEvent::PeerLost(id) => {
                if self.directory.remove(&id).is_some() {
                    debug!(peer = %id, "peer lost");
                    self.publish_status();
                }
            }
        }
    }

    async fn handle_session_message(&mut self, token: u64, message: ChatMessage) {
        if self.session.as_ref().map(Session::token) != Some(token) {
            return;
        }
        match message {
            ChatMessage::FriendRequest { user_id, user_name } => {
                info!(user = %user_name, "friend request received");
                self.emit(LinkEvent::FriendRequest { user_id, user_name }).await;
            }
            ChatMessage::Text(text) => {
                self.emit(LinkEvent::Chat { text }).await;
            }
        }
    }

    async fn handle_session_ended(&mut self, token: u64, error: Option<String>) {
        match self.session.take() {
            Some(session) if session.token() == token => session.close(),
            other => {
                // Stale report from a replaced session.
                self.session = other;
                return;
            }
        }

        match error {
            Some(error) => warn!(error = %error, "session ended with error"),
            None => info!("peer disconnected"),
        }
        self.emit(LinkEvent::Disconnected).await;
        self.publish_status();
    }

    /// Send over the live session. Without one the message is dropped;
    /// a failed write tears the session down.
    async fn send_message(&mut self, message: ChatMessage) {
        let result = match self.session.as_mut() {
            Some(session) => session.send(&message).await,
            None => {
                debug!("no live session, dropping outbound message");
                return;
            }
        };

        if let Err(e) = result {
            if let Some(session) = self.session.take() {
                session.close();
            }
            warn!(error = %e, "send failed, closing session");
            self.emit(LinkEvent::ConnectionError {
                message: format!("send failed: {e}"),
            })
            .await;
            self.emit(LinkEvent::Disconnected).await;
            self.publish_status();
        }
    }

    async fn shutdown(&mut self) {
        self.stop_discovery().await;
        self.cancel_listener();
        if let Some(attempt) = self.dialer.take() {
            attempt.task.abort();
        }
        if let Some(session) = self.session.take() {
            session.close();
        }
        self.publish_status();
        info!("peer link stopped");
    }

    async fn emit(&self, event: LinkEvent) {
        if self.link_tx.send(event).await.is_err() {
            debug!("consumer gone, dropping event");
        }
    }

    async fn report_error(&self, message: String) {
        warn!("{message}");
        self.emit(LinkEvent::ConnectionError { message }).await;
    }

    fn publish_status(&self) {
        let phase = if self.session.is_some() {
            LinkPhase::Connected
        } else if self.dialer.is_some() {
            LinkPhase::Dialing
        } else if self.discovering {
            LinkPhase::Discovering
        } else {
            LinkPhase::Idle
        };

        let _ = self.status_tx.send(DaemonStatus {
            phase,
            listening: self.listener.is_some(),
            known_peers: self.directory.len(),
            connected_to: self.session.as_ref().map(|s| s.peer().name.clone()),
        });
    }
}
