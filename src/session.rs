//! Session manager: the peer-to-peer connection lifecycle and snapshot
//! replication between two processes.
//!
//! The manager is a single-owner state machine. Nothing in it blocks: every
//! transport operation runs in a spawned task that reports back through a
//! [`SessionEvent`] on the channel returned by [`SessionManager::new`], and
//! the owner feeds those events to [`SessionManager::handle_event`] in
//! receipt order. Suspension points are exactly "waiting for the endpoint to
//! register / a connection to open", "waiting for peer data" and "waiting
//! for the peer to close".
//!
//! Replication is last-writer-wins on full snapshots. The manager does not
//! check whose turn it is; front-ends only offer input to the side to move.
//!
//! Must be used from within a Tokio runtime.

use std::fmt;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::board::{Color, Coord};
use crate::game::{GameMachine, GameState};
use crate::protocol::{self, WireMessage};
use crate::room::{RoomCode, RoomCodeError};
use crate::rules::{self, MoveError};
use crate::transport::{PeerStream, Transport, TransportError};

/// Connection status as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    WaitingForPeer,
    Connected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::WaitingForPeer => "waiting-for-peer",
            ConnectionStatus::Connected => "connected",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Host,
    Guest,
}

/// Identifies one peer connection, so events from a closed one are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkId(u64);

/// Something that happened on the transport, to be applied with
/// [`SessionManager::handle_event`].
///
/// `epoch` ties an event to the host/join attempt that produced it; events
/// from an attempt that has since been torn down are dropped.
#[derive(Debug)]
pub enum SessionEvent {
    Listening { epoch: u64, endpoint: String },
    HostFailed { epoch: u64, error: TransportError },
    Incoming { epoch: u64, stream: PeerStream },
    Joined {
        epoch: u64,
        result: Result<PeerStream, TransportError>,
    },
    Frame { link: LinkId, line: String },
    PeerClosed { link: LinkId },
}

/// Receiving end of the session's event channel.
pub type SessionEvents = mpsc::UnboundedReceiver<SessionEvent>;

/// Message shown when a host registration collides with a live room.
pub const ROOM_TAKEN_MESSAGE: &str = "Room ID already exists. Try again.";

/// Message shown to a joiner whose host went away.
pub const PEER_LEFT_MESSAGE: &str = "Opponent disconnected.";

/// The live connection to the other peer: one reader task feeding
/// [`SessionEvent::Frame`]s and one writer task draining the outbound queue.
struct PeerLink {
    id: LinkId,
    outbound: mpsc::UnboundedSender<String>,
    reader: JoinHandle<()>,
}

impl PeerLink {
    fn open(id: LinkId, stream: PeerStream, events: mpsc::UnboundedSender<SessionEvent>) -> Self {
        let (read_half, mut write_half) = tokio::io::split(stream.into_inner());
        let (outbound, mut queue) = mpsc::unbounded_channel::<String>();

        let reader = tokio::spawn(async move {
            let mut lines = BufReader::new(read_half).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if events.send(SessionEvent::Frame { link: id, line }).is_err() {
                            return;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        debug!(link = id.0, error = %e, "Peer read failed");
                        break;
                    }
                }
            }
            let _ = events.send(SessionEvent::PeerClosed { link: id });
        });

        // Exits once every queued line is written and the sender is gone,
        // then half-closes so the peer sees end of stream.
        tokio::spawn(async move {
            while let Some(mut line) = queue.recv().await {
                line.push('\n');
                if let Err(e) = write_half.write_all(line.as_bytes()).await {
                    debug!(link = id.0, error = %e, "Peer write failed");
                    break;
                }
                if write_half.flush().await.is_err() {
                    break;
                }
            }
            let _ = write_half.shutdown().await;
        });

        Self {
            id,
            outbound,
            reader,
        }
    }

    fn send(&self, message: &WireMessage) {
        match protocol::encode(message) {
            Ok(line) => {
                if self.outbound.send(line).is_err() {
                    debug!(link = self.id.0, "Peer writer already gone");
                }
            }
            Err(e) => warn!(error = %e, "Failed to encode message"),
        }
    }

    fn close(self) {
        self.reader.abort();
        // Dropping `outbound` lets the writer flush and shut down.
    }
}

pub struct SessionManager {
    transport: Arc<dyn Transport>,
    events: mpsc::UnboundedSender<SessionEvent>,
    game: GameMachine,
    status: ConnectionStatus,
    role: Option<Role>,
    room_code: Option<RoomCode>,
    pending_code: Option<RoomCode>,
    assigned_color: Color,
    last_error: Option<String>,
    epoch: u64,
    next_link: u64,
    /// Listener (host) or connect attempt (guest) task.
    background: Option<JoinHandle<()>>,
    peer: Option<PeerLink>,
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("status", &self.status)
            .field("role", &self.role)
            .field("room_code", &self.room_code)
            .field("assigned_color", &self.assigned_color)
            .field("last_error", &self.last_error)
            .field("epoch", &self.epoch)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Create a disconnected session over `transport`.
    pub fn new(transport: impl Transport) -> (Self, SessionEvents) {
        Self::with_transport(Arc::new(transport))
    }

    pub fn with_transport(transport: Arc<dyn Transport>) -> (Self, SessionEvents) {
        let (events, rx) = mpsc::unbounded_channel();
        let session = Self {
            transport,
            events,
            game: GameMachine::new(),
            status: ConnectionStatus::Disconnected,
            role: None,
            room_code: None,
            pending_code: None,
            assigned_color: Color::Black,
            last_error: None,
            epoch: 0,
            next_link: 0,
            background: None,
            peer: None,
        };
        (session, rx)
    }

    pub fn state(&self) -> &GameState {
        self.game.state()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn room_code(&self) -> Option<&RoomCode> {
        self.room_code.as_ref()
    }

    pub fn assigned_color(&self) -> Color {
        self.assigned_color
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    /// Whether the local player holds the turn in the current state.
    pub fn is_local_turn(&self) -> bool {
        self.game.state().current_turn == self.assigned_color
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Start hosting under a freshly generated room code.
    pub fn host_game(&mut self) -> RoomCode {
        self.host_with_code(RoomCode::generate())
    }

    /// Start hosting under `code`. Any previous session is torn down first.
    #[instrument(skip(self, code), fields(code = %code))]
    pub fn host_with_code(&mut self, code: RoomCode) -> RoomCode {
        self.teardown();
        let epoch = self.epoch;
        let endpoint = code.endpoint();

        self.status = ConnectionStatus::WaitingForPeer;
        self.role = Some(Role::Host);
        self.room_code = Some(code.clone());
        self.assigned_color = Color::Black;

        let transport = Arc::clone(&self.transport);
        let events = self.events.clone();
        self.background = Some(tokio::spawn(async move {
            let mut listener = match transport.listen(&endpoint).await {
                Ok(listener) => listener,
                Err(error) => {
                    let _ = events.send(SessionEvent::HostFailed { epoch, error });
                    return;
                }
            };
            if events
                .send(SessionEvent::Listening { epoch, endpoint })
                .is_err()
            {
                return;
            }
            loop {
                match listener.accept().await {
                    Ok(stream) => {
                        if events.send(SessionEvent::Incoming { epoch, stream }).is_err() {
                            return;
                        }
                    }
                    Err(error) => {
                        let _ = events.send(SessionEvent::HostFailed { epoch, error });
                        return;
                    }
                }
            }
        }));

        info!("Hosting game");
        code
    }

    /// Join the room `code` (case-insensitive). An invalid code is reported
    /// through `last_error` and leaves the current session untouched.
    #[instrument(skip(self))]
    pub fn join_game(&mut self, code: &str) -> Result<(), RoomCodeError> {
        let code = match RoomCode::parse(code) {
            Ok(code) => code,
            Err(e) => {
                warn!(error = %e, "Rejected room code");
                self.last_error = Some(format!("Invalid room code: {e}"));
                return Err(e);
            }
        };

        self.teardown();
        let epoch = self.epoch;
        let endpoint = code.endpoint();

        self.status = ConnectionStatus::Connecting;
        self.role = Some(Role::Guest);
        self.pending_code = Some(code);
        self.assigned_color = Color::White;

        let transport = Arc::clone(&self.transport);
        let events = self.events.clone();
        self.background = Some(tokio::spawn(async move {
            let result = transport.connect(&endpoint).await;
            let _ = events.send(SessionEvent::Joined { epoch, result });
        }));

        info!("Joining game");
        Ok(())
    }

    /// Leave the session and release every connection handle.
    #[instrument(skip(self))]
    pub fn leave(&mut self) {
        info!("Leaving session");
        self.teardown();
    }

    fn teardown(&mut self) {
        self.epoch += 1;
        if let Some(task) = self.background.take() {
            task.abort();
        }
        if let Some(peer) = self.peer.take() {
            peer.close();
        }
        self.status = ConnectionStatus::Disconnected;
        self.role = None;
        self.room_code = None;
        self.pending_code = None;
        self.last_error = None;
    }

    // -------------------------------------------------------------------------
    // Game operations
    // -------------------------------------------------------------------------

    /// Validate and play a move for the side to move, then replicate it.
    pub fn attempt_move(&mut self, at: Coord) -> Result<&GameState, MoveError> {
        let next = rules::attempt_move(self.game.state(), at)?;
        self.send_move(next);
        Ok(self.game.state())
    }

    /// Adopt `next` locally, then send it to the peer if connected.
    /// Fire-and-forget: no acknowledgement is awaited.
    pub fn send_move(&mut self, next: GameState) {
        self.game.adopt(next);
        if self.is_connected() {
            self.send(&WireMessage::Move {
                state: self.game.state().clone(),
            });
        }
    }

    /// Start over locally and tell the peer to do the same.
    pub fn reset_game(&mut self) {
        let fresh = self.game.reset().clone();
        if self.is_connected() {
            self.send(&WireMessage::Reset { state: fresh });
        }
    }

    fn send(&self, message: &WireMessage) {
        if let Some(peer) = &self.peer {
            debug!(kind = %message.kind(), "Sending to peer");
            peer.send(message);
        }
    }

    // -------------------------------------------------------------------------
    // Events
    // -------------------------------------------------------------------------

    /// Apply one transport event. Stale events are dropped.
    pub fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Listening { epoch, endpoint } if epoch == self.epoch => {
                info!(endpoint, "Room is discoverable");
            }
            SessionEvent::HostFailed { epoch, error } if epoch == self.epoch => {
                self.on_host_failed(error);
            }
            SessionEvent::Incoming { epoch, stream } if epoch == self.epoch => {
                self.on_incoming(stream);
            }
            SessionEvent::Joined { epoch, result } if epoch == self.epoch => {
                self.on_joined(result);
            }
            SessionEvent::Frame { link, line } if self.is_current(link) => {
                self.on_frame(&line);
            }
            SessionEvent::PeerClosed { link } if self.is_current(link) => {
                self.on_peer_closed();
            }
            stale => debug!(event = ?stale, "Dropping stale session event"),
        }
    }

    fn is_current(&self, link: LinkId) -> bool {
        self.peer.as_ref().is_some_and(|peer| peer.id == link)
    }

    fn open_link(&mut self, stream: PeerStream) {
        let id = LinkId(self.next_link);
        self.next_link += 1;
        self.peer = Some(PeerLink::open(id, stream, self.events.clone()));
    }

    fn on_host_failed(&mut self, error: TransportError) {
        warn!(error = %error, "Hosting failed");
        let message = match &error {
            TransportError::AddressInUse { .. } => ROOM_TAKEN_MESSAGE.to_string(),
            other => format!("Connection error: {other}"),
        };
        self.teardown();
        self.last_error = Some(message);
    }

    fn on_incoming(&mut self, stream: PeerStream) {
        if self.peer.is_some() {
            warn!("Already paired; closing extra incoming connection");
            drop(stream);
            return;
        }
        self.open_link(stream);
        self.status = ConnectionStatus::Connected;
        self.last_error = None;
        info!("Peer connected");

        // The joiner starts from the host's state, not its own default.
        self.send(&WireMessage::Sync {
            state: self.game.state().clone(),
        });
    }

    fn on_joined(&mut self, result: Result<PeerStream, TransportError>) {
        match result {
            Ok(stream) => {
                self.open_link(stream);
                self.status = ConnectionStatus::Connected;
                self.room_code = self.pending_code.take();
                self.last_error = None;
                info!("Connected to host");
            }
            Err(error) => {
                warn!(error = %error, "Join failed");
                self.teardown();
                self.last_error = Some(format!("Could not join room. Error: {error}"));
            }
        }
    }

    fn on_peer_closed(&mut self) {
        if let Some(peer) = self.peer.take() {
            peer.close();
        }
        match self.role {
            Some(Role::Host) => {
                info!("Peer left; room stays open");
                self.status = ConnectionStatus::WaitingForPeer;
            }
            _ => {
                info!("Host left");
                self.teardown();
                self.last_error = Some(PEER_LEFT_MESSAGE.to_string());
            }
        }
    }

    fn on_frame(&mut self, line: &str) {
        if line.trim().is_empty() {
            return;
        }
        match protocol::decode(line) {
            Ok(message) => self.apply_remote(message),
            Err(e) => warn!(error = %e, "Ignoring undecodable peer message"),
        }
    }

    /// Apply a message from the peer.
    ///
    /// Peers are trusted: `MOVE` and `SYNC` snapshots are adopted as-is and
    /// are not replayed through the rule engine. `RESET` discards its payload
    /// and builds a fresh initial state locally.
    fn apply_remote(&mut self, message: WireMessage) {
        debug!(kind = %message.kind(), "Applying peer message");
        match message {
            WireMessage::Move { state } | WireMessage::Sync { state } => self.game.adopt(state),
            WireMessage::Reset { .. } => {
                self.game.reset();
            }
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        if let Some(task) = self.background.take() {
            task.abort();
        }
        if let Some(peer) = self.peer.take() {
            peer.close();
        }
    }
}
