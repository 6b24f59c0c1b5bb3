//! Session lifecycle and replication over the in-memory transport.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::time::timeout;

use zengo::board::{Color, Coord};
use zengo::game::GameState;
use zengo::protocol::{self, MessageKind};
use zengo::room::RoomCode;
use zengo::session::{
    ConnectionStatus, PEER_LEFT_MESSAGE, ROOM_TAKEN_MESSAGE, Role, SessionEvents, SessionManager,
};
use zengo::transport::{MemoryTransport, Transport};

const WAIT: Duration = Duration::from_secs(5);

// =============================================================================
// Helpers
// =============================================================================

/// Feed events to `session` until `done` holds.
async fn pump_until(
    session: &mut SessionManager,
    events: &mut SessionEvents,
    done: impl Fn(&SessionManager) -> bool,
) {
    timeout(WAIT, async {
        while !done(&*session) {
            let event = events.recv().await.expect("session event channel closed");
            session.handle_event(event);
        }
    })
    .await
    .expect("timed out waiting for session");
}

/// Wait until the in-memory endpoint for `code` has a listener.
async fn wait_registered(transport: &MemoryTransport, code: &RoomCode) {
    let endpoint = code.endpoint();
    timeout(WAIT, async {
        while !transport.is_registered(&endpoint) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("endpoint never registered");
}

struct Pair {
    host: SessionManager,
    host_events: SessionEvents,
    guest: SessionManager,
    guest_events: SessionEvents,
}

/// Host a room, join it, and wait until the guest has the host's state.
async fn connected_pair(transport: &MemoryTransport) -> Pair {
    let (mut host, mut host_events) = SessionManager::new(transport.clone());
    let (mut guest, mut guest_events) = SessionManager::new(transport.clone());

    let code = host.host_game();
    wait_registered(transport, &code).await;

    guest.join_game(code.as_str()).unwrap();
    pump_until(&mut guest, &mut guest_events, |s| s.is_connected()).await;
    pump_until(&mut host, &mut host_events, |s| s.is_connected()).await;

    Pair {
        host,
        host_events,
        guest,
        guest_events,
    }
}

// =============================================================================
// Hosting and joining
// =============================================================================

#[tokio::test]
async fn test_host_sets_waiting_state() {
    let transport = MemoryTransport::new();
    let (mut host, _events) = SessionManager::new(transport.clone());

    let code = host.host_game();
    assert_eq!(host.status(), ConnectionStatus::WaitingForPeer);
    assert_eq!(host.role(), Some(Role::Host));
    assert_eq!(host.assigned_color(), Color::Black);
    assert_eq!(host.room_code(), Some(&code));

    wait_registered(&transport, &code).await;
    assert!(transport.is_registered(&code.endpoint()));
}

#[tokio::test]
async fn test_join_receives_host_state() {
    let transport = MemoryTransport::new();
    let (mut host, mut host_events) = SessionManager::new(transport.clone());
    let (mut guest, mut guest_events) = SessionManager::new(transport.clone());

    let code = host.host_game();
    host.attempt_move(Coord::new(2, 2)).unwrap();
    wait_registered(&transport, &code).await;

    guest.join_game(&code.as_str().to_lowercase()).unwrap();
    assert_eq!(guest.status(), ConnectionStatus::Connecting);
    assert_eq!(guest.assigned_color(), Color::White);

    pump_until(&mut host, &mut host_events, |s| s.is_connected()).await;
    let expected = host.state().clone();
    pump_until(&mut guest, &mut guest_events, |s| s.state() == &expected).await;

    assert!(guest.is_connected());
    assert_eq!(guest.role(), Some(Role::Guest));
    assert_eq!(guest.room_code(), Some(&code));
    assert_eq!(guest.state().board.get(Coord::new(2, 2)), Some(Color::Black));
    assert!(guest.is_local_turn());
    assert!(!host.is_local_turn());
}

#[tokio::test]
async fn test_moves_replicate_both_ways() {
    let transport = MemoryTransport::new();
    let mut pair = connected_pair(&transport).await;

    pair.host.attempt_move(Coord::new(4, 4)).unwrap();
    let after_black = pair.host.state().clone();
    pump_until(&mut pair.guest, &mut pair.guest_events, |s| {
        s.state() == &after_black
    })
    .await;
    assert_eq!(pair.guest.state().current_turn, Color::White);

    pair.guest.attempt_move(Coord::new(4, 3)).unwrap();
    let after_white = pair.guest.state().clone();
    pump_until(&mut pair.host, &mut pair.host_events, |s| {
        s.state() == &after_white
    })
    .await;
    assert_eq!(pair.host.state().board.get(Coord::new(4, 3)), Some(Color::White));
    assert_eq!(pair.host.state().history.len(), 2);
}

#[tokio::test]
async fn test_reset_replicates() {
    let transport = MemoryTransport::new();
    let mut pair = connected_pair(&transport).await;

    pair.host.attempt_move(Coord::new(0, 0)).unwrap();
    let played = pair.host.state().clone();
    pump_until(&mut pair.guest, &mut pair.guest_events, |s| s.state() == &played).await;

    pair.guest.reset_game();
    assert_eq!(pair.guest.state(), &GameState::initial());
    pump_until(&mut pair.host, &mut pair.host_events, |s| {
        s.state() == &GameState::initial()
    })
    .await;
}

#[tokio::test]
async fn test_rejected_move_is_not_sent() {
    let transport = MemoryTransport::new();
    let mut pair = connected_pair(&transport).await;

    pair.host.attempt_move(Coord::new(4, 4)).unwrap();
    assert!(pair.host.attempt_move(Coord::new(4, 4)).is_err());
    assert_eq!(pair.host.state().history.len(), 1);
}

// =============================================================================
// Raw peers
// =============================================================================

#[tokio::test]
async fn test_reset_ignores_payload() {
    let transport = MemoryTransport::new();
    let (mut host, mut host_events) = SessionManager::new(transport.clone());
    let code = host.host_game();
    wait_registered(&transport, &code).await;

    let raw = transport.connect(&code.endpoint()).await.unwrap();
    let (read_half, mut write_half) = tokio::io::split(raw.into_inner());
    let mut lines = BufReader::new(read_half).lines();

    pump_until(&mut host, &mut host_events, |s| s.is_connected()).await;
    let sync = timeout(WAIT, lines.next_line()).await.unwrap().unwrap().unwrap();
    assert_eq!(protocol::decode(&sync).unwrap().kind(), MessageKind::Sync);

    host.attempt_move(Coord::new(3, 3)).unwrap();
    write_half
        .write_all(b"{\"type\":\"RESET\",\"state\":{\"bogus\":true}}\n")
        .await
        .unwrap();
    pump_until(&mut host, &mut host_events, |s| {
        s.state() == &GameState::initial()
    })
    .await;
}

#[tokio::test]
async fn test_peer_snapshot_adopted_verbatim() {
    let transport = MemoryTransport::new();
    let (mut host, mut host_events) = SessionManager::new(transport.clone());
    let code = host.host_game();
    wait_registered(&transport, &code).await;

    let raw = transport.connect(&code.endpoint()).await.unwrap();
    let (_read_half, mut write_half) = tokio::io::split(raw.into_inner());
    pump_until(&mut host, &mut host_events, |s| s.is_connected()).await;

    // Two black stones and black still to move: not reachable by legal play.
    let mut forged = GameState::initial();
    forged.board.set(Coord::new(0, 0), Some(Color::Black));
    forged.board.set(Coord::new(8, 8), Some(Color::Black));
    let line = protocol::encode(&protocol::WireMessage::Move {
        state: forged.clone(),
    })
    .unwrap();

    write_half.write_all(b"garbage that is not json\n").await.unwrap();
    write_half.write_all(format!("{line}\n").as_bytes()).await.unwrap();
    pump_until(&mut host, &mut host_events, |s| s.state() == &forged).await;
    assert!(host.is_connected());
}

#[tokio::test]
async fn test_second_peer_is_turned_away() {
    let transport = MemoryTransport::new();
    let mut pair = connected_pair(&transport).await;
    let code = pair.host.room_code().cloned().unwrap();

    let extra = transport.connect(&code.endpoint()).await.unwrap();
    let mut extra_lines = BufReader::new(extra.into_inner()).lines();

    // The host drops the extra stream as soon as it sees it.
    let eof = timeout(WAIT, async {
        loop {
            tokio::select! {
                line = extra_lines.next_line() => break line,
                Some(event) = pair.host_events.recv() => pair.host.handle_event(event),
            }
        }
    })
    .await
    .unwrap()
    .unwrap();
    assert_eq!(eof, None);
    assert!(pair.host.is_connected());

    // The original pairing still carries moves.
    pair.guest.attempt_move(Coord::new(1, 1)).unwrap();
    let expected = pair.guest.state().clone();
    pump_until(&mut pair.host, &mut pair.host_events, |s| s.state() == &expected).await;
    assert!(pair.guest.is_connected());
}

// =============================================================================
// Disconnects and failures
// =============================================================================

#[tokio::test]
async fn test_guest_sees_host_leave() {
    let transport = MemoryTransport::new();
    let mut pair = connected_pair(&transport).await;

    pair.host.leave();
    pump_until(&mut pair.guest, &mut pair.guest_events, |s| {
        s.status() == ConnectionStatus::Disconnected
    })
    .await;
    assert_eq!(pair.guest.last_error(), Some(PEER_LEFT_MESSAGE));
    assert_eq!(pair.guest.room_code(), None);
    assert_eq!(pair.guest.role(), None);
}

#[tokio::test]
async fn test_host_keeps_room_when_guest_leaves() {
    let transport = MemoryTransport::new();
    let mut pair = connected_pair(&transport).await;
    let code = pair.host.room_code().cloned().unwrap();

    drop(pair.guest);
    pump_until(&mut pair.host, &mut pair.host_events, |s| {
        s.status() == ConnectionStatus::WaitingForPeer
    })
    .await;
    assert_eq!(pair.host.room_code(), Some(&code));
    assert!(transport.is_registered(&code.endpoint()));

    // A new guest can take the empty seat and starts from the host's board.
    pair.host.attempt_move(Coord::new(6, 2)).unwrap();
    let (mut guest, mut guest_events) = SessionManager::new(transport.clone());
    guest.join_game(code.as_str()).unwrap();
    pump_until(&mut pair.host, &mut pair.host_events, |s| s.is_connected()).await;

    let expected = pair.host.state().clone();
    pump_until(&mut guest, &mut guest_events, |s| s.state() == &expected).await;
    assert!(guest.is_connected());
    assert_eq!(guest.state().board.get(Coord::new(6, 2)), Some(Color::Black));
}

#[tokio::test]
async fn test_join_unknown_room_fails() {
    let transport = MemoryTransport::new();
    let (mut guest, mut events) = SessionManager::new(transport);

    guest.join_game("ZZZZ").unwrap();
    pump_until(&mut guest, &mut events, |s| s.last_error().is_some()).await;

    assert_eq!(guest.status(), ConnectionStatus::Disconnected);
    let error = guest.last_error().unwrap();
    assert!(error.starts_with("Could not join room. Error:"), "{error}");
}

#[tokio::test]
async fn test_host_collision_reports_room_taken() {
    let transport = MemoryTransport::new();
    let code = RoomCode::parse("AB12").unwrap();
    let _squatter = transport.listen(&code.endpoint()).await.unwrap();

    let (mut host, mut events) = SessionManager::new(transport.clone());
    host.host_with_code(code);
    pump_until(&mut host, &mut events, |s| s.last_error().is_some()).await;

    assert_eq!(host.last_error(), Some(ROOM_TAKEN_MESSAGE));
    assert_eq!(host.status(), ConnectionStatus::Disconnected);
    assert_eq!(host.room_code(), None);
}

#[tokio::test]
async fn test_invalid_code_leaves_session_alone() {
    let transport = MemoryTransport::new();
    let (mut host, _events) = SessionManager::new(transport);
    let code = host.host_game();

    assert!(host.join_game("no").is_err());
    assert!(host.last_error().unwrap().starts_with("Invalid room code"));
    assert_eq!(host.status(), ConnectionStatus::WaitingForPeer);
    assert_eq!(host.room_code(), Some(&code));
}

#[tokio::test]
async fn test_leave_releases_endpoint() {
    let transport = MemoryTransport::new();
    let (mut host, _events) = SessionManager::new(transport.clone());
    let code = host.host_game();
    wait_registered(&transport, &code).await;

    host.leave();
    assert_eq!(host.status(), ConnectionStatus::Disconnected);
    assert_eq!(host.role(), None);
    assert_eq!(host.room_code(), None);
    assert_eq!(host.last_error(), None);

    timeout(WAIT, async {
        while transport.is_registered(&code.endpoint()) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("endpoint still registered after leave");
}

#[tokio::test]
async fn test_offline_play_without_peer() {
    let (mut session, _events) = SessionManager::new(MemoryTransport::new());
    session.attempt_move(Coord::new(4, 4)).unwrap();
    session.reset_game();
    assert_eq!(session.state(), &GameState::initial());
    assert_eq!(session.status(), ConnectionStatus::Disconnected);
}
