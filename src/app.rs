//! Terminal front-end.
//!
//! One event loop multiplexes three sources: lines typed on stdin, session
//! events from the transport, and finished advisory requests. Each is handled
//! to completion before the next is looked at, so local moves and peer
//! snapshots never interleave.

use std::fmt::Write as _;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::debug;

use crate::advisor::{Advisor, strategic_advice};
use crate::board::{Color, Coord};
use crate::constants::{COLUMN_LETTERS, N};
use crate::game::GameState;
use crate::session::{ConnectionStatus, SessionEvents, SessionManager};

/// Whether the board is shared over the network or played hot-seat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Offline,
    Online,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Place(Coord),
    Host,
    Join(String),
    Leave,
    Reset,
    Advice,
    Code,
    Board,
    Offline,
    Help,
    Quit,
}

const HELP: &str = "\
commands:
  <coord>        place a stone, e.g. D4 or 4,4 (row,col from the top left)
  host           host a networked game and print its room code
  join <code>    join a networked game
  code           show the room code to share
  leave          leave the networked game
  offline        leave and play both colors locally
  reset          start a new game (also resets the peer)
  advice         ask the master for a hint
  board          redraw the board
  help           this text
  quit           exit";

/// Parse one input line.
pub fn parse_command(line: &str) -> Result<Command, String> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Err("empty input".to_string());
    };
    let command = match head.to_ascii_lowercase().as_str() {
        "host" => Command::Host,
        "join" => match words.next() {
            Some(code) => Command::Join(code.to_string()),
            None => return Err("usage: join <code>".to_string()),
        },
        "leave" => Command::Leave,
        "offline" => Command::Offline,
        "reset" => Command::Reset,
        "advice" | "hint" => Command::Advice,
        "code" => Command::Code,
        "board" => Command::Board,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        "play" => {
            let rest: String = words.collect::<Vec<_>>().join("");
            return Coord::parse(&rest)
                .map(Command::Place)
                .ok_or_else(|| format!("not a point on the board: {rest:?}"));
        }
        _ => {
            let all: String = line.split_whitespace().collect();
            return Coord::parse(&all)
                .map(Command::Place)
                .ok_or_else(|| format!("unknown command: {head}"));
        }
    };
    Ok(command)
}

/// Board with column letters and row numbers; the last move is bracketed.
pub fn render_board(state: &GameState) -> String {
    let mut out = String::new();
    let header: Vec<String> = COLUMN_LETTERS[..N]
        .iter()
        .map(|&b| format!(" {} ", b as char))
        .collect();
    let _ = writeln!(out, "    {}", header.join(""));
    for row in 0..N {
        let _ = write!(out, "{:>2}  ", N - row);
        for col in 0..N {
            let at = Coord::new(row, col);
            let marker = state.board.get(at).map_or('.', Color::marker);
            if state.last_move == Some(at) {
                let _ = write!(out, "[{marker}]");
            } else {
                let _ = write!(out, " {marker} ");
            }
        }
        let _ = writeln!(out, " {:>2}", N - row);
    }
    let _ = writeln!(out, "    {}", header.join(""));
    let _ = write!(
        out,
        "{} to move | captures: black {}, white {}",
        state.current_turn, state.captures.black, state.captures.white
    );
    out
}

pub struct App {
    session: SessionManager,
    events: SessionEvents,
    advisor: Arc<dyn Advisor>,
    mode: Mode,
    advice_tx: mpsc::UnboundedSender<String>,
    advice_rx: mpsc::UnboundedReceiver<String>,
    advice_pending: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

impl App {
    pub fn new(session: SessionManager, events: SessionEvents, advisor: Arc<dyn Advisor>) -> Self {
        let (advice_tx, advice_rx) = mpsc::unbounded_channel();
        Self {
            session,
            events,
            advisor,
            mode: Mode::Offline,
            advice_tx,
            advice_rx,
            advice_pending: false,
        }
    }

    /// Run `startup` commands, then read commands from stdin until `quit`
    /// or end of input.
    pub async fn run(mut self, startup: Vec<Command>) -> Result<()> {
        println!("{}", render_board(self.session.state()));
        println!("type 'help' for commands");
        for command in startup {
            if self.execute(command) == Flow::Quit {
                return Ok(());
            }
        }

        let mut stdin = BufReader::new(tokio::io::stdin()).lines();
        loop {
            tokio::select! {
                line = stdin.next_line() => {
                    let Some(line) = line.context("failed to read stdin")? else {
                        break;
                    };
                    if line.trim().is_empty() {
                        continue;
                    }
                    match parse_command(&line) {
                        Ok(command) => {
                            if self.execute(command) == Flow::Quit {
                                break;
                            }
                        }
                        Err(e) => println!("{e}"),
                    }
                }
                Some(event) = self.events.recv() => self.on_session_event(event),
                Some(advice) = self.advice_rx.recv() => {
                    self.advice_pending = false;
                    println!("master: {advice}");
                }
            }
        }
        self.session.leave();
        Ok(())
    }

    fn on_session_event(&mut self, event: crate::session::SessionEvent) {
        let status = self.session.status();
        let state = self.session.state().clone();
        self.session.handle_event(event);

        if let Some(error) = self.session.last_error() {
            if status != self.session.status() {
                println!("! {error}");
            }
        }
        if status != self.session.status() {
            println!("status: {}", self.describe_status());
        }
        if &state != self.session.state() {
            println!("{}", render_board(self.session.state()));
            self.prompt_turn();
        }
    }

    fn describe_status(&self) -> String {
        match self.session.status() {
            ConnectionStatus::Connected => format!(
                "connected, you play {}",
                self.session.assigned_color()
            ),
            ConnectionStatus::WaitingForPeer => match self.session.room_code() {
                Some(code) => format!("waiting for a friend, room code {code}"),
                None => "waiting for a friend".to_string(),
            },
            ConnectionStatus::Connecting => "connecting".to_string(),
            ConnectionStatus::Disconnected => "disconnected".to_string(),
        }
    }

    fn prompt_turn(&self) {
        if self.mode == Mode::Online && self.session.is_connected() && self.session.is_local_turn() {
            println!("your move");
        }
    }

    fn execute(&mut self, command: Command) -> Flow {
        debug!(?command, "Executing command");
        match command {
            Command::Place(at) => self.place(at),
            Command::Host => {
                self.mode = Mode::Online;
                let code = self.session.host_game();
                println!("hosting room {code}; you play black");
            }
            Command::Join(code) => match self.session.join_game(&code) {
                Ok(()) => {
                    self.mode = Mode::Online;
                    println!("status: {}", self.describe_status());
                }
                Err(e) => println!("! {e}"),
            },
            Command::Leave => {
                self.session.leave();
                println!("status: {}", self.describe_status());
            }
            Command::Offline => {
                self.session.leave();
                self.mode = Mode::Offline;
                println!("offline: both colors play from this terminal");
            }
            Command::Reset => {
                self.session.reset_game();
                println!("{}", render_board(self.session.state()));
            }
            Command::Advice => self.request_advice(),
            Command::Code => match self.session.room_code() {
                Some(code) => println!("room code: {code}"),
                None => println!("no room yet; use 'host' or 'join <code>'"),
            },
            Command::Board => {
                println!("{}", render_board(self.session.state()));
                println!("status: {}", self.describe_status());
            }
            Command::Help => println!("{HELP}"),
            Command::Quit => return Flow::Quit,
        }
        Flow::Continue
    }

    /// Whether local input may place a stone right now.
    fn can_place(&self) -> Result<(), &'static str> {
        if self.mode == Mode::Offline {
            return Ok(());
        }
        if !self.session.is_connected() {
            return Err("not connected");
        }
        if !self.session.is_local_turn() {
            return Err("not your turn");
        }
        Ok(())
    }

    fn place(&mut self, at: Coord) {
        if let Err(reason) = self.can_place() {
            println!("! {reason}");
            return;
        }
        match self.session.attempt_move(at) {
            Ok(state) => println!("{}", render_board(state)),
            Err(e) => println!("! illegal move at {at}: {e}"),
        }
    }

    fn request_advice(&mut self) {
        if self.advice_pending {
            println!("the master is still thinking");
            return;
        }
        self.advice_pending = true;
        println!("asking the master...");
        let advisor = Arc::clone(&self.advisor);
        let state = self.session.state().clone();
        let tx = self.advice_tx.clone();
        tokio::spawn(async move {
            let advice = strategic_advice(advisor.as_ref(), &state).await;
            let _ = tx.send(advice);
        });
    }
}
