//! ZenGo: 9x9 Go, locally or peer to peer.
//!
//! ## Usage
//!
//! - `zengo` / `zengo local` - Play in the terminal
//! - `zengo host` - Host a networked game
//! - `zengo join <CODE>` - Join a networked game
//! - `zengo rendezvous` - Run the relay peers use to find each other
//! - `zengo demo` - Walk through the rule examples

mod cli;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};
use zengo::advisor::GeminiAdvisor;
use zengo::app::{self, App};
use zengo::board::Coord;
use zengo::game::GameMachine;
use zengo::session::SessionManager;
use zengo::transport::{RendezvousServer, RendezvousTransport};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let startup = match cli.command.unwrap_or(Command::Local) {
        Command::Local => Vec::new(),
        Command::Host => vec![app::Command::Host],
        Command::Join { code } => vec![app::Command::Join(code)],
        Command::Rendezvous { bind } => return run_rendezvous(&bind).await,
        Command::Demo => {
            run_demo();
            return Ok(());
        }
    };

    info!(rendezvous = %cli.rendezvous, "Starting terminal client");
    let (session, events) = SessionManager::new(RendezvousTransport::new(cli.rendezvous));
    let advisor = Arc::new(GeminiAdvisor::new(cli.advisor.into_config()));
    App::new(session, events, advisor).run(startup).await
}

async fn run_rendezvous(bind: &str) -> Result<()> {
    let server = RendezvousServer::bind(bind)
        .await
        .with_context(|| format!("failed to bind rendezvous relay on {bind}"))?;
    server.run().await.context("rendezvous relay stopped")
}

fn run_demo() {
    println!("ZenGo: rule examples\n");

    println!("=== Placement ===");
    let mut game = GameMachine::new();
    for (row, col) in [(4, 4), (4, 3), (4, 3)] {
        let at = Coord::new(row, col);
        let mover = game.state().current_turn;
        match game.attempt_move(at) {
            Ok(_) => println!("{mover} at {at}: ok"),
            Err(e) => println!("{mover} at {at}: {e}"),
        }
    }
    println!("{}\n", app::render_board(game.state()));

    println!("=== Corner capture ===");
    let mut game = GameMachine::new();
    for (row, col) in [(0, 1), (0, 0), (1, 0)] {
        let at = Coord::new(row, col);
        let mover = game.state().current_turn;
        if let Err(e) = game.attempt_move(at) {
            println!("{mover} at {at}: {e}");
        }
    }
    println!("{}", app::render_board(game.state()));
}
