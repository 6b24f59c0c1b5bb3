//! Command-line interface definitions.

use clap::{Args, Parser, Subcommand};

use zengo::advisor::AdvisorConfig;
use zengo::constants::{DEFAULT_ADVISOR_MODEL, DEFAULT_ADVISOR_URL, DEFAULT_RENDEZVOUS_ADDR};

/// ZenGo: 9x9 Go, locally or peer to peer
#[derive(Parser, Debug)]
#[command(name = "zengo")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Rendezvous relay used to find the other player
    #[arg(long, global = true, env = "ZENGO_RENDEZVOUS", default_value = DEFAULT_RENDEZVOUS_ADDR)]
    pub rendezvous: String,

    #[command(flatten)]
    pub advisor: AdvisorArgs,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Play in the terminal (offline until you host or join)
    Local,
    /// Host a networked game and print its room code
    Host,
    /// Join a networked game by room code
    Join {
        /// Room code shared by the host
        code: String,
    },
    /// Run the rendezvous relay that lets players find each other
    Rendezvous {
        /// Address to listen on
        #[arg(long, default_value = DEFAULT_RENDEZVOUS_ADDR)]
        bind: String,
    },
    /// Play through the rule examples and print the boards
    Demo,
}

#[derive(Args, Debug)]
pub struct AdvisorArgs {
    /// Base URL of the advisory service
    #[arg(long, global = true, env = "ZENGO_ADVISOR_URL", default_value = DEFAULT_ADVISOR_URL)]
    pub advisor_url: String,

    /// Model asked for advice
    #[arg(long, global = true, env = "ZENGO_ADVISOR_MODEL", default_value = DEFAULT_ADVISOR_MODEL)]
    pub advisor_model: String,

    /// API key for the advisory service
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,
}

impl AdvisorArgs {
    pub fn into_config(self) -> AdvisorConfig {
        AdvisorConfig {
            base_url: self.advisor_url,
            model: self.advisor_model,
            // `API_KEY` is accepted as a fallback name.
            api_key: self.api_key.or_else(|| std::env::var("API_KEY").ok()),
        }
    }
}
