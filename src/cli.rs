//! Command-line interface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// SmartMove transit assistant
///
/// Answers questions about the Toulouse transit network and SNCF trains by
/// letting a language model call lookup tools.
#[derive(Parser, Debug)]
#[command(name = "smartmove")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the chat and login API
    Serve {
        /// Listen address, overrides [server] bind
        #[arg(long, value_name = "ADDR")]
        bind: Option<String>,
    },

    /// Ask one question and print the answer
    Ask {
        /// The question, e.g. "comment aller de Ramonville à Capitole"
        message: String,
    },

    /// Print the tool definitions sent to the planner
    Tools,
}
