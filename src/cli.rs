//! Command-line interface for ai-overlay
//!
//! Without a subcommand the daemon runs. The other subcommands are thin
//! clients that send one control call to a running daemon.

use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;

use crate::config::{ConfigStore, default_config_path};
use crate::daemon::{self, DaemonOptions};
use crate::ipc::{ControlClient, MethodCall, MethodReply, default_socket_path};

/// ai-overlay - An always-on-top status badge for voice assistants
#[derive(Parser)]
#[command(name = "ai-overlay")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Config file (default: ~/.config/ai-overlay/config.json)
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Control socket (default: $XDG_RUNTIME_DIR/ai-overlay/control.sock)
    #[arg(long, value_name = "PATH", global = true)]
    pub socket: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the badge daemon (the default)
    Run {
        /// Do not connect to the X server
        #[arg(long)]
        headless: bool,

        /// Skip the startup flash
        #[arg(long)]
        no_self_test: bool,
    },
    /// Set the badge status: idle, listening, thinking or error
    SetState { state: String },
    /// Print the current status
    GetState,
    /// Show the badge without changing its status
    Show,
    /// Hide the badge without changing its status
    Hide,
    /// Check that the daemon is alive
    Ping,
    /// Print the effective configuration (defaults merged with the file)
    PrintConfig,
}

impl Commands {
    /// The control call a client subcommand maps to
    fn to_call(&self) -> Option<MethodCall> {
        match self {
            Commands::SetState { state } => Some(MethodCall::new("SetState", vec![Value::String(state.clone())])),
            Commands::GetState => Some(MethodCall::bare("GetState")),
            Commands::Show => Some(MethodCall::bare("Show")),
            Commands::Hide => Some(MethodCall::bare("Hide")),
            Commands::Ping => Some(MethodCall::bare("Ping")),
            Commands::Run { .. } | Commands::PrintConfig => None,
        }
    }
}

/// Turn a reply into the value to print, or an error naming the failure
fn reply_value(reply: MethodReply) -> Result<Option<String>> {
    match reply {
        MethodReply::Return { value } => Ok(value),
        MethodReply::Error { name, message } => Err(anyhow!("{name}: {message}")),
    }
}

fn socket_path(socket: Option<PathBuf>) -> Result<PathBuf> {
    match socket {
        Some(path) => Ok(path),
        None => default_socket_path(),
    }
}

/// Execute the parsed command line
pub fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.unwrap_or_else(default_config_path);
    let command = cli.command.unwrap_or(Commands::Run {
        headless: false,
        no_self_test: false,
    });

    match command {
        Commands::Run { headless, no_self_test } => daemon::run(DaemonOptions {
            config_path,
            socket_path: socket_path(cli.socket)?,
            headless,
            self_test: !no_self_test,
        }),
        Commands::PrintConfig => {
            let config = ConfigStore::new(config_path).load();
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        client => {
            let call = client
                .to_call()
                .ok_or_else(|| anyhow!("Command has no control call"))?;
            let mut control = ControlClient::connect_to(&socket_path(cli.socket)?)?;
            if let Some(value) = reply_value(control.call(&call)?)? {
                println!("{value}");
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_run() {
        let cli = Cli::try_parse_from(["ai-overlay"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.socket.is_none());
    }

    #[test]
    fn test_set_state_maps_to_call() {
        let cli = Cli::try_parse_from(["ai-overlay", "set-state", "thinking", "--socket", "/tmp/s.sock"]).unwrap();

        assert_eq!(cli.socket, Some(PathBuf::from("/tmp/s.sock")));
        let call = cli.command.unwrap().to_call().unwrap();
        assert_eq!(call, MethodCall::new("SetState", vec![Value::String("thinking".to_string())]));
    }

    #[test]
    fn test_run_flags() {
        let cli = Cli::try_parse_from(["ai-overlay", "run", "--headless", "--no-self-test"]).unwrap();
        match cli.command {
            Some(Commands::Run { headless, no_self_test }) => {
                assert!(headless);
                assert!(no_self_test);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_error_reply_becomes_error() {
        let err = reply_value(MethodReply::Error {
            name: "UnknownMethod".to_string(),
            message: "no such method: Reboot".to_string(),
        })
        .unwrap_err();
        assert_eq!(err.to_string(), "UnknownMethod: no such method: Reboot");

        let ok = reply_value(MethodReply::Return { value: None }).unwrap();
        assert_eq!(ok, None);
    }
}
