//! Command dispatch: bridges CLI args -> core Commands -> output formatting.

pub mod config_cmd;
pub mod control;
pub mod discover;
pub mod util;
pub mod watch;

use icbridge_core::BridgeConfig;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a controller-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, bridge: BridgeConfig, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Discover(args) => discover::handle(bridge, &args, global).await,
        Command::Watch(args) => watch::handle(bridge, &args, global).await,
        cmd @ (Command::Set { .. }
        | Command::Speed { .. }
        | Command::Heat { .. }
        | Command::Temp { .. }
        | Command::Color { .. }) => control::handle(bridge, cmd, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => {
            Err(CliError::Internal("command does not need a controller".into()))
        }
    }
}
