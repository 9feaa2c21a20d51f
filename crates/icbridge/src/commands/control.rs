//! Write commands: set, speed, heat, temp, color.
//!
//! Each one connects, waits for discovery so names can be resolved and
//! the command validated against live state, sends, and disconnects.

use icbridge_core::{BridgeConfig, Command as CoreCommand, CommandResult, Controller, CoreError};

use crate::cli::{Command, GlobalOpts};
use crate::config;
use crate::error::CliError;
use crate::output;

use super::util;

/// Target of a write as given on the command line, before resolution.
#[derive(Debug)]
enum Target {
    Status { circuit: String, on: bool },
    Speed { circuit: String, percent: u8 },
    Heat { body: String, heater: Option<String> },
    Temperature { body: String, celsius: f64 },
    Color { circuit: String, color: icbridge_core::Color },
}

impl Target {
    fn from_cli(cmd: Command) -> Option<Self> {
        Some(match cmd {
            Command::Set { circuit, state } => Self::Status {
                circuit,
                on: state.is_on(),
            },
            Command::Speed { circuit, percent } => Self::Speed { circuit, percent },
            Command::Heat { body, heater } => Self::Heat {
                body,
                heater: (!heater.eq_ignore_ascii_case("off")).then_some(heater),
            },
            Command::Temp { body, celsius } => Self::Temperature { body, celsius },
            Command::Color { circuit, color } => Self::Color { circuit, color },
            _ => return None,
        })
    }

    fn resolve(self, controller: &Controller) -> Result<CoreCommand, CoreError> {
        Ok(match self {
            Self::Status { circuit, on } => CoreCommand::SetCircuitStatus {
                circuit: util::resolve_circuit(controller, &circuit)?,
                on,
            },
            Self::Speed { circuit, percent } => CoreCommand::SetPumpSpeed {
                circuit: util::resolve_circuit(controller, &circuit)?,
                percentage: f64::from(percent),
            },
            Self::Heat { body, heater } => CoreCommand::SetHeater {
                body: util::resolve_circuit(controller, &body)?,
                heater: heater
                    .map(|h| util::resolve_heater(controller, &h))
                    .transpose()?,
            },
            Self::Temperature { body, celsius } => CoreCommand::SetTargetTemperature {
                body: util::resolve_circuit(controller, &body)?,
                celsius,
            },
            Self::Color { circuit, color } => CoreCommand::SetLightColor {
                circuit: util::resolve_circuit(controller, &circuit)?,
                color,
            },
        })
    }
}

pub async fn handle(bridge: BridgeConfig, cmd: Command, global: &GlobalOpts) -> Result<(), CliError> {
    let Some(target) = Target::from_cli(cmd) else {
        return Err(CliError::Internal("not a write command".into()));
    };

    let (command, result) =
        Controller::oneshot(bridge, config::discovery_timeout(global), |controller| async move {
            let command = target.resolve(&controller)?;
            let result = controller.execute(command.clone()).await?;
            Ok((command, result))
        })
        .await?;

    tracing::info!(?command, "command sent");
    let out = output::render_single(
        &global.output,
        &result,
        |r| describe(&command, r),
        |r| r.message_ids.join("\n"),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

fn describe(command: &CoreCommand, result: &CommandResult) -> String {
    let what = match command {
        CoreCommand::SetCircuitStatus { circuit, on } => {
            format!("{circuit} turned {}", if *on { "on" } else { "off" })
        }
        CoreCommand::SetPumpSpeed { circuit, percentage } => format!("{circuit} pump set to {percentage}%"),
        CoreCommand::SetHeater { body, heater: Some(h) } => format!("{body} heating with {h}"),
        CoreCommand::SetHeater { body, heater: None } => format!("{body} heating off"),
        CoreCommand::SetTargetTemperature { body, celsius } => format!("{body} setpoint {celsius}°C"),
        CoreCommand::SetLightColor { circuit, color } => format!("{circuit} color {color}"),
    };
    format!("{what} ({} write(s))", result.message_ids.len())
}
