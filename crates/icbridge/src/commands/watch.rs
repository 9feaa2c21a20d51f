//! `watch`: stream entity notifications until Ctrl-C.

use std::sync::Arc;

use chrono::Local;
use icbridge_core::{BridgeConfig, ConnectionState, Controller, EntityEvent};
use owo_colors::OwoColorize;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::config;
use crate::error::CliError;
use crate::output;

#[derive(Serialize)]
struct WatchLine<'a> {
    time: String,
    #[serde(flatten)]
    event: &'a EntityEvent,
}

pub async fn handle(bridge: BridgeConfig, args: &WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let controller = Controller::new(bridge);
    // Subscribe first so the Created events of the first discovery are seen.
    let mut events = controller.events();
    let mut state = controller.connection_state();

    controller.connect().await?;
    if let Err(e) = controller.wait_for_discovery(config::discovery_timeout(global)).await {
        controller.disconnect().await;
        return Err(e.into());
    }

    let color = output::should_color(&global.color);
    let result = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break Ok(()),
            changed = state.changed(), if args.state => {
                if changed.is_err() {
                    break Ok(());
                }
                let current = *state.borrow_and_update();
                print_state(current, global);
            }
            event = events.recv() => match event {
                Ok(event) => {
                    if wanted(args, &event) {
                        output::print_output(&format_event(&event, &global.output, color)?, global.quiet);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "watch fell behind, some events were dropped");
                }
                Err(RecvError::Closed) => break Err(CliError::Disconnected),
            },
        }
    };

    controller.disconnect().await;
    result
}

fn wanted(args: &WatchArgs, event: &EntityEvent) -> bool {
    if args.ids.is_empty() {
        return true;
    }
    let key = event_entity(event).key();
    args.ids
        .iter()
        .any(|id| key == *id || key.split('.').any(|part| part == id))
}

fn event_entity(event: &EntityEvent) -> &icbridge_core::Entity {
    match event {
        EntityEvent::Created { entity, .. } | EntityEvent::Changed { entity, .. } => entity,
    }
}

fn format_event(event: &Arc<EntityEvent>, format: &OutputFormat, color: bool) -> Result<String, CliError> {
    let time = Local::now().format("%H:%M:%S").to_string();
    match format {
        OutputFormat::Json | OutputFormat::JsonCompact => Ok(serde_json::to_string(&WatchLine {
            time,
            event: event.as_ref(),
        })?),
        OutputFormat::Yaml => Ok(serde_yaml::to_string(&WatchLine {
            time,
            event: event.as_ref(),
        })?),
        OutputFormat::Plain => Ok(event_entity(event).key()),
        OutputFormat::Table => {
            let entity = event_entity(event);
            let (label, detail) = match event.as_ref() {
                EntityEvent::Created { restored, .. } => {
                    ("created", if *restored { "restored".into() } else { String::new() })
                }
                EntityEvent::Changed { fields, .. } => ("changed", fields.join(", ")),
            };
            let label = if color { label.cyan().to_string() } else { label.to_owned() };
            Ok(format!(
                "{time}  {label:<8} {:<14} {:<20} {detail}",
                entity.key(),
                entity.display_name()
            )
            .trim_end()
            .to_owned())
        }
    }
}

fn print_state(state: ConnectionState, global: &GlobalOpts) {
    if !global.quiet {
        eprintln!("{}  connection {state}", Local::now().format("%H:%M:%S"));
    }
}
