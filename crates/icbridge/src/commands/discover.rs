//! `discover`: connect, wait for the first completed discovery, print it.

use std::fmt::Write as _;
use std::sync::Arc;

use icbridge_core::{
    BridgeConfig, Circuit, CircuitKind, Controller, HeaterView, Panel, Pump, TemperatureUnits,
    TopologySummary,
};
use serde::Serialize;
use tabled::Tabled;

use crate::cli::{DiscoverArgs, GlobalOpts};
use crate::config;
use crate::error::CliError;
use crate::output;

// ── Report ──────────────────────────────────────────────────────────

#[derive(Serialize)]
struct DiscoveryReport {
    summary: TopologySummary,
    circuits: Vec<Arc<Circuit>>,
    heaters: Vec<Arc<HeaterView>>,
    pumps: Vec<Arc<Pump>>,
}

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct CircuitRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Temp")]
    temperature: String,
    #[tabled(rename = "Setpoint")]
    setpoint: String,
    #[tabled(rename = "Pump")]
    pump: String,
    #[tabled(rename = "Location")]
    location: String,
}

impl CircuitRow {
    fn new(c: &Circuit, units: TemperatureUnits, color: bool) -> Self {
        let degrees = |t: Option<f64>| t.map(|t| format!("{t}°{units}")).unwrap_or_default();
        let body = c.body();
        Self {
            id: c.id.to_string(),
            name: c.name.clone(),
            kind: kind_label(c),
            status: c.status.map(|_| output::on_off(c.is_on(), color)).unwrap_or_default(),
            temperature: degrees(body.and_then(|b| b.temperature)),
            setpoint: degrees(body.and_then(|b| b.low_temperature)),
            pump: c
                .pump
                .as_ref()
                .map(|_| format!("{}%", c.power_level()))
                .unwrap_or_default(),
            location: c.location(),
        }
    }
}

fn kind_label(c: &Circuit) -> String {
    match &c.kind {
        CircuitKind::Switch => "switch".into(),
        CircuitKind::Light => "light".into(),
        CircuitKind::Body(_) => match &c.subtype {
            Some(subtype) => format!("body ({})", subtype.to_ascii_lowercase()),
            None => "body".into(),
        },
    }
}

#[derive(Tabled)]
struct HeaterRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Body")]
    body: String,
    #[tabled(rename = "Heating")]
    heating: String,
}

impl HeaterRow {
    fn new(v: &HeaterView, color: bool) -> Self {
        Self {
            key: v.key(),
            name: v.heater.name.clone(),
            body: v.body.name.clone(),
            heating: output::on_off(v.is_heating(), color),
        }
    }
}

#[derive(Tabled)]
struct PumpRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    subtype: String,
    #[tabled(rename = "RPM")]
    rpm: String,
    #[tabled(rename = "Circuits")]
    circuits: String,
}

impl From<&Arc<Pump>> for PumpRow {
    fn from(p: &Arc<Pump>) -> Self {
        Self {
            id: p.id.to_string(),
            name: p.name.clone(),
            subtype: p.subtype.clone(),
            rpm: format!("{}-{}", p.bounds.rpm.min, p.bounds.rpm.max),
            circuits: p
                .circuits
                .iter()
                .map(|pc| pc.circuit_id.to_string())
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(bridge: BridgeConfig, args: &DiscoverArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let units = bridge.temperature_units;
    let (report, topology) =
        Controller::oneshot(bridge, config::discovery_timeout(global), |controller| async move {
            let summary = controller.discovery_summary().unwrap_or_default();
            let report = DiscoveryReport {
                summary,
                circuits: controller.circuits_snapshot().to_vec(),
                heaters: controller.heaters_snapshot().to_vec(),
                pumps: controller.pumps_snapshot().to_vec(),
            };
            Ok((report, controller.topology()))
        })
        .await?;

    let out = if args.topology {
        render_topology(&global.output, &topology)?
    } else {
        render_report(global, &report, units)?
    };
    output::print_output(&out, global.quiet);
    Ok(())
}

fn render_topology(format: &crate::cli::OutputFormat, topology: &[Panel]) -> Result<String, CliError> {
    output::render_single(
        format,
        topology,
        |panels| serde_json::to_string_pretty(panels).unwrap_or_default(),
        |panels| {
            panels
                .iter()
                .flat_map(Panel::circuits)
                .map(|c| c.location())
                .collect::<Vec<_>>()
                .join("\n")
        },
    )
}

fn render_report(
    global: &GlobalOpts,
    report: &DiscoveryReport,
    units: TemperatureUnits,
) -> Result<String, CliError> {
    let color = output::should_color(&global.color);
    output::render_single(
        &global.output,
        report,
        |r| {
            let mut out = String::new();
            let s = r.summary;
            let _ = writeln!(
                out,
                "{} panel(s), {} circuit(s), {} heater(s), {} pump(s)\n",
                s.panels, s.circuits, s.heaters, s.pumps
            );
            let _ = writeln!(out, "{}", output::heading("Circuits", color));
            let rows: Vec<_> = r.circuits.iter().map(|c| CircuitRow::new(c, units, color)).collect();
            let _ = writeln!(out, "{}", output::render_table(&rows));
            if !r.heaters.is_empty() {
                let rows: Vec<_> = r.heaters.iter().map(|v| HeaterRow::new(v, color)).collect();
                let _ = writeln!(out, "\n{}", output::heading("Heaters", color));
                let _ = writeln!(out, "{}", output::render_table(&rows));
            }
            if !r.pumps.is_empty() {
                let rows: Vec<_> = r.pumps.iter().map(PumpRow::from).collect();
                let _ = writeln!(out, "\n{}", output::heading("Pumps", color));
                let _ = write!(out, "{}", output::render_table(&rows));
            }
            out
        },
        |r| {
            r.circuits
                .iter()
                .map(|c| c.id.to_string())
                .collect::<Vec<_>>()
                .join("\n")
        },
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use icbridge_core::{BodyState, CircuitStatus, ObjectType};

    fn pool() -> Circuit {
        Circuit {
            id: "B1101".into(),
            name: "Pool".into(),
            object_type: ObjectType::Body,
            subtype: Some("POOL".into()),
            status: Some(CircuitStatus::On),
            kind: CircuitKind::Body(BodyState {
                temperature: Some(78.0),
                low_temperature: Some(82.0),
                ..BodyState::default()
            }),
            pump: None,
            panel_id: "PNL01".into(),
            module_id: Some("M0101".into()),
        }
    }

    #[test]
    fn body_row_shows_temperatures() {
        let row = CircuitRow::new(&pool(), TemperatureUnits::Fahrenheit, false);
        assert_eq!(row.kind, "body (pool)");
        assert_eq!(row.status, "on");
        assert_eq!(row.temperature, "78°F");
        assert_eq!(row.setpoint, "82°F");
        assert_eq!(row.pump, "");
        assert_eq!(row.location, "PNL01.M0101.B1101");
    }
}
