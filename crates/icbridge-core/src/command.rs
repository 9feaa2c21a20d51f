// ── Command API ──
//
// Every write the accessory layer can make is a `Command`. Building one
// validates it against the registry and produces the `SetParamList`
// requests to send, in order. Nothing here touches the socket.

use std::sync::Arc;

use icbridge_api::Request;
use serde::Serialize;

use crate::config::BridgeConfig;
use crate::error::CoreError;
use crate::model::{Circuit, CircuitStatus, Color, NO_HEATER_ID, ObjectId, heater::binding_key};
use crate::store::EntityRegistry;
use crate::store::mapping::{ACT_KEY, HEATER_KEY, LOW_TEMP_KEY, SPEED_KEY, STATUS_KEY};
use crate::units;

/// All write operations against a controller.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetCircuitStatus {
        circuit: ObjectId,
        on: bool,
    },
    SetLightColor {
        circuit: ObjectId,
        color: Color,
    },
    /// `None` turns heating off for the body.
    SetHeater {
        body: ObjectId,
        heater: Option<ObjectId>,
    },
    /// Heating setpoint, given in Celsius.
    SetTargetTemperature {
        body: ObjectId,
        celsius: f64,
    },
    /// Power level 0-100 for a pump-driven circuit; 0 turns it off.
    SetPumpSpeed {
        circuit: ObjectId,
        percentage: f64,
    },
}

/// Outcome of a sent command. Writes are not acknowledged individually;
/// the ids let a caller match later `WriteParamList` echoes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommandResult {
    pub message_ids: Vec<String>,
}

/// Validate `command` and produce the requests that carry it out.
pub fn build_requests(
    command: &Command,
    registry: &EntityRegistry,
    config: &BridgeConfig,
) -> Result<Vec<Request>, CoreError> {
    match command {
        Command::SetCircuitStatus { circuit, on } => {
            require_circuit(registry, circuit)?;
            Ok(vec![status_request(circuit, *on)])
        }

        Command::SetLightColor { circuit, color } => {
            let target = require_circuit(registry, circuit)?;
            if !target.is_light() {
                return Err(CoreError::Validation {
                    message: format!("{circuit} is not a color light"),
                });
            }
            Ok(vec![Request::set_param(circuit.as_str(), ACT_KEY, color.code())])
        }

        Command::SetHeater { body, heater } => {
            require_body(registry, body)?;
            match heater {
                Some(heater) => {
                    if registry.heater_view(&binding_key(heater, body)).is_none() {
                        return Err(CoreError::UnknownObject {
                            id: heater.to_string(),
                        });
                    }
                    Ok(vec![
                        status_request(body, true),
                        Request::set_param(body.as_str(), HEATER_KEY, heater.as_str()),
                    ])
                }
                None => Ok(vec![Request::set_param(
                    body.as_str(),
                    HEATER_KEY,
                    NO_HEATER_ID,
                )]),
            }
        }

        Command::SetTargetTemperature { body, celsius } => {
            require_body(registry, body)?;
            let (min, max) = config.thermostat_range_c();
            if !celsius.is_finite() || *celsius < min - f64::EPSILON || *celsius > max + f64::EPSILON {
                return Err(CoreError::Validation {
                    message: format!("{celsius}°C is outside the thermostat range {min:.1}..{max:.1}°C"),
                });
            }
            let value = units::celsius_to_controller(*celsius, config.temperature_units);
            Ok(vec![Request::set_param(
                body.as_str(),
                LOW_TEMP_KEY,
                value.to_string(),
            )])
        }

        Command::SetPumpSpeed {
            circuit,
            percentage,
        } => {
            if !percentage.is_finite() || !(0.0..=100.0).contains(percentage) {
                return Err(CoreError::Validation {
                    message: format!("pump power level must be 0-100, got {percentage}"),
                });
            }
            let target = require_circuit(registry, circuit)?;
            let Some(pump_circuit) = target.pump.as_ref() else {
                return Err(CoreError::Validation {
                    message: format!("{circuit} is not driven by a variable-speed pump"),
                });
            };
            if percentage.abs() < f64::EPSILON {
                return Ok(vec![status_request(circuit, false)]);
            }

            let speed = pump_circuit.speed_for(*percentage);
            tracing::debug!(
                %circuit,
                percentage,
                speed,
                speed_type = %pump_circuit.effective_speed_type(),
                "converted pump power level"
            );
            let mut requests = Vec::with_capacity(2);
            if !target.is_on() {
                requests.push(status_request(circuit, true));
            }
            requests.push(Request::set_param(
                pump_circuit.id.as_str(),
                SPEED_KEY,
                speed.to_string(),
            ));
            Ok(requests)
        }
    }
}

fn status_request(circuit: &ObjectId, on: bool) -> Request {
    Request::set_param(
        circuit.as_str(),
        STATUS_KEY,
        CircuitStatus::from(on).as_ref(),
    )
}

fn require_circuit(
    registry: &EntityRegistry,
    id: &ObjectId,
) -> Result<Arc<Circuit>, CoreError> {
    registry
        .circuit(id.as_str())
        .ok_or_else(|| CoreError::UnknownObject { id: id.to_string() })
}

fn require_body(registry: &EntityRegistry, id: &ObjectId) -> Result<(), CoreError> {
    if require_circuit(registry, id)?.is_body() {
        Ok(())
    } else {
        Err(CoreError::Validation {
            message: format!("{id} is not a body of water"),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{
        BodyState, CircuitKind, Heater, Module, ObjectType, Panel, Pump, PumpBounds,
        PumpCircuit, SpeedRange, SpeedType,
    };
    use crate::units::TemperatureUnits;
    use icbridge_api::codec::RequestObject;
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};

    fn circuit(id: &str, kind: CircuitKind, on: bool) -> Circuit {
        Circuit {
            id: id.into(),
            name: id.into(),
            object_type: ObjectType::Circuit,
            subtype: None,
            status: Some(CircuitStatus::from(on)),
            kind,
            pump: None,
            panel_id: "PNL01".into(),
            module_id: None,
        }
    }

    fn registry(pool_on: bool) -> EntityRegistry {
        let bounds = PumpBounds {
            rpm: SpeedRange { min: 1000.0, max: 3450.0 },
            flow: SpeedRange { min: 0.0, max: 100.0 },
        };
        let registry = EntityRegistry::new();
        registry.replace_topology(vec![Panel {
            id: "PNL01".into(),
            modules: vec![Module {
                id: "M0101".into(),
                subtype: None,
                bodies: vec![circuit("B1101", CircuitKind::Body(BodyState::default()), pool_on)],
                features: vec![
                    circuit("C0001", CircuitKind::Switch, false),
                    circuit("C0002", CircuitKind::Light, false),
                ],
                heaters: vec![Heater {
                    id: "H0001".into(),
                    name: "Gas".into(),
                    subtype: None,
                    body_ids: vec!["B1101".into()],
                }],
            }],
            features: Vec::new(),
            pumps: vec![Pump {
                id: "PMP01".into(),
                name: "Main".into(),
                subtype: "SPEED".into(),
                bounds,
                circuits: vec![PumpCircuit {
                    id: "p0101".into(),
                    pump_id: "PMP01".into(),
                    circuit_id: "B1101".into(),
                    speed: None,
                    speed_type: Some(SpeedType::Rpm),
                    bounds,
                }],
            }],
        }]);
        registry
    }

    /// `(objnam, params)` of a single-object write.
    fn write_of(request: &Request) -> (String, Value) {
        match request.object_list.as_deref() {
            Some([RequestObject::Write { objnam, params }]) => {
                (objnam.clone(), Value::Object(params.clone()))
            }
            other => panic!("not a single write: {other:?}"),
        }
    }

    fn build(command: Command, registry: &EntityRegistry) -> Result<Vec<(String, Value)>, CoreError> {
        let config = BridgeConfig::new("test");
        build_requests(&command, registry, &config).map(|r| r.iter().map(write_of).collect())
    }

    #[test]
    fn circuit_status() {
        let writes = build(
            Command::SetCircuitStatus { circuit: "C0001".into(), on: true },
            &registry(false),
        )
        .unwrap();
        assert_eq!(writes, vec![("C0001".into(), json!({ "STATUS": "ON" }))]);
    }

    #[test]
    fn unknown_circuit_is_rejected() {
        let err = build(
            Command::SetCircuitStatus { circuit: "C9999".into(), on: true },
            &registry(false),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::UnknownObject { id } if id == "C9999"));
    }

    #[test]
    fn light_color_uses_protocol_code() {
        let registry = registry(false);
        let writes = build(
            Command::SetLightColor { circuit: "C0002".into(), color: Color::Magenta },
            &registry,
        )
        .unwrap();
        assert_eq!(writes, vec![("C0002".into(), json!({ "ACT": "MAGNTAR" }))]);

        let err = build(
            Command::SetLightColor { circuit: "C0001".into(), color: Color::Red },
            &registry,
        );
        assert!(matches!(err, Err(CoreError::Validation { .. })));
    }

    #[test]
    fn enabling_heater_turns_body_on_first() {
        let writes = build(
            Command::SetHeater { body: "B1101".into(), heater: Some("H0001".into()) },
            &registry(false),
        )
        .unwrap();
        assert_eq!(
            writes,
            vec![
                ("B1101".into(), json!({ "STATUS": "ON" })),
                ("B1101".into(), json!({ "HEATER": "H0001" })),
            ]
        );
    }

    #[test]
    fn disabling_heater_writes_sentinel() {
        let writes = build(
            Command::SetHeater { body: "B1101".into(), heater: None },
            &registry(true),
        )
        .unwrap();
        assert_eq!(writes, vec![("B1101".into(), json!({ "HEATER": "00000" }))]);
    }

    #[test]
    fn heater_for_other_body_is_unknown() {
        let err = build(
            Command::SetHeater { body: "B1101".into(), heater: Some("H0002".into()) },
            &registry(true),
        );
        assert!(matches!(err, Err(CoreError::UnknownObject { .. })));
    }

    #[test]
    fn target_temperature_is_rounded_fahrenheit() {
        let writes = build(
            Command::SetTargetTemperature { body: "B1101".into(), celsius: 26.5 },
            &registry(true),
        )
        .unwrap();
        assert_eq!(writes, vec![("B1101".into(), json!({ "LOTMP": "80" }))]);
    }

    #[test]
    fn target_temperature_in_celsius_mode() {
        let mut config = BridgeConfig::new("test");
        config.temperature_units = TemperatureUnits::Celsius;
        config.minimum_temperature = 5.0;
        config.maximum_temperature = 40.0;
        let requests = build_requests(
            &Command::SetTargetTemperature { body: "B1101".into(), celsius: 26.5 },
            &registry(true),
            &config,
        )
        .unwrap();
        assert_eq!(write_of(&requests[0]).1, json!({ "LOTMP": "26.5" }));
    }

    #[test]
    fn target_temperature_out_of_range() {
        let err = build(
            Command::SetTargetTemperature { body: "B1101".into(), celsius: 60.0 },
            &registry(true),
        );
        assert!(matches!(err, Err(CoreError::Validation { .. })));
    }

    #[test]
    fn pump_speed_turns_circuit_on_then_writes_speed() {
        let writes = build(
            Command::SetPumpSpeed { circuit: "B1101".into(), percentage: 50.0 },
            &registry(false),
        )
        .unwrap();
        assert_eq!(
            writes,
            vec![
                ("B1101".into(), json!({ "STATUS": "ON" })),
                ("p0101".into(), json!({ "SPEED": "2250" })),
            ]
        );
    }

    #[test]
    fn pump_speed_on_running_circuit() {
        let writes = build(
            Command::SetPumpSpeed { circuit: "B1101".into(), percentage: 100.0 },
            &registry(true),
        )
        .unwrap();
        assert_eq!(writes, vec![("p0101".into(), json!({ "SPEED": "3450" }))]);
    }

    #[test]
    fn zero_pump_speed_turns_circuit_off() {
        let writes = build(
            Command::SetPumpSpeed { circuit: "B1101".into(), percentage: 0.0 },
            &registry(true),
        )
        .unwrap();
        assert_eq!(writes, vec![("B1101".into(), json!({ "STATUS": "OFF" }))]);
    }

    #[test]
    fn pump_speed_validation() {
        let registry = registry(true);
        assert!(matches!(
            build(Command::SetPumpSpeed { circuit: "B1101".into(), percentage: 120.0 }, &registry),
            Err(CoreError::Validation { .. })
        ));
        assert!(matches!(
            build(Command::SetPumpSpeed { circuit: "C0001".into(), percentage: 50.0 }, &registry),
            Err(CoreError::Validation { .. })
        ));
    }
}
