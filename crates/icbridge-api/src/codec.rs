//! Message envelope codec.
//!
//! The controller speaks one JSON object per line. Outbound requests are
//! typed [`Request`] values; inbound lines decode into a [`Message`] whose
//! variant tells the dispatcher where the payload belongs. Change
//! payloads arrive either as direct `{objnam, params}` entries or wrapped
//! in `{changes: [...]}`; both are flattened into [`ObjectChange`]s here so
//! nothing downstream ever sees the wrapper shape.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::error::Error;

/// Parameter bag keyed by the controller's terse parameter codes.
pub type ParamBag = serde_json::Map<String, Value>;

/// Field carrying an object's identifier.
pub const OBJ_ID_KEY: &str = "objnam";
/// Field carrying an object's parameter bag.
pub const PARAMS_KEY: &str = "params";
/// Response status value signalling success.
pub const STATUS_OK: &str = "200";

// ── Commands ─────────────────────────────────────────────────────────

/// Commands the bridge issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr)]
pub enum RequestCommand {
    /// Query, e.g. for the hardware definition during discovery.
    GetQuery,
    /// Subscribe to change notifications for named keys on named objects.
    RequestParamList,
    /// Write parameters.
    SetParamList,
}

/// Commands the controller originates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
pub enum ResponseCommand {
    /// Reply to a `GetQuery`.
    SendQuery,
    /// Unsolicited change notification.
    NotifyList,
    /// Acknowledgement of a `SetParamList`, carrying the new values.
    WriteParamList,
}

/// Named queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr)]
pub enum QueryName {
    GetHardwareDefinition,
}

// ── Outbound ─────────────────────────────────────────────────────────

/// One entry of a request's `objectList`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RequestObject {
    /// Subscribe to `keys` on `objnam`.
    Subscribe { objnam: String, keys: Vec<String> },
    /// Write `params` to `objnam`.
    Write { objnam: String, params: ParamBag },
}

/// Outbound request envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Request {
    pub command: RequestCommand,
    #[serde(rename = "messageID")]
    pub message_id: String,
    #[serde(rename = "queryName", skip_serializing_if = "Option::is_none")]
    pub query_name: Option<QueryName>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
    #[serde(rename = "objectList", skip_serializing_if = "Option::is_none")]
    pub object_list: Option<Vec<RequestObject>>,
}

impl Request {
    /// Discovery query for one object category (`CIRCUITS`, `PUMPS`, ...).
    pub fn hardware_definition(category: &str) -> Self {
        Self {
            command: RequestCommand::GetQuery,
            message_id: new_message_id(),
            query_name: Some(QueryName::GetHardwareDefinition),
            arguments: Some(category.to_owned()),
            object_list: None,
        }
    }

    /// Subscribe to change notifications for `keys` on `object_id`.
    pub fn subscribe<I, K>(object_id: &str, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self {
            command: RequestCommand::RequestParamList,
            message_id: new_message_id(),
            query_name: None,
            arguments: None,
            object_list: Some(vec![RequestObject::Subscribe {
                objnam: object_id.to_owned(),
                keys: keys.into_iter().map(Into::into).collect(),
            }]),
        }
    }

    /// Write `params` to `object_id`.
    pub fn set_params(object_id: &str, params: ParamBag) -> Self {
        Self {
            command: RequestCommand::SetParamList,
            message_id: new_message_id(),
            query_name: None,
            arguments: None,
            object_list: Some(vec![RequestObject::Write {
                objnam: object_id.to_owned(),
                params,
            }]),
        }
    }

    /// Write a single `key = value` pair to `object_id`.
    pub fn set_param(object_id: &str, key: &str, value: impl Into<String>) -> Self {
        let mut params = ParamBag::new();
        params.insert(key.to_owned(), Value::String(value.into()));
        Self::set_params(object_id, params)
    }
}

fn new_message_id() -> String {
    Uuid::new_v4().to_string()
}

/// Serialize a request to a newline-terminated wire line.
pub fn encode(request: &Request) -> Result<String, Error> {
    let mut line = serde_json::to_string(request).map_err(Error::Encode)?;
    line.push('\n');
    Ok(line)
}

// ── Inbound ──────────────────────────────────────────────────────────

/// Raw inbound envelope as the controller sends it.
#[derive(Debug, Deserialize)]
struct RawResponse {
    command: String,
    #[serde(default, deserialize_with = "string_or_number")]
    response: Option<String>,
    #[serde(rename = "messageID", default)]
    message_id: Option<String>,
    #[serde(rename = "queryName", default)]
    query_name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    answer: Option<Value>,
    #[serde(rename = "objectList", default)]
    object_list: Option<Vec<RawObjectEntry>>,
}

/// Either a direct `{objnam, params}` entry or a `{changes: [...]}` wrapper.
#[derive(Debug, Deserialize)]
struct RawObjectEntry {
    #[serde(default)]
    objnam: Option<String>,
    #[serde(default)]
    params: Option<ParamBag>,
    #[serde(default)]
    changes: Option<Vec<RawObjectEntry>>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// A single object's changed parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectChange {
    pub object_id: String,
    pub params: ParamBag,
}

/// Origin of a batch of changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeSource {
    /// Controller-initiated `NotifyList`.
    Notification,
    /// `WriteParamList` acknowledging one of our writes.
    WriteAck,
}

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Reply to a query; `answer` is the raw object tree fragment.
    QueryReply {
        message_id: Option<String>,
        query_name: Option<String>,
        answer: Value,
    },
    /// Flattened change entries from a notification or write ack.
    Changes {
        source: ChangeSource,
        message_id: Option<String>,
        changes: Vec<ObjectChange>,
    },
    /// Plain echo of one of our request commands.
    Acknowledged {
        command: RequestCommand,
        message_id: Option<String>,
    },
    /// Controller reported a non-OK status.
    Failed {
        status: String,
        command: String,
        message_id: Option<String>,
        description: Option<String>,
    },
    /// Anything else; logged and ignored by the dispatcher.
    Unhandled {
        command: String,
        message_id: Option<String>,
    },
}

impl Message {
    pub fn message_id(&self) -> Option<&str> {
        match self {
            Self::QueryReply { message_id, .. }
            | Self::Changes { message_id, .. }
            | Self::Acknowledged { message_id, .. }
            | Self::Failed { message_id, .. }
            | Self::Unhandled { message_id, .. } => message_id.as_deref(),
        }
    }
}

/// Decode one framed line. Bytes that are not valid UTF-8 are a
/// [`Error::Decode`], never patched up.
pub fn decode_line(line: &[u8]) -> Result<Message, Error> {
    let text = std::str::from_utf8(line).map_err(|e| Error::Decode {
        message: format!("line is not valid UTF-8: {e}"),
        line: String::from_utf8_lossy(line).into_owned(),
    })?;
    decode(text)
}

/// Decode one wire line into a [`Message`].
pub fn decode(line: &str) -> Result<Message, Error> {
    let raw: RawResponse = serde_json::from_str(line).map_err(|e| Error::Decode {
        message: e.to_string(),
        line: line.to_owned(),
    })?;

    if let Some(status) = raw.response.as_deref() {
        if status != STATUS_OK {
            return Ok(Message::Failed {
                status: status.to_owned(),
                command: raw.command,
                message_id: raw.message_id,
                description: raw.description,
            });
        }
    }

    if let Ok(command) = raw.command.parse::<RequestCommand>() {
        return Ok(Message::Acknowledged {
            command,
            message_id: raw.message_id,
        });
    }

    let message = match raw.command.parse::<ResponseCommand>() {
        Ok(ResponseCommand::SendQuery) => Message::QueryReply {
            message_id: raw.message_id,
            query_name: raw.query_name,
            answer: raw.answer.unwrap_or(Value::Null),
        },
        Ok(command @ (ResponseCommand::NotifyList | ResponseCommand::WriteParamList)) => {
            let source = if command == ResponseCommand::NotifyList {
                ChangeSource::Notification
            } else {
                ChangeSource::WriteAck
            };
            let changes = match raw.object_list {
                Some(entries) => flatten_changes(entries),
                None => {
                    tracing::warn!(%command, "object list missing in change message");
                    Vec::new()
                }
            };
            Message::Changes {
                source,
                message_id: raw.message_id,
                changes,
            }
        }
        Err(_) => Message::Unhandled {
            command: raw.command,
            message_id: raw.message_id,
        },
    };
    Ok(message)
}

/// Normalize direct entries and `{changes: [...]}` wrappers into one flat list.
fn flatten_changes(entries: Vec<RawObjectEntry>) -> Vec<ObjectChange> {
    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        match entry {
            RawObjectEntry {
                changes: Some(nested),
                ..
            } => out.extend(flatten_changes(nested)),
            RawObjectEntry {
                objnam: Some(object_id),
                params: Some(params),
                ..
            } => out.push(ObjectChange { object_id, params }),
            RawObjectEntry { objnam, .. } => {
                tracing::debug!(?objnam, "skipping change entry without identifier or params");
            }
        }
    }
    out
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn encode_hardware_definition_query() {
        let req = Request::hardware_definition("CIRCUITS");
        let line = encode(&req).unwrap();
        assert!(line.ends_with('\n'));

        let value: Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(value["command"], "GetQuery");
        assert_eq!(value["queryName"], "GetHardwareDefinition");
        assert_eq!(value["arguments"], "CIRCUITS");
        assert_eq!(value["messageID"], req.message_id.as_str());
        assert!(value.get("objectList").is_none());
    }

    #[test]
    fn encode_subscription() {
        let req = Request::subscribe("C0001", ["STATUS", "ACT"]);
        let value: Value = serde_json::from_str(encode(&req).unwrap().trim_end()).unwrap();
        assert_eq!(value["command"], "RequestParamList");
        assert_eq!(
            value["objectList"],
            json!([{ "objnam": "C0001", "keys": ["STATUS", "ACT"] }])
        );
        assert!(value.get("queryName").is_none());
    }

    #[test]
    fn encode_write() {
        let req = Request::set_param("B1101", "STATUS", "ON");
        let value: Value = serde_json::from_str(encode(&req).unwrap().trim_end()).unwrap();
        assert_eq!(value["command"], "SetParamList");
        assert_eq!(
            value["objectList"],
            json!([{ "objnam": "B1101", "params": { "STATUS": "ON" } }])
        );
    }

    #[test]
    fn message_ids_are_unique() {
        let a = Request::hardware_definition("PUMPS");
        let b = Request::hardware_definition("PUMPS");
        assert_ne!(a.message_id, b.message_id);
    }

    #[test]
    fn decode_query_reply() {
        let line = json!({
            "command": "SendQuery",
            "queryName": "GetHardwareDefinition",
            "response": "200",
            "messageID": "m-1",
            "answer": [{ "objnam": "P0001", "params": { "OBJTYP": "PANEL" } }]
        })
        .to_string();

        match decode(&line).unwrap() {
            Message::QueryReply {
                message_id,
                query_name,
                answer,
            } => {
                assert_eq!(message_id.as_deref(), Some("m-1"));
                assert_eq!(query_name.as_deref(), Some("GetHardwareDefinition"));
                assert_eq!(answer[0]["objnam"], "P0001");
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn decode_notify_flattens_both_shapes() {
        let line = json!({
            "command": "NotifyList",
            "response": "200",
            "messageID": "m-2",
            "objectList": [
                { "objnam": "C0001", "params": { "STATUS": "ON" } },
                { "changes": [
                    { "objnam": "B1101", "params": { "LSTTMP": "81" } },
                    { "objnam": "B1202", "params": { "STATUS": "OFF" } }
                ] }
            ]
        })
        .to_string();

        let Message::Changes {
            source, changes, ..
        } = decode(&line).unwrap()
        else {
            panic!("expected changes");
        };
        assert_eq!(source, ChangeSource::Notification);
        let ids: Vec<&str> = changes.iter().map(|c| c.object_id.as_str()).collect();
        assert_eq!(ids, vec!["C0001", "B1101", "B1202"]);
        assert_eq!(changes[1].params["LSTTMP"], "81");
    }

    #[test]
    fn decode_write_ack_skips_incomplete_entries() {
        let line = json!({
            "command": "WriteParamList",
            "response": "200",
            "objectList": [
                { "objnam": "C0001" },
                { "params": { "STATUS": "ON" } },
                { "objnam": "C0002", "params": { "STATUS": "ON" } }
            ]
        })
        .to_string();

        let Message::Changes {
            source, changes, ..
        } = decode(&line).unwrap()
        else {
            panic!("expected changes");
        };
        assert_eq!(source, ChangeSource::WriteAck);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].object_id, "C0002");
    }

    #[test]
    fn decode_failure_status_wins() {
        let line = r#"{"command":"SendQuery","response":"400","messageID":"x","description":"bad"}"#;
        match decode(line).unwrap() {
            Message::Failed {
                status,
                description,
                ..
            } => {
                assert_eq!(status, "400");
                assert_eq!(description.as_deref(), Some("bad"));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn decode_numeric_status() {
        let line = r#"{"command":"SetParamList","response":200,"messageID":"abc"}"#;
        assert_eq!(
            decode(line).unwrap(),
            Message::Acknowledged {
                command: RequestCommand::SetParamList,
                message_id: Some("abc".into()),
            }
        );
    }

    #[test]
    fn decode_unknown_command() {
        let line = r#"{"command":"ClearParam","messageID":"q"}"#;
        assert!(matches!(decode(line).unwrap(), Message::Unhandled { .. }));
    }

    #[test]
    fn decode_rejects_garbage() {
        let err = decode("{not json").unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));
    }

    #[test]
    fn decode_line_rejects_invalid_utf8() {
        let line = b"{\"command\":\"NotifyList\",\"response\":\"200\",\"objectList\":[{\"objnam\":\"C0001\",\"params\":{\"SNAME\":\"\xff\"}}]}";
        let err = decode_line(line).unwrap_err();
        assert!(matches!(err, Error::Decode { ref message, .. } if message.contains("UTF-8")));

        let ok = decode_line(br#"{"command":"SetParamList","response":"200","messageID":"m"}"#).unwrap();
        assert!(matches!(ok, Message::Acknowledged { .. }));
    }
}
