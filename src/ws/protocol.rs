//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::Serialize;
use serde_json::{Map, Value};

use crate::game::powerup::PowerupKind;

/// Wire identity of a connection
pub type ConnId = i64;

/// Reserved wire id of the Admin connection
pub const ADMIN_ID: ConnId = -1;

/// Bootstrap string asking for the Admin role
pub const ADMIN_REQUEST: &str = "admin";

/// Bootstrap string asking for the Spectator role
pub const SPECTATOR_REQUEST: &str = "spectator";

/// Whether the match clock and elimination scheduler are active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Timed match with periodic lowest-score elimination
    #[default]
    Elimination,
    /// Free play, no clock and no eliminations
    Infinite,
}

/// Messages sent from server to client (everything except `cl`, see [`ClientsFrame`])
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ServerMsg {
    /// Greeting sent once on connect
    #[serde(rename = "hi")]
    Hello {
        id: ConnId,
        /// Seed clients use for shared terrain generation
        seed: u64,
        waiting: bool,
        data: HelloData,
    },

    /// A player joined
    #[serde(rename = "cn")]
    Connected { id: ConnId },

    /// A player left, was kicked, or was eliminated
    #[serde(rename = "dc")]
    Disconnected { id: ConnId },

    /// Wind speed changed
    #[serde(rename = "wd")]
    Wind { speed: f64 },

    /// Seconds left in the running match (negative once time is up)
    #[serde(rename = "tm")]
    Time { seconds: i64 },

    /// Verbatim admin command, for client-side UI reactions
    #[serde(rename = "ad")]
    AdminCommand { command: String },

    /// Sent only to the player that was just eliminated
    #[serde(rename = "el")]
    Eliminated,

    /// Final scoreboard
    #[serde(rename = "en")]
    End { data: Vec<ScoreEntry> },
}

/// Extra world info carried by `hi`
#[derive(Debug, Clone, Serialize)]
pub struct HelloData {
    pub wind: f64,
    pub mode: MatchMode,
}

/// Per-tick peer state frame (`cl`).
///
/// Borrows peer data out of the world so a frame can be serialized per
/// recipient without cloning every peer's state.
#[derive(Debug, Serialize)]
pub struct ClientsFrame<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub players: Vec<&'a Value>,
    pub powerups: &'a [PowerupView],
}

impl<'a> ClientsFrame<'a> {
    pub fn new(players: Vec<&'a Value>, powerups: &'a [PowerupView]) -> Self {
        Self {
            kind: "cl",
            players,
            powerups,
        }
    }
}

/// Powerup as seen by clients
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PowerupView {
    pub id: u32,
    #[serde(rename = "type")]
    pub kind: PowerupKind,
    /// Position floored to whole pixels
    pub pos: [i64; 2],
}

/// One row of the final scoreboard
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreEntry {
    pub id: ConnId,
    pub name: String,
    pub score: i64,
}

/// Messages received from a non-Admin connection
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMsg {
    /// `"admin"` bootstrap string
    RequestAdmin,
    /// `"spectator"` bootstrap string
    RequestSpectator,
    /// `ir`: pick up a powerup
    PowerupTaken { powerup_id: u32 },
    /// `ir`: relay the whole object to another connection
    Relay { target: ConnId, payload: Map<String, Value> },
    /// Free-form state, merged key by key into the sender's player state
    State(Map<String, Value>),
}

impl ClientMsg {
    /// Parse one inbound text frame
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        match text {
            ADMIN_REQUEST => return Ok(Self::RequestAdmin),
            SPECTATOR_REQUEST => return Ok(Self::RequestSpectator),
            _ => {}
        }

        let value: Value = serde_json::from_str(text)?;
        let Value::Object(map) = value else {
            return Err(ProtocolError::NotAnObject);
        };

        if map.get("type").and_then(Value::as_str) != Some("ir") {
            return Ok(Self::State(map));
        }

        let id = map
            .get("id")
            .and_then(Value::as_i64)
            .ok_or(ProtocolError::MissingField("id"))?;

        if map.get("powerup").is_some_and(|v| !v.is_null()) {
            let powerup_id = u32::try_from(id).map_err(|_| ProtocolError::MissingField("id"))?;
            return Ok(Self::PowerupTaken { powerup_id });
        }

        Ok(Self::Relay {
            target: id,
            payload: map,
        })
    }
}

/// Inbound protocol errors. Any of these drops the frame without side effects.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("message is not a JSON object")]
    NotAnObject,

    #[error("missing or invalid field: {0}")]
    MissingField(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn bootstrap_strings_are_role_requests() {
        assert_eq!(assert_ok!(ClientMsg::parse("admin")), ClientMsg::RequestAdmin);
        assert_eq!(assert_ok!(ClientMsg::parse("spectator")), ClientMsg::RequestSpectator);
    }

    #[test]
    fn plain_object_is_state() {
        let msg = assert_ok!(ClientMsg::parse(r#"{"id":3,"pos":[1,2],"rot":null}"#));
        let ClientMsg::State(map) = msg else {
            panic!("expected state");
        };
        assert_eq!(map.get("id"), Some(&json!(3)));
    }

    #[test]
    fn ir_with_powerup_key_takes_powerup() {
        let msg = assert_ok!(ClientMsg::parse(r#"{"type":"ir","id":7,"powerup":1}"#));
        assert_eq!(msg, ClientMsg::PowerupTaken { powerup_id: 7 });
    }

    #[test]
    fn ir_without_powerup_is_relay() {
        let msg = assert_ok!(ClientMsg::parse(r#"{"type":"ir","id":2,"hit":1}"#));
        match msg {
            ClientMsg::Relay { target, payload } => {
                assert_eq!(target, 2);
                assert_eq!(payload.get("hit"), Some(&json!(1)));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn malformed_frames_are_errors() {
        assert_err!(ClientMsg::parse("{not json"));
        assert!(matches!(ClientMsg::parse("[1,2]"), Err(ProtocolError::NotAnObject)));
        assert!(matches!(
            ClientMsg::parse(r#"{"type":"ir"}"#),
            Err(ProtocolError::MissingField("id"))
        ));
    }

    #[test]
    fn server_messages_use_short_tags() {
        let el = serde_json::to_value(ServerMsg::Eliminated).unwrap();
        assert_eq!(el, json!({"type": "el"}));

        let tm = serde_json::to_value(ServerMsg::Time { seconds: -1 }).unwrap();
        assert_eq!(tm, json!({"type": "tm", "seconds": -1}));

        let views = [PowerupView {
            id: 1,
            kind: PowerupKind::Strength,
            pos: [10, -5],
        }];
        let peer = json!({"id": 4});
        let frame = serde_json::to_value(ClientsFrame::new(vec![&peer], &views)).unwrap();
        assert_eq!(
            frame,
            json!({
                "type": "cl",
                "players": [{"id": 4}],
                "powerups": [{"id": 1, "type": "strength", "pos": [10, -5]}],
            })
        );
    }
}
