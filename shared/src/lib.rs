//! Wire protocol shared by every pong client component.
//!
//! Envelopes are JSON objects exchanged over a single WebSocket per session.
//! Outbound control messages carry a `type` tag; inbound game-state messages
//! carry `lobby_info` + `event_info` and no tag, except the heartbeat echo
//! (`{"type":"pong","time":..}`) and the matchmaking queue answer.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Player id the server reserves for the AI opponent in single-player.
pub const BOT_PLAYER_ID: PlayerId = PlayerId(-1);
/// Round trip above which the connection is reported as slow.
pub const SLOW_CONNECTION_THRESHOLD_MS: u64 = 200;
pub const HEARTBEAT_INTERVAL_MS: u64 = 1000;
/// Storage key under which a private room id is shared between host and guest.
pub const ROOM_NAME_KEY: &str = "room_name";

// Playfield extents in server units.
pub const FIELD_X_MIN: f32 = -20.0;
pub const FIELD_X_MAX: f32 = 20.0;
pub const FIELD_Y_MIN: f32 = -15.0;
pub const FIELD_Y_MAX: f32 = 15.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub i64);

impl PlayerId {
    /// Negative ids never belong to a human client.
    pub fn is_bot(self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shared lifecycle of one lobby as declared by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LobbyStatus {
    ToSetup,
    Playing,
    Ended,
    PlayerDisconnected,
    WaitingPlayerReconnection,
}

impl LobbyStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LobbyStatus::ToSetup => "TO_SETUP",
            LobbyStatus::Playing => "PLAYING",
            LobbyStatus::Ended => "ENDED",
            LobbyStatus::PlayerDisconnected => "PLAYER_DISCONNECTED",
            LobbyStatus::WaitingPlayerReconnection => "WAITING_PLAYER_RECONNECTION",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, LobbyStatus::Ended | LobbyStatus::PlayerDisconnected)
    }
}

impl fmt::Display for LobbyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized lobby status `{0}`")]
pub struct UnknownStatus(pub String);

impl FromStr for LobbyStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TO_SETUP" => Ok(LobbyStatus::ToSetup),
            "PLAYING" => Ok(LobbyStatus::Playing),
            "ENDED" => Ok(LobbyStatus::Ended),
            "PLAYER_DISCONNECTED" => Ok(LobbyStatus::PlayerDisconnected),
            "WAITING_PLAYER_RECONNECTION" => Ok(LobbyStatus::WaitingPlayerReconnection),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// One paddle as broadcast by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    #[serde(default)]
    pub player_id: Option<PlayerId>,
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
    #[serde(default = "default_paddle_width")]
    pub width: f32,
    #[serde(default = "default_paddle_height")]
    pub height: f32,
    #[serde(default = "default_paddle_color")]
    pub color: u32,
    #[serde(rename = "isMovingUp", default)]
    pub moving_up: bool,
    #[serde(rename = "isMovingDown", default)]
    pub moving_down: bool,
    #[serde(default)]
    pub player_connection_state: Option<String>,
}

fn default_paddle_width() -> f32 {
    0.7
}

fn default_paddle_height() -> f32 {
    4.0
}

fn default_paddle_color() -> u32 {
    0xFFFFFF
}

impl PlayerSnapshot {
    pub fn at(x: f32, y: f32) -> Self {
        Self {
            player_id: None,
            x,
            y,
            width: default_paddle_width(),
            height: default_paddle_height(),
            color: default_paddle_color(),
            moving_up: false,
            moving_down: false,
            player_connection_state: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BallSnapshot {
    pub x: f32,
    pub y: f32,
    #[serde(default = "default_ball_radius")]
    pub radius: f32,
}

fn default_ball_radius() -> f32 {
    0.8
}

/// Score tuple; the server names the sides `player1`/`player2`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scores {
    #[serde(rename = "player1", alias = "a")]
    pub a: i64,
    #[serde(rename = "player2", alias = "b")]
    pub b: i64,
}

impl Scores {
    pub fn new(a: i64, b: i64) -> Self {
        Self { a, b }
    }
}

/// Authoritative lobby state carried by every game-state envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LobbyInfo {
    pub current_lobby_status: String,
    #[serde(default)]
    pub players: HashMap<PlayerId, PlayerSnapshot>,
    #[serde(default)]
    pub ball: Option<BallSnapshot>,
    #[serde(default)]
    pub scores: Option<Scores>,
    #[serde(default)]
    pub count_down: Option<i64>,
}

impl LobbyInfo {
    pub fn status(&self) -> Result<LobbyStatus, UnknownStatus> {
        self.current_lobby_status.parse()
    }
}

/// What happened on the server to trigger this broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventInfo {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub event_name: Option<String>,
    // Bracket broadcasts use `event` instead of `event_name`.
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub player_id: Option<PlayerId>,
}

impl EventInfo {
    pub fn named(name: &str) -> Self {
        Self {
            event_name: Some(name.to_string()),
            ..Self::default()
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.event_name.as_deref().or(self.event.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LobbyEnvelope {
    pub lobby_info: LobbyInfo,
    pub event_info: EventInfo,
}

/// Everything the client can receive, after heartbeat and routing checks.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEnvelope {
    /// Server-initiated liveness probe, answered by the socket itself.
    Ping { time: u64 },
    Pong { time: u64 },
    Lobby(LobbyEnvelope),
    MatchFound { room_name: String },
    Other { kind: String },
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    MalformedFrame(#[from] serde_json::Error),
    #[error("frame is missing `{0}`")]
    MissingField(&'static str),
    #[error("frame is not a JSON object")]
    UnexpectedFrame,
}

/// Parses one text frame into an inbound envelope.
pub fn decode_frame(text: &str) -> Result<InboundEnvelope, ProtocolError> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    let object = value.as_object().ok_or(ProtocolError::UnexpectedFrame)?;

    if object.contains_key("lobby_info") || object.contains_key("event_info") {
        if !object.contains_key("lobby_info") {
            return Err(ProtocolError::MissingField("lobby_info"));
        }
        if !object.contains_key("event_info") {
            return Err(ProtocolError::MissingField("event_info"));
        }
        let envelope: LobbyEnvelope = serde_json::from_value(value)?;
        return Ok(InboundEnvelope::Lobby(envelope));
    }

    let kind = object
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or(ProtocolError::MissingField("type"))?;

    let time = || {
        object
            .get("time")
            .and_then(|t| t.as_u64())
            .ok_or(ProtocolError::MissingField("time"))
    };

    match kind {
        "ping" => Ok(InboundEnvelope::Ping { time: time()? }),
        "pong" => Ok(InboundEnvelope::Pong { time: time()? }),
        "setup_pong_lobby" | "init_lobby" => {
            let room_name = object
                .get("room_name")
                .and_then(|r| r.as_str())
                .filter(|r| !r.is_empty())
                .ok_or(ProtocolError::MissingField("room_name"))?;
            Ok(InboundEnvelope::MatchFound {
                room_name: room_name.to_string(),
            })
        }
        other => Ok(InboundEnvelope::Other {
            kind: other.to_string(),
        }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyAction {
    KeyDown,
    KeyUp,
}

/// Paddle control keys, sent as their physical key codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaddleKey {
    #[serde(rename = "KeyW")]
    Up,
    #[serde(rename = "KeyS")]
    Down,
}

/// Control envelopes the client sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEnvelope {
    InitPlayer {
        player_id: PlayerId,
    },
    ClientReady {
        player_id: PlayerId,
    },
    UpdatePlayer {
        action_type: KeyAction,
        key: PaddleKey,
        #[serde(rename = "playerId")]
        player_id: PlayerId,
    },
    QuitGame {
        player_id: PlayerId,
    },
    UnexpectedQuit {
        player_id: PlayerId,
    },
    Ping {
        time: u64,
    },
    Pong {
        time: u64,
    },
}

impl ClientEnvelope {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientEnvelope::InitPlayer { .. } => "init_player",
            ClientEnvelope::ClientReady { .. } => "client_ready",
            ClientEnvelope::UpdatePlayer { .. } => "update_player",
            ClientEnvelope::QuitGame { .. } => "quit_game",
            ClientEnvelope::UnexpectedQuit { .. } => "unexpected_quit",
            ClientEnvelope::Ping { .. } => "ping",
            ClientEnvelope::Pong { .. } => "pong",
        }
    }
}

/// Request sent on the matchmaking queue socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueRequest {
    pub action: &'static str,
}

impl QueueRequest {
    pub fn join() -> Self {
        Self {
            action: "join_matchmaking",
        }
    }
}

/// Body returned by the HTTP matchmaking endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RoomAssignment {
    #[serde(default)]
    pub room_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use serde_json::json;

    fn lobby_frame(status: &str, event: &str) -> String {
        json!({
            "lobby_info": {
                "current_lobby_status": status,
                "players": {
                    "7": { "player_id": 7, "x": -19.0, "y": 2.5, "isMovingUp": true },
                    "-1": { "player_id": -1, "x": 19.0, "y": -1.0 }
                },
                "ball": { "x": 1.5, "y": -3.0, "radius": 0.8 },
                "scores": { "player1": 2, "player2": 1 },
                "count_down": 3
            },
            "event_info": { "type": "lobby_state", "event_name": event, "player_id": 7 }
        })
        .to_string()
    }

    #[test]
    fn test_decode_lobby_envelope() {
        let frame = lobby_frame("PLAYING", "game_loop");
        let envelope = match decode_frame(&frame).unwrap() {
            InboundEnvelope::Lobby(envelope) => envelope,
            other => panic!("expected lobby envelope, got {:?}", other),
        };

        assert_eq!(envelope.lobby_info.status().unwrap(), LobbyStatus::Playing);
        assert_eq!(envelope.lobby_info.players.len(), 2);

        let local = &envelope.lobby_info.players[&PlayerId(7)];
        assert_approx_eq!(local.y, 2.5, 1e-6);
        assert!(local.moving_up);
        assert!(!local.moving_down);
        assert_approx_eq!(local.height, 4.0, 1e-6);

        let bot = &envelope.lobby_info.players[&BOT_PLAYER_ID];
        assert!(bot.player_id.unwrap().is_bot());

        let ball = envelope.lobby_info.ball.unwrap();
        assert_approx_eq!(ball.x, 1.5, 1e-6);
        assert_eq!(envelope.lobby_info.scores, Some(Scores::new(2, 1)));
        assert_eq!(envelope.lobby_info.count_down, Some(3));
        assert_eq!(envelope.event_info.name(), Some("game_loop"));
        assert_eq!(envelope.event_info.player_id, Some(PlayerId(7)));
    }

    #[test]
    fn test_decode_pong() {
        let decoded = decode_frame(r#"{"type":"pong","time":1000}"#).unwrap();
        assert_eq!(decoded, InboundEnvelope::Pong { time: 1000 });
    }

    #[test]
    fn test_decode_server_ping() {
        let decoded = decode_frame(r#"{"type":"ping","time":42}"#).unwrap();
        assert_eq!(decoded, InboundEnvelope::Ping { time: 42 });

        let reply = serde_json::to_value(ClientEnvelope::Pong { time: 42 }).unwrap();
        assert_eq!(reply, json!({ "type": "pong", "time": 42 }));
    }

    #[test]
    fn test_decode_pong_without_time_is_rejected() {
        let err = decode_frame(r#"{"type":"pong"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::MissingField("time")));
    }

    #[test]
    fn test_decode_match_found() {
        let decoded = decode_frame(r#"{"type":"setup_pong_lobby","room_name":"abc"}"#).unwrap();
        assert_eq!(
            decoded,
            InboundEnvelope::MatchFound {
                room_name: "abc".to_string()
            }
        );
    }

    #[test]
    fn test_decode_malformed_json() {
        let err = decode_frame("{not json").unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedFrame(_)));
    }

    #[test]
    fn test_decode_missing_event_info() {
        let frame = json!({ "lobby_info": { "current_lobby_status": "PLAYING" } }).to_string();
        let err = decode_frame(&frame).unwrap_err();
        assert!(matches!(err, ProtocolError::MissingField("event_info")));
    }

    #[test]
    fn test_decode_non_object() {
        assert!(matches!(
            decode_frame("[1, 2, 3]").unwrap_err(),
            ProtocolError::UnexpectedFrame
        ));
    }

    #[test]
    fn test_decode_unknown_type_is_passed_through() {
        let decoded = decode_frame(r#"{"type":"chat_message","text":"hi"}"#).unwrap();
        assert_eq!(
            decoded,
            InboundEnvelope::Other {
                kind: "chat_message".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_status_is_reported() {
        let info: LobbyInfo =
            serde_json::from_value(json!({ "current_lobby_status": "READY" })).unwrap();
        assert_eq!(info.status(), Err(UnknownStatus("READY".to_string())));
    }

    #[test]
    fn test_scores_accept_short_names() {
        let scores: Scores = serde_json::from_value(json!({ "a": 4, "b": 5 })).unwrap();
        assert_eq!(scores, Scores::new(4, 5));
    }

    #[test]
    fn test_update_player_wire_shape() {
        let envelope = ClientEnvelope::UpdatePlayer {
            action_type: KeyAction::KeyDown,
            key: PaddleKey::Up,
            player_id: PlayerId(12),
        };
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            value,
            json!({ "type": "update_player", "action_type": "key_down", "key": "KeyW", "playerId": 12 })
        );
    }

    #[test]
    fn test_control_envelope_wire_shapes() {
        let quit = serde_json::to_value(ClientEnvelope::UnexpectedQuit {
            player_id: PlayerId(3),
        })
        .unwrap();
        assert_eq!(quit, json!({ "type": "unexpected_quit", "player_id": 3 }));

        let ping = serde_json::to_value(ClientEnvelope::Ping { time: 1000 }).unwrap();
        assert_eq!(ping, json!({ "type": "ping", "time": 1000 }));

        let join = serde_json::to_value(QueueRequest::join()).unwrap();
        assert_eq!(join, json!({ "action": "join_matchmaking" }));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(LobbyStatus::Ended.is_terminal());
        assert!(LobbyStatus::PlayerDisconnected.is_terminal());
        assert!(!LobbyStatus::Playing.is_terminal());
        assert!(!LobbyStatus::WaitingPlayerReconnection.is_terminal());
    }
}
