//! Failure classes surfaced by the client core.
//!
//! Protocol errors (`shared::ProtocolError`) never leave the socket: a bad
//! frame is logged and dropped. Everything here is fatal for the session.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("socket is already connected")]
    ConnectionRefused,
    #[error("invalid connection url `{0}`")]
    InvalidUrl(String),
    #[error("transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("connection closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum NegotiationError {
    #[error("matchmaking request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("matchmaking endpoint answered with status {0}")]
    Status(u16),
    #[error("matchmaking timed out after {0} ms")]
    Timeout(u64),
    #[error("matchmaking response carried no room name")]
    MissingRoomName,
    #[error("no private room has been shared with this guest")]
    MissingGuestRoom,
    #[error("player id {0} is reserved")]
    InvalidPlayerId(i64),
    #[error("matchmaking queue failed: {0}")]
    Queue(#[from] ConnectionError),
    #[error("storage error: {0}")]
    Storage(#[from] EnvironmentError),
}

#[derive(Debug, Error)]
pub enum EnvironmentError {
    #[error("storage io: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("tick rate must be positive")]
    InvalidTickRate,
    #[error("frame interval must be positive")]
    InvalidFrameInterval,
    #[error("page path `{0}` does not name a game")]
    MissingGame(String),
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Negotiation(#[from] NegotiationError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Environment(#[from] EnvironmentError),
}
