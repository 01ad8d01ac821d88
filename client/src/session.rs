//! Session negotiation: how a client finds the room it is going to play in.
//!
//! Exactly one strategy is chosen per game attempt, from the page path in
//! [`ClientConfig`]. `resolve` produces an immutable [`SessionTarget`] before
//! any game socket exists; `on_open` runs the handshake once it is connected.

use crate::config::{path_segments, ClientConfig, MatchmakingSource};
use crate::connection::{ChannelSocket, SocketEvent};
use crate::environment::Environment;
use crate::error::{ConnectionError, NegotiationError};
use log::{debug, info, warn};
use reqwest::header::ACCEPT;
use shared::{
    ClientEnvelope, InboundEnvelope, PlayerId, QueueRequest, RoomAssignment, BOT_PLAYER_ID,
    ROOM_NAME_KEY,
};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    Singleplayer,
    Matchmaking,
    PrivateLobby,
    Tournament,
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionMode::Singleplayer => "singleplayer",
            SessionMode::Matchmaking => "matchmaking",
            SessionMode::PrivateLobby => "private lobby",
            SessionMode::Tournament => "tournament",
        };
        f.write_str(name)
    }
}

/// Room a session connects to. Built once, never modified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTarget {
    pub room_id: String,
    pub mode: SessionMode,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LobbyRole {
    Host,
    Guest,
}

impl LobbyRole {
    fn from_path(path: &str) -> Self {
        if path.contains("guest") {
            LobbyRole::Guest
        } else {
            LobbyRole::Host
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNegotiator {
    Singleplayer { vs_bot: bool, room_id: String },
    Matchmaking { source: MatchmakingSource, timeout: Duration },
    PrivateLobby { role: LobbyRole },
    Tournament { role: LobbyRole },
}

impl SessionNegotiator {
    pub fn from_config(config: &ClientConfig) -> Self {
        let path = config.page_path.as_str();
        match config.mode_segment() {
            "singleplayer" => {
                let room_id = path_segments(path)
                    .skip_while(|segment| *segment != config.game)
                    .nth(1)
                    .filter(|segment| *segment != "vs_bot")
                    .unwrap_or_default()
                    .to_string();
                SessionNegotiator::Singleplayer {
                    vs_bot: path_segments(path).any(|segment| segment == "vs_bot"),
                    room_id,
                }
            }
            "lobby" => SessionNegotiator::PrivateLobby {
                role: LobbyRole::from_path(path),
            },
            "tournament" => SessionNegotiator::Tournament {
                role: LobbyRole::from_path(path),
            },
            _ => SessionNegotiator::Matchmaking {
                source: config
                    .matchmaking
                    .clone()
                    .unwrap_or_else(|| MatchmakingSource::Http {
                        url: config.default_matchmaking_url(),
                    }),
                timeout: config.matchmaking_timeout,
            },
        }
    }

    pub fn mode(&self) -> SessionMode {
        match self {
            SessionNegotiator::Singleplayer { .. } => SessionMode::Singleplayer,
            SessionNegotiator::Matchmaking { .. } => SessionMode::Matchmaking,
            SessionNegotiator::PrivateLobby { .. } => SessionMode::PrivateLobby,
            SessionNegotiator::Tournament { .. } => SessionMode::Tournament,
        }
    }

    /// Opponent id reserved for the AI when playing against the bot.
    pub fn reserved_opponent(&self) -> Option<PlayerId> {
        match self {
            SessionNegotiator::Singleplayer { vs_bot: true, .. } => Some(BOT_PLAYER_ID),
            _ => None,
        }
    }

    pub async fn resolve<E: Environment>(
        &self,
        config: &ClientConfig,
        env: &mut E,
    ) -> Result<SessionTarget, NegotiationError> {
        if config.player_id.is_bot() {
            return Err(NegotiationError::InvalidPlayerId(config.player_id.0));
        }

        let room_id = match self {
            SessionNegotiator::Singleplayer { room_id, .. } => room_id.clone(),
            SessionNegotiator::Matchmaking { source, timeout } => match source {
                MatchmakingSource::Http { url } => fetch_room_name(url, *timeout).await?,
                MatchmakingSource::Queue => join_queue(&config.queue_url(), *timeout).await?,
            },
            SessionNegotiator::PrivateLobby { role } | SessionNegotiator::Tournament { role } => {
                shared_room_name(*role, env)?
            }
        };

        let target = SessionTarget {
            url: config.room_url(&room_id),
            room_id,
            mode: self.mode(),
        };
        info!("Resolved {} session to room `{}`", target.mode, target.room_id);
        Ok(target)
    }

    /// Handshake sent once the game socket is open.
    pub fn on_open(&self, socket: &ChannelSocket, player_id: PlayerId) {
        debug!("Sending init_player for {}", player_id);
        socket.send(&ClientEnvelope::InitPlayer { player_id });
    }
}

// Host generates the room and publishes it; guest reads back the same key.
fn shared_room_name<E: Environment>(
    role: LobbyRole,
    env: &mut E,
) -> Result<String, NegotiationError> {
    match role {
        LobbyRole::Host => {
            let room_name = uuid::Uuid::new_v4().to_string();
            env.set_item(ROOM_NAME_KEY, &room_name)?;
            Ok(room_name)
        }
        LobbyRole::Guest => env
            .get_item(ROOM_NAME_KEY)?
            .filter(|room| !room.is_empty())
            .ok_or(NegotiationError::MissingGuestRoom),
    }
}

async fn fetch_room_name(url: &str, timeout: Duration) -> Result<String, NegotiationError> {
    let timeout_ms = timeout.as_millis() as u64;
    match tokio::time::timeout(timeout, request_room_name(url, timeout)).await {
        Ok(Err(NegotiationError::Http(e))) if e.is_timeout() => {
            Err(NegotiationError::Timeout(timeout_ms))
        }
        Ok(result) => result,
        Err(_) => Err(NegotiationError::Timeout(timeout_ms)),
    }
}

async fn request_room_name(url: &str, timeout: Duration) -> Result<String, NegotiationError> {
    let http = reqwest::Client::builder().timeout(timeout).build()?;
    let response = http
        .get(url)
        .header(ACCEPT, "application/json")
        .header("X-Requested-With", "XMLHttpRequest")
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(NegotiationError::Status(response.status().as_u16()));
    }

    let assignment = response.json::<RoomAssignment>().await?;
    assignment
        .room_name
        .filter(|room| !room.is_empty())
        .ok_or(NegotiationError::MissingRoomName)
}

async fn join_queue(url: &str, timeout: Duration) -> Result<String, NegotiationError> {
    let mut socket = ChannelSocket::without_heartbeat();
    socket.open_url(url).await?;
    socket.send(&QueueRequest::join());
    info!("Joined matchmaking queue");

    let wait = async {
        loop {
            match socket.next_event().await {
                SocketEvent::Envelope(InboundEnvelope::MatchFound { room_name }) => {
                    return Ok(room_name)
                }
                SocketEvent::Envelope(other) => debug!("Ignoring queue envelope {:?}", other),
                SocketEvent::Latency(_) => {}
                SocketEvent::Closed => {
                    return Err(NegotiationError::Queue(ConnectionError::Closed))
                }
                SocketEvent::Error(e) => return Err(NegotiationError::Queue(e)),
            }
        }
    };

    let result = match tokio::time::timeout(timeout, wait).await {
        Ok(result) => result,
        Err(_) => {
            warn!("Matchmaking queue timed out");
            Err(NegotiationError::Timeout(timeout.as_millis() as u64))
        }
    };
    socket.close().await;
    result
}
