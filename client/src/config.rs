//! Session configuration, built once from the command line and passed down
//! explicitly. Nothing below the binary reads the process environment.

use crate::error::ConfigError;
use shared::{PlayerId, HEARTBEAT_INTERVAL_MS, SLOW_CONNECTION_THRESHOLD_MS};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_TICK_HZ: u32 = 60;
pub const DEFAULT_MAX_CATCH_UP: u32 = 5;
pub const DEFAULT_MATCHMAKING_TIMEOUT_MS: u64 = 5000;

/// How a matched session obtains its room id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchmakingSource {
    /// `GET` an endpoint answering `{room_name}`.
    Http { url: String },
    /// Join the matchmaking queue socket and wait for a lobby assignment.
    Queue,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub secure: bool,
    /// Page location the session was started from, e.g. `/lobby/guest/pong`.
    pub page_path: String,
    pub game: String,
    pub player_id: PlayerId,
    pub matchmaking: Option<MatchmakingSource>,
    pub matchmaking_timeout: Duration,
    /// `None` disables heartbeat probing.
    pub heartbeat: Option<Duration>,
    pub slow_threshold: Duration,
    pub slow_debounce: u32,
    pub fixed_step: Duration,
    pub max_catch_up: u32,
    pub frame_interval: Duration,
    pub storage_path: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1:8000".to_string(),
            secure: false,
            page_path: "/multiplayer/pong".to_string(),
            game: "pong".to_string(),
            player_id: PlayerId(1),
            matchmaking: None,
            matchmaking_timeout: Duration::from_millis(DEFAULT_MATCHMAKING_TIMEOUT_MS),
            heartbeat: Some(Duration::from_millis(HEARTBEAT_INTERVAL_MS)),
            slow_threshold: Duration::from_millis(SLOW_CONNECTION_THRESHOLD_MS),
            slow_debounce: 1,
            fixed_step: Duration::from_secs(1) / DEFAULT_TICK_HZ,
            max_catch_up: DEFAULT_MAX_CATCH_UP,
            frame_interval: Duration::from_millis(16),
            storage_path: PathBuf::from("pong_storage.json"),
        }
    }
}

impl ClientConfig {
    pub fn with_tick_rate(mut self, hz: u32) -> Result<Self, ConfigError> {
        if hz == 0 {
            return Err(ConfigError::InvalidTickRate);
        }
        self.fixed_step = Duration::from_secs(1) / hz;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fixed_step.is_zero() {
            return Err(ConfigError::InvalidTickRate);
        }
        if self.frame_interval.is_zero() {
            return Err(ConfigError::InvalidFrameInterval);
        }
        if self.game.is_empty() {
            return Err(ConfigError::MissingGame(self.page_path.clone()));
        }
        Ok(())
    }

    /// First segment of the page path, used as the `<mode>` part of room urls.
    pub fn mode_segment(&self) -> &str {
        path_segments(&self.page_path).next().unwrap_or("default")
    }

    pub fn ws_scheme(&self) -> &'static str {
        if self.secure {
            "wss"
        } else {
            "ws"
        }
    }

    pub fn http_scheme(&self) -> &'static str {
        if self.secure {
            "https"
        } else {
            "http"
        }
    }

    /// `ws(s)://<host>/ws/<mode>/<game>/<room>`
    pub fn room_url(&self, room_id: &str) -> String {
        format!(
            "{}://{}/ws/{}/{}/{}",
            self.ws_scheme(),
            self.host,
            self.mode_segment(),
            self.game,
            room_id
        )
    }

    pub fn queue_url(&self) -> String {
        format!(
            "{}://{}/ws/{}/{}/matchmaking",
            self.ws_scheme(),
            self.host,
            self.mode_segment(),
            self.game
        )
    }

    pub fn default_matchmaking_url(&self) -> String {
        format!(
            "{}://{}/api/{}/{}",
            self.http_scheme(),
            self.host,
            self.mode_segment(),
            self.game
        )
    }
}

pub fn path_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_constants() {
        let config = ClientConfig::default();
        assert_eq!(config.slow_threshold, Duration::from_millis(200));
        assert_eq!(config.heartbeat, Some(Duration::from_millis(1000)));
        assert_eq!(config.max_catch_up, 5);
        assert_eq!(config.matchmaking_timeout, Duration::from_millis(5000));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_mode_from_first_path_segment() {
        let mut config = ClientConfig::default();
        config.page_path = "/lobby/guest/pong".to_string();
        assert_eq!(config.mode_segment(), "lobby");

        config.page_path = "/".to_string();
        assert_eq!(config.mode_segment(), "default");
    }

    #[test]
    fn test_room_url() {
        let mut config = ClientConfig::default();
        config.host = "example.org".to_string();
        config.secure = true;
        config.page_path = "/tournament/pong".to_string();
        assert_eq!(config.room_url("abc"), "wss://example.org/ws/tournament/pong/abc");
        assert_eq!(
            config.default_matchmaking_url(),
            "https://example.org/api/tournament/pong"
        );
    }

    #[test]
    fn test_zero_tick_rate_rejected() {
        let result = ClientConfig::default().with_tick_rate(0);
        assert!(matches!(result, Err(ConfigError::InvalidTickRate)));
    }
}
