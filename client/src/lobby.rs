//! Shared lobby lifecycle: `TO_SETUP -> PLAYING -> ENDED`, with
//! `PLAYER_DISCONNECTED` as the alternate terminal state.
//!
//! The machine performs no I/O. Each envelope yields a list of
//! [`LobbyAction`]s that the session driver carries out in order.

use crate::game::EntityStateSync;
use crate::session::SessionMode;
use crate::view::DisplayEvent;
use log::{debug, info, warn};
use shared::{ClientEnvelope, EventInfo, LobbyEnvelope, LobbyInfo, LobbyStatus, PlayerId};
use std::fmt;

pub const RESULT_ROUTE: &str = "/match-result";
pub const HOME_ROUTE: &str = "/";
pub const LOBBY_PLAYING_ROUTE: &str = "/lobby/playing";

const RECOVER_PLAYER_DATA: &str = "recover_player_data";
const PLAYER_JOIN: &str = "player_join";
const HOST_STARTED_GAME: &str = "host_started_game";
const GAME_LOOP: &str = "game_loop";

/// Why a session is being torn down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    GameEnded,
    PlayerDisconnected,
    UserQuit,
    WindowClosed,
    ConnectionLost,
    TransportError(String),
}

impl ExitReason {
    /// The match ran to completion.
    pub fn finished(&self) -> bool {
        matches!(self, ExitReason::GameEnded)
    }

    /// Last envelope sent before the socket closes.
    pub fn quit_envelope(&self, player_id: PlayerId) -> ClientEnvelope {
        match self {
            ExitReason::GameEnded | ExitReason::UserQuit => ClientEnvelope::QuitGame { player_id },
            _ => ClientEnvelope::UnexpectedQuit { player_id },
        }
    }

    pub fn route(&self) -> &'static str {
        if self.finished() {
            RESULT_ROUTE
        } else {
            HOME_ROUTE
        }
    }

    pub fn alert(&self) -> Option<String> {
        match self {
            ExitReason::PlayerDisconnected => Some("A player disconnected".to_string()),
            ExitReason::ConnectionLost => Some("Connection to the server was lost".to_string()),
            ExitReason::TransportError(e) => Some(format!("Connection error: {}", e)),
            _ => None,
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::GameEnded => f.write_str("game ended"),
            ExitReason::PlayerDisconnected => f.write_str("player disconnected"),
            ExitReason::UserQuit => f.write_str("user quit"),
            ExitReason::WindowClosed => f.write_str("window closed"),
            ExitReason::ConnectionLost => f.write_str("connection lost"),
            ExitReason::TransportError(e) => write!(f, "transport error: {}", e),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LobbyAction {
    Send(ClientEnvelope),
    Display(DisplayEvent),
    Navigate(&'static str),
    Terminate(ExitReason),
    Bracket(EventInfo),
}

/// Receives tournament bracket-progression events. The bracket protocol is
/// owned by the server; clients that care plug in their own observer.
pub trait BracketObserver: Send {
    fn on_bracket_event(&mut self, event: &EventInfo);
}

#[derive(Debug, Default)]
pub struct LoggingBracketObserver;

impl BracketObserver for LoggingBracketObserver {
    fn on_bracket_event(&mut self, event: &EventInfo) {
        info!("Bracket event: {}", event.name().unwrap_or("<unnamed>"));
    }
}

pub struct LobbyStateMachine {
    status: LobbyStatus,
    mode: SessionMode,
    ready_sent: bool,
    // When set, readiness waits for this player rather than any remote
    expected_opponent: Option<PlayerId>,
}

impl LobbyStateMachine {
    pub fn new(mode: SessionMode) -> Self {
        Self {
            status: LobbyStatus::ToSetup,
            mode,
            ready_sent: false,
            expected_opponent: None,
        }
    }

    /// Waits for `opponent` (the reserved bot id in vs-bot games) before
    /// declaring the lobby ready.
    pub fn with_expected_opponent(mut self, opponent: Option<PlayerId>) -> Self {
        self.expected_opponent = opponent;
        self
    }

    pub fn status(&self) -> LobbyStatus {
        self.status
    }

    pub fn ready_sent(&self) -> bool {
        self.ready_sent
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn handle(
        &mut self,
        envelope: &LobbyEnvelope,
        sync: &mut EntityStateSync,
    ) -> Vec<LobbyAction> {
        if self.is_terminal() {
            debug!("Ignoring envelope after {}", self.status);
            return Vec::new();
        }

        let incoming = match envelope.lobby_info.status() {
            Ok(status) => status,
            Err(e) => {
                warn!("{}, ignoring envelope", e);
                return Vec::new();
            }
        };

        match incoming {
            LobbyStatus::ToSetup => self.on_setup(envelope, sync),
            LobbyStatus::Playing => self.on_playing(envelope, sync),
            LobbyStatus::Ended => self.terminate(LobbyStatus::Ended, ExitReason::GameEnded),
            LobbyStatus::PlayerDisconnected => self.terminate(
                LobbyStatus::PlayerDisconnected,
                ExitReason::PlayerDisconnected,
            ),
            LobbyStatus::WaitingPlayerReconnection => {
                info!("Waiting for a player to reconnect");
                Vec::new()
            }
        }
    }

    fn on_setup(&mut self, envelope: &LobbyEnvelope, sync: &mut EntityStateSync) -> Vec<LobbyAction> {
        if self.status != LobbyStatus::ToSetup {
            debug!("Ignoring TO_SETUP while {}", self.status);
            return Vec::new();
        }

        let mut actions = Vec::new();
        let info = &envelope.lobby_info;
        let event = &envelope.event_info;

        match event.name() {
            Some(RECOVER_PLAYER_DATA) => recover_players(info, sync),
            Some(PLAYER_JOIN) => match event.player_id {
                Some(player_id) => match info.players.get(&player_id) {
                    Some(snapshot) => {
                        sync.add_player(player_id, snapshot);
                    }
                    None => warn!("player_join for {} without player data", player_id),
                },
                None => warn!("player_join without player id"),
            },
            Some(HOST_STARTED_GAME) if self.hosts_games() => {
                self.push_ready(sync.local_id(), &mut actions);
                actions.push(LobbyAction::Navigate(LOBBY_PLAYING_ROUTE));
            }
            _ => self.route_other_event(event, &mut actions),
        }

        if self.both_sides_present(sync) {
            self.push_ready(sync.local_id(), &mut actions);
        }

        if let Some(countdown) = info.count_down {
            if sync.apply_countdown(countdown) {
                actions.push(LobbyAction::Display(DisplayEvent::Countdown(countdown)));
            }
        }

        actions
    }

    fn on_playing(&mut self, envelope: &LobbyEnvelope, sync: &mut EntityStateSync) -> Vec<LobbyAction> {
        let mut actions = Vec::new();
        if self.status == LobbyStatus::ToSetup {
            info!("Lobby is playing");
            self.status = LobbyStatus::Playing;
            actions.push(LobbyAction::Display(DisplayEvent::StatusChanged(
                LobbyStatus::Playing,
            )));
        }

        if event_is_bracket(&envelope.event_info) {
            self.route_other_event(&envelope.event_info, &mut actions);
        }

        actions.extend(
            sync.apply_server_state(&envelope.lobby_info)
                .into_iter()
                .map(LobbyAction::Display),
        );
        actions
    }

    fn terminate(&mut self, status: LobbyStatus, reason: ExitReason) -> Vec<LobbyAction> {
        info!("Lobby {} ({})", status, reason);
        self.status = status;
        vec![
            LobbyAction::Display(DisplayEvent::StatusChanged(status)),
            LobbyAction::Terminate(reason),
        ]
    }

    fn push_ready(&mut self, player_id: PlayerId, actions: &mut Vec<LobbyAction>) {
        if self.ready_sent {
            return;
        }
        info!("Both players present, sending client_ready");
        self.ready_sent = true;
        actions.push(LobbyAction::Send(ClientEnvelope::ClientReady { player_id }));
    }

    fn both_sides_present(&self, sync: &EntityStateSync) -> bool {
        match self.expected_opponent {
            Some(opponent) => sync.local().is_some() && sync.remote(opponent).is_some(),
            None => sync.has_both_sides(),
        }
    }

    fn hosts_games(&self) -> bool {
        matches!(self.mode, SessionMode::PrivateLobby | SessionMode::Tournament)
    }

    fn route_other_event(&self, event: &EventInfo, actions: &mut Vec<LobbyAction>) {
        if self.mode == SessionMode::Tournament && event.name().is_some() {
            actions.push(LobbyAction::Bracket(event.clone()));
        } else if let Some(name) = event.name() {
            debug!("Unhandled lobby event `{}`", name);
        }
    }
}

fn recover_players(info: &LobbyInfo, sync: &mut EntityStateSync) {
    let local_known = sync.local().is_some();
    for (player_id, snapshot) in &info.players {
        if local_known && *player_id == sync.local_id() {
            continue;
        }
        sync.add_player(*player_id, snapshot);
    }
}

fn event_is_bracket(event: &EventInfo) -> bool {
    !matches!(
        event.name(),
        None | Some(GAME_LOOP) | Some(RECOVER_PLAYER_DATA) | Some(PLAYER_JOIN) | Some(HOST_STARTED_GAME)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{PlayerSnapshot, Scores, BOT_PLAYER_ID};
    use std::collections::HashMap;

    fn envelope(status: &str, event: &str, players: &[i64], event_player: Option<i64>) -> LobbyEnvelope {
        let players: HashMap<PlayerId, PlayerSnapshot> = players
            .iter()
            .map(|id| (PlayerId(*id), PlayerSnapshot::at(0.0, *id as f32)))
            .collect();
        LobbyEnvelope {
            lobby_info: LobbyInfo {
                current_lobby_status: status.to_string(),
                players,
                ball: None,
                scores: None,
                count_down: None,
            },
            event_info: EventInfo {
                player_id: event_player.map(PlayerId),
                ..EventInfo::named(event)
            },
        }
    }

    fn sends(actions: &[LobbyAction]) -> Vec<&ClientEnvelope> {
        actions
            .iter()
            .filter_map(|a| match a {
                LobbyAction::Send(envelope) => Some(envelope),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_client_ready_sent_once_both_sides_known() {
        let mut lobby = LobbyStateMachine::new(SessionMode::Matchmaking);
        let mut sync = EntityStateSync::new(PlayerId(1));

        let first = lobby.handle(&envelope("TO_SETUP", "recover_player_data", &[1], None), &mut sync);
        assert!(sends(&first).is_empty());

        let second = lobby.handle(&envelope("TO_SETUP", "player_join", &[1, 2], Some(2)), &mut sync);
        assert_eq!(
            sends(&second),
            vec![&ClientEnvelope::ClientReady {
                player_id: PlayerId(1)
            }]
        );

        let third = lobby.handle(&envelope("TO_SETUP", "player_join", &[1, 2], Some(2)), &mut sync);
        assert!(sends(&third).is_empty());
        assert!(lobby.ready_sent());
        assert_eq!(lobby.status(), LobbyStatus::ToSetup);
    }

    #[test]
    fn test_vs_bot_waits_for_bot_paddle() {
        let mut lobby = LobbyStateMachine::new(SessionMode::Singleplayer)
            .with_expected_opponent(Some(BOT_PLAYER_ID));
        let mut sync = EntityStateSync::new(PlayerId(1));

        let local = lobby.handle(&envelope("TO_SETUP", "recover_player_data", &[1], None), &mut sync);
        assert!(sends(&local).is_empty());

        let stray = lobby.handle(&envelope("TO_SETUP", "player_join", &[1, 5], Some(5)), &mut sync);
        assert!(sends(&stray).is_empty());
        assert!(sync.has_both_sides());

        let with_bot = lobby.handle(
            &envelope("TO_SETUP", "recover_player_data", &[1, 5, -1], None),
            &mut sync,
        );
        assert_eq!(
            sends(&with_bot),
            vec![&ClientEnvelope::ClientReady {
                player_id: PlayerId(1)
            }]
        );
    }

    #[test]
    fn test_recover_skips_known_local_player() {
        let mut lobby = LobbyStateMachine::new(SessionMode::Matchmaking);
        let mut sync = EntityStateSync::new(PlayerId(1));
        sync.add_player(PlayerId(1), &PlayerSnapshot::at(-19.0, 7.0));

        lobby.handle(&envelope("TO_SETUP", "recover_player_data", &[1, 2], None), &mut sync);
        assert_eq!(sync.local().unwrap().y, 7.0);
        assert_eq!(sync.remote_count(), 1);
    }

    #[test]
    fn test_playing_applies_state() {
        let mut lobby = LobbyStateMachine::new(SessionMode::Matchmaking);
        let mut sync = EntityStateSync::new(PlayerId(1));
        let mut playing = envelope("PLAYING", "game_loop", &[1, 2], None);
        playing.lobby_info.scores = Some(Scores::new(1, 0));

        let actions = lobby.handle(&playing, &mut sync);
        assert_eq!(lobby.status(), LobbyStatus::Playing);
        assert!(actions.contains(&LobbyAction::Display(DisplayEvent::StatusChanged(
            LobbyStatus::Playing
        ))));
        assert!(actions.contains(&LobbyAction::Display(DisplayEvent::ScoreChanged(
            Scores::new(1, 0)
        ))));

        let again = lobby.handle(&playing, &mut sync);
        assert!(again.is_empty());
    }

    #[test]
    fn test_ended_terminates_once_from_any_state() {
        for prior in ["TO_SETUP", "PLAYING"] {
            let mut lobby = LobbyStateMachine::new(SessionMode::Matchmaking);
            let mut sync = EntityStateSync::new(PlayerId(1));
            lobby.handle(&envelope(prior, "game_loop", &[], None), &mut sync);

            let actions = lobby.handle(&envelope("ENDED", "game_over", &[], None), &mut sync);
            let terminations: Vec<_> = actions
                .iter()
                .filter(|a| matches!(a, LobbyAction::Terminate(ExitReason::GameEnded)))
                .collect();
            assert_eq!(terminations.len(), 1);
            assert_eq!(lobby.status(), LobbyStatus::Ended);

            assert!(lobby
                .handle(&envelope("ENDED", "game_over", &[], None), &mut sync)
                .is_empty());
        }
    }

    #[test]
    fn test_player_disconnected_is_terminal() {
        let mut lobby = LobbyStateMachine::new(SessionMode::Matchmaking);
        let mut sync = EntityStateSync::new(PlayerId(1));

        let actions = lobby.handle(&envelope("PLAYER_DISCONNECTED", "", &[], None), &mut sync);
        assert!(actions.contains(&LobbyAction::Terminate(ExitReason::PlayerDisconnected)));
        assert!(lobby
            .handle(&envelope("PLAYING", "game_loop", &[], None), &mut sync)
            .is_empty());
        assert_eq!(lobby.status(), LobbyStatus::PlayerDisconnected);
    }

    #[test]
    fn test_unrecognized_status_is_ignored() {
        let mut lobby = LobbyStateMachine::new(SessionMode::Matchmaking);
        let mut sync = EntityStateSync::new(PlayerId(1));

        assert!(lobby
            .handle(&envelope("READY", "game_loop", &[1, 2], None), &mut sync)
            .is_empty());
        assert!(lobby
            .handle(&envelope("WAITING_PLAYER_RECONNECTION", "", &[], None), &mut sync)
            .is_empty());
        assert_eq!(lobby.status(), LobbyStatus::ToSetup);
    }

    #[test]
    fn test_setup_after_playing_is_ignored() {
        let mut lobby = LobbyStateMachine::new(SessionMode::Matchmaking);
        let mut sync = EntityStateSync::new(PlayerId(1));
        lobby.handle(&envelope("PLAYING", "game_loop", &[], None), &mut sync);

        let actions = lobby.handle(&envelope("TO_SETUP", "player_join", &[3], Some(3)), &mut sync);
        assert!(actions.is_empty());
        assert_eq!(lobby.status(), LobbyStatus::Playing);
        assert_eq!(sync.remote(PlayerId(3)), None);
    }

    #[test]
    fn test_host_started_game_in_private_lobby() {
        let mut lobby = LobbyStateMachine::new(SessionMode::PrivateLobby);
        let mut sync = EntityStateSync::new(PlayerId(1));

        let actions = lobby.handle(&envelope("TO_SETUP", "host_started_game", &[], None), &mut sync);
        assert_eq!(
            actions,
            vec![
                LobbyAction::Send(ClientEnvelope::ClientReady {
                    player_id: PlayerId(1)
                }),
                LobbyAction::Navigate(LOBBY_PLAYING_ROUTE),
            ]
        );
    }

    #[test]
    fn test_tournament_bracket_events_forwarded() {
        let mut lobby = LobbyStateMachine::new(SessionMode::Tournament);
        let mut sync = EntityStateSync::new(PlayerId(1));
        lobby.handle(&envelope("PLAYING", "game_loop", &[], None), &mut sync);

        let actions = lobby.handle(&envelope("PLAYING", "match_finished", &[], None), &mut sync);
        assert!(actions.contains(&LobbyAction::Bracket(EventInfo::named("match_finished"))));
    }

    #[test]
    fn test_exit_reason_mapping() {
        let id = PlayerId(4);
        assert_eq!(
            ExitReason::GameEnded.quit_envelope(id),
            ClientEnvelope::QuitGame { player_id: id }
        );
        assert_eq!(ExitReason::GameEnded.route(), RESULT_ROUTE);
        assert_eq!(
            ExitReason::WindowClosed.quit_envelope(id),
            ClientEnvelope::UnexpectedQuit { player_id: id }
        );
        assert_eq!(ExitReason::PlayerDisconnected.route(), HOME_ROUTE);
        assert!(ExitReason::ConnectionLost.alert().is_some());
        assert!(ExitReason::UserQuit.alert().is_none());
    }
}
