use crate::view::{BallView, DisplayEvent, PaddleView, RenderFrame};
use log::debug;
use shared::{
    BallSnapshot, ClientEnvelope, KeyAction, LobbyInfo, PaddleKey, PlayerId, PlayerSnapshot,
    Scores,
};
use std::collections::BTreeMap;
use std::time::Duration;

/// A paddle as displayed locally. `target_*` holds the last authoritative
/// position; the displayed position catches up on the next fixed tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Paddle {
    pub player_id: PlayerId,
    pub x: f32,
    pub y: f32,
    pub target_x: f32,
    pub target_y: f32,
    pub width: f32,
    pub height: f32,
    pub color: u32,
    pub moving_up: bool,
    pub moving_down: bool,
}

impl Paddle {
    fn from_snapshot(player_id: PlayerId, snapshot: &PlayerSnapshot) -> Self {
        Self {
            player_id,
            x: snapshot.x,
            y: snapshot.y,
            target_x: snapshot.x,
            target_y: snapshot.y,
            width: snapshot.width,
            height: snapshot.height,
            color: snapshot.color,
            moving_up: snapshot.moving_up,
            moving_down: snapshot.moving_down,
        }
    }

    fn apply(&mut self, snapshot: &PlayerSnapshot) {
        self.target_x = snapshot.x;
        self.target_y = snapshot.y;
        self.width = snapshot.width;
        self.height = snapshot.height;
        self.moving_up = snapshot.moving_up;
        self.moving_down = snapshot.moving_down;
    }

    fn sync(&mut self) {
        self.x = self.target_x;
        self.y = self.target_y;
    }

    fn view(&self, local: bool) -> PaddleView {
        PaddleView {
            player_id: self.player_id,
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
            color: self.color,
            local,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ball {
    pub x: f32,
    pub y: f32,
    pub target_x: f32,
    pub target_y: f32,
    pub radius: f32,
}

impl Ball {
    fn from_snapshot(snapshot: &BallSnapshot) -> Self {
        Self {
            x: snapshot.x,
            y: snapshot.y,
            target_x: snapshot.x,
            target_y: snapshot.y,
            radius: snapshot.radius,
        }
    }
}

/// Local mirror of the authoritative lobby entities.
///
/// The server owns every position: input is forwarded as key events and never
/// moves the local paddle by itself.
pub struct EntityStateSync {
    local_id: PlayerId,
    local: Option<Paddle>,
    remotes: BTreeMap<PlayerId, Paddle>,
    ball: Option<Ball>,
    scores: Option<Scores>,
    countdown: Option<i64>,
    held: [bool; 2],
    pub tick: u64,
    pub simulated: Duration,
}

impl EntityStateSync {
    pub fn new(local_id: PlayerId) -> Self {
        Self {
            local_id,
            local: None,
            remotes: BTreeMap::new(),
            ball: None,
            scores: None,
            countdown: None,
            held: [false; 2],
            tick: 0,
            simulated: Duration::ZERO,
        }
    }

    pub fn local_id(&self) -> PlayerId {
        self.local_id
    }

    pub fn local(&self) -> Option<&Paddle> {
        self.local.as_ref()
    }

    pub fn remote(&self, player_id: PlayerId) -> Option<&Paddle> {
        self.remotes.get(&player_id)
    }

    pub fn remote_count(&self) -> usize {
        self.remotes.len()
    }

    pub fn ball(&self) -> Option<&Ball> {
        self.ball.as_ref()
    }

    /// Both sides of the table are known.
    pub fn has_both_sides(&self) -> bool {
        self.local.is_some() && !self.remotes.is_empty()
    }

    /// Registers a player from the roster. The local id becomes the local
    /// paddle the first time it is seen; everyone else is display-only.
    pub fn add_player(&mut self, player_id: PlayerId, snapshot: &PlayerSnapshot) -> bool {
        if player_id == self.local_id {
            if self.local.is_some() {
                return false;
            }
            debug!("Local paddle {} registered", player_id);
            self.local = Some(Paddle::from_snapshot(player_id, snapshot));
            return true;
        }

        if self.remotes.contains_key(&player_id) {
            return false;
        }
        debug!("Remote paddle {} registered", player_id);
        self.remotes
            .insert(player_id, Paddle::from_snapshot(player_id, snapshot));
        true
    }

    /// Overwrites entity targets from an authoritative snapshot and returns the
    /// display updates it caused.
    pub fn apply_server_state(&mut self, info: &LobbyInfo) -> Vec<DisplayEvent> {
        let mut events = Vec::new();

        for (player_id, snapshot) in &info.players {
            let paddle = if *player_id == self.local_id {
                self.local.as_mut()
            } else {
                self.remotes.get_mut(player_id)
            };

            match paddle {
                Some(paddle) => paddle.apply(snapshot),
                None => {
                    self.add_player(*player_id, snapshot);
                }
            }
        }

        if let Some(ball) = &info.ball {
            match self.ball.as_mut() {
                Some(current) => {
                    current.target_x = ball.x;
                    current.target_y = ball.y;
                    current.radius = ball.radius;
                }
                None => self.ball = Some(Ball::from_snapshot(ball)),
            }
        }

        if let Some(scores) = info.scores {
            if self.apply_scores(scores) {
                events.push(DisplayEvent::ScoreChanged(scores));
            }
        }

        if let Some(countdown) = info.count_down {
            if self.apply_countdown(countdown) {
                events.push(DisplayEvent::Countdown(countdown));
            }
        }

        events
    }

    /// True when the tuple differs from the last one applied.
    pub fn apply_scores(&mut self, scores: Scores) -> bool {
        if self.scores == Some(scores) {
            return false;
        }
        self.scores = Some(scores);
        true
    }

    /// True only for a strictly smaller value than the one last displayed.
    pub fn apply_countdown(&mut self, countdown: i64) -> bool {
        match self.countdown {
            Some(shown) if countdown >= shown => false,
            _ => {
                self.countdown = Some(countdown);
                true
            }
        }
    }

    /// One fixed simulation tick: displayed positions catch up with the last
    /// authoritative state.
    pub fn fixed_update(&mut self, dt: Duration) {
        if let Some(local) = self.local.as_mut() {
            local.sync();
        }
        for paddle in self.remotes.values_mut() {
            paddle.sync();
        }
        if let Some(ball) = self.ball.as_mut() {
            ball.x = ball.target_x;
            ball.y = ball.target_y;
        }
        self.tick += 1;
        self.simulated += dt;
    }

    /// Builds the `update_player` envelope for a key transition, or `None` if
    /// there is no local paddle yet or the transition is a repeat.
    pub fn forward_input(&mut self, key: PaddleKey, action: KeyAction) -> Option<ClientEnvelope> {
        self.local.as_ref()?;

        let slot = match key {
            PaddleKey::Up => 0,
            PaddleKey::Down => 1,
        };
        let pressed = action == KeyAction::KeyDown;
        if self.held[slot] == pressed {
            return None;
        }
        self.held[slot] = pressed;

        Some(ClientEnvelope::UpdatePlayer {
            action_type: action,
            key,
            player_id: self.local_id,
        })
    }

    pub fn render_frame(&self) -> RenderFrame {
        let mut paddles: Vec<PaddleView> = self.remotes.values().map(|p| p.view(false)).collect();
        if let Some(local) = &self.local {
            paddles.push(local.view(true));
        }

        RenderFrame {
            paddles,
            ball: self.ball.map(|b| BallView {
                x: b.x,
                y: b.y,
                radius: b.radius,
            }),
            scores: self.scores.unwrap_or_default(),
            countdown: self.countdown,
            ..RenderFrame::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use std::collections::HashMap;

    fn info(players: &[(i64, f32)], scores: Option<(i64, i64)>, countdown: Option<i64>) -> LobbyInfo {
        let players: HashMap<PlayerId, PlayerSnapshot> = players
            .iter()
            .map(|(id, y)| (PlayerId(*id), PlayerSnapshot::at(if *id == 1 { -19.0 } else { 19.0 }, *y)))
            .collect();
        LobbyInfo {
            current_lobby_status: "PLAYING".to_string(),
            players,
            ball: Some(BallSnapshot {
                x: 2.0,
                y: -1.0,
                radius: 0.8,
            }),
            scores: scores.map(|(a, b)| Scores::new(a, b)),
            count_down: countdown,
        }
    }

    #[test]
    fn test_add_player_splits_local_and_remote() {
        let mut sync = EntityStateSync::new(PlayerId(1));
        assert!(sync.add_player(PlayerId(2), &PlayerSnapshot::at(19.0, 0.0)));
        assert!(!sync.has_both_sides());
        assert!(sync.add_player(PlayerId(1), &PlayerSnapshot::at(-19.0, 0.0)));
        assert!(sync.has_both_sides());

        assert!(!sync.add_player(PlayerId(1), &PlayerSnapshot::at(0.0, 0.0)));
        assert!(!sync.add_player(PlayerId(2), &PlayerSnapshot::at(0.0, 0.0)));
        assert_eq!(sync.remote_count(), 1);
    }

    #[test]
    fn test_positions_apply_on_next_tick() {
        let mut sync = EntityStateSync::new(PlayerId(1));
        sync.apply_server_state(&info(&[(1, 0.0), (2, 0.0)], None, None));
        sync.fixed_update(Duration::from_millis(16));

        sync.apply_server_state(&info(&[(1, 3.5), (2, -2.0)], None, None));
        assert_approx_eq!(sync.local().unwrap().y, 0.0, 1e-6);
        assert_approx_eq!(sync.local().unwrap().target_y, 3.5, 1e-6);

        sync.fixed_update(Duration::from_millis(16));
        assert_approx_eq!(sync.local().unwrap().y, 3.5, 1e-6);
        assert_approx_eq!(sync.remote(PlayerId(2)).unwrap().y, -2.0, 1e-6);
        assert_approx_eq!(sync.ball().unwrap().x, 2.0, 1e-6);
        assert_eq!(sync.tick, 2);
    }

    #[test]
    fn test_duplicate_scores_display_once() {
        let mut sync = EntityStateSync::new(PlayerId(1));
        let first = sync.apply_server_state(&info(&[], Some((1, 0)), None));
        let second = sync.apply_server_state(&info(&[], Some((1, 0)), None));
        let third = sync.apply_server_state(&info(&[], Some((1, 1)), None));

        assert_eq!(first, vec![DisplayEvent::ScoreChanged(Scores::new(1, 0))]);
        assert!(second.is_empty());
        assert_eq!(third, vec![DisplayEvent::ScoreChanged(Scores::new(1, 1))]);
    }

    #[test]
    fn test_countdown_only_decreases() {
        let mut sync = EntityStateSync::new(PlayerId(1));
        assert!(sync.apply_countdown(3));
        assert!(!sync.apply_countdown(3));
        assert!(!sync.apply_countdown(4));
        assert!(sync.apply_countdown(2));
        assert!(sync.apply_countdown(0));
        assert!(!sync.apply_countdown(1));
        assert_eq!(sync.render_frame().countdown, Some(0));
    }

    #[test]
    fn test_input_needs_local_paddle() {
        let mut sync = EntityStateSync::new(PlayerId(1));
        assert_eq!(sync.forward_input(PaddleKey::Up, KeyAction::KeyDown), None);

        sync.add_player(PlayerId(1), &PlayerSnapshot::at(-19.0, 0.0));
        let envelope = sync.forward_input(PaddleKey::Up, KeyAction::KeyDown);
        assert_eq!(
            envelope,
            Some(ClientEnvelope::UpdatePlayer {
                action_type: KeyAction::KeyDown,
                key: PaddleKey::Up,
                player_id: PlayerId(1),
            })
        );

        // Held keys do not repeat
        assert_eq!(sync.forward_input(PaddleKey::Up, KeyAction::KeyDown), None);
        assert!(sync.forward_input(PaddleKey::Up, KeyAction::KeyUp).is_some());
    }

    #[test]
    fn test_input_never_moves_local_paddle() {
        let mut sync = EntityStateSync::new(PlayerId(1));
        sync.add_player(PlayerId(1), &PlayerSnapshot::at(-19.0, 1.0));
        sync.forward_input(PaddleKey::Down, KeyAction::KeyDown);
        sync.fixed_update(Duration::from_millis(16));
        assert_approx_eq!(sync.local().unwrap().y, 1.0, 1e-6);
    }

    #[test]
    fn test_render_frame_marks_local_paddle() {
        let mut sync = EntityStateSync::new(PlayerId(1));
        sync.add_player(PlayerId(1), &PlayerSnapshot::at(-19.0, 0.0));
        sync.add_player(PlayerId(-1), &PlayerSnapshot::at(19.0, 0.0));

        let frame = sync.render_frame();
        assert_eq!(frame.paddles.len(), 2);
        assert_eq!(frame.paddles.iter().filter(|p| p.local).count(), 1);
        assert!(frame.paddles.iter().any(|p| p.player_id.is_bot() && !p.local));
    }
}
