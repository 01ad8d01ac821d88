use crate::config::ClientConfig;
use crate::connection::{ChannelSocket, SocketEvent};
use crate::environment::Environment;
use crate::error::ClientError;
use crate::fixed_step::{FixedStepLoop, FrameHandler, FrameScheduler};
use crate::game::EntityStateSync;
use crate::latency::{LatencyEdge, LatencyMonitor, LatencySample};
use crate::lobby::{
    BracketObserver, ExitReason, LobbyAction, LobbyStateMachine, LoggingBracketObserver, HOME_ROUTE,
};
use crate::session::SessionNegotiator;
use crate::view::{DisplayEvent, GameView, RenderFrame};
use log::{debug, error, info};
use shared::{InboundEnvelope, KeyAction, LobbyStatus, PaddleKey};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Requests from the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCommand {
    Input { key: PaddleKey, action: KeyAction },
    Quit,
    WindowClosed,
}

/// Lets exactly one exit path run the teardown routine.
#[derive(Debug, Default)]
pub struct TeardownGuard {
    done: AtomicBool,
}

impl TeardownGuard {
    /// True for the first caller only.
    pub fn claim(&self) -> bool {
        self.done
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }
}

/// One game attempt: negotiates a room, owns the socket, and drives the lobby
/// machine and fixed-step loop from a single task.
pub struct GameClient<V: GameView, E: Environment> {
    config: ClientConfig,
    negotiator: SessionNegotiator,
    socket: ChannelSocket,
    lobby: Option<LobbyStateMachine>,
    sync: EntityStateSync,
    fixed: FixedStepLoop,
    scheduler: FrameScheduler,
    view: V,
    env: E,
    bracket: Box<dyn BracketObserver>,
    commands: mpsc::Receiver<ClientCommand>,
    teardown: TeardownGuard,
    exit: Option<ExitReason>,
}

impl<V: GameView, E: Environment> GameClient<V, E> {
    pub fn new(
        config: ClientConfig,
        view: V,
        env: E,
        commands: mpsc::Receiver<ClientCommand>,
    ) -> Self {
        let latency = LatencyMonitor::with_debounce(config.slow_threshold, config.slow_debounce);
        let max_catch_up = (config.max_catch_up > 0).then_some(config.max_catch_up);

        Self {
            negotiator: SessionNegotiator::from_config(&config),
            socket: ChannelSocket::new(config.heartbeat, latency),
            lobby: None,
            sync: EntityStateSync::new(config.player_id),
            fixed: FixedStepLoop::new(config.fixed_step, max_catch_up),
            scheduler: FrameScheduler::new(config.frame_interval),
            view,
            env,
            bracket: Box::new(LoggingBracketObserver),
            commands,
            teardown: TeardownGuard::default(),
            exit: None,
            config,
        }
    }

    pub fn with_bracket_observer(mut self, observer: Box<dyn BracketObserver>) -> Self {
        self.bracket = observer;
        self
    }

    pub fn negotiator(&self) -> &SessionNegotiator {
        &self.negotiator
    }

    pub fn lobby_status(&self) -> Option<LobbyStatus> {
        self.lobby.as_ref().map(|l| l.status())
    }

    /// Runs the session to completion and returns why it ended.
    pub async fn run(&mut self) -> Result<ExitReason, ClientError> {
        let target = match self.negotiator.resolve(&self.config, &mut self.env).await {
            Ok(target) => target,
            Err(e) => {
                error!("Session negotiation failed: {}", e);
                self.fail(&e.to_string());
                return Err(e.into());
            }
        };
        self.lobby = Some(
            LobbyStateMachine::new(target.mode)
                .with_expected_opponent(self.negotiator.reserved_opponent()),
        );

        if let Err(e) = self.socket.open(&target).await {
            error!("Failed to connect: {}", e);
            self.fail(&e.to_string());
            return Err(e.into());
        }
        self.negotiator.on_open(&self.socket, self.config.player_id);
        self.fixed.start(Instant::now());

        while !self.teardown.is_done() {
            tokio::select! {
                event = self.socket.next_event() => self.handle_socket_event(event).await,

                now = self.scheduler.next_frame() => self.handle_frame(now),

                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => self.shutdown(ExitReason::WindowClosed).await,
                },
            }
        }

        Ok(self.exit.clone().unwrap_or(ExitReason::WindowClosed))
    }

    fn fail(&mut self, message: &str) {
        self.view.on_display(DisplayEvent::Alert(message.to_string()));
        self.env.alert(message);
        self.env.navigate(HOME_ROUTE);
    }

    async fn handle_socket_event(&mut self, event: SocketEvent) {
        match event {
            SocketEvent::Envelope(InboundEnvelope::Lobby(envelope)) => {
                let Some(lobby) = self.lobby.as_mut() else {
                    return;
                };
                let actions = lobby.handle(&envelope, &mut self.sync);
                self.perform(actions).await;
            }
            SocketEvent::Envelope(other) => {
                debug!("Ignoring envelope {:?}", other);
            }
            SocketEvent::Latency(edge) => {
                let (slow, round_trip) = match edge {
                    LatencyEdge::Slow(rtt) => (true, rtt),
                    LatencyEdge::Recovered(rtt) => (false, rtt),
                };
                self.view
                    .on_display(DisplayEvent::ConnectionQuality { slow, round_trip });
            }
            SocketEvent::Closed => self.shutdown(ExitReason::ConnectionLost).await,
            SocketEvent::Error(e) => {
                self.shutdown(ExitReason::TransportError(e.to_string()))
                    .await
            }
        }
    }

    async fn perform(&mut self, actions: Vec<LobbyAction>) {
        for action in actions {
            match action {
                LobbyAction::Send(envelope) => self.socket.send(&envelope),
                LobbyAction::Display(event) => self.view.on_display(event),
                LobbyAction::Navigate(route) => self.env.navigate(route),
                LobbyAction::Bracket(event) => self.bracket.on_bracket_event(&event),
                LobbyAction::Terminate(reason) => self.shutdown(reason).await,
            }
        }
    }

    async fn handle_command(&mut self, command: ClientCommand) {
        match command {
            ClientCommand::Input { key, action } => {
                if let Some(envelope) = self.sync.forward_input(key, action) {
                    self.socket.send(&envelope);
                }
            }
            ClientCommand::Quit => self.shutdown(ExitReason::UserQuit).await,
            ClientCommand::WindowClosed => self.shutdown(ExitReason::WindowClosed).await,
        }
    }

    fn handle_frame(&mut self, now: Instant) {
        let mut driver = FrameDriver {
            sync: &mut self.sync,
            view: &mut self.view,
            status: self.lobby.as_ref().map(|l| l.status()),
            round_trip: self.socket.latency().last_round_trip(),
            slow: self.socket.latency().is_slow(),
            latency: self.socket.latency().history().copied().collect(),
        };
        self.fixed.wake(now, &mut driver);
    }

    /// The one teardown routine every exit path funnels through.
    async fn shutdown(&mut self, reason: ExitReason) {
        if !self.teardown.claim() {
            debug!("Teardown already ran, ignoring {}", reason);
            return;
        }
        info!("Ending session: {}", reason);

        self.socket
            .send(&reason.quit_envelope(self.sync.local_id()));
        self.socket.close().await;
        self.scheduler.stop();
        self.fixed.stop();

        if let Some(message) = reason.alert() {
            self.view.on_display(DisplayEvent::Alert(message.clone()));
            self.env.alert(&message);
        }

        let mut frame = self.sync.render_frame();
        frame.status = self.lobby.as_ref().map(|l| l.status());
        frame.finished = reason.finished();
        self.view.render(&frame);

        self.env.navigate(reason.route());
        self.exit = Some(reason);
    }
}

struct FrameDriver<'a, V: GameView> {
    sync: &'a mut EntityStateSync,
    view: &'a mut V,
    status: Option<LobbyStatus>,
    round_trip: Option<Duration>,
    slow: bool,
    latency: Vec<LatencySample>,
}

impl<V: GameView> FrameHandler for FrameDriver<'_, V> {
    fn update(&mut self, dt: Duration) {
        self.sync.fixed_update(dt);
    }

    fn render(&mut self) {
        let frame = RenderFrame {
            status: self.status,
            round_trip: self.round_trip,
            slow_connection: self.slow,
            latency: std::mem::take(&mut self.latency),
            ..self.sync.render_frame()
        };
        self.view.render(&frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::MemoryEnvironment;
    use crate::view::RecordingView;
    use shared::PlayerId;

    #[test]
    fn test_teardown_guard_claims_once() {
        let guard = TeardownGuard::default();
        assert!(!guard.is_done());
        assert!(guard.claim());
        assert!(!guard.claim());
        assert!(guard.is_done());
    }

    #[test]
    fn test_teardown_guard_across_threads() {
        let guard = std::sync::Arc::new(TeardownGuard::default());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let guard = guard.clone();
                std::thread::spawn(move || guard.claim())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
        assert!(guard.is_done());
    }

    #[tokio::test]
    async fn test_failed_negotiation_alerts_and_goes_home() {
        let config = ClientConfig {
            page_path: "/lobby/guest/pong".to_string(),
            player_id: PlayerId(3),
            ..ClientConfig::default()
        };
        let env = MemoryEnvironment::new();
        let view = RecordingView::new();
        let (_tx, rx) = mpsc::channel(8);

        let mut client = GameClient::new(config, view.clone(), env.clone(), rx);
        let result = client.run().await;

        assert!(matches!(result, Err(ClientError::Negotiation(_))));
        assert_eq!(env.navigations(), vec![HOME_ROUTE.to_string()]);
        assert_eq!(env.alerts().len(), 1);
        assert!(matches!(view.events()[0], DisplayEvent::Alert(_)));
    }
}
