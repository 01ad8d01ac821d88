//! What the session exposes to whoever draws it.

use crate::latency::LatencySample;
use shared::{LobbyStatus, PlayerId, Scores};
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaddleView {
    pub player_id: PlayerId,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub color: u32,
    pub local: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BallView {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
}

/// Everything needed to draw one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderFrame {
    pub paddles: Vec<PaddleView>,
    pub ball: Option<BallView>,
    pub scores: Scores,
    pub countdown: Option<i64>,
    pub status: Option<LobbyStatus>,
    pub round_trip: Option<Duration>,
    pub slow_connection: bool,
    /// Recent heartbeat samples, oldest first
    pub latency: Vec<LatencySample>,
    pub finished: bool,
}

/// Side effects for the UI layer, emitted only when something changed.
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayEvent {
    ScoreChanged(Scores),
    Countdown(i64),
    ConnectionQuality { slow: bool, round_trip: Duration },
    StatusChanged(LobbyStatus),
    Alert(String),
}

pub trait GameView: Send {
    /// Called once per scheduler wake-up.
    fn render(&mut self, frame: &RenderFrame);
    fn on_display(&mut self, event: DisplayEvent);
}

/// Hands frames to a renderer living on another thread. Only the latest frame
/// matters, so a `watch` channel is enough; display events go alongside.
pub struct ChannelView {
    frames: watch::Sender<RenderFrame>,
    events: tokio::sync::mpsc::UnboundedSender<DisplayEvent>,
}

impl ChannelView {
    pub fn new(
        frames: watch::Sender<RenderFrame>,
        events: tokio::sync::mpsc::UnboundedSender<DisplayEvent>,
    ) -> Self {
        Self { frames, events }
    }
}

impl GameView for ChannelView {
    fn render(&mut self, frame: &RenderFrame) {
        self.frames.send_if_modified(|current| {
            if current == frame {
                return false;
            }
            *current = frame.clone();
            true
        });
    }

    fn on_display(&mut self, event: DisplayEvent) {
        let _ = self.events.send(event);
    }
}

/// Keeps everything it is shown. Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct RecordingView {
    inner: std::sync::Arc<std::sync::Mutex<Recorded>>,
}

#[derive(Debug, Default)]
struct Recorded {
    frames: usize,
    last_frame: Option<RenderFrame>,
    events: Vec<DisplayEvent>,
}

impl RecordingView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames_rendered(&self) -> usize {
        self.with(|r| r.frames)
    }

    pub fn last_frame(&self) -> Option<RenderFrame> {
        self.with(|r| r.last_frame.clone())
    }

    pub fn events(&self) -> Vec<DisplayEvent> {
        self.with(|r| r.events.clone())
    }

    fn with<R>(&self, f: impl FnOnce(&mut Recorded) -> R) -> R {
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

impl GameView for RecordingView {
    fn render(&mut self, frame: &RenderFrame) {
        self.with(|r| {
            r.frames += 1;
            r.last_frame = Some(frame.clone());
        });
    }

    fn on_display(&mut self, event: DisplayEvent) {
        self.with(|r| r.events.push(event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_view_publishes_latest_frame() {
        let (frames_tx, frames_rx) = watch::channel(RenderFrame::default());
        let (events_tx, mut events_rx) = tokio::sync::mpsc::unbounded_channel();
        let mut view = ChannelView::new(frames_tx, events_tx);

        let frame = RenderFrame {
            countdown: Some(3),
            ..RenderFrame::default()
        };
        view.render(&frame);
        view.on_display(DisplayEvent::Countdown(3));

        assert_eq!(frames_rx.borrow().countdown, Some(3));
        assert_eq!(events_rx.try_recv().unwrap(), DisplayEvent::Countdown(3));
    }

    #[test]
    fn test_recording_view_counts_frames() {
        let view = RecordingView::new();
        let mut owned = view.clone();
        owned.render(&RenderFrame::default());
        owned.render(&RenderFrame::default());
        assert_eq!(view.frames_rendered(), 2);
    }
}
