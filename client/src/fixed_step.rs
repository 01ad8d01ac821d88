//! Render-decoupled fixed-step scheduling

use log::debug;
use std::time::Duration;
use tokio::time::{interval, Instant, Interval, MissedTickBehavior};

/// Per-wake-up callbacks driven by [`FixedStepLoop`]
pub trait FrameHandler {
    /// One simulation tick of exactly `dt`
    fn update(&mut self, dt: Duration);
    /// Called once per wake-up after all ticks ran
    fn render(&mut self);
}

/// What a single wake-up did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WakeReport {
    pub ticks: u32,
    /// Simulation time discarded by the catch-up cap
    pub dropped: Duration,
}

pub struct FixedStepLoop {
    fixed_step: Duration,
    accumulated: Duration,
    max_catch_up: Option<u32>,
    last_wake: Option<Instant>,
}

impl FixedStepLoop {
    /// `max_catch_up` bounds ticks per wake-up; `None` drains everything.
    pub fn new(fixed_step: Duration, max_catch_up: Option<u32>) -> Self {
        Self {
            fixed_step: fixed_step.max(Duration::from_nanos(1)),
            accumulated: Duration::ZERO,
            max_catch_up,
            last_wake: None,
        }
    }

    pub fn fixed_step(&self) -> Duration {
        self.fixed_step
    }

    pub fn accumulated(&self) -> Duration {
        self.accumulated
    }

    pub fn is_running(&self) -> bool {
        self.last_wake.is_some()
    }

    pub fn start(&mut self, now: Instant) {
        self.accumulated = Duration::ZERO;
        self.last_wake = Some(now);
    }

    pub fn stop(&mut self) {
        self.last_wake = None;
    }

    /// Scheduler wake-up at `now`. Does nothing once stopped.
    pub fn wake<H: FrameHandler>(&mut self, now: Instant, handler: &mut H) -> WakeReport {
        let Some(last) = self.last_wake else {
            return WakeReport::default();
        };
        self.last_wake = Some(now);
        self.advance(now.saturating_duration_since(last), handler)
    }

    /// Adds `elapsed` to the accumulator and drains it in fixed ticks, then
    /// renders once.
    pub fn advance<H: FrameHandler>(&mut self, elapsed: Duration, handler: &mut H) -> WakeReport {
        self.accumulated += elapsed;
        let mut report = WakeReport::default();

        while self.accumulated >= self.fixed_step {
            if self.max_catch_up.is_some_and(|cap| report.ticks >= cap) {
                let remainder = self.remainder();
                report.dropped = self.accumulated - remainder;
                self.accumulated = remainder;
                debug!(
                    "Catch-up capped at {} ticks, dropped {:?}",
                    report.ticks, report.dropped
                );
                break;
            }
            handler.update(self.fixed_step);
            self.accumulated -= self.fixed_step;
            report.ticks += 1;
        }

        handler.render();
        report
    }

    fn remainder(&self) -> Duration {
        let step = self.fixed_step.as_nanos();
        Duration::from_nanos((self.accumulated.as_nanos() % step) as u64)
    }
}

/// Wake-up source for the loop. Clearing the handle stops scheduling.
pub struct FrameScheduler {
    handle: Option<Interval>,
}

impl FrameScheduler {
    pub fn new(period: Duration) -> Self {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            handle: Some(ticker),
        }
    }

    pub fn is_scheduled(&self) -> bool {
        self.handle.is_some()
    }

    pub fn stop(&mut self) {
        self.handle = None;
    }

    /// Resolves on the next frame, or never once stopped.
    pub async fn next_frame(&mut self) -> Instant {
        match self.handle.as_mut() {
            Some(ticker) => ticker.tick().await,
            None => std::future::pending().await,
        }
    }
}
