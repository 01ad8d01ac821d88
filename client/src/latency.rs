//! Connection quality classification from heartbeat round trips

use log::{info, warn};
use std::collections::VecDeque;
use std::time::Duration;

const MAX_SAMPLES: usize = 100;

/// One heartbeat round trip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencySample {
    /// Increases by one per echo, so equal round trips stay distinct
    pub seq: u64,
    pub round_trip: Duration,
    /// Local clock in epoch milliseconds when the echo arrived
    pub observed_at: u64,
    /// Connection class after this sample was applied
    pub slow: bool,
}

/// Fired only when the slow flag changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatencyEdge {
    Slow(Duration),
    Recovered(Duration),
}

pub struct LatencyMonitor {
    threshold: Duration,
    // Consecutive samples on the other side of the threshold needed to flip
    debounce: u32,
    streak: u32,
    is_slow: bool,
    next_seq: u64,
    history: VecDeque<LatencySample>,
}

impl LatencyMonitor {
    pub fn new(threshold: Duration) -> Self {
        Self::with_debounce(threshold, 1)
    }

    pub fn with_debounce(threshold: Duration, debounce: u32) -> Self {
        Self {
            threshold,
            debounce: debounce.max(1),
            streak: 0,
            is_slow: false,
            next_seq: 0,
            history: VecDeque::with_capacity(MAX_SAMPLES),
        }
    }

    pub fn is_slow(&self) -> bool {
        self.is_slow
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Records the echo of a heartbeat sent at `sent_at` (both epoch ms) and
    /// returns an edge if the connection changed class.
    pub fn on_heartbeat_echo(&mut self, sent_at: u64, now: u64) -> Option<LatencyEdge> {
        let round_trip = Duration::from_millis(now.saturating_sub(sent_at));
        let edge = self.classify(round_trip);

        let sample = LatencySample {
            seq: self.next_seq,
            round_trip,
            observed_at: now,
            slow: self.is_slow,
        };
        self.next_seq += 1;
        self.record(sample);
        edge
    }

    fn classify(&mut self, round_trip: Duration) -> Option<LatencyEdge> {
        let exceeds = round_trip > self.threshold;
        if exceeds == self.is_slow {
            self.streak = 0;
            return None;
        }

        self.streak += 1;
        if self.streak < self.debounce {
            return None;
        }

        self.streak = 0;
        self.is_slow = exceeds;
        if exceeds {
            warn!("Slow connection: round trip {}ms", round_trip.as_millis());
            Some(LatencyEdge::Slow(round_trip))
        } else {
            info!("Connection recovered: round trip {}ms", round_trip.as_millis());
            Some(LatencyEdge::Recovered(round_trip))
        }
    }

    fn record(&mut self, sample: LatencySample) {
        self.history.push_back(sample);
        while self.history.len() > MAX_SAMPLES {
            self.history.pop_front();
        }
    }

    pub fn history(&self) -> impl Iterator<Item = &LatencySample> {
        self.history.iter()
    }

    pub fn last_round_trip(&self) -> Option<Duration> {
        self.history.back().map(|s| s.round_trip)
    }
}
