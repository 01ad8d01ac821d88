//! Round-trip history graph drawn over the playfield

use crate::latency::LatencySample;
use macroquad::prelude::*;
use std::collections::VecDeque;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Sample {
    rtt_ms: f32,
    slow: bool,
}

pub struct LatencyGraph {
    samples: VecDeque<Sample>,
    max_samples: usize,
    // Frames repeat the same ring; only samples newer than this are added
    last_seq: Option<u64>,

    graph_width: f32,
    graph_height: f32,
    visible: bool,
    padding: f32,

    slow_threshold_ms: f32,
    scale_max: f32,
}

impl LatencyGraph {
    pub fn new(slow_threshold: Duration) -> Self {
        let slow_threshold_ms = slow_threshold.as_millis() as f32;
        Self {
            samples: VecDeque::new(),
            max_samples: 60,
            last_seq: None,

            graph_width: 240.0,
            graph_height: 90.0,
            visible: false,
            padding: 10.0,

            slow_threshold_ms,
            scale_max: slow_threshold_ms * 1.5,
        }
    }

    pub fn toggle_visibility(&mut self) {
        self.visible = !self.visible;
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn scale_max(&self) -> f32 {
        self.scale_max
    }

    /// Feeds the sample ring carried by the latest frame
    pub fn record_samples(&mut self, samples: &[LatencySample]) {
        let fresh: Vec<&LatencySample> = samples
            .iter()
            .filter(|s| self.last_seq.map_or(true, |last| s.seq > last))
            .collect();
        let Some(newest) = fresh.last() else {
            return;
        };
        self.last_seq = Some(newest.seq);

        for sample in fresh {
            self.samples.push_back(Sample {
                rtt_ms: sample.round_trip.as_millis() as f32,
                slow: sample.slow,
            });
        }
        while self.samples.len() > self.max_samples {
            self.samples.pop_front();
        }

        let peak = self.samples.iter().map(|s| s.rtt_ms).fold(0.0f32, f32::max);
        // Always leave room for the threshold line
        let desired = (peak * 1.2).max(self.slow_threshold_ms * 1.5);
        self.scale_max = self.scale_max * 0.8 + desired * 0.2;
    }

    /// Draws in the top-right corner
    pub fn render(&self) {
        if !self.visible || self.samples.len() < 2 {
            return;
        }

        let x = screen_width() - self.graph_width - 20.0;
        let y = 20.0;
        let inner_w = self.graph_width - self.padding * 2.0;
        let inner_h = self.graph_height - self.padding * 2.0;

        draw_rectangle(
            x,
            y,
            self.graph_width,
            self.graph_height,
            Color::from_rgba(0, 0, 0, 200),
        );
        draw_rectangle_lines(
            x,
            y,
            self.graph_width,
            self.graph_height,
            1.0,
            Color::from_rgba(120, 120, 120, 255),
        );

        let left = x + self.padding;
        let bottom = y + self.padding + inner_h;
        let y_for = |ms: f32| bottom - (ms / self.scale_max).min(1.0) * inner_h;

        let threshold_y = y_for(self.slow_threshold_ms);
        draw_line(left, threshold_y, left + inner_w, threshold_y, 1.0, ORANGE);

        let step = inner_w / (self.max_samples - 1) as f32;
        for (i, pair) in self.samples.iter().collect::<Vec<_>>().windows(2).enumerate() {
            let color = if pair[1].slow { RED } else { GREEN };
            draw_line(
                left + i as f32 * step,
                y_for(pair[0].rtt_ms),
                left + (i + 1) as f32 * step,
                y_for(pair[1].rtt_ms),
                2.0,
                color,
            );
        }

        if let Some(latest) = self.samples.back() {
            draw_text(
                &format!("RTT {:.0}ms (G to hide)", latest.rtt_ms),
                left,
                y + self.graph_height + 14.0,
                12.0,
                WHITE,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(seq: u64, rtt_ms: u64, slow: bool) -> LatencySample {
        LatencySample {
            seq,
            round_trip: Duration::from_millis(rtt_ms),
            observed_at: seq * 1000,
            slow,
        }
    }

    #[test]
    fn test_equal_round_trips_recorded_per_sample() {
        let mut graph = LatencyGraph::new(Duration::from_millis(200));
        graph.record_samples(&[]);
        assert!(graph.is_empty());

        let ring = vec![sample(0, 40, false), sample(1, 40, false)];
        graph.record_samples(&ring);
        assert_eq!(graph.len(), 2);

        // Next frame carries the same ring plus one new echo
        let mut ring = ring;
        ring.push(sample(2, 40, false));
        graph.record_samples(&ring);
        graph.record_samples(&ring);
        assert_eq!(graph.len(), 3);
    }

    #[test]
    fn test_history_bounded_and_scale_grows() {
        let mut graph = LatencyGraph::new(Duration::from_millis(200));
        let initial_scale = graph.scale_max();
        for seq in 0..200u64 {
            graph.record_samples(&[sample(seq, 500 + seq, true)]);
        }
        assert_eq!(graph.len(), 60);
        assert!(graph.scale_max() > initial_scale);
    }

    #[test]
    fn test_visibility_toggle() {
        let mut graph = LatencyGraph::new(Duration::from_millis(200));
        assert!(!graph.is_visible());
        graph.toggle_visibility();
        assert!(graph.is_visible());
    }
}
