//! Rate counters and last-seen signal values for telemetry.

use crate::config::STATS_INTERVAL;
use crate::time::Instant;

/// Counts events and converts them into a per-`STATS_INTERVAL` rate.
#[derive(Debug, Clone, Copy, Default)]
pub struct RateCounter {
    count: u32,
    rate: u32,
    window_start: Instant,
}

impl RateCounter {
    pub fn increment(&mut self) {
        self.count += 1;
    }

    /// Roll the window over if `STATS_INTERVAL` has elapsed since it
    /// started, latching the completed window's count as the new rate.
    pub fn tick(&mut self, now: Instant) {
        if now - self.window_start >= STATS_INTERVAL {
            self.rate = self.count;
            self.count = 0;
            self.window_start = now;
        }
    }

    pub fn rate(&self) -> u32 {
        self.rate
    }
}

/// The pair of anchor ids a log viewer is currently watching. Tracked
/// scalars are reset whenever this changes so a viewer never sees a stale
/// number left over from a previously focused anchor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FocusAnchors {
    ids: Option<(u8, u8)>,
}

/// Rate counters and last-seen scalars for the engine's telemetry surface.
#[derive(Debug, Clone, Copy, Default)]
pub struct Stats {
    pub packets_received: RateCounter,
    pub packets_to_estimator: RateCounter,
    pub clock_correction_accepted: RateCounter,
    pub context_hit: RateCounter,
    pub context_miss: RateCounter,
    pub good_time: RateCounter,
    pub suitable_peer: RateCounter,

    focus: FocusAnchors,
    pub clock_correction: f64,
    pub tof: u64,
    pub tdoa: f64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tick(&mut self, now: Instant) {
        self.packets_received.tick(now);
        self.packets_to_estimator.tick(now);
        self.clock_correction_accepted.tick(now);
        self.context_hit.tick(now);
        self.context_miss.tick(now);
        self.good_time.tick(now);
        self.suitable_peer.tick(now);
    }

    /// Change which anchor pair is being watched. Resets the tracked
    /// scalars if the pair actually changed.
    pub fn set_focus(&mut self, ids: (u8, u8)) {
        if self.focus.ids != Some(ids) {
            self.focus.ids = Some(ids);
            self.clock_correction = 0.0;
            self.tof = 0;
            self.tdoa = 0.0;
        }
    }

    pub fn focus(&self) -> Option<(u8, u8)> {
        self.focus.ids
    }
}
