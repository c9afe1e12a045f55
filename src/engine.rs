//! Packet ingress, clock-correction update, peer selection and TDoA
//! arithmetic, the core of the ranging engine.

use log::trace;

use crate::anchor_time::wrap_sub;
use crate::config::{DEFAULT_TDOA_STDDEV, HEIGHT_STDDEV, SPEED_OF_LIGHT, UWB_TS_FREQ};
use crate::estimator::{Estimator, EstimatorKind, Measurement, TdoaMeasurement};
use crate::matching::{select_peer, MatchingAlgorithm};
use crate::storage::{AnchorCtx, AnchorStorage};
use crate::stats::Stats;
use crate::time::Instant;
use crate::wire::tdoa2::Packet as Tdoa2Packet;

/// The TDoA ranging engine: anchor storage, the chosen matching
/// algorithm, and the estimator capability measurements are enqueued
/// into, all threaded through one aggregate rather than living as module
/// globals.
pub struct TdoaEngine<E: Estimator> {
    storage: AnchorStorage,
    algorithm: MatchingAlgorithm,
    random_offset: usize,
    estimator_kind: EstimatorKind,
    estimator: E,
    stddev: f64,
    stats: Stats,
}

impl<E: Estimator> TdoaEngine<E> {
    pub fn new(algorithm: MatchingAlgorithm, estimator_kind: EstimatorKind, estimator: E) -> Self {
        TdoaEngine {
            storage: AnchorStorage::new(),
            algorithm,
            random_offset: 0,
            estimator_kind,
            estimator,
            stddev: DEFAULT_TDOA_STDDEV,
            stats: Stats::new(),
        }
    }

    pub fn storage(&self) -> &AnchorStorage {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut AnchorStorage {
        &mut self.storage
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut Stats {
        &mut self.stats
    }

    /// Runtime override of the per-measurement standard deviation
    /// (the `stddev` parameter).
    pub fn set_stddev(&mut self, stddev: f64) {
        self.stddev = stddev;
    }

    pub fn stddev(&self) -> f64 {
        self.stddev
    }

    /// Fold a received TDoA2 packet's other-anchor timestamps and
    /// times-of-flight into `ctx`'s remote-data sub-caches, skipping the
    /// sender's own slot.
    pub fn update_remote_data(&mut self, ctx: AnchorCtx, packet: &Tdoa2Packet<&[u8]>, sender_id: u8, now: Instant) {
        let record = self.storage.record_mut(ctx);
        for i in 0..crate::config::TDOA2_ANCHOR_COUNT {
            if i == sender_id as usize {
                continue;
            }
            let ts = packet.timestamp(i);
            if ts != 0 {
                record.set_remote_rx(i as u8, ts, packet.seq_nr(i), now);
            }
            let dist = packet.distance(i);
            if dist != 0 {
                record.set_remote_tof(i as u8, dist as u64, now);
            }
        }
    }

    /// Process one packet received from the anchor identified by `ctx`,
    /// forming and emitting a TDoA measurement when possible. Returns the
    /// measurement for telemetry/testing purposes even though it has
    /// already been handed to the estimator.
    pub fn process_packet(
        &mut self,
        ctx: AnchorCtx,
        tx_anchor: u64,
        rx_tag: u64,
        now: Instant,
    ) -> Option<TdoaMeasurement> {
        self.process_packet_filtered(ctx, tx_anchor, rx_tag, now, None)
    }

    /// As `process_packet`, but never selects `exclude` as the peer.
    pub fn process_packet_filtered(
        &mut self,
        ctx: AnchorCtx,
        tx_anchor: u64,
        rx_tag: u64,
        now: Instant,
        exclude: Option<u8>,
    ) -> Option<TdoaMeasurement> {
        self.stats.packets_received.increment();

        if !self.update_clock_correction(ctx, tx_anchor, rx_tag) {
            return None;
        }
        self.stats.clock_correction_accepted.increment();
        self.stats.good_time.increment();

        let peer_ctx = select_peer(
            self.algorithm,
            &mut self.storage,
            ctx,
            &mut self.random_offset,
            now,
            exclude,
        )?;
        self.stats.suitable_peer.increment();

        let measurement = self.compute_tdoa(ctx, peer_ctx, tx_anchor, rx_tag, now)?;

        self.estimator.enqueue(Measurement::Tdoa(measurement));
        self.stats.packets_to_estimator.increment();
        if let EstimatorKind::TwoD { height } = self.estimator_kind {
            self.estimator.enqueue(Measurement::AbsoluteHeight {
                height,
                std_dev: HEIGHT_STDDEV,
            });
        }

        self.stats.tdoa = measurement.distance_diff;
        Some(measurement)
    }

    /// Feed the clock-correction filter from the delta between this
    /// packet and the previous one stored for the same anchor. Returns
    /// whether the sample was reliable enough to proceed.
    fn update_clock_correction(&mut self, ctx: AnchorCtx, tx_anchor: u64, rx_tag: u64) -> bool {
        let record = self.storage.record(ctx);
        if !record.has_sample {
            // No previous sample to diff against yet; this is the
            // anchor's first packet.
            return false;
        }
        let delta_tx = wrap_sub(tx_anchor, record.tx_time);
        if delta_tx == 0 {
            // Degenerate candidate: the anchor clock didn't advance
            // between samples. Skip without touching the filter.
            return false;
        }
        let delta_rx = wrap_sub(rx_tag, record.rx_time);
        let candidate = delta_rx as f64 / delta_tx as f64;

        let reliable = self
            .storage
            .record_mut(ctx)
            .clock_correction
            .update(candidate);
        self.stats.clock_correction = self.storage.record(ctx).clock_correction.correction();
        reliable
    }

    fn compute_tdoa(
        &self,
        ctx: AnchorCtx,
        peer_ctx: AnchorCtx,
        tx_anchor: u64,
        rx_tag: u64,
        now: Instant,
    ) -> Option<TdoaMeasurement> {
        let current_id = self.storage.record(ctx).id;
        let peer_id = self.storage.record(peer_ctx).id;

        let rx_r_tag = self.storage.record(peer_ctx).rx_time;
        let (rx_r_by_a, _seq) = self.storage.record(ctx).get_remote_rx(peer_id, now)?;
        let tof_ra = self.storage.record(ctx).get_remote_tof(peer_id, now)?;
        let c = self.storage.record(ctx).clock_correction.correction();

        let delta_tx_r_to_a = tof_ra as f64 + wrap_sub(tx_anchor, rx_r_by_a) as f64;
        let gap = wrap_sub(rx_tag, rx_r_tag) as f64;
        let tdoa_ticks = gap - delta_tx_r_to_a * c;
        let distance_diff = SPEED_OF_LIGHT * tdoa_ticks / UWB_TS_FREQ;

        let pos_current = self.storage.record(ctx).position(now)?;
        let pos_peer = self.storage.record(peer_ctx).position(now)?;

        trace!(
            "tdoa {}<-{}: ticks={:.1} dist_diff={:.4}m c={:.8}",
            current_id,
            peer_id,
            tdoa_ticks,
            distance_diff,
            c
        );

        Some(TdoaMeasurement {
            anchor_ids: [peer_id, current_id],
            positions: [pos_peer.into(), pos_current.into()],
            distance_diff,
            std_dev: self.stddev,
        })
    }

    /// The clock-correction filter's current estimate for anchor `id`.
    pub fn anchor_clock_correction(&self, id: u8) -> Option<f64> {
        self.storage
            .get(id)
            .map(|ctx| self.storage.record(ctx).clock_correction.correction())
    }

    /// Last distance difference this engine computed with `id` as the
    /// reporting anchor, for telemetry.
    pub fn anchor_distance_diff(&self, id: u8) -> Option<f64> {
        if self.stats.focus().map(|(reporting, _)| reporting) == Some(id) {
            Some(self.stats.tdoa)
        } else {
            None
        }
    }

    /// Most recent time-of-flight anchor `id` has reported toward `peer`,
    /// converted to metres, if still within the remote-tof validity window.
    pub fn anchor_distance(&self, id: u8, peer: u8, now: Instant) -> Option<f64> {
        let ctx = self.storage.get(id)?;
        let ticks = self.storage.record(ctx).get_remote_tof(peer, now)?;
        Some(SPEED_OF_LIGHT * ticks as f64 / UWB_TS_FREQ)
    }
}
