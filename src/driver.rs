//! The tag driver: a single-threaded event dispatcher invoked by the radio
//! task. Owns the former module-scope globals (`previousAnchor`, the LPP
//! TX queue, the ranging-state bitmap) as plain fields instead.

use heapless::Vec;
use log::{debug, warn};

use crate::config::{LPP_SEND_TIMEOUT, LPP_SHORT_PAYLOAD_MAX, N_STORAGE, TDOA2_ANCHOR_COUNT};
use crate::estimator::Estimator;
use crate::wire::lpp;
use crate::storage::Position;
use crate::time::Instant;
use crate::wire::tdoa2::Packet as Tdoa2Packet;
use crate::TdoaEngine;

/// Events the radio task dispatches into the driver.
pub enum Event<'a> {
    /// A frame arrived. `anchor_id` is the low byte of the source address
    /// (extracted by the radio collaborator); `rx_tag` is the hardware RX
    /// timestamp; `payload` is the frame body starting at the TDoA2
    /// packet's type byte.
    PacketReceived {
        anchor_id: u8,
        rx_tag: u64,
        payload: &'a [u8],
    },
    ReceiveTimeout,
    ReceiveFailed,
    Timeout,
    PacketSent,
}

/// Capability the driver uses to actually move bytes over the air. The
/// transceiver itself is an external collaborator; this is its narrow
/// surface as seen by the engine.
pub trait Radio {
    fn start_receive(&mut self);
    fn transmit(&mut self, dst_id: u8, payload: &[u8]);
}

struct PendingLpp {
    dst_id: u8,
    kind: u8,
    payload: Vec<u8, LPP_SHORT_PAYLOAD_MAX>,
    attempts: u32,
}

/// Bitmap of anchors currently considered "in range" (bit `a` set iff `a`
/// was updated within the active-anchor validity window).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RangingState(u16);

impl RangingState {
    pub fn is_set(&self, id: u8) -> bool {
        id < 16 && self.0 & (1 << id) != 0
    }

    pub fn bits(&self) -> u16 {
        self.0
    }
}

pub struct TagDriver<E: Estimator, R: Radio> {
    engine: TdoaEngine<E>,
    radio: R,
    pending_lpp: Option<PendingLpp>,
    previous_anchor: Option<u8>,
    ranging_ok: bool,
}

impl<E: Estimator, R: Radio> TagDriver<E, R> {
    pub fn new(engine: TdoaEngine<E>, radio: R) -> Self {
        TagDriver {
            engine,
            radio,
            pending_lpp: None,
            previous_anchor: None,
            ranging_ok: false,
        }
    }

    pub fn engine(&self) -> &TdoaEngine<E> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut TdoaEngine<E> {
        &mut self.engine
    }

    /// Queue an LPP short packet for transmission the next time the radio
    /// has an opportunity to send to `dst_id`. Only one packet is ever
    /// in flight; queueing a new one replaces whatever was pending.
    pub fn queue_lpp_short(&mut self, dst_id: u8, kind: u8, payload: &[u8]) {
        let mut buf: Vec<u8, LPP_SHORT_PAYLOAD_MAX> = Vec::new();
        if buf.extend_from_slice(payload).is_err() {
            warn!("lpp: payload too large to queue for anchor {dst_id}");
            return;
        }
        self.pending_lpp = Some(PendingLpp {
            dst_id,
            kind,
            payload: buf,
            attempts: 0,
        });
    }

    pub fn is_ranging_ok(&self) -> bool {
        self.ranging_ok
    }

    pub fn get_anchor_position(&self, id: u8, now: Instant) -> Option<Position> {
        let ctx = self.engine.storage().get(id)?;
        self.engine.storage().record(ctx).position(now)
    }

    pub fn get_anchor_id_list(&self, buf: &mut [u8]) -> usize {
        self.engine.storage().list_ids(buf)
    }

    pub fn get_active_anchor_id_list(&self, buf: &mut [u8], now: Instant) -> usize {
        self.engine.storage().list_active_ids(buf, now)
    }

    /// Dispatch one radio event, returning the freshly rebuilt
    /// ranging-state bitmap.
    pub fn on_event(&mut self, now: Instant, event: Event) -> RangingState {
        match event {
            Event::PacketReceived {
                anchor_id,
                rx_tag,
                payload,
            } => self.handle_packet_received(now, anchor_id, rx_tag, payload),
            Event::ReceiveTimeout | Event::ReceiveFailed | Event::Timeout => {
                self.handle_transient()
            }
            Event::PacketSent => {}
        }
        self.engine.stats_mut().tick(now);
        self.rebuild_ranging_state(now)
    }

    fn handle_packet_received(&mut self, now: Instant, anchor_id: u8, rx_tag: u64, payload: &[u8]) {
        if anchor_id as usize >= TDOA2_ANCHOR_COUNT {
            debug!("tdoa2: unknown source address, id={anchor_id}");
            return;
        }

        let packet = match Tdoa2Packet::new_checked(payload) {
            Ok(p) => p,
            Err(_) => {
                debug!("tdoa2: malformed packet from anchor {anchor_id}");
                return;
            }
        };
        if packet.packet_type() != crate::wire::PACKET_TYPE_TDOA2 {
            return;
        }
        self.ranging_ok = true;

        if self
            .pending_lpp
            .as_ref()
            .is_some_and(|p| p.dst_id == anchor_id)
        {
            self.flush_pending_lpp(anchor_id);
        } else {
            self.radio.start_receive();
        }

        let (ctx, found) = self.engine.storage_mut().get_or_create(anchor_id, now);
        if found {
            self.engine.stats_mut().context_hit.increment();
        } else {
            self.engine.stats_mut().context_miss.increment();
        }
        self.engine.update_remote_data(ctx, &packet, anchor_id, now);

        let tx_anchor = packet.timestamp(anchor_id as usize);
        let seq_nr = packet.seq_nr(anchor_id as usize);

        let measurement = self.engine.process_packet(ctx, tx_anchor, rx_tag, now);

        self.engine
            .storage_mut()
            .record_mut(ctx)
            .persist(rx_tag, tx_anchor, seq_nr, now);

        let trailing = packet.trailing();
        if let Some(pos) = lpp::parse_anchor_position(trailing) {
            self.engine
                .storage_mut()
                .record_mut(ctx)
                .set_position(pos.x, pos.y, pos.z, now);
        }

        // Observability only: the firmware this engine is modelled on only
        // logs a sequential anchor pair's distance/clock-correction data,
        // to avoid spamming the log with every combination.
        if let (Some(measurement), Some(prev)) = (measurement, self.previous_anchor) {
            if (prev as usize + 1) % TDOA2_ANCHOR_COUNT == anchor_id as usize {
                self.engine.stats_mut().tof =
                    self.engine.storage().record(ctx).get_remote_tof(measurement.anchor_ids[0], now).unwrap_or(0);
            }
        }

        self.previous_anchor = Some(anchor_id);
    }

    fn handle_transient(&mut self) {
        self.radio.start_receive();
        if let Some(pending) = &mut self.pending_lpp {
            pending.attempts += 1;
            if pending.attempts >= LPP_SEND_TIMEOUT {
                self.pending_lpp = None;
            }
        }
    }

    fn flush_pending_lpp(&mut self, anchor_id: u8) {
        if let Some(pending) = self.pending_lpp.take() {
            let mut buf = [0u8; 64];
            if let Some(n) = lpp::build_short_packet(&mut buf, anchor_id, pending.kind, &pending.payload) {
                self.radio.transmit(anchor_id, &buf[..n]);
            }
        }
    }

    fn rebuild_ranging_state(&self, now: Instant) -> RangingState {
        let mut ids = [0u8; N_STORAGE];
        let n = self.engine.storage().list_active_ids(&mut ids, now);
        let mut bits = 0u16;
        for &id in &ids[..n] {
            if id < 16 {
                bits |= 1 << id;
            }
        }
        RangingState(bits)
    }
}
