//! Bounded associative storage of anchor records.
//!
//! Anchor records are owned by a single fixed-capacity `heapless::Vec`. A
//! "context" (`AnchorCtx`) is just the index of a record plus the type
//! system's guarantee that it was handed out by this storage; it is never
//! retained across packets and carries no lifetime, so the engine can hold
//! two of them live at once (current anchor + selected peer) without
//! fighting the borrow checker.

use heapless::Vec;

use crate::clock::ClockCorrectionStorage;
use crate::config::{
    ANCHOR_POSITION_VALIDITY, N_STORAGE, REMOTE_ANCHOR_DATA_COUNT, REMOTE_RX_VALIDITY,
    REMOTE_TOF_VALIDITY,
};
use crate::time::Instant;

/// A short-lived handle into `AnchorStorage`, returned by `get`/
/// `get_or_create`. Never outlives the packet being processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnchorCtx(usize);

/// An anchor's known 3-D position, valid for `ANCHOR_POSITION_VALIDITY`
/// after `timestamp`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub timestamp: Instant,
}

#[derive(Debug, Clone, Copy)]
struct RemoteRxEntry {
    id: u8,
    rx_time: u64,
    seq_nr: u8,
    end_of_life: Instant,
}

#[derive(Debug, Clone, Copy)]
struct RemoteTofEntry {
    id: u8,
    tof: u64,
    end_of_life: Instant,
}

/// One tracked anchor's full record: last-seen timestamps, clock
/// correction, position, and the remote-data sub-caches it has overheard
/// from other anchors' range packets.
#[derive(Debug, Clone)]
pub struct AnchorRecord {
    pub id: u8,
    pub last_update: Instant,
    pub rx_time: u64,
    pub tx_time: u64,
    pub seq_nr: u8,
    /// Set once this record has a real previous `(rx_time, tx_time)` pair
    /// to diff against; `false` right after creation, when `rx_time`/
    /// `tx_time` are just zeroed placeholders rather than an actual sample.
    pub has_sample: bool,
    pub clock_correction: ClockCorrectionStorage,
    position: Option<Position>,
    remote_rx: Vec<RemoteRxEntry, REMOTE_ANCHOR_DATA_COUNT>,
    remote_tof: Vec<RemoteTofEntry, REMOTE_ANCHOR_DATA_COUNT>,
}

impl AnchorRecord {
    fn new(id: u8, now: Instant) -> Self {
        AnchorRecord {
            id,
            last_update: now,
            rx_time: 0,
            tx_time: 0,
            seq_nr: 0,
            has_sample: false,
            clock_correction: ClockCorrectionStorage::default(),
            position: None,
            remote_rx: Vec::new(),
            remote_tof: Vec::new(),
        }
    }

    /// Store the `(rx_tag, tx_anchor, seq_nr)` triple of the packet just
    /// processed, making this record usable as a clock-update baseline for
    /// the anchor's next packet.
    pub fn persist(&mut self, rx_time: u64, tx_time: u64, seq_nr: u8, now: Instant) {
        self.rx_time = rx_time;
        self.tx_time = tx_time;
        self.seq_nr = seq_nr;
        self.has_sample = true;
        self.last_update = now;
    }

    pub fn set_position(&mut self, x: f32, y: f32, z: f32, now: Instant) {
        self.position = Some(Position {
            x,
            y,
            z,
            timestamp: now,
        });
    }

    pub fn position(&self, now: Instant) -> Option<Position> {
        self.position
            .filter(|p| p.timestamp + ANCHOR_POSITION_VALIDITY > now)
    }

    pub fn set_remote_rx(&mut self, remote_id: u8, rx_time: u64, seq_nr: u8, now: Instant) {
        let end_of_life = now + REMOTE_RX_VALIDITY;
        if let Some(entry) = self.remote_rx.iter_mut().find(|e| e.id == remote_id) {
            entry.rx_time = rx_time;
            entry.seq_nr = seq_nr;
            entry.end_of_life = end_of_life;
            return;
        }
        let entry = RemoteRxEntry {
            id: remote_id,
            rx_time,
            seq_nr,
            end_of_life,
        };
        if self.remote_rx.push(entry).is_err() {
            let oldest = Self::oldest_index(self.remote_rx.iter().map(|e| e.end_of_life));
            self.remote_rx[oldest] = entry;
        }
    }

    pub fn get_remote_rx(&self, remote_id: u8, now: Instant) -> Option<(u64, u8)> {
        self.remote_rx
            .iter()
            .find(|e| e.id == remote_id && e.end_of_life > now)
            .map(|e| (e.rx_time, e.seq_nr))
    }

    /// All non-expired `(id, seq_nr)` pairs this anchor has reported
    /// hearing from other anchors, in storage order.
    pub fn list_remote_seq(&self, now: Instant, out: &mut Vec<(u8, u8), REMOTE_ANCHOR_DATA_COUNT>) {
        out.clear();
        for e in self.remote_rx.iter().filter(|e| e.end_of_life > now) {
            let _ = out.push((e.id, e.seq_nr));
        }
    }

    pub fn set_remote_tof(&mut self, remote_id: u8, tof: u64, now: Instant) {
        let end_of_life = now + REMOTE_TOF_VALIDITY;
        if let Some(entry) = self.remote_tof.iter_mut().find(|e| e.id == remote_id) {
            entry.tof = tof;
            entry.end_of_life = end_of_life;
            return;
        }
        let entry = RemoteTofEntry {
            id: remote_id,
            tof,
            end_of_life,
        };
        if self.remote_tof.push(entry).is_err() {
            let oldest = Self::oldest_index(self.remote_tof.iter().map(|e| e.end_of_life));
            self.remote_tof[oldest] = entry;
        }
    }

    pub fn get_remote_tof(&self, remote_id: u8, now: Instant) -> Option<u64> {
        self.remote_tof
            .iter()
            .find(|e| e.id == remote_id && e.end_of_life > now)
            .map(|e| e.tof)
    }

    fn oldest_index(lives: impl Iterator<Item = Instant>) -> usize {
        lives
            .enumerate()
            .min_by_key(|(_, eol)| eol.total_millis())
            .map(|(i, _)| i)
            .unwrap_or(0)
    }
}

/// Fixed-capacity store of `N_STORAGE` anchor records, evicting the
/// least-recently-updated record when full.
#[derive(Debug)]
pub struct AnchorStorage {
    anchors: Vec<AnchorRecord, N_STORAGE>,
}

impl Default for AnchorStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl AnchorStorage {
    pub fn new() -> Self {
        AnchorStorage {
            anchors: Vec::new(),
        }
    }

    /// Find the record for `id`, creating it if it isn't tracked yet. If
    /// storage is full, the least-recently-updated record is evicted
    /// (zeroed and reseated with the new id). Returns the context and
    /// whether an existing record was found.
    pub fn get_or_create(&mut self, id: u8, now: Instant) -> (AnchorCtx, bool) {
        if let Some(i) = self.anchors.iter().position(|a| a.id == id) {
            return (AnchorCtx(i), true);
        }
        if self.anchors.len() < self.anchors.capacity() {
            // push() cannot fail: we just checked len() < capacity().
            let _ = self.anchors.push(AnchorRecord::new(id, now));
            return (AnchorCtx(self.anchors.len() - 1), false);
        }
        let evict = AnchorRecord::oldest_index(self.anchors.iter().map(|a| a.last_update));
        self.anchors[evict] = AnchorRecord::new(id, now);
        (AnchorCtx(evict), false)
    }

    pub fn get(&self, id: u8) -> Option<AnchorCtx> {
        self.anchors.iter().position(|a| a.id == id).map(AnchorCtx)
    }

    pub fn record(&self, ctx: AnchorCtx) -> &AnchorRecord {
        &self.anchors[ctx.0]
    }

    pub fn record_mut(&mut self, ctx: AnchorCtx) -> &mut AnchorRecord {
        &mut self.anchors[ctx.0]
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    /// Enumerate tracked anchor ids, up to `buf.len()`. Returns the count
    /// written.
    pub fn list_ids(&self, buf: &mut [u8]) -> usize {
        let n = self.anchors.len().min(buf.len());
        for (slot, anchor) in buf.iter_mut().zip(self.anchors.iter()).take(n) {
            *slot = anchor.id;
        }
        n
    }

    /// As `list_ids`, but only anchors updated within
    /// `ACTIVE_ANCHOR_VALIDITY` of `now`.
    pub fn list_active_ids(&self, buf: &mut [u8], now: Instant) -> usize {
        let mut n = 0;
        for anchor in self.anchors.iter() {
            if n >= buf.len() {
                break;
            }
            if now - anchor.last_update < crate::config::ACTIVE_ANCHOR_VALIDITY {
                buf[n] = anchor.id;
                n += 1;
            }
        }
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_reuses_existing_record() {
        let mut s = AnchorStorage::new();
        let (ctx1, found1) = s.get_or_create(3, Instant::from_millis(10));
        assert!(!found1);
        let (ctx2, found2) = s.get_or_create(3, Instant::from_millis(20));
        assert!(found2);
        assert_eq!(ctx1, ctx2);
    }

    #[test]
    fn storage_cap_never_exceeded() {
        let mut s = AnchorStorage::new();
        for id in 0..(N_STORAGE as u32 + 8) {
            s.get_or_create(id as u8, Instant::from_millis(id as u64));
            assert!(s.len() <= N_STORAGE);
        }
    }

    #[test]
    fn eviction_drops_oldest_first() {
        let mut s = AnchorStorage::new();
        for id in 0..N_STORAGE as u8 {
            s.get_or_create(id, Instant::from_millis(100 + id as u64));
        }
        // id 8 arrives after all N_STORAGE slots are full, at a strictly
        // later time than every existing entry.
        let now = Instant::from_millis(100 + N_STORAGE as u64);
        s.get_or_create(N_STORAGE as u8, now);

        assert!(s.get(0).is_none(), "oldest id should have been evicted");
        assert!(s.get(N_STORAGE as u8).is_some(), "new id should be present");
        for id in 1..N_STORAGE as u8 {
            assert!(s.get(id).is_some(), "id {id} should still be present");
        }
    }

    #[test]
    fn remote_rx_expires() {
        let mut s = AnchorStorage::new();
        let (ctx, _) = s.get_or_create(1, Instant::from_millis(0));
        s.record_mut(ctx)
            .set_remote_rx(2, 12345, 7, Instant::from_millis(0));
        assert!(s.record(ctx).get_remote_rx(2, Instant::from_millis(29)).is_some());
        assert!(s.record(ctx).get_remote_rx(2, Instant::from_millis(31)).is_none());
    }

    #[test]
    fn position_expires_after_two_seconds() {
        let mut s = AnchorStorage::new();
        let (ctx, _) = s.get_or_create(1, Instant::from_millis(0));
        s.record_mut(ctx).set_position(1.0, 2.0, 3.0, Instant::from_millis(0));
        assert!(s.record(ctx).position(Instant::from_millis(1999)).is_some());
        assert!(s.record(ctx).position(Instant::from_millis(2001)).is_none());
    }
}
