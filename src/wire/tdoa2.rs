//! The TDoA2 range packet: an anchor's broadcast carrying its own and its
//! neighbours' timestamps, sequence numbers and times-of-flight, plus an
//! optional trailing LPP short payload.

use byteorder::{ByteOrder, LittleEndian};

use super::{Error, Result};
use crate::config::{SEQ_NR_MASK, TDOA2_ANCHOR_COUNT};

pub const PACKET_TYPE_TDOA2: u8 = 0x22;

mod field {
    use crate::wire::field::*;

    pub const TYPE: usize = 0;
    const TS_BASE: usize = 1;
    const TS_SLOT_LEN: usize = 5;
    const TS_BLOCK_LEN: usize = TS_SLOT_LEN * super::TDOA2_ANCHOR_COUNT;
    const SEQ_BASE: usize = TS_BASE + TS_BLOCK_LEN;
    const SEQ_BLOCK_LEN: usize = super::TDOA2_ANCHOR_COUNT;
    const DIST_BASE: usize = SEQ_BASE + SEQ_BLOCK_LEN;
    const DIST_SLOT_LEN: usize = 2;

    pub const HEADER_LEN: usize = DIST_BASE + DIST_SLOT_LEN * super::TDOA2_ANCHOR_COUNT;

    pub const fn timestamp(slot: usize) -> Field {
        TS_BASE + slot * TS_SLOT_LEN..TS_BASE + slot * TS_SLOT_LEN + TS_SLOT_LEN
    }

    pub const fn seq_nr(slot: usize) -> usize {
        SEQ_BASE + slot
    }

    pub const fn distance(slot: usize) -> Field {
        DIST_BASE + slot * DIST_SLOT_LEN..DIST_BASE + slot * DIST_SLOT_LEN + DIST_SLOT_LEN
    }
}

/// Minimum on-wire length of a TDoA2 range packet, excluding any trailing
/// LPP short payload.
pub const HEADER_LEN: usize = field::HEADER_LEN;

/// A read-only wrapper around a TDoA2 range-packet buffer.
#[derive(Debug, Clone, Copy)]
pub struct Packet<T: AsRef<[u8]>> {
    buffer: T,
}

impl<T: AsRef<[u8]>> Packet<T> {
    pub const fn new_unchecked(buffer: T) -> Packet<T> {
        Packet { buffer }
    }

    /// Shorthand for [new_unchecked] and [check_len].
    ///
    /// [new_unchecked]: #method.new_unchecked
    /// [check_len]: #method.check_len
    pub fn new_checked(buffer: T) -> Result<Packet<T>> {
        let packet = Self::new_unchecked(buffer);
        packet.check_len()?;
        Ok(packet)
    }

    pub fn check_len(&self) -> Result<()> {
        if self.buffer.as_ref().len() < HEADER_LEN {
            Err(Error)
        } else {
            Ok(())
        }
    }

    pub fn into_inner(self) -> T {
        self.buffer
    }

    #[inline]
    pub fn packet_type(&self) -> u8 {
        self.buffer.as_ref()[field::TYPE]
    }

    /// 40-bit anchor-clock timestamp transmitted in `slot` (0..8).
    #[inline]
    pub fn timestamp(&self, slot: usize) -> u64 {
        debug_assert!(slot < TDOA2_ANCHOR_COUNT);
        let data = &self.buffer.as_ref()[field::timestamp(slot)];
        let mut bytes = [0u8; 8];
        bytes[..5].copy_from_slice(data);
        LittleEndian::read_u64(&bytes)
    }

    /// The 7-bit sequence number reported in `slot`; the high bit is
    /// unconditionally discarded.
    #[inline]
    pub fn seq_nr(&self, slot: usize) -> u8 {
        debug_assert!(slot < TDOA2_ANCHOR_COUNT);
        self.buffer.as_ref()[field::seq_nr(slot)] & SEQ_NR_MASK
    }

    /// The time-of-flight reported in `slot`, in anchor-clock ticks. `0`
    /// means absent, per the packet format's `isValidTimeStamp` convention.
    #[inline]
    pub fn distance(&self, slot: usize) -> u16 {
        debug_assert!(slot < TDOA2_ANCHOR_COUNT);
        LittleEndian::read_u16(&self.buffer.as_ref()[field::distance(slot)])
    }

    /// Bytes following the fixed TDoA2 header, if any: an optional
    /// trailing LPP short payload.
    #[inline]
    pub fn trailing(&self) -> &[u8] {
        let data = self.buffer.as_ref();
        if data.len() > HEADER_LEN {
            &data[HEADER_LEN..]
        } else {
            &[]
        }
    }
}
