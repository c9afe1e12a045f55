//! Compile-time capacities and tuning constants.
//!
//! This is a statically sized embedded engine (see the concurrency and
//! resource model): every constant below is fixed at build time, there is
//! no runtime configuration layer.

use crate::time::Duration;

/// Number of anchor records tracked concurrently. Typical deployments see
/// 8-16 anchors visible at once.
pub const N_STORAGE: usize = 16;

/// Remote-data sub-cache capacity per anchor record; matches the number of
/// anchors that can be addressed at once.
pub const REMOTE_ANCHOR_DATA_COUNT: usize = N_STORAGE;

/// Number of anchor slots carried in a single TDoA2 range packet.
pub const TDOA2_ANCHOR_COUNT: usize = 8;

/// 40-bit anchor-clock timestamp mask.
pub const ANCHOR_TS_MASK: u64 = (1u64 << 40) - 1;

/// 7-bit sequence number mask; the high bit is unused and is
/// unconditionally discarded.
pub const SEQ_NR_MASK: u8 = 0x7f;

// --- Clock-correction filter ---

/// Maximum anchor/tag oscillator deviation the hardware is specified for.
pub const MAX_CLOCK_DEV: f64 = 10e-6;
pub const SPEC_MIN: f64 = 1.0 - 2.0 * MAX_CLOCK_DEV;
pub const SPEC_MAX: f64 = 1.0 + 2.0 * MAX_CLOCK_DEV;
/// Noise gate width around the current correction estimate.
pub const CLOCK_NOISE: f64 = 0.03e-6;
/// Low-pass weight applied to the previous correction estimate.
pub const CLOCK_FILTER: f64 = 0.1;
/// Leaky-bucket ceiling.
pub const BUCKET_MAX: u8 = 4;

// --- Validity windows ---

pub const ANCHOR_POSITION_VALIDITY: Duration = Duration::from_millis(2_000);
pub const REMOTE_RX_VALIDITY: Duration = Duration::from_millis(30);
pub const REMOTE_TOF_VALIDITY: Duration = Duration::from_millis(2_000);
pub const ACTIVE_ANCHOR_VALIDITY: Duration = Duration::from_millis(2_000);

// --- Stats & LPP ---

pub const STATS_INTERVAL: Duration = Duration::from_millis(500);

/// Number of driver events a queued LPP short packet may wait through
/// before being dropped.
pub const LPP_SEND_TIMEOUT: u32 = 10;

/// Maximum payload length of a queued outgoing LPP short packet.
pub const LPP_SHORT_PAYLOAD_MAX: usize = 32;

// --- Physical constants ---

/// Speed of light, m/s.
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// UWB timestamp tick frequency.
pub const UWB_TS_FREQ: f64 = 499.2e6 * 128.0;

/// Default per-measurement standard deviation, metres.
pub const DEFAULT_TDOA_STDDEV: f64 = 0.15;

/// Standard deviation attached to the synthetic 2-D absolute-height
/// measurement.
pub const HEIGHT_STDDEV: f64 = 1e-4;

/// PAN id used for anchor/tag short-address frames.
pub const LOCODECK_PAN_ID: u16 = 0xbccf;

/// Base of the default anchor MAC address scheme: `0xbccf_0000_0000_0000 | id`.
pub const ANCHOR_MAC_BASE: u64 = 0xbccf_0000_0000_0000;

/// Tag's own short address under the default addressing scheme.
pub const TAG_MAC: u64 = 0xbccf_0000_0000_00ff;

/// Derive the default MAC address for an anchor id.
pub const fn anchor_mac(id: u8) -> u64 {
    ANCHOR_MAC_BASE | (id as u64)
}
