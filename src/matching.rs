//! Peer-selection algorithms.
//!
//! The matching algorithm is a compile-time choice dispatched through a
//! tagged enum at the call site, not a trait object; there is exactly one
//! engine per tag and the choice never changes at runtime.

use heapless::Vec;

use crate::config::REMOTE_ANCHOR_DATA_COUNT;
use crate::storage::{AnchorCtx, AnchorStorage};
use crate::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchingAlgorithm {
    /// Round-robins through the candidate list using a per-engine offset
    /// that advances on every selection attempt.
    Random,
    /// Picks the candidate with the most recent `last_update`.
    Youngest,
}

/// Select a reference anchor for `anchor_ctx` to pair with, optionally
/// forbidding `exclude` from being chosen.
///
/// Returns `None` silently whenever no candidate satisfies the freshness
/// and TOF-availability requirements. That is the normal steady state
/// shortly after an anchor becomes visible.
pub(crate) fn select_peer(
    algorithm: MatchingAlgorithm,
    storage: &mut AnchorStorage,
    anchor_ctx: AnchorCtx,
    offset: &mut usize,
    now: Instant,
    exclude: Option<u8>,
) -> Option<AnchorCtx> {
    match algorithm {
        MatchingAlgorithm::Random => select_random(storage, anchor_ctx, offset, now, exclude),
        MatchingAlgorithm::Youngest => select_youngest(storage, anchor_ctx, now, exclude),
    }
}

fn candidate_list(
    storage: &AnchorStorage,
    anchor_ctx: AnchorCtx,
    now: Instant,
) -> Vec<(u8, u8), REMOTE_ANCHOR_DATA_COUNT> {
    let mut out = Vec::new();
    storage.record(anchor_ctx).list_remote_seq(now, &mut out);
    out
}

fn select_random(
    storage: &mut AnchorStorage,
    anchor_ctx: AnchorCtx,
    offset: &mut usize,
    now: Instant,
    exclude: Option<u8>,
) -> Option<AnchorCtx> {
    let seq_list = candidate_list(storage, anchor_ctx, now);
    let n = seq_list.len();
    if n == 0 {
        // Dividing by zero candidates is meaningless; treat it as "no
        // candidates" rather than special-casing the modulo.
        return None;
    }
    *offset = offset.wrapping_add(1);
    let start = *offset % n;

    for i in 0..n {
        let (id, seq_nr) = seq_list[(start + i) % n];
        if Some(id) == exclude {
            continue;
        }
        let (cand_ctx, _found) = storage.get_or_create(id, now);
        if storage.record(cand_ctx).seq_nr != seq_nr {
            continue;
        }
        if storage.record(anchor_ctx).get_remote_tof(id, now).is_none() {
            continue;
        }
        return Some(cand_ctx);
    }
    None
}

fn select_youngest(
    storage: &mut AnchorStorage,
    anchor_ctx: AnchorCtx,
    now: Instant,
    exclude: Option<u8>,
) -> Option<AnchorCtx> {
    let seq_list = candidate_list(storage, anchor_ctx, now);

    let mut best: Option<(AnchorCtx, u64)> = None;
    for (id, seq_nr) in seq_list.iter().copied() {
        if Some(id) == exclude {
            continue;
        }
        let (cand_ctx, _found) = storage.get_or_create(id, now);
        if storage.record(cand_ctx).seq_nr != seq_nr {
            continue;
        }
        if storage.record(anchor_ctx).get_remote_tof(id, now).is_none() {
            continue;
        }
        let last_update = storage.record(cand_ctx).last_update.total_millis();
        let replace = match best {
            Some((_, best_update)) => last_update > best_update,
            None => true,
        };
        if replace {
            best = Some((cand_ctx, last_update));
        }
    }
    best.map(|(ctx, _)| ctx)
}
