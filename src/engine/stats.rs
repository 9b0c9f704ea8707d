//! Search statistics.
//
//  This Source Code Form is subject to the terms of the Mozilla Public
//  License, v. 2.0. If a copy of the MPL was not distributed with this
//  file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
////////////////////////////////////////////////////////////////////////////////////////////////////
use std::sync::atomic::{AtomicI64, Ordering};

////////////////////////////////////////////////////////////////////////////////////////////////////
/// A snapshot of the running search counters, as delivered in stats notifications.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// How many times minimax was entered.
    pub nodes: i64,
    /// Nodes excluding quiescence.
    pub non_q_nodes: i64,
    /// How many times move generation ran.
    pub move_gen_nodes: i64,
    /// Transposition hits that returned immediately.
    pub hash_hit_good: i64,
    /// Writes to a previously unused (or differently aged) transposition entry.
    pub hash_wrote_new: i64,
}

////////////////////////////////////////////////////////////////////////////////////////////////////
/// The live counters, shared by every thinker in a search.
///
/// These are not exact: the threads bump them with relaxed atomics and nobody reconciles. The
/// values are displayed, and the node count gates `maxNodes`, neither of which needs
/// precision.
#[derive(Debug, Default)]
#[allow(missing_docs)] // the fields mirror `EngineStats`
pub struct SharedStats {
    pub nodes: AtomicI64,
    pub non_q_nodes: AtomicI64,
    pub move_gen_nodes: AtomicI64,
    pub hash_hit_good: AtomicI64,
    pub hash_wrote_new: AtomicI64,
}

impl SharedStats {
    /// Creates zeroed counters.
    pub fn new() -> SharedStats {
        SharedStats::default()
    }

    /// Bumps a counter. A load-and-store rather than an atomic increment: exactness is not
    /// worth the bus traffic at every node.
    #[inline]
    pub fn bump(counter: &AtomicI64) {
        counter.store(counter.load(Ordering::Relaxed) + 1, Ordering::Relaxed);
    }

    /// Zeroes every counter (done at the start of each think).
    pub fn clear(&self) {
        self.nodes.store(0, Ordering::Relaxed);
        self.non_q_nodes.store(0, Ordering::Relaxed);
        self.move_gen_nodes.store(0, Ordering::Relaxed);
        self.hash_hit_good.store(0, Ordering::Relaxed);
        self.hash_wrote_new.store(0, Ordering::Relaxed);
    }

    /// Copies the counters into a plain value for a notification.
    pub fn snapshot(&self) -> EngineStats {
        EngineStats {
            nodes: self.nodes.load(Ordering::Relaxed),
            non_q_nodes: self.non_q_nodes.load(Ordering::Relaxed),
            move_gen_nodes: self.move_gen_nodes.load(Ordering::Relaxed),
            hash_hit_good: self.hash_hit_good.load(Ordering::Relaxed),
            hash_wrote_new: self.hash_wrote_new.load(Ordering::Relaxed),
        }
    }
}
