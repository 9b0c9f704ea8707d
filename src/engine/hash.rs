//! The shared transposition table.
//
//  This Source Code Form is subject to the terms of the Mozilla Public
//  License, v. 2.0. If a copy of the MPL was not distributed with this
//  file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
////////////////////////////////////////////////////////////////////////////////////////////////////
//! An open-addressed array of 24-byte entries, shared by every searching thread. Lookups run
//! lockless through a hash prefilter; the consistency of a full entry read or write is
//! guaranteed by an array of 1024 spinlock shards, entry `i` being protected by shard
//! `i & 1023`. Writers decide whether to replace *before* taking the shard lock, which keeps
//! the common probe-and-decline path cheap.
//!
//! An entry is physically three atomic words: the Zobrist key; the evaluation bounds; and the
//! move, base ply, and depth. Individual word reads outside the lock are therefore never torn,
//! and cross-word consistency comes from the shard lock.
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::RwLock;

use chess::{Coord, Move, PieceType};

use super::eval::Eval;
use super::stats::SharedStats;

/// The number of lock shards. Must be a power of two, and enough of them that concurrent
/// searchers rarely collide.
const NUM_HASH_LOCKS: usize = 1024;

/// Depth sentinel marking an unused entry.
const HASH_NO_ENTRY: i8 = i8::min_value();

const ENTRY_BYTES: u64 = 24;

/// Entries are indexed by at most this many significant bits; see `calc_entry`.
const MAX_SIGNIFICANT_ENTRY_BITS: u64 = 0x3f_ffff;

////////////////////////////////////////////////////////////////////////////////////////////////////
/// What a transposition probe returns: the stored bounds and move.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct HashHit {
    /// The bounds recorded for the position.
    pub eval: Eval,
    /// The best move recorded for the position (possibly `MOVE_NONE`).
    pub mv: Move,
}

// Packing helpers. A `Move` is four bytes by construction.

fn pack_move(mv: Move) -> u64 {
    u64::from(mv.src)
        | u64::from(mv.dst) << 8
        | (mv.promote as u64) << 16
        | u64::from(mv.chk) << 24
}

fn unpack_move(bits: u64) -> Move {
    let promote = match (bits >> 16) as u8 & 0x7 {
        0 => PieceType::Empty,
        1 => PieceType::King,
        2 => PieceType::Pawn,
        3 => PieceType::Knight,
        4 => PieceType::Bishop,
        5 => PieceType::Rook,
        _ => PieceType::Queen,
    };
    Move::new(bits as u8 as Coord, (bits >> 8) as u8 as Coord, promote, (bits >> 24) as u8)
}

fn pack_eval(eval: Eval) -> u64 {
    u64::from(eval.lo as u32) << 32 | u64::from(eval.hi as u32)
}

fn unpack_eval(bits: u64) -> Eval {
    Eval::new((bits >> 32) as u32 as i32, bits as u32 as i32)
}

fn pack_tail(mv: Move, base_ply: u16, depth: i8) -> u64 {
    pack_move(mv) << 32 | u64::from(base_ply) << 8 | u64::from(depth as u8)
}

fn tail_depth(bits: u64) -> i8 {
    bits as u8 as i8
}

fn tail_base_ply(bits: u64) -> u16 {
    (bits >> 8) as u16
}

/// One table slot: `[zobrist, eval, move|basePly|depth]`.
#[derive(Debug, Default)]
struct Slot {
    words: [AtomicU64; 3],
}

impl Slot {
    fn blank(&self) {
        self.words[0].store(0, Ordering::Relaxed);
        self.words[1].store(pack_eval(Eval::full_range()), Ordering::Relaxed);
        self.words[2].store(pack_tail(chess::MOVE_NONE, 0, HASH_NO_ENTRY), Ordering::Relaxed);
    }
}

/// A tiny test-and-set spinlock. The critical sections it guards are a handful of loads and
/// stores, too short to be worth a parking lock.
#[derive(Debug, Default)]
struct Spinlock(AtomicBool);

impl Spinlock {
    fn lock(&self) {
        while self.0.compare_exchange_weak(
            false, true, Ordering::Acquire, Ordering::Relaxed).is_err() {
            std::hint::spin_loop();
        }
    }

    fn unlock(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// The entry array and its indexing parameters. Swapped wholesale on resize, which is why it
/// sits behind an `RwLock`: probes hold a read lock (never contended in steady state), resets
/// take the write lock.
#[derive(Debug, Default)]
struct TableInner {
    entries: Vec<Slot>,
    size: i64, // bytes
    shifted_num_entries: u64,
    shift_count: u32,
    hash_mask: u64,
}

impl TableInner {
    /// Maps a 64-bit hash to an entry index without a modulus: multiply the low 32 bits by
    /// the (at most 22 significant bits of the) entry count and take the top of the product,
    /// then XOR in masked randomness from the high half to fill the bottom bits. Distributes
    /// well for any entry count up to 2^54.
    fn calc_entry(&self, zobrist: u64) -> usize {
        ((((zobrist & 0xffff_ffff) * self.shifted_num_entries) >> self.shift_count)
            ^ ((zobrist >> 32) & self.hash_mask)) as usize
    }

    fn prep_calc_entry(&mut self) {
        let num_entries = self.entries.len() as u64;
        let leading = calc_num_leading_zeros(num_entries);
        self.hash_mask = (1u64 << leading) - 1;
        self.shifted_num_entries = num_entries >> leading;
        self.shift_count = 32 - leading;
    }
}

/// How many low bits to strip so that at most 22 significant bits remain.
fn calc_num_leading_zeros(mut num_entries: u64) -> u32 {
    let mut shift = 0;
    while num_entries > MAX_SIGNIFICANT_ENTRY_BITS {
        num_entries >>= 1;
        shift += 1;
    }
    shift
}

////////////////////////////////////////////////////////////////////////////////////////////////////
/// The transposition table.
///
/// Resizing is lazy: [`set_desired_size`](#method.set_desired_size) stages a new size, and the
/// next [`reset`](#method.reset) applies it. All other operations take `&self` and are safe to
/// share across threads.
#[derive(Debug)]
pub struct TransTable {
    inner: RwLock<TableInner>,
    locks: Vec<Spinlock>,
    next_size: AtomicI64,
}

impl TransTable {
    /// The size used when nobody configures one: 64 MiB.
    pub const DEFAULT_SIZE: i64 = 64 * 1024 * 1024;

    /// The largest size `set_desired_size` will accept.
    pub const MAX_SIZE: i64 = (MAX_SIGNIFICANT_ENTRY_BITS << 32) as i64 * ENTRY_BYTES as i64;

    /// Creates an empty table that will size itself to the default on the first `reset`.
    pub fn new() -> TransTable {
        let mut locks = Vec::with_capacity(NUM_HASH_LOCKS);
        locks.resize_with(NUM_HASH_LOCKS, Spinlock::default);

        TransTable {
            inner: RwLock::new(TableInner::default()),
            locks,
            next_size: AtomicI64::new(Self::DEFAULT_SIZE),
        }
    }

    /// Entry counts are constrained to a multiple of the shard count whose significant bits
    /// fit the indexing scheme.
    fn normalize_num_entries(num_entries: u64) -> u64 {
        let num_entries = num_entries / NUM_HASH_LOCKS as u64 * NUM_HASH_LOCKS as u64;
        let num_entries = num_entries.min(MAX_SIGNIFICANT_ENTRY_BITS << 32);
        let shift = calc_num_leading_zeros(num_entries);
        (num_entries >> shift) << shift
    }

    fn sanitize_size(size: i64) -> i64 {
        if size < 0 {
            return 0;
        }
        let size = size.min(Self::MAX_SIZE);
        (Self::normalize_num_entries(size as u64 / ENTRY_BYTES) * ENTRY_BYTES) as i64
    }

    /// The current size in bytes.
    pub fn size(&self) -> i64 {
        self.inner.read().expect("table lock poisoned").size
    }

    /// The number of entries currently allocated.
    pub fn num_entries(&self) -> usize {
        self.inner.read().expect("table lock poisoned").entries.len()
    }

    /// Stages a new size (in bytes), to take effect at the next `reset`.
    pub fn set_desired_size(&self, size: i64) {
        self.next_size.store(Self::sanitize_size(size), Ordering::Relaxed);
    }

    /// Blanks every entry, re-allocating first if a new size has been staged. Must not be
    /// called while a search is probing the table (the engine only resets when idle).
    pub fn reset(&self) {
        let mut inner = self.inner.write().expect("table lock poisoned");
        let next_size = self.next_size.load(Ordering::Relaxed);

        if next_size != inner.size {
            // Free before allocating so both tables never exist at once.
            inner.entries = Vec::new();
            let num_entries = (next_size / ENTRY_BYTES as i64) as usize;
            let mut entries = Vec::with_capacity(num_entries);
            entries.resize_with(num_entries, Slot::default);
            inner.entries = entries;
            inner.size = next_size;
            inner.prep_calc_entry();
        }
        for slot in &inner.entries {
            slot.blank();
        }
    }

    /// A hint that `zobrist`'s entry will be probed soon. Currently advisory only.
    #[inline]
    pub fn prefetch(&self, _zobrist: u64) {
        // No portable prefetch intrinsic on stable; the table works fine without.
    }

    /// Lockless prefilter: is there any chance of a hit for this hash? A false positive just
    /// costs the caller a locked probe; a false negative can only happen mid-write of the very
    /// entry being asked about.
    #[inline]
    pub fn quick_hit_test(&self, zobrist: u64) -> bool {
        let inner = self.inner.read().expect("table lock poisoned");
        if inner.entries.is_empty() {
            return false;
        }
        let idx = inner.calc_entry(zobrist);
        inner.entries[idx].words[0].load(Ordering::Relaxed) == zobrist
    }

    fn entry_matches(zobrist_stored: u64, eval: Eval, depth: i8, zobrist: u64,
                     search_depth: i32, alpha: i32, beta: i32) -> bool {
        zobrist_stored == zobrist
            && (eval.is_exact() || eval.lo >= beta || eval.hi <= alpha)
            && (search_depth < 0 // quiescing: any depth will do
                || search_depth <= i32::from(depth)
                || eval.detected_win_or_loss())
    }

    /// Probes the table. A hit requires the hash to match, the stored bounds to be usable
    /// against (`alpha`, `beta`) (exact, or failing high/low past the window), and the stored
    /// depth to cover `search_depth` (except that detected wins and losses satisfy any depth).
    /// A hit also refreshes the entry's base ply and depth to shield it from replacement.
    pub fn hit(&self, zobrist: u64, search_depth: i32, base_ply: u16, alpha: i32, beta: i32,
               stats: &SharedStats) -> Option<HashHit> {
        let inner = self.inner.read().expect("table lock poisoned");
        if inner.entries.is_empty() {
            return None;
        }
        let idx = inner.calc_entry(zobrist);
        let slot = &inner.entries[idx];
        let lock = &self.locks[idx & (NUM_HASH_LOCKS - 1)];

        lock.lock();
        let stored_zobrist = slot.words[0].load(Ordering::Relaxed);
        let eval = unpack_eval(slot.words[1].load(Ordering::Relaxed));
        let tail = slot.words[2].load(Ordering::Relaxed);

        if !Self::entry_matches(stored_zobrist, eval, tail_depth(tail), zobrist, search_depth,
                                alpha, beta) {
            lock.unlock();
            return None;
        }

        // Re-record the hit position to reinforce it against future replacement: the current
        // base ply, and (checkmates can deepen an entry) the max of the depths.
        let mv = unpack_move(tail >> 32);
        let depth = i32::from(tail_depth(tail)).max(search_depth) as i8;
        if tail_base_ply(tail) != base_ply {
            SharedStats::bump(&stats.hash_wrote_new);
        }
        slot.words[2].store(pack_tail(mv, base_ply, depth), Ordering::Relaxed);
        lock.unlock();

        SharedStats::bump(&stats.hash_hit_good);
        Some(HashHit { eval, mv })
    }

    /// Maybe stores an entry. The replacement policy: always replace a shallower entry; always
    /// replace an entry from a different base ply (games move on, and also move backwards
    /// under undo); at equal depth, replace when the new bounds are no wider than the stored
    /// ones. The policy is evaluated before the shard lock is taken.
    pub fn conditional_update(&self, eval: Eval, mv: Move, zobrist: u64, search_depth: i32,
                              base_ply: u16, stats: &SharedStats) {
        let inner = self.inner.read().expect("table lock poisoned");
        if inner.entries.is_empty() {
            return;
        }
        let idx = inner.calc_entry(zobrist);
        let slot = &inner.entries[idx];

        let tail = slot.words[2].load(Ordering::Relaxed);
        let stored_eval = unpack_eval(slot.words[1].load(Ordering::Relaxed));
        let stored_depth = i32::from(tail_depth(tail)); // HASH_NO_ENTRY always loses

        let replace = search_depth > stored_depth
            || tail_base_ply(tail) != base_ply
            || (search_depth == stored_depth && eval.range() <= stored_eval.range());
        if !replace {
            return;
        }

        let lock = &self.locks[idx & (NUM_HASH_LOCKS - 1)];
        lock.lock();
        // Every field is rewritten: the entry may have been replaced by another thread (or at
        // another ply) since the decision above.
        if tail_base_ply(slot.words[2].load(Ordering::Relaxed)) != base_ply {
            SharedStats::bump(&stats.hash_wrote_new);
        }
        slot.words[0].store(zobrist, Ordering::Relaxed);
        slot.words[1].store(pack_eval(eval), Ordering::Relaxed);
        slot.words[2].store(pack_tail(mv, base_ply, search_depth as i8), Ordering::Relaxed);
        lock.unlock();
    }
}

impl Default for TransTable {
    fn default() -> TransTable {
        TransTable::new()
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use super::*;
    use chess::FLAG;

    fn small_table() -> TransTable {
        let table = TransTable::new();
        table.set_desired_size(1024 * 1024);
        table.reset();
        table
    }

    fn test_move() -> Move {
        Move::new(12, 28, PieceType::Empty, FLAG)
    }

    #[test]
    fn entry_is_24_bytes() {
        assert_eq!(std::mem::size_of::<Slot>(), ENTRY_BYTES as usize);
    }

    #[test]
    fn move_packing_round_trips() {
        for mv in &[test_move(), chess::MOVE_NONE,
                    Move::new(48, 56, PieceType::Queen, 56),
                    Move::new(1, 1, PieceType::Empty, chess::DOUBLE_CHECK)] {
            assert_eq!(unpack_move(pack_move(*mv)), *mv);
        }
    }

    #[test]
    fn eval_packing_round_trips() {
        use crate::engine::eval::{EVAL_LOSS, EVAL_WIN};
        for eval in &[Eval::exact(0), Eval::new(-250, 10_000), Eval::full_range(),
                      Eval::exact(EVAL_WIN), Eval::exact(EVAL_LOSS)] {
            assert_eq!(unpack_eval(pack_eval(*eval)), *eval);
        }
    }

    #[test]
    fn store_then_hit() {
        let table = small_table();
        let stats = SharedStats::new();
        let zobrist = 0x1234_5678_9abc_def0;

        table.conditional_update(Eval::exact(40), test_move(), zobrist, 5, 1, &stats);
        assert!(table.quick_hit_test(zobrist));

        // Equal-or-lesser depth, compatible window: hit.
        let hit = table.hit(zobrist, 5, 1, -100, 100, &stats).expect("stored entry");
        assert_eq!(hit.eval, Eval::exact(40));
        assert_eq!(hit.mv, test_move());
        assert!(table.hit(zobrist, 3, 1, -100, 100, &stats).is_some());

        // Deeper than stored: miss.
        assert!(table.hit(zobrist, 7, 1, -100, 100, &stats).is_none());

        // Different hash: miss.
        assert!(table.hit(!zobrist, 3, 1, -100, 100, &stats).is_none());
    }

    #[test]
    fn bound_compatibility_rules() {
        let table = small_table();
        let stats = SharedStats::new();
        let zobrist = 0xfeed_beef_cafe_f00d;

        // A fail-high entry {200, WIN}.
        table.conditional_update(Eval::new(200, crate::engine::eval::EVAL_WIN), test_move(),
                                 zobrist, 6, 1, &stats);

        // Usable when its low bound clears beta.
        assert!(table.hit(zobrist, 4, 1, 0, 150, &stats).is_some());
        // Not usable when the window sits above the bound.
        assert!(table.hit(zobrist, 4, 1, 300, 400, &stats).is_none());
    }

    #[test]
    fn detected_mate_ignores_depth() {
        let table = small_table();
        let stats = SharedStats::new();
        let zobrist = 0x0dd0_0000_1111_2222;
        let mate = Eval::exact(crate::engine::eval::EVAL_WIN - 4);

        table.conditional_update(mate, test_move(), zobrist, 2, 1, &stats);
        assert!(table.hit(zobrist, 10, 1, -100, 100, &stats).is_some());
    }

    #[test]
    fn replacement_policy() {
        let table = small_table();
        let stats = SharedStats::new();
        let zobrist = 0x5555_aaaa_5555_aaaa;
        let deep_move = Move::new(8, 16, PieceType::Empty, FLAG);

        table.conditional_update(Eval::exact(10), deep_move, zobrist, 8, 1, &stats);
        // Shallower, same base ply: declined.
        table.conditional_update(Eval::exact(99), test_move(), zobrist, 2, 1, &stats);
        let hit = table.hit(zobrist, 2, 1, -1000, 1000, &stats).expect("entry");
        assert_eq!(hit.mv, deep_move);

        // Shallower but different base ply: aged out and replaced.
        table.conditional_update(Eval::exact(99), test_move(), zobrist, 2, 3, &stats);
        let hit = table.hit(zobrist, 2, 3, -1000, 1000, &stats).expect("entry");
        assert_eq!(hit.mv, test_move());
    }

    #[test]
    fn reset_blanks_and_resizes_lazily() {
        let table = small_table();
        let stats = SharedStats::new();
        let entries_before = table.num_entries();
        assert!(entries_before > 0);
        assert_eq!(entries_before % NUM_HASH_LOCKS, 0);

        table.conditional_update(Eval::exact(1), test_move(), 0x42, 3, 1, &stats);
        table.set_desired_size(2 * 1024 * 1024);
        // Staged size does not take effect until reset.
        assert_eq!(table.num_entries(), entries_before);

        table.reset();
        assert_eq!(table.num_entries(), 2 * entries_before);
        assert!(table.hit(0x42, 1, 1, -10, 10, &stats).is_none());
    }
}
