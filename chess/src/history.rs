//! History heuristic support.
//
//  This Source Code Form is subject to the terms of the Mozilla Public
//  License, v. 2.0. If a copy of the MPL was not distributed with this
//  file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
////////////////////////////////////////////////////////////////////////////////////////////////////
use std::fmt;
use std::sync::atomic::{AtomicI32, Ordering};

use crate::{Color, Move, NUM_SQUARES};

////////////////////////////////////////////////////////////////////////////////////////////////////
/// The history heuristic table.
///
/// Records, per side and (source, destination) pair, the ply at which that move last caused a
/// fail-high. Move generation treats a recent entry as a "preferred" move and orders it into
/// the front of the movelist. See
/// <https://www.chessprogramming.org/History_Heuristic>.
///
/// The table is shared between the root searcher and its workers. Entries are read and written
/// with relaxed atomics: a stale or torn observation merely perturbs move ordering, never
/// correctness.
pub struct History {
    table: Vec<AtomicI32>, // [color][src][dst]
    // Exposed in moves, but stored as plies.
    window: AtomicI32,
}

impl History {
    /// Creates a table with the history window disabled.
    pub fn new() -> History {
        let mut table = Vec::with_capacity(Color::COUNT * NUM_SQUARES * NUM_SQUARES);
        for _ in 0..Color::COUNT * NUM_SQUARES * NUM_SQUARES {
            table.push(AtomicI32::new(i32::min_value() / 2));
        }
        History { table, window: AtomicI32::new(0) }
    }

    #[inline]
    fn slot(&self, turn: Color, src: u8, dst: u8) -> &AtomicI32 {
        &self.table[(turn.index() * NUM_SQUARES + src as usize) * NUM_SQUARES + dst as usize]
    }

    /// Sets the window, in moves. 0 disables the heuristic; 1 behaves like killer moves only.
    pub fn set_window(&self, num_moves: i32) {
        self.window.store(num_moves << 1, Ordering::Relaxed);
    }

    /// Returns the window, in moves.
    pub fn window(&self) -> i32 {
        self.window.load(Ordering::Relaxed) >> 1
    }

    /// Records that `mv` was best for `turn` at `ply`.
    #[inline]
    pub fn store(&self, mv: Move, turn: Color, ply: i32) {
        self.slot(turn, mv.src, mv.dst).store(ply, Ordering::Relaxed);
    }

    /// Was a move with this (source, destination) recently best for `turn`, within the window
    /// of `ply`?
    #[inline]
    pub fn hit(&self, src: u8, dst: u8, turn: Color, ply: i32) -> bool {
        let stored = self.slot(turn, src, dst).load(Ordering::Relaxed);
        (stored - ply).abs() < self.window.load(Ordering::Relaxed)
    }

    /// Forgets everything (the window is preserved).
    pub fn clear(&self) {
        for slot in &self.table {
            slot.store(i32::min_value() / 2, Ordering::Relaxed);
        }
    }
}

impl Default for History {
    fn default() -> History {
        History::new()
    }
}

impl fmt::Debug for History {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("History").field("window", &self.window()).finish()
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use super::*;
    use crate::{parse_coord, PieceType, FLAG};

    fn mv(src: &str, dst: &str) -> Move {
        Move::new(parse_coord(src).unwrap(), parse_coord(dst).unwrap(), PieceType::Empty, FLAG)
    }

    #[test]
    fn window_gates_hits() {
        let hist = History::new();
        let m = mv("e2", "e4");

        hist.store(m, Color::White, 10);
        assert!(!hist.hit(m.src, m.dst, Color::White, 10)); // window disabled

        hist.set_window(2); // 4 plies
        assert!(hist.hit(m.src, m.dst, Color::White, 12));
        assert!(!hist.hit(m.src, m.dst, Color::White, 14));
        assert!(!hist.hit(m.src, m.dst, Color::Black, 12)); // other side unaffected

        hist.clear();
        assert!(!hist.hit(m.src, m.dst, Color::White, 12));
    }
}
