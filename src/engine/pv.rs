//! Principal variation tracking.
//
//  This Source Code Form is subject to the terms of the Mozilla Public
//  License, v. 2.0. If a copy of the MPL was not distributed with this
//  file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
////////////////////////////////////////////////////////////////////////////////////////////////////
//! Three related structures with three jobs:
//!
//! * [`SearchPv`] is the fast fixed-size variation the search threads update as they go;
//! * [`DisplayPv`] decorates a `SearchPv` with its nominal depth and evaluation for
//!   notifications to the outside world;
//! * [`HintPv`] survives between searches. Its moves are only hints (they may be stale or
//!   even illegal) used to seed move ordering and pick the next search's starting depth.
use log::error;

use chess::{moves_to_string, Board, Move, MoveStyle, MOVE_NONE};

use super::eval::{Eval, EVAL_LOSS, EVAL_WIN};

/// The most PV moves anyone cares to track or display. Endgames have been seen at depth 18,
/// so keep a little headroom past that.
pub const MAX_PV_MOVES: usize = 20;

////////////////////////////////////////////////////////////////////////////////////////////////////
/// A fast but size-limited variation, tracked by a searching thread from some node downward.
///
/// `start_depth` records the depth of the node this variation hangs off (the root is depth 0),
/// and `start_depth + len <= MAX_PV_MOVES` always holds: moves that could never percolate back
/// to the root are not recorded.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SearchPv {
    start_depth: i32,
    num_moves: usize,
    moves: [Move; MAX_PV_MOVES],
}

impl SearchPv {
    /// Creates an empty variation anchored at `start_depth`.
    pub fn new(start_depth: i32) -> SearchPv {
        SearchPv { start_depth, num_moves: 0, moves: [MOVE_NONE; MAX_PV_MOVES] }
    }

    /// Empties the variation.
    pub fn clear(&mut self) {
        self.num_moves = 0;
    }

    /// The number of recorded moves (including quiescing moves).
    pub fn num_moves(&self) -> usize {
        self.num_moves
    }

    /// The move at `idx`, or `MOVE_NONE` when out of range.
    pub fn moves(&self, idx: usize) -> Move {
        if idx < self.num_moves { self.moves[idx] } else { MOVE_NONE }
    }

    /// The recorded moves as a slice.
    pub fn as_slice(&self) -> &[Move] {
        &self.moves[..self.num_moves]
    }

    /// Re-anchors the variation at a different depth.
    pub fn set_start_depth(&mut self, depth: i32) {
        self.start_depth = depth;
    }

    fn update_inner(&mut self, mv: Move, child: Option<&SearchPv>) -> bool {
        if let Some(child) = child {
            if child.start_depth != self.start_depth + 1 {
                error!("PV start depths misaligned: mine {}, child {}",
                       self.start_depth, child.start_depth);
            }
        }

        if mv == MOVE_NONE {
            // MOVE_NONE only happens on a fail-low, which must come before any best move.
            debug_assert_eq!(self.num_moves, 0);
        } else if (self.start_depth as usize) < MAX_PV_MOVES {
            self.moves[0] = mv;
            match child {
                None => self.num_moves = 1,
                Some(child) => {
                    let to_copy =
                        child.num_moves.min(MAX_PV_MOVES - 1 - self.start_depth as usize);
                    self.moves[1..1 + to_copy].copy_from_slice(&child.moves[..to_copy]);
                    self.num_moves = to_copy + 1;
                }
            }
        }
        self.start_depth == 0
    }

    /// Makes `mv` the variation (length one). Returns true iff this is the root node.
    pub fn update(&mut self, mv: Move) -> bool {
        self.update_inner(mv, None)
    }

    /// Makes `mv` followed by `child`'s moves the variation. Returns true iff this is the
    /// root node.
    pub fn update_from_child(&mut self, mv: Move, child: &SearchPv) -> bool {
        self.update_inner(mv, Some(child))
    }

    /// Shifts the variation up one ply, assuming the move at index 0 was just played.
    pub fn decrement(&mut self) {
        self.start_depth += 1;
        if self.num_moves == 0 {
            return;
        }
        self.num_moves -= 1;
        for i in 0..self.num_moves {
            self.moves[i] = self.moves[i + 1];
        }
        self.moves[self.num_moves] = MOVE_NONE;
    }

    /// Writes the variation in the given style, stopping at the first move that is not legal
    /// from the running position (a stale hash move, say). Returns the rendered string.
    pub fn build_move_string(&self, style: &MoveStyle, board: &Board) -> String {
        let mut s = String::new();
        moves_to_string(&mut s, self.as_slice(), style, board);
        s
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
/// The variation reported in PV notifications: nominal (non-quiescing) depth, evaluation, and
/// the move list itself.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DisplayPv {
    level: i32,
    eval: Eval,
    pv: SearchPv,
}

impl DisplayPv {
    /// Creates an empty display variation.
    pub fn new() -> DisplayPv {
        DisplayPv { level: 0, eval: Eval::full_range(), pv: SearchPv::new(0) }
    }

    /// Fills in all fields at once.
    pub fn set(&mut self, level: i32, eval: Eval, pv: &SearchPv) {
        self.level = level;
        self.eval = eval;
        self.pv = *pv;
    }

    /// The nominal search depth, not counting quiescence.
    pub fn level(&self) -> i32 {
        self.level
    }

    /// The evaluation of the position. Normally exact.
    pub fn eval(&self) -> Eval {
        self.eval
    }

    /// The move at `idx`, or `MOVE_NONE`.
    pub fn moves(&self, idx: usize) -> Move {
        self.pv.moves(idx)
    }

    /// The underlying variation.
    pub fn search_pv(&self) -> &SearchPv {
        &self.pv
    }

    /// Shifts everything up one ply, assuming the first move was just played. The level may go
    /// negative (into quiescing-only territory).
    pub fn decrement(&mut self) {
        self.pv.decrement();
        self.level -= 1;
        self.eval = (-self.eval).ripen();
    }

    /// Forwarding helper; see [`SearchPv::build_move_string`].
    pub fn build_move_string(&self, style: &MoveStyle, board: &Board) -> String {
        self.pv.build_move_string(style, board)
    }
}

impl Default for DisplayPv {
    fn default() -> DisplayPv {
        DisplayPv::new()
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
/// The between-moves variation cache.
///
/// Unlike the other PV types this one never stores quiescing moves (being forced into a
/// capture chain by a hint would be terrible), its moves may go stale as the game diverges
/// from the prediction, and all indices may be probed. Consumers must treat every hint as
/// possibly illegal.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct HintPv {
    level: i32,
    moves: [Move; MAX_PV_MOVES],
    // Normally an exact value; drives the suggested starting level.
    eval: Eval,
    // Did the last search complete this level, or only get partway through?
    completed_search: bool,
}

impl HintPv {
    /// Creates an empty hint.
    pub fn new() -> HintPv {
        HintPv {
            level: 0,
            moves: [MOVE_NONE; MAX_PV_MOVES],
            eval: Eval::new(EVAL_LOSS, EVAL_WIN),
            completed_search: false,
        }
    }

    /// Forgets everything.
    pub fn clear(&mut self) {
        *self = HintPv::new();
    }

    /// The hinted move for a node `depth` plies below the root, or `MOVE_NONE`.
    pub fn hint(&self, depth: i32) -> Move {
        if (depth as usize) < MAX_PV_MOVES { self.moves[depth as usize] } else { MOVE_NONE }
    }

    /// The nominal depth of the last recorded variation.
    pub fn level(&self) -> i32 {
        self.level
    }

    /// The recorded evaluation.
    pub fn eval(&self) -> Eval {
        self.eval
    }

    /// Absorbs a freshly reported variation. Called `update` rather than implemented as an
    /// assignment because hint moves beyond the new variation are preserved: they may still
    /// be useful to `hint`.
    pub fn update(&mut self, display: &DisplayPv) {
        self.level = display.level();
        self.eval = display.eval();

        let num_moves = MAX_PV_MOVES.min((display.level() + 1).max(0) as usize);
        for i in 0..num_moves {
            if display.moves(i) == MOVE_NONE {
                break;
            }
            self.moves[i] = display.moves(i);
        }
        self.completed_search = false;
    }

    /// Shrinks the hint by one ply after `mv` was played. If the move played was not the
    /// predicted one the leftover moves can be nonsense, but they are only hints; the level
    /// is reset so the next search starts over.
    pub fn decrement(&mut self, mv: Move) {
        let predicted = mv != MOVE_NONE && mv == self.moves[0];

        for i in 0..MAX_PV_MOVES - 1 {
            self.moves[i] = self.moves[i + 1];
        }
        self.moves[MAX_PV_MOVES - 1] = MOVE_NONE;
        self.eval = (-self.eval).ripen();

        self.level = if predicted { (self.level - 1).max(0) } else { 0 };
    }

    /// Pushes the hint back `num_plies` moves (for undo). The future moves of the variation
    /// are preserved, but the level and eval can no longer be trusted and are cleared.
    pub fn rewind(&mut self, num_plies: i32) {
        if num_plies <= 0 {
            if num_plies < 0 {
                self.fast_forward(-num_plies);
            }
            return;
        }
        let num_plies = (num_plies as usize).min(MAX_PV_MOVES);

        for i in (num_plies..MAX_PV_MOVES).rev() {
            self.moves[i] = self.moves[i - num_plies];
        }
        for slot in &mut self.moves[..num_plies] {
            *slot = MOVE_NONE;
        }
        self.level = 0;
        self.eval = Eval::new(EVAL_LOSS, EVAL_WIN);
    }

    /// Advances the hint `num_plies` moves (for redo).
    pub fn fast_forward(&mut self, num_plies: i32) {
        if num_plies < 0 {
            self.rewind(-num_plies);
            return;
        }
        for _ in 0..(num_plies as usize).min(MAX_PV_MOVES) {
            let first = self.moves[0];
            self.decrement(first);
        }
    }

    /// Where should the next search start?
    pub fn suggest_search_start_level(&self) -> i32 {
        if self.eval.detected_win_or_loss() {
            // Always look for the shortest mate once one has been stumbled onto.
            0
        } else if self.completed_search && self.level > 0 {
            // The previous search finished this level, so pick up at the next one. A level of
            // zero starts over regardless: the predicted move may not have been played.
            self.level + 1
        } else {
            self.level
        }
    }

    /// Forces the next search to start from scratch.
    pub fn reset_search_start_level(&mut self) {
        self.level = 0;
    }

    /// Records that the search finished a full level, letting
    /// [`suggest_search_start_level`](#method.suggest_search_start_level) be more aggressive.
    pub fn completed_search(&mut self) {
        self.completed_search = true;
    }
}

impl Default for HintPv {
    fn default() -> HintPv {
        HintPv::new()
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use super::*;
    use chess::{parse_coord, PieceType, FLAG};

    fn mv(src: &str, dst: &str) -> Move {
        Move::new(parse_coord(src).unwrap(), parse_coord(dst).unwrap(), PieceType::Empty, FLAG)
    }

    #[test]
    fn child_updates_compose() {
        let mut child = SearchPv::new(1);
        child.update(mv("e7", "e5"));

        let mut root = SearchPv::new(0);
        assert!(root.update_from_child(mv("e2", "e4"), &child));
        assert_eq!(root.num_moves(), 2);
        assert_eq!(root.moves(0), mv("e2", "e4"));
        assert_eq!(root.moves(1), mv("e7", "e5"));
        assert_eq!(root.moves(2), MOVE_NONE);
    }

    #[test]
    fn depth_cap_is_enforced() {
        let mut deep = SearchPv::new(MAX_PV_MOVES as i32);
        deep.update(mv("a2", "a3"));
        assert_eq!(deep.num_moves(), 0); // can never reach the root; not recorded

        let mut child = SearchPv::new(MAX_PV_MOVES as i32 - 1);
        child.update(mv("a2", "a3"));
        assert_eq!(child.num_moves(), 1);
    }

    #[test]
    fn decrement_shifts_the_line() {
        let mut pv = SearchPv::new(0);
        let mut child = SearchPv::new(1);
        child.update(mv("e7", "e5"));
        pv.update_from_child(mv("e2", "e4"), &child);

        pv.decrement();
        assert_eq!(pv.num_moves(), 1);
        assert_eq!(pv.moves(0), mv("e7", "e5"));

        pv.decrement();
        assert_eq!(pv.num_moves(), 0);
        pv.decrement(); // harmless past empty
        assert_eq!(pv.num_moves(), 0);
    }

    #[test]
    fn hint_decrement_predicted_vs_not() {
        let mut display = DisplayPv::new();
        let mut line = SearchPv::new(0);
        let mut child = SearchPv::new(1);
        child.update(mv("e7", "e5"));
        line.update_from_child(mv("e2", "e4"), &child);
        display.set(4, Eval::exact(30), &line);

        let mut hint = HintPv::new();
        hint.update(&display);
        assert_eq!(hint.level(), 4);
        assert_eq!(hint.hint(0), mv("e2", "e4"));

        // Predicted move: level shrinks by one and the line shifts.
        hint.decrement(mv("e2", "e4"));
        assert_eq!(hint.level(), 3);
        assert_eq!(hint.hint(0), mv("e7", "e5"));

        // Unpredicted move: the level resets to zero.
        hint.decrement(mv("a2", "a3"));
        assert_eq!(hint.level(), 0);
    }

    #[test]
    fn start_level_suggestions() {
        let mut hint = HintPv::new();
        let mut display = DisplayPv::new();
        let mut line = SearchPv::new(0);
        line.update(mv("e2", "e4"));

        display.set(5, Eval::exact(12), &line);
        hint.update(&display);
        assert_eq!(hint.suggest_search_start_level(), 5); // incomplete: same level

        hint.completed_search();
        assert_eq!(hint.suggest_search_start_level(), 6); // completed: next level

        display.set(3, Eval::exact(super::EVAL_WIN - 5), &line);
        hint.update(&display);
        assert_eq!(hint.suggest_search_start_level(), 0); // mate known: restart at zero
    }

    #[test]
    fn rewind_preserves_future_moves() {
        let mut hint = HintPv::new();
        let mut display = DisplayPv::new();
        let mut line = SearchPv::new(0);
        let mut child = SearchPv::new(1);
        child.update(mv("e7", "e5"));
        line.update_from_child(mv("e2", "e4"), &child);
        display.set(2, Eval::exact(0), &line);
        hint.update(&display);

        hint.rewind(1);
        assert_eq!(hint.hint(0), MOVE_NONE);
        assert_eq!(hint.hint(1), mv("e2", "e4"));
        assert_eq!(hint.hint(2), mv("e7", "e5"));
        assert_eq!(hint.level(), 0);

        hint.fast_forward(1);
        assert_eq!(hint.hint(0), mv("e2", "e4"));
    }
}
