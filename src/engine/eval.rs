//! Evaluation bounds and the static evaluation helpers the search leans on.
//
//  This Source Code Form is subject to the terms of the Mozilla Public
//  License, v. 2.0. If a copy of the MPL was not distributed with this
//  file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
////////////////////////////////////////////////////////////////////////////////////////////////////
use std::fmt;
use std::ops;

use chess::{center_distance, distance, Board, Color, Piece, PieceType};

/// The best possible evaluation: the side to move has won.
pub const EVAL_WIN: i32 = 100_000;
/// The worst possible evaluation: the side to move has lost.
pub const EVAL_LOSS: i32 = -100_000;
/// Evaluations at or above this encode "mate in N": the distance to `EVAL_WIN` is the number
/// of plies to the win.
pub const EVAL_WIN_THRESHOLD: i32 = 99_000;
/// The mirror threshold for getting mated.
pub const EVAL_LOSS_THRESHOLD: i32 = -99_000;

////////////////////////////////////////////////////////////////////////////////////////////////////
/// The possible range of a position's true score: a low and a high bound.
///
/// An exact score has `lo == hi`. A fail-high is `{score, EVAL_WIN}`; a fail-low
/// `{EVAL_LOSS, score}`. Negating a position's evaluation for the other side's point of view
/// swaps and negates the bounds.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Eval {
    /// The score is at least this.
    pub lo: i32,
    /// ... and at most this.
    pub hi: i32,
}

impl Eval {
    /// Creates an evaluation from explicit bounds.
    #[inline]
    pub fn new(lo: i32, hi: i32) -> Eval {
        Eval { lo, hi }
    }

    /// Creates an exact evaluation.
    #[inline]
    pub fn exact(value: i32) -> Eval {
        Eval { lo: value, hi: value }
    }

    /// The widest possible evaluation, meaning "no information".
    #[inline]
    pub fn full_range() -> Eval {
        Eval { lo: EVAL_LOSS, hi: EVAL_WIN }
    }

    /// Is the score known exactly?
    #[inline]
    pub fn is_exact(&self) -> bool {
        self.lo == self.hi
    }

    /// How wide is the window?
    #[inline]
    pub fn range(&self) -> i32 {
        self.hi - self.lo
    }

    /// Is a forced win or loss known, regardless of search depth?
    #[inline]
    pub fn detected_win_or_loss(&self) -> bool {
        self.lo >= EVAL_WIN_THRESHOLD || self.hi <= EVAL_LOSS_THRESHOLD
    }

    /// Raises either bound that is below the corresponding bound of `other`.
    #[inline]
    pub fn bump_to(&mut self, other: Eval) {
        if self.lo < other.lo {
            self.lo = other.lo;
        }
        if self.hi < other.hi {
            self.hi = other.hi;
        }
    }

    /// Tightens mate-distance scores by one ply, for use when the root advances one move
    /// along the variation this evaluation belongs to.
    pub fn ripen(self) -> Eval {
        let ripen_bound = |b: i32| {
            if b >= EVAL_WIN_THRESHOLD {
                (b + 1).min(EVAL_WIN)
            } else if b <= EVAL_LOSS_THRESHOLD {
                (b - 1).max(EVAL_LOSS)
            } else {
                b
            }
        };
        Eval { lo: ripen_bound(self.lo), hi: ripen_bound(self.hi) }
    }
}

impl ops::Neg for Eval {
    type Output = Eval;

    /// The same range seen from the opponent's side.
    fn neg(self) -> Eval {
        Eval { lo: -self.hi, hi: -self.lo }
    }
}

impl fmt::Display for Eval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_exact() {
            write!(f, "{}", self.lo)
        } else {
            write!(f, "({}, {})", self.lo, self.hi)
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
/// King-hunt evaluation for pawnless endings where material alone cannot make progress: drive
/// the enemy king toward a corner and walk our own king up to it. Assumes neither side has
/// pawns.
pub fn end_game_eval(board: &Board, turn: Color) -> i32 {
    let ekcoord = board.king_coord(!turn);
    let kcoord = board.king_coord(turn);

    // The enemy king should be as far from the center as possible (max 84), and failing any
    // improvement there, our king should close in (max 14).
    i32::from(center_distance(ekcoord)) * 14 + (14 - i32::from(distance(kcoord, ekcoord)))
}

/// A lazy bound on how much one more ply could improve the material balance: the strongest
/// enemy piece, plus promotion potential for any pawn on the sixth or seventh rank. Used by
/// futility pruning, so it errs on the generous side.
pub fn potential_improvement(board: &Board, turn: Color) -> i32 {
    use PieceType::*;

    let mut improvement = 0;
    for &(ptype, worth) in &[
        (Queen, chess::EVAL_QUEEN),
        (Rook, chess::EVAL_ROOK),
        (Bishop, chess::EVAL_BISHOP),
        (Knight, chess::EVAL_KNIGHT),
        (Pawn, chess::EVAL_PAWN),
    ] {
        if board.piece_exists(Piece::new(!turn, ptype)) {
            improvement = worth;
            break;
        }
    }

    // The sixth rank counts because this is computed once before the depth-1 moves, not
    // after each of them.
    let (low, high) = if turn == Color::Black { (8, 23) } else { (40, 55) };
    for &coord in board.piece_coords(Piece::new(turn, Pawn)) {
        if (low..=high).contains(&coord) {
            improvement += chess::EVAL_QUEEN - chess::EVAL_PAWN;
            break;
        }
    }
    improvement
}

/// The draw bias: with even material, seek or shun the draw depending on the parity of the
/// search depth (the asymmetry is deliberate and keeps self-play from settling into repeated
/// draws); ahead in material, shun it; behind, seek it.
pub fn bias_draw(strength: i32, depth: i32) -> i32 {
    if strength == 0 {
        if depth & 1 == 1 { 1 } else { -1 }
    } else if strength > 0 {
        -1
    } else {
        1
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_negate_and_swap() {
        let eval = Eval::new(-50, 300);
        assert_eq!(-eval, Eval::new(-300, 50));
        assert_eq!(-(-eval), eval);
        assert!(!eval.is_exact());
        assert_eq!(eval.range(), 350);
        assert!(Eval::exact(12).is_exact());
    }

    #[test]
    fn win_loss_detection() {
        assert!(Eval::exact(EVAL_WIN - 3).detected_win_or_loss());
        assert!(Eval::new(EVAL_LOSS, EVAL_LOSS_THRESHOLD).detected_win_or_loss());
        assert!(!Eval::exact(500).detected_win_or_loss());
        assert!(!Eval::full_range().detected_win_or_loss());
    }

    #[test]
    fn ripening_tightens_mates_only() {
        assert_eq!(Eval::exact(EVAL_WIN - 5).ripen(), Eval::exact(EVAL_WIN - 4));
        assert_eq!(Eval::exact(EVAL_LOSS + 5).ripen(), Eval::exact(EVAL_LOSS + 4));
        assert_eq!(Eval::exact(EVAL_WIN).ripen(), Eval::exact(EVAL_WIN));
        assert_eq!(Eval::exact(250).ripen(), Eval::exact(250));
    }

    #[test]
    fn draw_bias_parity() {
        assert_eq!(bias_draw(0, 2), -1);
        assert_eq!(bias_draw(0, 3), 1);
        assert_eq!(bias_draw(200, 2), -1);
        assert_eq!(bias_draw(200, 3), -1);
        assert_eq!(bias_draw(-200, 2), 1);
    }

    #[test]
    fn endgame_eval_prefers_cornered_kings() {
        let cornered: Board = "k7/8/1K6/8/8/8/7Q/8 w - - 0 1".parse().expect("legal");
        let centered: Board = "8/8/8/3k4/8/3K4/7Q/8 w - - 0 1".parse().expect("legal");
        assert!(end_game_eval(&cornered, chess::Color::White)
            > end_game_eval(&centered, chess::Color::White));
    }
}
