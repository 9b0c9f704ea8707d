//! The dynamic board: piece lists, incremental hashing, repetition tracking, make/unmake.
//
//  This Source Code Form is subject to the terms of the Mozilla Public
//  License, v. 2.0. If a copy of the MPL was not distributed with this
//  file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
////////////////////////////////////////////////////////////////////////////////////////////////////
use std::fmt;
use std::str::FromStr;

use rand::seq::SliceRandom;

use crate::precalc::PRECALC;
use crate::{
    Color, Coord, Error, Move, Piece, PieceType, Position, Result, FLAG, MAX_PIECES, NUM_SQUARES,
};

mod movegen;
pub use movegen::MoveList;
pub(crate) use movegen::calc_ncheck;

// Must be a power of two, and at least 128 to cover the fifty-move window (100 plies) with
// headroom. Exotic drop-piece variants could repeat outside this window without tripping the
// fifty-move rule; orthodox chess cannot.
const NUM_SAVED_POSITIONS: usize = 128;
const RING_MASK: usize = NUM_SAVED_POSITIONS - 1;
const RING_NONE: u8 = 0xff;

/// Ring of recent position hashes, bucketed by the low hash bits so that the make-move repeat
/// probe touches only a handful of entries.
#[derive(Debug, Clone)]
struct PositionRing {
    zobrists: [u64; NUM_SAVED_POSITIONS],
    // Intrusive chains: head[b] is the first ring slot in bucket b, next[] links onward.
    head: [u8; NUM_SAVED_POSITIONS],
    next: [u8; NUM_SAVED_POSITIONS],
    bucket_of: [u8; NUM_SAVED_POSITIONS],
}

impl PositionRing {
    fn new() -> PositionRing {
        PositionRing {
            zobrists: [0; NUM_SAVED_POSITIONS],
            head: [RING_NONE; NUM_SAVED_POSITIONS],
            next: [RING_NONE; NUM_SAVED_POSITIONS],
            bucket_of: [RING_NONE; NUM_SAVED_POSITIONS],
        }
    }

    fn unlink(&mut self, slot: u8) {
        let bucket = self.bucket_of[slot as usize];
        if bucket == RING_NONE {
            return;
        }
        let mut link = self.head[bucket as usize];
        if link == slot {
            self.head[bucket as usize] = self.next[slot as usize];
        } else {
            while link != RING_NONE {
                let after = self.next[link as usize];
                if after == slot {
                    self.next[link as usize] = self.next[slot as usize];
                    break;
                }
                link = after;
            }
        }
        self.bucket_of[slot as usize] = RING_NONE;
        self.next[slot as usize] = RING_NONE;
    }

    fn insert(&mut self, ply: i32, zobrist: u64) {
        let slot = (ply as usize & RING_MASK) as u8;
        self.unlink(slot);
        let bucket = (zobrist as usize & RING_MASK) as u8;
        self.zobrists[slot as usize] = zobrist;
        self.next[slot as usize] = self.head[bucket as usize];
        self.head[bucket as usize] = slot;
        self.bucket_of[slot as usize] = bucket;
    }

    fn zobrist_at(&self, ply: i32) -> u64 {
        self.zobrists[ply as usize & RING_MASK]
    }

    /// Iterates the ring slots whose hashes share `zobrist`'s bucket.
    fn bucket_slots(&self, zobrist: u64) -> BucketIter<'_> {
        BucketIter { ring: self, slot: self.head[zobrist as usize & RING_MASK] }
    }
}

struct BucketIter<'a> {
    ring: &'a PositionRing,
    slot: u8,
}

impl Iterator for BucketIter<'_> {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        if self.slot == RING_NONE {
            return None;
        }
        let slot = self.slot;
        self.slot = self.ring.next[slot as usize];
        Some(slot)
    }
}

/// Is ring index `i` within the (possibly wrapped) inclusive range [`start`, `finish`]?
fn serial_between(i: usize, start: usize, finish: usize) -> bool {
    if start <= finish {
        i >= start && i <= finish
    } else {
        i >= start || i <= finish
    }
}

/// Reverse-index entry: which piece list, and which slot in it, holds a square.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
struct SlotRef {
    piece: u8,
    slot: u8,
}

const SLOT_NONE: SlotRef = SlotRef { piece: 0xff, slot: 0xff };

/// Everything make-move saves so that unmake-move can restore the board bit-exactly.
#[derive(Debug, Copy, Clone)]
struct Undo {
    mv: Move,
    cap_piece: Piece, // does not include en passant
    cbyte: u8,
    ebyte: Coord,
    ncheck: Coord,
    ncp_plies: i32,
    repeat_ply: i32,
    zobrist: u64,
}

////////////////////////////////////////////////////////////////////////////////////////////////////
/// A `Position` plus the dynamic state a search needs: per-piece coordinate lists with an O(1)
/// reverse index, the cached checking square of the side to move, an incrementally maintained
/// Zobrist hash, material strength totals, a ring of recent hashes for repetition detection,
/// and an undo stack.
///
/// A `Board` can only be set to a legal position; [`set_position`](#method.set_position)
/// refuses anything that fails [`Position::validate`](../struct.Position.html#method.validate)
/// and leaves the board untouched on failure. Multiple `Board`s coexist happily: the root
/// searcher and every worker own one each.
#[derive(Clone)]
pub struct Board {
    position: Position,
    ncheck: Coord,
    zobrist: u64,
    piece_lists: [Vec<Coord>; MAX_PIECES],
    slots: [SlotRef; NUM_SQUARES],
    total_strength: i32,
    strength: [i32; Color::COUNT],
    // Ply of the first repeated position (the repeat itself, not the original), or -1.
    repeat_ply: i32,
    ring: PositionRing,
    unmakes: Vec<Undo>,
}

impl Board {
    /// Creates a board holding the normal starting position.
    pub fn new() -> Board {
        let mut board = Board::empty();
        board.set_position(&Position::new()).expect("starting position is legal");
        board
    }

    /// Creates a board holding `position`. Fails if the position is not legal.
    pub fn from_position(position: &Position) -> Result<Board> {
        let mut board = Board::empty();
        board.set_position(position)?;
        Ok(board)
    }

    fn empty() -> Board {
        Board {
            position: Position::empty(),
            ncheck: FLAG,
            zobrist: 0,
            piece_lists: Default::default(),
            slots: [SLOT_NONE; NUM_SQUARES],
            total_strength: 0,
            strength: [0; Color::COUNT],
            repeat_ply: -1,
            ring: PositionRing::new(),
            unmakes: Vec::with_capacity(64),
        }
    }

    /// Sets the board to `position`. Fails, without clobbering the board, if the position is
    /// not legal.
    pub fn set_position(&mut self, position: &Position) -> Result<()> {
        position.validate()?;

        let mut board = Board::empty();
        board.position = position.clone();
        for sq in 0..NUM_SQUARES as Coord {
            let piece = position.piece_at(sq);
            if !piece.is_empty() {
                board.piece_add(sq, piece);
            }
        }
        board.ncheck = calc_ncheck(&board, position.turn());
        board.zobrist = board.calc_zobrist();
        *self = board;
        Ok(())
    }

    // ---------------------------------------------------------------------------------------
    // Getters.

    /// The static position this board currently holds.
    #[inline]
    pub fn position(&self) -> &Position {
        &self.position
    }

    /// The piece on a square.
    #[inline]
    pub fn piece_at(&self, coord: Coord) -> Piece {
        self.position.piece_at(coord)
    }

    /// The current ply.
    #[inline]
    pub fn ply(&self) -> i32 {
        self.position.ply()
    }

    /// The side to move.
    #[inline]
    pub fn turn(&self) -> Color {
        self.position.turn()
    }

    /// Plies since the last capture or pawn move.
    #[inline]
    pub fn ncp_plies(&self) -> i32 {
        self.position.ncp_plies()
    }

    /// The square of the pawn that just moved two squares, or `FLAG`.
    #[inline]
    pub fn en_passant_coord(&self) -> Coord {
        self.position.en_passant_coord()
    }

    /// May `turn` still castle king-side?
    #[inline]
    pub fn can_castle_oo(&self, turn: Color) -> bool {
        self.position.can_castle_oo(turn)
    }

    /// May `turn` still castle queen-side?
    #[inline]
    pub fn can_castle_ooo(&self, turn: Color) -> bool {
        self.position.can_castle_ooo(turn)
    }

    /// May `turn` still castle at all?
    #[inline]
    pub fn can_castle(&self, turn: Color) -> bool {
        self.position.can_castle(turn)
    }

    /// The current Zobrist hash.
    #[inline]
    pub fn zobrist(&self) -> u64 {
        self.zobrist
    }

    /// All squares inhabited by `piece`.
    #[inline]
    pub fn piece_coords(&self, piece: Piece) -> &[Coord] {
        &self.piece_lists[piece.index()]
    }

    /// Is any piece of this sort on the board?
    #[inline]
    pub fn piece_exists(&self, piece: Piece) -> bool {
        !self.piece_coords(piece).is_empty()
    }

    /// Is the side to move in check?
    #[inline]
    pub fn is_in_check(&self) -> bool {
        self.ncheck != FLAG
    }

    /// The square giving check (`FLAG` if none, `DOUBLE_CHECK` if several).
    #[inline]
    pub fn checking_coord(&self) -> Coord {
        self.ncheck
    }

    /// Material strength of one side.
    #[inline]
    pub fn material_strength(&self, player: Color) -> i32 {
        self.strength[player.index()]
    }

    /// Material strength of the side to move minus the opponent's.
    #[inline]
    pub fn relative_material_strength(&self) -> i32 {
        self.strength[self.turn().index()] - self.strength[(!self.turn()).index()]
    }

    /// Combined material strength of both sides.
    #[inline]
    pub fn total_strength(&self) -> i32 {
        self.total_strength
    }

    /// The earliest ply this board can unmake back to.
    #[inline]
    pub fn base_ply(&self) -> i32 {
        self.ply() - self.unmakes.len() as i32
    }

    /// Ply of the first repeated position that might contribute to a draw, or -1.
    #[inline]
    pub fn repeat_ply(&self) -> i32 {
        self.repeat_ply
    }

    /// The king square for `color`. A board always holds a legal position, so it exists.
    #[inline]
    pub fn king_coord(&self, color: Color) -> Coord {
        self.piece_lists[Piece::new(color, PieceType::King).index()][0]
    }

    /// Returns the move made at `ply`, which must be within this board's recorded history.
    pub fn move_at(&self, ply: i32) -> Move {
        assert!(ply >= self.base_ply() && ply < self.ply(), "ply {} not recorded", ply);
        self.unmakes[(ply - self.base_ply()) as usize].mv
    }

    /// The Zobrist hash of this board's base position.
    fn base_zobrist(&self) -> u64 {
        self.unmakes.first().map_or(self.zobrist, |u| u.zobrist)
    }

    /// Returns the last ply this board has in common with `other`, or -1 if their histories
    /// never coincide. Relatively slow.
    pub fn last_common_ply(&self, other: &Board) -> i32 {
        if self.base_ply() != other.base_ply() || self.base_zobrist() != other.base_zobrist() {
            return -1;
        }
        let mut ply = self.base_ply();
        while ply < self.ply() && ply < other.ply() && self.move_at(ply) == other.move_at(ply) {
            ply += 1;
        }
        ply
    }

    // ---------------------------------------------------------------------------------------
    // Piece-list plumbing. Every mutation keeps the reverse index exact.

    fn piece_add(&mut self, coord: Coord, piece: Piece) {
        let idx = piece.index();
        self.slots[coord as usize] =
            SlotRef { piece: idx as u8, slot: self.piece_lists[idx].len() as u8 };
        self.piece_lists[idx].push(coord);
        self.total_strength += piece.worth();
        self.strength[piece.color().index()] += piece.worth();
        self.position.coords[coord as usize] = piece;
    }

    /// Removes `piece` from the lists but leaves the square itself to be overwritten by the
    /// caller (the usual case for captures).
    fn piece_capture(&mut self, coord: Coord, piece: Piece) {
        let sref = self.slots[coord as usize];
        debug_assert_eq!(sref.piece as usize, piece.index());
        self.strength[piece.color().index()] -= piece.worth();
        self.total_strength -= piece.worth();

        let list = &mut self.piece_lists[sref.piece as usize];
        let last = *list.last().expect("capturing from an empty piece list");
        list[sref.slot as usize] = last;
        list.pop();
        self.slots[last as usize] = sref;
    }

    /// Fully removes a piece from the board (the en passant case).
    fn piece_remove(&mut self, coord: Coord, piece: Piece) {
        self.piece_capture(coord, piece);
        self.slots[coord as usize] = SLOT_NONE;
        self.position.coords[coord as usize] = Piece::EMPTY;
    }

    fn piece_move(&mut self, src: Coord, dst: Coord, piece: Piece) {
        let sref = self.slots[src as usize];
        self.piece_lists[sref.piece as usize][sref.slot as usize] = dst;
        self.slots[dst as usize] = sref;
        self.slots[src as usize] = SLOT_NONE;
        self.position.coords[dst as usize] = piece;
        self.position.coords[src as usize] = Piece::EMPTY;
    }

    fn do_castle_move(&mut self, k_src: Coord, k_dst: Coord, r_src: Coord, r_dst: Coord) {
        // The king is removed and re-added (not moved) so that a rook landing on the king's
        // source square cannot clobber the reverse index.
        let turn = self.turn();
        let king = Piece::new(turn, PieceType::King);
        let rook = Piece::new(turn, PieceType::Rook);

        self.piece_remove(k_src, king);
        if r_src != r_dst {
            self.piece_move(r_src, r_dst, rook);
        }
        self.piece_add(k_dst, king);
    }

    fn castle_coords(&self, castle_oo: bool) -> (Coord, Coord, Coord, Coord) {
        let castling = &PRECALC.castling[self.turn().index()];
        if castle_oo {
            (castling.king_start, castling.end_oo.king,
             castling.rook_oo_start, castling.end_oo.rook)
        } else {
            (castling.king_start, castling.end_ooo.king,
             castling.rook_ooo_start, castling.end_ooo.rook)
        }
    }

    // ---------------------------------------------------------------------------------------
    // Hashing.

    /// Recomputes the Zobrist hash from scratch. Slow; used for setup and verification.
    pub fn calc_zobrist(&self) -> u64 {
        let z = &PRECALC.zobrist;
        let mut zobrist = 0;
        for sq in 0..NUM_SQUARES {
            zobrist ^= z.coord[self.position.coords[sq].index()][sq];
        }
        zobrist ^= z.cbyte[self.position.cbyte as usize];
        if self.turn() == Color::Black {
            zobrist ^= z.turn;
        }
        if self.en_passant_coord() != FLAG {
            zobrist ^= z.ebyte[self.en_passant_coord() as usize];
        }
        zobrist
    }

    /// Computes the post-move hash from the pre-move hash, without touching the board.
    fn zobrist_from_move(&self, mv: Move) -> u64 {
        let z = &PRECALC.zobrist;
        let coords = &self.position.coords;
        let cbyte = self.position.cbyte;
        let ebyte = self.position.ebyte;
        let mut zobrist = self.zobrist ^ z.turn;

        if ebyte != FLAG {
            zobrist ^= z.ebyte[ebyte as usize];
        }

        if mv.is_castle() {
            let turn = self.turn();
            let (k_src, k_dst, r_src, r_dst) = self.castle_coords(mv.is_castle_oo());
            let king = Piece::new(turn, PieceType::King);
            let rook = Piece::new(turn, PieceType::Rook);
            let new_cbyte = cbyte & !(crate::position::CASTLE_BOTH << turn.index());

            zobrist ^= z.coord[king.index()][k_dst as usize]
                ^ z.coord[king.index()][k_src as usize]
                ^ z.coord[rook.index()][r_dst as usize]
                ^ z.coord[rook.index()][r_src as usize]
                ^ z.cbyte[cbyte as usize]
                ^ z.cbyte[new_cbyte as usize];
        } else {
            let my_piece = coords[mv.src as usize];
            let cap_piece = coords[mv.dst as usize];
            let landed = if mv.is_promote() {
                Piece::new(my_piece.color(), mv.promote)
            } else {
                my_piece
            };

            zobrist ^= z.coord[cap_piece.index()][mv.dst as usize]
                ^ z.coord[landed.index()][mv.dst as usize]
                ^ z.coord[my_piece.index()][mv.src as usize];

            if my_piece.is_pawn() && (mv.dst as i32 - mv.src as i32).abs() == 16 {
                zobrist ^= z.ebyte[mv.dst as usize];
            } else if mv.is_en_passant() {
                zobrist ^= z.coord[coords[ebyte as usize].index()][ebyte as usize];
            } else {
                let new_cbyte = cbyte
                    & PRECALC.castle_mask[mv.src as usize]
                    & PRECALC.castle_mask[mv.dst as usize];
                if new_cbyte != cbyte {
                    zobrist ^= z.cbyte[cbyte as usize] ^ z.cbyte[new_cbyte as usize];
                }
            }
        }
        zobrist
    }

    // ---------------------------------------------------------------------------------------
    // Make and unmake.

    /// Saves the current position's hash into the repetition ring. The search calls this
    /// selectively (only when a draw is reachable from the node); game-level code calls it for
    /// every real move.
    pub fn save_position(&mut self) {
        let (ply, zobrist) = (self.ply(), self.zobrist);
        self.ring.insert(ply, zobrist);
    }

    /// Makes a move. The move must be legal and carry a correct check annotation (use
    /// [`find_legal`](#method.find_legal) to normalize externally supplied moves).
    pub fn make_move(&mut self, mv: Move) {
        debug_assert!(mv.src != FLAG);
        let is_castle = mv.is_castle();
        let enpass = mv.is_en_passant();
        let cap_piece = if is_castle { Piece::EMPTY } else { self.piece_at(mv.dst) };
        let new_zobrist = self.zobrist_from_move(mv);

        self.unmakes.push(Undo {
            mv,
            cap_piece,
            cbyte: self.position.cbyte,
            ebyte: self.position.ebyte,
            ncheck: self.ncheck,
            ncp_plies: self.position.ncp_plies,
            repeat_ply: self.repeat_ply,
            zobrist: self.zobrist,
        });

        let mut repeatable = true;
        let new_cbyte;
        let new_ebyte;

        if is_castle {
            let (k_src, k_dst, r_src, r_dst) = self.castle_coords(mv.is_castle_oo());
            self.do_castle_move(k_src, k_dst, r_src, r_dst);
            new_cbyte =
                self.position.cbyte & !(crate::position::CASTLE_BOTH << self.turn().index());
            new_ebyte = FLAG;
        } else {
            let my_piece = self.piece_at(mv.src);
            new_cbyte = self.position.cbyte
                & PRECALC.castle_mask[mv.src as usize]
                & PRECALC.castle_mask[mv.dst as usize];

            if !cap_piece.is_empty() {
                repeatable = false;
                self.piece_capture(mv.dst, cap_piece);
            } else if enpass {
                let victim = Piece::new(!my_piece.color(), PieceType::Pawn);
                let ebyte = self.position.ebyte;
                self.piece_remove(ebyte, victim);
            }
            self.piece_move(mv.src, mv.dst, my_piece);

            if mv.is_promote() {
                self.piece_capture(mv.dst, my_piece);
                self.piece_add(mv.dst, Piece::new(my_piece.color(), mv.promote));
            }

            if my_piece.is_pawn() {
                repeatable = false;
                new_ebyte = if (mv.dst as i32 - mv.src as i32).abs() == 16 { mv.dst } else { FLAG };
            } else {
                new_ebyte = FLAG;
            }
        }

        self.position.cbyte = new_cbyte;
        self.position.ebyte = new_ebyte;
        self.position.ply += 1;
        self.position.turn = !self.position.turn;
        self.ncheck = mv.chk;
        self.zobrist = new_zobrist;

        if !repeatable {
            self.position.ncp_plies = 0;
            self.repeat_ply = -1;
        } else {
            self.position.ncp_plies += 1;
            if self.position.ncp_plies >= 4 && self.repeat_ply == -1 {
                // The new position might echo one within the non-capture window.
                let ply = self.position.ply;
                let start = (ply - self.position.ncp_plies) as usize & RING_MASK;
                let finish = (ply - 1) as usize & RING_MASK;
                let mut hit = false;
                for slot in self.ring.bucket_slots(self.zobrist) {
                    if serial_between(slot as usize, start, finish)
                        && self.ring.zobrists[slot as usize] == self.zobrist {
                        hit = true;
                        break;
                    }
                }
                if hit {
                    self.repeat_ply = ply;
                }
            }
        }
    }

    /// Unmakes the most recent move, restoring every piece of board state bit-exactly.
    ///
    /// # Panics
    /// Panics if there is no move to unmake.
    pub fn unmake_move(&mut self) {
        let undo = self.unmakes.pop().expect("no move to unmake");
        let mv = undo.mv;

        self.position.ply -= 1;
        self.position.turn = !self.position.turn;
        self.position.cbyte = undo.cbyte;
        self.position.ebyte = undo.ebyte; // must precede the en passant re-add below
        self.ncheck = undo.ncheck;
        self.position.ncp_plies = undo.ncp_plies;
        self.zobrist = undo.zobrist;
        self.repeat_ply = undo.repeat_ply;

        if mv.is_castle() {
            // Same dance with the squares swapped.
            let (k_src, k_dst, r_src, r_dst) = self.castle_coords(mv.is_castle_oo());
            self.do_castle_move(k_dst, k_src, r_dst, r_src);
        } else {
            let turn = self.turn();
            if mv.is_promote() {
                self.piece_capture(mv.dst, Piece::new(turn, mv.promote));
                self.piece_add(mv.dst, Piece::new(turn, PieceType::Pawn));
            }
            let piece = self.piece_at(mv.dst);
            self.piece_move(mv.dst, mv.src, piece);

            if !undo.cap_piece.is_empty() {
                self.piece_add(mv.dst, undo.cap_piece);
            } else if mv.is_en_passant() {
                self.piece_add(undo.ebyte, Piece::new(!turn, PieceType::Pawn));
            }
        }
    }

    // ---------------------------------------------------------------------------------------
    // Draw predicates.

    /// King vs king, a lone minor piece, or same-colored lone bishops. An automatic draw.
    pub fn is_draw_insufficient_material(&self) -> bool {
        let pawns = self.piece_lists[Piece::new(Color::White, PieceType::Pawn).index()].len()
            + self.piece_lists[Piece::new(Color::Black, PieceType::Pawn).index()].len();

        if self.total_strength == 0
            || (self.total_strength == crate::EVAL_KNIGHT && pawns == 0) {
            return true;
        }

        if self.total_strength == crate::EVAL_BISHOP * 2 {
            let wb = self.piece_coords(Piece::new(Color::White, PieceType::Bishop));
            let bb = self.piece_coords(Piece::new(Color::Black, PieceType::Bishop));
            if wb.len() == 1 && bb.len() == 1 {
                let (b1, b2) = (wb[0], bb[0]);
                let shade = |c: Coord| (crate::rank(c) + crate::file(c)) & 1;
                return shade(b1) == shade(b2);
            }
        }
        false
    }

    /// One hundred plies without a capture or pawn move. This draw must be claimed.
    #[inline]
    pub fn is_draw_fifty_move(&self) -> bool {
        self.ncp_plies() >= 100
    }

    /// Threefold repetition by hash: walks the ring for two earlier occurrences of the current
    /// position within the non-capture window. Fast, but under a (vanishingly rare) hash
    /// collision it can report a repetition that never happened.
    pub fn is_draw_threefold_repetition_fast(&self) -> bool {
        // Ply - 4 is the first possible repeat, ply - 8 the second and deciding one.
        if self.ncp_plies() < 8 {
            return false;
        }
        let mut repeats = 0;
        // Cap the walk so a pathological half-move clock cannot leave the ring.
        let mut ncp = self.ncp_plies().min(NUM_SAVED_POSITIONS as i32) - 4;
        let mut ply = self.ply() - 4;
        while ncp >= 4 || (repeats == 1 && ncp >= 0) {
            if self.ring.zobrist_at(ply) == self.zobrist {
                repeats += 1;
                if repeats == 2 {
                    return true;
                }
            }
            ncp -= 2;
            ply -= 2;
        }
        false
    }

    /// Threefold repetition, verified exactly by replaying this board's own undo history. Only
    /// repeats reachable through recorded moves are found, which covers every position a
    /// search can visit.
    pub fn is_draw_threefold_repetition(&self) -> bool {
        if self.ncp_plies() < 8 {
            return false;
        }
        let mut scratch = self.clone();
        let mut repeats = 0;
        let mut remaining = self.ncp_plies().min(self.ply() - self.base_ply());

        while remaining > 0 {
            scratch.unmake_move();
            remaining -= 1;
            if scratch.zobrist == self.zobrist
                && scratch.position.is_repeat_of(&self.position)
                && { repeats += 1; repeats == 2 } {
                return true;
            }
        }
        false
    }

    // ---------------------------------------------------------------------------------------
    // Miscellaneous.

    /// Roughly how much material this move gains: captured piece, plus promotion gain, plus
    /// the en passant pawn.
    pub fn cap_worth(&self, mv: Move) -> i32 {
        if mv.is_castle() {
            return 0;
        }
        let mut worth = self.piece_at(mv.dst).worth();
        if mv.promote != PieceType::Empty {
            worth += Piece::new(Color::White, mv.promote).worth();
            if mv.promote != PieceType::Pawn {
                worth -= crate::EVAL_PAWN;
            }
        }
        worth
    }

    /// Is this the normal starting position (ignoring whose turn it is)?
    pub fn is_normal_starting_position(&self) -> bool {
        self.position.cbyte == 0xf
            && self.position.ebyte == FLAG
            && self.position.ncp_plies == 0
            && self.position.coords[..] == PRECALC.starting_pieces[..]
    }

    /// Shuffles the piece lists so that move generation walks pieces in an arbitrary order
    /// (while still preferring the same kinds of moves).
    pub fn randomize(&mut self) {
        let mut rng = rand::thread_rng();
        for list in self.piece_lists.iter_mut() {
            list.shuffle(&mut rng);
        }
        // The reverse index must follow the shuffle.
        for (idx, list) in self.piece_lists.iter().enumerate() {
            for (slot, &coord) in list.iter().enumerate() {
                self.slots[coord as usize] = SlotRef { piece: idx as u8, slot: slot as u8 };
            }
        }
    }

    /// Finds the legal move matching `mv`'s source, destination, and promotion, returning it
    /// with its correct check annotation. Castle moves match by their castle encoding, and a
    /// plain pawn capture onto the en passant square matches the en passant move.
    pub fn find_legal(&self, mv: Move) -> Option<Move> {
        let mut mvlist = MoveList::new();
        self.generate_legal_moves(&mut mvlist, false, None);
        for i in 0..mvlist.num_moves() {
            let cand = mvlist.moves(i);
            if cand.src == mv.src && cand.dst == mv.dst
                && (cand.promote == mv.promote
                    || (mv.promote == PieceType::Empty && cand.is_en_passant())) {
                return Some(cand);
            }
        }
        None
    }

    /// Is `mv` legal here?
    pub fn is_legal_move(&self, mv: Move) -> bool {
        self.find_legal(mv).is_some()
    }

    /// Verifies the reverse index, piece lists, material totals, and hash against a from-
    /// scratch recomputation.
    ///
    /// # Panics
    /// Panics on any mismatch; an inconsistent board means engine state is corrupt and there
    /// is nothing sensible left to do.
    pub fn consistency_check(&self, context: &str) {
        for sq in 0..NUM_SQUARES {
            let piece = self.position.coords[sq];
            if piece.is_empty() {
                assert_eq!(self.slots[sq], SLOT_NONE,
                           "{}: dangling reverse index at {}", context,
                           crate::coord_name(sq as Coord));
            } else {
                let sref = self.slots[sq];
                assert_eq!(sref.piece as usize, piece.index(),
                           "{}: reverse index wrong piece at {}", context,
                           crate::coord_name(sq as Coord));
                assert_eq!(self.piece_lists[sref.piece as usize][sref.slot as usize],
                           sq as Coord,
                           "{}: piece list does not point back at {}", context,
                           crate::coord_name(sq as Coord));
            }
        }
        let mut strength = [0; Color::COUNT];
        for idx in 2..MAX_PIECES {
            let piece = Piece::from_index(idx);
            for &coord in &self.piece_lists[idx] {
                assert_eq!(self.position.coords[coord as usize], piece,
                           "{}: stale piece list entry", context);
                strength[piece.color().index()] += piece.worth();
            }
        }
        assert_eq!(strength, self.strength, "{}: material strength drifted", context);
        assert_eq!(strength[0] + strength[1], self.total_strength,
                   "{}: total strength drifted", context);
        assert_eq!(self.zobrist, self.calc_zobrist(), "{}: zobrist drifted", context);
        assert!(self.position.ncp_plies <= self.position.ply,
                "{}: half-move clock exceeds ply", context);
    }
}

impl Default for Board {
    fn default() -> Board {
        Board::new()
    }
}

impl FromStr for Board {
    type Err = Error;

    fn from_str(s: &str) -> Result<Board> {
        let position: Position = s.parse()?;
        let mut board = Board::empty();
        board.set_position(&position)?;
        Ok(board)
    }
}

impl fmt::Debug for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Board")
            .field("fen", &self.position.to_string())
            .field("zobrist", &format_args!("{:#018x}", self.zobrist))
            .field("ncheck", &self.ncheck)
            .field("repeat_ply", &self.repeat_ply)
            .finish()
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.position.fmt(f)
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use super::*;

    fn play(board: &mut Board, moves: &[&str]) {
        for s in moves {
            let mv = Move::parse(s, board).unwrap_or_else(|_| panic!("{} should be legal", s));
            board.save_position();
            board.make_move(mv);
            board.consistency_check("play");
        }
    }

    #[test]
    fn make_unmake_restores_everything() {
        let mut board = Board::new();
        let before = format!("{:?}", board);
        let zobrist = board.zobrist();

        for s in &["e2e4", "g1f3", "e1g1", "b7b5", "e4d5"] {
            if let Ok(mv) = Move::parse(s, &board) {
                board.make_move(mv);
                board.consistency_check("made");
                board.unmake_move();
                board.consistency_check("unmade");
            }
        }
        assert_eq!(board.zobrist(), zobrist);
        assert_eq!(format!("{:?}", board), before);
    }

    #[test]
    fn deep_make_unmake_round_trip() {
        let mut board = Board::new();
        let line = ["e2e4", "e7e5", "g1f3", "b8c6", "f1b5", "g8f6", "e1g1", "f6e4",
                    "d2d4", "e4d6", "b5c6", "d7c6", "d4e5", "d6f5"];
        let mut hashes = vec![board.zobrist()];

        for s in &line {
            let mv = Move::parse(s, &board).expect("line is legal");
            board.make_move(mv);
            board.consistency_check("line");
            hashes.push(board.zobrist());
        }
        for _ in 0..line.len() {
            board.unmake_move();
            hashes.pop();
            assert_eq!(board.zobrist(), *hashes.last().expect("hash"));
            assert_eq!(board.zobrist(), board.calc_zobrist());
        }
        assert_eq!(board.ply(), 0);
    }

    #[test]
    fn en_passant_make_unmake() {
        let mut board = Board::new();
        play(&mut board, &["e2e4", "a7a6", "e4e5", "d7d5"]);
        let ep = Move::parse("e5d6", &board).expect("en passant is legal");
        assert!(ep.is_en_passant());

        let fen_before = board.to_string();
        board.make_move(ep);
        board.consistency_check("after ep");
        assert!(board.piece_at(crate::parse_coord("d5").unwrap()).is_empty());
        board.unmake_move();
        board.consistency_check("ep undone");
        assert_eq!(board.to_string(), fen_before);
    }

    #[test]
    fn insufficient_material_matrix() {
        for (fen, draw) in &[
            ("8/8/8/4k3/8/8/8/4K3 w - - 0 1", true),            // K vs k
            ("8/8/8/4k3/8/8/8/3NK3 w - - 0 1", true),           // KN vs k
            ("8/8/8/4k3/8/8/8/3BK3 w - - 0 1", true),           // KB vs k
            ("8/8/3b4/4k3/8/4B3/8/4K3 w - - 0 1", true),        // same-colored bishops
            ("8/8/4b3/4k3/8/4B3/8/4K3 w - - 0 1", false),       // opposite-colored bishops
            ("8/8/8/4k3/8/8/4P3/4K3 w - - 0 1", false),         // pawn
            ("8/8/8/4k3/8/8/8/3QK3 w - - 0 1", false),          // queen
        ] {
            let board: Board = fen.parse().expect("legal");
            assert_eq!(board.is_draw_insufficient_material(), *draw, "{}", fen);
        }
    }

    #[test]
    fn fifty_move_boundary_is_exact() {
        let mut board: Board = "8/8/8/4k3/8/8/8/R3K2R w - - 98 80".parse().expect("legal");
        assert!(!board.is_draw_fifty_move());
        play(&mut board, &["a1a2"]);
        assert!(!board.is_draw_fifty_move()); // 99
        play(&mut board, &["e5e6"]);
        assert!(board.is_draw_fifty_move()); // exactly 100
    }

    #[test]
    fn threefold_detected_on_second_repetition() {
        let mut board = Board::new();
        // Knight shuffle: the start position recurs after every 4 plies.
        play(&mut board, &["g1f3", "g8f6", "f3g1", "f6g8"]);
        assert!(!board.is_draw_threefold_repetition_fast());
        assert!(!board.is_draw_threefold_repetition());
        play(&mut board, &["g1f3", "g8f6", "f3g1"]);
        assert!(!board.is_draw_threefold_repetition());
        play(&mut board, &["f6g8"]);
        assert!(board.is_draw_threefold_repetition_fast());
        assert!(board.is_draw_threefold_repetition());
    }

    #[test]
    fn repeat_ply_marker_set_by_make_move() {
        let mut board = Board::new();
        play(&mut board, &["g1f3", "g8f6", "f3g1"]);
        assert_eq!(board.repeat_ply(), -1);
        play(&mut board, &["f6g8"]); // back to the start position
        assert_eq!(board.repeat_ply(), 4);
        play(&mut board, &["e2e4"]); // pawn move resets everything
        assert_eq!(board.repeat_ply(), -1);
    }

    #[test]
    fn set_position_rejects_illegal_and_preserves_board(){
        let mut board = Board::new();
        let before = board.to_string();
        let bad: Position = "k7/8/8/8/8/8/8/K6R w - - 0 1".parse().expect("parses");
        assert!(board.set_position(&bad).is_err());
        assert_eq!(board.to_string(), before);
    }

    #[test]
    fn last_common_ply_tracks_shared_history() {
        let mut a = Board::new();
        let mut b = Board::new();
        play(&mut a, &["e2e4", "e7e5", "g1f3"]);
        play(&mut b, &["e2e4", "e7e5", "b1c3"]);
        assert_eq!(a.last_common_ply(&b), 2);

        let c: Board = "8/8/8/4k3/8/8/8/4K3 w - - 0 1".parse().expect("legal");
        assert_eq!(a.last_common_ply(&c), -1);
    }

    #[test]
    fn randomize_keeps_the_board_consistent() {
        let mut board = Board::new();
        board.randomize();
        board.consistency_check("randomized");
        assert_eq!(board.zobrist(), board.calc_zobrist());
    }
}
