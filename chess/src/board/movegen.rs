//! Legal move generation.
//
//  This Source Code Form is subject to the terms of the Mozilla Public
//  License, v. 2.0. If a copy of the MPL was not distributed with this
//  file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
////////////////////////////////////////////////////////////////////////////////////////////////////
//! Moves are generated legally from the start, never pseudo-legally with a filter pass. Before
//! emitting anything the generator builds two 64-square annotation maps:
//!
//! * the *discovered-check* map: friendly pieces sitting between an enemy king and a friendly
//!   slider, tagged with the slider's square;
//! * the *pin* map: friendly pieces sitting between the friendly king and an enemy slider,
//!   tagged with the pin axis. A pinned piece may only move along its axis; a pinned knight
//!   cannot move at all.
//!
//! With the side to move in check, only evasions are emitted: captures of the checker,
//! interpositions on the checking ray, and king moves. In double check, king moves only.
//!
//! Every emitted move carries its check annotation, computed from geometry plus the
//! discovered-check map. En passant needs extra care twice over: the capture can expose the
//! king along the shared rank (which the pin map cannot see), and it can deliver a discovered
//! check through the *captured* pawn's square.
use crate::history::History;
use crate::precalc::{is_bishop_dir, is_queen_dir, is_rook_dir, DIR_KNIGHT, PRECALC};
use crate::{
    file, rank, Board, Color, Coord, Move, Piece, PieceType, DOUBLE_CHECK, FLAG, NUM_SQUARES,
};

const REL_FRIEND: u8 = 0;
const REL_UNOCC: u8 = 1;
const REL_ENEMY: u8 = 2;

#[inline]
fn rel(piece: Piece, turn: Color) -> u8 {
    if piece.is_empty() {
        REL_UNOCC
    } else if piece.color() == turn {
        REL_FRIEND
    } else {
        REL_ENEMY
    }
}

// Move-walk orders per color: forward moves first, then center before the wings, so that the
// front of the movelist tends to hold the more forcing tries.
const PREFERRED_Q_DIRS: [[u8; 8]; Color::COUNT] =
    [[1, 2, 0, 3, 7, 5, 4, 6], [5, 4, 6, 3, 7, 1, 2, 0]];
const PREFERRED_B_DIRS: [[u8; 4]; Color::COUNT] = [[2, 0, 4, 6], [4, 6, 2, 0]];
const PREFERRED_R_DIRS: [[u8; 4]; Color::COUNT] = [[1, 3, 7, 5], [5, 3, 7, 1]];
const PREFERRED_K_DIRS: [[u8; 8]; Color::COUNT] =
    [[1, 0, 2, 7, 3, 5, 6, 4], [5, 6, 4, 7, 3, 1, 0, 2]];

////////////////////////////////////////////////////////////////////////////////////////////////////
/// A list of generated moves, with preferred moves (captures, promotions, checks, and
/// history-window hits) bucketed into the front.
#[derive(Debug, Clone, Default)]
pub struct MoveList {
    moves: Vec<Move>,
    // Index where the next preferred move is inserted; everything below it is preferred.
    insrt: usize,
}

impl MoveList {
    /// Creates an empty movelist.
    pub fn new() -> MoveList {
        MoveList { moves: Vec::with_capacity(64), insrt: 0 }
    }

    /// The number of moves in the list.
    #[inline]
    pub fn num_moves(&self) -> usize {
        self.moves.len()
    }

    /// Returns the move at `idx`. Like an array index, `idx` is not range-checked beyond the
    /// usual slice check.
    #[inline]
    pub fn moves(&self, idx: usize) -> Move {
        self.moves[idx]
    }

    /// Is the move at `idx` in the preferred bucket? Safe to call past the end of the list.
    #[inline]
    pub fn is_preferred_move(&self, idx: usize) -> bool {
        idx < self.insrt
    }

    /// Iterates over the moves in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Move> {
        self.moves.iter()
    }

    /// Removes every move.
    pub fn delete_all_moves(&mut self) {
        self.moves.clear();
        self.insrt = 0;
    }

    fn push(&mut self, mv: Move, preferred: bool) {
        if preferred {
            // The move at the insertion cursor (the first non-preferred move, if any) gets
            // bumped to the back; the new move takes its slot.
            if self.insrt < self.moves.len() {
                let displaced = self.moves[self.insrt];
                self.moves[self.insrt] = mv;
                self.moves.push(displaced);
            } else {
                self.moves.push(mv);
            }
            self.insrt += 1;
        } else {
            self.moves.push(mv);
        }
    }

    /// Adds a fully formed move. Useful for building a restricted search list. All fields must
    /// already be valid: the check annotation is not recomputed, and duplicates are not
    /// detected.
    pub fn add_move(&mut self, mv: Move, board: &Board) {
        let capture = !mv.is_castle() && !board.piece_at(mv.dst).is_empty();
        let preferred = capture || mv.is_promote() || mv.is_en_passant() || mv.gives_check();
        self.push(mv, preferred);
    }

    /// Deletes the move at `idx`, preserving the preferred bucket.
    pub fn delete_move(&mut self, idx: usize) {
        if self.insrt > idx {
            self.insrt -= 1;
            self.moves[idx] = self.moves[self.insrt];
            self.moves[self.insrt] = *self.moves.last().expect("list not empty");
            self.moves.pop();
        } else {
            self.moves.swap_remove(idx);
        }
    }

    /// Finds a move matching `mv`'s source and destination.
    pub fn search_src_dst(&self, mv: Move) -> Option<Move> {
        self.moves.iter().find(|m| m.src == mv.src && m.dst == mv.dst).copied()
    }

    /// Finds a move matching `mv`'s source, destination, and promotion.
    pub fn search_src_dst_promote(&self, mv: Move) -> Option<Move> {
        self.moves.iter()
            .find(|m| m.src == mv.src && m.dst == mv.dst && m.promote == mv.promote)
            .copied()
    }

    /// Finds an exact match for `mv`.
    pub fn search(&self, mv: Move) -> Option<Move> {
        self.moves.iter().find(|&&m| m == mv).copied()
    }

    /// Moves `mv` (matched by source, destination, and promotion; the check annotation of a
    /// hint move is often stale) to index 0. No-op if the move is not in the list.
    pub fn use_as_first_move(&mut self, mv: Move) {
        if mv == crate::MOVE_NONE {
            return;
        }
        let found = self.moves.iter().position(|m| {
            m.src == mv.src && m.dst == mv.dst && m.promote == mv.promote
        });
        let idx = match found {
            Some(idx) => idx,
            None => return,
        };

        let the_move = self.moves[idx];
        if idx >= self.insrt {
            // A non-preferred move: pull the first non-preferred move into its slot, then make
            // room at the front of the preferred bucket.
            self.moves[idx] = self.moves[self.insrt];
            self.moves[self.insrt] = self.moves[0];
            self.insrt += 1;
        } else {
            self.moves[idx] = self.moves[0];
        }
        self.moves[0] = the_move;
    }

    /// Selection-sorts the preferred bucket by decreasing capture worth.
    pub fn sort_by_cap_worth(&mut self, board: &Board) {
        let mut worth: Vec<i32> =
            self.moves[..self.insrt].iter().map(|&m| board.cap_worth(m)).collect();

        for i in 0..self.insrt.saturating_sub(1) {
            let mut best = i;
            let mut max_worth = 0;
            for j in i..self.insrt {
                if worth[j] > max_worth {
                    max_worth = worth[j];
                    best = j;
                }
            }
            if best != i {
                self.moves.swap(i, best);
                worth.swap(i, best);
            }
        }
    }
}

impl<'a> IntoIterator for &'a MoveList {
    type Item = &'a Move;
    type IntoIter = std::slice::Iter<'a, Move>;

    fn into_iter(self) -> Self::IntoIter {
        self.moves.iter()
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Generation proper.

/// Per-generation context, so the helpers do not haul six arguments around.
struct Gen<'a> {
    board: &'a Board,
    history: Option<&'a History>,
    turn: Color,
    ekcoord: Coord,
    cap_only: bool,
}

type PinMap = [u8; NUM_SQUARES];
type DcMap = [Coord; NUM_SQUARES];

impl Board {
    /// Generates all legal moves into `mvlist`. With `captures_only` set (and the side to move
    /// not in check) only captures and promotions are emitted. When a history table is given,
    /// history-window hits are ordered into the preferred bucket alongside captures,
    /// promotions, and checking moves.
    pub fn generate_legal_moves(
        &self,
        mvlist: &mut MoveList,
        captures_only: bool,
        history: Option<&History>,
    ) {
        mvlist.delete_all_moves();

        let turn = self.turn();
        let kcoord = self.king_coord(turn);
        let ekcoord = self.king_coord(!turn);
        let gen = Gen { board: self, history, turn, ekcoord, cap_only: captures_only };

        // Annotation maps, built before any move is emitted.
        let dclist = gen.gen_dc_list();
        let pins = gen.find_pins(kcoord);

        if self.checking_coord() == FLAG {
            gen.king_castle_moves(mvlist, kcoord);

            for &x in self.piece_coords(Piece::new(turn, PieceType::Pawn)) {
                gen.pawn_moves(mvlist, x, pins[x as usize], dclist[x as usize]);
            }
            // A queen move can never uncover a discovered check of its own.
            for &x in self.piece_coords(Piece::new(turn, PieceType::Queen)) {
                gen.slider_moves(mvlist, x, pins[x as usize],
                                 &PREFERRED_Q_DIRS[turn.index()], FLAG);
            }
            for &x in self.piece_coords(Piece::new(turn, PieceType::Bishop)) {
                gen.slider_moves(mvlist, x, pins[x as usize],
                                 &PREFERRED_B_DIRS[turn.index()], dclist[x as usize]);
            }
            for &x in self.piece_coords(Piece::new(turn, PieceType::Knight)) {
                // A pinned knight cannot move without exposing its king.
                if pins[x as usize] == FLAG {
                    gen.knight_moves(mvlist, x, dclist[x as usize]);
                }
            }
            for &x in self.piece_coords(Piece::new(turn, PieceType::Rook)) {
                gen.slider_moves(mvlist, x, pins[x as usize],
                                 &PREFERRED_R_DIRS[turn.index()], dclist[x as usize]);
            }
        } else if self.checking_coord() != DOUBLE_CHECK {
            // In check by exactly one piece: capture it or interpose.
            gen.evasions(mvlist, self.checking_coord(), &pins, &dclist, kcoord);
        }

        gen.king_moves(mvlist, kcoord, dclist[kcoord as usize]);
    }
}

impl<'a> Gen<'a> {
    #[inline]
    fn piece(&self, coord: Coord) -> Piece {
        self.board.piece_at(coord)
    }

    /// Are all squares between `src` and `dst` empty? `hole` names one square to pretend is
    /// empty (`FLAG` for none). `src` and `dst` must share a queen line.
    fn nopose(&self, src: Coord, dst: Coord, hole: Coord) -> bool {
        let dir = PRECALC.dir[src as usize][dst as usize] as usize;
        for &sq in &PRECALC.rays[dir][src as usize] {
            if sq == dst {
                return true;
            }
            if !self.piece(sq).is_empty() && sq != hole {
                return false;
            }
        }
        unreachable!("nopose called for unconnected squares");
    }

    /// Collects all sliders belonging to `color` that share a line with `from`, blocked or
    /// not. Queens first, then rooks, then bishops, to keep capture ordering sensible in the
    /// evasion generator.
    fn sliders_aligned(&self, from: Coord, color: Color) -> Vec<Coord> {
        let mut list = Vec::with_capacity(8);
        for &sq in self.board.piece_coords(Piece::new(color, PieceType::Queen)) {
            if is_queen_dir(PRECALC.dir[from as usize][sq as usize]) {
                list.push(sq);
            }
        }
        for &sq in self.board.piece_coords(Piece::new(color, PieceType::Rook)) {
            if is_rook_dir(PRECALC.dir[from as usize][sq as usize]) {
                list.push(sq);
            }
        }
        for &sq in self.board.piece_coords(Piece::new(color, PieceType::Bishop)) {
            if is_bishop_dir(PRECALC.dir[from as usize][sq as usize]) {
                list.push(sq);
            }
        }
        list
    }

    // Check calculators: does a piece landing on `to` check the enemy king? `from` is the
    // vacated square, treated as empty.

    #[inline]
    fn knight_chk(&self, to: Coord) -> Coord {
        if PRECALC.dir[to as usize][self.ekcoord as usize] == DIR_KNIGHT { to } else { FLAG }
    }

    #[inline]
    fn queen_chk(&self, to: Coord, from: Coord) -> Coord {
        let dir = PRECALC.dir[to as usize][self.ekcoord as usize];
        if is_queen_dir(dir) && self.nopose(to, self.ekcoord, from) { to } else { FLAG }
    }

    #[inline]
    fn bishop_chk(&self, to: Coord, from: Coord) -> Coord {
        let dir = PRECALC.dir[to as usize][self.ekcoord as usize];
        if is_bishop_dir(dir) && self.nopose(to, self.ekcoord, from) { to } else { FLAG }
    }

    #[inline]
    fn rook_chk(&self, to: Coord, from: Coord) -> Coord {
        let dir = PRECALC.dir[to as usize][self.ekcoord as usize];
        if is_rook_dir(dir) && self.nopose(to, self.ekcoord, from) { to } else { FLAG }
    }

    #[inline]
    fn pawn_chk(&self, to: Coord) -> Coord {
        let ek = self.ekcoord;
        if (file(ek) as i32 - file(to) as i32).abs() == 1
            && rank(to) as i32 - rank(ek) as i32 == (self.turn.index() as i32) * 2 - 1 {
            to
        } else {
            FLAG
        }
    }

    /// Given `dc` (the square of a friendly slider that the piece on `from` may be shielding),
    /// returns `dc` if moving from `from` to `to` uncovers the check, or `FLAG`.
    #[inline]
    fn calc_dc(&self, dc: Coord, from: Coord, to: Coord) -> Coord {
        if dc == FLAG {
            FLAG
        } else if PRECALC.dir[from as usize][dc as usize]
            == PRECALC.dir[to as usize][dc as usize] {
            FLAG // still on the shielding line
        } else {
            dc
        }
    }

    #[inline]
    fn history_hit(&self, from: Coord, to: Coord) -> bool {
        match self.history {
            Some(history) => history.hit(from, to, self.turn, self.board.ply()),
            None => false,
        }
    }

    fn add_move(&self, mvlist: &mut MoveList, from: Coord, to: Coord, promote: PieceType,
                dc: Coord, chk: Coord) {
        let chk = if dc == FLAG {
            chk
        } else if chk == FLAG {
            dc
        } else {
            DOUBLE_CHECK
        };
        let capture = from != to && !self.piece(to).is_empty();
        let preferred = capture
            || promote != PieceType::Empty
            || chk != FLAG
            || self.history_hit(from, to);
        mvlist.push(Move::new(from, to, promote, chk), preferred);
    }

    /// Generates the four promotion choices for a pawn reaching the last rank.
    fn promo(&self, mvlist: &mut MoveList, from: Coord, to: Coord, dc: Coord) {
        self.add_move(mvlist, from, to, PieceType::Queen, dc, self.queen_chk(to, from));
        self.add_move(mvlist, from, to, PieceType::Knight, dc, self.knight_chk(to));
        self.add_move(mvlist, from, to, PieceType::Rook, dc, self.rook_chk(to, from));
        self.add_move(mvlist, from, to, PieceType::Bishop, dc, self.bishop_chk(to, from));
    }

    /// Adds a move whose check annotation must be computed from the moving (or promoted)
    /// piece's type. Not used for castling.
    fn add_move_calc_chk(&self, mvlist: &mut MoveList, from: Coord, to: Coord,
                         promote: PieceType, dc: Coord) {
        let chk_type = match promote {
            PieceType::Empty | PieceType::Pawn => self.piece(from).ptype(),
            other => other,
        };
        let chk = match chk_type {
            PieceType::Knight => self.knight_chk(to),
            PieceType::Queen => self.queen_chk(to, from),
            PieceType::Bishop => self.bishop_chk(to, from),
            PieceType::Rook => self.rook_chk(to, from),
            PieceType::Pawn => self.pawn_chk(to),
            _ => FLAG, // a king never gives check directly
        };
        self.add_move(mvlist, from, to, promote, dc, chk);
    }

    /// Probes one sliding ray, stopping at the first occupied square.
    fn probe(&self, mvlist: &mut MoveList, ray: &[Coord], from: Coord, dc: Coord,
             ptype: PieceType) {
        for &to in ray {
            let relationship = rel(self.piece(to), self.turn);
            if relationship > self.cap_only as u8 {
                let chk = match ptype {
                    PieceType::Queen => self.queen_chk(to, from),
                    PieceType::Bishop => self.bishop_chk(to, from),
                    _ => self.rook_chk(to, from),
                };
                self.add_move(mvlist, from, to, PieceType::Empty,
                              self.calc_dc(dc, from, to), chk);
            }
            if relationship != REL_UNOCC {
                break;
            }
        }
    }

    /// Bishop, rook, and queen moves along the directions the piece is not pinned against.
    fn slider_moves(&self, mvlist: &mut MoveList, from: Coord, pintype: u8, dirs: &[u8],
                    dc: Coord) {
        let ptype = self.piece(from).ptype();
        for &dir in dirs {
            if pintype == FLAG || pintype == dir & 3 {
                self.probe(mvlist, &PRECALC.rays[dir as usize][from as usize], from, dc, ptype);
            }
        }
    }

    fn knight_moves(&self, mvlist: &mut MoveList, from: Coord, dc: Coord) {
        for &to in &PRECALC.knight_moves[self.turn.index()][from as usize] {
            if rel(self.piece(to), self.turn) > self.cap_only as u8 {
                self.add_move(mvlist, from, to, PieceType::Empty,
                              self.calc_dc(dc, from, to), self.knight_chk(to));
            }
        }
    }

    fn pawn_moves(&self, mvlist: &mut MoveList, from: Coord, pintype: u8, dc: Coord) {
        let slots = &PRECALC.pawn_moves[self.turn.index()][from as usize];
        let ebyte = self.board.en_passant_coord();

        // Captures. Slot 0 heads toward the h-file (pin axis 2 for White), slot 1 toward the
        // a-file (axis 0); the axes swap for Black.
        for (slot, &pindir) in [2u8, 0u8].iter().enumerate() {
            let to = slots[slot];
            if to == FLAG
                || !(pintype == FLAG || pintype == pindir ^ ((self.turn.index() as u8) << 1)) {
                continue;
            }
            let ep_dst = if ebyte == FLAG {
                FLAG
            } else if self.turn == Color::White {
                ebyte + 8
            } else {
                ebyte - 8
            };
            if rel(self.piece(to), self.turn) == REL_ENEMY {
                if rank(to) == 0 || rank(to) == 7 {
                    self.promo(mvlist, from, to, self.calc_dc(dc, from, to));
                } else {
                    self.add_move(mvlist, from, to, PieceType::Empty,
                                  self.calc_dc(dc, from, to), self.pawn_chk(to));
                }
            } else if ep_dst != FLAG && to == ep_dst && self.enpass_legal(from) {
                // En passant can create check three ways: the capturer uncovers a slider, the
                // *captured* pawn uncovers one, or the capturer checks directly. Triple check
                // being impossible, fold the captured-pawn vector into whichever slot is free.
                let mut dc1 = self.calc_dc(dc, from, to);
                let dc2 = self.enpass_dc(from);
                let mut pawnchk = self.pawn_chk(to);
                if dc1 == FLAG && dc2 != FLAG {
                    dc1 = dc2;
                } else if pawnchk == FLAG && dc2 != FLAG {
                    pawnchk = dc2;
                }
                self.add_move(mvlist, from, to, PieceType::Pawn, dc1, pawnchk);
            }
        }

        // Pushes. In captures-only mode, only pushes that promote.
        let to = slots[2];
        debug_assert!(to != FLAG, "pawn on its own back rank");
        let promote = rank(to) == 0 || rank(to) == 7;
        if promote as u8 >= self.cap_only as u8
            && rel(self.piece(to), self.turn) == REL_UNOCC
            && (pintype == FLAG || pintype == 1) {
            if promote {
                self.promo(mvlist, from, to, self.calc_dc(dc, from, to));
            } else {
                let start_rank = if self.turn == Color::White { 1 } else { 6 };
                if rank(from) == start_rank {
                    let to2 = slots[3];
                    if rel(self.piece(to2), self.turn) == REL_UNOCC {
                        self.add_move(mvlist, from, to2, PieceType::Empty,
                                      self.calc_dc(dc, from, to2), self.pawn_chk(to2));
                    }
                }
                self.add_move(mvlist, from, to, PieceType::Empty,
                              self.calc_dc(dc, from, to), self.pawn_chk(to));
            }
        }
    }

    /// Detects a discovered check produced by an en passant capture through the *captured*
    /// pawn's square.
    fn enpass_dc(&self, capturing_pawn: Coord) -> Coord {
        let ebyte = self.board.en_passant_coord();
        let dir = PRECALC.dir[ebyte as usize][self.ekcoord as usize];

        if is_queen_dir(dir) && self.nopose(ebyte, self.ekcoord, capturing_pawn) {
            for a in self.sliders_aligned(ebyte, self.turn) {
                if PRECALC.dir[a as usize][ebyte as usize] == dir
                    && self.nopose(a, ebyte, capturing_pawn) {
                    return a;
                }
            }
        }
        FLAG
    }

    /// The pin map cannot see a pin along the rank shared by both pawns and the king; an en
    /// passant capture removes two pieces from that rank at once. Verify it directly.
    fn enpass_legal(&self, capturing_pawn: Coord) -> bool {
        let kcoord = self.board.king_coord(self.turn);
        let ebyte = self.board.en_passant_coord();
        let dir = PRECALC.dir[kcoord as usize][capturing_pawn as usize];

        if (dir == 3 || dir == 7) && self.nopose(ebyte, kcoord, capturing_pawn) {
            for a in self.sliders_aligned(ebyte, !self.turn) {
                if PRECALC.dir[ebyte as usize][a as usize] == dir
                    && self.nopose(a, ebyte, capturing_pawn) {
                    return false;
                }
            }
        }
        true
    }

    /// When `list` is `None`, answers whether `from` is attacked (with `turn == onwho`, the
    /// sense used for king safety: x-rays pass through the moving king, and the enemy king's
    /// reach counts). When a list is given, collects every piece of `!onwho` that can *move
    /// to* `from`: that includes pawn pushes and en passant, which is exactly what the evasion
    /// generator needs.
    fn attacked(&self, mut list: Option<&mut Vec<Coord>>, from: Coord, turn: Color,
                onwho: Color) -> bool {
        // Knight attacks.
        for &sq in self.board.piece_coords(Piece::new(!onwho, PieceType::Knight)) {
            if PRECALC.dir[from as usize][sq as usize] == DIR_KNIGHT {
                match list {
                    None => return true,
                    Some(ref mut list) => list.push(sq),
                }
            }
        }

        let kcoord = self.board.king_coord(onwho);

        // Sliding attacks.
        for sq in self.sliders_aligned(from, !onwho) {
            let hole = if turn == onwho { kcoord } else { FLAG };
            if self.nopose(from, sq, hole) {
                match list {
                    None => return true,
                    Some(ref mut list) => list.push(sq),
                }
            }
        }

        // King attack, but only when asking about *enemy* reach (a king never double-checks,
        // so a plain answer suffices).
        let ekcoord = self.board.king_coord(!onwho);
        if turn == onwho
            && (rank(ekcoord) as i32 - rank(from) as i32).abs() < 2
            && (file(ekcoord) as i32 - file(from) as i32).abs() < 2 {
            return true;
        }

        // Pawns. The slot layout of `pawn_moves` is documented in precalc.rs.
        let slots = &PRECALC.pawn_moves[onwho.index()][from as usize];
        if turn != onwho && rel(self.piece(from), onwho) == REL_UNOCC {
            // Collecting moves *to* an empty square: pawn advances.
            let to = slots[2];
            let list = list.as_mut().expect("collecting mode always passes a list");
            if to != FLAG && rel(self.piece(to), onwho) == REL_ENEMY && self.piece(to).is_pawn() {
                list.push(to);
            } else if rank(from) == if onwho == Color::White { 4 } else { 3 }
                && to != FLAG
                && rel(self.piece(to), onwho) == REL_UNOCC {
                let to2 = slots[3];
                if to2 != FLAG
                    && rel(self.piece(to2), onwho) == REL_ENEMY
                    && self.piece(to2).is_pawn() {
                    list.push(to2);
                }
            }
        } else {
            // Pawn captures into `from`.
            for &to in &slots[0..2] {
                if to != FLAG && rel(self.piece(to), onwho) == REL_ENEMY
                    && self.piece(to).is_pawn() {
                    match list {
                        None => return true,
                        Some(ref mut list) => list.push(to),
                    }
                }
            }
            // And en passant, when `from` is the pawn that just moved two squares.
            if from == self.board.en_passant_coord() && turn != onwho {
                let list = list.as_mut().expect("collecting mode always passes a list");
                for &delta in &[-1i32, 1] {
                    let beside = (from as i32 + delta) as Coord;
                    if beside < NUM_SQUARES as Coord
                        && rank(beside) == rank(from)
                        && rel(self.piece(beside), onwho) == REL_ENEMY
                        && self.piece(beside).is_pawn() {
                        list.push(beside);
                    }
                }
            }
        }
        false
    }

    /// King in check by one piece: generate captures of the checker and interpositions,
    /// walking from the checker toward the king so captures come out first.
    fn evasions(&self, mvlist: &mut MoveList, checker: Coord, pins: &PinMap, dclist: &DcMap,
                kcoord: Coord) {
        // Knight checks have no ray toward the king; the walk below stops at the checker.
        let dir = PRECALC.dir[checker as usize][kcoord as usize];
        let empty: &[Coord] = &[];
        let ray: &[Coord] = if is_queen_dir(dir) {
            &PRECALC.rays[dir as usize][checker as usize]
        } else {
            empty
        };
        let mut target = checker;
        let mut ray_idx = 0;

        while target != kcoord {
            let mut attackers = Vec::with_capacity(8);
            self.attacked(Some(&mut attackers), target, self.turn, !self.turn);

            for &src in &attackers {
                let mut dest = target;
                let mut enpass = false;
                if self.piece(src).is_pawn() && rank(src) == rank(target) {
                    // The checker is a freshly double-pushed pawn; capture it en passant.
                    // (A pawn-push discovered check can never be answered en passant, so no
                    // extra legality check is needed here.)
                    debug_assert_eq!(dest, self.board.en_passant_coord());
                    enpass = true;
                    dest = if self.turn == Color::White { dest + 8 } else { dest - 8 };
                }

                let pintype = pins[src as usize];
                if pintype == FLAG
                    || (!self.piece(src).is_knight()
                        && pintype == PRECALC.dir[src as usize][dest as usize] & 3) {
                    let mut dc = self.calc_dc(dclist[src as usize], src, dest);
                    if enpass && dc == FLAG {
                        dc = self.enpass_dc(src);
                    }
                    if self.piece(src).is_pawn() && (dest < 8 || dest > 55) {
                        self.promo(mvlist, src, dest, dc);
                    } else {
                        let promote = if enpass { PieceType::Pawn } else { PieceType::Empty };
                        self.add_move_calc_chk(mvlist, src, dest, promote, dc);
                    }
                }
            }

            if self.piece(target).is_knight() {
                break; // nothing interposes against a knight
            }
            target = ray[ray_idx];
            ray_idx += 1;
        }
    }

    /// Marks every friendly piece pinned against the king at `kcoord` with its pin axis.
    fn find_pins(&self, kcoord: Coord) -> PinMap {
        let mut pins = [FLAG; NUM_SQUARES];

        for slider in self.sliders_aligned(kcoord, !self.turn) {
            let dir = PRECALC.dir[kcoord as usize][slider as usize];
            let ray = &PRECALC.rays[dir as usize][kcoord as usize];

            let mut iter = ray.iter();
            let blocker = loop {
                match iter.next() {
                    Some(&sq) if self.piece(sq).is_empty() => continue,
                    Some(&sq) => break sq,
                    None => unreachable!("slider aligned but ray ended"),
                }
            };
            if !self.piece(blocker).is_friend(self.turn) {
                continue;
            }
            // The next occupied square must be the slider itself for a true pin.
            let next = loop {
                match iter.next() {
                    Some(&sq) if self.piece(sq).is_empty() => continue,
                    Some(&sq) => break sq,
                    None => unreachable!("slider aligned but ray ended"),
                }
            };
            if next == slider {
                pins[blocker as usize] = dir & 3;
            }
        }
        pins
    }

    /// Marks every friendly piece that could give discovered check, with the square of the
    /// slider it is shielding.
    ///
    /// One blind spot is inherited by design: a king on the rank of a freshly double-pushed
    /// friendly pawn, with an enemy pawn able to capture it en passant and a rook behind, is
    /// not seen here; the en passant helpers handle that family separately.
    fn gen_dc_list(&self) -> DcMap {
        let mut dclist = [FLAG; NUM_SQUARES];

        for slider in self.sliders_aligned(self.ekcoord, self.turn) {
            let dir = PRECALC.dir[slider as usize][self.ekcoord as usize];
            let ray = &PRECALC.rays[dir as usize][slider as usize];

            let blocker = match ray.iter().find(|&&sq| !self.piece(sq).is_empty()) {
                Some(&sq) => sq,
                None => continue,
            };
            if self.piece(blocker).is_friend(self.turn)
                && self.nopose(blocker, self.ekcoord, FLAG) {
                dclist[blocker as usize] = slider;
            }
        }
        dclist
    }

    fn castle_try(&self, mvlist: &mut MoveList, k_src: Coord, k_dst: Coord, r_src: Coord,
                  r_dst: Coord, is_oo: bool) {
        // Every square between the king's and rook's start and end squares must be vacant
        // except for the two castling pieces themselves, and the king's path must be safe.
        let rook_can_move = r_src == r_dst
            || ((self.piece(r_dst).is_empty() || r_dst == k_src)
                && self.nopose(r_src, r_dst, k_src));
        let king_can_move = k_src == k_dst
            || ((self.piece(k_dst).is_empty() || k_dst == r_src)
                && self.nopose(k_src, k_dst, r_src)
                && !self.castle_attacked(k_src, k_dst));

        if rook_can_move && king_can_move {
            let mut mv = Move::from_castle(is_oo, self.turn);
            mv.chk = self.rook_chk(r_dst, k_src);
            let preferred = mv.chk != FLAG; // castling is otherwise never preferred
            mvlist.push(mv, preferred);
        }
    }

    /// Is any square the king crosses (excluding `src`, including `dst`) attacked?
    fn castle_attacked(&self, src: Coord, dst: Coord) -> bool {
        let dir = PRECALC.dir[src as usize][dst as usize] as usize;
        for &sq in &PRECALC.rays[dir][src as usize] {
            if self.attacked(None, sq, self.turn, self.turn) {
                return true;
            }
            if sq == dst {
                break;
            }
        }
        false
    }

    fn king_castle_moves(&self, mvlist: &mut MoveList, k_src: Coord) {
        if self.cap_only {
            return;
        }
        let castling = &PRECALC.castling[self.turn.index()];
        debug_assert_eq!(k_src, castling.king_start);

        if self.board.can_castle_oo(self.turn) {
            self.castle_try(mvlist, k_src, castling.end_oo.king,
                            castling.rook_oo_start, castling.end_oo.rook, true);
        }
        if self.board.can_castle_ooo(self.turn) {
            self.castle_try(mvlist, k_src, castling.end_ooo.king,
                            castling.rook_ooo_start, castling.end_ooo.rook, false);
        }
    }

    fn king_moves(&self, mvlist: &mut MoveList, from: Coord, dc: Coord) {
        for &dir in &PREFERRED_K_DIRS[self.turn.index()] {
            let to = match PRECALC.rays[dir as usize][from as usize].first() {
                Some(&to) => to,
                None => continue,
            };
            if rel(self.piece(to), self.turn) > self.cap_only as u8
                && !self.attacked(None, to, self.turn, self.turn) {
                self.add_move(mvlist, from, to, PieceType::Empty,
                              self.calc_dc(dc, from, to), FLAG);
            }
        }
    }
}

/// Recomputes the checking coordinate for `turn`'s king from scratch. Slow; used when setting
/// up a position.
pub(crate) fn calc_ncheck(board: &Board, turn: Color) -> Coord {
    let kcoord = board.king_coord(turn);
    let gen = Gen {
        board,
        history: None,
        turn,
        ekcoord: board.king_coord(!turn),
        cap_only: false,
    };
    let mut attackers = Vec::with_capacity(4);
    gen.attacked(Some(&mut attackers), kcoord, turn, turn);
    match attackers.len() {
        0 => FLAG,
        1 => attackers[0],
        _ => DOUBLE_CHECK,
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use super::*;

    fn generate(fen: &str) -> (Board, MoveList) {
        let board: Board = fen.parse().expect("legal position");
        let mut mvlist = MoveList::new();
        board.generate_legal_moves(&mut mvlist, false, None);
        (board, mvlist)
    }

    fn perft(board: &mut Board, depth: u32) -> u64 {
        if depth == 0 {
            return 1;
        }
        let mut mvlist = MoveList::new();
        board.generate_legal_moves(&mut mvlist, false, None);
        if depth == 1 {
            return mvlist.num_moves() as u64;
        }
        let mut nodes = 0;
        for i in 0..mvlist.num_moves() {
            board.make_move(mvlist.moves(i));
            nodes += perft(board, depth - 1);
            board.unmake_move();
        }
        nodes
    }

    #[test]
    fn perft_start_position() {
        let mut board = Board::new();
        assert_eq!(perft(&mut board, 1), 20);
        assert_eq!(perft(&mut board, 2), 400);
        assert_eq!(perft(&mut board, 3), 8_902);
        assert_eq!(perft(&mut board, 4), 197_281);
    }

    #[test]
    fn perft_kiwipete() {
        // Position 2 from the chessprogramming wiki; exercises castling, en passant, pins,
        // and promotions all at once.
        let mut board: Board =
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1"
                .parse().expect("legal");
        assert_eq!(perft(&mut board, 1), 48);
        assert_eq!(perft(&mut board, 2), 2_039);
        assert_eq!(perft(&mut board, 3), 97_862);
    }

    #[test]
    fn perft_en_passant_pin() {
        // Position 3: the famous en-passant-along-the-rank pin trap.
        let mut board: Board = "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1"
            .parse().expect("legal");
        assert_eq!(perft(&mut board, 1), 14);
        assert_eq!(perft(&mut board, 2), 191);
        assert_eq!(perft(&mut board, 3), 2_812);
        assert_eq!(perft(&mut board, 4), 43_238);
    }

    #[test]
    fn double_check_only_king_moves() {
        // Knight on f6 and rook on e1 both check the black king on e8.
        let (board, mvlist) = generate("4k3/8/5N2/8/8/8/8/4RK2 b - - 0 1");
        assert!(board.checking_coord() == DOUBLE_CHECK);
        assert!(mvlist.num_moves() > 0);
        for mv in &mvlist {
            assert!(board.piece_at(mv.src).is_king(), "only king moves escape double check");
        }
    }

    #[test]
    fn single_check_evasions_only() {
        // Rook checks along the e-file; legal answers are captures of the rook,
        // interpositions, and king moves.
        let (board, mvlist) = generate("4k3/8/8/8/4R3/8/8/2B1K3 b - - 0 1");
        assert!(board.is_in_check());
        for mv in &mvlist {
            let evading_king = board.piece_at(mv.src).is_king();
            let capturing_checker = mv.dst == board.checking_coord();
            let interposing = crate::file(mv.dst) == 4
                && crate::rank(mv.dst) > crate::rank(board.checking_coord())
                && crate::rank(mv.dst) < 7;
            assert!(evading_king || capturing_checker || interposing,
                    "unexpected evasion {:?}", mv);
        }
    }

    #[test]
    fn pinned_piece_stays_on_its_axis() {
        // The white bishop on d2 is pinned along the e1-a5 diagonal by the bishop on a5.
        let (_, mvlist) = generate("4k3/8/8/b7/8/8/3B4/4K3 w - - 0 1");
        for mv in &mvlist {
            if mv.src == crate::parse_coord("d2").unwrap() {
                let on_axis = ["c3", "b4", "a5"].iter()
                    .any(|s| crate::parse_coord(s).unwrap() == mv.dst);
                assert!(on_axis, "pinned bishop left its pin axis: {:?}", mv);
            }
        }
    }

    #[test]
    fn pinned_knight_cannot_move() {
        // White knight on e3 is pinned to its king by the rook on e8.
        let (_, mvlist) = generate("3kr3/8/8/8/8/4N3/8/4K3 w - - 0 1");
        for mv in &mvlist {
            assert!(mv.src != crate::parse_coord("e3").unwrap(), "pinned knight moved");
        }
    }

    #[test]
    fn en_passant_rank_pin_is_respected() {
        // King, both pawns, and an enemy rook share rank 5: bxc6 e.p. would remove both pawns
        // from the rank and expose the king, so it must not be generated.
        let board: Board = "8/8/8/KPp4r/8/8/8/7k w - c6 0 2".parse().expect("legal");
        let mut mvlist = MoveList::new();
        board.generate_legal_moves(&mut mvlist, false, None);
        assert!(mvlist.iter().all(|m| !m.is_en_passant()),
                "en passant through a rank pin");

        // With the king off the rank the same capture is fine.
        let board: Board = "8/8/8/1Pp4r/8/8/8/K6k w - c6 0 2".parse().expect("legal");
        board.generate_legal_moves(&mut mvlist, false, None);
        assert!(mvlist.iter().any(|m| m.is_en_passant()));
    }

    #[test]
    fn en_passant_requires_target() {
        let (_, mvlist) = generate("8/8/8/KPp4r/8/8/8/7k w - - 0 2");
        assert!(mvlist.iter().all(|m| !m.is_en_passant()));
    }

    #[test]
    fn check_annotations_are_correct() {
        let (board, mvlist) = generate("4k3/8/8/8/8/8/4R3/4K2N w - - 0 1");
        for mv in &mvlist {
            // Verify each annotation against the ground truth after making the move.
            let mut scratch = board.clone();
            scratch.make_move(*mv);
            let truth = calc_ncheck(&scratch, scratch.turn());
            assert_eq!(mv.chk, truth, "bad check annotation on {:?}", mv);
        }
    }

    #[test]
    fn preferred_bucket_holds_captures_and_checks() {
        let (board, mvlist) = generate("4k3/8/8/3p4/4P3/8/8/4K3 w - - 0 1");
        let capture = mvlist.iter().position(|m| !board.piece_at(m.dst).is_empty())
            .expect("exd5 exists");
        assert!(mvlist.is_preferred_move(capture));
    }

    #[test]
    fn use_as_first_move_promotes_to_front() {
        let (_, mut mvlist) = generate(
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1");
        let target = mvlist.moves(mvlist.num_moves() - 1);
        mvlist.use_as_first_move(target);
        assert_eq!(mvlist.moves(0), target);
        assert_eq!(mvlist.num_moves(), 20);
    }

    #[test]
    fn captures_only_generates_captures_and_promotions() {
        let board: Board = "4k3/1P6/8/3p4/4P3/8/8/4K3 w - - 0 1".parse().expect("legal");
        let mut mvlist = MoveList::new();
        board.generate_legal_moves(&mut mvlist, true, None);
        for mv in &mvlist {
            assert!(!board.piece_at(mv.dst).is_empty() || mv.is_promote(),
                    "quiet move {:?} in a captures-only list", mv);
        }
        assert!(mvlist.iter().any(|m| m.is_promote()));
    }
}
