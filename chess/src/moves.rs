//! Chess moves and their string representations.
//
//  This Source Code Form is subject to the terms of the Mozilla Public
//  License, v. 2.0. If a copy of the MPL was not distributed with this
//  file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
////////////////////////////////////////////////////////////////////////////////////////////////////
use lazy_static::lazy_static;
use regex::Regex;

use crate::board::{Board, MoveList};
use crate::{
    coord_name, file, parse_coord, rank, Color, Coord, Error, PieceType, Result, FLAG,
};

////////////////////////////////////////////////////////////////////////////////////////////////////
/// Ways to write a move as a string.
///
/// See <http://en.wikipedia.org/wiki/Chess_notation>.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MoveNotation {
    /// Standard algebraic notation, the most human-readable (example: `bxa8=Q`).
    San,
    /// Coordinate algebraic notation, no dashes, lowercase promotion (example: `b7a8q`).
    Can,
    /// A dotted dump of the raw move fields, for debugging.
    Debug,
}

/// Ways to write castling moves.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MoveCastleStyle {
    /// PGN style `O-O` / `O-O-O`. The preferred internal representation.
    OO,
    /// FIDE style with zeros, `0-0` / `0-0-0`.
    Fide,
    /// King-captures-own-rook, as UCI uses for Chess960 transport.
    KxR,
    /// King-moves-two-squares.
    K2,
}

/// A move-formatting style.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MoveStyle {
    /// The notation to use.
    pub notation: MoveNotation,
    /// How castling is written.
    pub castle_style: MoveCastleStyle,
    /// Append `+` and `#` (when known) to moves?
    pub show_check: bool,
}

impl MoveStyle {
    /// Convenience constructor.
    pub fn new(notation: MoveNotation, castle_style: MoveCastleStyle, show_check: bool)
        -> MoveStyle {
        MoveStyle { notation, castle_style, show_check }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
/// A chess move.
///
/// Moves are passed around by value; the whole structure packs into a 32-bit word and two moves
/// are equal iff all four fields match.
///
/// Castling moves use a special convention: `src == dst`, with bit 0 of `src` holding the side
/// to move and bit 1 distinguishing O-O (clear) from O-O-O (set). The `promote` field is
/// `PieceType::Empty` for most moves, the promotion piece type for promotions, and
/// `PieceType::Pawn` as a sentinel for en passant captures.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(C)]
pub struct Move {
    /// Source square, or `FLAG` for the null move.
    pub src: Coord,
    /// Destination square.
    pub dst: Coord,
    /// Promotion piece type, or the en passant sentinel.
    pub promote: PieceType,
    /// Check annotation: `FLAG` for no check, the checker's square for single check, or
    /// `DOUBLE_CHECK`.
    pub chk: Coord,
}

/// The null move.
pub const MOVE_NONE: Move = Move { src: FLAG, dst: 0, promote: PieceType::Empty, chk: FLAG };

impl Move {
    /// Creates a move from raw fields.
    #[inline]
    pub fn new(src: Coord, dst: Coord, promote: PieceType, chk: Coord) -> Move {
        Move { src, dst, promote, chk }
    }

    /// Builds a castling move for `turn`. The check annotation is left unset (`FLAG`); move
    /// generation computes the real one.
    pub fn from_castle(castle_oo: bool, turn: Color) -> Move {
        let sq = (if castle_oo { 0u8 } else { 2u8 }) | turn.index() as u8;
        Move { src: sq, dst: sq, promote: PieceType::Empty, chk: FLAG }
    }

    /// Is this a castling move?
    #[inline]
    pub fn is_castle(&self) -> bool {
        self.src == self.dst && self.src != FLAG
    }

    /// Is this king-side castling?
    #[inline]
    pub fn is_castle_oo(&self) -> bool {
        self.is_castle() && self.src & 2 == 0
    }

    /// Is this queen-side castling?
    #[inline]
    pub fn is_castle_ooo(&self) -> bool {
        self.is_castle() && self.src & 2 != 0
    }

    /// Is this an en passant capture?
    #[inline]
    pub fn is_en_passant(&self) -> bool {
        self.promote == PieceType::Pawn
    }

    /// Is this a pawn promotion?
    #[inline]
    pub fn is_promote(&self) -> bool {
        self.promote != PieceType::Empty && !self.is_en_passant()
    }

    /// Does this move give check (single or double)?
    #[inline]
    pub fn gives_check(&self) -> bool {
        self.chk != FLAG
    }

    /// Takes a king-moves-two or king-captures-rook style move and converts it to the internal
    /// castle convention. Does nothing if the move is not actually a castle. A board is needed
    /// because a king capturing its own rook one square away would otherwise look like an
    /// ordinary king move.
    pub fn unmangle_castle(&mut self, board: &Board) {
        if self.src == FLAG || self.is_castle() {
            return;
        }
        let turn = board.turn();
        let castling = &crate::precalc::PRECALC.castling[turn.index()];
        if self.src != castling.king_start || !board.piece_at(self.src).is_king() {
            return;
        }

        // King-captures-own-rook style.
        if board.piece_at(self.dst).is_friend(turn)
            && board.piece_at(self.dst).ptype() == PieceType::Rook {
            if self.dst == castling.rook_oo_start && board.can_castle_oo(turn) {
                *self = Move::from_castle(true, turn);
            } else if self.dst == castling.rook_ooo_start && board.can_castle_ooo(turn) {
                *self = Move::from_castle(false, turn);
            }
            return;
        }

        // King-moves-two style.
        if rank(self.src) == rank(self.dst) {
            let delta = file(self.dst) as i32 - file(self.src) as i32;
            if delta == 2 && board.can_castle_oo(turn) {
                *self = Move::from_castle(true, turn);
            } else if delta == -2 && board.can_castle_ooo(turn) {
                *self = Move::from_castle(false, turn);
            }
        }
    }

    /// Is this move legal on `board`?
    pub fn is_legal(&self, board: &Board) -> bool {
        board.find_legal(*self).is_some()
    }

    /// Writes the move in the given style. A board is needed for SAN disambiguation and
    /// mate detection; without one a plainer rendering is produced.
    pub fn to_string_styled(&self, style: &MoveStyle, board: Option<&Board>) -> String {
        if self.src == FLAG {
            return "(none)".into();
        }
        if style.notation == MoveNotation::Debug {
            return format!("{}{}.{}.{:02x}",
                           coord_name(self.src), coord_name(self.dst),
                           self.promote as u8, self.chk);
        }

        let mut s = if self.is_castle() {
            self.castle_string(style)
        } else {
            match style.notation {
                MoveNotation::Can => self.can_string(),
                MoveNotation::San => self.san_string(board),
                MoveNotation::Debug => unreachable!(),
            }
        };

        if style.show_check && self.gives_check() {
            s.push(if self.is_mate(board) { '#' } else { '+' });
        }
        s
    }

    fn castle_string(&self, style: &MoveStyle) -> String {
        let turn = Color::from_index((self.src & 1) as usize);
        let castling = &crate::precalc::PRECALC.castling[turn.index()];
        match style.castle_style {
            MoveCastleStyle::OO => {
                if self.is_castle_oo() { "O-O".into() } else { "O-O-O".into() }
            }
            MoveCastleStyle::Fide => {
                if self.is_castle_oo() { "0-0".into() } else { "0-0-0".into() }
            }
            MoveCastleStyle::KxR => {
                let rook = if self.is_castle_oo() {
                    castling.rook_oo_start
                } else {
                    castling.rook_ooo_start
                };
                format!("{}{}", coord_name(castling.king_start), coord_name(rook))
            }
            MoveCastleStyle::K2 => {
                let end = if self.is_castle_oo() {
                    castling.end_oo.king
                } else {
                    castling.end_ooo.king
                };
                format!("{}{}", coord_name(castling.king_start), coord_name(end))
            }
        }
    }

    fn can_string(&self) -> String {
        let mut s = format!("{}{}", coord_name(self.src), coord_name(self.dst));
        if self.is_promote() {
            s.push(match self.promote {
                PieceType::Queen => 'q',
                PieceType::Rook => 'r',
                PieceType::Bishop => 'b',
                PieceType::Knight => 'n',
                _ => '?',
            });
        }
        s
    }

    fn san_string(&self, board: Option<&Board>) -> String {
        let board = match board {
            Some(board) => board,
            None => return self.can_string(), // cannot disambiguate without a board
        };
        let piece = board.piece_at(self.src);
        let capture = !board.piece_at(self.dst).is_empty() || self.is_en_passant();
        let mut s = String::new();

        if piece.is_pawn() {
            if capture {
                s.push((b'a' + file(self.src)) as char);
                s.push('x');
            }
            s += &coord_name(self.dst);
            if self.is_promote() {
                s.push('=');
                s.push(match self.promote {
                    PieceType::Queen => 'Q',
                    PieceType::Rook => 'R',
                    PieceType::Bishop => 'B',
                    PieceType::Knight => 'N',
                    _ => '?',
                });
            }
            return s;
        }

        s.push(match piece.ptype() {
            PieceType::King => 'K',
            PieceType::Queen => 'Q',
            PieceType::Rook => 'R',
            PieceType::Bishop => 'B',
            PieceType::Knight => 'N',
            _ => '?',
        });

        // Disambiguate against sibling moves of the same piece type to the same square.
        let mut mvlist = MoveList::new();
        board.generate_legal_moves(&mut mvlist, false, None);
        let mut same_file = false;
        let mut same_rank = false;
        let mut ambiguous = false;
        for i in 0..mvlist.num_moves() {
            let other = mvlist.moves(i);
            if other.dst == self.dst && other.src != self.src && !other.is_castle()
                && board.piece_at(other.src).ptype() == piece.ptype() {
                ambiguous = true;
                if file(other.src) == file(self.src) {
                    same_file = true;
                }
                if rank(other.src) == rank(self.src) {
                    same_rank = true;
                }
            }
        }
        if ambiguous {
            if !same_file {
                s.push((b'a' + file(self.src)) as char);
            } else if !same_rank {
                s.push((b'1' + rank(self.src)) as char);
            } else {
                s += &coord_name(self.src);
            }
        }

        if capture {
            s.push('x');
        }
        s += &coord_name(self.dst);
        s
    }

    /// Does this move checkmate? Needs a board; without one, returns false (a bare `+` is
    /// shown instead).
    fn is_mate(&self, board: Option<&Board>) -> bool {
        let board = match board {
            Some(board) => board,
            None => return false,
        };
        if self.chk == FLAG {
            return false;
        }
        let mut scratch = board.clone();
        scratch.make_move(*self);
        let mut mvlist = MoveList::new();
        scratch.generate_legal_moves(&mut mvlist, false, None);
        mvlist.num_moves() == 0
    }

    /// Parses a move string against a board. Accepts coordinate algebraic (`e2e4`, `b7a8q`),
    /// SAN (`Nbd2`, `exd6`, `e8=Q`), all supported castle spellings, and king-moves-two or
    /// king-captures-rook castle transport. The returned move carries the correct check
    /// annotation and is guaranteed legal.
    pub fn parse(s: &str, board: &Board) -> Result<Move> {
        lazy_static! {
            static ref CAN_RE: Regex =
                Regex::new(r"^([a-h][1-8])([a-h][1-8])([qrbnQRBN]?)$").expect("regex");
            static ref SAN_RE: Regex = Regex::new(
                r"^([KQRBN]?)([a-h]?)([1-8]?)(x?)([a-h][1-8])(?:=?([QRBN]))?[+#]?$")
                .expect("regex");
        }

        let s = s.trim();
        match s.trim_end_matches(|c| c == '+' || c == '#') {
            "O-O" | "0-0" | "o-o" => {
                return board
                    .find_legal(Move::from_castle(true, board.turn()))
                    .ok_or(Error::IllegalMove);
            }
            "O-O-O" | "0-0-0" | "o-o-o" => {
                return board
                    .find_legal(Move::from_castle(false, board.turn()))
                    .ok_or(Error::IllegalMove);
            }
            _ => { }
        }

        if let Some(caps) = CAN_RE.captures(s) {
            let src = parse_coord(&caps[1]).expect("regex-matched square");
            let dst = parse_coord(&caps[2]).expect("regex-matched square");
            let promote = match caps[3].to_ascii_lowercase().as_str() {
                "" => PieceType::Empty,
                "q" => PieceType::Queen,
                "r" => PieceType::Rook,
                "b" => PieceType::Bishop,
                "n" => PieceType::Knight,
                _ => unreachable!(),
            };
            let mut mv = Move::new(src, dst, promote, FLAG);
            mv.unmangle_castle(board);
            return board.find_legal(mv).ok_or(Error::IllegalMove);
        }

        if let Some(caps) = SAN_RE.captures(s) {
            let ptype = match &caps[1] {
                "" => PieceType::Pawn,
                "K" => PieceType::King,
                "Q" => PieceType::Queen,
                "R" => PieceType::Rook,
                "B" => PieceType::Bishop,
                "N" => PieceType::Knight,
                _ => unreachable!(),
            };
            let src_file = caps[2].chars().next().map(|c| c as u8 - b'a');
            let src_rank = caps[3].chars().next().map(|c| c as u8 - b'1');
            let dst = parse_coord(&caps[5]).expect("regex-matched square");
            let promote = match caps.get(6).map(|m| m.as_str()) {
                None | Some("") => PieceType::Empty,
                Some("Q") => PieceType::Queen,
                Some("R") => PieceType::Rook,
                Some("B") => PieceType::Bishop,
                Some("N") => PieceType::Knight,
                _ => unreachable!(),
            };

            let mut mvlist = MoveList::new();
            board.generate_legal_moves(&mut mvlist, false, None);
            let mut found = None;
            for i in 0..mvlist.num_moves() {
                let mv = mvlist.moves(i);
                if mv.is_castle() || mv.dst != dst {
                    continue;
                }
                if board.piece_at(mv.src).ptype() != ptype {
                    continue;
                }
                if let Some(f) = src_file {
                    if file(mv.src) != f {
                        continue;
                    }
                }
                if let Some(r) = src_rank {
                    if rank(mv.src) != r {
                        continue;
                    }
                }
                let mv_promote = if mv.is_en_passant() { PieceType::Empty } else { mv.promote };
                if mv_promote != promote {
                    continue;
                }
                if found.is_some() {
                    return Err(Error::ParseError); // ambiguous
                }
                found = Some(mv);
            }
            return found.ok_or(Error::IllegalMove);
        }

        Err(Error::ParseError)
    }
}

impl Default for Move {
    fn default() -> Move {
        MOVE_NONE
    }
}

/// Writes out a sequence of moves in the given style, stopping at the first move that is not
/// legal from the running position. Returns the number of moves written.
pub fn moves_to_string(dst: &mut String, moves: &[Move], style: &MoveStyle, board: &Board)
    -> usize {
    let mut scratch = board.clone();
    let mut count = 0;

    for &mv in moves {
        let legal = match scratch.find_legal(mv) {
            Some(legal) => legal,
            None => break,
        };
        if count > 0 {
            dst.push(' ');
        }
        *dst += &legal.to_string_styled(style, Some(&scratch));
        scratch.make_move(legal);
        count += 1;
    }
    count
}

////////////////////////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use super::*;
    use crate::Board;

    fn style(notation: MoveNotation) -> MoveStyle {
        MoveStyle::new(notation, MoveCastleStyle::OO, true)
    }

    #[test]
    fn move_fits_in_a_word() {
        assert_eq!(std::mem::size_of::<Move>(), 4);
    }

    #[test]
    fn castle_encoding() {
        let wk = Move::from_castle(true, Color::White);
        assert!(wk.is_castle() && wk.is_castle_oo() && !wk.is_castle_ooo());
        let bq = Move::from_castle(false, Color::Black);
        assert!(bq.is_castle() && bq.is_castle_ooo());
        assert_ne!(wk, Move::from_castle(true, Color::Black));
    }

    #[test]
    fn parse_coordinate_moves() {
        let board = Board::new();
        let mv = Move::parse("e2e4", &board).expect("legal");
        assert_eq!((mv.src, mv.dst), (parse_coord("e2").unwrap(), parse_coord("e4").unwrap()));
        assert!(Move::parse("e2e5", &board).is_err());
        assert!(Move::parse("zzz", &board).is_err());
    }

    #[test]
    fn parse_san_moves() {
        let board = Board::new();
        let mv = Move::parse("Nf3", &board).expect("legal");
        assert_eq!(mv.dst, parse_coord("f3").unwrap());
        assert_eq!(Move::parse("e4", &board).expect("legal").dst, parse_coord("e4").unwrap());
    }

    #[test]
    fn castle_round_trip_spellings() {
        let board: Board = "r3k2r/pppppppp/8/8/8/8/PPPPPPPP/R3K2R w KQkq - 0 1"
            .parse().expect("legal");
        for spelling in &["O-O", "0-0", "e1g1", "e1h1"] {
            let mv = Move::parse(spelling, &board)
                .unwrap_or_else(|_| panic!("{} should parse", spelling));
            assert!(mv.is_castle_oo(), "{} should be O-O", spelling);
        }
        let mv = Move::parse("O-O-O", &board).expect("legal");
        assert!(mv.is_castle_ooo());
        assert_eq!(mv.to_string_styled(&style(MoveNotation::San), Some(&board)), "O-O-O");
    }

    #[test]
    fn san_disambiguation() {
        // Two knights can reach d2; SAN needs the file.
        let board: Board = "4k3/8/8/8/8/5N2/8/1N2K3 w - - 0 1".parse().expect("legal");
        let mv = Move::parse("Nbd2", &board).expect("legal");
        assert_eq!(mv.to_string_styled(&style(MoveNotation::San), Some(&board)), "Nbd2");
        assert!(Move::parse("Nd2", &board).is_err()); // ambiguous
    }

    #[test]
    fn promotion_strings() {
        let board: Board = "8/P7/8/8/8/8/1k6/4K3 w - - 0 1".parse().expect("legal");
        let mv = Move::parse("a7a8q", &board).expect("legal");
        assert!(mv.is_promote());
        assert_eq!(mv.to_string_styled(&style(MoveNotation::Can), Some(&board)), "a7a8q");
        assert_eq!(mv.to_string_styled(&style(MoveNotation::San), Some(&board)), "a8=Q");
    }
}
