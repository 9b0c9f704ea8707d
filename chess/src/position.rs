//! The static position snapshot.
//
//  This Source Code Form is subject to the terms of the Mozilla Public
//  License, v. 2.0. If a copy of the MPL was not distributed with this
//  file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
////////////////////////////////////////////////////////////////////////////////////////////////////
use std::fmt;
use std::str::FromStr;

use crate::precalc::{is_queen_dir, DIR_KNIGHT, PRECALC};
use crate::{
    coord_at, coord_name, file, parse_coord, rank, Color, Coord, Error, Piece, PieceType, Result,
    DOUBLE_CHECK, FLAG, NUM_SQUARES,
};

/// Castling-rights bit for king-side castling, shifted left by the color index.
pub const CASTLE_OO: u8 = 0x1;
/// Castling-rights bit for queen-side castling, shifted left by the color index.
pub const CASTLE_OOO: u8 = 0x4;
/// Both castling-rights bits for one side.
pub const CASTLE_BOTH: u8 = CASTLE_OO | CASTLE_OOO;

////////////////////////////////////////////////////////////////////////////////////////////////////
/// Any static board position that can be set from FEN.
///
/// A `Position` is a plain snapshot: the piece on each square, the side to move, the castling
/// rights, the en passant state, and the ply counters. It may hold an in-progress or illegal
/// arrangement that a [`Board`](board/struct.Board.html) would refuse; use
/// [`validate`](#method.validate) to check.
///
/// The en passant field (`ebyte`) holds the square of the pawn that just advanced two squares,
/// not the square passed over. FEN conversion adjusts between the two conventions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    pub(crate) coords: [Piece; NUM_SQUARES],
    pub(crate) ply: i32,
    pub(crate) ncp_plies: i32,
    pub(crate) cbyte: u8,
    pub(crate) ebyte: Coord,
    pub(crate) turn: Color,
}

impl Position {
    /// Returns the standard starting position.
    pub fn new() -> Position {
        Position {
            coords: PRECALC.starting_pieces,
            ply: 0,
            ncp_plies: 0,
            cbyte: CASTLE_BOTH | (CASTLE_BOTH << 1),
            ebyte: FLAG,
            turn: Color::White,
        }
    }

    /// Returns a position with an empty board.
    pub fn empty() -> Position {
        Position {
            coords: [Piece::EMPTY; NUM_SQUARES],
            ply: 0,
            ncp_plies: 0,
            cbyte: 0,
            ebyte: FLAG,
            turn: Color::White,
        }
    }

    /// Returns the piece on the given square.
    #[inline]
    pub fn piece_at(&self, coord: Coord) -> Piece {
        self.coords[coord as usize]
    }

    /// Returns the current ply (half-move count since the position's origin). White's first
    /// move in a normal game is ply 0.
    #[inline]
    pub fn ply(&self) -> i32 {
        self.ply
    }

    /// Returns the side to move.
    #[inline]
    pub fn turn(&self) -> Color {
        self.turn
    }

    /// Plies since the last capture or pawn move (the FEN half-move clock).
    #[inline]
    pub fn ncp_plies(&self) -> i32 {
        self.ncp_plies
    }

    /// The square of the pawn that just advanced two squares, or `FLAG`.
    #[inline]
    pub fn en_passant_coord(&self) -> Coord {
        self.ebyte
    }

    /// The raw castling-rights bits.
    #[inline]
    pub fn cbyte(&self) -> u8 {
        self.cbyte
    }

    /// May `turn` still castle king-side (now or later)?
    #[inline]
    pub fn can_castle_oo(&self, turn: Color) -> bool {
        (self.cbyte >> turn.index()) & CASTLE_OO != 0
    }

    /// May `turn` still castle queen-side (now or later)?
    #[inline]
    pub fn can_castle_ooo(&self, turn: Color) -> bool {
        (self.cbyte >> turn.index()) & CASTLE_OOO != 0
    }

    /// May `turn` still castle at all?
    #[inline]
    pub fn can_castle(&self, turn: Color) -> bool {
        (self.cbyte >> turn.index()) & CASTLE_BOTH != 0
    }

    /// Places (or clears, with `Piece::EMPTY`) a piece. No legality checking.
    pub fn set_piece(&mut self, coord: Coord, piece: Piece) {
        self.coords[coord as usize] = piece;
    }

    /// Sets the en passant square. No legality checking.
    pub fn set_en_passant_coord(&mut self, coord: Coord) {
        self.ebyte = coord;
    }

    /// Sets the side to move.
    pub fn set_turn(&mut self, turn: Color) {
        self.turn = turn;
    }

    /// Sets the current ply. Fails on negative input.
    pub fn set_ply(&mut self, ply: i32) -> Result<()> {
        if ply < 0 {
            return Err(Error::IllegalPosition("negative ply".into()));
        }
        self.ply = ply;
        Ok(())
    }

    /// Sets the non-capture ply counter. Fails on negative input.
    pub fn set_ncp_plies(&mut self, ncp_plies: i32) -> Result<()> {
        if ncp_plies < 0 {
            return Err(Error::IllegalPosition("negative half-move clock".into()));
        }
        self.ncp_plies = ncp_plies;
        Ok(())
    }

    /// Enables castling rights on both wings for both players.
    pub fn enable_castling(&mut self) {
        self.cbyte = CASTLE_BOTH | (CASTLE_BOTH << 1);
    }

    /// Clears all castling rights.
    pub fn clear_castling(&mut self) {
        self.cbyte = 0;
    }

    /// Returns `true` iff this position has the same pieces, side to move, castling rights, and
    /// en passant state as `other`. Ply counters are not considered.
    pub fn is_repeat_of(&self, other: &Position) -> bool {
        self.coords[..] == other.coords[..]
            && self.turn == other.turn
            && self.cbyte == other.cbyte
            && self.ebyte == other.ebyte
    }

    /// Finds the king of the given color, if there is exactly one.
    pub(crate) fn king_coord(&self, color: Color) -> Option<Coord> {
        let king = Piece::new(color, PieceType::King);
        let mut found = None;
        for sq in 0..NUM_SQUARES as Coord {
            if self.coords[sq as usize] == king {
                if found.is_some() {
                    return None;
                }
                found = Some(sq);
            }
        }
        found
    }

    /// Is `coord` attacked by any piece of color `by`? This is the slow, list-free variant
    /// used for position sanity checking; Boards answer the same question from piece lists.
    pub(crate) fn attacked_slow(&self, coord: Coord, by: Color) -> bool {
        self.checkers_slow(coord, by, 2) > 0
    }

    /// Counts attackers of `coord` by color `by`, stopping early at `limit`. Also used to
    /// compute the checking coordinate for a freshly set position.
    fn checkers_slow_with_coord(&self, coord: Coord, by: Color, limit: u32) -> (u32, Coord) {
        let mut count = 0;
        let mut last = FLAG;
        for from in 0..NUM_SQUARES as Coord {
            let piece = self.coords[from as usize];
            if !piece.is_friend(by) || from == coord {
                continue;
            }
            let dir = PRECALC.dir[from as usize][coord as usize];
            let hits = match piece.ptype() {
                PieceType::Knight => dir == DIR_KNIGHT,
                PieceType::King => {
                    is_queen_dir(dir)
                        && PRECALC.rays[dir as usize][from as usize].first() == Some(&coord)
                }
                PieceType::Pawn => {
                    let fwd = if by == Color::White { 1 } else { -1 };
                    (rank(coord) as i32 - rank(from) as i32) == fwd
                        && (file(coord) as i32 - file(from) as i32).abs() == 1
                }
                PieceType::Queen => is_queen_dir(dir) && self.clear_ray(from, coord),
                PieceType::Rook => {
                    crate::precalc::is_rook_dir(dir) && self.clear_ray(from, coord)
                }
                PieceType::Bishop => {
                    crate::precalc::is_bishop_dir(dir) && self.clear_ray(from, coord)
                }
                PieceType::Empty => false,
            };
            if hits {
                count += 1;
                last = from;
                if count >= limit {
                    break;
                }
            }
        }
        (count, last)
    }

    fn checkers_slow(&self, coord: Coord, by: Color, limit: u32) -> u32 {
        self.checkers_slow_with_coord(coord, by, limit).0
    }

    /// Returns the square giving check to the side to move, `FLAG` for none, or
    /// `DOUBLE_CHECK`. Best effort on positions without exactly one king.
    pub fn checking_coord(&self) -> Coord {
        let kcoord = match self.king_coord(self.turn) {
            Some(kcoord) => kcoord,
            None => return FLAG,
        };
        let (count, last) = self.checkers_slow_with_coord(kcoord, !self.turn, 2);
        match count {
            0 => FLAG,
            1 => last,
            _ => DOUBLE_CHECK,
        }
    }

    fn clear_ray(&self, from: Coord, to: Coord) -> bool {
        let dir = PRECALC.dir[from as usize][to as usize] as usize;
        for &sq in &PRECALC.rays[dir][from as usize] {
            if sq == to {
                return true;
            }
            if !self.coords[sq as usize].is_empty() {
                return false;
            }
        }
        false
    }

    /// Are the castling bits consistent with the pieces on the board?
    fn bad_cbyte(&self) -> bool {
        for color in &[Color::White, Color::Black] {
            let castling = &PRECALC.castling[color.index()];
            let king_home =
                self.coords[castling.king_start as usize] == Piece::new(*color, PieceType::King);
            if self.can_castle(*color) && !king_home {
                return true;
            }
            if self.can_castle_oo(*color)
                && self.coords[castling.rook_oo_start as usize]
                    != Piece::new(*color, PieceType::Rook) {
                return true;
            }
            if self.can_castle_ooo(*color)
                && self.coords[castling.rook_ooo_start as usize]
                    != Piece::new(*color, PieceType::Rook) {
                return true;
            }
        }
        false
    }

    /// Is the en passant square consistent with the pieces and the side to move?
    fn bad_ebyte(&self) -> bool {
        if self.ebyte == FLAG {
            return false;
        }
        let piece = self.coords[self.ebyte as usize];
        let expected_rank = if self.turn == Color::White { 4 } else { 3 };
        !piece.is_pawn() || !piece.is_enemy(self.turn) || rank(self.ebyte) != expected_rank
    }

    /// Checks that this is a legal orthodox-chess position. On failure the error says what is
    /// wrong.
    pub fn validate(&self) -> Result<()> {
        let fail = |why: &str| Err(Error::IllegalPosition(why.into()));

        // No pawns on the back ranks.
        for sq in 0..NUM_SQUARES as Coord {
            if self.coords[sq as usize].is_pawn() && (rank(sq) == 0 || rank(sq) == 7) {
                return fail("pawn on first or eighth rank");
            }
        }

        // Exactly one king each.
        let kings = [self.king_coord(Color::White), self.king_coord(Color::Black)];
        for (i, kcoord) in kings.iter().enumerate() {
            if kcoord.is_none() {
                return fail(if i == 0 {
                    "white must have exactly one king"
                } else {
                    "black must have exactly one king"
                });
            }
        }
        let (wk, bk) = (kings[0].expect("checked"), kings[1].expect("checked"));

        // Kings must not touch.
        if (rank(wk) as i32 - rank(bk) as i32).abs() < 2
            && (file(wk) as i32 - file(bk) as i32).abs() < 2 {
            return fail("kings are adjacent");
        }

        // The side not on move must not be in check.
        let off_turn_king = if self.turn == Color::White { bk } else { wk };
        if self.attacked_slow(off_turn_king, self.turn) {
            return fail("side not on move is in check");
        }

        if self.bad_cbyte() {
            return fail("castling rights without king and rook in place");
        }
        if self.bad_ebyte() {
            return fail("impossible en passant square");
        }
        if self.ply < 0 || self.ncp_plies > self.ply {
            return fail("half-move clock exceeds ply");
        }
        Ok(())
    }
}

impl Default for Position {
    fn default() -> Position {
        Position::new()
    }
}

impl FromStr for Position {
    type Err = Error;

    /// Parses [Forsyth-Edwards Notation
    /// (FEN)](https://en.wikipedia.org/wiki/Forsyth%E2%80%93Edwards_Notation).
    fn from_str(s: &str) -> Result<Position> {
        let mut pos = Position::empty();
        let mut fields = s.trim().split_whitespace();

        // Board field.
        let board = fields.next().ok_or(Error::ParseError)?;
        let mut r: i32 = 7;
        let mut f: i32 = 0;
        for c in board.chars() {
            match c {
                '1'..='8' => {
                    f += c.to_digit(10).expect("digit") as i32;
                    if f > 8 {
                        return Err(Error::ParseError);
                    }
                }
                '/' => {
                    if f == 8 && r > 0 {
                        r -= 1;
                        f = 0;
                    } else {
                        return Err(Error::ParseError);
                    }
                }
                _ => {
                    if f >= 8 {
                        return Err(Error::ParseError);
                    }
                    pos.set_piece(coord_at(f as u8, r as u8), Piece::from_char(c)?);
                    f += 1;
                }
            }
        }
        if r > 0 || f < 8 {
            return Err(Error::ParseError);
        }

        // Turn.
        pos.turn = fields.next().ok_or(Error::ParseError)?.parse()?;

        // Castling rights.
        let castling = fields.next().unwrap_or("-");
        if castling != "-" {
            for c in castling.chars() {
                pos.cbyte |= match c {
                    'K' => CASTLE_OO,
                    'k' => CASTLE_OO << 1,
                    'Q' => CASTLE_OOO,
                    'q' => CASTLE_OOO << 1,
                    _ => return Err(Error::ParseError),
                };
            }
        }

        // En passant target (FEN gives the passed-over square; we store the pawn's square).
        let ep = fields.next().unwrap_or("-");
        if ep != "-" {
            let passed_over = parse_coord(ep)?;
            pos.ebyte = match rank(passed_over) {
                2 => passed_over + 8, // white pawn just moved to rank 4
                5 => passed_over - 8, // black pawn just moved to rank 5
                _ => return Err(Error::ParseError),
            };
        }

        // Half-move clock and full-move number.
        pos.ncp_plies = match fields.next() {
            Some(s) => s.parse().map_err(|_| Error::ParseError)?,
            None => 0,
        };
        let move_num: i32 = match fields.next() {
            Some(s) => s.parse().map_err(|_| Error::ParseError)?,
            None => 1,
        };
        if move_num < 1 {
            return Err(Error::ParseError);
        }
        pos.ply = (move_num - 1) * 2 + if pos.turn == Color::Black { 1 } else { 0 };
        if pos.ncp_plies > pos.ply {
            // Positions edited out of thin air sometimes carry a clock the ply count cannot
            // support; treat that as a parse problem rather than quietly fixing it.
            return Err(Error::ParseError);
        }

        Ok(pos)
    }
}

impl fmt::Display for Position {
    /// Writes the position as a FEN string.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for r in (0..8).rev() {
            let mut empty = 0;
            for fl in 0..8 {
                let piece = self.coords[coord_at(fl, r) as usize];
                if let Some(c) = piece.to_char() {
                    if empty > 0 {
                        write!(f, "{}", empty)?;
                        empty = 0;
                    }
                    write!(f, "{}", c)?;
                } else {
                    empty += 1;
                }
            }
            if empty > 0 {
                write!(f, "{}", empty)?;
            }
            if r > 0 {
                write!(f, "/")?;
            }
        }

        write!(f, " {} ", self.turn)?;

        if self.cbyte == 0 {
            write!(f, "-")?;
        } else {
            if self.can_castle_oo(Color::White) { write!(f, "K")?; }
            if self.can_castle_ooo(Color::White) { write!(f, "Q")?; }
            if self.can_castle_oo(Color::Black) { write!(f, "k")?; }
            if self.can_castle_ooo(Color::Black) { write!(f, "q")?; }
        }

        if self.ebyte == FLAG {
            write!(f, " -")?;
        } else {
            let passed_over = if rank(self.ebyte) == 3 { self.ebyte - 8 } else { self.ebyte + 8 };
            write!(f, " {}", coord_name(passed_over))?;
        }

        write!(f, " {} {}", self.ncp_plies, self.ply / 2 + 1)
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use super::*;

    const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

    #[test]
    fn fen_round_trip() {
        for fen in &[
            START_FEN,
            "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1",
            "8/5k2/8/8/8/8/5K2/6R1 w - - 12 40",
            "r3k2r/8/8/8/8/8/8/R3K2R b KQkq - 3 25",
        ] {
            let pos: Position = fen.parse().expect("legal fen");
            assert_eq!(&pos.to_string(), fen);
        }
    }

    #[test]
    fn start_position_matches_fen() {
        let pos: Position = START_FEN.parse().expect("legal fen");
        assert_eq!(pos, Position::new());
        assert!(pos.validate().is_ok());
    }

    #[test]
    fn rejects_garbage() {
        assert!("".parse::<Position>().is_err());
        assert!("rnbqkbnr/pppppppp/8/8 w KQkq - 0 1".parse::<Position>().is_err());
        assert!("9/8/8/8/8/8/8/8 w - - 0 1".parse::<Position>().is_err());
    }

    #[test]
    fn validate_catches_illegal_positions() {
        // No black king.
        let pos: Position = "8/8/8/8/8/8/8/K7 w - - 0 1".parse().expect("parses");
        assert!(pos.validate().is_err());

        // Adjacent kings.
        let pos: Position = "8/8/8/8/8/8/8/Kk6 w - - 0 1".parse().expect("parses");
        assert!(pos.validate().is_err());

        // Side not to move in check.
        let pos: Position = "k7/8/8/8/8/8/8/K6R w - - 0 1".parse().expect("parses");
        assert!(pos.validate().is_err());

        // Castling rights with a displaced rook.
        let pos: Position = "rnbqkbn1/pppppppr/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1"
            .parse().expect("parses");
        assert!(pos.validate().is_err());
    }

    #[test]
    fn en_passant_coordinate_conversion() {
        let pos: Position =
            "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1".parse().expect("fen");
        assert_eq!(pos.en_passant_coord(), parse_coord("e4").unwrap());
    }
}
