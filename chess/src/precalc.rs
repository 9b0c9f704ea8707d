//! Precalculated board geometry and Zobrist tables.
//
//  This Source Code Form is subject to the terms of the Mozilla Public
//  License, v. 2.0. If a copy of the MPL was not distributed with this
//  file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
////////////////////////////////////////////////////////////////////////////////////////////////////
use lazy_static::lazy_static;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::{coord_at, file, rank, Color, Coord, Piece, PieceType, MAX_PIECES, NUM_SQUARES};

// Directions, from White's perspective:
//   0 - northwest    4 - southeast
//   1 - north        5 - south
//   2 - northeast    6 - southwest
//   3 - east         7 - west
//   8 - knight move
//  10 - no relation
//
// The encoding is load-bearing: odd directions below 8 are rook lines, even directions below 8
// are bishop lines, and `dir & 3` collapses a direction and its opposite onto one pin axis.
pub const DIR_KNIGHT: u8 = 8;
pub const DIR_NONE: u8 = 10;

const DIR_STEPS: [(i32, i32); 8] = [
    (1, -1),  // NW: +rank, -file
    (1, 0),   // N
    (1, 1),   // NE
    (0, 1),   // E
    (-1, 1),  // SE
    (-1, 0),  // S
    (-1, -1), // SW
    (0, -1),  // W
];

/// Is `dir` a rank or file direction?
#[inline]
pub fn is_rook_dir(dir: u8) -> bool {
    dir & 1 == 1 && dir < 8
}

/// Is `dir` a diagonal direction?
#[inline]
pub fn is_bishop_dir(dir: u8) -> bool {
    dir & 0x9 == 0
}

/// Is `dir` any queen-line direction?
#[inline]
pub fn is_queen_dir(dir: u8) -> bool {
    dir < 8
}

pub struct ZobristTables {
    // Indexed by Piece::index(); the rows for empty pieces are zero so that empty squares
    // never perturb the hash.
    pub coord: [[u64; NUM_SQUARES]; MAX_PIECES],
    pub turn: u64,
    pub cbyte: [u64; 16],
    pub ebyte: [u64; NUM_SQUARES],
}

pub struct CastleEnds {
    pub king: Coord,
    pub rook: Coord,
}

pub struct CastleCoords {
    pub king_start: Coord,
    pub rook_oo_start: Coord,
    pub rook_ooo_start: Coord,
    pub end_oo: CastleEnds,
    pub end_ooo: CastleEnds,
}

pub struct PreCalc {
    /// Direction from one square to another, per the table at the top of this file.
    pub dir: [[u8; NUM_SQUARES]; NUM_SQUARES],
    /// `rays[d][sq]` lists the squares from `sq` walking direction `d` to the board edge.
    pub rays: Vec<Vec<Vec<Coord>>>,
    /// Knight destinations from each square, forward moves first, per color.
    pub knight_moves: [Vec<Vec<Coord>>; Color::COUNT],
    /// Pawn move slots per color: [capture toward the h-file, capture toward the a-file,
    /// single push, double push], FLAG where off-board or inapplicable.
    pub pawn_moves: [[[Coord; 4]; NUM_SQUARES]; Color::COUNT],
    /// Rank-plus-file distance between squares.
    pub distance: [[u8; NUM_SQUARES]; NUM_SQUARES],
    /// Rank-plus-file distance from a square to the nearest center square.
    pub center_distance: [u8; NUM_SQUARES],
    /// Castling-rights bits that survive a piece leaving or arriving at each square.
    pub castle_mask: [u8; NUM_SQUARES],
    /// Castling geometry per color.
    pub castling: [CastleCoords; Color::COUNT],
    pub zobrist: ZobristTables,
    /// The piece layout of the normal starting position.
    pub starting_pieces: [Piece; NUM_SQUARES],
}

fn dir_between(from: Coord, to: Coord) -> u8 {
    if from == to {
        return DIR_NONE;
    }
    let dr = rank(to) as i32 - rank(from) as i32;
    let df = file(to) as i32 - file(from) as i32;

    if (dr.abs() == 1 && df.abs() == 2) || (dr.abs() == 2 && df.abs() == 1) {
        return DIR_KNIGHT;
    }
    for (d, &(step_r, step_f)) in DIR_STEPS.iter().enumerate() {
        let aligned = if step_r != 0 && step_f != 0 {
            dr.abs() == df.abs() && dr.signum() == step_r && df.signum() == step_f
        } else if step_r != 0 {
            df == 0 && dr.signum() == step_r
        } else {
            dr == 0 && df.signum() == step_f
        };
        if aligned {
            return d as u8;
        }
    }
    DIR_NONE
}

fn build_starting_pieces() -> [Piece; NUM_SQUARES] {
    use PieceType::*;
    let mut pieces = [Piece::EMPTY; NUM_SQUARES];
    let back_rank = [Rook, Knight, Bishop, Queen, King, Bishop, Knight, Rook];

    for f in 0..8 {
        pieces[coord_at(f, 0) as usize] = Piece::new(Color::White, back_rank[f as usize]);
        pieces[coord_at(f, 1) as usize] = Piece::new(Color::White, Pawn);
        pieces[coord_at(f, 6) as usize] = Piece::new(Color::Black, Pawn);
        pieces[coord_at(f, 7) as usize] = Piece::new(Color::Black, back_rank[f as usize]);
    }
    pieces
}

// The low two bits of every Zobrist word tag its category (piece-square, castling, en passant,
// or side to move) so that words from different categories can never alias each other.
fn build_zobrist(rng: &mut StdRng) -> ZobristTables {
    let mut tables = ZobristTables {
        coord: [[0; NUM_SQUARES]; MAX_PIECES],
        turn: rng.gen::<u64>() & !0x3 | 0x3,
        cbyte: [0; 16],
        ebyte: [0; NUM_SQUARES],
    };

    // Leave the two empty-piece rows zeroed: XORing a vacated square must be a no-op.
    for row in tables.coord.iter_mut().skip(2) {
        for word in row.iter_mut() {
            *word = rng.gen::<u64>() & !0x3;
        }
    }
    for word in tables.cbyte.iter_mut() {
        *word = rng.gen::<u64>() & !0x3 | 0x1;
    }
    for word in tables.ebyte.iter_mut() {
        *word = rng.gen::<u64>() & !0x3 | 0x2;
    }
    tables
}

impl PreCalc {
    fn new() -> PreCalc {
        let mut dir = [[DIR_NONE; NUM_SQUARES]; NUM_SQUARES];
        let mut distance = [[0u8; NUM_SQUARES]; NUM_SQUARES];
        let mut center_distance = [0u8; NUM_SQUARES];

        for from in 0..NUM_SQUARES {
            for to in 0..NUM_SQUARES {
                dir[from][to] = dir_between(from as Coord, to as Coord);
                let dr = (rank(from as Coord) as i32 - rank(to as Coord) as i32).abs();
                let df = (file(from as Coord) as i32 - file(to as Coord) as i32).abs();
                distance[from][to] = (dr + df) as u8;
            }
            let center = [coord_at(3, 3), coord_at(4, 3), coord_at(3, 4), coord_at(4, 4)];
            center_distance[from] = center.iter()
                .map(|&c| distance[from][c as usize])
                .min()
                .expect("center squares");
        }

        let mut rays = vec![vec![Vec::new(); NUM_SQUARES]; 8];
        for (d, &(step_r, step_f)) in DIR_STEPS.iter().enumerate() {
            for from in 0..NUM_SQUARES {
                let mut r = rank(from as Coord) as i32 + step_r;
                let mut f = file(from as Coord) as i32 + step_f;
                while (0..8).contains(&r) && (0..8).contains(&f) {
                    rays[d][from].push(coord_at(f as u8, r as u8));
                    r += step_r;
                    f += step_f;
                }
            }
        }

        // Knight moves, with forward jumps listed first so that the movelist tries them first.
        let jumps = [(2, -1), (2, 1), (1, -2), (1, 2), (-1, -2), (-1, 2), (-2, -1), (-2, 1)];
        let mut knight_moves: [Vec<Vec<Coord>>; 2] =
            [vec![Vec::new(); NUM_SQUARES], vec![Vec::new(); NUM_SQUARES]];
        for color in 0..Color::COUNT {
            for from in 0..NUM_SQUARES {
                let order: Vec<(i32, i32)> = if color == 0 {
                    jumps.to_vec()
                } else {
                    jumps.iter().rev().cloned().collect()
                };
                for (dr, df) in order {
                    let r = rank(from as Coord) as i32 + dr;
                    let f = file(from as Coord) as i32 + df;
                    if (0..8).contains(&r) && (0..8).contains(&f) {
                        knight_moves[color][from].push(coord_at(f as u8, r as u8));
                    }
                }
            }
        }

        let mut pawn_moves = [[[crate::FLAG; 4]; NUM_SQUARES]; Color::COUNT];
        for color in 0..Color::COUNT {
            let forward: i32 = if color == 0 { 1 } else { -1 };
            for from in 0..NUM_SQUARES {
                let r = rank(from as Coord) as i32;
                let f = file(from as Coord) as i32;
                let ahead = r + forward;
                if !(0..8).contains(&ahead) {
                    continue; // no pawn can sit on its own back rank anyway
                }
                if f + 1 < 8 {
                    pawn_moves[color][from][0] = coord_at((f + 1) as u8, ahead as u8);
                }
                if f - 1 >= 0 {
                    pawn_moves[color][from][1] = coord_at((f - 1) as u8, ahead as u8);
                }
                pawn_moves[color][from][2] = coord_at(f as u8, ahead as u8);
                // The double-push slot is filled whenever it is on the board; users guard by
                // rank, and the attack prober wants it populated from mid-board squares too.
                let two_ahead = r + 2 * forward;
                if (0..8).contains(&two_ahead) {
                    pawn_moves[color][from][3] = coord_at(f as u8, two_ahead as u8);
                }
            }
        }

        // cbyte layout: bit 0 white O-O, bit 1 black O-O, bit 2 white O-O-O, bit 3 black O-O-O.
        let mut castle_mask = [0xfu8; NUM_SQUARES];
        castle_mask[coord_at(4, 0) as usize] &= !0x5; // e1
        castle_mask[coord_at(7, 0) as usize] &= !0x1; // h1
        castle_mask[coord_at(0, 0) as usize] &= !0x4; // a1
        castle_mask[coord_at(4, 7) as usize] &= !0xa; // e8
        castle_mask[coord_at(7, 7) as usize] &= !0x2; // h8
        castle_mask[coord_at(0, 7) as usize] &= !0x8; // a8

        let castling = [
            CastleCoords {
                king_start: coord_at(4, 0),
                rook_oo_start: coord_at(7, 0),
                rook_ooo_start: coord_at(0, 0),
                end_oo: CastleEnds { king: coord_at(6, 0), rook: coord_at(5, 0) },
                end_ooo: CastleEnds { king: coord_at(2, 0), rook: coord_at(3, 0) },
            },
            CastleCoords {
                king_start: coord_at(4, 7),
                rook_oo_start: coord_at(7, 7),
                rook_ooo_start: coord_at(0, 7),
                end_oo: CastleEnds { king: coord_at(6, 7), rook: coord_at(5, 7) },
                end_ooo: CastleEnds { king: coord_at(2, 7), rook: coord_at(3, 7) },
            },
        ];

        let mut rng = StdRng::seed_from_u64(0x8d3e_a194_77c2_6b05);

        PreCalc {
            dir,
            rays,
            knight_moves,
            pawn_moves,
            distance,
            center_distance,
            castle_mask,
            castling,
            zobrist: build_zobrist(&mut rng),
            starting_pieces: build_starting_pieces(),
        }
    }
}

lazy_static! {
    pub static ref PRECALC: PreCalc = PreCalc::new();
}

////////////////////////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_coord;

    #[test]
    fn directions() {
        let e4 = parse_coord("e4").unwrap();
        assert_eq!(PRECALC.dir[e4 as usize][parse_coord("e8").unwrap() as usize], 1);
        assert_eq!(PRECALC.dir[e4 as usize][parse_coord("h4").unwrap() as usize], 3);
        assert_eq!(PRECALC.dir[e4 as usize][parse_coord("h7").unwrap() as usize], 2);
        assert_eq!(PRECALC.dir[e4 as usize][parse_coord("a8").unwrap() as usize], 0);
        assert_eq!(PRECALC.dir[e4 as usize][parse_coord("e1").unwrap() as usize], 5);
        assert_eq!(PRECALC.dir[e4 as usize][parse_coord("f6").unwrap() as usize], DIR_KNIGHT);
        assert_eq!(PRECALC.dir[e4 as usize][parse_coord("f7").unwrap() as usize], DIR_NONE);
    }

    #[test]
    fn pin_axes_collapse() {
        // A direction and its opposite must map to the same axis.
        for d in 0..8u8 {
            assert_eq!(d & 3, (d + 4) % 8 & 3);
        }
    }

    #[test]
    fn rays_reach_the_edge() {
        let a1 = parse_coord("a1").unwrap() as usize;
        assert_eq!(PRECALC.rays[1][a1].len(), 7); // north
        assert_eq!(PRECALC.rays[2][a1].len(), 7); // northeast
        assert_eq!(PRECALC.rays[5][a1].len(), 0); // south
    }

    #[test]
    fn zobrist_category_bits() {
        assert_eq!(PRECALC.zobrist.coord[4][10] & 0x3, 0);
        assert_eq!(PRECALC.zobrist.cbyte[5] & 0x3, 0x1);
        assert_eq!(PRECALC.zobrist.ebyte[33] & 0x3, 0x2);
        assert_eq!(PRECALC.zobrist.turn & 0x3, 0x3);
        // Empty squares must never perturb the hash.
        for sq in 0..NUM_SQUARES {
            assert_eq!(PRECALC.zobrist.coord[0][sq], 0);
            assert_eq!(PRECALC.zobrist.coord[1][sq], 0);
        }
    }

    #[test]
    fn center_distance_extremes() {
        assert_eq!(PRECALC.center_distance[parse_coord("d4").unwrap() as usize], 0);
        assert_eq!(PRECALC.center_distance[parse_coord("a1").unwrap() as usize], 6);
        assert_eq!(PRECALC.center_distance[parse_coord("h8").unwrap() as usize], 6);
    }
}
