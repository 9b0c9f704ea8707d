//! Move generation tests over well-known perft positions.
//
//  This Source Code Form is subject to the terms of the Mozilla Public
//  License, v. 2.0. If a copy of the MPL was not distributed with this
//  file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
////////////////////////////////////////////////////////////////////////////////////////////////////
use chess::{Board, MoveList};

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

fn expect_perft(fen: &str, expected: &[u64]) {
    let mut board: Board = fen.parse().expect("test positions are legal");
    for (i, &count) in expected.iter().enumerate() {
        assert_eq!(perft(&mut board, i as u32 + 1), count, "{} at depth {}", fen, i + 1);
    }
    board.consistency_check("perft left the board dirty");
}

#[test]
fn perft_initial_position() {
    expect_perft(
        "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
        &[20, 400, 8_902, 197_281],
    );
}

#[test]
fn perft_position_2() {
    expect_perft(
        "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
        &[48, 2_039, 97_862],
    );
}

#[test]
fn perft_position_3() {
    expect_perft("8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1", &[14, 191, 2_812, 43_238]);
}

#[test]
fn perft_position_4() {
    expect_perft(
        "r3k2r/Pppp1ppp/1b3nbN/nP6/BBP1P3/q4N2/Pp1P2PP/R2Q1RK1 w kq - 0 1",
        &[6, 264, 9_467],
    );
}

#[test]
fn perft_position_5() {
    expect_perft(
        "rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8",
        &[44, 1_486, 62_379],
    );
}

#[test]
fn perft_talkchess_position() {
    expect_perft(
        "r4rk1/1pp1qppp/p1np1n2/2b1p1B1/2B1P1b1/P1NP1N2/1PP1QPPP/R4RK1 w - - 0 10",
        &[46, 2_079, 89_890],
    );
}
