//! End-to-end engine and game-controller scenarios.
//
//  This Source Code Form is subject to the terms of the Mozilla Public
//  License, v. 2.0. If a copy of the MPL was not distributed with this
//  file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
////////////////////////////////////////////////////////////////////////////////////////////////////
use std::sync::{Arc, Mutex};

use chess::{parse_coord, Board, Color, Move, MOVE_NONE};
use woodpusher::engine::{config, Engine, Rsp};
use woodpusher::engine::eval::EVAL_WIN_THRESHOLD;
use woodpusher::game::{Clock, Game, GameObserver, CLOCK_TIME_SECOND};

/// Collects everything interesting a game reports.
#[derive(Debug, Default)]
struct Recording {
    moves: Vec<Move>,
    draws: Vec<String>,
    checkmates: Vec<Color>,
    resigns: Vec<Color>,
}

#[derive(Clone)]
struct Recorder(Arc<Mutex<Recording>>);

impl Recorder {
    fn new() -> Recorder {
        Recorder(Arc::new(Mutex::new(Recording::default())))
    }

    fn take(&self) -> Recording {
        std::mem::replace(&mut self.0.lock().expect("recorder"), Recording::default())
    }
}

impl GameObserver for Recorder {
    fn on_move_made(&mut self, mv: Move) {
        self.0.lock().expect("recorder").moves.push(mv);
    }

    fn on_draw(&mut self, reason: &str, _mv: Option<Move>) {
        self.0.lock().expect("recorder").draws.push(reason.to_owned());
    }

    fn on_checkmate(&mut self, loser: Color) {
        self.0.lock().expect("recorder").checkmates.push(loser);
    }

    fn on_resign(&mut self, resigner: Color) {
        self.0.lock().expect("recorder").resigns.push(resigner);
    }
}

fn depth_limited_engine(depth: i64) -> Engine {
    let mut eng = Engine::new();
    eng.set_spin_option(config::MAX_DEPTH, depth).expect("in range");
    eng.set_spin_option(config::MAX_MEMORY, 4).expect("in range");
    eng
}

fn finite_clock(seconds: i64) -> Clock {
    let mut clock = Clock::new();
    clock.set_start_time(seconds * CLOCK_TIME_SECOND)
        .set_time(seconds * CLOCK_TIME_SECOND);
    clock
}

/// Drives the engine directly: set a board, think, and collect the final response.
fn think_on(fen: &str, depth: i64) -> (Engine, Rsp) {
    let mut eng = depth_limited_engine(depth);
    eng.cmd_new_game();
    let board: Board = fen.parse().expect("test positions are legal");
    eng.cmd_set_board(&board);
    eng.cmd_think(&finite_clock(60));

    loop {
        if let Some(rsp) = eng.process_one_rsp() {
            if rsp.is_final() {
                return (eng, rsp);
            }
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////

#[test]
fn fools_mate() {
    let recorder = Recorder::new();
    let eng = depth_limited_engine(3);
    let mut game = Game::new(eng, Box::new(recorder.clone()));

    game.new_game();
    game.go();
    for s in &["f2f3", "e7e5", "g2g4"] {
        game.make_move_str(s).expect("the fool's opening is legal");
    }

    // Black is mated-in-one to play; hand it to the engine.
    game.set_engine_control(Color::Black, true);
    game.wait_for_engine_idle();

    let recording = recorder.take();
    assert_eq!(recording.moves.last().map(|m| (m.src, m.dst)),
               Some((parse_coord("d8").unwrap(), parse_coord("h4").unwrap())),
               "black must play Qh4#");
    assert_eq!(recording.checkmates, vec![Color::White]);
    assert!(game.done());
}

#[test]
fn fifty_move_rule_draw_claim() {
    // KBvK with the half-move clock nearly expired; two quiet moves reach exactly 100.
    let mut eng = depth_limited_engine(2);
    eng.cmd_new_game();
    let board: Board = "7k/8/8/8/8/8/8/B6K w - - 98 60".parse().expect("legal");
    eng.cmd_set_board(&board);
    eng.cmd_make_move(Move::parse("a1b2", &board).expect("legal"));
    let mut after = board.clone();
    after.make_move(Move::parse("a1b2", &board).expect("legal"));
    eng.cmd_make_move(Move::parse("h8g8", &after).expect("legal"));

    // The clock now reads 100: the engine claims the draw without thinking.
    eng.cmd_think(&finite_clock(60));
    let rsp = loop {
        if let Some(rsp) = eng.process_one_rsp() {
            if rsp.is_final() {
                break rsp;
            }
        }
    };
    assert_eq!(rsp, Rsp::Draw(MOVE_NONE));
}

#[test]
fn fifty_move_rule_draw_with_move() {
    // At 99, any quiet move reaches 100: the engine commits to the draw with its move.
    let (_, rsp) = think_on("7k/8/8/8/8/8/1B6/7K b - - 99 70", 2);
    match rsp {
        Rsp::Draw(mv) => assert!(mv != MOVE_NONE, "the draw is reached by making a move"),
        other => panic!("expected a draw claim, got {:?}", other),
    }
}

#[test]
fn threefold_repetition_recognized() {
    let mut eng = depth_limited_engine(2);
    eng.cmd_new_game();
    let mut board = Board::new();
    for s in &["g1f3", "g8f6", "f3g1", "f6g8", "g1f3", "g8f6", "f3g1", "f6g8"] {
        let legal = Move::parse(s, &board).expect("shuffle is legal");
        eng.cmd_make_move(legal);
        board.save_position();
        board.make_move(legal);
    }

    eng.cmd_think(&finite_clock(60));
    let rsp = loop {
        if let Some(rsp) = eng.process_one_rsp() {
            if rsp.is_final() {
                break rsp;
            }
        }
    };
    assert_eq!(rsp, Rsp::Draw(MOVE_NONE), "the eighth half-move completes the repetition");
}

#[test]
fn shortest_mate_preferred() {
    // White: Kb6, Qa1; black: Kb8. Qh8 is mate in one; anything else is slower.
    let (eng, rsp) = think_on("1k6/8/1K6/8/8/8/8/Q7 w - - 0 1", 4);
    match rsp {
        Rsp::Move(mv) => {
            assert_eq!((mv.src, mv.dst),
                       (parse_coord("a1").unwrap(), parse_coord("h8").unwrap()),
                       "expected the mate in one, got {:?}", mv);
        }
        other => panic!("expected a move, got {:?}", other),
    }
    let hint = eng.hint_pv();
    assert!(hint.eval().lo >= EVAL_WIN_THRESHOLD, "the mate must be scored as a forced win");
}

#[test]
fn ponder_hit_preserves_state() {
    let recorder = Recorder::new();
    let eng = depth_limited_engine(3);
    let mut game = Game::new(eng, Box::new(recorder.clone()));

    game.new_game();
    game.set_engine_control(Color::Black, true);
    game.set_ponder(true);
    game.go();

    // White opens; the engine answers, then ponders white's reply. The depth cap makes the
    // ponder run to completion, after which its (discarded) response leaves the engine idle
    // with a refined prediction.
    game.make_move_str("e2e4").expect("legal");
    game.wait_for_engine_idle();

    let games_before = game.engine().game_count();
    let hash_before = game.engine().hash_entries();
    let hint_before = game.engine().hint_pv();
    let predicted = hint_before.hint(0);
    assert!(predicted != MOVE_NONE, "pondering should leave a predicted reply");
    assert!(hint_before.level() > 0, "the completed ponder carries a deep variation");

    // Play exactly the predicted move.
    game.make_move(predicted).expect("the predicted move is legal");
    game.wait_for_engine_idle();

    assert_eq!(game.engine().game_count(), games_before,
               "a ponder hit must not reset the engine");
    assert_eq!(game.engine().hash_entries(), hash_before,
               "a ponder hit must not clobber the transposition table");
    let recording = recorder.take();
    assert!(recording.moves.len() >= 2, "the engine answered both of white's moves");
}

#[test]
fn set_board_shortcut_vs_reseed() {
    let recorder = Recorder::new();
    let eng = depth_limited_engine(2);
    let mut game = Game::new(eng, Box::new(recorder.clone()));

    game.new_game();
    game.go();
    for s in &["e2e4", "e7e5", "g1f3", "b8c6", "f1c4", "g8f6", "b1c3", "f6e4"] {
        game.make_move_str(s).expect("legal line");
    }
    let games_before = game.engine().game_count();

    // A board sharing the first five plies: unmake three, then two different moves.
    let mut other = game.board().clone();
    other.unmake_move();
    other.unmake_move();
    other.unmake_move();
    for s in &["d7d6", "d2d4"] {
        let legal = Move::parse(s, &other).expect("legal");
        other.save_position();
        other.make_move(legal);
    }

    game.set_board(&other);
    assert_eq!(game.engine().game_count(), games_before,
               "a shared prefix must not reset the engine");
    assert_eq!(game.board().zobrist(), other.zobrist());
    assert_eq!(game.current_ply(), other.ply());

    // A board with an unrelated history reseeds everything.
    let unrelated: Board = "r1bqkbnr/pppp1ppp/2n5/4p3/2B1P3/5N2/PPPP1PPP/RNBQK2R b KQkq - 3 3"
        .parse().expect("legal");
    game.set_board(&unrelated);
    assert_eq!(game.engine().game_count(), games_before + 1,
               "an unrelated position starts a fresh engine game");
    let hint = game.engine().hint_pv();
    assert_eq!(hint.level(), 0);
    assert_eq!(hint.hint(0), MOVE_NONE, "the hint must be cleared with the reseed");
    assert_eq!(game.board().zobrist(), unrelated.zobrist());
}

#[test]
fn multithreaded_search_finds_a_move() {
    let mut eng = depth_limited_engine(4);
    eng.set_spin_option(config::MAX_THREADS, 2).unwrap_or_else(|_| {
        // Single-core machines clamp the spin range; one thread is fine then.
    });
    eng.cmd_new_game();

    let board: Board = "r1bqkb1r/pppp1ppp/2n2n2/4p3/2B1P3/5N2/PPPP1PPP/RNBQK2R w KQkq - 4 4"
        .parse().expect("legal");
    eng.cmd_set_board(&board);
    eng.cmd_think(&finite_clock(60));

    let rsp = loop {
        if let Some(rsp) = eng.process_one_rsp() {
            if rsp.is_final() {
                break rsp;
            }
        }
    };
    match rsp {
        Rsp::Move(mv) => assert!(board.is_legal_move(mv), "{:?} must be legal", mv),
        other => panic!("expected a move, got {:?}", other),
    }
}

#[test]
fn move_now_interrupts_thinking() {
    let mut eng = Engine::new(); // no depth limit: would think a very long time
    eng.set_spin_option(config::MAX_MEMORY, 4).expect("in range");
    eng.cmd_new_game();

    let board: Board = "r1bqkb1r/pppp1ppp/2n2n2/4p3/2B1P3/5N2/PPPP1PPP/RNBQK2R w KQkq - 4 4"
        .parse().expect("legal");
    eng.cmd_set_board(&board);
    eng.cmd_think(&Clock::new()); // infinite time: only move-now can stop it

    std::thread::sleep(std::time::Duration::from_millis(200));
    eng.cmd_move_now();

    let rsp = loop {
        if let Some(rsp) = eng.process_one_rsp() {
            if rsp.is_final() {
                break rsp;
            }
        }
    };
    match rsp {
        Rsp::Move(mv) => assert!(board.is_legal_move(mv)),
        other => panic!("expected a move, got {:?}", other),
    }
    assert!(!eng.is_busy());
}

#[test]
fn max_nodes_caps_the_search() {
    let mut eng = Engine::new();
    eng.set_spin_option(config::MAX_MEMORY, 4).expect("in range");
    eng.set_spin_option(config::MAX_NODES, 5_000).expect("in range");
    eng.cmd_new_game();

    let board: Board = "rnbqkb1r/pppppppp/5n2/8/8/5N2/PPPPPPPP/RNBQKB1R w KQkq - 2 2"
        .parse().expect("legal");
    eng.cmd_set_board(&board);
    eng.cmd_think(&Clock::new());

    let rsp = loop {
        if let Some(rsp) = eng.process_one_rsp() {
            if rsp.is_final() {
                break rsp;
            }
        }
    };
    match rsp {
        Rsp::Move(mv) => assert!(board.is_legal_move(mv)),
        other => panic!("expected a move, got {:?}", other),
    }
    // Well past the configured budget would mean the cap is not being honored; allow
    // generous slack for the final in-flight moves.
    assert!(eng.stats().nodes < 1_000_000, "node budget was ignored");
}

#[test]
fn resignation_in_a_lost_position() {
    // Black to move, down a queen and rook with mate closing in quickly.
    let (_, rsp) = think_on("6k1/5ppp/8/8/8/8/5PPP/3QR1K1 b - - 0 40", 6);
    match rsp {
        Rsp::Resign | Rsp::Move(_) => { } // resignation needs the loss proven within depth
        other => panic!("expected resign or a move, got {:?}", other),
    }
}
