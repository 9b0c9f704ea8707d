//! The woodpusher demo shell: engine self-play from any position.
//
//  This Source Code Form is subject to the terms of the Mozilla Public
//  License, v. 2.0. If a copy of the MPL was not distributed with this
//  file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
////////////////////////////////////////////////////////////////////////////////////////////////////
use std::fs::File;

use clap::{value_t, App, Arg};
use log::info;
use simplelog::{Config, LevelFilter, WriteLogger};

use chess::{Board, Color, Move, MoveCastleStyle, MoveNotation, MoveStyle};
use woodpusher::engine::{config, Engine, EngineStats};
use woodpusher::game::{Clock, Game, GameObserver, CLOCK_TIME_SECOND};

struct ConsoleObserver {
    move_number: i32,
}

impl GameObserver for ConsoleObserver {
    fn on_move_made(&mut self, _mv: Move) { }

    fn on_position_changed(&mut self, board: &Board) {
        if board.ply() > board.base_ply() {
            let ply = board.ply() - 1;
            let mv = board.move_at(ply);
            let style = MoveStyle::new(MoveNotation::Can, MoveCastleStyle::OO, false);
            if ply % 2 == 0 {
                self.move_number = ply / 2 + 1;
                print!("{}. {}", self.move_number, mv.to_string_styled(&style, None));
            } else {
                println!(" {}", mv.to_string_styled(&style, None));
            }
        }
    }

    fn on_draw(&mut self, reason: &str, _mv: Option<Move>) {
        println!("\n1/2-1/2 {{{}}}", reason);
    }

    fn on_checkmate(&mut self, loser: Color) {
        println!("\n{}", if loser == Color::White { "0-1 {checkmate}" } else { "1-0 {checkmate}" });
    }

    fn on_resign(&mut self, resigner: Color) {
        println!("\n{}", if resigner == Color::White {
            "0-1 {white resigns}"
        } else {
            "1-0 {black resigns}"
        });
    }

    fn on_stats(&mut self, stats: &EngineStats) {
        info!("nodes {} ({} full-width), {} hash hits",
              stats.nodes, stats.non_q_nodes, stats.hash_hit_good);
    }
}

fn main() {
    let matches = App::new("woodpusher")
        .about("A multithreaded chess engine (self-play demo shell)")
        .arg(Arg::with_name("log-file")
            .long("log-file")
            .takes_value(true)
            .help("Where to write the debug log"))
        .arg(Arg::with_name("hash")
            .long("hash")
            .takes_value(true)
            .default_value("64")
            .help("Transposition table size, in MiB"))
        .arg(Arg::with_name("threads")
            .long("threads")
            .takes_value(true)
            .help("Number of searcher threads"))
        .arg(Arg::with_name("depth")
            .long("depth")
            .takes_value(true)
            .default_value("6")
            .help("Search depth limit (0 for none)"))
        .arg(Arg::with_name("seconds")
            .long("seconds")
            .takes_value(true)
            .default_value("30")
            .help("Time on each side's clock, in seconds"))
        .arg(Arg::with_name("moves")
            .long("moves")
            .takes_value(true)
            .default_value("40")
            .help("Stop the demo after this many moves"))
        .arg(Arg::with_name("fen")
            .long("fen")
            .takes_value(true)
            .help("Starting position (FEN); defaults to the normal starting position"))
        .get_matches();

    let log_file = matches.value_of("log-file").map(str::to_owned).unwrap_or_else(|| {
        format!("woodpusher-{}.log", chrono::Local::now().format("%Y%m%d-%H%M%S"))
    });
    let _ = WriteLogger::init(
        LevelFilter::Debug,
        Config::default(),
        File::create(&log_file).expect("cannot create log file"),
    );

    let hash_mib = value_t!(matches, "hash", i64).unwrap_or(64);
    let depth = value_t!(matches, "depth", i64).unwrap_or(6);
    let seconds = value_t!(matches, "seconds", i64).unwrap_or(30);
    let max_moves = value_t!(matches, "moves", i32).unwrap_or(40);

    let mut engine = Engine::new();
    engine.set_spin_option(config::MAX_MEMORY, hash_mib).expect("hash size in range");
    engine.set_spin_option(config::MAX_DEPTH, depth).expect("depth in range");
    engine.set_spin_option(config::HISTORY_WINDOW, 10).expect("window in range");
    if let Ok(threads) = value_t!(matches, "threads", i64) {
        engine.set_spin_option(config::MAX_THREADS, threads).expect("threads in range");
    }

    let mut game = Game::new(engine, Box::new(ConsoleObserver { move_number: 0 }));

    let board = match matches.value_of("fen") {
        Some(fen) => fen.parse::<Board>().expect("FEN must be a legal position"),
        None => Board::new(),
    };

    let mut clock = Clock::new();
    clock.set_start_time(seconds * CLOCK_TIME_SECOND)
        .set_time(seconds * CLOCK_TIME_SECOND)
        .set_increment(CLOCK_TIME_SECOND / 10);
    game.set_initial_clock(Color::White, &clock.parameters());
    game.set_initial_clock(Color::Black, &clock.parameters());

    game.new_game_with(&board, true);
    game.set_engine_control(Color::White, true);
    game.set_engine_control(Color::Black, true);
    game.go();

    while !game.done() && game.current_ply() < board.ply() + max_moves * 2 {
        game.process_one_response();
        if !game.engine().is_busy() && !game.done() {
            break; // nobody thinking and no game end: nothing further will happen
        }
    }

    game.stop();
    println!("\nfinal position: {}", game.board());
    info!("demo finished at ply {}", game.current_ply());
}
