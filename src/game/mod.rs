//! The game controller: clocks, engine supervision, and move bookkeeping.
//
//  This Source Code Form is subject to the terms of the Mozilla Public
//  License, v. 2.0. If a copy of the MPL was not distributed with this
//  file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
////////////////////////////////////////////////////////////////////////////////////////////////////
//! [`Game`] owns the canonical game state above the engine: the committed move history, two
//! live clocks, which sides the engine plays, and whether pondering is allowed. Its central
//! observer is [`refresh`](struct.Game.html#method.refresh): after any state change it makes
//! sure the engine is thinking, pondering, or idle as the new state demands.
//!
//! Everything user-visible flows out through a [`GameObserver`]; engine responses that arrive
//! while the engine does not control the side to move (ponder leftovers) are dropped here.
use std::fmt;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use chess::{Board, Color, Move, MoveList, MOVE_NONE};

use crate::engine::{Engine, EngineStats, PvArgs, Rsp};

pub mod clock;
pub mod savegame;

pub use clock::{Clock, ClockParameters, TimeT, CLOCK_TIME_INFINITE, CLOCK_TIME_SECOND};
pub use savegame::SaveGame;

////////////////////////////////////////////////////////////////////////////////////////////////////
/// Errors crossing the game surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameError {
    /// An attempted move is not legal in the current position.
    IllegalMove,
    /// A requested ply is outside the recorded game.
    PlyOutOfRange,
    /// A save-game failed to load or validate; the in-memory game is unchanged.
    SaveGameCorrupt(String),
}

impl fmt::Display for GameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameError::IllegalMove => "illegal move".fmt(f),
            GameError::PlyOutOfRange => "ply out of range".fmt(f),
            GameError::SaveGameCorrupt(why) => write!(f, "save game corrupt: {}", why),
        }
    }
}

impl std::error::Error for GameError { }

////////////////////////////////////////////////////////////////////////////////////////////////////
/// Callbacks for everything a front-end would want to show. All methods default to doing
/// nothing, so implementors pick what they care about.
#[allow(unused_variables)]
pub trait GameObserver {
    /// The board changed (a move was made, or the position was replaced).
    fn on_position_changed(&mut self, board: &Board) { }
    /// The engine announced its move.
    fn on_move_made(&mut self, mv: Move) { }
    /// The game is drawn. The move, if any, is played as part of the claim.
    fn on_draw(&mut self, reason: &str, mv: Option<Move>) { }
    /// `loser` has been checkmated.
    fn on_checkmate(&mut self, loser: Color) { }
    /// `resigner` resigned.
    fn on_resign(&mut self, resigner: Color) { }
    /// A stats notification from the engine.
    fn on_stats(&mut self, stats: &EngineStats) { }
    /// A principal-variation notification from the engine.
    fn on_pv(&mut self, pv: &PvArgs) { }
    /// The engine started thinking about its move.
    fn on_thinking(&mut self) { }
    /// The engine started pondering.
    fn on_pondering(&mut self) { }
    /// The engine is idle; it is somebody else's turn to act.
    fn on_ready(&mut self) { }
}

/// An observer that ignores everything.
#[derive(Debug, Default)]
pub struct NullObserver;

impl GameObserver for NullObserver { }

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum State {
    /// Engines stopped, clocks stopped; nothing changes until `go`.
    Stopped,
    Running,
}

////////////////////////////////////////////////////////////////////////////////////////////////////
/// The canonical game: history, clocks, engine control flags, and the engine itself.
pub struct Game {
    state: State,
    ponder: bool,
    auto_play_engine_moves: bool,
    /// The game has ended (mate, draw, or resignation).
    done: bool,
    engine_control: [bool; Color::COUNT],

    sgame: SaveGame,
    /// Clocks are reset to these at the start of a new game.
    initial_clocks: [Clock; Color::COUNT],
    clocks: [Clock; Color::COUNT],
    saved_board: Board,
    eng: Engine,
    /// Moves the engine is restricted to at the root, when non-empty.
    search_list: Vec<Move>,
    last_refreshed: Option<u64>,

    observer: Box<dyn GameObserver>,
}

impl Game {
    /// Creates a stopped game at the starting position, with the engine controlling nobody.
    pub fn new(eng: Engine, observer: Box<dyn GameObserver>) -> Game {
        let mut game = Game {
            state: State::Stopped,
            ponder: false,
            auto_play_engine_moves: true,
            done: false,
            engine_control: [false; Color::COUNT],
            sgame: SaveGame::new(),
            initial_clocks: [Clock::new(); Color::COUNT],
            clocks: [Clock::new(); Color::COUNT],
            saved_board: Board::new(),
            eng,
            search_list: Vec::new(),
            last_refreshed: None,
            observer,
        };
        game.reset_clocks(); // also records the initial clocks in the save-game
        game
    }

    // ---------------------------------------------------------------------------------------
    // Getters.

    /// The current board.
    pub fn board(&self) -> &Board {
        &self.saved_board
    }

    /// The current ply.
    pub fn current_ply(&self) -> i32 {
        self.sgame.current_ply()
    }

    /// The first ply of the recorded game.
    pub fn first_ply(&self) -> i32 {
        self.sgame.first_ply()
    }

    /// The ply just past the last recorded move.
    pub fn last_ply(&self) -> i32 {
        self.sgame.last_ply()
    }

    /// One player's live clock.
    pub fn clock(&self, player: Color) -> &Clock {
        &self.clocks[player.index()]
    }

    /// The clock a new game starts that player with.
    pub fn initial_clock(&self, player: Color) -> &Clock {
        &self.initial_clocks[player.index()]
    }

    /// Does the engine play this side?
    pub fn engine_control(&self, player: Color) -> bool {
        self.engine_control[player.index()]
    }

    /// Is pondering enabled?
    pub fn ponder(&self) -> bool {
        self.ponder
    }

    /// Has the game ended?
    pub fn done(&self) -> bool {
        self.done
    }

    /// Access to the engine, mostly for configuration.
    pub fn engine(&self) -> &Engine {
        &self.eng
    }

    /// Mutable access to the engine, for configuration.
    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.eng
    }

    // ---------------------------------------------------------------------------------------
    // The central observer.

    /// Reconciles the engine with the game state: whoever's turn it is, make sure the engine
    /// is thinking, pondering, or idle as appropriate. Called after every state change.
    fn refresh(&mut self) {
        if self.state == State::Stopped {
            return;
        }
        let turn = self.saved_board.turn();

        if self.last_refreshed != Some(self.saved_board.zobrist()) {
            self.observer.on_position_changed(&self.saved_board);
            self.last_refreshed = Some(self.saved_board.zobrist());
        }

        if !self.done {
            // The user should see their clock running as soon as possible, even before any
            // status is drawn.
            self.clocks[turn.index()].start();

            let mut mvlist = MoveList::new();
            self.saved_board.generate_legal_moves(&mut mvlist, false, None);

            if self.saved_board.is_draw_insufficient_material() {
                self.stop_clocks();
                self.observer.on_draw("insufficient material", None);
                self.done = true;
            } else if mvlist.num_moves() == 0 {
                self.stop_clocks();
                if self.saved_board.is_in_check() {
                    self.observer.on_checkmate(turn);
                } else {
                    self.observer.on_draw("stalemate", None);
                }
                self.done = true;
            }
        }

        let opponent_ponders = !self.done
            && self.eng.is_pondering()
            && self.ponder
            && !self.engine_control[turn.index()]
            && self.engine_control[(!turn).index()];
        if (!self.done && self.eng.is_thinking() && self.engine_control[turn.index()])
            || opponent_ponders {
            return; // no change in thinking necessary; do not restart the cycle
        }

        self.eng.cmd_bail();

        if !self.done && self.engine_control[turn.index()] {
            self.observer.on_thinking();
            if self.search_list.is_empty() {
                self.eng.cmd_think(&self.clocks[turn.index()]);
            } else {
                let restrict = self.search_list.clone();
                self.eng.cmd_think_restricted(&self.clocks[turn.index()], &restrict);
            }
        } else if !self.done && self.engine_control[(!turn).index()] && self.ponder {
            self.observer.on_pondering();
            if self.search_list.is_empty() {
                self.eng.cmd_ponder();
            } else {
                let restrict = self.search_list.clone();
                self.eng.cmd_ponder_restricted(&restrict);
            }
        } else {
            self.observer.on_ready();
        }
    }

    // ---------------------------------------------------------------------------------------
    // Moves and navigation.

    fn make_move_internal(&mut self, mv: Move, move_engines: bool) -> Result<(), GameError> {
        if mv == MOVE_NONE {
            return Ok(());
        }
        let legal = self.saved_board.find_legal(mv).ok_or(GameError::IllegalMove)?;
        let turn = self.saved_board.turn();

        // Give the engine a chance to re-evaluate if we insist on changing the board.
        self.done = false;
        let was_running = self.clocks[turn.index()].is_running();
        self.clocks[turn.index()].stop();

        if move_engines {
            self.eng.cmd_make_move(legal);
        }
        debug!("making move {} ({} {})",
               legal.to_string_styled(
                   &chess::MoveStyle::new(chess::MoveNotation::Can,
                                          chess::MoveCastleStyle::OO, false),
                   Some(&self.saved_board)),
               self.saved_board.ply() >> 1, turn);

        self.saved_board.save_position();
        self.saved_board.make_move(legal);
        if was_running {
            self.clocks[turn.index()].apply_increment(self.saved_board.ply());
        }
        let time_left = self.clocks[turn.index()].time();
        self.sgame.commit_move(legal, time_left);

        self.refresh();
        Ok(())
    }

    /// Plays a move for the side to move. Fails, changing nothing, if the move is illegal.
    pub fn make_move(&mut self, mv: Move) -> Result<(), GameError> {
        self.make_move_internal(mv, true)
    }

    /// Parses and plays a move string.
    pub fn make_move_str(&mut self, mv: &str) -> Result<(), GameError> {
        let mv = Move::parse(mv, &self.saved_board).map_err(|_| GameError::IllegalMove)?;
        self.make_move(mv)
    }

    /// Seeks to an absolute ply within the recorded game. The engine follows along with
    /// make/unmake deltas, so (for instance) its hash table and hints survive short hops.
    pub fn goto_ply(&mut self, ply: i32) -> Result<(), GameError> {
        if ply < self.first_ply() || ply > self.last_ply() {
            return Err(GameError::PlyOutOfRange);
        }
        let diff = ply - self.current_ply();
        if diff == 0 {
            return Ok(());
        }

        self.done = false;
        let orig = self.current_ply();
        self.sgame.goto_ply(ply, &mut self.saved_board, Some(&mut self.clocks))?;

        if diff < 0 {
            for _ in 0..-diff {
                self.eng.cmd_unmake_move();
            }
        } else {
            // Moving forward; the rebuilt board remembers each move along the way.
            for p in orig..ply {
                self.eng.cmd_make_move(self.saved_board.move_at(p));
            }
        }
        self.refresh();
        Ok(())
    }

    /// Takes back the last half-move.
    pub fn unmake_move(&mut self) -> Result<(), GameError> {
        self.rewind(1)
    }

    /// Takes back `num_plies` half-moves.
    pub fn rewind(&mut self, num_plies: i32) -> Result<(), GameError> {
        self.goto_ply(self.current_ply() - num_plies)
    }

    /// Replays `num_plies` half-moves.
    pub fn fast_forward(&mut self, num_plies: i32) -> Result<(), GameError> {
        self.goto_ply(self.current_ply() + num_plies)
    }

    // ---------------------------------------------------------------------------------------
    // Game lifecycle.

    /// Starts a new game from `board`, optionally resetting the clocks.
    pub fn new_game_with(&mut self, board: &Board, reset_clocks: bool) {
        let was_running = self.stop();
        self.done = false;
        self.saved_board = board.clone();
        self.sgame.set_start_position(&self.saved_board);
        if reset_clocks {
            self.reset_clocks();
        }
        self.eng.cmd_new_game();
        self.eng.cmd_set_board(&self.saved_board);
        if was_running {
            self.go();
        }
    }

    /// Starts a new game from the standard starting position.
    pub fn new_game(&mut self) {
        self.new_game_with(&Board::new(), true);
    }

    /// Replaces the current position.
    ///
    /// When the requested board shares a history prefix with the current one and the detour
    /// through that prefix is shorter than replaying the new board wholesale, only the move
    /// deltas are applied: the engine keeps its transposition table and hint variation. A
    /// board with an unrelated history reseeds the engine from scratch.
    pub fn set_board(&mut self, other: &Board) {
        self.done = false;
        let was_running = self.stop();

        let last_common_ply = self.saved_board.last_common_ply(other);
        let my_diff = self.saved_board.ply() - last_common_ply;
        let other_diff = other.ply() - last_common_ply;

        if last_common_ply >= 0
            && other.base_ply() >= self.saved_board.base_ply()
            && my_diff + other_diff < other.ply() - other.base_ply() {
            // The shortcut. This replicates a bit of goto_ply, but without touching clocks.
            if self.sgame.goto_ply(last_common_ply, &mut self.saved_board, None).is_ok() {
                for _ in 0..my_diff {
                    self.eng.cmd_unmake_move();
                }
                for ply in last_common_ply..other.ply() {
                    let _ = self.make_move_internal(other.move_at(ply), true);
                }
                if was_running {
                    self.go();
                }
                return;
            }
        }

        // No usable common history: blow the engine state away and reseed from the other
        // board's base position.
        let mut base = other.clone();
        while base.ply() > base.base_ply() {
            base.unmake_move();
        }
        self.eng.cmd_new_game();
        self.eng.cmd_set_board(&base);
        self.saved_board = base;
        self.sgame.set_start_position(&self.saved_board);
        for ply in other.base_ply()..other.ply() {
            let _ = self.make_move_internal(other.move_at(ply), true);
        }

        if was_running {
            self.go();
        }
    }

    /// Resets both clocks to the initial clocks (and, before the first move, records them in
    /// the save-game).
    pub fn reset_clocks(&mut self) {
        self.clocks = self.initial_clocks;
        if self.current_ply() == self.first_ply() {
            self.sgame.set_clocks(&self.clocks);
        }
        self.refresh();
    }

    fn stop_clocks(&mut self) {
        for clock in self.clocks.iter_mut() {
            clock.stop();
        }
    }

    /// Enters force mode: engines bail, clocks stop. Returns whether anything changed.
    pub fn stop(&mut self) -> bool {
        if self.state == State::Stopped {
            return false;
        }
        self.state = State::Stopped;
        self.eng.cmd_bail();
        self.stop_clocks();
        true
    }

    /// Like `stop`, but also takes the engine off both sides. (Pondering preference is
    /// unaffected.)
    pub fn stop_and_force(&mut self) -> bool {
        let changed = self.stop();
        self.engine_control = [false; Color::COUNT];
        changed
    }

    /// Leaves force mode. Returns whether anything changed.
    pub fn go(&mut self) -> bool {
        if self.state == State::Running {
            return false;
        }
        self.state = State::Running;
        self.refresh();
        true
    }

    /// Leaves force mode, restricting the engine's next search to `search_list` (for one
    /// think only). An empty list behaves like plain `go`.
    pub fn go_restricted(&mut self, search_list: &[Move]) -> bool {
        self.search_list = search_list.to_vec();
        let changed = self.go();
        self.search_list.clear();
        changed
    }

    /// Sets the initial clock for future games. Takes effect at the next `new_game`.
    pub fn set_initial_clock(&mut self, player: Color, params: &ClockParameters) {
        self.initial_clocks[player.index()].set_parameters(params);
    }

    /// Adjusts a live clock.
    pub fn set_clock(&mut self, player: Color, params: &ClockParameters) {
        self.clocks[player.index()].set_parameters(params);
        self.refresh();
    }

    /// Puts the engine in control of a side (or takes it away).
    pub fn set_engine_control(&mut self, player: Color, value: bool) {
        if self.engine_control[player.index()] == value {
            return;
        }
        self.engine_control[player.index()] = value;
        self.refresh();
    }

    /// Flips engine control of a side.
    pub fn toggle_engine_control(&mut self, player: Color) {
        let value = !self.engine_control(player);
        self.set_engine_control(player, value);
    }

    /// Allows or forbids pondering.
    pub fn set_ponder(&mut self, value: bool) {
        if self.ponder == value {
            return;
        }
        self.ponder = value;
        self.refresh();
    }

    /// Flips the ponder setting.
    pub fn toggle_ponder(&mut self) {
        let value = !self.ponder;
        self.set_ponder(value);
    }

    /// Should engine moves be played on the board automatically? (Some front-ends want to
    /// play them themselves.) Only sensible while stopped.
    pub fn set_auto_play_engine_moves(&mut self, value: bool) {
        debug_assert_eq!(self.state, State::Stopped);
        self.auto_play_engine_moves = value;
    }

    /// Forces any engine playing the current side to move. Synchronous: returns once the
    /// engine is idle again.
    pub fn move_now(&mut self) {
        self.eng.cmd_move_now();
        self.wait_for_engine_idle();
    }

    /// Waits (processing responses) until the engine goes idle.
    pub fn wait_for_engine_idle(&mut self) {
        while self.eng.is_busy() {
            if let Some(rsp) = self.eng.process_one_rsp() {
                self.dispatch(rsp);
            }
        }
    }

    /// Drains any pending engine responses without blocking.
    pub fn process_responses(&mut self) {
        while let Some(rsp) = self.eng.try_process_rsp() {
            self.dispatch(rsp);
        }
    }

    /// Blocks for one engine response and handles it. A no-op when the engine is idle.
    pub fn process_one_response(&mut self) {
        if self.eng.is_busy() {
            if let Some(rsp) = self.eng.process_one_rsp() {
                self.dispatch(rsp);
            }
        }
    }

    // ---------------------------------------------------------------------------------------
    // Save and restore.

    /// Saves the recorded game to `path`.
    pub fn save(&self, path: &Path) -> Result<(), GameError> {
        self.sgame.save(path)
    }

    /// Restores a game from `path`. On failure the in-memory game is unchanged.
    pub fn restore(&mut self, path: &Path) -> Result<(), GameError> {
        let mut restored = SaveGame::restore(path)?;
        // Seek to the end before adopting anything; a corrupt body fails here, leaving the
        // current game alone. (The user probably forgot the current ply is persistent, so
        // prefer the full game over wherever the cursor was.)
        let mut board = Board::new();
        restored.goto_ply(restored.last_ply(), &mut board, None)?;

        let was_running = self.stop();
        self.done = false;
        self.sgame = restored;
        let _ = self.sgame.goto_ply(self.sgame.last_ply(), &mut self.saved_board,
                                    Some(&mut self.clocks));
        self.eng.cmd_new_game();
        self.eng.cmd_set_board(&self.saved_board);
        if was_running {
            self.go();
        }
        Ok(())
    }

    /// The default save-game location: the user's data directory, or the working directory
    /// as a fallback.
    pub fn default_save_path() -> PathBuf {
        dirs::data_dir().unwrap_or_else(|| PathBuf::from("."))
            .join("woodpusher.sav")
    }

    // ---------------------------------------------------------------------------------------
    // Engine response handling.

    fn dispatch(&mut self, rsp: Rsp) {
        match rsp {
            Rsp::Draw(mv) => self.on_engine_draw(mv),
            Rsp::Move(mv) => self.on_engine_move(mv),
            Rsp::Resign => self.on_engine_resign(),
            Rsp::Stats(stats) => self.observer.on_stats(&stats),
            Rsp::Pv(pv) => self.observer.on_pv(&pv),
            Rsp::SearchDone(_) => {
                // Worker traffic never reaches the game layer.
                warn!("unexpected SearchDone at the game layer");
            }
        }
    }

    fn on_engine_draw(&mut self, mv: Move) {
        let turn = self.saved_board.turn();
        if !self.engine_control[turn.index()] {
            // Decided (or was forced) to draw while pondering; let the player move.
            if !self.auto_play_engine_moves {
                self.observer.on_move_made(mv);
            }
            self.observer.on_ready();
            return;
        }

        let was_running = self.stop();
        if mv != MOVE_NONE && self.auto_play_engine_moves {
            if was_running {
                // Stopped, so the increment must be applied by hand.
                self.clocks[turn.index()].apply_increment(self.saved_board.ply());
            }
            let _ = self.make_move_internal(mv, true);
        }
        self.done = true; // must happen after the move is made
        self.observer.on_ready();

        let reason = if self.saved_board.is_draw_fifty_move() {
            "fifty-move rule"
        } else {
            "threefold repetition"
        };
        let mv = if mv == MOVE_NONE { None } else { Some(mv) };
        self.observer.on_draw(reason, mv);
        if was_running {
            self.go(); // resets the state; goes nowhere since the game is done
        }
    }

    fn on_engine_move(&mut self, mv: Move) {
        let turn = self.saved_board.turn();
        if !self.engine_control[turn.index()] {
            // A move decided while pondering: ignore it and let the player move.
            if !self.auto_play_engine_moves {
                self.observer.on_move_made(mv);
            }
            self.observer.on_ready();
            return;
        }

        self.observer.on_move_made(mv);
        if self.auto_play_engine_moves {
            let _ = self.make_move_internal(mv, true);
        }
    }

    fn on_engine_resign(&mut self) {
        let turn = self.saved_board.turn();
        // An engine pondering for the off-turn side resigns that side's position.
        let resigner = if !self.engine_control[turn.index()] { !turn } else { turn };

        self.stop_clocks();
        self.done = true;
        self.observer.on_ready();
        debug!("{} resigns", resigner);
        self.observer.on_resign(resigner);
    }
}

impl fmt::Debug for Game {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Game")
            .field("state", &self.state)
            .field("done", &self.done)
            .field("ply", &self.current_ply())
            .field("engine_control", &self.engine_control)
            .field("ponder", &self.ponder)
            .finish()
    }
}
