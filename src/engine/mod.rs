//! The engine: search, transposition table, and the thinker thread hierarchy behind a
//! command/response control API.
//
//  This Source Code Form is subject to the terms of the Mozilla Public
//  License, v. 2.0. If a copy of the MPL was not distributed with this
//  file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
////////////////////////////////////////////////////////////////////////////////////////////////////
//! The [`Engine`] is the synchronous face of an asynchronous machine. Commands (`cmd_think`,
//! `cmd_make_move`, ...) post to the root thinker's command queue and return immediately;
//! responses stream back through [`process_one_rsp`](struct.Engine.html#method.process_one_rsp)
//! or [`try_process_rsp`](struct.Engine.html#method.try_process_rsp).
//!
//! The root thinker runs the iterative-deepening search and delegates non-PV subtrees to a
//! pool of worker thinkers; see the [`thinker`](thinker/index.html),
//! [`search`](search/index.html), and [`searchers`](searchers/index.html) modules.
//!
//! Commands sent while the engine is busy implicitly *bail* first: the running search is told
//! to move now, and its eventual final response is discarded rather than delivered.
use std::sync::atomic::Ordering;
use std::sync::mpsc::{Receiver, TryRecvError};
use std::sync::Arc;
use std::time::Duration;

use chess::{Board, Move};

pub mod config;
pub mod eval;
pub mod hash;
pub mod pv;
pub mod stats;

mod search;
mod searchers;
mod thinker;
mod timer;

pub use config::{Config, ConfigError, ConfigItem};
pub use eval::Eval;
pub use pv::{DisplayPv, HintPv, SearchPv};
pub use stats::EngineStats;
pub use thinker::{PvArgs, Rsp, SearchDoneArgs, DEPTH_NO_LIMIT};

use crate::game::clock::{Clock, CLOCK_TIME_INFINITE, CLOCK_TIME_SECOND};
use thinker::{Cmd, SharedContext, Thinker};
use timer::MoveTimer;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum State {
    Idle,
    Pondering,
    Thinking,
    Searching,
}

/// Move-now tracking within one command's lifetime. `BailRequested` means the final response
/// is to be discarded, not just hurried.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum MoveNowState {
    IdleOrBusy,
    MoveNowRequested,
    BailRequested,
}

////////////////////////////////////////////////////////////////////////////////////////////////////
/// A top-level engine control API around one root thinker and its worker pool.
#[derive(Debug)]
pub struct Engine {
    thinker: Thinker,
    rsp_rx: Receiver<Rsp>,
    shared: Arc<SharedContext>,
    state: State,
    move_now_state: MoveNowState,
    config: Config,
    timer: MoveTimer,

    // Enough of the last command to restore it after a config-driven interruption.
    saved_clock: Clock,
    saved_restrict: Vec<Move>,
    saved_search: (i32, i32, Move, i32, i32),
}

impl Engine {
    /// Creates an engine. The transposition table stays unallocated until the first
    /// `cmd_new_game` resets it.
    pub fn new() -> Engine {
        let shared = Arc::new(SharedContext::new());
        let (thinker, rsp_rx) = Thinker::spawn_root(shared.clone());
        let timer = MoveTimer::new(thinker.move_now_handle());

        let max_threads = shared.max_threads.load(Ordering::Relaxed) as i64;
        let mut config = Config::new();
        config.register(config::MAX_DEPTH, ConfigItem::Spin {
            value: 0, min: 0, max: i64::from(i32::max_value()),
        }).expect("fresh registry");
        config.register(config::MAX_MEMORY, ConfigItem::Spin {
            value: hash::TransTable::DEFAULT_SIZE / (1024 * 1024),
            min: 0,
            max: hash::TransTable::MAX_SIZE / (1024 * 1024),
        }).expect("fresh registry");
        config.register(config::MAX_NODES, ConfigItem::Spin {
            value: 0, min: 0, max: i64::max_value(),
        }).expect("fresh registry");
        config.register(config::MAX_THREADS, ConfigItem::Spin {
            value: max_threads, min: 1, max: max_threads.max(1),
        }).expect("fresh registry");
        config.register(config::RANDOM_MOVES, ConfigItem::Checkbox { value: false })
            .expect("fresh registry");
        config.register(config::CAN_RESIGN, ConfigItem::Checkbox { value: true })
            .expect("fresh registry");
        config.register(config::HISTORY_WINDOW, ConfigItem::Spin {
            value: 0, min: 0, max: i64::from(i32::max_value()),
        }).expect("fresh registry");

        Engine {
            thinker,
            rsp_rx,
            shared,
            state: State::Idle,
            move_now_state: MoveNowState::IdleOrBusy,
            config,
            timer,
            saved_clock: Clock::new(),
            saved_restrict: Vec::new(),
            saved_search: (0, 0, chess::MOVE_NONE, 0, 0),
        }
    }

    // ---------------------------------------------------------------------------------------
    // State queries.

    /// Is the engine thinking about its own move?
    pub fn is_thinking(&self) -> bool {
        self.state == State::Thinking
    }

    /// Is the engine pondering on the opponent's time?
    pub fn is_pondering(&self) -> bool {
        self.state == State::Pondering
    }

    /// Is the engine evaluating a delegated subtree?
    pub fn is_searching(&self) -> bool {
        self.state == State::Searching
    }

    /// Is the engine doing anything at all?
    pub fn is_busy(&self) -> bool {
        self.state != State::Idle
    }

    /// A snapshot of the running search counters.
    pub fn stats(&self) -> EngineStats {
        self.shared.stats.snapshot()
    }

    /// A snapshot of the tracked principal variation.
    pub fn hint_pv(&self) -> HintPv {
        self.shared.hint()
    }

    /// How many games this engine has started.
    pub fn game_count(&self) -> i32 {
        self.shared.game_count.load(Ordering::Relaxed)
    }

    /// The number of entries currently allocated in the transposition table.
    pub fn hash_entries(&self) -> usize {
        self.shared.trans_table.num_entries()
    }

    // ---------------------------------------------------------------------------------------
    // Commands.

    /// Starts a fresh game: blanks the transposition table, history, and hint, and resets the
    /// board to the starting position.
    pub fn cmd_new_game(&mut self) {
        self.cmd_bail();
        self.thinker.post(Cmd::NewGame);
    }

    /// Replaces the engine's board.
    pub fn cmd_set_board(&mut self, board: &Board) {
        self.cmd_bail();
        self.thinker.post(Cmd::SetBoard(Box::new(board.clone())));
    }

    /// Applies a move to the engine's board.
    pub fn cmd_make_move(&mut self, mv: Move) {
        self.cmd_bail();
        self.thinker.post(Cmd::MakeMove { mv, save_ring: true });
    }

    /// Takes back the last move on the engine's board.
    pub fn cmd_unmake_move(&mut self) {
        self.cmd_bail();
        self.thinker.post(Cmd::UnmakeMove);
    }

    /// Starts thinking on the engine's own clock.
    pub fn cmd_think(&mut self, clock: &Clock) {
        self.cmd_think_restricted(clock, &[]);
    }

    /// Like `cmd_think`, but only the given root moves may be considered.
    pub fn cmd_think_restricted(&mut self, clock: &Clock, restrict: &[Move]) {
        self.cmd_bail();
        // A timer expiry from the previous search may have landed after its final response
        // was consumed; it must not cancel this one.
        self.thinker.clear_move_now();
        self.saved_clock = *clock;
        self.saved_restrict = restrict.to_vec();

        let mut clock = *clock;
        // This clock snapshot only ever runs; restarting a bailed think must not double-
        // charge it.
        clock.start();
        self.arm_think_timer(&clock);

        self.state = State::Thinking;
        self.thinker.post(Cmd::Think { clock, restrict: restrict.to_vec() });
    }

    /// Starts pondering: same search, but no clock and no timer, and the final response only
    /// matters if the prediction comes true.
    pub fn cmd_ponder(&mut self) {
        self.cmd_ponder_restricted(&[]);
    }

    /// Like `cmd_ponder`, restricted to the given root moves.
    pub fn cmd_ponder_restricted(&mut self, restrict: &[Move]) {
        self.cmd_bail();
        self.thinker.clear_move_now();
        self.saved_restrict = restrict.to_vec();
        self.state = State::Pondering;
        self.thinker.post(Cmd::Ponder { restrict: restrict.to_vec() });
    }

    /// Evaluates one subtree: make `mv`, search to `max_depth`, respond with `SearchDone`.
    /// `cur_depth` is the ply distance from the root *before* the move; passing it explicitly
    /// keeps the hint variation aligned for worker searches.
    pub fn cmd_search(&mut self, alpha: i32, beta: i32, mv: Move, cur_depth: i32,
                      max_depth: i32) {
        self.cmd_bail();
        self.thinker.clear_move_now();
        self.saved_search = (alpha, beta, mv, cur_depth, max_depth);
        self.state = State::Searching;
        self.thinker.post(Cmd::Search { alpha, beta, mv, cur_depth, max_depth });
    }

    /// Asks the engine to commit to a move (or finish its subtree) as soon as possible.
    /// Asynchronous; the final response arrives through the usual channel.
    pub fn cmd_move_now(&mut self) {
        if self.is_busy() && self.move_now_state == MoveNowState::IdleOrBusy {
            self.move_now_state = MoveNowState::MoveNowRequested;
            self.thinker.set_move_now();
        }
    }

    /// Like `cmd_move_now`, but discards the eventual response. Blocks until the engine is
    /// idle. Commands that change engine state call this implicitly.
    pub fn cmd_bail(&mut self) {
        if self.is_busy() {
            self.cmd_move_now();
            self.move_now_state = MoveNowState::BailRequested;
            while self.is_busy() {
                let _ = self.process_one_rsp();
            }
        }
        debug_assert!(!self.is_busy());
    }

    // ---------------------------------------------------------------------------------------
    // Responses.

    /// Waits for the next response and runs it through the state machine. Returns `None` when
    /// the response was consumed internally (a bail in progress).
    pub fn process_one_rsp(&mut self) -> Option<Rsp> {
        let rsp = self.rsp_rx.recv().expect("root thinker is gone");
        self.handle_rsp(rsp)
    }

    /// Drains at most one *deliverable* response without blocking. Swallowed responses (from
    /// a bail) are processed silently.
    pub fn try_process_rsp(&mut self) -> Option<Rsp> {
        loop {
            match self.rsp_rx.try_recv() {
                Ok(rsp) => {
                    if let Some(rsp) = self.handle_rsp(rsp) {
                        return Some(rsp);
                    }
                }
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Disconnected) => panic!("root thinker is gone"),
            }
        }
    }

    fn handle_rsp(&mut self, rsp: Rsp) -> Option<Rsp> {
        let bailing = self.move_now_state == MoveNowState::BailRequested;
        if rsp.is_final() {
            self.state = State::Idle;
            self.move_now_state = MoveNowState::IdleOrBusy;
            // The thinker is idle now and nothing further is queued, so this cannot erase a
            // bail aimed at a later command.
            self.thinker.clear_move_now();
            self.timer.cancel();
        }
        if bailing { None } else { Some(rsp) }
    }

    // ---------------------------------------------------------------------------------------
    // Configuration.

    /// The option registry, for enumeration and reads.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Sets a spin option by name and applies its effect.
    pub fn set_spin_option(&mut self, name: &str, value: i64) -> Result<(), ConfigError> {
        self.config.set_spin(name, value)?;
        self.apply_option(name);
        Ok(())
    }

    /// Sets a checkbox option by name and applies its effect.
    pub fn set_checkbox_option(&mut self, name: &str, value: bool) -> Result<(), ConfigError> {
        self.config.set_checkbox(name, value)?;
        self.apply_option(name);
        Ok(())
    }

    fn apply_option(&mut self, name: &str) {
        match name {
            config::MAX_DEPTH => {
                // Config is in levels-from-one with 0 meaning unlimited; the search wants a
                // zero-based level cap.
                let value = self.config.spin(config::MAX_DEPTH).expect("registered") as i32;
                self.shared.max_level.store(value - 1, Ordering::Relaxed);
            }
            config::MAX_NODES => {
                let value = self.config.spin(config::MAX_NODES).expect("registered");
                self.shared.max_nodes.store(value, Ordering::Relaxed);
                // The search itself notices shortly if it is already past the budget.
            }
            config::RANDOM_MOVES => {
                let value = self.config.checkbox(config::RANDOM_MOVES).expect("registered");
                self.shared.random_moves.store(value, Ordering::Relaxed);
            }
            config::CAN_RESIGN => {
                let value = self.config.checkbox(config::CAN_RESIGN).expect("registered");
                self.shared.can_resign.store(value, Ordering::Relaxed);
            }
            config::HISTORY_WINDOW => {
                let value = self.config.spin(config::HISTORY_WINDOW).expect("registered");
                self.shared.history.set_window(value as i32);
            }
            config::MAX_MEMORY => {
                let value = self.config.spin(config::MAX_MEMORY).expect("registered");
                let orig = self.state;
                self.cmd_bail();
                self.shared.trans_table.set_desired_size(value * 1024 * 1024);
                self.shared.trans_table.reset();
                self.restore_state(orig);
            }
            config::MAX_THREADS => {
                let value = self.config.spin(config::MAX_THREADS).expect("registered");
                let orig = self.state;
                self.cmd_bail();
                self.shared.max_threads.store(value as usize, Ordering::Relaxed);
                self.thinker.post(Cmd::SetNumThreads(value as usize));
                self.restore_state(orig);
            }
            _ => { }
        }
    }

    /// Continues where a config-driven interruption left off.
    fn restore_state(&mut self, orig: State) {
        match orig {
            State::Thinking => {
                let clock = self.saved_clock;
                let restrict = std::mem::replace(&mut self.saved_restrict, Vec::new());
                self.cmd_think_restricted(&clock, &restrict);
            }
            State::Pondering => {
                let restrict = std::mem::replace(&mut self.saved_restrict, Vec::new());
                self.cmd_ponder_restricted(&restrict);
            }
            State::Searching => {
                let (alpha, beta, mv, cur_depth, max_depth) = self.saved_search;
                self.cmd_search(alpha, beta, mv, cur_depth, max_depth);
            }
            State::Idle => { }
        }
    }

    /// Computes a per-move budget from the clock and arms the timer with it. Infinite time
    /// (and no per-move cap) means no timer at all.
    fn arm_think_timer(&mut self, clock: &Clock) {
        if clock.is_infinite() && clock.per_move_limit() == CLOCK_TIME_INFINITE {
            return;
        }
        let budget = if clock.is_infinite() {
            clock.per_move_limit()
        } else {
            // A thirtieth of the remaining time plus the increment, floored so a lost
            // position cannot spiral into instant moves, capped by the per-move limit.
            (clock.time() / 30 + clock.increment())
                .max(CLOCK_TIME_SECOND / 20)
                .min(clock.per_move_time())
        };
        self.timer.arm(Duration::from_micros(budget.max(0) as u64));
    }
}

impl Default for Engine {
    fn default() -> Engine {
        Engine::new()
    }
}

impl Drop for Engine {
    /// A search left running would keep its thread alive long after the engine is gone; make
    /// sure everything is idle before the channels close.
    fn drop(&mut self) {
        self.cmd_bail();
    }
}
