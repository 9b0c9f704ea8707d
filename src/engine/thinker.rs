//! The thinker: one searching thread and its command/response plumbing.
//
//  This Source Code Form is subject to the terms of the Mozilla Public
//  License, v. 2.0. If a copy of the MPL was not distributed with this
//  file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
////////////////////////////////////////////////////////////////////////////////////////////////////
//! Every thinker owns a command channel, a private context (its own board, clock snapshot, and
//! search arguments), and a response path to whoever commands it. The *root* thinker answers
//! to the [`Engine`](../struct.Engine.html) and owns the
//! [`SearcherPool`](../searchers/index.html); *worker* thinkers answer to the root through the
//! pool's shared funnel channel and evaluate one delegated subtree at a time.
//!
//! The root and its workers jointly hold a [`SharedContext`]: the transposition table, the
//! hint variation, the running stats, and the configured limits. Only the root mutates it (the
//! hint from its own search thread, the rest while idle); workers read.
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicI64, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, RwLock};
use std::thread;

use log::debug;

use chess::{Board, History, Move};

use super::eval::Eval;
use super::hash::TransTable;
use super::pv::{DisplayPv, HintPv, SearchPv};
use super::search;
use super::searchers::SearcherPool;
use super::stats::{EngineStats, SharedStats};
use crate::game::Clock;

/// "No depth limit", as stored in `SharedContext::max_level`.
pub const DEPTH_NO_LIMIT: i32 = -1;

////////////////////////////////////////////////////////////////////////////////////////////////////
/// Commands a thinker accepts. Posted by the engine (root thinker) or by the searcher pool
/// (workers).
#[derive(Debug)]
pub(crate) enum Cmd {
    /// Think about the position and eventually respond with a move, draw, or resignation.
    Think {
        /// Snapshot of the mover's clock.
        clock: Clock,
        /// When non-empty, only these root moves may be considered.
        restrict: Vec<Move>,
    },
    /// Like `Think`, but on the opponent's time: never respond until told to move.
    Ponder {
        /// When non-empty, only these root moves may be considered.
        restrict: Vec<Move>,
    },
    /// Evaluate one delegated subtree (worker role).
    Search {
        /// Lower search bound.
        alpha: i32,
        /// Upper search bound.
        beta: i32,
        /// The move leading into the subtree.
        mv: Move,
        /// How many plies from the root the move sits.
        cur_depth: i32,
        /// The nominal depth limit of the current iteration.
        max_depth: i32,
    },
    /// Apply a move to the thinker's board.
    MakeMove {
        /// The move to make.
        mv: Move,
        /// Record the pre-move position in the repetition ring first?
        save_ring: bool,
    },
    /// Take back the last move on the thinker's board.
    UnmakeMove,
    /// Replace the thinker's board.
    SetBoard(Box<Board>),
    /// Start a fresh game: reset shared state (root only) and the board.
    NewGame,
    /// Resize the searcher pool (root only; must be idle).
    SetNumThreads(usize),
}

////////////////////////////////////////////////////////////////////////////////////////////////////
/// Responses a thinker emits. `Draw`, `Move`, `Resign`, and `SearchDone` are final: the
/// thinker is idle once one of them is sent.
#[derive(Debug, Clone, PartialEq)]
pub enum Rsp {
    /// The engine claims (or commits to) a draw, playing `Move` first unless it is
    /// `MOVE_NONE`.
    Draw(Move),
    /// The engine's move.
    Move(Move),
    /// The engine resigns.
    Resign,
    /// A stats notification (not final).
    Stats(EngineStats),
    /// A principal-variation notification (not final).
    Pv(PvArgs),
    /// A delegated subtree is done (worker role).
    SearchDone(SearchDoneArgs),
}

impl Rsp {
    /// Does this response leave the thinker idle?
    pub fn is_final(&self) -> bool {
        match self {
            Rsp::Draw(_) | Rsp::Move(_) | Rsp::Resign | Rsp::SearchDone(_) => true,
            Rsp::Stats(_) | Rsp::Pv(_) => false,
        }
    }
}

/// Payload of a PV notification.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PvArgs {
    /// Counters at the moment of the report.
    pub stats: EngineStats,
    /// The new principal variation.
    pub pv: DisplayPv,
}

/// Payload of a completed delegated search.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SearchDoneArgs {
    /// The move that was searched.
    pub mv: Move,
    /// Its evaluation.
    pub eval: Eval,
    /// The variation found under it.
    pub pv: SearchPv,
}

/// Where a thinker's responses go: the engine's channel (root) or the pool funnel, tagged
/// with the worker's id.
#[derive(Debug, Clone)]
pub(crate) enum RspSender {
    Root(Sender<Rsp>),
    Worker { id: usize, funnel: Sender<(usize, Rsp)> },
}

impl RspSender {
    pub fn send(&self, rsp: Rsp) {
        // A dropped receiver means the engine (or pool) is being torn down; nothing useful
        // remains to report.
        match self {
            RspSender::Root(tx) => {
                let _ = tx.send(rsp);
            }
            RspSender::Worker { id, funnel } => {
                let _ = funnel.send((*id, rsp));
            }
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
/// State shared by the root thinker and all of its workers.
#[derive(Debug)]
pub(crate) struct SharedContext {
    /// Config: depth cap (`DEPTH_NO_LIMIT` for none).
    pub max_level: AtomicI32,
    /// Config: node cap (0 for none).
    pub max_nodes: AtomicI64,
    /// Config: shuffle piece lists on new game.
    pub random_moves: AtomicBool,
    /// Config: may the engine resign?
    pub can_resign: AtomicBool,
    /// Config: target worker-pool size.
    pub max_threads: AtomicUsize,
    /// The tracked principal variation. Written only by the root's search thread; workers
    /// read it for move hints.
    pub pv: RwLock<HintPv>,
    pub stats: SharedStats,
    pub game_count: AtomicI32,
    pub trans_table: TransTable,
    pub history: History,
}

impl SharedContext {
    pub fn new() -> SharedContext {
        SharedContext {
            max_level: AtomicI32::new(DEPTH_NO_LIMIT),
            max_nodes: AtomicI64::new(0),
            random_moves: AtomicBool::new(false),
            can_resign: AtomicBool::new(true),
            max_threads: AtomicUsize::new(num_cpus::get().max(1)),
            pv: RwLock::new(HintPv::new()),
            stats: SharedStats::new(),
            game_count: AtomicI32::new(0),
            trans_table: TransTable::new(),
            history: History::new(),
        }
    }

    /// Reads the hint variation.
    pub fn hint(&self) -> HintPv {
        *self.pv.read().expect("hint lock poisoned")
    }

    /// Mutates the hint variation.
    pub fn with_hint_mut<R>(&self, f: impl FnOnce(&mut HintPv) -> R) -> R {
        f(&mut self.pv.write().expect("hint lock poisoned"))
    }

    /// The hinted move for a node `depth` plies below the root, or `MOVE_NONE` when the hint
    /// does not reach that deep.
    pub fn hint_move_at(&self, depth: i32) -> Move {
        let pv = self.pv.read().expect("hint lock poisoned");
        if depth <= pv.level() {
            pv.hint(depth)
        } else {
            chess::MOVE_NONE
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
/// A thinker's private working state, owned by its thread.
pub(crate) struct ThinkerContext {
    /// The working board, clobbered freely during search.
    pub board: Board,
    /// The clock snapshot from the last Think command.
    pub clock: Clock,
    /// Root moves the search is restricted to (usually empty: all moves).
    pub restrict: Vec<Move>,
}

impl ThinkerContext {
    fn new() -> ThinkerContext {
        ThinkerContext { board: Board::new(), clock: Clock::new(), restrict: Vec::new() }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
/// A handle to a thinker thread: the command sender and the move-now flag.
#[derive(Debug)]
pub(crate) struct Thinker {
    cmd_tx: Sender<Cmd>,
    move_now: Arc<AtomicBool>,
    // Held for hygiene; the thread exits when the command channel is dropped.
    _handle: thread::JoinHandle<()>,
}

impl Thinker {
    /// Spawns the root thinker. Its responses arrive on the returned receiver.
    pub fn spawn_root(shared: Arc<SharedContext>) -> (Thinker, Receiver<Rsp>) {
        let (rsp_tx, rsp_rx) = mpsc::channel();
        let thinker = Thinker::spawn(shared, RspSender::Root(rsp_tx), true, "woodpusher root");
        (thinker, rsp_rx)
    }

    /// Spawns a worker thinker reporting into the pool funnel as `id`.
    pub fn spawn_worker(shared: Arc<SharedContext>, id: usize,
                        funnel: Sender<(usize, Rsp)>) -> Thinker {
        Thinker::spawn(shared, RspSender::Worker { id, funnel }, false,
                       &format!("woodpusher searcher {}", id))
    }

    fn spawn(shared: Arc<SharedContext>, rsp: RspSender, is_root: bool, name: &str) -> Thinker {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let move_now = Arc::new(AtomicBool::new(false));
        let flag = move_now.clone();

        let handle = thread::Builder::new()
            .name(name.into())
            .spawn(move || thinker_loop(cmd_rx, rsp, shared, flag, is_root))
            .expect("failed to spawn thinker thread");

        Thinker { cmd_tx, move_now, _handle: handle }
    }

    /// Posts a command. The thinker processes commands strictly in order.
    pub fn post(&self, cmd: Cmd) {
        self.cmd_tx.send(cmd).expect("thinker thread is gone");
    }

    /// Raises the move-now flag. Monotonic within one command's lifetime: the search only
    /// ever observes it going up, and the *controller* lowers it again when it consumes the
    /// final response. (Lowering it from the thinker's side would race against a bail posted
    /// just before the next command starts.)
    pub fn set_move_now(&self) {
        self.move_now.store(true, Ordering::Relaxed);
    }

    /// Lowers the move-now flag. Only call after consuming a final response, when the thinker
    /// is known idle.
    pub fn clear_move_now(&self) {
        self.move_now.store(false, Ordering::Relaxed);
    }

    /// A shareable handle to the move-now flag, for the timer thread.
    pub fn move_now_handle(&self) -> Arc<AtomicBool> {
        self.move_now.clone()
    }
}

fn thinker_loop(cmd_rx: Receiver<Cmd>, rsp: RspSender, shared: Arc<SharedContext>,
                move_now: Arc<AtomicBool>, is_root: bool) {
    let mut ctx = ThinkerContext::new();
    let mut pool = if is_root { Some(SearcherPool::new(shared.clone())) } else { None };

    while let Ok(cmd) = cmd_rx.recv() {
        match cmd {
            Cmd::Think { clock, restrict } => {
                ctx.clock = clock;
                ctx.restrict = restrict;
                search::computer_move(&mut ctx, &shared, &rsp, &move_now, pool.as_mut(), false);
            }
            Cmd::Ponder { restrict } => {
                ctx.restrict = restrict;
                search::computer_move(&mut ctx, &shared, &rsp, &move_now, pool.as_mut(), true);
            }
            Cmd::Search { alpha, beta, mv, cur_depth, max_depth } => {
                search::subtree_search(&mut ctx, &shared, &rsp, &move_now,
                                       alpha, beta, mv, cur_depth, max_depth);
            }
            Cmd::MakeMove { mv, save_ring } => {
                if save_ring {
                    ctx.board.save_position();
                }
                ctx.board.make_move(mv);
                if is_root {
                    shared.with_hint_mut(|hint| hint.decrement(mv));
                }
            }
            Cmd::UnmakeMove => {
                ctx.board.unmake_move();
                if is_root {
                    shared.with_hint_mut(|hint| hint.rewind(1));
                }
            }
            Cmd::SetBoard(board) => {
                if is_root {
                    // Best-effort hint tracking in case the boards are similar. Even at the
                    // same ply the next search must start over.
                    let ply_diff = ctx.board.ply() - board.ply();
                    shared.with_hint_mut(|hint| {
                        hint.rewind(ply_diff);
                        hint.reset_search_start_level();
                    });
                }
                ctx.board = *board;
            }
            Cmd::NewGame => {
                if is_root {
                    shared.trans_table.reset();
                    shared.history.clear();
                    shared.with_hint_mut(|hint| hint.clear());
                    shared.game_count.fetch_add(1, Ordering::Relaxed);
                    // Lazy thread creation: if maxThreads was configured down before the
                    // first game, the extra threads are never spawned at all.
                    let target = shared.max_threads.load(Ordering::Relaxed);
                    pool.as_mut().expect("root owns the pool").set_num_threads(target);
                    debug!("new game {}", shared.game_count.load(Ordering::Relaxed));
                }
                ctx.board = Board::new();
            }
            Cmd::SetNumThreads(n) => {
                if let Some(pool) = pool.as_mut() {
                    pool.set_num_threads(n);
                }
            }
        }
    }
}
