//! The elastic pool of worker thinkers the root delegates sub-trees to.
//
//  This Source Code Form is subject to the terms of the Mozilla Public
//  License, v. 2.0. If a copy of the MPL was not distributed with this
//  file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
////////////////////////////////////////////////////////////////////////////////////////////////////
//! The pool lives on the root thinker's thread. Workers post their `SearchDone` results into
//! one shared funnel channel, so [`wait_one`](struct.SearcherPool.html#method.wait_one)
//! receives results in *completion* order, not submission order; the master compares each
//! against its running best.
//!
//! The master mirrors its own make/unmake of locally searched moves to every worker, so a
//! worker's board always sits at the master's current path from the root when a `Search`
//! command reaches it.
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

use log::debug;

use chess::{Board, Move};

use super::thinker::{Cmd, Rsp, SearchDoneArgs, SharedContext, Thinker};

struct Searcher {
    id: usize,
    thinker: Thinker,
    searching: bool,
}

////////////////////////////////////////////////////////////////////////////////////////////////////
/// The worker pool. Grows by spawning (or reusing previously shrunk-away) workers; shrinks by
/// parking idle workers in a free list for the next grow.
pub(crate) struct SearcherPool {
    searchers: Vec<Searcher>,
    free_pool: Vec<(usize, Thinker)>,
    funnel_tx: Sender<(usize, Rsp)>,
    funnel_rx: Receiver<(usize, Rsp)>,
    num_searching: usize,
    next_id: usize,
    shared: Arc<SharedContext>,
}

impl SearcherPool {
    /// Creates a pool with one worker (there must always be someone to delegate to).
    pub fn new(shared: Arc<SharedContext>) -> SearcherPool {
        let (funnel_tx, funnel_rx) = mpsc::channel();
        let mut pool = SearcherPool {
            searchers: Vec::new(),
            free_pool: Vec::new(),
            funnel_tx,
            funnel_rx,
            num_searching: 0,
            next_id: 0,
            shared,
        };
        pool.set_num_threads(1);
        pool
    }

    /// The number of active workers.
    pub fn num_threads(&self) -> usize {
        self.searchers.len()
    }

    /// Grows or shrinks the pool to `num_threads` workers. Must only be called while the
    /// engine is idle.
    pub fn set_num_threads(&mut self, num_threads: usize) {
        let num_threads = num_threads.max(1);
        debug_assert_eq!(self.num_searching, 0);

        while self.searchers.len() > num_threads {
            let searcher = self.searchers.pop().expect("len checked");
            self.free_pool.push((searcher.id, searcher.thinker));
        }

        while self.searchers.len() < num_threads {
            let (id, thinker) = match self.free_pool.pop() {
                Some(parked) => parked,
                None => {
                    let id = self.next_id;
                    self.next_id += 1;
                    let thinker =
                        Thinker::spawn_worker(self.shared.clone(), id, self.funnel_tx.clone());
                    (id, thinker)
                }
            };
            // A fresh (or revived) worker starts from a clean game; the caller sets the real
            // board on every search start anyway.
            thinker.post(Cmd::NewGame);
            self.searchers.push(Searcher { id, thinker, searching: false });
        }
        debug!("searcher pool sized to {} thread(s)", self.searchers.len());
    }

    /// Hands the next sibling move to an idle worker, if there is one. Returns whether the
    /// move was delegated.
    pub fn delegate_search(&mut self, alpha: i32, beta: i32, mv: Move, cur_depth: i32,
                           max_depth: i32) -> bool {
        if self.num_searching >= self.searchers.len() {
            return false;
        }
        let searcher = self.searchers.iter_mut()
            .find(|s| !s.searching)
            .expect("searching count says one is idle");
        searcher.searching = true;
        searcher.thinker.post(Cmd::Search { alpha, beta, mv, cur_depth, max_depth });
        self.num_searching += 1;
        true
    }

    /// Are any workers currently searching?
    pub fn are_searching(&self) -> bool {
        self.num_searching > 0
    }

    /// Blocks until some worker finishes, and returns its result. Workers finish in whatever
    /// order they finish.
    pub fn wait_one(&mut self) -> SearchDoneArgs {
        loop {
            let (id, rsp) = self.funnel_rx.recv().expect("all workers are gone");
            match rsp {
                Rsp::SearchDone(args) => {
                    self.mark_idle(id);
                    return args;
                }
                other => {
                    // Workers have no business sending anything else.
                    debug!("discarding stray worker response {:?}", other);
                }
            }
        }
    }

    /// Cancels all outstanding delegated searches and discards their results. On return no
    /// worker is searching.
    pub fn bail(&mut self) {
        for searcher in self.searchers.iter().filter(|s| s.searching) {
            searcher.thinker.set_move_now();
        }
        while self.num_searching > 0 {
            let (id, rsp) = self.funnel_rx.recv().expect("all workers are gone");
            if let Rsp::SearchDone(_) = rsp {
                self.mark_idle(id);
            }
        }
    }

    fn mark_idle(&mut self, id: usize) {
        let searcher = self.searchers.iter_mut()
            .find(|s| s.id == id)
            .expect("result from a worker not in the active set");
        debug_assert!(searcher.searching);
        searcher.searching = false;
        // The worker is idle with nothing queued, so a bail flag from the finished search
        // can be lowered here without racing anything.
        searcher.thinker.clear_move_now();
        self.num_searching -= 1;
    }

    /// Mirrors a master move onto every worker board.
    pub fn make_move(&self, mv: Move, save_ring: bool) {
        for searcher in &self.searchers {
            searcher.thinker.post(Cmd::MakeMove { mv, save_ring });
        }
    }

    /// Mirrors a master unmake onto every worker board.
    pub fn unmake_move(&self) {
        for searcher in &self.searchers {
            searcher.thinker.post(Cmd::UnmakeMove);
        }
    }

    /// Sets every worker's board, in preparation for a new search.
    pub fn set_board(&self, board: &Board) {
        for searcher in &self.searchers {
            searcher.thinker.post(Cmd::SetBoard(Box::new(board.clone())));
        }
    }
}

impl std::fmt::Debug for SearcherPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearcherPool")
            .field("threads", &self.searchers.len())
            .field("searching", &self.num_searching)
            .field("parked", &self.free_pool.len())
            .finish()
    }
}
