//! The search: iterative deepening, minimax with quiescence, and the think driver.
//
//  This Source Code Form is subject to the terms of the Mozilla Public
//  License, v. 2.0. If a copy of the MPL was not distributed with this
//  file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
////////////////////////////////////////////////////////////////////////////////////////////////////
//! A note on why the search window is never shrunk to a hashed evaluation's bounds: lowering
//! beta to a hashed high bound is simply invalid (a fail-high against the shrunken window says
//! nothing about the real one), and the hashed move's evaluation cannot compensate because it
//! is not necessarily the best move. Re-searches can also hit hashes of deeper searches, which
//! change evaluations even at a fixed depth, so a hashed window is at best an educated guess.
//! The bounds are used only as the replacement and compatibility rules in the table itself.
use std::sync::atomic::{AtomicBool, Ordering};

use log::debug;

use chess::{Board, Move, MoveList, Piece, PieceType, FLAG, MOVE_NONE};

use super::eval::{
    bias_draw, end_game_eval, potential_improvement, Eval, EVAL_LOSS, EVAL_LOSS_THRESHOLD,
    EVAL_WIN, EVAL_WIN_THRESHOLD,
};
use super::pv::SearchPv;
use super::searchers::SearcherPool;
use super::stats::SharedStats;
use super::thinker::{
    PvArgs, Rsp, RspSender, SearchDoneArgs, SharedContext, ThinkerContext, DEPTH_NO_LIMIT,
};

// Do impose some kind of depth cap even when unconfigured, to prevent a tight loop (and a lot
// of notification spew) when running into the fifty-move rule.
const FALLBACK_MAX_LEVEL: i32 = 100;

/// Everything one thinker's search needs in hand while recursing.
struct Search<'a> {
    board: &'a mut Board,
    shared: &'a SharedContext,
    rsp: &'a RspSender,
    move_now: &'a AtomicBool,
    /// The searcher pool; only the root thinker has one, and with it the master role.
    pool: Option<&'a mut SearcherPool>,
    /// Root moves the search is restricted to (usually empty, meaning all of them).
    root_moves: MoveList,
    /// Plies from the root node.
    depth: i32,
    /// The nominal depth limit of the current iteration.
    level: i32,
}

impl<'a> Search<'a> {
    fn node_budget_exhausted(&self) -> bool {
        let max_nodes = self.shared.max_nodes.load(Ordering::Relaxed);
        max_nodes != 0 && self.shared.stats.nodes.load(Ordering::Relaxed) >= max_nodes
    }

    fn must_move(&self) -> bool {
        self.move_now.load(Ordering::Relaxed) || self.node_budget_exhausted()
    }

    fn searchers_searching(&self) -> bool {
        self.pool.as_ref().map_or(false, |pool| pool.are_searching())
    }

    /// Records an improved line, and at the root also reports it and refreshes the hint.
    fn update_pv(&mut self, good_pv: &mut SearchPv, child: Option<&SearchPv>, mv: Move,
                 eval: i32) {
        if mv == MOVE_NONE {
            good_pv.clear();
            return;
        }
        let is_root = match child {
            Some(child) => good_pv.update_from_child(mv, child),
            None => good_pv.update(mv),
        };
        if is_root {
            let mut display = super::pv::DisplayPv::new();
            display.set(self.level, Eval::exact(eval), good_pv);
            self.rsp.send(Rsp::Pv(PvArgs { stats: self.shared.stats.snapshot(), pv: display }));
            self.shared.with_hint_mut(|hint| hint.update(&display));
        }
    }

    /// Makes a move, evaluates the resulting position from the mover's point of view, and
    /// unmakes. The window and the returned bounds are nudged by one around the mate
    /// thresholds so that "mate in N" falls out of the arithmetic: a detected win at the child
    /// is one ply further from this node.
    fn try_move(&mut self, mv: Move, mut alpha: i32, mut beta: i32, new_pv: &mut SearchPv,
                hash_hit_only: Option<&mut bool>) -> Eval {
        self.board.make_move(mv);
        self.shared.trans_table.prefetch(self.board.zobrist());
        self.depth += 1;
        new_pv.set_start_depth(self.depth);

        if alpha >= EVAL_WIN_THRESHOLD && alpha < EVAL_WIN {
            alpha += 1;
        } else if alpha <= EVAL_LOSS_THRESHOLD && alpha > EVAL_LOSS {
            alpha -= 1;
        }
        if beta >= EVAL_WIN_THRESHOLD && beta < EVAL_WIN {
            beta += 1;
        } else if beta <= EVAL_LOSS_THRESHOLD && beta > EVAL_LOSS {
            beta -= 1;
        }

        let mut eval = -self.minimax(-beta, -alpha, new_pv, hash_hit_only);

        self.depth -= 1;
        self.board.unmake_move();

        // We could make a move and had to try it, so neither bound can be EVAL_WIN; pulling
        // mate scores one step toward zero records the extra ply to get here.
        if eval.lo >= EVAL_WIN_THRESHOLD {
            eval.lo -= 1;
        } else if eval.lo <= EVAL_LOSS_THRESHOLD {
            eval.lo += 1;
        }
        if eval.hi >= EVAL_WIN_THRESHOLD {
            eval.hi -= 1;
        } else if eval.hi <= EVAL_LOSS_THRESHOLD {
            eval.hi += 1;
        }
        eval
    }

    /// Walks `mvlist` from `*cookie` looking for a move whose child position is already
    /// hashed deeply enough to evaluate without searching. On success the move is removed
    /// from the list and returned with its evaluation; on failure `*cookie` goes to -1.
    fn try_next_hash_move(&mut self, alpha: i32, beta: i32, new_pv: &mut SearchPv,
                          mvlist: &mut MoveList, cookie: &mut i32) -> Option<(Move, Eval)> {
        let mut i = *cookie as usize;
        while i < mvlist.num_moves() {
            let mv = mvlist.moves(i);
            let mut hash_hit = true;
            let eval = self.try_move(mv, alpha, beta, new_pv, Some(&mut hash_hit));
            if hash_hit {
                mvlist.delete_move(i);
                *cookie = i as i32;
                return Some((mv, eval));
            }
            i += 1;
        }
        *cookie = -1;
        None
    }

    /// Evaluates the current position for the side to move, between `alpha` and `beta`.
    ///
    /// With `hash_hit_only` supplied, this is a probe: it returns a real evaluation only if
    /// the transposition table already knows one, and otherwise sets the flag to false and
    /// returns a meaningless full range.
    fn minimax(&mut self, mut alpha: i32, beta: i32, good_pv: &mut SearchPv,
               hash_hit_only: Option<&mut bool>) -> Eval {
        good_pv.clear();
        let turn = self.board.turn();
        let mut strgh = self.board.relative_material_strength();
        let search_depth = self.level - self.depth;
        let quiescing = search_depth < 0;
        let base_ply = (self.board.ply() - self.depth) as u16;
        let stats = &self.shared.stats;

        SharedStats::bump(&stats.nodes);
        if !quiescing {
            SharedStats::bump(&stats.non_q_nodes);
        }

        if self.board.is_draw_insufficient_material()
            || self.board.is_draw_fifty_move()
            || self.board.is_draw_threefold_repetition_fast() {
            // Draw detected. Skew the eval a bit so that the side with better material keeps
            // trying to win, and the side with worse material grabs the draw.
            return Eval::exact(bias_draw(strgh, self.depth));
        }

        let ncheck = self.board.checking_coord();

        // A repeat is already available below this node. Deduct the bias now, nudging the
        // search away from (or toward) lines that can force it. Returning "draw" outright
        // would be cheaper but corrupts the eval of losing positions through back-propagation.
        let mut improvement;
        if self.board.repeat_ply() != -1 {
            improvement = -bias_draw(strgh, self.depth);
            strgh -= improvement;
        } else {
            improvement = 0;
        }

        if quiescing && ncheck == FLAG {
            // Some endgame intelligence right at the leaves. No strength change is possible
            // when the opponent has a bare king and we have no pawns, so move generation can
            // be skipped entirely.
            if self.board.material_strength(!turn) == 0
                && !self.board.piece_exists(Piece::new(turn, PieceType::Pawn)) {
                strgh += end_game_eval(self.board, turn);
                return Eval::exact(strgh);
            }

            // Stand pat: quiescing assumes we can at least preserve the current material by
            // some quiet move that was never generated. This is the node evaluation function,
            // cleverly hidden.
            if strgh >= beta {
                return Eval::new(strgh, EVAL_WIN);
            }
        }

        // Can a draw be forced from below this position? The first quiescing ply may itself
        // be a repeat, hence 3 rather than 4 plies of margin once a repeat is known.
        let might_draw = if self.board.repeat_ply() == -1 {
            search_depth >= 5.max(7 - self.board.ncp_plies())
        } else {
            search_depth >= 3 - (self.board.ply() - self.board.repeat_ply())
        };

        // Probe the transposition table. Positions on a might-draw path are not probed (their
        // hashes cannot see the repetition history), except right after a reset of the
        // fifty-move clock, where no repeat can reach back before this node.
        let zobrist = self.board.zobrist();
        if (!might_draw || self.board.ncp_plies() == 0)
            && self.shared.trans_table.quick_hit_test(zobrist) {
            if let Some(hit) = self.shared.trans_table.hit(
                zobrist, search_depth, base_ply, alpha, beta, stats) {
                self.update_pv(good_pv, None, hit.mv, hit.eval.lo);
                return hit.eval;
            }
        }
        if let Some(flag) = hash_hit_only {
            *flag = false;
            return Eval::full_range(); // actual bounds do not matter
        }

        SharedStats::bump(&stats.move_gen_nodes);
        let mut mvlist = MoveList::new();
        if self.depth > 0 || self.root_moves.num_moves() == 0 {
            let history =
                if search_depth > 1 { Some(&self.shared.history) } else { None };
            self.board.generate_legal_moves(&mut mvlist, quiescing && ncheck == FLAG, history);
        } else {
            mvlist = self.root_moves.clone();
        }

        let mut best_move = MOVE_NONE;

        if quiescing
            && !self.board.piece_exists(Piece::new(chess::Color::White, PieceType::Pawn))
            && !self.board.piece_exists(Piece::new(chess::Color::Black, PieceType::Pawn)) {
            // Pawnless endgame: add the king-hunt term so that KQ vs KN and friends actually
            // close out.
            if strgh >= 0 {
                strgh += end_game_eval(self.board, turn);
            } else {
                strgh -= end_game_eval(self.board, !turn);
            }
        }

        let mut ret;
        let mut ran_moves = false;

        if mvlist.num_moves() == 0 {
            // The check annotation for a side is only guaranteed correct after the opponent
            // moved, which is exactly the situation here.
            ret = Eval::exact(if ncheck != FLAG {
                EVAL_LOSS // checkmated
            } else if !quiescing {
                0 // stalemated
            } else {
                strgh // ran out of captures to try
            });
        } else if quiescing {
            // Once we know we are not mated, the stand-pat bound applies for real.
            if strgh >= beta {
                ret = Eval::new(strgh, EVAL_WIN);
            } else {
                alpha = alpha.max(strgh);
                if mvlist.num_moves() > 1 {
                    mvlist.sort_by_cap_worth(self.board);
                }
                ret = Eval::exact(strgh); // if no capture improves on this
                ran_moves = true;
            }
        } else {
            let hint_mv = self.shared.hint_move_at(self.depth);
            mvlist.use_as_first_move(hint_mv);

            // Save this position for later draw detection (never applicable while quiescing).
            if might_draw {
                self.board.save_position();
            }
            ret = Eval::new(EVAL_LOSS, alpha);
            ran_moves = true;
        }

        if ran_moves {
            let master_node = self.pool.is_some() && search_depth > 1;

            if search_depth == 1 {
                improvement += potential_improvement(self.board, turn);
            }

            // Trying hashed moves first wastes no search budget guessing a good first move,
            // but only pays at real depth, and never at the root (where a crappy hashed move
            // plus an early clock could leave the good move unevaluated).
            let mut cookie: i32 =
                if search_depth > 3 && self.depth != 0 && mvlist.num_moves() > 1 { 0 } else { -1 };

            let mut new_pv = SearchPv::new(self.depth + 1);
            let mut second_best = alpha;
            let mut i = 0;

            loop {
                if !(i < mvlist.num_moves() || (master_node && self.searchers_searching())) {
                    break;
                }

                let mv;
                let my_eval;

                if cookie > -1 {
                    match self.try_next_hash_move(alpha, beta, &mut new_pv, &mut mvlist,
                                                  &mut cookie) {
                        Some((hash_mv, eval)) => {
                            mv = hash_mv;
                            my_eval = eval;
                        }
                        None => continue, // ran off the end; fall back to normal searching
                    }
                } else if master_node {
                    if i == 0 {
                        // The first move is special (it seeds the PV) and is searched
                        // locally, mirrored so the workers' boards follow the master's path.
                        mv = mvlist.moves(0);
                        if let Some(pool) = self.pool.as_mut() {
                            pool.make_move(mv, might_draw);
                        }
                        my_eval = self.try_move(mv, alpha, beta, &mut new_pv, None);
                        if let Some(pool) = self.pool.as_mut() {
                            pool.unmake_move();
                        }
                        i += 1;
                    } else {
                        let mut delegated = false;
                        if i < mvlist.num_moves() {
                            let next = mvlist.moves(i);
                            let (cur_depth, max_depth) = (self.depth, self.level);
                            delegated = self.pool.as_mut().expect("master implies pool")
                                .delegate_search(alpha, beta, next, cur_depth, max_depth);
                        }
                        if delegated {
                            // Move on to the next sibling immediately.
                            i += 1;
                            continue;
                        }
                        // Nothing left to hand out, or nobody free to take it: wait for a
                        // worker. Results arrive in completion order.
                        let done = self.pool.as_mut().expect("master implies pool").wait_one();
                        mv = done.mv;
                        my_eval = done.eval;
                        new_pv = done.pv;
                    }
                } else {
                    mv = mvlist.moves(i);

                    // Futility pruning: at the last level with no draw subtleties (or while
                    // quiescing), a non-checking move whose material gain cannot reach alpha
                    // is not worth trying. (At depth one we assume nothing better than a
                    // queen capture can appear a ply later; a capturing checkmate at the
                    // quiesce boundary is rare enough to live with.)
                    if (quiescing || (search_depth < 2 && !might_draw)) && mv.chk == FLAG {
                        let pre_eval = self.board.cap_worth(mv) + strgh + improvement;
                        if pre_eval <= alpha {
                            // The high bound must still absorb the skipped move, or a
                            // depth-0 position could be mistaken for checkmate.
                            ret.hi = ret.hi.max(pre_eval);
                            if !mvlist.is_preferred_move(i + 1) {
                                break; // the rest of the list cannot help either
                            }
                            i += 1;
                            continue;
                        }
                    }

                    my_eval = self.try_move(mv, alpha, beta, &mut new_pv, None);
                    i += 1;
                }

                // When told to move, the evaluation in hand cannot be trusted (or hashed);
                // unwind with the best bounds seen so far.
                if self.must_move() {
                    if master_node {
                        self.pool.as_mut().expect("master implies pool").bail();
                    }
                    return Eval::new(ret.lo, EVAL_WIN);
                }

                // Even a move that fails low can tighten this position's bounds.
                ret.bump_to(my_eval);

                let new_val = my_eval.lo;
                if new_val >= alpha {
                    // Track the second-best value so the history table only learns moves
                    // that were strictly best. (Most moves fail at {LOSS, alpha}, so this
                    // does not practically disable the table.)
                    second_best = alpha;
                }
                if new_val > alpha {
                    best_move = mv;
                    alpha = new_val;
                    self.update_pv(good_pv, Some(&new_pv), mv, new_val);

                    if new_val >= beta {
                        // Beta cutoff: the opponent will avoid this position anyway.
                        if master_node && self.searchers_searching() {
                            self.pool.as_mut().expect("master implies pool").bail();
                            ret.hi = EVAL_WIN;
                        } else if cookie != -1 || i != mvlist.num_moves() {
                            // Unless every move was actually examined, the high bound is
                            // unknown.
                            ret.hi = EVAL_WIN;
                        }
                        break;
                    } else if !my_eval.is_exact() {
                        // alpha < lo < beta requires an exact evaluation; anything else is
                        // a search bug worth dying loudly for.
                        panic!("inexact eval {} inside the window ({}, {})",
                               my_eval, alpha, beta);
                    }
                } else {
                    debug_assert!(my_eval.hi <= alpha);
                }
            }

            // The history heuristic learns quiet moves that proved strictly best. Moves that
            // the movelist prefers anyway (captures, promotions) are not recorded; that
            // mildly but measurably helps the ordering.
            if !quiescing
                && alpha > second_best
                && best_move.promote == PieceType::Empty
                && (best_move.is_castle() || self.board.piece_at(best_move.dst).is_empty()) {
                debug_assert!(best_move != MOVE_NONE);
                self.shared.history.store(best_move, turn, self.board.ply());
            }
        }

        if self.shared.trans_table.size() != 0 {
            self.shared.trans_table.conditional_update(ret, best_move, zobrist, search_depth,
                                                       base_ply, stats);
        }
        ret
    }
}

/// Claimable draws: the fifty-move rule, or threefold repetition verified exactly against the
/// board's own history.
fn can_claim_draw(board: &Board) -> bool {
    board.is_draw_fifty_move() || board.is_draw_threefold_repetition()
}

/// Resignation policy: a clear mating strategy against us, a rook or more of material down,
/// and no queen to swindle with. Never while pondering (the opponent may yet blunder or flag).
fn should_resign(board: &Board, eval: Eval, pondering: bool) -> bool {
    let turn = board.turn();
    !pondering
        && eval.hi <= EVAL_LOSS_THRESHOLD
        && board.material_strength(!turn) - board.material_strength(turn) >= chess::EVAL_ROOK
        && !board.piece_exists(Piece::new(turn, PieceType::Queen))
}

////////////////////////////////////////////////////////////////////////////////////////////////////
/// The top-level think/ponder driver: iterative deepening from a hint-suggested level, plus
/// the draw, resignation, and trivial-move shortcuts around it.
pub(crate) fn computer_move(ctx: &mut ThinkerContext, shared: &SharedContext, rsp: &RspSender,
                            move_now: &AtomicBool, pool: Option<&mut SearcherPool>,
                            ponder: bool) {
    shared.stats.clear();
    if !ponder {
        debug!("thinking at ply {} with {}us on the clock",
               ctx.board.ply(), ctx.clock.time());
    }

    // Build the restricted root list, if any.
    let mut root_moves = MoveList::new();
    for mv in &ctx.restrict {
        if let Some(legal) = ctx.board.find_legal(*mv) {
            root_moves.add_move(legal, &ctx.board);
        }
    }

    let mut search = Search {
        board: &mut ctx.board,
        shared,
        rsp,
        move_now,
        pool,
        root_moves,
        depth: 0,
        level: 0,
    };

    // If a draw can be claimed right now, do so without thinking.
    if can_claim_draw(search.board) {
        rsp.send(Rsp::Draw(MOVE_NONE));
        return;
    }

    if shared.random_moves.load(Ordering::Relaxed) {
        search.board.randomize();
    }

    let mut mvlist = MoveList::new();
    search.board.generate_legal_moves(&mut mvlist, false, None);
    if mvlist.num_moves() == 0 {
        // Mated or stalemated positions never reach a think command through the game layer.
        rsp.send(Rsp::Move(MOVE_NONE));
        return;
    }

    let mut mv = MOVE_NONE;
    let mut resigned = false;

    if !ponder
        && (mvlist.num_moves() == 1 || search.board.is_normal_starting_position()) {
        // Only one reply, or the normal first move: not worth thinking about.
        mv = mvlist.moves(0);
    } else {
        // Fall back on the hinted move if time expires before any level completes.
        mvlist.use_as_first_move(shared.hint().hint(0));

        // The workers search from copies of this board.
        if let Some(pool) = search.pool.as_mut() {
            pool.set_board(search.board);
        }

        let mut pv = SearchPv::new(0);
        let mut level = shared.hint().suggest_search_start_level();

        loop {
            let max_level = shared.max_level.load(Ordering::Relaxed);
            let max_search_depth =
                if max_level == DEPTH_NO_LIMIT { FALLBACK_MAX_LEVEL } else { max_level };
            if level > max_search_depth {
                break;
            }

            search.depth = 0;
            search.level = level;
            debug!("ply {} searching level {}", search.board.ply(), level);

            // The offset window lets the arithmetic discover the *shortest* mates first.
            let my_eval = search.minimax(EVAL_LOSS + level, EVAL_WIN - (level + 1), &mut pv,
                                         None);

            if search.must_move() {
                break;
            }
            shared.with_hint_mut(|hint| hint.completed_search());

            if shared.can_resign.load(Ordering::Relaxed)
                && should_resign(search.board, my_eval, ponder) {
                resigned = true;
                break;
            }
            if my_eval.hi <= EVAL_LOSS_THRESHOLD || my_eval.lo >= EVAL_WIN_THRESHOLD {
                // Mating or mated: deeper searching cannot change anything.
                break;
            }
            level += 1;
        }

        mv = pv.moves(0);
    }

    rsp.send(Rsp::Stats(shared.stats.snapshot()));

    if resigned {
        rsp.send(Rsp::Resign);
        return;
    }

    // We may not have found any decent move (forced to move instantly, or pondering a
    // position about to be lost); in that case just play the first legal one.
    if mv == MOVE_NONE {
        mv = mvlist.moves(0);
    }

    // If the chosen move reaches a claimable draw, claim it.
    ctx_make_unmake_claims_draw(search.board, mv, rsp);
}

fn ctx_make_unmake_claims_draw(board: &mut Board, mv: Move, rsp: &RspSender) {
    board.make_move(mv);
    let will_draw = can_claim_draw(board);
    board.unmake_move();

    if will_draw {
        rsp.send(Rsp::Draw(mv));
    } else {
        rsp.send(Rsp::Move(mv));
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
/// The worker role: evaluate one delegated sibling move and report back.
pub(crate) fn subtree_search(ctx: &mut ThinkerContext, shared: &SharedContext, rsp: &RspSender,
                             move_now: &AtomicBool, alpha: i32, beta: i32, mv: Move,
                             cur_depth: i32, max_depth: i32) {
    let mut search = Search {
        board: &mut ctx.board,
        shared,
        rsp,
        move_now,
        pool: None,
        root_moves: MoveList::new(),
        depth: cur_depth,
        level: max_depth,
    };

    let mut pv = SearchPv::new(cur_depth + 1);
    let eval = search.try_move(mv, alpha, beta, &mut pv, None);
    rsp.send(Rsp::SearchDone(SearchDoneArgs { mv, eval, pv }));
}
