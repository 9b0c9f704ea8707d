//! A multithreaded chess engine.
//
//  This Source Code Form is subject to the terms of the Mozilla Public
//  License, v. 2.0. If a copy of the MPL was not distributed with this
//  file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
////////////////////////////////////////////////////////////////////////////////////////////////////
//! Woodpusher searches with iterative-deepening alpha-beta over the
//! [`chess`](../chess/index.html) board model, sharing a sharded-lock transposition table
//! between a root thinker and a pool of worker threads. The [`engine`](engine/index.html)
//! module holds the search machinery behind an asynchronous command/response API, and the
//! [`game`](game/index.html) module the clocks, save-games, and think/ponder supervision a
//! front-end builds on.
#![warn(missing_docs, missing_debug_implementations, unused_extern_crates)]

pub mod engine;
pub mod game;

pub use engine::Engine;
pub use game::Game;
