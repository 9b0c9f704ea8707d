//! Saveable games: the minimal record needed for save, restore, undo, and redo.
//
//  This Source Code Form is subject to the terms of the Mozilla Public
//  License, v. 2.0. If a copy of the MPL was not distributed with this
//  file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
////////////////////////////////////////////////////////////////////////////////////////////////////
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use chess::{Board, Move, Position};

use super::clock::{Clock, ClockParameters, TimeT};
use super::GameError;

/// An absurdly generous cap on the starting ply, mostly to reject corrupt files before they
/// allocate anything.
const MAX_FIRST_PLY: i32 = 1_000_000;

/// One committed half-move: the move, and the time left on the mover's clock afterwards
/// (including any increment).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
struct GamePly {
    mv: Move,
    time_left: TimeT,
}

////////////////////////////////////////////////////////////////////////////////////////////////////
/// The on-disk shape: a fixed header (initial clocks, start position as FEN, the current ply)
/// followed by the ply records with moves in coordinate notation.
#[derive(Debug, Serialize, Deserialize)]
struct SaveGameFile {
    clocks: [ClockParameters; 2],
    start_position: String,
    current_ply: i32,
    plies: Vec<SavedPly>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SavedPly {
    mv: String,
    time_left: TimeT,
}

////////////////////////////////////////////////////////////////////////////////////////////////////
/// A game's committed history: start position, clock configuration, and the moves played, with
/// a cursor for undo and redo.
#[derive(Debug, Clone)]
pub struct SaveGame {
    clocks: [ClockParameters; 2],
    start_position: Position,
    // currentPly - start_position.ply() indexes the slot the next committed move lands in.
    current_ply: i32,
    plies: Vec<GamePly>,
}

impl SaveGame {
    /// Creates a save-game anchored at the standard starting position.
    pub fn new() -> SaveGame {
        SaveGame {
            clocks: [Clock::new().parameters(), Clock::new().parameters()],
            start_position: Position::new(),
            current_ply: 0,
            plies: Vec::new(),
        }
    }

    /// The ply the game starts at.
    pub fn first_ply(&self) -> i32 {
        self.start_position.ply()
    }

    /// The ply the cursor currently sits at.
    pub fn current_ply(&self) -> i32 {
        self.current_ply
    }

    /// The ply after the last committed move.
    pub fn last_ply(&self) -> i32 {
        self.start_position.ply() + self.plies.len() as i32
    }

    /// Re-anchors the game at `board`'s current position, dropping all committed moves.
    pub fn set_start_position(&mut self, board: &Board) {
        self.start_position = board.position().clone();
        self.current_ply = board.ply();
        self.plies.clear();
    }

    /// Records the starting clocks (used when restoring or rewinding to the first ply).
    pub fn set_clocks(&mut self, clocks: &[Clock; 2]) {
        self.clocks = [clocks[0].parameters(), clocks[1].parameters()];
    }

    /// Commits a move at the cursor, discarding any previously recorded future (redo tail).
    pub fn commit_move(&mut self, mv: Move, time_left: TimeT) {
        let idx = (self.current_ply - self.first_ply()) as usize;
        self.plies.truncate(idx);
        self.plies.push(GamePly { mv, time_left });
        self.current_ply += 1;
    }

    /// Seeks to `ply`: rebuilds `board` by replay from the start position, and, when given,
    /// winds the clocks back to their recorded times at that point.
    pub fn goto_ply(&mut self, ply: i32, board: &mut Board,
                    clocks: Option<&mut [Clock; 2]>) -> Result<(), GameError> {
        if ply < self.first_ply() || ply > self.last_ply() {
            return Err(GameError::PlyOutOfRange);
        }

        board.set_position(&self.start_position)
            .map_err(|e| GameError::SaveGameCorrupt(e.to_string()))?;
        for record in &self.plies[..(ply - self.first_ply()) as usize] {
            let legal = board.find_legal(record.mv)
                .ok_or_else(|| GameError::SaveGameCorrupt("recorded move is illegal".into()))?;
            board.save_position();
            board.make_move(legal);
        }
        self.current_ply = ply;

        if let Some(clocks) = clocks {
            // Each side's clock shows the time recorded with its last move before the cursor
            // (or the starting time when it has not moved yet).
            let first_turn = self.start_position.turn().index() as i32;
            for (color, clock) in clocks.iter_mut().enumerate() {
                clock.set_parameters(&self.clocks[color]);
                let mut probe = ply - 1;
                while probe >= self.first_ply() {
                    let mover = (first_turn + probe - self.first_ply()) & 1;
                    if mover == color as i32 {
                        let time =
                            self.plies[(probe - self.first_ply()) as usize].time_left;
                        clock.set_time(time);
                        break;
                    }
                    probe -= 1;
                }
            }
        }
        Ok(())
    }

    /// The exact threefold-repetition check for claimed draws: replays the whole recorded
    /// history and counts full position matches against `board`'s current position. Slower
    /// than the Zobrist ring, immune to collisions.
    pub fn is_threefold_repetition(&self, board: &Board) -> bool {
        let mut scratch = match Board::from_position(&self.start_position) {
            Ok(scratch) => scratch,
            Err(_) => return false,
        };
        let mut repeats = 0;

        for (i, record) in self.plies.iter().enumerate() {
            if (self.first_ply() + i as i32) < board.ply()
                && scratch.position().is_repeat_of(board.position())
                && { repeats += 1; repeats == 2 } {
                return true;
            }
            let legal = match scratch.find_legal(record.mv) {
                Some(legal) => legal,
                None => return false,
            };
            scratch.make_move(legal);
        }
        false
    }

    /// Writes the game to `path` as YAML.
    pub fn save(&self, path: &Path) -> Result<(), GameError> {
        // Moves serialize in coordinate notation, which parse unambiguously on replay.
        let mut file = SaveGameFile {
            clocks: self.clocks,
            start_position: self.start_position.to_string(),
            current_ply: self.current_ply,
            plies: Vec::with_capacity(self.plies.len()),
        };
        let mut board = Board::from_position(&self.start_position)
            .map_err(|e| GameError::SaveGameCorrupt(e.to_string()))?;
        let style = chess::MoveStyle::new(chess::MoveNotation::Can,
                                          chess::MoveCastleStyle::K2, false);
        for record in &self.plies {
            let legal = board.find_legal(record.mv)
                .ok_or_else(|| GameError::SaveGameCorrupt("recorded move is illegal".into()))?;
            file.plies.push(SavedPly {
                mv: legal.to_string_styled(&style, Some(&board)),
                time_left: record.time_left,
            });
            board.make_move(legal);
        }

        let yaml = serde_yaml::to_string(&file)
            .map_err(|e| GameError::SaveGameCorrupt(e.to_string()))?;
        fs::write(path, yaml).map_err(|e| GameError::SaveGameCorrupt(e.to_string()))
    }

    /// Reads a game back from `path`, validating everything: the start position must be
    /// legal, every move must be legal from the running board, and the header's ply fields
    /// must be sane. On any failure the existing in-memory game is untouched (this
    /// constructor simply fails).
    pub fn restore(path: &Path) -> Result<SaveGame, GameError> {
        let corrupt = |why: String| GameError::SaveGameCorrupt(why);

        let text = fs::read_to_string(path).map_err(|e| corrupt(e.to_string()))?;
        let file: SaveGameFile =
            serde_yaml::from_str(&text).map_err(|e| corrupt(e.to_string()))?;

        let start_position: Position = file.start_position.parse()
            .map_err(|e: chess::Error| corrupt(e.to_string()))?;
        let mut board = Board::from_position(&start_position)
            .map_err(|e| corrupt(e.to_string()))?;

        if start_position.ply() > MAX_FIRST_PLY {
            return Err(corrupt("implausible starting ply".into()));
        }

        let mut plies = Vec::with_capacity(file.plies.len());
        for saved in &file.plies {
            let mv = Move::parse(&saved.mv, &board)
                .map_err(|_| corrupt(format!("illegal move '{}' in save game", saved.mv)))?;
            plies.push(GamePly { mv, time_left: saved.time_left });
            board.save_position();
            board.make_move(mv);
        }

        let last_ply = start_position.ply() + plies.len() as i32;
        if file.current_ply < start_position.ply() || file.current_ply > last_ply {
            return Err(corrupt("current ply outside the recorded game".into()));
        }

        Ok(SaveGame {
            clocks: file.clocks,
            start_position,
            current_ply: file.current_ply,
            plies,
        })
    }
}

impl Default for SaveGame {
    fn default() -> SaveGame {
        SaveGame::new()
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use super::*;

    fn committed_game(moves: &[&str]) -> (SaveGame, Board) {
        let mut sgame = SaveGame::new();
        let mut board = Board::new();
        sgame.set_start_position(&board);
        for s in moves {
            let mv = Move::parse(s, &board).expect("test moves are legal");
            board.save_position();
            board.make_move(mv);
            sgame.commit_move(mv, 1000);
        }
        (sgame, board)
    }

    #[test]
    fn commit_truncates_the_redo_tail() {
        let (mut sgame, mut board) = committed_game(&["e2e4", "e7e5", "g1f3"]);
        assert_eq!(sgame.last_ply(), 3);

        sgame.goto_ply(1, &mut board, None).expect("in range");
        assert_eq!(sgame.current_ply(), 1);
        assert_eq!(board.ply(), 1);

        let mv = Move::parse("c7c5", &board).expect("legal");
        board.make_move(mv);
        sgame.commit_move(mv, 900);
        assert_eq!(sgame.last_ply(), 2); // the old tail is gone
    }

    #[test]
    fn goto_ply_rejects_out_of_range() {
        let (mut sgame, mut board) = committed_game(&["e2e4"]);
        assert!(sgame.goto_ply(-1, &mut board, None).is_err());
        assert!(sgame.goto_ply(2, &mut board, None).is_err());
        assert!(sgame.goto_ply(0, &mut board, None).is_ok());
    }

    #[test]
    fn save_restore_round_trip() {
        let (sgame, _) = committed_game(&["e2e4", "e7e5", "g1f3", "b8c6"]);
        let dir = std::env::temp_dir();
        let path = dir.join("woodpusher-test-save.yaml");

        sgame.save(&path).expect("save succeeds");
        let restored = SaveGame::restore(&path).expect("restore succeeds");
        assert_eq!(restored.first_ply(), 0);
        assert_eq!(restored.last_ply(), 4);
        assert_eq!(restored.current_ply(), 4);

        let mut board = Board::new();
        let mut restored = restored;
        restored.goto_ply(4, &mut board, None).expect("in range");
        let (_, original_board) = committed_game(&["e2e4", "e7e5", "g1f3", "b8c6"]);
        assert_eq!(board.zobrist(), original_board.zobrist());

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn restore_rejects_corrupt_files() {
        let dir = std::env::temp_dir();
        let path = dir.join("woodpusher-test-corrupt.yaml");

        std::fs::write(&path, "this is not a save game").expect("write");
        assert!(SaveGame::restore(&path).is_err());

        // A structurally valid file with an illegal move must also fail.
        let (sgame, _) = committed_game(&["e2e4"]);
        sgame.save(&path).expect("save");
        let text = std::fs::read_to_string(&path).expect("read")
            .replace("e2e4", "e2e5");
        std::fs::write(&path, text).expect("write");
        assert!(SaveGame::restore(&path).is_err());

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn exact_threefold_by_replay() {
        let shuffle = ["g1f3", "g8f6", "f3g1", "f6g8", "g1f3", "g8f6", "f3g1", "f6g8"];
        let (sgame, board) = committed_game(&shuffle);
        assert!(sgame.is_threefold_repetition(&board));

        let (sgame, board) = committed_game(&shuffle[..4]);
        assert!(!sgame.is_threefold_repetition(&board));
    }
}
