//! Chess clock control.
//
//  This Source Code Form is subject to the terms of the Mozilla Public
//  License, v. 2.0. If a copy of the MPL was not distributed with this
//  file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
////////////////////////////////////////////////////////////////////////////////////////////////////
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Clock time, in microseconds. Clocks can briefly go negative once a player overruns, so this
/// is signed; there is no "negative infinity".
pub type TimeT = i64;

/// The "no limit" sentinel.
pub const CLOCK_TIME_INFINITE: TimeT = i64::max_value();

/// One second, in `TimeT` units.
pub const CLOCK_TIME_SECOND: TimeT = 1_000_000;

////////////////////////////////////////////////////////////////////////////////////////////////////
/// A chess clock for one player: remaining time, post-move increment, time-control periods,
/// and an optional per-move limit.
///
/// All mutating operations return `&mut Self` so they can be chained.
#[derive(Debug, Copy, Clone)]
pub struct Clock {
    // The time put on the clock whenever it is reset (not the moment it started running).
    start_time: TimeT,
    // Time left; only adjusted when the clock stops.
    time: TimeT,
    // Post-increment, added when the clock is stopped after a move.
    inc: TimeT,
    // As in xboard, all time controls are alike: 0 means a single control, otherwise the
    // start time is re-added after every `time_control_period` moves by this side.
    time_control_period: i32,
    // Alternative interface for protocols that count down moves instead; normally overridden
    // by `time_control_period` when both are set.
    num_moves_to_next_time_control: i32,
    per_move_limit: TimeT,
    running: bool,
    turn_start: Option<Instant>,
    // Elapsed time of the last start-stop cycle.
    time_taken: TimeT,
}

/// The configuration half of a clock: everything except its running state. This is what
/// save-games persist and what `set_parameters` copies.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockParameters {
    /// Time put on the clock at each reset.
    pub start_time: TimeT,
    /// Time currently remaining.
    pub time: TimeT,
    /// Post-move increment.
    pub inc: TimeT,
    /// Moves per time-control period (0 for a single control).
    pub time_control_period: i32,
    /// Moves left to the next control, for protocols that count down.
    pub num_moves_to_next_time_control: i32,
    /// Hard cap on thinking time for any single move.
    pub per_move_limit: TimeT,
}

impl Clock {
    /// Creates a clock with infinite time, no per-move limit, stopped.
    pub fn new() -> Clock {
        Clock {
            start_time: CLOCK_TIME_INFINITE,
            time: CLOCK_TIME_INFINITE,
            inc: 0,
            time_control_period: 0,
            num_moves_to_next_time_control: 0,
            per_move_limit: CLOCK_TIME_INFINITE,
            running: false,
            turn_start: None,
            time_taken: 0,
        }
    }

    fn calc_time_taken(&self) -> TimeT {
        match self.turn_start {
            Some(start) => start.elapsed().as_micros() as TimeT,
            None => 0,
        }
    }

    /// Is the clock currently running?
    #[inline]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Does the player have unlimited time?
    #[inline]
    pub fn is_infinite(&self) -> bool {
        self.time == CLOCK_TIME_INFINITE
    }

    /// Elapsed time of the last start-stop cycle (or of the current cycle, while running).
    pub fn time_taken(&self) -> TimeT {
        if self.is_running() { self.calc_time_taken() } else { self.time_taken }
    }

    /// Time remaining on the clock.
    pub fn time(&self) -> TimeT {
        if self.is_running() && !self.is_infinite() {
            self.time - self.calc_time_taken()
        } else {
            self.time
        }
    }

    /// How long the player may think about the current move before being flagged, taking the
    /// per-move limit into account.
    pub fn per_move_time(&self) -> TimeT {
        let result = self.per_move_limit.min(self.time);
        if result == CLOCK_TIME_INFINITE || !self.is_running() {
            result
        } else {
            result - self.calc_time_taken()
        }
    }

    /// Stops the clock, charging the elapsed time.
    pub fn stop(&mut self) -> &mut Clock {
        if self.is_running() {
            self.running = false;
            self.time_taken = self.calc_time_taken();
            if !self.is_infinite() {
                self.time -= self.time_taken;
            }
        }
        self
    }

    /// Starts the clock.
    pub fn start(&mut self) -> &mut Clock {
        if !self.is_running() {
            self.running = true;
            self.turn_start = Some(Instant::now());
        }
        self
    }

    /// Stops the clock and puts the starting time back on it.
    pub fn reset(&mut self) -> &mut Clock {
        self.stop();
        self.set_time(self.start_time);
        self
    }

    /// Adds time (a no-op on an infinite clock).
    pub fn add_time(&mut self, amount: TimeT) -> &mut Clock {
        if self.time != CLOCK_TIME_INFINITE {
            if amount == CLOCK_TIME_INFINITE {
                self.time = amount;
            } else {
                self.time += amount;
            }
        }
        self
    }

    /// Adjusts the clock by its appropriate increment. Meant to be applied just *after* the
    /// player's move is made (in chess, time is adjusted once it is no longer your turn).
    pub fn apply_increment(&mut self, ply: i32) -> &mut Clock {
        if self.is_infinite() {
            return self;
        }
        let inc = self.inc;
        self.add_time(inc);

        // Add any time from reaching a new time control.
        if self.time_control_period != 0 {
            if ((ply + 1) >> 1) % self.time_control_period == 0 {
                let start_time = self.start_time;
                self.add_time(start_time);
            }
        } else if self.num_moves_to_next_time_control == 1 {
            let start_time = self.start_time;
            self.add_time(start_time);
        }
        self
    }

    /// Sets the remaining time, preserving the running state.
    pub fn set_time(&mut self, time: TimeT) -> &mut Clock {
        let was_running = self.is_running();
        self.stop(); // resets the turn start
        self.time = time;
        if was_running {
            self.start();
        }
        self
    }

    /// Sets the time put on the clock at each reset.
    pub fn set_start_time(&mut self, start_time: TimeT) -> &mut Clock {
        self.start_time = start_time;
        self
    }

    /// Sets the post-move increment.
    pub fn set_increment(&mut self, inc: TimeT) -> &mut Clock {
        self.inc = inc;
        self
    }

    /// Sets the time-control period (moves per control; 0 for a single control).
    pub fn set_time_control_period(&mut self, period: i32) -> &mut Clock {
        self.time_control_period = period;
        self
    }

    /// Sets the count-down to the next time control. Do not mix with
    /// `set_time_control_period`.
    pub fn set_num_moves_to_next_time_control(&mut self, num_moves: i32) -> &mut Clock {
        self.num_moves_to_next_time_control = num_moves;
        self
    }

    /// Caps the thinking time for any single move.
    pub fn set_per_move_limit(&mut self, limit: TimeT) -> &mut Clock {
        self.per_move_limit = limit;
        self
    }

    /// The configured start time.
    pub fn start_time(&self) -> TimeT {
        self.start_time
    }

    /// The configured increment.
    pub fn increment(&self) -> TimeT {
        self.inc
    }

    /// The configured time-control period.
    pub fn time_control_period(&self) -> i32 {
        self.time_control_period
    }

    /// The configured per-move limit.
    pub fn per_move_limit(&self) -> TimeT {
        self.per_move_limit
    }

    /// Copies configuration from `params` without touching the running state.
    pub fn set_parameters(&mut self, params: &ClockParameters) -> &mut Clock {
        self.start_time = params.start_time;
        self.time = params.time;
        self.inc = params.inc;
        self.time_control_period = params.time_control_period;
        self.num_moves_to_next_time_control = params.num_moves_to_next_time_control;
        self.per_move_limit = params.per_move_limit;
        self
    }

    /// Extracts the configuration half of the clock.
    pub fn parameters(&self) -> ClockParameters {
        ClockParameters {
            start_time: self.start_time,
            time: self.time,
            inc: self.inc,
            time_control_period: self.time_control_period,
            num_moves_to_next_time_control: self.num_moves_to_next_time_control,
            per_move_limit: self.per_move_limit,
        }
    }
}

impl Default for Clock {
    fn default() -> Clock {
        Clock::new()
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infinite_clock_never_charges() {
        let mut clock = Clock::new();
        assert!(clock.is_infinite());
        clock.start();
        clock.stop();
        assert_eq!(clock.time(), CLOCK_TIME_INFINITE);
    }

    #[test]
    fn increments_and_time_controls() {
        let mut clock = Clock::new();
        clock.set_start_time(60 * CLOCK_TIME_SECOND)
            .set_increment(CLOCK_TIME_SECOND)
            .set_time(60 * CLOCK_TIME_SECOND);

        clock.apply_increment(0);
        assert_eq!(clock.time(), 61 * CLOCK_TIME_SECOND);

        // With a 2-move period, the start time is re-added at move boundaries.
        clock.set_time_control_period(2);
        clock.apply_increment(3); // (3+1)>>1 = 2, divisible: new control
        assert_eq!(clock.time(), 62 * CLOCK_TIME_SECOND + 60 * CLOCK_TIME_SECOND);
    }

    #[test]
    fn per_move_time_respects_the_cap() {
        let mut clock = Clock::new();
        clock.set_time(100 * CLOCK_TIME_SECOND)
            .set_per_move_limit(5 * CLOCK_TIME_SECOND);
        assert_eq!(clock.per_move_time(), 5 * CLOCK_TIME_SECOND);

        clock.set_per_move_limit(CLOCK_TIME_INFINITE);
        assert_eq!(clock.per_move_time(), 100 * CLOCK_TIME_SECOND);
    }

    #[test]
    fn parameters_round_trip_without_state() {
        let mut a = Clock::new();
        a.set_start_time(10).set_increment(2).set_time(7).set_per_move_limit(3);
        a.start();

        let mut b = Clock::new();
        b.set_parameters(&a.parameters());
        assert!(!b.is_running());
        assert_eq!(b.start_time(), 10);
        assert_eq!(b.increment(), 2);
        assert_eq!(b.per_move_limit(), 3);
    }
}
