//! The per-move timer thread.
//
//  This Source Code Form is subject to the terms of the Mozilla Public
//  License, v. 2.0. If a copy of the MPL was not distributed with this
//  file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
////////////////////////////////////////////////////////////////////////////////////////////////////
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::debug;

enum TimerCmd {
    Arm(Duration),
    Cancel,
}

////////////////////////////////////////////////////////////////////////////////////////////////////
/// A one-shot timer that raises the root thinker's move-now flag when the per-move time budget
/// expires. Infinite time means the timer is simply never armed.
///
/// Re-arming or cancelling always supersedes the previous deadline, so a stale expiry can
/// never cancel the wrong search.
#[derive(Debug)]
pub(crate) struct MoveTimer {
    tx: Sender<TimerCmd>,
}

impl MoveTimer {
    pub fn new(move_now: Arc<AtomicBool>) -> MoveTimer {
        let (tx, rx) = mpsc::channel();

        thread::Builder::new()
            .name("woodpusher timer".into())
            .spawn(move || {
                let mut deadline: Option<Instant> = None;
                loop {
                    let received = match deadline {
                        None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
                        Some(when) => {
                            let now = Instant::now();
                            if when <= now {
                                debug!("move timer expired");
                                move_now.store(true, Ordering::Relaxed);
                                deadline = None;
                                continue;
                            }
                            rx.recv_timeout(when - now)
                        }
                    };
                    match received {
                        Ok(TimerCmd::Arm(duration)) => deadline = Some(Instant::now() + duration),
                        Ok(TimerCmd::Cancel) => deadline = None,
                        Err(RecvTimeoutError::Timeout) => { } // handled at the top of the loop
                        Err(RecvTimeoutError::Disconnected) => return,
                    }
                }
            })
            .expect("failed to spawn timer thread");

        MoveTimer { tx }
    }

    pub fn arm(&self, duration: Duration) {
        let _ = self.tx.send(TimerCmd::Arm(duration));
    }

    pub fn cancel(&self) {
        let _ = self.tx.send(TimerCmd::Cancel);
    }
}
