//! State shared by the sketch workers of one stream.
//!
//! Every field lives behind a single [`Mutex`], paired with a [`Condvar`]
//! that is notified on each change the workers may be waiting for: an epoch
//! advancing, a resume, a shutdown, or a worker exiting.
//!
//! The lock is never held while a worker sketches or publishes. Closing an
//! epoch therefore happens in two steps: [`Shared::complete_item`] resets the
//! counter and hands the epoch to the caller, which publishes the terminator
//! and only then calls [`Shared::advance_put_epoch`]. No other worker can
//! publish in the meantime since `current_put_epoch` has not moved.

use crate::{EpochSize, StreamConfig};
use core::time::Duration;
use parking_lot::{Condvar, Mutex};
use rand::{Rng, SeedableRng, rngs::StdRng};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// What a worker should do next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Claim {
    /// Sketch module `id` and publish it within `epoch`.
    Item { epoch: usize, id: usize },
    Paused,
    /// The last epoch has been handed out, or the stream is dying.
    Done,
}

enum Plan {
    Unbounded,
    Bounded { sketch_list: Vec<usize> },
}

struct SyncRecord {
    die: bool,
    pause: bool,
    plan: Plan,
    num_epochs: usize,
    max_id: usize,
    /// Exclusive bound of unbounded draws: the source length when known.
    unbounded_max_id: usize,
    current_pick_epoch: usize,
    current_put_epoch: usize,
    current_sketch: usize,
    done_in_current_epoch: usize,
    alive: usize,
    rng: StdRng,
}

impl SyncRecord {
    fn draw(&mut self, count: usize) -> Vec<usize> {
        let max_id = self.max_id;
        (0..count).map(|_| self.rng.random_range(0..max_id)).collect()
    }
}

pub(crate) struct Shared {
    record: Mutex<SyncRecord>,
    changed: Condvar,
    cancel: CancellationToken,
    poll_interval: Duration,
    pause_interval: Duration,
}

impl Shared {
    /// `max_id` must be positive; it is validated by the caller. Bounded
    /// epochs draw their lists below it. Unbounded draws cover all
    /// `source_len` modules when the source knows its length.
    pub(crate) fn new(config: &StreamConfig, max_id: usize, source_len: Option<usize>) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        let mut record = SyncRecord {
            die: false,
            pause: false,
            plan: Plan::Unbounded,
            num_epochs: config.epochs,
            max_id,
            unbounded_max_id: source_len.filter(|len| *len > 0).unwrap_or(max_id),
            current_pick_epoch: 0,
            current_put_epoch: 0,
            current_sketch: 0,
            done_in_current_epoch: 0,
            alive: 0,
            rng,
        };
        if let EpochSize::Bounded(count) = config.items_per_epoch {
            record.plan = Plan::Bounded {
                sketch_list: record.draw(count),
            };
        }

        Self {
            record: Mutex::new(record),
            changed: Condvar::new(),
            cancel: CancellationToken::new(),
            poll_interval: config.poll_interval,
            pause_interval: config.pause_interval,
        }
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Registers a running worker. The returned guard unregisters it when
    /// dropped, including on unwind.
    pub(crate) fn enter(self: &Arc<Self>) -> Alive {
        self.record.lock().alive += 1;
        Alive(Arc::clone(self))
    }

    /// Draws the next item to sketch.
    pub(crate) fn claim(&self) -> Claim {
        let mut guard = self.record.lock();
        let record = &mut *guard;
        if record.die {
            return Claim::Done;
        }
        if record.pause {
            return Claim::Paused;
        }
        let epoch = record.current_pick_epoch;
        if epoch >= record.num_epochs {
            return Claim::Done;
        }

        let id = match &mut record.plan {
            Plan::Unbounded => record.rng.random_range(0..record.unbounded_max_id),
            Plan::Bounded { sketch_list } => {
                let id = sketch_list[record.current_sketch];
                record.current_sketch += 1;
                if record.current_sketch == sketch_list.len() {
                    let count = sketch_list.len();
                    record.current_sketch = 0;
                    record.current_pick_epoch += 1;
                    let next = record.draw(count);
                    record.plan = Plan::Bounded { sketch_list: next };
                }
                id
            }
        };
        Claim::Item { epoch, id }
    }

    /// Sleeps while the stream is paused. Returns `false` if it is dying.
    pub(crate) fn wait_while_paused(&self) -> bool {
        let mut record = self.record.lock();
        while record.pause && !record.die {
            self.changed.wait_for(&mut record, self.pause_interval);
        }
        !record.die
    }

    /// Blocks until `epoch` is the one being published. Returns `false` if
    /// the stream is dying.
    pub(crate) fn wait_for_turn(&self, epoch: usize) -> bool {
        let mut record = self.record.lock();
        loop {
            if record.die {
                return false;
            }
            if record.current_put_epoch == epoch {
                return true;
            }
            self.changed.wait_for(&mut record, self.poll_interval);
        }
    }

    /// Accounts for one published item. Returns the epoch to terminate when
    /// this item was its last.
    pub(crate) fn complete_item(&self) -> Option<usize> {
        let mut guard = self.record.lock();
        let record = &mut *guard;
        record.done_in_current_epoch += 1;
        match &record.plan {
            Plan::Bounded { sketch_list }
                if record.done_in_current_epoch == sketch_list.len() =>
            {
                record.done_in_current_epoch = 0;
                Some(record.current_put_epoch)
            }
            _ => None,
        }
    }

    /// Opens the next epoch for publishing, once its predecessor's terminator
    /// is out.
    pub(crate) fn advance_put_epoch(&self) {
        let mut record = self.record.lock();
        record.current_put_epoch += 1;
        debug_assert!(record.current_put_epoch <= record.current_pick_epoch);
        drop(record);
        self.changed.notify_all();
    }

    pub(crate) fn set_paused(&self, paused: bool) {
        self.record.lock().pause = paused;
        self.changed.notify_all();
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.record.lock().pause
    }

    /// Tells every worker to exit at its next check, and interrupts the ones
    /// blocked on a full queue.
    pub(crate) fn shutdown(&self) {
        self.record.lock().die = true;
        self.changed.notify_all();
        self.cancel.cancel();
    }

    pub(crate) fn is_dying(&self) -> bool {
        self.record.lock().die
    }

    /// Waits until every registered worker has exited, or `timeout` elapses.
    /// Returns how many are still running.
    pub(crate) fn wait_for_exit(&self, timeout: Duration) -> usize {
        let mut record = self.record.lock();
        self.changed
            .wait_while_for(&mut record, |record| record.alive > 0, timeout);
        record.alive
    }
}

/// Registration of a running worker, see [`Shared::enter`].
pub(crate) struct Alive(Arc<Shared>);

impl Alive {
    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.0
    }
}

impl Drop for Alive {
    fn drop(&mut self) {
        self.0.record.lock().alive -= 1;
        self.0.changed.notify_all();
    }
}
