use super::record::{Alive, Claim, Shared};
use crate::{
    DataSource, Error, ModuleSource, Percentiles, Recycler, Result, Sketch, StreamMessage,
    compute_sketch,
};
use core::pin::pin;
use futures::future::{Either, select};
use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
};
use tokio::sync::mpsc;

/// Everything a worker needs to sketch items, shared by the whole pool.
pub(crate) struct WorkerJob<S> {
    pub(crate) modules: Arc<S>,
    pub(crate) data: Arc<DataSource>,
    pub(crate) percentiles: Percentiles,
    pub(crate) num_examples: Option<usize>,
}

impl<S> Clone for WorkerJob<S> {
    fn clone(&self) -> Self {
        Self {
            modules: Arc::clone(&self.modules),
            data: Arc::clone(&self.data),
            percentiles: self.percentiles.clone(),
            num_examples: self.num_examples,
        }
    }
}

enum Publish {
    Sent,
    Cancelled,
    Closed,
}

/// Body of a sketch worker thread.
///
/// Repeatedly claims an item, sketches it, waits for the item's epoch to be
/// the one being published, and pushes the result into the queue. The worker
/// that publishes the last item of an epoch also publishes its terminator.
///
/// Failures of a single item are reported as [`StreamMessage::Failed`] and
/// still count towards the epoch. The loop exits once every epoch has been
/// handed out, when the stream is stopped, or when the consumer drops the
/// queue.
///
/// This function is meant to be the body of a dedicated OS thread: sketching
/// is CPU bound, and the sends block the thread (racing the pool's
/// cancellation token) rather than yielding to an async runtime.
///
/// # Arguments
///
/// - `worker_id`: Index of this worker in the pool (used for logs/tracing).
/// - `alive`: Registration in the shared record. Dropping it on return, or
///   on unwind, is what confirms the worker's exit to
///   [`WorkerPool::shutdown`](super::WorkerPool::shutdown).
/// - `job`: Module source, default data, percentiles and sample budget,
///   shared with the other workers.
/// - `tx`: Sending end of the stream's queue. When every worker has returned,
///   the consumer sees the queue close.
///
/// # Publishing
///
/// - An item is only pushed once its epoch is `current_put_epoch`, so items
///   of one epoch may interleave but never cross an epoch boundary.
/// - The worker completing the last item of an epoch pushes
///   [`StreamMessage::EndOfEpoch`] before opening the next epoch.
#[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all, fields(worker_id = worker_id)))]
pub(crate) fn worker_loop<S: ModuleSource>(
    worker_id: usize,
    alive: Alive,
    job: WorkerJob<S>,
    tx: mpsc::Sender<StreamMessage>,
) {
    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {worker_id} started");

    let shared = alive.shared();
    let mut recycler = Recycler::new(job.modules.as_ref());

    loop {
        let (epoch, id) = match shared.claim() {
            Claim::Item { epoch, id } => (epoch, id),
            Claim::Paused => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Worker {worker_id} going to sleep");
                if !shared.wait_while_paused() {
                    break;
                }
                #[cfg(feature = "tracing")]
                tracing::debug!("Worker {worker_id} back from sleep");
                continue;
            }
            Claim::Done => break,
        };

        let message = match sketch_item(&mut recycler, &job, id) {
            Ok(sketch) => StreamMessage::Sketch { id, sketch },
            Err(error) => {
                #[cfg(feature = "tracing")]
                tracing::error!("Worker {worker_id} failed to sketch module {id}: {error}");
                if matches!(error, Error::ModulePanicked { .. }) {
                    recycler = Recycler::new(job.modules.as_ref());
                }
                StreamMessage::Failed { id, error }
            }
        };

        if !shared.wait_for_turn(epoch) || !deliver(shared, &tx, message) {
            break;
        }

        if let Some(done) = shared.complete_item() {
            if !deliver(shared, &tx, StreamMessage::EndOfEpoch { epoch: done }) {
                break;
            }
            #[cfg(feature = "tracing")]
            tracing::debug!("Epoch {done} complete");
            shared.advance_put_epoch();
        }
    }

    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {worker_id} stopped");
    drop(alive);
}

fn sketch_item<S: ModuleSource>(
    recycler: &mut Recycler<'_, S>,
    job: &WorkerJob<S>,
    id: usize,
) -> Result<Sketch> {
    catch_unwind(AssertUnwindSafe(|| {
        let module = recycler.fetch(id);
        compute_sketch(module, job.data.open(), &job.percentiles, job.num_examples)
    }))
    .unwrap_or(Err(Error::ModulePanicked { id }))
}

/// Publishes `message`, returning `false` when the worker must exit.
fn deliver(shared: &Shared, tx: &mpsc::Sender<StreamMessage>, message: StreamMessage) -> bool {
    match publish(shared, tx, message) {
        Publish::Sent => true,
        Publish::Cancelled => false,
        Publish::Closed => {
            #[cfg(feature = "tracing")]
            tracing::info!("Sketch queue dropped by its consumer, stopping the stream");
            shared.shutdown();
            false
        }
    }
}

/// Blocks on the bounded queue until the message is accepted, the queue is
/// closed, or the stream is stopped.
fn publish(shared: &Shared, tx: &mpsc::Sender<StreamMessage>, message: StreamMessage) -> Publish {
    if shared.is_dying() {
        return Publish::Cancelled;
    }
    let cancelled = pin!(shared.cancel_token().cancelled());
    let send = pin!(tx.send(message));
    match futures::executor::block_on(select(cancelled, send)) {
        Either::Left(_) => Publish::Cancelled,
        Either::Right((Ok(()), _)) => Publish::Sent,
        Either::Right((Err(_), _)) => Publish::Closed,
    }
}
