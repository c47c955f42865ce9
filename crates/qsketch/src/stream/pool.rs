//! Thread pool running the sketch workers of one stream.
//!
//! The pool owns the join handles and the [`Shared`] record. The queue's
//! sender is cloned into each worker and not kept here, so the consumer sees
//! the queue close as soon as the last worker returns.
//!
//! Shutdown is cooperative. The pool raises the record's `die` flag and
//! cancels the token the workers race their sends against, then waits, for at
//! most the configured timeout, until every worker has dropped its
//! registration. Only confirmed workers are joined, so a module stuck in a
//! long computation cannot hang the caller of [`WorkerPool::shutdown`].

use super::{
    record::Shared,
    worker::{WorkerJob, worker_loop},
};
use crate::{Error, ModuleSource, Result, StreamMessage};
use core::time::Duration;
use std::{
    sync::Arc,
    thread::{self, JoinHandle},
};
use tokio::sync::mpsc;

/// The running workers of one stream and the record they share.
///
/// Dropping the pool shuts it down.
pub(crate) struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    shared: Arc<Shared>,
    shutdown_timeout: Duration,
    stopped: bool,
}

impl WorkerPool {
    /// Starts `num_workers` threads named `qsketch-worker-{i}`.
    ///
    /// # Arguments
    ///
    /// - `num_workers`: Number of threads to start, at least one.
    /// - `shared`: Fresh record of the stream; each worker registers in it
    ///   before its thread starts.
    /// - `job`: Work description cloned into every worker.
    /// - `tx`: Queue sender cloned into every worker. The caller drops its
    ///   own copy.
    /// - `shutdown_timeout`: How long [`WorkerPool::shutdown`] waits for the
    ///   workers to confirm their exit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WorkerSpawn`] if a thread cannot be created; the
    /// workers already started are shut down first.
    pub(crate) fn spawn<S>(
        num_workers: usize,
        shared: Arc<Shared>,
        job: &WorkerJob<S>,
        tx: &mpsc::Sender<StreamMessage>,
        shutdown_timeout: Duration,
    ) -> Result<Self>
    where
        S: ModuleSource + 'static,
    {
        let mut pool = Self {
            handles: Vec::with_capacity(num_workers),
            shared,
            shutdown_timeout,
            stopped: false,
        };

        for worker_id in 0..num_workers {
            let alive = pool.shared.enter();
            let job = job.clone();
            let tx = tx.clone();
            let spawned = thread::Builder::new()
                .name(format!("qsketch-worker-{worker_id}"))
                .spawn(move || worker_loop(worker_id, alive, job, tx));

            match spawned {
                Ok(handle) => pool.handles.push(handle),
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    tracing::error!("Failed to spawn worker {worker_id}: {e}");
                    // Best effort: the spawn failure is what the caller needs.
                    let _ = pool.shutdown();
                    return Err(Error::WorkerSpawn {
                        worker_id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!("Spawned {num_workers} sketch workers");
        Ok(pool)
    }

    pub(crate) fn shared(&self) -> &Shared {
        &self.shared
    }

    /// Number of workers still running.
    pub(crate) fn running(&self) -> usize {
        self.handles.iter().filter(|h| !h.is_finished()).count()
    }

    /// Signals every worker to exit and waits up to the shutdown timeout for
    /// all of them to confirm.
    ///
    /// Workers that confirmed are joined. The others are left detached; they
    /// exit at their next check of the record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShutdownTimeout`] with the number of unconfirmed
    /// workers.
    pub(crate) fn shutdown(&mut self) -> Result<()> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;

        #[cfg(feature = "tracing")]
        tracing::debug!("Stopping {} sketch workers", self.handles.len());
        self.shared.shutdown();

        let remaining = self.shared.wait_for_exit(self.shutdown_timeout);
        let handles = core::mem::take(&mut self.handles);
        if remaining > 0 {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                "{remaining} sketch worker(s) still running after {:?}",
                self.shutdown_timeout
            );
            return Err(Error::ShutdownTimeout { remaining });
        }

        for handle in handles {
            if handle.join().is_err() {
                #[cfg(feature = "tracing")]
                tracing::error!("A sketch worker panicked outside of a module");
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!("Sketch workers stopped");
        Ok(())
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if let Err(_e) = self.shutdown() {
            #[cfg(feature = "tracing")]
            tracing::warn!("Dropping sketch stream: {_e}");
        }
    }
}
