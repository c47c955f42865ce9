//! Error types for sketch computation and sketch streaming.
//!
//! A single [`Error`] enum covers both the synchronous sketching routines and
//! the worker pool. Item-level failures inside a running stream are not
//! returned to the caller of [`Sketcher::stream`]; they travel through the
//! queue as [`StreamMessage::Failed`] instead, so that an epoch can still be
//! closed.
//!
//! ## Error Cases
//! - `EmptySource`: no sample was obtained from the data source.
//! - `NoDefaultData`: on-demand sketching without any data to sketch.
//! - `UnsupportedSource`: the data does not fit the capability of its source
//!   kind (ragged tensors, inconsistent sample widths, ...).
//! - `InvalidPercentiles`, `ProjectionShape`, `InvalidStream`: malformed
//!   inputs or configuration.
//! - `WorkerSpawn`, `ModulePanicked`, `ShutdownTimeout`: worker pool
//!   lifecycle failures.
//!
//! [`Sketcher::stream`]: crate::Sketcher::stream
//! [`StreamMessage::Failed`]: crate::StreamMessage::Failed

/// A result type defaulting to this crate's [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All errors that `qsketch` can produce.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The data source did not produce a single sample, so no quantile can be
    /// computed.
    #[error("Did not get any data from the data source, cannot sketch")]
    EmptySource,

    /// On-demand sketching was requested without data, and the sketcher was
    /// built without a default source.
    #[error("Sketcher has no default data")]
    NoDefaultData,

    /// The data handed to a source does not match the capability of its
    /// kind.
    #[error("Unsupported data source: {reason}")]
    UnsupportedSource { reason: String },

    /// Percentile levels must be finite, within `[0, 100]` and sorted.
    #[error("Invalid percentiles: {reason}")]
    InvalidPercentiles { reason: String },

    /// A projection returned an output that cannot be viewed as one row per
    /// input sample, or whose width changed between batches.
    #[error("Projection returned {len} values for {samples} samples (expected width {expected:?})")]
    ProjectionShape {
        len: usize,
        samples: usize,
        expected: Option<usize>,
    },

    /// The stream configuration was rejected before any worker started.
    #[error("Invalid stream configuration: {reason}")]
    InvalidStream { reason: String },

    /// The operating system refused to start a worker thread.
    #[error("Failed to spawn sketch worker {worker_id}: {reason}")]
    WorkerSpawn { worker_id: usize, reason: String },

    /// The module for item `id` panicked while being built or applied.
    #[error("Module {id} panicked while sketching")]
    ModulePanicked { id: usize },

    /// Some workers did not confirm their exit within the shutdown timeout.
    #[error("{remaining} sketch worker(s) did not shut down in time")]
    ShutdownTimeout { remaining: usize },
}

impl Error {
    pub(crate) fn unsupported(reason: impl Into<String>) -> Self {
        Self::UnsupportedSource {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_stream(reason: impl Into<String>) -> Self {
        Self::InvalidStream {
            reason: reason.into(),
        }
    }
}
