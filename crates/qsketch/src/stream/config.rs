use crate::{Error, Result};
use core::time::Duration;

/// Number of sketches produced per epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EpochSize {
    /// A fixed list of ids is drawn (with replacement) at the start of every
    /// epoch, and the epoch closes once all of them are published.
    Bounded(usize),
    /// Ids are drawn independently forever; epochs never close.
    Unbounded,
}

impl EpochSize {
    /// Interprets a signed count, negative meaning unbounded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStream`] for a count of zero.
    pub fn from_count(count: i64) -> Result<Self> {
        match usize::try_from(count) {
            Err(_) => Ok(Self::Unbounded),
            Ok(0) => Err(Error::invalid_stream("an epoch needs at least one sketch")),
            Ok(n) => Ok(Self::Bounded(n)),
        }
    }
}

/// Size of the worker pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerCount {
    /// Half of the remaining cores, and at least one worker.
    Auto,
    Fixed(usize),
}

impl WorkerCount {
    /// Interprets a signed count, negative meaning [`WorkerCount::Auto`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStream`] for a count of zero.
    pub fn from_count(count: i64) -> Result<Self> {
        match usize::try_from(count) {
            Err(_) => Ok(Self::Auto),
            Ok(0) => Err(Error::invalid_stream("at least one worker is required")),
            Ok(n) => Ok(Self::Fixed(n)),
        }
    }

    /// Resolves the count against the parallelism available on this host.
    pub fn resolve(self) -> usize {
        match self {
            Self::Auto => (num_cpus::get().saturating_sub(1) / 2).max(1),
            Self::Fixed(n) => n,
        }
    }
}

/// Parameters of a sketch stream.
///
/// # Example
/// ```
/// use qsketch::{EpochSize, StreamConfig, WorkerCount};
///
/// let config = StreamConfig::new(EpochSize::Bounded(100), 10)
///     .with_workers(WorkerCount::Fixed(4))
///     .with_seed(7);
/// assert_eq!(config.epochs, 10);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamConfig {
    pub items_per_epoch: EpochSize,
    pub epochs: usize,
    pub workers: WorkerCount,
    /// Exclusive bound of the drawn ids. Defaults to the length of the
    /// module source, or [`DEFAULT_MAX_ID`] when it has none.
    ///
    /// Only bounded epochs honor it when the source knows its length:
    /// unbounded streams then draw from every module of the source.
    ///
    /// [`DEFAULT_MAX_ID`]: crate::DEFAULT_MAX_ID
    pub max_id: Option<usize>,
    /// Seed of the id draws. Random when unset.
    pub seed: Option<u64>,
    /// Upper bound between two checks while waiting for an epoch's turn.
    pub poll_interval: Duration,
    /// Upper bound between two checks while paused.
    pub pause_interval: Duration,
    /// How long [`Sketcher::stop`] waits for the workers to exit.
    ///
    /// [`Sketcher::stop`]: crate::Sketcher::stop
    pub shutdown_timeout: Duration,
}

impl StreamConfig {
    pub fn new(items_per_epoch: EpochSize, epochs: usize) -> Self {
        Self {
            items_per_epoch,
            epochs,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_workers(mut self, workers: WorkerCount) -> Self {
        self.workers = workers;
        self
    }

    #[must_use]
    pub fn with_max_id(mut self, max_id: usize) -> Self {
        self.max_id = Some(max_id);
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub fn with_pause_interval(mut self, interval: Duration) -> Self {
        self.pause_interval = interval;
        self
    }

    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            items_per_epoch: EpochSize::Unbounded,
            epochs: 1,
            workers: WorkerCount::Auto,
            max_id: None,
            seed: None,
            poll_interval: Duration::from_secs(1),
            pause_interval: Duration::from_secs(2),
            shutdown_timeout: Duration::from_secs(3),
        }
    }
}
