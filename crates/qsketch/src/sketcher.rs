use crate::{
    DEFAULT_MAX_ID, DataSource, Error, EpochSize, ModuleSource, Percentiles, Projection, Result,
    Sketch, SketchReceiver, StreamConfig, compute_sketch, compute_sketches,
    stream::{Shared, WorkerJob, WorkerPool},
};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Computes sketches on demand and runs sketch streams over a default data
/// source.
///
/// At most one stream is active per sketcher: starting a new one stops the
/// previous one, and dropping the sketcher stops it as well.
///
/// # Example
/// ```
/// use qsketch::{
///     Batch, DataSource, EpochSize, LinearProjections, Percentiles, Sketcher, StreamConfig,
///     StreamMessage, WorkerCount,
/// };
/// use std::sync::Arc;
///
/// let data = Batch::new((0..200).map(|x| x as f32).collect(), 2).unwrap();
/// let percentiles = Percentiles::linspace(11).unwrap();
/// let mut sketcher = Sketcher::new(Some(DataSource::tensor(data)), percentiles, Some(50));
///
/// let modules = Arc::new(LinearProjections::new(2, 1).with_len(10));
/// let config = StreamConfig::new(EpochSize::Bounded(4), 1).with_workers(WorkerCount::Fixed(2));
/// let rx = sketcher.stream(modules, config).unwrap();
///
/// let messages: Vec<StreamMessage> = rx.collect();
/// assert_eq!(messages.len(), 5);
/// assert!(messages[4].is_end_of_epoch());
/// ```
pub struct Sketcher {
    data: Option<Arc<DataSource>>,
    percentiles: Percentiles,
    num_examples: Option<usize>,
    stream: Option<WorkerPool>,
}

impl Sketcher {
    /// `num_examples` caps the samples drawn from the default data for every
    /// sketch; `None` uses the whole source.
    pub fn new(data: Option<DataSource>, percentiles: Percentiles, num_examples: Option<usize>) -> Self {
        Self {
            data: data.map(Arc::new),
            percentiles,
            num_examples,
            stream: None,
        }
    }

    pub fn percentiles(&self) -> &Percentiles {
        &self.percentiles
    }

    pub fn num_examples(&self) -> Option<usize> {
        self.num_examples
    }

    /// Sketches one module against the default data.
    ///
    /// # Errors
    ///
    /// [`Error::NoDefaultData`] without default data, otherwise see
    /// [`compute_sketch`].
    pub fn sketch<P: Projection + ?Sized>(&self, module: &mut P) -> Result<Sketch> {
        let data = self.data.as_ref().ok_or(Error::NoDefaultData)?;
        compute_sketch(module, data.open(), &self.percentiles, self.num_examples)
    }

    /// Sketches `modules` in order, all reading from one pass over the data.
    ///
    /// When `data` is given, the whole of it is used; otherwise the default
    /// data and sample budget apply. `percentiles` overrides the sketcher's
    /// levels.
    ///
    /// # Errors
    ///
    /// [`Error::NoDefaultData`] when neither `data` nor default data exist,
    /// otherwise see [`compute_sketch`].
    pub fn sketch_with<P: Projection>(
        &self,
        modules: &mut [P],
        data: Option<&DataSource>,
        percentiles: Option<&Percentiles>,
    ) -> Result<Vec<Sketch>> {
        let percentiles = percentiles.unwrap_or(&self.percentiles);
        match data {
            Some(data) => compute_sketches(modules, data.open(), percentiles, None),
            None => {
                let data = self.data.as_ref().ok_or(Error::NoDefaultData)?;
                compute_sketches(modules, data.open(), percentiles, self.num_examples)
            }
        }
    }

    /// Starts streaming sketches of modules drawn from `modules`, stopping
    /// any stream already running.
    ///
    /// # Errors
    ///
    /// - [`Error::NoDefaultData`] without default data.
    /// - [`Error::InvalidStream`] for zero workers, zero epochs, zero items
    ///   per epoch, or a `max_id` of zero or beyond the length of `modules`.
    /// - [`Error::WorkerSpawn`] if a worker thread cannot be started.
    pub fn stream<S>(&mut self, modules: Arc<S>, config: StreamConfig) -> Result<SketchReceiver>
    where
        S: ModuleSource + 'static,
    {
        if let Err(_e) = self.stop() {
            #[cfg(feature = "tracing")]
            tracing::warn!("Previous stream did not stop cleanly: {_e}");
        }

        let data = self.data.clone().ok_or(Error::NoDefaultData)?;
        let num_workers = config.workers.resolve();
        if num_workers == 0 {
            return Err(Error::invalid_stream("at least one worker is required"));
        }
        if config.items_per_epoch == EpochSize::Bounded(0) {
            return Err(Error::invalid_stream("an epoch needs at least one sketch"));
        }
        if config.epochs == 0 {
            return Err(Error::invalid_stream("at least one epoch is required"));
        }
        let max_id = resolve_max_id(config.max_id, modules.len())?;

        let shared = Arc::new(Shared::new(&config, max_id, modules.len()));
        let (tx, rx) = mpsc::channel(2 * num_workers);
        let job = WorkerJob {
            modules,
            data,
            percentiles: self.percentiles.clone(),
            num_examples: self.num_examples,
        };

        #[cfg(feature = "tracing")]
        tracing::info!(
            "Sketch stream using {num_workers} workers ({:?} per epoch, {} epochs, ids below {max_id})",
            config.items_per_epoch,
            config.epochs
        );
        self.stream = Some(WorkerPool::spawn(
            num_workers,
            shared,
            &job,
            &tx,
            config.shutdown_timeout,
        )?);
        Ok(SketchReceiver::new(rx))
    }

    /// Parks the stream's workers once their current item is published.
    pub fn pause(&self) {
        if let Some(pool) = &self.stream {
            #[cfg(feature = "tracing")]
            tracing::debug!("Pausing sketch stream");
            pool.shared().set_paused(true);
        }
    }

    pub fn resume(&self) {
        if let Some(pool) = &self.stream {
            #[cfg(feature = "tracing")]
            tracing::debug!("Resuming sketch stream");
            pool.shared().set_paused(false);
        }
    }

    pub fn is_paused(&self) -> bool {
        self.stream
            .as_ref()
            .is_some_and(|pool| pool.shared().is_paused())
    }

    /// Whether a stream has been started and still has running workers.
    pub fn is_streaming(&self) -> bool {
        self.stream
            .as_ref()
            .is_some_and(|pool| !pool.shared().is_dying() && pool.running() > 0)
    }

    /// Stops the stream and waits for its workers to exit. Messages already
    /// queued remain readable; the queue then closes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShutdownTimeout`] if some workers did not exit within
    /// the configured timeout.
    pub fn stop(&mut self) -> Result<()> {
        match self.stream.take() {
            Some(mut pool) => pool.shutdown(),
            None => Ok(()),
        }
    }
}

impl Drop for Sketcher {
    fn drop(&mut self) {
        if let Err(_e) = self.stop() {
            #[cfg(feature = "tracing")]
            tracing::warn!("Sketcher dropped with a running stream: {_e}");
        }
    }
}

fn resolve_max_id(requested: Option<usize>, len: Option<usize>) -> Result<usize> {
    let max_id = requested.or(len).unwrap_or(DEFAULT_MAX_ID);
    if max_id == 0 {
        return Err(Error::invalid_stream("no module id to draw from"));
    }
    if let Some(len) = len.filter(|len| max_id > *len) {
        return Err(Error::invalid_stream(format!(
            "max_id {max_id} is beyond the {len} available modules"
        )));
    }
    Ok(max_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Batch, LinearProjections, Samples};

    fn sketcher(num_examples: Option<usize>) -> Sketcher {
        let data = Batch::new((0..100).map(|x| x as f32).collect(), 1).unwrap();
        let percentiles = Percentiles::new(vec![0.0, 100.0]).unwrap();
        Sketcher::new(Some(DataSource::tensor(data)), percentiles, num_examples)
    }

    #[test]
    fn max_id_resolution() {
        assert_eq!(resolve_max_id(None, None), Ok(DEFAULT_MAX_ID));
        assert_eq!(resolve_max_id(None, Some(12)), Ok(12));
        assert_eq!(resolve_max_id(Some(5), Some(12)), Ok(5));
        assert_eq!(resolve_max_id(Some(500), None), Ok(500));
        assert!(resolve_max_id(Some(13), Some(12)).is_err());
        assert!(resolve_max_id(Some(0), None).is_err());
        assert!(resolve_max_id(None, Some(0)).is_err());
    }

    #[test]
    fn on_demand_uses_the_budget() {
        let sketcher = sketcher(Some(10));
        let mut identity = |s: Samples<'_>| s.as_slice().to_vec();
        let sketch = sketcher.sketch(&mut identity).unwrap();
        assert_eq!(sketch.num_samples(), 10);
        assert_eq!(sketch.as_slice(), &[0.0, 9.0]);
    }

    #[test]
    fn budget_beyond_the_data_is_not_fatal() {
        let data = Batch::new(vec![2.0, 0.0, 1.0], 1).unwrap();
        let percentiles = Percentiles::new(vec![0.0, 100.0]).unwrap();
        let sketcher = Sketcher::new(Some(DataSource::tensor(data)), percentiles, Some(usize::MAX / 2));
        let mut identity = |s: Samples<'_>| s.as_slice().to_vec();
        let sketch = sketcher.sketch(&mut identity).unwrap();
        assert_eq!(sketch.num_samples(), 3);
        assert_eq!(sketch.as_slice(), &[0.0, 2.0]);
    }

    #[test]
    fn rejects_zero_epochs() {
        let mut sketcher = sketcher(None);
        let modules = Arc::new(LinearProjections::new(1, 1).with_len(4));
        let config = StreamConfig::new(EpochSize::Unbounded, 0);
        assert!(matches!(
            sketcher.stream(modules, config),
            Err(Error::InvalidStream { .. })
        ));
        assert!(!sketcher.is_streaming());
    }

    #[test]
    fn supplied_data_is_used_whole() {
        let sketcher = sketcher(Some(10));
        let other = DataSource::tensor(Batch::new(vec![5.0, -5.0, 1.0], 1).unwrap());
        let mut modules = [|s: Samples<'_>| s.as_slice().to_vec()];
        let sketches = sketcher
            .sketch_with(&mut modules, Some(&other), None)
            .unwrap();
        assert_eq!(sketches[0].num_samples(), 3);
        assert_eq!(sketches[0].as_slice(), &[-5.0, 5.0]);
    }

    #[test]
    fn percentiles_can_be_overridden() {
        let sketcher = sketcher(None);
        let median = Percentiles::new(vec![50.0]).unwrap();
        let mut modules = [|s: Samples<'_>| s.as_slice().to_vec()];
        let sketches = sketcher.sketch_with(&mut modules, None, Some(&median)).unwrap();
        assert_eq!(sketches[0].as_slice(), &[49.5]);
    }

    #[test]
    fn no_default_data() {
        let mut sketcher = Sketcher::new(None, Percentiles::linspace(3).unwrap(), None);
        let mut identity = |s: Samples<'_>| s.as_slice().to_vec();
        assert_eq!(sketcher.sketch(&mut identity), Err(Error::NoDefaultData));

        let modules = Arc::new(LinearProjections::new(1, 1));
        let result = sketcher.stream(modules, StreamConfig::default());
        assert!(matches!(result, Err(Error::NoDefaultData)));
        assert!(!sketcher.is_streaming());
    }

    #[test]
    fn controls_without_stream_are_noops() {
        let mut sketcher = sketcher(None);
        sketcher.pause();
        assert!(!sketcher.is_paused());
        sketcher.resume();
        assert_eq!(sketcher.stop(), Ok(()));
    }
}
