//! Data sources feeding the sketch computation.
//!
//! The set of supported source kinds is closed: a [`DataSource`] is either a
//! single in-memory batch, a random-access [`Dataset`] collated into batches,
//! a shared channel of batches terminated by a `None` sentinel, or a shared
//! one-shot iterator. Each kind is opened with [`DataSource::open`], which
//! yields a [`Batches`] iterator.
//!
//! Re-iterable kinds (`Tensor`, `Dataset`) restart from the beginning on each
//! `open`. Shared kinds (`Stream`, `Iter`) are consumed once across all
//! readers, which is how several sketch workers split one stream of data
//! between them.

use crate::{Batch, Error, Result};
use core::fmt;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Number of samples per batch when collating a [`Dataset`].
pub const DEFAULT_BATCH_SIZE: usize = 5000;

/// A single sample of a [`Dataset`].
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    pub features: Vec<f32>,
    pub label: Option<i64>,
}

/// Random-access collection of samples.
pub trait Dataset: Send + Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns sample `index`, with `index < self.len()`.
    fn get(&self, index: usize) -> Sample;
}

type FeatureMap = Box<dyn Fn(Vec<f32>) -> Vec<f32> + Send + Sync>;
type LabelMap = Box<dyn Fn(Option<i64>) -> Option<i64> + Send + Sync>;

/// A [`Dataset`] whose samples are those of another one, with features and
/// labels mapped on access.
///
/// # Example
/// ```
/// use qsketch::{Dataset, Sample, TransformedDataset};
///
/// struct Constant;
///
/// impl Dataset for Constant {
///     fn len(&self) -> usize {
///         2
///     }
///
///     fn get(&self, _index: usize) -> Sample {
///         Sample { features: vec![1.0, 2.0], label: Some(3) }
///     }
/// }
///
/// let doubled = TransformedDataset::new(Constant)
///     .with_transform(|x| x.into_iter().map(|v| 2.0 * v).collect())
///     .with_target_transform(|label| label.map(|l| l + 1));
/// assert_eq!(doubled.get(1), Sample { features: vec![2.0, 4.0], label: Some(4) });
/// ```
pub struct TransformedDataset<D> {
    dataset: D,
    transform: Option<FeatureMap>,
    target_transform: Option<LabelMap>,
}

impl<D: Dataset> TransformedDataset<D> {
    pub fn new(dataset: D) -> Self {
        Self {
            dataset,
            transform: None,
            target_transform: None,
        }
    }

    /// Maps the features of every sample. Mapped samples must all keep one
    /// width for the dataset to collate.
    #[must_use]
    pub fn with_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(Vec<f32>) -> Vec<f32> + Send + Sync + 'static,
    {
        self.transform = Some(Box::new(transform));
        self
    }

    #[must_use]
    pub fn with_target_transform<F>(mut self, target_transform: F) -> Self
    where
        F: Fn(Option<i64>) -> Option<i64> + Send + Sync + 'static,
    {
        self.target_transform = Some(Box::new(target_transform));
        self
    }

    pub fn inner(&self) -> &D {
        &self.dataset
    }
}

impl<D: Dataset> Dataset for TransformedDataset<D> {
    fn len(&self) -> usize {
        self.dataset.len()
    }

    fn get(&self, index: usize) -> Sample {
        let Sample { features, label } = self.dataset.get(index);
        Sample {
            features: match &self.transform {
                Some(transform) => transform(features),
                None => features,
            },
            label: match &self.target_transform {
                Some(target_transform) => target_transform(label),
                None => label,
            },
        }
    }
}

/// Sender half of a [`DataSource::Stream`]. Send `None` to end the stream.
pub type BatchSender = mpsc::Sender<Option<Batch>>;

/// Shared receiving end of a sentinel-terminated stream of batches.
pub struct BatchStream {
    state: Mutex<StreamState>,
}

struct StreamState {
    rx: mpsc::Receiver<Option<Batch>>,
    ended: bool,
}

impl BatchStream {
    fn next_batch(&self) -> Option<Batch> {
        let mut state = self.state.lock();
        if state.ended {
            return None;
        }
        // `None` is the sentinel; a closed channel ends the stream as well.
        match state.rx.blocking_recv().flatten() {
            Some(batch) => Some(batch),
            None => {
                state.ended = true;
                None
            }
        }
    }
}

type SharedIter = Mutex<Box<dyn Iterator<Item = Batch> + Send>>;

/// Where sketches take their samples from.
pub enum DataSource {
    /// One in-memory batch, yielded once per [`DataSource::open`].
    Tensor(Batch),
    /// Samples collated sequentially into batches of `batch_size`.
    Dataset {
        dataset: Arc<dyn Dataset>,
        batch_size: usize,
    },
    /// Batches pulled from a shared channel until the `None` sentinel.
    Stream(BatchStream),
    /// A shared one-shot iterator of batches.
    Iter(SharedIter),
}

impl DataSource {
    pub fn tensor(batch: Batch) -> Self {
        Self::Tensor(batch)
    }

    /// Collates `dataset` into batches of [`DEFAULT_BATCH_SIZE`].
    pub fn dataset(dataset: Arc<dyn Dataset>) -> Self {
        Self::Dataset {
            dataset,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Creates a bounded channel source and the sender feeding it.
    ///
    /// Producers send `Some(batch)` for data and `None` once exhausted.
    /// Readers block while the channel is empty, so the channel must not be
    /// read from inside an async runtime.
    pub fn channel(capacity: usize) -> (BatchSender, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let stream = BatchStream {
            state: Mutex::new(StreamState { rx, ended: false }),
        };
        (tx, Self::Stream(stream))
    }

    pub fn from_batches<I>(batches: I) -> Self
    where
        I: IntoIterator<Item = Batch>,
        I::IntoIter: Send + 'static,
    {
        Self::Iter(Mutex::new(Box::new(batches.into_iter())))
    }

    /// Number of samples a full pass yields, when known in advance.
    pub fn len_hint(&self) -> Option<usize> {
        match self {
            Self::Tensor(batch) => Some(batch.len()),
            Self::Dataset { dataset, .. } => Some(dataset.len()),
            Self::Stream(_) | Self::Iter(_) => None,
        }
    }

    /// Starts reading from the source.
    pub fn open(&self) -> Batches<'_> {
        let inner = match self {
            Self::Tensor(batch) => Inner::Once(Some(batch)),
            Self::Dataset {
                dataset,
                batch_size,
            } => Inner::Loader {
                dataset: dataset.as_ref(),
                batch_size: *batch_size,
                pos: 0,
            },
            Self::Stream(stream) => Inner::Stream(stream),
            Self::Iter(iter) => Inner::Iter(iter),
        };
        Batches { inner }
    }
}

impl fmt::Debug for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tensor(batch) => f
                .debug_struct("Tensor")
                .field("len", &batch.len())
                .field("width", &batch.width())
                .finish(),
            Self::Dataset {
                dataset,
                batch_size,
            } => f
                .debug_struct("Dataset")
                .field("len", &dataset.len())
                .field("batch_size", batch_size)
                .finish(),
            Self::Stream(_) => f.write_str("Stream"),
            Self::Iter(_) => f.write_str("Iter"),
        }
    }
}

/// Iterator over the batches of an opened [`DataSource`].
pub struct Batches<'a> {
    inner: Inner<'a>,
}

enum Inner<'a> {
    Once(Option<&'a Batch>),
    Loader {
        dataset: &'a dyn Dataset,
        batch_size: usize,
        pos: usize,
    },
    Stream(&'a BatchStream),
    Iter(&'a SharedIter),
}

impl Iterator for Batches<'_> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.inner {
            Inner::Once(batch) => batch.take().cloned().map(Ok),
            Inner::Loader {
                dataset,
                batch_size,
                pos,
            } => {
                if *batch_size == 0 {
                    return Some(Err(Error::unsupported("dataset batch size must be positive")));
                }
                let end = dataset.len().min(*pos + *batch_size);
                if *pos >= end {
                    return None;
                }
                let batch = collate(*dataset, *pos..end);
                *pos = end;
                Some(batch)
            }
            Inner::Stream(stream) => stream.next_batch().map(Ok),
            Inner::Iter(iter) => iter.lock().next().map(Ok),
        }
    }
}

fn collate(dataset: &dyn Dataset, range: core::ops::Range<usize>) -> Result<Batch> {
    let mut data = Vec::new();
    let mut labels = Vec::with_capacity(range.len());
    let mut width = None;
    for index in range {
        let sample = dataset.get(index);
        match width {
            None => {
                width = Some(sample.features.len());
                data.reserve(sample.features.len() * labels.capacity());
            }
            Some(w) if w != sample.features.len() => {
                return Err(Error::unsupported(format!(
                    "sample {index} has {} features, expected {w}",
                    sample.features.len()
                )));
            }
            Some(_) => {}
        }
        data.extend_from_slice(&sample.features);
        labels.push(sample.label);
    }
    let batch = Batch::new(data, width.unwrap_or_default())?;
    // Labels are kept only when every sample carries one.
    match labels.into_iter().collect::<Option<Vec<_>>>() {
        Some(labels) => batch.with_labels(labels),
        None => Ok(batch),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Ramp {
        len: usize,
    }

    impl Dataset for Ramp {
        fn len(&self) -> usize {
            self.len
        }

        fn get(&self, index: usize) -> Sample {
            Sample {
                features: vec![index as f32, -(index as f32)],
                label: Some(index as i64 % 2),
            }
        }
    }

    #[test]
    fn dataset_is_collated_and_reiterable() {
        let source = DataSource::Dataset {
            dataset: Arc::new(Ramp { len: 7 }),
            batch_size: 3,
        };
        assert_eq!(source.len_hint(), Some(7));

        for _ in 0..2 {
            let sizes: Vec<usize> = source.open().map(|b| b.unwrap().len()).collect();
            assert_eq!(sizes, vec![3, 3, 1]);
        }

        let first = source.open().next().unwrap().unwrap();
        assert_eq!(first.width(), 2);
        assert_eq!(first.samples().row(2), &[2.0, -2.0]);
        assert_eq!(first.labels(), Some(&[0, 1, 0][..]));
    }

    #[test]
    fn transformed_dataset_collates_mapped_samples() {
        let projected = TransformedDataset::new(Ramp { len: 4 })
            .with_transform(|x| vec![x[0] + x[1], x[0]])
            .with_target_transform(|_| None);
        assert_eq!(projected.inner().len(), 4);

        let source = DataSource::Dataset {
            dataset: Arc::new(projected),
            batch_size: 4,
        };
        let batch = source.open().next().unwrap().unwrap();
        assert_eq!(batch.width(), 2);
        assert_eq!(batch.samples().row(3), &[0.0, 3.0]);
        assert_eq!(batch.labels(), None);

        let ragged = TransformedDataset::new(Ramp { len: 3 })
            .with_transform(|x| if x[0] == 1.0 { x } else { vec![x[0]] });
        let source = DataSource::dataset(Arc::new(ragged));
        assert!(matches!(
            source.open().next(),
            Some(Err(Error::UnsupportedSource { .. }))
        ));
    }

    #[test]
    fn zero_batch_size_is_unsupported() {
        let source = DataSource::Dataset {
            dataset: Arc::new(Ramp { len: 3 }),
            batch_size: 0,
        };
        assert!(matches!(
            source.open().next(),
            Some(Err(Error::UnsupportedSource { .. }))
        ));
    }

    #[test]
    fn tensor_is_yielded_once_per_open() {
        let source = DataSource::tensor(Batch::new(vec![1.0, 2.0, 3.0], 1).unwrap());
        assert_eq!(source.open().count(), 1);
        assert_eq!(source.open().count(), 1);
    }

    #[test]
    fn stream_ends_at_sentinel_for_every_reader() {
        let (tx, source) = DataSource::channel(4);
        tx.blocking_send(Some(Batch::new(vec![1.0], 1).unwrap()))
            .unwrap();
        tx.blocking_send(Some(Batch::new(vec![2.0], 1).unwrap()))
            .unwrap();
        tx.blocking_send(None).unwrap();

        let mut first = source.open();
        assert!(first.next().is_some());
        let mut second = source.open();
        assert!(second.next().is_some());
        assert!(first.next().is_none());
        // The sentinel was consumed once but ends the stream for all readers.
        assert!(second.next().is_none());
        drop(tx);
    }

    #[test]
    fn shared_iterator_is_consumed_once() {
        let batches = (0..3).map(|i| Batch::new(vec![i as f32], 1).unwrap());
        let source = DataSource::from_batches(batches);
        assert_eq!(source.open().take(2).count(), 2);
        assert_eq!(source.open().count(), 1);
        assert_eq!(source.open().count(), 0);
    }
}
