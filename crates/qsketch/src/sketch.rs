//! Empirical quantile sketches of projected data.
//!
//! A [`Sketch`] holds, for each output dimension of a [`Projection`], the
//! quantile function of that dimension evaluated at a set of
//! [`Percentiles`]. It is computed by [`compute_sketch`], which pulls batches
//! from a data source until a sample budget is met or the source runs dry.

use crate::{Batch, Error, Percentiles, Projection, Result};

/// Quantiles of the projected samples, one row per percentile level and one
/// column per output dimension of the projection.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Sketch {
    quantiles: Vec<f32>,
    percentiles: Percentiles,
    width: usize,
    num_samples: usize,
}

impl Sketch {
    /// Number of percentile levels, i.e. rows.
    pub fn len(&self) -> usize {
        self.percentiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quantiles.is_empty()
    }

    /// Number of projected output dimensions, i.e. columns.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of samples the quantiles were computed from.
    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    pub fn percentiles(&self) -> &Percentiles {
        &self.percentiles
    }

    /// Row-major `len() x width()` quantile matrix.
    pub fn as_slice(&self) -> &[f32] {
        &self.quantiles
    }

    /// Quantiles of every output dimension at percentile level `level`.
    pub fn row(&self, level: usize) -> &[f32] {
        &self.quantiles[level * self.width..(level + 1) * self.width]
    }

    /// Quantile function of output dimension `dim`, one value per level.
    pub fn column(&self, dim: usize) -> impl Iterator<Item = f32> + '_ {
        self.quantiles
            .chunks_exact(self.width)
            .map(move |row| row[dim])
    }
}

/// Sketches one projection with the batches of `batches`.
///
/// At most `num_examples` samples are used when a budget is given; a source
/// that runs out first only triggers a warning and the sketch is computed
/// from the samples obtained.
///
/// # Errors
///
/// - [`Error::EmptySource`] if not a single sample was obtained.
/// - [`Error::ProjectionShape`] if the projection output cannot be viewed as
///   one row per sample of constant width.
/// - Any error yielded by the batch source.
///
/// # Example
/// ```
/// use qsketch::{Batch, DataSource, Percentiles, Samples, compute_sketch};
///
/// let data = DataSource::tensor(Batch::new((0..101).map(|x| x as f32).collect(), 1).unwrap());
/// let percentiles = Percentiles::new(vec![0.0, 50.0, 100.0]).unwrap();
/// let mut identity = |s: Samples<'_>| s.as_slice().to_vec();
///
/// let sketch = compute_sketch(&mut identity, data.open(), &percentiles, None).unwrap();
/// assert_eq!(sketch.as_slice(), &[0.0, 50.0, 100.0]);
/// ```
pub fn compute_sketch<P, I>(
    module: &mut P,
    batches: I,
    percentiles: &Percentiles,
    num_examples: Option<usize>,
) -> Result<Sketch>
where
    P: Projection + ?Sized,
    I: IntoIterator<Item = Result<Batch>>,
{
    let mut batches = batches.into_iter();
    sketch_from(module, &mut batches, percentiles, num_examples)
}

/// Sketches several projections, in order, from the same batch iterator.
///
/// Each projection resumes reading where the previous one stopped, so with a
/// shared or streamed source every module sees different samples.
///
/// # Errors
///
/// Stops at the first failing module; see [`compute_sketch`].
pub fn compute_sketches<P, I>(
    modules: &mut [P],
    batches: I,
    percentiles: &Percentiles,
    num_examples: Option<usize>,
) -> Result<Vec<Sketch>>
where
    P: Projection,
    I: IntoIterator<Item = Result<Batch>>,
{
    let mut batches = batches.into_iter();
    modules
        .iter_mut()
        .map(|module| sketch_from(module, &mut batches, percentiles, num_examples))
        .collect()
}

fn sketch_from<P, I>(
    module: &mut P,
    batches: &mut I,
    percentiles: &Percentiles,
    num_examples: Option<usize>,
) -> Result<Sketch>
where
    P: Projection + ?Sized,
    I: Iterator<Item = Result<Batch>>,
{
    let mut processed: Vec<f32> = Vec::new();
    let mut width: Option<usize> = None;
    let mut pos = 0;

    while num_examples.is_none_or(|limit| pos < limit) {
        let batch = match batches.next() {
            Some(batch) => batch?,
            None => {
                if let Some(_limit) = num_examples {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        requested = _limit,
                        obtained = pos,
                        "Number of samples not reaching the requested amount, continuing with what was obtained"
                    );
                }
                break;
            }
        };

        // Only take what is still needed, batches may be larger.
        let n = num_examples.map_or(batch.len(), |limit| batch.len().min(limit - pos));
        if n == 0 {
            continue;
        }

        let computed = module.project(batch.head(n));
        let w = match (computed.len() % n, computed.len() / n) {
            (0, w) if w > 0 && width.is_none_or(|prev| prev == w) => w,
            _ => {
                return Err(Error::ProjectionShape {
                    len: computed.len(),
                    samples: n,
                    expected: width,
                });
            }
        };

        // Known budget: reserve it once. A budget too large to allocate
        // falls back to growing with what the source yields.
        if let (Some(limit), None) = (num_examples, width) {
            let reserved = limit
                .checked_mul(w)
                .is_some_and(|len| processed.try_reserve_exact(len).is_ok());
            if !reserved {
                #[cfg(feature = "tracing")]
                tracing::debug!(requested = limit, "Sample budget too large to preallocate");
            }
        }
        processed.extend_from_slice(&computed);
        width = Some(w);
        pos += n;
    }

    let Some(width) = width else {
        return Err(Error::EmptySource);
    };
    processed.truncate(pos * width);

    Ok(Sketch {
        quantiles: quantiles(&processed, width, percentiles),
        percentiles: percentiles.clone(),
        width,
        num_samples: pos,
    })
}

/// Per-column quantiles of a row-major `n x width` matrix, by linear
/// interpolation between order statistics.
fn quantiles(values: &[f32], width: usize, percentiles: &Percentiles) -> Vec<f32> {
    let n = values.len() / width;
    let mut out = vec![0.0; percentiles.len() * width];
    let mut column = Vec::with_capacity(n);

    for dim in 0..width {
        column.clear();
        column.extend(values.iter().skip(dim).step_by(width).copied());
        column.sort_unstable_by(f32::total_cmp);

        for (level, p) in percentiles.iter().enumerate() {
            let rank = (n - 1) as f64 * p / 100.0;
            let lo = rank.floor() as usize;
            let hi = (lo + 1).min(n - 1);
            let frac = rank - lo as f64;
            let (a, b) = (f64::from(column[lo]), f64::from(column[hi]));
            out[level * width + dim] = (a + (b - a) * frac) as f32;
        }
    }
    out
}
