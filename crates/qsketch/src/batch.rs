use crate::{Error, Result};

/// A batch of samples stored row-major, one row of `width` features per
/// sample, with optional labels.
#[derive(Clone, Debug, PartialEq)]
pub struct Batch {
    data: Vec<f32>,
    width: usize,
    labels: Option<Vec<i64>>,
}

impl Batch {
    /// Wraps `data` as rows of `width` features.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedSource`] if `width` is zero or `data` does
    /// not split into whole rows.
    pub fn new(data: Vec<f32>, width: usize) -> Result<Self> {
        if width == 0 {
            return Err(Error::unsupported("samples must have at least one feature"));
        }
        if data.len() % width != 0 {
            return Err(Error::unsupported(format!(
                "{} values do not split into rows of width {width}",
                data.len()
            )));
        }
        Ok(Self {
            data,
            width,
            labels: None,
        })
    }

    /// Builds a batch from individual rows, which must all have the same
    /// length.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedSource`] for empty or ragged rows.
    pub fn from_rows<R: AsRef<[f32]>>(rows: &[R]) -> Result<Self> {
        let width = rows.first().map_or(0, |r| r.as_ref().len());
        let mut data = Vec::with_capacity(width * rows.len());
        for row in rows {
            let row = row.as_ref();
            if row.len() != width {
                return Err(Error::unsupported(format!(
                    "ragged rows: expected width {width}, found {}",
                    row.len()
                )));
            }
            data.extend_from_slice(row);
        }
        Self::new(data, width)
    }

    /// Attaches one label per sample.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedSource`] if the label count differs from
    /// the sample count.
    pub fn with_labels(mut self, labels: Vec<i64>) -> Result<Self> {
        if labels.len() != self.len() {
            return Err(Error::unsupported(format!(
                "{} labels for {} samples",
                labels.len(),
                self.len()
            )));
        }
        self.labels = Some(labels);
        Ok(self)
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.data.len() / self.width
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of features per sample.
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn labels(&self) -> Option<&[i64]> {
        self.labels.as_deref()
    }

    pub fn samples(&self) -> Samples<'_> {
        Samples {
            data: &self.data,
            width: self.width,
        }
    }

    /// View of the first `count` samples, clamped to the batch length.
    pub fn head(&self, count: usize) -> Samples<'_> {
        let count = count.min(self.len());
        Samples {
            data: &self.data[..count * self.width],
            width: self.width,
        }
    }
}

/// Borrowed view of row-major samples, as handed to a [`Projection`].
///
/// [`Projection`]: crate::Projection
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Samples<'a> {
    data: &'a [f32],
    width: usize,
}

impl<'a> Samples<'a> {
    pub fn len(&self) -> usize {
        self.data.len() / self.width
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn as_slice(&self) -> &'a [f32] {
        self.data
    }

    pub fn row(&self, index: usize) -> &'a [f32] {
        &self.data[index * self.width..(index + 1) * self.width]
    }

    pub fn rows(&self) -> impl Iterator<Item = &'a [f32]> + 'a {
        self.data.chunks_exact(self.width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_and_head() {
        let batch = Batch::from_rows(&[[1.0_f32, 2.0], [3.0, 4.0], [5.0, 6.0]]).unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.width(), 2);

        let head = batch.head(2);
        assert_eq!(head.len(), 2);
        assert_eq!(head.row(1), &[3.0, 4.0]);
        assert_eq!(head.rows().count(), 2);

        assert_eq!(batch.head(10).len(), 3);
    }

    #[test]
    fn rejects_malformed_batches() {
        assert!(matches!(
            Batch::new(vec![1.0, 2.0, 3.0], 2),
            Err(Error::UnsupportedSource { .. })
        ));
        assert!(Batch::new(vec![], 0).is_err());
        assert!(Batch::from_rows(&[vec![1.0_f32], vec![1.0, 2.0]]).is_err());

        let batch = Batch::new(vec![1.0, 2.0], 1).unwrap();
        assert!(batch.clone().with_labels(vec![0]).is_err());
        let labelled = batch.with_labels(vec![0, 1]).unwrap();
        assert_eq!(labelled.labels(), Some(&[0, 1][..]));
    }
}
