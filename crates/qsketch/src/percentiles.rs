use crate::{Error, Result};
use std::sync::Arc;

/// Percentile levels at which sketches are evaluated.
///
/// Values are finite, lie in `[0, 100]` and are sorted in non-decreasing
/// order. The levels are shared read-only by every sketch computed with them,
/// so cloning is cheap.
#[derive(Clone, Debug, PartialEq)]
pub struct Percentiles(Arc<[f64]>);

impl Percentiles {
    /// Validates and wraps a sequence of percentile levels.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPercentiles`] if the sequence is empty, holds a
    /// value outside `[0, 100]` (NaN included) or is not sorted.
    ///
    /// # Example
    /// ```
    /// use qsketch::Percentiles;
    ///
    /// let p = Percentiles::new(vec![5.0, 50.0, 95.0]).unwrap();
    /// assert_eq!(p.len(), 3);
    /// assert!(Percentiles::new(vec![50.0, 5.0]).is_err());
    /// ```
    pub fn new(values: impl Into<Vec<f64>>) -> Result<Self> {
        let values = values.into();
        if values.is_empty() {
            return Err(invalid("at least one percentile is required"));
        }
        if let Some(bad) = values.iter().find(|p| !(0.0..=100.0).contains(*p)) {
            return Err(invalid(format!("{bad} is not within [0, 100]")));
        }
        if let Some(w) = values.windows(2).find(|w| w[0] > w[1]) {
            return Err(invalid(format!(
                "levels must be non-decreasing, found {} before {}",
                w[0], w[1]
            )));
        }
        Ok(Self(values.into()))
    }

    /// `count` evenly spaced levels from 0 to 100, both ends included.
    ///
    /// A single level is placed at 0.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPercentiles`] when `count` is zero.
    pub fn linspace(count: usize) -> Result<Self> {
        match count {
            0 => Err(invalid("at least one percentile is required")),
            1 => Self::new(vec![0.0]),
            _ => {
                let step = 100.0 / (count - 1) as f64;
                let mut values: Vec<f64> = (0..count).map(|i| i as f64 * step).collect();
                // Pin the last level so rounding never leaves it above 100.
                values[count - 1] = 100.0;
                Self::new(values)
            }
        }
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always `false`: construction rejects empty level sets.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.0.iter().copied()
    }
}

fn invalid(reason: impl Into<String>) -> Error {
    Error::InvalidPercentiles {
        reason: reason.into(),
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Percentiles {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linspace_covers_both_ends() {
        let p = Percentiles::linspace(5).unwrap();
        assert_eq!(p.as_slice(), &[0.0, 25.0, 50.0, 75.0, 100.0]);

        let p = Percentiles::linspace(1).unwrap();
        assert_eq!(p.as_slice(), &[0.0]);

        let p = Percentiles::linspace(7).unwrap();
        assert_eq!(p.as_slice().last(), Some(&100.0));
        assert!(p.as_slice().windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn rejects_malformed_levels() {
        assert!(matches!(
            Percentiles::new(Vec::new()),
            Err(Error::InvalidPercentiles { .. })
        ));
        assert!(Percentiles::new(vec![-1.0]).is_err());
        assert!(Percentiles::new(vec![100.5]).is_err());
        assert!(Percentiles::new(vec![f64::NAN]).is_err());
        assert!(Percentiles::new(vec![10.0, 9.0]).is_err());
        assert!(Percentiles::linspace(0).is_err());
    }

    #[test]
    fn accepts_repeated_levels() {
        let p = Percentiles::new(vec![0.0, 50.0, 50.0, 100.0]).unwrap();
        assert_eq!(p.len(), 4);
        assert!(!p.is_empty());
    }
}
