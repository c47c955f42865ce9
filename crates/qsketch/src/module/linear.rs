use crate::{ModuleSource, Projection, Samples};
use rand::{Rng, SeedableRng, rngs::StdRng};

/// A bias-free linear map whose output rows have unit norm.
///
/// Weights are Gaussian, drawn from an RNG seeded with the projector's id, so
/// the same id always yields the same projector.
#[derive(Clone, Debug, PartialEq)]
pub struct LinearProjector {
    weights: Vec<f32>,
    input_width: usize,
    output_width: usize,
}

impl LinearProjector {
    pub fn new(input_width: usize, output_width: usize, id: usize) -> Self {
        let mut projector = Self {
            weights: vec![0.0; input_width * output_width],
            input_width,
            output_width,
        };
        projector.reset(id);
        projector
    }

    /// Redraws the weights for `id` without reallocating.
    pub fn reset(&mut self, id: usize) {
        let mut rng = StdRng::seed_from_u64(id as u64);
        for w in &mut self.weights {
            *w = standard_normal(&mut rng) as f32;
        }
        for row in self.weights.chunks_exact_mut(self.input_width.max(1)) {
            let norm = row.iter().map(|w| w * w).sum::<f32>().sqrt();
            if norm > 0.0 {
                row.iter_mut().for_each(|w| *w /= norm);
            }
        }
    }

    pub fn input_width(&self) -> usize {
        self.input_width
    }

    pub fn output_width(&self) -> usize {
        self.output_width
    }

    /// Row `o` of the weight matrix, i.e. the direction of output `o`.
    pub fn direction(&self, o: usize) -> &[f32] {
        &self.weights[o * self.input_width..(o + 1) * self.input_width]
    }
}

impl Projection for LinearProjector {
    /// # Panics
    ///
    /// Panics if the samples are not `input_width` wide.
    fn project(&mut self, samples: Samples<'_>) -> Vec<f32> {
        assert_eq!(
            samples.width(),
            self.input_width,
            "projector expects {} features per sample",
            self.input_width
        );
        let mut out = Vec::with_capacity(samples.len() * self.output_width);
        for sample in samples.rows() {
            for o in 0..self.output_width {
                let dot = self
                    .direction(o)
                    .iter()
                    .zip(sample)
                    .map(|(w, x)| w * x)
                    .sum::<f32>();
                out.push(dot);
            }
        }
        out
    }
}

/// The family of [`LinearProjector`]s of a given shape, indexed by seed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LinearProjections {
    input_width: usize,
    output_width: usize,
    len: Option<usize>,
}

impl LinearProjections {
    pub fn new(input_width: usize, output_width: usize) -> Self {
        Self {
            input_width,
            output_width,
            len: None,
        }
    }

    /// Restricts the family to ids in `0..len`.
    pub fn with_len(mut self, len: usize) -> Self {
        self.len = Some(len);
        self
    }
}

impl ModuleSource for LinearProjections {
    type Module = LinearProjector;

    fn get(&self, id: usize) -> LinearProjector {
        LinearProjector::new(self.input_width, self.output_width, id)
    }

    fn len(&self) -> Option<usize> {
        self.len
    }

    fn recycle(&self, module: &mut LinearProjector, id: usize) {
        if module.input_width == self.input_width && module.output_width == self.output_width {
            module.reset(id);
        } else {
            *module = self.get(id);
        }
    }
}

/// Draws one sample of the standard normal distribution (Box-Muller).
///
/// Projector weights are drawn with it; it is public so that synthetic data
/// can share the same sampler.
pub fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let u1: f64 = 1.0 - rng.random::<f64>();
    let u2: f64 = rng.random();
    (-2.0 * u1.ln()).sqrt() * (core::f64::consts::TAU * u2).cos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Batch, Recycler};

    #[test]
    fn standard_normal_moments() {
        let mut rng = StdRng::seed_from_u64(0);
        let draws: Vec<f64> = (0..20_000).map(|_| standard_normal(&mut rng)).collect();
        let mean = draws.iter().sum::<f64>() / draws.len() as f64;
        let var = draws.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / draws.len() as f64;
        assert!(mean.abs() < 0.05, "mean {mean}");
        assert!((var - 1.0).abs() < 0.05, "variance {var}");
        assert!(draws.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn same_id_same_projector() {
        let family = LinearProjections::new(4, 2);
        assert_eq!(family.get(7), family.get(7));
        assert_ne!(family.get(7), family.get(8));
    }

    #[test]
    fn directions_have_unit_norm() {
        let projector = LinearProjector::new(16, 3, 42);
        for o in 0..3 {
            let norm: f32 = projector.direction(o).iter().map(|w| w * w).sum();
            assert!((norm - 1.0).abs() < 1e-5, "norm of row {o} is {norm}");
        }
    }

    #[test]
    fn recycling_matches_fresh_instances() {
        let family = LinearProjections::new(3, 2).with_len(10);
        let mut recycler = Recycler::new(&family);
        recycler.fetch(1);
        let recycled = recycler.fetch(9).clone();
        assert_eq!(recycled, family.get(9));
    }

    #[test]
    fn projects_each_sample() {
        let mut projector = LinearProjector::new(2, 1, 0);
        let batch = Batch::from_rows(&[[1.0_f32, 0.0], [0.0, 1.0], [2.0, 0.0]]).unwrap();
        let out = projector.project(batch.samples());
        assert_eq!(out.len(), 3);
        let d = projector.direction(0);
        assert!((out[0] - d[0]).abs() < 1e-6);
        assert!((out[1] - d[1]).abs() < 1e-6);
        assert!((out[2] - 2.0 * d[0]).abs() < 1e-6);
    }
}
