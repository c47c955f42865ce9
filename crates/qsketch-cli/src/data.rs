use qsketch::{Dataset, Sample, standard_normal};
use rand::{Rng, SeedableRng, rngs::StdRng};

const NUM_CLUSTERS: usize = 4;

/// In-memory mixture of isotropic Gaussian clusters.
///
/// Each sample is labeled with the index of its cluster.
pub struct GaussianMixture {
    features: Vec<f32>,
    labels: Vec<i64>,
    width: usize,
}

impl GaussianMixture {
    pub fn generate(len: usize, width: usize, seed: Option<u64>) -> Self {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };

        let centers: Vec<f32> = (0..NUM_CLUSTERS * width)
            .map(|_| rng.random_range(-5.0..5.0))
            .collect();

        let mut features = Vec::with_capacity(len * width);
        let mut labels = Vec::with_capacity(len);
        for _ in 0..len {
            let cluster = rng.random_range(0..NUM_CLUSTERS);
            let center = &centers[cluster * width..(cluster + 1) * width];
            features.extend(center.iter().map(|c| c + standard_normal(&mut rng) as f32));
            labels.push(cluster as i64);
        }

        Self {
            features,
            labels,
            width,
        }
    }
}

impl Dataset for GaussianMixture {
    fn len(&self) -> usize {
        self.labels.len()
    }

    fn get(&self, index: usize) -> Sample {
        Sample {
            features: self.features[index * self.width..(index + 1) * self.width].to_vec(),
            label: Some(self.labels[index]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_mixture_is_reproducible() {
        let a = GaussianMixture::generate(50, 3, Some(1));
        let b = GaussianMixture::generate(50, 3, Some(1));
        assert_eq!(a.len(), 50);
        assert_eq!(a.get(17), b.get(17));
        assert_eq!(a.get(17).features.len(), 3);
        assert!(a.get(0).label.is_some_and(|l| (0..NUM_CLUSTERS as i64).contains(&l)));
    }
}
