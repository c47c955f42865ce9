use anyhow::bail;
use clap::Parser;
use qsketch::{EpochSize, Percentiles, StreamConfig, WorkerCount};

/// Command line configuration of the `qsketch` binary.
///
/// Every option can also be given through the environment variable named in
/// its description, e.g. from a `.env` file.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "qsketch",
    version,
    about = "Stream quantile sketches of random linear projections of a synthetic dataset"
)]
pub struct CliArgs {
    /// Number of quantiles computed per sketch, evenly spaced from 0 to 100.
    ///
    /// Environment variable: `NUM_QUANTILES`
    #[arg(long, env = "NUM_QUANTILES", default_value_t = 100)]
    pub num_quantiles: usize,

    /// Number of samples used per sketch. If negative, use all of them.
    ///
    /// Environment variable: `NUM_EXAMPLES`
    #[arg(long, env = "NUM_EXAMPLES", default_value_t = 3000, allow_negative_numbers = true)]
    pub num_examples: i64,

    /// Number of sketches per epoch. If negative, sketch forever.
    ///
    /// Environment variable: `NUM_SKETCHES`
    #[arg(long, env = "NUM_SKETCHES", default_value_t = -1, allow_negative_numbers = true)]
    pub num_sketches: i64,

    /// Number of sketch workers. If negative, use half of the remaining
    /// cores.
    ///
    /// Environment variable: `NUM_SKETCHERS`
    #[arg(long, env = "NUM_SKETCHERS", default_value_t = -1, allow_negative_numbers = true)]
    pub num_sketchers: i64,

    /// Number of epochs to stream. Ignored when the number of sketches is
    /// unbounded.
    ///
    /// Environment variable: `EPOCHS`
    #[arg(long, env = "EPOCHS", default_value_t = 1)]
    pub epochs: usize,

    /// Dimension of the synthetic samples.
    ///
    /// Environment variable: `INPUT_DIM`
    #[arg(long, env = "INPUT_DIM", default_value_t = 16)]
    pub input_dim: usize,

    /// Output dimension of each random projection.
    ///
    /// Environment variable: `NUM_PROJECTIONS`
    #[arg(long, env = "NUM_PROJECTIONS", default_value_t = 1)]
    pub num_projections: usize,

    /// Number of samples in the synthetic dataset.
    ///
    /// Environment variable: `DATASET_SIZE`
    #[arg(long, env = "DATASET_SIZE", default_value_t = 10_000)]
    pub dataset_size: usize,

    /// Stop after this many stream messages, terminators included.
    ///
    /// Environment variable: `MAX_MESSAGES`
    #[arg(long, env = "MAX_MESSAGES")]
    pub max_messages: Option<usize>,

    /// Seed of the synthetic data and of the drawn projection ids.
    ///
    /// Environment variable: `SEED`
    #[arg(long, env = "SEED")]
    pub seed: Option<u64>,

    /// Print every sketch to stdout as a JSON line.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Debug, Clone)]
pub struct SketchConfig {
    pub percentiles: Percentiles,
    pub num_examples: Option<usize>,
    pub stream: StreamConfig,
    pub input_dim: usize,
    pub num_projections: usize,
    pub dataset_size: usize,
    pub max_messages: Option<usize>,
    pub seed: Option<u64>,
    pub json: bool,
}

impl TryFrom<CliArgs> for SketchConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.num_quantiles == 0 {
            bail!("NUM_QUANTILES must be greater than 0");
        }
        if args.num_examples == 0 {
            bail!("NUM_EXAMPLES must not be 0");
        }
        if args.epochs == 0 {
            bail!("EPOCHS must be greater than 0");
        }
        if args.input_dim == 0 || args.num_projections == 0 {
            bail!("INPUT_DIM and NUM_PROJECTIONS must be greater than 0");
        }
        if args.dataset_size == 0 {
            bail!("DATASET_SIZE must be greater than 0");
        }

        let percentiles = Percentiles::linspace(args.num_quantiles)?;
        let num_examples = usize::try_from(args.num_examples).ok();
        let items_per_epoch = EpochSize::from_count(args.num_sketches)?;
        let workers = WorkerCount::from_count(args.num_sketchers)?;

        let mut stream = StreamConfig::new(items_per_epoch, args.epochs).with_workers(workers);
        if let Some(seed) = args.seed {
            stream = stream.with_seed(seed);
        }

        Ok(Self {
            percentiles,
            num_examples,
            stream,
            input_dim: args.input_dim,
            num_projections: args.num_projections,
            dataset_size: args.dataset_size,
            max_messages: args.max_messages,
            seed: args.seed,
            json: args.json,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> anyhow::Result<SketchConfig> {
        let args = CliArgs::try_parse_from(["qsketch"].iter().chain(extra))?;
        SketchConfig::try_from(args)
    }

    #[test]
    fn defaults_stream_forever() {
        let config = parse(&[]).unwrap();
        assert_eq!(config.percentiles.len(), 100);
        assert_eq!(config.num_examples, Some(3000));
        assert_eq!(config.stream.items_per_epoch, EpochSize::Unbounded);
        assert_eq!(config.stream.workers, WorkerCount::Auto);
    }

    #[test]
    fn negative_counts() {
        let config = parse(&[
            "--num-examples",
            "-1",
            "--num-sketches",
            "20",
            "--num-sketchers",
            "3",
            "--epochs",
            "2",
            "--seed",
            "9",
        ])
        .unwrap();
        assert_eq!(config.num_examples, None);
        assert_eq!(config.stream.items_per_epoch, EpochSize::Bounded(20));
        assert_eq!(config.stream.workers, WorkerCount::Fixed(3));
        assert_eq!(config.stream.epochs, 2);
        assert_eq!(config.stream.seed, Some(9));
    }

    #[test]
    fn zero_counts_are_rejected() {
        assert!(parse(&["--num-sketches", "0"]).is_err());
        assert!(parse(&["--num-sketchers", "0"]).is_err());
        assert!(parse(&["--num-quantiles", "0"]).is_err());
        assert!(parse(&["--num-examples", "0"]).is_err());
        assert!(parse(&["--epochs", "0"]).is_err());
    }
}
