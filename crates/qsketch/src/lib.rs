//! # qsketch
//!
//! Quantile sketches of random projections, computed on demand or streamed
//! by a pool of worker threads.
//!
//! A *sketch* is the empirical quantile function of a projected data set,
//! evaluated at fixed [`Percentiles`]. Sketches of many projections make up
//! sliced-distribution statistics such as the sliced Wasserstein distance.
//!
//! ## Features
//!
//! - **On-demand sketching**: [`compute_sketch`] and [`Sketcher::sketch_with`]
//!   project a bounded number of samples and compute their quantiles.
//! - **Streaming**: [`Sketcher::stream`] keeps workers producing sketches of
//!   randomly drawn modules, published epoch by epoch into a bounded queue.
//!   Each epoch is closed by a [`StreamMessage::EndOfEpoch`] and epochs never
//!   interleave.
//! - **Flow control**: streams can be paused, resumed and stopped at any
//!   time; stopping waits for every worker to confirm its exit.
//! - **Module recycling**: each worker keeps one module instance and
//!   reinitializes it per id through [`ModuleSource::recycle`].
//!
//! ## Example
//!
//! ```
//! use qsketch::{Batch, DataSource, LinearProjections, ModuleSource, Percentiles, Sketcher};
//!
//! let data = Batch::new((0..300).map(|x| (x % 17) as f32).collect(), 3).unwrap();
//! let sketcher = Sketcher::new(
//!     Some(DataSource::tensor(data)),
//!     Percentiles::linspace(5).unwrap(),
//!     Some(64),
//! );
//!
//! let mut projector = LinearProjections::new(3, 2).get(0);
//! let sketch = sketcher.sketch(&mut projector).unwrap();
//! assert_eq!(sketch.len(), 5);
//! assert_eq!(sketch.width(), 2);
//! assert_eq!(sketch.num_samples(), 64);
//! ```
//!
//! ## Crate Features
//!
//! - `tracing`: emit `tracing` events (enabled by default).
//! - `serde`: derive `Serialize` for [`Sketch`].

mod batch;
mod error;
mod module;
mod percentiles;
mod sketch;
mod sketcher;
mod source;
mod stream;

pub use crate::batch::*;
pub use crate::error::*;
pub use crate::module::*;
pub use crate::percentiles::*;
pub use crate::sketch::*;
pub use crate::sketcher::*;
pub use crate::source::*;
pub use crate::stream::*;
