//! Jeffries-Matusita separability between two raster classes.
//!
//! Class signatures (per-band means and the band covariance matrix) are read
//! through a [`RasterEngine`] with the engine's mask restricted to one
//! category of a cover layer at a time; the two signatures are then combined
//! into the Bhattacharyya distance and its bounded JM transform.
pub mod collector;
pub mod distance;
pub mod engine;
pub mod error;
pub mod mask;
pub mod separability;
pub mod stats;

pub use collector::collect;
pub use distance::{distance, separability, Separability};
pub use engine::{GrassEngine, MemoryEngine, RasterEngine};
pub use error::{CovarianceRole, Error, Result};
pub use mask::{MaskGuard, MaskState};
pub use separability::{run, run_with_args, SeparabilityReport, SeparabilityRequest};
pub use stats::{ClassStatistics, CovarianceMatrix, FeatureVector};
