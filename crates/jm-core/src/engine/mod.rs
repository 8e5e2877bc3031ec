//! Raster engine seam.
//!
//! The collector and mask guard only talk to a [`RasterEngine`]; the engine
//! owns layer storage, the active mask and the univariate/covariance
//! estimators. Two implementations are provided: [`GrassEngine`] drives GRASS
//! GIS modules as subprocesses, [`MemoryEngine`] works on in-memory grids.
pub mod grass;
pub mod memory;

pub use grass::GrassEngine;
pub use memory::{MemoryEngine, RasterLayer, Scene};

use crate::error::Result;
use crate::stats::CovarianceMatrix;

/// Name of the layer that acts as the engine-wide mask.
pub const MASK_LAYER: &str = "MASK";

pub trait RasterEngine {
    /// Duplicate `src` as `dst`, overwriting `dst`.
    fn copy_layer(&mut self, src: &str, dst: &str) -> Result<()>;

    /// Delete a layer. Removing an absent layer is not an error.
    fn remove_layer(&mut self, name: &str) -> Result<()>;

    fn find_layer(&self, name: &str) -> Result<bool>;

    /// Replace the active mask with one selecting cells of `cover` equal to
    /// `category`, intersected with whatever mask was active before.
    fn apply_category_mask(&mut self, cover: &str, category: i64) -> Result<()>;

    /// Mean of the unmasked non-null cells of `layer`, `None` if there are none.
    fn query_mean(&self, layer: &str) -> Result<Option<f64>>;

    /// Covariance matrix across `layers` over the unmasked cells, rows and
    /// columns in the order given.
    fn query_covariance(&self, layers: &[String]) -> Result<CovarianceMatrix>;
}
