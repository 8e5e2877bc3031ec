//! Class statistics collection through the raster engine's mask.
use tracing::{debug, info};

use crate::engine::{RasterEngine, MASK_LAYER};
use crate::error::{Error, Result};
use crate::mask::MaskState;
use crate::stats::{ClassStatistics, FeatureVector};

/// Mask the engine to one category of `cover` and read the class signature.
///
/// The active mask is replaced by `ambient ∧ (cover == category)`. The mask
/// is left in place on return; tearing it down is the caller's job (see
/// [`MaskGuard`](crate::mask::MaskGuard)).
///
/// Fails with [`Error::EmptyClass`] as soon as any base layer has no cells
/// under the mask, without returning partial means.
pub fn collect<E: RasterEngine>(
    engine: &mut E,
    cover: &str,
    category: i64,
    base_layers: &[String],
    ambient: &MaskState,
) -> Result<ClassStatistics> {
    if base_layers.is_empty() {
        return Err(Error::NoBaseLayers);
    }

    engine.remove_layer(MASK_LAYER)?;
    if let Some(snapshot) = ambient.snapshot() {
        engine.copy_layer(snapshot, MASK_LAYER)?;
    }
    engine.apply_category_mask(cover, category)?;

    let mut means = Vec::with_capacity(base_layers.len());
    for layer in base_layers {
        let mean = engine.query_mean(layer)?.ok_or_else(|| Error::EmptyClass {
            category,
            layer: layer.clone(),
        })?;
        debug!(category, layer = %layer, mean, "layer mean");
        means.push(mean);
    }

    let covariance = engine.query_covariance(base_layers)?;
    info!(category, bands = base_layers.len(), "collected class statistics");
    ClassStatistics::new(category, FeatureVector::from_vec(means), covariance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MemoryEngine;
    use approx::assert_abs_diff_eq;

    fn engine() -> MemoryEngine {
        let mut e = MemoryEngine::new(4, 1);
        e.insert_layer("cover", vec![1.0, 1.0, 1.0, 2.0]).unwrap();
        e.insert_layer("red", vec![1.0, 2.0, 3.0, 50.0]).unwrap();
        e.insert_layer("nir", vec![3.0, 2.0, 4.0, f64::NAN]).unwrap();
        e
    }

    fn bands() -> Vec<String> {
        vec!["red".to_string(), "nir".to_string()]
    }

    #[test]
    fn collects_means_and_covariance_in_layer_order() {
        let mut e = engine();
        let s = collect(&mut e, "cover", 1, &bands(), &MaskState::Absent).unwrap();
        assert_eq!(s.category, 1);
        assert_abs_diff_eq!(s.means[0], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(s.means[1], 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(s.covariance[(0, 0)], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(s.covariance[(0, 1)], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(s.covariance[(1, 1)], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn empty_category_names_the_first_empty_layer() {
        let mut e = engine();
        let err = collect(&mut e, "cover", 9, &bands(), &MaskState::Absent).unwrap_err();
        match err {
            Error::EmptyClass { category, layer } => {
                assert_eq!(category, 9);
                assert_eq!(layer, "red");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn layer_empty_only_in_one_band_is_still_an_empty_class() {
        let mut e = engine();
        let err = collect(&mut e, "cover", 2, &bands(), &MaskState::Absent).unwrap_err();
        assert!(matches!(err, Error::EmptyClass { category: 2, ref layer } if layer == "nir"));
    }

    #[test]
    fn ambient_snapshot_narrows_the_class() {
        let mut e = engine();
        e.insert_layer("snap", vec![f64::NAN, 1.0, 1.0, 1.0]).unwrap();
        // A stale category mask from a previous class must not leak through.
        e.apply_category_mask("cover", 2).unwrap();
        let ambient = MaskState::Saved("snap".to_string());
        let s = collect(&mut e, "cover", 1, &bands(), &ambient).unwrap();
        assert_abs_diff_eq!(s.means[0], 2.5, epsilon = 1e-12);
        assert_abs_diff_eq!(s.means[1], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn no_base_layers_is_rejected() {
        let mut e = engine();
        let err = collect(&mut e, "cover", 1, &[], &MaskState::Absent).unwrap_err();
        assert!(matches!(err, Error::NoBaseLayers));
    }
}
