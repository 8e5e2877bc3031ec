//! Scoped save/restore of the engine-wide mask.
//!
//! [`MaskGuard`] snapshots the active mask when acquired and puts it back
//! when released or dropped, so every exit path out of class collection
//! leaves the engine's mask as it found it.
use std::ops::{Deref, DerefMut};

use tracing::{debug, error};

use crate::engine::{RasterEngine, MASK_LAYER};
use crate::error::Result;

/// The mask that was active before collection started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaskState {
    /// No mask was active.
    Absent,
    /// The mask was copied to this layer.
    Saved(String),
}

impl MaskState {
    /// Name of the snapshot layer, if any.
    pub fn snapshot(&self) -> Option<&str> {
        match self {
            MaskState::Absent => None,
            MaskState::Saved(name) => Some(name),
        }
    }
}

/// Exclusive handle on an engine whose mask is restored on release.
pub struct MaskGuard<'a, E: RasterEngine> {
    engine: &'a mut E,
    state: MaskState,
    released: bool,
}

impl<'a, E: RasterEngine> MaskGuard<'a, E> {
    /// Snapshot the current mask (if any) under a process-unique name.
    pub fn acquire(engine: &'a mut E) -> Result<Self> {
        let state = if engine.find_layer(MASK_LAYER)? {
            let snapshot = format!("jm_mask_snapshot_{}", std::process::id());
            engine.copy_layer(MASK_LAYER, &snapshot)?;
            debug!(%snapshot, "saved ambient mask");
            MaskState::Saved(snapshot)
        } else {
            MaskState::Absent
        };
        Ok(Self {
            engine,
            state,
            released: false,
        })
    }

    pub fn state(&self) -> &MaskState {
        &self.state
    }

    /// Restore the ambient mask and drop the snapshot, reporting failures.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.restore()
    }

    /// Every step is attempted even after a failure, so the snapshot layer
    /// never outlives the guard. The first error is returned.
    fn restore(&mut self) -> Result<()> {
        let removed = self.engine.remove_layer(MASK_LAYER);
        let MaskState::Saved(snapshot) = &self.state else {
            return removed;
        };
        // copy_layer overwrites, so a failed removal above can still be repaired.
        let copied = self.engine.copy_layer(snapshot, MASK_LAYER);
        let cleaned = self.engine.remove_layer(snapshot);
        if copied.is_ok() {
            debug!(%snapshot, "restored ambient mask");
        }
        removed.and(copied).and(cleaned)
    }
}

impl<E: RasterEngine> Deref for MaskGuard<'_, E> {
    type Target = E;

    fn deref(&self) -> &E {
        self.engine
    }
}

impl<E: RasterEngine> DerefMut for MaskGuard<'_, E> {
    fn deref_mut(&mut self) -> &mut E {
        self.engine
    }
}

impl<E: RasterEngine> Drop for MaskGuard<'_, E> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.restore() {
            error!("failed to restore raster mask: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MemoryEngine;

    const NAN: f64 = f64::NAN;

    fn engine_with_mask() -> MemoryEngine {
        let mut e = MemoryEngine::new(2, 2);
        e.insert_layer("cover", vec![1.0, 2.0, 1.0, 2.0]).unwrap();
        e.insert_layer(MASK_LAYER, vec![1.0, 1.0, NAN, 1.0]).unwrap();
        e
    }

    fn same_cells(a: &[f64], b: &[f64]) -> bool {
        a.len() == b.len()
            && a.iter().zip(b).all(|(x, y)| x == y || (x.is_nan() && y.is_nan()))
    }

    #[test]
    fn release_restores_ambient_mask() {
        let mut e = engine_with_mask();
        let before = e.layer(MASK_LAYER).unwrap().data.clone();
        let mut guard = MaskGuard::acquire(&mut e).unwrap();
        let snapshot = guard.state().snapshot().unwrap().to_string();
        guard.apply_category_mask("cover", 2).unwrap();
        guard.release().unwrap();

        assert!(same_cells(&e.layer(MASK_LAYER).unwrap().data, &before));
        assert!(!e.find_layer(&snapshot).unwrap());
    }

    #[test]
    fn drop_restores_ambient_mask() {
        let mut e = engine_with_mask();
        let before = e.layer(MASK_LAYER).unwrap().data.clone();
        {
            let mut guard = MaskGuard::acquire(&mut e).unwrap();
            guard.apply_category_mask("cover", 1).unwrap();
        }
        assert!(same_cells(&e.layer(MASK_LAYER).unwrap().data, &before));
        assert_eq!(e.layer_names().count(), 2);
    }

    #[test]
    fn absent_mask_is_removed_on_release() {
        let mut e = MemoryEngine::new(2, 1);
        e.insert_layer("cover", vec![1.0, 2.0]).unwrap();
        let mut guard = MaskGuard::acquire(&mut e).unwrap();
        assert_eq!(guard.state(), &MaskState::Absent);
        guard.apply_category_mask("cover", 1).unwrap();
        assert!(guard.find_layer(MASK_LAYER).unwrap());
        guard.release().unwrap();
        assert!(!e.find_layer(MASK_LAYER).unwrap());
    }

    /// Fails every `remove_layer` of the mask layer itself.
    struct StuckMaskEngine {
        inner: MemoryEngine,
    }

    impl RasterEngine for StuckMaskEngine {
        fn copy_layer(&mut self, src: &str, dst: &str) -> Result<()> {
            self.inner.copy_layer(src, dst)
        }

        fn remove_layer(&mut self, name: &str) -> Result<()> {
            if name == MASK_LAYER {
                return Err(crate::error::Error::Engine {
                    command: format!("g.remove name={name}"),
                    message: "permission denied".to_string(),
                });
            }
            self.inner.remove_layer(name)
        }

        fn find_layer(&self, name: &str) -> Result<bool> {
            self.inner.find_layer(name)
        }

        fn apply_category_mask(&mut self, cover: &str, category: i64) -> Result<()> {
            self.inner.apply_category_mask(cover, category)
        }

        fn query_mean(&self, layer: &str) -> Result<Option<f64>> {
            self.inner.query_mean(layer)
        }

        fn query_covariance(&self, layers: &[String]) -> Result<crate::stats::CovarianceMatrix> {
            self.inner.query_covariance(layers)
        }
    }

    #[test]
    fn failed_mask_removal_still_drops_snapshot() {
        let mut e = StuckMaskEngine { inner: engine_with_mask() };
        let before = e.inner.layer(MASK_LAYER).unwrap().data.clone();
        let mut guard = MaskGuard::acquire(&mut e).unwrap();
        let snapshot = guard.state().snapshot().unwrap().to_string();
        guard.apply_category_mask("cover", 2).unwrap();

        let err = guard.release().unwrap_err();
        assert!(err.to_string().contains("permission denied"), "{err}");
        assert!(!e.find_layer(&snapshot).unwrap(), "snapshot layer left behind");
        assert!(same_cells(&e.inner.layer(MASK_LAYER).unwrap().data, &before));
    }
}
