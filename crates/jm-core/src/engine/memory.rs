//! In-memory raster engine over equally sized grids.
//!
//! Cells holding NaN are no-data. The mask follows GRASS conventions: when a
//! layer named [`MASK_LAYER`] exists, only cells where it is non-null and
//! non-zero take part in queries.
use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{RasterEngine, MASK_LAYER};
use crate::error::{Error, Result};
use crate::stats::CovarianceMatrix;

/// A single raster layer, row-major, NaN for no-data.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterLayer {
    pub data: Vec<f64>,
    pub width: usize,
    pub height: usize,
}

impl RasterLayer {
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.width + col]
    }
}

/// On-disk scene: a grid size plus named layers, `null` for no-data.
///
/// ```json
/// { "width": 2, "height": 2,
///   "layers": { "red": [1.0, 2.0, null, 4.0], "cover": [1, 1, 2, 2] } }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    pub width: usize,
    pub height: usize,
    #[serde(deserialize_with = "null_as_nan_layers")]
    pub layers: BTreeMap<String, Vec<f64>>,
}

fn null_as_nan_layers<'de, D: serde::Deserializer<'de>>(
    d: D,
) -> std::result::Result<BTreeMap<String, Vec<f64>>, D::Error> {
    let raw: BTreeMap<String, Vec<Option<f64>>> = BTreeMap::deserialize(d)?;
    Ok(raw
        .into_iter()
        .map(|(name, cells)| (name, cells.into_iter().map(|x| x.unwrap_or(f64::NAN)).collect()))
        .collect())
}

#[derive(Debug, Clone)]
pub struct MemoryEngine {
    width: usize,
    height: usize,
    layers: BTreeMap<String, RasterLayer>,
}

impl MemoryEngine {
    /// An engine with no layers over a `width` × `height` grid.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            layers: BTreeMap::new(),
        }
    }

    pub fn from_scene(scene: Scene) -> Result<Self> {
        let mut engine = Self::new(scene.width, scene.height);
        for (name, data) in scene.layers {
            engine.insert_layer(&name, data)?;
        }
        Ok(engine)
    }

    /// Parse a JSON scene.
    pub fn from_json(json: &str) -> Result<Self> {
        Self::from_scene(serde_json::from_str(json)?)
    }

    /// Read a JSON scene file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Add or replace a layer. `data` must cover the whole grid.
    pub fn insert_layer(&mut self, name: &str, data: Vec<f64>) -> Result<()> {
        let cells = self.width * self.height;
        if data.len() != cells {
            return Err(Error::DimensionMismatch {
                what: "layer cell count",
                expected: cells,
                found: data.len(),
            });
        }
        self.layers.insert(
            name.to_string(),
            RasterLayer {
                data,
                width: self.width,
                height: self.height,
            },
        );
        Ok(())
    }

    pub fn layer(&self, name: &str) -> Option<&RasterLayer> {
        self.layers.get(name)
    }

    pub fn layer_names(&self) -> impl Iterator<Item = &str> {
        self.layers.keys().map(String::as_str)
    }

    fn require(&self, command: &str, name: &str) -> Result<&RasterLayer> {
        self.layers.get(name).ok_or_else(|| Error::Engine {
            command: command.to_string(),
            message: format!("raster <{name}> not found"),
        })
    }

    /// Whether cell `idx` is visible through the active mask.
    fn unmasked(&self, idx: usize) -> bool {
        match self.layers.get(MASK_LAYER) {
            None => true,
            Some(mask) => {
                let v = mask.data[idx];
                v.is_finite() && v != 0.0
            }
        }
    }
}

impl RasterEngine for MemoryEngine {
    fn copy_layer(&mut self, src: &str, dst: &str) -> Result<()> {
        let layer = self.require("copy_layer", src)?.clone();
        debug!(src, dst, "copying layer");
        self.layers.insert(dst.to_string(), layer);
        Ok(())
    }

    fn remove_layer(&mut self, name: &str) -> Result<()> {
        if self.layers.remove(name).is_some() {
            debug!(name, "removed layer");
        }
        Ok(())
    }

    fn find_layer(&self, name: &str) -> Result<bool> {
        Ok(self.layers.contains_key(name))
    }

    fn apply_category_mask(&mut self, cover: &str, category: i64) -> Result<()> {
        let cover_layer = self.require("apply_category_mask", cover)?;
        let target = category as f64;
        let data: Vec<f64> = cover_layer
            .data
            .iter()
            .enumerate()
            .map(|(idx, &v)| {
                if self.unmasked(idx) && v.is_finite() && v == target {
                    1.0
                } else {
                    f64::NAN
                }
            })
            .collect();
        let selected = data.iter().filter(|v| v.is_finite()).count();
        debug!(cover, category, selected, "applied category mask");
        self.insert_layer(MASK_LAYER, data)
    }

    fn query_mean(&self, layer: &str) -> Result<Option<f64>> {
        let values = self.require("query_mean", layer)?;
        let (mut sum, mut n) = (0f64, 0usize);
        for (idx, &v) in values.data.iter().enumerate() {
            if v.is_finite() && self.unmasked(idx) {
                sum += v;
                n += 1;
            }
        }
        Ok(if n == 0 { None } else { Some(sum / n as f64) })
    }

    fn query_covariance(&self, layers: &[String]) -> Result<CovarianceMatrix> {
        let bands: Vec<&RasterLayer> = layers
            .iter()
            .map(|name| self.require("query_covariance", name))
            .collect::<Result<_>>()?;
        let nb = bands.len();

        // Rows are cells where every band has data, as r.covar does.
        let mut samples: Vec<Vec<f64>> = Vec::new();
        for idx in 0..self.width * self.height {
            if !self.unmasked(idx) {
                continue;
            }
            let pixel: Vec<f64> = bands.iter().map(|b| b.data[idx]).collect();
            if pixel.iter().all(|v| v.is_finite()) {
                samples.push(pixel);
            }
        }

        let mut cov = CovarianceMatrix::zeros(nb, nb);
        let n = samples.len();
        if n < 2 {
            return Ok(cov);
        }

        let mut means = vec![0f64; nb];
        for pixel in &samples {
            for (m, v) in means.iter_mut().zip(pixel) {
                *m += v;
            }
        }
        for m in &mut means {
            *m /= n as f64;
        }

        for pixel in &samples {
            for i in 0..nb {
                let di = pixel[i] - means[i];
                for j in i..nb {
                    cov[(i, j)] += di * (pixel[j] - means[j]);
                }
            }
        }
        for i in 0..nb {
            for j in i..nb {
                cov[(i, j)] /= (n - 1) as f64;
                cov[(j, i)] = cov[(i, j)];
            }
        }
        Ok(cov)
    }
}
