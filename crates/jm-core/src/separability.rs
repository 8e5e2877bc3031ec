//! End-to-end separability of two classes: validate the request, collect
//! both class signatures under a mask guard, then compute the distance.
use serde::Serialize;
use tracing::{info, warn};

use crate::collector::collect;
use crate::distance::{separability, Separability};
use crate::engine::RasterEngine;
use crate::error::{Error, Result};
use crate::mask::MaskGuard;

/// A validated invocation: at least one base layer, one cover layer and
/// exactly two category codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeparabilityRequest {
    base_layers: Vec<String>,
    cover: String,
    categories: [i64; 2],
}

impl SeparabilityRequest {
    pub fn new(base_layers: Vec<String>, cover: impl Into<String>, categories: &[i64]) -> Result<Self> {
        let categories: [i64; 2] = categories
            .try_into()
            .map_err(|_| Error::InvalidCategoryCount { found: categories.len() })?;
        if base_layers.is_empty() {
            return Err(Error::NoBaseLayers);
        }
        if categories[0] == categories[1] {
            warn!(category = categories[0], "both categories are the same; distance will be 0");
        }
        Ok(Self {
            base_layers,
            cover: cover.into(),
            categories,
        })
    }

    /// Build from raw command-line values, e.g. `cats = ["1", "2"]`.
    pub fn parse<S: AsRef<str>>(base_layers: &[S], cover: &str, cats: &[S]) -> Result<Self> {
        if cats.len() != 2 {
            return Err(Error::InvalidCategoryCount { found: cats.len() });
        }
        let categories = cats
            .iter()
            .map(|c| {
                let c = c.as_ref().trim();
                c.parse::<i64>().map_err(|_| Error::InvalidCategory { value: c.to_string() })
            })
            .collect::<Result<Vec<_>>>()?;
        let base_layers = base_layers
            .iter()
            .map(|b| b.as_ref().trim().to_string())
            .filter(|b| !b.is_empty())
            .collect();
        Self::new(base_layers, cover.trim(), &categories)
    }

    pub fn base_layers(&self) -> &[String] {
        &self.base_layers
    }

    pub fn cover(&self) -> &str {
        &self.cover
    }

    pub fn categories(&self) -> [i64; 2] {
        self.categories
    }
}

/// One class of the report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassSummary {
    pub category: i64,
    pub means: Vec<f64>,
}

/// Everything computed for one invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeparabilityReport {
    pub cover: String,
    pub base_layers: Vec<String>,
    pub classes: [ClassSummary; 2],
    #[serde(flatten)]
    pub terms: Separability,
}

impl SeparabilityReport {
    pub fn jeffries_matusita(&self) -> f64 {
        self.terms.jeffries_matusita
    }
}

/// Run a full two-class separability computation against `engine`.
///
/// Both classes are collected strictly one after the other, since they
/// share the engine-wide mask. The ambient mask is restored whether
/// collection succeeds or fails.
pub fn run<E: RasterEngine>(engine: &mut E, request: &SeparabilityRequest) -> Result<SeparabilityReport> {
    let [cat_a, cat_b] = request.categories;
    info!(
        cover = %request.cover,
        bands = request.base_layers.len(),
        cat_a,
        cat_b,
        "computing Jeffries-Matusita distance"
    );

    let (class_a, class_b) = {
        let mut guard = MaskGuard::acquire(engine)?;
        let ambient = guard.state().clone();
        let class_a = collect(&mut *guard, &request.cover, cat_a, &request.base_layers, &ambient)?;
        let class_b = collect(&mut *guard, &request.cover, cat_b, &request.base_layers, &ambient)?;
        guard.release()?;
        (class_a, class_b)
    };

    let terms = separability(&class_a, &class_b)?;
    info!(jm = terms.jeffries_matusita, b = terms.bhattacharyya, "done");

    Ok(SeparabilityReport {
        cover: request.cover.clone(),
        base_layers: request.base_layers.clone(),
        classes: [
            ClassSummary {
                category: class_a.category,
                means: class_a.means.iter().copied().collect(),
            },
            ClassSummary {
                category: class_b.category,
                means: class_b.means.iter().copied().collect(),
            },
        ],
        terms,
    })
}

/// Validate raw command-line values, then [`run`]. Category and base-layer
/// errors are returned before `engine` is called at all.
pub fn run_with_args<E: RasterEngine, S: AsRef<str>>(
    engine: &mut E,
    base_layers: &[S],
    cover: &str,
    cats: &[S],
) -> Result<SeparabilityReport> {
    let request = SeparabilityRequest::parse(base_layers, cover, cats)?;
    run(engine, &request)
}
