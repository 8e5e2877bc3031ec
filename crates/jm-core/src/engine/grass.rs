//! GRASS GIS engine: runs GRASS modules as subprocesses inside an existing
//! session (GISBASE/GISRC already set up by the caller) and parses their
//! shell-style output.
use std::process::{Command, Output};

use tracing::debug;

use super::{RasterEngine, MASK_LAYER};
use crate::error::{Error, Result};
use crate::stats::CovarianceMatrix;

#[derive(Debug, Clone)]
pub struct GrassEngine {
    /// Prefix for scratch layers, unique per process.
    scratch_prefix: String,
}

impl Default for GrassEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl GrassEngine {
    pub fn new() -> Self {
        Self {
            scratch_prefix: format!("jm_scratch_{}", std::process::id()),
        }
    }

    fn spawn(&self, module: &str, args: &[String]) -> Result<Output> {
        debug!(module, args = %args.join(" "), "running GRASS module");
        Ok(Command::new(module).args(args).output()?)
    }

    /// Run a module, failing on non-zero exit, and return its stdout.
    fn run(&self, module: &str, args: &[String]) -> Result<String> {
        let output = self.spawn(module, args)?;
        if !output.status.success() {
            return Err(Error::Engine {
                command: command_line(module, args),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn command_line(module: &str, args: &[String]) -> String {
    format!("{module} {}", args.join(" "))
}

impl RasterEngine for GrassEngine {
    fn copy_layer(&mut self, src: &str, dst: &str) -> Result<()> {
        self.run(
            "g.copy",
            &[format!("raster={src},{dst}"), "--overwrite".into(), "--quiet".into()],
        )?;
        Ok(())
    }

    fn remove_layer(&mut self, name: &str) -> Result<()> {
        self.run(
            "g.remove",
            &["-f".into(), "type=raster".into(), format!("name={name}"), "--quiet".into()],
        )?;
        Ok(())
    }

    fn find_layer(&self, name: &str) -> Result<bool> {
        // g.findfile exits 1 when nothing is found, so the status is not an error here.
        let output = self.spawn("g.findfile", &["element=cell".into(), format!("file={name}")])?;
        Ok(parse_findfile(&String::from_utf8_lossy(&output.stdout)))
    }

    fn apply_category_mask(&mut self, cover: &str, category: i64) -> Result<()> {
        // r.mapcalc reads `cover` through the active mask, so the scratch
        // layer already holds the intersection with it.
        let scratch = format!("{}_catmask", self.scratch_prefix);
        self.run(
            "r.mapcalc",
            &[
                format!("expression={scratch} = if({cover} == {category}, 1, null())"),
                "--overwrite".into(),
                "--quiet".into(),
            ],
        )?;
        self.remove_layer(MASK_LAYER)?;
        self.run(
            "g.rename",
            &[format!("raster={scratch},{MASK_LAYER}"), "--quiet".into()],
        )?;
        Ok(())
    }

    fn query_mean(&self, layer: &str) -> Result<Option<f64>> {
        let args = ["-g".to_string(), format!("map={layer}")];
        let stdout = self.run("r.univar", &args)?;
        parse_univar_mean(&stdout, &command_line("r.univar", &args))
    }

    fn query_covariance(&self, layers: &[String]) -> Result<CovarianceMatrix> {
        let args = [format!("map={}", layers.join(",")), "--quiet".into()];
        let stdout = self.run("r.covar", &args)?;
        parse_covar(&stdout, layers.len(), &command_line("r.covar", &args))
    }
}

/// `g.findfile` prints `name='...'`; an empty name means not found.
fn parse_findfile(stdout: &str) -> bool {
    stdout
        .lines()
        .filter_map(|line| line.trim().strip_prefix("name="))
        .any(|v| !v.trim_matches(|c| c == '\'' || c == '"').is_empty())
}

/// Extract `mean` from `r.univar -g`. No output, `n=0` or a non-finite mean
/// all mean the mask selected no cells.
fn parse_univar_mean(stdout: &str, command: &str) -> Result<Option<f64>> {
    let mut n: Option<u64> = None;
    let mut mean: Option<f64> = None;
    for line in stdout.lines() {
        let Some((key, value)) = line.trim().split_once('=') else { continue };
        let parse_err = || Error::EngineOutput {
            command: command.to_string(),
            line: line.to_string(),
        };
        match key {
            "n" => n = Some(value.trim().parse().map_err(|_| parse_err())?),
            "mean" => mean = Some(value.trim().parse().map_err(|_| parse_err())?),
            _ => {}
        }
    }
    if n == Some(0) {
        return Ok(None);
    }
    Ok(mean.filter(|m| m.is_finite()))
}

/// Parse `r.covar` output: an `N = <count>` header followed by one row of
/// whitespace-separated values per layer.
fn parse_covar(stdout: &str, bands: usize, command: &str) -> Result<CovarianceMatrix> {
    let mut cov = CovarianceMatrix::zeros(bands, bands);
    let mut row = 0;
    for line in stdout.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('N') {
            continue;
        }
        let parse_err = || Error::EngineOutput {
            command: command.to_string(),
            line: line.to_string(),
        };
        let values: Vec<f64> = line
            .split_whitespace()
            .map(|v| v.parse::<f64>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|_| parse_err())?;
        if row >= bands || values.len() != bands {
            return Err(parse_err());
        }
        for (col, v) in values.into_iter().enumerate() {
            cov[(row, col)] = v;
        }
        row += 1;
    }
    if row != bands {
        return Err(Error::DimensionMismatch {
            what: "r.covar rows",
            expected: bands,
            found: row,
        });
    }
    Ok(cov)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn findfile_found_and_missing() {
        let found = "name='MASK'\nmapset='PERMANENT'\nfullname='MASK@PERMANENT'\nfile='/gis/PERMANENT/cell/MASK'\n";
        assert!(parse_findfile(found));
        let missing = "name=\nmapset=\nfullname=\nfile=\n";
        assert!(!parse_findfile(missing));
        assert!(!parse_findfile("name=''\n"));
        assert!(!parse_findfile(""));
    }

    #[test]
    fn univar_mean_is_extracted() {
        let out = "n=1200\nnull_cells=34\ncells=1234\nmin=1\nmax=250\nrange=249\nmean=101.25\nmean_of_abs=101.25\nstddev=12.5\n";
        assert_eq!(parse_univar_mean(out, "r.univar").unwrap(), Some(101.25));
    }

    #[test]
    fn univar_without_cells_is_empty() {
        assert_eq!(parse_univar_mean("", "r.univar").unwrap(), None);
        assert_eq!(parse_univar_mean("n=0\nnull_cells=100\ncells=100\n", "r.univar").unwrap(), None);
        assert_eq!(parse_univar_mean("n=0\nmean=nan\n", "r.univar").unwrap(), None);
    }

    #[test]
    fn univar_garbage_mean_is_an_output_error() {
        let err = parse_univar_mean("n=4\nmean=abc\n", "r.univar map=x").unwrap_err();
        match err {
            Error::EngineOutput { command, line } => {
                assert_eq!(command, "r.univar map=x");
                assert_eq!(line, "mean=abc");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn covar_matrix_is_parsed_in_order() {
        let out = "N = 512\n4.000000 1.500000 -0.250000 \n1.500000 9.000000 0.000000 \n-0.250000 0.000000 2.000000 \n";
        let cov = parse_covar(out, 3, "r.covar").unwrap();
        assert_eq!(cov[(0, 0)], 4.0);
        assert_eq!(cov[(0, 1)], 1.5);
        assert_eq!(cov[(2, 0)], -0.25);
        assert_eq!(cov[(1, 1)], 9.0);
        assert_eq!(cov[(2, 2)], 2.0);
    }

    #[test]
    fn covar_with_missing_rows_is_rejected() {
        let err = parse_covar("N = 3\n1.0 0.0\n", 2, "r.covar").unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 2, found: 1, .. }));
    }

    #[test]
    fn covar_with_ragged_row_is_rejected() {
        let err = parse_covar("N = 3\n1.0 0.0 7.0\n0.0 1.0\n", 2, "r.covar").unwrap_err();
        assert!(matches!(err, Error::EngineOutput { .. }));
    }

    #[test]
    fn scratch_names_are_process_unique() {
        let engine = GrassEngine::new();
        assert!(engine.scratch_prefix.ends_with(&std::process::id().to_string()));
    }
}
