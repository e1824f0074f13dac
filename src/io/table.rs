//! Raster to per-pixel table conversion
//!
//! Every band becomes one column, flattened row-major and named after its
//! catalogue position. Missing values are imputed with the column mean, and
//! burn severity pixels left without a class are given a uniformly random
//! class. The random policy takes an injected generator so runs can be
//! reproduced from a seed.

use crate::io::raster::{RasterReader, RasterStack};
use crate::types::{Band, BurnError, BurnResult, BurnSeverity};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Table conversion parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TableParams {
    /// Seed of the class-repair generator; `None` draws from entropy
    pub seed: Option<u64>,
    /// Decimals kept before the final integer cast
    pub decimals: i32,
    /// Name of the persisted table next to the raster
    pub file_name: String,
}

impl Default for TableParams {
    fn default() -> Self {
        Self {
            seed: None,
            decimals: 2,
            file_name: "raster.csv".to_string(),
        }
    }
}

impl TableParams {
    pub fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}

/// One named column
#[derive(Debug, Clone, PartialEq)]
pub struct PixelColumn {
    pub name: String,
    pub values: Vec<i64>,
}

/// Per-column repair counts
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepairSummary {
    /// Missing cells filled with the column mean, per column
    pub imputed: BTreeMap<String, usize>,
    /// Burn severity cells reassigned a random class
    pub reassigned_burn_severity: usize,
}

/// One row per raster cell, one column per catalogue band
#[derive(Debug, Clone, PartialEq)]
pub struct PixelTable {
    height: usize,
    width: usize,
    columns: Vec<PixelColumn>,
    repairs: RepairSummary,
}

impl PixelTable {
    /// Raster (height, width) the table was flattened from
    pub fn dims(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    pub fn row_count(&self) -> usize {
        self.height * self.width
    }

    pub fn columns(&self) -> &[PixelColumn] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&[i64]> {
        self.columns.iter().find(|c| c.name == name).map(|c| c.values.as_slice())
    }

    pub fn band(&self, band: Band) -> Option<&[i64]> {
        self.column(band.name())
    }

    pub fn repairs(&self) -> &RepairSummary {
        &self.repairs
    }

    /// Share of rows per distinct value of `name`, in percent rounded to 2
    /// decimals, ascending by value
    pub fn class_distribution(&self, name: &str) -> Option<Vec<(i64, f64)>> {
        let values = self.column(name)?;
        let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
        for &v in values {
            *counts.entry(v).or_default() += 1;
        }
        let total = values.len() as f64;
        Some(
            counts
                .into_iter()
                .map(|(v, n)| (v, round_to(100.0 * n as f64 / total, 2)))
                .collect(),
        )
    }

    /// Persist as a delimited file with a header of column names
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> BurnResult<()> {
        log::info!("Writing {} rows x {} columns to {}", self.row_count(), self.columns.len(), path.as_ref().display());
        let mut writer = csv::Writer::from_path(path.as_ref())?;
        writer.write_record(self.column_names())?;
        for row in 0..self.row_count() {
            writer.write_record(self.columns.iter().map(|c| c.values[row].to_string()))?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Builds a [`PixelTable`] from a decoded raster
pub struct TableConverter {
    params: TableParams,
}

impl TableConverter {
    pub fn new(params: TableParams) -> Self {
        Self { params }
    }

    pub fn standard() -> Self {
        Self::new(TableParams::default())
    }

    pub fn params(&self) -> &TableParams {
        &self.params
    }

    /// Read `path` and convert it with the configured seed
    pub fn convert_file<P: AsRef<Path>>(&self, path: P, catalogue: &[Band]) -> BurnResult<PixelTable> {
        let stack = RasterReader::read_stack(path)?;
        let mut rng = self.params.rng();
        self.to_table(&stack, catalogue, &mut rng)
    }

    /// Flatten `stack` band by band; band `i` becomes column `catalogue[i]`
    pub fn to_table<R: Rng + ?Sized>(
        &self,
        stack: &RasterStack,
        catalogue: &[Band],
        rng: &mut R,
    ) -> BurnResult<PixelTable> {
        let (height, width) = (stack.height(), stack.width());
        if stack.band_count() < catalogue.len() {
            return Err(BurnError::InvalidFormat(format!(
                "Raster has {} bands, the band catalogue needs {}",
                stack.band_count(),
                catalogue.len()
            )));
        }
        if stack.band_count() > catalogue.len() {
            log::warn!(
                "Raster has {} bands; only the first {} are tabulated",
                stack.band_count(),
                catalogue.len()
            );
        }
        log::info!("Converting {}x{} raster to a {}-column table", height, width, catalogue.len());

        // bands are prepared in parallel; the seeded repair stays sequential
        let decimals = self.params.decimals;
        let prepared: Vec<(Vec<f64>, usize)> = catalogue
            .par_iter()
            .enumerate()
            .map(|(index, _)| {
                let mut values: Vec<f64> = stack.band(index).iter().copied().collect();
                let imputed = impute_mean(&mut values);
                for v in values.iter_mut() {
                    *v = round_to(*v, decimals);
                }
                (values, imputed)
            })
            .collect();

        let mut repairs = RepairSummary::default();
        let mut columns = Vec::with_capacity(catalogue.len());

        for (band, (mut values, imputed)) in catalogue.iter().zip(prepared) {
            if imputed > 0 {
                log::debug!("{}: imputed {} missing values with the column mean", band, imputed);
                repairs.imputed.insert(band.name().to_string(), imputed);
            }

            if *band == Band::BurnSeverity {
                // an imputed mean such as 0.67 must not truncate to class 0
                for v in values.iter_mut() {
                    *v = v.round();
                }
                repairs.reassigned_burn_severity = repair_burn_severity(&mut values, rng);
            }

            columns.push(PixelColumn {
                name: band.name().to_string(),
                values: values.into_iter().map(|v| v.trunc() as i64).collect(),
            });
        }

        if repairs.reassigned_burn_severity > 0 {
            log::warn!(
                "{} burn severity pixels had no class and were assigned a random one",
                repairs.reassigned_burn_severity
            );
        }

        Ok(PixelTable { height, width, columns, repairs })
    }
}

/// Replace non-finite values with the mean of the finite ones. A column with
/// no finite value is filled with 0. Returns the number of replaced cells.
pub fn impute_mean(values: &mut [f64]) -> usize {
    let (sum, count) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    let missing = values.len() - count;
    if missing == 0 {
        return 0;
    }

    let fill = if count > 0 {
        sum / count as f64
    } else {
        log::warn!("Column has no valid values; filling with 0");
        0.0
    };
    for v in values.iter_mut().filter(|v| !v.is_finite()) {
        *v = fill;
    }
    missing
}

/// Give every burn severity cell `<= 0` a uniformly random class in 1..=5.
/// Returns the number of reassigned cells.
pub fn repair_burn_severity<R: Rng + ?Sized>(values: &mut [f64], rng: &mut R) -> usize {
    let lowest = BurnSeverity::VegetationGrowth.code();
    let highest = BurnSeverity::High.code();
    let mut reassigned = 0;
    for v in values.iter_mut().filter(|v| **v <= 0.0) {
        *v = rng.gen_range(lowest..=highest) as f64;
        reassigned += 1;
    }
    reassigned
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
