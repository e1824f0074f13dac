use crate::core::composite::CompositeImage;
use crate::core::indices::DerivedLayers;
use crate::types::{Band, BurnError, BurnResult, NamedBand, PixelBand, RasterGrid};
use ndarray::{Array3, Axis};
use regex::Regex;

/// Band selector for the post-fire surface reflectance bands
pub const REFLECTANCE_PATTERN: &str = "SR_B.";

/// Multi-band image on a single grid, band order significant
#[derive(Debug, Clone)]
pub struct MultiBandImage {
    pub grid: RasterGrid,
    bands: Vec<NamedBand>,
}

impl MultiBandImage {
    pub fn new(grid: RasterGrid, bands: Vec<NamedBand>) -> BurnResult<Self> {
        for band in &bands {
            if band.data.dim() != grid.shape() {
                return Err(BurnError::Processing(format!(
                    "Band {} has shape {:?}, grid is {:?}",
                    band.name,
                    band.data.dim(),
                    grid.shape()
                )));
            }
        }
        Ok(Self { grid, bands })
    }

    /// Image built when a composite had no scenes
    pub fn empty(grid: RasterGrid) -> Self {
        Self { grid, bands: Vec::new() }
    }

    /// Band names in physical order. An image without bands cannot be
    /// enumerated and reports an error.
    pub fn band_names(&self) -> BurnResult<Vec<String>> {
        if self.bands.is_empty() {
            return Err(BurnError::Archive(
                "Image has no bands; no scenes matched the query".to_string(),
            ));
        }
        Ok(self.bands.iter().map(|b| b.name.clone()).collect())
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    pub fn bands(&self) -> &[NamedBand] {
        &self.bands
    }

    pub fn band(&self, name: &str) -> Option<&PixelBand> {
        self.bands.iter().find(|b| b.name == name).map(|b| &b.data)
    }

    /// (band, row, col) cube in band order
    pub fn to_stack(&self) -> Array3<f64> {
        let (rows, cols) = self.grid.shape();
        let mut stack = Array3::<f64>::from_elem((self.bands.len(), rows, cols), f64::NAN);
        for (mut slot, band) in stack.axis_iter_mut(Axis(0)).zip(&self.bands) {
            slot.assign(&band.data);
        }
        stack
    }
}

/// Bands of `composite` whose whole name matches `pattern`, in composite order
pub fn select_bands(composite: &CompositeImage, pattern: &str) -> BurnResult<Vec<NamedBand>> {
    let regex = Regex::new(&format!("^(?:{})$", pattern))
        .map_err(|e| BurnError::InvalidFormat(format!("Invalid band pattern {}: {}", pattern, e)))?;
    Ok(composite
        .bands
        .iter()
        .filter(|b| regex.is_match(&b.name))
        .cloned()
        .collect())
}

/// Merge the post-fire reflectance bands and the derived layers into the
/// 14-band catalogue image.
pub fn assemble(post: &CompositeImage, derived: &DerivedLayers) -> BurnResult<MultiBandImage> {
    let mut bands = select_bands(post, REFLECTANCE_PATTERN)?;
    for (band, data) in derived.in_catalogue_order() {
        bands.push(NamedBand::new(band.name(), data.clone()));
    }

    let names: Vec<&str> = bands.iter().map(|b| b.name.as_str()).collect();
    if names != Band::catalogue_names() {
        return Err(BurnError::Processing(format!(
            "Assembled bands {:?} do not match the band catalogue {:?}",
            names,
            Band::catalogue_names()
        )));
    }

    log::info!(
        "Assembled {}-band image on a {}x{} grid",
        bands.len(),
        post.grid.height,
        post.grid.width
    );
    MultiBandImage::new(post.grid, bands)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoundingBox, DateWindow};
    use chrono::NaiveDate;

    fn grid() -> RasterGrid {
        RasterGrid::covering(
            &BoundingBox { min_lon: 0.0, max_lon: 2.0, min_lat: 0.0, max_lat: 1.0 },
            1.0,
        )
        .unwrap()
    }

    fn post_composite(extra: &[&str]) -> CompositeImage {
        let g = grid();
        let mut bands: Vec<NamedBand> = Band::REFLECTANCE
            .iter()
            .enumerate()
            .map(|(i, b)| NamedBand::new(b.name(), g.filled(i as f64)))
            .collect();
        for name in extra {
            bands.push(NamedBand::new(*name, g.filled(-1.0)));
        }
        let day = NaiveDate::from_ymd_opt(2020, 9, 1).unwrap();
        CompositeImage {
            label: "post-fire".to_string(),
            collection: "test".to_string(),
            window: DateWindow::new(day, day),
            cloud_ceiling: 15.0,
            grid: g,
            scene_ids: vec!["a".to_string()],
            bands,
        }
    }

    fn derived() -> DerivedLayers {
        let g = grid();
        DerivedLayers {
            burn_severity: g.filled(3.0),
            dnbr: g.filled(150.0),
            ndvi: g.filled(400.0),
            elevation: g.filled(1200.0),
            percent_tree_cover: g.filled(55.0),
            land_cover: g.filled(3.0),
            land_cover_viz: g.filled(4.0),
        }
    }

    #[test]
    fn test_assembled_order_matches_catalogue() {
        let image = assemble(&post_composite(&["QA_PIXEL", "SR_B10", "ST_B10"]), &derived()).unwrap();
        let names = image.band_names().unwrap();
        assert_eq!(names, Band::catalogue_names());

        let stack = image.to_stack();
        assert_eq!(stack.dim(), (14, 1, 2));
        assert_eq!(stack[[Band::SrB4.index(), 0, 1]], 3.0);
        assert_eq!(stack[[Band::BurnSeverity.index(), 0, 0]], 3.0);
        assert_eq!(stack[[Band::LandCoverViz.index(), 0, 0]], 4.0);
    }

    #[test]
    fn test_missing_reflectance_band_is_rejected() {
        let mut post = post_composite(&[]);
        post.bands.retain(|b| b.name != "SR_B6");
        assert!(assemble(&post, &derived()).is_err());
    }

    #[test]
    fn test_empty_image_cannot_enumerate_bands() {
        let image = MultiBandImage::empty(grid());
        assert!(image.band_names().is_err());
        assert_eq!(image.band_count(), 0);
    }
}
