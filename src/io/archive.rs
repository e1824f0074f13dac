//! Imagery archive collaborator
//!
//! The archive owns the scene catalogue, resamples scenes and static layers
//! onto a requested grid, and signs download URLs for finished images.

use crate::core::assemble::MultiBandImage;
use crate::types::{BoundingBox, BurnResult, DateWindow, NamedBand, PixelBand, QueryGeometry, RasterGrid};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Landsat 8 Collection 2 Tier 1 surface reflectance
pub const LANDSAT8_C2_L2: &str = "LANDSAT/LC08/C02/T1_L2";

/// Scene catalogue entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneMetadata {
    pub id: String,
    pub acquired: NaiveDate,
    /// Cloud cover in percent (0-100)
    pub cloud_cover: f64,
    pub footprint: BoundingBox,
}

/// Scene search against one collection
#[derive(Debug, Clone, Copy)]
pub struct SceneQuery<'a> {
    pub collection: &'a str,
    pub window: DateWindow,
    pub geometry: &'a QueryGeometry,
}

/// Single band of a static (non time-series) asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticLayer {
    pub asset: String,
    pub band: String,
    /// Image inside an image collection asset, e.g. a release year
    pub system_index: Option<String>,
}

impl StaticLayer {
    pub fn new(asset: &str, band: &str, system_index: Option<&str>) -> Self {
        Self {
            asset: asset.to_string(),
            band: band.to_string(),
            system_index: system_index.map(str::to_string),
        }
    }

    /// NASADEM elevation in meters
    pub fn elevation() -> Self {
        Self::new("NASA/NASADEM_HGT/001", "elevation", None)
    }

    /// Band of an NLCD release
    pub fn nlcd(year: &str, band: &str) -> Self {
        Self::new("USGS/NLCD_RELEASES/2016_REL", band, Some(year))
    }
}

impl std::fmt::Display for StaticLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.system_index {
            Some(index) => write!(f, "{}/{}:{}", self.asset, index, self.band),
            None => write!(f, "{}:{}", self.asset, self.band),
        }
    }
}

/// Parameters of a GeoTIFF download request
#[derive(Debug, Clone)]
pub struct DownloadRequest<'a> {
    /// Base name of the raster inside the returned archive
    pub name: &'a str,
    /// Linear ground resolution in meters
    pub scale: f64,
    pub region: &'a QueryGeometry,
    pub crs: Option<&'a str>,
    pub file_per_band: bool,
}

/// Remote imagery archive
pub trait ImageryArchive {
    /// Scenes of `query.collection` overlapping the query window and geometry.
    /// Implementations may return a superset; callers filter again.
    fn find_scenes(&self, query: &SceneQuery<'_>) -> BurnResult<Vec<SceneMetadata>>;

    /// Bands of one scene resampled onto `grid`
    fn load_scene(&self, scene: &SceneMetadata, grid: &RasterGrid) -> BurnResult<Vec<NamedBand>>;

    /// Static layer resampled onto `grid`
    fn load_layer(&self, layer: &StaticLayer, grid: &RasterGrid) -> BurnResult<PixelBand>;

    /// Band enumeration as reported by the service
    fn band_names(&self, image: &MultiBandImage) -> BurnResult<Vec<String>> {
        image.band_names()
    }

    /// Signed, short-lived URL of a zipped GeoTIFF rendering of `image`
    fn download_url(&self, image: &MultiBandImage, request: &DownloadRequest<'_>) -> BurnResult<String>;
}
