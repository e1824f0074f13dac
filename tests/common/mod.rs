//! In-memory imagery archive and fetcher used by the integration tests

#![allow(dead_code)]

use burnscar::core::assemble::MultiBandImage;
use burnscar::io::archive::{DownloadRequest, ImageryArchive, SceneMetadata, SceneQuery, StaticLayer};
use burnscar::io::export::{ArtifactFetcher, AttemptFailure};
use burnscar::io::raster::{RasterStack, RasterWriter};
use burnscar::types::{Band, BoundingBox, BurnError, BurnResult, NamedBand, PixelBand, QueryGeometry, RasterGrid};
use chrono::NaiveDate;
use geo::polygon;
use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::sync::{Arc, Mutex};

pub type ServedArtifacts = Arc<Mutex<HashMap<String, Vec<u8>>>>;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

/// Right triangle over a 0.01 degree square near Paradise, CA
pub fn fire_perimeter() -> QueryGeometry {
    QueryGeometry::from_polygon(polygon![
        (x: -121.60, y: 39.75),
        (x: -121.59, y: 39.75),
        (x: -121.60, y: 39.76),
        (x: -121.60, y: 39.75),
    ])
}

/// How the archive answers a download request at one scale
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rung {
    /// The service refuses to sign a URL (request too large)
    Refuse,
    /// The URL serves bytes that are not a ZIP archive
    Corrupt,
    /// The URL is signed but nothing is served
    Unreachable,
    Serve,
}

/// Scene with constant reflectance per band
#[derive(Debug, Clone)]
pub struct FakeScene {
    pub metadata: SceneMetadata,
    pub reflectance: [f64; 7],
}

pub struct FakeArchive {
    pub scenes: Vec<FakeScene>,
    pub layers: HashMap<String, f64>,
    pub rungs: HashMap<u64, Rung>,
    pub served: ServedArtifacts,
    pub requested_scales: Mutex<Vec<f64>>,
    pub staging: tempfile::TempDir,
}

impl FakeArchive {
    pub fn new() -> Self {
        let layers = [("elevation", 1520.0), ("percent_tree_cover", 63.0), ("landcover", 42.0)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        Self {
            scenes: Vec::new(),
            layers,
            rungs: HashMap::new(),
            served: Arc::new(Mutex::new(HashMap::new())),
            requested_scales: Mutex::new(Vec::new()),
            staging: tempfile::tempdir().unwrap(),
        }
    }

    pub fn with_scene(mut self, id: &str, acquired: NaiveDate, cloud_cover: f64, reflectance: [f64; 7]) -> Self {
        self.scenes.push(FakeScene {
            metadata: SceneMetadata {
                id: id.to_string(),
                acquired,
                cloud_cover,
                footprint: BoundingBox { min_lon: -122.5, max_lon: -120.5, min_lat: 39.0, max_lat: 40.5 },
            },
            reflectance,
        });
        self
    }

    pub fn with_rung(mut self, scale: f64, rung: Rung) -> Self {
        self.rungs.insert(scale.to_bits(), rung);
        self
    }

    pub fn fetcher(&self) -> FakeFetcher {
        FakeFetcher { served: Arc::clone(&self.served) }
    }

    pub fn requested_scales(&self) -> Vec<f64> {
        self.requested_scales.lock().unwrap().clone()
    }

    fn zipped_geotiff(&self, image: &MultiBandImage, name: &str) -> BurnResult<Vec<u8>> {
        let path = self.staging.path().join(format!("{}.tif", name));
        let mut stack = RasterStack::new(image.to_stack());
        stack.geo_transform = Some(image.grid.transform);
        RasterWriter::write_geotiff(&path, &stack)?;
        let tiff = std::fs::read(&path)?;

        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file(format!("{}.tif", name), zip::write::FileOptions::default())
            .map_err(|e| BurnError::Archive(e.to_string()))?;
        writer.write_all(&tiff)?;
        let cursor = writer.finish().map_err(|e| BurnError::Archive(e.to_string()))?;
        Ok(cursor.into_inner())
    }
}

impl ImageryArchive for FakeArchive {
    fn find_scenes(&self, _query: &SceneQuery<'_>) -> BurnResult<Vec<SceneMetadata>> {
        Ok(self.scenes.iter().map(|s| s.metadata.clone()).collect())
    }

    fn load_scene(&self, scene: &SceneMetadata, grid: &RasterGrid) -> BurnResult<Vec<NamedBand>> {
        let fake = self
            .scenes
            .iter()
            .find(|s| s.metadata.id == scene.id)
            .ok_or_else(|| BurnError::Archive(format!("Unknown scene {}", scene.id)))?;
        let mut bands: Vec<NamedBand> = Band::REFLECTANCE
            .iter()
            .zip(fake.reflectance)
            .map(|(band, value)| NamedBand::new(band.name(), grid.filled(value)))
            .collect();
        bands.push(NamedBand::new("QA_PIXEL", grid.filled(21824.0)));
        Ok(bands)
    }

    fn load_layer(&self, layer: &StaticLayer, grid: &RasterGrid) -> BurnResult<PixelBand> {
        self.layers
            .get(&layer.band)
            .map(|&value| grid.filled(value))
            .ok_or_else(|| BurnError::Archive(format!("Unknown layer {}", layer)))
    }

    fn download_url(&self, image: &MultiBandImage, request: &DownloadRequest<'_>) -> BurnResult<String> {
        self.requested_scales.lock().unwrap().push(request.scale);
        let url = format!("fake://download/{}/{}", request.name, request.scale);
        match self.rungs.get(&request.scale.to_bits()).copied().unwrap_or(Rung::Serve) {
            Rung::Refuse => {
                return Err(BurnError::Archive("Total request size must be less than or equal to 50331648 bytes".to_string()))
            }
            Rung::Corrupt => {
                self.served.lock().unwrap().insert(url.clone(), b"<html>quota exceeded</html>".to_vec());
            }
            Rung::Unreachable => {}
            Rung::Serve => {
                let bytes = self.zipped_geotiff(image, request.name)?;
                self.served.lock().unwrap().insert(url.clone(), bytes);
            }
        }
        Ok(url)
    }
}

pub struct FakeFetcher {
    served: ServedArtifacts,
}

impl ArtifactFetcher for FakeFetcher {
    fn fetch(&self, url: &str, sink: &mut dyn Write) -> Result<u64, AttemptFailure> {
        let served = self.served.lock().unwrap();
        let bytes = served
            .get(url)
            .ok_or_else(|| AttemptFailure::TransientFetchFailure(format!("HTTP 404 for {}", url)))?;
        sink.write_all(bytes)
            .map_err(|e| AttemptFailure::TransientFetchFailure(e.to_string()))?;
        Ok(bytes.len() as u64)
    }
}

/// Unburned-looking baseline: NBR 0.6
pub const PRE_FIRE_REFLECTANCE: [f64; 7] = [0.02, 0.03, 0.05, 0.04, 0.40, 0.20, 0.10];
/// Burned: NBR -0.2, so dNBR 800
pub const POST_FIRE_REFLECTANCE: [f64; 7] = [0.03, 0.05, 0.07, 0.08, 0.20, 0.28, 0.30];
