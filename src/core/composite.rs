use crate::core::windows::FireWindows;
use crate::io::archive::{ImageryArchive, SceneMetadata, SceneQuery, LANDSAT8_C2_L2};
use crate::types::{BurnError, BurnResult, DateWindow, NamedBand, PixelBand, QueryGeometry, RasterGrid};
use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};

/// Scene selection and compositing parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositeParams {
    /// Scene collection queried for both composites
    pub collection: String,
    /// Maximum scene cloud cover (%) for the pre-fire baseline
    pub pre_fire_cloud_ceiling: f64,
    /// Maximum scene cloud cover (%) after the fire; looser since scenes are scarcer
    pub post_fire_cloud_ceiling: f64,
    /// Analysis grid cell size in degrees (~30 m)
    pub pixel_size: f64,
}

impl Default for CompositeParams {
    fn default() -> Self {
        Self {
            collection: LANDSAT8_C2_L2.to_string(),
            pre_fire_cloud_ceiling: 10.0,
            post_fire_cloud_ceiling: 15.0,
            pixel_size: 0.00027,
        }
    }
}

/// Mean composite of every scene matching one window
#[derive(Debug, Clone)]
pub struct CompositeImage {
    pub label: String,
    pub collection: String,
    pub window: DateWindow,
    pub cloud_ceiling: f64,
    pub grid: RasterGrid,
    pub scene_ids: Vec<String>,
    pub bands: Vec<NamedBand>,
}

impl CompositeImage {
    /// True when no scene matched, i.e. the composite has no valid pixels
    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    pub fn scene_count(&self) -> usize {
        self.scene_ids.len()
    }

    pub fn band(&self, name: &str) -> Option<&PixelBand> {
        self.bands.iter().find(|b| b.name == name).map(|b| &b.data)
    }

    pub fn band_names(&self) -> Vec<&str> {
        self.bands.iter().map(|b| b.name.as_str()).collect()
    }
}

/// Pre- and post-fire composites on a shared grid
#[derive(Debug, Clone)]
pub struct FireComposites {
    pub pre: CompositeImage,
    pub post: CompositeImage,
}

/// Builds clipped mean composites from archive scenes
pub struct CompositeBuilder<'a, A: ImageryArchive + ?Sized> {
    archive: &'a A,
    params: CompositeParams,
}

impl<'a, A: ImageryArchive + ?Sized> CompositeBuilder<'a, A> {
    pub fn new(archive: &'a A, params: CompositeParams) -> Self {
        Self { archive, params }
    }

    /// Builder with the default Landsat 8 parameters
    pub fn standard(archive: &'a A) -> Self {
        Self::new(archive, CompositeParams::default())
    }

    pub fn params(&self) -> &CompositeParams {
        &self.params
    }

    /// Analysis grid covering the query geometry
    pub fn grid_for(&self, geometry: &QueryGeometry) -> BurnResult<RasterGrid> {
        RasterGrid::covering(&geometry.bounding_box()?, self.params.pixel_size)
    }

    /// Build the pre-fire baseline and the post-fire composite
    pub fn build_fire_composites(
        &self,
        geometry: &QueryGeometry,
        windows: &FireWindows,
    ) -> BurnResult<FireComposites> {
        let grid = self.grid_for(geometry)?;
        let pre = self.build(
            "pre-fire",
            geometry,
            &grid,
            windows.pre,
            self.params.pre_fire_cloud_ceiling,
        )?;
        let post = self.build(
            "post-fire",
            geometry,
            &grid,
            windows.post.query_window(),
            self.params.post_fire_cloud_ceiling,
        )?;
        Ok(FireComposites { pre, post })
    }

    /// Query, filter, mean-reduce and clip one composite.
    ///
    /// Zero matching scenes yields an empty composite, not an error.
    pub fn build(
        &self,
        label: &str,
        geometry: &QueryGeometry,
        grid: &RasterGrid,
        window: DateWindow,
        cloud_ceiling: f64,
    ) -> BurnResult<CompositeImage> {
        log::info!(
            "Building {} composite from {} over {} (cloud cover <= {}%)",
            label,
            self.params.collection,
            window,
            cloud_ceiling
        );

        let query = SceneQuery {
            collection: &self.params.collection,
            window,
            geometry,
        };
        let candidates = self.archive.find_scenes(&query)?;
        let scenes = select_scenes(&candidates, window, geometry, cloud_ceiling);
        log::info!(
            "{} composite: {} of {} candidate scenes pass the filters",
            label,
            scenes.len(),
            candidates.len()
        );

        let mut loaded = Vec::with_capacity(scenes.len());
        for scene in &scenes {
            log::debug!("Loading scene {} ({}, {:.1}% cloud)", scene.id, scene.acquired, scene.cloud_cover);
            loaded.push(self.archive.load_scene(scene, grid)?);
        }

        let mut bands = mean_reduce(&loaded, grid)?;
        if bands.is_empty() {
            log::warn!("{} composite has no scenes for {}", label, window);
        } else {
            clip_to_geometry(&mut bands, geometry, grid);
        }

        Ok(CompositeImage {
            label: label.to_string(),
            collection: self.params.collection.clone(),
            window,
            cloud_ceiling,
            grid: *grid,
            scene_ids: scenes.iter().map(|s| s.id.clone()).collect(),
            bands,
        })
    }
}

/// Scenes acquired inside `window`, overlapping `geometry` and at or below
/// the cloud-cover ceiling, in acquisition order
pub fn select_scenes(
    candidates: &[SceneMetadata],
    window: DateWindow,
    geometry: &QueryGeometry,
    cloud_ceiling: f64,
) -> Vec<SceneMetadata> {
    let mut selected: Vec<SceneMetadata> = candidates
        .iter()
        .filter(|s| window.contains(s.acquired))
        .filter(|s| geometry.intersects_bbox(&s.footprint))
        .filter(|s| s.cloud_cover <= cloud_ceiling)
        .cloned()
        .collect();
    selected.sort_by_key(|s| s.acquired);
    selected
}

/// Per-pixel mean across scenes, ignoring non-finite samples.
///
/// Bands are matched by name and keep the order of first appearance.
/// A pixel with no finite sample stays NaN.
pub fn mean_reduce(scenes: &[Vec<NamedBand>], grid: &RasterGrid) -> BurnResult<Vec<NamedBand>> {
    let shape = grid.shape();
    let mut names: Vec<&str> = Vec::new();
    for scene in scenes {
        for band in scene {
            if band.data.dim() != shape {
                return Err(BurnError::Processing(format!(
                    "Band {} has shape {:?}, expected {:?}",
                    band.name,
                    band.data.dim(),
                    shape
                )));
            }
            if !names.contains(&band.name.as_str()) {
                names.push(&band.name);
            }
        }
    }

    let mut reduced = Vec::with_capacity(names.len());
    for name in names {
        let mut sum = Array2::<f64>::zeros(shape);
        let mut count = Array2::<u32>::zeros(shape);
        for band in scenes.iter().flat_map(|s| s.iter()).filter(|b| b.name == name) {
            Zip::from(&mut sum).and(&mut count).and(&band.data).for_each(|s, c, &v| {
                if v.is_finite() {
                    *s += v;
                    *c += 1;
                }
            });
        }
        let mean = Zip::from(&sum)
            .and(&count)
            .map_collect(|&s, &c| if c > 0 { s / c as f64 } else { f64::NAN });
        reduced.push(NamedBand::new(name, mean));
    }
    Ok(reduced)
}

/// Mask every cell whose center falls outside `geometry`
pub fn clip_to_geometry(bands: &mut [NamedBand], geometry: &QueryGeometry, grid: &RasterGrid) {
    let mask = geometry.mask(grid);
    for band in bands.iter_mut() {
        clip_band(&mut band.data, &mask);
    }
}

pub(crate) fn clip_band(band: &mut PixelBand, mask: &Array2<bool>) {
    Zip::from(band).and(mask).for_each(|v, &inside| {
        if !inside {
            *v = f64::NAN;
        }
    });
}
