//! Spectral indices and threshold classification
//!
//! Burn severity is graded from the pre/post-fire difference of the
//! Normalized Burn Ratio (Key & Benson dNBR thresholds, scaled by 1000).
//! Land cover is simplified from NLCD class codes into six groups.

use crate::core::composite::{clip_band, CompositeImage};
use crate::io::archive::{ImageryArchive, StaticLayer};
use crate::types::{Band, BurnError, BurnResult, PixelBand, QueryGeometry};
use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};

/// Scale applied to dNBR and NDVI
pub const INDEX_SCALE: f64 = 1000.0;

/// Comparison applied by a threshold rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// value > threshold
    Above,
    /// value <= threshold
    AtMost,
}

/// One branch of an ordered classification
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdRule {
    pub comparison: Comparison,
    pub threshold: f64,
    pub class: i64,
}

impl ThresholdRule {
    pub const fn above(threshold: f64, class: i64) -> Self {
        Self { comparison: Comparison::Above, threshold, class }
    }

    pub const fn at_most(threshold: f64, class: i64) -> Self {
        Self { comparison: Comparison::AtMost, threshold, class }
    }

    /// NaN never matches
    pub fn matches(&self, value: f64) -> bool {
        match self.comparison {
            Comparison::Above => value > self.threshold,
            Comparison::AtMost => value <= self.threshold,
        }
    }
}

/// Ordered, first-match-wins threshold classification
#[derive(Debug, Clone)]
pub struct ThresholdClassifier {
    rules: Vec<ThresholdRule>,
    fallback: i64,
}

impl ThresholdClassifier {
    pub fn new(rules: Vec<ThresholdRule>, fallback: i64) -> Self {
        Self { rules, fallback }
    }

    /// dNBR -> burn severity class (1..=5). The fallback 0 is only reached by
    /// no-data (NaN) pixels and marks them for repair downstream.
    pub fn burn_severity() -> Self {
        Self::new(
            vec![
                ThresholdRule::above(425.0, 5),
                ThresholdRule::above(225.0, 4),
                ThresholdRule::above(100.0, 3),
                ThresholdRule::above(-60.0, 2),
                ThresholdRule::at_most(-60.0, 1),
            ],
            0,
        )
    }

    /// NLCD class code -> simplified land cover (1..=6)
    pub fn land_cover() -> Self {
        Self::new(
            vec![
                ThresholdRule::above(90.0, 1), // wetlands
                ThresholdRule::above(80.0, 6), // planted/cultivated
                ThresholdRule::above(70.0, 5), // herbaceous
                ThresholdRule::above(50.0, 4), // shrubland
                ThresholdRule::above(40.0, 3), // forest
                ThresholdRule::above(30.0, 1), // barren
                ThresholdRule::above(20.0, 2), // developed
                ThresholdRule::above(10.0, 1), // water, ice and snow
            ],
            0,
        )
    }

    pub fn rules(&self) -> &[ThresholdRule] {
        &self.rules
    }

    pub fn fallback(&self) -> i64 {
        self.fallback
    }

    pub fn classify_value(&self, value: f64) -> i64 {
        self.rules
            .iter()
            .find(|rule| rule.matches(value))
            .map(|rule| rule.class)
            .unwrap_or(self.fallback)
    }

    /// Classify a whole band, one vectorized comparison pass per rule
    pub fn classify(&self, band: &PixelBand) -> PixelBand {
        let mut classes = Array2::from_elem(band.dim(), self.fallback as f64);
        let mut pending = Array2::from_elem(band.dim(), true);

        for rule in &self.rules {
            let zip = Zip::from(&mut classes).and(&mut pending).and(band);
            let assign = |class: &mut f64, open: &mut bool, &value: &f64| {
                if *open && rule.matches(value) {
                    *class = rule.class as f64;
                    *open = false;
                }
            };
            #[cfg(feature = "parallel")]
            zip.par_for_each(assign);
            #[cfg(not(feature = "parallel"))]
            zip.for_each(assign);
        }
        classes
    }
}

/// Normalized difference `(a - b) / (a + b)`; NaN where either input is
/// missing or the sum is zero
pub fn normalized_difference(a: &PixelBand, b: &PixelBand) -> BurnResult<PixelBand> {
    if a.dim() != b.dim() {
        return Err(BurnError::Processing(format!(
            "Band shapes differ: {:?} vs {:?}",
            a.dim(),
            b.dim()
        )));
    }

    let ratio = |&x: &f64, &y: &f64| {
        let sum = x + y;
        if !x.is_finite() || !y.is_finite() || sum == 0.0 {
            f64::NAN
        } else {
            (x - y) / sum
        }
    };

    #[cfg(feature = "parallel")]
    let out = Zip::from(a).and(b).par_map_collect(ratio);
    #[cfg(not(feature = "parallel"))]
    let out = Zip::from(a).and(b).map_collect(ratio);

    Ok(out)
}

fn composite_band<'c>(composite: &'c CompositeImage, band: Band) -> BurnResult<&'c PixelBand> {
    composite.band(band.name()).ok_or_else(|| {
        BurnError::Processing(format!(
            "{} composite has no {} band (bands: {:?})",
            composite.label,
            band.name(),
            composite.band_names()
        ))
    })
}

/// Normalized Burn Ratio `(B5 - B7) / (B5 + B7)` (NIR vs SWIR2)
pub fn nbr(composite: &CompositeImage) -> BurnResult<PixelBand> {
    normalized_difference(composite_band(composite, Band::SrB5)?, composite_band(composite, Band::SrB7)?)
}

/// `(NBR_pre - NBR_post) * 1000`
pub fn dnbr(pre: &CompositeImage, post: &CompositeImage) -> BurnResult<PixelBand> {
    let pre_nbr = nbr(pre)?;
    let post_nbr = nbr(post)?;
    if pre_nbr.dim() != post_nbr.dim() {
        return Err(BurnError::Processing(format!(
            "Pre-fire grid {:?} does not match post-fire grid {:?}",
            pre_nbr.dim(),
            post_nbr.dim()
        )));
    }
    Ok((pre_nbr - post_nbr) * INDEX_SCALE)
}

/// `(B5 - B4) / (B5 + B4) * 1000`
pub fn ndvi(composite: &CompositeImage) -> BurnResult<PixelBand> {
    let ndvi = normalized_difference(composite_band(composite, Band::SrB5)?, composite_band(composite, Band::SrB4)?)?;
    Ok(ndvi * INDEX_SCALE)
}

/// What a land-cover input layer holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandCoverInput {
    /// NLCD class codes (11..=95)
    RawCodes,
    /// Values already in the simplified 0..=6 vocabulary
    AlreadyClassified,
}

impl LandCoverInput {
    pub fn detect(layer: &PixelBand) -> Self {
        let mut finite = layer.iter().filter(|v| v.is_finite()).peekable();
        if finite.peek().is_none() {
            return LandCoverInput::RawCodes;
        }
        if finite.all(|&v| v.fract() == 0.0 && (0.0..=6.0).contains(&v)) {
            LandCoverInput::AlreadyClassified
        } else {
            LandCoverInput::RawCodes
        }
    }
}

/// Simplify an NLCD layer. A layer that already holds simplified classes is
/// returned unchanged instead of being reclassified.
pub fn classify_land_cover(layer: &PixelBand) -> PixelBand {
    match LandCoverInput::detect(layer) {
        LandCoverInput::RawCodes => ThresholdClassifier::land_cover().classify(layer),
        LandCoverInput::AlreadyClassified => {
            log::warn!("Land cover layer is already classified; leaving it unchanged");
            layer.clone()
        }
    }
}

/// Static layers pulled alongside the composites
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeriverParams {
    pub elevation: StaticLayer,
    pub tree_cover: StaticLayer,
    /// Land cover release used as a model feature
    pub land_cover: StaticLayer,
    /// Land cover release used for the map overlay
    pub land_cover_viz: StaticLayer,
}

impl Default for DeriverParams {
    fn default() -> Self {
        Self {
            elevation: StaticLayer::elevation(),
            tree_cover: StaticLayer::nlcd("2016", "percent_tree_cover"),
            land_cover: StaticLayer::nlcd("2016", "landcover"),
            land_cover_viz: StaticLayer::nlcd("2011", "landcover"),
        }
    }
}

/// Derived and auxiliary layers, one per non-reflectance catalogue band
#[derive(Debug, Clone)]
pub struct DerivedLayers {
    pub burn_severity: PixelBand,
    pub dnbr: PixelBand,
    pub ndvi: PixelBand,
    pub elevation: PixelBand,
    pub percent_tree_cover: PixelBand,
    pub land_cover: PixelBand,
    pub land_cover_viz: PixelBand,
}

impl DerivedLayers {
    /// Layers in catalogue order
    pub fn in_catalogue_order(&self) -> [(Band, &PixelBand); 7] {
        [
            (Band::BurnSeverity, &self.burn_severity),
            (Band::Dnbr, &self.dnbr),
            (Band::Ndvi, &self.ndvi),
            (Band::Elevation, &self.elevation),
            (Band::PercentTreeCover, &self.percent_tree_cover),
            (Band::LandCover, &self.land_cover),
            (Band::LandCoverViz, &self.land_cover_viz),
        ]
    }
}

/// Computes indices and classifications from a pair of composites
pub struct BandDeriver<'a, A: ImageryArchive + ?Sized> {
    archive: &'a A,
    params: DeriverParams,
}

impl<'a, A: ImageryArchive + ?Sized> BandDeriver<'a, A> {
    pub fn new(archive: &'a A, params: DeriverParams) -> Self {
        Self { archive, params }
    }

    pub fn standard(archive: &'a A) -> Self {
        Self::new(archive, DeriverParams::default())
    }

    pub fn derive(
        &self,
        pre: &CompositeImage,
        post: &CompositeImage,
        geometry: &QueryGeometry,
    ) -> BurnResult<DerivedLayers> {
        log::info!(
            "Deriving burn severity from {} pre-fire and {} post-fire scenes",
            pre.scene_count(),
            post.scene_count()
        );
        let grid = &post.grid;

        let dnbr = dnbr(pre, post)?;
        let burn_severity = ThresholdClassifier::burn_severity().classify(&dnbr);
        let ndvi = ndvi(post)?;

        let elevation = self.archive.load_layer(&self.params.elevation, grid)?;
        let percent_tree_cover = self.archive.load_layer(&self.params.tree_cover, grid)?;
        let land_cover = classify_land_cover(&self.archive.load_layer(&self.params.land_cover, grid)?);
        let mut land_cover_viz = classify_land_cover(&self.archive.load_layer(&self.params.land_cover_viz, grid)?);
        clip_band(&mut land_cover_viz, &geometry.mask(grid));

        let layers = DerivedLayers {
            burn_severity,
            dnbr,
            ndvi,
            elevation,
            percent_tree_cover,
            land_cover,
            land_cover_viz,
        };
        for (band, data) in layers.in_catalogue_order() {
            if data.dim() != grid.shape() {
                return Err(BurnError::Processing(format!(
                    "Layer {} has shape {:?}, expected {:?}",
                    band,
                    data.dim(),
                    grid.shape()
                )));
            }
        }
        Ok(layers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_burn_severity_boundaries() {
        let c = ThresholdClassifier::burn_severity();
        assert_eq!(c.classify_value(425.1), 5);
        assert_eq!(c.classify_value(425.0), 4);
        assert_eq!(c.classify_value(225.0), 3);
        assert_eq!(c.classify_value(100.0), 2);
        assert_eq!(c.classify_value(-59.9), 2);
        assert_eq!(c.classify_value(-60.0), 1);
        assert_eq!(c.classify_value(-1000.0), 1);
        assert_eq!(c.classify_value(f64::NAN), 0);
    }

    #[test]
    fn test_burn_severity_total_on_reals() {
        let c = ThresholdClassifier::burn_severity();
        let mut v = -2000.0;
        while v <= 2000.0 {
            let class = c.classify_value(v);
            assert!((1..=5).contains(&class), "dNBR {} -> {}", v, class);
            v += 0.5;
        }
        assert_eq!(c.classify_value(f64::INFINITY), 5);
        assert_eq!(c.classify_value(f64::NEG_INFINITY), 1);
    }

    #[test]
    fn test_vectorized_matches_scalar() {
        let c = ThresholdClassifier::burn_severity();
        let band = array![[500.0, 300.0, 150.0], [0.0, -60.0, f64::NAN]];
        let classes = c.classify(&band);
        assert_eq!(classes, array![[5.0, 4.0, 3.0], [2.0, 1.0, 0.0]]);
        for (v, k) in band.iter().zip(classes.iter()) {
            assert_eq!(c.classify_value(*v) as f64, *k);
        }
    }

    #[test]
    fn test_land_cover_nlcd_codes() {
        let c = ThresholdClassifier::land_cover();
        let expected = [
            (11.0, 1), (12.0, 1), (21.0, 2), (24.0, 2), (31.0, 1), (41.0, 3), (43.0, 3),
            (52.0, 4), (71.0, 5), (81.0, 6), (82.0, 6), (90.0, 6), (95.0, 1), (5.0, 0),
        ];
        for (code, class) in expected {
            assert_eq!(c.classify_value(code), class, "NLCD {}", code);
        }
    }

    #[test]
    fn test_land_cover_reapplication_is_detected() {
        let raw = array![[11.0, 42.0], [52.0, 82.0]];
        assert_eq!(LandCoverInput::detect(&raw), LandCoverInput::RawCodes);
        let classified = classify_land_cover(&raw);
        assert_eq!(classified, array![[1.0, 3.0], [4.0, 6.0]]);
        assert_eq!(LandCoverInput::detect(&classified), LandCoverInput::AlreadyClassified);
        assert_eq!(classify_land_cover(&classified), classified);
    }

    #[test]
    fn test_normalized_difference() {
        let a = array![[3.0, 0.0, f64::NAN]];
        let b = array![[1.0, 0.0, 1.0]];
        let nd = normalized_difference(&a, &b).unwrap();
        assert_eq!(nd[[0, 0]], 0.5);
        assert!(nd[[0, 1]].is_nan());
        assert!(nd[[0, 2]].is_nan());
        assert!(normalized_difference(&a, &array![[1.0]]).is_err());
    }
}
