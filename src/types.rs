use chrono::{DateTime, NaiveDate, Utc};
use geo::{BoundingRect, Contains, Intersects, MultiPolygon, Point, Polygon, Rect};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Real-valued single band raster (rows x cols)
pub type PixelBand = Array2<f64>;

/// Band with its semantic name attached
#[derive(Debug, Clone)]
pub struct NamedBand {
    pub name: String,
    pub data: PixelBand,
}

impl NamedBand {
    pub fn new(name: impl Into<String>, data: PixelBand) -> Self {
        Self { name: name.into(), data }
    }
}

/// Half-open calendar window `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// True when `date` falls inside `[start, end)`
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date < self.end
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }
}

impl std::fmt::Display for DateWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Geospatial bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn width(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    pub fn height(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_lon <= other.max_lon
            && other.min_lon <= self.max_lon
            && self.min_lat <= other.max_lat
            && other.min_lat <= self.max_lat
    }

    pub fn to_rect(&self) -> Rect<f64> {
        Rect::new(
            geo::coord! { x: self.min_lon, y: self.min_lat },
            geo::coord! { x: self.max_lon, y: self.max_lat },
        )
    }

    fn from_rect(rect: Rect<f64>) -> Self {
        Self {
            min_lon: rect.min().x,
            max_lon: rect.max().x,
            min_lat: rect.min().y,
            max_lat: rect.max().y,
        }
    }
}

/// Geospatial transformation parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// GDAL coefficient order
    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }

    pub fn from_gdal(gt: &[f64; 6]) -> Self {
        Self {
            top_left_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            top_left_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }
}

/// North-up pixel grid shared by every band of a composite
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RasterGrid {
    pub transform: GeoTransform,
    pub width: usize,
    pub height: usize,
}

impl RasterGrid {
    /// Smallest grid with square `pixel_size` (degrees) cells covering `bbox`
    pub fn covering(bbox: &BoundingBox, pixel_size: f64) -> BurnResult<Self> {
        if !(pixel_size > 0.0) {
            return Err(BurnError::InvalidFormat(format!(
                "Pixel size must be positive, got {}",
                pixel_size
            )));
        }

        let width = ((bbox.width() / pixel_size).ceil() as usize).max(1);
        let height = ((bbox.height() / pixel_size).ceil() as usize).max(1);

        Ok(Self {
            transform: GeoTransform {
                top_left_x: bbox.min_lon,
                pixel_width: pixel_size,
                rotation_x: 0.0,
                top_left_y: bbox.max_lat,
                rotation_y: 0.0,
                pixel_height: -pixel_size,
            },
            width,
            height,
        })
    }

    /// (rows, cols), the ndarray shape of every band on this grid
    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    /// Geographic (lon, lat) of a cell center
    pub fn pixel_center(&self, row: usize, col: usize) -> (f64, f64) {
        let t = &self.transform;
        let x = col as f64 + 0.5;
        let y = row as f64 + 0.5;
        (
            t.top_left_x + x * t.pixel_width + y * t.rotation_x,
            t.top_left_y + x * t.rotation_y + y * t.pixel_height,
        )
    }

    pub fn bounds(&self) -> BoundingBox {
        let t = &self.transform;
        let x0 = t.top_left_x;
        let x1 = t.top_left_x + self.width as f64 * t.pixel_width;
        let y0 = t.top_left_y;
        let y1 = t.top_left_y + self.height as f64 * t.pixel_height;
        BoundingBox {
            min_lon: x0.min(x1),
            max_lon: x0.max(x1),
            min_lat: y0.min(y1),
            max_lat: y0.max(y1),
        }
    }

    /// Band of `value` shaped to this grid
    pub fn filled(&self, value: f64) -> PixelBand {
        Array2::from_elem(self.shape(), value)
    }
}

/// Fire perimeter in EPSG:4326, either one polygon or a polygon collection
#[derive(Debug, Clone)]
pub struct QueryGeometry {
    shape: MultiPolygon<f64>,
}

impl QueryGeometry {
    pub fn from_polygon(polygon: Polygon<f64>) -> Self {
        Self { shape: MultiPolygon(vec![polygon]) }
    }

    /// Collection of polygons treated as their union
    pub fn from_polygons<I>(polygons: I) -> Self
    where
        I: IntoIterator<Item = Polygon<f64>>,
    {
        Self { shape: MultiPolygon(polygons.into_iter().collect()) }
    }

    pub fn shape(&self) -> &MultiPolygon<f64> {
        &self.shape
    }

    pub fn bounding_box(&self) -> BurnResult<BoundingBox> {
        self.shape
            .bounding_rect()
            .map(BoundingBox::from_rect)
            .ok_or_else(|| BurnError::InvalidFormat("Query geometry is empty".to_string()))
    }

    /// Rectangle polygon spanning the geometry's extent
    pub fn bbox_polygon(&self) -> BurnResult<Polygon<f64>> {
        Ok(self.bounding_box()?.to_rect().to_polygon())
    }

    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        self.shape.contains(&Point::new(lon, lat))
    }

    pub fn intersects_bbox(&self, bbox: &BoundingBox) -> bool {
        self.shape.intersects(&bbox.to_rect())
    }

    /// Per-cell inside/outside mask evaluated at cell centers
    pub fn mask(&self, grid: &RasterGrid) -> Array2<bool> {
        Array2::from_shape_fn(grid.shape(), |(row, col)| {
            let (lon, lat) = grid.pixel_center(row, col);
            self.contains(lon, lat)
        })
    }
}

/// Burn severity classes derived from dNBR
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BurnSeverity {
    VegetationGrowth = 1,
    Unburned = 2,
    Low = 3,
    Moderate = 4,
    High = 5,
}

impl BurnSeverity {
    pub const ALL: [BurnSeverity; 5] = [
        BurnSeverity::VegetationGrowth,
        BurnSeverity::Unburned,
        BurnSeverity::Low,
        BurnSeverity::Moderate,
        BurnSeverity::High,
    ];

    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.code() == code)
    }

    pub fn label(self) -> &'static str {
        match self {
            BurnSeverity::VegetationGrowth => "Vegetation Growth",
            BurnSeverity::Unburned => "Unburned",
            BurnSeverity::Low => "Low",
            BurnSeverity::Moderate => "Moderate",
            BurnSeverity::High => "High",
        }
    }
}

impl std::fmt::Display for BurnSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Simplified land cover classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LandCover {
    Other = 1,
    Developed = 2,
    Forest = 3,
    Shrub = 4,
    Grassland = 5,
    Agriculture = 6,
}

impl LandCover {
    pub const ALL: [LandCover; 6] = [
        LandCover::Other,
        LandCover::Developed,
        LandCover::Forest,
        LandCover::Shrub,
        LandCover::Grassland,
        LandCover::Agriculture,
    ];

    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.code() == code)
    }

    pub fn label(self) -> &'static str {
        match self {
            LandCover::Other => "Other",
            LandCover::Developed => "Developed",
            LandCover::Forest => "Forest",
            LandCover::Shrub => "Shrub",
            LandCover::Grassland => "Grassland",
            LandCover::Agriculture => "Agriculture",
        }
    }
}

/// Output raster bands. Declaration order is the physical band order of the
/// exported raster and the column order of the pixel table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Band {
    SrB1,
    SrB2,
    SrB3,
    SrB4,
    SrB5,
    SrB6,
    SrB7,
    BurnSeverity,
    Dnbr,
    Ndvi,
    Elevation,
    PercentTreeCover,
    LandCover,
    LandCoverViz,
}

impl Band {
    pub const CATALOGUE: [Band; 14] = [
        Band::SrB1,
        Band::SrB2,
        Band::SrB3,
        Band::SrB4,
        Band::SrB5,
        Band::SrB6,
        Band::SrB7,
        Band::BurnSeverity,
        Band::Dnbr,
        Band::Ndvi,
        Band::Elevation,
        Band::PercentTreeCover,
        Band::LandCover,
        Band::LandCoverViz,
    ];

    /// Post-fire surface reflectance bands, in sensor order
    pub const REFLECTANCE: [Band; 7] = [
        Band::SrB1,
        Band::SrB2,
        Band::SrB3,
        Band::SrB4,
        Band::SrB5,
        Band::SrB6,
        Band::SrB7,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Band::SrB1 => "SR_B1",
            Band::SrB2 => "SR_B2",
            Band::SrB3 => "SR_B3",
            Band::SrB4 => "SR_B4",
            Band::SrB5 => "SR_B5",
            Band::SrB6 => "SR_B6",
            Band::SrB7 => "SR_B7",
            Band::BurnSeverity => "burnSeverity",
            Band::Dnbr => "dNBR",
            Band::Ndvi => "NDVI",
            Band::Elevation => "elevation",
            Band::PercentTreeCover => "percent_tree_cover",
            Band::LandCover => "landCover",
            Band::LandCoverViz => "landCoverViz",
        }
    }

    /// Zero-based position in the catalogue
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::CATALOGUE.iter().copied().find(|b| b.name() == name)
    }

    pub fn catalogue_names() -> Vec<&'static str> {
        Self::CATALOGUE.iter().map(|b| b.name()).collect()
    }
}

impl std::fmt::Display for Band {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Format an epoch timestamp in milliseconds as `YYYY-MM-DD` (UTC)
pub fn format_epoch_millis(millis: i64) -> BurnResult<String> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .ok_or_else(|| BurnError::InvalidFormat(format!("Timestamp out of range: {}", millis)))
}

/// Error types for burn severity processing
#[derive(Debug, thiserror::Error)]
pub enum BurnError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Imagery archive error: {0}")]
    Archive(String),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("Table serialization error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No suitable Landsat imagery is available for this fire and date range ({reason}). Please try again with a different fire or date range.")]
    NoImageryAvailable { reason: String },

    #[error("Fire exceeds the total request size after {} attempt(s). Please try again with a smaller area.", attempts.len())]
    ExportExceededLimits { attempts: Vec<crate::io::export::ExportAttempt> },
}

/// Result type for burn severity operations
pub type BurnResult<T> = Result<T, BurnError>;

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn square() -> QueryGeometry {
        QueryGeometry::from_polygon(polygon![
            (x: -121.0, y: 40.0),
            (x: -120.0, y: 40.0),
            (x: -120.0, y: 41.0),
            (x: -121.0, y: 41.0),
            (x: -121.0, y: 40.0),
        ])
    }

    #[test]
    fn test_catalogue_order_and_names() {
        let names = Band::catalogue_names();
        assert_eq!(names.len(), 14);
        assert_eq!(names[0], "SR_B1");
        assert_eq!(names[6], "SR_B7");
        assert_eq!(names[7], "burnSeverity");
        assert_eq!(names[13], "landCoverViz");
        for (i, band) in Band::CATALOGUE.iter().enumerate() {
            assert_eq!(band.index(), i);
            assert_eq!(Band::from_name(band.name()), Some(*band));
        }
    }

    #[test]
    fn test_grid_covering_bbox() {
        let bbox = square().bounding_box().unwrap();
        let grid = RasterGrid::covering(&bbox, 0.25).unwrap();
        assert_eq!(grid.shape(), (4, 4));
        let (lon, lat) = grid.pixel_center(0, 0);
        assert!((lon - -120.875).abs() < 1e-12);
        assert!((lat - 40.875).abs() < 1e-12);
        assert_eq!(grid.bounds(), bbox);
        assert!(RasterGrid::covering(&bbox, 0.0).is_err());
    }

    #[test]
    fn test_geometry_mask_and_bbox_polygon() {
        let geometry = square();
        let grid = RasterGrid::covering(
            &BoundingBox { min_lon: -121.5, max_lon: -119.5, min_lat: 40.0, max_lat: 41.0 },
            0.5,
        )
        .unwrap();
        let mask = geometry.mask(&grid);
        assert_eq!(mask.dim(), (2, 4));
        assert!(!mask[[0, 0]]);
        assert!(mask[[0, 1]]);
        assert!(mask[[1, 2]]);
        assert!(!mask[[1, 3]]);

        let bbox_poly = geometry.bbox_polygon().unwrap();
        assert_eq!(bbox_poly.exterior().0.len(), 5);
        assert!(QueryGeometry::from_polygons(Vec::new()).bounding_box().is_err());
    }

    #[test]
    fn test_class_vocabularies() {
        assert_eq!(BurnSeverity::from_code(5), Some(BurnSeverity::High));
        assert_eq!(BurnSeverity::from_code(0), None);
        assert_eq!(BurnSeverity::Unburned.label(), "Unburned");
        assert_eq!(LandCover::from_code(6), Some(LandCover::Agriculture));
        assert_eq!(LandCover::Forest.code(), 3);
    }

    #[test]
    fn test_format_epoch_millis() {
        assert_eq!(format_epoch_millis(1_596_240_000_000).unwrap(), "2020-08-01");
    }
}
