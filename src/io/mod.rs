//! I/O modules for the imagery archive, raster downloads and pixel tables

pub mod archive;
pub mod export;
pub mod raster;
pub mod table;

pub use archive::{ImageryArchive, SceneMetadata, SceneQuery, StaticLayer};
pub use export::{ArtifactFetcher, HttpFetcher, RasterExporter};
pub use raster::{RasterReader, RasterStack, RasterWriter};
pub use table::{PixelTable, TableConverter};
