//! End-to-end run: windows -> composites -> derived layers -> assembled
//! image -> export -> pixel table. Every stage hands its output to the next
//! one explicitly; nothing is cached between runs.

use crate::config::PipelineConfig;
use crate::core::assemble::{assemble, MultiBandImage};
use crate::core::composite::{CompositeBuilder, CompositeImage};
use crate::core::indices::BandDeriver;
use crate::core::windows::{derive_windows, FireWindows};
use crate::io::archive::ImageryArchive;
use crate::io::export::{ArtifactFetcher, ExportedRaster, HttpFetcher, RasterExporter};
use crate::io::table::{PixelTable, TableConverter};
use crate::types::{Band, BurnResult, QueryGeometry};
use chrono::NaiveDate;
use rand::Rng;
use std::path::PathBuf;

/// Query results of one fire, ready for export
#[derive(Debug, Clone)]
pub struct PreparedImages {
    pub windows: FireWindows,
    pub pre: CompositeImage,
    pub post: CompositeImage,
    pub combined: MultiBandImage,
}

/// Artifacts of a complete run
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub windows: FireWindows,
    pub raster: ExportedRaster,
    pub table: PixelTable,
    pub table_path: PathBuf,
}

/// Sequential burn severity pipeline over one imagery archive
pub struct BurnSeverityPipeline<'a, A: ImageryArchive + ?Sized, F: ArtifactFetcher> {
    archive: &'a A,
    exporter: RasterExporter<F>,
    config: PipelineConfig,
}

impl<'a, A: ImageryArchive + ?Sized> BurnSeverityPipeline<'a, A, HttpFetcher> {
    /// Pipeline downloading over HTTP
    pub fn standard(archive: &'a A, config: PipelineConfig) -> BurnResult<Self> {
        let fetcher = HttpFetcher::from_params(&config.export)?;
        Ok(Self::new(archive, fetcher, config))
    }
}

impl<'a, A: ImageryArchive + ?Sized, F: ArtifactFetcher> BurnSeverityPipeline<'a, A, F> {
    pub fn new(archive: &'a A, fetcher: F, config: PipelineConfig) -> Self {
        let exporter = RasterExporter::new(fetcher, config.export.clone());
        Self { archive, exporter, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Build both composites and the 14-band image.
    ///
    /// When either composite has no scenes the combined image is empty; the
    /// export step reports that as `NoImageryAvailable`.
    pub fn prepare_images(
        &self,
        geometry: &QueryGeometry,
        start: NaiveDate,
        end: NaiveDate,
    ) -> BurnResult<PreparedImages> {
        let windows = derive_windows(start, end);
        log::info!(
            "Fire {} to {}: pre-fire {}, post-fire {}",
            start,
            end,
            windows.pre,
            windows.post.query_window()
        );

        let builder = CompositeBuilder::new(self.archive, self.config.composite.clone());
        let composites = builder.build_fire_composites(geometry, &windows)?;

        let combined = if composites.pre.is_empty() || composites.post.is_empty() {
            log::warn!(
                "Cannot derive burn severity: {} pre-fire and {} post-fire scenes",
                composites.pre.scene_count(),
                composites.post.scene_count()
            );
            MultiBandImage::empty(composites.post.grid)
        } else {
            let deriver = BandDeriver::new(self.archive, self.config.layers.clone());
            let derived = deriver.derive(&composites.pre, &composites.post, geometry)?;
            assemble(&composites.post, &derived)?
        };

        Ok(PreparedImages {
            windows,
            pre: composites.pre,
            post: composites.post,
            combined,
        })
    }

    /// Download the combined image through the scale ladder
    pub fn export(&self, prepared: &PreparedImages, geometry: &QueryGeometry) -> BurnResult<ExportedRaster> {
        self.exporter.export(self.archive, &prepared.combined, geometry)
    }

    /// Convert the exported raster and persist the table beside it
    pub fn tabulate<R: Rng + ?Sized>(&self, raster: &ExportedRaster, rng: &mut R) -> BurnResult<(PixelTable, PathBuf)> {
        let converter = TableConverter::new(self.config.table.clone());
        let stack = crate::io::raster::RasterReader::read_stack(&raster.path)?;
        let table = converter.to_table(&stack, &Band::CATALOGUE, rng)?;

        let table_path = self.config.export.output_dir.join(&self.config.table.file_name);
        table.write_csv(&table_path)?;
        Ok((table, table_path))
    }

    /// Run every stage with the configured imputation seed
    pub fn run(&self, geometry: &QueryGeometry, start: NaiveDate, end: NaiveDate) -> BurnResult<PipelineOutput> {
        let mut rng = self.config.table.rng();
        self.run_with_rng(geometry, start, end, &mut rng)
    }

    pub fn run_with_rng<R: Rng + ?Sized>(
        &self,
        geometry: &QueryGeometry,
        start: NaiveDate,
        end: NaiveDate,
        rng: &mut R,
    ) -> BurnResult<PipelineOutput> {
        let started = std::time::Instant::now();
        let prepared = self.prepare_images(geometry, start, end)?;
        let raster = self.export(&prepared, geometry)?;
        let (table, table_path) = self.tabulate(&raster, rng)?;
        log::info!(
            "Pipeline finished in {:.1}s: {}x{} raster at {} m",
            started.elapsed().as_secs_f64(),
            table.dims().0,
            table.dims().1,
            raster.scale
        );

        Ok(PipelineOutput {
            windows: prepared.windows,
            raster,
            table,
            table_path,
        })
    }
}
