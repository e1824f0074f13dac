//! GeoTIFF export with a multi-resolution retry ladder
//!
//! Each candidate scale is tried in turn: request a signed URL, stream the
//! zipped GeoTIFF into a staging file, unpack it. The first success wins.
//! Failed attempts are recorded and leave nothing on disk.

use crate::core::assemble::MultiBandImage;
use crate::io::archive::{DownloadRequest, ImageryArchive};
use crate::types::{BurnError, BurnResult, QueryGeometry};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Order in which candidate scales are tried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScaleOrder {
    /// Caller-supplied order
    AsGiven,
    /// Smallest ground resolution first, coarser scales as fallbacks
    FinestFirst,
    CoarsestFirst,
}

impl ScaleOrder {
    /// Valid (finite, positive) scales in ladder order, duplicates removed
    pub fn arrange(self, scales: &[f64]) -> Vec<f64> {
        let mut ladder: Vec<f64> = Vec::with_capacity(scales.len());
        for &scale in scales {
            if !(scale.is_finite() && scale > 0.0) {
                log::warn!("Skipping invalid export scale {}", scale);
                continue;
            }
            if !ladder.contains(&scale) {
                ladder.push(scale);
            }
        }
        match self {
            ScaleOrder::AsGiven => {}
            ScaleOrder::FinestFirst => ladder.sort_by(|a, b| a.total_cmp(b)),
            ScaleOrder::CoarsestFirst => ladder.sort_by(|a, b| b.total_cmp(a)),
        }
        ladder
    }
}

/// Export parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportParams {
    pub output_dir: PathBuf,
    /// Name of the extracted raster. Concurrent runs must not share
    /// `output_dir` with the same name.
    pub file_name: String,
    /// Candidate ground resolutions in meters
    pub scales: Vec<f64>,
    pub scale_order: ScaleOrder,
    /// Per-request HTTP timeout
    pub timeout_secs: u64,
    pub user_agent: String,
    pub crs: Option<String>,
}

impl Default for ExportParams {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            file_name: "raster.tif".to_string(),
            scales: vec![30.0, 60.0, 90.0, 120.0],
            scale_order: ScaleOrder::FinestFirst,
            timeout_secs: 300,
            user_agent: format!("burnscar/{}", env!("CARGO_PKG_VERSION")),
            crs: None,
        }
    }
}

impl ExportParams {
    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(&self.file_name)
    }

    fn stem(&self) -> &str {
        Path::new(&self.file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("raster")
    }
}

/// Why one rung of the ladder failed
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AttemptFailure {
    #[error("transient fetch failure: {0}")]
    TransientFetchFailure(String),

    #[error("corrupt artifact: {0}")]
    CorruptArtifact(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// A failed rung of the ladder
#[derive(Debug, Clone, PartialEq)]
pub struct ExportAttempt {
    pub scale: f64,
    pub failure: AttemptFailure,
}

/// Successful export
#[derive(Debug, Clone)]
pub struct ExportedRaster {
    pub path: PathBuf,
    pub scale: f64,
    /// Rungs that failed before the successful one
    pub failed_attempts: Vec<ExportAttempt>,
}

/// Streams a URL into a sink
pub trait ArtifactFetcher {
    fn fetch(&self, url: &str, sink: &mut dyn Write) -> Result<u64, AttemptFailure>;
}

/// Blocking HTTP fetcher with a bounded timeout
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, user_agent: &str) -> BurnResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| BurnError::Processing(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, timeout })
    }

    pub fn from_params(params: &ExportParams) -> BurnResult<Self> {
        Self::new(Duration::from_secs(params.timeout_secs), &params.user_agent)
    }

    fn classify(&self, error: reqwest::Error) -> AttemptFailure {
        if error.is_timeout() {
            AttemptFailure::Timeout(self.timeout)
        } else {
            AttemptFailure::TransientFetchFailure(format!("HTTP request failed: {}", error))
        }
    }
}

impl ArtifactFetcher for HttpFetcher {
    fn fetch(&self, url: &str, sink: &mut dyn Write) -> Result<u64, AttemptFailure> {
        let mut response = self.client.get(url).send().map_err(|e| self.classify(e))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().unwrap_or_default();
            return Err(AttemptFailure::TransientFetchFailure(format!(
                "HTTP {}: {}",
                status.as_u16(),
                service_error_message(&body)
            )));
        }

        response.copy_to(sink).map_err(|e| self.classify(e))
    }
}

/// Pull `error.message` out of a JSON error body, else a trimmed excerpt
pub fn service_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.chars().take(200).collect::<String>().trim().to_string())
}

/// Downloads a [`MultiBandImage`] as a GeoTIFF
pub struct RasterExporter<F: ArtifactFetcher> {
    fetcher: F,
    params: ExportParams,
}

impl RasterExporter<HttpFetcher> {
    /// Exporter fetching over HTTP
    pub fn standard(params: ExportParams) -> BurnResult<Self> {
        let fetcher = HttpFetcher::from_params(&params)?;
        Ok(Self::new(fetcher, params))
    }
}

impl<F: ArtifactFetcher> RasterExporter<F> {
    pub fn new(fetcher: F, params: ExportParams) -> Self {
        Self { fetcher, params }
    }

    pub fn params(&self) -> &ExportParams {
        &self.params
    }

    /// Export with the configured scale candidates
    pub fn export<A: ImageryArchive + ?Sized>(
        &self,
        archive: &A,
        image: &MultiBandImage,
        geometry: &QueryGeometry,
    ) -> BurnResult<ExportedRaster> {
        let scales = self.params.scales.clone();
        self.export_with_scales(archive, image, geometry, &scales)
    }

    /// Export, walking `scales` in the configured [`ScaleOrder`].
    ///
    /// Fails fast with `NoImageryAvailable` when the image has no bands and
    /// with `Config` when no candidate scale is valid. Returns
    /// `ExportExceededLimits` when every candidate scale fails.
    pub fn export_with_scales<A: ImageryArchive + ?Sized>(
        &self,
        archive: &A,
        image: &MultiBandImage,
        geometry: &QueryGeometry,
        scales: &[f64],
    ) -> BurnResult<ExportedRaster> {
        let band_names = match archive.band_names(image) {
            Ok(names) if !names.is_empty() => names,
            Ok(_) => {
                log::error!("Image reports zero bands; nothing to export");
                return Err(BurnError::NoImageryAvailable {
                    reason: "image has no bands".to_string(),
                });
            }
            Err(e) => {
                log::error!("Band enumeration failed: {}", e);
                return Err(BurnError::NoImageryAvailable { reason: e.to_string() });
            }
        };
        log::debug!("Exporting bands {:?}", band_names);

        let ladder = self.params.scale_order.arrange(scales);
        if ladder.is_empty() {
            log::error!("No valid export scale among {:?}", scales);
            return Err(BurnError::Config(format!(
                "No valid export scale configured (got {:?}); scales must be positive ground resolutions in meters",
                scales
            )));
        }

        fs::create_dir_all(&self.params.output_dir)?;
        let dest = self.params.output_path();
        if dest.exists() {
            log::warn!("Removing stale raster {}", dest.display());
            fs::remove_file(&dest)?;
        }

        log::info!("Export ladder ({:?}): {:?} m", self.params.scale_order, ladder);

        let mut failed_attempts = Vec::new();
        for (i, &scale) in ladder.iter().enumerate() {
            log::info!("Export attempt {} of {} at {} m", i + 1, ladder.len(), scale);
            match self.attempt(archive, image, geometry, scale, &dest) {
                Ok(()) => {
                    log::info!("Raster exported at {} m to {}", scale, dest.display());
                    return Ok(ExportedRaster { path: dest, scale, failed_attempts });
                }
                Err(failure) => {
                    log::warn!("Export at {} m failed: {}", scale, failure);
                    failed_attempts.push(ExportAttempt { scale, failure });
                }
            }
        }

        log::error!("All {} export attempts failed", failed_attempts.len());
        Err(BurnError::ExportExceededLimits { attempts: failed_attempts })
    }

    fn attempt<A: ImageryArchive + ?Sized>(
        &self,
        archive: &A,
        image: &MultiBandImage,
        geometry: &QueryGeometry,
        scale: f64,
        dest: &Path,
    ) -> Result<(), AttemptFailure> {
        let stem = self.params.stem();
        let request = DownloadRequest {
            name: stem,
            scale,
            region: geometry,
            crs: self.params.crs.as_deref(),
            file_per_band: false,
        };
        let url = archive
            .download_url(image, &request)
            .map_err(|e| AttemptFailure::TransientFetchFailure(e.to_string()))?;
        log::debug!("Downloading {}", url);

        // Removed on drop, whatever the outcome
        let mut staging = tempfile::Builder::new()
            .prefix(&format!(".{}-", stem))
            .suffix(".zip")
            .tempfile_in(&self.params.output_dir)
            .map_err(|e| AttemptFailure::TransientFetchFailure(format!("Cannot stage download: {}", e)))?;

        let bytes = self.fetcher.fetch(&url, staging.as_file_mut())?;
        log::debug!("Downloaded {} bytes", bytes);

        let file = staging.as_file_mut();
        file.flush()
            .and_then(|_| file.seek(SeekFrom::Start(0)).map(|_| ()))
            .map_err(|e| AttemptFailure::TransientFetchFailure(format!("Cannot rewind download: {}", e)))?;

        unpack_raster(file, stem, dest)
    }
}

/// Extract the GeoTIFF from a downloaded archive into `dest`.
///
/// Prefers the entry named `<stem>.tif`; otherwise the archive must hold
/// exactly one GeoTIFF. `dest` only appears once fully written.
pub fn unpack_raster<R: Read + Seek>(reader: R, stem: &str, dest: &Path) -> Result<(), AttemptFailure> {
    let mut archive = zip::ZipArchive::new(reader)
        .map_err(|e| AttemptFailure::CorruptArtifact(format!("Failed to open ZIP archive: {}", e)))?;

    let tiffs: Vec<String> = archive
        .file_names()
        .filter(|name| {
            let lower = name.to_ascii_lowercase();
            lower.ends_with(".tif") || lower.ends_with(".tiff")
        })
        .map(str::to_string)
        .collect();

    let wanted = format!("{}.tif", stem);
    let entry = match tiffs.iter().find(|name| file_name_of(name) == wanted) {
        Some(name) => name.clone(),
        None if tiffs.len() == 1 => tiffs[0].clone(),
        None if tiffs.is_empty() => {
            return Err(AttemptFailure::CorruptArtifact("No GeoTIFF found in ZIP archive".to_string()))
        }
        None => {
            return Err(AttemptFailure::CorruptArtifact(format!(
                "Expected a single GeoTIFF, found {}: {:?}",
                tiffs.len(),
                tiffs
            )))
        }
    };
    log::debug!("Extracting {}", entry);

    let mut source = archive
        .by_name(&entry)
        .map_err(|e| AttemptFailure::CorruptArtifact(format!("Failed to read ZIP entry {}: {}", entry, e)))?;

    let parent = dest.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let mut output = tempfile::NamedTempFile::new_in(parent)
        .map_err(|e| AttemptFailure::TransientFetchFailure(format!("Cannot stage raster: {}", e)))?;
    std::io::copy(&mut source, &mut output)
        .map_err(|e| AttemptFailure::CorruptArtifact(format!("Failed to extract {}: {}", entry, e)))?;
    output
        .persist(dest)
        .map_err(|e| AttemptFailure::TransientFetchFailure(format!("Cannot write {}: {}", dest.display(), e)))?;
    Ok(())
}

fn file_name_of(entry: &str) -> &str {
    entry.rsplit('/').next().unwrap_or(entry)
}
