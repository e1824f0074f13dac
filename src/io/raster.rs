use crate::types::{BurnError, BurnResult, GeoTransform};
use gdal::raster::Buffer;
use gdal::{Dataset, DriverManager};
use ndarray::{Array2, Array3, ArrayView2, Axis};
use std::path::Path;

/// Decoded multi-band raster, (band, row, col), no-data as NaN
#[derive(Debug, Clone)]
pub struct RasterStack {
    pub data: Array3<f64>,
    pub geo_transform: Option<GeoTransform>,
}

impl RasterStack {
    pub fn new(data: Array3<f64>) -> Self {
        Self { data, geo_transform: None }
    }

    pub fn band_count(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    pub fn height(&self) -> usize {
        self.data.len_of(Axis(1))
    }

    pub fn width(&self) -> usize {
        self.data.len_of(Axis(2))
    }

    /// Zero-based band view
    pub fn band(&self, index: usize) -> ArrayView2<'_, f64> {
        self.data.index_axis(Axis(0), index)
    }
}

/// GDAL-backed multi-band raster reader
pub struct RasterReader;

impl RasterReader {
    /// Read every band of `path` as f64
    pub fn read_stack<P: AsRef<Path>>(path: P) -> BurnResult<RasterStack> {
        log::info!("Reading raster: {}", path.as_ref().display());

        let dataset = Dataset::open(path.as_ref())?;
        let (width, height) = dataset.raster_size();
        let band_count = dataset.raster_count() as usize;
        log::debug!("Raster size: {} bands, {}x{}", band_count, width, height);

        let mut data = Array3::<f64>::from_elem((band_count, height, width), f64::NAN);
        for index in 0..band_count {
            let band = dataset.rasterband(index as isize + 1)?;
            let buffer = band.read_as::<f64>((0, 0), (width, height), (width, height), None)?;
            let mut values = Array2::from_shape_vec((height, width), buffer.data)
                .map_err(|e| BurnError::Processing(format!("Failed to reshape band {}: {}", index + 1, e)))?;

            if let Some(nodata) = band.no_data_value() {
                values.mapv_inplace(|v| if v == nodata { f64::NAN } else { v });
            }
            data.index_axis_mut(Axis(0), index).assign(&values);
        }

        let geo_transform = dataset.geo_transform().ok().map(|gt| GeoTransform::from_gdal(&gt));
        Ok(RasterStack { data, geo_transform })
    }
}

/// GDAL-backed GeoTIFF writer
pub struct RasterWriter;

impl RasterWriter {
    /// Write `stack` as a Float64 GeoTIFF, one raster band per stack band
    pub fn write_geotiff<P: AsRef<Path>>(path: P, stack: &RasterStack) -> BurnResult<()> {
        let (bands, height, width) = stack.data.dim();
        log::debug!("Writing {} bands ({}x{}) to {}", bands, width, height, path.as_ref().display());

        let driver = DriverManager::get_driver_by_name("GTiff")?;
        let mut dataset = driver.create_with_band_type::<f64, _>(
            path.as_ref(),
            width as isize,
            height as isize,
            bands as isize,
        )?;
        if let Some(transform) = &stack.geo_transform {
            dataset.set_geo_transform(&transform.to_gdal())?;
        }

        for index in 0..bands {
            let values: Vec<f64> = stack.band(index).iter().copied().collect();
            let mut band = dataset.rasterband(index as isize + 1)?;
            band.write((0, 0), (width, height), &Buffer::new((width, height), values))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geotiff_round_trip_keeps_band_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stack.tif");

        let data = Array3::from_shape_fn((3, 2, 4), |(b, r, c)| (b * 100 + r * 10 + c) as f64);
        let mut stack = RasterStack::new(data.clone());
        stack.geo_transform = Some(GeoTransform::from_gdal(&[-121.0, 0.001, 0.0, 40.0, 0.0, -0.001]));
        RasterWriter::write_geotiff(&path, &stack).unwrap();

        let read = RasterReader::read_stack(&path).unwrap();
        assert_eq!(read.band_count(), 3);
        assert_eq!((read.height(), read.width()), (2, 4));
        assert_eq!(read.data, data);
        assert_eq!(read.geo_transform.unwrap().top_left_x, -121.0);
    }
}
