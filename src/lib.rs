//! burnscar: wildfire burn severity from Landsat surface reflectance
//!
//! Builds cloud-filtered pre- and post-fire composites around a fire event,
//! derives dNBR burn severity, vegetation and terrain layers, exports the
//! 14-band stack as a GeoTIFF through a multi-resolution retry ladder and
//! flattens it into a per-pixel table. A metrics engine scores predicted
//! severity classes against reference labels.

pub mod types;
pub mod io;
pub mod core;
pub mod config;

// Re-export main types and functions for easier access
pub use self::types::{
    Band, BoundingBox, BurnError, BurnResult, BurnSeverity, DateWindow, LandCover, QueryGeometry,
    RasterGrid,
};

pub use self::config::PipelineConfig;
pub use self::core::{
    assemble, confusion_and_metrics, derive_windows, BandDeriver, BurnSeverityPipeline, CompositeBuilder,
    FireWindows, MultiBandImage,
};
pub use self::io::{ImageryArchive, PixelTable, RasterExporter, TableConverter};

#[cfg(feature = "python")]
mod python {
    use crate::core::metrics::confusion_and_metrics;
    use crate::core::windows::derive_windows;
    use crate::io::table::{TableConverter, TableParams};
    use crate::types::{Band, BurnError};
    use chrono::NaiveDate;
    use numpy::{IntoPyArray, PyArray2};
    use pyo3::prelude::*;

    fn to_py_err(e: BurnError) -> PyErr {
        PyErr::new::<pyo3::exceptions::PyRuntimeError, _>(format!("{}", e))
    }

    fn parse_date(value: &str) -> PyResult<NaiveDate> {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|e| {
            PyErr::new::<pyo3::exceptions::PyValueError, _>(format!("Invalid date {}: {}", value, e))
        })
    }

    /// Pre- and post-fire query windows as ((start, end), (start, end))
    #[pyfunction]
    #[pyo3(name = "derive_windows")]
    fn py_derive_windows(start: &str, end: &str) -> PyResult<((String, String), (String, String))> {
        let windows = derive_windows(parse_date(start)?, parse_date(end)?);
        let post = windows.post.query_window();
        Ok((
            (windows.pre.start.to_string(), windows.pre.end.to_string()),
            (post.start.to_string(), post.end.to_string()),
        ))
    }

    /// Confusion matrix with margins plus (class, precision, recall, F1)
    /// rows. Unequal lengths are tolerated; unpaired labels are ignored.
    #[pyfunction]
    fn model_metrics<'py>(
        py: Python<'py>,
        reference: Vec<i64>,
        predicted: Vec<i64>,
    ) -> PyResult<(&'py PyArray2<u64>, Vec<(String, f64, f64, f64)>)> {
        let (cm, metrics) = confusion_and_metrics(&reference, &predicted);
        Ok((cm.with_margins().into_pyarray(py), metrics.labelled_rows()))
    }

    /// Pixel table of a downloaded raster as a list of (column, values)
    #[pyfunction]
    fn raster_to_table(path: String, seed: Option<u64>) -> PyResult<Vec<(String, Vec<i64>)>> {
        let converter = TableConverter::new(TableParams {
            seed,
            ..TableParams::default()
        });
        let table = converter.convert_file(&path, &Band::CATALOGUE).map_err(to_py_err)?;
        Ok(table
            .columns()
            .iter()
            .map(|c| (c.name.clone(), c.values.clone()))
            .collect())
    }

    /// Python module definition
    #[pymodule]
    fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
        m.add_function(wrap_pyfunction!(py_derive_windows, m)?)?;
        m.add_function(wrap_pyfunction!(model_metrics, m)?)?;
        m.add_function(wrap_pyfunction!(raster_to_table, m)?)?;
        Ok(())
    }
}
