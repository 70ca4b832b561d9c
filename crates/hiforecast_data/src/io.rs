//! Reading and writing panels.

use std::path::Path;

use ndarray::{Array2, Array3};

use crate::error::{DataError, Result};
use crate::panel::MultivariatePanel;

/// Read a `(V, T)` panel from a NumPy `.npy` file.
///
/// Both `float32` and `float64` files are accepted.
pub fn read_npy<P: AsRef<Path>>(path: P) -> Result<MultivariatePanel> {
    use ndarray_npy::ReadNpyExt;

    let file = std::fs::File::open(path.as_ref())?;
    let reader = std::io::BufReader::new(file);

    let values = match Array2::<f32>::read_npy(reader) {
        Ok(arr) => arr,
        Err(e) => {
            let file = std::fs::File::open(path.as_ref())?;
            let reader = std::io::BufReader::new(file);
            let arr_f64 = Array2::<f64>::read_npy(reader)
                .map_err(|_| DataError::FormatError(format!("Failed to read npy file: {}", e)))?;
            arr_f64.mapv(|x| x as f32)
        }
    };
    MultivariatePanel::from_array(values)
}

/// Write a `(V, T)` panel to a NumPy `.npy` file.
pub fn write_npy<P: AsRef<Path>>(path: P, panel: &MultivariatePanel) -> Result<()> {
    use ndarray_npy::WriteNpyExt;

    let file = std::fs::File::create(path.as_ref())?;
    let writer = std::io::BufWriter::new(file);
    panel
        .values()
        .write_npy(writer)
        .map_err(|e| DataError::FormatError(format!("Failed to write npy file: {}", e)))
}

/// Write a `(B, V, H)` forecast array to a NumPy `.npy` file.
pub fn write_forecast_npy<P: AsRef<Path>>(path: P, forecast: &Array3<f32>) -> Result<()> {
    use ndarray_npy::WriteNpyExt;

    let file = std::fs::File::create(path.as_ref())?;
    let writer = std::io::BufWriter::new(file);
    forecast
        .write_npy(writer)
        .map_err(|e| DataError::FormatError(format!("Failed to write npy file: {}", e)))
}

/// Read a long-format CSV with `unique_id`, `ds` and `y` columns.
///
/// Series appear in order of first occurrence. Rows within a series are
/// ordered by `ds`, numerically when the column is numeric. Every series
/// must cover the same timestamps.
#[cfg(feature = "polars-io")]
pub fn read_long_csv<P: AsRef<Path>>(path: P) -> Result<MultivariatePanel> {
    use polars::prelude::*;

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.as_ref().to_path_buf()))
        .map_err(|e| DataError::FormatError(format!("Failed to create CSV reader: {}", e)))?
        .finish()
        .map_err(|e| DataError::FormatError(format!("Failed to read CSV: {}", e)))?;

    let column = |name: &str| {
        df.column(name)
            .map_err(|e| DataError::FormatError(format!("Column '{}' not found: {}", name, e)))
    };
    let polars_err = |e: PolarsError| DataError::FormatError(e.to_string());

    let ids = column("unique_id")?
        .cast(&DataType::String)
        .map_err(polars_err)?;
    let ids = ids.str().map_err(polars_err)?;

    let ds = column("ds")?;
    let numeric_ds = ds.dtype().is_numeric();
    let ds_num = ds.cast(&DataType::Float64).map_err(polars_err)?;
    let ds_num = ds_num.f64().map_err(polars_err)?;
    let ds_str = ds.cast(&DataType::String).map_err(polars_err)?;
    let ds_str = ds_str.str().map_err(polars_err)?;

    let y = column("y")?.cast(&DataType::Float32).map_err(polars_err)?;
    let y = y.f32().map_err(polars_err)?;

    let mut order: Vec<String> = Vec::new();
    let mut rows: std::collections::HashMap<String, Vec<(TimeKey, f32)>> =
        std::collections::HashMap::new();

    for (row, ((id, (key_num, key_str)), value)) in ids
        .into_iter()
        .zip(ds_num.into_iter().zip(ds_str.into_iter()))
        .zip(y.into_iter())
        .enumerate()
    {
        let id = id.ok_or_else(|| DataError::FormatError(format!("missing unique_id at row {row}")))?;
        let key = if numeric_ds {
            TimeKey::Num(key_num.ok_or_else(|| DataError::FormatError(format!("missing ds at row {row}")))?)
        } else {
            TimeKey::Text(
                key_str
                    .ok_or_else(|| DataError::FormatError(format!("missing ds at row {row}")))?
                    .to_string(),
            )
        };
        let value = value.unwrap_or(f32::NAN);

        if !rows.contains_key(id) {
            order.push(id.to_string());
        }
        rows.entry(id.to_string()).or_default().push((key, value));
    }

    let mut series = Vec::with_capacity(order.len());
    let mut reference: Option<Vec<TimeKey>> = None;
    for id in &order {
        let mut obs = rows.remove(id).unwrap_or_default();
        obs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        let keys: Vec<TimeKey> = obs.iter().map(|(k, _)| k.clone()).collect();
        match &reference {
            Some(expected) if *expected != keys => {
                return Err(DataError::InvalidShape(format!(
                    "series '{}' does not share the timestamps of '{}'",
                    id, order[0]
                )));
            }
            Some(_) => {}
            None => reference = Some(keys),
        }
        series.push(obs.into_iter().map(|(_, v)| v).collect());
    }

    MultivariatePanel::from_rows(order, series)
}

#[cfg(feature = "polars-io")]
#[derive(Debug, Clone, PartialEq, PartialOrd)]
enum TimeKey {
    Num(f64),
    Text(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_npy_panel_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("panel.npy");

        let values = Array2::from_shape_fn((3, 12), |(v, t)| v as f32 + t as f32 * 0.5);
        let panel = MultivariatePanel::from_array(values).unwrap();
        write_npy(&path, &panel).unwrap();

        let back = read_npy(&path).unwrap();
        assert_eq!(back.n_series(), 3);
        assert_eq!(back.len(), 12);
        approx::assert_abs_diff_eq!(back.values()[[2, 11]], 7.5);
    }

    #[test]
    fn test_read_npy_accepts_f64() {
        use ndarray_npy::WriteNpyExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("panel64.npy");
        let values = Array2::<f64>::from_elem((2, 4), 1.25);
        values
            .write_npy(std::fs::File::create(&path).unwrap())
            .unwrap();

        let panel = read_npy(&path).unwrap();
        assert_eq!(panel.values()[[1, 3]], 1.25);
    }

    #[test]
    fn test_read_npy_missing_file() {
        assert!(matches!(
            read_npy("/nonexistent/panel.npy"),
            Err(DataError::IoError(_))
        ));
    }

    #[cfg(feature = "polars-io")]
    #[test]
    fn test_read_long_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("long.csv");
        std::fs::write(
            &path,
            "unique_id,ds,y\nb,2,20.0\na,1,1.0\nb,1,10.0\na,2,2.0\na,3,3.0\nb,3,30.0\n",
        )
        .unwrap();

        let panel = read_long_csv(&path).unwrap();
        assert_eq!(panel.ids(), &["b".to_string(), "a".to_string()]);
        assert_eq!(panel.values().row(0).to_vec(), vec![10.0, 20.0, 30.0]);
        assert_eq!(panel.values().row(1).to_vec(), vec![1.0, 2.0, 3.0]);
    }
}
