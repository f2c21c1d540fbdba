//! # Data Loading and Validation Module
//!
//! Reads tab-separated tables into the dense `ndarray` structures the path
//! solvers consume. One column holds the outcome, an optional `sample_id`
//! column labels the rows, and every other column is a numeric feature in
//! file order.
//!
//! - Strict values: every cell of every used column must be a finite number.
//!   Nulls, text and non-finite values are reported with the column name.
//! - Prediction input is matched to the fitted features by name, so column
//!   order in the prediction file does not matter.

use ndarray::{Array1, Array2, ShapeBuilder};
use polars::prelude::*;
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

/// Name of the optional row-label column.
pub const SAMPLE_ID_COLUMN: &str = "sample_id";

/// A container for validated data ready for a path fit.
#[derive(Debug)]
pub struct PathData {
    /// Shape: [n_samples, n_features], column-major.
    pub x: Array2<f64>,
    pub y: Array1<f64>,
    pub feature_names: Vec<String>,
    pub sample_ids: Vec<String>,
}

/// A container for validated data ready for prediction.
#[derive(Debug)]
pub struct FeatureData {
    /// Columns ordered as requested by the caller.
    pub x: Array2<f64>,
    /// If an input column `sample_id` exists it is used; otherwise sequential
    /// 1-based IDs are generated.
    pub sample_ids: Vec<String>,
}

/// A comprehensive error type for all data loading and validation failures.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Could not arrange the feature columns into a matrix: {0}")]
    ShapeError(#[from] ndarray::ShapeError),
    #[error(
        "The required column '{0}' was not found in the input file. Please check spelling and case."
    )]
    ColumnNotFound(String),
    #[error(
        "The column '{column_name}' could not be converted to the expected type '{expected_type}'. (Found type: {found_type})"
    )]
    ColumnWrongType {
        column_name: String,
        expected_type: &'static str,
        found_type: String,
    },
    #[error(
        "Missing or null values were found in the column '{0}'. Complete data is required."
    )]
    MissingValuesFound(String),
    #[error("Input file contains only {found} data rows, but at least {required} are required.")]
    InsufficientRows { found: usize, required: usize },
    #[error("Non-finite values (NaN or Infinity) were found in the column '{0}'.")]
    NonFiniteValuesFound(String),
    #[error("The input file has no feature columns besides '{0}'.")]
    NoFeatureColumns(String),
}

/// Loads a table for fitting: `outcome_column` becomes `y`, the rest become `x`.
pub fn load_path_data(path: &Path, outcome_column: &str) -> Result<PathData, DataError> {
    let df = read_table(path)?;
    let columns = column_names(&df);
    if !columns.iter().any(|c| c == outcome_column) {
        return Err(DataError::ColumnNotFound(outcome_column.to_string()));
    }

    let feature_names: Vec<String> = columns
        .into_iter()
        .filter(|c| c != outcome_column && c != SAMPLE_ID_COLUMN)
        .collect();
    if feature_names.is_empty() {
        return Err(DataError::NoFeatureColumns(outcome_column.to_string()));
    }

    let y = Array1::from_vec(extract_numeric_column(&df, outcome_column)?);
    let x = assemble_matrix(&df, &feature_names)?;
    let sample_ids = build_sample_ids(&df, df.height())?;
    log::info!(
        "Loaded {} samples with {} features from '{}'",
        x.nrows(),
        x.ncols(),
        path.display()
    );

    Ok(PathData {
        x,
        y,
        feature_names,
        sample_ids,
    })
}

/// Loads the named feature columns for prediction. Other columns are ignored.
pub fn load_feature_data(path: &Path, feature_names: &[String]) -> Result<FeatureData, DataError> {
    let df = read_table(path)?;
    let available: HashSet<String> = column_names(&df).into_iter().collect();
    for name in feature_names {
        if !available.contains(name) {
            return Err(DataError::ColumnNotFound(name.clone()));
        }
    }

    let x = assemble_matrix(&df, feature_names)?;
    let sample_ids = build_sample_ids(&df, df.height())?;
    log::info!(
        "Loaded {} samples for prediction from '{}'",
        x.nrows(),
        path.display()
    );
    Ok(FeatureData { x, sample_ids })
}

fn read_table(path: &Path) -> Result<DataFrame, DataError> {
    log::debug!("Reading '{}'", path.display());
    let df = CsvReader::new(File::open(path)?)
        .with_options(
            CsvReadOptions::default()
                .with_has_header(true)
                .with_parse_options(CsvParseOptions::default().with_separator(b'\t')),
        )
        .finish()?;

    if df.height() == 0 {
        return Err(DataError::InsufficientRows {
            found: 0,
            required: 1,
        });
    }
    Ok(df)
}

fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .into_iter()
        .map(|s| s.to_string())
        .collect()
}

fn extract_numeric_column(df: &DataFrame, column_name: &str) -> Result<Vec<f64>, DataError> {
    let series = df.column(column_name)?;
    if series.null_count() > 0 {
        return Err(DataError::MissingValuesFound(column_name.to_string()));
    }

    let wrong_type = || DataError::ColumnWrongType {
        column_name: column_name.to_string(),
        expected_type: "f64 (numeric)",
        found_type: format!("{:?}", series.dtype()),
    };
    let casted = series.cast(&DataType::Float64).map_err(|_| wrong_type())?;
    // Non-strict casts turn unparseable text into nulls.
    if casted.null_count() > 0 {
        return Err(wrong_type());
    }

    let chunked = casted.f64()?.rechunk();
    let values: Vec<f64> = chunked.into_no_null_iter().collect();
    if values.iter().any(|v| !v.is_finite()) {
        return Err(DataError::NonFiniteValuesFound(column_name.to_string()));
    }
    Ok(values)
}

fn assemble_matrix(df: &DataFrame, names: &[String]) -> Result<Array2<f64>, DataError> {
    let n = df.height();
    let mut buffer = Vec::with_capacity(n * names.len());
    for name in names {
        let mut column = extract_numeric_column(df, name)?;
        buffer.append(&mut column);
    }
    Ok(Array2::from_shape_vec((n, names.len()).f(), buffer)?)
}

fn build_sample_ids(df: &DataFrame, n: usize) -> Result<Vec<String>, DataError> {
    let sequential = || (1..=n).map(|i| i.to_string()).collect::<Vec<_>>();
    if !column_names(df).iter().any(|c| c == SAMPLE_ID_COLUMN) {
        return Ok(sequential());
    }

    let series = df.column(SAMPLE_ID_COLUMN)?;
    if series.null_count() > 0 {
        log::warn!("'{SAMPLE_ID_COLUMN}' has missing entries; using row numbers instead");
        return Ok(sequential());
    }

    let mut ids = Vec::with_capacity(n);
    for i in 0..n {
        let text = match series.get(i)? {
            AnyValue::String(s) => s.to_string(),
            AnyValue::StringOwned(s) => s.to_string(),
            AnyValue::Null => String::new(),
            other => other.to_string(),
        };
        ids.push(if text.is_empty() {
            (i + 1).to_string()
        } else {
            text
        });
    }
    Ok(ids)
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Write};
    use tempfile::NamedTempFile;

    /// Writes `content` to a temporary TSV file.
    fn create_test_tsv(content: &str) -> io::Result<NamedTempFile> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "{}", content)?;
        file.flush()?;
        Ok(file)
    }

    #[test]
    fn loads_outcome_features_and_ids() {
        let file = create_test_tsv(
            "sample_id\tg1\toutcome\tg2\ns1\t0.5\t1\t-1.0\ns2\t1.5\t0\t2.0\ns3\t-0.5\t1\t0.0",
        )
        .unwrap();
        let data = load_path_data(file.path(), "outcome").unwrap();

        assert_eq!(data.feature_names, vec!["g1", "g2"]);
        assert_eq!(data.x.shape(), &[3, 2]);
        assert_eq!(data.x[[1, 0]], 1.5);
        assert_eq!(data.x[[0, 1]], -1.0);
        assert_eq!(data.y.to_vec(), vec![1.0, 0.0, 1.0]);
        assert_eq!(data.sample_ids, vec!["s1", "s2", "s3"]);
    }

    #[test]
    fn generates_ids_when_the_column_is_absent() {
        let file = create_test_tsv("y\ta\n1.0\t2.0\n3.0\t4.0").unwrap();
        let data = load_path_data(file.path(), "y").unwrap();
        assert_eq!(data.sample_ids, vec!["1", "2"]);
        assert_eq!(data.feature_names, vec!["a"]);
    }

    #[test]
    fn missing_outcome_column_is_named() {
        let file = create_test_tsv("y\ta\n1.0\t2.0").unwrap();
        match load_path_data(file.path(), "outcome").unwrap_err() {
            DataError::ColumnNotFound(col) => assert_eq!(col, "outcome"),
            other => panic!("Expected ColumnNotFound(outcome), got {:?}", other),
        }
    }

    #[test]
    fn table_without_features_is_rejected() {
        let file = create_test_tsv("outcome\tsample_id\n1\ta\n0\tb").unwrap();
        assert!(matches!(
            load_path_data(file.path(), "outcome"),
            Err(DataError::NoFeatureColumns(_))
        ));
    }

    #[test]
    fn non_numeric_feature_is_rejected() {
        let file = create_test_tsv("outcome\tg1\n1\t0.5\n0\tabc").unwrap();
        match load_path_data(file.path(), "outcome").unwrap_err() {
            DataError::ColumnWrongType { column_name, .. } => assert_eq!(column_name, "g1"),
            other => panic!("Expected ColumnWrongType(g1), got {:?}", other),
        }
    }

    #[test]
    fn non_finite_values_are_rejected() {
        let file = create_test_tsv("outcome\tg1\n1\t0.5\n0\tNaN").unwrap();
        match load_path_data(file.path(), "outcome").unwrap_err() {
            DataError::NonFiniteValuesFound(col) => assert_eq!(col, "g1"),
            other => panic!("Expected NonFiniteValuesFound(g1), got {:?}", other),
        }
    }

    #[test]
    fn prediction_columns_follow_the_requested_order() {
        let file = create_test_tsv("b\tunused\ta\n1.0\t9.0\t2.0\n3.0\t9.0\t4.0").unwrap();
        let names = vec!["a".to_string(), "b".to_string()];
        let data = load_feature_data(file.path(), &names).unwrap();
        assert_eq!(data.x.row(0).to_vec(), vec![2.0, 1.0]);
        assert_eq!(data.x.row(1).to_vec(), vec![4.0, 3.0]);

        let missing = vec!["c".to_string()];
        assert!(matches!(
            load_feature_data(file.path(), &missing),
            Err(DataError::ColumnNotFound(_))
        ));
    }
}
