use crate::error::{AlphagenError, Result};
use polars::prelude::*;
use std::path::Path;
use super::{
    types::{DatasetMetadata, MarketColumn},
    validator::DataValidator,
};
use std::collections::HashMap;

pub struct CsvConnector;

impl CsvConnector {
    /// Load CSV file into DataFrame
    pub fn load<P: AsRef<Path>>(path: P) -> Result<DataFrame> {
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(path.as_ref().to_path_buf()))?
            .finish()
            .map_err(|e| AlphagenError::DataLoading(format!("Failed to read CSV: {}", e)))?;

        Ok(df)
    }

    /// Load a file and check it can feed the market feature builder
    pub fn load_and_validate<P: AsRef<Path>>(
        path: P,
        min_rows: Option<usize>,
    ) -> Result<(DataFrame, HashMap<MarketColumn, String>)> {
        let df = Self::load(&path)?;

        let column_map = DataValidator::resolve_columns(&df)?;

        // Rolling features need some history to be meaningful
        let min_rows = min_rows.unwrap_or(30);
        DataValidator::validate_minimum_rows(&df, min_rows)?;

        if let Some(close) = column_map.get(&MarketColumn::Close) {
            DataValidator::validate_prices(&df, close)?;
        }

        let null_report = DataValidator::check_nulls(&df)?;
        if !null_report.is_empty() {
            log::warn!(
                "{}: null values detected {:?}, they will be forward filled",
                path.as_ref().display(),
                null_report
            );
        }

        Ok((df, column_map))
    }

    pub fn create_metadata<P: AsRef<Path>>(path: P, df: &DataFrame) -> Result<DatasetMetadata> {
        let columns: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect();

        let column_map = DataValidator::resolve_columns(df)?;
        let mut available: Vec<String> = column_map
            .keys()
            .map(|c| c.as_str().to_string())
            .collect();
        available.sort();

        let price_range = match column_map.get(&MarketColumn::Close) {
            Some(close_name) => {
                let close = df.column(close_name)?.cast(&DataType::Float64)?;
                let close = close.f64()?;
                (close.min().unwrap_or(0.0), close.max().unwrap_or(0.0))
            }
            None => (0.0, 0.0),
        };

        Ok(DatasetMetadata {
            file_path: path.as_ref().to_string_lossy().to_string(),
            num_rows: df.height(),
            num_columns: df.width(),
            columns,
            available,
            price_range,
        })
    }
}
