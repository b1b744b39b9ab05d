use crate::error::{AlphagenError, Result};
use polars::prelude::*;
use super::types::MarketColumn;
use std::collections::HashMap;

pub struct DataValidator;

impl DataValidator {
    /// Resolve market columns through their aliases. Missing required columns are an error,
    /// missing optional ones are simply absent from the map.
    pub fn resolve_columns(df: &DataFrame) -> Result<HashMap<MarketColumn, String>> {
        let mut column_map = HashMap::new();

        for column in MarketColumn::all() {
            match Self::find_column(df, &column) {
                Some(name) => {
                    column_map.insert(column, name.to_string());
                }
                None if column.is_required() => {
                    return Err(AlphagenError::DataLoading(format!(
                        "Missing required column: {} (tried aliases: {:?})",
                        column.as_str(),
                        column.aliases()
                    )));
                }
                None => {}
            }
        }

        for (column, actual_name) in &column_map {
            let series = df.column(actual_name)?;
            if !matches!(
                series.dtype(),
                DataType::Float64
                    | DataType::Float32
                    | DataType::Int64
                    | DataType::Int32
                    | DataType::UInt64
                    | DataType::UInt32
            ) {
                return Err(AlphagenError::DataLoading(format!(
                    "Column '{}' ({}) must be numeric, found {:?}",
                    actual_name,
                    column.as_str(),
                    series.dtype()
                )));
            }
        }

        Ok(column_map)
    }

    /// Find column by checking aliases
    fn find_column(df: &DataFrame, column: &MarketColumn) -> Option<&'static str> {
        let columns = df.get_column_names();
        column
            .aliases()
            .into_iter()
            .find(|alias| columns.iter().any(|col| col.as_str() == *alias))
    }

    /// Close prices must be strictly positive for log returns
    pub fn validate_prices(df: &DataFrame, close_column: &str) -> Result<()> {
        let close = df.column(close_column)?.cast(&DataType::Float64)?;
        let close = close.f64()?;

        for (i, value) in close.into_iter().enumerate() {
            if let Some(price) = value {
                if !(price > 0.0) {
                    return Err(AlphagenError::DataLoading(format!(
                        "Invalid close price at row {}: {}",
                        i, price
                    )));
                }
            }
        }

        Ok(())
    }

    /// Check for minimum required rows
    pub fn validate_minimum_rows(df: &DataFrame, min_rows: usize) -> Result<()> {
        if df.height() < min_rows {
            return Err(AlphagenError::DataLoading(format!(
                "Insufficient data: {} rows, minimum {} required",
                df.height(),
                min_rows
            )));
        }
        Ok(())
    }

    /// Null counts per column, only for columns that have any
    pub fn check_nulls(df: &DataFrame) -> Result<Vec<(String, usize)>> {
        let mut null_report = Vec::new();

        for column in df.get_columns() {
            let null_count = column.null_count();
            if null_count > 0 {
                null_report.push((column.name().to_string(), null_count));
            }
        }

        Ok(null_report)
    }
}
