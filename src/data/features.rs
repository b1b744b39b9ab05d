//! The feature contract between the builders and the expression VM.
//!
//! A [`FeatureTensor`] is `[batch, channel, time]`: one row per instrument, one channel per
//! vocabulary feature token (in token order), one column per trading period. The
//! [`MarketFeatureBuilder`] produces it from per-instrument polars frames together with the
//! realized-return matrix the evaluator scores against.

use crate::config::FeatureConfig;
use crate::data::connectors::{DataValidator, MarketColumn};
use crate::error::{AlphagenError, Result};
use crate::functions::Vocabulary;
use ndarray::{s, Array2, Array3, ArrayView2, Axis};
use polars::prelude::*;

/// Immutable `[batch, channel, time]` input to the VM.
#[derive(Debug, Clone)]
pub struct FeatureTensor {
    data: Array3<f64>,
    channel_names: Option<Vec<String>>,
}

impl FeatureTensor {
    pub fn new(data: Array3<f64>) -> Self {
        Self {
            data,
            channel_names: None,
        }
    }

    pub fn with_channel_names(data: Array3<f64>, names: Vec<String>) -> Result<Self> {
        if names.len() != data.dim().1 {
            return Err(AlphagenError::DataLoading(format!(
                "{} channel names for {} channels",
                names.len(),
                data.dim().1
            )));
        }
        Ok(Self {
            data,
            channel_names: Some(names),
        })
    }

    pub fn from_shape_vec(shape: (usize, usize, usize), values: Vec<f64>) -> Result<Self> {
        Ok(Self::new(Array3::from_shape_vec(shape, values)?))
    }

    pub fn batch_size(&self) -> usize {
        self.data.dim().0
    }

    pub fn channels(&self) -> usize {
        self.data.dim().1
    }

    pub fn time_steps(&self) -> usize {
        self.data.dim().2
    }

    pub fn data(&self) -> &Array3<f64> {
        &self.data
    }

    pub fn channel_names(&self) -> Option<&[String]> {
        self.channel_names.as_deref()
    }

    /// `[batch, time]` view of one channel, `None` when out of range.
    pub fn channel(&self, index: usize) -> Option<ArrayView2<'_, f64>> {
        if index < self.channels() {
            Some(self.data.index_axis(Axis(1), index))
        } else {
            None
        }
    }

    /// Check the tensor can serve every feature token of `vocab`.
    /// Extra trailing channels are allowed and ignored.
    pub fn ensure_matches(&self, vocab: &Vocabulary) -> Result<()> {
        if self.channels() < vocab.feature_count() {
            return Err(AlphagenError::DataLoading(format!(
                "Tensor has {} channels, vocabulary references {}",
                self.channels(),
                vocab.feature_count()
            )));
        }
        if let Some(names) = &self.channel_names {
            for (i, (have, want)) in names.iter().zip(vocab.feature_names()).enumerate() {
                if have != want {
                    return Err(AlphagenError::DataLoading(format!(
                        "Channel {} is {} but vocabulary expects {}",
                        i, have, want
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Output of a feature build: the VM input and the matching realized returns.
#[derive(Debug, Clone)]
pub struct MarketFeatures {
    pub tensor: FeatureTensor,
    /// `[batch, time]` realized one-period log returns, not normalised
    pub returns: Array2<f64>,
}

pub struct MarketFeatureBuilder {
    config: FeatureConfig,
}

impl MarketFeatureBuilder {
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    /// Build one tensor row per frame. Frames are aligned on their most recent rows and
    /// truncated to the shortest history.
    pub fn build(&self, frames: &[DataFrame]) -> Result<MarketFeatures> {
        if frames.is_empty() {
            return Err(AlphagenError::DataLoading("No instruments supplied".to_string()));
        }

        let names = self.config.channel_names();
        let len = frames.iter().map(|df| df.height()).min().unwrap_or(0);
        if len < 2 {
            return Err(AlphagenError::DataLoading(format!(
                "Need at least 2 aligned periods, got {}",
                len
            )));
        }
        if frames.iter().any(|df| df.height() != len) {
            log::warn!("Instruments have different lengths, aligning on the last {} rows", len);
        }

        let mut data = Array3::zeros((frames.len(), names.len(), len));
        let mut returns = Array2::zeros((frames.len(), len));

        for (b, df) in frames.iter().enumerate() {
            let df = df.slice((df.height() - len) as i64, len);
            let (ret, channels) = self.channel_exprs(&df, &names)?;

            let mut outputs = vec![ret.alias(RETURN_COLUMN)];
            outputs.extend(
                channels
                    .iter()
                    .zip(&names)
                    .filter_map(|(expr, name)| expr.clone().map(|e| e.alias(name.as_str()))),
            );
            let computed = df.lazy().select(outputs).collect()?;

            for (c, name) in names.iter().enumerate() {
                // Channels without a source stay zero
                if channels[c].is_none() {
                    continue;
                }
                let normalised = robust_normalise(&column_f64(&computed, name)?, self.config.clip_mad);
                data.slice_mut(s![b, c, ..])
                    .assign(&ndarray::Array1::from_vec(normalised));
            }
            returns
                .slice_mut(s![b, ..])
                .assign(&ndarray::Array1::from_vec(column_f64(&computed, RETURN_COLUMN)?));
        }

        log::info!(
            "Built feature tensor [{}, {}, {}]",
            frames.len(),
            names.len(),
            len
        );

        Ok(MarketFeatures {
            tensor: FeatureTensor::with_channel_names(data, names)?,
            returns,
        })
    }

    /// One-period log return plus one expression per channel, `None` for a channel whose
    /// source column is absent.
    fn channel_exprs(&self, df: &DataFrame, names: &[String]) -> Result<(Expr, Vec<Option<Expr>>)> {
        let map = DataValidator::resolve_columns(df)?;
        let source = |column: MarketColumn| map.get(&column).map(|name| filled(name));

        let close = source(MarketColumn::Close)
            .ok_or_else(|| AlphagenError::DataLoading("Missing close column".to_string()))?;
        let volume = source(MarketColumn::Volume)
            .ok_or_else(|| AlphagenError::DataLoading("Missing volume column".to_string()))?;
        let window = RollingOptionsFixedWindow {
            window_size: self.config.rolling_window,
            min_periods: 1,
            ..Default::default()
        };

        let prev_close = close.clone().shift(lit(1));
        let ret = when(prev_close.clone().gt(lit(0.0)).and(close.clone().gt(lit(0.0))))
            .then((close / prev_close - lit(1.0)).log1p())
            .otherwise(lit(0.0));

        let mut channels = Vec::with_capacity(names.len());
        for name in names {
            let expr = match name.as_str() {
                "RET" => Some(ret.clone()),
                "VOL" => Some(ret.clone().rolling_std(window.clone()).fill_null(lit(0.0))),
                "VOLUME_CHG" => {
                    let prev = volume.clone().shift(lit(1));
                    Some(
                        when(prev.clone().neq(lit(0.0)))
                            .then(volume.clone() / prev - lit(1.0))
                            .otherwise(lit(0.0)),
                    )
                }
                "TURNOVER" => source(MarketColumn::Turnover).or_else(|| {
                    let mean = volume.clone().rolling_mean(window.clone());
                    Some(
                        when(mean.clone().neq(lit(0.0)))
                            .then(volume.clone() / mean)
                            .otherwise(lit(0.0)),
                    )
                }),
                "SENTIMENT" => {
                    let expr = source(MarketColumn::Sentiment);
                    if expr.is_none() {
                        log::warn!("No sentiment column, SENTIMENT channel is zero");
                    }
                    expr
                }
                "NEWS_COUNT" => match source(MarketColumn::NewsCount) {
                    Some(counts) => Some(
                        when(counts.clone().gt(lit(0.0)))
                            .then(counts)
                            .otherwise(lit(0.0))
                            .log1p(),
                    ),
                    None => {
                        log::warn!("No news column, NEWS_COUNT channel is zero");
                        None
                    }
                },
                // Any other channel is read verbatim from a column of the same (lowercase) name
                other => {
                    let column = other.to_lowercase();
                    if !df.get_column_names().iter().any(|c| c.as_str() == column) {
                        return Err(AlphagenError::DataLoading(format!(
                            "No source column for feature channel {}",
                            other
                        )));
                    }
                    Some(filled(&column))
                }
            };
            channels.push(expr);
        }
        Ok((ret, channels))
    }
}

/// Realized-return column carried alongside the channels.
const RETURN_COLUMN: &str = "__realized_return";

/// Column as f64 with nulls forward filled (leading nulls become 0).
fn filled(name: &str) -> Expr {
    col(name)
        .cast(DataType::Float64)
        .fill_null_with_strategy(FillNullStrategy::Forward(None))
        .fill_null(lit(0.0))
}

fn column_f64(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    Ok(df
        .column(name)?
        .f64()?
        .into_iter()
        .map(|v| v.unwrap_or(0.0))
        .collect())
}

fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// Median/MAD z-score clipped to `+/- clip`. Non-finite inputs map to 0.
pub fn robust_normalise(values: &[f64], clip: f64) -> Vec<f64> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    let mut sorted = finite.clone();
    let med = median(&mut sorted);
    let mut deviations: Vec<f64> = finite.iter().map(|v| (v - med).abs()).collect();
    let mad = median(&mut deviations) * 1.4826;

    values
        .iter()
        .map(|&v| {
            if !v.is_finite() {
                return 0.0;
            }
            let z = (v - med) / (mad + 1e-9);
            z.clamp(-clip, clip)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::df;

    fn frame(n: usize, offset: f64) -> DataFrame {
        let close: Vec<f64> = (0..n).map(|i| 100.0 + offset + (i as f64 * 0.7).sin()).collect();
        let volume: Vec<f64> = (0..n).map(|i| 1000.0 + 50.0 * (i % 7) as f64).collect();
        let sentiment: Vec<f64> = (0..n).map(|i| ((i % 5) as f64 - 2.0) / 2.0).collect();
        df! {
            "close" => close,
            "volume" => volume,
            "sentiment" => sentiment,
        }
        .unwrap()
    }

    #[test]
    fn test_tensor_shape_and_names() {
        let builder = MarketFeatureBuilder::new(FeatureConfig::default());
        let features = builder.build(&[frame(60, 0.0), frame(50, 5.0)]).unwrap();

        assert_eq!(features.tensor.batch_size(), 2);
        assert_eq!(features.tensor.channels(), 6);
        assert_eq!(features.tensor.time_steps(), 50);
        assert_eq!(features.returns.dim(), (2, 50));
        assert!(features.tensor.ensure_matches(&Vocabulary::standard()).is_ok());
    }

    #[test]
    fn test_values_are_clipped_and_finite() {
        let config = FeatureConfig::default();
        let clip = config.clip_mad;
        let features = MarketFeatureBuilder::new(config).build(&[frame(80, 0.0)]).unwrap();
        assert!(features
            .tensor
            .data()
            .iter()
            .all(|v| v.is_finite() && v.abs() <= clip));
        // Missing news column yields an all-zero channel
        let news = features.tensor.channel(5).unwrap();
        assert!(news.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_returns_are_log_returns_over_filled_prices() {
        let df = df! {
            "close" => [Some(100.0), None, Some(110.0), Some(121.0)],
            "volume" => [1000.0, 1100.0, 0.0, 500.0],
        }
        .unwrap();
        let features = MarketFeatureBuilder::new(FeatureConfig::default()).build(&[df]).unwrap();

        let returns = features.returns.row(0).to_vec();
        assert_eq!(returns[0], 0.0);
        // The missing price repeats the previous one
        assert!(returns[1].abs() < 1e-12);
        assert!((returns[2] - 1.1f64.ln()).abs() < 1e-12);
        assert!((returns[3] - 1.1f64.ln()).abs() < 1e-12);
        assert!(features.tensor.data().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_unknown_channel_needs_a_column() {
        let config = FeatureConfig {
            market: vec!["RET".to_string(), "SPREAD".to_string()],
            sentiment: vec![],
            ..FeatureConfig::default()
        };
        let builder = MarketFeatureBuilder::new(config.clone());
        assert!(builder.build(&[frame(30, 0.0)]).is_err());

        let spread: Vec<f64> = (0..30).map(|i| (i % 4) as f64).collect();
        let with_spread = frame(30, 0.0).hstack(&[Column::new("spread".into(), spread)]).unwrap();
        let features = builder.build(&[with_spread]).unwrap();
        assert_eq!(features.tensor.channels(), 2);
        assert!(features.tensor.channel(1).unwrap().iter().any(|&v| v != 0.0));
    }

    #[test]
    fn test_channel_out_of_range() {
        let tensor = FeatureTensor::new(Array3::zeros((1, 2, 4)));
        assert!(tensor.channel(1).is_some());
        assert!(tensor.channel(2).is_none());
    }

    #[test]
    fn test_mismatched_channel_names() {
        let tensor = FeatureTensor::with_channel_names(
            Array3::zeros((1, 6, 4)),
            ["VOL", "RET", "VOLUME_CHG", "TURNOVER", "SENTIMENT", "NEWS_COUNT"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        )
        .unwrap();
        assert!(tensor.ensure_matches(&Vocabulary::standard()).is_err());
    }

    #[test]
    fn test_robust_normalise_centres_on_median() {
        let out = robust_normalise(&[1.0, 2.0, 3.0, 4.0, 100.0], 5.0);
        assert_eq!(out[2], 0.0);
        assert_eq!(out[4], 5.0);
    }
}
