use serde::{Deserialize, Serialize};

/// Source columns the market feature builder reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketColumn {
    Close,
    Volume,
    Turnover,
    Sentiment,
    NewsCount,
}

impl MarketColumn {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Close => "close",
            Self::Volume => "volume",
            Self::Turnover => "turnover",
            Self::Sentiment => "sentiment",
            Self::NewsCount => "news_count",
        }
    }

    pub fn all() -> Vec<Self> {
        vec![
            Self::Close,
            Self::Volume,
            Self::Turnover,
            Self::Sentiment,
            Self::NewsCount,
        ]
    }

    /// Close and volume are mandatory; the rest fall back to derived or zero channels.
    pub fn is_required(&self) -> bool {
        matches!(self, Self::Close | Self::Volume)
    }

    /// Common alternative column names
    pub fn aliases(&self) -> Vec<&'static str> {
        match self {
            Self::Close => vec!["close", "Close", "CLOSE", "c"],
            Self::Volume => vec!["volume", "Volume", "VOLUME", "vol", "Vol", "v"],
            Self::Turnover => vec!["turnover", "Turnover", "turnover_rate", "TURNOVER"],
            Self::Sentiment => vec!["sentiment", "Sentiment", "sentiment_score", "SENTIMENT"],
            Self::NewsCount => vec!["news_count", "NewsCount", "news", "NEWS_COUNT"],
        }
    }
}

/// Metadata about a loaded CSV file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetMetadata {
    pub file_path: String,
    pub num_rows: usize,
    pub num_columns: usize,
    pub columns: Vec<String>,
    /// Market columns that were found (by canonical name)
    pub available: Vec<String>,
    pub price_range: (f64, f64),
}
