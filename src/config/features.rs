use super::traits::{invalid, ConfigSection};
use crate::error::AlphagenError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Enabled feature channels. Market channels come first, then sentiment channels; the
/// concatenated order is the vocabulary's feature-token order and the tensor's channel order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub market: Vec<String>,
    pub sentiment: Vec<String>,
    /// Window for VOL and the TURNOVER fallback
    pub rolling_window: usize,
    /// Normalised values are clipped to +/- this many MADs
    pub clip_mad: f64,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            market: vec![
                "RET".to_string(),
                "VOL".to_string(),
                "VOLUME_CHG".to_string(),
                "TURNOVER".to_string(),
            ],
            sentiment: vec!["SENTIMENT".to_string(), "NEWS_COUNT".to_string()],
            rolling_window: 20,
            clip_mad: 5.0,
        }
    }
}

impl FeatureConfig {
    pub fn channel_names(&self) -> Vec<String> {
        self.market.iter().chain(self.sentiment.iter()).cloned().collect()
    }
}

impl ConfigSection for FeatureConfig {
    fn section_name() -> &'static str {
        "features"
    }

    fn validate(&self) -> Result<(), AlphagenError> {
        let names = self.channel_names();
        if names.is_empty() {
            return Err(invalid(Self::section_name(), "at least one feature channel is required"));
        }
        let mut seen = HashSet::new();
        for name in &names {
            if !seen.insert(name.as_str()) {
                return Err(invalid(
                    Self::section_name(),
                    format!("duplicate feature channel {}", name),
                ));
            }
        }
        if self.rolling_window < 2 {
            return Err(invalid(Self::section_name(), "rolling_window must be at least 2"));
        }
        if !(self.clip_mad > 0.0) {
            return Err(invalid(Self::section_name(), "clip_mad must be positive"));
        }
        Ok(())
    }
}
