use super::{
    backtesting::BacktestingConfig,
    features::FeatureConfig,
    model::{DeviceConfig, ModelConfig},
    training::{CheckpointConfig, RewardConfig, TrainingConfig},
    traits::ConfigSection,
};
use crate::error::AlphagenError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

/// Environment variables prefixed with this override file values,
/// e.g. `ALPHAGEN__TRAINING__BATCH_SIZE=64`.
pub const ENV_PREFIX: &str = "ALPHAGEN";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub device: DeviceConfig,
    pub model: ModelConfig,
    pub training: TrainingConfig,
    pub reward: RewardConfig,
    pub backtesting: BacktestingConfig,
    pub features: FeatureConfig,
    pub checkpoint: CheckpointConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), AlphagenError> {
        self.device.validate()?;
        self.model.validate()?;
        self.training.validate()?;
        self.reward.validate()?;
        self.backtesting.validate()?;
        self.features.validate()?;
        self.checkpoint.validate()?;
        Ok(())
    }

    /// Parse a TOML document without environment overrides.
    pub fn from_toml_str(contents: &str) -> Result<Self, AlphagenError> {
        let config: AppConfig = toml::from_str(contents)
            .map_err(|e| AlphagenError::Configuration(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }
}

pub struct ConfigManager {
    config: Arc<RwLock<AppConfig>>,
}

impl ConfigManager {
    pub fn new() -> Self {
        Self {
            config: Arc::new(RwLock::new(AppConfig::default())),
        }
    }

    /// Load a TOML file layered with `ALPHAGEN__*` environment overrides.
    pub fn load_from_file<P: AsRef<Path>>(&self, path: P) -> Result<(), AlphagenError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(AlphagenError::Configuration(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        let config: AppConfig = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Toml))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        log::info!("Loaded configuration from {}", path.display());

        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;
        Ok(())
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), AlphagenError> {
        let config = self.get();
        let toml_str = toml::to_string_pretty(&config)
            .map_err(|e| AlphagenError::Configuration(format!("Failed to serialize: {}", e)))?;

        std::fs::write(path, toml_str)
            .map_err(|e| AlphagenError::Configuration(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    pub fn get(&self) -> AppConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Apply `f` to a copy and commit it only if the result validates.
    pub fn update<F>(&self, f: F) -> Result<(), AlphagenError>
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut candidate = self.get();
        f(&mut candidate);
        candidate.validate()?;
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = candidate;
        Ok(())
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            [training]
            batch_size = 32
            seed = 7

            [model]
            d_model = 32
            "#,
        )
        .unwrap();

        assert_eq!(config.training.batch_size, 32);
        assert_eq!(config.training.seed, Some(7));
        assert_eq!(config.model.d_model, 32);
        assert_eq!(config.model.n_heads, ModelConfig::default().n_heads);
        assert_eq!(config.reward, RewardConfig::default());
    }

    #[test]
    fn test_rejected_update_is_not_committed() {
        let manager = ConfigManager::new();
        let result = manager.update(|c| c.model.n_heads = 3);
        assert!(result.is_err());
        assert_eq!(manager.get().model.n_heads, 4);

        manager.update(|c| c.training.batch_size = 16).unwrap();
        assert_eq!(manager.get().training.batch_size, 16);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alphagen.toml");

        let manager = ConfigManager::new();
        manager
            .update(|c| {
                c.training.learning_rate = 5e-4;
                c.features.sentiment.clear();
            })
            .unwrap();
        manager.save_to_file(&path).unwrap();

        let reloaded = ConfigManager::new();
        reloaded.load_from_file(&path).unwrap();
        assert_eq!(reloaded.get().training.learning_rate, 5e-4);
        assert!(reloaded.get().features.sentiment.is_empty());
    }

    #[test]
    fn test_duplicate_feature_channel_rejected() {
        let manager = ConfigManager::new();
        let result = manager.update(|c| c.features.sentiment.push("RET".to_string()));
        assert!(matches!(result, Err(AlphagenError::Configuration(_))));
    }
}
