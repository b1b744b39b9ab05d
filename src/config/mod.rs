pub mod traits;
pub mod model;
pub mod training;
pub mod backtesting;
pub mod features;
pub mod manager;

pub use manager::{AppConfig, ConfigManager};
pub use model::{DeviceConfig, ModelConfig};
pub use training::{CheckpointConfig, RewardConfig, TrainingConfig};
pub use backtesting::BacktestingConfig;
pub use features::FeatureConfig;
pub use traits::ConfigSection;
