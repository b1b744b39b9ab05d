//! Alpha factor mining: a policy network samples postfix formulas over market features,
//! a stack VM executes them, and a backtest turns each factor into a training reward.

pub mod config;
pub mod data;
pub mod engines;
pub mod error;
pub mod functions;
pub mod types;

pub use config::{AppConfig, ConfigManager};
pub use data::{FeatureTensor, MarketFeatureBuilder};
pub use engines::evaluation::{FactorEvaluator, FormulaParser, StackVm};
pub use engines::generation::{AlphaGenerator, AlphaTrainer};
pub use engines::metrics::FactorMetrics;
pub use engines::mining::{AlphaMiner, FormulaEvaluation};
pub use error::{AlphagenError, Result};
pub use functions::Vocabulary;
pub use types::{BestFormula, Formula, Token, TrainingRecord};
