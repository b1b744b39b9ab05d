pub mod correlation;
pub mod engine;
pub mod profitability;
pub mod risk;

pub use engine::{FactorMetrics, MetricsEngine};
pub use profitability::ProfitabilityMetrics;
pub use risk::RiskMetrics;
