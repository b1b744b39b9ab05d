pub mod evaluation;
pub mod generation;
pub mod metrics;
pub mod mining;

pub use mining::{AlphaMiner, FailureKind, FormulaEvaluation, MiningReport, MiningRunner};
