pub mod backtester;
pub mod expression;
pub mod parser;
pub mod portfolio;

pub use backtester::FactorEvaluator;
pub use expression::{sanitize, StackVm};
pub use parser::FormulaParser;
pub use portfolio::Portfolio;
