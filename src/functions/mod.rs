pub mod primitives;
pub mod registry;
pub mod timeseries;
pub mod traits;

pub use registry::{standard_operators, Vocabulary, DEFAULT_FEATURES};
pub use traits::{OperatorFn, OperatorSpec};
