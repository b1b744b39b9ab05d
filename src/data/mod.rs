pub mod connectors;
pub mod features;

pub use connectors::{CsvConnector, DataValidator, DatasetMetadata, MarketColumn};
pub use features::{FeatureTensor, MarketFeatureBuilder, MarketFeatures};
