mod csv;
mod types;
mod validator;

pub use csv::CsvConnector;
pub use types::{DatasetMetadata, MarketColumn};
pub use validator::DataValidator;
