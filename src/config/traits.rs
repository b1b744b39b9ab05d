use crate::error::AlphagenError;
use serde::{Deserialize, Serialize};

/// Trait for configuration sections
pub trait ConfigSection: Serialize + for<'de> Deserialize<'de> + Default + Clone {
    fn section_name() -> &'static str;
    fn validate(&self) -> Result<(), AlphagenError>;
}

/// Shorthand for the error every section returns on a rejected field.
pub(crate) fn invalid(section: &str, message: impl Into<String>) -> AlphagenError {
    AlphagenError::Configuration(format!("[{}] {}", section, message.into()))
}
