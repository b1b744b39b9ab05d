use super::traits::{invalid, ConfigSection};
use crate::error::{AlphagenError, Result};
use candle_core::Device;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Cpu,
    Cuda,
    /// CUDA when compiled in and present, CPU otherwise
    Auto,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub kind: DeviceKind,
    pub ordinal: usize,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            kind: DeviceKind::Cpu,
            ordinal: 0,
        }
    }
}

impl DeviceConfig {
    pub fn to_device(&self) -> Result<Device> {
        match self.kind {
            DeviceKind::Cpu => Ok(Device::Cpu),
            DeviceKind::Cuda => Device::new_cuda(self.ordinal).map_err(AlphagenError::from),
            DeviceKind::Auto => Device::cuda_if_available(self.ordinal).map_err(AlphagenError::from),
        }
    }
}

impl ConfigSection for DeviceConfig {
    fn section_name() -> &'static str {
        "device"
    }

    fn validate(&self) -> std::result::Result<(), AlphagenError> {
        Ok(())
    }
}

/// Generator architecture. Every field here is persisted next to the weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub d_model: usize,
    pub n_heads: usize,
    pub n_layers: usize,
    pub max_formula_len: usize,
    pub ff_mult: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            d_model: 64,
            n_heads: 4,
            n_layers: 2,
            max_formula_len: 8,
            ff_mult: 4,
        }
    }
}

impl ConfigSection for ModelConfig {
    fn section_name() -> &'static str {
        "model"
    }

    fn validate(&self) -> std::result::Result<(), AlphagenError> {
        if self.d_model == 0 || self.n_heads == 0 || self.n_layers == 0 {
            return Err(invalid(
                Self::section_name(),
                "d_model, n_heads and n_layers must be positive",
            ));
        }
        if self.d_model % self.n_heads != 0 {
            return Err(invalid(
                Self::section_name(),
                format!("d_model {} is not divisible by n_heads {}", self.d_model, self.n_heads),
            ));
        }
        if self.max_formula_len == 0 || self.max_formula_len > 64 {
            return Err(invalid(
                Self::section_name(),
                "max_formula_len must be between 1 and 64",
            ));
        }
        if self.ff_mult == 0 {
            return Err(invalid(Self::section_name(), "ff_mult must be positive"));
        }
        Ok(())
    }
}
