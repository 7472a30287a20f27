use anyhow::{Context, Result};
use data_model::{Application, Offer};
use serde::{Deserialize, Serialize};

/// One offer batch from the resource manager together with the applications
/// to enqueue before it is matched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OfferBatch {
    #[serde(default)]
    pub applications: Vec<Application>,
    #[serde(default)]
    pub offers: Vec<Offer>,
}

impl OfferBatch {
    pub fn from_path(path: &str) -> Result<OfferBatch> {
        let batch_str =
            std::fs::read_to_string(path).with_context(|| format!("reading batch file {path}"))?;
        Self::from_yaml_str(&batch_str)
    }

    pub fn from_yaml_str(batch_str: &str) -> Result<OfferBatch> {
        Ok(serde_yaml::from_str(batch_str)?)
    }
}
