use serde::{Deserialize, Serialize};

use flux::config::CommonConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusConfig {
    pub listen: String,

    #[serde(flatten)]
    pub common: CommonConfig,
}

impl Default for StatusConfig {
    fn default() -> Self {
        StatusConfig {
            listen: "0.0.0.0:9100".to_owned(),
            common: CommonConfig::default(),
        }
    }
}
