use serde::{Deserialize, Serialize};

use flux::config::CommonConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub listen: String,
    pub db_path: String,
    /// Seeds the snowflake generator backing `/register`; must be unique
    /// across every gateway/backend process sharing one deployment.
    pub worker_id: u16,

    #[serde(flatten)]
    pub common: CommonConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            listen: "0.0.0.0:8080".to_owned(),
            db_path: "gateway.sqlite3".to_owned(),
            worker_id: 0,
            common: CommonConfig::default(),
        }
    }
}
