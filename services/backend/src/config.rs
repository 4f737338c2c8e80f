use serde::{Deserialize, Serialize};

use flux::config::CommonConfig;
use flux::ServerId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub id: ServerId,
    pub listen: String,
    /// Address advertised to Status/Gateway; usually `listen` with a
    /// routable host substituted for a bind-all address.
    pub public_addr: String,
    /// Number of reactor threads sessions are sharded across.
    #[serde(default = "default_reactor_threads")]
    pub reactor_threads: usize,

    #[serde(flatten)]
    pub common: CommonConfig,
}

fn default_reactor_threads() -> usize {
    4
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig {
            id: 0,
            listen: "0.0.0.0:1235".to_owned(),
            public_addr: "127.0.0.1:1235".to_owned(),
            reactor_threads: default_reactor_threads(),
            common: CommonConfig::default(),
        }
    }
}
