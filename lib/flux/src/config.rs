//! TOML configuration loading: a `serdeconv::from_toml_file` call wrapped in
//! a `ChatResult`, plus the small set of fields every service in the workspace
//! shares (Redis url, intervals, TTLs) so each service's own config struct can
//! embed them with `#[serde(flatten)]` instead of re-declaring them.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ChatError, ChatResult};

/// Loads and deserializes a TOML config file of type `T`.
pub fn load<T>(path: impl AsRef<Path>) -> ChatResult<T>
where
    T: serde::de::DeserializeOwned,
{
    let path = path.as_ref();
    serdeconv::from_toml_file(path)
        .map_err(|e| ChatError::Internal(format!("failed to load config {}: {}", path.display(), e)))
}

/// Fields shared by every service's config: where Redis lives, and the
/// handful of intervals and TTLs the workers below hang off of. Each service
/// embeds this with `#[serde(flatten)]` and adds its own listen address etc.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommonConfig {
    /// `redis://host:port/db` connection string.
    pub redis_url: String,

    /// Base URL of the Status service, e.g. `http://127.0.0.1:9100`.
    pub status_url: String,

    /// How often the backend mirrors server_list into the local cache, in ms.
    #[serde(default = "default_mirror_interval_ms")]
    pub mirror_interval_ms: u64,

    /// How often a backend reports its load to Status, in ms.
    #[serde(default = "default_report_interval_ms")]
    pub report_interval_ms: u64,

    /// How often the online-status writer flushes batched TTL refreshes, in ms.
    #[serde(default = "default_online_flush_interval_ms")]
    pub online_flush_interval_ms: u64,

    /// TTL, in seconds, of the `status:{uid}` single-login claim hash.
    #[serde(default = "default_login_claim_ttl_secs")]
    pub login_claim_ttl_secs: u64,

    /// TTL, in seconds, of a minted `token:{t}` entry.
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,

    /// Idle-keepalive/timeout window for backend sessions, in ms.
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u64,
}

fn default_mirror_interval_ms() -> u64 {
    2_000
}

fn default_report_interval_ms() -> u64 {
    5_000
}

fn default_online_flush_interval_ms() -> u64 {
    1_000
}

fn default_login_claim_ttl_secs() -> u64 {
    60
}

fn default_token_ttl_secs() -> u64 {
    // A login token only bridges the HTTP login response and the client's
    // first VERIFY frame, so a short window is the more defensible default;
    // deployments that need longer can override it.
    50
}

fn default_session_timeout_ms() -> u64 {
    40_000
}

impl Default for CommonConfig {
    fn default() -> Self {
        CommonConfig {
            redis_url: "redis://127.0.0.1:6379/0".to_owned(),
            status_url: "http://127.0.0.1:9100".to_owned(),
            mirror_interval_ms: default_mirror_interval_ms(),
            report_interval_ms: default_report_interval_ms(),
            online_flush_interval_ms: default_online_flush_interval_ms(),
            login_claim_ttl_secs: default_login_claim_ttl_secs(),
            token_ttl_secs: default_token_ttl_secs(),
            session_timeout_ms: default_session_timeout_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[derive(Debug, Deserialize)]
    struct TestConfig {
        #[serde(flatten)]
        common: CommonConfig,
        listen: String,
    }

    #[test]
    fn loads_flattened_common_fields() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(
            f,
            r#"
listen = "0.0.0.0:9000"
redis_url = "redis://127.0.0.1:6379/1"
status_url = "http://127.0.0.1:9100"
"#
        )
        .unwrap();

        let cfg: TestConfig = load(f.path()).unwrap();
        assert_eq!(cfg.listen, "0.0.0.0:9000");
        assert_eq!(cfg.common.redis_url, "redis://127.0.0.1:6379/1");
        assert_eq!(cfg.common.login_claim_ttl_secs, 60);
    }

    #[test]
    fn missing_file_is_internal_error() {
        let err = load::<TestConfig>("/nonexistent/path.toml").unwrap_err();
        assert!(matches!(err, ChatError::Internal(_)));
    }
}
