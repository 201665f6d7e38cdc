use std::time::Duration;

use crate::errors::ClientError;

const DEFAULT_GENERATE_PATH: &str = "/episode-orchestrator/generate-stream-mock";

/// Configuration for the generation client.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// API root, for example `http://localhost:3000/api/v1`.
    pub base_url: String,
    /// Path of the streaming generation endpoint under `base_url`.
    pub generate_path: String,
    /// Bound on connecting and on waiting for the response head. The body
    /// stream itself is not timed, since a generation can run for a long time.
    pub timeout: Duration,
    /// Bounded buffer between a spawned run and its consumer.
    pub state_buffer_capacity: usize,
}

impl ClientConfig {
    /// Creates a config with defaults for everything but the base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            generate_path: DEFAULT_GENERATE_PATH.to_string(),
            timeout: Duration::from_secs(600),
            state_buffer_capacity: 64,
        }
    }

    /// Builds a config from `SERVER_API_URL` and the optional
    /// `EPISODE_STREAM_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, ClientError> {
        let base_url = std::env::var("SERVER_API_URL").unwrap_or_default();
        if base_url.trim().is_empty() {
            return Err(ClientError::Config(
                "missing SERVER_API_URL for the generation client".into(),
            ));
        }
        let mut config = Self::new(base_url.trim());
        if let Ok(raw) = std::env::var("EPISODE_STREAM_TIMEOUT_SECS") {
            let secs = raw.trim().parse::<u64>().map_err(|e| {
                ClientError::Config(format!("invalid EPISODE_STREAM_TIMEOUT_SECS {raw:?}: {e}"))
            })?;
            config = config.timeout(Duration::from_secs(secs));
        }
        config.validate()?;
        Ok(config)
    }

    /// Overrides the generation endpoint path.
    pub fn generate_path(mut self, path: impl Into<String>) -> Self {
        self.generate_path = path.into();
        self
    }

    /// Overrides the connect and response-head timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Overrides the spawned-run state buffer size.
    pub fn state_buffer_capacity(mut self, capacity: usize) -> Self {
        self.state_buffer_capacity = capacity;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ClientError> {
        if self.base_url.trim().is_empty() {
            return Err(ClientError::Config("base_url must not be empty".into()));
        }
        if self.timeout.is_zero() {
            return Err(ClientError::Config("timeout must be greater than 0".into()));
        }
        if self.state_buffer_capacity == 0 {
            return Err(ClientError::Config(
                "state_buffer_capacity must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn generate_url(&self) -> String {
        let path = self.generate_path.trim_start_matches('/');
        format!("{}/{path}", self.base_url.trim_end_matches('/'))
    }
}
