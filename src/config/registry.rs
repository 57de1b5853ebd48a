use std::time::Duration;

use serde::Deserialize;

/// Upstream registry the control plane pushes state artifacts to and
/// provisions robot accounts on.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Base URL, with or without scheme (e.g. "https://reg.example.com").
    pub url: String,
    pub username: String,
    pub password: String,
    /// Top-level project that holds every state artifact.
    pub state_namespace: String,
    pub timeout_secs: u64,
}

impl RegistryConfig {
    /// Registry host with any URL scheme and trailing slash removed.
    #[must_use]
    pub fn host(&self) -> &str {
        let url = self
            .url
            .split_once("://")
            .map_or(self.url.as_str(), |(_, rest)| rest);
        url.trim_end_matches('/')
    }

    /// Base URL including a scheme, defaulting to https.
    #[must_use]
    pub fn base_url(&self) -> String {
        if self.url.contains("://") {
            self.url.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", self.host())
        }
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl std::fmt::Debug for RegistryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("state_namespace", &self.state_namespace)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            username: String::new(),
            password: String::new(),
            state_namespace: "satellite".to_string(),
            timeout_secs: 30,
        }
    }
}
