use secrecy::{ExposeSecret, SecretString};

/// `api_url` value that routes every CRM-facing operation to the simulated store.
pub const SIMULATION_API_URL: &str = "simulation";

/// Per-request CRM credentials supplied by the caller.
#[derive(Clone, Debug)]
pub struct ConnectionContext {
    pub api_url: String,
    pub api_key: String,
    pub api_secret: SecretString,
}

impl ConnectionContext {
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        Self {
            api_url: api_url.into(),
            api_key: api_key.into(),
            api_secret: SecretString::from(api_secret.into()),
        }
    }

    pub fn simulation() -> Self {
        Self::new(SIMULATION_API_URL, "simulation", "simulation")
    }

    pub fn is_simulation(&self) -> bool {
        self.api_url == SIMULATION_API_URL
    }

    /// Value for the `Authorization` header expected by the CRM REST API.
    pub fn authorization(&self) -> String {
        format!("token {}:{}", self.api_key, self.api_secret.expose_secret())
    }

    /// Base URL without trailing slashes, for joining `/api/...` paths.
    pub fn base_url(&self) -> &str {
        self.api_url.trim_end_matches('/')
    }

    pub fn missing_field(&self) -> Option<&'static str> {
        if self.api_url.trim().is_empty() {
            Some("apiUrl")
        } else if self.api_key.trim().is_empty() {
            Some("apiKey")
        } else if self.api_secret.expose_secret().trim().is_empty() {
            Some("apiSecret")
        } else {
            None
        }
    }
}
