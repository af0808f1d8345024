use std::time::Duration;

use ssb_api::{Configuration as ApiConfiguration, Endpoints};

use crate::error::{Result, StatbankError};

/// Configuration for the Statbank client
#[derive(Debug, Clone)]
pub struct StatbankConfig {
    /// Base URL for PxWebApi
    pub base_url: String,
    /// Absolute URL of the publication calendar
    pub calendar_url: String,
    /// Response language ("no" or "en")
    pub language: String,
    /// User agent for HTTP requests
    pub user_agent: String,
    /// Timeout per outbound call
    pub request_timeout: Duration,
    /// Lifetime of cached table metadata; zero disables the cache
    pub metadata_cache_ttl: Duration,
    /// Endpoint path templates
    pub endpoints: Endpoints,
}

impl Default for StatbankConfig {
    fn default() -> Self {
        Self {
            base_url: ssb_api::client::DEFAULT_BASE_PATH.to_string(),
            calendar_url: ssb_api::client::DEFAULT_CALENDAR_URL.to_string(),
            language: "no".to_string(),
            user_agent: concat!("ssb-rs/", env!("CARGO_PKG_VERSION")).to_string(),
            request_timeout: Duration::from_secs(30),
            metadata_cache_ttl: Duration::from_secs(300),
            endpoints: Endpoints::default(),
        }
    }
}

impl StatbankConfig {
    /// Create a new configuration for data.ssb.no
    pub fn new() -> Self {
        Self::default()
    }

    /// Point the client at another PxWebApi deployment
    pub fn with_base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the publication calendar URL
    pub fn with_calendar_url<S: Into<String>>(mut self, calendar_url: S) -> Self {
        self.calendar_url = calendar_url.into();
        self
    }

    /// Set the response language
    pub fn with_language<S: Into<String>>(mut self, language: S) -> Self {
        self.language = language.into();
        self
    }

    /// Set custom user agent
    pub fn with_user_agent<S: Into<String>>(mut self, user_agent: S) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set the per-call request timeout
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.request_timeout = Duration::from_secs(timeout_secs);
        self
    }

    /// Set the metadata cache lifetime; 0 disables caching
    pub fn with_metadata_cache_ttl(mut self, ttl_secs: u64) -> Self {
        self.metadata_cache_ttl = Duration::from_secs(ttl_secs);
        self
    }

    /// Override the endpoint path templates
    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Build the low-level client configuration, including the HTTP client
    /// carrying the timeout and user agent.
    pub(crate) fn api_configuration(&self) -> Result<ApiConfiguration> {
        if self.request_timeout.is_zero() {
            return Err(StatbankError::config_error(
                "request timeout must be greater than zero",
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(self.request_timeout)
            .user_agent(&self.user_agent)
            .build()
            .map_err(|e| StatbankError::config_error(format!("cannot build HTTP client: {e}")))?;

        let configuration = ApiConfiguration {
            base_path: self.base_url.clone(),
            calendar_url: self.calendar_url.clone(),
            language: self.language.clone(),
            user_agent: Some(self.user_agent.clone()),
            client,
            endpoints: self.endpoints.clone(),
        };
        configuration
            .validate()
            .map_err(|e| StatbankError::config_error(format!("invalid URL: {e}")))?;

        Ok(configuration)
    }
}
