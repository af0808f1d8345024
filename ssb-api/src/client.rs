use crate::models;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use url::Url;

/// Default base URL for PxWebApi v2 at Statistics Norway
pub const DEFAULT_BASE_PATH: &str = "https://data.ssb.no/api/pxwebapi/v2";

/// Default URL of the publication calendar
pub const DEFAULT_CALENDAR_URL: &str = "https://www.ssb.no/api/publiseringskalender";

/// Upstream error bodies longer than this are truncated in error messages
const MAX_ERROR_MESSAGE_CHARS: usize = 500;

/// Path templates for the PxWebApi endpoints, relative to `base_path`.
///
/// `{id}` is replaced by the URL-encoded table identifier. The upstream API
/// is versioned, so none of these are hardcoded in the request logic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Table search, e.g. `/tables`
    pub search: String,
    /// Table metadata, e.g. `/tables/{id}/metadata`
    pub metadata: String,
    /// Table data, e.g. `/tables/{id}/data`
    pub data: String,
    /// Value of the `outputFormat` parameter for metadata and data requests
    pub output_format: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Endpoints {
            search: "/tables".to_owned(),
            metadata: "/tables/{id}/metadata".to_owned(),
            data: "/tables/{id}/data".to_owned(),
            output_format: "json-stat2".to_owned(),
        }
    }
}

/// Configuration for the SSB client
#[derive(Debug, Clone)]
pub struct Configuration {
    /// Base URL for PxWebApi (e.g., "https://data.ssb.no/api/pxwebapi/v2")
    pub base_path: String,
    /// Absolute URL of the publication calendar endpoint
    pub calendar_url: String,
    /// Language code sent as `lang` ("no" or "en")
    pub language: String,
    /// User agent string for HTTP requests
    pub user_agent: Option<String>,
    /// HTTP client instance; carries the per-call timeout
    pub client: reqwest::Client,
    /// Endpoint path templates
    pub endpoints: Endpoints,
}

impl Configuration {
    /// Create a new configuration with default values
    pub fn new() -> Configuration {
        Configuration::default()
    }

    /// Check that the configured URLs are absolute and parseable
    pub fn validate(&self) -> Result<(), url::ParseError> {
        Url::parse(&self.base_path)?;
        Url::parse(&self.calendar_url)?;
        Ok(())
    }

    fn table_url(&self, template: &str, table_id: &str) -> String {
        let path = template.replace("{id}", &urlencoding::encode(table_id));
        format!("{}{}", self.base_path.trim_end_matches('/'), path)
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            base_path: DEFAULT_BASE_PATH.to_owned(),
            calendar_url: DEFAULT_CALENDAR_URL.to_owned(),
            language: "no".to_owned(),
            user_agent: Some(concat!("ssb-rs/", env!("CARGO_PKG_VERSION")).to_owned()),
            client: reqwest::Client::new(),
            endpoints: Endpoints::default(),
        }
    }
}

/// # SSB Client
///
/// A thin async client for Statistics Norway's public data services. It
/// knows the endpoint shapes and decodes responses into the explicit schema
/// structs in [`crate::models`]; it does not interpret them.
///
/// ## Usage
///
/// ```rust,no_run
/// use ssb_api::{Configuration, SsbClient};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = SsbClient::new(Arc::new(Configuration::default()));
///
///     let results = client.table_search("befolkning", Some(5), None).await?;
///     println!("Found {} entries", results.tables.len());
///
///     let metadata = client.table_metadata("07459").await?;
///     println!("Dimensions: {:?}", metadata.id);
///     Ok(())
/// }
/// ```
pub struct SsbClient {
    configuration: Arc<Configuration>,
}

impl std::fmt::Debug for SsbClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SsbClient")
            .field("base_path", &self.configuration.base_path)
            .field("calendar_url", &self.configuration.calendar_url)
            .finish()
    }
}

/// Errors that can occur when talking to the SSB services
#[derive(Debug)]
pub enum SsbError {
    /// Network-level failures: connection refused, DNS, timeouts, or a body
    /// that could not be read.
    RequestError(Box<dyn std::error::Error + Send + Sync>),

    /// The body was not valid JSON or did not match the expected schema.
    ParseError(serde_json::Error),

    /// The service answered with a non-2xx status.
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error message extracted from the body
        message: String,
    },
}

impl std::fmt::Display for SsbError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SsbError::RequestError(e) => write!(f, "Request error: {}", e),
            SsbError::ParseError(e) => write!(f, "Parse error: {}", e),
            SsbError::ApiError { status, message } => {
                write!(f, "SSB API error ({}): {}", status, message)
            }
        }
    }
}

impl std::error::Error for SsbError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SsbError::RequestError(e) => Some(e.as_ref()),
            SsbError::ParseError(e) => Some(e),
            SsbError::ApiError { .. } => None,
        }
    }
}

impl SsbClient {
    /// Create a new client instance
    pub fn new(configuration: Arc<Configuration>) -> Self {
        Self { configuration }
    }

    /// The configuration this client was built with
    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// Free-text search over the table catalogue.
    ///
    /// Hits are returned in upstream relevance order.
    ///
    /// # Arguments
    ///
    /// * `query` - Search terms
    /// * `page_size` - Number of hits per page
    /// * `page_number` - 1-based page number
    pub async fn table_search(
        &self,
        query: &str,
        page_size: Option<u32>,
        page_number: Option<u32>,
    ) -> Result<models::TableSearchResponse, SsbError> {
        let mut query_params = vec![
            ("query".to_owned(), query.to_owned()),
            ("lang".to_owned(), self.configuration.language.clone()),
        ];
        if let Some(size) = page_size {
            query_params.push(("pageSize".to_owned(), size.to_string()));
        }
        if let Some(number) = page_number {
            query_params.push(("pageNumber".to_owned(), number.to_string()));
        }

        let url = format!(
            "{}{}",
            self.configuration.base_path.trim_end_matches('/'),
            self.configuration.endpoints.search
        );
        self.get_json(&url, &query_params).await
    }

    /// Retrieve the dimension metadata of a table as a JSON-stat dataset
    /// without values.
    pub async fn table_metadata(&self, table_id: &str) -> Result<models::JsonStatDataset, SsbError> {
        let url = self
            .configuration
            .table_url(&self.configuration.endpoints.metadata, table_id);
        let query_params = vec![
            ("lang".to_owned(), self.configuration.language.clone()),
            (
                "outputFormat".to_owned(),
                self.configuration.endpoints.output_format.clone(),
            ),
        ];
        self.get_json(&url, &query_params).await
    }

    /// Retrieve table data.
    ///
    /// `value_codes` holds one `(dimension, codes)` pair per dimension, in
    /// declaration order; `codes` is a comma-separated list or `*`.
    pub async fn table_data(
        &self,
        table_id: &str,
        value_codes: &[(String, String)],
    ) -> Result<models::JsonStatDataset, SsbError> {
        let url = self
            .configuration
            .table_url(&self.configuration.endpoints.data, table_id);

        let mut query_params = vec![
            ("lang".to_owned(), self.configuration.language.clone()),
            (
                "outputFormat".to_owned(),
                self.configuration.endpoints.output_format.clone(),
            ),
        ];
        query_params.extend(
            value_codes
                .iter()
                .map(|(dimension, codes)| (format!("valueCodes[{}]", dimension), codes.clone())),
        );

        self.get_json(&url, &query_params).await
    }

    /// List publications released between `from` and `to` (inclusive, ISO dates)
    pub async fn publication_calendar(
        &self,
        from: &str,
        to: &str,
    ) -> Result<models::CalendarResponse, SsbError> {
        let query_params = vec![
            ("from".to_owned(), from.to_owned()),
            ("to".to_owned(), to.to_owned()),
            ("lang".to_owned(), self.configuration.language.clone()),
        ];
        self.get_json(&self.configuration.calendar_url, &query_params)
            .await
    }

    async fn get_json<T>(&self, url: &str, query_params: &[(String, String)]) -> Result<T, SsbError>
    where
        T: DeserializeOwned,
    {
        let mut request = self.configuration.client.get(url).query(query_params);
        if let Some(user_agent) = &self.configuration.user_agent {
            request = request.header(reqwest::header::USER_AGENT, user_agent);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SsbError::RequestError(Box::new(e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SsbError::RequestError(Box::new(e)))?;

        if !status.is_success() {
            return Err(SsbError::ApiError {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        serde_json::from_str(&body).map_err(SsbError::ParseError)
    }
}

/// Pull a readable message out of an error body.
///
/// PxWebApi answers with RFC 7807 problem documents; prefer their `title`
/// and `detail`, falling back to the raw text.
fn error_message(body: &str) -> String {
    if let Ok(Value::Object(problem)) = serde_json::from_str::<Value>(body) {
        let title = problem.get("title").and_then(Value::as_str);
        let detail = problem.get("detail").and_then(Value::as_str);
        match (title, detail) {
            (Some(title), Some(detail)) => return format!("{title}: {detail}"),
            (Some(message), None) | (None, Some(message)) => return message.to_owned(),
            (None, None) => {}
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "no error details".to_owned();
    }
    if trimmed.chars().count() > MAX_ERROR_MESSAGE_CHARS {
        let truncated: String = trimmed.chars().take(MAX_ERROR_MESSAGE_CHARS).collect();
        return format!("{truncated}…");
    }
    trimmed.to_owned()
}
