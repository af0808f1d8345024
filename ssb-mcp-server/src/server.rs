use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use ssb::api::Endpoints;
use ssb::{ErrorKind, Selection, StatbankClient, StatbankConfig, StatbankError};
use std::collections::VecDeque;
use std::env;
use thiserror::Error;
use tokio::io::{
    self, AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter,
};

const METHODS: &[&str] = &[
    "initialize",
    "notifications/initialized",
    "notifications/cancelled",
    "ping",
    "shutdown",
    "tools/list",
    "tools/call",
    "ssb.search",
    "ssb.getMetadata",
    "ssb.getData",
    "ssb.listPublications",
];

/// Protocol revision assumed when the client does not name one.
const DEFAULT_PROTOCOL_VERSION: &str = "2024-11-05";

pub struct SsbMcpServer {
    statbank: StatbankClient,
}

impl SsbMcpServer {
    pub async fn bootstrap() -> Result<(), ServerError> {
        let server = Self::new()?;
        server.run().await
    }

    fn new() -> Result<Self, ServerError> {
        let mut config = StatbankConfig::new();
        if let Some(url) = env_string("SSB_API_BASE_URL") {
            config = config.with_base_url(url);
        }
        if let Some(url) = env_string("SSB_CALENDAR_URL") {
            config = config.with_calendar_url(url);
        }
        if let Some(lang) = env_string("SSB_LANG") {
            config = config.with_language(lang);
        }
        if let Some(ua) = env_string("SSB_USER_AGENT") {
            config = config.with_user_agent(ua);
        }
        if let Some(secs) = env_secs("SSB_TIMEOUT_SECS")? {
            config = config.with_timeout(secs);
        }
        if let Some(secs) = env_secs("SSB_CACHE_TTL_SECS")? {
            config = config.with_metadata_cache_ttl(secs);
        }

        // Endpoint paths follow the upstream API version
        let defaults = Endpoints::default();
        config = config.with_endpoints(Endpoints {
            search: env_string("SSB_SEARCH_PATH").unwrap_or(defaults.search),
            metadata: env_string("SSB_METADATA_PATH").unwrap_or(defaults.metadata),
            data: env_string("SSB_DATA_PATH").unwrap_or(defaults.data),
            output_format: defaults.output_format,
        });

        tracing::info!(
            base_url = %config.base_url,
            calendar_url = %config.calendar_url,
            language = %config.language,
            timeout = ?config.request_timeout,
            "configured SSB client"
        );

        Ok(Self::with_client(StatbankClient::with_config(config)?))
    }

    fn with_client(statbank: StatbankClient) -> Self {
        Self { statbank }
    }

    async fn run(self) -> Result<(), ServerError> {
        self.run_with(BufReader::new(io::stdin()), io::stdout()).await
    }

    /// Serve newline-delimited JSON-RPC from `reader` until it is exhausted.
    async fn run_with<R, W>(&self, reader: R, writer: W) -> Result<(), ServerError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut writer = BufWriter::new(writer);
        let mut lines = reader.lines();
        // Messages that arrived while a request was in flight
        let mut backlog: VecDeque<String> = VecDeque::new();
        let mut input_open = true;

        tracing::info!(methods = ?METHODS, "ssb MCP server ready");

        loop {
            let line = match backlog.pop_front() {
                Some(line) => line,
                None if input_open => match lines.next_line().await? {
                    Some(line) => line,
                    None => break,
                },
                None => break,
            };

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let request = match serde_json::from_str::<Request>(trimmed) {
                Ok(request) => request,
                Err(err) => {
                    tracing::warn!("invalid request: {err}");
                    let error = if err.is_syntax() || err.is_eof() {
                        ServerError::Json(err)
                    } else {
                        ServerError::InvalidRequest(err.to_string())
                    };
                    write_response(&mut writer, &Response::error(None, error)).await?;
                    continue;
                }
            };

            let Some(id) = request.id.clone() else {
                self.handle_notification(&request);
                continue;
            };

            // Cancelled while it was still waiting in the backlog
            if let Some(position) = backlog
                .iter()
                .position(|queued| is_cancellation_of(queued, &id))
            {
                backlog.remove(position);
                tracing::info!(request_id = %id, "queued request cancelled by client");
                continue;
            }

            // Keep reading while the request runs so a cancellation can drop
            // it, abandoning any outbound HTTP call.
            let call = self.handle_request(request);
            tokio::pin!(call);
            let response = loop {
                tokio::select! {
                    response = &mut call => break Some(response),
                    next = lines.next_line(), if input_open => match next? {
                        Some(next) if is_cancellation_of(&next, &id) => {
                            tracing::info!(request_id = %id, "request cancelled by client");
                            break None;
                        }
                        Some(next) => backlog.push_back(next),
                        None => input_open = false,
                    },
                }
            };

            if let Some(response) = response {
                write_response(&mut writer, &response).await?;
            }
        }

        tracing::info!("input closed, shutting down");
        Ok(())
    }

    fn handle_notification(&self, request: &Request) {
        match request.method.as_str() {
            "notifications/initialized" => tracing::info!("client initialized"),
            "notifications/cancelled" => {
                tracing::debug!("cancellation for a request that is no longer running")
            }
            other => tracing::debug!(method = other, "ignoring notification"),
        }
    }

    async fn handle_request(&self, request: Request) -> Response {
        match self.dispatch(&request.method, request.params).await {
            Ok(result) => Response::success(request.id, result),
            Err(err) => Response::error(request.id, err),
        }
    }

    async fn dispatch(&self, method: &str, params: Option<Value>) -> Result<Value, ServerError> {
        if method == "tools/call" {
            let params: CallToolParams = parse_required_params(method, params)?;
            let spec = find_tool_spec(&params.name)
                .ok_or_else(|| ServerError::InvalidMethod(params.name.clone()))?;

            let response = match self.invoke_method(spec.method_name, params.arguments).await {
                Ok(value) => ToolResponse::from_value(value),
                Err(ServerError::Statbank(err)) => {
                    tracing::warn!(tool = spec.tool_name, kind = %err.kind(), "tool call failed: {err}");
                    ToolResponse::from_error(&err)
                }
                Err(other) => return Err(other),
            };
            return serde_json::to_value(response).map_err(ServerError::Serialization);
        }

        self.invoke_method(method, params).await
    }

    async fn invoke_method(&self, method: &str, params: Option<Value>) -> Result<Value, ServerError> {
        match method {
            "initialize" => {
                let params: InitializeParams = parse_optional_params(method, params)?;
                if let Some(info) = &params.client_info {
                    tracing::info!(client = %info.name, version = ?info.version, "initialize");
                }
                let result = InitializeResult::new(params.protocol_version, params.client_info);
                Ok(serde_json::to_value(result).map_err(ServerError::Serialization)?)
            }
            "ping" => Ok(json!({})),
            "shutdown" => Ok(Value::Null),
            "tools/list" => {
                let params: ListToolsParams = parse_optional_params(method, params)?;
                let _ = params.cursor;
                let result = ListToolsResult {
                    tools: tool_descriptors(),
                    next_cursor: None,
                };
                Ok(serde_json::to_value(result).map_err(ServerError::Serialization)?)
            }
            "ssb.search" => {
                let params: SearchParams = parse_arguments(method, params)?;
                let hits = self
                    .statbank
                    .search(&params.query, params.page_size, params.page_number)
                    .await?;
                Ok(json!({ "hits": hits }))
            }
            "ssb.getMetadata" => {
                let params: TableParams = parse_arguments(method, params)?;
                let metadata = self.statbank.get_metadata(&params.table_id).await?;
                Ok(serde_json::to_value(&*metadata).map_err(ServerError::Serialization)?)
            }
            "ssb.getData" => {
                let params: DataParams = parse_arguments(method, params)?;
                let data = self
                    .statbank
                    .get_data(&params.table_id, params.selection.as_ref())
                    .await?;
                Ok(serde_json::to_value(data).map_err(ServerError::Serialization)?)
            }
            "ssb.listPublications" => {
                let params: PublicationParams = parse_arguments(method, params)?;
                let publications = self
                    .statbank
                    .list_publications(&params.date, params.range_days)
                    .await?;
                Ok(json!({ "publications": publications }))
            }
            other => Err(ServerError::InvalidMethod(other.to_string())),
        }
    }
}

async fn write_response<W>(writer: &mut BufWriter<W>, response: &Response) -> Result<(), ServerError>
where
    W: AsyncWrite + Unpin,
{
    let payload = serde_json::to_string(response).map_err(ServerError::Serialization)?;
    writer.write_all(payload.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

fn env_string(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_secs(name: &str) -> Result<Option<u64>, ServerError> {
    env_string(name)
        .map(|raw| {
            raw.parse::<u64>().map_err(|_| {
                ServerError::Statbank(StatbankError::config_error(format!(
                    "{name} must be a whole number of seconds, got {raw:?}"
                )))
            })
        })
        .transpose()
}

/// Whether `line` is a `notifications/cancelled` aimed at request `id`.
fn is_cancellation_of(line: &str, id: &Value) -> bool {
    let Ok(message) = serde_json::from_str::<Request>(line.trim()) else {
        return false;
    };
    if message.id.is_some() || message.method != "notifications/cancelled" {
        return false;
    }
    message
        .params
        .and_then(|params| serde_json::from_value::<CancelledParams>(params).ok())
        .is_some_and(|params| &params.request_id == id)
}

#[derive(Debug, Deserialize)]
struct Request {
    #[serde(default, rename = "jsonrpc")]
    _jsonrpc: Option<String>,
    /// Absent for notifications; an explicit `null` is still a request.
    #[serde(default, deserialize_with = "present_id")]
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Option<Value>,
}

fn present_id<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

#[derive(Debug, Serialize)]
struct Response {
    jsonrpc: &'static str,
    id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ResponseError>,
}

impl Response {
    fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    fn error(id: Option<Value>, error: ServerError) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(ResponseError::from(error)),
        }
    }
}

#[derive(Debug, Serialize)]
struct ResponseError {
    code: i32,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl From<ServerError> for ResponseError {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::InvalidRequest(message) => Self {
                code: -32600,
                message,
                data: None,
            },
            ServerError::InvalidMethod(method) => Self {
                code: -32601,
                message: format!("Unknown method: {method}"),
                data: None,
            },
            ServerError::InvalidParams(message) => Self {
                code: -32602,
                message,
                data: None,
            },
            ServerError::Json(err) => Self {
                code: -32700,
                message: err.to_string(),
                data: None,
            },
            ServerError::Io(err) => Self {
                code: -32020,
                message: err.to_string(),
                data: None,
            },
            ServerError::Statbank(err) => Self {
                code: -32010,
                message: err.to_string(),
                data: Some(error_body(&err)),
            },
            ServerError::Serialization(err) => Self {
                code: -32603,
                message: err.to_string(),
                data: None,
            },
        }
    }
}

/// `{kind, message, status?}` describing a tool failure.
fn error_body(err: &StatbankError) -> Value {
    let mut body = json!({
        "kind": err.kind(),
        "message": err.to_string(),
    });
    if let Some(status) = err.status() {
        body["status"] = json!(status);
    }
    body
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("unknown method: {0}")]
    InvalidMethod(String),
    #[error("invalid parameters: {0}")]
    InvalidParams(String),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Statbank(#[from] StatbankError),
    #[error("serialization error: {0}")]
    Serialization(serde_json::Error),
}

type ServerResult<T> = Result<T, ServerError>;

fn parse_required_params<T>(method: &str, params: Option<Value>) -> ServerResult<T>
where
    T: DeserializeOwned,
{
    match params {
        Some(value) => serde_json::from_value(value)
            .map_err(|err| ServerError::InvalidParams(format!("{method}: {err}"))),
        None => Err(ServerError::InvalidParams(format!(
            "{method}: missing parameters"
        ))),
    }
}

fn parse_optional_params<T>(method: &str, params: Option<Value>) -> ServerResult<T>
where
    T: DeserializeOwned + Default,
{
    match params {
        Some(value) => serde_json::from_value(value)
            .map_err(|err| ServerError::InvalidParams(format!("{method}: {err}"))),
        None => Ok(T::default()),
    }
}

/// Tool arguments; anything malformed is the caller's fault.
fn parse_arguments<T>(method: &str, params: Option<Value>) -> ServerResult<T>
where
    T: DeserializeOwned,
{
    let value = params.unwrap_or_else(|| json!({}));
    serde_json::from_value(value).map_err(|err| {
        ServerError::Statbank(StatbankError::invalid_argument(format!("{method}: {err}")))
    })
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SearchParams {
    query: String,
    #[serde(default, rename = "pageSize")]
    page_size: Option<u32>,
    #[serde(default, rename = "pageNumber")]
    page_number: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TableParams {
    #[serde(rename = "tableId")]
    table_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DataParams {
    #[serde(rename = "tableId")]
    table_id: String,
    #[serde(default)]
    selection: Option<Selection>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PublicationParams {
    date: String,
    #[serde(default, rename = "rangeDays")]
    range_days: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct CancelledParams {
    #[serde(rename = "requestId")]
    request_id: Value,
    #[serde(default)]
    #[allow(dead_code)]
    reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct InitializeParams {
    #[serde(default, rename = "protocolVersion")]
    protocol_version: Option<String>,
    #[serde(default, rename = "clientInfo")]
    client_info: Option<ClientInfo>,
}

#[derive(Debug, Deserialize)]
struct ClientInfo {
    name: String,
    #[serde(default)]
    version: Option<String>,
}

#[derive(Debug, Serialize)]
struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    protocol_version: String,
    #[serde(rename = "serverInfo")]
    server_info: ServerInfo,
    capabilities: Value,
    #[serde(skip_serializing_if = "Option::is_none", rename = "clientInfo")]
    client_info: Option<ClientInfoSummary>,
}

impl InitializeResult {
    fn new(protocol_version: Option<String>, client_info: Option<ClientInfo>) -> Self {
        let client_info = client_info.map(|info| ClientInfoSummary {
            name: info.name,
            version: info.version,
        });

        Self {
            protocol_version: protocol_version
                .unwrap_or_else(|| DEFAULT_PROTOCOL_VERSION.to_string()),
            server_info: ServerInfo {
                name: "ssb-mcp-server",
                version: env!("CARGO_PKG_VERSION"),
            },
            capabilities: json!({
                "tools": {
                    "listChanged": false
                }
            }),
            client_info,
        }
    }
}

#[derive(Debug, Serialize)]
struct ServerInfo {
    name: &'static str,
    version: &'static str,
}

#[derive(Debug, Serialize)]
struct ClientInfoSummary {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ListToolsParams {
    #[serde(default, rename = "cursor")]
    cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CallToolParams {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

#[derive(Debug, Serialize)]
struct ToolSpec {
    tool_name: &'static str,
    method_name: &'static str,
    description: &'static str,
    input_schema: Value,
}

#[derive(Debug, Serialize)]
struct ListToolsResult {
    tools: Vec<ToolDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "nextCursor")]
    next_cursor: Option<String>,
}

#[derive(Debug, Serialize)]
struct ToolDescriptor {
    name: &'static str,
    description: &'static str,
    #[serde(rename = "inputSchema")]
    input_schema: Value,
}

#[derive(Debug, Serialize)]
struct ToolResponse {
    content: Vec<ToolContent>,
    #[serde(rename = "structuredContent")]
    structured_content: Value,
    #[serde(skip_serializing_if = "Option::is_none", rename = "isError")]
    is_error: Option<bool>,
}

impl ToolResponse {
    fn from_value(value: Value) -> Self {
        let text = serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string());
        Self {
            content: vec![ToolContent::Text { text }],
            structured_content: value,
            is_error: None,
        }
    }

    fn from_error(err: &StatbankError) -> Self {
        let kind: ErrorKind = err.kind();
        Self {
            content: vec![ToolContent::Text {
                text: format!("{kind}: {err}"),
            }],
            structured_content: json!({ "error": error_body(err) }),
            is_error: Some(true),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ToolContent {
    #[serde(rename = "text")]
    Text { text: String },
}

fn tool_descriptors() -> Vec<ToolDescriptor> {
    tool_specs()
        .into_iter()
        .map(|spec| ToolDescriptor {
            name: spec.tool_name,
            description: spec.description,
            input_schema: spec.input_schema,
        })
        .collect()
}

fn find_tool_spec(name: &str) -> Option<ToolSpec> {
    tool_specs().into_iter().find(|spec| spec.tool_name == name)
}

fn tool_specs() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            tool_name: "ssb_search",
            method_name: "ssb.search",
            description: "Search Statistics Norway (SSB) statistical tables by keyword. Returns table ids with titles, descriptions and last update dates, in relevance order.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "minLength": 1, "description": "Free-text search, e.g. \"kpi\" or \"befolkning kommune\""},
                    "pageSize": {"type": "integer", "minimum": 1, "maximum": 10000, "description": "Maximum number of hits"},
                    "pageNumber": {"type": "integer", "minimum": 1, "description": "1-based result page"}
                },
                "required": ["query"],
                "additionalProperties": false
            }),
        },
        ToolSpec {
            tool_name: "ssb_table_metadata",
            method_name: "ssb.getMetadata",
            description: "Fetch the dimensions of an SSB table with every category code and label, in declaration order. Use it to build a selection for ssb_table_data.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "tableId": {"type": "string", "description": "Table identifier, e.g. \"09321\""}
                },
                "required": ["tableId"],
                "additionalProperties": false
            }),
        },
        ToolSpec {
            tool_name: "ssb_table_data",
            method_name: "ssb.getData",
            description: "Read values from an SSB table. Without a selection every category of every dimension is requested, which can be very large and may be refused upstream; narrow it down with a selection.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "tableId": {"type": "string", "description": "Table identifier, e.g. \"09321\""},
                    "selection": {
                        "type": "object",
                        "description": "Dimension code -> list of category codes, or \"*\" for all. Omitted dimensions default to all categories.",
                        "additionalProperties": {
                            "oneOf": [
                                {"type": "array", "items": {"type": "string"}, "minItems": 1},
                                {"type": "string"}
                            ]
                        }
                    }
                },
                "required": ["tableId"],
                "additionalProperties": false
            }),
        },
        ToolSpec {
            tool_name: "ssb_latest_publications",
            method_name: "ssb.listPublications",
            description: "List SSB publications released on a date, optionally including the preceding days, with the tables each one updated.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "date": {"type": "string", "format": "date", "description": "Release date, YYYY-MM-DD"},
                    "rangeDays": {"type": "integer", "minimum": 0, "description": "Also include this many days before the date"}
                },
                "required": ["date"],
                "additionalProperties": false
            }),
        },
    ]
}
