//! Async client for the PurpleAir v1 REST API.
//!
//! `PurpleAirClient` holds only its base URL, API key and transport. Each
//! method builds one [`ApiRequest`], sends it once, and maps the response:
//! non-2xx statuses, transport failures and undecodable JSON all surface as
//! [`RemoteApiError`]. There is no retry, backoff or rate-limit handling.

use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, error};

use super::fields::Average;
use super::lines::LineStream;
use super::request::{ApiRequest, Method, QueryParams};
use super::transport::{BoxError, RawResponse, ReqwestTransport, ResponseBody, Transport};
use crate::error::{ApiError, ErrorBody, RemoteApiError, RemoteErrorKind};

pub const DEFAULT_BASE_URL: &str = "https://api.purpleair.com/v1";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

// ---

/// Settings fixed when the client is built.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Body of a successful response.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse {
    /// Decoded `application/json` body.
    Json(Value),
    /// Any other content type, e.g. a CSV export.
    Text(String),
}

impl ApiResponse {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ApiResponse::Json(v) => Some(v),
            ApiResponse::Text(_) => None,
        }
    }

    pub fn into_json(self) -> Option<Value> {
        match self {
            ApiResponse::Json(v) => Some(v),
            ApiResponse::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ApiResponse::Text(t) => Some(t),
            ApiResponse::Json(_) => None,
        }
    }
}

/// Filters for `GET /sensors`.
#[derive(Debug, Clone, Default)]
pub struct SensorsQuery {
    pub sensor_indices: Vec<u64>,
    pub show_only: Vec<u64>,
    pub fields: Vec<String>,
}

/// Time range and options for the sensor history endpoints.
#[derive(Debug, Clone)]
pub struct HistoryQuery {
    /// Epoch seconds, inclusive.
    pub start_timestamp: i64,
    /// Epoch seconds.
    pub end_timestamp: i64,
    pub average: Option<Average>,
    pub fields: Vec<String>,
}

impl HistoryQuery {
    pub fn new(start_timestamp: i64, end_timestamp: i64) -> Self {
        Self {
            start_timestamp,
            end_timestamp,
            average: None,
            fields: Vec::new(),
        }
    }

    pub fn average(mut self, average: Average) -> Self {
        self.average = Some(average);
        self
    }

    pub fn fields<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    fn to_params(&self) -> Result<QueryParams, ApiError> {
        // ---
        if self.end_timestamp < self.start_timestamp {
            return Err(ApiError::InvalidRequest(
                "end_timestamp must not be before start_timestamp",
            ));
        }
        let mut query = QueryParams::new();
        query
            .push("start_timestamp", self.start_timestamp)
            .push("end_timestamp", self.end_timestamp)
            .push_opt("average", self.average)
            .push_list("fields", &self.fields);
        Ok(query)
    }
}

/// Client for the PurpleAir API.
#[derive(Debug, Clone)]
pub struct PurpleAirClient<T = ReqwestTransport> {
    base_url: String,
    api_key: String,
    transport: T,
}

impl PurpleAirClient<ReqwestTransport> {
    /// Build a client over `reqwest` with the given base URL and timeout.
    pub fn new(api_key: &str, options: ClientOptions) -> Result<Self, ApiError> {
        // ---
        let transport = ReqwestTransport::new(options.timeout).map_err(ApiError::ClientBuild)?;
        Self::with_transport(api_key, &options.base_url, transport)
    }
}

impl<T: Transport> PurpleAirClient<T> {
    pub fn with_transport(api_key: &str, base_url: &str, transport: T) -> Result<Self, ApiError> {
        // ---
        if api_key.trim().is_empty() {
            error!("API key must be provided.");
            return Err(ApiError::MissingApiKey);
        }
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            transport,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    // ----- Organization -----

    /// `GET /organization`: the organization the API key belongs to.
    pub async fn get_organization(&self) -> Result<ApiResponse, ApiError> {
        self.execute(self.build(Method::Get, "/organization", QueryParams::new(), None))
            .await
    }

    // ----- Sensors -----

    /// `GET /sensors/{sensor_index}`: latest data for one sensor.
    pub async fn get_sensor(&self, sensor_index: u64, fields: &[&str]) -> Result<ApiResponse, ApiError> {
        // ---
        let mut query = QueryParams::new();
        query.push_list("fields", fields);
        let path = format!("/sensors/{sensor_index}");
        self.execute(self.build(Method::Get, &path, query, None)).await
    }

    /// `GET /sensors`: latest data for many sensors.
    pub async fn get_sensors(&self, filter: &SensorsQuery) -> Result<ApiResponse, ApiError> {
        // ---
        let mut query = QueryParams::new();
        query
            .push_list("sensor_index", &filter.sensor_indices)
            .push_list("show_only", &filter.show_only)
            .push_list("fields", &filter.fields);
        self.execute(self.build(Method::Get, "/sensors", query, None)).await
    }

    /// `GET /sensors/{sensor_index}/history`: readings between two timestamps.
    pub async fn get_sensor_history(
        &self,
        sensor_index: u64,
        history: &HistoryQuery,
    ) -> Result<ApiResponse, ApiError> {
        // ---
        let path = format!("/sensors/{sensor_index}/history");
        let request = self.build(Method::Get, &path, history.to_params()?, None);
        self.execute(request).await
    }

    /// `GET /sensors/{sensor_index}/history/csv`, read in full.
    pub async fn get_sensor_history_csv(
        &self,
        sensor_index: u64,
        history: &HistoryQuery,
    ) -> Result<ApiResponse, ApiError> {
        // ---
        let path = format!("/sensors/{sensor_index}/history/csv");
        let request = self.build(Method::Get, &path, history.to_params()?, None);
        self.execute(request).await
    }

    /// `GET /sensors/{sensor_index}/history/csv`, one line at a time.
    pub async fn stream_sensor_history_csv(
        &self,
        sensor_index: u64,
        history: &HistoryQuery,
    ) -> Result<LineStream<T::Body>, ApiError> {
        // ---
        let path = format!("/sensors/{sensor_index}/history/csv");
        let request = self.build(Method::Get, &path, history.to_params()?, None);
        let response = self.send(&request).await?;
        Ok(LineStream::new(response.body, request.method, request.url))
    }

    // ----- Groups -----

    /// `POST /groups`: create a group.
    pub async fn create_group(&self, name: &str) -> Result<ApiResponse, ApiError> {
        let body = json!({ "name": name });
        self.execute(self.build(Method::Post, "/groups", QueryParams::new(), Some(body)))
            .await
    }

    /// `GET /groups`: every group owned by the key.
    pub async fn list_groups(&self) -> Result<ApiResponse, ApiError> {
        self.execute(self.build(Method::Get, "/groups", QueryParams::new(), None))
            .await
    }

    /// `GET /groups/{group_id}`: group detail including members.
    pub async fn get_group(&self, group_id: u64) -> Result<ApiResponse, ApiError> {
        let path = format!("/groups/{group_id}");
        self.execute(self.build(Method::Get, &path, QueryParams::new(), None))
            .await
    }

    /// `PUT /groups/{group_id}`: rename a group. Nothing is sent when there
    /// is nothing to update.
    pub async fn update_group(&self, group_id: u64, name: Option<&str>) -> Result<ApiResponse, ApiError> {
        // ---
        let Some(name) = name else {
            return Err(ApiError::InvalidRequest("no fields to update for group"));
        };
        let path = format!("/groups/{group_id}");
        let body = json!({ "name": name });
        self.execute(self.build(Method::Put, &path, QueryParams::new(), Some(body)))
            .await
    }

    /// `DELETE /groups/{group_id}`.
    pub async fn delete_group(&self, group_id: u64) -> Result<ApiResponse, ApiError> {
        let path = format!("/groups/{group_id}");
        self.execute(self.build(Method::Delete, &path, QueryParams::new(), None))
            .await
    }

    /// `POST /groups/{group_id}/members`: add a sensor to a group.
    pub async fn add_member(&self, group_id: u64, sensor_index: u64) -> Result<ApiResponse, ApiError> {
        let path = format!("/groups/{group_id}/members");
        let body = json!({ "sensor_index": sensor_index });
        self.execute(self.build(Method::Post, &path, QueryParams::new(), Some(body)))
            .await
    }

    /// `DELETE /groups/{group_id}/members/{member_id}`.
    pub async fn remove_member(&self, group_id: u64, member_id: u64) -> Result<ApiResponse, ApiError> {
        let path = format!("/groups/{group_id}/members/{member_id}");
        self.execute(self.build(Method::Delete, &path, QueryParams::new(), None))
            .await
    }

    /// `GET /groups/{group_id}/members/data`: latest data for every member.
    pub async fn get_members_data(
        &self,
        group_id: u64,
        fields: &[&str],
        modified_since: Option<i64>,
    ) -> Result<ApiResponse, ApiError> {
        // ---
        let mut query = QueryParams::new();
        query
            .push_list("fields", fields)
            .push_opt("modified_since", modified_since);
        let path = format!("/groups/{group_id}/members/data");
        self.execute(self.build(Method::Get, &path, query, None)).await
    }

    /// `GET /groups/{group_id}/members/{member_id}/data`.
    pub async fn get_member_data(
        &self,
        group_id: u64,
        member_id: u64,
        fields: &[&str],
    ) -> Result<ApiResponse, ApiError> {
        // ---
        let mut query = QueryParams::new();
        query.push_list("fields", fields);
        let path = format!("/groups/{group_id}/members/{member_id}/data");
        self.execute(self.build(Method::Get, &path, query, None)).await
    }

    // ----- plumbing -----

    fn build(&self, method: Method, path: &str, query: QueryParams, body: Option<Value>) -> ApiRequest {
        ApiRequest {
            method,
            url: format!("{}{}", self.base_url, path),
            query,
            headers: vec![
                ("X-API-Key".to_string(), self.api_key.clone()),
                ("Accept".to_string(), "application/json".to_string()),
                ("Content-Type".to_string(), "application/json".to_string()),
            ],
            body,
        }
    }

    /// Send once and reject non-2xx statuses. The body of a rejected
    /// response is read for the error and then released.
    async fn send(&self, request: &ApiRequest) -> Result<RawResponse<T::Body>, ApiError> {
        // ---
        debug!(method = %request.method, url = %request.url, "sending request");

        let response = self.transport.send(request).await.map_err(|e| {
            error!(method = %request.method, url = %request.url, "transport error: {e}");
            remote(RemoteErrorKind::Transport, None, request, ErrorBody::Text(e.to_string()))
        })?;

        if response.is_success() {
            return Ok(response);
        }

        let status = response.status;
        let body = match read_body(response.body).await {
            Ok(bytes) => ErrorBody::from_bytes(&bytes),
            Err(e) => ErrorBody::Text(e.to_string()),
        };
        error!(status, method = %request.method, url = %request.url, %body, "request failed");
        Err(remote(RemoteErrorKind::Status, Some(status), request, body))
    }

    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        // ---
        let response = self.send(&request).await?;
        let status = response.status;
        let is_json = response.is_json();

        let bytes = read_body(response.body).await.map_err(|e| {
            remote(RemoteErrorKind::Transport, Some(status), &request, ErrorBody::Text(e.to_string()))
        })?;

        if !is_json {
            return Ok(ApiResponse::Text(String::from_utf8_lossy(&bytes).into_owned()));
        }
        serde_json::from_slice(&bytes).map(ApiResponse::Json).map_err(|e| {
            error!(method = %request.method, url = %request.url, "undecodable JSON body: {e}");
            remote(RemoteErrorKind::Decode, Some(status), &request, ErrorBody::Text(e.to_string()))
        })
    }
}

/// Read a body to the end. The body is dropped, releasing the connection,
/// when this returns.
async fn read_body<B: ResponseBody>(mut body: B) -> Result<Vec<u8>, BoxError> {
    // ---
    let mut bytes = Vec::new();
    while let Some(chunk) = body.chunk().await? {
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

fn remote(kind: RemoteErrorKind, status: Option<u16>, request: &ApiRequest, body: ErrorBody) -> ApiError {
    ApiError::Remote(RemoteApiError {
        kind,
        status,
        method: request.method,
        url: request.url.clone(),
        body,
    })
}
