//! The seam between the client and the network.
//!
//! A [`Transport`] sends one [`ApiRequest`] and returns the status, content
//! type, and a body that is read chunk by chunk. Dropping the body releases
//! the underlying connection, so whoever owns the body decides when that
//! happens. The production transport is [`ReqwestTransport`]; tests swap in
//! scripted transports.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;

use super::request::ApiRequest;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A response body read incrementally. Dropping it releases the connection.
#[async_trait]
pub trait ResponseBody: Send {
    /// Next chunk of the body, `None` once it is exhausted.
    async fn chunk(&mut self) -> Result<Option<Vec<u8>>, BoxError>;
}

/// Status line and headers of interest, plus the unread body.
#[derive(Debug)]
pub struct RawResponse<B> {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: B,
}

impl<B> RawResponse<B> {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// True for `application/json`, ignoring case and parameters.
    pub fn is_json(&self) -> bool {
        // ---
        self.content_type
            .as_deref()
            .and_then(|ct| ct.split(';').next())
            .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
    }
}

/// Sends requests. Implementations must not retry.
#[async_trait]
pub trait Transport: Send + Sync {
    type Body: ResponseBody + 'static;

    async fn send(&self, request: &ApiRequest) -> Result<RawResponse<Self::Body>, BoxError>;
}

/// [`Transport`] over a `reqwest` client with a fixed timeout.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        // ---
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }
}

/// Body of a `reqwest` response.
#[derive(Debug)]
pub struct ReqwestBody(reqwest::Response);

#[async_trait]
impl ResponseBody for ReqwestBody {
    async fn chunk(&mut self) -> Result<Option<Vec<u8>>, BoxError> {
        Ok(self.0.chunk().await?.map(|bytes| bytes.to_vec()))
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    type Body = ReqwestBody;

    async fn send(&self, request: &ApiRequest) -> Result<RawResponse<ReqwestBody>, BoxError> {
        // ---
        let mut builder = self
            .http
            .request(request.method.into(), &request.url)
            .query(request.query.as_pairs());
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Ok(RawResponse {
            status: response.status().as_u16(),
            content_type,
            body: ReqwestBody(response),
        })
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn response(content_type: Option<&str>, status: u16) -> RawResponse<()> {
        RawResponse {
            status,
            content_type: content_type.map(str::to_string),
            body: (),
        }
    }

    #[test]
    fn json_detection_ignores_parameters_and_case() {
        // ---
        assert!(response(Some("application/json"), 200).is_json());
        assert!(response(Some("Application/JSON; charset=utf-8"), 200).is_json());
        assert!(!response(Some("text/csv"), 200).is_json());
        assert!(!response(None, 200).is_json());
    }

    #[test]
    fn success_range_is_half_open() {
        // ---
        assert!(response(None, 200).is_success());
        assert!(response(None, 299).is_success());
        assert!(!response(None, 300).is_success());
        assert!(!response(None, 199).is_success());
    }
}
