//! Line-by-line reading of a streamed response body.

use tracing::debug;

use super::request::Method;
use super::transport::ResponseBody;
use crate::error::{ApiError, ErrorBody, RemoteApiError, RemoteErrorKind};

/// Lazy, forward-only lines of a response body.
///
/// The stream owns the body. It drops it as soon as the body reports its end
/// or fails, and otherwise when the stream itself is dropped, so the
/// connection is released exactly once however reading stops.
pub struct LineStream<B> {
    body: Option<B>,
    buf: Vec<u8>,
    method: Method,
    url: String,
}

impl<B: ResponseBody> LineStream<B> {
    pub(crate) fn new(body: B, method: Method, url: String) -> Self {
        Self {
            body: Some(body),
            buf: Vec::new(),
            method,
            url,
        }
    }

    /// Next line without its terminator, or `None` at the end of the body.
    pub async fn next_line(&mut self) -> Result<Option<String>, ApiError> {
        // ---
        loop {
            if let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = self.buf.drain(..=pos).collect();
                return self.decode(line).map(Some);
            }

            let Some(body) = self.body.as_mut() else {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                let rest = std::mem::take(&mut self.buf);
                return self.decode(rest).map(Some);
            };

            let next = body.chunk().await;
            match next {
                Ok(Some(chunk)) => self.buf.extend_from_slice(&chunk),
                Ok(None) => self.release(),
                Err(e) => {
                    self.release();
                    self.buf.clear();
                    return Err(self.error(RemoteErrorKind::Transport, e.to_string()));
                }
            }
        }
    }

    /// Read every remaining line.
    pub async fn collect_lines(mut self) -> Result<Vec<String>, ApiError> {
        // ---
        let mut lines = Vec::new();
        while let Some(line) = self.next_line().await? {
            lines.push(line);
        }
        Ok(lines)
    }

    /// Whether the body has already been released.
    pub fn is_released(&self) -> bool {
        self.body.is_none()
    }

    fn release(&mut self) {
        if self.body.take().is_some() {
            debug!(url = %self.url, "response body fully read");
        }
    }

    fn decode(&self, mut line: Vec<u8>) -> Result<String, ApiError> {
        // ---
        if line.last() == Some(&b'\n') {
            line.pop();
        }
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        String::from_utf8(line)
            .map_err(|e| self.error(RemoteErrorKind::Decode, format!("line is not UTF-8: {e}")))
    }

    fn error(&self, kind: RemoteErrorKind, message: String) -> ApiError {
        ApiError::Remote(RemoteApiError {
            kind,
            status: None,
            method: self.method,
            url: self.url.clone(),
            body: ErrorBody::Text(message),
        })
    }
}

impl<B> Drop for LineStream<B> {
    fn drop(&mut self) {
        if self.body.is_some() {
            debug!(url = %self.url, "line stream dropped before end of body");
        }
    }
}
