// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Request logging middleware
//!
//! Every request produces exactly one access record, a single-line JSON object
//! emitted on the [`ACCESS_LOG_TARGET`] tracing target once the response is
//! known. Panics raised while handling the request are recovered here and
//! answered with a 500 error envelope.

use std::{any::Any, panic::AssertUnwindSafe, time::Duration};

use axum::{
    extract::Request,
    http::{HeaderMap, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{error, info};

use crate::error::HandlerError;

/// Tracing target carrying one JSON access record per request
pub const ACCESS_LOG_TARGET: &str = "access";

/// Status reported when no response status was ever observed
pub const UNSET_STATUS: u16 = 0;

/// Records the status code a response was sent with
///
/// Only the first status counts. Later attempts to change it are ignored, so a
/// recovered panic cannot rewrite a status that already went out.
///
/// An axum [`Response`] always carries a status, so in this stack
/// [`ResponseCapture::observe`] records it and the implicit 200 of
/// [`ResponseCapture::record_write`] is never reached.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResponseCapture {
    status: Option<StatusCode>,
}

impl ResponseCapture {
    /// Create a capture with no status recorded
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `status` unless one was already recorded
    pub fn set_status(&mut self, status: StatusCode) {
        if self.status.is_none() {
            self.status = Some(status);
        }
    }

    /// Note that body bytes were written
    ///
    /// Writing a body without an explicit status implies 200. Not reached through
    /// [`request_logging_middleware`], which only sees complete responses.
    pub fn record_write(&mut self) {
        self.set_status(StatusCode::OK);
    }

    /// Recorded status, or [`UNSET_STATUS`] if nothing was written yet
    pub fn status(&self) -> u16 {
        self.status.map_or(UNSET_STATUS, |status| status.as_u16())
    }

    /// Record the status of an outgoing response and pass it through
    pub fn observe(&mut self, response: Response) -> Response {
        self.set_status(response.status());
        response
    }
}

/// One access log line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestLogRecord {
    /// Request method
    pub method: String,
    /// Request target as received, including the query string
    pub url: String,
    /// `Referer` header, empty when absent
    pub referer: String,
    /// `User-Agent` header, empty when absent
    pub user_agent: String,
    /// Status the response was sent with
    pub status: u16,
    /// Wall-clock time spent handling the request
    pub duration_seconds: f64,
}

impl RequestLogRecord {
    /// Start a record from the parts of a request known before handling it
    pub fn from_request(request: &Request) -> Self {
        Self {
            method: request.method().to_string(),
            url: request.uri().to_string(),
            referer: header_text(request.headers(), &header::REFERER),
            user_agent: header_text(request.headers(), &header::USER_AGENT),
            status: UNSET_STATUS,
            duration_seconds: 0.0,
        }
    }

    /// Fill in the outcome once the response is known
    #[must_use]
    pub fn complete(mut self, status: u16, elapsed: Duration) -> Self {
        self.status = status;
        self.duration_seconds = elapsed.as_secs_f64();
        self
    }
}

fn header_text(headers: &HeaderMap, name: &header::HeaderName) -> String {
    headers
        .get(name)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
        .unwrap_or_default()
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

/// Log one JSON access record per request and recover handler panics
///
/// A panic becomes a 500 error envelope and is still logged as a normal access
/// record with status 500. If the record cannot be encoded the request is
/// answered with 500 instead.
pub async fn request_logging_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let record = RequestLogRecord::from_request(&request);
    let mut capture = ResponseCapture::new();

    let response = match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(response) => capture.observe(response),
        Err(payload) => {
            capture.set_status(StatusCode::INTERNAL_SERVER_ERROR);
            error!(
                panic = panic_message(payload.as_ref()),
                method = %record.method,
                url = %record.url,
                "request handler panicked"
            );
            HandlerError::Panic.into_response()
        }
    };

    let record = record.complete(capture.status(), start.elapsed());
    match serde_json::to_string(&record) {
        Ok(line) => {
            info!(target: ACCESS_LOG_TARGET, "{line}");
            response
        }
        Err(e) => HandlerError::Serialization(e).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;

    use super::*;

    #[test]
    fn capture_starts_unset() {
        assert_eq!(ResponseCapture::new().status(), UNSET_STATUS);
    }

    #[test]
    fn first_status_wins() {
        let mut capture = ResponseCapture::new();
        capture.set_status(StatusCode::NOT_FOUND);
        capture.set_status(StatusCode::INTERNAL_SERVER_ERROR);

        assert_eq!(capture.status(), 404);
    }

    #[test]
    fn write_without_status_implies_ok() {
        let mut capture = ResponseCapture::new();
        capture.record_write();
        capture.set_status(StatusCode::INTERNAL_SERVER_ERROR);

        assert_eq!(capture.status(), 200);
    }

    #[test]
    fn write_after_status_keeps_status() {
        let mut capture = ResponseCapture::new();
        capture.set_status(StatusCode::CREATED);
        capture.record_write();

        assert_eq!(capture.status(), 201);
    }

    #[test]
    fn record_reads_request_headers() {
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/identity?verbose=1")
            .header(header::REFERER, "https://example.com/")
            .header(header::USER_AGENT, "curl/8.5.0")
            .body(Body::empty())
            .unwrap();

        let record = RequestLogRecord::from_request(&request)
            .complete(200, Duration::from_millis(1500));

        assert_eq!(record.method, "POST");
        assert_eq!(record.url, "/identity?verbose=1");
        assert_eq!(record.referer, "https://example.com/");
        assert_eq!(record.user_agent, "curl/8.5.0");
        assert_eq!(record.status, 200);
        assert!((record.duration_seconds - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn record_missing_headers_are_empty() {
        let request = axum::http::Request::builder()
            .uri("/")
            .body(Body::empty())
            .unwrap();
        let record = RequestLogRecord::from_request(&request);

        assert_eq!(record.referer, "");
        assert_eq!(record.user_agent, "");
        assert_eq!(record.status, UNSET_STATUS);
    }

    #[test]
    fn record_serializes_camel_case_fields() {
        let record = RequestLogRecord {
            method: "GET".to_string(),
            url: "/".to_string(),
            referer: String::new(),
            user_agent: "probe".to_string(),
            status: 200,
            duration_seconds: 0.25,
        };

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "method": "GET",
                "url": "/",
                "referer": "",
                "userAgent": "probe",
                "status": 200,
                "durationSeconds": 0.25
            })
        );
    }

    #[test]
    fn panic_payloads_are_readable() {
        let text: Box<dyn Any + Send> = Box::new("boom");
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned boom"));
        let other: Box<dyn Any + Send> = Box::new(7_u8);

        assert_eq!(panic_message(text.as_ref()), "boom");
        assert_eq!(panic_message(owned.as_ref()), "owned boom");
        assert_eq!(panic_message(other.as_ref()), "non-string panic payload");
    }
}
