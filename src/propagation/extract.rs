//! Recovers a [`TraceContext`] from whatever header source an event offers.
//!
//! Schemes are tried in a fixed order: W3C `traceparent` (with `tracestate`),
//! B3 multi-header, then a request-id fallback that starts a fresh sampled
//! context and stashes the id in `state`. Finding nothing is not an error.

use super::b3;
use super::context::TraceContext;
use super::w3c::{self, TRACEPARENT_HEADER, TRACESTATE_HEADER};
use crate::core::config::ExtractionLimits;
use hyper::header::HeaderMap;
use std::collections::HashMap;

/// Header whose presence alone triggers the fallback context.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Header-bag context extractor with defensive input bounds.
#[derive(Debug, Clone, Default)]
pub struct ContextExtractor {
    limits: ExtractionLimits,
}

impl ContextExtractor {
    pub fn new(limits: ExtractionLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &ExtractionLimits {
        &self.limits
    }

    /// Extracts a context from a name/value mapping.
    pub fn extract_from_headers(&self, headers: &HashMap<String, String>) -> Option<TraceContext> {
        if headers.len() > self.limits.max_headers {
            tracing::debug!(
                headers = headers.len(),
                limit = self.limits.max_headers,
                "header set too large, skipping context extraction"
            );
            return None;
        }

        let sanitized: HashMap<String, String> = headers
            .iter()
            .filter(|(name, value)| self.accepts(name, value))
            .map(|(name, value)| (name.to_ascii_lowercase(), value.trim().to_string()))
            .collect();

        self.extract_sanitized(&sanitized)
    }

    /// Extracts a context from a raw `\r\n`-joined header blob.
    ///
    /// Lines without a `:` (such as a request line) are ignored.
    pub fn extract_from_raw(&self, raw: &str) -> Option<TraceContext> {
        if raw.len() > self.limits.max_raw_len {
            tracing::debug!(bytes = raw.len(), "raw header blob too large, skipping");
            return None;
        }

        let mut headers = HashMap::new();
        for line in raw.split("\r\n") {
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            let (name, value) = (name.trim(), value.trim());
            if name.is_empty() || !self.accepts(name, value) {
                continue;
            }
            if headers.len() >= self.limits.max_headers {
                tracing::debug!(limit = self.limits.max_headers, "raw header blob has too many lines");
                return None;
            }
            headers
                .entry(name.to_ascii_lowercase())
                .or_insert_with(|| value.to_string());
        }

        self.extract_sanitized(&headers)
    }

    /// Extracts a context from an HTTP request's headers.
    pub fn extract_from_request<B>(&self, request: &hyper::Request<B>) -> Option<TraceContext> {
        self.extract_from_header_map(request.headers())
    }

    /// Extracts a context from an HTTP response's headers.
    pub fn extract_from_response<B>(&self, response: &hyper::Response<B>) -> Option<TraceContext> {
        self.extract_from_header_map(response.headers())
    }

    fn extract_from_header_map(&self, map: &HeaderMap) -> Option<TraceContext> {
        if map.keys_len() > self.limits.max_headers {
            tracing::debug!(headers = map.keys_len(), "header map too large, skipping context extraction");
            return None;
        }

        let mut headers = HashMap::with_capacity(map.keys_len());
        for (name, value) in map {
            // Non UTF-8 values cannot carry any scheme we understand.
            let Ok(value) = value.to_str() else {
                continue;
            };
            if self.accepts(name.as_str(), value) {
                headers
                    .entry(name.as_str().to_string())
                    .or_insert_with(|| value.trim().to_string());
            }
        }

        self.extract_sanitized(&headers)
    }

    fn accepts(&self, name: &str, value: &str) -> bool {
        if name.len() > self.limits.max_header_name_len || value.len() > self.limits.max_header_value_len {
            return false;
        }
        !has_line_break(name) && !has_line_break(value)
    }

    /// `headers` must already be bounded, lower-cased and trimmed.
    fn extract_sanitized(&self, headers: &HashMap<String, String>) -> Option<TraceContext> {
        if let Some(traceparent) = headers.get(TRACEPARENT_HEADER) {
            match w3c::parse_traceparent(traceparent) {
                Ok(mut ctx) => {
                    ctx.state = headers
                        .get(TRACESTATE_HEADER)
                        .filter(|state| !state.is_empty())
                        .cloned();
                    return Some(ctx);
                },
                Err(e) => tracing::debug!("ignoring traceparent: {}", e),
            }
        }

        if let Some(ctx) = b3::parse_b3(headers) {
            return Some(ctx);
        }

        headers
            .get(REQUEST_ID_HEADER)
            .filter(|id| !id.is_empty())
            .map(|request_id| TraceContext {
                state: Some(request_id.clone()),
                ..TraceContext::new_root()
            })
    }
}

fn has_line_break(s: &str) -> bool {
    s.bytes().any(|b| b == b'\r' || b == b'\n')
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRACEPARENT: &str = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

    fn headers(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_w3c_takes_priority_and_copies_state() {
        let extractor = ContextExtractor::default();
        let ctx = extractor
            .extract_from_headers(&headers(&[
                ("TraceParent", TRACEPARENT),
                ("tracestate", "congo=t61rcWkgMzE"),
                ("x-b3-traceid", "463ac35c9f6413ad48485a3953bb6124"),
                ("x-b3-spanid", "a2fb4a1d1a96d312"),
            ]))
            .unwrap();
        assert_eq!(ctx.trace_id, "4bf92f3577b34da6a3ce929d0e0e4736");
        assert_eq!(ctx.state.as_deref(), Some("congo=t61rcWkgMzE"));
    }

    #[test]
    fn test_malformed_traceparent_falls_back_to_b3() {
        let extractor = ContextExtractor::default();
        let ctx = extractor
            .extract_from_headers(&headers(&[
                ("traceparent", "garbage"),
                ("x-b3-traceid", "463ac35c9f6413ad48485a3953bb6124"),
                ("x-b3-spanid", "a2fb4a1d1a96d312"),
            ]))
            .unwrap();
        assert_eq!(ctx.trace_id, "463ac35c9f6413ad48485a3953bb6124");
    }

    #[test]
    fn test_request_id_fallback() {
        let extractor = ContextExtractor::default();
        let ctx = extractor
            .extract_from_headers(&headers(&[("X-Request-Id", "req-42")]))
            .unwrap();
        assert!(ctx.is_valid());
        assert!(ctx.is_sampled());
        assert!(ctx.parent_span_id.is_none());
        assert_eq!(ctx.state.as_deref(), Some("req-42"));
    }

    #[test]
    fn test_unrecognized_headers_yield_none() {
        let extractor = ContextExtractor::default();
        assert!(extractor
            .extract_from_headers(&headers(&[("content-type", "text/plain"), ("host", "example.com")]))
            .is_none());
        assert!(extractor.extract_from_headers(&HashMap::new()).is_none());
    }

    #[test]
    fn test_oversized_header_set_rejected() {
        let extractor = ContextExtractor::new(ExtractionLimits {
            max_headers: 2,
            ..ExtractionLimits::default()
        });
        let ctx = extractor.extract_from_headers(&headers(&[
            ("traceparent", TRACEPARENT),
            ("a", "1"),
            ("b", "2"),
        ]));
        assert!(ctx.is_none());
    }

    #[test]
    fn test_oversized_and_injected_values_dropped() {
        let extractor = ContextExtractor::new(ExtractionLimits {
            max_header_value_len: 16,
            ..ExtractionLimits::default()
        });
        assert!(extractor
            .extract_from_headers(&headers(&[("traceparent", TRACEPARENT)]))
            .is_none());

        let extractor = ContextExtractor::default();
        let injected = format!("{TRACEPARENT}\r\nx-evil: 1");
        assert!(extractor
            .extract_from_headers(&headers(&[("traceparent", injected.as_str())]))
            .is_none());
    }

    #[test]
    fn test_raw_blob() {
        let extractor = ContextExtractor::default();
        let raw = format!(
            "GET /checkout HTTP/1.1\r\nHost: shop.local\r\nTraceparent:  {TRACEPARENT} \r\nTracestate: vendor=1\r\n\r\n"
        );
        let ctx = extractor.extract_from_raw(&raw).unwrap();
        assert_eq!(ctx.trace_id, "4bf92f3577b34da6a3ce929d0e0e4736");
        assert_eq!(ctx.parent_span_id.as_deref(), Some("00f067aa0ba902b7"));
        assert_eq!(ctx.state.as_deref(), Some("vendor=1"));
    }

    #[test]
    fn test_raw_blob_bounds() {
        let extractor = ContextExtractor::new(ExtractionLimits {
            max_raw_len: 32,
            ..ExtractionLimits::default()
        });
        let raw = format!("traceparent: {TRACEPARENT}\r\n");
        assert!(extractor.extract_from_raw(&raw).is_none());

        let extractor = ContextExtractor::new(ExtractionLimits {
            max_headers: 1,
            ..ExtractionLimits::default()
        });
        let raw = format!("host: a\r\ntraceparent: {TRACEPARENT}\r\n");
        assert!(extractor.extract_from_raw(&raw).is_none());
    }

    #[test]
    fn test_http_request_and_response() {
        let extractor = ContextExtractor::default();
        let request = hyper::Request::builder()
            .uri("/orders")
            .header("traceparent", TRACEPARENT)
            .body(())
            .unwrap();
        let ctx = extractor.extract_from_request(&request).unwrap();
        assert_eq!(ctx.trace_id, "4bf92f3577b34da6a3ce929d0e0e4736");

        let response = hyper::Response::builder()
            .header("X-B3-TraceId", "463ac35c9f6413ad48485a3953bb6124")
            .header("X-B3-SpanId", "a2fb4a1d1a96d312")
            .body(())
            .unwrap();
        let ctx = extractor.extract_from_response(&response).unwrap();
        assert_eq!(ctx.span_id, "a2fb4a1d1a96d312");
    }
}
