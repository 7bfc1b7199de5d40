//! Zipkin B3 multi-header codec.

use super::context::{TraceContext, FLAG_SAMPLED};
use std::collections::HashMap;

pub const TRACE_ID_HEADER: &str = "X-B3-TraceId";
pub const SPAN_ID_HEADER: &str = "X-B3-SpanId";
pub const PARENT_SPAN_ID_HEADER: &str = "X-B3-ParentSpanId";
pub const SAMPLED_HEADER: &str = "X-B3-Sampled";
pub const FLAGS_HEADER: &str = "X-B3-Flags";

/// Reads the `X-B3-*` headers, matching names case-insensitively.
///
/// Returns `None` unless both a trace id and a span id are present. The
/// context is sampled when `X-B3-Sampled` is `1`/`true` or `X-B3-Flags` is
/// `1` (debug).
pub fn parse_b3(headers: &HashMap<String, String>) -> Option<TraceContext> {
    let lookup = |name: &str| {
        headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.trim())
            .filter(|value| !value.is_empty())
    };

    let trace_id = lookup(TRACE_ID_HEADER)?;
    let span_id = lookup(SPAN_ID_HEADER)?;

    let sampled = matches!(lookup(SAMPLED_HEADER), Some(v) if v == "1" || v.eq_ignore_ascii_case("true"))
        || lookup(FLAGS_HEADER) == Some("1");

    Some(TraceContext {
        trace_id: trace_id.to_ascii_lowercase(),
        span_id: span_id.to_ascii_lowercase(),
        parent_span_id: lookup(PARENT_SPAN_ID_HEADER).map(str::to_ascii_lowercase),
        flags: if sampled { FLAG_SAMPLED } else { 0 },
        state: None,
    })
}

/// Renders the context as canonically-cased `X-B3-*` headers; `None` for an invalid context.
pub fn to_b3_headers(ctx: &TraceContext) -> Option<HashMap<String, String>> {
    if !ctx.is_valid() {
        return None;
    }

    let mut headers = HashMap::with_capacity(4);
    headers.insert(TRACE_ID_HEADER.to_string(), ctx.trace_id.clone());
    headers.insert(SPAN_ID_HEADER.to_string(), ctx.span_id.clone());
    if let Some(parent) = ctx.parent_span_id.as_ref().filter(|p| !p.is_empty()) {
        headers.insert(PARENT_SPAN_ID_HEADER.to_string(), parent.clone());
    }
    headers.insert(
        SAMPLED_HEADER.to_string(),
        if ctx.is_sampled() { "1" } else { "0" }.to_string(),
    );
    Some(headers)
}
