//! W3C Trace Context `traceparent` codec.

use super::context::{generate_span_id, TraceContext};
use crate::core::{Result, WeaveError};

/// Header carrying the trace parent.
pub const TRACEPARENT_HEADER: &str = "traceparent";
/// Header carrying opaque vendor state.
pub const TRACESTATE_HEADER: &str = "tracestate";

const SUPPORTED_VERSION: &str = "00";
const TRACE_ID_LEN: usize = 32;
const SPAN_ID_LEN: usize = 16;
const FLAGS_LEN: usize = 2;

/// Parses `00-<32 hex>-<16 hex>-<2 hex>`.
///
/// The returned context describes the local child span: the header's span id
/// becomes `parent_span_id` and a fresh `span_id` is generated.
pub fn parse_traceparent(header: &str) -> Result<TraceContext> {
    let fields: Vec<&str> = header.split('-').collect();
    if fields.len() != 4 {
        return Err(WeaveError::trace_parent(format!(
            "expected 4 fields, got {}",
            fields.len()
        )));
    }

    let (version, trace_id, span_id, flags) = (fields[0], fields[1], fields[2], fields[3]);
    if version != SUPPORTED_VERSION {
        return Err(WeaveError::trace_parent(format!("unsupported version {version:?}")));
    }
    if !is_hex_of_len(trace_id, TRACE_ID_LEN) {
        return Err(WeaveError::trace_parent("trace id must be 32 hex characters"));
    }
    if !is_hex_of_len(span_id, SPAN_ID_LEN) {
        return Err(WeaveError::trace_parent("span id must be 16 hex characters"));
    }
    if !is_hex_of_len(flags, FLAGS_LEN) {
        return Err(WeaveError::trace_parent("flags must be 2 hex characters"));
    }
    let flags = u8::from_str_radix(flags, 16)
        .map_err(|e| WeaveError::trace_parent(format!("invalid flags: {e}")))?;

    Ok(TraceContext {
        trace_id: trace_id.to_ascii_lowercase(),
        span_id: generate_span_id(),
        parent_span_id: Some(span_id.to_ascii_lowercase()),
        flags,
        state: None,
    })
}

/// Renders `00-<trace id>-<span id>-<flags>`, or an empty string for an invalid context.
pub fn to_traceparent(ctx: &TraceContext) -> String {
    if !ctx.is_valid() {
        return String::new();
    }
    format!("{}-{}-{}-{:02x}", SUPPORTED_VERSION, ctx.trace_id, ctx.span_id, ctx.flags)
}

fn is_hex_of_len(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| b.is_ascii_hexdigit())
}
