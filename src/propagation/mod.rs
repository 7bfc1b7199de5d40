//! Trace-context propagation: W3C and B3 header codecs plus the extractor
//! that mines events' header payloads for a context.

pub mod b3;
pub mod context;
pub mod extract;
pub mod w3c;

pub use b3::{parse_b3, to_b3_headers};
pub use context::{generate_span_id, generate_trace_id, TraceContext, FLAG_SAMPLED};
pub use extract::ContextExtractor;
pub use w3c::{parse_traceparent, to_traceparent};
