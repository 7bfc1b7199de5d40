//! The propagation unit carried across service boundaries.

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Bit 0 of the trace flags.
pub const FLAG_SAMPLED: u8 = 0x01;

/// Trace identity as carried by propagation headers.
///
/// Ids are canonical lowercase hex: 32 characters for the trace id and 16
/// for span ids. A context is valid iff both `trace_id` and `span_id` are
/// non-empty; a missing parent marks a root span.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceContext {
    pub trace_id: String,
    pub span_id: String,
    pub parent_span_id: Option<String>,
    pub flags: u8,
    /// Opaque vendor state, never validated
    pub state: Option<String>,
}

impl TraceContext {
    /// Starts a fresh sampled root context.
    pub fn new_root() -> Self {
        Self {
            trace_id: generate_trace_id(),
            span_id: generate_span_id(),
            parent_span_id: None,
            flags: FLAG_SAMPLED,
            state: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.trace_id.is_empty() && !self.span_id.is_empty()
    }

    pub fn is_sampled(&self) -> bool {
        self.flags & FLAG_SAMPLED != 0
    }

    /// Derives a child: same trace, this span as parent, fresh span id.
    pub fn create_child(&self) -> Self {
        Self {
            trace_id: self.trace_id.clone(),
            span_id: generate_span_id(),
            parent_span_id: Some(self.span_id.clone()).filter(|id| !id.is_empty()),
            flags: self.flags,
            state: self.state.clone(),
        }
    }

    /// Flags rendered the way events carry them (two lowercase hex digits).
    pub fn flags_hex(&self) -> String {
        format!("{:02x}", self.flags)
    }
}

/// 16 random bytes from the OS entropy source, hex encoded.
///
/// Returns an empty string if the entropy source fails; an empty id makes
/// the resulting context invalid rather than aborting.
pub fn generate_trace_id() -> String {
    random_hex::<16>()
}

/// 8 random bytes from the OS entropy source, hex encoded.
pub fn generate_span_id() -> String {
    random_hex::<8>()
}

fn random_hex<const N: usize>() -> String {
    let mut bytes = [0u8; N];
    match OsRng.try_fill_bytes(&mut bytes) {
        Ok(()) => hex::encode(bytes),
        Err(e) => {
            tracing::warn!("entropy source failed, emitting empty id: {}", e);
            String::new()
        },
    }
}
