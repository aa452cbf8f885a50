//! Telemetry metric name constants.
//!
//! Centralised metric names for bifrost invocations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `bifrost_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `protocol` — transport name ("gRPC" or "gRPC-Web")
//! - `call_shape` — "unary", "client_streaming", "server_streaming" or
//!   "bidirectional_streaming"
//! - `code` — terminal status label, e.g. "ok", "cancelled", "unavailable"
//! - `direction` — message direction: "inbound" or "outbound"

use std::time::Instant;

use crate::loader::CallShape;
use crate::types::StatusCode;

/// Total calls that reached a terminal outcome.
///
/// Labels: `protocol`, `call_shape`, `code`.
pub const CALLS_TOTAL: &str = "bifrost_calls_total";

/// Call duration in seconds, dispatch to terminal outcome.
///
/// Labels: `protocol`, `call_shape`.
pub const CALL_DURATION_SECONDS: &str = "bifrost_call_duration_seconds";

/// Total messages carried on streaming calls.
///
/// Labels: `protocol`, `direction` ("inbound" | "outbound").
pub const STREAM_MESSAGES_TOTAL: &str = "bifrost_stream_messages_total";

/// Message direction label for [`STREAM_MESSAGES_TOTAL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    fn as_str(self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        }
    }
}

/// Record one terminal outcome.
pub(crate) fn record_call(
    protocol: &'static str,
    call_shape: CallShape,
    code: StatusCode,
    started: Instant,
) {
    metrics::counter!(
        CALLS_TOTAL,
        "protocol" => protocol,
        "call_shape" => call_shape.as_str(),
        "code" => code.as_str(),
    )
    .increment(1);
    metrics::histogram!(
        CALL_DURATION_SECONDS,
        "protocol" => protocol,
        "call_shape" => call_shape.as_str(),
    )
    .record(started.elapsed().as_secs_f64());
}

pub(crate) fn record_message(protocol: &'static str, direction: Direction) {
    metrics::counter!(
        STREAM_MESSAGES_TOTAL,
        "protocol" => protocol,
        "direction" => direction.as_str(),
    )
    .increment(1);
}
