//! Flat span records as delivered by the query backend.

use serde::{Deserialize, Serialize};

/// A single span as returned by the backend, before any hierarchy is built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpanRecord {
    /// Span identifier, unique only within one trace's fetched set.
    pub span_id: String,
    /// Identifier of the trace this span belongs to.
    pub trace_id: String,
    /// Parent span identifier; empty or missing for roots.
    #[serde(default)]
    pub parent_span_id: Option<String>,
    /// Span name for display.
    #[serde(default)]
    pub name: String,
    /// Semantic operation name (e.g. "chat", "execute_tool").
    #[serde(default)]
    pub operation_kind: Option<String>,
    /// Textual start timestamp, possibly zone-less with sub-millisecond digits.
    #[serde(default)]
    pub start_time: String,
    /// Textual end timestamp.
    #[serde(default)]
    pub end_time: String,
    /// Span duration in nanoseconds.
    #[serde(default)]
    pub duration_nanos: Option<i64>,
    /// 0 = unset, 1 = ok, 2 and above = error.
    #[serde(default)]
    pub status_code: i32,
    #[serde(default)]
    pub input_tokens: Option<u64>,
    #[serde(default)]
    pub output_tokens: Option<u64>,
    #[serde(default)]
    pub total_tokens: Option<u64>,
    /// Input payload.
    #[serde(default)]
    pub input: Option<String>,
    /// Output payload.
    #[serde(default)]
    pub output: Option<String>,
    /// Opaque source document, kept for detail display.
    #[serde(default)]
    pub raw: serde_json::Value,
}

/// Outcome of a span derived from its status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanStatus {
    #[default]
    Unset,
    Ok,
    Error,
}

impl SpanStatus {
    pub fn from_code(code: i32) -> Self {
        match code {
            c if c >= 2 => SpanStatus::Error,
            1 => SpanStatus::Ok,
            _ => SpanStatus::Unset,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, SpanStatus::Error)
    }
}

impl SpanRecord {
    /// Creates a bare span with only its identifiers set.
    pub fn new(span_id: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self {
            span_id: span_id.into(),
            trace_id: trace_id.into(),
            ..Default::default()
        }
    }

    pub fn with_parent(mut self, parent_span_id: impl Into<String>) -> Self {
        self.parent_span_id = Some(parent_span_id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_operation(mut self, operation_kind: impl Into<String>) -> Self {
        self.operation_kind = Some(operation_kind.into());
        self
    }

    pub fn with_times(mut self, start_time: impl Into<String>, end_time: impl Into<String>) -> Self {
        self.start_time = start_time.into();
        self.end_time = end_time.into();
        self
    }

    pub fn with_duration_nanos(mut self, nanos: i64) -> Self {
        self.duration_nanos = Some(nanos);
        self
    }

    pub fn with_status_code(mut self, code: i32) -> Self {
        self.status_code = code;
        self
    }

    pub fn with_tokens(mut self, input: u64, output: u64) -> Self {
        self.input_tokens = Some(input);
        self.output_tokens = Some(output);
        self
    }

    /// The parent reference, treating an empty string as no parent.
    pub fn parent_id(&self) -> Option<&str> {
        self.parent_span_id.as_deref().filter(|p| !p.is_empty())
    }

    pub fn status(&self) -> SpanStatus {
        SpanStatus::from_code(self.status_code)
    }

    /// The explicit total when present, otherwise input plus output.
    pub fn resolved_total_tokens(&self) -> Option<u64> {
        if let Some(total) = self.total_tokens {
            return Some(total);
        }
        match (self.input_tokens, self.output_tokens) {
            (None, None) => None,
            (input, output) => Some(input.unwrap_or(0) + output.unwrap_or(0)),
        }
    }

    /// Duration in nanoseconds, falling back to `durationInNanos` in the raw document.
    pub fn resolved_duration_nanos(&self) -> Option<f64> {
        if let Some(nanos) = self.duration_nanos.filter(|n| *n > 0) {
            return Some(nanos as f64);
        }
        let raw = self.raw.get("durationInNanos")?;
        let nanos = match raw {
            serde_json::Value::Number(n) => n.as_f64()?,
            serde_json::Value::String(s) => s.trim().parse::<f64>().ok()?,
            _ => return None,
        };
        (nanos.is_finite() && nanos > 0.0).then_some(nanos)
    }
}
