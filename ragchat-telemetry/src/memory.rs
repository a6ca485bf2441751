use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;
use tracing::{Id, Level, Subscriber};
use tracing_subscriber::{Layer, layer::Context, registry::LookupSpan};

/// Spans kept per session unless configured otherwise.
pub const DEFAULT_MAX_SPANS_PER_SESSION: usize = 256;

/// Field names that group spans into a session trace, in lookup order.
const SESSION_KEYS: [&str; 2] = ["session.id", "session_id"];

/// Data for a captured span
#[derive(Debug, Clone, Serialize)]
pub struct SpanData {
    #[serde(rename = "span_id")]
    pub id: String,
    pub name: String,
    #[serde(rename = "parent_span_id", skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    /// Nanoseconds since the unix epoch.
    pub start_time: u128,
    pub end_time: u128,
    pub duration_ms: f64,

    pub attributes: HashMap<String, serde_json::Value>,
    pub status: SpanStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCode {
    Ok,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpanStatus {
    pub code: StatusCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Sessions with captured spans kept unless configured otherwise.
pub const DEFAULT_MAX_SESSIONS: usize = 1024;

#[derive(Debug, Default)]
struct Traces {
    spans: HashMap<String, VecDeque<SpanData>>,
    /// Session ids, oldest first.
    order: VecDeque<String>,
}

/// Shared storage for traces, keyed by session id.
///
/// Each session keeps its most recent spans only; the oldest span is dropped
/// once `max_spans_per_session` is reached. Once `max_sessions` sessions are
/// stored, the oldest session's trace makes room for a new one.
#[derive(Debug, Clone)]
pub struct SharedTraceStorage {
    traces: Arc<RwLock<Traces>>,
    max_spans_per_session: usize,
    max_sessions: usize,
}

impl Default for SharedTraceStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedTraceStorage {
    pub fn new() -> Self {
        Self::with_max_spans(DEFAULT_MAX_SPANS_PER_SESSION)
    }

    pub fn with_max_spans(max_spans_per_session: usize) -> Self {
        Self {
            traces: Arc::new(RwLock::new(Traces::default())),
            max_spans_per_session: max_spans_per_session.max(1),
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }

    pub fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions.max(1);
        self
    }

    /// Spans captured for `session_id`, in the order they closed.
    pub fn get_trace(&self, session_id: &str) -> Option<Vec<SpanData>> {
        let traces = self.traces.read().ok()?;
        traces.spans.get(session_id).map(|spans| spans.iter().cloned().collect())
    }

    pub fn add_span(&self, session_id: String, span: SpanData) {
        let Ok(mut traces) = self.traces.write() else {
            return;
        };
        if !traces.spans.contains_key(&session_id) {
            while traces.order.len() >= self.max_sessions {
                let Some(oldest) = traces.order.pop_front() else {
                    break;
                };
                traces.spans.remove(&oldest);
            }
            traces.order.push_back(session_id.clone());
        }
        let spans = traces.spans.entry(session_id).or_default();
        if spans.len() == self.max_spans_per_session {
            spans.pop_front();
        }
        spans.push_back(span);
    }

    /// Ids of every session with captured spans, oldest first.
    pub fn sessions(&self) -> Vec<String> {
        self.traces.read().map(|t| t.order.iter().cloned().collect()).unwrap_or_default()
    }

    pub fn remove(&self, session_id: &str) -> Option<Vec<SpanData>> {
        let mut traces = self.traces.write().ok()?;
        let spans = traces.spans.remove(session_id)?;
        traces.order.retain(|id| id != session_id);
        Some(Vec::from(spans))
    }
}

/// A tracing layer that captures closed spans carrying a session id.
///
/// `session.id` (or `session_id`) is inherited from the parent span, so work
/// nested under a session's request span is grouped with it. Spans without a
/// session id are not stored.
pub struct InMemoryTraceLayer {
    storage: Arc<SharedTraceStorage>,
}

impl InMemoryTraceLayer {
    pub fn new(storage: Arc<SharedTraceStorage>) -> Self {
        Self { storage }
    }
}

#[derive(Clone)]
struct SpanFields(HashMap<String, serde_json::Value>);

#[derive(Clone, Copy)]
struct StartTime(u128);

struct SpanError(String);

fn now_nanos() -> u128 {
    SystemTime::now().duration_since(SystemTime::UNIX_EPOCH).unwrap_or_default().as_nanos()
}

impl<S> Layer<S> for InMemoryTraceLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &tracing::span::Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };

        let mut visitor = JsonVisitor::default();
        attrs.record(&mut visitor);
        let mut fields = visitor.0;

        if let Some(parent) = span.parent() {
            if let Some(parent_fields) = parent.extensions().get::<SpanFields>() {
                for key in SESSION_KEYS {
                    if !fields.contains_key(key) {
                        if let Some(value) = parent_fields.0.get(key) {
                            fields.insert(key.to_string(), value.clone());
                        }
                    }
                }
            }
        }

        let mut extensions = span.extensions_mut();
        extensions.insert(StartTime(now_nanos()));
        extensions.insert(SpanFields(fields));
    }

    fn on_record(&self, id: &Id, values: &tracing::span::Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };
        let mut extensions = span.extensions_mut();
        if let Some(fields) = extensions.get_mut::<SpanFields>() {
            let mut visitor = JsonVisitor::default();
            values.record(&mut visitor);
            fields.0.extend(visitor.0);
        }
    }

    // An error event marks its span as failed.
    fn on_event(&self, event: &tracing::Event<'_>, ctx: Context<'_, S>) {
        if *event.metadata().level() != Level::ERROR {
            return;
        }
        let Some(span) = ctx.event_span(event) else { return };

        let mut visitor = JsonVisitor::default();
        event.record(&mut visitor);
        let message = visitor
            .0
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("error")
            .to_string();
        span.extensions_mut().insert(SpanError(message));
    }

    fn on_close(&self, id: Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(&id) else { return };
        let extensions = span.extensions();

        let fields = extensions.get::<SpanFields>().map(|f| f.0.clone()).unwrap_or_default();
        let Some(session_id) = SESSION_KEYS
            .iter()
            .find_map(|key| fields.get(*key).and_then(|v| v.as_str()))
            .map(str::to_string)
        else {
            return;
        };

        let start_time = extensions.get::<StartTime>().map_or(0, |s| s.0);
        let end_time = now_nanos();
        let status = match extensions.get::<SpanError>() {
            Some(SpanError(message)) => {
                SpanStatus { code: StatusCode::Error, message: Some(message.clone()) }
            }
            None => SpanStatus { code: StatusCode::Ok, message: None },
        };

        let span_data = SpanData {
            id: format!("{:016x}", id.into_u64()),
            name: span.metadata().name().to_string(),
            parent_id: span.parent().map(|p| format!("{:016x}", p.id().into_u64())),
            start_time,
            end_time,
            duration_ms: end_time.saturating_sub(start_time) as f64 / 1_000_000.0,
            attributes: fields,
            status,
        };
        self.storage.add_span(session_id, span_data);
    }
}

#[derive(Default)]
struct JsonVisitor(HashMap<String, serde_json::Value>);

impl tracing::field::Visit for JsonVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.0.insert(field.name().to_string(), serde_json::Value::String(format!("{value:?}")));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.0.insert(field.name().to_string(), serde_json::Value::String(value.to_string()));
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.0.insert(field.name().to_string(), serde_json::Value::Bool(value));
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_f64(&mut self, field: &tracing::field::Field, value: f64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }
}
