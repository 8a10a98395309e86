use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::SystemTime;
use tracing::{Level, Subscriber};
use tracing_subscriber::{Layer, layer::Context, prelude::*, registry::LookupSpan};

/// A log event captured by [`CaptureLayer`]
#[derive(Debug, Clone, Serialize)]
pub struct CapturedEvent {
    pub level: String,
    pub target: String,
    pub message: String,
    /// Nanoseconds since the Unix epoch
    pub timestamp: u128,
    /// Structured fields other than `message`
    pub fields: HashMap<String, serde_json::Value>,
    /// Name of the innermost enclosing span, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<String>,
}

impl CapturedEvent {
    /// Field value rendered as a string, if present
    pub fn field(&self, name: &str) -> Option<String> {
        self.fields.get(name).map(|v| match v {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

/// Shared storage for captured events
#[derive(Debug, Clone, Default)]
pub struct CapturedEvents {
    events: Arc<RwLock<Vec<CapturedEvent>>>,
}

impl CapturedEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: CapturedEvent) {
        if let Ok(mut events) = self.events.write() {
            events.push(event);
        }
    }

    /// Snapshot of every event captured so far
    pub fn all(&self) -> Vec<CapturedEvent> {
        self.events.read().map(|e| e.clone()).unwrap_or_default()
    }

    /// Events at exactly `level`
    pub fn at_level(&self, level: Level) -> Vec<CapturedEvent> {
        let level = level.to_string();
        self.all().into_iter().filter(|e| e.level == level).collect()
    }

    /// Events whose message contains `needle`
    pub fn containing(&self, needle: &str) -> Vec<CapturedEvent> {
        self.all().into_iter().filter(|e| e.message.contains(needle)).collect()
    }

    pub fn len(&self) -> usize {
        self.events.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.write() {
            events.clear();
        }
    }
}

/// A tracing layer that records events in memory
pub struct CaptureLayer {
    storage: CapturedEvents,
}

impl CaptureLayer {
    pub fn new(storage: CapturedEvents) -> Self {
        Self { storage }
    }
}

impl<S> Layer<S> for CaptureLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &tracing::Event<'_>, ctx: Context<'_, S>) {
        let mut visitor = JsonVisitor::default();
        event.record(&mut visitor);
        let mut fields = visitor.0;

        let message = match fields.remove("message") {
            Some(serde_json::Value::String(s)) => s,
            Some(other) => other.to_string(),
            None => String::new(),
        };

        let timestamp =
            SystemTime::now().duration_since(SystemTime::UNIX_EPOCH).unwrap_or_default().as_nanos();

        let metadata = event.metadata();
        self.storage.push(CapturedEvent {
            level: metadata.level().to_string(),
            target: metadata.target().to_string(),
            message,
            timestamp,
            fields,
            span: ctx.event_span(event).map(|span| span.name().to_string()),
        });
    }
}

/// Route events on the current thread into `storage` until the guard drops.
///
/// Meant for tests; works with single-threaded runtimes such as the
/// default `#[tokio::test]` flavor.
pub fn capture_thread(storage: CapturedEvents) -> tracing::subscriber::DefaultGuard {
    let subscriber = tracing_subscriber::registry().with(CaptureLayer::new(storage));
    tracing::subscriber::set_default(subscriber)
}

#[derive(Default)]
struct JsonVisitor(HashMap<String, serde_json::Value>);

impl tracing::field::Visit for JsonVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.0.insert(field.name().to_string(), serde_json::Value::String(format!("{:?}", value)));
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
