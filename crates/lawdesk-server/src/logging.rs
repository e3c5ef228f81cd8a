use std::{collections::VecDeque, sync::Arc};

use serde_json::{Map, Value};
use tokio::sync::broadcast;

/// Lines kept for late `/api/logs` subscribers.
pub(crate) const RING_CAPACITY: usize = 500;

/// Tees every log event into a bounded ring and a broadcast channel as one
/// JSON line: `{ts, level, category, target, message, fields}`.
pub(crate) struct BroadcastLayer {
    pub tx: broadcast::Sender<String>,
    pub ring: Arc<std::sync::Mutex<VecDeque<String>>>,
}

#[derive(Default)]
struct FieldVisitor {
    message: String,
    fields: Map<String, Value>,
}

impl tracing::field::Visit for FieldVisitor {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields
                .insert(field.name().to_string(), Value::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        let rendered = format!("{value:?}");
        // Debug on &str adds quotes
        let rendered = rendered
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .map(str::to_string)
            .unwrap_or(rendered);
        if field.name() == "message" {
            self.message = rendered;
        } else {
            self.fields
                .insert(field.name().to_string(), Value::String(rendered));
        }
    }
}

/// Dashboard grouping for a log target.
pub(crate) fn category(target: &str) -> &'static str {
    if target.contains("pipeline") {
        "pipeline"
    } else if target.starts_with("lawdesk_agent") {
        "llm"
    } else if target.starts_with("lawdesk_lawdata") {
        "lawdata"
    } else {
        "system"
    }
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for BroadcastLayer {
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let level = match *event.metadata().level() {
            tracing::Level::ERROR => "err",
            tracing::Level::WARN => "warn",
            tracing::Level::INFO => "info",
            tracing::Level::DEBUG => "debug",
            tracing::Level::TRACE => return,
        };
        let target = event.metadata().target();

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let line = serde_json::json!({
            "ts": chrono::Utc::now().to_rfc3339(),
            "level": level,
            "category": category(target),
            "target": target,
            "message": visitor.message,
            "fields": visitor.fields,
        })
        .to_string();

        let _ = self.tx.send(line.clone());
        if let Ok(mut ring) = self.ring.lock() {
            ring.push_back(line);
            while ring.len() > RING_CAPACITY {
                ring.pop_front();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tracing_subscriber::layer::SubscriberExt;

    use super::*;

    fn capture(f: impl FnOnce()) -> (Vec<Value>, broadcast::Receiver<String>) {
        let (tx, rx) = broadcast::channel(16);
        let ring = Arc::new(std::sync::Mutex::new(VecDeque::new()));
        let subscriber = tracing_subscriber::registry().with(BroadcastLayer {
            tx,
            ring: Arc::clone(&ring),
        });
        tracing::subscriber::with_default(subscriber, f);
        let lines = ring
            .lock()
            .unwrap()
            .iter()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        (lines, rx)
    }

    #[test]
    fn categories_follow_crate_targets() {
        assert_eq!(category("lawdesk_core::pipeline"), "pipeline");
        assert_eq!(category("lawdesk_agent::gemini"), "llm");
        assert_eq!(category("lawdesk_lawdata::client"), "lawdata");
        assert_eq!(category("lawdesk_server::routes"), "system");
        assert_eq!(category("tower_http::trace"), "system");
    }

    #[test]
    fn event_becomes_json_line_with_fields() {
        let (lines, mut rx) = capture(|| {
            tracing::warn!(
                target: "lawdesk_lawdata::client",
                keyword = %"전자금융거래법",
                status = 502u64,
                "law search returned non-200"
            );
        });

        assert_eq!(lines.len(), 1);
        let line = &lines[0];
        assert_eq!(line["level"], "warn");
        assert_eq!(line["category"], "lawdata");
        assert_eq!(line["message"], "law search returned non-200");
        assert_eq!(line["fields"]["keyword"], "전자금융거래법");
        assert_eq!(line["fields"]["status"], 502);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn trace_events_are_skipped() {
        let (lines, _rx) = capture(|| tracing::trace!("noise"));
        assert!(lines.is_empty());
    }

    #[test]
    fn ring_is_bounded() {
        let (lines, _rx) = capture(|| {
            for i in 0..(RING_CAPACITY + 20) {
                tracing::info!(n = i as u64, "line");
            }
        });
        assert_eq!(lines.len(), RING_CAPACITY);
        assert_eq!(lines[0]["fields"]["n"], 20);
    }
}
