use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub struct DebugLogger {
    inner: Arc<Mutex<DebugState>>,
}

struct DebugState {
    writer: BufWriter<File>,
    counters: BTreeMap<String, u64>,
}

impl DebugLogger {
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(DebugState {
                writer: BufWriter::new(file),
                counters: BTreeMap::new(),
            })),
        })
    }

    pub fn log_json(&self, json: &str) {
        if let Ok(mut state) = self.inner.lock() {
            let _ = writeln!(state.writer, "{json}");
        }
    }

    pub fn log_event(&self, kind: &str, fields: &[(&str, &str)]) {
        let mut out = format!("{{\"type\":{}", json_string(kind));
        for (key, value) in fields {
            out.push_str(&format!(",{}:{}", json_string(key), json_string(value)));
        }
        out.push('}');
        self.log_json(&out);
    }

    pub fn increment(&self, key: &str, amount: u64) {
        if let Ok(mut state) = self.inner.lock() {
            let entry = state.counters.entry(key.to_string()).or_insert(0);
            *entry = entry.saturating_add(amount);
        }
    }

    pub fn counter(&self, key: &str) -> u64 {
        self.inner
            .lock()
            .ok()
            .and_then(|state| state.counters.get(key).copied())
            .unwrap_or(0)
    }

    pub fn emit_summary(&self, context: &str) {
        if let Ok(mut state) = self.inner.lock() {
            let counters = std::mem::take(&mut state.counters);
            let mut counts_json = String::from("{");
            for (idx, (key, value)) in counters.iter().enumerate() {
                if idx > 0 {
                    counts_json.push(',');
                }
                counts_json.push_str(&format!("{}:{}", json_string(key), value));
            }
            counts_json.push('}');
            let json = format!(
                "{{\"type\":\"debug.summary\",\"context\":{},\"counts\":{}}}",
                json_string(context),
                counts_json
            );
            let _ = writeln!(state.writer, "{json}");
        }
    }

    pub fn flush(&self) {
        if let Ok(mut state) = self.inner.lock() {
            let _ = state.writer.flush();
        }
    }
}

pub(crate) fn json_escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 8);
    for ch in raw.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(ch),
        }
    }
    out
}

pub(crate) fn json_string(value: &str) -> String {
    format!("\"{}\"", json_escape(value))
}

#[cfg(test)]
pub(crate) fn temp_log_path(tag: &str) -> std::path::PathBuf {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    std::env::temp_dir().join(format!(
        "paperweave_{}_{}_{}.jsonl",
        tag,
        std::process::id(),
        nanos
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_drains_counters_in_key_order() {
        let path = temp_log_path("debug_summary");
        let logger = DebugLogger::new(&path).expect("debug logger");
        logger.increment("css.selector_unparsed", 2);
        logger.increment("cascade.rules_matched", 1);
        logger.log_event("css.rule", &[("selector", "div \"x\"")]);
        assert_eq!(logger.counter("css.selector_unparsed"), 2);
        logger.emit_summary("test");
        logger.flush();
        assert_eq!(logger.counter("css.selector_unparsed"), 0);

        let log = std::fs::read_to_string(&path).expect("read debug log");
        assert!(log.contains("\"selector\":\"div \\\"x\\\"\""));
        assert!(log.contains(
            "\"counts\":{\"cascade.rules_matched\":1,\"css.selector_unparsed\":2}"
        ));
        let _ = std::fs::remove_file(path);
    }
}
