use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::debug::json_escape;

// Span and count log for conversion phases. A ranked `<stem>_hot.log` is
// written next to the main log when the last handle is dropped.
#[derive(Clone)]
pub struct PerfLogger {
    inner: Arc<Mutex<PerfState>>,
}

struct PerfState {
    writer: BufWriter<File>,
    path: PathBuf,
    span_totals: HashMap<String, f64>,
    span_counts: HashMap<String, u64>,
    count_totals: HashMap<String, u64>,
}

impl PerfLogger {
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(PerfState {
                writer: BufWriter::new(file),
                path,
                span_totals: HashMap::new(),
                span_counts: HashMap::new(),
                count_totals: HashMap::new(),
            })),
        })
    }

    pub fn log_span_ms(&self, name: &str, doc_id: Option<usize>, ms: f64) {
        let json = format!(
            "{{\"type\":\"perf.span\",\"name\":\"{}\",\"doc_id\":{},\"unit\":\"ms\",\"ms\":{:.3}}}",
            json_escape(name),
            doc_json(doc_id),
            ms
        );
        if let Ok(mut state) = self.inner.lock() {
            *state.span_totals.entry(name.to_string()).or_insert(0.0) += ms;
            let entry = state.span_counts.entry(name.to_string()).or_insert(0);
            *entry = entry.saturating_add(1);
            let _ = writeln!(state.writer, "{json}");
        }
    }

    pub fn log_counts(&self, name: &str, doc_id: Option<usize>, counts: &[(&str, u64)]) {
        let mut out = format!(
            "{{\"type\":\"perf.counts\",\"name\":\"{}\",\"doc_id\":{},\"counts\":{{",
            json_escape(name),
            doc_json(doc_id)
        );
        for (idx, (key, value)) in counts.iter().enumerate() {
            if idx > 0 {
                out.push(',');
            }
            out.push_str(&format!("\"{}\":{}", json_escape(key), value));
        }
        out.push_str("}}");
        if let Ok(mut state) = self.inner.lock() {
            for (key, value) in counts {
                let full_key = format!("{name}.{key}");
                let entry = state.count_totals.entry(full_key).or_insert(0);
                *entry = entry.saturating_add(*value);
            }
            let _ = writeln!(state.writer, "{out}");
        }
    }

    pub fn flush(&self) {
        if let Ok(mut state) = self.inner.lock() {
            let _ = state.writer.flush();
        }
    }
}

pub(crate) fn timed<T>(
    perf: Option<&PerfLogger>,
    name: &str,
    doc_id: Option<usize>,
    f: impl FnOnce() -> T,
) -> T {
    let Some(logger) = perf else {
        return f();
    };
    let start = Instant::now();
    let out = f();
    logger.log_span_ms(name, doc_id, start.elapsed().as_secs_f64() * 1000.0);
    out
}

fn doc_json(doc_id: Option<usize>) -> String {
    doc_id
        .map(|v| v.to_string())
        .unwrap_or_else(|| "null".to_string())
}

impl Drop for PerfState {
    fn drop(&mut self) {
        let _ = self.writer.flush();
        let hot_path = hot_path_for(&self.path);
        let Ok(file) = File::create(&hot_path) else {
            return;
        };
        let mut writer = BufWriter::new(file);

        let mut spans: Vec<(&String, &f64)> = self.span_totals.iter().collect();
        spans.sort_by(|a, b| b.1.partial_cmp(a.1).unwrap_or(std::cmp::Ordering::Equal));
        for (rank, (name, ms)) in spans.into_iter().take(50).enumerate() {
            let count = *self.span_counts.get(name).unwrap_or(&1);
            let avg = if count == 0 { 0.0 } else { ms / count as f64 };
            let _ = writeln!(
                writer,
                "{{\"type\":\"perf.hot.span\",\"rank\":{},\"name\":\"{}\",\"unit\":\"ms\",\"ms\":{:.3},\"count\":{},\"avg_ms\":{:.3}}}",
                rank + 1,
                json_escape(name),
                ms,
                count,
                avg
            );
        }

        let mut counts: Vec<(&String, &u64)> = self.count_totals.iter().collect();
        counts.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        for (rank, (name, value)) in counts.into_iter().take(50).enumerate() {
            let _ = writeln!(
                writer,
                "{{\"type\":\"perf.hot.count\",\"rank\":{},\"name\":\"{}\",\"value\":{}}}",
                rank + 1,
                json_escape(name),
                value
            );
        }
    }
}

fn hot_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("paperweave_perf.log");
    let stem = file_name
        .rsplit_once('.')
        .map(|(s, _)| s)
        .unwrap_or(file_name);
    path.with_file_name(format!("{stem}_hot.log"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hot_log_ranks_spans_after_drop() {
        let path = crate::debug::temp_log_path("perf");
        let logger = PerfLogger::new(&path).expect("perf logger");
        logger.log_span_ms("cascade.sheets", Some(0), 2.0);
        logger.log_span_ms("cascade.materialize", Some(0), 5.0);
        let value = timed(Some(&logger), "document.build", None, || 7);
        assert_eq!(value, 7);
        logger.log_counts("cascade", Some(0), &[("nodes", 3)]);
        drop(logger);

        let log = std::fs::read_to_string(&path).expect("read perf log");
        assert!(log.contains("\"name\":\"document.build\",\"doc_id\":null"));
        let hot = hot_path_for(&path);
        let hot_log = std::fs::read_to_string(&hot).expect("read hot log");
        let first = hot_log.lines().next().unwrap_or_default();
        assert!(first.contains("cascade.materialize"), "hot log: {hot_log}");
        assert!(hot_log.contains("\"name\":\"cascade.nodes\",\"value\":3"));
        let _ = std::fs::remove_file(path);
        let _ = std::fs::remove_file(hot);
    }
}
