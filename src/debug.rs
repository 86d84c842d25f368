use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// JSONL trace of layout decisions: one object per line, then a counter
/// summary per render. Only the writer is shared; every render keeps its
/// own counts in a [`DebugTrace`].
#[derive(Clone)]
pub(crate) struct DebugLogger {
    writer: Arc<Mutex<BufWriter<File>>>,
}

impl DebugLogger {
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: Arc::new(Mutex::new(BufWriter::new(file))),
        })
    }

    pub fn trace(&self, document: &str) -> DebugTrace {
        DebugTrace {
            logger: self.clone(),
            document: document.to_string(),
            counters: BTreeMap::new(),
        }
    }

    fn write(&self, record: &Value, flush: bool) {
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writeln!(writer, "{record}");
            if flush {
                let _ = writer.flush();
            }
        }
    }
}

/// Events of one render, tagged with its document title.
pub(crate) struct DebugTrace {
    logger: DebugLogger,
    document: String,
    counters: BTreeMap<String, u64>,
}

impl DebugTrace {
    /// Writes `{"type": kind, "document": title, ...fields}` and bumps the
    /// `kind` counter.
    pub fn event(&mut self, kind: &str, fields: Value) {
        let mut record = Map::new();
        record.insert("type".to_string(), Value::String(kind.to_string()));
        record.insert("document".to_string(), Value::String(self.document.clone()));
        if let Value::Object(extra) = fields {
            record.extend(extra);
        }
        self.logger.write(&Value::Object(record), false);
        let entry = self.counters.entry(kind.to_string()).or_insert(0);
        *entry = entry.saturating_add(1);
    }

    pub fn finish(self) {
        let summary = json!({
            "type": "debug.summary",
            "document": self.document,
            "counts": self.counters,
        });
        self.logger.write(&summary, true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(path: &Path) -> Vec<Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn writes_events_and_sorted_summary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.jsonl");
        let logger = DebugLogger::new(&path).unwrap();
        let mut trace = logger.trace("Quantum Computing");
        trace.event("layout.page_break", json!({"page": 1}));
        trace.event("layout.column_break", json!({"page": 0, "column": 1}));
        trace.event("layout.page_break", json!({"page": 2}));
        trace.finish();

        let lines = records(&path);
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0]["type"], "layout.page_break");
        assert_eq!(lines[0]["document"], "Quantum Computing");
        assert_eq!(lines[1]["column"], 1);
        assert_eq!(lines[3]["type"], "debug.summary");
        assert_eq!(lines[3]["counts"]["layout.page_break"], 2);
        assert_eq!(lines[3]["counts"]["layout.column_break"], 1);
    }

    #[test]
    fn interleaved_renders_count_only_their_own_events() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.jsonl");
        let logger = DebugLogger::new(&path).unwrap();
        let mut first = logger.trace("First");
        let mut second = logger.trace("Second");
        first.event("layout.column_break", json!({"column": 1}));
        second.event("layout.column_break", json!({"column": 1}));
        second.event("layout.page_break", json!({"to_page": 1}));
        first.finish();
        second.event("layout.column_break", json!({"column": 1}));
        second.finish();

        let lines = records(&path);
        let summaries: Vec<&Value> = lines
            .iter()
            .filter(|line| line["type"] == "debug.summary")
            .collect();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0]["document"], "First");
        assert_eq!(summaries[0]["counts"], json!({"layout.column_break": 1}));
        assert_eq!(summaries[1]["document"], "Second");
        assert_eq!(
            summaries[1]["counts"],
            json!({"layout.column_break": 2, "layout.page_break": 1})
        );
        assert!(lines.iter().all(|line| line["document"].is_string()));
    }
}
