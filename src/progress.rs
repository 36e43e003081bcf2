//! Indexing progress reporting.
//!
//! Reports observable progress during `threadvec index` so users see how many
//! groups a source produced and how far embedding has got. Progress is
//! emitted on **stderr** so stdout remains parseable for scripts.

use std::io::Write;
use std::sync::Arc;

/// A single progress event for one indexing run.
#[derive(Clone, Debug, PartialEq)]
pub enum IndexProgressEvent {
    /// Items were grouped; `groups` threads will be considered.
    Grouped { source: String, groups: u64 },
    /// `n` of `total` groups have been processed (indexed, skipped or failed).
    Indexing { source: String, n: u64, total: u64 },
}

/// Receives progress events from the pipeline.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: IndexProgressEvent);
}

/// Human-friendly progress on stderr: "index gmail  embedding  1,234 / 5,000 groups".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: IndexProgressEvent) {
        let line = match &event {
            IndexProgressEvent::Grouped { source, groups } => {
                format!("index {}  grouped into {} threads\n", source, format_number(*groups))
            }
            IndexProgressEvent::Indexing { source, n, total } => format!(
                "index {}  embedding  {} / {} groups\n",
                source,
                format_number(*n),
                format_number(*total)
            ),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: IndexProgressEvent) {
        let obj = match &event {
            IndexProgressEvent::Grouped { source, groups } => serde_json::json!({
                "event": "progress",
                "source": source,
                "phase": "grouped",
                "groups": groups
            }),
            IndexProgressEvent::Indexing { source, n, total } => serde_json::json!({
                "event": "progress",
                "source": source,
                "phase": "indexing",
                "n": n,
                "total": total
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: IndexProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "off" => Some(ProgressMode::Off),
            "human" => Some(ProgressMode::Human),
            "json" => Some(ProgressMode::Json),
            _ => None,
        }
    }

    /// Build a reporter for this mode.
    pub fn reporter(&self) -> Arc<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Arc::new(NoProgress),
            ProgressMode::Human => Arc::new(StderrProgress),
            ProgressMode::Json => Arc::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn parse_modes() {
        assert_eq!(ProgressMode::parse("json"), Some(ProgressMode::Json));
        assert_eq!(ProgressMode::parse("off"), Some(ProgressMode::Off));
        assert_eq!(ProgressMode::parse("loud"), None);
    }
}
