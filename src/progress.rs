//! Run progress reporting.
//!
//! Reports what a `hunt run` is doing while it does it. Progress goes to
//! **stderr** so the run summary on stdout stays parseable.

use std::io::Write;

use crate::pipeline::RunState;

/// A single progress event.
#[derive(Clone, Debug)]
pub enum RunProgressEvent {
    /// The run entered a new state.
    Phase { state: RunState },
    /// Collection so far; the total is unknown until every source ends.
    Collecting { items: u64, failures: u64 },
    Filtering { n: u64, total: u64 },
    Generating { n: u64, total: u64 },
}

pub trait RunProgressReporter: Send + Sync {
    fn report(&self, event: RunProgressEvent);
}

/// Human-friendly progress on stderr: "run  generating  12 / 50 complaints".
pub struct StderrProgress;

impl RunProgressReporter for StderrProgress {
    fn report(&self, event: RunProgressEvent) {
        let line = match &event {
            RunProgressEvent::Phase { state } => format!("run  {}\n", state.as_str()),
            RunProgressEvent::Collecting { items, failures } => format!(
                "run  collecting  {} items ({} failures)\n",
                format_number(*items),
                format_number(*failures)
            ),
            RunProgressEvent::Filtering { n, total } => format!(
                "run  filtering  {} / {} items\n",
                format_number(*n),
                format_number(*total)
            ),
            RunProgressEvent::Generating { n, total } => format!(
                "run  generating  {} / {} complaints\n",
                format_number(*n),
                format_number(*total)
            ),
        };
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(line.as_bytes());
        let _ = err.flush();
    }
}

/// One JSON object per line on stderr.
pub struct JsonProgress;

impl RunProgressReporter for JsonProgress {
    fn report(&self, event: RunProgressEvent) {
        let obj = match &event {
            RunProgressEvent::Phase { state } => serde_json::json!({
                "event": "phase",
                "state": state.as_str(),
            }),
            RunProgressEvent::Collecting { items, failures } => serde_json::json!({
                "event": "progress",
                "phase": "collecting",
                "items": items,
                "failures": failures,
            }),
            RunProgressEvent::Filtering { n, total } => serde_json::json!({
                "event": "progress",
                "phase": "filtering",
                "n": n,
                "total": total,
            }),
            RunProgressEvent::Generating { n, total } => serde_json::json!({
                "event": "progress",
                "phase": "generating",
                "n": n,
                "total": total,
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{}", line);
            let _ = err.flush();
        }
    }
}

pub struct NoProgress;

impl RunProgressReporter for NoProgress {
    fn report(&self, _event: RunProgressEvent) {}
}

pub fn format_number(n: u64) -> String {
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
    /// Human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn RunProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
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
}
