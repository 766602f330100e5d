//! Progress reporting for `pctx add`.
//!
//! Reports what is being scanned and how many files have been read so
//! large directory imports do not look stalled. Progress is emitted on
//! **stderr** so stdout remains parseable for scripts.

use std::io::Write;

/// A single progress event while adding files.
#[derive(Clone, Debug)]
pub enum AddProgressEvent {
    /// Walking an input path. Total unknown.
    Scanning { root: String },
    /// `n` files read out of `total`.
    Reading { n: u64, total: u64 },
}

/// Reports add progress. Implementations write to stderr (human or JSON).
pub trait AddProgressReporter: Send + Sync {
    fn report(&self, event: AddProgressEvent);
}

/// Human-friendly progress on stderr: "add  reading  1,234 / 5,000 files".
pub struct StderrProgress;

impl AddProgressReporter for StderrProgress {
    fn report(&self, event: AddProgressEvent) {
        let line = match &event {
            AddProgressEvent::Scanning { root } => format!("add {}  scanning...\n", root),
            AddProgressEvent::Reading { n, total } => format!(
                "add  reading  {} / {} files\n",
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

impl AddProgressReporter for JsonProgress {
    fn report(&self, event: AddProgressEvent) {
        let obj = match &event {
            AddProgressEvent::Scanning { root } => serde_json::json!({
                "event": "progress",
                "phase": "scanning",
                "root": root
            }),
            AddProgressEvent::Reading { n, total } => serde_json::json!({
                "event": "progress",
                "phase": "reading",
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

impl AddProgressReporter for NoProgress {
    fn report(&self, _event: AddProgressEvent) {}
}

/// Thousands-separated integer.
pub fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
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

    pub fn reporter(&self) -> Box<dyn AddProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
