#![forbid(unsafe_code)]

use crate::traverse::TraversalStats;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Semantic-tagged console output. Notes go to stdout; everything that
/// signals a problem goes to stderr so a redirected run keeps its
/// diagnostics.
pub(crate) struct Reporter {
    debug: bool,
}

impl Reporter {
    pub(crate) fn new(debug: bool) -> Self {
        Self { debug }
    }

    pub(crate) fn note(&self, message: &str) {
        println!("note: {message}");
    }

    pub(crate) fn warning(&self, message: &str) {
        eprintln!("warning: {message}");
    }

    pub(crate) fn error(&self, message: &str) {
        eprintln!("error: {message}");
    }

    pub(crate) fn abort(&self, message: &str) {
        eprintln!("abort: {message}");
    }

    pub(crate) fn debug(&self, message: &str) {
        if self.debug {
            println!("debug: {message}");
        }
    }
}

/// Best-effort record of the last run, rewritten in place as the run
/// progresses. A traversal left unattended for hundreds of items needs
/// something to show for itself when the terminal scrollback is gone.
#[derive(Clone, Debug)]
pub(crate) struct SessionLog {
    path: PathBuf,
    start_rfc3339: String,
    pid: u32,
    args: Vec<String>,
    mode: Option<String>,
    counters: Option<TraversalStats>,
    last_error: Option<String>,
    exit: Option<String>,
}

impl SessionLog {
    pub(crate) fn new(storage_dir: &Path) -> Self {
        let this = Self {
            path: storage_dir.join("noteporter_last_run.txt"),
            start_rfc3339: now_rfc3339(),
            pid: std::process::id(),
            args: std::env::args().collect(),
            mode: None,
            counters: None,
            last_error: None,
            exit: None,
        };
        this.flush();
        this
    }

    pub(crate) fn note_mode(&mut self, mode: &str) {
        self.mode = Some(mode.to_string());
        self.flush();
    }

    pub(crate) fn note_counters(&mut self, stats: TraversalStats) {
        self.counters = Some(stats);
        self.flush();
    }

    pub(crate) fn note_error(&mut self, error: &str) {
        let error = error.trim();
        if error.is_empty() {
            return;
        }
        self.last_error = Some(error.to_string());
        self.flush();
    }

    pub(crate) fn note_exit(&mut self, reason: &str) {
        self.exit = Some(reason.to_string());
        self.flush();
    }

    fn flush(&self) {
        let Some(dir) = self.path.parent() else {
            return;
        };
        let _ = std::fs::create_dir_all(dir);

        let mut out = String::new();
        push_kv(&mut out, "ts_start", &self.start_rfc3339);
        push_kv(&mut out, "pid", &self.pid.to_string());
        push_kv(&mut out, "args", &format!("{:?}", self.args));
        if let Some(mode) = &self.mode {
            push_kv(&mut out, "mode", mode);
        }
        if let Some(stats) = &self.counters {
            push_kv(&mut out, "visited", &stats.visited.to_string());
            push_kv(&mut out, "processed", &stats.processed.to_string());
            push_kv(&mut out, "skipped", &stats.skipped.to_string());
            push_kv(&mut out, "failed", &stats.failed.to_string());
            push_kv(&mut out, "duplicate_titles", &stats.duplicate_titles.to_string());
        }
        if let Some(err) = &self.last_error {
            push_kv(&mut out, "last_error", err);
        }
        if let Some(exit) = &self.exit {
            push_kv(&mut out, "exit", exit);
        }

        let _ = std::fs::write(&self.path, out);
    }
}

fn push_kv(out: &mut String, key: &str, value: &str) {
    use std::fmt::Write as _;
    let _ = writeln!(out, "{key}={value}");
}

pub(crate) fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}
