#![forbid(unsafe_code)]

mod bridge;
mod dump;
mod reconcile;
mod report;
mod surface;
#[cfg(test)]
mod tests;
mod traverse;

use bridge::BridgeSurface;
use np_storage::EntityStore;
use reconcile::Reconciler;
use report::{Reporter, SessionLog};
use std::fmt::Write as _;
use std::path::PathBuf;
use traverse::{DEFAULT_MAX_ITEMS, TraversalController};

const DEFAULT_SETTLE_MS: u64 = 15_000;

fn usage() -> &'static str {
    "np_migrate — walk the note list through an automation helper and store\n\
the metadata the app's own exporter drops (folder path, tags, creation date)\n\n\
USAGE:\n\
  np_migrate [--storage-dir DIR] [--surface-cmd CMD] [--skip PATTERN]\n\
             [--max-items N] [--settle-ms MS] [--dump] [--debug]\n\n\
FLAGS:\n\
  --storage-dir DIR   where noteporter.db and run records live (default: .)\n\
  --surface-cmd CMD   helper process that drives the app's UI; spoken to\n\
                      over stdio (required unless --dump)\n\
  --skip PATTERN      resume an interrupted run: advance past items until a\n\
                      title matches PATTERN (case-insensitive regex, or a\n\
                      literal substring if PATTERN is not a valid regex)\n\
  --max-items N       iteration safety cap (default: 500)\n\
  --settle-ms MS      how long to wait for a helper reply (default: 15000)\n\
  --dump              print the store contents as JSON and exit\n\
  --debug             per-item progress lines\n\n\
NOTES:\n\
  - every value flag has an NP_* env fallback (NP_STORAGE_DIR,\n\
    NP_SURFACE_CMD, NP_SKIP, NP_MAX_ITEMS, NP_SETTLE_MS).\n\
  - a fatal store error leaves everything written so far in place;\n\
    rerun with --skip <last good title> to resume.\n"
}

#[derive(Debug)]
struct Config {
    storage_dir: PathBuf,
    surface_cmd: Option<String>,
    skip: Option<String>,
    max_items: usize,
    settle_ms: u64,
    dump: bool,
    debug: bool,
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_args() -> Result<Config, String> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    if args.iter().any(|a| a == "-h" || a == "--help") {
        print!("{}", usage());
        std::process::exit(0);
    }
    parse_args_from(&args)
}

fn parse_args_from(raw: &[String]) -> Result<Config, String> {
    // Accept `--flag=value` by splitting up front; the loop below only
    // sees space-separated tokens.
    let mut args = Vec::with_capacity(raw.len());
    for arg in raw {
        if let Some((flag, value)) = arg.split_once('=')
            && flag.starts_with("--")
        {
            args.push(flag.to_string());
            args.push(value.to_string());
        } else {
            args.push(arg.clone());
        }
    }

    let mut storage_dir: PathBuf = env_var("NP_STORAGE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let mut surface_cmd: Option<String> = env_var("NP_SURFACE_CMD");
    let mut skip: Option<String> = env_var("NP_SKIP");
    let mut max_items: usize = env_var("NP_MAX_ITEMS")
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_MAX_ITEMS);
    let mut settle_ms: u64 = env_var("NP_SETTLE_MS")
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_SETTLE_MS);
    let mut dump = false;
    let mut debug = false;

    let mut i = 0usize;
    while i < args.len() {
        let a = args[i].as_str();
        match a {
            "--storage-dir" => {
                i += 1;
                let v = args.get(i).ok_or("--storage-dir requires DIR")?;
                storage_dir = PathBuf::from(v);
            }
            "--surface-cmd" => {
                i += 1;
                let v = args.get(i).ok_or("--surface-cmd requires CMD")?;
                surface_cmd = Some(v.to_string());
            }
            "--skip" => {
                i += 1;
                let v = args.get(i).ok_or("--skip requires PATTERN")?;
                skip = Some(v.to_string());
            }
            "--max-items" => {
                i += 1;
                let v = args.get(i).ok_or("--max-items requires N")?;
                max_items = v
                    .parse::<usize>()
                    .map_err(|_| "--max-items must be an integer")?;
            }
            "--settle-ms" => {
                i += 1;
                let v = args.get(i).ok_or("--settle-ms requires MS")?;
                settle_ms = v
                    .parse::<u64>()
                    .map_err(|_| "--settle-ms must be an integer (milliseconds)")?;
            }
            "--dump" => dump = true,
            "--debug" => debug = true,
            other => return Err(format!("unknown argument: {other}")),
        }
        i += 1;
    }

    if max_items == 0 {
        return Err("--max-items must be at least 1".to_string());
    }

    Ok(Config {
        storage_dir,
        surface_cmd,
        skip,
        max_items,
        settle_ms,
        dump,
        debug,
    })
}

fn write_last_crash(storage_dir: &std::path::Path, kind: &str, detail: &str) {
    // Best-effort crash record; an unattended run has no scrollback to
    // tell us what happened otherwise.
    let _ = std::fs::create_dir_all(storage_dir);
    let path = storage_dir.join("noteporter_last_crash.txt");

    let mut out = String::new();
    let _ = writeln!(out, "ts={}", report::now_rfc3339());
    let _ = writeln!(out, "pid={}", std::process::id());
    let _ = writeln!(out, "kind={kind}");
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let _ = writeln!(out, "cwd={}", cwd.to_string_lossy());
    let _ = writeln!(out, "args={:?}", std::env::args().collect::<Vec<_>>());
    let _ = writeln!(out, "detail={detail}");

    let _ = std::fs::write(path, out);
}

fn install_crash_reporter(storage_dir: PathBuf) {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let mut detail = info.to_string();
        let backtrace = std::backtrace::Backtrace::force_capture();
        let _ = write!(&mut detail, "\nbacktrace:\n{backtrace}");
        write_last_crash(&storage_dir, "panic", &detail);
        default_hook(info);
    }));
}

fn run(cfg: &Config, reporter: &Reporter, session: &mut SessionLog) -> Result<(), Box<dyn std::error::Error>> {
    let mut store = EntityStore::open(&cfg.storage_dir)?;

    if cfg.dump {
        session.note_mode("dump");
        dump::print_store(&store)?;
        return Ok(());
    }

    session.note_mode("traverse");
    let command = cfg
        .surface_cmd
        .as_deref()
        .ok_or("a surface command is required (--surface-cmd CMD or NP_SURFACE_CMD)")?;
    let surface = BridgeSurface::spawn(command, cfg.settle_ms)?;

    let reconciler = Reconciler::new(&mut store, reporter);
    let controller =
        TraversalController::new(surface, reconciler, reporter, cfg.skip.as_deref(), cfg.max_items);
    let outcome = controller.run()?;

    session.note_counters(outcome.stats);
    let stats = outcome.stats;
    reporter.note(&format!(
        "{}: visited {}, processed {}, skipped {}, failed {}, duplicate titles {}",
        outcome.stop.describe(),
        stats.visited,
        stats.processed,
        stats.skipped,
        stats.failed,
        stats.duplicate_titles
    ));
    Ok(())
}

fn main() {
    let cfg = match parse_args() {
        Ok(cfg) => cfg,
        Err(message) => {
            eprintln!("error: {message}");
            std::process::exit(2);
        }
    };

    install_crash_reporter(cfg.storage_dir.clone());
    let reporter = Reporter::new(cfg.debug);
    let mut session = SessionLog::new(&cfg.storage_dir);

    match run(&cfg, &reporter, &mut session) {
        Ok(()) => session.note_exit("ok"),
        Err(err) => {
            session.note_error(&err.to_string());
            session.note_exit("fatal");
            reporter.abort(&err.to_string());
            std::process::exit(1);
        }
    }
}
