//! Session log: every `tracing` event of a windowed run lands in one file.
//!
//! Each launch starts the file over, so it only holds the latest session.
//!
//! Location:
//!   Windows:  `%APPDATA%\RetouchFE\retouchfe.log`
//!   Linux:    `~/.local/share/RetouchFE/retouchfe.log`
//!   macOS:    `~/Library/Application Support/RetouchFE/retouchfe.log`
//!
//! `RUST_LOG` picks the verbosity (default `info`). Headless runs call
//! [`init_stderr`] and leave the file alone.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

static SESSION_LOG: OnceLock<Mutex<File>> = OnceLock::new();

/// Where the session log is written.
pub fn session_log_path() -> PathBuf {
    platform_data_dir().join("RetouchFE").join("retouchfe.log")
}

/// Appends an unformatted line. Write failures are dropped.
fn raw_line(text: &str) {
    let Some(lock) = SESSION_LOG.get() else { return };
    if let Ok(mut f) = lock.lock() {
        let _ = writeln!(f, "{}", text);
    }
}

/// Hands the shared session file to the fmt layer.
#[derive(Clone, Copy)]
struct SessionFile;

struct SessionWriter;

impl Write for SessionWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match SESSION_LOG.get().map(|m| m.lock()) {
            Some(Ok(mut file)) => file.write(buf),
            // no file or poisoned lock: swallow
            _ => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match SESSION_LOG.get().map(|m| m.lock()) {
            Some(Ok(mut file)) => file.flush(),
            _ => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for SessionFile {
    type Writer = SessionWriter;

    fn make_writer(&'a self) -> Self::Writer {
        SessionWriter
    }
}

fn env_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

fn open_truncated(path: &Path) -> io::Result<File> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
}

/// Starts the session log for a windowed run. Call before the first event.
///
/// Panics are mirrored into the file ahead of the default hook's output.
/// If the file cannot be opened the app keeps going without it.
pub fn init() {
    let path = session_log_path();
    let file = match open_truncated(&path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("[logger] cannot open {}: {}", path.display(), e);
            return;
        }
    };
    let _ = SESSION_LOG.set(Mutex::new(file));

    raw_line(&format!("=== RetouchFE session started {} ===", unix_stamp()));
    raw_line(&format!("Log file: {}", path.display()));
    raw_line("");

    let installed = tracing_subscriber::fmt()
        .with_writer(SessionFile)
        .with_ansi(false)
        .with_thread_names(true)
        .with_env_filter(env_filter("info"))
        .try_init();
    if installed.is_err() {
        raw_line("[logger] a global subscriber was already installed");
    }

    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        raw_line(&format!("{} PANIC {}", unix_stamp(), info));
        default_hook(info);
    }));
}

/// Plain stderr logging for headless runs.
pub fn init_stderr(verbose: bool) {
    let _ = tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_target(false)
        .with_env_filter(env_filter(if verbose { "debug" } else { "warn" }))
        .try_init();
}

/// Per-user data directory, before the app folder is appended.
fn platform_data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return PathBuf::from(appdata);
        }
    }
    #[cfg(target_os = "macos")]
    {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join("Library/Application Support");
        }
    }
    if let Some(xdg) = std::env::var_os("XDG_DATA_HOME") {
        return PathBuf::from(xdg);
    }
    std::env::var_os("HOME")
        .map(|home| PathBuf::from(home).join(".local/share"))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn unix_stamp() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| format!("(unix {})", d.as_secs()))
        .unwrap_or_else(|_| "(clock before epoch)".to_string())
}
