//! Leveled stderr print macros
//!
//! Thread-safe line output for a multithreaded server: every line goes
//! through a locked stderr handle so worker, dispatcher and reporter
//! output never interleaves mid-line.
//!
//! # Environment Variables
//!
//! - `LOADSINK_LOG=<level>` - off, error, warn, info (default), debug
//! - `LOADSINK_LOG_FLUSH=1` - flush stderr after each line
//!
//! # Usage
//!
//! ```ignore
//! sprintln!("raw line, no level prefix");
//! sinfo!("worker {} started", id);
//! swarn!("queue full, dropping connection {}", fd);
//! serror!("accept failed: {}", err);
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Log levels, lowest first.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
}

impl LogLevel {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::Off,
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            _ => LogLevel::Debug,
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            LogLevel::Off => "",
            LogLevel::Error => "[ERROR]",
            LogLevel::Warn => "[WARN] ",
            LogLevel::Info => "[INFO] ",
            LogLevel::Debug => "[DEBUG]",
        }
    }
}

static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);
static FLUSH_ENABLED: AtomicBool = AtomicBool::new(false);
static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Read `LOADSINK_LOG` / `LOADSINK_LOG_FLUSH`. Runs once; invoked
/// implicitly on first output, or explicitly for deterministic startup.
pub fn init() {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    if let Ok(val) = std::env::var("LOADSINK_LOG") {
        let level = match val.to_lowercase().as_str() {
            "off" | "0" => LogLevel::Off,
            "error" | "1" => LogLevel::Error,
            "warn" | "2" => LogLevel::Warn,
            "info" | "3" => LogLevel::Info,
            "debug" | "4" => LogLevel::Debug,
            _ => LogLevel::Info,
        };
        LOG_LEVEL.store(level as u8, Ordering::Relaxed);
    }

    FLUSH_ENABLED.store(
        crate::env::env_get_bool("LOADSINK_LOG_FLUSH", false),
        Ordering::Relaxed,
    );
}

/// Current log level.
#[inline]
pub fn log_level() -> LogLevel {
    if !INITIALIZED.load(Ordering::Relaxed) {
        init();
    }
    LogLevel::from_u8(LOG_LEVEL.load(Ordering::Relaxed))
}

/// Override the log level at runtime.
pub fn set_log_level(level: LogLevel) {
    LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

#[inline]
pub fn level_enabled(level: LogLevel) -> bool {
    level as u8 <= log_level() as u8
}

#[inline]
fn flush_enabled() -> bool {
    if !INITIALIZED.load(Ordering::Relaxed) {
        init();
    }
    FLUSH_ENABLED.load(Ordering::Relaxed)
}

#[doc(hidden)]
pub fn _sprintln_impl(args: std::fmt::Arguments<'_>) {
    let stderr = std::io::stderr();
    let mut handle = stderr.lock();
    let _ = handle.write_fmt(args);
    let _ = handle.write_all(b"\n");
    if flush_enabled() {
        let _ = handle.flush();
    }
}

#[doc(hidden)]
pub fn _slog_impl(level: LogLevel, args: std::fmt::Arguments<'_>) {
    if !level_enabled(level) {
        return;
    }
    let stderr = std::io::stderr();
    let mut handle = stderr.lock();
    let _ = write!(handle, "{} ", level.prefix());
    let _ = handle.write_fmt(args);
    let _ = handle.write_all(b"\n");
    if flush_enabled() {
        let _ = handle.flush();
    }
}

/// Print a raw line to stderr (no level prefix, never filtered).
#[macro_export]
macro_rules! sprintln {
    () => {{
        $crate::sprint::_sprintln_impl(format_args!(""));
    }};
    ($($arg:tt)*) => {{
        $crate::sprint::_sprintln_impl(format_args!($($arg)*));
    }};
}

/// Error level log.
#[macro_export]
macro_rules! serror {
    ($($arg:tt)*) => {{
        $crate::sprint::_slog_impl($crate::sprint::LogLevel::Error, format_args!($($arg)*));
    }};
}

/// Warning level log.
#[macro_export]
macro_rules! swarn {
    ($($arg:tt)*) => {{
        $crate::sprint::_slog_impl($crate::sprint::LogLevel::Warn, format_args!($($arg)*));
    }};
}

/// Info level log.
#[macro_export]
macro_rules! sinfo {
    ($($arg:tt)*) => {{
        $crate::sprint::_slog_impl($crate::sprint::LogLevel::Info, format_args!($($arg)*));
    }};
}

/// Debug level log.
#[macro_export]
macro_rules! sdebug {
    ($($arg:tt)*) => {{
        $crate::sprint::_slog_impl($crate::sprint::LogLevel::Debug, format_args!($($arg)*));
    }};
}
