//! Kernel-style trace macros for the workpool library.
//!
//! Thread-safe, context-aware debug output in the style of Linux kernel's
//! printk: each line carries a level prefix and the worker id of the thread
//! that emitted it, if any.
//!
//! # Environment variables
//!
//! - `WORKPOOL_LOG_LEVEL` — `off`/`error`/`warn`/`info`/`debug`/`trace`
//!   (or the matching digit `0..=5`). Defaults to `info`.
//! - `WORKPOOL_FLUSH=1` — flush stderr after every line.
//!
//! # Output format
//!
//! `[LEVEL] [w<worker>] message`, e.g. `[DEBUG] [w2] parked on may_resume`.

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Log levels, most to least severe.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::Off,
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            LogLevel::Off => "",
            LogLevel::Error => "[ERROR]",
            LogLevel::Warn => "[WARN] ",
            LogLevel::Info => "[INFO] ",
            LogLevel::Debug => "[DEBUG]",
            LogLevel::Trace => "[TRACE]",
        }
    }
}

static FLUSH_ENABLED: AtomicBool = AtomicBool::new(false);
static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);
static INITIALIZED: AtomicBool = AtomicBool::new(false);

fn init() {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }
    FLUSH_ENABLED.store(crate::env::env_get_bool("WORKPOOL_FLUSH", false), Ordering::Relaxed);
    if let Ok(val) = std::env::var("WORKPOOL_LOG_LEVEL") {
        let level = match val.to_lowercase().as_str() {
            "off" | "0" => LogLevel::Off,
            "error" | "1" => LogLevel::Error,
            "warn" | "2" => LogLevel::Warn,
            "info" | "3" => LogLevel::Info,
            "debug" | "4" => LogLevel::Debug,
            "trace" | "5" => LogLevel::Trace,
            _ => LogLevel::Info,
        };
        LOG_LEVEL.store(level as u8, Ordering::Relaxed);
    }
}

#[inline]
fn flush_enabled() -> bool {
    if !INITIALIZED.load(Ordering::Relaxed) {
        init();
    }
    FLUSH_ENABLED.load(Ordering::Relaxed)
}

#[inline]
fn log_level() -> LogLevel {
    if !INITIALIZED.load(Ordering::Relaxed) {
        init();
    }
    LogLevel::from_u8(LOG_LEVEL.load(Ordering::Relaxed))
}

/// Set the log level programmatically, overriding `WORKPOOL_LOG_LEVEL`.
pub fn set_log_level(level: LogLevel) {
    LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

#[inline]
fn level_enabled(level: LogLevel) -> bool {
    level as u8 <= log_level() as u8
}

thread_local! {
    static WORKER_ID: std::cell::Cell<Option<u32>> = const { std::cell::Cell::new(None) };
}

/// Tag the current OS thread with a worker id for subsequent trace lines.
/// Called by the controller when a worker thread starts.
pub fn set_worker_id(id: u32) {
    WORKER_ID.with(|w| w.set(Some(id)));
}

fn format_context() -> String {
    match WORKER_ID.with(|w| w.get()) {
        Some(id) => format!("[w{}]", id),
        None => "[w--]".to_string(),
    }
}

#[doc(hidden)]
pub fn _log_impl(level: LogLevel, args: std::fmt::Arguments<'_>) {
    if !level_enabled(level) {
        return;
    }
    let stderr = std::io::stderr();
    let mut handle = stderr.lock();
    let _ = write!(handle, "{} {} ", level.prefix(), format_context());
    let _ = handle.write_fmt(args);
    let _ = handle.write_all(b"\n");
    if flush_enabled() {
        let _ = handle.flush();
    }
}

/// Error-level trace line.
#[macro_export]
macro_rules! wp_error {
    ($($arg:tt)*) => {{
        $crate::trace::_log_impl($crate::trace::LogLevel::Error, format_args!($($arg)*));
    }};
}

/// Warn-level trace line.
#[macro_export]
macro_rules! wp_warn {
    ($($arg:tt)*) => {{
        $crate::trace::_log_impl($crate::trace::LogLevel::Warn, format_args!($($arg)*));
    }};
}

/// Info-level trace line.
#[macro_export]
macro_rules! wp_info {
    ($($arg:tt)*) => {{
        $crate::trace::_log_impl($crate::trace::LogLevel::Info, format_args!($($arg)*));
    }};
}

/// Debug-level trace line.
#[macro_export]
macro_rules! wp_debug {
    ($($arg:tt)*) => {{
        $crate::trace::_log_impl($crate::trace::LogLevel::Debug, format_args!($($arg)*));
    }};
}

/// Trace-level trace line.
#[macro_export]
macro_rules! wp_trace {
    ($($arg:tt)*) => {{
        $crate::trace::_log_impl($crate::trace::LogLevel::Trace, format_args!($($arg)*));
    }};
}
