use std::{fmt::Display, sync::Mutex};

use anyhow::anyhow;

/// Severity attached to a logged build message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

pub trait Logger: Clone {
    fn log_at(&self, level: LogLevel, message: impl Display);

    fn log(&self, message: impl Display) {
        self.log_at(LogLevel::Info, message);
    }
    fn warn(&self, message: impl Display) {
        self.log_at(LogLevel::Warn, message);
    }
    fn error(&self, message: impl Display) {
        self.log_at(LogLevel::Error, message);
    }
}

/// Logs only in debug builds. Formatting is skipped entirely in release.
#[macro_export]
macro_rules! debug_logf {
    ($logger:expr, $fmt:expr $(, $arg:expr)*) => {
        if cfg!(debug_assertions) {
            $crate::Logger::log(&$logger, format!($fmt $(, $arg)*));
        }
    };
}

impl<T: Logger> Logger for &T {
    fn log_at(&self, level: LogLevel, message: impl Display) {
        (*self).log_at(level, message);
    }
}

/// Writes messages to stdout, prefixed with the seconds elapsed since the
/// logger was created.
pub struct StdioLogger {
    zero_time: std::time::Instant,
}
impl Logger for &StdioLogger {
    fn log_at(&self, level: LogLevel, message: impl Display) {
        let delta_time = std::time::Instant::now().duration_since(self.zero_time);
        match level {
            LogLevel::Info => println!("[{:.04}] {}", delta_time.as_secs_f64(), message),
            _ => println!("[{:.04}] {}: {}", delta_time.as_secs_f64(), level, message),
        }
    }
}
impl StdioLogger {
    pub fn new() -> Self {
        Self {
            zero_time: std::time::Instant::now(),
        }
    }
}
impl Default for StdioLogger {
    fn default() -> Self {
        Self::new()
    }
}

/// Collects messages in memory. Used by tests to assert on build logs.
pub struct VecLogger {
    logs: Mutex<Vec<(LogLevel, String)>>,
}

impl Logger for &VecLogger {
    fn log_at(&self, level: LogLevel, message: impl Display) {
        self.logs
            .lock()
            .expect("locking the logger array should not fail!")
            .push((level, message.to_string()));
    }
}
impl VecLogger {
    pub fn new() -> Self {
        Self {
            logs: Mutex::new(Vec::new()),
        }
    }

    /// Drains every collected message, regardless of level.
    pub fn get_logs(self) -> Result<Vec<String>, anyhow::Error> {
        self.drain_matching(|_| true)
    }

    /// Drains the messages logged at `Warn` or above.
    pub fn get_warnings(self) -> Result<Vec<String>, anyhow::Error> {
        self.drain_matching(|level| level >= LogLevel::Warn)
    }

    fn drain_matching(self, keep: impl Fn(LogLevel) -> bool) -> Result<Vec<String>, anyhow::Error> {
        self.logs
            .into_inner()
            .map_err(|err| anyhow!("error unlocking VecLogger logs:{err}"))
            .map(|logs| {
                logs.into_iter()
                    .filter(|(level, _)| keep(*level))
                    .map(|(_, message)| message)
                    .collect()
            })
    }
}
impl Default for VecLogger {
    fn default() -> Self {
        Self::new()
    }
}
