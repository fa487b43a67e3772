// Lua Plugin Host - Systemd-Style Logger
// Copyright (C) 2025 Akaere Networks
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Systemd-style logging compatible with journald
//!
//! - Log levels follow systemd priorities (err, warning, notice, info, debug)
//! - Terminal output with optional colors and timestamps
//! - Structured `KEY=VALUE` records for journald
//!
//! Nothing is written until [`Logger::init`] has been called, so the library
//! stays quiet when embedded or under test.

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Log levels following systemd priority conventions
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    /// Error conditions (3)
    Error = 3,
    /// Warning conditions (4)
    Warning = 4,
    /// Normal but significant condition (5)
    Notice = 5,
    /// Informational message (6)
    Info = 6,
    /// Debug-level message (7)
    Debug = 7,
}

impl LogLevel {
    pub fn priority(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "ERR",
            LogLevel::Warning => "WARNING",
            LogLevel::Notice => "NOTICE",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        }
    }

    /// Color code for terminal output
    pub fn color_code(self) -> &'static str {
        match self {
            LogLevel::Error => "\x1b[31m",
            LogLevel::Warning => "\x1b[33m",
            LogLevel::Notice => "\x1b[36m",
            LogLevel::Info => "\x1b[32m",
            LogLevel::Debug => "\x1b[37m",
        }
    }
}

/// Logger configuration
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// Minimum log level to output
    pub min_level: LogLevel,
    pub use_colors: bool,
    pub include_timestamp: bool,
    /// Include the emitting module in journald records
    pub include_target: bool,
    pub journald_format: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Info,
            use_colors: atty::is(atty::Stream::Stderr),
            include_timestamp: true,
            include_target: false,
            journald_format: false,
        }
    }
}

static LOGGER: Mutex<Option<Logger>> = Mutex::new(None);

#[derive(Debug)]
pub struct Logger {
    config: LoggerConfig,
}

impl Logger {
    pub fn new(config: LoggerConfig) -> Self {
        Self { config }
    }

    /// Initialize the global logger
    pub fn init(config: LoggerConfig) -> Result<(), LoggerError> {
        let mut global_logger = LOGGER.lock().map_err(|_| LoggerError::InitError)?;
        if global_logger.is_some() {
            return Err(LoggerError::AlreadyInitialized);
        }
        *global_logger = Some(Self::new(config));
        Ok(())
    }

    pub fn should_log(&self, level: LogLevel) -> bool {
        level <= self.config.min_level
    }

    pub fn log(&self, level: LogLevel, target: &str, message: &str) {
        if !self.should_log(level) {
            return;
        }

        let timestamp = if self.config.include_timestamp {
            Some(
                SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_secs(),
            )
        } else {
            None
        };

        let formatted = if self.config.journald_format {
            self.format_journald(level, target, message, timestamp)
        } else {
            self.format_terminal(level, message, timestamp)
        };

        eprintln!("{}", formatted);
    }

    fn format_journald(
        &self,
        level: LogLevel,
        target: &str,
        message: &str,
        timestamp: Option<u64>,
    ) -> String {
        let mut output = String::new();
        output.push_str(&format!("PRIORITY={}\n", level.priority()));
        output.push_str(&format!("MESSAGE={}\n", message));

        if self.config.include_target && !target.is_empty() {
            output.push_str(&format!("CODE_FILE={}\n", target));
        }

        if let Some(ts) = timestamp {
            // microseconds
            output.push_str(&format!("_SOURCE_REALTIME_TIMESTAMP={}\n", ts * 1_000_000));
        }

        output.push_str("SYSLOG_IDENTIFIER=lua-plugin-host\n");
        output
    }

    fn format_terminal(&self, level: LogLevel, message: &str, timestamp: Option<u64>) -> String {
        let mut output = String::new();

        if let Some(ts) = timestamp {
            let datetime = chrono::DateTime::from_timestamp(ts as i64, 0)
                .unwrap_or_default()
                .format("%Y-%m-%d %H:%M:%S");
            output.push_str(&format!("{} ", datetime));
        }

        // Status lines ("[*] ...", "[   OK   ] ...") carry their own marker
        let is_status = message.starts_with("[*]") || message.starts_with("[   OK   ]");

        match (is_status, self.config.use_colors) {
            (true, true) => {
                output.push_str(&format!("{}{}\x1b[0m", level.color_code(), message));
            }
            (true, false) => output.push_str(message),
            (false, true) => {
                output.push_str(&format!(
                    "{}[{}]\x1b[0m {}",
                    level.color_code(),
                    level.as_str(),
                    message
                ));
            }
            (false, false) => output.push_str(&format!("[{}] {}", level.as_str(), message)),
        }

        output
    }
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::core::logger::log_with_level($crate::core::logger::LogLevel::Error, module_path!(), &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::core::logger::log_with_level($crate::core::logger::LogLevel::Warning, module_path!(), &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_notice {
    ($($arg:tt)*) => {
        $crate::core::logger::log_with_level($crate::core::logger::LogLevel::Notice, module_path!(), &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::core::logger::log_with_level($crate::core::logger::LogLevel::Info, module_path!(), &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::core::logger::log_with_level($crate::core::logger::LogLevel::Debug, module_path!(), &format!($($arg)*))
    };
}

pub fn log_with_level(level: LogLevel, target: &str, message: &str) {
    if let Ok(logger_guard) = LOGGER.lock() {
        if let Some(ref logger) = *logger_guard {
            logger.log(level, target, message);
        }
    }
}

/// Systemd-style task starting message
pub fn log_task_start(task_name: &str) {
    let message = format!("[*] {}...", task_name);
    log_with_level(LogLevel::Notice, module_path!(), &message);
}

/// Systemd-style task completion with details
pub fn log_task_complete_with_details(task_name: &str, details: &str) {
    let message = format!("[   OK   ] {} ({})", task_name, details);
    log_with_level(LogLevel::Info, module_path!(), &message);
}

#[derive(Debug, thiserror::Error)]
pub enum LoggerError {
    #[error("Logger already initialized")]
    AlreadyInitialized,
    #[error("Failed to initialize logger")]
    InitError,
}

/// Initialize logger from CLI arguments
pub fn init_from_args(debug: bool, journald: bool) -> Result<(), LoggerError> {
    let min_level = if debug { LogLevel::Debug } else { LogLevel::Info };

    let config = LoggerConfig {
        min_level,
        use_colors: atty::is(atty::Stream::Stderr) && !journald,
        include_timestamp: !journald,
        include_target: debug,
        journald_format: journald,
    };

    Logger::init(config)
}
