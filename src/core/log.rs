//! This module provides a simple logging API.
//!
//! Messages go to a single append-only file opened by [`init`]. Until then
//! every log call is discarded, which keeps operators usable in contexts that
//! never configure logging (unit tests, benchmarks).

use std::{
    fmt::Display,
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex, Once,
    },
};

#[repr(usize)]
#[derive(Debug, PartialEq, PartialOrd, Clone)]
pub enum Level {
    /// Designates serious errors.
    Error = 1,
    /// Designates hazardous situations.
    Warn,
    /// Designates useful information.
    Info,
    /// Designates lower priority information.
    Debug,
}

#[derive(Debug, PartialEq, PartialOrd)]
pub enum ParseError<'p> {
    InvalidString(&'p str),
}

static INIT: Once = Once::new();
static LOG_LEVEL: AtomicUsize = AtomicUsize::new(Level::Info as usize);
static LOG_FILE: Mutex<Option<File>> = Mutex::new(None);

pub const LOG_FILE_NAME: &str = "mergedb.log";

#[macro_export]
macro_rules! error {
    ($($args:tt)*) => {
        $crate::__log!($crate::core::log::Level::Error, $($args)*)
    };
}

#[macro_export]
macro_rules! warn {
    ($($args:tt)*) => {
        $crate::__log!($crate::core::log::Level::Warn, $($args)*)
    };
}

#[macro_export]
macro_rules! info {
    ($($args:tt)*) => {
        $crate::__log!($crate::core::log::Level::Info, $($args)*)
    };
}

#[macro_export]
macro_rules! debug {
    ($($args:tt)*) => {
        $crate::__log!($crate::core::log::Level::Debug, $($args)*)
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __log {
    ($level:expr, $($args:tt)*) => {
        if let Err(e) = $crate::core::log::log(
            $level,
            format_args!("{}:{} - {}", file!(), line!(), format_args!($($args)*)),
        ) {
            eprintln!("Failed to log: {}", e);
        }
    };
}

impl Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let string = match self {
            Self::Error => "ERROR",
            Self::Warn => "WARN",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
        };

        f.write_str(string)
    }
}

/// Opens the log file at `path` and sets the maximum level written to it.
///
/// Only the first call has any effect.
pub fn init(level: Level, path: impl AsRef<Path>) -> io::Result<()> {
    let mut result = Ok(());

    INIT.call_once(|| {
        if let Some(parent) = path.as_ref().parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                result = Err(e);
                return;
            }
        }

        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                if let Ok(mut guard) = LOG_FILE.lock() {
                    *guard = Some(file);
                }
            }
            Err(e) => result = Err(e),
        };

        LOG_LEVEL.store(level as usize, Ordering::Release);
    });

    result
}

#[doc(hidden)]
pub fn log(level: Level, message: std::fmt::Arguments<'_>) -> io::Result<()> {
    let global_level = LOG_LEVEL.load(Ordering::Acquire);
    if (level.clone() as usize) > global_level {
        return Ok(());
    }

    let mut guard = LOG_FILE
        .lock()
        .map_err(|_| io::Error::other("log file lock poisoned"))?;

    match guard.as_mut() {
        Some(file) => {
            writeln!(file, "[{level}]: {message}")?;
            file.flush()
        }
        None => Ok(()),
    }
}

impl<'p> TryFrom<&'p str> for Level {
    type Error = ParseError<'p>;

    fn try_from(s: &'p str) -> Result<Self, ParseError<'p>> {
        match s.to_lowercase().as_str() {
            "error" => Ok(Level::Error),
            "warn" => Ok(Level::Warn),
            "info" => Ok(Level::Info),
            "debug" => Ok(Level::Debug),
            _ => Err(ParseError::InvalidString(s)),
        }
    }
}

impl<'p> Display for ParseError<'p> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::InvalidString(s) => {
                write!(f, "{s} doesn't match any log level")
            }
        }
    }
}
