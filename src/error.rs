//! Unified error types and process exit codes.
//!
//! Every fallible operation in the daemon funnels into a single [`Error`]
//! enum so the top-level control loop's handling stays uniform.  Fatal
//! variants carry the exit code the process must terminate with — the codes
//! are a contract with the surrounding shell wrappers and monitoring, so
//! they are kept stable here rather than scattered over call sites.

use std::fmt;
use std::io;

use crate::sensors::SensorId;

// ---------------------------------------------------------------------------
// Exit codes (contract with restart/backup wrappers — do not renumber)
// ---------------------------------------------------------------------------

pub mod exit {
    pub const OK: i32 = 0;
    /// fork() failed while daemonizing.
    pub const FORK: i32 = 1;
    /// PID file could not be opened.
    pub const LOCK: i32 = 2;
    /// Mandatory files could not be opened at startup, in probe order.
    pub const LOG_FILE: i32 = 3;
    pub const DATA_FILE: i32 = 4;
    pub const TABLE_FILE: i32 = 5;
    pub const JSON_FILE: i32 = 6;
    pub const CFG_TABLE_FILE: i32 = 7;
    /// GPIO export failed at startup.
    pub const GPIO_ENABLE: i32 = 11;
    /// GPIO direction setup failed at startup.
    pub const GPIO_DIRECTION: i32 = 12;
    /// Shutdown requested, but disabling GPIO failed.
    pub const SHUTDOWN_GPIO: i32 = 14;
    /// A sensor channel exceeded the consecutive-error threshold.
    pub const SENSOR_LOSS: i32 = 55;
    /// Sensor-loss shutdown, and disabling GPIO failed on top of it.
    pub const SENSOR_LOSS_GPIO: i32 = 66;
    /// The main loop was somehow left without a terminate request.
    pub const UNREACHABLE: i32 = 225;
}

// ---------------------------------------------------------------------------
// Daemon-wide error
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum Error {
    /// A sensor channel accumulated too many consecutive read errors.
    /// Operating blind on compressor temperature risks thermal destruction,
    /// so this is fatal.
    SensorLoss(SensorId),
    /// A GPIO line could not be read or written.
    Gpio { what: &'static str, source: io::Error },
    /// Persistent state (run-cycle ledger) could not be written.
    Persist(io::Error),
    /// Configuration is structurally unusable.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SensorLoss(id) => write!(f, "too many read errors on sensor {id}"),
            Self::Gpio { what, source } => write!(f, "GPIO {what}: {source}"),
            Self::Persist(e) => write!(f, "persisting run counters: {e}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Gpio { source, .. } | Self::Persist(source) => Some(source),
            _ => None,
        }
    }
}

/// Daemon-wide `Result` alias.
pub type Result<T> = std::result::Result<T, Error>;
