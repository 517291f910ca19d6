//! Runtime log-severity control.
//!
//! The control surface can raise or lower verbosity at any time; the
//! level lives in one atomic that the tracing filter reads on every
//! log call.

use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use tracing::Level;
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Severity levels accepted by the control surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LogSeverity {
    /// Everything, including per-query traces.
    Verbose = 0,
    /// Debug detail.
    Debug = 1,
    /// Normal operation.
    Info = 2,
    /// Problems worth noticing.
    Warning = 3,
    /// Failures only.
    Error = 4,
}

impl LogSeverity {
    fn to_level(self) -> Level {
        match self {
            Self::Verbose => Level::TRACE,
            Self::Debug => Level::DEBUG,
            Self::Info => Level::INFO,
            Self::Warning => Level::WARN,
            Self::Error => Level::ERROR,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Verbose,
            1 => Self::Debug,
            2 => Self::Info,
            3 => Self::Warning,
            _ => Self::Error,
        }
    }
}

impl FromStr for LogSeverity {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        match s.to_ascii_uppercase().as_str() {
            "VERBOSE" | "TRACE" => Ok(Self::Verbose),
            "DEBUG" => Ok(Self::Debug),
            "INFO" => Ok(Self::Info),
            "WARNING" | "WARN" => Ok(Self::Warning),
            "ERROR" => Ok(Self::Error),
            _ => Err(()),
        }
    }
}

static SEVERITY: AtomicU8 = AtomicU8::new(LogSeverity::Warning as u8);

/// Updates the process-wide severity.
pub fn set_severity(severity: LogSeverity) {
    SEVERITY.store(severity as u8, Ordering::Relaxed);
}

/// Current process-wide severity.
pub fn severity() -> LogSeverity {
    LogSeverity::from_u8(SEVERITY.load(Ordering::Relaxed))
}

/// Installs the tracing subscriber with the atomic severity filter.
/// Call once from the binary.
pub fn init(initial: LogSeverity) {
    set_severity(initial);
    tracing_subscriber::registry()
        .with(filter_fn(|metadata| {
            *metadata.level() <= severity().to_level()
        }))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(true),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_severity_strings() {
        assert_eq!("VERBOSE".parse::<LogSeverity>(), Ok(LogSeverity::Verbose));
        assert_eq!("debug".parse::<LogSeverity>(), Ok(LogSeverity::Debug));
        assert_eq!("Warning".parse::<LogSeverity>(), Ok(LogSeverity::Warning));
        assert!("CHATTY".parse::<LogSeverity>().is_err());
    }

    #[test]
    fn severity_roundtrip() {
        set_severity(LogSeverity::Debug);
        assert_eq!(severity(), LogSeverity::Debug);
        set_severity(LogSeverity::Warning);
        assert_eq!(severity(), LogSeverity::Warning);
    }
}
