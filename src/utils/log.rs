//! Simple leveled logging module with macros.
//!
//! Output goes to stderr, colored by level when the terminal supports it.
//! Behaviour is configured from the environment by [`init_from_env`]:
//!
//! - `LCSIM_LOG`: minimum level (`debug`, `info`, `warn`, `error`, `off`), default `info`
//! - `LCSIM_LOG_TIMESTAMPS`: `0`/`false` hides the timestamp prefix

use std::fmt::Display;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

pub const LOG_LEVEL_VAR: &str = "LCSIM_LOG";
pub const LOG_TIMESTAMPS_VAR: &str = "LCSIM_LOG_TIMESTAMPS";

/// Log level for filtering messages.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
}

impl Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Level::Debug => write!(f, "DEBUG"),
            Level::Info => write!(f, "INFO"),
            Level::Warn => write!(f, "WARN"),
            Level::Error => write!(f, "ERROR"),
        }
    }
}

/// Sentinel stored in [`MIN_LEVEL`] to silence every level.
const LEVEL_OFF: u8 = u8::MAX;

pub static SHOW_TIMESTAMP: AtomicBool = AtomicBool::new(true);
pub static SHOW_TYPE: AtomicBool = AtomicBool::new(true);
static MIN_LEVEL: AtomicU8 = AtomicU8::new(Level::Info as u8);

/// Parses a `LCSIM_LOG` value. `None` means logging is switched off.
fn parse_level(value: &str) -> Result<Option<Level>, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "debug" | "trace" => Ok(Some(Level::Debug)),
        "info" | "" => Ok(Some(Level::Info)),
        "warn" | "warning" => Ok(Some(Level::Warn)),
        "error" => Ok(Some(Level::Error)),
        "off" | "none" => Ok(None),
        other => Err(other.to_string()),
    }
}

/// Sets the minimum level that will be written. `None` disables output.
pub fn set_min_level(level: Option<Level>) {
    MIN_LEVEL.store(level.map_or(LEVEL_OFF, |l| l as u8), Ordering::Relaxed);
}

/// Returns true if messages at `level` are currently written.
pub fn enabled(level: Level) -> bool {
    let min = MIN_LEVEL.load(Ordering::Relaxed);
    min != LEVEL_OFF && level as u8 >= min
}

/// Applies `LCSIM_LOG` and `LCSIM_LOG_TIMESTAMPS` to the global logger.
///
/// An unrecognized level falls back to `info` and is reported as a warning.
pub fn init_from_env() {
    if let Ok(value) = std::env::var(LOG_TIMESTAMPS_VAR) {
        let show = !matches!(value.trim(), "0" | "false" | "no");
        SHOW_TIMESTAMP.store(show, Ordering::Relaxed);
    }

    if let Ok(value) = std::env::var(LOG_LEVEL_VAR) {
        match parse_level(&value) {
            Ok(level) => set_min_level(level),
            Err(bad) => {
                set_min_level(Some(Level::Info));
                log(
                    Level::Warn,
                    &format!("unknown {LOG_LEVEL_VAR} value '{bad}', using info"),
                );
            }
        }
    }
}

/// Converts days since Unix epoch to (year, month, day).
fn days_to_date(days: u64) -> (u32, u32, u32) {
    // Algorithm based on Howard Hinnant's date algorithms
    let z = days as i64 + 719468;
    let era = z.div_euclid(146097);
    let doe = z.rem_euclid(146097) as u32;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };
    (y as u32, m, d)
}

/// Internal logging function. Use the `debug!`, `info!`, `warn!`, or `error!` macros instead.
#[doc(hidden)]
pub fn log(level: Level, message: &str) {
    if !enabled(level) {
        return;
    }

    let mut stderr = StandardStream::stderr(ColorChoice::Auto);
    let mut spec = ColorSpec::new();
    match level {
        Level::Debug => {
            spec.set_fg(Some(Color::Cyan));
        }
        Level::Warn => {
            spec.set_fg(Some(Color::Yellow)).set_bold(true);
        }
        Level::Error => {
            spec.set_fg(Some(Color::Red)).set_bold(true);
        }
        Level::Info => {
            spec.clear();
        }
    }
    let _ = stderr.set_color(&spec);

    if SHOW_TIMESTAMP.load(Ordering::Relaxed) {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        let secs = now.as_secs();
        let (year, month, day) = days_to_date(secs / 86400);
        let _ = write!(
            stderr,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:03} ",
            year,
            month,
            day,
            (secs / 3600) % 24,
            (secs / 60) % 60,
            secs % 60,
            now.subsec_millis()
        );
    }
    if SHOW_TYPE.load(Ordering::Relaxed) {
        let _ = write!(stderr, "[{:5}] ", level);
    }
    let _ = writeln!(stderr, "{}", message);
    let _ = stderr.reset();
}

/// Logs a debug-level message.
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {{
        if cfg!(not(test)) {
            $crate::utils::log::log($crate::utils::log::Level::Debug, &format!($($arg)*))
        }
    }};
}

/// Logs an info-level message.
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {{
        if cfg!(not(test)) {
            $crate::utils::log::log($crate::utils::log::Level::Info, &format!($($arg)*))
        }
    }};
}

/// Logs a warning-level message.
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {{
        if cfg!(not(test)) {
            $crate::utils::log::log($crate::utils::log::Level::Warn, &format!($($arg)*))
        }
    }};
}

/// Logs an error-level message.
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {{
        if cfg!(not(test)) {
            $crate::utils::log::log($crate::utils::log::Level::Error, &format!($($arg)*))
        }
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_ordering() {
        assert!(Level::Debug < Level::Info);
        assert!(Level::Info < Level::Warn);
        assert!(Level::Warn < Level::Error);
    }

    #[test]
    fn level_display() {
        assert_eq!(format!("{}", Level::Debug), "DEBUG");
        assert_eq!(format!("{}", Level::Info), "INFO");
        assert_eq!(format!("{}", Level::Warn), "WARN");
        assert_eq!(format!("{}", Level::Error), "ERROR");
    }

    #[test]
    fn parse_level_values() {
        assert_eq!(parse_level("debug"), Ok(Some(Level::Debug)));
        assert_eq!(parse_level(" WARN "), Ok(Some(Level::Warn)));
        assert_eq!(parse_level("off"), Ok(None));
        assert_eq!(parse_level("loud"), Err("loud".to_string()));
    }

    #[test]
    fn days_to_date_epoch() {
        assert_eq!(days_to_date(0), (1970, 1, 1));
    }

    #[test]
    fn days_to_date_leap_year() {
        // 2024-02-29 (leap day) is 19782 days after epoch
        assert_eq!(days_to_date(19782), (2024, 2, 29));
    }
}
