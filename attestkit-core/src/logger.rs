//! Forwarding of bridge log records to the host application.
//!
//! Bridge code logs through the `log` facade. Once the host calls [`set_logger`], records
//! are handed to its [`Logger`] implementation (Logcat, `os_log`, ...).

use std::sync::{Arc, OnceLock};

/// Receives the log records of the bridge.
///
/// Implemented by the host and exported via `UniFFI`.
///
/// ## Kotlin
///
/// ```kotlin
/// object AttestKitLogger : Logger {
///     override fun log(level: LogLevel, message: String) {
///         when (level) {
///             LogLevel.ERROR -> Log.e("AttestKit", message)
///             LogLevel.WARN -> Log.w("AttestKit", message)
///             else -> Log.d("AttestKit", message)
///         }
///     }
/// }
///
/// setLogger(AttestKitLogger) // once, at application start
/// ```
#[uniffi::export(with_foreign)]
pub trait Logger: Sync + Send {
    /// Logs `message` at `level`.
    fn log(&self, level: LogLevel, message: String);
}

/// Severity of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum LogLevel {
    /// Very detailed tracing output.
    Trace,
    /// Debugging information, such as key creation and deletion.
    Debug,
    /// Progress of an operation, such as a provider warm-up.
    Info,
    /// Recoverable problems, such as a retried request or a failed compensation.
    Warn,
    /// Errors.
    Error,
}

impl From<log::Level> for LogLevel {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error => Self::Error,
            log::Level::Warn => Self::Warn,
            log::Level::Info => Self::Info,
            log::Level::Debug => Self::Debug,
            log::Level::Trace => Self::Trace,
        }
    }
}

static LOGGER_INSTANCE: OnceLock<Arc<dyn Logger>> = OnceLock::new();

struct ForeignLogger;

impl log::Log for ForeignLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        is_forwarded(metadata.level(), metadata.target())
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        if let Some(logger) = LOGGER_INSTANCE.get() {
            logger.log(record.level().into(), record.args().to_string());
        }
    }

    fn flush(&self) {}
}

/// Debug and Trace records are only forwarded from our own crates, dependencies are too noisy.
fn is_forwarded(level: log::Level, target: &str) -> bool {
    level <= log::Level::Info || target.starts_with("attestkit")
}

/// Installs `logger` as the receiver of all bridge log records.
///
/// Only the first call has an effect. Later calls, or a call made after another `log`
/// implementation was installed in the process, are ignored with a message on stderr.
#[uniffi::export]
pub fn set_logger(logger: Arc<dyn Logger>) {
    static LOGGER: ForeignLogger = ForeignLogger;

    if LOGGER_INSTANCE.set(logger).is_err() {
        eprintln!("attestkit logger already set");
        return;
    }

    if let Err(err) = log::set_logger(&LOGGER) {
        eprintln!("failed to install attestkit logger: {err}");
        return;
    }
    log::set_max_level(log::LevelFilter::Trace);
}
