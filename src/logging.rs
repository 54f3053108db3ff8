use std::any::Any;
use std::fmt::Write as _;
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};

/// Global crash log directory, set during init.
static CRASH_LOG_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Initialize tracing: stdout (compact or JSON), optional rolling file, Sentry.
///
/// - Default level: `info,wellness_chat=debug`, override via RUST_LOG
/// - Sentry: ERROR events become issues, WARN becomes breadcrumbs
///
/// Keep the returned guard alive for the life of the process when file
/// logging is enabled, otherwise buffered lines are lost on exit.
pub fn init(config: &LoggingConfig) -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,wellness_chat=debug"));

    let stdout_layer = match config.format {
        LogFormat::Compact => fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(true)
            .with_line_number(true)
            .compact()
            .boxed(),
        LogFormat::Json => fmt::layer().json().with_current_span(false).boxed(),
    };

    let (file_layer, guard) = match &config.dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "wellness-chat.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    // No-op when Sentry DSN is not configured.
    let sentry_layer = sentry_tracing::layer().event_filter(|meta| match *meta.level() {
        tracing::Level::ERROR => sentry_tracing::EventFilter::Event,
        tracing::Level::WARN => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    });

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .with(sentry_layer)
        .with(env_filter)
        .init();

    tracing::debug!(format = ?config.format, file = config.dir.is_some(), "Tracing initialized");
    guard
}

/// Install a panic hook that writes a crash report under `<data_dir>/crash_logs`
/// before chaining to the previous hook (Sentry or the default printer).
pub fn install_crash_hook(data_dir: &Path) {
    if std::env::var("RUST_BACKTRACE").is_err() {
        std::env::set_var("RUST_BACKTRACE", "full");
    }

    let crash_dir = data_dir.join("crash_logs");
    if let Err(e) = std::fs::create_dir_all(&crash_dir) {
        tracing::warn!(dir = %crash_dir.display(), "Cannot create crash log dir: {}", e);
        return;
    }
    CRASH_LOG_DIR.set(crash_dir).ok();

    let prev_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        if let Some(dir) = CRASH_LOG_DIR.get() {
            let now = chrono::Local::now();
            let path = dir.join(format!("crash_{}.log", now.format("%Y%m%d_%H%M%S")));
            let report = crash_report(info.payload(), info.location(), &now.to_rfc3339());
            if std::fs::write(&path, report).is_ok() {
                eprintln!("[CRASH] Report written to: {}", path.display());
            }
        }
        prev_hook(info);
    }));

    tracing::info!("Crash hook installed");
}

fn crash_report(payload: &(dyn Any + Send), location: Option<&Location<'_>>, time: &str) -> String {
    let payload = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "<unknown payload>".into());
    let location = location
        .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
        .unwrap_or_else(|| "<unknown>".into());
    let thread = std::thread::current();

    let mut report = String::new();
    let _ = writeln!(report, "=== WELLNESS CHAT CRASH REPORT ===");
    let _ = writeln!(report, "Time: {time}");
    let _ = writeln!(report, "Version: {}", env!("CARGO_PKG_VERSION"));
    let _ = writeln!(report, "Thread: {}", thread.name().unwrap_or("<unnamed>"));
    let _ = writeln!(report, "Panic: {payload}");
    let _ = writeln!(report, "Location: {location}");
    let _ = writeln!(report, "\nBacktrace:\n{}", std::backtrace::Backtrace::force_capture());
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crash_report_contains_panic_details() {
        let payload: Box<dyn Any + Send> = Box::new("quota store exploded");
        let report = crash_report(payload.as_ref(), Some(Location::caller()), "2026-01-01T00:00:00Z");

        assert!(report.starts_with("=== WELLNESS CHAT CRASH REPORT ==="));
        assert!(report.contains("Panic: quota store exploded"));
        assert!(report.contains("Time: 2026-01-01T00:00:00Z"));
        assert!(report.contains("logging.rs"));
    }

    #[test]
    fn test_crash_report_formatted_payload_and_missing_location() {
        let payload: Box<dyn Any + Send> = Box::new(format!("limit {} exceeded", 3));
        let report = crash_report(payload.as_ref(), None, "t");
        assert!(report.contains("Panic: limit 3 exceeded"));
        assert!(report.contains("Location: <unknown>"));

        let opaque: Box<dyn Any + Send> = Box::new(42u8);
        assert!(crash_report(opaque.as_ref(), None, "t").contains("Panic: <unknown payload>"));
    }
}
