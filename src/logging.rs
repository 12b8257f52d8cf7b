use crate::constants::{DEFAULT_LOG_DIRECTIVE, LOG_DIRECTORY, LOG_FILE_PREFIX};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber: plain console output plus a daily-rolling
/// JSON file under [`LOG_DIRECTORY`]. The returned guard flushes buffered
/// file writes on drop; the caller holds it for the life of the process.
pub fn init_logging() -> WorkerGuard {
    let _ = std::fs::create_dir_all(LOG_DIRECTORY);
    let file_appender = tracing_appender::rolling::daily(LOG_DIRECTORY, LOG_FILE_PREFIX);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::from_default_env().add_directive(
        DEFAULT_LOG_DIRECTIVE
            .parse()
            .expect("default log directive is valid"),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().with_writer(file_writer))
        .with(fmt::layer().with_writer(std::io::stdout))
        .init();
    guard
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::filter::Directive;

    #[test]
    fn default_directive_is_valid() {
        assert!(DEFAULT_LOG_DIRECTIVE.parse::<Directive>().is_ok());
    }
}
