use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use kiroku_core::config::GeneralConfig;

/// Install the global subscriber.
///
/// `RUST_LOG` wins over the configured filter; `verbose` bumps kiroku
/// targets to debug. With a log directory set, output also goes to a daily
/// rolling file; keep the returned guard alive until exit so it flushes.
pub fn init(general: &GeneralConfig, verbose: bool) -> Option<WorkerGuard> {
    let fallback = if verbose {
        "kiroku=debug"
    } else {
        general.log_filter.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let stderr = fmt::layer().with_writer(std::io::stderr);

    if general.log_dir.is_empty() {
        tracing_subscriber::registry().with(filter).with(stderr).init();
        return None;
    }

    let appender = tracing_appender::rolling::daily(Path::new(&general.log_dir), "kiroku.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let file = fmt::layer().with_ansi(false).with_writer(writer);

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(file)
        .init();
    Some(guard)
}
