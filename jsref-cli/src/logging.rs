use std::path::Path;
use std::sync::OnceLock;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

static LOG_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
static LOG_INIT: OnceLock<()> = OnceLock::new();

/// Install the global subscriber. Logs go to a daily file under `log_dir`
/// when given, otherwise to stderr.
pub async fn init_logging(debug: bool, log_dir: Option<&Path>) -> anyhow::Result<()> {
    if LOG_INIT.get().is_some() {
        return Ok(());
    }

    let (writer, guard) = match log_dir {
        Some(dir) => {
            tokio::fs::create_dir_all(dir).await?;
            let file_appender = tracing_appender::rolling::daily(dir, "jsref.log");
            tracing_appender::non_blocking(file_appender)
        }
        None => tracing_appender::non_blocking(std::io::stderr()),
    };

    let level = if debug {
        tracing::Level::TRACE
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false),
        )
        .with(tracing_subscriber::filter::LevelFilter::from_level(level))
        .init();

    let _ = LOG_GUARD.set(guard);
    let _ = LOG_INIT.set(());
    Ok(())
}
