//! Logging initialization.
//!
//! Console output with an env-filter, plus optional daily-rolling file output
//! under `logs/` next to the working directory. The non-blocking writer guard
//! must stay alive for the lifetime of the process.

use anyhow::Result;
use once_cell::sync::OnceCell;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static FILE_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

/// Initialize the tracing subscriber.
///
/// `verbose` lowers the default filter to debug for this crate; `RUST_LOG`
/// always wins when set. When `log_to_file` is set, a daily-rolling file
/// appender is added under `logs/`.
pub fn init_logging(verbose: bool, log_to_file: bool) -> Result<()> {
    let default_directive = if verbose {
        "shelfwatch=debug,info"
    } else {
        "shelfwatch=info,warn"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let console_layer = fmt::layer().with_target(false);

    if log_to_file {
        let appender = tracing_appender::rolling::daily("logs", "shelfwatch.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        // Keep the writer thread alive until process exit.
        let _ = FILE_GUARD.set(guard);

        let file_layer = fmt::layer().with_ansi(false).with_writer(writer);
        tracing_subscriber::registry()
            .with(filter)
            .with(console_layer)
            .with(file_layer)
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(console_layer)
            .try_init()?;
    }

    Ok(())
}
