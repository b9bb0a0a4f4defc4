//! Logging setup.
//!
//! The library runs inside a process it does not own and may be
//! reinitialized, so installing the subscriber twice is not an error.

use crate::config::LoggingSettings;
use once_cell::sync::OnceCell;
use std::path::Path;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Keeps the file writer flushing for the life of the process.
static FILE_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

fn stdout_layer(json: bool) -> BoxedLayer {
    if json {
        fmt::layer()
            .json()
            .with_file(false)
            .with_line_number(false)
            .with_thread_ids(true)
            .with_thread_names(true)
            .boxed()
    } else {
        fmt::layer()
            .with_ansi(true)
            .with_file(false)
            .with_line_number(false)
            .with_thread_ids(true)
            .with_thread_names(true)
            .boxed()
    }
}

fn file_layer(path: &Path) -> Option<BoxedLayer> {
    let file_name = path.file_name()?;
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
    if FILE_GUARD.set(guard).is_err() {
        // A writer from an earlier setup is still alive; reuse it.
        return None;
    }
    Some(
        fmt::layer()
            .with_ansi(false)
            .with_thread_ids(true)
            .with_writer(writer)
            .boxed(),
    )
}

/// Initializes the logging system for the bridge.
///
/// Sets up a tracing-subscriber registry with an environment filter, a
/// stdout layer and, when configured, a non-blocking file layer.
///
/// # Arguments
///
/// * `config` - Logging section of the bridge configuration
/// * `json_format` - Whether stdout gets JSON lines instead of plain text
///
/// # Returns
///
/// `true` if the subscriber was installed, `false` if the host process
/// already had one. The bridge keeps running either way.
///
/// # Features
///
/// * **Environment variable support** - `RUST_LOG` overrides `config.level`
/// * **File output** - `config.file_path` gets a second, plain text layer
/// * **Diagnostics** - lines on the `bridge::diagnostic` target carry the
///   event name and the failure
pub fn setup_logging(config: &LoggingSettings, json_format: bool) -> bool {
    let log_level = config.level.as_str();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let mut layers = vec![stdout_layer(json_format || config.json_format)];
    if let Some(path) = &config.file_path {
        layers.extend(file_layer(Path::new(path)));
    }

    let installed = tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .is_ok();

    if installed {
        info!("🔧 Logging initialized with level: {}", log_level);
    }
    installed
}
