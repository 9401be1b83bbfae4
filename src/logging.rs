//! Structured logging and tracing for Chargegate
//!
//! Console output plus a daily-rotated file, both driven by `tracing`.
//! Components obtain a [`StructuredLogger`] through [`get_logger`] and attach
//! station or charge-run context with [`LogContext`].

use crate::config::LoggingConfig;
use crate::error::{ChargeGateError, Result};
use once_cell::sync::OnceCell;
use std::path::Path;
use std::sync::Once;
use tracing::{Level, info};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::Layered;
use tracing_subscriber::{
    EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

mod level;
mod structured;

pub use level::parse_log_level;
pub use structured::{LogContext, StructuredLogger, get_logger, get_logger_with_context};

// The file writer stops flushing once its guard is dropped
static LOG_GUARD: OnceCell<WorkerGuard> = OnceCell::new();
static INIT_ONCE: Once = Once::new();
static INIT_ERROR: OnceCell<String> = OnceCell::new();

type FilteredRegistry = Layered<EnvFilter, Registry>;
type OutputLayer = Box<dyn Layer<FilteredRegistry> + Send + Sync>;

/// Effective levels of the two outputs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OutputLevels {
    console: Level,
    file: Level,
}

impl OutputLevels {
    fn resolve(config: &LoggingConfig) -> Result<Self> {
        let base = parse_log_level(&config.level)?;
        let or_base = |over: &Option<String>| {
            over.as_deref()
                .and_then(|s| parse_log_level(s).ok())
                .unwrap_or(base)
        };
        Ok(Self {
            console: or_base(&config.console_level),
            file: or_base(&config.file_level),
        })
    }

    fn most_verbose(&self) -> Level {
        level::min_level(self.console, self.file)
    }
}

/// Install the global subscriber. Later calls return the first call's result.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    INIT_ONCE.call_once(|| {
        if let Err(e) = install(config) {
            let _ = INIT_ERROR.set(e.to_string());
        }
    });

    match INIT_ERROR.get() {
        Some(err) => Err(ChargeGateError::config(err.clone())),
        None => Ok(()),
    }
}

fn install(config: &LoggingConfig) -> Result<()> {
    let levels = OutputLevels::resolve(config)?;
    let console_only = should_use_console_only();

    let mut outputs: Vec<OutputLayer> = Vec::new();
    if !console_only {
        outputs.push(output_layer(
            file_writer(config)?,
            false,
            config.json_format,
            levels.file,
        ));
    }
    if console_only || config.console_output {
        outputs.push(output_layer(
            std::io::stdout,
            true,
            config.json_format,
            levels.console,
        ));
    }

    let installed = tracing_subscriber::registry()
        .with(build_env_filter(levels.most_verbose()))
        .with(outputs)
        .try_init();

    match installed {
        Ok(()) => {}
        // Tests and embedding applications may have installed one already
        Err(_) if console_only => {}
        Err(e) => return Err(ChargeGateError::config(e.to_string())),
    }

    if console_only {
        info!("Logging initialized - console_level: {:?}, console-only", levels.console);
    } else {
        info!(
            "Logging initialized - console_level: {:?}, file_level: {:?}, file: {}",
            levels.console, levels.file, config.file
        );
    }
    Ok(())
}

/// One formatted output, filtered to its own level
fn output_layer<W>(writer: W, ansi: bool, json: bool, level: Level) -> OutputLayer
where
    W: for<'w> fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false);
    let filter = LevelFilter::from_level(level);
    if json {
        layer.json().with_filter(filter).boxed()
    } else {
        layer.with_filter(filter).boxed()
    }
}

fn file_writer(config: &LoggingConfig) -> Result<NonBlocking> {
    let appender = rolling::Builder::new()
        .rotation(rolling::Rotation::DAILY)
        .filename_prefix("chargegate")
        .filename_suffix("log")
        .max_log_files(config.backup_count.max(1) as usize)
        .build(log_directory(&config.file))
        .map_err(|e| ChargeGateError::io(format!("Failed to create log file appender: {}", e)))?;

    let (writer, guard) = non_blocking(appender);
    let _ = LOG_GUARD.set(guard);
    Ok(writer)
}

fn build_env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("chargegate={},hyper=warn,reqwest=warn", level).into()
    })
}

fn should_use_console_only() -> bool {
    cfg!(test) || std::env::var_os("CHARGEGATE_DISABLE_FILE_LOG").is_some()
}

/// Directory the rolling appender writes into.
///
/// `file` may name a log file (its parent is used) or a directory.
fn log_directory(file: &str) -> &Path {
    let p = Path::new(file);
    if p.extension().is_some() {
        p.parent().unwrap_or(p)
    } else {
        p
    }
}
