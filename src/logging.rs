use std::env;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::warn;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};

const DEFAULT_FILTER: &str = "warn";
const DEFAULT_FILE_PATH: &str = "logs/mavi.log";
const DEFAULT_FILE_NAME: &str = "mavi.log";

// Dropping the guard flushes and stops the file writer.
static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Format {
    Pretty,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Sink {
    Stderr,
    File,
    Both,
}

impl Sink {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Stderr => "stderr",
            Self::File => "file",
            Self::Both => "both",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct LogSettings {
    format: Format,
    sink: Sink,
    file_path: PathBuf,
}

impl LogSettings {
    fn from_env_with<F>(mut get_var: F) -> Self
    where
        F: FnMut(&str) -> Option<String>,
    {
        let format = match normalized(get_var("LOG_FORMAT")).as_deref() {
            Some("json") => Format::Json,
            _ => Format::Pretty,
        };
        let sink = match normalized(get_var("LOG_OUTPUT")).as_deref() {
            Some("file") => Sink::File,
            Some("both") => Sink::Both,
            _ => Sink::Stderr,
        };
        let file_path = get_var("LOG_FILE_PATH")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_FILE_PATH));

        Self {
            format,
            sink,
            file_path,
        }
    }
}

fn normalized(raw: Option<String>) -> Option<String> {
    raw.map(|value| value.trim().to_ascii_lowercase())
}

fn open_rolling_file(path: &Path) -> std::io::Result<(NonBlocking, WorkerGuard)> {
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| OsStr::new(DEFAULT_FILE_NAME));

    fs::create_dir_all(dir)?;
    Ok(tracing_appender::non_blocking(
        tracing_appender::rolling::daily(dir, file_name),
    ))
}

fn install(format: Format, writer: BoxMakeWriter) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer);
    let installed = match format {
        Format::Pretty => builder.try_init(),
        Format::Json => builder.json().try_init(),
    };
    installed.is_ok()
}

/// Installs the global subscriber from `LOG_FORMAT`, `LOG_OUTPUT` and
/// `LOG_FILE_PATH`. A file that cannot be opened degrades to stderr.
pub fn init() {
    let settings = LogSettings::from_env_with(|key| env::var(key).ok());

    if settings.sink == Sink::Stderr {
        install(settings.format, BoxMakeWriter::new(std::io::stderr));
        return;
    }

    match open_rolling_file(&settings.file_path) {
        Ok((file_writer, guard)) => {
            let writer = if settings.sink == Sink::Both {
                BoxMakeWriter::new(std::io::stderr.and(file_writer))
            } else {
                BoxMakeWriter::new(file_writer)
            };
            if install(settings.format, writer) {
                let _ = FILE_GUARD.set(guard);
            }
        }
        Err(err) => {
            if install(settings.format, BoxMakeWriter::new(std::io::stderr)) {
                warn!(
                    log_output = settings.sink.as_str(),
                    path = %settings.file_path.display(),
                    error = %err,
                    "log file unavailable, logging to stderr"
                );
            } else {
                eprintln!(
                    "mavi: failed to open log file '{}': {err}",
                    settings.file_path.display()
                );
            }
        }
    }
}
