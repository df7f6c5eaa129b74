use {
    crate::config::{LogFormat, Logging},
    std::{io, path::Path},
    tracing_appender::{non_blocking::WorkerGuard, rolling::RollingFileAppender},
    tracing_subscriber::{filter::ParseError, fmt::writer::BoxMakeWriter, prelude::*, EnvFilter},
};

/// Process-wide `tracing` subscriber.
pub struct Logger {
    _guard: Option<WorkerGuard>,
}

impl Logger {
    /// Installs the subscriber. Records go to the configured file, or to
    /// stderr through a non-blocking writer.
    pub fn init(cfg: &Logging) -> Result<Self, ParseError> {
        let filter = EnvFilter::try_new(&cfg.level)?;

        let (writer, guard, ansi) = match &cfg.file {
            Some(path) => (BoxMakeWriter::new(file_appender(path)), None, false),
            None => {
                let (writer, guard) = tracing_appender::non_blocking(io::stderr());
                let ansi = atty::is(atty::Stream::Stderr);
                (BoxMakeWriter::new(writer), Some(guard), ansi)
            }
        };

        let layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(writer);

        let layer = match cfg.format {
            LogFormat::Json => layer
                .json()
                .with_span_list(true)
                .with_current_span(false)
                .with_filter(filter)
                .boxed(),
            LogFormat::Text => layer.with_ansi(ansi).with_filter(filter).boxed(),
        };

        tracing_subscriber::registry().with(layer).init();

        Ok(Self { _guard: guard })
    }

    /// Flushes buffered records. Logging must be the last subsystem to go.
    pub fn stop(self) {}
}

/// Appends to `path`, without rotation.
fn file_appender(path: &Path) -> RollingFileAppender {
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .map_or_else(|| "cmgr.log".into(), |name| name.to_os_string());

    tracing_appender::rolling::never(dir, file_name)
}
