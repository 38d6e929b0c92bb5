//! Flight Logging
//!
//! One log line per event: `YYYY-MM-DD HH:MM:SS,mmm - LEVEL - [target]
//! message`, colored on a TTY, plain in the per-flight file under
//! `./flight_logs/`.

use chrono::Local;
use std::fs;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const LOG_DIR: &str = "./flight_logs";

struct FlightLogFormat {
    ansi: bool,
}

fn level_color(level: Level) -> &'static str {
    match level {
        Level::TRACE => "\x1b[35m",
        Level::DEBUG => "\x1b[36m",
        Level::INFO => "\x1b[32m",
        Level::WARN => "\x1b[33m",
        Level::ERROR => "\x1b[1;31m",
    }
}

impl<S, N> FormatEvent<S, N> for FlightLogFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let meta = event.metadata();
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S,%3f");
        if self.ansi {
            write!(
                writer,
                "{} - {}{}\x1b[0m - [{}] ",
                timestamp,
                level_color(*meta.level()),
                meta.level(),
                meta.target()
            )?;
        } else {
            write!(writer, "{} - {} - [{}] ", timestamp, meta.level(), meta.target())?;
        }
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Install console + file logging for this flight. Returns the path of the
/// log file that was created.
pub fn init() -> anyhow::Result<PathBuf> {
    fs::create_dir_all(LOG_DIR)?;
    let path = PathBuf::from(format!(
        "{LOG_DIR}/log_{}.txt",
        Local::now().format("%Y-%m-%d_%H-%M-%S")
    ));
    let file = fs::File::create(&path)?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .event_format(FlightLogFormat {
                    ansi: io::stdout().is_terminal(),
                })
                .with_writer(io::stdout),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .event_format(FlightLogFormat { ansi: false })
                .with_writer(Arc::new(file)),
        )
        .init();

    Ok(path)
}
