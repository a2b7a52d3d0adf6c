//! Log subscriber setup
//!
//! Library code only uses `tracing` macros. The binary installs one
//! subscriber: plain text, JSON, or GitHub Actions workflow commands.

use clap::ValueEnum;
use console::style;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

/// Output format for log events
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Renders events as GitHub Actions workflow commands.
///
/// Warnings and errors become annotations in the job summary; debug output
/// is only shown when step debug logging is enabled.
pub struct GithubFormat;

impl<S, N> FormatEvent<S, N> for GithubFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let prefix = match *event.metadata().level() {
            Level::ERROR => "::error::",
            Level::WARN => "::warning::",
            Level::INFO => "",
            Level::DEBUG | Level::TRACE => "::debug::",
        };
        write!(writer, "{}", prefix)?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Plain console output with styled warnings and errors
pub struct PlainFormat;

impl<S, N> FormatEvent<S, N> for PlainFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        match *event.metadata().level() {
            Level::ERROR => write!(writer, "{} ", style("error:").red().bold())?,
            Level::WARN => write!(writer, "{} ", style("warning:").yellow().bold())?,
            Level::DEBUG | Level::TRACE => write!(writer, "{} ", style("debug:").dim())?,
            Level::INFO => {}
        }
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Filter from `RUST_LOG`, else from verbosity (0 = info, 1+ = debug)
pub fn env_filter(verbose: u8) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => EnvFilter::new("volcache=info"),
        _ => EnvFilter::new("volcache=debug"),
    })
}

/// Install the global subscriber
pub fn init(verbose: u8, format: LogFormat, github: bool) {
    let filter = env_filter(verbose);

    match (format, github) {
        (LogFormat::Json, _) => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init(),
        (LogFormat::Text, true) => tracing_subscriber::fmt()
            .event_format(GithubFormat)
            .with_env_filter(filter)
            .init(),
        (LogFormat::Text, false) => tracing_subscriber::fmt()
            .event_format(PlainFormat)
            .with_env_filter(filter)
            .init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Captured {
        type Writer = Captured;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[test]
    fn github_format_emits_workflow_commands() {
        let out = Captured::default();
        let subscriber = tracing_subscriber::fmt()
            .event_format(GithubFormat)
            .with_writer(out.clone())
            .with_max_level(Level::DEBUG)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!("~/data: does not exist any more");
            tracing::info!("/a: cached");
            tracing::debug!("Executing: go env");
            tracing::error!("boom");
        });

        assert_eq!(
            out.text(),
            "::warning::~/data: does not exist any more\n/a: cached\n::debug::Executing: go env\n::error::boom\n"
        );
    }

    #[test]
    fn plain_format_keeps_info_bare() {
        console::set_colors_enabled(false);
        let out = Captured::default();
        let subscriber = tracing_subscriber::fmt()
            .event_format(PlainFormat)
            .with_writer(out.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("Attached 2 cache path(s)");
            tracing::warn!("careful");
        });

        assert_eq!(out.text(), "Attached 2 cache path(s)\nwarning: careful\n");
    }

    #[test]
    fn log_format_parses_from_config() {
        #[derive(Deserialize)]
        struct Wrapper {
            log_format: LogFormat,
        }
        let parsed: Wrapper = toml::from_str("log_format = \"json\"").unwrap();
        assert_eq!(parsed.log_format, LogFormat::Json);
    }
}
