//! Log output
//!
//! Stage commands carry cloud credentials and every statement is logged at
//! debug level, so the writer's events go through [`RedactingFormat`], which
//! masks `AWS_*` and `AZURE_*` values before anything is written.

use chrono::{SecondsFormat, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, format};
use tracing_subscriber::registry::LookupSpan;

static CREDENTIAL_VALUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"((?:AZURE|AWS)_[A-Z_]*\s=\s)'(?:[^'\\]|\\.)*'?").expect("Invalid regex")
});

/// Replace credential values in `message` with `...`
pub fn redact_credentials(message: &str) -> String {
    CREDENTIAL_VALUE
        .replace_all(message, "${1}'...'")
        .into_owned()
}

/// [`FormatEvent`] writing `<timestamp> <LEVEL> <message>` with credentials
/// redacted
#[derive(Debug, Clone)]
pub struct RedactingFormat {
    timestamps: bool,
}

impl Default for RedactingFormat {
    fn default() -> Self {
        Self::new()
    }
}

impl RedactingFormat {
    pub fn new() -> Self {
        Self { timestamps: true }
    }

    /// Omit the timestamp prefix
    pub fn without_time(mut self) -> Self {
        self.timestamps = false;
        self
    }
}

impl<S, N> FormatEvent<S, N> for RedactingFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let mut message = String::new();
        ctx.format_fields(Writer::new(&mut message), event)?;

        if self.timestamps {
            write!(
                writer,
                "{} ",
                Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
            )?;
        }
        let level = match *event.metadata().level() {
            Level::TRACE => "TRACE",
            Level::DEBUG => "DEBUG",
            Level::INFO => "INFO",
            Level::WARN => "WARN",
            Level::ERROR => "ERROR",
        };
        writeln!(writer, "{} {}", level, redact_credentials(&message))
    }
}

/// Install the redacting subscriber on stderr
///
/// `RUST_LOG` wins when set; otherwise `info`, or `debug` with `verbose`.
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .event_format(RedactingFormat::new())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::{Arc, Mutex};

    use tracing_subscriber::fmt::MakeWriter;
    use tracing_subscriber::util::SubscriberInitExt;

    #[derive(Debug, Default, Clone)]
    struct TestWriter {
        buffer: Arc<Mutex<Vec<u8>>>,
    }

    impl TestWriter {
        fn drain(&self) -> String {
            let mut guard = self.buffer.lock().unwrap();
            String::from_utf8(guard.drain(..).collect()).unwrap()
        }
    }

    impl<'a> MakeWriter<'a> for TestWriter {
        type Writer = TestWriter;

        fn make_writer(&self) -> Self::Writer {
            self.clone()
        }
    }

    impl std::io::Write for TestWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.buffer.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_redact_aws_credentials() {
        let sql = "CREATE OR REPLACE STAGE \"s\" URL = 's3://bucket' CREDENTIALS = (AWS_KEY_ID = 'AKIA123' AWS_SECRET_KEY = 'secret/key+1=' AWS_TOKEN = 'tok%2B==')";
        assert_eq!(
            redact_credentials(sql),
            "CREATE OR REPLACE STAGE \"s\" URL = 's3://bucket' CREDENTIALS = (AWS_KEY_ID = '...' AWS_SECRET_KEY = '...' AWS_TOKEN = '...')"
        );
    }

    #[test]
    fn test_redact_azure_credentials() {
        let sql = "CREDENTIALS = (AZURE_SAS_TOKEN = 'sv=2021-08-06&sig=abc%2B:x')";
        assert_eq!(
            redact_credentials(sql),
            "CREDENTIALS = (AZURE_SAS_TOKEN = '...')"
        );
    }

    #[test]
    fn test_redact_escaped_and_dotted_values() {
        let sql = r"CREDENTIALS = (AWS_KEY_ID = 'AK.IA_1' AWS_SECRET_KEY = 'se\'cr\\et.x' AWS_TOKEN = 'tok')";
        assert_eq!(
            redact_credentials(sql),
            "CREDENTIALS = (AWS_KEY_ID = '...' AWS_SECRET_KEY = '...' AWS_TOKEN = '...')"
        );
    }

    #[test]
    fn test_redact_truncated_value() {
        assert_eq!(
            redact_credentials("AZURE_SAS_TOKEN = 'sv=2021&sig=ab"),
            "AZURE_SAS_TOKEN = '...'"
        );
    }

    #[test]
    fn test_plain_text_untouched() {
        let text = "Creating table \"orders\"";
        assert_eq!(redact_credentials(text), text);
    }

    #[test]
    fn test_format_redacts_fields() {
        let writer = TestWriter::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(writer.clone())
            .with_ansi(false)
            .with_max_level(Level::DEBUG)
            .event_format(RedactingFormat::new().without_time())
            .finish();
        let _guard = subscriber.set_default();

        tracing::debug!(sql = %"CREDENTIALS = (AWS_TOKEN = 'abc')", "Executing statement");
        assert_eq!(
            writer.drain(),
            "DEBUG Executing statement sql=CREDENTIALS = (AWS_TOKEN = '...')\n"
        );

        tracing::warn!("Failed to drop stage");
        assert_eq!(writer.drain(), "WARN Failed to drop stage\n");
    }

    #[test]
    fn test_format_with_timestamp() {
        let writer = TestWriter::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(writer.clone())
            .with_ansi(false)
            .event_format(RedactingFormat::new())
            .finish();
        let _guard = subscriber.set_default();

        tracing::info!("hello");
        let line = writer.drain();
        assert!(line.ends_with("Z INFO hello\n"));
    }
}
