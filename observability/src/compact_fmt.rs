use std::{fmt, io};

use nu_ansi_term::{Color, Style};
use tracing::{field, span, Event, Level, Subscriber};
use tracing_subscriber::field::{RecordFields, VisitFmt, VisitOutput};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, FormattedFields};
use tracing_subscriber::registry::LookupSpan;

/// Single-line log format: `[LEVEL] [time] message  key=value ... {span fields}`.
pub struct CompactFormat {
    time_format: time::format_description::OwnedFormatItem,
}

impl<S, N> FormatEvent<S, N> for CompactFormat
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
        let ansi = writer.has_ansi_escapes();

        write!(writer, "{} ", LevelLabel::new(event.metadata().level(), ansi))?;
        if self.format_time(&mut writer).is_err() {
            write!(writer, "[<unknown-timestamp>]")?;
        }
        writer.write_char(' ')?;

        ctx.format_fields(writer.by_ref(), event)?;

        // Span fields carry the per-network context, e.g. `network=ethereum`.
        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                let extensions = span.extensions();
                let Some(fields) = extensions.get::<FormattedFields<N>>() else {
                    continue;
                };

                if fields.is_empty() {
                    continue;
                }

                if ansi {
                    write!(writer, " {}", Style::new().dimmed().paint(fields.as_str()))?;
                } else {
                    write!(writer, " {}", fields.as_str())?;
                }
            }
        }

        writeln!(writer)
    }
}

impl<'w> FormatFields<'w> for CompactFormat {
    fn format_fields<R: RecordFields>(&self, writer: Writer<'w>, fields: R) -> fmt::Result {
        let mut v = FieldVisitor::new(writer, true);
        fields.record(&mut v);
        v.finish()
    }

    fn add_fields(
        &self,
        current: &'w mut FormattedFields<Self>,
        fields: &span::Record<'_>,
    ) -> fmt::Result {
        let empty = current.is_empty();
        let writer = current.as_writer();
        let mut v = FieldVisitor::new(writer, empty);
        fields.record(&mut v);
        v.finish()
    }
}

struct FieldVisitor<'a> {
    writer: Writer<'a>,
    is_empty: bool,
    result: fmt::Result,
}

impl<'a> FieldVisitor<'a> {
    fn new(writer: Writer<'a>, is_empty: bool) -> Self {
        Self {
            writer,
            is_empty,
            result: Ok(()),
        }
    }

    fn write_separated(&mut self, v: &impl fmt::Display) {
        let separator = if self.is_empty {
            self.is_empty = false;
            ""
        } else {
            " "
        };

        self.result = write!(self.writer, "{}{}", separator, v);
    }
}

impl field::Visit for FieldVisitor<'_> {
    fn record_str(&mut self, field: &field::Field, value: &str) {
        if self.result.is_err() {
            return;
        }

        if field.name() == "message" {
            self.write_separated(&format_args!("{:<48}", value));
        } else {
            self.record_debug(field, &format_args!("{}", value));
        }
    }

    fn record_debug(&mut self, field: &field::Field, value: &dyn fmt::Debug) {
        if self.result.is_err() {
            return;
        }

        let value = format!("{:?}", value);
        match field.name() {
            "message" => self.write_separated(&format_args!("{:<48}", value)),
            name if self.writer.has_ansi_escapes() => {
                let color = if name == "error" {
                    Color::Red
                } else {
                    Color::Cyan
                };
                self.write_separated(&format_args!("{}={}", name, color.paint(value)));
            }
            name => self.write_separated(&format_args!("{}={}", name, value)),
        }
    }
}

impl VisitOutput<fmt::Result> for FieldVisitor<'_> {
    fn finish(self) -> fmt::Result {
        self.result
    }
}

impl VisitFmt for FieldVisitor<'_> {
    fn writer(&mut self) -> &mut dyn fmt::Write {
        &mut self.writer
    }
}

impl CompactFormat {
    fn format_time(&self, writer: &mut Writer<'_>) -> fmt::Result {
        let now = time::OffsetDateTime::now_utc();
        let mut w = WriteAdaptor { fmt_writer: writer };
        now.format_into(&mut w, &self.time_format)
            .map_err(|_| fmt::Error)?;
        Ok(())
    }
}

impl Default for CompactFormat {
    fn default() -> Self {
        let time_format = time::macros::format_description!(
            version = 2,
            r"\[[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]\]"
        );

        Self {
            time_format: time_format.into(),
        }
    }
}

struct LevelLabel<'a> {
    level: &'a Level,
    ansi: bool,
}

impl<'a> LevelLabel<'a> {
    fn new(level: &'a Level, ansi: bool) -> Self {
        Self { level, ansi }
    }
}

impl fmt::Display for LevelLabel<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (label, color) = match *self.level {
            Level::TRACE => ("TRACE", Color::Purple),
            Level::DEBUG => ("DEBUG", Color::Blue),
            Level::INFO => ("INFO", Color::Green),
            Level::WARN => ("WARN", Color::Yellow),
            Level::ERROR => ("ERROR", Color::Red),
        };

        if self.ansi {
            write!(f, "[{}]", color.paint(label))
        } else {
            write!(f, "[{}]", label)
        }
    }
}

struct WriteAdaptor<'a> {
    fmt_writer: &'a mut dyn fmt::Write,
}

impl io::Write for WriteAdaptor<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = std::str::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        self.fmt_writer
            .write_str(s)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
