use std::fmt::Write;

use chrono::Local;
use log::kv::{self, Key, Value, VisitSource};
use log::{max_level, LevelFilter, Metadata, Record, SetLoggerError};

pub struct StdLogger;

static LOGGER: StdLogger = StdLogger;

impl StdLogger {
  pub fn init(level: LevelFilter) -> Result<&'static StdLogger, SetLoggerError> {
    log::set_logger(&LOGGER)?;
    log::set_max_level(level);
    Ok(&LOGGER)
  }
}

/// Appends ` key=value` for every pair, quoting values with spaces.
struct LineWriter<'a>(&'a mut String);

impl<'kvs> VisitSource<'kvs> for LineWriter<'_> {
  fn visit_pair(&mut self, key: Key<'kvs>, value: Value<'kvs>) -> Result<(), kv::Error> {
    let value = value.to_string();
    if value.contains(' ') {
      write!(self.0, " {}={:?}", key, value)?;
    } else {
      write!(self.0, " {}={}", key, value)?;
    }
    Ok(())
  }
}

pub fn format_record(record: &Record) -> String {
  let mut line = format!("{:<5}: {}", record.level(), record.args());
  // a failing pair only truncates the line
  let _ = record.key_values().visit(&mut LineWriter(&mut line));
  line
}

impl log::Log for StdLogger {
  fn enabled(&self, metadata: &Metadata) -> bool {
    metadata.level() <= max_level()
  }

  fn log(&self, record: &Record) {
    if self.enabled(record.metadata()) {
      let time_str = Local::now().format("%Y-%m-%dT%H:%M:%S");
      println!("{0} {1}", time_str, format_record(record))
    }
  }

  fn flush(&self) {}
}
