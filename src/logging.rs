//! Coloured stderr logger for the command-line front end.

use colored::Colorize;
use log::{Level, LevelFilter, Log, Metadata, Record};

struct StderrLogger {
    level: LevelFilter,
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level && metadata.target().starts_with("forge_report")
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        eprintln!("{} {}", tag(record.level()), record.args());
    }

    fn flush(&self) {}
}

fn tag(level: Level) -> colored::ColoredString {
    match level {
        Level::Error => "ERROR:".red().bold(),
        Level::Warn => "WARN:".yellow().bold(),
        Level::Info => "INFO:".cyan().bold(),
        Level::Debug => "DEBUG:".dimmed(),
        Level::Trace => "TRACE:".dimmed(),
    }
}

/// Maps `-v` occurrences to a level: none → info, one → debug, more → trace.
pub const fn level_for(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Installs the logger; later calls are ignored.
pub fn init(level: LevelFilter) {
    if log::set_boxed_logger(Box::new(StderrLogger { level })).is_ok() {
        log::set_max_level(level);
    }
}
