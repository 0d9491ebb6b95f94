use chrono::Local;
use log::{Level, Log, Metadata, Record, SetLoggerError};

static LOGGER: GarnetLogger = GarnetLogger;

/// Timestamped console logger for the garnet binaries.
pub struct GarnetLogger;

impl GarnetLogger {
    /// Installs the logger with the given maximum level.
    pub fn init(level: Level) -> Result<(), SetLoggerError> {
        log::set_logger(&LOGGER)?;
        log::set_max_level(level.to_level_filter());
        Ok(())
    }
}

impl Log for GarnetLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = Local::now();
            println!(
                "{} {} {}",
                now.format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.args()
            );
        }
    }

    fn flush(&self) {}
}
