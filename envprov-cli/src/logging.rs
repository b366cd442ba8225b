// This file is dual licensed under the terms of the Apache License, Version
// 2.0, and the BSD License. See the LICENSE file in the root of this repository
// for complete details.

use log::{LevelFilter, Log, Metadata, Record};
use pretty_env_logger::env_logger::Logger;

use crate::progress::SuspendableBars;

const LOG_ENV: &str = "ENVPROV_LOG";

/// Hides the active progress bar while a record is written, so log lines
/// don't get drawn over.
struct IndicatifAwareLogger {
    internal: Logger,
    bars: SuspendableBars,
}

impl IndicatifAwareLogger {
    fn new(internal: Logger, bars: SuspendableBars) -> IndicatifAwareLogger {
        IndicatifAwareLogger { internal, bars }
    }

    fn install(self) -> Result<(), log::SetLoggerError> {
        let max_level = self.internal.filter();

        log::set_boxed_logger(Box::new(self))?;
        log::set_max_level(max_level);
        Ok(())
    }
}

impl Log for IndicatifAwareLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.internal.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if self.internal.matches(record) {
            self.bars.suspended(|| self.internal.log(record))
        }
    }

    fn flush(&self) {
        self.internal.flush()
    }
}

pub(crate) fn setup(bars: SuspendableBars, level: LevelFilter) -> Result<(), log::SetLoggerError> {
    let mut builder = pretty_env_logger::formatted_builder();
    builder.filter_level(level);
    if let Ok(filters) = std::env::var(LOG_ENV) {
        builder.parse_filters(&filters);
    }

    IndicatifAwareLogger::new(builder.build(), bars).install()
}
