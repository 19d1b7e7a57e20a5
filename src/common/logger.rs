//! Logging.
use std::{io, sync::Mutex};

use lazy_static::lazy_static;
use slog::{Drain, Logger};

lazy_static! {
    static ref LOGGER: Logger = Logger::root(
        Mutex::new(slog_json::Json::default(io::stderr())).ignore_res(),
        o!()
    );
}

/// Get a logger for the named module.
pub fn get_logger(module: &'static str) -> Logger {
    LOGGER.new(o!("module" => module))
}
