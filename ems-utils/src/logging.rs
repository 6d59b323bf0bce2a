//! EMS logging utility functions.

use std::{fs, io, path::Path};

use anyhow::{Context, Result};
use log::{info, LevelFilter};
use log4rs::append::rolling_file::policy::compound::{
    roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger, CompoundPolicy,
};
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

use crate::consts::{EMS_TMP_LOG_DIR, EMS_TMP_LOG_FILE, LOG_MAX_BYTES, LOG_ROLLED_FILES};
use crate::shared::set_permissions;

pub fn configure_logger(level: LevelFilter) -> Result<()> {
    let err_context = || format!("failed to configure logger in {}", EMS_TMP_LOG_DIR.display());

    atomic_create_dir(&EMS_TMP_LOG_DIR).with_context(err_context)?;

    // thread names carry the worker slot, which is also the session id it hands out
    let file_pattern = "{highlight({level:<6})} |{module:<20.20}| {date(%Y-%m-%d %H:%M:%S.%3f)} [{thread:<16.16}] [{file}:{line}]: {message} {n}";

    let roller_pattern = EMS_TMP_LOG_DIR.join("ems.{}.log");
    let roller = FixedWindowRoller::builder()
        .build(&roller_pattern.to_string_lossy(), LOG_ROLLED_FILES)
        .map_err(|e| anyhow::anyhow!("{}", e))
        .with_context(err_context)?;
    let policy = CompoundPolicy::new(
        Box::new(SizeTrigger::new(LOG_MAX_BYTES)),
        Box::new(roller),
    );

    let log_file = RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(file_pattern)))
        .append(true)
        .build(&*EMS_TMP_LOG_FILE, Box::new(policy))
        .with_context(err_context)?;

    let config = Config::builder()
        .appender(Appender::builder().build("logFile", Box::new(log_file)))
        .build(Root::builder().appender("logFile").build(level))
        .with_context(err_context)?;

    log4rs::init_config(config).with_context(err_context)?;

    info!("EMS logger initialized at level {}", level);
    Ok(())
}

pub fn atomic_create_dir(dir_name: &Path) -> io::Result<()> {
    if let Err(e) = fs::create_dir_all(dir_name) {
        if e.kind() != io::ErrorKind::AlreadyExists {
            return Err(e);
        }
    }
    set_permissions(dir_name, 0o700)
}
