use log::{info, LevelFilter, SetLoggerError};
use log4rs::{
  append::console::ConsoleAppender,
  config::{runtime::ConfigErrors, Appender, Root},
  encode::pattern::PatternEncoder,
  Config,
};
use thiserror::Error;

const LOG_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S)} {h({l:5})} {t} - {m}{n}";

#[derive(Debug, Error)]
pub enum LoggingError {
  #[error("invalid log level: {0}")]
  InvalidLevel(String),
  #[error(transparent)]
  Config(#[from] ConfigErrors),
  #[error(transparent)]
  SetLogger(#[from] SetLoggerError),
}

/// Console logging, with the level taken from `LOG_LEVEL` (debug when unset).
pub fn initialize() -> Result<log4rs::Handle, LoggingError> {
  let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "DEBUG".into());
  let level_filter = parse_level_filter(&log_level).ok_or(LoggingError::InvalidLevel(log_level))?;

  let stdout = ConsoleAppender::builder()
    .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
    .build();
  let config = Config::builder()
    .appender(Appender::builder().build("stdout", Box::new(stdout)))
    .build(Root::builder().appender("stdout").build(level_filter))?;

  let handle = log4rs::init_config(config)?;
  info!("Logging Level: {}", &level_filter);
  Ok(handle)
}

fn parse_level_filter(str: &str) -> Option<LevelFilter> {
  match str.to_lowercase().as_str() {
    "off" => Some(LevelFilter::Off),
    "error" => Some(LevelFilter::Error),
    "warn" => Some(LevelFilter::Warn),
    "info" => Some(LevelFilter::Info),
    "debug" => Some(LevelFilter::Debug),
    "trace" => Some(LevelFilter::Trace),
    _ => None,
  }
}
