use fern::colors::{Color, ColoredLevelConfig};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, clap::Args, Serialize, Deserialize)]
pub struct LogConfig {
    /// Set log level
    #[clap(long, value_enum, default_value_t = LogLevel::Info)]
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,
    /// Disable the log file
    #[clap(long)]
    #[serde(default)]
    pub disable_file_logging: bool,
    /// Disable the usage of colors in log
    #[clap(long)]
    #[serde(default)]
    pub disable_log_color: bool,
    /// Logs directory
    #[clap(long, default_value_t = String::from("logs/"))]
    #[serde(default = "default_logs_path")]
    pub logs_path: String,
    /// Log filename
    #[clap(long, default_value_t = String::from("tos-stress.log"))]
    #[serde(default = "default_filename_log")]
    pub filename_log: String,
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

fn default_logs_path() -> String {
    "logs/".to_owned()
}

fn default_filename_log() -> String {
    "tos-stress.log".to_owned()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            disable_file_logging: false,
            disable_log_color: false,
            logs_path: default_logs_path(),
            filename_log: default_filename_log(),
        }
    }
}

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

// Install the global logger: colored terminal output plus an optional log file
pub fn init_logger(config: &LogConfig) -> anyhow::Result<()> {
    let level: LevelFilter = config.log_level.into();

    let colors = ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::Green)
        .debug(Color::Cyan)
        .trace(Color::Magenta);
    let use_colors = !config.disable_log_color;

    let stdout = fern::Dispatch::new()
        .format(move |out, message, record| {
            let now = chrono::Local::now().format(DATETIME_FORMAT);
            if use_colors {
                out.finish(format_args!(
                    "[{}] [{}] [{}] {}",
                    now,
                    colors.color(record.level()),
                    record.target(),
                    message
                ))
            } else {
                out.finish(format_args!(
                    "[{}] [{}] [{}] {}",
                    now,
                    record.level(),
                    record.target(),
                    message
                ))
            }
        })
        .chain(std::io::stdout());

    let mut dispatch = fern::Dispatch::new()
        .level(level)
        // keep the HTTP stack quiet
        .level_for("reqwest", LevelFilter::Warn)
        .level_for("hyper", LevelFilter::Warn)
        .chain(stdout);

    if !config.disable_file_logging {
        let dir = Path::new(&config.logs_path);
        fs::create_dir_all(dir)?;
        let file = fern::Dispatch::new()
            .format(|out, message, record| {
                out.finish(format_args!(
                    "[{}] [{}] [{}] {}",
                    chrono::Local::now().format(DATETIME_FORMAT),
                    record.level(),
                    record.target(),
                    message
                ))
            })
            .chain(fern::log_file(dir.join(&config.filename_log))?);
        dispatch = dispatch.chain(file);
    }

    dispatch.apply()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_conversion() {
        assert_eq!(LevelFilter::from(LogLevel::Debug), LevelFilter::Debug);
        assert_eq!(LevelFilter::from(LogLevel::Off), LevelFilter::Off);
    }

    #[test]
    fn test_log_config_from_json() {
        let config: LogConfig = serde_json::from_str(r#"{ "log_level": "trace" }"#).unwrap();
        assert_eq!(config.log_level, LogLevel::Trace);
        assert_eq!(config.logs_path, "logs/");
        assert!(!config.disable_file_logging);
    }
}
