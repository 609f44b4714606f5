// Logging module
use colored::*;
use log::{Level, LevelFilter};
use std::fs::{self, OpenOptions};
use std::path::Path;
use xuandb_commons::config::LogConfig;

/// Format log level with color for console
fn format_level_colored(level: Level) -> ColoredString {
    match level {
        Level::Error => format!("[{:5}]", level).bright_red().bold(),
        Level::Warn => format!("[{:5}]", level).bright_yellow().bold(),
        Level::Info => format!("[{:5}]", level).bright_green().bold(),
        Level::Debug => format!("[{:5}]", level).bright_blue().bold(),
        Level::Trace => format!("[{:5}]", level).bright_magenta().bold(),
    }
}

/// Initialize logging based on configuration.
/// Console pattern (colored): [timestamp] [LEVEL] - module - message
/// File pattern (plain): [timestamp] [LEVEL] [module] - message
pub fn init_logging(cfg: &LogConfig) -> anyhow::Result<()> {
    let level_filter = parse_log_level(&cfg.level)?;

    let mut dispatch = fern::Dispatch::new()
        .level(level_filter)
        // keep chatty third-party targets down
        .level_for("actix_server", LevelFilter::Warn)
        .level_for("actix_web", LevelFilter::Warn)
        .level_for("reqwest", LevelFilter::Warn)
        .level_for("hyper", LevelFilter::Warn);

    if cfg.log_to_console {
        let console = fern::Dispatch::new()
            .format(|out, message, record| {
                out.finish(format_args!(
                    "{} {} - {} - {}",
                    format!("[{}]", chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
                        .bright_green()
                        .bold(),
                    format_level_colored(record.level()),
                    record.target().bright_magenta(),
                    message
                ))
            })
            .chain(std::io::stdout());
        dispatch = dispatch.chain(console);
    }

    if let Some(file_path) = &cfg.file_path {
        if let Some(parent) = Path::new(file_path).parent() {
            fs::create_dir_all(parent)?;
        }
        let log_file = OpenOptions::new().create(true).append(true).open(file_path)?;

        let file = fern::Dispatch::new()
            .format(|out, message, record| {
                out.finish(format_args!(
                    "[{}] [{:5}] [{}] - {}",
                    chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                    record.level(),
                    record.target(),
                    message
                ))
            })
            .chain(log_file);
        dispatch = dispatch.chain(file);
    }

    dispatch.apply()?;
    Ok(())
}

/// Parse log level string to LevelFilter
fn parse_log_level(level: &str) -> anyhow::Result<LevelFilter> {
    match level.to_lowercase().as_str() {
        "error" => Ok(LevelFilter::Error),
        "warn" => Ok(LevelFilter::Warn),
        "info" => Ok(LevelFilter::Info),
        "debug" => Ok(LevelFilter::Debug),
        "trace" => Ok(LevelFilter::Trace),
        _ => Err(anyhow::anyhow!("Invalid log level: {}", level)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert!(matches!(parse_log_level("error"), Ok(LevelFilter::Error)));
        assert!(matches!(parse_log_level("warn"), Ok(LevelFilter::Warn)));
        assert!(matches!(parse_log_level("info"), Ok(LevelFilter::Info)));
        assert!(matches!(parse_log_level("debug"), Ok(LevelFilter::Debug)));
        assert!(matches!(parse_log_level("trace"), Ok(LevelFilter::Trace)));
        assert!(parse_log_level("invalid").is_err());
    }

    #[test]
    fn test_parse_log_level_case_insensitive() {
        assert!(matches!(parse_log_level("INFO"), Ok(LevelFilter::Info)));
        assert!(matches!(parse_log_level("Debug"), Ok(LevelFilter::Debug)));
    }
}
