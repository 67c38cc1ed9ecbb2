use log::LevelFilter;
use std::fs::OpenOptions;
use std::path::PathBuf;

/// Verbosity, 0 to 3.
pub const DEBUG_LEVEL_VAR: &str = "CHIME_DEBUG_LVL";
/// `1` sends the log to a file instead of stderr.
pub const LOG_TO_FILE_VAR: &str = "CHIME_LOG_TO_FILE";
/// File to log to when file logging is on.
pub const LOG_FILE_VAR: &str = "CHIME_LOGFILE";

pub const DEFAULT_DEBUG_LEVEL: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub level: LevelFilter,
    pub file: Option<PathBuf>,
}

impl LogConfig {
    pub fn from_env(app_name: &str) -> Self {
        Self::from_lookup(app_name, |key| std::env::var(key).ok())
    }

    pub fn from_lookup(app_name: &str, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let debug_level = lookup(DEBUG_LEVEL_VAR)
            .and_then(|v| v.trim().parse::<u8>().ok())
            .unwrap_or(DEFAULT_DEBUG_LEVEL);

        let file = match lookup(LOG_TO_FILE_VAR).as_deref().map(str::trim) {
            Some("1") => Some(
                lookup(LOG_FILE_VAR)
                    .filter(|v| !v.trim().is_empty())
                    .map(PathBuf::from)
                    .unwrap_or_else(|| default_log_file(app_name)),
            ),
            _ => None,
        };

        Self {
            level: level_for(debug_level),
            file,
        }
    }
}

/// 0 silences everything, 1 warnings, 2 info, 3 and above debug.
pub fn level_for(debug_level: u8) -> LevelFilter {
    match debug_level {
        0 => LevelFilter::Off,
        1 => LevelFilter::Warn,
        2 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    }
}

/// `<tmp>/chime/<app>-log.txt`
pub fn default_log_file(app_name: &str) -> PathBuf {
    std::env::temp_dir()
        .join("chime")
        .join(format!("{}-log.txt", app_name))
}

/// Install the global logger from the environment. `RUST_LOG` filters still apply
/// on top of the debug level.
pub fn init(app_name: &str) -> anyhow::Result<LogConfig> {
    let config = LogConfig::from_env(app_name);

    let mut builder = env_logger::Builder::new();
    builder.filter_level(config.level);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }

    if let Some(path) = &config.file {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        builder
            .target(env_logger::Target::Pipe(Box::new(file)))
            .write_style(env_logger::WriteStyle::Never);
    }

    builder.try_init()?;
    if let Some(path) = &config.file {
        log::info!("Logging to {:?}", path);
    }
    Ok(config)
}
