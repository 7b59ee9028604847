use std::path::PathBuf;
use std::sync::OnceLock;

static EXE_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Returns the directory containing the executable.
pub fn get_exe_dir() -> &'static PathBuf {
    EXE_DIR.get_or_init(|| {
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."))
    })
}

/// Returns the logs directory: `<exe_dir>/logs/`
pub fn get_logs_dir() -> PathBuf {
    get_exe_dir().join("logs")
}

/// Returns the config directory: `<exe_dir>/config/`
pub fn get_config_dir() -> PathBuf {
    get_exe_dir().join("config")
}

/// Returns the config file path: `<exe_dir>/config/config.json`
pub fn get_config_path() -> PathBuf {
    get_config_dir().join("config.json")
}

/// Returns the history file path: `<exe_dir>/config/history.json`
pub fn get_history_path() -> PathBuf {
    get_config_dir().join("history.json")
}

/// Returns the debug captures directory: `<exe_dir>/captures/`
pub fn get_captures_dir() -> PathBuf {
    get_exe_dir().join("captures")
}

/// Ensures all output directories exist. Call at startup.
pub fn ensure_directories() -> std::io::Result<()> {
    std::fs::create_dir_all(get_logs_dir())?;
    std::fs::create_dir_all(get_config_dir())?;
    std::fs::create_dir_all(get_captures_dir())?;
    Ok(())
}
