use std::path::PathBuf;

/// XDG app name for config and state directories.
pub const APP_NAME: &str = "modelmw-client";

const CONFIG_FILE_NAME: &str = "config.toml";
const CACHE_SUBDIR: &str = "json_results";

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", APP_NAME)
}

pub fn config_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().to_path_buf())
}

/// `~/.config/modelmw-client/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join(CONFIG_FILE_NAME))
}

/// State directory; platforms without one (macOS) use the local data dir.
pub fn state_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| {
        dirs.state_dir()
            .unwrap_or_else(|| dirs.data_local_dir())
            .to_path_buf()
    })
}

/// Default job-record dump directory: `{state}/json_results`.
pub fn default_cache_dir() -> Option<PathBuf> {
    state_dir().map(|dir| dir.join(CACHE_SUBDIR))
}

/// Last-resort state location when no home directory is available.
pub fn state_dir_fallback() -> PathBuf {
    std::env::temp_dir().join(format!("{APP_NAME}-state"))
}

/// Directory for run logs written by the CLI.
pub fn log_dir() -> PathBuf {
    state_dir()
        .unwrap_or_else(state_dir_fallback)
        .join("logs")
}
