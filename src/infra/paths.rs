// src/infra/paths.rs — Config and data locations
//
// JIEYOU_HOME overrides everything: config.toml sits directly in it and the
// database under $JIEYOU_HOME/data. Otherwise config lives in ~/.jieyou/ and
// data in the platform data dir.

use directories::{BaseDirs, ProjectDirs};
use std::path::PathBuf;

fn jieyou_home() -> Option<PathBuf> {
    std::env::var_os("JIEYOU_HOME").map(PathBuf::from)
}

/// Home directory, falling back to the working directory on exotic hosts.
pub fn dirs_home() -> PathBuf {
    BaseDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// $JIEYOU_HOME/ or ~/.jieyou/
pub fn config_dir() -> PathBuf {
    if let Some(home) = jieyou_home() {
        return home;
    }
    dirs_home().join(".jieyou")
}

/// $JIEYOU_HOME/data/ or ~/.local/share/jieyou/ (platform equivalent)
pub fn data_dir() -> PathBuf {
    if let Some(home) = jieyou_home() {
        return home.join("data");
    }
    ProjectDirs::from("", "", "jieyou")
        .map(|d| d.data_local_dir().to_path_buf())
        .unwrap_or_else(|| config_dir().join("data"))
}

pub fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}

pub fn db_path() -> PathBuf {
    data_dir().join("jieyou.db")
}
