use std::path::PathBuf;

pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod storage;

pub use config::{MirrorConfig, PassOptions};
pub use core::{Scheduler, SchedulerExit, SyncEngine, SyncReport};
pub use error::{ConfigError, SyncError};

/// 配置目录：`MIRROR_CONFIG_DIR`，否则为平台配置目录下的 `bucket-mirror`
pub fn config_dir() -> PathBuf {
    std::env::var_os("MIRROR_CONFIG_DIR")
        .map(PathBuf::from)
        .or_else(|| dirs::config_dir().map(|p| p.join("bucket-mirror")))
        .unwrap_or_else(|| PathBuf::from(".bucket-mirror"))
}

pub mod dirs {
    use std::path::PathBuf;

    pub fn config_dir() -> Option<PathBuf> {
        if cfg!(target_os = "windows") {
            std::env::var("APPDATA").ok().map(PathBuf::from)
        } else if cfg!(target_os = "macos") {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join("Library").join("Application Support"))
        } else {
            std::env::var("XDG_CONFIG_HOME")
                .ok()
                .map(PathBuf::from)
                .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config")))
        }
    }
}
