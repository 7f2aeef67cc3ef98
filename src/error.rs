use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BoxError {
    #[error("No supported launcher found")]
    NoLauncherFound,

    #[error("Game not installed, install it from the launcher first")]
    GameNotInstalled,

    #[error("Save data not found, start the game once from its launcher first")]
    SaveDataNotFound,

    #[error("The game is already running")]
    GameAlreadyRunning,

    #[error("Failed to start {}: {source}", path.display())]
    LaunchFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to relocate save data: {0}")]
    MigrationFailed(#[source] std::io::Error),

    #[error("Remote version check failed: {0}")]
    RemoteCheckFailed(String),

    #[error("Unknown graphics profile: {0}")]
    UnknownGraphicsProfile(u32),

    #[error("Failed to write {}: {source}", path.display())]
    Preference {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BoxError>;
