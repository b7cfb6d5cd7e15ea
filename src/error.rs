use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure inside the extraction/download backend.
///
/// `Display` is what ends up in the `Error: ...` label, so `Failed` carries the
/// bare message.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to launch yt-dlp: {0}")]
    Launch(#[source] io::Error),
    #[error("lost contact with yt-dlp: {0}")]
    Io(#[from] io::Error),
    #[error("{0}")]
    Failed(String),
}

/// Reasons a session could not be started. None of these spawn a task.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("No valid YouTube URLs provided!")]
    NoValidUrls,
    #[error("a download session is already running")]
    AlreadyRunning,
    #[error("could not create download folder {}: {source}", path.display())]
    CreateFolder {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
