//! Runtime settings for the downloader. Nothing here is read from disk.

use std::path::PathBuf;
use std::time::Duration;

/// Lines must start with this to count as a video URL.
pub const YOUTUBE_PREFIX: &str = "https://www.youtube.com/";

/// How to launch yt-dlp: a program plus any leading arguments
/// (e.g. `python3 -m yt_dlp`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YtDlpCommand {
    pub program: PathBuf,
    pub prefix_args: Vec<String>,
}

impl Default for YtDlpCommand {
    fn default() -> Self {
        let bin = if cfg!(target_os = "windows") { "yt-dlp.exe" } else { "yt-dlp" };
        Self {
            program: PathBuf::from(bin),
            prefix_args: Vec::new(),
        }
    }
}

/// Settings shared by the probe, the yt-dlp backend and the session runner.
#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    /// Accepted URL prefix.
    pub url_prefix: String,
    /// Used when the folder field is left blank.
    pub default_folder: PathBuf,
    /// Upper bound on the reachability GET.
    pub probe_timeout: Duration,
    pub ytdlp: YtDlpCommand,
    /// Prefer separate best video + best audio, fall back to a single mp4.
    pub format_selector: String,
    /// Container used for merging and remuxing.
    pub container: String,
    /// File name template, joined onto the destination folder.
    pub output_template: String,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            url_prefix: YOUTUBE_PREFIX.to_string(),
            default_folder: default_download_folder(),
            probe_timeout: Duration::from_secs(5),
            ytdlp: YtDlpCommand::default(),
            format_selector: "bv*+ba/best[ext=mp4]".to_string(),
            container: "mp4".to_string(),
            output_template: "%(title)s.%(ext)s".to_string(),
        }
    }
}

/// `<current working directory>/Downloads`, or a relative `Downloads` if the
/// working directory cannot be read.
pub fn default_download_folder() -> PathBuf {
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("Downloads")
}
