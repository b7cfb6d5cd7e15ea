use std::path::Path;
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, BufReader},
    process::Command,
};
use tracing::{debug, info, trace, warn};

use crate::config::{DownloaderConfig, YtDlpCommand};
use crate::error::ExtractError;
use crate::model::StatusRecord;
use crate::progress::{PROGRESS_TEMPLATE, parse_progress_line};

/// Title used when yt-dlp resolves a video without printing one.
pub const UNKNOWN_TITLE: &str = "Unknown Title";

/// Receives status records as a download progresses.
pub trait StatusSink: Send + Sync {
    fn emit(&self, record: StatusRecord);
}

/// The extraction/download engine. Format negotiation, muxing and site
/// specifics all live behind this.
#[async_trait]
pub trait MediaBackend: Send + Sync {
    /// Resolve metadata without fetching media.
    async fn resolve_title(&self, url: &str) -> Result<String, ExtractError>;

    /// Download `url` into `folder`, emitting `Downloading` records as bytes arrive.
    async fn download(
        &self,
        url: &str,
        folder: &Path,
        sink: &dyn StatusSink,
    ) -> Result<(), ExtractError>;
}

/// Download one URL and report it through `sink`.
///
/// Emits `Started` once the title is known, any number of `Downloading`
/// records, then exactly one `Finished` or `Error`. Backend errors end up in
/// the `Error` record and are never returned.
pub async fn download_video(backend: &dyn MediaBackend, url: &str, folder: &Path, sink: &dyn StatusSink) {
    let title = match backend.resolve_title(url).await {
        Ok(title) => title,
        Err(err) => {
            warn!(url, error = %err, "metadata resolution failed");
            sink.emit(StatusRecord::Error { message: err.to_string() });
            return;
        }
    };

    info!(url, title = %title, "download started");
    sink.emit(StatusRecord::Started { title: title.clone() });

    match backend.download(url, folder, sink).await {
        Ok(()) => {
            info!(url, title = %title, "download finished");
            sink.emit(StatusRecord::Finished { title });
        }
        Err(err) => {
            warn!(url, error = %err, "download failed");
            sink.emit(StatusRecord::Error { message: err.to_string() });
        }
    }
}

/// Drives the `yt-dlp` executable.
#[derive(Debug, Clone)]
pub struct YtDlp {
    command: YtDlpCommand,
    format_selector: String,
    container: String,
    output_template: String,
}

impl YtDlp {
    pub fn from_config(config: &DownloaderConfig) -> Self {
        Self {
            command: config.ytdlp.clone(),
            format_selector: config.format_selector.clone(),
            container: config.container.clone(),
            output_template: config.output_template.clone(),
        }
    }

    fn command(&self, args: &[String]) -> Command {
        let mut cmd = Command::new(&self.command.program);
        cmd.args(&self.command.prefix_args)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        cmd
    }

    /// Arguments for printing the title without downloading.
    pub fn metadata_args(&self, url: &str) -> Vec<String> {
        vec![
            "--no-playlist".to_owned(),
            "--skip-download".to_owned(),
            "--no-warnings".to_owned(),
            "--encoding".to_owned(),
            "utf-8".to_owned(),
            "--print".to_owned(),
            "title".to_owned(),
            "--".to_owned(),
            url.to_owned(),
        ]
    }

    /// Arguments for the actual download into `folder`.
    pub fn download_args(&self, url: &str, folder: &Path) -> Vec<String> {
        let output = folder.join(&self.output_template);
        vec![
            "--no-playlist".to_owned(),
            "-f".to_owned(),
            self.format_selector.clone(),
            "--merge-output-format".to_owned(),
            self.container.clone(),
            "--remux-video".to_owned(),
            self.container.clone(),
            "--encoding".to_owned(),
            "utf-8".to_owned(),
            "--newline".to_owned(),
            "--progress-template".to_owned(),
            PROGRESS_TEMPLATE.to_owned(),
            "-o".to_owned(),
            output.to_string_lossy().into_owned(),
            "--".to_owned(),
            url.to_owned(),
        ]
    }
}

#[async_trait]
impl MediaBackend for YtDlp {
    async fn resolve_title(&self, url: &str) -> Result<String, ExtractError> {
        let args = self.metadata_args(url);
        debug!(program = %self.command.program.display(), ?args, "resolving metadata");
        let output = self.command(&args).output().await.map_err(ExtractError::Launch)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(failure(output.status, stderr.lines()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let title = stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or(UNKNOWN_TITLE);
        Ok(title.to_owned())
    }

    async fn download(
        &self,
        url: &str,
        folder: &Path,
        sink: &dyn StatusSink,
    ) -> Result<(), ExtractError> {
        let args = self.download_args(url, folder);
        debug!(program = %self.command.program.display(), ?args, "spawning download");
        let mut child = self
            .command(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(ExtractError::Launch)?;

        let out = child
            .stdout
            .take()
            .ok_or_else(|| ExtractError::Failed("yt-dlp stdout was not captured".to_owned()))?;
        let err = child
            .stderr
            .take()
            .ok_or_else(|| ExtractError::Failed("yt-dlp stderr was not captured".to_owned()))?;

        // Drain stderr alongside stdout so a chatty child never blocks on a full pipe.
        let stderr_task = tokio::spawn(async move {
            let mut collected = Vec::new();
            let mut reader = BufReader::new(err);
            let mut buf = Vec::with_capacity(1024);
            loop {
                match read_line_lossy(&mut reader, &mut buf).await {
                    Ok(Some(line)) => {
                        trace!(line = %line, "yt-dlp stderr");
                        collected.push(line);
                    }
                    Ok(None) => break,
                    Err(e) => {
                        debug!(error = %e, "yt-dlp stderr reader stopped");
                        break;
                    }
                }
            }
            collected
        });

        let mut reader = BufReader::new(out);
        let mut buf = Vec::with_capacity(1024);
        while let Some(line) = read_line_lossy(&mut reader, &mut buf).await? {
            match parse_progress_line(&line) {
                Some(record) => sink.emit(record),
                None => trace!(line = %line, "yt-dlp stdout"),
            }
        }

        let status = child.wait().await?;
        let stderr_lines = stderr_task.await.unwrap_or_default();
        if status.success() {
            Ok(())
        } else {
            Err(failure(status, stderr_lines.iter().map(String::as_str)))
        }
    }
}

/// Next line from `reader` without its line ending, decoded lossily.
///
/// yt-dlp echoes titles and file names in whatever encoding the console uses,
/// so a stray invalid byte must not end the stream. `None` at EOF.
async fn read_line_lossy<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    if reader.read_until(b'\n', buf).await? == 0 {
        return Ok(None);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    Ok(Some(String::from_utf8_lossy(buf).into_owned()))
}

/// Build the error for a non-zero exit from yt-dlp's stderr.
fn failure<'a>(status: ExitStatus, stderr: impl Iterator<Item = &'a str>) -> ExtractError {
    let mut last_error = None;
    let mut last_line = None;
    for line in stderr.map(str::trim).filter(|line| !line.is_empty()) {
        if let Some(message) = line.strip_prefix("ERROR: ") {
            last_error = Some(message);
        }
        last_line = Some(line);
    }
    let message = last_error
        .or(last_line)
        .map(str::to_owned)
        .unwrap_or_else(|| format!("yt-dlp exited with {status}"));
    ExtractError::Failed(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Mutex;

    #[derive(Default)]
    struct TestSink {
        records: Mutex<Vec<StatusRecord>>,
    }

    impl TestSink {
        fn take(&self) -> Vec<StatusRecord> {
            self.records.lock().unwrap().drain(..).collect()
        }
    }

    impl StatusSink for TestSink {
        fn emit(&self, record: StatusRecord) {
            self.records.lock().unwrap().push(record);
        }
    }

    enum Script {
        Succeed,
        FailMetadata(&'static str),
        FailDownload(&'static str),
    }

    struct ScriptedBackend(Script);

    #[async_trait]
    impl MediaBackend for ScriptedBackend {
        async fn resolve_title(&self, _url: &str) -> Result<String, ExtractError> {
            match self.0 {
                Script::FailMetadata(msg) => Err(ExtractError::Failed(msg.to_owned())),
                _ => Ok("Clip".to_owned()),
            }
        }

        async fn download(
            &self,
            _url: &str,
            _folder: &Path,
            sink: &dyn StatusSink,
        ) -> Result<(), ExtractError> {
            sink.emit(StatusRecord::Downloading {
                downloaded_bytes: 5,
                total_bytes: Some(10),
            });
            match self.0 {
                Script::FailDownload(msg) => Err(ExtractError::Failed(msg.to_owned())),
                _ => Ok(()),
            }
        }
    }

    const URL: &str = "https://www.youtube.com/watch?v=A";

    #[tokio::test]
    async fn success_emits_started_progress_finished() {
        let sink = TestSink::default();
        download_video(&ScriptedBackend(Script::Succeed), URL, Path::new("out"), &sink).await;
        assert_eq!(
            sink.take(),
            vec![
                StatusRecord::Started { title: "Clip".into() },
                StatusRecord::Downloading {
                    downloaded_bytes: 5,
                    total_bytes: Some(10)
                },
                StatusRecord::Finished { title: "Clip".into() },
            ]
        );
    }

    #[tokio::test]
    async fn metadata_failure_yields_single_error() {
        let sink = TestSink::default();
        download_video(
            &ScriptedBackend(Script::FailMetadata("Video unavailable")),
            URL,
            Path::new("out"),
            &sink,
        )
        .await;
        assert_eq!(
            sink.take(),
            vec![StatusRecord::Error {
                message: "Video unavailable".into()
            }]
        );
    }

    #[tokio::test]
    async fn download_failure_ends_with_error() {
        let sink = TestSink::default();
        download_video(&ScriptedBackend(Script::FailDownload("reset")), URL, Path::new("out"), &sink)
            .await;
        let records = sink.take();
        assert_eq!(records.first(), Some(&StatusRecord::Started { title: "Clip".into() }));
        assert_eq!(records.last(), Some(&StatusRecord::Error { message: "reset".into() }));
        let terminal = records
            .iter()
            .filter(|r| matches!(r, StatusRecord::Finished { .. } | StatusRecord::Error { .. }))
            .count();
        assert_eq!(terminal, 1);
    }

    #[test]
    fn download_args_carry_library_options() {
        let ytdlp = YtDlp::from_config(&DownloaderConfig::default());
        let folder = PathBuf::from("videos");
        let args = ytdlp.download_args(URL, &folder);

        let after = |flag: &str| {
            let idx = args.iter().position(|a| a == flag).unwrap();
            args[idx + 1].clone()
        };
        assert_eq!(after("-f"), "bv*+ba/best[ext=mp4]");
        assert_eq!(after("--merge-output-format"), "mp4");
        assert_eq!(after("--remux-video"), "mp4");
        assert_eq!(after("--progress-template"), PROGRESS_TEMPLATE);
        assert_eq!(
            after("-o"),
            folder.join("%(title)s.%(ext)s").to_string_lossy()
        );
        assert!(args.contains(&"--no-playlist".to_owned()));
        assert!(args.contains(&"--newline".to_owned()));
        assert_eq!(after("--encoding"), "utf-8");
        assert_eq!(&args[args.len() - 2..], ["--".to_owned(), URL.to_owned()]);
    }

    #[test]
    fn metadata_args_skip_download() {
        let ytdlp = YtDlp::from_config(&DownloaderConfig::default());
        let args = ytdlp.metadata_args(URL);
        assert!(args.contains(&"--skip-download".to_owned()));
        assert!(args.contains(&"--no-playlist".to_owned()));
        let idx = args.iter().position(|a| a == "--encoding").unwrap();
        assert_eq!(args[idx + 1], "utf-8");
        assert_eq!(args.last().map(String::as_str), Some(URL));
    }

    #[tokio::test]
    async fn lossy_lines_survive_invalid_bytes() {
        let mut reader: &[u8] = b"caf\xe9.mp4\r\n[progress] 1 2 NA\nlast";
        let mut buf = Vec::new();
        assert_eq!(
            read_line_lossy(&mut reader, &mut buf).await.unwrap().as_deref(),
            Some("caf\u{FFFD}.mp4")
        );
        assert_eq!(
            read_line_lossy(&mut reader, &mut buf).await.unwrap().as_deref(),
            Some("[progress] 1 2 NA")
        );
        assert_eq!(
            read_line_lossy(&mut reader, &mut buf).await.unwrap().as_deref(),
            Some("last")
        );
        assert_eq!(read_line_lossy(&mut reader, &mut buf).await.unwrap(), None);
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use std::os::unix::process::ExitStatusExt;

        /// Runs `sh <script>` in place of yt-dlp.
        fn fake_ytdlp(dir: &Path, body: &str) -> YtDlp {
            let script = dir.join("fake-yt-dlp.sh");
            std::fs::write(&script, body).unwrap();
            let config = DownloaderConfig {
                ytdlp: YtDlpCommand {
                    program: PathBuf::from("sh"),
                    prefix_args: vec![script.to_string_lossy().into_owned()],
                },
                ..DownloaderConfig::default()
            };
            YtDlp::from_config(&config)
        }

        const WORKING: &str = r#"
case "$*" in
  *--skip-download*) echo "Sample Clip" ;;
  *)
    echo "[youtube] A: Downloading webpage"
    echo "[progress] 512 1024 NA"
    echo "[progress] 1024 1024 NA"
    echo "some warning" >&2
    ;;
esac
"#;

        const BROKEN: &str = r#"
echo "WARNING: something odd" >&2
echo "ERROR: [youtube] A: Video unavailable" >&2
exit 1
"#;

        #[tokio::test]
        async fn resolves_title_from_stdout() {
            let dir = tempfile::tempdir().unwrap();
            let ytdlp = fake_ytdlp(dir.path(), WORKING);
            assert_eq!(ytdlp.resolve_title(URL).await.unwrap(), "Sample Clip");
        }

        #[tokio::test]
        async fn empty_title_falls_back() {
            let dir = tempfile::tempdir().unwrap();
            let ytdlp = fake_ytdlp(dir.path(), "exit 0\n");
            assert_eq!(ytdlp.resolve_title(URL).await.unwrap(), UNKNOWN_TITLE);
        }

        #[tokio::test]
        async fn download_streams_progress() {
            let dir = tempfile::tempdir().unwrap();
            let ytdlp = fake_ytdlp(dir.path(), WORKING);
            let sink = TestSink::default();
            ytdlp.download(URL, dir.path(), &sink).await.unwrap();
            assert_eq!(
                sink.take(),
                vec![
                    StatusRecord::Downloading {
                        downloaded_bytes: 512,
                        total_bytes: Some(1024)
                    },
                    StatusRecord::Downloading {
                        downloaded_bytes: 1024,
                        total_bytes: Some(1024)
                    },
                ]
            );
        }

        #[tokio::test]
        async fn nonzero_exit_reports_last_error_line() {
            let dir = tempfile::tempdir().unwrap();
            let ytdlp = fake_ytdlp(dir.path(), BROKEN);

            let err = ytdlp.resolve_title(URL).await.unwrap_err();
            assert_eq!(err.to_string(), "[youtube] A: Video unavailable");

            let sink = TestSink::default();
            let err = ytdlp.download(URL, dir.path(), &sink).await.unwrap_err();
            assert_eq!(err.to_string(), "[youtube] A: Video unavailable");
            assert!(sink.take().is_empty());
        }

        #[tokio::test]
        async fn non_utf8_stdout_keeps_download_alive() {
            let dir = tempfile::tempdir().unwrap();
            let ytdlp = fake_ytdlp(
                dir.path(),
                r#"
printf '[download] Destination: caf\351.mp4\n'
echo "[progress] 512 1024 NA"
echo "[progress] 1024 1024 NA"
exit 0
"#,
            );
            let sink = TestSink::default();
            ytdlp.download(URL, dir.path(), &sink).await.unwrap();
            assert_eq!(
                sink.take(),
                vec![
                    StatusRecord::Downloading {
                        downloaded_bytes: 512,
                        total_bytes: Some(1024)
                    },
                    StatusRecord::Downloading {
                        downloaded_bytes: 1024,
                        total_bytes: Some(1024)
                    },
                ]
            );
        }

        #[tokio::test]
        async fn non_utf8_stderr_keeps_error_message() {
            let dir = tempfile::tempdir().unwrap();
            let ytdlp = fake_ytdlp(
                dir.path(),
                r#"
printf 'caf\351\n' >&2
echo "ERROR: real reason" >&2
exit 1
"#,
            );
            let sink = TestSink::default();
            let err = ytdlp.download(URL, dir.path(), &sink).await.unwrap_err();
            assert_eq!(err.to_string(), "real reason");
        }

        #[tokio::test]
        async fn missing_program_is_a_launch_error() {
            let config = DownloaderConfig {
                ytdlp: YtDlpCommand {
                    program: PathBuf::from("/nonexistent/yt-dlp"),
                    prefix_args: Vec::new(),
                },
                ..DownloaderConfig::default()
            };
            let ytdlp = YtDlp::from_config(&config);
            let err = ytdlp.resolve_title(URL).await.unwrap_err();
            assert!(matches!(err, ExtractError::Launch(_)));
        }

        #[test]
        fn failure_without_stderr_mentions_status() {
            let err = failure(ExitStatus::from_raw(2 << 8), std::iter::empty());
            assert!(err.to_string().starts_with("yt-dlp exited with"));
        }

        #[test]
        fn failure_prefers_error_lines() {
            let lines = ["ERROR: first", "ERROR: second", "trailing noise"];
            let err = failure(ExitStatus::from_raw(1 << 8), lines.into_iter());
            assert_eq!(err.to_string(), "second");

            let err = failure(ExitStatus::from_raw(1 << 8), ["just text"].into_iter());
            assert_eq!(err.to_string(), "just text");
        }
    }
}
