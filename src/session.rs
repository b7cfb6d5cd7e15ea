//! Session orchestration: one background pass over a batch of URLs.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::runtime::Handle;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, error::TryRecvError, unbounded_channel};
use tracing::{info, warn};

use crate::config::DownloaderConfig;
use crate::downloader::{MediaBackend, StatusSink, download_video};
use crate::error::StartError;
use crate::model::{SessionEvent, StatusRecord};
use crate::urls::collect_urls;
use crate::validator::LinkChecker;

/// Single slot allowing at most one session at a time.
#[derive(Debug, Clone, Default)]
struct SessionSlot(Arc<AtomicBool>);

impl SessionSlot {
    fn try_acquire(&self) -> Option<SessionGuard> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SessionGuard(self.0.clone()))
    }

    fn is_held(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Frees the slot when dropped, including on panic.
struct SessionGuard(Arc<AtomicBool>);

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Forwards a URL's status records onto the session channel.
struct ChannelSink<'a> {
    url: &'a str,
    events: &'a UnboundedSender<SessionEvent>,
}

impl StatusSink for ChannelSink<'_> {
    fn emit(&self, record: StatusRecord) {
        let _ = self.events.send(SessionEvent::Status {
            url: self.url.to_owned(),
            record,
        });
    }
}

/// Foreground end of a running session.
pub struct SessionHandle {
    urls: Vec<String>,
    folder: PathBuf,
    events: UnboundedReceiver<SessionEvent>,
}

impl SessionHandle {
    /// URLs in the order they will be attempted.
    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// Non-blocking poll for the render loop. `Disconnected` means the task is
    /// gone, whether or not `Completed` was seen.
    pub fn try_next(&mut self) -> Result<SessionEvent, TryRecvError> {
        self.events.try_recv()
    }

    /// `None` once the background task has finished.
    pub async fn next(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }
}

/// Starts download sessions and keeps them from overlapping.
pub struct Downloader {
    config: DownloaderConfig,
    checker: Arc<dyn LinkChecker>,
    backend: Arc<dyn MediaBackend>,
    slot: SessionSlot,
}

impl Downloader {
    pub fn new(
        config: DownloaderConfig,
        checker: Arc<dyn LinkChecker>,
        backend: Arc<dyn MediaBackend>,
    ) -> Self {
        Self {
            config,
            checker,
            backend,
            slot: SessionSlot::default(),
        }
    }

    pub fn config(&self) -> &DownloaderConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.slot.is_held()
    }

    /// Validate the request, prepare the folder and spawn the session on
    /// `runtime`. The spawned task is never joined.
    pub fn start(&self, runtime: &Handle, input: &str, folder: &str) -> Result<SessionHandle, StartError> {
        let urls = collect_urls(input, &self.config.url_prefix);
        if urls.is_empty() {
            return Err(StartError::NoValidUrls);
        }

        let guard = self.slot.try_acquire().ok_or(StartError::AlreadyRunning)?;

        let folder = match folder.trim() {
            "" => self.config.default_folder.clone(),
            path => PathBuf::from(path),
        };
        // An error here drops `guard` and frees the slot.
        std::fs::create_dir_all(&folder).map_err(|source| StartError::CreateFolder {
            path: folder.clone(),
            source,
        })?;

        let (tx, rx) = unbounded_channel();
        let checker = Arc::clone(&self.checker);
        let backend = Arc::clone(&self.backend);
        let task_urls = urls.clone();
        let task_folder = folder.clone();
        runtime.spawn(async move {
            run_session(&task_urls, &task_folder, checker.as_ref(), backend.as_ref(), &tx).await;
            drop(guard);
            let _ = tx.send(SessionEvent::Completed);
            info!("session finished");
        });

        Ok(SessionHandle {
            urls,
            folder,
            events: rx,
        })
    }
}

/// Process `urls` strictly one after another. Unreachable URLs are reported
/// and skipped; nothing here aborts the loop.
pub async fn run_session(
    urls: &[String],
    folder: &Path,
    checker: &dyn LinkChecker,
    backend: &dyn MediaBackend,
    events: &UnboundedSender<SessionEvent>,
) {
    info!(count = urls.len(), folder = %folder.display(), "session started");
    for url in urls {
        if !checker.is_reachable(url).await {
            warn!(url = %url, "skipping unreachable url");
            let _ = events.send(SessionEvent::Unreachable { url: url.clone() });
            continue;
        }
        let sink = ChannelSink { url, events };
        download_video(backend, url, folder, &sink).await;
    }
}
