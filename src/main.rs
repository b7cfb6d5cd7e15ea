//! Main application for the YouTube batch downloader GUI

// Runtime settings
mod config;
// External downloader logic (yt-dlp) and the per-URL worker
mod downloader;
// Error types shared across modules
mod error;
// Tracing subscriber setup
mod logging;
// Status records and the progress label/bar model
mod model;
// Progress parsing utilities
mod progress;
// Background session orchestration
mod session;
// URL extraction from text
mod urls;
// Reachability probe
mod validator;

use std::sync::Arc;

use anyhow::anyhow;
use config::DownloaderConfig;
use downloader::YtDlp;
use error::StartError;
use model::{ProgressView, SessionEvent, Tone};
use session::{Downloader, SessionHandle};
use validator::HttpProbe;

// eframe/egui for GUI application framework
use eframe::{App, Frame, egui};
// OnceCell for single-time runtime initialization
use once_cell::sync::OnceCell;
// FileDialog for folder selection, MessageDialog for warnings
use rfd::{FileDialog, MessageButtons, MessageDialog, MessageLevel};
use tokio::{runtime::Runtime, sync::mpsc::error::TryRecvError};
use egui::{Color32, RichText};
use tracing::{error, info, warn};

// Global Tokio runtime stored in a OnceCell for lazy init
static RUNTIME: OnceCell<Runtime> = OnceCell::new();

/// Program entry point: initializes logging and runtime, then launches GUI
fn main() -> anyhow::Result<()> {
    logging::init_logging();

    let config = DownloaderConfig::default();
    // The default folder is prepared up front; a failure only matters once it is used
    if let Err(err) = std::fs::create_dir_all(&config.default_folder) {
        warn!(folder = %config.default_folder.display(), error = %err, "could not create default folder");
    }

    let runtime = RUNTIME.get_or_try_init(Runtime::new)?;
    let probe = HttpProbe::new(config.probe_timeout)?;
    let backend = YtDlp::from_config(&config);
    let downloader = Downloader::new(config, Arc::new(probe), Arc::new(backend));
    let app = DownloaderApp::new(downloader, runtime.handle().clone());

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([600.0, 500.0]),
        ..Default::default()
    };
    info!("opening main window");
    eframe::run_native(
        "YouTube Video Downloader",
        options,
        Box::new(move |cc| {
            // Use dark theme visuals
            cc.egui_ctx.set_visuals(egui::Visuals::dark());
            Box::new(app)
        }),
    )
    .map_err(|err| anyhow!("GUI failed: {err}"))
}

/// Application state for the GUI
struct DownloaderApp {
    /// Multi-line input, one URL per line
    url_input: String,
    /// Distinct accepted URLs in `url_input`
    url_count: usize,
    /// Destination folder for downloads
    download_folder: String,
    /// Label and progress bar state
    view: ProgressView,
    /// Starts sessions and guards against overlap
    downloader: Downloader,
    /// Runtime the sessions are spawned on
    runtime: tokio::runtime::Handle,
    /// Receiving end of the active session, if any
    session: Option<SessionHandle>,
}

impl DownloaderApp {
    fn new(downloader: Downloader, runtime: tokio::runtime::Handle) -> Self {
        let download_folder = downloader.config().default_folder.display().to_string();
        Self {
            url_input: String::new(),
            url_count: 0,
            download_folder,
            view: ProgressView::default(),
            downloader,
            runtime,
            session: None,
        }
    }

    fn prefix(&self) -> &str {
        &self.downloader.config().url_prefix
    }

    fn refresh_url_count(&mut self) {
        self.url_count = urls::count_urls(&self.url_input, self.prefix());
    }

    /// Append accepted clipboard URLs to the input box
    fn paste_urls(&mut self) {
        let clipboard = arboard::Clipboard::new().and_then(|mut cb| cb.get_text());
        let text = match clipboard {
            Ok(text) => text,
            Err(err) => {
                warn!(error = %err, "clipboard read failed");
                String::new()
            }
        };
        let found = urls::collect_urls(&text, self.prefix());
        if found.is_empty() {
            warn_dialog("No valid YouTube URLs found in clipboard!");
            return;
        }
        if !self.url_input.is_empty() && !self.url_input.ends_with('\n') {
            self.url_input.push('\n');
        }
        self.url_input.push_str(&found.join("\n"));
        self.url_input.push('\n');
        self.refresh_url_count();
    }

    fn clear_urls(&mut self) {
        self.url_input.clear();
        self.refresh_url_count();
    }

    fn browse_folder(&mut self) {
        if let Some(folder) = FileDialog::new().set_directory(&self.download_folder).pick_folder() {
            self.download_folder = folder.display().to_string();
        }
    }

    fn start_download(&mut self) {
        match self
            .downloader
            .start(&self.runtime, &self.url_input, &self.download_folder)
        {
            Ok(handle) => {
                info!(count = handle.urls().len(), folder = %handle.folder().display(), "download session started");
                self.download_folder = handle.folder().display().to_string();
                self.view.begin();
                self.session = Some(handle);
            }
            Err(StartError::NoValidUrls) => warn_dialog(&StartError::NoValidUrls.to_string()),
            Err(err) => {
                error!(error = %err, "could not start session");
                MessageDialog::new()
                    .set_level(MessageLevel::Error)
                    .set_title("Error")
                    .set_description(&err.to_string())
                    .set_buttons(MessageButtons::Ok)
                    .show();
            }
        }
    }

    /// Apply every pending session event to the view
    fn poll_session(&mut self) {
        let Some(handle) = self.session.as_mut() else {
            return;
        };
        loop {
            match handle.try_next() {
                Ok(SessionEvent::Completed) => {
                    self.view.apply(&SessionEvent::Completed);
                    self.session = None;
                    return;
                }
                Ok(event) => self.view.apply(&event),
                Err(TryRecvError::Empty) => return,
                Err(TryRecvError::Disconnected) => {
                    warn!("session ended without completing");
                    self.view.apply(&SessionEvent::Completed);
                    self.session = None;
                    return;
                }
            }
        }
    }
}

fn tone_color(tone: Tone) -> Option<Color32> {
    match tone {
        Tone::Neutral => None,
        Tone::Info => Some(Color32::from_rgb(80, 140, 255)),
        Tone::Success => Some(Color32::from_rgb(60, 180, 75)),
        Tone::Failure => Some(Color32::from_rgb(230, 60, 60)),
    }
}

fn warn_dialog(message: &str) {
    MessageDialog::new()
        .set_level(MessageLevel::Warning)
        .set_title("Warning")
        .set_description(message)
        .set_buttons(MessageButtons::Ok)
        .show();
}

/// GUI update loop: called each frame to redraw and handle interactions
impl App for DownloaderApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut Frame) {
        // Drain session events before drawing
        self.poll_session();

        egui::TopBottomPanel::bottom("footer").show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                ui.label(RichText::new("Powered by yt-dlp").strong().size(14.0));
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                ui.label(RichText::new("YouTube Video Downloader").strong().size(16.0));
            });

            // URL input field
            ui.label("Enter YouTube URL(s):");
            let edit = ui.add(
                egui::TextEdit::multiline(&mut self.url_input)
                    .desired_rows(5)
                    .desired_width(f32::INFINITY),
            );
            if edit.changed() {
                self.refresh_url_count();
            }

            // Paste and Clear buttons
            ui.horizontal(|ui| {
                if ui.button("Paste").clicked() {
                    self.paste_urls();
                }
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if ui.button("Clear").clicked() {
                        self.clear_urls();
                    }
                });
            });
            ui.label(format!("URLs: {}", self.url_count));

            // Folder selection
            ui.label("Download Path:");
            ui.horizontal(|ui| {
                if ui.button("Browse").clicked() {
                    self.browse_folder();
                }
                ui.add(egui::TextEdit::singleline(&mut self.download_folder).desired_width(f32::INFINITY));
            });

            // Download button, disabled while a session runs
            ui.add_space(10.0);
            let running = self.session.is_some() || self.downloader.is_running();
            let text = if running { "Downloading..." } else { "Start Download" };
            if ui.add_enabled(!running, egui::Button::new(text)).clicked() {
                self.start_download();
            }

            // Progress label and bar
            ui.add_space(10.0);
            match tone_color(self.view.tone) {
                Some(color) => ui.colored_label(color, &self.view.label),
                None => ui.label(&self.view.label),
            };
            ui.add(egui::ProgressBar::new(self.view.fraction));
        });

        // Request periodic repaint for progress updates
        ctx.request_repaint_after(std::time::Duration::from_millis(100));
    }
}
