/// One step in the life of a single download
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusRecord {
    /// Metadata resolved, bytes not yet fetched
    Started { title: String },
    /// Bytes arriving; `total_bytes` is unknown for some streams
    Downloading {
        downloaded_bytes: u64,
        total_bytes: Option<u64>,
    },
    /// Download and post-processing succeeded
    Finished { title: String },
    /// Anything went wrong while resolving or downloading
    Error { message: String },
}

/// Message from the background session to the render loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Status record produced while downloading `url`
    Status { url: String, record: StatusRecord },
    /// `url` failed the reachability check and was skipped
    Unreachable { url: String },
    /// Every URL has been processed; sent once per session
    Completed,
}

/// Colour family for the progress label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tone {
    #[default]
    Neutral,
    Info,
    Success,
    Failure,
}

/// What the progress label and bar currently show
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressView {
    /// Text of the progress label
    pub label: String,
    /// Label colour
    pub tone: Tone,
    /// Progress bar value (0.0 to 1.0)
    pub fraction: f32,
}

impl ProgressView {
    /// Reset for a fresh session.
    pub fn begin(&mut self) {
        *self = Self::default();
    }

    pub fn apply(&mut self, event: &SessionEvent) {
        match event {
            SessionEvent::Status { record, .. } => self.apply_record(record),
            SessionEvent::Unreachable { url } => {
                self.label = format!("Invalid URL: {url}");
                self.tone = Tone::Failure;
            }
            SessionEvent::Completed => {
                self.label = "Download completed!".to_string();
                self.tone = Tone::Success;
            }
        }
    }

    fn apply_record(&mut self, record: &StatusRecord) {
        match record {
            StatusRecord::Started { title } => {
                self.label = format!("Downloading: {title}");
                self.tone = Tone::Info;
            }
            StatusRecord::Downloading {
                downloaded_bytes,
                total_bytes: Some(total),
            } if *total > 0 => {
                self.fraction = (*downloaded_bytes as f64 / *total as f64).clamp(0.0, 1.0) as f32;
            }
            StatusRecord::Downloading { .. } => {}
            StatusRecord::Finished { title } => {
                self.label = format!("Finished: {title}");
                self.tone = Tone::Success;
                self.fraction = 1.0;
            }
            StatusRecord::Error { message } => {
                self.label = format!("Error: {message}");
                self.tone = Tone::Failure;
                self.fraction = 0.0;
            }
        }
    }
}
