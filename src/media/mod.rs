use std::fmt;
use std::path::{Path, PathBuf};

use crate::PipelineError;

/// Locator for the remote media payload of a link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamReference {
    /// Direct, fetchable URL of the media payload
    pub url: String,

    /// Content type hint reported by the resolver (e.g. `video/mp4`)
    pub content_type: Option<String>,

    /// Normalized page link the stream was resolved from
    pub origin: String,
}

impl StreamReference {
    pub fn new(url: impl Into<String>, content_type: Option<String>, origin: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            content_type,
            origin: origin.into(),
        }
    }

    /// File extension matching the content type hint, `mp4` when unknown
    pub fn extension(&self) -> &'static str {
        match self.content_type.as_deref() {
            Some(ct) if ct.starts_with("video/webm") || ct.starts_with("audio/webm") => "webm",
            Some(ct) if ct.starts_with("video/3gpp") => "3gp",
            _ => "mp4",
        }
    }
}

/// A temporary local file holding a downloaded payload.
///
/// Owned by exactly one item; not `Clone` so it can never be shared.
#[derive(Debug, PartialEq, Eq)]
pub struct PayloadHandle {
    path: PathBuf,
    bytes: u64,
}

impl PayloadHandle {
    pub fn new(path: PathBuf, bytes: u64) -> Self {
        Self { path, bytes }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of bytes written to the file
    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Resolve,
    Metadata,
    Download,
    Convert,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Resolve, Stage::Metadata, Stage::Download, Stage::Convert];

    /// Short name used as the progress bar prefix
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Resolve => "Resolve",
            Stage::Metadata => "Metadata",
            Stage::Download => "Download",
            Stage::Convert => "Convert",
        }
    }

    /// 1-based position of the stage, used as the progress step
    pub fn step(&self) -> u64 {
        match self {
            Stage::Resolve => 1,
            Stage::Metadata => 2,
            Stage::Download => 3,
            Stage::Convert => 4,
        }
    }

    pub fn completed_state(&self) -> ItemState {
        match self {
            Stage::Resolve => ItemState::Resolved,
            Stage::Metadata => ItemState::MetadataLoaded,
            Stage::Download => ItemState::Downloaded,
            Stage::Convert => ItemState::Converted,
        }
    }

    pub fn failed_state(&self) -> ItemState {
        match self {
            Stage::Resolve => ItemState::ResolveFailed,
            Stage::Metadata => ItemState::MetadataFailed,
            Stage::Download => ItemState::DownloadFailed,
            Stage::Convert => ItemState::ConvertFailed,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Resolve => write!(f, "stream resolution"),
            Stage::Metadata => write!(f, "metadata fetch"),
            Stage::Download => write!(f, "download"),
            Stage::Convert => write!(f, "conversion"),
        }
    }
}

/// Where an item is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    Pending,
    Resolved,
    MetadataLoaded,
    Downloaded,
    Converted,
    ResolveFailed,
    MetadataFailed,
    DownloadFailed,
    ConvertFailed,
}

impl ItemState {
    pub fn is_failed(&self) -> bool {
        matches!(
            self,
            ItemState::ResolveFailed
                | ItemState::MetadataFailed
                | ItemState::DownloadFailed
                | ItemState::ConvertFailed
        )
    }
}

/// One link's in-flight state as it moves through the pipeline.
///
/// Fields only change through the `mark_*` transitions, each of which is
/// applied by the single task that owns the item for that stage.
#[derive(Debug)]
pub struct MediaItem {
    index: usize,
    source_link: String,
    display_name: String,
    stream: Option<StreamReference>,
    payload: Option<PayloadHandle>,
    output_path: Option<PathBuf>,
    state: ItemState,
}

impl MediaItem {
    /// Create an item for an accepted link; `index` is its submission position
    pub fn new(index: usize, source_link: impl Into<String>) -> Self {
        Self {
            index,
            source_link: source_link.into(),
            display_name: String::new(),
            stream: None,
            payload: None,
            output_path: None,
            state: ItemState::Pending,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn source_link(&self) -> &str {
        &self.source_link
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn stream(&self) -> Option<&StreamReference> {
        self.stream.as_ref()
    }

    pub fn payload(&self) -> Option<&PayloadHandle> {
        self.payload.as_ref()
    }

    pub fn output_path(&self) -> Option<&Path> {
        self.output_path.as_deref()
    }

    pub fn state(&self) -> ItemState {
        self.state
    }

    /// True iff the resolve stage produced a usable stream for this item
    pub fn has_stream(&self) -> bool {
        self.stream.as_ref().is_some_and(|s| !s.url.is_empty())
    }

    pub fn mark_resolved(&mut self, stream: Option<StreamReference>) {
        self.stream = stream;
        self.state = ItemState::Resolved;
    }

    pub fn mark_named(&mut self, name: impl Into<String>) {
        self.display_name = name.into();
        self.state = ItemState::MetadataLoaded;
    }

    pub fn mark_downloaded(&mut self, payload: PayloadHandle) {
        self.payload = Some(payload);
        self.state = ItemState::Downloaded;
    }

    pub fn mark_converted(&mut self, output_path: PathBuf) {
        self.output_path = Some(output_path);
        self.state = ItemState::Converted;
    }
}

/// The unit a stage task hands back to the orchestrator: a value or an error,
/// never both.
#[derive(Debug)]
pub enum StageMessage<T> {
    Completed(T),
    Failed { link: String, error: PipelineError },
}

impl<T> StageMessage<T> {
    pub fn failed(link: impl Into<String>, error: PipelineError) -> Self {
        StageMessage::Failed {
            link: link.into(),
            error,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, StageMessage::Completed(_))
    }

    pub fn into_result(self) -> std::result::Result<T, PipelineError> {
        match self {
            StageMessage::Completed(value) => Ok(value),
            StageMessage::Failed { error, .. } => Err(error),
        }
    }
}
