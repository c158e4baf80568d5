//! yt2mp3 - A Rust CLI tool for converting batches of YouTube videos to mp3 files
//!
//! This library drives every link of a batch through four concurrent stages
//! (stream resolution, metadata, payload download and transcoding), reports
//! per-link success or failure, and cleans up every temporary download.

use std::path::PathBuf;

pub mod cli;
pub mod config;
pub mod media;
pub mod metadata;
pub mod pipeline;
pub mod progress;
pub mod resolvers;
pub mod transcode;
pub mod transfer;
pub mod utils;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use media::{ItemState, MediaItem, PayloadHandle, Stage, StageMessage, StreamReference};
pub use metadata::MetadataFetcher;
pub use pipeline::{ItemOutcome, Pipeline, PipelineResult, PipelineSettings};
pub use progress::{ProgressEvent, ProgressSink};
pub use resolvers::StreamResolver;
pub use transcode::Encoder;
pub use transfer::PayloadSource;

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// Errors surfaced by the conversion pipeline
///
/// Every per-item variant carries the link it belongs to so the caller can
/// correlate failures with its input.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("link \"{link}\" has an issue: {message}")]
    InvalidLink { link: String, message: String },

    #[error("no playable stream found for link \"{link}\"")]
    StreamNotFound { link: String },

    #[error("failed to get a stream URL for link \"{link}\": {message}")]
    Resolve { link: String, message: String },

    #[error("failed to fetch metadata for link \"{link}\": {message}")]
    Metadata { link: String, message: String },

    #[error("failed to download link \"{link}\": {message}")]
    Transfer { link: String, message: String },

    #[error("failed to convert link \"{link}\" to audio: {message}")]
    Encode { link: String, message: String },

    #[error("failed to remove temporary file {} for link \"{link}\": {message}", .path.display())]
    Cleanup {
        link: String,
        path: PathBuf,
        message: String,
    },

    #[error("{stage} for link \"{link}\" was cancelled")]
    Cancelled { link: String, stage: Stage },

    #[error("configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    /// Link the error belongs to, if it is a per-item error
    pub fn link(&self) -> Option<&str> {
        match self {
            PipelineError::InvalidLink { link, .. }
            | PipelineError::StreamNotFound { link }
            | PipelineError::Resolve { link, .. }
            | PipelineError::Metadata { link, .. }
            | PipelineError::Transfer { link, .. }
            | PipelineError::Encode { link, .. }
            | PipelineError::Cleanup { link, .. }
            | PipelineError::Cancelled { link, .. } => Some(link),
            PipelineError::Config(_) => None,
        }
    }

    /// Terminal item state this error leaves its item in
    pub fn terminal_state(&self) -> Option<ItemState> {
        match self {
            PipelineError::StreamNotFound { .. } | PipelineError::Resolve { .. } => {
                Some(ItemState::ResolveFailed)
            }
            PipelineError::Metadata { .. } => Some(ItemState::MetadataFailed),
            PipelineError::Transfer { .. } => Some(ItemState::DownloadFailed),
            PipelineError::Encode { .. } => Some(ItemState::ConvertFailed),
            PipelineError::Cancelled { stage, .. } => Some(stage.failed_state()),
            _ => None,
        }
    }

    /// Wrap a collaborator failure into the typed error of the given stage
    pub(crate) fn from_stage(stage: Stage, link: &str, err: &anyhow::Error) -> Self {
        let link = link.to_string();
        let message = format!("{:#}", err);
        match stage {
            Stage::Resolve => PipelineError::Resolve { link, message },
            Stage::Metadata => PipelineError::Metadata { link, message },
            Stage::Download => PipelineError::Transfer { link, message },
            Stage::Convert => PipelineError::Encode { link, message },
        }
    }
}
